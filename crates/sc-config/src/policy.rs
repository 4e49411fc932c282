//! Policy constants.
//!
//! These decide what the engine considers an outlier and how it fills gaps.
//! Fixed per release; not read from the config file.

use sc_common::Field;
use serde::{Deserialize, Serialize};

/// Half-width of the inclusion band in standard deviations.
pub const OUTLIER_SIGMA: f64 = 2.0;

/// Which central-tendency statistic fills an absent field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationStatistic {
    Mean,
    Median,
    Mode,
}

/// Field-to-statistic mapping used by the clean dataset builder.
pub fn imputation_statistic(field: Field) -> ImputationStatistic {
    match field {
        Field::WindSpeed | Field::WindDirection => ImputationStatistic::Median,
        Field::PowerOutput => ImputationStatistic::Mean,
    }
}
