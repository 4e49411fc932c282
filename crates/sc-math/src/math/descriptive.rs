//! Descriptive statistics over a population of readings.
//!
//! All functions skip NaN and return `None` for an empty population, which
//! callers treat as "statistic undefined" rather than as an error.

use super::stable::{stable_sum, Moments};
use serde::{Deserialize, Serialize};

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    let n = values.iter().filter(|v| !v.is_nan()).count();
    (n > 0).then(|| stable_sum(values) / n as f64)
}

/// Median; the average of the two middle values for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    let v = sorted_finite(values);
    let n = v.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(v[n / 2]),
        _ => Some((v[n / 2 - 1] + v[n / 2]) / 2.0),
    }
}

/// Most frequent value. Ties resolve to the smallest value.
pub fn mode(values: &[f64]) -> Option<f64> {
    let v = sorted_finite(values);
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < v.len() {
        let mut j = i + 1;
        while j < v.len() && v[j] == v[i] {
            j += 1;
        }
        let run = j - i;
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((v[i], run));
        }
        i = j;
    }
    best.map(|(value, _)| value)
}

/// Population standard deviation (divisor `n`).
pub fn population_stddev(values: &[f64]) -> Option<f64> {
    Moments::from_slice(values).population_stddev()
}

pub fn min(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .min_by(|a, b| a.total_cmp(b))
}

pub fn max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .max_by(|a, b| a.total_cmp(b))
}

/// Central tendency of one population.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CentralTendency {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub mode: Option<f64>,
}

impl CentralTendency {
    pub fn of(values: &[f64]) -> Self {
        Self {
            count: values.iter().filter(|v| !v.is_nan()).count(),
            mean: mean(values),
            median: median(values),
            mode: mode(values),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Range and average of one population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Extent {
    pub fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            min: min(values)?,
            max: max(values)?,
            mean: mean(values)?,
        })
    }
}
