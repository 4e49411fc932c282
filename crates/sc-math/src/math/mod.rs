//! Core math modules.

pub mod descriptive;
pub mod stable;
