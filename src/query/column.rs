//! Structured keys for the columns the moment pipeline produces
//!
//! Result columns are addressed by `MomentColumn`, never by parsing alias
//! strings. `alias()` is the single place a key turns into SQL text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved alias for the per-group row count
pub const ROW_COUNT: &str = "row_count";

/// A column of one of the pipeline stages, tagged with its statistical role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MomentColumn {
    /// Group-by key, passed through unprefixed
    Dimension(String),
    /// Group sum of a measure (aggregate stage)
    Sum(String),
    /// Group count of non-null measure values (aggregate stage)
    Count(String),
    /// Group sum minus this row's value (join stage)
    LooSum(String),
    /// Group count minus one (join stage)
    LooCount(String),
    /// Group average of a measure (moment stage)
    Average(String),
    /// Average of `m1 × leave-one-out mean of m2` (moment stage)
    LooCov(String, String),
    /// Rows per group (moment stage)
    RowCount,
}

impl MomentColumn {
    pub fn average(measure: &str) -> Self {
        MomentColumn::Average(measure.to_string())
    }

    pub fn loo_cov(m1: &str, m2: &str) -> Self {
        MomentColumn::LooCov(m1.to_string(), m2.to_string())
    }

    /// Alias used in the composed SQL and in rendered output
    pub fn alias(&self) -> String {
        match self {
            MomentColumn::Dimension(name) => name.clone(),
            MomentColumn::Sum(m) => format!("{}|sum", m),
            MomentColumn::Count(m) => format!("{}|count", m),
            MomentColumn::LooSum(m) => format!("{}|loo_sum", m),
            MomentColumn::LooCount(m) => format!("{}|loo_count", m),
            MomentColumn::Average(m) => format!("{}|avg", m),
            MomentColumn::LooCov(m1, m2) => format!("{}:{}|loo_cov", m1, m2),
            MomentColumn::RowCount => ROW_COUNT.to_string(),
        }
    }
}

impl fmt::Display for MomentColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias())
    }
}
