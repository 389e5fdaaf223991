// Analysis configuration
//
// The library never reads files on its own; the binary loads this from TOML
// and callers may also build it in code.

use crate::column_map::ColumnMap;
use crate::covariance::Weighting;
use crate::error::{JiveError, Result};
use crate::ols::SolverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything one JIVE analysis needs besides a connection
///
/// # Example
/// ```
/// use jive::AnalysisConfig;
///
/// let config = AnalysisConfig::from_toml_str(r#"
///     table = "experiments"
///
///     [columns]
///     test_id = "test"
///     treatment_id = "arm"
///     outcome = "revenue"
///     mediators = ["clicks"]
/// "#).unwrap();
///
/// assert_eq!(config.table, "experiments");
/// assert_eq!(config.columns.measures(), vec!["clicks", "revenue"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Source table holding one row per observation
    pub table: String,

    /// Column roles
    pub columns: ColumnMap,

    /// Row weighting when accumulating treatment-effect covariances
    ///
    /// Default: `row_count` (harmonic combination of the two arm sizes)
    #[serde(default)]
    pub weighting: Weighting,

    /// Singularity threshold for the OLS solve
    #[serde(default)]
    pub solver: SolverConfig,
}

impl AnalysisConfig {
    pub fn new(table: impl Into<String>, columns: ColumnMap) -> Self {
        Self {
            table: table.into(),
            columns,
            weighting: Weighting::default(),
            solver: SolverConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| JiveError::Config(format!("invalid analysis config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            JiveError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(JiveError::Config("table name is empty".to_string()));
        }
        self.columns.validate()?;
        self.solver.validate()
    }
}
