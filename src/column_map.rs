//! Column roles for an experiment table

use crate::error::{JiveError, Result};
use serde::{Deserialize, Serialize};

/// Names the columns that play each statistical role in an experiment table
///
/// # Example
/// ```
/// use jive::ColumnMap;
///
/// let columns = ColumnMap::new("test", "arm", "revenue", vec!["clicks".to_string()]);
/// assert_eq!(columns.dimensions(), vec!["test", "arm"]);
/// assert_eq!(columns.measures(), vec!["clicks", "revenue"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Identifies the experiment (study) a row belongs to
    pub test_id: String,

    /// Identifies the arm within the experiment; the minimum value is the reference arm
    pub treatment_id: String,

    /// Regressand of the OLS fit
    pub outcome: String,

    /// Regressors of the OLS fit, in coefficient order
    #[serde(default)]
    pub mediators: Vec<String>,
}

impl ColumnMap {
    pub fn new(
        test_id: impl Into<String>,
        treatment_id: impl Into<String>,
        outcome: impl Into<String>,
        mediators: Vec<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            treatment_id: treatment_id.into(),
            outcome: outcome.into(),
            mediators,
        }
    }

    /// Group-by columns: the test id followed by the arm id
    pub fn dimensions(&self) -> Vec<&str> {
        vec![self.test_id.as_str(), self.treatment_id.as_str()]
    }

    /// Moment columns: mediators in order, outcome last
    pub fn measures(&self) -> Vec<&str> {
        self.mediators
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.outcome.as_str()))
            .collect()
    }

    /// Reject empty names and any column that plays two roles
    pub fn validate(&self) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.dimensions().into_iter().chain(self.measures()) {
            if name.trim().is_empty() {
                return Err(JiveError::Config(
                    "column map contains an empty column name".to_string(),
                ));
            }
            if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                return Err(JiveError::Config(format!(
                    "column '{}' is assigned more than one role",
                    name
                )));
            }
            seen.push(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measures_put_outcome_last() {
        let columns = ColumnMap::new(
            "test",
            "arm",
            "y",
            vec!["m1".to_string(), "m2".to_string()],
        );
        assert_eq!(columns.measures(), vec!["m1", "m2", "y"]);
        assert!(columns.validate().is_ok());
    }

    #[test]
    fn test_no_mediators() {
        let columns = ColumnMap::new("test", "arm", "y", vec![]);
        assert_eq!(columns.measures(), vec!["y"]);
    }

    #[test]
    fn test_role_collision_rejected() {
        let columns = ColumnMap::new("test", "arm", "arm", vec![]);
        assert!(matches!(columns.validate(), Err(JiveError::Config(_))));
    }

    #[test]
    fn test_role_collision_ignores_case() {
        let columns = ColumnMap::new("g", "G", "y", vec![]);
        assert!(matches!(columns.validate(), Err(JiveError::Config(_))));
        let columns = ColumnMap::new("test", "arm", "y", vec!["Y".to_string()]);
        assert!(columns.validate().is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let columns = ColumnMap::new("", "arm", "y", vec![]);
        assert!(columns.validate().is_err());
    }
}
