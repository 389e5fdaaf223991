//! Treatment-versus-reference pairing of moment rows
//!
//! Within every test the arm with the minimum id is the reference. Each other
//! arm of that test is paired with it, yielding one treatment-effect row per
//! (test, non-reference arm). Tests that only contain their reference arm
//! contribute no rows.

use crate::column_map::ColumnMap;
use crate::error::{JiveError, Result};
use crate::executor::SqlValue;
use crate::moment_table::{MomentRow, MomentTable};
use crate::query::MomentColumn;
use std::collections::BTreeMap;

/// Suffix for treated-arm columns
pub const TREATMENT_SUFFIX: &str = "|t";
/// Suffix for reference-arm columns
pub const REFERENCE_SUFFIX: &str = "|r";

/// Which dimensions identify the test, which one the arm, and the optional weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectSpec {
    pub test_columns: Vec<String>,
    pub arm_column: String,
    /// Column combined by harmonic mean into the pair's weight
    pub weight: Option<MomentColumn>,
}

impl EffectSpec {
    pub fn new(test_columns: Vec<String>, arm_column: impl Into<String>) -> Self {
        Self {
            test_columns,
            arm_column: arm_column.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, column: MomentColumn) -> Self {
        self.weight = Some(column);
        self
    }

    /// Test id / treatment id from a column map, weighted by group size
    pub fn from_column_map(columns: &ColumnMap) -> Self {
        Self::new(vec![columns.test_id.clone()], columns.treatment_id.clone())
            .with_weight(MomentColumn::RowCount)
    }

    /// Positions of the test columns and the arm column in the table's dimension list
    fn resolve(&self, table: &MomentTable) -> Result<(Vec<usize>, usize)> {
        let position = |name: &str| {
            table.dimension_index(name).ok_or_else(|| {
                JiveError::Config(format!("'{}' is not a dimension of the moment table", name))
            })
        };

        if self.test_columns.is_empty() {
            return Err(JiveError::Config(
                "at least one test-id column is required".to_string(),
            ));
        }
        let arm_idx = position(&self.arm_column)?;
        let mut test_idx = Vec::with_capacity(self.test_columns.len());
        for name in &self.test_columns {
            let idx = position(name)?;
            if idx == arm_idx || test_idx.contains(&idx) {
                return Err(JiveError::Config(format!(
                    "dimension '{}' is used more than once in the effect specification",
                    name
                )));
            }
            test_idx.push(idx);
        }
        if test_idx.len() + 1 != table.dimensions().len() {
            return Err(JiveError::Config(format!(
                "test columns and arm column must cover every dimension ({})",
                table.dimensions().join(", ")
            )));
        }
        Ok((test_idx, arm_idx))
    }
}

/// `4 / (1/w_t + 1/w_r)`: effective sample size of a two-group mean difference
pub fn harmonic_weight(treatment: f64, reference: f64) -> f64 {
    4.0 / (1.0 / treatment + 1.0 / reference)
}

/// A treated arm's moments paired with its test's reference-arm moments
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentEffectRow {
    test: Vec<SqlValue>,
    treatment_arm: SqlValue,
    reference_arm: SqlValue,
    treatment: MomentRow,
    reference: MomentRow,
    weight: Option<f64>,
}

impl TreatmentEffectRow {
    pub fn test(&self) -> &[SqlValue] {
        &self.test
    }

    pub fn treatment_arm(&self) -> &SqlValue {
        &self.treatment_arm
    }

    pub fn reference_arm(&self) -> &SqlValue {
        &self.reference_arm
    }

    pub fn treatment(&self) -> &MomentRow {
        &self.treatment
    }

    pub fn reference(&self) -> &MomentRow {
        &self.reference
    }

    /// Harmonic combination of the named weight column, if one was requested
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    /// `(T1) B vs A`
    pub fn label(&self) -> String {
        let parts: Vec<String> = self.test.iter().map(ToString::to_string).collect();
        format!(
            "({}) {} vs {}",
            parts.join(", "),
            self.treatment_arm,
            self.reference_arm
        )
    }

    /// Treated average minus reference average
    pub fn delta(&self, measure: &str) -> Result<f64> {
        Ok(self.treatment.average(measure)? - self.reference.average(measure)?)
    }

    /// Leave-one-out product moment of the two mean differences
    ///
    /// `E[Δ_i Δ_j] = E[t_i t_j] + E[r_i r_j] − E[t_i]E[r_j] − E[r_i]E[t_j]`,
    /// with the first two terms taken from the unbiased leave-one-out
    /// cross-moments of each arm. Symmetric in `(m1, m2)`.
    pub fn combined_loo_cov(&self, m1: &str, m2: &str) -> Result<f64> {
        let (t, r) = (&self.treatment, &self.reference);
        let correction = t.average(m1)? * r.average(m2)? + r.average(m1)? * t.average(m2)?;
        Ok(t.loo_cov(m1, m2)? + r.loo_cov(m1, m2)? - correction)
    }

    /// Harmonic combination of an arbitrary column of both arms
    pub fn combined_weight(&self, column: &MomentColumn) -> Option<f64> {
        let treatment = self.treatment.value(column)?;
        let reference = self.reference.value(column)?;
        Some(harmonic_weight(treatment, reference))
    }
}

/// All treatment-effect rows derived from one moment table
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentEffectTable {
    test_columns: Vec<String>,
    arm_column: String,
    measures: Vec<String>,
    moment_columns: Vec<MomentColumn>,
    weight_column: Option<MomentColumn>,
    rows: Vec<TreatmentEffectRow>,
}

impl TreatmentEffectTable {
    /// Pair every non-reference arm with the minimum arm of its test
    pub fn from_moments(table: &MomentTable, spec: &EffectSpec) -> Result<Self> {
        let (test_idx, arm_idx) = spec.resolve(table)?;
        if let Some(column) = &spec.weight {
            if matches!(column, MomentColumn::Dimension(_)) {
                return Err(JiveError::Config(format!(
                    "weight column '{}' must be a moment, not a dimension",
                    column
                )));
            }
        }

        let mut tests: BTreeMap<Vec<SqlValue>, Vec<&MomentRow>> = BTreeMap::new();
        for row in table.rows() {
            let key: Vec<SqlValue> = test_idx.iter().map(|&i| row.group()[i].clone()).collect();
            tests.entry(key).or_default().push(row);
        }

        let mut rows = Vec::new();
        for (test, mut arms) in tests {
            arms.sort_by(|a, b| a.group()[arm_idx].cmp(&b.group()[arm_idx]));
            let reference = arms[0];
            let reference_arm = reference.group()[arm_idx].clone();

            if arms.len() > 1 && arms[1].group()[arm_idx] == reference_arm {
                return Err(JiveError::Data(format!(
                    "test {} has more than one row with the minimum arm id {}",
                    reference.label(),
                    reference_arm
                )));
            }
            if arms.len() == 1 {
                tracing::debug!(test = %reference.label(), "test has only its reference arm");
            }

            for treated in arms.into_iter().skip(1) {
                let weight = match &spec.weight {
                    Some(column) => Some(pair_weight(treated, reference, column)?),
                    None => None,
                };
                rows.push(TreatmentEffectRow {
                    test: test.clone(),
                    treatment_arm: treated.group()[arm_idx].clone(),
                    reference_arm: reference_arm.clone(),
                    treatment: treated.clone(),
                    reference: reference.clone(),
                    weight,
                });
            }
        }

        tracing::info!(
            pairs = rows.len(),
            groups = table.len(),
            "paired treatment arms with reference arms"
        );

        Ok(Self {
            test_columns: spec.test_columns.clone(),
            arm_column: spec.arm_column.clone(),
            measures: table.measures().to_vec(),
            moment_columns: table
                .columns()
                .into_iter()
                .filter(|c| !matches!(c, MomentColumn::Dimension(_)))
                .collect(),
            weight_column: spec.weight.clone(),
            rows,
        })
    }

    pub fn rows(&self) -> &[TreatmentEffectRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    pub fn test_columns(&self) -> &[String] {
        &self.test_columns
    }

    pub fn arm_column(&self) -> &str {
        &self.arm_column
    }

    pub fn weight_column(&self) -> Option<&MomentColumn> {
        self.weight_column.as_ref()
    }

    /// Moment columns carried per arm, in output order (weight column excluded)
    pub fn moment_columns(&self) -> Vec<&MomentColumn> {
        self.moment_columns
            .iter()
            .filter(|c| Some(*c) != self.weight_column.as_ref())
            .collect()
    }

    /// Rendered column names: test ids, suffixed arm ids and moments, combined weight
    pub fn column_names(&self) -> Vec<String> {
        let mut names = self.test_columns.clone();
        names.push(format!("{}{}", self.arm_column, TREATMENT_SUFFIX));
        names.push(format!("{}{}", self.arm_column, REFERENCE_SUFFIX));
        for column in self.moment_columns() {
            names.push(format!("{}{}", column, TREATMENT_SUFFIX));
            names.push(format!("{}{}", column, REFERENCE_SUFFIX));
        }
        if let Some(weight) = &self.weight_column {
            names.push(weight.alias());
        }
        names
    }
}

fn pair_weight(treated: &MomentRow, reference: &MomentRow, column: &MomentColumn) -> Result<f64> {
    let lookup = |row: &MomentRow| {
        row.value(column).ok_or_else(|| {
            JiveError::Config(format!("weight column '{}' is not in the moment table", column))
        })
    };
    Ok(harmonic_weight(lookup(treated)?, lookup(reference)?))
}
