//! Augmented covariance matrices over {1, m_1, …, m_k}
//!
//! ```text
//!        │ 1        m_1          …  m_k
//!   ─────┼──────────────────────────────────
//!   1    │ w        Σw·mean_1    …  Σw·mean_k
//!   m_1  │ Σw·mean_1 Σw·C[1,1]   …  Σw·C[1,k]
//!   …    │ …
//!   m_k  │ Σw·mean_k Σw·C[k,1]   …  Σw·C[k,k]
//! ```
//!
//! `mean_i` is the group average (summary rows) or the treated-minus-reference
//! difference (treatment-effect rows). `C[i,j]` is the leave-one-out
//! cross-moment, or the combined moment of the two differences. Rows are
//! summed sequentially in input order, so repeated runs agree bit for bit.

use crate::error::{JiveError, Result};
use crate::moment_table::MomentRow;
use crate::query::MomentColumn;
use crate::treatment_effect::TreatmentEffectRow;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Which kind of row a matrix was assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceKind {
    Summary,
    TreatmentEffect,
}

/// A row that can contribute one augmented covariance matrix
pub trait MomentSource {
    const KIND: CovarianceKind;

    /// Identifies the row in error messages
    fn label(&self) -> String;

    /// Entry for cells `[0, i]` and `[i, 0]`
    fn mean(&self, metric: &str) -> Result<f64>;

    /// Entry for cell `[i, j]`
    fn cross_moment(&self, m1: &str, m2: &str) -> Result<f64>;

    /// Raw weight from `column`; `None` when the row has no such value
    fn weight(&self, column: &MomentColumn) -> Option<f64>;
}

impl MomentSource for MomentRow {
    const KIND: CovarianceKind = CovarianceKind::Summary;

    fn label(&self) -> String {
        format!("group {}", MomentRow::label(self))
    }

    fn mean(&self, metric: &str) -> Result<f64> {
        self.average(metric)
    }

    fn cross_moment(&self, m1: &str, m2: &str) -> Result<f64> {
        self.loo_cov(m1, m2)
    }

    fn weight(&self, column: &MomentColumn) -> Option<f64> {
        self.value(column)
    }
}

impl MomentSource for TreatmentEffectRow {
    const KIND: CovarianceKind = CovarianceKind::TreatmentEffect;

    fn label(&self) -> String {
        format!("test {}", TreatmentEffectRow::label(self))
    }

    fn mean(&self, metric: &str) -> Result<f64> {
        self.delta(metric)
    }

    fn cross_moment(&self, m1: &str, m2: &str) -> Result<f64> {
        self.combined_loo_cov(m1, m2)
    }

    fn weight(&self, column: &MomentColumn) -> Option<f64> {
        self.combined_weight(column)
    }
}

/// How rows are weighted during accumulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every row counts once
    Uniform,
    /// Weight by `row_count` (harmonic combination for treatment-effect rows)
    #[default]
    RowCount,
}

impl Weighting {
    pub fn column(self) -> Option<MomentColumn> {
        match self {
            Weighting::Uniform => None,
            Weighting::RowCount => Some(MomentColumn::RowCount),
        }
    }
}

/// Missing, non-finite and zero weights count as 1
pub fn effective_weight(raw: Option<f64>) -> f64 {
    match raw {
        Some(w) if w.is_finite() && w != 0.0 => w,
        _ => 1.0,
    }
}

/// Symmetric `(k+1)×(k+1)` matrix over the constant and `k` metrics
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedCovariance {
    kind: CovarianceKind,
    metrics: Vec<String>,
    matrix: DMatrix<f64>,
    rows: usize,
}

impl AugmentedCovariance {
    /// Matrix of a single row; cell `[0, 0]` is 1
    pub fn from_row<S: MomentSource>(row: &S, metrics: &[String]) -> Result<Self> {
        validate_metrics(metrics)?;
        Ok(Self {
            kind: S::KIND,
            metrics: metrics.to_vec(),
            matrix: row_matrix(row, metrics)?,
            rows: 1,
        })
    }

    /// Weighted sum of per-row matrices; cell `[0, 0]` is the total weight
    pub fn accumulate<S: MomentSource>(
        rows: &[S],
        metrics: &[String],
        weight: Option<&MomentColumn>,
    ) -> Result<Self> {
        validate_metrics(metrics)?;
        if rows.is_empty() {
            return Err(JiveError::Data(
                "no rows to accumulate into a covariance matrix".to_string(),
            ));
        }

        let n = metrics.len() + 1;
        let mut total = DMatrix::<f64>::zeros(n, n);
        let mut defaulted = 0usize;

        for row in rows {
            let raw = weight.and_then(|column| row.weight(column));
            let w = effective_weight(raw);
            if weight.is_some() && raw != Some(w) {
                defaulted += 1;
            }

            let contribution = row_matrix(row, metrics)? * w;
            if contribution.iter().any(|v| !v.is_finite()) {
                return Err(JiveError::degenerate(
                    row.label(),
                    format!("weighted contribution (weight {}) is not finite", w),
                ));
            }
            total += contribution;
        }

        if defaulted > 0 {
            tracing::warn!(
                rows = defaulted,
                "missing or zero weights replaced by 1 during accumulation"
            );
        }
        tracing::debug!(rows = rows.len(), dimension = n, "accumulated covariance");

        Ok(Self {
            kind: S::KIND,
            metrics: metrics.to_vec(),
            matrix: total,
            rows: rows.len(),
        })
    }

    pub fn kind(&self) -> CovarianceKind {
        self.kind
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// `k + 1`
    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of rows summed into this matrix
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Cell `[0, 0]`
    pub fn total_weight(&self) -> f64 {
        self.matrix[(0, 0)]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let n = self.dimension();
        (0..n).all(|i| (0..n).all(|j| (self.matrix[(i, j)] - self.matrix[(j, i)]).abs() <= tolerance))
    }

    /// Row-major copy for serialization
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.matrix
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect()
    }
}

fn validate_metrics(metrics: &[String]) -> Result<()> {
    if metrics.is_empty() {
        return Err(JiveError::Config(
            "covariance matrix needs at least one metric".to_string(),
        ));
    }
    for (i, metric) in metrics.iter().enumerate() {
        if metrics[..i].contains(metric) {
            return Err(JiveError::Config(format!(
                "metric '{}' is listed more than once",
                metric
            )));
        }
    }
    Ok(())
}

fn row_matrix<S: MomentSource>(row: &S, metrics: &[String]) -> Result<DMatrix<f64>> {
    let n = metrics.len() + 1;
    let mut matrix = DMatrix::<f64>::zeros(n, n);
    matrix[(0, 0)] = 1.0;

    for (i, m_i) in metrics.iter().enumerate() {
        let mean = row.mean(m_i)?;
        matrix[(0, i + 1)] = mean;
        matrix[(i + 1, 0)] = mean;

        for (j, m_j) in metrics.iter().enumerate().skip(i) {
            // Both orders estimate the same product; average them so the
            // matrix is exactly symmetric
            let cell = if i == j {
                row.cross_moment(m_i, m_j)?
            } else {
                0.5 * (row.cross_moment(m_i, m_j)? + row.cross_moment(m_j, m_i)?)
            };
            matrix[(i + 1, j + 1)] = cell;
            matrix[(j + 1, i + 1)] = cell;
        }
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SqlValue;
    use std::collections::BTreeMap;

    fn row(label: &str, n: u64, values: &[(MomentColumn, f64)]) -> MomentRow {
        let moments: BTreeMap<MomentColumn, f64> = values.iter().cloned().collect();
        MomentRow::new(vec![SqlValue::from(label)], n, moments)
    }

    fn xy_row(label: &str, n: u64, x: f64, y: f64, xy: f64, yx: f64) -> MomentRow {
        row(
            label,
            n,
            &[
                (MomentColumn::average("x"), x),
                (MomentColumn::average("y"), y),
                (MomentColumn::loo_cov("x", "x"), x * x),
                (MomentColumn::loo_cov("x", "y"), xy),
                (MomentColumn::loo_cov("y", "x"), yx),
                (MomentColumn::loo_cov("y", "y"), y * y),
            ],
        )
    }

    fn metrics() -> Vec<String> {
        vec!["x".to_string(), "y".to_string()]
    }

    #[test]
    fn test_summary_layout() {
        let cov = AugmentedCovariance::from_row(&xy_row("a", 3, 2.0, 5.0, 10.0, 10.0), &metrics())
            .unwrap();
        assert_eq!(cov.kind(), CovarianceKind::Summary);
        assert_eq!(cov.dimension(), 3);
        assert_eq!(cov.get(0, 0), 1.0);
        assert_eq!(cov.get(0, 1), 2.0);
        assert_eq!(cov.get(2, 0), 5.0);
        assert_eq!(cov.get(1, 1), 4.0);
        assert_eq!(cov.get(1, 2), 10.0);
        assert_eq!(cov.get(2, 2), 25.0);
    }

    #[test]
    fn test_asymmetric_input_is_symmetrized() {
        let cov = AugmentedCovariance::from_row(&xy_row("a", 3, 2.0, 5.0, 9.0, 11.0), &metrics())
            .unwrap();
        assert!(cov.is_symmetric(0.0));
        assert_eq!(cov.get(1, 2), 10.0);
    }

    #[test]
    fn test_weighted_accumulation() {
        let rows = vec![
            xy_row("a", 2, 1.0, 2.0, 2.0, 2.0),
            xy_row("b", 4, 3.0, 6.0, 18.0, 18.0),
        ];
        let cov =
            AugmentedCovariance::accumulate(&rows, &metrics(), Some(&MomentColumn::RowCount)).unwrap();
        assert_eq!(cov.row_count(), 2);
        assert_eq!(cov.total_weight(), 6.0);
        assert_eq!(cov.get(0, 1), 2.0 * 1.0 + 4.0 * 3.0);
        assert_eq!(cov.get(1, 2), 2.0 * 2.0 + 4.0 * 18.0);
        assert!(cov.is_symmetric(0.0));
    }

    #[test]
    fn test_zero_or_missing_weight_counts_as_one() {
        assert_eq!(effective_weight(None), 1.0);
        assert_eq!(effective_weight(Some(0.0)), 1.0);
        assert_eq!(effective_weight(Some(f64::NAN)), 1.0);
        assert_eq!(effective_weight(Some(2.5)), 2.5);

        let rows = vec![xy_row("a", 0, 1.0, 2.0, 2.0, 2.0)];
        let cov =
            AugmentedCovariance::accumulate(&rows, &metrics(), Some(&MomentColumn::RowCount)).unwrap();
        assert_eq!(cov.total_weight(), 1.0);
    }

    #[test]
    fn test_uniform_weighting() {
        let rows = vec![
            xy_row("a", 10, 1.0, 2.0, 2.0, 2.0),
            xy_row("b", 20, 3.0, 6.0, 18.0, 18.0),
        ];
        let cov = AugmentedCovariance::accumulate(&rows, &metrics(), None).unwrap();
        assert_eq!(cov.total_weight(), 2.0);
        assert_eq!(Weighting::Uniform.column(), None);
        assert_eq!(Weighting::default().column(), Some(MomentColumn::RowCount));
    }

    #[test]
    fn test_degenerate_row_is_attributed() {
        let rows = vec![
            xy_row("a", 3, 1.0, 2.0, 2.0, 2.0),
            xy_row("solo", 1, 3.0, 6.0, f64::NAN, f64::NAN),
        ];
        let err = AugmentedCovariance::accumulate(&rows, &metrics(), None).unwrap_err();
        assert!(err.is_numeric_degeneracy());
        assert!(err.to_string().contains("solo"), "{err}");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let rows: Vec<MomentRow> = vec![];
        assert!(matches!(
            AugmentedCovariance::accumulate(&rows, &metrics(), None),
            Err(JiveError::Data(_))
        ));
        let one = xy_row("a", 3, 1.0, 2.0, 2.0, 2.0);
        assert!(AugmentedCovariance::from_row(&one, &[]).is_err());
        assert!(AugmentedCovariance::from_row(&one, &["x".to_string(), "x".to_string()]).is_err());
    }

    #[test]
    fn test_to_rows() {
        let cov = AugmentedCovariance::from_row(&xy_row("a", 3, 2.0, 5.0, 10.0, 10.0), &metrics())
            .unwrap();
        let rows = cov.to_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![1.0, 2.0, 5.0]);
    }
}
