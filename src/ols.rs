//! Ordinary least squares from an augmented covariance matrix
//!
//! For an `n×n` matrix over {1, m_1, …, m_{n−1}}, the leading `(n−1)×(n−1)`
//! block is `X'X` for regressors {1, m_1, …, m_{n−2}} and the last column
//! (without its last row) is `X'y` for `y = m_{n−1}`. The normal equations are
//! solved exactly with a dense LU decomposition.

use crate::covariance::AugmentedCovariance;
use crate::error::{JiveError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Name of the constant regressor
pub const INTERCEPT: &str = "intercept";

/// Solver configuration
///
/// # Example
/// ```
/// use jive::ols::SolverConfig;
///
/// let config = SolverConfig::default();
/// assert_eq!(config.max_condition_number, 1e12);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Largest 2-norm condition number of `X'X` accepted as non-singular
    ///
    /// Beyond ~1e12 an f64 solve keeps fewer than four significant digits.
    pub max_condition_number: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_condition_number: 1e12,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_condition_number.is_nan() || self.max_condition_number < 1.0 {
            return Err(JiveError::Config(format!(
                "max_condition_number must be >= 1, got {}",
                self.max_condition_number
            )));
        }
        Ok(())
    }
}

/// Fitted coefficients with their names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    /// `intercept` followed by every metric except the last
    pub regressors: Vec<String>,
    /// The last metric
    pub outcome: String,
    /// One coefficient per regressor, same order
    pub coefficients: Vec<f64>,
    /// Condition number of `X'X`
    pub condition_number: f64,
}

impl OlsFit {
    pub fn coefficient(&self, regressor: &str) -> Option<f64> {
        self.regressors
            .iter()
            .position(|r| r == regressor)
            .map(|i| self.coefficients[i])
    }

    pub fn intercept(&self) -> f64 {
        self.coefficients[0]
    }
}

/// Solve `X'X β = X'y` read off an augmented covariance matrix
pub fn ols_from_covariance(cov: &DMatrix<f64>, config: &SolverConfig) -> Result<DVector<f64>> {
    solve(cov, config).map(|(beta, _)| beta)
}

/// Fit the last metric of `cov` on the constant and the remaining metrics
pub fn solve_ols(cov: &AugmentedCovariance, config: &SolverConfig) -> Result<OlsFit> {
    let (beta, condition_number) = solve(cov.matrix(), config)?;

    let metrics = cov.metrics();
    let (outcome, rest) = metrics
        .split_last()
        .ok_or_else(|| JiveError::Config("covariance matrix has no metrics".to_string()))?;

    let mut regressors = Vec::with_capacity(metrics.len());
    regressors.push(INTERCEPT.to_string());
    regressors.extend(rest.iter().cloned());

    tracing::info!(
        outcome = %outcome,
        regressors = regressors.len(),
        condition_number,
        "solved normal equations"
    );

    Ok(OlsFit {
        regressors,
        outcome: outcome.clone(),
        coefficients: beta.iter().copied().collect(),
        condition_number,
    })
}

fn solve(cov: &DMatrix<f64>, config: &SolverConfig) -> Result<(DVector<f64>, f64)> {
    config.validate()?;

    let n = cov.nrows();
    if n != cov.ncols() {
        return Err(JiveError::Config(format!(
            "covariance matrix must be square, got {}x{}",
            n,
            cov.ncols()
        )));
    }
    if n < 2 {
        return Err(JiveError::Config(format!(
            "covariance matrix must be at least 2x2, got {}x{}",
            n, n
        )));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(JiveError::degenerate(
            "covariance matrix",
            "contains NaN or infinite cells",
        ));
    }

    let p = n - 1;
    let xtx: DMatrix<f64> = cov.view((0, 0), (p, p)).clone_owned();
    let xty = DVector::from_iterator(p, (0..p).map(|i| cov[(i, p)]));

    let condition_number = condition_number(&xtx);
    if condition_number.is_nan() || condition_number > config.max_condition_number {
        return Err(JiveError::SingularMatrix {
            dimension: p,
            condition_number,
        });
    }

    let beta = xtx.lu().solve(&xty).ok_or(JiveError::SingularMatrix {
        dimension: p,
        condition_number,
    })?;
    Ok((beta, condition_number))
}

/// Ratio of largest to smallest singular value; infinite when rank-deficient
fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    let singular_values = matrix.clone().svd(false, false).singular_values;
    let max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    let min = singular_values.iter().copied().fold(f64::INFINITY, f64::min);
    if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}
