//! End-to-end JIVE analysis
//!
//! Moments per (test, arm) → treatment effects against each test's reference
//! arm → weighted effect covariance → OLS of the outcome effect on the
//! mediator effects. Each effect's leave-one-out moments remove the
//! own-observation bias from the products of mean differences, so the slope
//! is not attenuated by per-test sampling noise.

use crate::config::AnalysisConfig;
use crate::covariance::AugmentedCovariance;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::moment_table::MomentTable;
use crate::ols::{solve_ols, OlsFit};
use crate::query::MomentQuery;
use crate::treatment_effect::{EffectSpec, TreatmentEffectTable};

/// Driver for one configured analysis; holds no connection
#[derive(Debug, Clone)]
pub struct JiveAnalysis {
    config: AnalysisConfig,
}

/// Every intermediate of a run, for reporting
#[derive(Debug, Clone)]
pub struct JiveReport {
    pub moments: MomentTable,
    pub effects: TreatmentEffectTable,
    pub covariance: AugmentedCovariance,
    pub fit: OlsFit,
}

impl JiveAnalysis {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Moment query grouped by (test id, arm id) over mediators and outcome
    pub fn moment_query(&self) -> Result<MomentQuery> {
        let columns = &self.config.columns;
        MomentQuery::new(&self.config.table, &columns.dimensions(), &columns.measures())
    }

    /// Test id against arm id, weighted per the configured weighting
    pub fn effect_spec(&self) -> EffectSpec {
        EffectSpec {
            weight: self.config.weighting.column(),
            ..EffectSpec::from_column_map(&self.config.columns)
        }
    }

    /// Run the whole pipeline on an explicitly supplied connection
    pub fn run(&self, conn: &dyn QueryExecutor) -> Result<JiveReport> {
        let query = self.moment_query()?;
        let moments = MomentTable::query(conn, &query)?;

        let degenerate = moments.degenerate_groups();
        if !degenerate.is_empty() {
            tracing::warn!(
                groups = %degenerate.join(", "),
                "groups with undefined leave-one-out moments"
            );
        }

        let effects = TreatmentEffectTable::from_moments(&moments, &self.effect_spec())?;
        let metrics = query.measures().to_vec();
        let weight = self.config.weighting.column();
        let covariance = AugmentedCovariance::accumulate(effects.rows(), &metrics, weight.as_ref())?;
        let fit = solve_ols(&covariance, &self.config.solver)?;

        Ok(JiveReport {
            moments,
            effects,
            covariance,
            fit,
        })
    }
}
