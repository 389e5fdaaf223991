//! Jive - jackknife instrumental-variable estimation over SQL
//!
//! This library composes leave-one-out moment queries over an observation
//! table, pairs treated arms with each test's reference arm, assembles
//! augmented covariance matrices from the resulting moments and solves the
//! normal equations for the mediator slopes.
//!
//! Every query runs on a connection passed in by the caller; the library
//! keeps no global state.

pub mod analysis;
pub mod cli;
pub mod column_map;
pub mod config;
pub mod covariance;
pub mod error;
pub mod executor;
pub mod moment_table;
pub mod ols;
pub mod output;
pub mod query;
pub mod treatment_effect;

pub use analysis::{JiveAnalysis, JiveReport};
pub use column_map::ColumnMap;
pub use config::AnalysisConfig;
pub use covariance::{AugmentedCovariance, CovarianceKind, MomentSource, Weighting};
pub use error::{JiveError, Result};
pub use executor::{execute, QueryExecutor, RecordSet, SqlValue, SqliteExecutor};
pub use moment_table::{query_moments, MomentRow, MomentTable};
pub use ols::{ols_from_covariance, solve_ols, OlsFit, SolverConfig};
pub use query::{compose_moments_query, MomentColumn, MomentQuery, SelectQuery};
pub use treatment_effect::{harmonic_weight, EffectSpec, TreatmentEffectRow, TreatmentEffectTable};
