//! Report rendering: text, JSON and CSV
//!
//! JSON and text cover the whole report; CSV writes the moment table only,
//! one line per group, for loading into a spreadsheet.

use crate::analysis::JiveReport;
use crate::covariance::{AugmentedCovariance, CovarianceKind};
use crate::executor::SqlValue;
use crate::moment_table::{MomentRow, MomentTable};
use crate::ols::OlsFit;
use crate::query::MomentColumn;
use crate::treatment_effect::TreatmentEffectTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One group of the moment table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMomentRow {
    /// Dimension values in dimension order
    pub group: Vec<SqlValue>,
    pub row_count: u64,
    /// Moment alias → value; `null` where the moment is undefined
    pub moments: BTreeMap<String, Option<f64>>,
}

/// Treatment-effect table as named columns plus positional rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEffects {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Treated-minus-reference mean difference per measure, one map per row
    pub deltas: Vec<BTreeMap<String, Option<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCovariance {
    pub kind: CovarianceKind,
    /// Metric order of rows and columns after the leading constant
    pub metrics: Vec<String>,
    pub rows_accumulated: usize,
    pub total_weight: f64,
    pub matrix: Vec<Vec<f64>>,
}

/// Full JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
    pub moments: Vec<JsonMomentRow>,
    pub effects: JsonEffects,
    pub covariance: JsonCovariance,
    pub fit: OlsFit,
}

impl JsonReport {
    pub fn from_report(report: &JiveReport) -> Self {
        Self {
            dimensions: report.moments.dimensions().to_vec(),
            measures: report.moments.measures().to_vec(),
            moments: report.moments.rows().iter().map(json_moment_row).collect(),
            effects: json_effects(&report.effects),
            covariance: json_covariance(&report.covariance),
            fit: report.fit.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn json_moment_row(row: &MomentRow) -> JsonMomentRow {
    let moments = row
        .moments()
        .iter()
        .map(|(column, value)| (column.alias(), finite(Some(*value))))
        .collect();
    JsonMomentRow {
        group: row.group().to_vec(),
        row_count: row.row_count(),
        moments,
    }
}

fn to_json_value(value: &SqlValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn number(value: Option<f64>) -> serde_json::Value {
    finite(value)
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn json_effects(effects: &TreatmentEffectTable) -> JsonEffects {
    let moment_columns = effects.moment_columns();
    let mut rows = Vec::with_capacity(effects.len());
    let mut deltas = Vec::with_capacity(effects.len());

    for row in effects.rows() {
        let mut values: Vec<serde_json::Value> = row.test().iter().map(to_json_value).collect();
        values.push(to_json_value(row.treatment_arm()));
        values.push(to_json_value(row.reference_arm()));
        for column in &moment_columns {
            values.push(number(row.treatment().value(column)));
            values.push(number(row.reference().value(column)));
        }
        if effects.weight_column().is_some() {
            values.push(number(row.weight()));
        }
        rows.push(values);

        deltas.push(
            effects
                .measures()
                .iter()
                .map(|m| (m.clone(), row.delta(m).ok()))
                .collect(),
        );
    }

    JsonEffects {
        columns: effects.column_names(),
        rows,
        deltas,
    }
}

fn json_covariance(cov: &AugmentedCovariance) -> JsonCovariance {
    JsonCovariance {
        kind: cov.kind(),
        metrics: cov.metrics().to_vec(),
        rows_accumulated: cov.row_count(),
        total_weight: cov.total_weight(),
        matrix: cov.to_rows(),
    }
}

/// Moment table as CSV: dimensions, moment columns, row_count
#[derive(Debug)]
pub struct MomentCsv<'a> {
    table: &'a MomentTable,
}

impl<'a> MomentCsv<'a> {
    pub fn new(table: &'a MomentTable) -> Self {
        Self { table }
    }

    /// Quote fields containing a comma, quote or newline
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn value_field(value: &SqlValue) -> String {
        match value {
            SqlValue::Null => String::new(),
            other => Self::escape_field(&other.to_string()),
        }
    }

    fn moment_columns(&self) -> Vec<MomentColumn> {
        self.table
            .columns()
            .into_iter()
            .filter(|c| !matches!(c, MomentColumn::Dimension(_)))
            .collect()
    }

    pub fn to_csv(&self) -> String {
        let columns = self.moment_columns();
        let mut output = String::new();

        let header: Vec<String> = self
            .table
            .dimensions()
            .iter()
            .map(|d| Self::escape_field(d))
            .chain(columns.iter().map(|c| Self::escape_field(&c.alias())))
            .collect();
        output.push_str(&header.join(","));
        output.push('\n');

        for row in self.table.rows() {
            let mut fields: Vec<String> = row.group().iter().map(Self::value_field).collect();
            for column in &columns {
                // Undefined moments are left empty
                match finite(row.value(column)) {
                    Some(v) => fields.push(v.to_string()),
                    None => fields.push(String::new()),
                }
            }
            output.push_str(&fields.join(","));
            output.push('\n');
        }

        output
    }
}

/// Human-readable summary of a report
pub fn format_text(report: &JiveReport) -> String {
    let mut out = String::new();
    let moments = &report.moments;
    let effects = &report.effects;

    out.push_str(&format!(
        "Moments: {} groups over {}\n",
        moments.len(),
        moments.dimensions().join(", ")
    ));
    let degenerate = moments.degenerate_groups();
    if !degenerate.is_empty() {
        out.push_str(&format!(
            "  undefined leave-one-out moments: {}\n",
            degenerate.join(", ")
        ));
    }

    out.push_str(&format!("\nTreatment effects: {} pairs\n", effects.len()));
    for row in effects.rows() {
        out.push_str(&format!("  {:<24}", row.label()));
        if let Some(w) = row.weight() {
            out.push_str(&format!(" weight {:>10.3}", w));
        }
        for measure in effects.measures() {
            match row.delta(measure) {
                Ok(d) => out.push_str(&format!("  Δ{} {:+.6}", measure, d)),
                Err(_) => out.push_str(&format!("  Δ{} undefined", measure)),
            }
        }
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&format_covariance(&report.covariance));
    out.push('\n');
    out.push_str(&format_fit(&report.fit));
    out
}

fn format_covariance(cov: &AugmentedCovariance) -> String {
    let kind = match cov.kind() {
        CovarianceKind::Summary => "summary",
        CovarianceKind::TreatmentEffect => "treatment effect",
    };
    let mut out = format!(
        "Augmented covariance ({}, {} rows, total weight {:.3})\n",
        kind,
        cov.row_count(),
        cov.total_weight()
    );

    let labels: Vec<&str> = std::iter::once("1")
        .chain(cov.metrics().iter().map(String::as_str))
        .collect();
    out.push_str(&format!("  {:>12}", ""));
    for label in &labels {
        out.push_str(&format!(" {:>14}", label));
    }
    out.push('\n');
    for (i, label) in labels.iter().enumerate() {
        out.push_str(&format!("  {:>12}", label));
        for j in 0..labels.len() {
            out.push_str(&format!(" {:>14.6}", cov.get(i, j)));
        }
        out.push('\n');
    }
    out
}

fn format_fit(fit: &OlsFit) -> String {
    let mut out = format!(
        "OLS: {} ~ {}   (condition number {:.3e})\n",
        fit.outcome,
        fit.regressors.join(" + "),
        fit.condition_number
    );
    for (name, beta) in fit.regressors.iter().zip(&fit.coefficients) {
        out.push_str(&format!("  {:<16} {:>14.6}\n", name, beta));
    }
    out
}
