//! Typed view of the moment query result
//!
//! One `MomentRow` per group. Values are addressed by `MomentColumn`; the
//! alias strings are only used once, to locate result columns.

use crate::error::{JiveError, Result};
use crate::executor::{QueryExecutor, RecordSet, SqlValue};
use crate::query::{MomentColumn, MomentQuery};
use std::collections::BTreeMap;

/// Moments of one group (one distinct non-null combination of dimension values)
#[derive(Debug, Clone, PartialEq)]
pub struct MomentRow {
    group: Vec<SqlValue>,
    row_count: u64,
    /// Averages and cross-moments; NULL from the store is kept as NaN
    moments: BTreeMap<MomentColumn, f64>,
}

impl MomentRow {
    pub fn new(group: Vec<SqlValue>, row_count: u64, moments: BTreeMap<MomentColumn, f64>) -> Self {
        Self {
            group,
            row_count,
            moments,
        }
    }

    /// Dimension values in the table's dimension order
    pub fn group(&self) -> &[SqlValue] {
        &self.group
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// `(T1, A)`-style label used in error messages and reports
    pub fn label(&self) -> String {
        let parts: Vec<String> = self.group.iter().map(ToString::to_string).collect();
        format!("({})", parts.join(", "))
    }

    /// Averages and cross-moments keyed by column
    pub fn moments(&self) -> &BTreeMap<MomentColumn, f64> {
        &self.moments
    }

    /// Raw lookup: row count, averages and cross-moments
    pub fn value(&self, column: &MomentColumn) -> Option<f64> {
        match column {
            MomentColumn::RowCount => Some(self.row_count as f64),
            other => self.moments.get(other).copied(),
        }
    }

    /// Group average of `measure`
    pub fn average(&self, measure: &str) -> Result<f64> {
        self.finite(&MomentColumn::average(measure))
    }

    /// Leave-one-out cross-moment of `m1` with the leave-one-out mean of `m2`
    pub fn loo_cov(&self, m1: &str, m2: &str) -> Result<f64> {
        self.finite(&MomentColumn::loo_cov(m1, m2))
    }

    fn finite(&self, column: &MomentColumn) -> Result<f64> {
        let value = self.moments.get(column).copied().ok_or_else(|| {
            JiveError::Config(format!("moment table has no column '{}'", column))
        })?;
        if value.is_finite() {
            return Ok(value);
        }
        let detail = if self.row_count < 2 {
            format!(
                "'{}' is undefined: leave-one-out count is zero (row_count = {})",
                column, self.row_count
            )
        } else {
            format!("'{}' is not finite ({})", column, value)
        };
        Err(JiveError::degenerate(format!("group {}", self.label()), detail))
    }

    fn has_non_finite(&self) -> bool {
        self.moments.values().any(|v| !v.is_finite())
    }
}

/// Result of one moment query execution
#[derive(Debug, Clone, PartialEq)]
pub struct MomentTable {
    dimensions: Vec<String>,
    measures: Vec<String>,
    rows: Vec<MomentRow>,
}

impl MomentTable {
    /// Compose the moment query, run it on `conn` and type the result
    pub fn query(conn: &dyn QueryExecutor, query: &MomentQuery) -> Result<Self> {
        let records = conn.run_query(&query.moments_query())?;
        let table = Self::from_record_set(query, &records)?;
        tracing::info!(
            table = query.table(),
            groups = table.len(),
            measures = query.measures().len(),
            "computed leave-one-out moments"
        );
        Ok(table)
    }

    /// Locate every expected column by alias and convert the rows
    pub fn from_record_set(query: &MomentQuery, records: &RecordSet) -> Result<Self> {
        let locate = |column: &MomentColumn| {
            records.column_index(&column.alias()).ok_or_else(|| {
                JiveError::Query(format!("result is missing expected column '{}'", column))
            })
        };

        let row_count_idx = locate(&MomentColumn::RowCount)?;
        let mut dimension_idx = Vec::with_capacity(query.dimensions().len());
        let mut moment_idx = Vec::new();
        for column in query.output_columns() {
            match column {
                MomentColumn::Dimension(_) => dimension_idx.push(locate(&column)?),
                MomentColumn::RowCount => {}
                other => {
                    let idx = locate(&other)?;
                    moment_idx.push((other, idx));
                }
            }
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in &records.rows {
            let group: Vec<SqlValue> = dimension_idx.iter().map(|&i| record[i].clone()).collect();

            let row_count = match &record[row_count_idx] {
                SqlValue::Integer(n) if *n >= 0 => *n as u64,
                other => {
                    return Err(JiveError::Query(format!(
                        "row_count must be a non-negative integer, got {}",
                        other
                    )))
                }
            };

            let mut moments = BTreeMap::new();
            for (column, idx) in &moment_idx {
                let value = match &record[*idx] {
                    SqlValue::Null => f64::NAN,
                    other => other.as_f64().ok_or_else(|| {
                        JiveError::Query(format!(
                            "column '{}' returned non-numeric value {}",
                            column, other
                        ))
                    })?,
                };
                moments.insert(column.clone(), value);
            }

            rows.push(MomentRow::new(group, row_count, moments));
        }

        Ok(Self {
            dimensions: query.dimensions().to_vec(),
            measures: query.measures().to_vec(),
            rows,
        })
    }

    pub fn new(dimensions: Vec<String>, measures: Vec<String>, rows: Vec<MomentRow>) -> Self {
        Self {
            dimensions,
            measures,
            rows,
        }
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    pub fn rows(&self) -> &[MomentRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == name)
    }

    /// Row whose dimension values equal `group`
    pub fn find(&self, group: &[SqlValue]) -> Option<&MomentRow> {
        self.rows.iter().find(|row| row.group() == group)
    }

    /// Labels of groups carrying an undefined moment (typically single-row groups)
    pub fn degenerate_groups(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|row| row.has_non_finite())
            .map(MomentRow::label)
            .collect()
    }

    /// Fail on the first group with an undefined moment
    pub fn require_finite(self) -> Result<Self> {
        if let Some(row) = self.rows.iter().find(|row| row.has_non_finite()) {
            let detail = if row.row_count() < 2 {
                "leave-one-out count is zero".to_string()
            } else {
                "a moment evaluated to NULL or a non-finite value".to_string()
            };
            return Err(JiveError::degenerate(format!("group {}", row.label()), detail));
        }
        Ok(self)
    }

    /// Result column keys in output order
    pub fn columns(&self) -> Vec<MomentColumn> {
        let mut columns: Vec<MomentColumn> = self
            .dimensions
            .iter()
            .cloned()
            .map(MomentColumn::Dimension)
            .collect();
        columns.extend(self.measures.iter().map(|m| MomentColumn::average(m)));
        for m1 in &self.measures {
            for m2 in &self.measures {
                columns.push(MomentColumn::loo_cov(m1, m2));
            }
        }
        columns.push(MomentColumn::RowCount);
        columns
    }
}

/// Compose and execute the moment query for `table` on an explicit connection
pub fn query_moments<D, M>(
    conn: &dyn QueryExecutor,
    table: &str,
    dimensions: &[D],
    measures: &[M],
) -> Result<MomentTable>
where
    D: AsRef<str>,
    M: AsRef<str>,
{
    let query = MomentQuery::new(table, dimensions, measures)?;
    MomentTable::query(conn, &query)
}
