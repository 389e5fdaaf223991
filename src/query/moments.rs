//! Leave-one-out moment query composition
//!
//! The composed query is a chain of derived tables:
//!
//! ```text
//! base     SELECT dims, measures FROM table WHERE every dim IS NOT NULL
//!   │
//! agg      SELECT dims, SUM(m) AS "m|sum", COUNT(m) AS "m|count" FROM base GROUP BY dims
//!   │
//! joined   base ⋈ agg ON dims
//!          "m|loo_sum"   = "m|sum" - m
//!          "m|loo_count" = "m|count" - 1
//!   │
//! moments  SELECT dims,
//!                 AVG(m)                                 AS "m|avg",
//!                 AVG(m1 * ("m2|loo_sum" / "m2|loo_count")) AS "m1:m2|loo_cov",
//!                 COUNT(*)                               AS "row_count"
//!          FROM joined GROUP BY dims
//! ```
//!
//! Removing a row's own contribution from its group aggregate gives the
//! leave-one-out mean without a second scan. Averaging `x_i × mean_{-i}(y)`
//! over a group estimates `E[x]·E[y]` without the own-observation bias a plain
//! product of means carries.
//!
//! A group with a single observation has `loo_count = 0`. SQLite evaluates the
//! division to NULL; the moment table keeps that as NaN and refuses to hand it
//! out as a covariance.

use super::column::{MomentColumn, ROW_COUNT};
use super::expr::{Expr, SelectItem, SelectQuery, Source};
use crate::error::{JiveError, Result};

const BASE_ALIAS: &str = "base";
const AGG_ALIAS: &str = "agg";
const JOINED_ALIAS: &str = "loo";

/// Validated (table, dimensions, measures) triple that composes the moment query
///
/// # Example
/// ```
/// use jive::query::MomentQuery;
///
/// let query = MomentQuery::new("events", &["test", "arm"], &["y"]).unwrap();
/// let sql = query.moments_query().to_sql();
/// assert!(sql.contains("AS \"y:y|loo_cov\""));
/// assert!(sql.contains("AS \"row_count\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentQuery {
    table: String,
    dimensions: Vec<String>,
    measures: Vec<String>,
}

impl MomentQuery {
    /// Validate the column lists; nothing is executed
    pub fn new<D, M>(table: &str, dimensions: &[D], measures: &[M]) -> Result<Self>
    where
        D: AsRef<str>,
        M: AsRef<str>,
    {
        if table.trim().is_empty() {
            return Err(JiveError::Config("table name is empty".to_string()));
        }
        if dimensions.is_empty() {
            return Err(JiveError::Config(
                "at least one dimension is required".to_string(),
            ));
        }
        if measures.is_empty() {
            return Err(JiveError::Config(
                "at least one measure is required".to_string(),
            ));
        }

        let dimensions: Vec<String> = dimensions.iter().map(|d| d.as_ref().to_string()).collect();
        let measures: Vec<String> = measures.iter().map(|m| m.as_ref().to_string()).collect();

        // SQLite resolves identifiers case-insensitively
        let mut seen: Vec<&str> = Vec::with_capacity(dimensions.len() + measures.len());
        for name in dimensions.iter().chain(measures.iter()) {
            validate_column_name(name)?;
            if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                return Err(JiveError::Config(format!(
                    "column '{}' appears more than once across dimensions and measures",
                    name
                )));
            }
            seen.push(name);
        }

        Ok(Self {
            table: table.to_string(),
            dimensions,
            measures,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    fn dimension_exprs(&self) -> impl Iterator<Item = Expr> + '_ {
        self.dimensions.iter().map(Expr::col)
    }

    /// Stage 1: dimensions and measures of rows whose dimensions are all non-null
    pub fn base_query(&self) -> SelectQuery {
        let fields = self
            .dimensions
            .iter()
            .chain(self.measures.iter())
            .map(|name| SelectItem::from(Expr::col(name)));
        let not_null = Expr::all(self.dimension_exprs().map(Expr::is_not_null));

        SelectQuery::from_source(Source::table(&self.table))
            .select(fields)
            .filter(not_null)
    }

    /// Stage 2: per-group sum and count of each measure
    pub fn aggregate_query(&self) -> SelectQuery {
        let sums = self.measures.iter().map(|m| {
            Expr::sum(Expr::col(m)).alias(MomentColumn::Sum(m.clone()).alias())
        });
        let counts = self.measures.iter().map(|m| {
            Expr::count(Expr::col(m)).alias(MomentColumn::Count(m.clone()).alias())
        });

        SelectQuery::from_source(self.base_query().as_derived(BASE_ALIAS))
            .select(self.dimension_exprs().map(SelectItem::from))
            .select(sums)
            .select(counts)
            .group_by(self.dimension_exprs())
    }

    /// Stage 3: every base row joined to its group aggregate, own value removed
    pub fn joined_query(&self) -> SelectQuery {
        let on = Expr::all(
            self.dimensions
                .iter()
                .map(|d| Expr::qualified(BASE_ALIAS, d).equals(Expr::qualified(AGG_ALIAS, d))),
        );
        // Validation guarantees at least one dimension
        let on = on.unwrap_or(Expr::int(1).equals(Expr::int(1)));

        let source = self
            .base_query()
            .as_derived(BASE_ALIAS)
            .inner_join(self.aggregate_query().as_derived(AGG_ALIAS), on);

        let fields = self
            .dimensions
            .iter()
            .chain(self.measures.iter())
            .map(|name| SelectItem::from(Expr::qualified(BASE_ALIAS, name)));
        let loo_sums = self.measures.iter().map(|m| {
            Expr::qualified(AGG_ALIAS, MomentColumn::Sum(m.clone()).alias())
                .minus(Expr::qualified(BASE_ALIAS, m))
                .alias(MomentColumn::LooSum(m.clone()).alias())
        });
        let loo_counts = self.measures.iter().map(|m| {
            Expr::qualified(AGG_ALIAS, MomentColumn::Count(m.clone()).alias())
                .minus(Expr::int(1))
                .alias(MomentColumn::LooCount(m.clone()).alias())
        });

        SelectQuery::from_source(source)
            .select(fields)
            .select(loo_sums)
            .select(loo_counts)
    }

    /// Stage 4: group averages, every ordered leave-one-out cross-moment, row count
    pub fn moments_query(&self) -> SelectQuery {
        let averages = self
            .measures
            .iter()
            .map(|m| Expr::avg(Expr::col(m)).alias(MomentColumn::average(m).alias()));

        let mut cross_moments = Vec::with_capacity(self.measures.len() * self.measures.len());
        for m1 in &self.measures {
            for m2 in &self.measures {
                cross_moments.push(
                    Expr::avg(Expr::col(m1).times(loo_mean(m2)))
                        .alias(MomentColumn::loo_cov(m1, m2).alias()),
                );
            }
        }

        SelectQuery::from_source(self.joined_query().as_derived(JOINED_ALIAS))
            .select(self.dimension_exprs().map(SelectItem::from))
            .select(averages)
            .select(cross_moments)
            .select(std::iter::once(Expr::count_all().alias(ROW_COUNT)))
            .group_by(self.dimension_exprs())
    }

    /// Columns of the moment stage, in select order
    pub fn output_columns(&self) -> Vec<MomentColumn> {
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

/// `CAST("m|loo_sum" AS REAL) / "m|loo_count"` so integer columns do not truncate
fn loo_mean(measure: &str) -> Expr {
    Expr::col(MomentColumn::LooSum(measure.to_string()).alias())
        .cast_real()
        .divided_by(Expr::col(MomentColumn::LooCount(measure.to_string()).alias()))
}

fn validate_column_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(JiveError::Config("empty column name".to_string()));
    }
    if name.contains('|') || name.contains(':') {
        return Err(JiveError::Config(format!(
            "column '{}' contains a reserved character ('|' or ':')",
            name
        )));
    }
    if name.eq_ignore_ascii_case(ROW_COUNT) {
        return Err(JiveError::Config(format!(
            "column name '{}' is reserved for the group row count",
            ROW_COUNT
        )));
    }
    Ok(())
}

/// Compose the full moment query for `table` grouped by `dimensions`
pub fn compose_moments_query<D, M>(table: &str, dimensions: &[D], measures: &[M]) -> Result<SelectQuery>
where
    D: AsRef<str>,
    M: AsRef<str>,
{
    Ok(MomentQuery::new(table, dimensions, measures)?.moments_query())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dimensions_rejected() {
        let dims: [&str; 0] = [];
        let err = MomentQuery::new("t", &dims, &["y"]).unwrap_err();
        assert!(matches!(err, JiveError::Config(_)));
    }

    #[test]
    fn test_empty_measures_rejected() {
        let measures: [&str; 0] = [];
        assert!(MomentQuery::new("t", &["g"], &measures).is_err());
    }

    #[test]
    fn test_overlapping_columns_rejected() {
        let err = MomentQuery::new("t", &["g", "y"], &["y"]).unwrap_err();
        assert!(err.to_string().contains("'y'"));
    }

    #[test]
    fn test_case_folded_collision_rejected() {
        let err = MomentQuery::new("t", &["g"], &["G"]).unwrap_err();
        assert!(matches!(err, JiveError::Config(_)));
        assert!(MomentQuery::new("t", &["g"], &["y", "Y"]).is_err());
        assert!(MomentQuery::new("t", &["g"], &["Row_Count"]).is_err());
    }

    #[test]
    fn test_duplicate_measure_rejected() {
        assert!(MomentQuery::new("t", &["g"], &["y", "y"]).is_err());
    }

    #[test]
    fn test_reserved_names_rejected() {
        assert!(MomentQuery::new("t", &["g"], &["a|b"]).is_err());
        assert!(MomentQuery::new("t", &["g"], &["a:b"]).is_err());
        assert!(MomentQuery::new("t", &["row_count"], &["y"]).is_err());
        assert!(MomentQuery::new(" ", &["g"], &["y"]).is_err());
    }

    #[test]
    fn test_base_query_filters_null_dimensions() {
        let query = MomentQuery::new("t", &["test", "arm"], &["y"]).unwrap();
        assert_eq!(
            query.base_query().to_sql(),
            "SELECT \"test\", \"arm\", \"y\" FROM \"t\" \
             WHERE ((\"test\" IS NOT NULL) AND (\"arm\" IS NOT NULL))"
        );
    }

    #[test]
    fn test_aggregate_query_shape() {
        let query = MomentQuery::new("t", &["g"], &["y"]).unwrap();
        let sql = query.aggregate_query().to_sql();
        assert!(sql.contains("SUM(\"y\") AS \"y|sum\""));
        assert!(sql.contains("COUNT(\"y\") AS \"y|count\""));
        assert!(sql.ends_with("GROUP BY \"g\""));
    }

    #[test]
    fn test_joined_query_removes_own_contribution() {
        let query = MomentQuery::new("t", &["g"], &["y"]).unwrap();
        let sql = query.joined_query().to_sql();
        assert!(sql.contains("(\"agg\".\"y|sum\" - \"base\".\"y\") AS \"y|loo_sum\""));
        assert!(sql.contains("(\"agg\".\"y|count\" - 1) AS \"y|loo_count\""));
        assert!(sql.contains("ON (\"base\".\"g\" = \"agg\".\"g\")"));
    }

    #[test]
    fn test_moments_include_self_pairs() {
        let query = MomentQuery::new("t", &["g"], &["x", "y"]).unwrap();
        let sql = query.moments_query().to_sql();
        for alias in ["x:x|loo_cov", "x:y|loo_cov", "y:x|loo_cov", "y:y|loo_cov"] {
            assert!(sql.contains(&format!("AS \"{}\"", alias)), "missing {alias}");
        }
        assert!(sql.contains(
            "AVG((\"x\" * (CAST(\"y|loo_sum\" AS REAL) / \"y|loo_count\"))) AS \"x:y|loo_cov\""
        ));
    }

    #[test]
    fn test_output_columns_order() {
        let query = MomentQuery::new("t", &["g"], &["x", "y"]).unwrap();
        let columns = query.output_columns();
        assert_eq!(columns.len(), 1 + 2 + 4 + 1);
        assert_eq!(columns[0], MomentColumn::Dimension("g".into()));
        assert_eq!(columns[1], MomentColumn::average("x"));
        assert_eq!(columns[4], MomentColumn::loo_cov("y", "x"));
        assert_eq!(columns[7], MomentColumn::RowCount);

        let rendered: Vec<String> = query
            .moments_query()
            .items
            .iter()
            .filter_map(|item| item.alias.clone())
            .collect();
        let expected: Vec<String> = columns[1..].iter().map(MomentColumn::alias).collect();
        assert_eq!(rendered, expected);
    }
}
