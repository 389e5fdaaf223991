//! Minimal SQL expression tree
//!
//! Only the constructs the moment pipeline needs: column references,
//! arithmetic, aggregates, derived tables and an inner join. Rendering goes
//! through `Display`; identifiers are always double-quoted.

use std::fmt;

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    And,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::And => "AND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
}

impl Aggregate {
    fn name(self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Count => "COUNT",
            Aggregate::Avg => "AVG",
        }
    }
}

/// A scalar or aggregate SQL expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Integer(i64),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `None` argument renders as `COUNT(*)`
    Aggregate {
        func: Aggregate,
        arg: Option<Box<Expr>>,
    },
    CastReal(Box<Expr>),
    IsNotNull(Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::Integer(value)
    }

    fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn plus(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn minus(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn times(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn divided_by(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn equals(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// Fold a list of predicates with AND; `None` for an empty list
    pub fn all(predicates: impl IntoIterator<Item = Expr>) -> Option<Self> {
        predicates.into_iter().reduce(Expr::and)
    }

    pub fn sum(arg: Expr) -> Self {
        Expr::Aggregate {
            func: Aggregate::Sum,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn count(arg: Expr) -> Self {
        Expr::Aggregate {
            func: Aggregate::Count,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn count_all() -> Self {
        Expr::Aggregate {
            func: Aggregate::Count,
            arg: None,
        }
    }

    pub fn avg(arg: Expr) -> Self {
        Expr::Aggregate {
            func: Aggregate::Avg,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn cast_real(self) -> Self {
        Expr::CastReal(Box::new(self))
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNotNull(Box::new(self))
    }

    /// Attach an output alias
    pub fn alias(self, alias: impl Into<String>) -> SelectItem {
        SelectItem {
            expr: self,
            alias: Some(alias.into()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { qualifier, name } => match qualifier {
                Some(q) => write!(f, "{}.{}", quote_ident(q), quote_ident(name)),
                None => write!(f, "{}", quote_ident(name)),
            },
            Expr::Integer(value) => write!(f, "{}", value),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Aggregate { func, arg } => match arg {
                Some(arg) => write!(f, "{}({})", func.name(), arg),
                None => write!(f, "{}(*)", func.name()),
            },
            Expr::CastReal(inner) => write!(f, "CAST({} AS REAL)", inner),
            Expr::IsNotNull(inner) => write!(f, "({} IS NOT NULL)", inner),
        }
    }
}

/// One projected column of a SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        SelectItem { expr, alias: None }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, quote_ident(alias)),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// FROM clause source
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(String),
    Derived {
        query: Box<SelectQuery>,
        alias: String,
    },
    InnerJoin {
        left: Box<Source>,
        right: Box<Source>,
        on: Expr,
    },
}

impl Source {
    pub fn table(name: impl Into<String>) -> Self {
        Source::Table(name.into())
    }

    pub fn inner_join(self, right: Source, on: Expr) -> Self {
        Source::InnerJoin {
            left: Box::new(self),
            right: Box::new(right),
            on,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Table(name) => write!(f, "{}", quote_ident(name)),
            Source::Derived { query, alias } => write!(f, "({}) AS {}", query, quote_ident(alias)),
            Source::InnerJoin { left, right, on } => {
                write!(f, "{} INNER JOIN {} ON {}", left, right, on)
            }
        }
    }
}

/// A SELECT statement; nothing is executed until a `QueryExecutor` runs it
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub items: Vec<SelectItem>,
    pub from: Source,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
}

impl SelectQuery {
    pub fn from_source(source: Source) -> Self {
        Self {
            items: Vec::new(),
            from: source,
            filter: None,
            group_by: Vec::new(),
        }
    }

    pub fn select(mut self, items: impl IntoIterator<Item = SelectItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn filter(mut self, predicate: Option<Expr>) -> Self {
        self.filter = predicate;
        self
    }

    pub fn group_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.group_by.extend(exprs);
        self
    }

    /// Wrap as a named derived table
    pub fn as_derived(self, alias: impl Into<String>) -> Source {
        Source::Derived {
            query: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Render as a single SQL statement
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.items.iter().map(ToString::to_string).collect();
        write!(f, "SELECT {} FROM {}", items.join(", "), self.from)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {}", filter)?;
        }
        if !self.group_by.is_empty() {
            let keys: Vec<String> = self.group_by.iter().map(ToString::to_string).collect();
            write!(f, " GROUP BY {}", keys.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("y"), "\"y\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_arithmetic_is_parenthesized() {
        let expr = Expr::col("a").minus(Expr::col("b")).times(Expr::int(2));
        assert_eq!(expr.to_string(), "((\"a\" - \"b\") * 2)");
    }

    #[test]
    fn test_all_folds_with_and() {
        assert!(Expr::all(Vec::new()).is_none());
        let folded = Expr::all(vec![Expr::col("a").is_not_null(), Expr::col("b").is_not_null()])
            .unwrap();
        assert_eq!(
            folded.to_string(),
            "((\"a\" IS NOT NULL) AND (\"b\" IS NOT NULL))"
        );
    }

    #[test]
    fn test_select_with_group_by() {
        let query = SelectQuery::from_source(Source::table("t"))
            .select(vec![
                Expr::col("g").into(),
                Expr::sum(Expr::col("x")).alias("x|sum"),
                Expr::count_all().alias("n"),
            ])
            .group_by(vec![Expr::col("g")]);
        assert_eq!(
            query.to_sql(),
            "SELECT \"g\", SUM(\"x\") AS \"x|sum\", COUNT(*) AS \"n\" FROM \"t\" GROUP BY \"g\""
        );
    }

    #[test]
    fn test_join_of_derived_tables() {
        let left = SelectQuery::from_source(Source::table("t"))
            .select(vec![Expr::col("g").into()])
            .as_derived("l");
        let right = SelectQuery::from_source(Source::table("u"))
            .select(vec![Expr::col("g").into()])
            .as_derived("r");
        let joined = left.inner_join(right, Expr::qualified("l", "g").equals(Expr::qualified("r", "g")));
        assert_eq!(
            joined.to_string(),
            "(SELECT \"g\" FROM \"t\") AS \"l\" INNER JOIN (SELECT \"g\" FROM \"u\") AS \"r\" \
             ON (\"l\".\"g\" = \"r\".\"g\")"
        );
    }
}
