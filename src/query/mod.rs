// Query composition for leave-one-out moments
//
// Builds the four-stage derived query (base → aggregate → leave-one-out join →
// moments) as an expression tree. Nothing in this module talks to a database;
// `crate::executor` runs the rendered SQL.

mod column;
mod expr;
mod moments;

pub use column::{MomentColumn, ROW_COUNT};
pub use expr::{quote_ident, Aggregate, BinaryOp, Expr, SelectItem, SelectQuery, Source};
pub use moments::{compose_moments_query, MomentQuery};
