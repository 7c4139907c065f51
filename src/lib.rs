//! Subquery decorrelation for logical query plans
//!
//! Converts scalar, EXISTS and IN subqueries embedded in filters,
//! projections, one-row relations and join conditions into explicit Apply
//! nodes, using mark-join slots where a predicate's three-valued result has
//! to survive the rewrite.

pub mod error;
pub mod optimizer;
pub mod planner;
pub mod scenarios;

// Re-export main types
pub use error::{QueryError, Result};
pub use optimizer::{Optimizer, OptimizerRule, StatementContext};
pub use planner::{Expr, LogicalPlan, LogicalPlanBuilder};
