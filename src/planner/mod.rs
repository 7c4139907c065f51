//! Logical plan model
//!
//! Immutable expression and plan trees consumed and produced by the optimizer

mod logical_expr;
mod logical_plan;
mod schema;

pub use logical_expr::*;
pub use logical_plan::*;
pub use schema::*;
