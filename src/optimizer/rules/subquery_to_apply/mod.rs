//! Subquery to Apply conversion
//!
//! Replaces scalar, EXISTS and IN subqueries found in filters, projections,
//! one-row relations and join conditions with Apply nodes stacked under the
//! owning operator. Transformations:
//! - `filter(t.a = (SELECT ...))` → `filter(t.a = <output column>)` over Apply
//! - `filter(EXISTS (...))` → `filter(TRUE)` over Apply
//! - `filter(EXISTS (...) OR p)` → `filter(<mark slot> OR p)` over mark Apply,
//!   with the mark slot projected away above the filter
//! - `project(x IN (...))` → `project(<mark slot>)` over mark Apply
//! - `one_row((SELECT ...))` → `project((SELECT ...))` over `one_row(TRUE)`
//! - `join(l, r, p(subquery))` → join with the Apply on the child `p` reads
//!
//! List subqueries are left for a later pass.

mod apply;
mod classify;
mod correlation;
mod filter;
mod join;
mod one_row_relation;
mod project;
mod replace;

pub use classify::{is_eligible_subquery, is_single_subquery_conjunct};
pub use correlation::RelatedInfo;
pub use filter::FilterSubqueryToApply;
pub use join::JoinSubqueryToApply;
pub use one_row_relation::OneRowRelationSubqueryToApply;
pub use project::ProjectSubqueryToApply;
