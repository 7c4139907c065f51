//! Optimizer rules

mod subquery_to_apply;

pub use subquery_to_apply::{
    is_eligible_subquery, is_single_subquery_conjunct, FilterSubqueryToApply,
    JoinSubqueryToApply, OneRowRelationSubqueryToApply, ProjectSubqueryToApply, RelatedInfo,
};
