//! Which subquery expressions this pass converts

use crate::planner::{Expr, LogicalPlan, SubqueryExpr};
use std::collections::HashSet;

/// Every subquery kind except list queries, which are unnested elsewhere.
/// A scalar subquery also needs an output column to stand in for it.
pub fn is_eligible_subquery(expr: &Expr) -> bool {
    match expr {
        Expr::Subquery(SubqueryExpr::List(_)) => false,
        Expr::Subquery(SubqueryExpr::Scalar(subquery)) => subquery.output_field().is_some(),
        Expr::Subquery(SubqueryExpr::Exists { .. } | SubqueryExpr::In { .. }) => true,
        _ => false,
    }
}

/// Eligible subqueries in pre-order, left to right, one entry per instance
pub fn collect_eligible_subqueries(expr: &Expr) -> Vec<SubqueryExpr> {
    let mut found = Vec::new();
    expr.collect(&is_eligible_subquery, &mut found);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|e| match e {
            Expr::Subquery(s) if seen.insert(s.id()) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// A join conjunct may carry exactly one eligible subquery; shapes like
/// `sub1 OR sub2` are left alone.
pub fn is_single_subquery_conjunct(expr: &Expr) -> bool {
    let mut found = Vec::new();
    expr.collect(&is_eligible_subquery, &mut found);
    found.len() == 1
}

/// True if the plan is, under any projections or sorts, an aggregate with
/// no grouping key. Such a body yields exactly one row even on empty input.
pub fn has_top_level_agg_without_group_by(plan: &LogicalPlan) -> bool {
    match plan {
        LogicalPlan::Aggregate(node) => node.group_by.is_empty(),
        LogicalPlan::Project(node) => has_top_level_agg_without_group_by(&node.input),
        LogicalPlan::Sort(node) => has_top_level_agg_without_group_by(&node.input),
        LogicalPlan::Scan(_)
        | LogicalPlan::Filter(_)
        | LogicalPlan::Join(_)
        | LogicalPlan::Apply(_)
        | LogicalPlan::OneRowRelation(_) => false,
    }
}
