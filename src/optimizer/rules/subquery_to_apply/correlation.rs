//! Which join child a subquery conjunct depends on

use super::classify::collect_eligible_subqueries;
use crate::planner::{Column, Expr, LogicalPlan, SubqueryExpr};
use std::collections::HashSet;

/// Dependency of a single-subquery join conjunct on the join's children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedInfo {
    /// Neither the subquery nor its comparison reads a child, e.g.
    /// `(SELECT SUM(t.a) FROM t) > 1`
    Unrelated,
    /// Everything it reads comes from the left child, e.g.
    /// `l.a IN (SELECT t.a FROM t)` or `l.a > (SELECT SUM(t.a) FROM t WHERE t.b = l.b)`
    RelatedToLeft,
    /// As above, for the right child
    RelatedToRight,
    /// Reads both children, or nothing usable as a key:
    /// `l.a > (SELECT SUM(t.a) FROM t WHERE t.b = r.b)`
    Unsupported,
}

/// Classify each conjunct against the output columns of `left` and `right`.
pub fn collect_related_info(
    conjuncts: &[Expr],
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> Vec<RelatedInfo> {
    let left_columns = left.schema().column_set();
    let right_columns = right.schema().column_set();
    conjuncts
        .iter()
        .map(|c| classify_conjunct(c, &left_columns, &right_columns))
        .collect()
}

pub fn classify_conjunct(
    conjunct: &Expr,
    left_columns: &HashSet<Column>,
    right_columns: &HashSet<Column>,
) -> RelatedInfo {
    let subqueries = collect_eligible_subqueries(conjunct);
    let [subquery] = subqueries.as_slice() else {
        return RelatedInfo::Unsupported;
    };
    let correlated: HashSet<Column> = subquery.correlated_columns().iter().cloned().collect();

    match subquery {
        SubqueryExpr::Scalar(_) => {
            let inputs = conjunct.input_columns();
            if correlated.is_empty() && inputs.is_empty() {
                RelatedInfo::Unrelated
            } else {
                covering_side(&inputs, &correlated, left_columns, right_columns)
            }
        }
        SubqueryExpr::In { expr, .. } => {
            let compare = expr.input_columns();
            if compare.is_empty() {
                RelatedInfo::Unsupported
            } else {
                covering_side(&compare, &correlated, left_columns, right_columns)
            }
        }
        SubqueryExpr::Exists { .. } => {
            if correlated.is_empty() {
                RelatedInfo::Unrelated
            } else {
                covering_side(&HashSet::new(), &correlated, left_columns, right_columns)
            }
        }
        SubqueryExpr::List(_) => RelatedInfo::Unsupported,
    }
}

fn covering_side(
    inputs: &HashSet<Column>,
    correlated: &HashSet<Column>,
    left_columns: &HashSet<Column>,
    right_columns: &HashSet<Column>,
) -> RelatedInfo {
    if inputs.is_subset(left_columns) && correlated.is_subset(left_columns) {
        RelatedInfo::RelatedToLeft
    } else if inputs.is_subset(right_columns) && correlated.is_subset(right_columns) {
        RelatedInfo::RelatedToRight
    } else {
        RelatedInfo::Unsupported
    }
}
