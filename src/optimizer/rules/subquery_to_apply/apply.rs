//! Turn rewritten subqueries into Apply nodes chained under a child plan

use super::classify::has_top_level_agg_without_group_by;
use super::replace::SubqueryRewrite;
use crate::error::Result;
use crate::optimizer::StatementContext;
use crate::planner::{ApplyNode, Expr, LogicalPlan, MarkJoinSlot, SubqueryExpr};
use std::sync::Arc;
use tracing::trace;

/// Fold `subqueries` over `child`, stacking one Apply (plus a narrowing
/// projection) per subquery, in order. `rewrite` is the item after
/// [`super::replace::replace_subqueries`].
pub fn build_apply_chain(
    subqueries: &[SubqueryExpr],
    child: LogicalPlan,
    rewrite: &SubqueryRewrite,
    in_project: bool,
    ctx: &mut StatementContext,
) -> Result<LogicalPlan> {
    subqueries.iter().try_fold(child, |plan, subquery| {
        let mark_slot = rewrite.mark_slot(subquery.id()).cloned();

        if is_unmarked_exists_over_global_agg(subquery, mark_slot.as_ref()) {
            trace!(subquery = %subquery.id(), "EXISTS over global aggregate folded to TRUE");
            return Ok(plan);
        }
        if ctx.is_subquery_analyzed(subquery.id()) {
            trace!(subquery = %subquery.id(), "subquery already converted, skipping");
            return Ok(plan);
        }
        add_apply(subquery, plan, mark_slot, rewrite, in_project, ctx)
    })
}

/// Such an EXISTS was replaced by TRUE and needs no data from its body.
fn is_unmarked_exists_over_global_agg(
    subquery: &SubqueryExpr,
    mark_slot: Option<&MarkJoinSlot>,
) -> bool {
    matches!(subquery, SubqueryExpr::Exists { .. })
        && mark_slot.is_none()
        && has_top_level_agg_without_group_by(subquery.plan())
}

fn add_apply(
    subquery: &SubqueryExpr,
    child: LogicalPlan,
    mark_slot: Option<MarkJoinSlot>,
    rewrite: &SubqueryRewrite,
    in_project: bool,
    ctx: &mut StatementContext,
) -> Result<LogicalPlan> {
    ctx.mark_subquery_analyzed(subquery.id());

    let output_column = rewrite.scalar_output(subquery.id()).cloned();
    // A scalar value flows upward when the rewritten item still reads it, or
    // always inside a projection.
    let expose_subquery_output = output_column
        .as_ref()
        .is_some_and(|column| in_project || rewrite.expr.references_column(column));
    let child = Arc::new(child);

    let mut projects: Vec<Expr> = child.output_columns().into_iter().map(Expr::Column).collect();
    if let Some(slot) = &mark_slot {
        projects.push(Expr::MarkJoinSlot(slot.clone()));
    }
    if expose_subquery_output {
        if let Some(column) = &output_column {
            projects.push(Expr::Column(column.clone()));
        }
    }

    let apply = LogicalPlan::Apply(ApplyNode {
        correlation_columns: subquery.correlated_columns().to_vec(),
        subquery: subquery.clone(),
        correlation_filter: None,
        mark_join_slot: mark_slot,
        expose_subquery_output,
        output_column,
        in_project,
        left: child,
        right: subquery.plan().clone(),
    });

    apply.project(projects)
}
