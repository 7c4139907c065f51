//! Projection items with subqueries to Apply

use super::apply::build_apply_chain;
use super::classify::collect_eligible_subqueries;
use super::replace::replace_subqueries;
use crate::error::Result;
use crate::optimizer::{OptimizerRule, StatementContext};
use crate::planner::{Expr, LogicalPlan, ProjectNode};
use std::sync::Arc;
use tracing::debug;

/// Decorrelates subqueries in projection lists. Items are handled like
/// filter conjuncts, but every EXISTS/IN yields a mark slot since the
/// projection needs its value.
pub struct ProjectSubqueryToApply;

impl OptimizerRule for ProjectSubqueryToApply {
    fn name(&self) -> &str {
        "ProjectSubqueryToApply"
    }

    fn try_rewrite(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<Option<LogicalPlan>> {
        let LogicalPlan::Project(project) = plan else {
            return Ok(None);
        };

        let subqueries_per_item: Vec<_> = project
            .exprs
            .iter()
            .map(collect_eligible_subqueries)
            .collect();
        if subqueries_per_item.iter().all(Vec::is_empty) {
            return Ok(None);
        }

        let mut child = project.input.as_ref().clone();
        let mut new_exprs = Vec::with_capacity(project.exprs.len());

        for (item, subqueries) in project.exprs.iter().zip(&subqueries_per_item) {
            if subqueries.is_empty() {
                new_exprs.push(item.clone());
                continue;
            }

            let rewrite = replace_subqueries(item, subqueries, true, ctx);
            child = build_apply_chain(subqueries, child, &rewrite, true, ctx)?;
            new_exprs.push(keep_output_name(item, rewrite.expr));
        }

        debug!(
            rule = self.name(),
            subqueries = subqueries_per_item.iter().map(Vec::len).sum::<usize>(),
            "rewrote projection subqueries"
        );

        Ok(Some(LogicalPlan::Project(ProjectNode::try_new(
            Arc::new(child),
            new_exprs,
        )?)))
    }
}

/// Unnamed items take their name from the expression text, which the rewrite
/// changes; pin the original name.
fn keep_output_name(original: &Expr, rewritten: Expr) -> Expr {
    match original {
        Expr::Alias { .. } | Expr::Column(_) => rewritten,
        _ => rewritten.alias(original.output_name()),
    }
}
