//! One-row relations with subqueries become a projection over a bare row

use super::classify::collect_eligible_subqueries;
use crate::error::Result;
use crate::optimizer::{OptimizerRule, StatementContext};
use crate::planner::{Expr, LogicalPlan};
use tracing::debug;

/// `SELECT (SELECT ...)` with no FROM clause.
///
/// The subqueries are moved into a projection over a one-row relation that
/// carries only `TRUE`, leaving the decorrelation itself to
/// [`super::ProjectSubqueryToApply`] on the next pass.
pub struct OneRowRelationSubqueryToApply;

impl OptimizerRule for OneRowRelationSubqueryToApply {
    fn name(&self) -> &str {
        "OneRowRelationSubqueryToApply"
    }

    fn try_rewrite(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<Option<LogicalPlan>> {
        let LogicalPlan::OneRowRelation(row) = plan else {
            return Ok(None);
        };
        if row
            .exprs
            .iter()
            .all(|e| collect_eligible_subqueries(e).is_empty())
        {
            return Ok(None);
        }

        let placeholder = Expr::boolean(true).alias(ctx.generate_column_name());
        debug!(rule = self.name(), "moved one-row subqueries into a projection");
        Ok(Some(
            LogicalPlan::one_row(vec![placeholder])?.project(row.exprs.clone())?,
        ))
    }
}
