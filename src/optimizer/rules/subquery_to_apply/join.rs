//! Join conjuncts with subqueries to Apply on the side they read

use super::apply::build_apply_chain;
use super::classify::{collect_eligible_subqueries, is_single_subquery_conjunct};
use super::correlation::{collect_related_info, RelatedInfo};
use super::replace::replace_subqueries;
use crate::error::Result;
use crate::optimizer::{OptimizerRule, StatementContext};
use crate::planner::{Expr, JoinNode, LogicalPlan};
use std::sync::Arc;
use tracing::debug;

/// Decorrelates subqueries in the non-equi conjuncts of a join.
///
/// Only joins without hash conditions qualify, and each subquery conjunct
/// must hold exactly one eligible subquery whose inputs come from a single
/// child. A conjunct holding only a list query counts as zero and blocks the
/// rewrite. Anything else leaves the join as it is.
pub struct JoinSubqueryToApply;

impl OptimizerRule for JoinSubqueryToApply {
    fn name(&self) -> &str {
        "JoinSubqueryToApply"
    }

    fn try_rewrite(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<Option<LogicalPlan>> {
        let LogicalPlan::Join(join) = plan else {
            return Ok(None);
        };
        if !join.on.is_empty() || join.other_conjuncts.is_empty() {
            return Ok(None);
        }

        let (subquery_conjuncts, plain_conjuncts): (Vec<Expr>, Vec<Expr>) = join
            .other_conjuncts
            .iter()
            .cloned()
            .partition(Expr::contains_subquery);
        if subquery_conjuncts.is_empty() {
            return Ok(None);
        }
        if !subquery_conjuncts.iter().all(is_single_subquery_conjunct) {
            debug!(rule = self.name(), "conjunct holds several subqueries, skipping");
            return Ok(None);
        }

        let related = collect_related_info(&subquery_conjuncts, &join.left, &join.right);
        if related.contains(&RelatedInfo::Unsupported) {
            debug!(rule = self.name(), "subquery reads both join children, skipping");
            return Ok(None);
        }

        let mut left = join.left.as_ref().clone();
        let mut right = join.right.as_ref().clone();
        let mut new_conjuncts = Vec::with_capacity(join.other_conjuncts.len());

        for (conjunct, info) in subquery_conjuncts.iter().zip(&related) {
            let subqueries = collect_eligible_subqueries(conjunct);
            let rewrite = replace_subqueries(conjunct, &subqueries, true, ctx);
            // Unrelated subqueries can sit on either side; they go right.
            match info {
                RelatedInfo::RelatedToLeft => {
                    left = build_apply_chain(&subqueries, left, &rewrite, false, ctx)?;
                }
                _ => {
                    right = build_apply_chain(&subqueries, right, &rewrite, false, ctx)?;
                }
            }
            new_conjuncts.push(rewrite.expr);
        }
        new_conjuncts.extend(plain_conjuncts);

        debug!(
            rule = self.name(),
            subqueries = subquery_conjuncts.len(),
            "rewrote join subqueries"
        );

        Ok(Some(LogicalPlan::Join(JoinNode::new(
            Arc::new(left),
            Arc::new(right),
            join.join_type,
            join.on.clone(),
            new_conjuncts,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{
        AggregateFunction, Column, JoinType, LogicalPlanBuilder, PlanSchema, ScalarValue,
        SchemaField, Subquery,
    };
    use arrow::datatypes::DataType;

    fn scan(table: &str) -> LogicalPlanBuilder {
        LogicalPlanBuilder::scan(
            table,
            PlanSchema::new(vec![
                SchemaField::new("a", DataType::Int64).with_relation(table),
                SchemaField::new("b", DataType::Int64).with_relation(table),
            ]),
        )
    }

    fn sum_of_t(correlated_to: Option<(&str, &str)>) -> LogicalPlan {
        let mut body = scan("t");
        if let Some((relation, name)) = correlated_to {
            body = body.filter(
                Expr::qualified_column("t", "b").eq(Expr::qualified_column(relation, name)),
            );
        }
        body.aggregate(
            vec![],
            vec![Expr::Aggregate {
                func: AggregateFunction::Sum,
                args: vec![Expr::qualified_column("t", "a")],
                distinct: false,
            }
            .alias("sum_a")],
        )
        .unwrap()
        .build()
    }

    fn join(other_conjuncts: Vec<Expr>) -> LogicalPlan {
        scan("l")
            .join(scan("r").build(), JoinType::Inner, vec![], other_conjuncts)
            .build()
    }

    #[test]
    fn test_hash_join_is_skipped() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let plan = scan("l")
            .join(
                scan("r").build(),
                JoinType::Inner,
                vec![(Expr::qualified_column("l", "a"), Expr::qualified_column("r", "a"))],
                vec![Expr::exists(Subquery::new(id, scan("t").build(), vec![]))],
            )
            .build();
        assert!(JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_two_subqueries_in_one_conjunct_is_skipped() {
        let mut ctx = StatementContext::new();
        let first = Subquery::new(ctx.next_subquery_id(), scan("t").build(), vec![]);
        let second = Subquery::new(ctx.next_subquery_id(), scan("t").build(), vec![]);
        let plan = join(vec![Expr::exists(first).or(Expr::exists(second))]);
        assert!(JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .is_none());
        assert_eq!(ctx.analyzed_count(), 0);
    }

    #[test]
    fn test_list_query_conjunct_blocks_rewrite() {
        let mut ctx = StatementContext::new();
        let exists = Subquery::new(ctx.next_subquery_id(), scan("t").build(), vec![]);
        let list = Subquery::new(ctx.next_subquery_id(), scan("t").build(), vec![]);
        let plan = join(vec![
            Expr::exists(exists),
            Expr::qualified_column("l", "a").eq(Expr::list_query(list)),
        ]);
        assert!(JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .is_none());
        assert_eq!(ctx.analyzed_count(), 0);
    }

    #[test]
    fn test_cross_side_correlation_is_skipped() {
        let mut ctx = StatementContext::new();
        let subquery = Subquery::new(
            ctx.next_subquery_id(),
            sum_of_t(Some(("r", "b"))),
            vec![Column::new_qualified("r", "b")],
        );
        let plan = join(vec![
            Expr::qualified_column("l", "a").gt(Expr::scalar_subquery(subquery)),
        ]);
        assert!(JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_left_correlated_scalar_goes_left() {
        let mut ctx = StatementContext::new();
        let subquery = Subquery::new(
            ctx.next_subquery_id(),
            sum_of_t(Some(("l", "b"))),
            vec![Column::new_qualified("l", "b")],
        );
        let plain = Expr::qualified_column("l", "b").lt(Expr::qualified_column("r", "b"));
        let plan = join(vec![
            plain.clone(),
            Expr::qualified_column("l", "a").gt(Expr::scalar_subquery(subquery)),
        ]);

        let result = JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Join(new_join) = &result else {
            panic!("Expected Join, got {:?}", result);
        };
        assert_eq!(
            new_join.other_conjuncts,
            vec![
                Expr::qualified_column("l", "a").gt(Expr::column("$c$1")),
                plain,
            ]
        );
        assert_eq!(new_join.right.as_ref(), &scan("r").build());

        let LogicalPlan::Project(project) = new_join.left.as_ref() else {
            panic!("Expected Project, got {:?}", new_join.left);
        };
        let LogicalPlan::Apply(apply) = project.input.as_ref() else {
            panic!("Expected Apply, got {:?}", project.input);
        };
        assert!(apply.expose_subquery_output);
        assert!(!apply.in_project);
        assert!(result
            .schema()
            .resolve_column(&Column::new("$c$1"))
            .is_some());
    }

    #[test]
    fn test_uncorrelated_exists_goes_right_with_mark_slot() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let plan = join(vec![Expr::exists(Subquery::new(id, scan("t").build(), vec![]))
            .and(Expr::qualified_column("r", "a").gt(Expr::literal(ScalarValue::Int64(0))))]);

        let result = JoinSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Join(new_join) = &result else {
            panic!("Expected Join, got {:?}", result);
        };
        assert_eq!(new_join.left.as_ref(), &scan("l").build());
        let LogicalPlan::Project(project) = new_join.right.as_ref() else {
            panic!("Expected Project, got {:?}", new_join.right);
        };
        let LogicalPlan::Apply(apply) = project.input.as_ref() else {
            panic!("Expected Apply, got {:?}", project.input);
        };
        let slot = apply.mark_join_slot.clone().unwrap();
        assert_eq!(
            new_join.other_conjuncts[0],
            Expr::MarkJoinSlot(slot)
                .and(Expr::qualified_column("r", "a").gt(Expr::literal(ScalarValue::Int64(0))))
        );
        assert!(ctx.is_subquery_analyzed(id));
    }
}
