//! Filter conjuncts with subqueries to Apply

use super::apply::build_apply_chain;
use super::classify::collect_eligible_subqueries;
use super::replace::replace_subqueries;
use crate::error::Result;
use crate::optimizer::{OptimizerRule, StatementContext};
use crate::planner::{Column, Expr, LogicalPlan, MarkJoinSlot};
use std::collections::HashSet;
use tracing::debug;

/// Decorrelates subqueries in filter conjuncts.
///
/// Each conjunct is rewritten on its own and its Apply nodes are stacked on
/// top of the previous conjunct's, left to right. When a rebuilt conjunct
/// reads a mark slot, a projection above the filter hides the slots again.
pub struct FilterSubqueryToApply;

impl OptimizerRule for FilterSubqueryToApply {
    fn name(&self) -> &str {
        "FilterSubqueryToApply"
    }

    fn try_rewrite(
        &self,
        plan: &LogicalPlan,
        ctx: &mut StatementContext,
    ) -> Result<Option<LogicalPlan>> {
        let LogicalPlan::Filter(filter) = plan else {
            return Ok(None);
        };

        let subqueries_per_conjunct: Vec<_> = filter
            .conjuncts
            .iter()
            .map(collect_eligible_subqueries)
            .collect();
        if subqueries_per_conjunct.iter().all(Vec::is_empty) {
            return Ok(None);
        }

        let mut child = filter.input.as_ref().clone();
        let mut new_conjuncts: Vec<Expr> = Vec::with_capacity(filter.conjuncts.len());
        let mut mark_columns: HashSet<Column> = HashSet::new();

        for (conjunct, subqueries) in filter.conjuncts.iter().zip(&subqueries_per_conjunct) {
            if subqueries.is_empty() {
                push_unique(&mut new_conjuncts, conjunct.clone());
                continue;
            }

            let rewrite = replace_subqueries(conjunct, subqueries, false, ctx);
            child = build_apply_chain(subqueries, child, &rewrite, false, ctx)?;
            mark_columns.extend(
                rewrite
                    .mark_slots
                    .values()
                    .flatten()
                    .map(MarkJoinSlot::column),
            );
            push_unique(&mut new_conjuncts, rewrite.expr);
        }

        debug!(
            rule = self.name(),
            subqueries = subqueries_per_conjunct.iter().map(Vec::len).sum::<usize>(),
            "rewrote filter subqueries"
        );

        let hide_mark_slots = new_conjuncts.iter().any(Expr::contains_mark_join_slot);
        let visible: Vec<Expr> = child
            .output_columns()
            .into_iter()
            .filter(|c| !mark_columns.contains(c))
            .map(Expr::Column)
            .collect();

        let new_filter = child.filter_conjuncts(new_conjuncts);
        if hide_mark_slots {
            Ok(Some(new_filter.project(visible)?))
        } else {
            Ok(Some(new_filter))
        }
    }
}

fn push_unique(conjuncts: &mut Vec<Expr>, conjunct: Expr) {
    if !conjuncts.contains(&conjunct) {
        conjuncts.push(conjunct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{
        AggregateFunction, LogicalPlanBuilder, PlanSchema, ScalarValue, SchemaField, Subquery,
        UnaryOp,
    };
    use arrow::datatypes::DataType;

    fn scan(table: &str) -> LogicalPlanBuilder {
        LogicalPlanBuilder::scan(
            table,
            PlanSchema::new(vec![
                SchemaField::new("k", DataType::Int64).with_relation(table),
                SchemaField::new("v", DataType::Int64).with_relation(table),
            ]),
        )
    }

    fn correlated_s(ctx: &mut StatementContext) -> Subquery {
        let body = scan("s")
            .filter(Expr::qualified_column("s", "k").eq(Expr::qualified_column("t", "k")))
            .build();
        Subquery::new(ctx.next_subquery_id(), body, vec![Column::new_qualified("t", "k")])
    }

    #[test]
    fn test_no_subquery_is_noop() {
        let mut ctx = StatementContext::new();
        let plan = scan("t")
            .filter(Expr::qualified_column("t", "v").gt(Expr::literal(ScalarValue::Int64(1))))
            .build();

        let result = FilterSubqueryToApply.try_rewrite(&plan, &mut ctx).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_plain_exists_keeps_filter_shape() {
        let mut ctx = StatementContext::new();
        let subquery = correlated_s(&mut ctx);
        let plan = scan("t")
            .filter(
                Expr::exists(subquery)
                    .and(Expr::qualified_column("t", "v").gt(Expr::literal(ScalarValue::Int64(1)))),
            )
            .build();

        let result = FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Filter(filter) = &result else {
            panic!("Expected Filter, got {:?}", result);
        };
        assert_eq!(filter.conjuncts[0], Expr::boolean(true));
        assert_eq!(filter.conjuncts.len(), 2);
        let LogicalPlan::Project(project) = filter.input.as_ref() else {
            panic!("Expected Project, got {:?}", filter.input);
        };
        assert!(matches!(project.input.as_ref(), LogicalPlan::Apply(_)));
    }

    #[test]
    fn test_mark_slots_hidden_from_output() {
        let mut ctx = StatementContext::new();
        let subquery = correlated_s(&mut ctx);
        let plan = scan("t")
            .filter(
                Expr::exists(subquery)
                    .or(Expr::qualified_column("t", "v").eq(Expr::literal(ScalarValue::Int64(1)))),
            )
            .build();

        let result = FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Project(project) = &result else {
            panic!("Expected Project, got {:?}", result);
        };
        assert_eq!(
            result.output_columns(),
            vec![Column::new_qualified("t", "k"), Column::new_qualified("t", "v")]
        );
        let LogicalPlan::Filter(filter) = project.input.as_ref() else {
            panic!("Expected Filter, got {:?}", project.input);
        };
        assert!(filter.conjuncts[0].contains_mark_join_slot());
    }

    #[test]
    fn test_conjuncts_chain_in_order() {
        let mut ctx = StatementContext::new();
        let first = correlated_s(&mut ctx);
        let first_id = first.id;
        let max_body = scan("s")
            .aggregate(
                vec![],
                vec![Expr::Aggregate {
                    func: AggregateFunction::Max,
                    args: vec![Expr::qualified_column("s", "v")],
                    distinct: false,
                }
                .alias("max_v")],
            )
            .unwrap()
            .build();
        let second = Subquery::new(ctx.next_subquery_id(), max_body, vec![]);
        let second_id = second.id;

        let plan = scan("t")
            .build()
            .filter_conjuncts(vec![
                Expr::qualified_column("t", "k").in_subquery(first),
                Expr::qualified_column("t", "v").gt(Expr::scalar_subquery(second)),
            ]);

        let result = FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Filter(filter) = &result else {
            panic!("Expected Filter, got {:?}", result);
        };
        assert_eq!(
            filter.conjuncts[1],
            Expr::qualified_column("t", "v").gt(Expr::column("$c$1"))
        );

        // outer Apply is the second conjunct's, its left input the first's
        let LogicalPlan::Project(outer) = filter.input.as_ref() else {
            panic!("Expected Project, got {:?}", filter.input);
        };
        let LogicalPlan::Apply(outer_apply) = outer.input.as_ref() else {
            panic!("Expected Apply, got {:?}", outer.input);
        };
        assert_eq!(outer_apply.subquery.id(), second_id);
        let LogicalPlan::Project(inner) = outer_apply.left.as_ref() else {
            panic!("Expected Project, got {:?}", outer_apply.left);
        };
        let LogicalPlan::Apply(inner_apply) = inner.input.as_ref() else {
            panic!("Expected Apply, got {:?}", inner.input);
        };
        assert_eq!(inner_apply.subquery.id(), first_id);
    }

    #[test]
    fn test_repeated_exists_reads_one_produced_slot() {
        let mut ctx = StatementContext::new();
        let exists = Expr::exists(correlated_s(&mut ctx));
        let plan = scan("t")
            .filter(
                exists
                    .clone()
                    .or(Expr::qualified_column("t", "v").eq(Expr::literal(ScalarValue::Int64(1))))
                    .or(exists),
            )
            .build();

        let result = FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Project(project) = &result else {
            panic!("Expected Project, got {:?}", result);
        };
        let LogicalPlan::Filter(filter) = project.input.as_ref() else {
            panic!("Expected Filter, got {:?}", project.input);
        };

        let produced = filter.input.output_columns();
        let mut read = Vec::new();
        for conjunct in &filter.conjuncts {
            conjunct.collect(&|e| matches!(e, Expr::MarkJoinSlot(_)), &mut read);
        }
        assert_eq!(read.len(), 2);
        for slot in read {
            let Expr::MarkJoinSlot(slot) = slot else {
                unreachable!()
            };
            assert!(produced.contains(&slot.column()), "{} is not produced", slot);
        }
    }

    #[test]
    fn test_negated_or_still_hides_mark_slot() {
        let mut ctx = StatementContext::new();
        let subquery = correlated_s(&mut ctx);
        let negated = Expr::UnaryExpr {
            op: UnaryOp::Not,
            expr: Box::new(
                Expr::exists(subquery)
                    .or(Expr::qualified_column("t", "v").eq(Expr::literal(ScalarValue::Int64(1)))),
            ),
        };
        let plan = scan("t").filter(negated).build();

        let result = FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .unwrap();
        let LogicalPlan::Project(project) = &result else {
            panic!("Expected Project, got {:?}", result);
        };
        assert_eq!(
            result.output_columns(),
            vec![Column::new_qualified("t", "k"), Column::new_qualified("t", "v")]
        );
        let LogicalPlan::Filter(filter) = project.input.as_ref() else {
            panic!("Expected Filter, got {:?}", project.input);
        };
        assert!(matches!(
            &filter.conjuncts[0],
            Expr::UnaryExpr { op: UnaryOp::Not, expr } if expr.contains_mark_join_slot()
        ));
    }

    #[test]
    fn test_scalar_without_output_column_is_left_alone() {
        let mut ctx = StatementContext::new();
        let empty = Subquery::new(
            ctx.next_subquery_id(),
            LogicalPlan::one_row(vec![]).unwrap(),
            vec![],
        );
        let plan = scan("t")
            .filter(Expr::qualified_column("t", "v").gt(Expr::scalar_subquery(empty)))
            .build();

        assert!(FilterSubqueryToApply
            .try_rewrite(&plan, &mut ctx)
            .unwrap()
            .is_none());
        assert_eq!(ctx.analyzed_count(), 0);
    }
}
