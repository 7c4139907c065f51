//! Replace subquery occurrences inside one conjunct or projection item.
//!
//! ```text
//! filter(t1.a = scalar_subquery)   ->  filter(t1.a = $c$N)
//! filter(t1.a IN (SELECT ...))     ->  filter(<mark slot>) or filter(TRUE)
//! filter(EXISTS (SELECT ...))      ->  filter(<mark slot>) or filter(TRUE)
//! ```
//!
//! `EXISTS`/`IN` fold to `TRUE` only while the Apply node alone can enforce
//! them. Under an `OR`, or when the caller needs the value itself, they read
//! a mark-join slot carrying the true/false/unknown result instead.
//!
//! Each subquery instance gets one generated name, however often it occurs
//! in the item. Scalar values are named too, since two unaliased bodies can
//! share an output name.

use super::classify::has_top_level_agg_without_group_by;
use crate::optimizer::StatementContext;
use crate::planner::{BinaryOp, Column, Expr, MarkJoinSlot, SubqueryExpr, SubqueryId};
use std::collections::HashMap;

/// Mark slot assigned to each subquery of one item; `None` until one is needed
pub type MarkSlotMap = HashMap<SubqueryId, Option<MarkJoinSlot>>;

/// Result of rewriting one conjunct or projection item
#[derive(Debug, Clone)]
pub struct SubqueryRewrite {
    pub expr: Expr,
    pub mark_slots: MarkSlotMap,
    pub scalar_outputs: HashMap<SubqueryId, Column>,
}

impl SubqueryRewrite {
    pub fn mark_slot(&self, id: SubqueryId) -> Option<&MarkJoinSlot> {
        self.mark_slots.get(&id).and_then(Option::as_ref)
    }

    /// Column the rewritten item reads a scalar subquery's value from
    pub fn scalar_output(&self, id: SubqueryId) -> Option<&Column> {
        self.scalar_outputs.get(&id)
    }
}

/// Accumulator threaded through one item's traversal
struct ReplaceState {
    mark_slots: MarkSlotMap,
    scalar_outputs: HashMap<SubqueryId, Column>,
    /// Set once an OR over a subquery is seen; stays set for the item
    is_mark_join: bool,
    /// Project and join contexts always want the predicate's value
    always_mark: bool,
}

impl ReplaceState {
    fn needs_mark_slot(&self) -> bool {
        self.is_mark_join || self.always_mark
    }
}

/// Rewrite `expr`, replacing each subquery in `subqueries`.
pub fn replace_subqueries(
    expr: &Expr,
    subqueries: &[SubqueryExpr],
    always_mark: bool,
    ctx: &mut StatementContext,
) -> SubqueryRewrite {
    let mut state = ReplaceState {
        mark_slots: subqueries.iter().map(|s| (s.id(), None)).collect(),
        scalar_outputs: HashMap::new(),
        is_mark_join: false,
        always_mark,
    };
    let expr = replace(expr, &mut state, ctx);
    SubqueryRewrite {
        expr,
        mark_slots: state.mark_slots,
        scalar_outputs: state.scalar_outputs,
    }
}

fn replace(expr: &Expr, state: &mut ReplaceState, ctx: &mut StatementContext) -> Expr {
    match expr {
        Expr::BinaryExpr { left, op, right } => {
            if *op == BinaryOp::Or && (left.contains_subquery() || right.contains_subquery()) {
                state.is_mark_join = true;
            }
            let left = replace(left, state, ctx);
            let right = replace(right, state, ctx);
            Expr::BinaryExpr {
                left: Box::new(left),
                op: *op,
                right: Box::new(right),
            }
        }
        Expr::Subquery(subquery) => replace_subquery(expr, subquery, state, ctx),
        Expr::UnaryExpr { op, expr } => Expr::UnaryExpr {
            op: *op,
            expr: Box::new(replace(expr, state, ctx)),
        },
        Expr::Aggregate {
            func,
            args,
            distinct,
        } => Expr::Aggregate {
            func: *func,
            args: args.iter().map(|a| replace(a, state, ctx)).collect(),
            distinct: *distinct,
        },
        Expr::Cast { expr, data_type } => Expr::Cast {
            expr: Box::new(replace(expr, state, ctx)),
            data_type: data_type.clone(),
        },
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => Expr::Case {
            operand: operand.as_ref().map(|o| Box::new(replace(o, state, ctx))),
            when_then: when_then
                .iter()
                .map(|(w, t)| (replace(w, state, ctx), replace(t, state, ctx)))
                .collect(),
            else_expr: else_expr.as_ref().map(|e| Box::new(replace(e, state, ctx))),
        },
        Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(replace(expr, state, ctx)),
            list: list.iter().map(|e| replace(e, state, ctx)).collect(),
            negated: *negated,
        },
        Expr::Alias { expr, name } => Expr::Alias {
            expr: Box::new(replace(expr, state, ctx)),
            name: name.clone(),
        },
        Expr::Column(_) | Expr::Literal(_) | Expr::MarkJoinSlot(_) => expr.clone(),
    }
}

fn replace_subquery(
    original: &Expr,
    subquery: &SubqueryExpr,
    state: &mut ReplaceState,
    ctx: &mut StatementContext,
) -> Expr {
    match subquery {
        SubqueryExpr::Exists { subquery: body, .. } | SubqueryExpr::In { subquery: body, .. } => {
            if let Some(Some(slot)) = state.mark_slots.get(&body.id) {
                return Expr::MarkJoinSlot(slot.clone());
            }
            if !state.needs_mark_slot() {
                return Expr::boolean(true);
            }
            // A global aggregate always returns a row, so EXISTS over it is
            // TRUE even when nothing matched.
            let from_aggregate = matches!(subquery, SubqueryExpr::Exists { .. })
                && has_top_level_agg_without_group_by(&body.plan);
            let slot = MarkJoinSlot::new(ctx.generate_column_name())
                .with_existence_from_aggregate(from_aggregate);
            state.mark_slots.insert(body.id, Some(slot.clone()));
            Expr::MarkJoinSlot(slot)
        }
        SubqueryExpr::Scalar(body) => {
            if let Some(column) = state.scalar_outputs.get(&body.id) {
                return Expr::Column(column.clone());
            }
            if body.output_field().is_none() {
                return original.clone();
            }
            let column = Column::new(ctx.generate_column_name());
            state.scalar_outputs.insert(body.id, column.clone());
            Expr::Column(column)
        }
        SubqueryExpr::List(_) => original.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::rules::subquery_to_apply::classify::collect_eligible_subqueries;
    use crate::planner::{
        AggregateFunction, Column, LogicalPlanBuilder, PlanSchema, ScalarValue, SchemaField,
        Subquery,
    };
    use arrow::datatypes::DataType;

    fn scan_s() -> LogicalPlanBuilder {
        LogicalPlanBuilder::scan(
            "s",
            PlanSchema::new(vec![
                SchemaField::new("k", DataType::Int64).with_relation("s"),
                SchemaField::new("v", DataType::Int64).with_relation("s"),
            ]),
        )
    }

    fn rewrite(expr: &Expr, always_mark: bool, ctx: &mut StatementContext) -> SubqueryRewrite {
        let subqueries = collect_eligible_subqueries(expr);
        replace_subqueries(expr, &subqueries, always_mark, ctx)
    }

    fn int(v: i64) -> Expr {
        Expr::literal(ScalarValue::Int64(v))
    }

    #[test]
    fn test_plain_exists_folds_to_true() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let expr = Expr::exists(Subquery::new(id, scan_s().build(), vec![]));

        let result = rewrite(&expr, false, &mut ctx);
        assert_eq!(result.expr, Expr::boolean(true));
        assert_eq!(result.mark_slots.get(&id), Some(&None));
    }

    #[test]
    fn test_or_forces_mark_slot() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let expr = Expr::exists(Subquery::new(id, scan_s().build(), vec![]))
            .or(Expr::qualified_column("t", "x").eq(int(1)));

        let result = rewrite(&expr, false, &mut ctx);
        let slot = result.mark_slot(id).cloned().unwrap();
        assert_eq!(slot.name, "$c$1");
        assert!(!slot.existence_from_aggregate);
        assert_eq!(
            result.expr,
            Expr::MarkJoinSlot(slot).or(Expr::qualified_column("t", "x").eq(int(1)))
        );
    }

    #[test]
    fn test_mark_flag_is_sticky_within_item() {
        let mut ctx = StatementContext::new();
        let a = ctx.next_subquery_id();
        let b = ctx.next_subquery_id();
        // (EXISTS a OR x) AND EXISTS b: the OR is seen first, so b also gets a slot
        let expr = Expr::exists(Subquery::new(a, scan_s().build(), vec![]))
            .or(Expr::column("x"))
            .and(Expr::column("y").in_subquery(Subquery::new(b, scan_s().build(), vec![])));

        let result = rewrite(&expr, false, &mut ctx);
        assert!(result.mark_slot(a).is_some());
        assert!(result.mark_slot(b).is_some());
        assert!(!result.expr.contains_subquery());
    }

    #[test]
    fn test_exists_over_global_aggregate_flags_slot() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let body = scan_s()
            .aggregate(
                vec![],
                vec![Expr::Aggregate {
                    func: AggregateFunction::Sum,
                    args: vec![Expr::qualified_column("s", "v")],
                    distinct: false,
                }],
            )
            .unwrap()
            .build();
        let expr = Expr::exists(Subquery::new(id, body, vec![]));

        let result = rewrite(&expr, true, &mut ctx);
        assert!(result.mark_slot(id).unwrap().existence_from_aggregate);
    }

    #[test]
    fn test_scalar_subquery_becomes_output_column() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let body = scan_s()
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
        let expr = Expr::scalar_subquery(Subquery::new(id, body, vec![])).gt(int(5));

        let result = rewrite(&expr, true, &mut ctx);
        assert_eq!(result.expr, Expr::Column(Column::new("$c$1")).gt(int(5)));
        assert_eq!(result.scalar_output(id), Some(&Column::new("$c$1")));
        assert_eq!(result.mark_slots.get(&id), Some(&None));
    }

    #[test]
    fn test_scalars_with_same_output_name_get_distinct_columns() {
        let mut ctx = StatementContext::new();
        let max_v = || {
            scan_s()
                .aggregate(
                    vec![],
                    vec![Expr::Aggregate {
                        func: AggregateFunction::Max,
                        args: vec![Expr::qualified_column("s", "v")],
                        distinct: false,
                    }],
                )
                .unwrap()
                .build()
        };
        let first = Subquery::new(ctx.next_subquery_id(), max_v(), vec![]);
        let second = Subquery::new(ctx.next_subquery_id(), max_v(), vec![]);
        let (first_id, second_id) = (first.id, second.id);
        let expr = Expr::scalar_subquery(first).add(Expr::scalar_subquery(second));

        let result = rewrite(&expr, true, &mut ctx);
        assert_eq!(result.expr, Expr::column("$c$1").add(Expr::column("$c$2")));
        assert_ne!(result.scalar_output(first_id), result.scalar_output(second_id));
    }

    #[test]
    fn test_repeated_instance_reuses_its_name() {
        let mut ctx = StatementContext::new();
        let id = ctx.next_subquery_id();
        let exists = Expr::exists(Subquery::new(id, scan_s().build(), vec![]));
        let expr = exists
            .clone()
            .or(Expr::qualified_column("t", "v").eq(int(1)))
            .or(exists);

        let result = rewrite(&expr, false, &mut ctx);
        let slot = result.mark_slot(id).cloned().unwrap();
        assert_eq!(
            result.expr,
            Expr::MarkJoinSlot(slot.clone())
                .or(Expr::qualified_column("t", "v").eq(int(1)))
                .or(Expr::MarkJoinSlot(slot))
        );
        assert_eq!(ctx.generate_column_name(), "$c$2");
    }
}
