//! Canned plans exercising each decorrelation rule
//!
//! Tables `t`, `s`, `l` and `r` share the schema `(k BIGINT, v BIGINT)`.

use crate::error::Result;
use crate::optimizer::StatementContext;
use crate::planner::{
    AggregateFunction, Column, Expr, JoinType, LogicalPlan, LogicalPlanBuilder, PlanSchema,
    ScalarValue, SchemaField, Subquery,
};
use arrow::datatypes::DataType;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// `WHERE EXISTS (SELECT * FROM s WHERE s.k = t.k) OR t.v = 1`
    ExistsOr,
    /// `WHERE t.v > (SELECT MAX(s.v) FROM s WHERE s.k = t.k)`
    ScalarCompare,
    /// `WHERE t.k IN (SELECT s.k FROM s) AND NOT EXISTS (...)`
    InSubquery,
    /// `SELECT t.k, (SELECT MAX ...) + (SELECT MIN ...) FROM t`
    ProjectMulti,
    /// `SELECT EXISTS (SELECT * FROM s)`
    OneRow,
    /// `l JOIN r ON l.v > (SELECT SUM(s.v) FROM s WHERE s.k = l.k)`
    JoinCorrelated,
    /// `l JOIN r ON l.v > (SELECT SUM(s.v) FROM s WHERE s.k = r.k)`
    JoinCrossSide,
}

impl Scenario {
    pub const ALL: [Scenario; 7] = [
        Scenario::ExistsOr,
        Scenario::ScalarCompare,
        Scenario::InSubquery,
        Scenario::ProjectMulti,
        Scenario::OneRow,
        Scenario::JoinCorrelated,
        Scenario::JoinCrossSide,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::ExistsOr => "exists-or",
            Scenario::ScalarCompare => "scalar-compare",
            Scenario::InSubquery => "in-subquery",
            Scenario::ProjectMulti => "project-multi",
            Scenario::OneRow => "one-row",
            Scenario::JoinCorrelated => "join-correlated",
            Scenario::JoinCrossSide => "join-cross-side",
        }
    }

    /// Build the plan, drawing subquery ids from `ctx`
    pub fn build(&self, ctx: &mut StatementContext) -> Result<LogicalPlan> {
        match self {
            Scenario::ExistsOr => {
                let exists = Expr::exists(correlated(ctx, "s", "t"));
                Ok(scan("t")
                    .filter(exists.or(Expr::qualified_column("t", "v").eq(int(1))))
                    .build())
            }
            Scenario::ScalarCompare => {
                let max = aggregate_of(ctx, AggregateFunction::Max, "s", Some("t"), "max_v")?;
                Ok(scan("t")
                    .filter(Expr::qualified_column("t", "v").gt(Expr::scalar_subquery(max)))
                    .build())
            }
            Scenario::InSubquery => {
                let keys = Subquery::new(
                    ctx.next_subquery_id(),
                    scan("s")
                        .project(vec![Expr::qualified_column("s", "k")])?
                        .build(),
                    vec![],
                );
                let in_keys = Expr::qualified_column("t", "k").in_subquery(keys);
                let missing = Expr::not_exists(correlated(ctx, "r", "t"));
                Ok(scan("t").filter(in_keys.and(missing)).build())
            }
            Scenario::ProjectMulti => {
                let max = aggregate_of(ctx, AggregateFunction::Max, "s", Some("t"), "max_v")?;
                let min = aggregate_of(ctx, AggregateFunction::Min, "s", Some("t"), "min_v")?;
                Ok(scan("t")
                    .project(vec![
                        Expr::qualified_column("t", "k"),
                        Expr::scalar_subquery(max)
                            .add(Expr::scalar_subquery(min))
                            .alias("spread"),
                    ])?
                    .build())
            }
            Scenario::OneRow => {
                let any = Subquery::new(ctx.next_subquery_id(), scan("s").build(), vec![]);
                LogicalPlan::one_row(vec![Expr::exists(any).alias("has_s")])
            }
            Scenario::JoinCorrelated => join_on_sum(ctx, "l"),
            Scenario::JoinCrossSide => join_on_sum(ctx, "r"),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Scenario::ALL.iter().map(Scenario::name).collect();
                format!("unknown scenario '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Scan of a `(k, v)` table
pub fn scan(table: &str) -> LogicalPlanBuilder {
    LogicalPlanBuilder::scan(
        table,
        PlanSchema::new(vec![
            SchemaField::new("k", DataType::Int64).with_relation(table),
            SchemaField::new("v", DataType::Int64).with_relation(table),
        ]),
    )
}

fn int(v: i64) -> Expr {
    Expr::literal(ScalarValue::Int64(v))
}

/// `SELECT * FROM inner WHERE inner.k = outer.k`
fn correlated(ctx: &mut StatementContext, inner: &str, outer: &str) -> Subquery {
    let body = scan(inner)
        .filter(Expr::qualified_column(inner, "k").eq(Expr::qualified_column(outer, "k")))
        .build();
    Subquery::new(
        ctx.next_subquery_id(),
        body,
        vec![Column::new_qualified(outer, "k")],
    )
}

/// `SELECT func(inner.v) AS alias FROM inner [WHERE inner.k = outer.k]`
fn aggregate_of(
    ctx: &mut StatementContext,
    func: AggregateFunction,
    inner: &str,
    outer: Option<&str>,
    alias: &str,
) -> Result<Subquery> {
    let mut body = scan(inner);
    let mut correlated_columns = vec![];
    if let Some(outer) = outer {
        body = body
            .filter(Expr::qualified_column(inner, "k").eq(Expr::qualified_column(outer, "k")));
        correlated_columns.push(Column::new_qualified(outer, "k"));
    }
    let body = body
        .aggregate(
            vec![],
            vec![Expr::Aggregate {
                func,
                args: vec![Expr::qualified_column(inner, "v")],
                distinct: false,
            }
            .alias(alias)],
        )?
        .build();
    Ok(Subquery::new(ctx.next_subquery_id(), body, correlated_columns))
}

/// `l JOIN r ON l.v > (SELECT SUM(s.v) FROM s WHERE s.k = <side>.k)`
fn join_on_sum(ctx: &mut StatementContext, side: &str) -> Result<LogicalPlan> {
    let sum = aggregate_of(ctx, AggregateFunction::Sum, "s", Some(side), "sum_v")?;
    Ok(scan("l")
        .join(
            scan("r").build(),
            JoinType::Inner,
            vec![],
            vec![Expr::qualified_column("l", "v").gt(Expr::scalar_subquery(sum))],
        )
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
        }
        assert!("nope".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_every_scenario_builds() {
        for scenario in Scenario::ALL {
            let mut ctx = StatementContext::new();
            assert!(scenario.build(&mut ctx).is_ok(), "{} failed to build", scenario);
        }
    }
}
