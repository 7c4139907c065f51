//! Logical plan types

use crate::error::{QueryError, Result};
use crate::planner::{
    split_conjunction, Column, Expr, MarkJoinSlot, PlanSchema, SchemaField, SortExpr,
    SubqueryExpr,
};
use std::fmt;
use std::sync::Arc;

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Table scan
    Scan(ScanNode),
    /// Filter (WHERE clause)
    Filter(FilterNode),
    /// Projection (SELECT columns)
    Project(ProjectNode),
    /// Join
    Join(JoinNode),
    /// Correlated execution of a subquery per outer binding
    Apply(ApplyNode),
    /// Aggregation (GROUP BY)
    Aggregate(AggregateNode),
    /// Sort (ORDER BY)
    Sort(SortNode),
    /// Single row of literal expressions (SELECT without FROM)
    OneRowRelation(OneRowRelationNode),
}

impl LogicalPlan {
    /// Get the output schema of this plan node
    pub fn schema(&self) -> PlanSchema {
        match self {
            LogicalPlan::Scan(node) => node.schema.clone(),
            LogicalPlan::Filter(node) => node.input.schema(),
            LogicalPlan::Project(node) => node.schema.clone(),
            LogicalPlan::Join(node) => node.schema.clone(),
            LogicalPlan::Apply(node) => node.schema(),
            LogicalPlan::Aggregate(node) => node.schema.clone(),
            LogicalPlan::Sort(node) => node.input.schema(),
            LogicalPlan::OneRowRelation(node) => node.schema.clone(),
        }
    }

    /// Output columns in order
    pub fn output_columns(&self) -> Vec<Column> {
        self.schema().columns()
    }

    /// Get child plans
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan(_) | LogicalPlan::OneRowRelation(_) => vec![],
            LogicalPlan::Filter(node) => vec![&node.input],
            LogicalPlan::Project(node) => vec![&node.input],
            LogicalPlan::Join(node) => vec![&node.left, &node.right],
            LogicalPlan::Apply(node) => vec![&node.left, &node.right],
            LogicalPlan::Aggregate(node) => vec![&node.input],
            LogicalPlan::Sort(node) => vec![&node.input],
        }
    }

    /// Create a new plan with children replaced
    pub fn with_new_children(&self, children: Vec<Arc<LogicalPlan>>) -> Result<Self> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(QueryError::Internal(format!(
                "expected {} children, got {}",
                expected,
                children.len()
            )));
        }
        let mut iter = children.into_iter();
        let mut next = || {
            iter.next()
                .ok_or_else(|| QueryError::Internal("missing child".to_string()))
        };

        let plan = match self {
            LogicalPlan::Scan(node) => LogicalPlan::Scan(node.clone()),
            LogicalPlan::OneRowRelation(node) => LogicalPlan::OneRowRelation(node.clone()),
            LogicalPlan::Filter(node) => LogicalPlan::Filter(FilterNode {
                input: next()?,
                conjuncts: node.conjuncts.clone(),
            }),
            LogicalPlan::Project(node) => LogicalPlan::Project(ProjectNode {
                input: next()?,
                exprs: node.exprs.clone(),
                schema: node.schema.clone(),
            }),
            LogicalPlan::Join(node) => {
                let left = next()?;
                let right = next()?;
                LogicalPlan::Join(JoinNode::new(
                    left,
                    right,
                    node.join_type,
                    node.on.clone(),
                    node.other_conjuncts.clone(),
                ))
            }
            LogicalPlan::Apply(node) => {
                let left = next()?;
                let right = next()?;
                LogicalPlan::Apply(ApplyNode {
                    left,
                    right,
                    ..node.clone()
                })
            }
            LogicalPlan::Aggregate(node) => LogicalPlan::Aggregate(AggregateNode {
                input: next()?,
                group_by: node.group_by.clone(),
                aggregates: node.aggregates.clone(),
                schema: node.schema.clone(),
            }),
            LogicalPlan::Sort(node) => LogicalPlan::Sort(SortNode {
                input: next()?,
                order_by: node.order_by.clone(),
            }),
        };
        Ok(plan)
    }

    /// Builder: add a filter, splitting the predicate into conjuncts
    pub fn filter(self, predicate: Expr) -> Self {
        self.filter_conjuncts(split_conjunction(&predicate))
    }

    pub fn filter_conjuncts(self, conjuncts: Vec<Expr>) -> Self {
        LogicalPlan::Filter(FilterNode {
            input: Arc::new(self),
            conjuncts,
        })
    }

    /// Builder: add a projection
    pub fn project(self, exprs: Vec<Expr>) -> Result<Self> {
        Ok(LogicalPlan::Project(ProjectNode::try_new(
            Arc::new(self),
            exprs,
        )?))
    }

    /// Builder: add a sort
    pub fn sort(self, order_by: Vec<SortExpr>) -> Self {
        LogicalPlan::Sort(SortNode {
            input: Arc::new(self),
            order_by,
        })
    }

    /// A single row with the given expressions as columns
    pub fn one_row(exprs: Vec<Expr>) -> Result<Self> {
        Ok(LogicalPlan::OneRowRelation(OneRowRelationNode::try_new(
            exprs,
        )?))
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

fn join_exprs(exprs: &[Expr], sep: &str) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl LogicalPlan {
    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        match self {
            LogicalPlan::Scan(node) => {
                writeln!(
                    f,
                    "{}Scan: {} [{}]",
                    prefix,
                    node.table_name,
                    node.schema
                        .fields()
                        .iter()
                        .map(|f| f.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )?;
            }
            LogicalPlan::Filter(node) => {
                writeln!(f, "{}Filter: {}", prefix, join_exprs(&node.conjuncts, " AND "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Project(node) => {
                writeln!(f, "{}Project: [{}]", prefix, join_exprs(&node.exprs, ", "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Join(node) => {
                writeln!(f, "{}{} Join", prefix, node.join_type)?;
                if !node.on.is_empty() {
                    let on_str: Vec<String> = node
                        .on
                        .iter()
                        .map(|(l, r)| format!("{} = {}", l, r))
                        .collect();
                    writeln!(f, "{}  on: {}", prefix, on_str.join(" AND "))?;
                }
                if !node.other_conjuncts.is_empty() {
                    writeln!(
                        f,
                        "{}  filter: {}",
                        prefix,
                        join_exprs(&node.other_conjuncts, " AND ")
                    )?;
                }
                node.left.fmt_indent(f, indent + 1)?;
                node.right.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Apply(node) => {
                let correlation: Vec<String> =
                    node.correlation_columns.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "{}Apply: {} correlation=[{}]",
                    prefix,
                    node.subquery,
                    correlation.join(", ")
                )?;
                if let Some(filter) = &node.correlation_filter {
                    write!(f, " filter={}", filter)?;
                }
                if let Some(slot) = &node.mark_join_slot {
                    write!(f, " mark={}", slot)?;
                }
                if node.expose_subquery_output {
                    match &node.output_column {
                        Some(column) => write!(f, " output={}", column)?,
                        None => write!(f, " expose_output")?,
                    }
                }
                if node.in_project {
                    write!(f, " in_project")?;
                }
                writeln!(f)?;
                node.left.fmt_indent(f, indent + 1)?;
                node.right.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Aggregate(node) => {
                writeln!(
                    f,
                    "{}Aggregate: group_by=[{}], aggs=[{}]",
                    prefix,
                    join_exprs(&node.group_by, ", "),
                    join_exprs(&node.aggregates, ", ")
                )?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Sort(node) => {
                let order: Vec<String> = node
                    .order_by
                    .iter()
                    .map(|s| format!("{} {:?}", s.expr, s.direction))
                    .collect();
                writeln!(f, "{}Sort: [{}]", prefix, order.join(", "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::OneRowRelation(node) => {
                writeln!(f, "{}OneRowRelation: [{}]", prefix, join_exprs(&node.exprs, ", "))?;
            }
        }
        Ok(())
    }
}

/// Table scan node
#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub table_name: String,
    pub schema: PlanSchema,
}

/// Filter node; the predicate is the AND of `conjuncts`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub input: Arc<LogicalPlan>,
    pub conjuncts: Vec<Expr>,
}

/// Projection node
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub input: Arc<LogicalPlan>,
    pub exprs: Vec<Expr>,
    pub schema: PlanSchema,
}

impl ProjectNode {
    pub fn try_new(input: Arc<LogicalPlan>, exprs: Vec<Expr>) -> Result<Self> {
        let input_schema = input.schema();
        let fields = exprs
            .iter()
            .map(|e| e.to_field(&input_schema))
            .collect::<Result<Vec<SchemaField>>>()?;

        Ok(Self {
            input,
            exprs,
            schema: PlanSchema::new(fields),
        })
    }
}

/// Join node
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    /// Equi-join ("hash") conditions (left_expr, right_expr)
    pub on: Vec<(Expr, Expr)>,
    /// Remaining join conjuncts
    pub other_conjuncts: Vec<Expr>,
    pub schema: PlanSchema,
}

impl JoinNode {
    pub fn new(
        left: Arc<LogicalPlan>,
        right: Arc<LogicalPlan>,
        join_type: JoinType,
        on: Vec<(Expr, Expr)>,
        other_conjuncts: Vec<Expr>,
    ) -> Self {
        let schema = left.schema().merge(&right.schema());
        Self {
            left,
            right,
            join_type,
            on,
            other_conjuncts,
            schema,
        }
    }
}

/// Apply node: evaluates `right` (the subquery body) once per distinct
/// binding of `correlation_columns` drawn from `left`.
///
/// Output is the left schema, then the mark-join slot if present, then the
/// subquery's first output column if `expose_subquery_output` is set. That
/// column is renamed to `output_column` when one is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyNode {
    pub correlation_columns: Vec<Column>,
    /// The subquery expression this node replaces
    pub subquery: SubqueryExpr,
    pub correlation_filter: Option<Expr>,
    pub mark_join_slot: Option<MarkJoinSlot>,
    /// Surface the scalar subquery's output column to the parent
    pub expose_subquery_output: bool,
    /// Statement-unique name the scalar value is read under
    pub output_column: Option<Column>,
    /// Created for a projection item rather than a predicate
    pub in_project: bool,
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
}

impl ApplyNode {
    pub fn schema(&self) -> PlanSchema {
        let mark = self.mark_join_slot.as_ref().map(MarkJoinSlot::to_field);
        let output = if self.expose_subquery_output {
            self.right.schema().fields().first().map(|field| match &self.output_column {
                Some(column) => SchemaField {
                    name: column.name.clone(),
                    relation: column.relation.clone(),
                    ..field.clone()
                },
                None => field.clone(),
            })
        } else {
            None
        };
        self.left.schema().extend(mark.into_iter().chain(output))
    }
}

/// Aggregate node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub input: Arc<LogicalPlan>,
    pub group_by: Vec<Expr>,
    pub aggregates: Vec<Expr>,
    pub schema: PlanSchema,
}

/// Sort node
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub input: Arc<LogicalPlan>,
    pub order_by: Vec<SortExpr>,
}

/// One-row relation node
#[derive(Debug, Clone, PartialEq)]
pub struct OneRowRelationNode {
    pub exprs: Vec<Expr>,
    pub schema: PlanSchema,
}

impl OneRowRelationNode {
    pub fn try_new(exprs: Vec<Expr>) -> Result<Self> {
        let empty = PlanSchema::empty();
        let fields = exprs
            .iter()
            .map(|e| e.to_field(&empty))
            .collect::<Result<Vec<SchemaField>>>()?;
        Ok(Self {
            exprs,
            schema: PlanSchema::new(fields),
        })
    }
}

/// Builder for creating logical plans
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
}

impl LogicalPlanBuilder {
    pub fn scan(table_name: impl Into<String>, schema: PlanSchema) -> Self {
        Self {
            plan: LogicalPlan::Scan(ScanNode {
                table_name: table_name.into(),
                schema,
            }),
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.plan = self.plan.filter(predicate);
        self
    }

    pub fn project(mut self, exprs: Vec<Expr>) -> Result<Self> {
        self.plan = self.plan.project(exprs)?;
        Ok(self)
    }

    pub fn aggregate(mut self, group_by: Vec<Expr>, aggregates: Vec<Expr>) -> Result<Self> {
        let input = Arc::new(self.plan);
        let input_schema = input.schema();

        let mut fields = Vec::new();
        for expr in &group_by {
            fields.push(expr.to_field(&input_schema)?);
        }
        for expr in &aggregates {
            fields.push(expr.to_field(&input_schema)?);
        }

        self.plan = LogicalPlan::Aggregate(AggregateNode {
            input,
            group_by,
            aggregates,
            schema: PlanSchema::new(fields),
        });
        Ok(self)
    }

    pub fn sort(mut self, order_by: Vec<SortExpr>) -> Self {
        self.plan = self.plan.sort(order_by);
        self
    }

    pub fn join(
        mut self,
        right: LogicalPlan,
        join_type: JoinType,
        on: Vec<(Expr, Expr)>,
        other_conjuncts: Vec<Expr>,
    ) -> Self {
        self.plan = LogicalPlan::Join(JoinNode::new(
            Arc::new(self.plan),
            Arc::new(right),
            join_type,
            on,
            other_conjuncts,
        ));
        self
    }

    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}
