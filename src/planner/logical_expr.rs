//! Logical expression types

use crate::error::{QueryError, Result};
use crate::planner::schema::{Column, PlanSchema, SchemaField};
use crate::planner::LogicalPlan;
use arrow::datatypes::DataType as ArrowDataType;
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Scalar value for literals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
}

impl ScalarValue {
    pub fn data_type(&self) -> ArrowDataType {
        match self {
            ScalarValue::Null => ArrowDataType::Null,
            ScalarValue::Boolean(_) => ArrowDataType::Boolean,
            ScalarValue::Int32(_) => ArrowDataType::Int32,
            ScalarValue::Int64(_) => ArrowDataType::Int64,
            ScalarValue::Float64(_) => ArrowDataType::Float64,
            ScalarValue::Utf8(_) => ArrowDataType::Utf8,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Like => write!(f, "LIKE"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::IsNull => write!(f, "IS NULL"),
            UnaryOp::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Aggregate function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort expression
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl SortExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }
}

/// Identity of one subquery expression instance within a statement.
///
/// Issued by [`crate::optimizer::StatementContext::next_subquery_id`]; two
/// subquery expressions with equal ids are the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubqueryId(pub u64);

impl fmt::Display for SubqueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The body of a subquery expression
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub id: SubqueryId,
    /// Inner relational plan
    pub plan: Arc<LogicalPlan>,
    /// Outer columns referenced by the inner plan
    pub correlated_columns: Vec<Column>,
}

impl Subquery {
    pub fn new(id: SubqueryId, plan: LogicalPlan, correlated_columns: Vec<Column>) -> Self {
        Self {
            id,
            plan: Arc::new(plan),
            correlated_columns,
        }
    }

    /// First output column of the inner plan
    pub fn output_field(&self) -> Option<SchemaField> {
        self.plan.schema().fields().first().cloned()
    }
}

/// Subquery expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum SubqueryExpr {
    /// `(SELECT ...)` used as a value
    Scalar(Subquery),
    /// `[NOT] EXISTS (SELECT ...)`
    Exists { subquery: Subquery, negated: bool },
    /// `expr [NOT] IN (SELECT ...)`
    In {
        expr: Box<Expr>,
        subquery: Subquery,
        negated: bool,
    },
    /// Subquery used as an in-list collection; decorrelated elsewhere
    List(Subquery),
}

impl SubqueryExpr {
    pub fn subquery(&self) -> &Subquery {
        match self {
            SubqueryExpr::Scalar(subquery)
            | SubqueryExpr::Exists { subquery, .. }
            | SubqueryExpr::In { subquery, .. }
            | SubqueryExpr::List(subquery) => subquery,
        }
    }

    pub fn id(&self) -> SubqueryId {
        self.subquery().id
    }

    pub fn plan(&self) -> &Arc<LogicalPlan> {
        &self.subquery().plan
    }

    pub fn correlated_columns(&self) -> &[Column] {
        &self.subquery().correlated_columns
    }
}

impl fmt::Display for SubqueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubqueryExpr::Scalar(s) => write!(f, "(scalar subquery{})", s.id),
            SubqueryExpr::Exists { subquery, negated } => {
                let not_str = if *negated { "NOT " } else { "" };
                write!(f, "{}EXISTS(subquery{})", not_str, subquery.id)
            }
            SubqueryExpr::In {
                expr,
                subquery,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN (subquery{})", expr, not_str, subquery.id)
            }
            SubqueryExpr::List(s) => write!(f, "(list query{})", s.id),
        }
    }
}

/// Synthetic boolean column holding the true/false/unknown result of a
/// decorrelated `EXISTS` or `IN` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkJoinSlot {
    pub name: String,
    /// The subquery body is a global aggregate, so it always yields one row
    /// and a missing match must still read as TRUE.
    pub existence_from_aggregate: bool,
}

impl MarkJoinSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            existence_from_aggregate: false,
        }
    }

    pub fn with_existence_from_aggregate(mut self, value: bool) -> Self {
        self.existence_from_aggregate = value;
        self
    }

    pub fn column(&self) -> Column {
        Column::new(self.name.clone())
    }

    pub fn to_field(&self) -> SchemaField {
        SchemaField::new(self.name.clone(), ArrowDataType::Boolean)
    }
}

impl fmt::Display for MarkJoinSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.existence_from_aggregate {
            write!(f, "{}[agg]", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Logical expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(Column),

    /// Literal value
    Literal(ScalarValue),

    /// Binary operation
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryExpr { op: UnaryOp, expr: Box<Expr> },

    /// Aggregate function
    Aggregate {
        func: AggregateFunction,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CAST expression
    Cast {
        expr: Box<Expr>,
        data_type: ArrowDataType,
    },

    /// CASE expression
    Case {
        operand: Option<Box<Expr>>,
        when_then: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },

    /// IN over a literal list
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    /// Subquery expression
    Subquery(SubqueryExpr),

    /// Reference to a mark-join slot produced by an Apply
    MarkJoinSlot(MarkJoinSlot),

    /// Alias
    Alias { expr: Box<Expr>, name: String },
}

impl Expr {
    /// Create a column reference
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(Column::new(name))
    }

    /// Create a qualified column reference
    pub fn qualified_column(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(Column::new_qualified(relation, name))
    }

    /// Create a literal
    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(ScalarValue::Boolean(value))
    }

    /// Create an alias
    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn scalar_subquery(subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::Scalar(subquery))
    }

    pub fn exists(subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::Exists {
            subquery,
            negated: false,
        })
    }

    pub fn not_exists(subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::Exists {
            subquery,
            negated: true,
        })
    }

    pub fn in_subquery(self, subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::In {
            expr: Box::new(self),
            subquery,
            negated: false,
        })
    }

    pub fn not_in_subquery(self, subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::In {
            expr: Box::new(self),
            subquery,
            negated: true,
        })
    }

    pub fn list_query(subquery: Subquery) -> Self {
        Expr::Subquery(SubqueryExpr::List(subquery))
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Self {
        Expr::BinaryExpr {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    /// Binary operation helpers
    pub fn eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn add(self, other: Expr) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    /// Direct expression children. Subquery bodies are plans, not children;
    /// only the compare expression of an IN subquery is.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::MarkJoinSlot(_) => vec![],
            Expr::BinaryExpr { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryExpr { expr, .. } | Expr::Cast { expr, .. } | Expr::Alias { expr, .. } => {
                vec![expr.as_ref()]
            }
            Expr::Aggregate { args, .. } => args.iter().collect(),
            Expr::Case {
                operand,
                when_then,
                else_expr,
            } => {
                let mut children: Vec<&Expr> = Vec::new();
                if let Some(op) = operand {
                    children.push(op);
                }
                for (when, then) in when_then {
                    children.push(when);
                    children.push(then);
                }
                if let Some(e) = else_expr {
                    children.push(e);
                }
                children
            }
            Expr::InList { expr, list, .. } => {
                let mut children: Vec<&Expr> = vec![expr.as_ref()];
                children.extend(list.iter());
                children
            }
            Expr::Subquery(SubqueryExpr::In { expr, .. }) => vec![expr.as_ref()],
            Expr::Subquery(_) => vec![],
        }
    }

    /// Pre-order search over the expression tree
    pub fn any_match(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any_match(pred))
    }

    /// Pre-order, left-to-right collection of matching nodes
    pub fn collect<'a>(&'a self, pred: &impl Fn(&Expr) -> bool, out: &mut Vec<&'a Expr>) {
        if pred(self) {
            out.push(self);
        }
        for child in self.children() {
            child.collect(pred, out);
        }
    }

    /// Check if expression contains a subquery of any kind
    pub fn contains_subquery(&self) -> bool {
        self.any_match(&|e| matches!(e, Expr::Subquery(_)))
    }

    pub fn contains_mark_join_slot(&self) -> bool {
        self.any_match(&|e| matches!(e, Expr::MarkJoinSlot(_)))
    }

    /// Check if expression references the given column anywhere
    pub fn references_column(&self, column: &Column) -> bool {
        self.any_match(&|e| matches!(e, Expr::Column(c) if c == column))
    }

    /// Columns this expression reads, excluding anything inside subquery
    /// bodies. Mark-join slots count as columns.
    pub fn input_columns(&self) -> HashSet<Column> {
        let mut nodes = Vec::new();
        self.collect(
            &|e| matches!(e, Expr::Column(_) | Expr::MarkJoinSlot(_)),
            &mut nodes,
        );
        nodes
            .into_iter()
            .filter_map(|e| match e {
                Expr::Column(c) => Some(c.clone()),
                Expr::MarkJoinSlot(slot) => Some(slot.column()),
                _ => None,
            })
            .collect()
    }

    /// Get the output name for this expression
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(col) => col.name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::MarkJoinSlot(slot) => slot.name.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::BinaryExpr { left, op, right } => {
                format!("{} {} {}", left.output_name(), op, right.output_name())
            }
            Expr::UnaryExpr { op, expr } => format!("{} {}", op, expr.output_name()),
            Expr::Aggregate { func, args, .. } => {
                let arg_names: Vec<_> = args.iter().map(|a| a.output_name()).collect();
                format!("{}({})", func, arg_names.join(", "))
            }
            Expr::Cast { expr, data_type } => {
                format!("CAST({} AS {:?})", expr.output_name(), data_type)
            }
            Expr::Case { .. } => "CASE".to_string(),
            Expr::InList { expr, .. } => format!("{} IN (...)", expr.output_name()),
            Expr::Subquery(s) => s.to_string(),
        }
    }

    /// Infer the data type of this expression given an input schema
    pub fn data_type(&self, schema: &PlanSchema) -> Result<ArrowDataType> {
        match self {
            Expr::Column(col) => schema
                .resolve_column(col)
                .map(|(_, field)| field.data_type.clone())
                .ok_or_else(|| QueryError::ColumnNotFound(col.qualified_name())),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::MarkJoinSlot(_) => Ok(ArrowDataType::Boolean),
            Expr::BinaryExpr { left, op, right } => match op {
                BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Like => Ok(ArrowDataType::Boolean),
                BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
                    let left_type = left.data_type(schema)?;
                    let right_type = right.data_type(schema)?;
                    Ok(coerce_numeric_types(&left_type, &right_type))
                }
            },
            Expr::UnaryExpr { op, expr } => match op {
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(ArrowDataType::Boolean),
                UnaryOp::Negate => expr.data_type(schema),
            },
            Expr::Aggregate { func, args, .. } => match func {
                AggregateFunction::Count => Ok(ArrowDataType::Int64),
                AggregateFunction::Avg => Ok(ArrowDataType::Float64),
                AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => args
                    .first()
                    .map(|a| a.data_type(schema))
                    .unwrap_or(Ok(ArrowDataType::Null)),
            },
            Expr::Cast { data_type, .. } => Ok(data_type.clone()),
            Expr::Case {
                when_then,
                else_expr,
                ..
            } => {
                if let Some((_, then_expr)) = when_then.first() {
                    then_expr.data_type(schema)
                } else if let Some(else_expr) = else_expr {
                    else_expr.data_type(schema)
                } else {
                    Ok(ArrowDataType::Null)
                }
            }
            Expr::InList { .. } => Ok(ArrowDataType::Boolean),
            Expr::Subquery(SubqueryExpr::Scalar(subquery)) => subquery
                .output_field()
                .map(|f| f.data_type)
                .ok_or_else(|| {
                    QueryError::Type(format!("scalar subquery{} has no output", subquery.id))
                }),
            Expr::Subquery(_) => Ok(ArrowDataType::Boolean),
            Expr::Alias { expr, .. } => expr.data_type(schema),
        }
    }

    /// Create schema field for this expression. Column references keep their
    /// qualifier so the field still resolves as the same column downstream.
    pub fn to_field(&self, schema: &PlanSchema) -> Result<SchemaField> {
        match self {
            Expr::Column(col) => schema
                .resolve_column(col)
                .map(|(_, field)| field.clone())
                .ok_or_else(|| QueryError::ColumnNotFound(col.qualified_name())),
            Expr::MarkJoinSlot(slot) => Ok(slot.to_field()),
            _ => Ok(SchemaField::new(self.output_name(), self.data_type(schema)?)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryExpr { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryExpr { op, expr } => write!(f, "({} {})", op, expr),
            Expr::Aggregate {
                func,
                args,
                distinct,
            } => {
                let distinct_str = if *distinct { "DISTINCT " } else { "" };
                let args_str: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({}{})", func, distinct_str, args_str.join(", "))
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {:?})", expr, data_type),
            Expr::Case {
                operand,
                when_then,
                else_expr,
            } => {
                write!(f, "CASE ")?;
                if let Some(op) = operand {
                    write!(f, "{} ", op)?;
                }
                for (when, then) in when_then {
                    write!(f, "WHEN {} THEN {} ", when, then)?;
                }
                if let Some(else_e) = else_expr {
                    write!(f, "ELSE {} ", else_e)?;
                }
                write!(f, "END")
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let list_str: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "{} {}IN ({})", expr, not_str, list_str.join(", "))
            }
            Expr::Subquery(s) => write!(f, "{}", s),
            Expr::MarkJoinSlot(slot) => write!(f, "{}", slot),
            Expr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
        }
    }
}

/// Split a predicate into its top-level AND conjuncts
pub fn split_conjunction(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryExpr {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut conjuncts = split_conjunction(left);
            conjuncts.extend(split_conjunction(right));
            conjuncts
        }
        other => vec![other.clone()],
    }
}

/// Combine conjuncts with AND
pub fn conjunction(conjuncts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    conjuncts.into_iter().reduce(|acc, p| acc.and(p))
}

/// Coerce numeric types for binary operations
fn coerce_numeric_types(left: &ArrowDataType, right: &ArrowDataType) -> ArrowDataType {
    use ArrowDataType::*;

    match (left, right) {
        (Float64, _) | (_, Float64) => Float64,
        (Int64, _) | (_, Int64) => Int64,
        (Int32, _) | (_, Int32) => Int64,
        _ => Float64,
    }
}
