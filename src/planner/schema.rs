//! Schema types for logical plans

use arrow::datatypes::DataType as ArrowDataType;
use std::collections::HashSet;

/// A column reference ("slot")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column {
    /// Optional table/relation name
    pub relation: Option<String>,
    /// Column name
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            relation: None,
            name: name.into(),
        }
    }

    pub fn new_qualified(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            name: name.into(),
        }
    }

    /// Returns the fully qualified name
    pub fn qualified_name(&self) -> String {
        match &self.relation {
            Some(r) => format!("{}.{}", r, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

impl From<&SchemaField> for Column {
    fn from(field: &SchemaField) -> Self {
        Self {
            relation: field.relation.clone(),
            name: field.name.clone(),
        }
    }
}

/// Schema field with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub data_type: ArrowDataType,
    pub nullable: bool,
    pub relation: Option<String>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: ArrowDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            relation: None,
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn qualified_name(&self) -> String {
        Column::from(self).qualified_name()
    }

    /// A qualified reference must match the relation too; a bare one matches
    /// on name alone.
    fn matches(&self, col: &Column) -> bool {
        self.name == col.name
            && match &col.relation {
                Some(relation) => self.relation.as_ref() == Some(relation),
                None => true,
            }
    }
}

/// Output of a plan node, in field order.
///
/// Apply and join outputs concatenate their inputs, so the same bare name can
/// appear more than once. Such names only resolve through their qualifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSchema {
    fields: Vec<SchemaField>,
}

impl PlanSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position and field `col` refers to, or `None` when it is missing or
    /// matches several fields.
    pub fn resolve_column(&self, col: &Column) -> Option<(usize, &SchemaField)> {
        let mut matches = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.matches(col));
        let found = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(found),
        }
    }

    /// Output columns in field order
    pub fn columns(&self) -> Vec<Column> {
        self.fields.iter().map(Column::from).collect()
    }

    /// Output columns as a set, for correlation containment tests
    pub fn column_set(&self) -> HashSet<Column> {
        self.fields.iter().map(Column::from).collect()
    }

    /// Left fields followed by right fields
    pub fn merge(&self, other: &PlanSchema) -> Self {
        self.extend(other.fields.iter().cloned())
    }

    /// Append fields to the end of this schema
    pub fn extend(&self, extra: impl IntoIterator<Item = SchemaField>) -> Self {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        Self::new(fields)
    }
}
