//! Schemas and qualified fields.
//!
//! A [`Schema`] is an immutable, ordered list of [`QualifiedField`]s. Two
//! schemas are equal when every field matches positionally on name, type
//! and qualifier. Field names are case-sensitive.

use std::fmt;
use std::sync::Arc;

use super::types::ColumnDataType;

/// Shared reference to a schema.
pub type SchemaRef = Arc<Schema>;

/// The table a field comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    /// Table name.
    pub name: String,
    /// Alias given in the query, if any.
    pub alias: Option<String>,
}

impl TableReference {
    /// Creates an unaliased reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Creates an aliased reference.
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Returns the name columns are qualified with: the alias if present.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Returns true if `qualifier` refers to this table.
    pub fn matches(&self, qualifier: &str) -> bool {
        match &self.alias {
            Some(alias) => alias == qualifier,
            None => self.name == qualifier,
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.name, alias),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A reference to a column by (optionally qualified) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Optional table qualifier.
    pub relation: Option<String>,
    /// Column name.
    pub name: String,
}

impl Column {
    /// Creates an unqualified column reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            relation: None,
            name: name.into(),
        }
    }

    /// Creates a qualified column reference.
    pub fn qualified(relation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            name: name.into(),
        }
    }

    /// Returns the fully qualified name.
    pub fn qualified_name(&self) -> String {
        match &self.relation {
            Some(r) => format!("{}.{}", r, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// A named, typed field with an optional table qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedField {
    /// Field name.
    pub name: String,
    /// Data type.
    pub data_type: ColumnDataType,
    /// Table the field belongs to.
    pub qualifier: Option<TableReference>,
}

impl QualifiedField {
    /// Creates an unqualified field.
    pub fn new(name: impl Into<String>, data_type: ColumnDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            qualifier: None,
        }
    }

    /// Creates a field qualified by `table`.
    pub fn qualified(
        table: TableReference,
        name: impl Into<String>,
        data_type: ColumnDataType,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            qualifier: Some(table),
        }
    }

    /// Returns the field with a different qualifier.
    pub fn with_qualifier(mut self, qualifier: Option<TableReference>) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// Returns the fully qualified name.
    pub fn qualified_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q.effective_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// Returns a column reference to this field.
    pub fn column(&self) -> Column {
        Column {
            relation: self.qualifier.as_ref().map(|q| q.effective_name().to_string()),
            name: self.name.clone(),
        }
    }

    /// Returns true if `column` refers to this field.
    pub fn matches(&self, column: &Column) -> bool {
        if self.name != column.name {
            return false;
        }
        match (&column.relation, &self.qualifier) {
            (None, _) => true,
            (Some(r), Some(q)) => q.matches(r),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for QualifiedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.qualified_name(), self.data_type)
    }
}

/// An ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<QualifiedField>,
}

impl Schema {
    /// Creates a schema from fields.
    pub fn new(fields: Vec<QualifiedField>) -> Self {
        Self { fields }
    }

    /// Creates an empty schema.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the fields.
    pub fn fields(&self) -> &[QualifiedField] {
        &self.fields
    }

    /// Returns the field at `index`.
    pub fn field(&self, index: usize) -> Option<&QualifiedField> {
        self.fields.get(index)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the index of the first field matching `column`.
    pub fn index_of_column(&self, column: &Column) -> Option<usize> {
        self.fields.iter().position(|f| f.matches(column))
    }

    /// Returns the number of fields matching `column`.
    pub fn match_count(&self, column: &Column) -> usize {
        self.fields.iter().filter(|f| f.matches(column)).count()
    }

    /// Returns the index of the first field named `name`, ignoring qualifiers.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the field names in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Concatenates two schemas, left fields first.
    pub fn join(left: &Schema, right: &Schema) -> Schema {
        let mut fields = Vec::with_capacity(left.len() + right.len());
        fields.extend(left.fields.iter().cloned());
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }

    /// Returns a schema with only the fields at `indices`.
    pub fn project(&self, indices: &[usize]) -> Option<Schema> {
        indices
            .iter()
            .map(|&i| self.fields.get(i).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Schema::new)
    }

    /// Returns the schema with every field requalified by `table`.
    pub fn with_qualifier(&self, table: &TableReference) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| f.clone().with_qualifier(Some(table.clone())))
                .collect(),
        }
    }

    /// Returns the schema with every field's qualifier removed.
    pub fn unqualified(&self) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| f.clone().with_qualifier(None))
                .collect(),
        }
    }

    /// Returns true if both schemas have the same field names and types in
    /// the same order, ignoring qualifiers.
    pub fn same_shape(&self, other: &Schema) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.name == b.name && a.data_type == b.data_type)
    }

    pub(crate) fn set_data_type(&mut self, index: usize, data_type: ColumnDataType) {
        if let Some(field) = self.fields.get_mut(index) {
            field.data_type = data_type;
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<_> = self.fields.iter().map(|f| f.to_string()).collect();
        write!(f, "[{}]", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Schema {
        let table = TableReference::aliased("orders", "o");
        Schema::new(vec![
            QualifiedField::qualified(table.clone(), "id", ColumnDataType::Long),
            QualifiedField::qualified(table, "amount", ColumnDataType::Double),
        ])
    }

    #[test]
    fn test_column_resolution() {
        let schema = orders();
        assert_eq!(schema.index_of_column(&Column::new("amount")), Some(1));
        assert_eq!(schema.index_of_column(&Column::qualified("o", "id")), Some(0));
        assert_eq!(schema.index_of_column(&Column::qualified("orders", "id")), None);
        assert_eq!(schema.index_of_column(&Column::new("Amount")), None);
    }

    #[test]
    fn test_join_concatenates_left_then_right() {
        let right = Schema::new(vec![QualifiedField::new("name", ColumnDataType::Utf8)]);
        let joined = Schema::join(&orders(), &right);
        assert_eq!(joined.field_names(), vec!["id", "amount", "name"]);
        assert_eq!(joined.field(2).unwrap().qualifier, None);
    }

    #[test]
    fn test_positional_equality() {
        let a = orders();
        let b = orders();
        assert_eq!(a, b);
        let reordered = b.project(&[1, 0]).unwrap();
        assert_ne!(a, reordered);
        assert_ne!(a, a.unqualified());
        assert!(a.same_shape(&a.unqualified()));
    }

    #[test]
    fn test_qualified_names() {
        let schema = orders();
        assert_eq!(schema.field(0).unwrap().qualified_name(), "o.id");
        assert_eq!(schema.field(0).unwrap().column(), Column::qualified("o", "id"));
        assert_eq!(schema.to_string(), "[o.id: Long, o.amount: Double]");
    }
}
