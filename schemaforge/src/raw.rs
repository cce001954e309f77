//! Raw catalog records as read from a schema source

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema-qualified table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    /// Catalog schema (e.g. `public`)
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table name as declared
    pub name: String,
}

fn default_schema() -> String {
    "public".to_string()
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Reference into the `public` schema
    pub fn public(name: impl Into<String>) -> Self {
        Self::new("public", name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,

    /// Declared data type as reported by the catalog (`character varying`, `USER-DEFINED`, ...)
    pub data_type: String,

    /// Underlying catalog type name, set for `USER-DEFINED` and `ARRAY` columns
    #[serde(default)]
    pub udt_name: Option<String>,

    #[serde(default)]
    pub max_length: Option<u32>,

    #[serde(default)]
    pub precision: Option<u32>,

    #[serde(default)]
    pub scale: Option<u32>,

    pub nullable: bool,

    #[serde(default)]
    pub default: Option<String>,

    /// 1-based position in the table declaration
    pub ordinal: u32,

    #[serde(default)]
    pub is_identity: bool,

    /// Enum labels in sort order, for enum-typed columns
    #[serde(default)]
    pub enum_values: Vec<String>,
}

impl RawColumn {
    /// Minimal column, mostly useful for building snapshots in code
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_name: None,
            max_length: None,
            precision: None,
            scale: None,
            nullable: false,
            default: None,
            ordinal,
            is_identity: false,
            enum_values: Vec::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Declared type including length or precision, e.g. `varchar(255)`
    pub fn declared_type(&self) -> String {
        match (self.data_type.as_str(), self.max_length, self.precision, self.scale) {
            ("character varying", Some(len), _, _) => format!("varchar({})", len),
            ("character", Some(len), _, _) => format!("char({})", len),
            ("numeric", _, Some(precision), Some(scale)) => format!("numeric({},{})", precision, scale),
            ("USER-DEFINED", _, _, _) | ("ARRAY", _, _, _) => self
                .udt_name
                .clone()
                .unwrap_or_else(|| self.data_type.clone()),
            _ => self.data_type.clone(),
        }
    }
}

/// Constraint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

/// Referenced side of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    pub table: TableRef,

    /// Referenced columns, positionally paired with the constraint's columns
    pub columns: Vec<String>,
}

/// Table constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConstraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub table: TableRef,

    /// Constituent columns in key order
    pub columns: Vec<String>,

    #[serde(default)]
    pub references: Option<ForeignKeyTarget>,

    #[serde(default)]
    pub check_expression: Option<String>,
}

impl RawConstraint {
    pub fn primary_key(table: &TableRef, columns: &[&str]) -> Self {
        Self::keyed(table, ConstraintKind::PrimaryKey, format!("{}_pkey", table.name), columns)
    }

    pub fn unique(table: &TableRef, name: impl Into<String>, columns: &[&str]) -> Self {
        Self::keyed(table, ConstraintKind::Unique, name.into(), columns)
    }

    pub fn foreign_key(
        table: &TableRef,
        name: impl Into<String>,
        columns: &[&str],
        target: &TableRef,
        target_columns: &[&str],
    ) -> Self {
        let mut constraint = Self::keyed(table, ConstraintKind::ForeignKey, name.into(), columns);
        constraint.references = Some(ForeignKeyTarget {
            table: target.clone(),
            columns: target_columns.iter().map(|c| c.to_string()).collect(),
        });
        constraint
    }

    pub fn check(table: &TableRef, name: impl Into<String>, expression: Option<String>) -> Self {
        let mut constraint = Self::keyed(table, ConstraintKind::Check, name.into(), &[]);
        constraint.check_expression = expression;
        constraint
    }

    fn keyed(table: &TableRef, kind: ConstraintKind, name: String, columns: &[&str]) -> Self {
        Self {
            name,
            kind,
            table: table.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references: None,
            check_expression: None,
        }
    }
}

/// One table with its columns and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub table: TableRef,

    #[serde(default)]
    pub columns: Vec<RawColumn>,

    #[serde(default)]
    pub constraints: Vec<RawConstraint>,
}

impl RawTable {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&RawConstraint> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Primary key columns in key order (empty when there is none)
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.primary_key()
            .map(|pk| pk.columns.iter().map(|c| c.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &RawConstraint> {
        self.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::ForeignKey)
    }

    /// True when `columns` (in any order) is exactly the primary key or a unique constraint
    pub fn is_key(&self, columns: &[String]) -> bool {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique))
            .any(|c| same_column_set(&c.columns, columns))
    }
}

pub(crate) fn same_column_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|col| b.contains(col))
}

/// A full catalog read, also usable as an offline snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSchema {
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

impl RawSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table: &TableRef) -> Option<&RawTable> {
        self.tables.iter().find(|t| &t.table == table)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_includes_length_and_precision() {
        let mut name = RawColumn::new("name", "character varying", 1);
        name.max_length = Some(255);
        assert_eq!(name.declared_type(), "varchar(255)");

        let mut price = RawColumn::new("price", "numeric", 2);
        price.precision = Some(10);
        price.scale = Some(2);
        assert_eq!(price.declared_type(), "numeric(10,2)");

        let mut status = RawColumn::new("status", "USER-DEFINED", 3);
        status.udt_name = Some("order_status".to_string());
        assert_eq!(status.declared_type(), "order_status");
    }

    #[test]
    fn test_is_key_ignores_column_order() {
        let table_ref = TableRef::public("post_tags");
        let mut table = RawTable::new(table_ref.clone());
        table
            .constraints
            .push(RawConstraint::primary_key(&table_ref, &["post_id", "tag_id"]));

        assert!(table.is_key(&["tag_id".to_string(), "post_id".to_string()]));
        assert!(!table.is_key(&["post_id".to_string()]));
    }

    #[test]
    fn test_table_ref_defaults_to_public_schema() {
        let parsed: TableRef = serde_json::from_str(r#"{"name": "users"}"#).unwrap();
        assert_eq!(parsed, TableRef::public("users"));
        assert_eq!(parsed.to_string(), "public.users");
    }
}
