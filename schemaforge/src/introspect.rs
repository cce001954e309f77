//! Schema introspection
//!
//! A [`SchemaConnector`] opens a scoped [`SchemaSource`]; the [`Introspector`]
//! walks it table by table and produces a [`RawSchema`] restricted to tables
//! that carry a primary key. Connection-level failures abort the read, a table
//! that cannot be read is skipped with a diagnostic.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::raw::{RawColumn, RawConstraint, RawSchema, RawTable, TableRef};
use crate::Result;
use thiserror::Error;

/// Failure reported by a schema source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The connection itself is unusable (connectivity, authentication)
    #[error("connection failure: {0}")]
    Connection(String),

    /// A single table could not be read (permissions, concurrent drop)
    #[error("table '{table}' could not be read: {message}")]
    Table { table: TableRef, message: String },
}

/// Read-only access to catalog metadata
pub trait SchemaSource {
    /// List the tables to introspect, in a stable order
    fn tables(&mut self) -> std::result::Result<Vec<TableRef>, SourceError>;

    /// Columns of one table
    fn columns(&mut self, table: &TableRef) -> std::result::Result<Vec<RawColumn>, SourceError>;

    /// Constraints of one table
    fn constraints(&mut self, table: &TableRef) -> std::result::Result<Vec<RawConstraint>, SourceError>;
}

/// Opens a schema source. The returned source is released when dropped.
pub trait SchemaConnector {
    fn connect(&self) -> std::result::Result<Box<dyn SchemaSource + '_>, SourceError>;
}

/// Result of one introspection pass
#[derive(Debug, Clone, Default)]
pub struct Introspection {
    pub schema: RawSchema,
    /// Tables left out of `schema`, so foreign keys into them can be told apart from dangling ones
    pub skipped: Vec<TableRef>,
    pub diagnostics: Diagnostics,
}

/// Walks a schema source into raw records
pub struct Introspector<'a> {
    source: &'a mut dyn SchemaSource,
}

impl<'a> Introspector<'a> {
    pub fn new(source: &'a mut dyn SchemaSource) -> Self {
        Self { source }
    }

    /// Read every table, skipping unreadable and key-less tables
    pub fn read(self) -> Result<Introspection> {
        let mut result = Introspection::default();
        let tables = self.source.tables()?;
        log::info!("Introspecting {} table(s)", tables.len());

        for table_ref in tables {
            let table = match Self::read_table(self.source, &table_ref) {
                Ok(table) => table,
                Err(SourceError::Table { table, message }) => {
                    result.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::TableSkipped,
                            format!("Table '{}' skipped: {}", table, message),
                        )
                        .for_table(table.name.clone()),
                    );
                    result.skipped.push(table);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if table.primary_key_columns().is_empty() {
                result.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::TableSkipped,
                        format!("Table '{}' has no primary key", table_ref),
                    )
                    .for_table(table_ref.name.clone()),
                );
                result.skipped.push(table_ref);
                continue;
            }

            log::debug!(
                "Read table {} ({} columns, {} constraints)",
                table_ref,
                table.columns.len(),
                table.constraints.len()
            );
            result.schema.tables.push(table);
        }

        Ok(result)
    }

    fn read_table(
        source: &mut dyn SchemaSource,
        table_ref: &TableRef,
    ) -> std::result::Result<RawTable, SourceError> {
        let mut columns = source.columns(table_ref)?;
        // Stable sort keeps declaration order for sources that report equal ordinals
        columns.sort_by_key(|c| c.ordinal);
        let constraints = source.constraints(table_ref)?;

        Ok(RawTable {
            table: table_ref.clone(),
            columns,
            constraints,
        })
    }
}

/// In-memory snapshot source over a previously captured schema
pub struct SnapshotSource<'a> {
    schema: &'a RawSchema,
}

impl<'a> SnapshotSource<'a> {
    pub fn new(schema: &'a RawSchema) -> Self {
        Self { schema }
    }

    fn table(&self, table: &TableRef) -> std::result::Result<&'a RawTable, SourceError> {
        self.schema.table(table).ok_or_else(|| SourceError::Table {
            table: table.clone(),
            message: "not present in snapshot".to_string(),
        })
    }
}

impl SchemaSource for SnapshotSource<'_> {
    fn tables(&mut self) -> std::result::Result<Vec<TableRef>, SourceError> {
        Ok(self.schema.tables.iter().map(|t| t.table.clone()).collect())
    }

    fn columns(&mut self, table: &TableRef) -> std::result::Result<Vec<RawColumn>, SourceError> {
        Ok(self.table(table)?.columns.clone())
    }

    fn constraints(&mut self, table: &TableRef) -> std::result::Result<Vec<RawConstraint>, SourceError> {
        Ok(self.table(table)?.constraints.clone())
    }
}

impl SchemaConnector for RawSchema {
    fn connect(&self) -> std::result::Result<Box<dyn SchemaSource + '_>, SourceError> {
        Ok(Box::new(SnapshotSource::new(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::ConstraintKind;
    use crate::GenerateError;

    fn keyed_table(name: &str) -> RawTable {
        let table_ref = TableRef::public(name);
        let mut table = RawTable::new(table_ref.clone());
        table.columns.push(RawColumn::new("id", "integer", 1));
        table.constraints.push(RawConstraint::primary_key(&table_ref, &["id"]));
        table
    }

    /// Source that fails on chosen tables
    struct FlakySource {
        tables: Vec<RawTable>,
        unreadable: Vec<String>,
        dead_after_listing: bool,
    }

    impl SchemaSource for FlakySource {
        fn tables(&mut self) -> std::result::Result<Vec<TableRef>, SourceError> {
            Ok(self.tables.iter().map(|t| t.table.clone()).collect())
        }

        fn columns(&mut self, table: &TableRef) -> std::result::Result<Vec<RawColumn>, SourceError> {
            if self.dead_after_listing {
                return Err(SourceError::Connection("server closed the connection".into()));
            }
            if self.unreadable.contains(&table.name) {
                return Err(SourceError::Table {
                    table: table.clone(),
                    message: "permission denied".into(),
                });
            }
            let found = self.tables.iter().find(|t| &t.table == table).unwrap();
            Ok(found.columns.clone())
        }

        fn constraints(&mut self, table: &TableRef) -> std::result::Result<Vec<RawConstraint>, SourceError> {
            let found = self.tables.iter().find(|t| &t.table == table).unwrap();
            Ok(found.constraints.clone())
        }
    }

    #[test]
    fn test_unreadable_table_is_skipped() {
        let mut source = FlakySource {
            tables: vec![keyed_table("users"), keyed_table("secrets")],
            unreadable: vec!["secrets".to_string()],
            dead_after_listing: false,
        };

        let result = Introspector::new(&mut source).read().unwrap();
        assert_eq!(result.schema.table_names(), vec!["users"]);
        assert_eq!(result.diagnostics.count(DiagnosticKind::TableSkipped), 1);
    }

    #[test]
    fn test_connection_failure_is_fatal() {
        let mut source = FlakySource {
            tables: vec![keyed_table("users")],
            unreadable: vec![],
            dead_after_listing: true,
        };

        let err = Introspector::new(&mut source).read().unwrap_err();
        assert!(matches!(err, GenerateError::SchemaRead(SourceError::Connection(_))));
    }

    #[test]
    fn test_table_without_primary_key_is_skipped() {
        let mut log_table = RawTable::new(TableRef::public("audit_log"));
        log_table.columns.push(RawColumn::new("message", "text", 1));
        let snapshot = RawSchema {
            tables: vec![keyed_table("users"), log_table],
        };

        let mut source = snapshot.connect().unwrap();
        let result = Introspector::new(&mut *source).read().unwrap();
        assert_eq!(result.schema.table_names(), vec!["users"]);

        let skipped: Vec<_> = result.diagnostics.of_kind(DiagnosticKind::TableSkipped).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].table.as_deref(), Some("audit_log"));
        assert_eq!(result.skipped, vec![TableRef::public("audit_log")]);
    }

    #[test]
    fn test_columns_are_ordered_by_ordinal() {
        let mut table = keyed_table("users");
        table.columns.insert(0, RawColumn::new("email", "text", 3));
        table.columns.insert(1, RawColumn::new("name", "text", 2));
        let snapshot = RawSchema { tables: vec![table] };

        let mut source = snapshot.connect().unwrap();
        let result = Introspector::new(&mut *source).read().unwrap();
        let names: Vec<_> = result.schema.tables[0]
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "name", "email"]);
        assert_eq!(result.schema.tables[0].constraints[0].kind, ConstraintKind::PrimaryKey);
    }
}
