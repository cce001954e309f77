//! PostgreSQL schema source over `information_schema` and `pg_catalog`
//!
//! The generation engine is synchronous, so each connection owns a
//! current-thread tokio runtime and blocks on sqlx. Every catalog value is
//! cast to `text` or `int4` in SQL to keep the row decoding uniform.

use schemaforge::{
    ConstraintKind, RawColumn, RawConstraint, SchemaConnector, SchemaSource, SourceError, TableRef,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use tokio::runtime::Runtime;

/// SQLSTATE for insufficient privilege
const INSUFFICIENT_PRIVILEGE: &str = "42501";

const TABLES_QUERY: &str = r#"
    SELECT table_schema::text AS table_schema, table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_type = 'BASE TABLE'
      AND table_schema NOT IN ('pg_catalog', 'information_schema')
      AND table_schema NOT LIKE 'pg_toast%'
      AND (cardinality($1::text[]) = 0 OR table_schema = ANY($1::text[]))
    ORDER BY table_schema, table_name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.udt_schema::text AS udt_schema,
        c.udt_name::text AS udt_name,
        c.character_maximum_length::int4 AS max_length,
        c.numeric_precision::int4 AS numeric_precision,
        c.numeric_scale::int4 AS numeric_scale,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.ordinal_position::int4 AS ordinal_position,
        c.is_identity::text AS is_identity
    FROM information_schema.columns c
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const ENUM_LABELS_QUERY: &str = r#"
    SELECT e.enumlabel::text AS label
    FROM pg_enum e
    JOIN pg_type t ON t.oid = e.enumtypid
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = $1 AND t.typname = $2
    ORDER BY e.enumsortorder
"#;

/// Primary key and unique columns in key order
const KEY_COLUMNS_QUERY: &str = r#"
    SELECT
        tc.constraint_name::text AS constraint_name,
        tc.constraint_type::text AS constraint_type,
        kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema
     AND kcu.constraint_name = tc.constraint_name
     AND kcu.table_name = tc.table_name
    WHERE tc.table_schema = $1 AND tc.table_name = $2
      AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
    ORDER BY tc.constraint_name, kcu.ordinal_position
"#;

/// Foreign key column pairs; composite keys pair through `position_in_unique_constraint`
const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        tc.constraint_name::text AS constraint_name,
        kcu.column_name::text AS column_name,
        ref.table_schema::text AS foreign_schema,
        ref.table_name::text AS foreign_table,
        ref.column_name::text AS foreign_column
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema
     AND kcu.constraint_name = tc.constraint_name
    JOIN information_schema.referential_constraints rc
      ON rc.constraint_schema = tc.constraint_schema
     AND rc.constraint_name = tc.constraint_name
    JOIN information_schema.key_column_usage ref
      ON ref.constraint_schema = rc.unique_constraint_schema
     AND ref.constraint_name = rc.unique_constraint_name
     AND ref.ordinal_position = kcu.position_in_unique_constraint
    WHERE tc.table_schema = $1 AND tc.table_name = $2
      AND tc.constraint_type = 'FOREIGN KEY'
    ORDER BY tc.constraint_name, kcu.ordinal_position
"#;

const CHECKS_QUERY: &str = r#"
    SELECT
        tc.constraint_name::text AS constraint_name,
        cc.check_clause::text AS check_clause
    FROM information_schema.table_constraints tc
    JOIN information_schema.check_constraints cc
      ON cc.constraint_schema = tc.constraint_schema
     AND cc.constraint_name = tc.constraint_name
    WHERE tc.table_schema = $1 AND tc.table_name = $2
      AND tc.constraint_type = 'CHECK'
      AND tc.constraint_name NOT LIKE '%_not_null'
    ORDER BY tc.constraint_name
"#;

/// Opens one pooled connection per introspection pass
pub struct PostgresConnector {
    url: String,
    schemas: Vec<String>,
}

impl PostgresConnector {
    pub fn new(url: impl Into<String>, schemas: Vec<String>) -> Self {
        Self {
            url: url.into(),
            schemas,
        }
    }
}

impl SchemaConnector for PostgresConnector {
    fn connect(&self) -> Result<Box<dyn SchemaSource + '_>, SourceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SourceError::Connection(format!("failed to start runtime: {}", e)))?;

        let pool = runtime
            .block_on(PgPoolOptions::new().max_connections(1).connect(&self.url))
            .map_err(|e| SourceError::Connection(e.to_string()))?;
        log::debug!("Connected to PostgreSQL");

        Ok(Box::new(PostgresSource {
            runtime,
            pool,
            schemas: self.schemas.clone(),
        }))
    }
}

struct PostgresSource {
    runtime: Runtime,
    pool: PgPool,
    schemas: Vec<String>,
}

impl PostgresSource {
    fn fetch(&self, query: &'static str, table: &TableRef) -> Result<Vec<PgRow>, SourceError> {
        self.runtime
            .block_on(
                sqlx::query(query)
                    .bind(&table.schema)
                    .bind(&table.name)
                    .fetch_all(&self.pool),
            )
            .map_err(|e| classify(table, e))
    }

    fn enum_labels(&self, table: &TableRef, schema: &str, type_name: &str) -> Result<Vec<String>, SourceError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query(ENUM_LABELS_QUERY)
                    .bind(schema)
                    .bind(type_name)
                    .fetch_all(&self.pool),
            )
            .map_err(|e| classify(table, e))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("label").map_err(|e| classify(table, e)))
            .collect()
    }
}

impl SchemaSource for PostgresSource {
    fn tables(&mut self) -> Result<Vec<TableRef>, SourceError> {
        let rows = self
            .runtime
            .block_on(sqlx::query(TABLES_QUERY).bind(&self.schemas).fetch_all(&self.pool))
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(TableRef::new(
                    row.try_get::<String, _>("table_schema")?,
                    row.try_get::<String, _>("table_name")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| SourceError::Connection(e.to_string()))
    }

    fn columns(&mut self, table: &TableRef) -> Result<Vec<RawColumn>, SourceError> {
        let rows = self.fetch(COLUMNS_QUERY, table)?;
        let mut columns = Vec::with_capacity(rows.len());

        for row in &rows {
            let column = read_column(row).map_err(|e| classify(table, e))?;
            let column = if column.data_type == "USER-DEFINED" {
                let udt_schema: Option<String> = row.try_get("udt_schema").map_err(|e| classify(table, e))?;
                match (udt_schema, column.udt_name.clone()) {
                    (Some(schema), Some(name)) => RawColumn {
                        enum_values: self.enum_labels(table, &schema, &name)?,
                        ..column
                    },
                    _ => column,
                }
            } else {
                column
            };
            columns.push(column);
        }

        log::debug!("Read {} column(s) of {}", columns.len(), table);
        Ok(columns)
    }

    fn constraints(&mut self, table: &TableRef) -> Result<Vec<RawConstraint>, SourceError> {
        let mut constraints = Vec::new();

        // Keyed by name; rows arrive in key order
        let mut keys: BTreeMap<String, (ConstraintKind, Vec<String>)> = BTreeMap::new();
        for row in self.fetch(KEY_COLUMNS_QUERY, table)? {
            let (name, kind, column) = key_row(&row).map_err(|e| classify(table, e))?;
            let kind = if kind == "PRIMARY KEY" {
                ConstraintKind::PrimaryKey
            } else {
                ConstraintKind::Unique
            };
            keys.entry(name).or_insert_with(|| (kind, Vec::new())).1.push(column);
        }
        for (name, (kind, columns)) in keys {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let mut constraint = match kind {
                ConstraintKind::PrimaryKey => RawConstraint::primary_key(table, &columns),
                _ => RawConstraint::unique(table, name.clone(), &columns),
            };
            constraint.name = name;
            constraints.push(constraint);
        }

        let mut foreign: BTreeMap<String, (TableRef, Vec<String>, Vec<String>)> = BTreeMap::new();
        for row in self.fetch(FOREIGN_KEYS_QUERY, table)? {
            let (name, column, target, target_column) = foreign_key_row(&row).map_err(|e| classify(table, e))?;
            let entry = foreign
                .entry(name)
                .or_insert_with(|| (target, Vec::new(), Vec::new()));
            entry.1.push(column);
            entry.2.push(target_column);
        }
        for (name, (target, columns, target_columns)) in foreign {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let target_columns: Vec<&str> = target_columns.iter().map(String::as_str).collect();
            constraints.push(RawConstraint::foreign_key(table, name, &columns, &target, &target_columns));
        }

        for row in self.fetch(CHECKS_QUERY, table)? {
            let name: String = row.try_get("constraint_name").map_err(|e| classify(table, e))?;
            let clause: Option<String> = row.try_get("check_clause").map_err(|e| classify(table, e))?;
            constraints.push(RawConstraint::check(table, name, clause));
        }

        Ok(constraints)
    }
}

impl Drop for PostgresSource {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
        log::debug!("PostgreSQL connection closed");
    }
}

fn read_column(row: &PgRow) -> Result<RawColumn, sqlx::Error> {
    let data_type: String = row.try_get("data_type")?;
    let udt_name: Option<String> = row.try_get("udt_name")?;
    let ordinal: i32 = row.try_get("ordinal_position")?;

    Ok(RawColumn {
        name: row.try_get("column_name")?,
        udt_name: if matches!(data_type.as_str(), "USER-DEFINED" | "ARRAY") {
            udt_name
        } else {
            None
        },
        data_type,
        max_length: unsigned(row.try_get("max_length")?),
        precision: unsigned(row.try_get("numeric_precision")?),
        scale: unsigned(row.try_get("numeric_scale")?),
        nullable: row.try_get::<String, _>("is_nullable")? == "YES",
        default: row.try_get("column_default")?,
        ordinal: u32::try_from(ordinal).unwrap_or_default(),
        is_identity: row.try_get::<Option<String>, _>("is_identity")?.as_deref() == Some("YES"),
        enum_values: Vec::new(),
    })
}

fn key_row(row: &PgRow) -> Result<(String, String, String), sqlx::Error> {
    Ok((
        row.try_get("constraint_name")?,
        row.try_get("constraint_type")?,
        row.try_get("column_name")?,
    ))
}

fn foreign_key_row(row: &PgRow) -> Result<(String, String, TableRef, String), sqlx::Error> {
    let target = TableRef::new(
        row.try_get::<String, _>("foreign_schema")?,
        row.try_get::<String, _>("foreign_table")?,
    );
    Ok((row.try_get("constraint_name")?, row.try_get("column_name")?, target, row.try_get("foreign_column")?))
}

fn unsigned(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

/// Permission problems isolate the table; anything else is connection-level
fn classify(table: &TableRef, err: sqlx::Error) -> SourceError {
    let code = err.as_database_error().and_then(|db| db.code().map(|c| c.into_owned()));
    if code.as_deref() == Some(INSUFFICIENT_PRIVILEGE) {
        SourceError::Table {
            table: table.clone(),
            message: err.to_string(),
        }
    } else {
        SourceError::Connection(err.to_string())
    }
}
