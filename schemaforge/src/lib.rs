//! SchemaForge - database schema to multi-layer project generation
//!
//! This crate turns relational catalog metadata into a framework-neutral
//! entity graph and renders that graph into a complete project for one of
//! several target backends.
//!
//! # Features
//!
//! - **Schema introspection contract** with per-table failure isolation
//! - **Framework-neutral IR** with resolved foreign keys and join-table collapsing
//! - **Per-backend type mapping** for language and persistence-layer types
//! - **Deterministic naming** for every generated identifier
//! - **Template-based generation** with strict, typed template inputs
//!
//! # Example
//!
//! ```rust
//! use schemaforge::{generate, GenerationRequest, RawSchema};
//!
//! # fn example(snapshot: RawSchema) -> schemaforge::Result<()> {
//! let request = GenerationRequest::new("fastapi");
//! let outcome = generate(&snapshot, &request)?;
//!
//! for artifact in &outcome.artifacts {
//!     println!("{}", artifact.path);
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod backend;
pub mod diagnostics;
pub mod introspect;
pub mod ir;
pub mod mapping;
pub mod naming;
pub mod pipeline;
pub mod raw;
pub mod render;

pub use backend::{create_generator, connection_string_for, Backend, Generator, ProjectContext};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use introspect::{Introspection, Introspector, SchemaConnector, SchemaSource, SourceError};
pub use ir::{Entity, EntityGraph, EntityId, Field, IrBuilder, IrOptions, JoinTablePolicy, Relationship, RelationKind, TypeTag};
pub use pipeline::{generate, GenerationOutcome, GenerationRequest, Grouping, Pipeline, RenderFailure, Selection};
pub use raw::{ConstraintKind, RawColumn, RawConstraint, RawSchema, RawTable, TableRef};
pub use render::{FileArtifact, Layer, Renderer, TemplateSet};

/// Generation errors
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Schema read error: {0}")]
    SchemaRead(#[from] SourceError),

    #[error("IR build error on table '{table}': {message}")]
    IrBuild { table: String, message: String },

    #[error("Cannot resolve relationship '{constraint}' on table '{table}': {message}")]
    RelationshipResolution {
        table: String,
        constraint: String,
        message: String,
    },

    #[error("Template '{template}' failed for '{entity}': {message}")]
    TemplateRender {
        template: String,
        entity: String,
        message: String,
    },

    #[error("Template registration failed for '{template}': {message}")]
    TemplateRegistration { template: String, message: String },

    #[error("Unsupported backend '{requested}' (available: {available})")]
    UnsupportedBackend { requested: String, available: String },

    #[error("Invalid connection string: {0}")]
    ConnectionString(String),

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Backend '{backend}' has no '{layer}' layer")]
    UnsupportedLayer { backend: String, layer: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`GenerateError`] for structured reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaRead,
    IrBuild,
    RelationshipResolution,
    TemplateRender,
    UnsupportedBackend,
    ConnectionString,
    Selection,
    Internal,
}

impl GenerateError {
    /// Error kind without the message
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerateError::SchemaRead(_) => ErrorKind::SchemaRead,
            GenerateError::IrBuild { .. } => ErrorKind::IrBuild,
            GenerateError::RelationshipResolution { .. } => ErrorKind::RelationshipResolution,
            GenerateError::TemplateRender { .. } => ErrorKind::TemplateRender,
            GenerateError::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            GenerateError::ConnectionString(_) => ErrorKind::ConnectionString,
            GenerateError::UnknownEntity(_) | GenerateError::UnsupportedLayer { .. } => ErrorKind::Selection,
            GenerateError::TemplateRegistration { .. } | GenerateError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Table or entity the error is about, when there is one
    pub fn subject(&self) -> Option<&str> {
        match self {
            GenerateError::SchemaRead(SourceError::Table { table, .. }) => Some(&table.name),
            GenerateError::IrBuild { table, .. } => Some(table),
            GenerateError::RelationshipResolution { table, .. } => Some(table),
            GenerateError::TemplateRender { entity, .. } => Some(entity),
            GenerateError::UnknownEntity(entity) => Some(entity),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
