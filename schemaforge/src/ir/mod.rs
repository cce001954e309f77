//! Framework-neutral intermediate representation
//!
//! The entity graph is an arena: entities live in a `Vec` and are addressed by
//! [`EntityId`]; relationships store index pairs, so self- and mutually
//! referencing tables need no shared ownership.

use crate::raw::TableRef;
use serde::Serialize;

mod builder;
mod cycles;
mod types;

pub use builder::{IrBuild, IrBuilder, IrOptions, JoinTablePolicy};
pub use types::{TypeParams, TypeTag};

/// Stable index of an entity inside its [`EntityGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One column of an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Logical (snake_case) name
    pub name: String,
    /// Source column name, kept for persistence-layer mapping
    pub column: String,
    pub tag: TypeTag,
    pub params: TypeParams,
    pub nullable: bool,
    /// Value is produced by the database (identity, serial, generated uuid)
    pub identity: bool,
    pub primary_key: bool,
    /// Declared source type, e.g. `varchar(255)`
    pub source_type: String,
    pub default: Option<String>,
    /// Catalog enum type name for [`TypeTag::Enum`] fields
    pub enum_name: Option<String>,
    pub enum_values: Vec<String>,
}

impl Field {
    /// The source type had no canonical tag
    pub fn is_unmapped(&self) -> bool {
        self.tag.is_unknown()
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToOne => "many_to_one",
            RelationKind::OneToOne => "one_to_one",
            RelationKind::ManyToMany => "many_to_many",
        }
    }
}

/// Which end of the foreign key the owning entity sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSide {
    /// Owner holds the foreign key columns (or the first key of a join table)
    Owning,
    /// Owner is referenced by the target
    Inverse,
}

/// Join table behind a many-to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinTable {
    pub table: TableRef,
    /// Join columns referencing the owner, paired with `owner_fields`
    pub owner_columns: Vec<String>,
    /// Join columns referencing the target, paired with `target_fields`
    pub target_columns: Vec<String>,
}

/// Directed relationship from `owner` to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub kind: RelationKind,
    pub owner: EntityId,
    pub target: EntityId,
    pub side: RelationSide,
    /// Owner columns taking part in the relationship
    pub owner_fields: Vec<String>,
    /// Target columns paired positionally with `owner_fields`
    pub target_fields: Vec<String>,
    /// Constraint name (the owning-side constraint for many-to-many)
    pub constraint: String,
    pub via: Option<JoinTable>,
}

/// IR node for one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    /// PascalCase singular name
    pub name: String,
    pub table: TableRef,
    pub fields: Vec<Field>,
    /// Indexes into `fields`, in key order; never empty
    pub primary_key: Vec<usize>,
    pub relationships: Vec<Relationship>,
}

impl Entity {
    pub fn field(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> {
        self.primary_key.iter().map(move |&i| &self.fields[i])
    }

    pub fn relationships_of_kind(&self, kind: RelationKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    /// Columns used by any owning-side foreign key
    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.relationships
            .iter()
            .filter(|r| r.side == RelationSide::Owning && r.via.is_none())
            .any(|r| r.owner_fields.iter().any(|c| c == column))
    }
}

/// Arena of entities
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityGraph {
    entities: Vec<Entity>,
}

impl EntityGraph {
    pub(crate) fn from_entities(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn get(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn find(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn find_by_table(&self, table: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.table.name == table)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Direct relationships of one entity; no transitive walk
    pub fn relationships(&self, id: EntityId) -> &[Relationship] {
        &self.entities[id.0].relationships
    }

    /// Relationship on `rel.target` that mirrors `rel`
    pub fn inverse_of(&self, rel: &Relationship) -> Option<&Relationship> {
        self.get(rel.target).relationships.iter().find(|other| {
            other.target == rel.owner && other.constraint == rel.constraint && other.side != rel.side
        })
    }
}
