//! Builds the entity graph from raw catalog records

use super::cycles::reference_cycles;
use super::{
    Entity, EntityGraph, EntityId, Field, JoinTable, RelationKind, RelationSide, Relationship,
    TypeParams, TypeTag,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::naming;
use crate::raw::{same_column_set, RawColumn, RawConstraint, RawSchema, RawTable, TableRef};
use crate::{GenerateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// When a table is collapsed into a many-to-many relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinTablePolicy {
    pub enabled: bool,
    /// Columns outside both foreign keys that a join table may carry and still collapse
    pub max_extra_columns: usize,
    /// Collapse join tables whose two keys reference the same table
    pub allow_self_reference: bool,
}

impl Default for JoinTablePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_extra_columns: 0,
            allow_self_reference: false,
        }
    }
}

/// IR construction options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrOptions {
    pub join_tables: JoinTablePolicy,
    /// Foreign keys over a unique column set become one-to-one pairs
    pub detect_one_to_one: bool,
}

/// Built graph plus the findings made while building it
#[derive(Debug, Clone, Default)]
pub struct IrBuild {
    pub graph: EntityGraph,
    pub diagnostics: Diagnostics,
}

/// Two foreign keys of a join table, in declaration order
struct JoinKeys<'s> {
    first: &'s RawConstraint,
    second: &'s RawConstraint,
    extra_columns: Vec<&'s str>,
}

/// Single-pass IR builder over a complete raw schema
pub struct IrBuilder<'s> {
    schema: &'s RawSchema,
    options: IrOptions,
    skipped: HashSet<TableRef>,
}

impl<'s> IrBuilder<'s> {
    pub fn new(schema: &'s RawSchema, options: IrOptions) -> Self {
        Self {
            schema,
            options,
            skipped: HashSet::new(),
        }
    }

    /// Tables the introspector left out; keys into them are dropped instead of failing
    pub fn with_skipped(mut self, tables: impl IntoIterator<Item = TableRef>) -> Self {
        self.skipped.extend(tables);
        self
    }

    pub fn build(self) -> Result<IrBuild> {
        let mut diagnostics = Diagnostics::new();
        let schema = self.schema;
        let tables = &schema.tables;
        let index: HashMap<&TableRef, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (&t.table, i))
            .collect();

        let join_tables = self.classify_join_tables(&index);

        // 1. One entity per materialized table
        let mut entities: Vec<Entity> = Vec::new();
        let mut entity_of: HashMap<&TableRef, EntityId> = HashMap::new();
        let mut names: HashMap<String, &TableRef> = HashMap::new();

        for (i, table) in tables.iter().enumerate() {
            if join_tables.contains_key(&i) {
                log::debug!("Collapsing join table {}", table.table);
                continue;
            }

            let name = naming::entity_name(&table.table.name);
            if let Some(existing) = names.get(&name) {
                return Err(GenerateError::IrBuild {
                    table: table.table.name.clone(),
                    message: format!("entity name '{}' is already derived from table '{}'", name, existing),
                });
            }
            names.insert(name.clone(), &table.table);

            let id = EntityId(entities.len());
            entities.push(Self::build_entity(id, name, table)?);
            entity_of.insert(&table.table, id);
        }

        // 2. Paired relationships for every foreign key of a materialized table
        for (i, table) in tables.iter().enumerate() {
            if join_tables.contains_key(&i) {
                continue;
            }
            for fk in table.foreign_keys() {
                let Some(target_table) = self.resolve_foreign_key(table, fk, &index, &mut diagnostics)? else {
                    continue;
                };
                let owner = entity_of[&table.table];
                let target = entity_of[&target_table.table];
                let referenced = Self::referenced_columns(fk);

                let one_to_one = self.options.detect_one_to_one && table.is_key(&fk.columns);
                let (owning_kind, inverse_kind) = if one_to_one {
                    (RelationKind::OneToOne, RelationKind::OneToOne)
                } else {
                    (RelationKind::ManyToOne, RelationKind::OneToMany)
                };

                entities[owner.0].relationships.push(Relationship {
                    kind: owning_kind,
                    owner,
                    target,
                    side: RelationSide::Owning,
                    owner_fields: fk.columns.clone(),
                    target_fields: referenced.clone(),
                    constraint: fk.name.clone(),
                    via: None,
                });
                entities[target.0].relationships.push(Relationship {
                    kind: inverse_kind,
                    owner: target,
                    target: owner,
                    side: RelationSide::Inverse,
                    owner_fields: referenced,
                    target_fields: fk.columns.clone(),
                    constraint: fk.name.clone(),
                    via: None,
                });
            }
        }

        // 3. Many-to-many through collapsed join tables
        let mut join_indexes: Vec<_> = join_tables.keys().copied().collect();
        join_indexes.sort_unstable();
        for i in join_indexes {
            let table = &tables[i];
            let keys = &join_tables[&i];
            for fk in [keys.first, keys.second] {
                self.resolve_foreign_key(table, fk, &index, &mut diagnostics)?;
            }

            let (Some(first_target), Some(second_target)) = (keys.first.references.as_ref(), keys.second.references.as_ref()) else {
                continue;
            };
            let a = entity_of[&first_target.table];
            let b = entity_of[&second_target.table];
            let constraint = table.table.to_string();

            entities[a.0].relationships.push(Relationship {
                kind: RelationKind::ManyToMany,
                owner: a,
                target: b,
                side: RelationSide::Owning,
                owner_fields: first_target.columns.clone(),
                target_fields: second_target.columns.clone(),
                constraint: constraint.clone(),
                via: Some(JoinTable {
                    table: table.table.clone(),
                    owner_columns: keys.first.columns.clone(),
                    target_columns: keys.second.columns.clone(),
                }),
            });
            entities[b.0].relationships.push(Relationship {
                kind: RelationKind::ManyToMany,
                owner: b,
                target: a,
                side: RelationSide::Inverse,
                owner_fields: second_target.columns.clone(),
                target_fields: first_target.columns.clone(),
                constraint,
                via: Some(JoinTable {
                    table: table.table.clone(),
                    owner_columns: keys.second.columns.clone(),
                    target_columns: keys.first.columns.clone(),
                }),
            });

            if !keys.extra_columns.is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::JoinColumnsDropped,
                        format!(
                            "Join table '{}' collapsed without column(s): {}",
                            table.table,
                            keys.extra_columns.join(", ")
                        ),
                    )
                    .for_table(table.table.name.clone()),
                );
            }
        }

        let graph = EntityGraph::from_entities(entities);

        // 4. Cycles are legal; report them once per group
        for group in reference_cycles(&graph) {
            let members: Vec<&str> = group
                .iter()
                .map(|&i| graph.get(EntityId(i)).name.as_str())
                .collect();
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::ReferenceCycle,
                    format!("Reference cycle between: {}", members.join(", ")),
                )
                .for_entity(members[0]),
            );
        }

        log::info!("Built IR with {} entities", graph.len());
        Ok(IrBuild { graph, diagnostics })
    }

    fn build_entity(id: EntityId, name: String, table: &RawTable) -> Result<Entity> {
        let pk_columns = table.primary_key_columns();
        if pk_columns.is_empty() {
            return Err(GenerateError::IrBuild {
                table: table.table.name.clone(),
                message: "table has no primary key".to_string(),
            });
        }
        let fields: Vec<Field> = table
            .columns
            .iter()
            .map(|column| Self::build_field(column, pk_columns.contains(&column.name.as_str())))
            .collect();

        let mut primary_key = Vec::with_capacity(pk_columns.len());
        for column in &pk_columns {
            let position = fields
                .iter()
                .position(|f| f.column == *column)
                .ok_or_else(|| GenerateError::IrBuild {
                    table: table.table.name.clone(),
                    message: format!("primary key column '{}' does not exist", column),
                })?;
            primary_key.push(position);
        }

        Ok(Entity {
            id,
            name,
            table: table.table.clone(),
            fields,
            primary_key,
            relationships: Vec::new(),
        })
    }

    fn build_field(column: &RawColumn, primary_key: bool) -> Field {
        let tag = TypeTag::from_column(column);
        if tag.is_unknown() {
            log::debug!("Column '{}' has unrecognized type '{}'", column.name, column.declared_type());
        }

        Field {
            name: naming::to_snake_case(&column.name),
            column: column.name.clone(),
            tag,
            params: TypeParams::from_column(column),
            nullable: column.nullable,
            identity: is_generated(column),
            primary_key,
            source_type: column.declared_type(),
            default: column.default.clone(),
            enum_name: if tag == TypeTag::Enum { column.udt_name.clone() } else { None },
            enum_values: column.enum_values.clone(),
        }
    }

    fn referenced_columns(fk: &RawConstraint) -> Vec<String> {
        fk.references
            .as_ref()
            .map(|target| target.columns.clone())
            .unwrap_or_default()
    }

    /// Check a foreign key against the schema; `None` means its target was skipped
    fn resolve_foreign_key(
        &self,
        table: &RawTable,
        fk: &RawConstraint,
        index: &HashMap<&TableRef, usize>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<&'s RawTable>> {
        let integrity = |message: String| GenerateError::IrBuild {
            table: table.table.name.clone(),
            message,
        };
        let resolution = |message: String| GenerateError::RelationshipResolution {
            table: table.table.name.clone(),
            constraint: fk.name.clone(),
            message,
        };

        let target = fk
            .references
            .as_ref()
            .ok_or_else(|| integrity(format!("foreign key '{}' has no referenced table", fk.name)))?;

        let Some(&target_index) = index.get(&target.table) else {
            if self.skipped.contains(&target.table) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::RelationshipDropped,
                        format!(
                            "Foreign key '{}' on '{}' references skipped table '{}'",
                            fk.name, table.table, target.table
                        ),
                    )
                    .for_table(table.table.name.clone()),
                );
                return Ok(None);
            }
            return Err(integrity(format!(
                "foreign key '{}' references missing table '{}'",
                fk.name, target.table
            )));
        };
        let schema = self.schema;
        let target_table = &schema.tables[target_index];

        if let Some(missing) = fk.columns.iter().find(|c| table.column(c).is_none()) {
            return Err(integrity(format!(
                "foreign key '{}' uses missing column '{}'",
                fk.name, missing
            )));
        }
        if let Some(missing) = target.columns.iter().find(|c| target_table.column(c).is_none()) {
            return Err(integrity(format!(
                "foreign key '{}' references missing column '{}.{}'",
                fk.name, target.table, missing
            )));
        }

        if fk.columns.is_empty() || fk.columns.len() != target.columns.len() {
            return Err(resolution(format!(
                "{} local column(s) but {} referenced column(s)",
                fk.columns.len(),
                target.columns.len()
            )));
        }

        if !target_table.is_key(&target.columns) {
            let pk = target_table.primary_key_columns();
            let partial = target.columns.len() < pk.len()
                && target.columns.iter().all(|c| pk.contains(&c.as_str()));
            let message = if partial {
                format!(
                    "references {} of the {} primary key column(s) of '{}'",
                    target.columns.len(),
                    pk.len(),
                    target.table
                )
            } else {
                format!("referenced columns of '{}' are not a primary key or unique constraint", target.table)
            };
            return Err(resolution(message));
        }

        Ok(Some(target_table))
    }

    /// Table index → join keys for every table the policy collapses
    fn classify_join_tables(&self, index: &HashMap<&TableRef, usize>) -> HashMap<usize, JoinKeys<'s>> {
        let policy = self.options.join_tables;
        if !policy.enabled {
            return HashMap::new();
        }

        let schema = self.schema;
        let referenced: HashSet<&TableRef> = schema
            .tables
            .iter()
            .flat_map(|t| t.foreign_keys())
            .filter_map(|fk| fk.references.as_ref().map(|r| &r.table))
            .collect();

        let candidates: HashMap<usize, JoinKeys<'s>> = schema
            .tables
            .iter()
            .enumerate()
            .filter_map(|(i, table)| {
                Self::join_keys(table, policy, &referenced, index).map(|keys| (i, keys))
            })
            .collect();

        // A candidate pointing at another candidate stays a regular entity
        let candidate_tables: HashSet<&TableRef> = candidates
            .keys()
            .map(|&i| &schema.tables[i].table)
            .collect();
        candidates
            .into_iter()
            .filter(|(_, keys)| {
                [keys.first, keys.second].iter().all(|fk| {
                    fk.references
                        .as_ref()
                        .is_some_and(|r| !candidate_tables.contains(&r.table))
                })
            })
            .collect()
    }

    fn join_keys(
        table: &'s RawTable,
        policy: JoinTablePolicy,
        referenced: &HashSet<&TableRef>,
        index: &HashMap<&TableRef, usize>,
    ) -> Option<JoinKeys<'s>> {
        let fks: Vec<&RawConstraint> = table.foreign_keys().collect();
        let &[first, second] = fks.as_slice() else {
            return None;
        };
        if referenced.contains(&table.table) {
            return None;
        }

        let first_target = &first.references.as_ref()?.table;
        let second_target = &second.references.as_ref()?.table;
        if first_target == &table.table || second_target == &table.table {
            return None;
        }
        if first_target == second_target && !policy.allow_self_reference {
            return None;
        }
        if !index.contains_key(first_target) || !index.contains_key(second_target) {
            return None;
        }
        if first.columns.iter().any(|c| second.columns.contains(c)) {
            return None;
        }

        // The primary key, when present, must span both foreign keys
        let key_columns: Vec<String> = first.columns.iter().chain(&second.columns).cloned().collect();
        if let Some(pk) = table.primary_key() {
            if !same_column_set(&pk.columns, &key_columns) {
                return None;
            }
        }

        let extra_columns: Vec<&str> = table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|c| !first.columns.iter().chain(&second.columns).any(|k| k == *c))
            .collect();
        if extra_columns.len() > policy.max_extra_columns {
            return None;
        }

        Some(JoinKeys {
            first,
            second,
            extra_columns,
        })
    }
}

fn is_generated(column: &RawColumn) -> bool {
    const SERIAL_TYPES: &[&str] = &["serial", "bigserial", "smallserial", "serial2", "serial4", "serial8"];

    if column.is_identity || SERIAL_TYPES.contains(&column.data_type.to_lowercase().as_str()) {
        return true;
    }
    column.default.as_deref().is_some_and(|default| {
        let default = default.to_lowercase();
        default.starts_with("nextval(")
            || default.contains("gen_random_uuid()")
            || default.contains("uuid_generate_v4()")
    })
}
