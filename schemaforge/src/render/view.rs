//! Template inputs
//!
//! Views are fully resolved before rendering: every name has been through
//! the naming engine, every type through the backend's mapping. Templates
//! only substitute, they never compute.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::ir::{Entity, EntityGraph, EntityId, Field, RelationKind, RelationSide, Relationship, TypeTag};
use crate::mapping::TypeMapping;
use crate::naming::{self, Case, Keywords};
use crate::pipeline::Grouping;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Identifier conventions of one backend
#[derive(Debug, Clone, Copy)]
pub struct Conventions {
    /// Properties and attributes
    pub member: Case,
    /// Parameters and locals
    pub parameter: Case,
    /// Group directory and namespace segments
    pub group: Case,
    pub keywords: Keywords,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectView {
    pub name: String,
    pub snake: String,
    pub kebab: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    /// Backend member identifier, escaped
    pub ident: String,
    /// Backend parameter identifier, escaped
    pub param: String,
    pub snake: String,
    pub pascal: String,
    pub camel: String,
    pub column: String,
    pub target_type: String,
    /// Target type without nullability
    pub required_type: String,
    /// Persistence-layer type; empty for backends without one
    pub persistence_type: String,
    pub source_type: String,
    pub tag: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub identity: bool,
    pub foreign_key: bool,
    pub unmapped: bool,
    pub is_text: bool,
    pub max_length: u32,
    pub has_default: bool,
    /// `schema.table.column` when this column alone forms an owning foreign key
    pub references: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipView {
    pub kind: String,
    pub owning: bool,
    pub collection: bool,
    /// Backend member identifier, escaped
    pub ident: String,
    pub snake: String,
    /// Member name of the partner relationship on the target
    pub inverse_ident: String,
    pub target: String,
    pub target_snake: String,
    pub target_table: String,
    pub target_group_module: String,
    pub target_group_namespace: String,
    pub columns: Vec<String>,
    pub target_columns: Vec<String>,
    /// Owner-side column for single-column keys
    pub column: String,
    /// Foreign key fields: the owner's own on the owning side, the target's on the inverse side
    pub key_fields: Vec<FieldView>,
    /// Join table name for many-to-many
    pub secondary: String,
    /// Association table identifier for many-to-many
    pub secondary_ident: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityView {
    pub name: String,
    pub snake: String,
    pub camel: String,
    pub kebab: String,
    pub plural: String,
    pub plural_snake: String,
    pub plural_camel: String,
    pub plural_kebab: String,
    /// Escaped local variable name for one instance
    pub variable: String,
    pub schema: String,
    pub table: String,
    pub group: String,
    /// Path prefix with trailing slash, empty when ungrouped
    pub group_dir: String,
    /// Namespace suffix with leading dot, empty when ungrouped
    pub group_namespace: String,
    /// Module prefix with trailing dot, empty when ungrouped
    pub group_module: String,
    pub fields: Vec<FieldView>,
    /// Fields a client may set on create
    pub writable_fields: Vec<FieldView>,
    /// Fields outside the primary key
    pub value_fields: Vec<FieldView>,
    pub key_fields: Vec<FieldView>,
    /// Owning foreign keys spanning more than one column
    pub foreign_key_constraints: Vec<ForeignKeyConstraintView>,
    /// First primary key field
    pub key: FieldView,
    pub composite_key: bool,
    /// Route template of the key, `{id}` or `{a}/{b}`
    pub key_route: String,
    pub relationships: Vec<RelationshipView>,
    pub has_relationships: bool,
    pub uses_uuid: bool,
    pub uses_decimal: bool,
    pub uses_dates: bool,
}

/// Multi-column foreign key, rendered as a table-level constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyConstraintView {
    pub name: String,
    pub columns: Vec<String>,
    /// `schema.table.column` for each entry of `columns`, in the same order
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationColumnView {
    pub name: String,
    pub persistence_type: String,
    /// `schema.table.column` of the referenced key
    pub references: String,
}

/// Join table of a collapsed many-to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationView {
    pub table: String,
    pub schema: String,
    pub ident: String,
    pub columns: Vec<AssociationColumnView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub name: String,
    pub segment: String,
    pub entities: Vec<String>,
}

/// Builds entity views for one backend
pub struct ViewBuilder<'a> {
    graph: &'a EntityGraph,
    mapping: &'a TypeMapping,
    conventions: Conventions,
    grouping: &'a Grouping,
    selected: HashSet<EntityId>,
    relationship_names: HashMap<EntityId, Vec<String>>,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(
        graph: &'a EntityGraph,
        mapping: &'a TypeMapping,
        conventions: Conventions,
        grouping: &'a Grouping,
        selected: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        let relationship_names = graph
            .iter()
            .map(|entity| (entity.id, relationship_names(graph, entity)))
            .collect();
        Self {
            graph,
            mapping,
            conventions,
            grouping,
            selected: selected.into_iter().collect(),
            relationship_names,
        }
    }

    /// View of one entity; unmapped columns are recorded in `diagnostics`
    pub fn entity(&self, entity: &Entity, diagnostics: &mut Diagnostics) -> EntityView {
        let keywords = &self.conventions.keywords;
        let group = self.grouping.group_of(entity).unwrap_or_default().to_string();
        let segment = self.group_segment(&group);

        let fields: Vec<FieldView> = entity
            .fields
            .iter()
            .map(|field| {
                let view = self.field(entity, field);
                if view.unmapped {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::UnmappedType,
                            format!(
                                "Column '{}.{}' has unsupported type '{}'; using '{}'",
                                entity.table.name, field.column, field.source_type, view.required_type
                            ),
                        )
                        .for_table(entity.table.name.clone())
                        .for_entity(entity.name.clone()),
                    );
                }
                view
            })
            .collect();

        let key_fields: Vec<FieldView> = entity.primary_key.iter().map(|&i| fields[i].clone()).collect();
        let writable_fields = fields.iter().filter(|f| !f.identity).cloned().collect();
        let value_fields = fields.iter().filter(|f| !f.primary_key).cloned().collect();
        let key = key_fields[0].clone();

        let relationships: Vec<RelationshipView> = entity
            .relationships
            .iter()
            .enumerate()
            .filter(|(_, rel)| self.selected.contains(&rel.target))
            .map(|(i, rel)| self.relationship(entity, i, rel))
            .collect();

        let foreign_key_constraints = entity
            .relationships
            .iter()
            .filter(|r| r.side == RelationSide::Owning && r.via.is_none() && r.owner_fields.len() > 1)
            .map(|r| {
                let target = self.graph.get(r.target);
                ForeignKeyConstraintView {
                    name: r.constraint.clone(),
                    columns: r.owner_fields.clone(),
                    references: r
                        .target_fields
                        .iter()
                        .map(|c| format!("{}.{}.{}", target.table.schema, target.table.name, c))
                        .collect(),
                }
            })
            .collect();

        let snake = naming::to_snake_case(&entity.name);
        let plural = naming::collection_name(&entity.name);
        EntityView {
            variable: keywords.escape(&self.conventions.parameter.apply(&entity.name)),
            camel: naming::to_camel_case(&entity.name),
            kebab: naming::to_kebab_case(&entity.name),
            plural_snake: naming::to_snake_case(&plural),
            plural_camel: naming::to_camel_case(&plural),
            plural_kebab: naming::to_kebab_case(&plural),
            plural,
            snake,
            name: entity.name.clone(),
            schema: entity.table.schema.clone(),
            table: entity.table.name.clone(),
            group_dir: prefixed(&segment, "", "/"),
            group_namespace: prefixed(&segment, ".", ""),
            group_module: prefixed(&segment, "", "."),
            group,
            uses_uuid: fields.iter().any(|f| f.tag == "uuid"),
            uses_decimal: fields.iter().any(|f| f.tag == "decimal"),
            uses_dates: fields.iter().any(|f| matches!(f.tag.as_str(), "date" | "time" | "timestamp" | "interval")),
            has_relationships: !relationships.is_empty(),
            composite_key: key_fields.len() > 1,
            key_route: key_fields
                .iter()
                .map(|f| format!("{{{}}}", f.param.trim_start_matches('@')))
                .collect::<Vec<_>>()
                .join("/"),
            key,
            key_fields,
            foreign_key_constraints,
            writable_fields,
            value_fields,
            fields,
            relationships,
        }
    }

    fn field(&self, entity: &Entity, field: &Field) -> FieldView {
        let keywords = &self.conventions.keywords;
        let target = self.mapping.target_type(field);
        let required = self.mapping.required_type(field);
        let persistence = self.mapping.persistence_type(field).map(|t| t.expr).unwrap_or_default();

        let references = entity
            .relationships
            .iter()
            .filter(|r| r.side == RelationSide::Owning && r.via.is_none() && r.owner_fields.len() == 1)
            .find(|r| r.owner_fields[0] == field.column)
            .map(|r| {
                let target = self.graph.get(r.target);
                format!("{}.{}.{}", target.table.schema, target.table.name, r.target_fields[0])
            })
            .unwrap_or_default();

        FieldView {
            ident: self.field_member(entity, field),
            param: keywords.escape(&self.conventions.parameter.apply(&field.name)),
            snake: field.name.clone(),
            pascal: naming::to_pascal_case(&field.name),
            camel: naming::to_camel_case(&field.name),
            column: field.column.clone(),
            target_type: target.expr,
            required_type: required.expr,
            persistence_type: persistence,
            source_type: field.source_type.clone(),
            tag: field.tag.as_str().to_string(),
            nullable: field.nullable,
            primary_key: field.primary_key,
            identity: field.identity,
            foreign_key: entity.is_foreign_key(&field.column),
            unmapped: target.fallback,
            is_text: field.tag == TypeTag::Text,
            max_length: field.params.length.unwrap_or(0),
            has_default: field.default.is_some(),
            references,
        }
    }

    fn field_member(&self, entity: &Entity, field: &Field) -> String {
        let mut member = self.conventions.member.apply(&field.name);
        // A member may not share the name of its enclosing type
        if member == entity.name {
            member.push_str("Value");
        }
        self.conventions.keywords.escape(&member)
    }

    fn relationship(&self, entity: &Entity, index: usize, rel: &Relationship) -> RelationshipView {
        let target = self.graph.get(rel.target);
        let snake = self.relationship_names[&entity.id][index].clone();
        let inverse_snake = self.inverse_name(rel).unwrap_or_default();
        let target_group = self.group_segment(self.grouping.group_of(target).unwrap_or_default());

        let (key_entity, key_columns) = match rel.side {
            RelationSide::Owning => (entity, &rel.owner_fields),
            RelationSide::Inverse => (target, &rel.target_fields),
        };
        let key_fields = if rel.via.is_some() {
            Vec::new()
        } else {
            key_columns
                .iter()
                .filter_map(|c| key_entity.field(c))
                .map(|f| self.field(key_entity, f))
                .collect()
        };

        let nullable = rel.side == RelationSide::Owning
            && rel.owner_fields.iter().any(|c| entity.field(c).is_some_and(|f| f.nullable));

        RelationshipView {
            kind: rel.kind.as_str().to_string(),
            owning: rel.side == RelationSide::Owning,
            collection: is_collection(rel),
            ident: self.member_ident(&snake),
            inverse_ident: if inverse_snake.is_empty() {
                String::new()
            } else {
                self.member_ident(&inverse_snake)
            },
            snake,
            target: target.name.clone(),
            target_snake: naming::to_snake_case(&target.name),
            target_table: target.table.name.clone(),
            target_group_module: prefixed(&target_group, "", "."),
            target_group_namespace: prefixed(&target_group, ".", ""),
            columns: rel.owner_fields.clone(),
            target_columns: rel.target_fields.clone(),
            column: rel.owner_fields.first().cloned().unwrap_or_default(),
            key_fields,
            secondary: rel.via.as_ref().map(|j| j.table.name.clone()).unwrap_or_default(),
            secondary_ident: rel.via.as_ref().map(|j| association_ident(&j.table.name)).unwrap_or_default(),
            nullable,
        }
    }

    fn member_ident(&self, snake: &str) -> String {
        self.conventions
            .keywords
            .escape(&self.conventions.member.apply(snake))
    }

    fn inverse_name(&self, rel: &Relationship) -> Option<String> {
        let partner = self.graph.inverse_of(rel)?;
        let target = self.graph.get(rel.target);
        let position = target
            .relationships
            .iter()
            .position(|r| std::ptr::eq(r, partner))?;
        Some(self.relationship_names[&target.id][position].clone())
    }

    fn group_segment(&self, group: &str) -> String {
        if group.is_empty() {
            String::new()
        } else {
            self.conventions.group.apply(group)
        }
    }

    /// Association tables behind the owning side of selected many-to-many relationships
    pub fn associations(&self) -> Vec<AssociationView> {
        let mut seen = HashSet::new();
        let mut associations = Vec::new();

        for entity in self.graph.iter().filter(|e| self.selected.contains(&e.id)) {
            for rel in &entity.relationships {
                let Some(join) = rel.via.as_ref() else {
                    continue;
                };
                if rel.side != RelationSide::Owning || !self.selected.contains(&rel.target) {
                    continue;
                }
                if !seen.insert(join.table.clone()) {
                    continue;
                }

                let target = self.graph.get(rel.target);
                let sides = [
                    (entity, &join.owner_columns, &rel.owner_fields),
                    (target, &join.target_columns, &rel.target_fields),
                ];
                let columns = sides
                    .iter()
                    .flat_map(|(side, join_columns, key_columns)| {
                        join_columns.iter().zip(key_columns.iter()).map(move |(column, key)| {
                            let persistence_type = side
                                .field(key)
                                .and_then(|f| self.mapping.persistence_type(f))
                                .map(|t| t.expr)
                                .unwrap_or_default();
                            AssociationColumnView {
                                name: column.clone(),
                                persistence_type,
                                references: format!("{}.{}.{}", side.table.schema, side.table.name, key),
                            }
                        })
                    })
                    .collect();

                associations.push(AssociationView {
                    table: join.table.name.clone(),
                    schema: join.table.schema.clone(),
                    ident: association_ident(&join.table.name),
                    columns,
                });
            }
        }

        associations.sort_by(|a, b| a.table.cmp(&b.table));
        associations
    }

    /// Distinct groups of the given views, sorted by name
    pub fn groups(&self, views: &[EntityView]) -> Vec<GroupView> {
        let mut groups: BTreeMap<&str, GroupView> = BTreeMap::new();
        for view in views.iter().filter(|v| !v.group.is_empty()) {
            groups
                .entry(view.group.as_str())
                .or_insert_with(|| GroupView {
                    name: view.group.clone(),
                    segment: self.group_segment(&view.group),
                    entities: Vec::new(),
                })
                .entities
                .push(view.name.clone());
        }
        groups.into_values().collect()
    }
}

fn prefixed(segment: &str, before: &str, after: &str) -> String {
    if segment.is_empty() {
        String::new()
    } else {
        format!("{}{}{}", before, segment, after)
    }
}

fn association_ident(table: &str) -> String {
    format!("{}_table", naming::to_snake_case(table))
}

fn is_collection(rel: &Relationship) -> bool {
    matches!(rel.kind, RelationKind::OneToMany | RelationKind::ManyToMany)
}

/// Snake-case member names for every relationship of `entity`, unique within it
fn relationship_names(graph: &EntityGraph, entity: &Entity) -> Vec<String> {
    let columns: HashSet<&str> = entity.fields.iter().map(|f| f.name.as_str()).collect();

    let mut names: Vec<String> = entity
        .relationships
        .iter()
        .map(|rel| base_name(graph, rel))
        .collect();

    // Collections reached through different keys are told apart by the key
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *counts.entry(name.clone()).or_default() += 1;
    }
    for (name, rel) in names.iter_mut().zip(&entity.relationships) {
        if counts[name.as_str()] > 1 && rel.side == RelationSide::Inverse && rel.via.is_none() {
            let key = strip_key_suffix(rel.target_fields.first().map(String::as_str).unwrap_or_default());
            if !key.is_empty() {
                *name = format!("{}_{}", key, name);
            }
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = if columns.contains(name.as_str()) {
                format!("{}_ref", name)
            } else {
                name
            };
            let base = candidate.clone();
            let mut n = 2;
            while used.contains(&candidate) || columns.contains(candidate.as_str()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn base_name(graph: &EntityGraph, rel: &Relationship) -> String {
    let target = naming::to_snake_case(&graph.get(rel.target).name);
    match (rel.kind, rel.side) {
        (RelationKind::ManyToOne | RelationKind::OneToOne, RelationSide::Owning) => {
            let key = strip_key_suffix(rel.owner_fields.first().map(String::as_str).unwrap_or_default());
            if rel.owner_fields.len() == 1 && !key.is_empty() {
                key
            } else {
                target
            }
        }
        (RelationKind::OneToOne, RelationSide::Inverse) => target,
        _ => naming::pluralize(&target),
    }
}

/// `customer_id` → `customer`, `ownerId` → `owner`
fn strip_key_suffix(column: &str) -> String {
    let snake = naming::to_snake_case(column);
    snake
        .strip_suffix("_id")
        .or_else(|| snake.strip_suffix("_uuid"))
        .or_else(|| snake.strip_suffix("_fk"))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, IrOptions};
    use crate::mapping::{NullableStyle, TypeRule, TypeTable};
    use crate::naming::PYTHON_KEYWORDS;
    use crate::raw::{RawColumn, RawConstraint, RawSchema, RawTable, TableRef};

    fn conventions() -> Conventions {
        Conventions {
            member: Case::Snake,
            parameter: Case::Snake,
            group: Case::Snake,
            keywords: PYTHON_KEYWORDS,
        }
    }

    fn mapping() -> TypeMapping {
        TypeMapping {
            language: TypeTable::new("str", NullableStyle::Wrap { prefix: "Optional[", suffix: "]" })
                .rule(TypeTag::Integer32, TypeRule::plain("int"))
                .rule(TypeTag::Text, TypeRule::plain("str")),
            persistence: Some(
                TypeTable::new("Text", NullableStyle::Orthogonal)
                    .rule(TypeTag::Integer32, TypeRule::plain("Integer"))
                    .rule(TypeTag::Text, TypeRule::plain("Text")),
            ),
        }
    }

    fn keyed(name: &str, columns: &[(&str, &str, bool)]) -> RawTable {
        let table_ref = TableRef::public(name);
        let mut table = RawTable::new(table_ref.clone());
        table.columns.push(RawColumn::new("id", "integer", 1));
        for (i, (column, data_type, nullable)) in columns.iter().enumerate() {
            let mut raw = RawColumn::new(*column, *data_type, i as u32 + 2);
            raw.nullable = *nullable;
            table.columns.push(raw);
        }
        table.constraints.push(RawConstraint::primary_key(&table_ref, &["id"]));
        table
    }

    fn schema() -> RawSchema {
        let users = keyed("users", &[("class", "text", false), ("shape", "geometry", true)]);
        let mut orders = keyed(
            "orders",
            &[("customer_id", "integer", false), ("reviewer_id", "integer", true)],
        );
        for (name, column) in [("orders_customer_fkey", "customer_id"), ("orders_reviewer_fkey", "reviewer_id")] {
            let fk = RawConstraint::foreign_key(&orders.table, name, &[column], &TableRef::public("users"), &["id"]);
            orders.constraints.push(fk);
        }
        RawSchema {
            tables: vec![users, orders],
        }
    }

    #[test]
    fn test_entity_view_names_and_types() {
        let schema = schema();
        let build = IrBuilder::new(&schema, IrOptions::default()).build().unwrap();
        let mapping = mapping();
        let grouping = Grouping::default();
        let views = ViewBuilder::new(&build.graph, &mapping, conventions(), &grouping, build.graph.iter().map(|e| e.id));

        let mut diagnostics = Diagnostics::new();
        let user = views.entity(build.graph.find("User").unwrap(), &mut diagnostics);

        assert_eq!(user.plural_snake, "users");
        assert_eq!(user.fields[1].ident, "class_");
        assert_eq!(user.fields[2].target_type, "Optional[str]");
        assert_eq!(user.fields[2].persistence_type, "Text");
        assert!(user.fields[2].unmapped);
        assert_eq!(diagnostics.count(DiagnosticKind::UnmappedType), 1);
        assert_eq!(user.group_dir, "");
    }

    #[test]
    fn test_relationship_names_are_unique() {
        let schema = schema();
        let build = IrBuilder::new(&schema, IrOptions::default()).build().unwrap();
        let mapping = mapping();
        let grouping = Grouping::default();
        let views = ViewBuilder::new(&build.graph, &mapping, conventions(), &grouping, build.graph.iter().map(|e| e.id));

        let mut diagnostics = Diagnostics::new();
        let order = views.entity(build.graph.find("Order").unwrap(), &mut diagnostics);
        let names: Vec<_> = order.relationships.iter().map(|r| r.ident.as_str()).collect();
        assert_eq!(names, vec!["customer", "reviewer"]);
        assert!(order.relationships[1].nullable);
        assert_eq!(order.fields[1].references, "public.users.id");

        let user = views.entity(build.graph.find("User").unwrap(), &mut diagnostics);
        let names: Vec<_> = user.relationships.iter().map(|r| r.ident.as_str()).collect();
        assert_eq!(names, vec!["customer_orders", "reviewer_orders"]);
        assert_eq!(user.relationships[0].inverse_ident, "customer");
        assert_eq!(order.relationships[0].inverse_ident, "customer_orders");
    }

    #[test]
    fn test_unselected_targets_are_omitted() {
        let schema = schema();
        let build = IrBuilder::new(&schema, IrOptions::default()).build().unwrap();
        let mapping = mapping();
        let grouping = Grouping::default().with("Order", "Sales");
        let order_id = build.graph.find("Order").unwrap().id;
        let views = ViewBuilder::new(&build.graph, &mapping, conventions(), &grouping, [order_id]);

        let mut diagnostics = Diagnostics::new();
        let order = views.entity(build.graph.find("Order").unwrap(), &mut diagnostics);
        assert!(order.relationships.is_empty());
        assert_eq!(order.group_dir, "sales/");
        assert_eq!(order.group_module, "sales.");
    }
}
