//! Generation pipeline
//!
//! One run is a fixed sequence of stages: select the backend, introspect,
//! build the IR, resolve views, render. The backend is validated and the
//! templates compiled before the schema source is opened, and the source is
//! released as soon as introspection returns.

use crate::backend::{create_generator, Backend, Generator, GlobalInput, ProjectContext};
use crate::diagnostics::Diagnostics;
use crate::introspect::{Introspection, Introspector, SchemaConnector};
use crate::ir::{Entity, EntityGraph, EntityId, IrBuilder, IrOptions};
use crate::render::{AssociationView, EntityView, FileArtifact, GroupView, Layer, ProjectView, Renderer, ViewBuilder};
use crate::{GenerateError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity or table name → logical group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grouping(BTreeMap<String, String>);

impl Grouping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, group: impl Into<String>) -> Self {
        self.insert(key, group);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, group: impl Into<String>) {
        self.0.insert(key.into(), group.into());
    }

    /// Group of an entity, looked up by entity name first, then by table name
    pub fn group_of(&self, entity: &Entity) -> Option<&str> {
        self.0
            .get(&entity.name)
            .or_else(|| self.0.get(&entity.table.name))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which entities to render. The IR is always built from the whole schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    /// Entity or table names; empty selects everything
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Selection {
    pub fn selects(&self, entity: &Entity) -> bool {
        let named = |names: &[String]| names.iter().any(|n| n == &entity.name || n == &entity.table.name);
        (self.include.is_empty() || named(&self.include)) && !named(&self.exclude)
    }

    /// Names in the selection that match no entity of `graph`
    fn unmatched<'a>(&'a self, graph: &'a EntityGraph) -> impl Iterator<Item = &'a str> {
        self.include
            .iter()
            .chain(&self.exclude)
            .filter(move |name| graph.find(name).is_none() && graph.find_by_table(name).is_none())
            .map(String::as_str)
    }
}

/// Everything one run needs besides the schema source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    /// Backend id or alias
    pub backend: String,
    pub project: ProjectContext,
    pub groups: Grouping,
    pub ir: IrOptions,
    pub selection: Selection,
    /// Worker threads for entity rendering; 1 renders on the calling thread
    pub render_threads: usize,
    /// Template name → replacement body
    pub template_overrides: BTreeMap<String, String>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            backend: Backend::DotNet.id().to_string(),
            project: ProjectContext::default(),
            groups: Grouping::default(),
            ir: IrOptions::default(),
            selection: Selection::default(),
            render_threads: 1,
            template_overrides: BTreeMap::new(),
        }
    }
}

impl GenerationRequest {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }
}

/// A template that failed for one entity (or for the project)
#[derive(Debug)]
pub struct RenderFailure {
    pub entity: String,
    pub layer: Layer,
    pub error: GenerateError,
}

/// Result of a run: what rendered, what failed and every warning
#[derive(Debug)]
pub struct GenerationOutcome {
    pub backend: Backend,
    /// Sorted by path
    pub artifacts: Vec<FileArtifact>,
    pub diagnostics: Diagnostics,
    pub failures: Vec<RenderFailure>,
}

impl GenerationOutcome {
    /// True when every template rendered
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolved views of one run
struct Prepared {
    graph: EntityGraph,
    views: Vec<EntityView>,
    associations: Vec<AssociationView>,
    groups: Vec<GroupView>,
    diagnostics: Diagnostics,
}

/// A validated backend and compiled templates, ready to run against a schema source
pub struct Pipeline {
    generator: Box<dyn Generator>,
    renderer: Renderer,
    project: ProjectView,
    request: GenerationRequest,
}

impl Pipeline {
    /// Select the backend and compile its templates. Nothing is read yet.
    pub fn new(request: GenerationRequest) -> Result<Self> {
        let generator = create_generator(&request.backend)?;
        let project = generator.project_view(&request.project)?;

        let mut templates = generator.templates();
        for (name, body) in &request.template_overrides {
            if !templates.override_body(name, body.as_str()) {
                return Err(GenerateError::TemplateRegistration {
                    template: name.clone(),
                    message: format!("backend '{}' has no such template", generator.backend()),
                });
            }
        }
        let renderer = Renderer::new(templates)?;

        Ok(Self {
            generator,
            renderer,
            project,
            request,
        })
    }

    pub fn backend(&self) -> Backend {
        self.generator.backend()
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Full run: every selected entity, every layer, every global artifact
    pub fn run(&self, connector: &dyn SchemaConnector) -> Result<GenerationOutcome> {
        let prepared = self.prepare(connector)?;
        log::info!(
            "Rendering {} entit(ies) for {} on {} thread(s)",
            prepared.views.len(),
            self.backend(),
            self.request.render_threads.max(1)
        );

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for (entity, result) in self.render_entities(&prepared.views) {
            match result {
                Ok(rendered) => artifacts.extend(rendered),
                Err((layer, error)) => {
                    log::error!("{}", error);
                    failures.push(RenderFailure { entity, layer, error });
                }
            }
        }

        let input = GlobalInput {
            project: &self.project,
            entities: &prepared.views,
            associations: &prepared.associations,
            groups: &prepared.groups,
        };
        for result in self.generator.global_artifacts(&self.renderer, input) {
            match result {
                Ok(artifact) => artifacts.push(artifact),
                Err(error) => {
                    log::error!("{}", error);
                    failures.push(RenderFailure {
                        entity: "project".to_string(),
                        layer: Layer::Project,
                        error,
                    });
                }
            }
        }

        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        log::info!(
            "Generated {} file(s) with {} failure(s) and {} diagnostic(s)",
            artifacts.len(),
            failures.len(),
            prepared.diagnostics.len()
        );

        Ok(GenerationOutcome {
            backend: self.backend(),
            artifacts,
            diagnostics: prepared.diagnostics,
            failures,
        })
    }

    /// Render one layer of one entity; [`Layer::Project`] renders the global artifacts
    pub fn preview(&self, connector: &dyn SchemaConnector, entity: &str, layer: Layer) -> Result<Vec<FileArtifact>> {
        if layer != Layer::Project && !self.generator.layers().contains(&layer) {
            return Err(GenerateError::UnsupportedLayer {
                backend: self.backend().to_string(),
                layer: layer.to_string(),
            });
        }

        let prepared = self.prepare(connector)?;
        if layer == Layer::Project {
            let input = GlobalInput {
                project: &self.project,
                entities: &prepared.views,
                associations: &prepared.associations,
                groups: &prepared.groups,
            };
            return self.generator.global_artifacts(&self.renderer, input).into_iter().collect();
        }

        let found = prepared
            .graph
            .find(entity)
            .or_else(|| prepared.graph.find_by_table(entity))
            .ok_or_else(|| GenerateError::UnknownEntity(entity.to_string()))?;
        let view = prepared
            .views
            .iter()
            .find(|v| v.name == found.name)
            .ok_or_else(|| GenerateError::UnknownEntity(entity.to_string()))?;

        self.renderer.render_layer(view, &self.project, layer)
    }

    /// Introspect, build the graph and resolve the views of the selected entities
    fn prepare(&self, connector: &dyn SchemaConnector) -> Result<Prepared> {
        let introspection = introspect(connector)?;
        let mut diagnostics = introspection.diagnostics;

        log::info!("Building IR from {} table(s)", introspection.schema.tables.len());
        let build = IrBuilder::new(&introspection.schema, self.request.ir)
            .with_skipped(introspection.skipped)
            .build()?;
        diagnostics.merge(build.diagnostics);
        let graph = build.graph;

        let selection = &self.request.selection;
        for name in selection.unmatched(&graph) {
            log::warn!("Selection entry '{}' matches no entity", name);
        }
        let selected: Vec<EntityId> = graph.iter().filter(|e| selection.selects(e)).map(|e| e.id).collect();
        log::debug!("Selected {} of {} entities", selected.len(), graph.len());

        let builder = ViewBuilder::new(
            &graph,
            self.generator.mapping(),
            self.generator.conventions(),
            &self.request.groups,
            selected.iter().copied(),
        );
        let views: Vec<EntityView> = selected
            .iter()
            .map(|&id| builder.entity(graph.get(id), &mut diagnostics))
            .collect();
        let associations = builder.associations();
        let groups = builder.groups(&views);

        Ok(Prepared {
            graph,
            views,
            associations,
            groups,
            diagnostics,
        })
    }

    /// Render every layer of every view. A failing template fails only its entity.
    fn render_entities(&self, views: &[EntityView]) -> Vec<(String, std::result::Result<Vec<FileArtifact>, (Layer, GenerateError)>)> {
        let render = |view: &EntityView| (view.name.clone(), self.render_entity(view));

        let threads = self.request.render_threads;
        if threads > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => return pool.install(|| views.par_iter().map(render).collect()),
                Err(e) => log::warn!("Could not start render pool ({}); rendering sequentially", e),
            }
        }
        views.iter().map(render).collect()
    }

    fn render_entity(&self, view: &EntityView) -> std::result::Result<Vec<FileArtifact>, (Layer, GenerateError)> {
        let mut artifacts = Vec::new();
        for &layer in self.generator.layers() {
            let rendered = self
                .renderer
                .render_layer(view, &self.project, layer)
                .map_err(|e| (layer, e))?;
            artifacts.extend(rendered);
        }
        log::debug!("Rendered {} file(s) for {}", artifacts.len(), view.name);
        Ok(artifacts)
    }
}

/// Open the source, read it and release it before returning
fn introspect(connector: &dyn SchemaConnector) -> Result<Introspection> {
    log::info!("Opening schema source");
    let mut source = connector.connect()?;
    let result = Introspector::new(&mut *source).read();
    drop(source);
    log::debug!("Schema source released");
    result
}

/// Run `request` against `connector`
pub fn generate(connector: &dyn SchemaConnector, request: &GenerationRequest) -> Result<GenerationOutcome> {
    Pipeline::new(request.clone())?.run(connector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawColumn, RawConstraint, RawSchema, RawTable, TableRef};

    fn keyed(name: &str) -> RawTable {
        let table_ref = TableRef::public(name);
        let mut table = RawTable::new(table_ref.clone());
        table.columns.push(RawColumn::new("id", "integer", 1));
        table.columns.push(RawColumn::new("name", "text", 2));
        table.constraints.push(RawConstraint::primary_key(&table_ref, &["id"]));
        table
    }

    fn schema() -> RawSchema {
        RawSchema {
            tables: vec![keyed("customers"), keyed("products")],
        }
    }

    #[test]
    fn test_grouping_matches_entity_or_table() {
        let build = IrBuilder::new(&schema(), IrOptions::default()).build().unwrap();
        let grouping = Grouping::new().with("Customer", "Sales").with("products", "Catalog");
        assert_eq!(grouping.group_of(build.graph.find("Customer").unwrap()), Some("Sales"));
        assert_eq!(grouping.group_of(build.graph.find("Product").unwrap()), Some("Catalog"));
    }

    #[test]
    fn test_selection_include_and_exclude() {
        let build = IrBuilder::new(&schema(), IrOptions::default()).build().unwrap();
        let customer = build.graph.find("Customer").unwrap();
        let product = build.graph.find("Product").unwrap();

        let include = Selection {
            include: vec!["customers".to_string()],
            exclude: vec![],
        };
        assert!(include.selects(customer));
        assert!(!include.selects(product));

        let exclude = Selection {
            include: vec![],
            exclude: vec!["Product".to_string()],
        };
        assert!(exclude.selects(customer));
        assert!(!exclude.selects(product));
    }

    #[test]
    fn test_selection_restricts_rendered_entities() {
        let mut request = GenerationRequest::new("fastapi");
        request.selection.include.push("Customer".to_string());
        let outcome = generate(&schema(), &request).unwrap();

        assert!(outcome.is_complete());
        assert!(outcome.artifacts.iter().any(|a| a.path == "app/models/customer.py"));
        assert!(!outcome.artifacts.iter().any(|a| a.path == "app/models/product.py"));
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let mut request = GenerationRequest::new("dotnet");
        request.template_overrides.insert("nonexistent".to_string(), "x".to_string());
        assert!(matches!(
            Pipeline::new(request),
            Err(GenerateError::TemplateRegistration { .. })
        ));
    }

    #[test]
    fn test_preview_renders_one_layer() {
        let pipeline = Pipeline::new(GenerationRequest::new("dotnet")).unwrap();
        let files = pipeline.preview(&schema(), "customers", Layer::Contract).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "src/Application/DTOs/Customer/CreateCustomerDto.cs",
                "src/Application/DTOs/Customer/UpdateCustomerDto.cs"
            ]
        );
    }

    #[test]
    fn test_preview_rejects_missing_layer_and_entity() {
        let pipeline = Pipeline::new(GenerationRequest::new("fastapi")).unwrap();
        assert!(matches!(
            pipeline.preview(&schema(), "Customer", Layer::Validation),
            Err(GenerateError::UnsupportedLayer { .. })
        ));
        assert!(matches!(
            pipeline.preview(&schema(), "Invoice", Layer::DomainEntity),
            Err(GenerateError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: GenerationRequest = serde_json::from_str(r#"{"backend": "python", "groups": {"Customer": "Sales"}}"#).unwrap();
        assert_eq!(request.render_threads, 1);
        assert_eq!(request.project.project_name, "GeneratedApp");
        assert!(!request.groups.is_empty());
    }
}
