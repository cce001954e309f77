//! Template rendering
//!
//! Templates are Handlebars sources registered once per pipeline. Each
//! template has a body and an output path, and both are rendered against a
//! pre-resolved view. The registry runs in strict mode, so a reference to a
//! missing value is an error rather than an empty string.

use crate::{GenerateError, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

mod helpers;
pub mod view;

pub use view::{
    AssociationColumnView, AssociationView, Conventions, EntityView, FieldView, ForeignKeyConstraintView, GroupView,
    ProjectView, RelationshipView, ViewBuilder,
};

/// Architectural layer an artifact belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    DomainEntity,
    DataAccess,
    Contract,
    Validation,
    Service,
    ApiSurface,
    /// Global, non-entity artifacts
    Project,
}

impl Layer {
    pub const ALL: [Layer; 7] = [
        Layer::DomainEntity,
        Layer::DataAccess,
        Layer::Contract,
        Layer::Validation,
        Layer::Service,
        Layer::ApiSurface,
        Layer::Project,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::DomainEntity => "domain-entity",
            Layer::DataAccess => "data-access",
            Layer::Contract => "contract",
            Layer::Validation => "validation",
            Layer::Service => "service",
            Layer::ApiSurface => "api-surface",
            Layer::Project => "project",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Layer::ALL
            .iter()
            .copied()
            .find(|layer| layer.as_str() == s)
            .ok_or_else(|| format!("unknown layer '{}'", s))
    }
}

/// Per-entity template
#[derive(Debug, Clone)]
pub struct LayerTemplate {
    pub layer: Layer,
    pub name: String,
    /// Output path template, rendered against the same context as the body
    pub path: String,
    pub body: String,
}

impl LayerTemplate {
    pub fn new(layer: Layer, name: impl Into<String>, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            layer,
            name: name.into(),
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Project-wide template rendered once per run, or once per entity group
#[derive(Debug, Clone)]
pub struct GlobalTemplate {
    pub name: String,
    pub path: String,
    pub body: String,
    pub per_group: bool,
}

impl GlobalTemplate {
    pub fn new(name: impl Into<String>, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            body: body.into(),
            per_group: false,
        }
    }

    /// Template rendered against each group in turn
    pub fn per_group(name: impl Into<String>, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            per_group: true,
            ..Self::new(name, path, body)
        }
    }
}

/// All templates of one backend
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    pub entity: Vec<LayerTemplate>,
    pub global: Vec<GlobalTemplate>,
}

impl TemplateSet {
    pub fn for_layer(&self, layer: Layer) -> impl Iterator<Item = &LayerTemplate> {
        self.entity.iter().filter(move |t| t.layer == layer)
    }

    /// Replace the body of a template by name; returns false when no template matched
    pub fn override_body(&mut self, name: &str, body: impl Into<String>) -> bool {
        let body = body.into();
        if let Some(template) = self.entity.iter_mut().find(|t| t.name == name) {
            template.body = body;
            return true;
        }
        if let Some(template) = self.global.iter_mut().find(|t| t.name == name) {
            template.body = body;
            return true;
        }
        false
    }
}

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArtifact {
    /// Relative path using `/` separators
    pub path: String,
    pub content: String,
    pub layer: Layer,
}

/// Context handed to per-entity templates
#[derive(Serialize)]
struct EntityContext<'a> {
    entity: &'a EntityView,
    project: &'a ProjectView,
}

/// Compiled template registry
pub struct Renderer {
    handlebars: Handlebars<'static>,
    templates: TemplateSet,
}

impl Renderer {
    pub fn new(templates: TemplateSet) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        helpers::register(&mut handlebars);

        let sources = templates
            .entity
            .iter()
            .map(|t| (&t.name, &t.path, &t.body))
            .chain(templates.global.iter().map(|t| (&t.name, &t.path, &t.body)));
        for (name, path, body) in sources {
            Self::register(&mut handlebars, name, body)?;
            Self::register(&mut handlebars, &path_template(name), path)?;
        }

        log::debug!(
            "Registered {} entity and {} global templates",
            templates.entity.len(),
            templates.global.len()
        );
        Ok(Self { handlebars, templates })
    }

    fn register(handlebars: &mut Handlebars<'static>, name: &str, source: &str) -> Result<()> {
        handlebars
            .register_template_string(name, source)
            .map_err(|e| GenerateError::TemplateRegistration {
                template: name.to_string(),
                message: e.to_string(),
            })
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Render every template of `layer` for one entity
    pub fn render_layer(&self, entity: &EntityView, project: &ProjectView, layer: Layer) -> Result<Vec<FileArtifact>> {
        let context = EntityContext { entity, project };
        self.templates
            .for_layer(layer)
            .map(|template| self.render_file(&template.name, &entity.name, layer, &context))
            .collect()
    }

    /// Render a global template by name
    pub fn render_global<T: Serialize>(&self, name: &str, context: &T) -> Result<FileArtifact> {
        self.render_file(name, "project", Layer::Project, context)
    }

    fn render_file<T: Serialize>(&self, template: &str, subject: &str, layer: Layer, context: &T) -> Result<FileArtifact> {
        let path = self.render_template(&path_template(template), template, subject, context)?;
        let content = self.render_template(template, template, subject, context)?;
        log::debug!("Rendered {} for {}", path, subject);
        Ok(FileArtifact {
            path: path.trim().to_string(),
            content,
            layer,
        })
    }

    fn render_template<T: Serialize>(&self, registered: &str, template: &str, subject: &str, context: &T) -> Result<String> {
        self.handlebars
            .render(registered, context)
            .map_err(|e| GenerateError::TemplateRender {
                template: template.to_string(),
                entity: subject.to_string(),
                message: e.to_string(),
            })
    }
}

fn path_template(name: &str) -> String {
    format!("{}@path", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer(body: &str) -> Renderer {
        let set = TemplateSet {
            entity: vec![],
            global: vec![GlobalTemplate::new("readme", "docs/{{kebab_case title}}.md", body)],
        };
        Renderer::new(set).unwrap()
    }

    #[test]
    fn test_layer_ids_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(layer.as_str().parse::<Layer>().unwrap(), layer);
        }
        assert!("persistence".parse::<Layer>().is_err());
    }

    #[test]
    fn test_global_path_is_rendered() {
        let artifact = renderer("# {{title}}\n")
            .render_global("readme", &json!({ "title": "OrderItem" }))
            .unwrap();
        assert_eq!(artifact.path, "docs/order-item.md");
        assert_eq!(artifact.content, "# OrderItem\n");
        assert_eq!(artifact.layer, Layer::Project);
    }

    #[test]
    fn test_output_is_not_html_escaped() {
        let artifact = renderer("List<{{title}}> & more")
            .render_global("readme", &json!({ "title": "Order" }))
            .unwrap();
        assert_eq!(artifact.content, "List<Order> & more");
    }

    #[test]
    fn test_unresolved_reference_fails() {
        let err = renderer("{{missing}}")
            .render_global("readme", &json!({ "title": "Order" }))
            .unwrap_err();
        match err {
            GenerateError::TemplateRender { template, entity, .. } => {
                assert_eq!(template, "readme");
                assert_eq!(entity, "project");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_template_fails_registration() {
        let set = TemplateSet {
            entity: vec![],
            global: vec![GlobalTemplate::new("broken", "x.txt", "{{#each items}}")],
        };
        let err = Renderer::new(set).err().unwrap();
        assert!(matches!(err, GenerateError::TemplateRegistration { .. }));
    }
}
