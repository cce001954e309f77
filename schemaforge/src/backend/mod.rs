//! Target backends
//!
//! A closed set of backends, each behind the [`Generator`] trait. A generator
//! owns its type mapping, naming conventions and templates; adding a backend
//! adds a module here and touches no other backend.

use crate::mapping::TypeMapping;
use crate::naming;
use crate::render::{
    AssociationView, Conventions, EntityView, FileArtifact, GroupView, Layer, ProjectView, Renderer, TemplateSet,
};
use crate::{GenerateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod connection;
mod dotnet;
mod fastapi;

pub use connection::ConnectionInfo;
pub use dotnet::DotNetGenerator;
pub use fastapi::FastApiGenerator;

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    DotNet,
    FastApi,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::DotNet, Backend::FastApi];

    pub fn id(self) -> &'static str {
        match self {
            Backend::DotNet => "dotnet",
            Backend::FastApi => "fastapi",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Backend::DotNet => &["netcore", "csharp", "aspnet"],
            Backend::FastApi => &["python"],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Backend::DotNet => "ASP.NET Core Web API with Dapper repositories",
            Backend::FastApi => "FastAPI service with async SQLAlchemy",
        }
    }

    fn available() -> String {
        Backend::ALL.iter().map(|b| b.id()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Backend {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Backend::ALL
            .iter()
            .copied()
            .find(|b| b.id() == wanted || b.aliases().contains(&wanted.as_str()))
            .ok_or_else(|| GenerateError::UnsupportedBackend {
                requested: s.to_string(),
                available: Backend::available(),
            })
    }
}

/// Project-level inputs shared by every backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub project_name: String,
    /// Raw connection descriptor, normalized per backend
    pub connection_string: String,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project_name: "GeneratedApp".to_string(),
            connection_string: String::new(),
        }
    }
}

/// Everything global templates can see
#[derive(Debug, Clone, Copy)]
pub struct GlobalInput<'a> {
    pub project: &'a ProjectView,
    pub entities: &'a [EntityView],
    pub associations: &'a [AssociationView],
    pub groups: &'a [GroupView],
}

#[derive(Serialize)]
struct GlobalContext<'a> {
    project: &'a ProjectView,
    entities: &'a [EntityView],
    associations: &'a [AssociationView],
    has_associations: bool,
    groups: &'a [GroupView],
}

#[derive(Serialize)]
struct GroupContext<'a> {
    project: &'a ProjectView,
    group: &'a GroupView,
}

/// A code generator for one backend
pub trait Generator: Send + Sync {
    fn backend(&self) -> Backend;

    /// Per-entity layers, in generation order
    fn layers(&self) -> &'static [Layer];

    fn mapping(&self) -> &TypeMapping;

    fn conventions(&self) -> Conventions;

    fn templates(&self) -> TemplateSet;

    /// Normalize a raw connection descriptor for the generated project
    fn connection_string_for(&self, raw: &str) -> Result<String>;

    /// Project view handed to every template
    fn project_view(&self, project: &ProjectContext) -> Result<ProjectView> {
        Ok(ProjectView {
            name: naming::to_pascal_case(&project.project_name),
            snake: naming::to_snake_case(&project.project_name),
            kebab: naming::to_kebab_case(&project.project_name),
            connection_string: self.connection_string_for(&project.connection_string)?,
        })
    }

    /// Render every global template. Failures are returned per template.
    fn global_artifacts(&self, renderer: &Renderer, input: GlobalInput<'_>) -> Vec<Result<FileArtifact>> {
        render_globals(renderer, input)
    }
}

/// Project templates render once; group templates once per group
fn render_globals(renderer: &Renderer, input: GlobalInput<'_>) -> Vec<Result<FileArtifact>> {
    let context = GlobalContext {
        project: input.project,
        entities: input.entities,
        associations: input.associations,
        has_associations: !input.associations.is_empty(),
        groups: input.groups,
    };

    let mut artifacts = Vec::new();
    for template in &renderer.templates().global {
        if template.per_group {
            for group in input.groups {
                let context = GroupContext {
                    project: input.project,
                    group,
                };
                artifacts.push(renderer.render_global(&template.name, &context));
            }
        } else {
            artifacts.push(renderer.render_global(&template.name, &context));
        }
    }
    artifacts
}

/// Look up a generator by backend id or alias
pub fn create_generator(id: &str) -> Result<Box<dyn Generator>> {
    let backend: Backend = id.parse()?;
    log::debug!("Selected backend {}", backend);
    Ok(generator_for(backend))
}

pub fn generator_for(backend: Backend) -> Box<dyn Generator> {
    match backend {
        Backend::DotNet => Box::new(DotNetGenerator::new()),
        Backend::FastApi => Box::new(FastApiGenerator::new()),
    }
}

/// Connection string of `raw` reformatted for `backend`
pub fn connection_string_for(backend: &str, raw: &str) -> Result<String> {
    create_generator(backend)?.connection_string_for(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_aliases() {
        assert_eq!("dotnet".parse::<Backend>().unwrap(), Backend::DotNet);
        assert_eq!("CSharp".parse::<Backend>().unwrap(), Backend::DotNet);
        assert_eq!("python".parse::<Backend>().unwrap(), Backend::FastApi);
    }

    #[test]
    fn test_unknown_backend_lists_available() {
        let err = create_generator("rails").err().unwrap();
        match err {
            GenerateError::UnsupportedBackend { requested, available } => {
                assert_eq!(requested, "rails");
                assert_eq!(available, "dotnet, fastapi");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_connection_string_per_backend() {
        let raw = "postgresql://app:secret@db:5432/shop";
        assert_eq!(
            connection_string_for("dotnet", raw).unwrap(),
            "host=db;port=5432;database=shop;username=app;password=secret"
        );
        assert_eq!(
            connection_string_for("fastapi", raw).unwrap(),
            "postgresql+asyncpg://app:secret@db:5432/shop"
        );

        let key_value = "Host=db;Database=shop;Username=app;Password=secret";
        assert_eq!(
            connection_string_for("fastapi", key_value).unwrap(),
            "postgresql+asyncpg://app:secret@db:5432/shop"
        );
        assert_eq!(
            connection_string_for("dotnet", key_value).unwrap(),
            "host=db;port=5432;database=shop;username=app;password=secret"
        );

        let with_options = "postgresql://app:secret@db:5432/shop?sslmode=require&application_name=shop%20api";
        assert_eq!(
            connection_string_for("fastapi", with_options).unwrap(),
            "postgresql+asyncpg://app:secret@db:5432/shop?sslmode=require&application_name=shop%20api"
        );
        assert_eq!(
            connection_string_for("dotnet", with_options).unwrap(),
            "host=db;port=5432;database=shop;username=app;password=secret;sslmode=require;application_name=shop api"
        );
        assert_eq!(
            connection_string_for("fastapi", "Host=db;Database=shop;Username=app;Password=secret;SSL Mode=Require").unwrap(),
            "postgresql+asyncpg://app:secret@db:5432/shop?ssl%20mode=Require"
        );

        assert_eq!(connection_string_for("dotnet", "").unwrap(), "");
        assert_eq!(connection_string_for("fastapi", "").unwrap(), "");
        assert!(matches!(
            connection_string_for("fastapi", "not a descriptor"),
            Err(GenerateError::ConnectionString(_))
        ));
    }

    #[test]
    fn test_every_generator_has_templates_for_its_layers() {
        for backend in Backend::ALL {
            let generator = generator_for(backend);
            let templates = generator.templates();
            for layer in generator.layers() {
                assert!(
                    templates.for_layer(*layer).count() > 0,
                    "{} has no template for {}",
                    backend,
                    layer
                );
            }
            assert!(templates.entity.iter().all(|t| generator.layers().contains(&t.layer)));
            assert!(Renderer::new(templates).is_ok(), "{} templates must compile", backend);
        }
    }
}
