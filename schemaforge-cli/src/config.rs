//! `schemaforge.toml` configuration

use anyhow::{Context, Result};
use schemaforge::{GenerationRequest, Grouping, IrOptions, JoinTablePolicy, ProjectContext, Selection};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "schemaforge.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    pub backend: Option<String>,
    pub project_name: Option<String>,
    /// Database to introspect
    pub database_url: Option<String>,
    /// Connection string written into the generated project; defaults to `database_url`
    pub app_connection_string: Option<String>,
    pub output: Option<PathBuf>,
    pub render_threads: Option<usize>,
    /// Catalog schemas to read; empty reads every user schema
    pub schemas: Vec<String>,
    pub groups: Grouping,
    pub selection: Selection,
    pub join_tables: JoinTablePolicy,
    pub relationships: RelationshipConfig,
    /// Template name → file whose contents replace the built-in body
    pub templates: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationshipConfig {
    pub detect_one_to_one: bool,
}

impl ForgeConfig {
    /// Load `path`, or `schemaforge.toml` from the working directory when present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
        log::info!("Loaded configuration from {}", path.display());

        // Template paths are relative to the config file
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config.resolve_template_paths(&base))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn resolve_template_paths(mut self, base: &Path) -> Self {
        for path in self.templates.values_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Build a request for `backend`, reading template overrides from disk
    pub fn request(&self, backend: &str) -> Result<GenerationRequest> {
        let mut template_overrides = BTreeMap::new();
        for (name, path) in &self.templates {
            let body = fs::read_to_string(path)
                .with_context(|| format!("Failed to read template '{}' from {}", name, path.display()))?;
            template_overrides.insert(name.clone(), body);
        }

        let defaults = ProjectContext::default();
        Ok(GenerationRequest {
            backend: backend.to_string(),
            project: ProjectContext {
                project_name: self.project_name.clone().unwrap_or(defaults.project_name),
                connection_string: self
                    .app_connection_string
                    .clone()
                    .or_else(|| self.database_url.clone())
                    .unwrap_or_default(),
            },
            groups: self.groups.clone(),
            ir: IrOptions {
                join_tables: self.join_tables,
                detect_one_to_one: self.relationships.detect_one_to_one,
            },
            selection: self.selection.clone(),
            render_threads: self.render_threads.unwrap_or(1).max(1),
            template_overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ForgeConfig::parse(
            r#"
            backend = "fastapi"
            project_name = "shop"
            database_url = "postgres://app@db/shop"
            render_threads = 4
            schemas = ["public", "billing"]

            [groups]
            Customer = "Sales"
            invoices = "Billing"

            [selection]
            exclude = ["audit_log"]

            [join_tables]
            max_extra_columns = 1

            [relationships]
            detect_one_to_one = true
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.as_deref(), Some("fastapi"));
        assert_eq!(config.schemas, vec!["public", "billing"]);
        assert!(config.join_tables.enabled);
        assert_eq!(config.join_tables.max_extra_columns, 1);

        let request = config.request("fastapi").unwrap();
        assert_eq!(request.project.project_name, "shop");
        assert_eq!(request.project.connection_string, "postgres://app@db/shop");
        assert_eq!(request.render_threads, 4);
        assert!(request.ir.detect_one_to_one);
        assert_eq!(request.selection.exclude, vec!["audit_log"]);
    }

    #[test]
    fn test_app_connection_string_wins() {
        let config = ForgeConfig::parse(
            r#"
            database_url = "postgres://admin@db/shop"
            app_connection_string = "postgres://app@db/shop"
            "#,
        )
        .unwrap();
        let request = config.request("dotnet").unwrap();
        assert_eq!(request.project.connection_string, "postgres://app@db/shop");
        assert_eq!(request.project.project_name, "GeneratedApp");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ForgeConfig::parse("bakend = \"dotnet\"").is_err());
    }
}
