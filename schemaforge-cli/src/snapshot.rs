//! Catalog snapshots on disk

use anyhow::{Context, Result};
use clap::ValueEnum;
use schemaforge::RawSchema;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotFormat {
    Json,
    Yaml,
}

impl SnapshotFormat {
    /// `.yaml` and `.yml` are YAML, anything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => SnapshotFormat::Yaml,
            _ => SnapshotFormat::Json,
        }
    }
}

pub fn load(path: &Path) -> Result<RawSchema> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let schema = match SnapshotFormat::from_path(path) {
        SnapshotFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON snapshot {}", path.display()))?,
        SnapshotFormat::Yaml => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML snapshot {}", path.display()))?,
    };
    Ok(schema)
}

pub fn render(schema: &RawSchema, format: SnapshotFormat) -> Result<String> {
    Ok(match format {
        SnapshotFormat::Json => serde_json::to_string_pretty(schema)?,
        SnapshotFormat::Yaml => serde_yaml::to_string(schema)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemaforge::{RawColumn, RawConstraint, RawTable, TableRef};

    fn schema() -> RawSchema {
        let users = TableRef::public("users");
        let mut table = RawTable::new(users.clone());
        table.columns.push(RawColumn::new("id", "integer", 1));
        table.constraints.push(RawConstraint::primary_key(&users, &["id"]));
        RawSchema { tables: vec![table] }
    }

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(SnapshotFormat::from_path(Path::new("shop.yml")), SnapshotFormat::Yaml);
        assert_eq!(SnapshotFormat::from_path(Path::new("shop.json")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("shop")), SnapshotFormat::Json);
    }

    #[test]
    fn test_yaml_snapshot_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.yaml");
        fs::write(&path, render(&schema(), SnapshotFormat::Yaml).unwrap()).unwrap();
        assert_eq!(load(&path).unwrap(), schema());
    }
}
