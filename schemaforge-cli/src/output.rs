//! Writes generated artifacts under an output directory

use anyhow::{bail, Context, Result};
use schemaforge::FileArtifact;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Write every artifact below `root`. A non-empty `root` is refused unless `force` is set.
pub fn write_artifacts(root: &Path, artifacts: &[FileArtifact], force: bool) -> Result<usize> {
    if root.exists() && !force && !is_empty_dir(root)? {
        bail!(
            "Output directory {} is not empty (use --force to overwrite)",
            root.display()
        );
    }

    for artifact in artifacts {
        let path = target_path(root, &artifact.path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, &artifact.content).with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
    }

    Ok(artifacts.len())
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(entries.next().is_none())
}

/// Resolve a `/`-separated relative artifact path, refusing anything that escapes `root`
fn target_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("Refusing to write outside the output directory: {}", relative.display());
    }
    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemaforge::Layer;

    fn artifact(path: &str) -> FileArtifact {
        FileArtifact {
            path: path.to_string(),
            content: "content".to_string(),
            layer: Layer::Project,
        }
    }

    #[test]
    fn test_writes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_artifacts(dir.path(), &[artifact("app/models/user.py")], false).unwrap();
        assert_eq!(written, 1);
        assert_eq!(fs::read_to_string(dir.path().join("app/models/user.py")).unwrap(), "content");
    }

    #[test]
    fn test_refuses_non_empty_directory_without_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();
        assert!(write_artifacts(dir.path(), &[artifact("a.txt")], false).is_err());
        assert!(write_artifacts(dir.path(), &[artifact("a.txt")], true).is_ok());
    }

    #[test]
    fn test_refuses_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_artifacts(dir.path(), &[artifact("../evil.txt")], false).is_err());
        assert!(write_artifacts(&dir.path().join("out"), &[artifact("/etc/passwd")], false).is_err());
    }
}
