//! Scoped staging area inside a build context
//!
//! Files that have to end up in an image but live outside the build context
//! (resources, extension includes, descriptors) are copied into a temporary
//! directory created inside the context. The directory is removed when the
//! [`StagingDir`] is dropped, whatever the outcome of the build.

use crate::{Error, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path};
use tempfile::TempDir;

const PREFIX: &str = ".loko-staging-";

/// A temporary directory inside a build context
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
    name: String,
}

impl StagingDir {
    /// Create a fresh staging directory inside `context`
    pub fn new_in(context: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(PREFIX).tempdir_in(context)?;
        let name = dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self { dir, name })
    }

    /// Absolute path of the directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory name, which is its path relative to the build context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Context-relative path (with `/` separators) of `rel` inside the staging dir
    pub fn context_path(&self, rel: &Path) -> String {
        let mut out = self.name.clone();
        for part in normal_components(rel) {
            out.push('/');
            out.push_str(&part);
        }
        out
    }

    /// Copy a file or directory tree to `rel` inside the staging directory
    ///
    /// Returns the context-relative path of the copy.
    pub fn stage(&self, source: &Path, rel: &Path) -> Result<String> {
        if !source.exists() {
            return Err(Error::MissingResource(source.to_path_buf()));
        }
        let target = normal_components(rel)
            .iter()
            .fold(self.path().to_path_buf(), |acc, part| acc.join(part));
        if source.is_dir() {
            copy_tree(source, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, &target)?;
        }
        tracing::debug!(source = %source.display(), target = %target.display(), "staged");
        Ok(self.context_path(rel))
    }

    /// Remove the directory now, reporting errors
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// Whether `rel` names a staging directory (or something inside one)
pub fn is_staging_path(rel: &Path) -> bool {
    rel.components().next().is_some_and(|first| {
        matches!(first, Component::Normal(name) if name.to_string_lossy().starts_with(PREFIX))
    })
}

// Drops `.`/`..`/root parts so a staged path can never escape the staging dir.
fn normal_components(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target)?;
    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .follow_links(true)
        .build();
    for entry in walker {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest = target.join(rel);
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_removed_on_drop() {
        let context = tempfile::tempdir().unwrap();
        let path: PathBuf;
        {
            let staging = StagingDir::new_in(context.path()).unwrap();
            path = staging.path().to_path_buf();
            assert!(path.is_dir());
            assert!(staging.name().starts_with(PREFIX));
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_stage_file_and_tree() {
        let context = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join("models/nested")).unwrap();
        fs::write(home.path().join("models/a.bin"), b"a").unwrap();
        fs::write(home.path().join("models/nested/b.bin"), b"b").unwrap();
        fs::write(home.path().join("single.txt"), b"s").unwrap();

        let staging = StagingDir::new_in(context.path()).unwrap();
        let rel = staging
            .stage(&home.path().join("models"), Path::new("data/models"))
            .unwrap();
        assert_eq!(rel, format!("{}/data/models", staging.name()));
        assert!(staging.path().join("data/models/nested/b.bin").is_file());

        staging
            .stage(&home.path().join("single.txt"), Path::new("../../x/single.txt"))
            .unwrap();
        assert!(staging.path().join("x/single.txt").is_file());
    }

    #[test]
    fn test_missing_source() {
        let context = tempfile::tempdir().unwrap();
        let staging = StagingDir::new_in(context.path()).unwrap();
        let err = staging
            .stage(&context.path().join("nope"), Path::new("nope"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingResource(_)));
    }

    #[test]
    fn test_is_staging_path() {
        assert!(is_staging_path(Path::new(".loko-staging-abc/data/x")));
        assert!(!is_staging_path(Path::new("src/.loko-staging-abc")));
    }
}
