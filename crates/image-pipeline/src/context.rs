//! Build context packing
//!
//! A build context is the context directory as a gzip tarball. Paths listed
//! in the directory's `.dockerignore` are left out, except the `Dockerfile`
//! itself and any staging directory, which are always sent. Ignore patterns
//! are anchored at the context root, as the Docker daemon reads them.
//!
//! Deployment outputs that sit next to the project (`plan.json`, the compose
//! manifest, the proxy config and the TLS certificates) never enter a
//! context, whatever the ignore file says.

use crate::staging::is_staging_path;
use crate::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use loko_core::{compose, proxy, state};
use std::path::{Path, PathBuf};

/// File name of the ignore file
pub const IGNORE_FILE: &str = ".dockerignore";
/// Name of the Dockerfile entry in every context
pub const DOCKERFILE: &str = "Dockerfile";

/// Top-level entries that are never packed
pub const ALWAYS_EXCLUDED: [&str; 4] = [
    state::STATE_FILE,
    compose::COMPOSE_FILE,
    proxy::CONFIG_FILE,
    proxy::CERTS_DIR,
];

/// Where the Dockerfile of a context comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerfileSource {
    /// The `Dockerfile` in the context directory
    OnDisk,
    /// Generated content replacing any file on disk
    Inline(String),
}

/// A packed build context
#[derive(Debug, Clone)]
pub struct BuildContext {
    bytes: Vec<u8>,
    entries: Vec<String>,
}

impl BuildContext {
    /// Pack `dir` into a gzip tarball
    pub fn pack(dir: &Path, dockerfile: DockerfileSource) -> Result<Self> {
        if dockerfile == DockerfileSource::OnDisk && !dir.join(DOCKERFILE).is_file() {
            return Err(Error::MissingDockerfile(dir.to_path_buf()));
        }
        Self::pack_under(dir, dockerfile, None)
    }

    /// Pack `dir` with its files moved under `prefix/`
    ///
    /// Staging directories and the generated Dockerfile stay at the root, so
    /// `COPY <prefix>/ ...` picks up the directory's own files only.
    pub fn pack_nested(dir: &Path, dockerfile: String, prefix: &str) -> Result<Self> {
        Self::pack_under(dir, DockerfileSource::Inline(dockerfile), Some(prefix))
    }

    fn pack_under(dir: &Path, dockerfile: DockerfileSource, prefix: Option<&str>) -> Result<Self> {
        let ignore = load_ignore(dir)?;
        let mut tar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut entries = Vec::new();

        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let Ok(rel) = entry.path().strip_prefix(dir) else {
                continue;
            };
            if rel.as_os_str().is_empty() || is_excluded(rel) {
                continue;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let staged = is_staging_path(rel);
            let is_dockerfile = prefix.is_none() && rel == Path::new(DOCKERFILE);
            if is_dockerfile && matches!(dockerfile, DockerfileSource::Inline(_)) {
                continue;
            }
            if !is_dockerfile
                && !staged
                && ignore.matched_path_or_any_parents(rel, is_dir).is_ignore()
            {
                continue;
            }

            let name = match prefix {
                Some(prefix) if !staged => format!("{prefix}/{}", tar_name(rel)),
                _ => tar_name(rel),
            };
            if is_dir {
                tar.append_dir(&name, entry.path())?;
            } else {
                tar.append_path_with_name(entry.path(), &name)?;
            }
            entries.push(name);
        }

        if let DockerfileSource::Inline(content) = &dockerfile {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            tar.append_data(&mut header, DOCKERFILE, content.as_bytes())?;
            entries.push(DOCKERFILE.to_string());
        }

        let bytes = tar.into_inner()?.finish()?;
        tracing::debug!(
            context = %dir.display(),
            entries = entries.len(),
            bytes = bytes.len(),
            "packed build context"
        );
        Ok(Self { bytes, entries })
    }

    /// Entry names in archive order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Size of the compressed archive
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the archive is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The compressed archive
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn is_excluded(rel: &Path) -> bool {
    ALWAYS_EXCLUDED.iter().any(|name| rel.starts_with(name))
}

fn load_ignore(dir: &Path) -> Result<Gitignore> {
    let path = dir.join(IGNORE_FILE);
    let mut builder = GitignoreBuilder::new(dir);
    if path.is_file() {
        let text = std::fs::read_to_string(&path)?;
        for line in text.lines() {
            let Some(pattern) = anchored(line) else {
                continue;
            };
            builder
                .add_line(Some(path.clone()), &pattern)
                .map_err(|e| invalid_pattern(&path, e))?;
        }
    }
    builder.build().map_err(|e| invalid_pattern(&path, e))
}

/// Rewrite a `.dockerignore` line as a root-anchored gitignore pattern
///
/// Returns `None` for blank and comment lines.
fn anchored(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (negate, pattern) = match trimmed.strip_prefix('!') {
        Some(rest) => ("!", rest.trim()),
        None => ("", trimmed),
    };
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    if pattern.is_empty() || pattern == "." {
        return None;
    }
    Some(format!("{negate}/{pattern}"))
}

fn invalid_pattern(path: &Path, err: ignore::Error) -> Error {
    Error::InvalidIgnorePattern {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn tar_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of the context directory's Dockerfile
pub fn dockerfile_path(dir: &Path) -> PathBuf {
    dir.join(DOCKERFILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;

    fn unpack(context: BuildContext) -> Vec<(String, String)> {
        let bytes = context.into_bytes();
        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            if entry.header().entry_type().is_file() {
                entry.read_to_string(&mut content).unwrap();
            }
            out.push((name, content));
        }
        out
    }

    fn names(files: &[(String, String)]) -> Vec<&str> {
        files.iter().map(|(n, _)| n.trim_end_matches('/')).collect()
    }

    #[test]
    fn test_dockerignore_excludes_but_keeps_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM python:3.11\n").unwrap();
        fs::write(dir.path().join("app.py"), "print(1)\n").unwrap();
        fs::write(dir.path().join("secret.env"), "KEY=1\n").unwrap();
        fs::create_dir_all(dir.path().join("cache/deep")).unwrap();
        fs::write(dir.path().join("cache/deep/blob"), "x").unwrap();
        fs::write(
            dir.path().join(".dockerignore"),
            "# local files\n\n*.env\ncache\nDockerfile\n",
        )
        .unwrap();

        let files = unpack(BuildContext::pack(dir.path(), DockerfileSource::OnDisk).unwrap());
        assert_eq!(names(&files), vec![".dockerignore", "Dockerfile", "app.py"]);
    }

    #[test]
    fn test_inline_dockerfile_replaces_disk_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM old\n").unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();

        let context =
            BuildContext::pack(dir.path(), DockerfileSource::Inline("FROM new\n".into())).unwrap();
        assert_eq!(context.entries(), ["main.py".to_string(), "Dockerfile".to_string()]);

        let files = unpack(context);
        let dockerfiles: Vec<_> = files.iter().filter(|(n, _)| n == "Dockerfile").collect();
        assert_eq!(dockerfiles.len(), 1);
        assert_eq!(dockerfiles[0].1, "FROM new\n");
    }

    #[test]
    fn test_staging_survives_ignore_rules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".dockerignore"), ".*\n").unwrap();
        let staging = crate::StagingDir::new_in(dir.path()).unwrap();
        fs::write(staging.path().join("model.bin"), "m").unwrap();

        let context =
            BuildContext::pack(dir.path(), DockerfileSource::Inline("FROM x\n".into())).unwrap();
        let expected = format!("{}/model.bin", staging.name());
        assert!(context.entries().contains(&expected));
        assert!(!context.entries().contains(&".dockerignore".to_string()));
    }

    #[test]
    fn test_ignore_patterns_are_root_anchored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM x\n").unwrap();
        fs::write(dir.path().join("top.pyc"), "").unwrap();
        fs::create_dir_all(dir.path().join("pkg/logs")).unwrap();
        fs::write(dir.path().join("pkg/mod.pyc"), "").unwrap();
        fs::write(dir.path().join("pkg/logs/a.log"), "").unwrap();
        fs::write(dir.path().join("pkg/b.log"), "").unwrap();
        fs::write(dir.path().join(".dockerignore"), "*.pyc\n./pkg/logs/\n**/*.log\n!pkg/b.log\n").unwrap();

        let context = BuildContext::pack(dir.path(), DockerfileSource::OnDisk).unwrap();
        assert_eq!(
            context.entries(),
            [".dockerignore", "Dockerfile", "pkg", "pkg/b.log", "pkg/mod.pyc"]
        );
    }

    #[test]
    fn test_anchored() {
        assert_eq!(anchored("*.pyc").as_deref(), Some("/*.pyc"));
        assert_eq!(anchored("!/keep.txt").as_deref(), Some("!/keep.txt"));
        assert_eq!(anchored("./build/").as_deref(), Some("/build"));
        assert_eq!(anchored("  # note"), None);
        assert_eq!(anchored("."), None);
    }

    #[test]
    fn test_deployment_outputs_never_packed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM x\n").unwrap();
        fs::write(dir.path().join("app.py"), "").unwrap();
        fs::write(dir.path().join("plan.json"), "{}").unwrap();
        fs::write(dir.path().join("docker-compose.yml"), "version: '3.3'\n").unwrap();
        fs::write(dir.path().join("nginx.conf"), "server {}\n").unwrap();
        fs::create_dir_all(dir.path().join("certs")).unwrap();
        fs::write(dir.path().join("certs/key.pem"), "PRIVATE").unwrap();
        fs::write(dir.path().join(".dockerignore"), "!certs\n").unwrap();

        let context = BuildContext::pack(dir.path(), DockerfileSource::OnDisk).unwrap();
        assert_eq!(context.entries(), [".dockerignore", "Dockerfile", "app.py"]);
    }

    #[test]
    fn test_nested_pack_keeps_staging_at_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM local\n").unwrap();
        fs::write(dir.path().join("services.py"), "").unwrap();
        let staging = crate::StagingDir::new_in(dir.path()).unwrap();
        fs::write(staging.path().join("model.bin"), "m").unwrap();

        let context =
            BuildContext::pack_nested(dir.path(), "FROM base\n".into(), "project").unwrap();
        let staged = format!("{}/model.bin", staging.name());
        assert!(context.entries().contains(&staged));
        assert!(context.entries().contains(&"project/Dockerfile".to_string()));
        assert!(context.entries().contains(&"project/services.py".to_string()));
        assert!(
            context
                .entries()
                .iter()
                .all(|name| !name.starts_with("project/.loko-staging-"))
        );

        let files = unpack(context);
        let root_dockerfile: Vec<_> = files.iter().filter(|(n, _)| n == "Dockerfile").collect();
        assert_eq!(root_dockerfile.len(), 1);
        assert_eq!(root_dockerfile[0].1, "FROM base\n");
    }

    #[test]
    fn test_missing_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildContext::pack(dir.path(), DockerfileSource::OnDisk).unwrap_err();
        assert!(matches!(err, Error::MissingDockerfile(_)));
    }
}
