//! Dockerfile synthesis

use crate::{Error, Result};
use std::path::Path;

/// An in-memory Dockerfile, one instruction per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dockerfile {
    lines: Vec<String>,
}

impl Dockerfile {
    /// Start from an existing Dockerfile on disk
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingDockerfile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            lines: text.lines().map(str::to_string).collect(),
        })
    }

    /// Start with `FROM <image>`
    pub fn from_image(image: &str) -> Self {
        Self {
            lines: vec![format!("FROM {image}")],
        }
    }

    /// Append `COPY <src> <dest>`
    pub fn copy(mut self, src: &str, dest: &str) -> Self {
        self.lines.push(format!("COPY {src} {dest}"));
        self
    }

    /// Append `RUN <command>`
    pub fn run(mut self, command: &str) -> Self {
        self.lines.push(format!("RUN {command}"));
        self
    }

    /// Append `CMD <command>`
    pub fn cmd(mut self, command: &str) -> Self {
        self.lines.push(format!("CMD {command}"));
        self
    }

    /// Instructions in order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The file contents
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let dockerfile = Dockerfile::from_image("lokoai/loko-orchestrator:0.0.4-dev")
            .run("mkdir -p /root/loko/projects/shop")
            .copy(".", "/root/loko/projects/shop/")
            .cmd("python services.py");
        assert_eq!(
            dockerfile.render(),
            "FROM lokoai/loko-orchestrator:0.0.4-dev\n\
             RUN mkdir -p /root/loko/projects/shop\n\
             COPY . /root/loko/projects/shop/\n\
             CMD python services.py\n"
        );
    }

    #[test]
    fn test_from_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dockerfile");
        std::fs::write(&path, "FROM python:3.11\nCOPY . /app\n").unwrap();
        let dockerfile = Dockerfile::from_file(&path)
            .unwrap()
            .copy(".loko-staging-x/shared/fonts", "/usr/share/fonts");
        assert_eq!(dockerfile.lines().len(), 3);
        assert!(dockerfile.render().ends_with("COPY .loko-staging-x/shared/fonts /usr/share/fonts\n"));

        let missing = Dockerfile::from_file(&dir.path().join("absent"));
        assert!(matches!(missing, Err(Error::MissingDockerfile(_))));
    }
}
