//! Runs the `loko` binary against temporary projects
//!
//! Only paths that need neither Docker nor a cloud account are covered.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    project: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let home = dir.path().join("loko");
        fs::create_dir_all(home.join("shared/extensions"))?;

        let project = home.join("projects/shop");
        fs::create_dir_all(&project)?;
        let route = r#"{"__class__": "Node", "id": "n1", "data": {"name": "Route", "options": {"values": {"path": "predict"}}}}"#;
        fs::write(
            project.join("loko.project"),
            format!(
                r#"{{"__class__": "Project", "id": "shop-id", "name": "shop", "graphs": {{"main": {{"__class__": "Graph", "nodes": [{route}], "edges": []}}}}}}"#
            ),
        )?;

        let config = dir.path().join("deploy.yaml");
        fs::write(
            &config,
            format!("loko_home: {}\ncompany: acme\n", home.display()),
        )?;

        Ok(Self {
            dir,
            project,
            config,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Ok(Command::new(env!("CARGO_BIN_EXE_loko"))
            .args(args)
            .arg("--project")
            .arg(&self.project)
            .arg("--config")
            .arg(&self.config)
            .current_dir(self.dir.path())
            .output()?)
    }

    fn write_state(&self, json: &str) -> Result<()> {
        fs::write(self.project.join("plan.json"), json)?;
        Ok(())
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn manifest(project: &Path) -> PathBuf {
    project.join("docker-compose.yml")
}

#[test]
fn test_info_without_instance_lists_routes() -> Result<()> {
    let ws = Workspace::new()?;
    let output = ws.run(&["info"])?;

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("No instance"));
    assert!(out.contains("Endpoint: routes/orchestrator/endpoints/shop-id/predict"));
    Ok(())
}

#[test]
fn test_destroy_without_instance_fails() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write_state(r#"{"https": true}"#)?;

    let output = ws.run(&["destroy"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("there is no instance to destroy"));

    let state = fs::read_to_string(ws.project.join("plan.json"))?;
    assert!(state.contains("\"https\": true"));
    Ok(())
}

#[test]
fn test_plan_refuses_to_overwrite_manifest() -> Result<()> {
    let ws = Workspace::new()?;
    fs::write(manifest(&ws.project), "version: '3.3'\nservices: {}\n")?;

    let output = ws.run(&["plan"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--overwrite"));
    assert_eq!(
        fs::read_to_string(manifest(&ws.project))?,
        "version: '3.3'\nservices: {}\n"
    );
    Ok(())
}

#[test]
fn test_deploy_preconditions() -> Result<()> {
    let ws = Workspace::new()?;

    let output = ws.run(&["deploy"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("run `loko plan` first"));

    fs::write(manifest(&ws.project), "version: '3.3'\n")?;
    let output = ws.run(&["deploy"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("there is no instance for this project"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let ws = Workspace::new()?;
    let output = Command::new(env!("CARGO_BIN_EXE_loko"))
        .args(["info", "--config"])
        .arg(ws.dir.path().join("missing.yaml"))
        .arg("--project")
        .arg(&ws.project)
        .output()?;

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
    Ok(())
}
