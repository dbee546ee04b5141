//! Read-only view over a `loko.project` file
//!
//! The project editor stores a graph of nodes whose `data` objects carry
//! arbitrary attributes. Only a handful of them matter for deployment, so every
//! node is classified into a [`NodeKind`] on load and the raw attributes are
//! kept alongside for anything else. A node may carry both `pname` and
//! `microservice`, so extension and component references are read from the
//! attributes directly rather than from the single kind.

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File name of the project description inside a project directory
pub const PROJECT_FILE: &str = "loko.project";

const CLASS_KEY: &str = "__class__";

/// Object classes the project editor may tag with `__class__`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectClass {
    Project,
    Template,
    Graph,
    Node,
    Edge,
    Endpoint,
    Comment,
}

impl ObjectClass {
    fn lookup(tag: &str) -> Option<Self> {
        match tag {
            "Project" => Some(Self::Project),
            "Template" => Some(Self::Template),
            "Graph" => Some(Self::Graph),
            "Node" => Some(Self::Node),
            "Edge" => Some(Self::Edge),
            "Endpoint" => Some(Self::Endpoint),
            "Comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

/// Walk the document and resolve every `__class__` tag
fn check_class_tags(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let Some(tag) = map.get(CLASS_KEY) {
                let name = tag.as_str().unwrap_or_default();
                if ObjectClass::lookup(name).is_none() {
                    return Err(Error::InvalidProject(format!("unknown object class {tag}")));
                }
            }
            map.values().try_for_each(check_class_tags)
        }
        Value::Array(items) => items.iter().try_for_each(check_class_tags),
        _ => Ok(()),
    }
}

/// What a node means for deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An input that reads a file from the shared data store
    ResourceInput {
        /// Path relative to the loko home
        path: String,
    },
    /// An HTTP route exposed through the gateway
    Route {
        /// Route path
        path: String,
    },
    /// A component provided by a global extension
    ExtensionRef {
        /// Extension name
        name: String,
    },
    /// A component provided by a built-in microservice such as `predictor`
    CoreComponentRef {
        /// Microservice name
        name: String,
    },
    /// Anything else
    Generic,
}

impl NodeKind {
    /// Classify a node from its `data` object
    ///
    /// Missing or oddly typed attributes never fail; the node just falls
    /// through to the next candidate kind.
    pub fn classify(data: &Map<String, Value>) -> Self {
        let options = data.get("options");
        let group = options.and_then(|o| o.get("group")).and_then(Value::as_str);

        if group == Some("Inputs") {
            let path = options
                .and_then(|o| o.pointer("/values/value/path"))
                .and_then(Value::as_str);
            if let Some(path) = path {
                return NodeKind::ResourceInput {
                    path: path.to_string(),
                };
            }
        }

        if data.get("name").and_then(Value::as_str) == Some("Route") {
            let path = options
                .and_then(|o| o.pointer("/values/path"))
                .and_then(Value::as_str);
            if let Some(path) = path {
                return NodeKind::Route {
                    path: path.to_string(),
                };
            }
        }

        if let Some(name) = data.get("pname").and_then(Value::as_str) {
            return NodeKind::ExtensionRef {
                name: name.to_string(),
            };
        }

        if let Some(name) = data.get("microservice").and_then(Value::as_str) {
            return NodeKind::CoreComponentRef {
                name: name.to_string(),
            };
        }

        NodeKind::Generic
    }
}

/// A node of a project graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Node id as stored by the editor
    pub id: String,
    /// Name of the graph (tab) holding the node
    pub graph: String,
    /// Classification
    pub kind: NodeKind,
    /// Raw `data` attributes
    pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    graphs: IndexMap<String, RawGraph>,
    #[serde(default)]
    global_extensions: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    data: Map<String, Value>,
}

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    path: PathBuf,
    id: String,
    name: String,
    nodes: Vec<Node>,
    declared_extensions: Vec<String>,
    has_dockerfile: bool,
}

impl Project {
    /// Load `<dir>/loko.project`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let file = dir.join(PROJECT_FILE);
        if !file.is_file() {
            return Err(Error::ProjectNotFound(dir.to_path_buf()));
        }
        let text = std::fs::read_to_string(&file)?;
        let project = Self::from_json(dir, &text)?;
        tracing::debug!(
            project = %project.name,
            nodes = project.nodes.len(),
            local_extension = project.has_dockerfile,
            "loaded project"
        );
        Ok(project)
    }

    /// Decode a project from its JSON text, treating `dir` as its location
    pub fn from_json(dir: impl AsRef<Path>, text: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(Error::InvalidProject("top level is not an object".into()));
        }
        if let Some(tag) = value.get(CLASS_KEY) {
            if ObjectClass::lookup(tag.as_str().unwrap_or_default()) != Some(ObjectClass::Project) {
                return Err(Error::InvalidProject(format!(
                    "top level object is a {tag}, expected a Project"
                )));
            }
        }
        check_class_tags(&value)?;

        let raw: RawProject = serde_json::from_value(value)
            .map_err(|e| Error::InvalidProject(e.to_string()))?;

        let slug = slug_of(dir);
        let mut nodes = Vec::new();
        for (graph, g) in raw.graphs {
            for node in g.nodes {
                nodes.push(Node {
                    id: match node.id {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    },
                    graph: graph.clone(),
                    kind: NodeKind::classify(&node.data),
                    data: node.data,
                });
            }
        }

        Ok(Self {
            path: dir.to_path_buf(),
            id: raw.id.unwrap_or_else(|| slug.clone()),
            name: raw.name.unwrap_or(slug),
            nodes,
            declared_extensions: raw
                .global_extensions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            has_dockerfile: dir.join("Dockerfile").is_file(),
        })
    }

    /// Project directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory name, used for image and service names
    pub fn slug(&self) -> String {
        slug_of(&self.path)
    }

    /// All nodes across all graphs, graph order then node order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether the project ships its own Dockerfile (a local extension)
    pub fn has_dockerfile(&self) -> bool {
        self.has_dockerfile
    }

    /// Resource paths read by input nodes, first occurrence order
    pub fn required_resources(&self) -> Vec<String> {
        self.collect(|node| match &node.kind {
            NodeKind::ResourceInput { path } => Some(path),
            _ => None,
        })
    }

    /// Global extensions referenced by graph nodes, then those listed in the
    /// project's `global_extensions`, deduplicated
    pub fn global_extensions(&self) -> Vec<String> {
        let mut names = self.collect(|node| string_attr(node, "pname"));
        for name in &self.declared_extensions {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Built-in microservices referenced by the graph, deduplicated
    pub fn core_components(&self) -> Vec<String> {
        self.collect(|node| string_attr(node, "microservice"))
    }

    /// Route paths exposed by the graph
    pub fn routes(&self) -> Vec<String> {
        self.collect(|node| match &node.kind {
            NodeKind::Route { path } => Some(path),
            _ => None,
        })
    }

    fn collect<'a, F>(&'a self, pick: F) -> Vec<String>
    where
        F: Fn(&'a Node) -> Option<&'a String>,
    {
        let mut seen = Vec::new();
        for node in &self.nodes {
            if let Some(value) = pick(node) {
                if !seen.contains(value) {
                    seen.push(value.clone());
                }
            }
        }
        seen
    }
}

fn string_attr<'a>(node: &'a Node, key: &str) -> Option<&'a String> {
    match node.data.get(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn slug_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_classify_resource_input() {
        let kind = NodeKind::classify(&data(json!({
            "name": "File Reader",
            "options": {"group": "Inputs", "values": {"value": {"path": "data/models/x.bin"}}}
        })));
        assert_eq!(
            kind,
            NodeKind::ResourceInput {
                path: "data/models/x.bin".into()
            }
        );
    }

    #[test]
    fn test_classify_route_and_refs() {
        let route = NodeKind::classify(&data(json!({
            "name": "Route",
            "options": {"values": {"path": "predict"}}
        })));
        assert_eq!(route, NodeKind::Route { path: "predict".into() });

        let ext = NodeKind::classify(&data(json!({"name": "OCR", "pname": "ocr"})));
        assert_eq!(ext, NodeKind::ExtensionRef { name: "ocr".into() });

        let core = NodeKind::classify(&data(json!({"microservice": "predictor"})));
        assert_eq!(
            core,
            NodeKind::CoreComponentRef {
                name: "predictor".into()
            }
        );
    }

    #[test]
    fn test_classify_tolerates_malformed_nodes() {
        let cases = [
            json!({}),
            json!({"options": {"group": "Inputs"}}),
            json!({"options": {"group": "Inputs", "values": {"value": null}}}),
            json!({"name": "Route", "options": {"values": {}}}),
            json!({"name": "Route", "options": 3}),
            json!({"pname": 12}),
        ];
        for case in cases {
            assert_eq!(NodeKind::classify(&data(case)), NodeKind::Generic);
        }
    }

    #[test]
    fn test_from_json_rejects_wrong_root_class() {
        let err = Project::from_json("/tmp/p", r#"{"__class__": "Graph"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidProject(_)));

        let err = Project::from_json(
            "/tmp/p",
            r#"{"__class__": "Project", "graphs": {"main": {"__class__": "Mystery"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidProject(_)));

        assert!(Project::from_json("/tmp/p", "[]").is_err());
    }

    #[test]
    fn test_accessors_deduplicate_in_order() {
        let text = json!({
            "__class__": "Project",
            "id": "0f0c",
            "name": "Shop",
            "graphs": {
                "main": {"__class__": "Graph", "nodes": [
                    {"__class__": "Node", "id": "1", "data": {"pname": "ocr"}},
                    {"__class__": "Node", "id": "2", "data": {"pname": "nlp"}},
                    {"__class__": "Node", "id": "3", "data": {"pname": "ocr"}}
                ], "edges": [{"__class__": "Edge", "id": "e1"}]},
                "second": {"__class__": "Graph", "nodes": [
                    {"__class__": "Node", "id": 4, "data": {"microservice": "predictor"}},
                    {"__class__": "Node", "id": "5", "data": {"name": "Route", "options": {"values": {"path": "score"}}}}
                ], "edges": []}
            }
        })
        .to_string();

        let project = Project::from_json("/projects/shop", &text).unwrap();
        assert_eq!(project.id(), "0f0c");
        assert_eq!(project.name(), "Shop");
        assert_eq!(project.slug(), "shop");
        assert_eq!(project.nodes().len(), 5);
        assert_eq!(project.nodes()[3].id, "4");
        assert_eq!(project.nodes()[3].graph, "second");
        assert_eq!(project.global_extensions(), vec!["ocr", "nlp"]);
        assert_eq!(project.core_components(), vec!["predictor"]);
        assert_eq!(project.routes(), vec!["score"]);
        assert!(project.required_resources().is_empty());
    }

    #[test]
    fn test_node_with_both_references() {
        let text = json!({
            "graphs": {"main": {"nodes": [
                {"id": "1", "data": {"pname": "ocr", "microservice": "predictor"}}
            ]}}
        })
        .to_string();

        let project = Project::from_json("/projects/shop", &text).unwrap();
        assert_eq!(project.nodes()[0].kind, NodeKind::ExtensionRef { name: "ocr".into() });
        assert_eq!(project.global_extensions(), vec!["ocr"]);
        assert_eq!(project.core_components(), vec!["predictor"]);
    }

    #[test]
    fn test_declared_extensions_merged() {
        let text = json!({
            "global_extensions": ["nlp", "ocr", 7, "vision"],
            "graphs": {"main": {"nodes": [
                {"id": "1", "data": {"pname": "ocr"}}
            ]}}
        })
        .to_string();

        let project = Project::from_json("/projects/shop", &text).unwrap();
        assert_eq!(project.global_extensions(), vec!["ocr", "nlp", "vision"]);
    }
}
