//! Graph and options files, layout output
//!
//! Files are JSON or YAML, chosen by extension (`.json`, `.yaml`, `.yml`).
//!
//! A graph document lists nodes, edges and optional clusters:
//!
//! ```json
//! {
//!   "nodes": [{ "id": "a", "x": 0, "y": 0, "fixed": { "x": true, "y": false } }, { "id": "b" }],
//!   "edges": [{ "from": "a", "to": "b", "length": 120 }],
//!   "clusters": [{ "id": "ab", "members": ["a", "b"] }]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::ClusterError;
use crate::graph::{FixedAxes, Graph, PhysicsEdge, PhysicsNode};
use crate::options::{Point, SimulationOptions};
use crate::stabilization::StabilizationOutcome;

/// Radius of the circle that nodes without coordinates are placed on
pub const INITIAL_LAYOUT_RADIUS: f64 = 100.0;

/// Errors that can occur while reading or writing files
#[derive(Error, Debug)]
pub enum IoError {
    /// The file format is not supported
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file extension could not be determined
    #[error("could not determine file format from path: {0}")]
    UnknownExtension(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document is well-formed but describes an invalid graph
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Result type for file operations
pub type IoResult<T> = Result<T, IoError>;

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> IoResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| IoError::UnknownExtension(path.display().to_string()))?;
        match ext.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(IoError::UnsupportedFormat(other.to_string())),
        }
    }

    fn parse<T: for<'de> Deserialize<'de>>(self, text: &str) -> IoResult<T> {
        Ok(match self {
            Self::Json => serde_json::from_str(text)?,
            Self::Yaml => serde_yaml::from_str(text)?,
        })
    }

    fn render<T: Serialize>(self, value: &T) -> IoResult<String> {
        Ok(match self {
            Self::Json => serde_json::to_string_pretty(value)?,
            Self::Yaml => serde_yaml::to_string(value)?,
        })
    }
}

/// `fixed` accepts a single flag or one per axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixedSpec {
    All(bool),
    Axes {
        #[serde(default)]
        x: bool,
        #[serde(default)]
        y: bool,
    },
}

impl From<FixedSpec> for FixedAxes {
    fn from(spec: FixedSpec) -> Self {
        match spec {
            FixedSpec::All(fixed) => FixedAxes { x: fixed, y: fixed },
            FixedSpec::Axes { x, y } => FixedAxes { x, y },
        }
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<FixedSpec>,
    #[serde(default = "enabled")]
    pub physics: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDocument {
    /// Generated from the position in the list when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring_constant: Option<f64>,
    #[serde(default = "enabled")]
    pub physics: bool,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub id: String,
    pub members: Vec<String>,
}

/// On-disk graph description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterDocument>,
}

impl GraphDocument {
    pub fn parse(text: &str, format: Format) -> IoResult<Self> {
        format.parse(text)
    }

    /// Build the graph, placing nodes without coordinates on a circle
    ///
    /// Clusters are created in document order, so a later cluster may contain
    /// an earlier one.
    pub fn into_graph(self) -> IoResult<Graph> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.nodes.iter().find(|n| !seen.insert(n.id.as_str())) {
            return Err(IoError::InvalidGraph(format!(
                "duplicate node id '{}'",
                duplicate.id
            )));
        }

        let unplaced = self
            .nodes
            .iter()
            .filter(|n| n.x.is_none() || n.y.is_none())
            .count();
        let mut placed = 0;
        let mut graph = Graph::new();

        for doc in self.nodes {
            let mut node = PhysicsNode::new(doc.id);
            match (doc.x, doc.y) {
                (Some(x), Some(y)) => node = node.with_position(x, y),
                (x, y) => {
                    // Distribute nodes in a circle initially
                    let angle = 2.0 * std::f64::consts::PI * placed as f64 / unplaced as f64;
                    node.x = x.unwrap_or(INITIAL_LAYOUT_RADIUS * angle.cos());
                    node.y = y.unwrap_or(INITIAL_LAYOUT_RADIUS * angle.sin());
                    placed += 1;
                }
            }
            if let Some(mass) = doc.mass {
                node.set_mass(mass);
            }
            if let Some(radius) = doc.radius {
                node = node.with_radius(radius);
            }
            if let Some(fixed) = doc.fixed {
                node.fixed = fixed.into();
            }
            node.physics = doc.physics;
            node.hidden = doc.hidden;
            node.level = doc.level;
            graph.add_node(node);
        }

        let mut edge_ids = HashSet::new();
        for (index, doc) in self.edges.into_iter().enumerate() {
            let id = doc.id.unwrap_or_else(|| format!("e{index}"));
            if !edge_ids.insert(id.clone()) {
                return Err(IoError::InvalidGraph(format!("duplicate edge id '{id}'")));
            }
            let mut edge = PhysicsEdge::new(id, doc.from, doc.to);
            edge.length = doc.length;
            edge.spring_constant = doc.spring_constant;
            edge.physics = doc.physics;
            edge.hidden = doc.hidden;
            graph.add_edge(edge);
        }
        graph.refresh_connectivity();

        for cluster in &self.clusters {
            let members: Vec<&str> = cluster.members.iter().map(String::as_str).collect();
            graph.cluster(&cluster.id, &members)?;
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            clusters = self.clusters.len(),
            "built graph"
        );
        Ok(graph)
    }
}

/// Load a graph document from a JSON or YAML file
pub fn load_graph(path: &Path) -> IoResult<Graph> {
    let format = Format::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let graph = GraphDocument::parse(&text, format)?.into_graph()?;
    info!(path = %path.display(), nodes = graph.node_count(), "loaded graph");
    Ok(graph)
}

/// Load simulation options from a JSON or YAML file; missing fields take defaults
pub fn load_options(path: &Path) -> IoResult<SimulationOptions> {
    let format = Format::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let options: SimulationOptions = format.parse(&text)?;
    Ok(options.normalized())
}

/// Result of a layout run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutReport {
    pub iterations: usize,
    pub converged: bool,
    /// Final position of every node not absorbed into a cluster
    pub positions: BTreeMap<String, Point>,
}

impl LayoutReport {
    pub fn new(graph: &Graph, outcome: Option<StabilizationOutcome>) -> Self {
        Self {
            iterations: outcome.map_or(0, StabilizationOutcome::iterations),
            converged: outcome.is_some_and(StabilizationOutcome::is_converged),
            positions: graph
                .nodes()
                .filter(|(_, node)| node.cluster().is_none())
                .map(|(_, node)| (node.id.clone(), Point::new(node.x, node.y)))
                .collect(),
        }
    }

    /// Write the report as JSON or YAML, chosen by extension
    pub fn write(&self, path: &Path) -> IoResult<()> {
        let format = Format::from_path(path)?;
        fs::write(path, format.render(self)?)?;
        info!(path = %path.display(), positions = self.positions.len(), "wrote layout");
        Ok(())
    }
}

/// Render the default options in the given format
pub fn default_options_text(format: Format) -> IoResult<String> {
    format.render(&SimulationOptions::default())
}
