//! Declarative flow graphs, as authored in the pipeline editor.
//!
//! A flow graph is data only. [`crate::compiler::build`] turns it into an
//! executable [`Pipeline`](crate::Pipeline).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Nodes and edges of a pipeline definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    /// Document version, carried through unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Graph nodes
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    /// Graph edges
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

/// A node of a flow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Unique id within the graph
    pub id: String,
    /// One of `source`, `transform`, `switch`, `pipeline`, `router`, `alert`
    #[serde(rename = "type")]
    pub node_type: String,
    /// Editor position
    #[serde(default)]
    pub position: FlowPosition,
    /// Type-specific settings
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// Editor coordinates of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowPosition {
    /// Horizontal position
    pub x: f64,
    /// Vertical position
    pub y: f64,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Edge id
    #[serde(default)]
    pub id: String,
    /// Source node id
    pub source: String,
    /// Output handle of the source node
    #[serde(
        default,
        rename = "sourceHandle",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    /// Target node id
    pub target: String,
}

impl FlowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a stored flow graph document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes the graph for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node<'a, I>(mut self, id: &str, node_type: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.nodes.push(FlowNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            position: FlowPosition::default(),
            data: data
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    /// Adds an edge from `source` to `target`.
    #[must_use]
    pub fn with_edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(FlowEdge {
            id: format!("{source}->{target}"),
            source: source.to_string(),
            source_handle: None,
            target: target.to_string(),
        });
        self
    }
}
