//! Compiled pipeline nodes.

use logflow_store::Filter;

/// Index of a node inside its [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in [`Pipeline::nodes`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// An executable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Entry point; forwards the entry to every successor.
    Source {
        /// Successors
        next: Vec<NodeId>,
    },
    /// Rewrites fields with a named transformer script.
    Transform {
        /// Transformer name, resolved at execution time
        transformer: String,
        /// Successors
        next: Vec<NodeId>,
    },
    /// Forwards the entry only if the condition holds.
    Switch {
        /// Compiled condition
        condition: Filter,
        /// Successors
        next: Vec<NodeId>,
    },
    /// Runs another stored pipeline.
    Pipeline {
        /// Pipeline name, resolved at execution time
        pipeline: String,
    },
    /// Stores the entry in a stream and notifies live subscribers.
    Router {
        /// Target stream
        stream: String,
    },
    /// Raises a named alert.
    Alert {
        /// Alert name
        alert: String,
    },
}

impl Node {
    /// Successors of the node. Terminal nodes have none.
    #[must_use]
    pub fn next(&self) -> &[NodeId] {
        match self {
            Self::Source { next } | Self::Transform { next, .. } | Self::Switch { next, .. } => next,
            Self::Pipeline { .. } | Self::Router { .. } | Self::Alert { .. } => &[],
        }
    }

    pub(crate) fn next_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Self::Source { next } | Self::Transform { next, .. } | Self::Switch { next, .. } => Some(next),
            Self::Pipeline { .. } | Self::Router { .. } | Self::Alert { .. } => None,
        }
    }

    /// The flow graph type name of the node.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Transform { .. } => "transform",
            Self::Switch { .. } => "switch",
            Self::Pipeline { .. } => "pipeline",
            Self::Router { .. } => "router",
            Self::Alert { .. } => "alert",
        }
    }
}

/// A compiled pipeline: an arena of nodes reachable from a source node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) flow_ids: Vec<String>,
    pub(crate) root: NodeId,
}

impl Pipeline {
    /// Name the pipeline was compiled under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// All nodes, in flow graph order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The node at `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// The flow graph id of the node at `id`.
    #[must_use]
    pub fn flow_id(&self, id: NodeId) -> Option<&str> {
        self.flow_ids.get(id.0).map(String::as_str)
    }

    /// Looks up a node by its flow graph id.
    #[must_use]
    pub fn find(&self, flow_id: &str) -> Option<NodeId> {
        self.flow_ids.iter().position(|id| id == flow_id).map(NodeId)
    }
}
