//! Error types for pipeline compilation and execution.

use logflow_notify::NotifyError;
use logflow_store::StoreError;
use thiserror::Error;

/// A filter expression failed to compile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("compilation error: {message}")]
pub struct CompilationError {
    /// Compiler diagnostic
    pub message: String,
}

impl CompilationError {
    /// Creates a compilation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A transform script failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The script raised an error.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The runtime produced no result.
    #[error("null pointer error: transform produced no output")]
    NullPointer,
}

/// An alert could not be delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    /// No webhook is registered under the alert name.
    #[error("alert '{0}' not found")]
    NotFound(String),
    /// The webhook answered with a non-success status.
    #[error("alert '{alert}' webhook returned status {status}")]
    Status {
        /// Alert name
        alert: String,
        /// HTTP status code
        status: u16,
    },
    /// The request could not be sent.
    #[error("alert '{alert}' webhook request failed: {reason}")]
    Request {
        /// Alert name
        alert: String,
        /// Transport error
        reason: String,
    },
}

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A flow node has a type the compiler does not know.
    #[error("invalid flow node type '{node_type}' on node '{node_id}'")]
    InvalidFlowNodeType {
        /// Node id
        node_id: String,
        /// The unknown type
        node_type: String,
    },

    /// A flow node lacks a data key its type requires.
    #[error("flow node '{node_id}' is missing data key '{key}'")]
    MissingFlowNodeData {
        /// Node id
        node_id: String,
        /// The missing key
        key: &'static str,
    },

    /// An edge references an unknown node or leaves a terminal node.
    #[error("invalid flow edge from '{from}' to '{to}'")]
    InvalidFlowEdge {
        /// Edge source node id
        from: String,
        /// Edge target node id
        to: String,
    },

    /// The graph has no source node, or nothing is connected to it.
    #[error("flow graph has no source node leading anywhere")]
    MissingFlowRootNode,

    /// The graph has more than one source node.
    #[error("flow graph has more than one source node ('{first}' and '{second}')")]
    DuplicateFlowRootNode {
        /// First source node id
        first: String,
        /// Second source node id
        second: String,
    },

    /// Two nodes share an id.
    #[error("duplicate flow node id '{0}'")]
    DuplicateFlowNode(String),

    /// The edges form a loop.
    #[error("flow graph loops back to node '{0}'")]
    CyclicFlowGraph(String),

    /// The flow graph document could not be decoded.
    #[error("invalid flow graph document: {0}")]
    InvalidFlowGraph(#[from] serde_json::Error),

    /// No pipeline is stored under the name.
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    /// No transformer is stored under the name.
    #[error("transformer '{0}' not found")]
    TransformerNotFound(String),

    /// A switch condition failed to compile.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// A transform script failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// An alert webhook failed.
    #[error(transparent)]
    Alert(#[from] AlertError),

    /// The log store rejected an entry.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The live-tail notifier is unavailable.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// A sub-pipeline references a pipeline already being executed.
    #[error("pipeline cycle: {}", .0.join(" -> "))]
    PipelineCycle(Vec<String>),

    /// A branch task panicked or was cancelled.
    #[error("pipeline branch failed: {0}")]
    TaskFailed(String),

    /// Several branches failed.
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<PipelineError>),
}

impl PipelineError {
    /// Joins branch errors: `Ok` when empty, the error itself when alone,
    /// a flattened [`PipelineError::Aggregate`] otherwise.
    pub fn join(errors: Vec<Self>) -> Result<()> {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Self::Aggregate(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(Self::Aggregate(flat)),
        }
    }

    /// The individual errors, one for a plain error.
    #[must_use]
    pub fn errors(&self) -> Vec<&Self> {
        match self {
            Self::Aggregate(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = PipelineError::InvalidFlowNodeType {
            node_id: "n1".to_string(),
            node_type: "forwarder".to_string(),
        };
        assert_eq!(err.to_string(), "invalid flow node type 'forwarder' on node 'n1'");

        let err = PipelineError::MissingFlowNodeData {
            node_id: "n2".to_string(),
            key: "stream",
        };
        assert_eq!(err.to_string(), "flow node 'n2' is missing data key 'stream'");

        let err = PipelineError::InvalidFlowEdge {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        assert_eq!(err.to_string(), "invalid flow edge from 'a' to 'b'");

        let err = PipelineError::PipelineCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "pipeline cycle: a -> b -> a");
    }

    #[test]
    fn collaborator_errors_are_transparent() {
        let err = PipelineError::from(CompilationError::new("unexpected token"));
        assert_eq!(err.to_string(), "compilation error: unexpected token");

        let err = PipelineError::from(TransformError::Runtime("boom".into()));
        assert_eq!(err.to_string(), "runtime error: boom");

        let err = PipelineError::from(TransformError::NullPointer);
        assert_eq!(err.to_string(), "null pointer error: transform produced no output");
    }

    #[test]
    fn join_empty_is_ok() {
        assert!(PipelineError::join(Vec::new()).is_ok());
    }

    #[test]
    fn join_single_is_unwrapped() {
        let joined = PipelineError::join(vec![PipelineError::MissingFlowRootNode]);
        assert!(matches!(joined, Err(PipelineError::MissingFlowRootNode)));
    }

    #[test]
    fn join_flattens_nested_aggregates() {
        let nested = PipelineError::Aggregate(vec![
            PipelineError::PipelineNotFound("a".into()),
            PipelineError::PipelineNotFound("b".into()),
        ]);
        let joined = PipelineError::join(vec![nested, PipelineError::TransformerNotFound("t".into())]);
        assert!(joined.is_err());
        if let Err(err) = joined {
            assert_eq!(err.errors().len(), 3);
            assert_eq!(
                err.to_string(),
                "pipeline 'a' not found\npipeline 'b' not found\ntransformer 't' not found"
            );
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineError>();
    }
}
