//! # logflow-pipeline
//!
//! Compilation and concurrent execution of log processing pipelines.
//!
//! This crate provides:
//!
//! - [`FlowGraph`] — Declarative pipeline definition, as stored
//! - [`compiler::build`] — Validates a flow graph into a [`Pipeline`]
//! - [`PipelineRunner`] — Runs entries through stored pipelines
//! - [`PipelineMetrics`] — Run and routing counters
//! - [`HttpWebhook`] — Alert delivery over HTTP
//!
//! ## Example
//!
//! ```rust
//! use logflow_pipeline::{compiler, AstFilterCompiler, FlowGraph, Node};
//!
//! let graph = FlowGraph::new()
//!     .with_node("src", "source", [])
//!     .with_node("errors", "switch", [("condition", r#"{"$eq":{"field":"level","value":"error"}}"#)])
//!     .with_node("store", "router", [("stream", "errors")])
//!     .with_edge("src", "errors")
//!     .with_edge("errors", "store");
//!
//! let pipeline = compiler::build("main", &graph, &AstFilterCompiler).unwrap();
//! assert!(matches!(pipeline.node(pipeline.root()), Some(Node::Source { .. })));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod executor;
pub mod flow;
pub mod metrics;
pub mod node;
pub mod repository;
pub mod traits;
pub mod webhook;

// Re-export main types
pub use error::{AlertError, CompilationError, PipelineError, Result, TransformError};
pub use executor::{PipelineRunner, RunnerConfig};
pub use flow::{FlowEdge, FlowGraph, FlowNode, FlowPosition};
pub use metrics::{MetricsSnapshot, PipelineCounters, PipelineMetrics};
pub use node::{Node, NodeId, Pipeline};
pub use repository::InMemoryRepository;
pub use traits::{
    AlertFuture, AlertWebhook, AstFilterCompiler, FilterCompiler, PipelineRepository,
    TransformRuntime,
};
pub use webhook::{HttpWebhook, WebhookEndpoint, DEFAULT_WEBHOOK_TIMEOUT_SECS};
