//! Collaborators the pipeline engine depends on.
//!
//! The filter language compiler, the transform script runtime, alert
//! delivery and pipeline storage live outside this crate. The engine only
//! sees them through the traits below.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use logflow_store::{Filter, LogEntry};

use crate::error::{AlertError, CompilationError, TransformError};
use crate::flow::FlowGraph;

/// Boxed future returned by [`AlertWebhook::call`].
pub type AlertFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

/// Compiles switch conditions into filters.
pub trait FilterCompiler: Send + Sync {
    /// Compiles a condition source.
    ///
    /// # Errors
    ///
    /// Returns the compiler diagnostic on invalid input.
    fn compile(&self, source: &str) -> Result<Filter, CompilationError>;
}

/// Runs transform scripts over entry fields.
pub trait TransformRuntime: Send + Sync {
    /// Runs `script` with `fields` as input and returns the new fields.
    ///
    /// # Errors
    ///
    /// [`TransformError::Runtime`] when the script fails,
    /// [`TransformError::NullPointer`] when it produces nothing.
    fn run(
        &self,
        fields: &HashMap<String, String>,
        script: &str,
    ) -> Result<HashMap<String, String>, TransformError>;
}

/// Delivers alerts raised by alert nodes.
pub trait AlertWebhook: Send + Sync {
    /// Calls the webhook registered as `alert` with `entry`.
    fn call<'a>(&'a self, alert: &'a str, entry: &'a LogEntry) -> AlertFuture<'a>;
}

/// Source of pipeline definitions and transformer scripts.
///
/// Lookups happen on every run, so edits are visible to the next entry.
pub trait PipelineRepository: Send + Sync {
    /// The flow graph stored as `name`.
    fn flow_graph(&self, name: &str) -> Option<FlowGraph>;

    /// The transformer script stored as `name`.
    fn transformer(&self, name: &str) -> Option<String>;
}

/// Compiles the JSON filter AST emitted by the filter language front end.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstFilterCompiler;

impl FilterCompiler for AstFilterCompiler {
    fn compile(&self, source: &str) -> Result<Filter, CompilationError> {
        Filter::from_ast_json(source).map_err(|e| CompilationError::new(e.to_string()))
    }
}
