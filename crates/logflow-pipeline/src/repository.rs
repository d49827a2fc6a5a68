//! In-memory pipeline repository.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::flow::FlowGraph;
use crate::traits::PipelineRepository;

/// Thread-safe map of pipelines and transformers.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    pipelines: RwLock<HashMap<String, FlowGraph>>,
    transformers: RwLock<HashMap<String, String>>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a pipeline.
    pub fn save_pipeline(&self, name: impl Into<String>, graph: FlowGraph) {
        self.pipelines.write().insert(name.into(), graph);
    }

    /// Removes a pipeline. Returns true if it existed.
    pub fn delete_pipeline(&self, name: &str) -> bool {
        self.pipelines.write().remove(name).is_some()
    }

    /// Stores or replaces a transformer script.
    pub fn save_transformer(&self, name: impl Into<String>, script: impl Into<String>) {
        self.transformers.write().insert(name.into(), script.into());
    }

    /// Removes a transformer. Returns true if it existed.
    pub fn delete_transformer(&self, name: &str) -> bool {
        self.transformers.write().remove(name).is_some()
    }

    /// Stored pipeline names, sorted.
    #[must_use]
    pub fn list_pipelines(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pipelines.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl PipelineRepository for InMemoryRepository {
    fn flow_graph(&self, name: &str) -> Option<FlowGraph> {
        self.pipelines.read().get(name).cloned()
    }

    fn transformer(&self, name: &str) -> Option<String> {
        self.transformers.read().get(name).cloned()
    }
}
