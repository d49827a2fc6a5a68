//! Concurrent pipeline execution.
//!
//! Every branching node spawns one task per successor and waits for all of
//! them. Branch errors are collected, never short-circuited, so one failing
//! branch does not stop its siblings.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use logflow_notify::LogNotifier;
use logflow_store::{LogEntry, SharedLogStore};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::compiler;
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::node::{Node, NodeId, Pipeline};
use crate::traits::{AlertWebhook, FilterCompiler, PipelineRepository, TransformRuntime};

/// Runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Whether pipeline and stream counters are updated.
    pub record_metrics: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            record_metrics: true,
        }
    }
}

impl RunnerConfig {
    /// Enables or disables counters.
    #[must_use]
    pub const fn with_record_metrics(mut self, record: bool) -> Self {
        self.record_metrics = record;
        self
    }
}

/// Names of the pipelines on the current execution path, outermost first.
type Chain = Arc<Vec<String>>;

/// Runs stored pipelines against log entries.
///
/// Cloning is cheap; clones share the store, the notifier, the collaborators
/// and the counters.
#[derive(Clone)]
pub struct PipelineRunner {
    store: SharedLogStore,
    notifier: LogNotifier,
    repository: Arc<dyn PipelineRepository>,
    compiler: Arc<dyn FilterCompiler>,
    runtime: Arc<dyn TransformRuntime>,
    webhook: Arc<dyn AlertWebhook>,
    metrics: Arc<PipelineMetrics>,
    config: RunnerConfig,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner with default settings.
    #[must_use]
    pub fn new(
        store: SharedLogStore,
        notifier: LogNotifier,
        repository: Arc<dyn PipelineRepository>,
        compiler: Arc<dyn FilterCompiler>,
        runtime: Arc<dyn TransformRuntime>,
        webhook: Arc<dyn AlertWebhook>,
    ) -> Self {
        Self {
            store,
            notifier,
            repository,
            compiler,
            runtime,
            webhook,
            metrics: Arc::new(PipelineMetrics::new()),
            config: RunnerConfig::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub const fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares counters with other runners.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The counters updated by this runner.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// The settings.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Compiles the pipeline currently stored as `name`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::PipelineNotFound`] if nothing is stored under `name`,
    /// otherwise any compilation error.
    pub fn build(&self, name: &str) -> Result<Pipeline> {
        let graph = self
            .repository
            .flow_graph(name)
            .ok_or_else(|| PipelineError::PipelineNotFound(name.to_string()))?;
        compiler::build(name, &graph, self.compiler.as_ref())
    }

    /// Compiles the pipeline stored as `name` and runs `entry` through it.
    ///
    /// The outcome is counted under `name` when metrics are enabled.
    ///
    /// # Errors
    ///
    /// Build errors, or every branch error joined into one.
    pub async fn run(&self, name: &str, entry: LogEntry) -> Result<()> {
        let result = match self.build(name) {
            Ok(pipeline) => self.run_pipeline(Arc::new(pipeline), entry).await,
            Err(e) => Err(e),
        };

        if self.config.record_metrics {
            self.metrics.record_pipeline(name, result.is_ok());
        }
        match &result {
            Ok(()) => debug!(pipeline = %name, "pipeline run completed"),
            Err(e) => warn!(pipeline = %name, error = %e, "pipeline run failed"),
        }
        result
    }

    /// Runs `entry` through an already compiled pipeline.
    ///
    /// # Errors
    ///
    /// Every branch error joined into one.
    pub async fn run_pipeline(&self, pipeline: Arc<Pipeline>, entry: LogEntry) -> Result<()> {
        let chain = Arc::new(vec![pipeline.name().to_string()]);
        let root = pipeline.root();
        self.execute(pipeline, root, entry, chain).await
    }

    fn execute(
        &self,
        pipeline: Arc<Pipeline>,
        id: NodeId,
        entry: LogEntry,
        chain: Chain,
    ) -> BoxFuture<'static, Result<()>> {
        let runner = self.clone();
        async move {
            let Some(node) = pipeline.node(id) else {
                return Ok(());
            };
            trace!(
                pipeline = pipeline.name(),
                node = ?pipeline.flow_id(id),
                kind = node.kind(),
                "executing node"
            );

            match node {
                Node::Source { next } => runner.fan_out(&pipeline, next, entry, &chain).await,
                Node::Transform { transformer, next } => {
                    let script = runner
                        .repository
                        .transformer(transformer)
                        .ok_or_else(|| PipelineError::TransformerNotFound(transformer.clone()))?;
                    let fields = runner.runtime.run(&entry.fields, &script)?;
                    let entry = LogEntry::at(entry.timestamp, fields);
                    runner.fan_out(&pipeline, next, entry, &chain).await
                }
                Node::Switch { condition, next } => {
                    if condition.evaluate(&entry) {
                        runner.fan_out(&pipeline, next, entry, &chain).await
                    } else {
                        Ok(())
                    }
                }
                Node::Pipeline { pipeline: name } => {
                    let mut nested = chain.to_vec();
                    nested.push(name.clone());
                    if chain.contains(name) {
                        return Err(PipelineError::PipelineCycle(nested));
                    }
                    let sub = Arc::new(runner.build(name)?);
                    let root = sub.root();
                    runner.execute(sub, root, entry, Arc::new(nested)).await
                }
                Node::Router { stream } => {
                    let key = runner.ingest(stream, &entry).await?;
                    runner.notifier.notify(stream, &key, entry).await?;
                    if runner.config.record_metrics {
                        runner.metrics.record_stream(stream);
                    }
                    debug!(stream = %stream, key = %key, "entry routed");
                    Ok(())
                }
                Node::Alert { alert } => {
                    runner.webhook.call(alert, &entry).await?;
                    debug!(alert = %alert, "alert raised");
                    Ok(())
                }
            }
        }
        .boxed()
    }

    /// Flushing ingests block on disk and run on the blocking pool.
    async fn ingest(&self, stream: &str, entry: &LogEntry) -> Result<String> {
        if !self.store.config().flush_on_write {
            return Ok(self.store.ingest(stream, entry)?);
        }
        let store = Arc::clone(&self.store);
        let stream = stream.to_string();
        let entry = entry.clone();
        let key = tokio::task::spawn_blocking(move || store.ingest(&stream, &entry))
            .await
            .map_err(|e| PipelineError::TaskFailed(e.to_string()))??;
        Ok(key)
    }

    async fn fan_out(
        &self,
        pipeline: &Arc<Pipeline>,
        next: &[NodeId],
        entry: LogEntry,
        chain: &Chain,
    ) -> Result<()> {
        let mut branches = JoinSet::new();
        for &id in next {
            branches.spawn(self.execute(Arc::clone(pipeline), id, entry.clone(), Arc::clone(chain)));
        }

        let mut errors = Vec::new();
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(PipelineError::TaskFailed(e.to_string())),
            }
        }
        PipelineError::join(errors)
    }
}
