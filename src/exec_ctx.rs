//! Execution context handed to step bodies.
//!
//! [`ExecCtx`] carries the document, the configuration, the results of the
//! step's dependencies, and a progress reporter bound to one pipeline run.
//! Once that run is abandoned, reports are dropped and
//! [`ExecCtx::is_abandoned`] turns true.

use crate::executor_config::ExecutorConfig;
use crate::types::{DocumentCharacteristics, Family, ProcessingConfiguration};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of progress reports from a running step.
pub(crate) trait ProgressSink: Send + Sync {
    /// Apply a report. Returns `false` when the run is no longer current.
    fn report(&self, generation: u64, step: usize, progress: u8) -> bool;

    fn is_current(&self, generation: u64) -> bool;
}

/// Sink for contexts built outside a pipeline. Accepts everything.
struct Detached;

impl ProgressSink for Detached {
    fn report(&self, _: u64, _: usize, _: u8) -> bool {
        true
    }

    fn is_current(&self, _: u64) -> bool {
        true
    }
}

/// What a step body sees while it runs.
pub struct ExecCtx {
    pub step_id: String,
    pub family: Family,
    pub document: Arc<DocumentCharacteristics>,
    pub configuration: Arc<ProcessingConfiguration>,
    /// Results of this step's dependencies, keyed by step id.
    pub upstream: BTreeMap<String, Value>,
    /// Pause between progress updates for bodies that simulate work.
    pub tick_interval: Duration,
    pub ticks: u32,
    progress_cap: u8,
    generation: u64,
    step_index: usize,
    sink: Arc<dyn ProgressSink>,
}

impl ExecCtx {
    /// Builder for contexts outside a pipeline (body unit tests, ad hoc runs).
    pub fn builder(step_id: impl Into<String>, family: Family) -> ExecCtxBuilder {
        ExecCtxBuilder {
            step_id: step_id.into(),
            family,
            document: DocumentCharacteristics::default(),
            configuration: ProcessingConfiguration::default(),
            upstream: BTreeMap::new(),
            config: ExecutorConfig::default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn attached(
        step_id: String,
        family: Family,
        document: Arc<DocumentCharacteristics>,
        configuration: Arc<ProcessingConfiguration>,
        upstream: BTreeMap<String, Value>,
        config: &ExecutorConfig,
        generation: u64,
        step_index: usize,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            step_id,
            family,
            document,
            configuration,
            upstream,
            tick_interval: config.tick_interval,
            ticks: config.ticks_per_step,
            progress_cap: config.progress_cap,
            generation,
            step_index,
            sink,
        }
    }

    /// Report progress (0..=100). Values above the cap are held at the cap;
    /// only the executor marks a step 100% complete.
    ///
    /// Returns `false` when the run has been abandoned.
    pub fn report(&self, progress: u8) -> bool {
        self.sink
            .report(self.generation, self.step_index, progress.min(self.progress_cap))
    }

    /// Whether the pipeline was reset after this step started.
    pub fn is_abandoned(&self) -> bool {
        !self.sink.is_current(self.generation)
    }

    /// Bail out with an error if the run was abandoned.
    pub fn check_abandoned(&self) -> anyhow::Result<()> {
        if self.is_abandoned() {
            anyhow::bail!("run abandoned while '{}' was processing", self.step_id);
        }
        Ok(())
    }

    /// Result of a dependency, if it ran.
    pub fn upstream(&self, step_id: &str) -> Option<&Value> {
        self.upstream.get(step_id)
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("step_id", &self.step_id)
            .field("family", &self.family)
            .field("document_type", &self.document.type_label())
            .field("upstream", &self.upstream.keys().collect::<Vec<_>>())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Builder for detached [`ExecCtx`] values.
pub struct ExecCtxBuilder {
    step_id: String,
    family: Family,
    document: DocumentCharacteristics,
    configuration: ProcessingConfiguration,
    upstream: BTreeMap<String, Value>,
    config: ExecutorConfig,
}

impl ExecCtxBuilder {
    pub fn document(mut self, document: DocumentCharacteristics) -> Self {
        self.document = document;
        self
    }

    pub fn configuration(mut self, configuration: ProcessingConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn upstream(mut self, step_id: impl Into<String>, result: Value) -> Self {
        self.upstream.insert(step_id.into(), result);
        self
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ExecCtx {
        ExecCtx::attached(
            self.step_id,
            self.family,
            Arc::new(self.document),
            Arc::new(self.configuration),
            self.upstream,
            &self.config,
            0,
            0,
            Arc::new(Detached),
        )
    }
}
