use crate::{
    body::{BodyRegistry, StepBody},
    error::Result,
    events::{Subscribers, Subscription, SubscriptionHandle},
    exec_ctx::{ExecCtx, ProgressSink},
    executor_config::ExecutorConfig,
    graph::StepGraph,
    plan::plan_steps,
    step::{PipelineState, PipelineStatus, Step, StepDefinition, StepStatus},
    types::{DocumentCharacteristics, Family, ProcessingConfiguration},
    PipelineError,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Results of completed steps, grouped by family and keyed by step id.
pub type CombinedResults = BTreeMap<Family, BTreeMap<String, Value>>;

/// Dependency-ordered executor for processing steps.
///
/// Steps run one at a time in topological order. A step only starts once
/// every dependency has completed; the first failure stops the run and
/// keeps earlier results available.
///
/// The pipeline is a cheap handle (clones share state), so one task can
/// `execute()` while another observes or calls [`reset`](Self::reset).
/// Every configure/reset starts a new generation; work belonging to an
/// older generation can no longer touch the steps.
///
/// # Example
///
/// ```no_run
/// use docflow::{DocumentCharacteristics, ProcessingConfiguration, ProcessingPipeline};
///
/// # async fn run() -> docflow::Result<()> {
/// let mut config = ProcessingConfiguration::default();
/// config.rag.enabled = true;
///
/// let pipeline = ProcessingPipeline::new();
/// pipeline.configure_from_intent(&config, &DocumentCharacteristics::new("manual"))?;
/// let mut progress = pipeline.subscribe_progress();
/// let status = pipeline.execute().await?;
/// assert_eq!(status.progress, 100);
/// for update in progress.drain() {
///     println!("{}%", update.progress);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProcessingPipeline {
    shared: Arc<Shared>,
    config: ExecutorConfig,
    bodies: BodyRegistry,
}

struct Shared {
    inner: Mutex<Inner>,
    progress: Arc<Subscribers<PipelineStatus>>,
    steps: Arc<Subscribers<Step>>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    graph: Option<Arc<StepGraph>>,
    steps: Vec<Step>,
    status: PipelineStatus,
    running: bool,
    document: Arc<DocumentCharacteristics>,
    configuration: Arc<ProcessingConfiguration>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressSink for Shared {
    fn report(&self, generation: u64, step: usize, progress: u8) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        let Some(step) = inner.steps.get_mut(step) else {
            return false;
        };
        if step.status != StepStatus::Processing {
            return false;
        }
        if progress > step.progress {
            step.progress = progress;
            self.steps.publish(step);
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }
}

/// Settles a run whose `execute()` future was dropped before it finished
/// (timeout, `select!`, aborted task). Finished or reset runs are left alone.
struct RunGuard<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.generation != self.generation || !inner.running {
            return;
        }
        warn!(generation = self.generation, "pipeline run dropped before completion");
        let now = Utc::now();
        for step in inner
            .steps
            .iter_mut()
            .filter(|s| s.status == StepStatus::Processing)
        {
            step.status = StepStatus::Error;
            step.error = Some("run dropped before the step finished".to_string());
            step.finished_at = Some(now);
            self.shared.steps.publish(step);
        }
        inner.running = false;
        inner.status.state = PipelineState::Error;
        inner.status.error = Some("run dropped before completion".to_string());
        inner.status.current_step = None;
        inner.status.finished_at = Some(now);
        self.shared.progress.publish(&inner.status);
    }
}

impl ProcessingPipeline {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                progress: Subscribers::new(),
                steps: Subscribers::new(),
            }),
            config,
            bodies: BodyRegistry::default(),
        }
    }

    /// Replace the body registry used by [`configure_from_intent`](Self::configure_from_intent).
    pub fn with_bodies(mut self, bodies: BodyRegistry) -> Self {
        self.bodies = bodies;
        self
    }

    /// Override the body for one task kind (e.g. `"rag.embed"`).
    pub fn with_body(mut self, kind: &'static str, body: Arc<dyn StepBody>) -> Self {
        self.bodies = self.bodies.with(kind, body);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Plan and install the steps for a finalized configuration.
    ///
    /// Resets any prior run. Fails when no family is enabled or the planned
    /// graph does not validate.
    pub fn configure_from_intent(
        &self,
        configuration: &ProcessingConfiguration,
        document: &DocumentCharacteristics,
    ) -> Result<Vec<Step>> {
        let definitions = plan_steps(configuration, &self.bodies);
        if definitions.is_empty() {
            self.reset();
            return Err(PipelineError::InvalidConfig(
                "no processing family is enabled".to_string(),
            ));
        }
        self.install(
            definitions,
            Arc::new(document.clone()),
            Arc::new(configuration.clone()),
        )
    }

    /// Install explicit step definitions. Resets any prior run.
    ///
    /// The dependency graph is validated here: unknown dependencies and
    /// cycles are rejected before anything can run.
    pub fn configure(&self, definitions: Vec<StepDefinition>) -> Result<Vec<Step>> {
        self.install(definitions, Arc::default(), Arc::default())
    }

    fn install(
        &self,
        definitions: Vec<StepDefinition>,
        document: Arc<DocumentCharacteristics>,
        configuration: Arc<ProcessingConfiguration>,
    ) -> Result<Vec<Step>> {
        let graph = match StepGraph::build(definitions) {
            Ok(graph) => graph,
            Err(err) => {
                warn!(error = %err, "rejecting pipeline configuration");
                self.reset();
                return Err(err);
            }
        };

        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.steps = graph.nodes().iter().map(Step::from_definition).collect();
        inner.status = PipelineStatus::preparing(graph.len());
        inner.graph = Some(Arc::new(graph));
        inner.running = false;
        inner.document = document;
        inner.configuration = configuration;
        info!(
            generation = inner.generation,
            total_steps = inner.steps.len(),
            "pipeline configured"
        );
        self.shared.progress.publish(&inner.status);
        Ok(inner.steps.clone())
    }

    /// Run every configured step in dependency order.
    ///
    /// Returns the final status on success. Fails with
    /// [`PipelineError::StepFailed`] when a step body fails, and with
    /// [`PipelineError::Cancelled`] when [`reset`](Self::reset) abandoned the run.
    pub async fn execute(&self) -> Result<PipelineStatus> {
        let (generation, graph, document, configuration) = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            let Some(graph) = inner.graph.clone().filter(|g| !g.is_empty()) else {
                return Err(PipelineError::NotConfigured);
            };
            if inner.running {
                return Err(PipelineError::AlreadyRunning);
            }
            if matches!(
                inner.status.state,
                PipelineState::Completed | PipelineState::Error
            ) {
                return Err(PipelineError::InvalidConfig(
                    "run already finished; configure the pipeline again".to_string(),
                ));
            }
            inner.running = true;
            inner.status.state = PipelineState::Processing;
            inner.status.started_at = Some(Utc::now());
            for step in inner.steps.iter_mut() {
                step.status = StepStatus::Pending;
                self.shared.steps.publish(step);
            }
            self.shared.progress.publish(&inner.status);
            (
                inner.generation,
                graph,
                inner.document.clone(),
                inner.configuration.clone(),
            )
        };

        let _guard = RunGuard {
            shared: &self.shared,
            generation,
        };
        let span = info_span!("pipeline.execute", generation, total_steps = graph.len());
        self.run(generation, graph, document, configuration)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        generation: u64,
        graph: Arc<StepGraph>,
        document: Arc<DocumentCharacteristics>,
        configuration: Arc<ProcessingConfiguration>,
    ) -> Result<PipelineStatus> {
        info!("pipeline started");
        for &idx in graph.execution_order() {
            if let Err(err) = self
                .run_step(generation, &graph, idx, &document, &configuration)
                .await
            {
                self.fail(generation, &err);
                return Err(err);
            }
        }

        let inner = self.shared.lock();
        if inner.generation != generation {
            return Err(PipelineError::Cancelled);
        }
        info!(completed_steps = inner.status.completed_steps, "pipeline completed");
        Ok(inner.status.clone())
    }

    async fn run_step(
        &self,
        generation: u64,
        graph: &StepGraph,
        idx: usize,
        document: &Arc<DocumentCharacteristics>,
        configuration: &Arc<ProcessingConfiguration>,
    ) -> Result<()> {
        let def = graph.node(idx);
        self.wait_for_dependencies(generation, graph, idx).await?;

        let upstream = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            if inner.generation != generation {
                return Err(PipelineError::Cancelled);
            }
            let upstream: BTreeMap<String, Value> = graph
                .dependencies(idx)
                .iter()
                .filter_map(|&dep| {
                    let step = &inner.steps[dep];
                    step.result.clone().map(|r| (step.id.clone(), r))
                })
                .collect();
            let step = &mut inner.steps[idx];
            step.status = StepStatus::Processing;
            step.progress = 0;
            step.started_at = Some(Utc::now());
            inner.status.current_step = Some(def.id.clone());
            self.shared.steps.publish(step);
            self.shared.progress.publish(&inner.status);
            upstream
        };

        debug!(
            step_id = %def.id,
            family = %def.family,
            kind = def.body.kind(),
            "step started"
        );
        let ctx = ExecCtx::attached(
            def.id.clone(),
            def.family,
            document.clone(),
            configuration.clone(),
            upstream,
            &self.config,
            generation,
            idx,
            self.shared.clone(),
        );
        let outcome = def.body.run(&ctx).await;

        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            debug!(step_id = %def.id, "discarding outcome of abandoned run");
            return Err(PipelineError::Cancelled);
        }
        let step = &mut inner.steps[idx];
        step.finished_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                step.status = StepStatus::Completed;
                step.progress = 100;
                step.result = Some(result);
                self.shared.steps.publish(step);

                let status = &mut inner.status;
                status.completed_steps += 1;
                status.recompute_progress();
                if status.completed_steps == status.total_steps {
                    status.state = PipelineState::Completed;
                    status.current_step = None;
                    status.finished_at = step.finished_at;
                    inner.running = false;
                }
                self.shared.progress.publish(status);
                debug!(step_id = %def.id, progress = status.progress, "step completed");
                Ok(())
            }
            Err(err) => {
                let message = format!("{:#}", err);
                step.status = StepStatus::Error;
                step.error = Some(message.clone());
                self.shared.steps.publish(step);
                Err(PipelineError::StepFailed {
                    step: def.id.clone(),
                    message,
                })
            }
        }
    }

    /// Poll until every dependency of `idx` has completed.
    async fn wait_for_dependencies(
        &self,
        generation: u64,
        graph: &StepGraph,
        idx: usize,
    ) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            {
                let inner = self.shared.lock();
                if inner.generation != generation {
                    return Err(PipelineError::Cancelled);
                }
                let mut ready = true;
                for &dep in graph.dependencies(idx) {
                    match inner.steps[dep].status {
                        StepStatus::Completed => {}
                        StepStatus::Error => {
                            return Err(PipelineError::StepFailed {
                                step: graph.node(idx).id.clone(),
                                message: format!("dependency '{}' failed", inner.steps[dep].id),
                            });
                        }
                        _ => ready = false,
                    }
                }
                if ready {
                    return Ok(());
                }
            }
            let waited = started.elapsed();
            if waited >= self.config.dependency_timeout {
                return Err(PipelineError::DependencyTimeout {
                    step: graph.node(idx).id.clone(),
                    waited,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn fail(&self, generation: u64, err: &PipelineError) {
        if matches!(err, PipelineError::Cancelled) {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.generation != generation {
            return;
        }
        error!(error = %err, "pipeline failed");
        inner.status.state = PipelineState::Error;
        inner.status.error = Some(err.to_string());
        inner.status.current_step = None;
        inner.status.finished_at = Some(Utc::now());
        inner.running = false;
        self.shared.progress.publish(&inner.status);
    }

    /// Clear all steps and return to idle. Safe at any time; a run in flight
    /// is abandoned and its late updates are ignored.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if inner.running {
            warn!(
                generation = inner.generation,
                "pipeline reset while running; abandoning in-flight steps"
            );
        } else {
            debug!(generation = inner.generation, "pipeline reset");
        }
        inner.graph = None;
        inner.steps.clear();
        inner.status = PipelineStatus::default();
        inner.running = false;
        inner.document = Arc::default();
        inner.configuration = Arc::default();
        self.shared.progress.publish(&inner.status);
    }

    /// Snapshot of the pipeline status.
    pub fn get_pipeline_status(&self) -> PipelineStatus {
        self.shared.lock().status.clone()
    }

    /// Snapshot of every step, in configuration order.
    pub fn get_steps(&self) -> Vec<Step> {
        self.shared.lock().steps.clone()
    }

    pub fn get_step(&self, id: &str) -> Option<Step> {
        let inner = self.shared.lock();
        let idx = inner.graph.as_ref()?.index_of(id)?;
        inner.steps.get(idx).cloned()
    }

    /// Results of completed steps. Failed or unstarted steps contribute nothing.
    pub fn get_combined_results(&self) -> CombinedResults {
        let inner = self.shared.lock();
        let mut combined = CombinedResults::new();
        for step in inner
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
        {
            if let Some(result) = &step.result {
                combined
                    .entry(step.family)
                    .or_default()
                    .insert(step.id.clone(), result.clone());
            }
        }
        combined
    }

    /// Current generation; bumps on every configure and reset.
    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    /// Receive every pipeline status change.
    pub fn subscribe_progress(&self) -> Subscription<PipelineStatus> {
        self.shared.progress.subscribe()
    }

    /// Receive every step snapshot change.
    pub fn subscribe_steps(&self) -> Subscription<Step> {
        self.shared.steps.subscribe()
    }

    /// Call `callback` on every pipeline status change. Callbacks run on a
    /// spawned task, so a slow callback never stalls the executor.
    /// Must be called inside a tokio runtime.
    pub fn on_progress<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(PipelineStatus) + Send + 'static,
    {
        self.subscribe_progress().forward_to(callback)
    }

    /// Call `callback` on every step change. See [`on_progress`](Self::on_progress).
    pub fn on_step_update<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Step) + Send + 'static,
    {
        self.subscribe_steps().forward_to(callback)
    }
}

impl Default for ProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ProcessingPipeline")
            .field("generation", &inner.generation)
            .field("state", &inner.status.state)
            .field("steps", &inner.steps.iter().map(|s| &s.id).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}
