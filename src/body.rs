//! Step bodies: the opaque work behind each pipeline step.
//!
//! A body receives an [`ExecCtx`] and returns a JSON result. Its internals
//! are none of the executor's business; all it has to do is report progress
//! through the context and stop early when the run is abandoned.

use crate::exec_ctx::ExecCtx;
use crate::simulated::{SimulatedBody, SimulatedTask};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Object-safe trait for executable step bodies.
#[async_trait]
pub trait StepBody: Send + Sync {
    /// Stable identifier for the body type (e.g. `"rag.chunk"`).
    fn kind(&self) -> &'static str;

    /// Do the work. Errors fail the step and halt the pipeline.
    async fn run(&self, ctx: &ExecCtx) -> anyhow::Result<Value>;
}

/// A synchronous body backed by a closure. Useful for tests and glue steps.
pub struct FnBody<F> {
    kind: &'static str,
    f: F,
}

impl<F> FnBody<F>
where
    F: Fn(&ExecCtx) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(kind: &'static str, f: F) -> Self {
        Self { kind, f }
    }
}

#[async_trait]
impl<F> StepBody for FnBody<F>
where
    F: Fn(&ExecCtx) -> anyhow::Result<Value> + Send + Sync,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn run(&self, ctx: &ExecCtx) -> anyhow::Result<Value> {
        (self.f)(ctx)
    }
}

/// Maps body kinds to implementations. Defaults to the simulated bodies.
#[derive(Clone)]
pub struct BodyRegistry {
    bodies: HashMap<&'static str, Arc<dyn StepBody>>,
}

impl BodyRegistry {
    /// One simulated body per task kind.
    pub fn simulated() -> Self {
        let bodies = SimulatedTask::ALL
            .into_iter()
            .map(|task| {
                let body: Arc<dyn StepBody> = Arc::new(SimulatedBody::new(task));
                (task.kind(), body)
            })
            .collect();
        Self { bodies }
    }

    /// Replace the body for `kind`.
    pub fn with(mut self, kind: &'static str, body: Arc<dyn StepBody>) -> Self {
        self.bodies.insert(kind, body);
        self
    }

    /// Body for `kind`, falling back to the simulated one for that task.
    pub fn get(&self, task: SimulatedTask) -> Arc<dyn StepBody> {
        self.bodies
            .get(task.kind())
            .cloned()
            .unwrap_or_else(|| Arc::new(SimulatedBody::new(task)))
    }
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::simulated()
    }
}

impl std::fmt::Debug for BodyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.bodies.keys().collect();
        kinds.sort();
        f.debug_struct("BodyRegistry").field("kinds", &kinds).finish()
    }
}
