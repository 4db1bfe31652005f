use crate::body::StepBody;
use crate::types::Family;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Configured, no run started yet.
    #[default]
    Idle,
    /// Part of a running pipeline, waiting its turn.
    Pending,
    Processing,
    Completed,
    Error,
}

/// Aggregate state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    /// Steps configured, not yet executing.
    Preparing,
    Processing,
    Completed,
    Error,
}

/// A unit of work as handed to
/// [`ProcessingPipeline::configure`](crate::ProcessingPipeline::configure).
#[derive(Clone)]
pub struct StepDefinition {
    pub id: String,
    pub family: Family,
    pub name: String,
    pub depends_on: Vec<String>,
    pub body: Arc<dyn StepBody>,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<String>,
        family: Family,
        name: impl Into<String>,
        body: Arc<dyn StepBody>,
    ) -> Self {
        Self {
            id: id.into(),
            family,
            name: name.into(),
            depends_on: Vec::new(),
            body,
        }
    }

    /// Add a dependency (builder style). Duplicates are ignored.
    pub fn after(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }
}

impl std::fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("body", &self.body.kind())
            .finish()
    }
}

/// Snapshot of one step. Callers only ever see copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub family: Family,
    pub name: String,
    pub status: StepStatus,
    /// 0..=100; stays below 100 until the step completes.
    pub progress: u8,
    pub depends_on: Vec<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub(crate) fn from_definition(def: &StepDefinition) -> Self {
        Self {
            id: def.id.clone(),
            family: def.family,
            name: def.name.clone(),
            status: StepStatus::Idle,
            progress: 0,
            depends_on: def.depends_on.clone(),
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Aggregate view of the pipeline, recomputed on every step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub current_step: Option<String>,
    pub total_steps: usize,
    pub completed_steps: usize,
    /// 0..=100; 100 only when `state` is `Completed`.
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PipelineStatus {
    pub(crate) fn preparing(total_steps: usize) -> Self {
        Self {
            state: PipelineState::Preparing,
            total_steps,
            ..Default::default()
        }
    }

    /// Percentage of completed steps, rounded down.
    pub(crate) fn recompute_progress(&mut self) {
        self.progress = if self.total_steps == 0 {
            0
        } else {
            ((self.completed_steps * 100) / self.total_steps).min(100) as u8
        };
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_floor_of_ratio() {
        let mut status = PipelineStatus::preparing(3);
        status.recompute_progress();
        assert_eq!(status.progress, 0);
        status.completed_steps = 1;
        status.recompute_progress();
        assert_eq!(status.progress, 33);
        status.completed_steps = 2;
        status.recompute_progress();
        assert_eq!(status.progress, 66);
        status.completed_steps = 3;
        status.recompute_progress();
        assert_eq!(status.progress, 100);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&StepStatus::Processing).unwrap(), "\"processing\"");
        assert_eq!(serde_json::to_string(&PipelineState::Preparing).unwrap(), "\"preparing\"");
    }
}
