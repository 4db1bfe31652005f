//! # docflow
//!
//! Set up document processing jobs through a short guided conversation,
//! then run them as a dependency-ordered pipeline.
//!
//! Three processing families are supported: search & retrieval indexing
//! ([`Family::Rag`]), structured field extraction ([`Family::Idp`]) and
//! knowledge-graph building ([`Family::Kg`]). Any combination can be enabled.
//!
//! ## Core Concepts
//!
//! - **[`ConversationManager`]**: synchronous wizard. Each call takes a
//!   [`ConversationState`] plus one [`UserInput`] and returns the next state.
//!   Free text matching a known intent jumps straight to confirmation.
//! - **[`ProcessingConfiguration`]**: what the conversation produces. Pure
//!   data; [`conversation::synthesize`] derives it from the state.
//! - **[`ProcessingPipeline`]**: plans steps from a configuration, validates
//!   the dependency graph up front, then runs steps in topological order
//!   and reports progress to any number of subscribers.
//! - **[`StepBody`]**: the opaque work behind a step. The bundled bodies
//!   only simulate work; swap in real ones with
//!   [`ProcessingPipeline::with_body`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use docflow::{ConversationManager, DocumentCharacteristics, ProcessingPipeline, UserInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let document = DocumentCharacteristics::new("invoice").with_tables(true);
//!     let manager = ConversationManager::new();
//!
//!     let state = manager.start_conversation(Some(&document));
//!     let input = UserInput::text("extract the totals from these invoices");
//!     let state = manager.process_input(input, state);
//!     let config = manager
//!         .final_configuration(&state)
//!         .ok_or("conversation not finished")?;
//!
//!     let pipeline = ProcessingPipeline::new();
//!     let _progress = pipeline.on_progress(|status| println!("{}%", status.progress));
//!     pipeline.configure_from_intent(&config, &document)?;
//!     let status = pipeline.execute().await?;
//!     println!("{:?}: {:#?}", status.state, pipeline.get_combined_results());
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod conversation;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod executor_config;
pub mod graph;
pub mod pipeline;
pub mod plan;
pub mod simulated;
pub mod step;
pub mod types;

pub use body::{BodyRegistry, FnBody, StepBody};
pub use conversation::{
    Action, ConversationManager, ConversationMessage, ConversationState, ConversationStep,
    IntentCatalog, IntentTemplate, StepHandler, StepPrompt, StepRegistry, UserInput,
};
pub use error::{PipelineError, Result};
pub use events::{Subscription, SubscriptionHandle};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use executor_config::ExecutorConfig;
pub use graph::StepGraph;
pub use pipeline::{CombinedResults, ProcessingPipeline};
pub use plan::plan_steps;
pub use simulated::{SimulatedBody, SimulatedTask};
pub use step::{PipelineState, PipelineStatus, Step, StepDefinition, StepStatus};
pub use types::{
    DocumentCharacteristics, Family, IdpConfig, KgConfig, MultimodalFlags,
    ProcessingConfiguration, RagConfig, RetrievalMethod,
};
