//! Conversational setup wizard.
//!
//! [`ConversationManager`] walks a user through a fixed set of questions
//! (role, goals, per-family preferences) and ends with a finalized
//! [`ProcessingConfiguration`]. Free text that matches the
//! [`IntentCatalog`] jumps straight to confirmation.
//!
//! The manager is synchronous and holds no per-session data: every call
//! takes a [`ConversationState`] and returns the next one. Keep one state
//! per session and serialize calls against it.
//!
//! ```
//! use docflow::conversation::{ConversationManager, UserInput};
//! use docflow::DocumentCharacteristics;
//!
//! let manager = ConversationManager::new();
//! let state = manager.start_conversation(Some(&DocumentCharacteristics::new("contract")));
//! let input = UserInput::text("extract the key terms of this contract");
//! let state = manager.process_input(input, state);
//! assert!(state.is_complete);
//! assert!(manager.final_configuration(&state).unwrap().kg.enabled);
//! ```

pub mod intent;
pub mod state;
pub mod steps;
pub mod synthesize;
pub mod transitions;

pub use intent::{IntentCatalog, IntentTemplate};
pub use state::{
    Action, ConversationMessage, ConversationState, ConversationStep, IntentMatch,
    MultimodalPreferences, Speaker, UserInput, UserProfile,
};
pub use steps::{StepHandler, StepPrompt, StepRegistry};
pub use synthesize::synthesize;

use crate::types::{DocumentCharacteristics, ProcessingConfiguration};
use state::ConversationMessage as Message;
use tracing::{debug, info, warn};
use transitions::{ActionVerb, Transition};

/// Drives the wizard. Cheap to share; holds only the catalog and step registry.
#[derive(Debug, Clone, Default)]
pub struct ConversationManager {
    catalog: IntentCatalog,
    steps: StepRegistry,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom intent catalog.
    pub fn with_catalog(mut self, catalog: IntentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use a custom step registry.
    pub fn with_steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    pub fn catalog(&self) -> &IntentCatalog {
        &self.catalog
    }

    /// Begin a conversation about a document. Never fails: without
    /// characteristics the document is addressed generically.
    pub fn start_conversation(
        &self,
        document: Option<&DocumentCharacteristics>,
    ) -> ConversationState {
        let mut state = ConversationState::new(document.cloned().unwrap_or_default());
        debug!(
            conversation = %state.id,
            document_type = state.document_type(),
            "starting conversation"
        );
        self.prompt(&mut state);
        state
    }

    /// Advance the conversation by one input. Always appends a next prompt.
    pub fn process_input(
        &self,
        input: UserInput,
        mut state: ConversationState,
    ) -> ConversationState {
        state.push(Message::user(input.transcript_text()));
        match input {
            UserInput::Action { action, payload, .. } => {
                let Some(verb) = ActionVerb::from_name(&action) else {
                    warn!(
                        conversation = %state.id,
                        action = action.as_str(),
                        conversation_step = %state.current_step,
                        "unknown action verb"
                    );
                    return self.acknowledge(state);
                };
                match verb.apply(&payload, &mut state) {
                    Transition::Restart => self.restart(&state),
                    Transition::Stay => self.acknowledge(state),
                    Transition::Goto(step) if verb == ActionVerb::Back => {
                        state.history.pop();
                        self.enter(&mut state, step, false);
                        state
                    }
                    Transition::Goto(step) => {
                        self.enter(&mut state, step, true);
                        state
                    }
                }
            }
            UserInput::Text(text) => match self.catalog.detect(&text) {
                Some(found) => {
                    info!(
                        conversation = %state.id,
                        intent = found.name.as_str(),
                        confidence = found.confidence,
                        "free text matched intent"
                    );
                    state.intent_match = Some(found);
                    self.enter(&mut state, ConversationStep::Confirmation, true);
                    state
                }
                None => self.acknowledge(state),
            },
        }
    }

    /// The configuration as it would be synthesized right now.
    pub fn preview(&self, state: &ConversationState) -> ProcessingConfiguration {
        synthesize(state)
    }

    /// The finalized configuration, once the conversation is complete.
    pub fn final_configuration(
        &self,
        state: &ConversationState,
    ) -> Option<ProcessingConfiguration> {
        if state.is_complete {
            state.configuration.clone()
        } else {
            None
        }
    }

    /// Render the prompt for `step` against `state`, falling back to a generic
    /// prompt when the registry has no handler for it.
    pub fn render(&self, step: ConversationStep, state: &ConversationState) -> StepPrompt {
        match self.steps.get(step) {
            Some(handler) => handler.render(state),
            None => {
                warn!(
                    conversation = %state.id,
                    conversation_step = %step,
                    "no handler for step, using fallback prompt"
                );
                steps::fallback(state)
            }
        }
    }

    fn enter(&self, state: &mut ConversationState, step: ConversationStep, record: bool) {
        let from = state.current_step;
        if record && from != step {
            state.history.push(from);
        }
        state.current_step = step;
        debug!(conversation = %state.id, from = %from, to = %step, "conversation transition");

        if step.is_terminal() {
            let config = synthesize(state);
            if !state.is_complete {
                info!(
                    conversation = %state.id,
                    families = ?config.enabled_families(),
                    "conversation complete"
                );
            }
            state.configuration = Some(config);
            state.is_complete = true;
        } else if state.is_complete {
            // Walked back out of confirmation; the old result no longer stands.
            state.is_complete = false;
            state.configuration = None;
        }
        self.prompt(state);
    }

    fn acknowledge(&self, mut state: ConversationState) -> ConversationState {
        let prompt = self.render(state.current_step, &state);
        let text = format!("Got it. {}", prompt.text);
        state.push(Message::assistant(text, prompt.actions));
        state
    }

    fn restart(&self, state: &ConversationState) -> ConversationState {
        info!(conversation = %state.id, "restarting conversation");
        self.start_conversation(Some(&state.document))
    }

    fn prompt(&self, state: &mut ConversationState) {
        let prompt = self.render(state.current_step, state);
        state.push(Message::assistant(prompt.text, prompt.actions));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Family;
    use serde_json::json;

    fn manager() -> ConversationManager {
        ConversationManager::new()
    }

    fn click(
        manager: &ConversationManager,
        state: ConversationState,
        verb: &str,
        label: &str,
    ) -> ConversationState {
        let action = state
            .find_action(verb, Some(label))
            .unwrap_or_else(|| panic!("no action {} / {} at {}", verb, label, state.current_step))
            .clone();
        manager.process_input(UserInput::from(&action), state)
    }

    fn walk_full(m: &ConversationManager) -> ConversationState {
        let document = DocumentCharacteristics::new("annual report").with_tables(true);
        let s = m.start_conversation(Some(&document));
        let s = click(m, s, "start", "Let's get started");
        let s = click(m, s, "set_role", "Analyst");
        let s = click(m, s, "set_department", "Finance");
        let s = click(m, s, "set_goal", "Comprehensive analysis");
        let s = click(
            m,
            s,
            "select_processing",
            "Recommended: Search & retrieval + Document extraction + Knowledge graph",
        );
        let s = click(m, s, "set_has_images", "Yes, it has images");
        let s = click(m, s, "set_has_audio", "No audio");
        let s = click(m, s, "set_visual_analysis", "Text is enough");
        let s = click(m, s, "set_idp", "Tables");
        let s = click(m, s, "set_kg", "Yes, build a graph");
        click(m, s, "set_entity_types", "Dates and amounts")
    }

    #[test]
    fn test_start_has_single_intro_message() {
        let state = manager().start_conversation(None);
        assert_eq!(state.current_step, ConversationStep::Intro);
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript[0].speaker, Speaker::Assistant);
        assert!(state.transcript[0].text.contains("document"));
        assert!(!state.is_complete);
    }

    #[test]
    fn test_full_walk_reaches_confirmation() {
        let m = manager();
        let state = walk_full(&m);
        assert_eq!(state.current_step, ConversationStep::Confirmation);
        assert!(state.is_complete);
        let config = m.final_configuration(&state).unwrap();
        assert!(config.rag.enabled && config.idp.enabled && config.kg.enabled);
        assert!(config.idp.tables);
        assert!(config.rag.multimodal.ocr && config.rag.multimodal.image_caption);
        assert!(!config.rag.multimodal.transcription);
        assert_eq!(config.kg.entity_types, vec!["date", "money"]);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(state.profile.role.as_deref(), Some("analyst"));
        assert_eq!(state.profile.department.as_deref(), Some("finance"));
    }

    #[test]
    fn test_walk_is_deterministic() {
        let m = manager();
        let a = walk_full(&m);
        let b = walk_full(&m);
        assert_eq!(a.history, b.history);
        assert_eq!(a.configuration, b.configuration);
        let texts = |s: &ConversationState| {
            s.transcript.iter().map(|m| m.text.clone()).collect::<Vec<_>>()
        };
        assert_eq!(texts(&a), texts(&b));
    }

    #[test]
    fn test_step_sequence_follows_default_edges() {
        let state = walk_full(&manager());
        let mut expected: Vec<ConversationStep> = ConversationStep::ALL.to_vec();
        expected.pop();
        assert_eq!(state.history, expected);
    }

    #[test]
    fn test_intent_text_short_circuits() {
        let m = manager();
        let state = m.start_conversation(Some(&DocumentCharacteristics::new("contract")));
        let state = click(&m, state, "start", "Let's get started");
        let state = m.process_input(
            UserInput::text("I need to extract the renewal terms of this contract"),
            state,
        );
        assert!(state.is_complete);
        assert_eq!(state.current_step, ConversationStep::Confirmation);
        assert_eq!(state.intent_match.as_ref().unwrap().name, "contract-analysis");
        let config = m.final_configuration(&state).unwrap();
        assert!(config.idp.enabled && config.kg.enabled);
        assert!(!config.rag.enabled);
    }

    #[test]
    fn test_unmatched_text_stays_put() {
        let m = manager();
        let state = m.start_conversation(None);
        let state = m.process_input(UserInput::action("start", json!({})), state);
        let state = m.process_input(UserInput::text("hmm, not sure"), state);
        assert_eq!(state.current_step, ConversationStep::UserProfile);
        assert!(!state.is_complete);
        let last = state.last_prompt().unwrap();
        assert!(last.text.starts_with("Got it."));
        assert!(!last.actions.is_empty());
    }

    #[test]
    fn test_set_has_images_payload_sets_ocr_and_caption() {
        let m = manager();
        let state = m.start_conversation(None);
        let state = m.process_input(
            UserInput::action("set_has_images", json!({"hasImages": true})),
            state,
        );
        assert_eq!(state.current_step, ConversationStep::AudioCheck);
        let state = m.process_input(UserInput::action("confirm", json!({})), state);
        let config = m.final_configuration(&state).unwrap();
        assert!(config.rag.multimodal.ocr);
        assert!(config.rag.multimodal.image_caption);
    }

    #[test]
    fn test_missing_handler_falls_back() {
        let m = manager()
            .with_steps(StepRegistry::standard().without(ConversationStep::Department));
        let state = m.start_conversation(None);
        let state = m.process_input(
            UserInput::action("set_role", json!({"role": "engineer"})),
            state,
        );
        assert_eq!(state.current_step, ConversationStep::Department);
        let prompt = state.last_prompt().unwrap();
        assert!(prompt.actions.iter().any(|a| a.action == "goto"));
        let state = click(&m, state, "goto", "Review my setup");
        assert!(state.is_complete);
    }

    #[test]
    fn test_unknown_verb_is_acknowledged() {
        let m = manager();
        let state = m.start_conversation(None);
        let before = state.transcript.len();
        let state = m.process_input(UserInput::action("teleport", json!({})), state);
        assert_eq!(state.current_step, ConversationStep::Intro);
        assert_eq!(state.transcript.len(), before + 2);
    }

    #[test]
    fn test_back_leaves_confirmation() {
        let m = manager();
        let state = walk_full(&m);
        let state = click(&m, state, "back", "Go back");
        assert_eq!(state.current_step, ConversationStep::KgEntitySelection);
        assert!(!state.is_complete);
        assert!(m.final_configuration(&state).is_none());
        let state = click(&m, state, "set_entity_types", "Everything");
        assert!(state.is_complete);
    }

    #[test]
    fn test_restart_returns_fresh_state() {
        let m = manager();
        let state = walk_full(&m);
        let id = state.id;
        let state = click(&m, state, "restart", "Start over");
        assert_ne!(state.id, id);
        assert_eq!(state.current_step, ConversationStep::Intro);
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.document.type_label(), "annual report");
    }

    #[test]
    fn test_idp_finish_shortcut() {
        let m = manager();
        let state = m.start_conversation(None);
        let state = m.process_input(
            UserInput::action("select_processing", json!({"families": ["idp"]})),
            state,
        );
        let state = m.process_input(UserInput::action("goto", json!({"next": "idp_check"})), state);
        let state = click(&m, state, "set_idp", "Extract everything and finish");
        assert!(state.is_complete);
        let config = m.final_configuration(&state).unwrap();
        assert_eq!(config.enabled_families(), vec![Family::Idp]);
    }

    #[test]
    fn test_declining_overrides_every_processing_selection() {
        let m = manager();
        let start = m.start_conversation(Some(&DocumentCharacteristics::new("contract")));
        let start = click(&m, start, "start", "Skip to processing options");
        let options: Vec<Action> = start
            .available_actions()
            .iter()
            .filter(|a| a.action == "select_processing")
            .cloned()
            .collect();
        assert_eq!(options.len(), 5);

        for option in options {
            let s = m.process_input(UserInput::from(&option), start.clone());
            let rag_chosen = s.selected_families.contains(&Family::Rag);
            let s = click(&m, s, "set_has_images", "No images");
            let s = click(&m, s, "set_has_audio", "No audio");
            let s = click(&m, s, "set_visual_analysis", "Text is enough");
            let s = click(&m, s, "set_idp", "No extraction");
            let s = click(&m, s, "set_kg", "No graph");
            assert!(s.is_complete, "{}", option.label);
            let config = m.final_configuration(&s).unwrap();
            assert!(!config.idp.enabled, "{}", option.label);
            assert!(!config.kg.enabled, "{}", option.label);
            assert_eq!(config.rag.enabled, rag_chosen, "{}", option.label);
        }
    }

    #[test]
    fn test_all_three_then_no_graph_keeps_extraction() {
        let m = manager();
        let s = m.start_conversation(None);
        let s = click(&m, s, "start", "Skip to processing options");
        let s = click(&m, s, "select_processing", "All three");
        let s = click(&m, s, "set_has_images", "No images");
        let s = click(&m, s, "set_has_audio", "No audio");
        let s = click(&m, s, "set_visual_analysis", "Text is enough");
        let s = click(&m, s, "set_idp", "Tables");
        let s = click(&m, s, "set_kg", "No graph");
        let config = m.final_configuration(&s).unwrap();
        assert_eq!(config.enabled_families(), vec![Family::Rag, Family::Idp]);
        assert!(config.idp.tables);
        assert!(config.kg.entity_types.is_empty());
    }

    #[test]
    fn test_preview_matches_final() {
        let m = manager();
        let state = walk_full(&m);
        assert_eq!(Some(m.preview(&state)), m.final_configuration(&state));
    }

    #[test]
    fn test_state_serializes() {
        let state = walk_full(&manager());
        let encoded = serde_json::to_value(&state).unwrap();
        assert_eq!(encoded["current_step"], json!("confirmation"));
        let decoded: ConversationState = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, state);
    }
}
