//! Conversation data model.
//!
//! [`ConversationState`] is a plain value: the manager consumes it and hands
//! back the next one. Nothing in here talks to the pipeline.

use crate::types::{DocumentCharacteristics, Family, ProcessingConfiguration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// One node in the wizard's flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    #[default]
    Intro,
    UserProfile,
    Department,
    Goals,
    ProcessingSelection,
    MultimodalCheck,
    AudioCheck,
    VisualAnalysisCheck,
    IdpCheck,
    KgCheck,
    KgEntitySelection,
    Confirmation,
}

impl ConversationStep {
    pub const ALL: [ConversationStep; 12] = [
        ConversationStep::Intro,
        ConversationStep::UserProfile,
        ConversationStep::Department,
        ConversationStep::Goals,
        ConversationStep::ProcessingSelection,
        ConversationStep::MultimodalCheck,
        ConversationStep::AudioCheck,
        ConversationStep::VisualAnalysisCheck,
        ConversationStep::IdpCheck,
        ConversationStep::KgCheck,
        ConversationStep::KgEntitySelection,
        ConversationStep::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::UserProfile => "user_profile",
            Self::Department => "department",
            Self::Goals => "goals",
            Self::ProcessingSelection => "processing_selection",
            Self::MultimodalCheck => "multimodal_check",
            Self::AudioCheck => "audio_check",
            Self::VisualAnalysisCheck => "visual_analysis_check",
            Self::IdpCheck => "idp_check",
            Self::KgCheck => "kg_check",
            Self::KgEntitySelection => "kg_entity_selection",
            Self::Confirmation => "confirmation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name.trim())
    }

    /// The step that follows when a payload does not declare one.
    pub fn default_next(&self) -> Self {
        match self {
            Self::Intro => Self::UserProfile,
            Self::UserProfile => Self::Department,
            Self::Department => Self::Goals,
            Self::Goals => Self::ProcessingSelection,
            Self::ProcessingSelection => Self::MultimodalCheck,
            Self::MultimodalCheck => Self::AudioCheck,
            Self::AudioCheck => Self::VisualAnalysisCheck,
            Self::VisualAnalysisCheck => Self::IdpCheck,
            Self::IdpCheck => Self::KgCheck,
            Self::KgCheck => Self::KgEntitySelection,
            Self::KgEntitySelection => Self::Confirmation,
            Self::Confirmation => Self::Confirmation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmation)
    }
}

impl fmt::Display for ConversationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// A selectable choice offered at a conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub label: String,
    /// Symbolic verb, e.g. `set_has_images`.
    pub action: String,
    pub payload: Map<String, Value>,
}

impl Action {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        let label = label.into();
        let action = action.into();
        Self {
            id: format!("{}:{}", action, slug(&label)),
            label,
            action,
            payload: Map::new(),
        }
    }

    /// Add a payload field (builder style).
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Declare the step this action leads to.
    pub fn leading_to(self, step: ConversationStep) -> Self {
        self.with("next", step.as_str())
    }
}

fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text.into(), Vec::new())
    }

    pub fn assistant(text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::new(Speaker::Assistant, text.into(), actions)
    }

    fn new(speaker: Speaker, text: String, actions: Vec<Action>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text,
            timestamp: Utc::now(),
            actions,
        }
    }
}

/// Raw input to [`ConversationManager::process_input`](super::ConversationManager::process_input).
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    /// A structured action invocation: verb plus payload.
    Action {
        action: String,
        payload: Map<String, Value>,
        /// Display text recorded in the transcript; defaults to the verb.
        label: Option<String>,
    },
    /// Free text typed by the user.
    Text(String),
}

impl UserInput {
    /// Build an action input from a verb and a JSON object payload.
    /// Non-object payloads are treated as empty.
    pub fn action(action: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        UserInput::Action {
            action: action.into(),
            payload,
            label: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        UserInput::Text(text.into())
    }

    pub(crate) fn transcript_text(&self) -> String {
        match self {
            UserInput::Action { label: Some(l), .. } => l.clone(),
            UserInput::Action { action, .. } => action.clone(),
            UserInput::Text(t) => t.clone(),
        }
    }
}

impl From<&Action> for UserInput {
    fn from(action: &Action) -> Self {
        UserInput::Action {
            action: action.action.clone(),
            payload: action.payload.clone(),
            label: Some(action.label.clone()),
        }
    }
}

/// Accumulated facts about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub role: Option<String>,
    pub department: Option<String>,
    /// Goal chosen at the `goals` step (e.g. `data_extraction`).
    pub intent: Option<String>,
    pub time_constraint: Option<String>,
    pub detail_level: Option<String>,
    pub prior_knowledge: Option<String>,
    pub preferences: Vec<String>,
}

/// Answers from the multimodal questions of family A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultimodalPreferences {
    pub has_audio: bool,
    pub has_images: bool,
    pub visual_analysis: bool,
}

/// A free-text input that matched an entry of the intent catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub name: String,
    pub confidence: f32,
    pub configuration: ProcessingConfiguration,
}

/// The full state of one wizard session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: Uuid,
    pub transcript: Vec<ConversationMessage>,
    pub current_step: ConversationStep,
    /// Steps visited before the current one, oldest first.
    pub history: Vec<ConversationStep>,
    pub document: DocumentCharacteristics,
    pub profile: UserProfile,
    pub multimodal: MultimodalPreferences,
    pub selected_families: BTreeSet<Family>,
    /// Family B extraction type picked at `idp_check`.
    pub extraction_type: Option<String>,
    /// Family C entity types picked at `kg_entity_selection`.
    pub entity_types: Vec<String>,
    pub intent_match: Option<IntentMatch>,
    /// Set by the `processing_selection` step.
    pub partial_configuration: Option<ProcessingConfiguration>,
    pub is_complete: bool,
    /// Last output of the synthesizer, set on reaching `confirmation`.
    pub configuration: Option<ProcessingConfiguration>,
}

impl ConversationState {
    pub(crate) fn new(document: DocumentCharacteristics) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Vec::new(),
            current_step: ConversationStep::Intro,
            history: Vec::new(),
            document,
            profile: UserProfile::default(),
            multimodal: MultimodalPreferences::default(),
            selected_families: BTreeSet::new(),
            extraction_type: None,
            entity_types: Vec::new(),
            intent_match: None,
            partial_configuration: None,
            is_complete: false,
            configuration: None,
        }
    }

    pub(crate) fn push(&mut self, message: ConversationMessage) {
        self.transcript.push(message);
    }

    /// The most recent assistant message, i.e. the prompt the user is answering.
    pub fn last_prompt(&self) -> Option<&ConversationMessage> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.speaker == Speaker::Assistant)
    }

    /// Actions offered by the latest prompt.
    pub fn available_actions(&self) -> &[Action] {
        self.last_prompt().map(|m| m.actions.as_slice()).unwrap_or(&[])
    }

    /// Find an offered action by verb and, optionally, label.
    pub fn find_action(&self, verb: &str, label: Option<&str>) -> Option<&Action> {
        self.available_actions()
            .iter()
            .find(|a| a.action == verb && label.map_or(true, |l| a.label == l))
    }

    pub fn document_type(&self) -> &str {
        self.document.type_label()
    }
}
