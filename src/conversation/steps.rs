//! Conversation step renderers.
//!
//! Every step is a value implementing [`StepHandler`], registered under its
//! [`ConversationStep`] in a [`StepRegistry`]. Adding a step means adding a
//! handler, not editing a central match.

use super::state::{Action, ConversationState, ConversationStep};
use super::synthesize::synthesize;
use crate::types::{Family, ProcessingConfiguration};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Prompt text plus the actions offered with it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPrompt {
    pub text: String,
    pub actions: Vec<Action>,
}

impl StepPrompt {
    pub fn new(text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            text: text.into(),
            actions,
        }
    }
}

/// Renders one conversation step. Must be pure: same state, same prompt.
pub trait StepHandler: Send + Sync {
    fn render(&self, state: &ConversationState) -> StepPrompt;
}

impl<F> StepHandler for F
where
    F: Fn(&ConversationState) -> StepPrompt + Send + Sync,
{
    fn render(&self, state: &ConversationState) -> StepPrompt {
        self(state)
    }
}

/// Step name to handler mapping.
#[derive(Clone)]
pub struct StepRegistry {
    handlers: BTreeMap<ConversationStep, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with a handler for every step of the wizard.
    pub fn standard() -> Self {
        Self::empty()
            .with(ConversationStep::Intro, intro)
            .with(ConversationStep::UserProfile, user_profile)
            .with(ConversationStep::Department, department)
            .with(ConversationStep::Goals, goals)
            .with(ConversationStep::ProcessingSelection, processing_selection)
            .with(ConversationStep::MultimodalCheck, multimodal_check)
            .with(ConversationStep::AudioCheck, audio_check)
            .with(ConversationStep::VisualAnalysisCheck, visual_analysis_check)
            .with(ConversationStep::IdpCheck, idp_check)
            .with(ConversationStep::KgCheck, kg_check)
            .with(ConversationStep::KgEntitySelection, kg_entity_selection)
            .with(ConversationStep::Confirmation, confirmation)
    }

    /// Register or replace a handler (builder style).
    pub fn with(mut self, step: ConversationStep, handler: impl StepHandler + 'static) -> Self {
        self.handlers.insert(step, Arc::new(handler));
        self
    }

    /// Drop a step's handler. Reaching that step then yields the fallback prompt.
    pub fn without(mut self, step: ConversationStep) -> Self {
        self.handlers.remove(&step);
        self
    }

    pub fn contains(&self, step: ConversationStep) -> bool {
        self.handlers.contains_key(&step)
    }

    pub fn get(&self, step: ConversationStep) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(&step)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Prompt used when the current step has no handler. Offers a way forward.
pub fn fallback(state: &ConversationState) -> StepPrompt {
    StepPrompt::new(
        format!(
            "Let's keep going with your {}. You can review what we have so far or start over.",
            state.document_type()
        ),
        vec![
            Action::new("Review my setup", "goto").leading_to(ConversationStep::Confirmation),
            Action::new("Start over", "restart"),
        ],
    )
}

fn yes_no(verb: &str, key: &str, next: ConversationStep, yes: &str, no: &str) -> Vec<Action> {
    vec![
        Action::new(yes, verb).with(key, true).leading_to(next),
        Action::new(no, verb).with(key, false).leading_to(next),
    ]
}

fn intro(state: &ConversationState) -> StepPrompt {
    let doc = &state.document;
    let mut text = format!("I've taken a look at your {}", state.document_type());
    if let Some(pages) = doc.page_count {
        text.push_str(&format!(" ({} pages)", pages));
    }
    text.push_str(". I'll ask a few questions and then set up the right processing for it.");
    if doc.has_tables {
        text.push_str(" It looks like it contains tables.");
    }
    text.push_str(" You can also just tell me what you need in your own words.");
    StepPrompt::new(
        text,
        vec![
            Action::new("Let's get started", "start").leading_to(ConversationStep::UserProfile),
            Action::new("Skip to processing options", "start")
                .leading_to(ConversationStep::ProcessingSelection),
        ],
    )
}

fn user_profile(_: &ConversationState) -> StepPrompt {
    let roles = [
        ("Analyst", "analyst"),
        ("Engineer", "engineer"),
        ("Manager", "manager"),
        ("Researcher", "researcher"),
    ];
    StepPrompt::new(
        "What best describes your role?",
        roles
            .iter()
            .map(|(label, role)| Action::new(*label, "set_role").with("role", *role))
            .collect(),
    )
}

fn department(_: &ConversationState) -> StepPrompt {
    let departments = [
        ("Legal", "legal"),
        ("Finance", "finance"),
        ("Operations", "operations"),
        ("Research", "research"),
        ("Customer support", "support"),
    ];
    StepPrompt::new(
        "Which team will use the results?",
        departments
            .iter()
            .map(|(label, dept)| Action::new(*label, "set_department").with("department", *dept))
            .collect(),
    )
}

fn goals(_: &ConversationState) -> StepPrompt {
    StepPrompt::new(
        "What do you want to get out of this document?",
        vec![
            Action::new("Find answers quickly", "set_goal")
                .with("intent", "question_answering")
                .with("timeConstraint", "urgent")
                .with("detailLevel", "summary"),
            Action::new("Extract structured data", "set_goal")
                .with("intent", "data_extraction")
                .with("detailLevel", "detailed"),
            Action::new("Understand relationships", "set_goal")
                .with("intent", "relationship_mapping")
                .with("detailLevel", "detailed"),
            Action::new("Comprehensive analysis", "set_goal")
                .with("intent", "comprehensive")
                .with("timeConstraint", "flexible")
                .with("detailLevel", "exhaustive"),
        ],
    )
}

/// Families suggested for the user's goal and document.
pub fn recommended_families(state: &ConversationState) -> Vec<Family> {
    let mut families = match state.profile.intent.as_deref() {
        Some("data_extraction") => vec![Family::Idp],
        Some("relationship_mapping") => vec![Family::Kg],
        Some("comprehensive") => Family::ALL.to_vec(),
        _ => vec![Family::Rag],
    };
    if state.document.has_tables && !families.contains(&Family::Idp) {
        families.push(Family::Idp);
    }
    families.sort();
    families
}

fn family_list(families: &[Family]) -> Value {
    json!(families.iter().map(|f| f.as_str()).collect::<Vec<_>>())
}

fn join_names(families: &[Family]) -> String {
    families
        .iter()
        .map(|f| f.display_name())
        .collect::<Vec<_>>()
        .join(" + ")
}

fn processing_selection(state: &ConversationState) -> StepPrompt {
    let recommended = recommended_families(state);
    let mut text = format!(
        "For a {} I'd suggest {}.",
        state.document_type(),
        join_names(&recommended)
    );
    if let Some(tc) = state.profile.time_constraint.as_deref() {
        if tc == "urgent" {
            text.push_str(" Since you're short on time, I've kept it lean.");
        }
    }
    text.push_str(" Which processing should I run?");

    let mut actions = vec![Action::new(
        format!("Recommended: {}", join_names(&recommended)),
        "select_processing",
    )
    .with("families", family_list(&recommended))
    .with("recommended", true)];
    for family in Family::ALL {
        actions.push(
            Action::new(format!("Only {}", family.display_name()), "select_processing")
                .with("families", family_list(&[family])),
        );
    }
    actions.push(
        Action::new("All three", "select_processing").with("families", family_list(&Family::ALL)),
    );
    StepPrompt::new(text, actions)
}

fn multimodal_check(state: &ConversationState) -> StepPrompt {
    let hint = if state.document.has_images {
        " I spotted some images already."
    } else {
        ""
    };
    StepPrompt::new(
        format!("Does the document contain images, scans or diagrams?{}", hint),
        yes_no(
            "set_has_images",
            "hasImages",
            ConversationStep::AudioCheck,
            "Yes, it has images",
            "No images",
        ),
    )
}

fn audio_check(_: &ConversationState) -> StepPrompt {
    StepPrompt::new(
        "Is there any embedded audio or video that should be transcribed?",
        yes_no(
            "set_has_audio",
            "hasAudio",
            ConversationStep::VisualAnalysisCheck,
            "Yes, transcribe it",
            "No audio",
        ),
    )
}

fn visual_analysis_check(_: &ConversationState) -> StepPrompt {
    StepPrompt::new(
        "Should charts and figures be analysed visually as well?",
        yes_no(
            "set_visual_analysis",
            "visualAnalysis",
            ConversationStep::IdpCheck,
            "Yes, analyse visuals",
            "Text is enough",
        ),
    )
}

fn idp_check(state: &ConversationState) -> StepPrompt {
    let kinds = [
        ("Extract everything", "full"),
        ("Tables", "tables"),
        ("Form fields", "forms"),
        ("Plain text and metadata", "text"),
    ];
    let mut actions: Vec<Action> = kinds
        .iter()
        .map(|(label, kind)| {
            Action::new(*label, "set_idp")
                .with("enabled", true)
                .with("extractionType", *kind)
                .leading_to(ConversationStep::KgCheck)
        })
        .collect();
    actions.push(
        Action::new("No extraction", "set_idp")
            .with("enabled", false)
            .leading_to(ConversationStep::KgCheck),
    );
    if !state.selected_families.contains(&Family::Kg) {
        actions.push(
            Action::new("Extract everything and finish", "set_idp")
                .with("enabled", true)
                .with("extractionType", "full")
                .leading_to(ConversationStep::Confirmation),
        );
    }
    StepPrompt::new(
        "Do you need structured data pulled out of the document? If so, what kind?",
        actions,
    )
}

fn kg_check(_: &ConversationState) -> StepPrompt {
    StepPrompt::new(
        "Would you like a knowledge graph of the entities and how they relate?",
        vec![
            Action::new("Yes, build a graph", "set_kg")
                .with("enabled", true)
                .leading_to(ConversationStep::KgEntitySelection),
            Action::new("No graph", "set_kg")
                .with("enabled", false)
                .leading_to(ConversationStep::Confirmation),
        ],
    )
}

fn kg_entity_selection(_: &ConversationState) -> StepPrompt {
    let presets: [(&str, &[&str]); 4] = [
        ("People and organizations", &["person", "organization"]),
        ("Dates and amounts", &["date", "money"]),
        (
            "Everything",
            &["person", "organization", "location", "date", "money", "product"],
        ),
        ("Let the model decide", &[]),
    ];
    StepPrompt::new(
        "Which kinds of entities matter most?",
        presets
            .iter()
            .map(|(label, types)| {
                Action::new(*label, "set_entity_types").with("entityTypes", json!(types))
            })
            .collect(),
    )
}

/// Human-readable summary of a configuration, one line per enabled family.
pub fn describe(config: &ProcessingConfiguration) -> String {
    let mut lines = Vec::new();
    if config.rag.enabled {
        let mut line = format!(
            "- {}: {:?} retrieval, chunks of {} with {} overlap",
            Family::Rag.display_name(),
            config.rag.method,
            config.rag.chunk_size,
            config.rag.chunk_overlap
        );
        let m = &config.rag.multimodal;
        let extras: Vec<&str> = [
            (m.transcription, "transcription"),
            (m.ocr, "OCR"),
            (m.image_caption, "image captions"),
            (m.visual_analysis, "visual analysis"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        if !extras.is_empty() {
            line.push_str(&format!(" (+ {})", extras.join(", ")));
        }
        lines.push(line);
    }
    if config.idp.enabled {
        let i = &config.idp;
        let parts: Vec<&str> = [
            (i.text_extraction, "text"),
            (i.classification, "classification"),
            (i.metadata, "metadata"),
            (i.tables, "tables"),
            (i.form_fields, "form fields"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        lines.push(format!(
            "- {}: {}",
            Family::Idp.display_name(),
            parts.join(", ")
        ));
    }
    if config.kg.enabled {
        let types = if config.kg.entity_types.is_empty() {
            "all entity types".to_string()
        } else {
            config.kg.entity_types.join(", ")
        };
        lines.push(format!("- {}: {}", Family::Kg.display_name(), types));
    }
    if lines.is_empty() {
        "- nothing selected yet".to_string()
    } else {
        lines.join("\n")
    }
}

fn confirmation(state: &ConversationState) -> StepPrompt {
    let config = state
        .configuration
        .clone()
        .unwrap_or_else(|| synthesize(state));
    let mut text = String::new();
    if let Some(m) = &state.intent_match {
        text.push_str(&format!("Sounds like {}. ", m.name.replace('-', " ")));
    }
    text.push_str(&format!(
        "Here's the plan for your {}:\n{}",
        state.document_type(),
        describe(&config)
    ));
    StepPrompt::new(
        text,
        vec![
            Action::new("Start processing", "confirm"),
            Action::new("Go back", "back"),
            Action::new("Start over", "restart"),
        ],
    )
}
