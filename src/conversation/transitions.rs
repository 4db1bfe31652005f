//! Structured action verbs and their effect on the state.
//!
//! A verb reads what it needs from the payload (missing fields count as
//! absent/false), updates the accumulators, and names the next step: the
//! payload's `next` when it is a known step, otherwise the verb's default.

use super::state::{ConversationState, ConversationStep};
use crate::types::{Family, ProcessingConfiguration, RagConfig, RetrievalMethod};
use serde_json::{Map, Value};
use tracing::warn;

/// Result of applying a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to this step.
    Goto(ConversationStep),
    /// Replace the conversation with a fresh one.
    Restart,
    /// Stay on the current step and acknowledge.
    Stay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerb {
    Start,
    SetRole,
    SetDepartment,
    SetGoal,
    SelectProcessing,
    SetHasImages,
    SetHasAudio,
    SetVisualAnalysis,
    SetIdp,
    SetKg,
    SetEntityTypes,
    Confirm,
    Back,
    Goto,
    Restart,
}

impl ActionVerb {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "start" => Self::Start,
            "set_role" => Self::SetRole,
            "set_department" => Self::SetDepartment,
            "set_goal" => Self::SetGoal,
            "select_processing" => Self::SelectProcessing,
            "set_has_images" => Self::SetHasImages,
            "set_has_audio" => Self::SetHasAudio,
            "set_visual_analysis" => Self::SetVisualAnalysis,
            "set_idp" => Self::SetIdp,
            "set_kg" => Self::SetKg,
            "set_entity_types" => Self::SetEntityTypes,
            "confirm" => Self::Confirm,
            "back" => Self::Back,
            "goto" => Self::Goto,
            "restart" => Self::Restart,
            _ => return None,
        })
    }

    /// Apply the verb to `state`.
    pub fn apply(&self, payload: &Map<String, Value>, state: &mut ConversationState) -> Transition {
        let current = state.current_step;
        let next_or = |default: ConversationStep| {
            Transition::Goto(declared_next(payload).unwrap_or(default))
        };
        match self {
            Self::Start => next_or(ConversationStep::UserProfile),
            Self::SetRole => {
                state.profile.role = text(payload, "role");
                if let Some(pk) = text(payload, "priorKnowledge") {
                    state.profile.prior_knowledge = Some(pk);
                }
                next_or(ConversationStep::Department)
            }
            Self::SetDepartment => {
                state.profile.department = text(payload, "department");
                next_or(ConversationStep::Goals)
            }
            Self::SetGoal => {
                state.profile.intent = text(payload, "intent");
                state.profile.time_constraint = text(payload, "timeConstraint");
                state.profile.detail_level = text(payload, "detailLevel");
                for pref in list(payload, "preferences") {
                    if !state.profile.preferences.contains(&pref) {
                        state.profile.preferences.push(pref);
                    }
                }
                next_or(ConversationStep::ProcessingSelection)
            }
            Self::SelectProcessing => {
                let families: Vec<Family> = list(payload, "families")
                    .iter()
                    .filter_map(|name| Family::from_name(name))
                    .collect();
                state.selected_families = families.iter().copied().collect();
                state.partial_configuration = Some(partial_configuration(state, &families));
                next_or(ConversationStep::MultimodalCheck)
            }
            Self::SetHasImages => {
                state.multimodal.has_images = flag(payload, "hasImages");
                next_or(ConversationStep::AudioCheck)
            }
            Self::SetHasAudio => {
                state.multimodal.has_audio = flag(payload, "hasAudio");
                next_or(ConversationStep::VisualAnalysisCheck)
            }
            Self::SetVisualAnalysis => {
                state.multimodal.visual_analysis = flag(payload, "visualAnalysis");
                next_or(ConversationStep::IdpCheck)
            }
            Self::SetIdp => {
                if flag(payload, "enabled") {
                    state.selected_families.insert(Family::Idp);
                    state.extraction_type =
                        Some(text(payload, "extractionType").unwrap_or_else(|| "full".to_string()));
                } else {
                    decline(state, Family::Idp);
                    state.extraction_type = None;
                }
                next_or(ConversationStep::KgCheck)
            }
            Self::SetKg => {
                if flag(payload, "enabled") {
                    state.selected_families.insert(Family::Kg);
                    next_or(ConversationStep::KgEntitySelection)
                } else {
                    decline(state, Family::Kg);
                    state.entity_types.clear();
                    next_or(ConversationStep::Confirmation)
                }
            }
            Self::SetEntityTypes => {
                state.entity_types = list(payload, "entityTypes");
                next_or(ConversationStep::Confirmation)
            }
            Self::Confirm => Transition::Goto(ConversationStep::Confirmation),
            Self::Back => match state.history.last() {
                Some(previous) => Transition::Goto(*previous),
                None => Transition::Stay,
            },
            Self::Goto => match declared_next(payload) {
                Some(step) => Transition::Goto(step),
                None => Transition::Goto(current.default_next()),
            },
            Self::Restart => Transition::Restart,
        }
    }
}

/// Configuration preview stored by `select_processing`.
fn partial_configuration(
    state: &ConversationState,
    families: &[Family],
) -> ProcessingConfiguration {
    let urgent = state.profile.time_constraint.as_deref() == Some("urgent");
    let exhaustive = state.profile.detail_level.as_deref() == Some("exhaustive");
    let mut config = ProcessingConfiguration::default();
    if families.contains(&Family::Rag) {
        config.rag = RagConfig {
            enabled: true,
            method: if urgent {
                RetrievalMethod::Keyword
            } else {
                RetrievalMethod::Hybrid
            },
            chunk_size: if exhaustive { 1000 } else { 512 },
            chunk_overlap: if exhaustive { 150 } else { 50 },
            ..Default::default()
        };
    }
    config.idp.enabled = families.contains(&Family::Idp);
    config.kg.enabled = families.contains(&Family::Kg);
    config
}

/// Drop `family` from every earlier selection, including the one made at
/// `processing_selection`, so the latest answer wins.
fn decline(state: &mut ConversationState, family: Family) {
    state.selected_families.remove(&family);
    if let Some(partial) = state.partial_configuration.as_mut() {
        match family {
            Family::Rag => partial.rag.enabled = false,
            Family::Idp => partial.idp.enabled = false,
            Family::Kg => partial.kg.enabled = false,
        }
    }
}

fn declared_next(payload: &Map<String, Value>) -> Option<ConversationStep> {
    let name = payload.get("next")?.as_str()?;
    let step = ConversationStep::from_name(name);
    if step.is_none() {
        warn!(next = name, "ignoring unknown next step in action payload");
    }
    step
}

fn flag(payload: &Map<String, Value>, key: &str) -> bool {
    match payload.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn text(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A string list; a bare string counts as a one-element list.
fn list(payload: &Map<String, Value>, key: &str) -> Vec<String> {
    match payload.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentCharacteristics;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn state() -> ConversationState {
        ConversationState::new(DocumentCharacteristics::new("report"))
    }

    #[test]
    fn test_all_verbs_parse() {
        for name in [
            "start", "set_role", "set_department", "set_goal", "select_processing",
            "set_has_images", "set_has_audio", "set_visual_analysis", "set_idp", "set_kg",
            "set_entity_types", "confirm", "back", "goto", "restart",
        ] {
            assert!(ActionVerb::from_name(name).is_some(), "{}", name);
        }
        assert!(ActionVerb::from_name("dance").is_none());
    }

    #[test]
    fn test_missing_fields_default_to_false() {
        let mut s = state();
        s.multimodal.has_images = true;
        let t = ActionVerb::SetHasImages.apply(&Map::new(), &mut s);
        assert!(!s.multimodal.has_images);
        assert_eq!(t, Transition::Goto(ConversationStep::AudioCheck));
    }

    #[test]
    fn test_payload_next_overrides_default() {
        let mut s = state();
        let t = ActionVerb::SetIdp.apply(
            &payload(json!({"enabled": true, "next": "confirmation"})),
            &mut s,
        );
        assert_eq!(t, Transition::Goto(ConversationStep::Confirmation));
        assert!(s.selected_families.contains(&Family::Idp));
        assert_eq!(s.extraction_type.as_deref(), Some("full"));
    }

    #[test]
    fn test_unknown_next_uses_default() {
        let mut s = state();
        let t = ActionVerb::SetKg.apply(
            &payload(json!({"enabled": true, "next": "gone"})),
            &mut s,
        );
        assert_eq!(t, Transition::Goto(ConversationStep::KgEntitySelection));
    }

    #[test]
    fn test_set_kg_false_skips_entity_selection() {
        let mut s = state();
        s.selected_families.insert(Family::Kg);
        s.entity_types = vec!["person".into()];
        let t = ActionVerb::SetKg.apply(&payload(json!({"enabled": false})), &mut s);
        assert_eq!(t, Transition::Goto(ConversationStep::Confirmation));
        assert!(!s.selected_families.contains(&Family::Kg));
        assert!(s.entity_types.is_empty());
    }

    #[test]
    fn test_declining_clears_earlier_selection() {
        let mut s = state();
        ActionVerb::SelectProcessing.apply(
            &payload(json!({"families": ["rag", "idp", "kg"]})),
            &mut s,
        );
        ActionVerb::SetIdp.apply(&payload(json!({"enabled": false})), &mut s);
        ActionVerb::SetKg.apply(&payload(json!({"enabled": false})), &mut s);
        let partial = s.partial_configuration.clone().unwrap();
        assert!(partial.rag.enabled);
        assert!(!partial.idp.enabled && !partial.kg.enabled);
        assert_eq!(s.selected_families.iter().copied().collect::<Vec<_>>(), vec![Family::Rag]);
    }

    #[test]
    fn test_select_processing_builds_partial() {
        let mut s = state();
        s.profile.time_constraint = Some("urgent".into());
        ActionVerb::SelectProcessing.apply(
            &payload(json!({"families": ["rag", "kg", "bogus"]})),
            &mut s,
        );
        let partial = s.partial_configuration.clone().unwrap();
        assert!(partial.rag.enabled && partial.kg.enabled && !partial.idp.enabled);
        assert_eq!(partial.rag.method, RetrievalMethod::Keyword);
        assert_eq!(s.selected_families.len(), 2);
    }

    #[test]
    fn test_lenient_flag_parsing() {
        assert!(flag(&payload(json!({"x": "yes"})), "x"));
        assert!(flag(&payload(json!({"x": 1})), "x"));
        assert!(!flag(&payload(json!({"x": null})), "x"));
        assert_eq!(list(&payload(json!({"x": "one"})), "x"), vec!["one"]);
    }

    #[test]
    fn test_back_without_history_stays() {
        let mut s = state();
        assert_eq!(ActionVerb::Back.apply(&Map::new(), &mut s), Transition::Stay);
        s.history.push(ConversationStep::Goals);
        assert_eq!(
            ActionVerb::Back.apply(&Map::new(), &mut s),
            Transition::Goto(ConversationStep::Goals)
        );
    }
}
