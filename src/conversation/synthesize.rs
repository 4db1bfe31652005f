//! Configuration synthesizer.
//!
//! A pure merge of everything the conversation has accumulated into one
//! [`ProcessingConfiguration`]. Used for previews and for the final artifact.

use super::state::ConversationState;
use crate::types::{Family, IdpConfig, KgConfig, MultimodalFlags, ProcessingConfiguration};

/// Merge accumulated preferences into a configuration.
///
/// A family is enabled when it was selected explicitly, enabled by a matched
/// intent, or enabled in the partial configuration from
/// `processing_selection`. Sub-settings come from the intent template first,
/// then the partial configuration, then defaults.
///
/// Multimodal flags come only from the multimodal answers. Having images
/// turns on both OCR and image captioning; whether "has images" should imply
/// "wants OCR" is still a product decision, so it stays as-is here.
pub fn synthesize(state: &ConversationState) -> ProcessingConfiguration {
    let intent = state.intent_match.as_ref().map(|m| &m.configuration);
    let partial = state.partial_configuration.as_ref();
    let enabled = |family: Family| {
        state.selected_families.contains(&family)
            || intent.is_some_and(|c| c.is_enabled(family))
            || partial.is_some_and(|c| c.is_enabled(family))
    };
    // Sub-settings source for a family: whichever input actually enables it.
    let base = |family: Family| {
        intent
            .filter(|c| c.is_enabled(family))
            .or_else(|| partial.filter(|c| c.is_enabled(family)))
            .cloned()
            .unwrap_or_default()
    };

    let mut rag = base(Family::Rag).rag;
    rag.enabled = enabled(Family::Rag);
    rag.multimodal = MultimodalFlags {
        transcription: state.multimodal.has_audio,
        ocr: state.multimodal.has_images,
        image_caption: state.multimodal.has_images,
        visual_analysis: state.multimodal.visual_analysis,
    };

    let mut idp = base(Family::Idp).idp;
    idp.enabled = enabled(Family::Idp);
    if let Some(kind) = state.extraction_type.as_deref() {
        let chosen = extraction_flags(kind);
        idp.text_extraction |= chosen.text_extraction;
        idp.classification |= chosen.classification;
        idp.metadata |= chosen.metadata;
        idp.tables |= chosen.tables;
        idp.form_fields |= chosen.form_fields;
    }
    if idp.enabled && !has_idp_task(&idp) {
        idp = IdpConfig {
            enabled: true,
            ..extraction_flags("full")
        };
    }

    let mut kg = base(Family::Kg).kg;
    kg.enabled = enabled(Family::Kg);
    if !state.entity_types.is_empty() {
        kg.entity_types = dedup(&state.entity_types);
    }
    if kg.enabled && !(kg.entity_extraction || kg.relation_mapping || kg.graph_building) {
        kg = KgConfig {
            enabled: true,
            entity_extraction: true,
            relation_mapping: true,
            graph_building: true,
            entity_types: kg.entity_types,
        };
    }

    ProcessingConfiguration { rag, idp, kg }
}

/// Family B sub-flags for an extraction type chosen at `idp_check`.
/// Unknown types extract everything.
pub fn extraction_flags(kind: &str) -> IdpConfig {
    let mut flags = IdpConfig {
        enabled: false,
        text_extraction: true,
        ..Default::default()
    };
    match kind.trim().to_ascii_lowercase().as_str() {
        "text" => flags.metadata = true,
        "tables" => flags.tables = true,
        "forms" | "form_fields" => flags.form_fields = true,
        "classification" => flags.classification = true,
        _ => {
            flags.classification = true;
            flags.metadata = true;
            flags.tables = true;
            flags.form_fields = true;
        }
    }
    flags
}

fn has_idp_task(idp: &IdpConfig) -> bool {
    idp.text_extraction || idp.classification || idp.metadata || idp.tables || idp.form_fields
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}
