use serde::{Deserialize, Serialize};
use std::fmt;

/// The three independently toggleable processing families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Retrieval/search indexing (chunking, embedding, indexing).
    Rag,
    /// Structured document and field extraction.
    Idp,
    /// Entity-relationship graph extraction.
    Kg,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Rag, Family::Idp, Family::Kg];

    /// Stable short name, also used in action payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Rag => "rag",
            Family::Idp => "idp",
            Family::Kg => "kg",
        }
    }

    /// Parse a family from its short name or a few common aliases.
    pub fn from_name(name: &str) -> Option<Family> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rag" | "search" | "retrieval" | "a" => Some(Family::Rag),
            "idp" | "extraction" | "b" => Some(Family::Idp),
            "kg" | "graph" | "knowledge_graph" | "c" => Some(Family::Kg),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Family::Rag => "Search & retrieval",
            Family::Idp => "Document extraction",
            Family::Kg => "Knowledge graph",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about the document before the wizard starts.
///
/// Everything is optional: an unclassified document still gets a
/// conversation, it is just addressed as "document".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentCharacteristics {
    pub name: Option<String>,
    /// Classified type, e.g. "contract", "invoice", "research paper".
    pub document_type: Option<String>,
    pub page_count: Option<u32>,
    pub has_images: bool,
    pub has_tables: bool,
    pub has_audio: bool,
    pub language: Option<String>,
}

impl DocumentCharacteristics {
    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            document_type: Some(document_type.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tables(mut self, has_tables: bool) -> Self {
        self.has_tables = has_tables;
        self
    }

    pub fn with_images(mut self, has_images: bool) -> Self {
        self.has_images = has_images;
        self
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }

    /// The document type label used in prompts, falling back to "document".
    pub fn type_label(&self) -> &str {
        self.document_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("document")
    }
}

/// How family A indexes chunks for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Semantic,
    Keyword,
    #[default]
    Hybrid,
}

impl RetrievalMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "semantic" | "dense" | "vector" => Some(Self::Semantic),
            "keyword" | "bm25" | "sparse" => Some(Self::Keyword),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Multimodal sub-flags of family A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultimodalFlags {
    pub transcription: bool,
    pub ocr: bool,
    pub image_caption: bool,
    pub visual_analysis: bool,
}

impl MultimodalFlags {
    pub fn any(&self) -> bool {
        self.transcription || self.ocr || self.image_caption || self.visual_analysis
    }
}

/// Family A: retrieval/search indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagConfig {
    pub enabled: bool,
    pub method: RetrievalMethod,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub multimodal: MultimodalFlags,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: RetrievalMethod::default(),
            chunk_size: 512,
            chunk_overlap: 50,
            multimodal: MultimodalFlags::default(),
        }
    }
}

/// Family B: structured document/field extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdpConfig {
    pub enabled: bool,
    pub text_extraction: bool,
    pub classification: bool,
    pub metadata: bool,
    pub tables: bool,
    pub form_fields: bool,
}

/// Family C: entity-relationship graph extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KgConfig {
    pub enabled: bool,
    pub entity_extraction: bool,
    pub relation_mapping: bool,
    pub graph_building: bool,
    pub entity_types: Vec<String>,
}

/// The finalized processing configuration handed from the wizard to the
/// pipeline. Three family blocks, each with `enabled` plus its sub-flags.
///
/// Sub-flags of a disabled family carry no meaning; consumers must check
/// `enabled` first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingConfiguration {
    pub rag: RagConfig,
    pub idp: IdpConfig,
    pub kg: KgConfig,
}

impl ProcessingConfiguration {
    pub fn is_enabled(&self, family: Family) -> bool {
        match family {
            Family::Rag => self.rag.enabled,
            Family::Idp => self.idp.enabled,
            Family::Kg => self.kg.enabled,
        }
    }

    /// Enabled families in canonical order (A, B, C).
    pub fn enabled_families(&self) -> Vec<Family> {
        Family::ALL
            .into_iter()
            .filter(|f| self.is_enabled(*f))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled_families().is_empty()
    }

    /// Serialize to a JSON value for renderers.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
