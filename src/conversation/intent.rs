//! Intent catalog: free-text goals mapped to pre-built configurations.
//!
//! Matching is keyword co-occurrence. Each intent declares keyword groups and
//! matches only when every group has at least one case-insensitive hit in the
//! text. A keyword hits when it starts a word, so `"classif"` covers
//! "classify" and "classification" while `"term"` never matches "determine".

use super::state::IntentMatch;
use crate::types::{IdpConfig, KgConfig, ProcessingConfiguration, RagConfig, RetrievalMethod};

/// One catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentTemplate {
    pub name: String,
    pub description: String,
    /// All groups must match; any keyword within a group is enough.
    pub keyword_groups: Vec<Vec<String>>,
    pub confidence: f32,
    pub configuration: ProcessingConfiguration,
}

impl IntentTemplate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        confidence: f32,
        configuration: ProcessingConfiguration,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keyword_groups: Vec::new(),
            confidence,
            configuration,
        }
    }

    /// Add a required keyword group (builder style). Keywords are stored lowercase.
    pub fn requiring(mut self, keywords: &[&str]) -> Self {
        self.keyword_groups
            .push(keywords.iter().map(|k| k.to_lowercase()).collect());
        self
    }

    /// Whether `words` (see [`normalize`]) satisfies every keyword group.
    fn matches(&self, words: &str) -> bool {
        !self.keyword_groups.is_empty()
            && self
                .keyword_groups
                .iter()
                .all(|group| group.iter().any(|k| starts_word(words, k)))
    }
}

/// Fixed lookup table of intents.
#[derive(Debug, Clone)]
pub struct IntentCatalog {
    intents: Vec<IntentTemplate>,
}

impl IntentCatalog {
    pub fn new(intents: Vec<IntentTemplate>) -> Self {
        Self { intents }
    }

    pub fn intents(&self) -> &[IntentTemplate] {
        &self.intents
    }

    pub fn get(&self, name: &str) -> Option<&IntentTemplate> {
        self.intents.iter().find(|i| i.name == name)
    }

    /// Detect an intent in free text.
    ///
    /// When several intents match, the highest confidence wins; ties go to
    /// the one defined first.
    pub fn detect(&self, text: &str) -> Option<IntentMatch> {
        let words = normalize(text);
        let mut best: Option<&IntentTemplate> = None;
        for intent in self.intents.iter().filter(|i| i.matches(&words)) {
            match best {
                Some(b) if b.confidence >= intent.confidence => {}
                _ => best = Some(intent),
            }
        }
        best.map(|i| IntentMatch {
            name: i.name.clone(),
            confidence: i.confidence,
            configuration: i.configuration.clone(),
        })
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self::new(vec![
            IntentTemplate::new(
                "contract-analysis",
                "Pull parties, obligations and key terms out of agreements",
                0.9,
                ProcessingConfiguration {
                    idp: IdpConfig {
                        enabled: true,
                        text_extraction: true,
                        classification: true,
                        metadata: true,
                        ..Default::default()
                    },
                    kg: KgConfig {
                        enabled: true,
                        entity_extraction: true,
                        relation_mapping: true,
                        graph_building: true,
                        entity_types: strings(&["party", "date", "obligation", "amount"]),
                    },
                    ..Default::default()
                },
            )
            .requiring(&["contract", "agreement", "nda", "lease"])
            .requiring(&[
                "term",
                "clause",
                "obligation",
                "party",
                "parties",
                "renewal",
                "extract",
            ]),
            IntentTemplate::new(
                "invoice-processing",
                "Capture totals, vendors and line items from invoices and receipts",
                0.9,
                ProcessingConfiguration {
                    idp: IdpConfig {
                        enabled: true,
                        text_extraction: true,
                        classification: false,
                        metadata: true,
                        tables: true,
                        form_fields: true,
                    },
                    ..Default::default()
                },
            )
            .requiring(&["invoice", "receipt", "bill"])
            .requiring(&["total", "amount", "line item", "vendor", "tax", "extract"]),
            IntentTemplate::new(
                "proposal-extraction",
                "Extract requirements, budgets and deadlines from proposals and RFPs",
                0.85,
                ProcessingConfiguration {
                    rag: RagConfig {
                        enabled: true,
                        method: RetrievalMethod::Hybrid,
                        chunk_size: 800,
                        chunk_overlap: 100,
                        ..Default::default()
                    },
                    idp: IdpConfig {
                        enabled: true,
                        text_extraction: true,
                        metadata: true,
                        tables: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .requiring(&["proposal", "rfp", "bid", "tender"])
            .requiring(&["extract", "requirement", "deadline", "budget", "scope"]),
            IntentTemplate::new(
                "ticket-processing",
                "Classify and route support tickets",
                0.8,
                ProcessingConfiguration {
                    rag: RagConfig {
                        enabled: true,
                        method: RetrievalMethod::Keyword,
                        chunk_size: 256,
                        chunk_overlap: 20,
                        ..Default::default()
                    },
                    idp: IdpConfig {
                        enabled: true,
                        text_extraction: true,
                        classification: true,
                        metadata: true,
                        form_fields: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .requiring(&["ticket", "support", "incident", "issue"])
            .requiring(&["classif", "route", "routing", "triage", "categor", "priorit"]),
            IntentTemplate::new(
                "research-qa",
                "Ask questions across papers and reports and see how concepts connect",
                0.75,
                ProcessingConfiguration {
                    rag: RagConfig {
                        enabled: true,
                        method: RetrievalMethod::Semantic,
                        chunk_size: 1000,
                        chunk_overlap: 150,
                        ..Default::default()
                    },
                    kg: KgConfig {
                        enabled: true,
                        entity_extraction: true,
                        relation_mapping: true,
                        graph_building: true,
                        entity_types: strings(&["concept", "method", "author"]),
                    },
                    ..Default::default()
                },
            )
            .requiring(&["paper", "research", "study", "article", "report"])
            .requiring(&["question", "search", "ask", "summar", "find"]),
        ])
    }
}

impl Default for IntentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase `text` and collapse every run of non-alphanumerics into one
/// space, with a leading space so each word starts after a space.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push(' ');
        out.push_str(&word.to_lowercase());
    }
    out
}

/// Whether `keyword` (possibly several words) begins at a word start in `words`.
fn starts_word(words: &str, keyword: &str) -> bool {
    let keyword = normalize(keyword);
    !keyword.is_empty() && words.contains(keyword.as_str())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
