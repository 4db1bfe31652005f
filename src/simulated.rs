//! Simulated step bodies.
//!
//! Real parsing, embedding and graph work happens elsewhere. These bodies
//! stand in for it: they tick through progress updates with a little
//! jitter and return a small summary of what the real step would produce.

use crate::body::StepBody;
use crate::exec_ctx::ExecCtx;
use crate::types::Family;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Every kind of work a planned pipeline can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatedTask {
    ExtractText,
    Classify,
    Metadata,
    Tables,
    FormFields,
    Multimodal,
    Chunk,
    Embed,
    Index,
    Entities,
    Relations,
    Graph,
}

impl SimulatedTask {
    pub const ALL: [SimulatedTask; 12] = [
        Self::ExtractText,
        Self::Classify,
        Self::Metadata,
        Self::Tables,
        Self::FormFields,
        Self::Multimodal,
        Self::Chunk,
        Self::Embed,
        Self::Index,
        Self::Entities,
        Self::Relations,
        Self::Graph,
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractText => "idp.extract_text",
            Self::Classify => "idp.classify",
            Self::Metadata => "idp.metadata",
            Self::Tables => "idp.tables",
            Self::FormFields => "idp.form_fields",
            Self::Multimodal => "rag.multimodal",
            Self::Chunk => "rag.chunk",
            Self::Embed => "rag.embed",
            Self::Index => "rag.index",
            Self::Entities => "kg.entities",
            Self::Relations => "kg.relations",
            Self::Graph => "kg.graph",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Self::ExtractText
            | Self::Classify
            | Self::Metadata
            | Self::Tables
            | Self::FormFields => Family::Idp,
            Self::Multimodal | Self::Chunk | Self::Embed | Self::Index => Family::Rag,
            Self::Entities | Self::Relations | Self::Graph => Family::Kg,
        }
    }

    /// Step id used by the planner.
    pub fn step_id(&self) -> &'static str {
        match self {
            Self::ExtractText => "idp-extract-text",
            Self::Classify => "idp-classify",
            Self::Metadata => "idp-metadata",
            Self::Tables => "idp-tables",
            Self::FormFields => "idp-form-fields",
            Self::Multimodal => "rag-multimodal",
            Self::Chunk => "rag-chunk",
            Self::Embed => "rag-embed",
            Self::Index => "rag-index",
            Self::Entities => "kg-entities",
            Self::Relations => "kg-relations",
            Self::Graph => "kg-graph",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ExtractText => "Extract text",
            Self::Classify => "Classify document",
            Self::Metadata => "Extract metadata",
            Self::Tables => "Extract tables",
            Self::FormFields => "Extract form fields",
            Self::Multimodal => "Process images and audio",
            Self::Chunk => "Chunk text",
            Self::Embed => "Generate embeddings",
            Self::Index => "Build search index",
            Self::Entities => "Extract entities",
            Self::Relations => "Map relations",
            Self::Graph => "Build knowledge graph",
        }
    }
}

/// A body that pretends to do one [`SimulatedTask`].
#[derive(Debug, Clone)]
pub struct SimulatedBody {
    task: SimulatedTask,
}

impl SimulatedBody {
    pub fn new(task: SimulatedTask) -> Self {
        Self { task }
    }

    fn pause(&self, ctx: &ExecCtx, rng: &mut fastrand::Rng) -> Duration {
        let base = ctx.tick_interval.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        // up to +50% jitter
        Duration::from_millis(base + rng.u64(0..=base / 2))
    }

    fn output(&self, ctx: &ExecCtx) -> Value {
        let doc = &ctx.document;
        let config = &ctx.configuration;
        let pages = u64::from(doc.page_count.unwrap_or(1).max(1));
        let characters = pages * 1800;
        let upstream_u64 = |step: &str, key: &str| {
            ctx.upstream(step)
                .and_then(|v| v.get(key))
                .and_then(Value::as_u64)
        };
        match self.task {
            SimulatedTask::ExtractText => json!({ "pages": pages, "characters": characters }),
            SimulatedTask::Classify => json!({ "label": doc.type_label(), "confidence": 0.92 }),
            SimulatedTask::Metadata => json!({
                "title": doc.name.clone().unwrap_or_else(|| doc.type_label().to_string()),
                "language": doc.language.clone().unwrap_or_else(|| "en".to_string()),
                "pages": pages,
            }),
            SimulatedTask::Tables => {
                let tables = if doc.has_tables { pages.div_ceil(4) } else { 0 };
                json!({ "tables": tables })
            }
            SimulatedTask::FormFields => json!({ "fields": pages * 6 }),
            SimulatedTask::Multimodal => {
                let m = &config.rag.multimodal;
                json!({
                    "transcribed": m.transcription,
                    "ocrPages": if m.ocr { pages } else { 0 },
                    "captions": if m.image_caption { pages } else { 0 },
                    "visualAnalysis": m.visual_analysis,
                })
            }
            SimulatedTask::Chunk => {
                let size = u64::from(config.rag.chunk_size.max(1));
                let overlap = u64::from(config.rag.chunk_overlap);
                let stride = size.saturating_sub(overlap).max(1);
                let text = upstream_u64("idp-extract-text", "characters").unwrap_or(characters);
                json!({ "chunks": text.div_ceil(stride), "chunkSize": size, "overlap": overlap })
            }
            SimulatedTask::Embed => {
                let chunks = upstream_u64("rag-chunk", "chunks").unwrap_or(0);
                json!({ "vectors": chunks, "dimensions": 768 })
            }
            SimulatedTask::Index => {
                let vectors = upstream_u64("rag-embed", "vectors").unwrap_or(0);
                json!({ "method": config.rag.method, "indexed": vectors })
            }
            SimulatedTask::Entities => {
                let types = if config.kg.entity_types.is_empty() {
                    vec!["entity".to_string()]
                } else {
                    config.kg.entity_types.clone()
                };
                json!({ "entityTypes": types, "entities": pages * 4 * types.len() as u64 })
            }
            SimulatedTask::Relations => {
                let entities = upstream_u64("kg-entities", "entities").unwrap_or(0);
                json!({ "relations": entities.saturating_sub(1) })
            }
            SimulatedTask::Graph => {
                let nodes = upstream_u64("kg-entities", "entities").unwrap_or(0);
                let edges = upstream_u64("kg-relations", "relations").unwrap_or(0);
                json!({ "nodes": nodes, "edges": edges })
            }
        }
    }
}

#[async_trait]
impl StepBody for SimulatedBody {
    fn kind(&self) -> &'static str {
        self.task.kind()
    }

    async fn run(&self, ctx: &ExecCtx) -> anyhow::Result<Value> {
        let ticks = ctx.ticks.max(1);
        let mut rng = fastrand::Rng::with_seed(seed(&ctx.step_id));
        for tick in 1..=ticks {
            tokio::time::sleep(self.pause(ctx, &mut rng)).await;
            ctx.check_abandoned()?;
            ctx.report((tick * 100 / ticks) as u8);
        }
        Ok(self.output(ctx))
    }
}

fn seed(text: &str) -> u64 {
    // FNV-1a
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}
