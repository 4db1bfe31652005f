//! Decomposition of a processing configuration into pipeline steps.
//!
//! Dependencies mirror the real data flow: chunking needs extracted text (or
//! the extracted tables and forms, for table-oriented jobs), embedding needs
//! chunks, relations need entities.

use crate::body::BodyRegistry;
use crate::simulated::SimulatedTask;
use crate::step::StepDefinition;
use crate::types::ProcessingConfiguration;

/// Plan the steps for `config`. Disabled families contribute nothing,
/// whatever their sub-flags say. Definitions come out family B, A, C.
pub fn plan_steps(config: &ProcessingConfiguration, bodies: &BodyRegistry) -> Vec<StepDefinition> {
    let step = |task: SimulatedTask| {
        StepDefinition::new(task.step_id(), task.family(), task.display_name(), bodies.get(task))
    };
    let mut steps = Vec::new();

    let idp = &config.idp;
    let mut table_outputs = Vec::new();
    if idp.enabled {
        steps.push(step(SimulatedTask::ExtractText));
        let extract = SimulatedTask::ExtractText.step_id();
        for (wanted, task) in [
            (idp.classification, SimulatedTask::Classify),
            (idp.metadata, SimulatedTask::Metadata),
            (idp.tables, SimulatedTask::Tables),
            (idp.form_fields, SimulatedTask::FormFields),
        ] {
            if wanted {
                steps.push(step(task).after(extract));
                if matches!(task, SimulatedTask::Tables | SimulatedTask::FormFields) {
                    table_outputs.push(task.step_id());
                }
            }
        }
    }

    let rag = &config.rag;
    if rag.enabled {
        let mut chunk = step(SimulatedTask::Chunk);
        if rag.multimodal.any() {
            steps.push(step(SimulatedTask::Multimodal));
            chunk = chunk.after(SimulatedTask::Multimodal.step_id());
        }
        if !table_outputs.is_empty() {
            for id in &table_outputs {
                chunk = chunk.after(*id);
            }
        } else if idp.enabled {
            chunk = chunk.after(SimulatedTask::ExtractText.step_id());
        }
        steps.push(chunk);
        steps.push(step(SimulatedTask::Embed).after(SimulatedTask::Chunk.step_id()));
        steps.push(step(SimulatedTask::Index).after(SimulatedTask::Embed.step_id()));
    }

    let kg = &config.kg;
    if kg.enabled {
        let mut entities = step(SimulatedTask::Entities);
        if idp.enabled {
            entities = entities.after(SimulatedTask::ExtractText.step_id());
        } else if rag.enabled {
            entities = entities.after(SimulatedTask::Chunk.step_id());
        }
        steps.push(entities);
        let mut last = SimulatedTask::Entities.step_id();
        if kg.relation_mapping {
            steps.push(step(SimulatedTask::Relations).after(last));
            last = SimulatedTask::Relations.step_id();
        }
        if kg.graph_building {
            let mut graph = step(SimulatedTask::Graph).after(last);
            if last != SimulatedTask::Entities.step_id() {
                graph = graph.after(SimulatedTask::Entities.step_id());
            }
            steps.push(graph);
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StepGraph;
    use crate::types::{Family, IdpConfig, KgConfig};

    fn ids(steps: &[StepDefinition]) -> Vec<&str> {
        steps.iter().map(|s| s.id.as_str()).collect()
    }

    fn deps<'a>(steps: &'a [StepDefinition], id: &str) -> Vec<&'a str> {
        steps
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_disabled_config_plans_nothing() {
        let mut config = ProcessingConfiguration::default();
        config.idp.tables = true; // ignored while idp is disabled
        assert!(plan_steps(&config, &BodyRegistry::default()).is_empty());
    }

    #[test]
    fn test_rag_only_chain() {
        let mut config = ProcessingConfiguration::default();
        config.rag.enabled = true;
        let steps = plan_steps(&config, &BodyRegistry::default());
        assert_eq!(ids(&steps), vec!["rag-chunk", "rag-embed", "rag-index"]);
        assert!(deps(&steps, "rag-chunk").is_empty());
        assert_eq!(deps(&steps, "rag-index"), vec!["rag-embed"]);
    }

    #[test]
    fn test_table_oriented_chunking_waits_for_tables() {
        let mut config = ProcessingConfiguration::default();
        config.rag.enabled = true;
        config.rag.multimodal.ocr = true;
        config.idp = IdpConfig {
            enabled: true,
            text_extraction: true,
            tables: true,
            form_fields: true,
            ..Default::default()
        };
        let steps = plan_steps(&config, &BodyRegistry::default());
        assert_eq!(
            deps(&steps, "rag-chunk"),
            vec!["rag-multimodal", "idp-tables", "idp-form-fields"]
        );
        assert!(StepGraph::build(steps).is_ok());
    }

    #[test]
    fn test_all_families_form_valid_graph() {
        let mut config = ProcessingConfiguration::default();
        config.rag.enabled = true;
        config.idp = IdpConfig {
            enabled: true,
            text_extraction: true,
            classification: true,
            metadata: true,
            ..Default::default()
        };
        config.kg = KgConfig {
            enabled: true,
            entity_extraction: true,
            relation_mapping: true,
            graph_building: true,
            entity_types: vec![],
        };
        let steps = plan_steps(&config, &BodyRegistry::default());
        assert_eq!(deps(&steps, "rag-chunk"), vec!["idp-extract-text"]);
        assert_eq!(deps(&steps, "kg-entities"), vec!["idp-extract-text"]);
        assert_eq!(deps(&steps, "kg-graph"), vec!["kg-relations", "kg-entities"]);
        let families: Vec<Family> = steps.iter().map(|s| s.family).collect();
        assert!(families.contains(&Family::Rag) && families.contains(&Family::Kg));
        let graph = StepGraph::build(steps).unwrap();
        assert_eq!(graph.len(), 9);
    }

    #[test]
    fn test_kg_without_idp_follows_chunks() {
        let mut config = ProcessingConfiguration::default();
        config.rag.enabled = true;
        config.kg.enabled = true;
        config.kg.graph_building = true;
        let steps = plan_steps(&config, &BodyRegistry::default());
        assert_eq!(deps(&steps, "kg-entities"), vec!["rag-chunk"]);
        assert_eq!(deps(&steps, "kg-graph"), vec!["kg-entities"]);
    }
}
