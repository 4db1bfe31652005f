use docflow::{
    ConversationManager, ConversationState, DocumentCharacteristics, ExecutorConfig, Family,
    PipelineState, ProcessingPipeline, StepStatus, UserInput,
};
use std::time::Duration;

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

fn pipeline() -> ProcessingPipeline {
    ProcessingPipeline::with_config(ExecutorConfig::fast())
}

#[tokio::test]
async fn test_guided_walk_runs_every_family() {
    let document = DocumentCharacteristics::new("annual report")
        .with_tables(true)
        .with_pages(12);
    let m = ConversationManager::new();
    let s = m.start_conversation(Some(&document));
    let s = click(&m, s, "start", "Let's get started");
    let s = click(&m, s, "set_role", "Analyst");
    let s = click(&m, s, "set_department", "Finance");
    let s = click(&m, s, "set_goal", "Comprehensive analysis");
    let s = click(
        &m,
        s,
        "select_processing",
        "Recommended: Search & retrieval + Document extraction + Knowledge graph",
    );
    let s = click(&m, s, "set_has_images", "Yes, it has images");
    let s = click(&m, s, "set_has_audio", "No audio");
    let s = click(&m, s, "set_visual_analysis", "Text is enough");
    let s = click(&m, s, "set_idp", "Tables");
    let s = click(&m, s, "set_kg", "Yes, build a graph");
    let s = click(&m, s, "set_entity_types", "Dates and amounts");
    let config = m.final_configuration(&s).expect("conversation finished");

    let pipeline = pipeline();
    let steps = pipeline.configure_from_intent(&config, &document).unwrap();
    assert!(steps.iter().any(|s| s.id == "rag-multimodal"));
    assert!(steps.iter().any(|s| s.id == "idp-tables"));

    let mut progress = pipeline.subscribe_progress();
    let status = pipeline.execute().await.unwrap();
    assert_eq!(status.state, PipelineState::Completed);
    assert_eq!(status.completed_steps, steps.len());
    assert!(pipeline
        .get_steps()
        .iter()
        .all(|s| s.status == StepStatus::Completed && s.progress == 100));

    let results = pipeline.get_combined_results();
    assert_eq!(results.len(), 3);
    assert_eq!(results[&Family::Idp]["idp-tables"]["tables"], 3);
    assert_eq!(results[&Family::Rag]["rag-chunk"]["chunkSize"], 1000);
    assert_eq!(
        results[&Family::Kg]["kg-entities"]["entityTypes"],
        serde_json::json!(["date", "money"])
    );

    let last = progress.drain().pop().unwrap();
    assert_eq!(last.progress, 100);
}

#[tokio::test]
async fn test_intent_shortcut_runs_only_matched_families() {
    let document = DocumentCharacteristics::new("contract");
    let m = ConversationManager::new();
    let state = m.start_conversation(Some(&document));
    let state = m.process_input(
        UserInput::text("extract every renewal clause from this lease agreement"),
        state,
    );
    let config = m.final_configuration(&state).unwrap();

    let pipeline = pipeline();
    pipeline.configure_from_intent(&config, &document).unwrap();
    pipeline.execute().await.unwrap();

    let families: Vec<Family> = pipeline.get_combined_results().into_keys().collect();
    assert_eq!(families, vec![Family::Idp, Family::Kg]);
}

#[tokio::test]
async fn test_reset_then_reconfigure() {
    let document = DocumentCharacteristics::new("paper").with_pages(2);
    let m = ConversationManager::new();
    let state = m.start_conversation(Some(&document));
    let state = m.process_input(
        UserInput::text("let me ask questions about this research paper"),
        state,
    );
    let config = m.final_configuration(&state).unwrap();

    let slow = ExecutorConfig::fast()
        .with_tick_interval(Duration::from_millis(10))
        .with_ticks_per_step(20);
    let pipeline = ProcessingPipeline::with_config(slow);
    pipeline.configure_from_intent(&config, &document).unwrap();

    let runner = pipeline.clone();
    let run = tokio::spawn(async move { runner.execute().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    pipeline.reset();
    assert!(run.await.unwrap().is_err());
    assert_eq!(pipeline.get_pipeline_status().state, PipelineState::Idle);

    pipeline.configure_from_intent(&config, &document).unwrap();
    assert!(pipeline
        .get_steps()
        .iter()
        .all(|s| s.status == StepStatus::Idle && s.progress == 0));
}

#[tokio::test]
async fn test_declined_families_are_not_planned() {
    let document = DocumentCharacteristics::new("manual");
    let m = ConversationManager::new();
    let s = m.start_conversation(Some(&document));
    let s = click(&m, s, "start", "Skip to processing options");
    let s = click(&m, s, "select_processing", "All three");
    let s = click(&m, s, "set_has_images", "No images");
    let s = click(&m, s, "set_has_audio", "No audio");
    let s = click(&m, s, "set_visual_analysis", "Text is enough");
    let s = click(&m, s, "set_idp", "No extraction");
    let s = click(&m, s, "set_kg", "No graph");
    let config = m.final_configuration(&s).unwrap();

    let pipeline = pipeline();
    let steps = pipeline.configure_from_intent(&config, &document).unwrap();
    assert!(steps.iter().all(|s| s.family == Family::Rag));
    pipeline.execute().await.unwrap();
    let families: Vec<Family> = pipeline.get_combined_results().into_keys().collect();
    assert_eq!(families, vec![Family::Rag]);
}
