use docflow::{
    ConversationManager, DocumentCharacteristics, ExecutorConfig, ProcessingPipeline, StepStatus,
    UserInput,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let document = DocumentCharacteristics::new("contract")
        .with_name("supplier-agreement.pdf")
        .with_pages(8);
    let manager = ConversationManager::new();

    // Click through the first two questions, then describe the goal in words
    let mut state = manager.start_conversation(Some(&document));
    for (verb, label) in [("start", "Let's get started"), ("set_role", "Analyst")] {
        let action = state
            .find_action(verb, Some(label))
            .ok_or("expected action missing")?
            .clone();
        state = manager.process_input(UserInput::from(&action), state);
    }
    state = manager.process_input(
        UserInput::text("Extract the renewal terms and obligations from this agreement"),
        state,
    );

    for message in &state.transcript {
        println!("[{:?}] {}", message.speaker, message.text);
    }

    let config = manager
        .final_configuration(&state)
        .ok_or("conversation did not reach confirmation")?;
    println!("\nConfiguration:\n{}", serde_json::to_string_pretty(&config)?);

    let pipeline = ProcessingPipeline::with_config(ExecutorConfig::default());
    let _steps = pipeline.on_step_update(|step| {
        if step.status == StepStatus::Completed {
            println!("  done: {}", step.name);
        }
    });
    let progress = pipeline.on_progress(|status| {
        println!("  pipeline {:?} {}%", status.state, status.progress);
    });

    pipeline.configure_from_intent(&config, &document)?;
    let status = pipeline.execute().await?;
    progress.unsubscribe();

    println!("\nFinished: {:?} ({} steps)", status.state, status.completed_steps);
    println!(
        "{}",
        serde_json::to_string_pretty(&pipeline.get_combined_results())?
    );
    Ok(())
}
