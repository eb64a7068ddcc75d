//! wake-assistant: console front end for the trigger-word command loop
//!
//! Type the trigger phrase to arm a capture, then the command. Ctrl-D or
//! SIGINT/SIGTERM shuts the assistant down.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wake_assistant::commands::default_registry;
use wake_assistant::console::{
    ConsoleAudioSource, ConsoleInput, ConsoleRecognizer, ConsoleSynthesizer, PhraseScorer,
};
use wake_assistant::events::AssistantEvent;
use wake_assistant::lifecycle::ShutdownSignal;
use wake_assistant::{Components, Config, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: it carries the fallback log level
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        phrase = %config.trigger.phrase,
        language = %config.speech.language,
        voice = %config.speech.voice,
        "wake-assistant starting"
    );

    let registry = default_registry(&config).context("failed to build command registry")?;

    let input = ConsoleInput::start().context("failed to start console input")?;
    let components = Components {
        source: Box::new(ConsoleAudioSource::new(
            config.audio.frame_samples,
            config.frame_duration(),
        )),
        scorer: Box::new(PhraseScorer::new(input.clone(), &config.trigger.phrase)),
        recognizer: Arc::new(ConsoleRecognizer::new(
            input.clone(),
            config.speech.language.as_str(),
        )),
        synthesizer: Arc::new(ConsoleSynthesizer::new(&config.speech.voice)),
    };

    let (orchestrator, handle) = Orchestrator::new(config, components, registry);

    // Signals and end of input both request shutdown
    let shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;
    let signal_task = shutdown.forward_to(handle.clone());

    let eof_handle = handle.clone();
    let eof_task = tokio::spawn(async move {
        input.wait_closed().await;
        info!("console input closed");
        eof_handle.shutdown();
    });

    let mut events = handle.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AssistantEvent::FramesDropped { count }) => {
                    warn!(count, "audio frames dropped");
                }
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = %json, "assistant event"),
                    Err(e) => warn!(error = %e, %event, "failed to encode event"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("assistant initialized, entering main loop");
    orchestrator.run().await;

    // Cleanup
    signal_task.abort();
    eof_task.abort();
    event_task.abort();

    let recent = handle.machine().history(5);
    for record in recent.iter().rev() {
        debug!(from = %record.from, to = %record.to, reason = %record.reason, "recent transition");
    }
    info!("wake-assistant stopped");

    Ok(())
}
