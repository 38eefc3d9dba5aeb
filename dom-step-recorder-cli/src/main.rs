mod script;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use dom_step_recorder::{ChannelSink, RecorderConfig, RecorderContext};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use script::{SessionRunner, SessionScript};

#[derive(Parser, Debug)]
#[command(name = "dom-step-recorder")]
#[command(about = "Replays a scripted browsing session through the step recorder")]
struct Args {
    /// Session script (JSON): fixture document plus user actions
    script: PathBuf,

    /// Recorder configuration (JSON); missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the recorded workflow
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("🚀 Starting dom-step-recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => RecorderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    let script = SessionScript::from_file(&args.script)?;
    info!("🔧 Script: {} ({} actions)", script.name, script.actions.len());

    let sink = ChannelSink::new(1024);
    let mut messages = sink.event_stream();
    let printer = tokio::spawn(async move {
        while let Some(message) = messages.next().await {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to serialize host message: {}", e),
            }
        }
    });

    let recorder = RecorderContext::new(script.name.clone(), config, sink);
    let start_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut runner = SessionRunner::new(&script, recorder, start_at)?;
    runner.run(&script.actions).await?;

    let workflow = runner.workflow();
    info!(
        "✅ Recorded {} steps in session {}",
        workflow.steps.len(),
        workflow.session_id
    );

    // Dropping the recorder closes the channel and ends the printer.
    drop(runner);
    printer.await.context("Message printer task failed")?;

    if let Some(path) = &args.output {
        workflow
            .save_to_file(path)
            .with_context(|| format!("Failed to write workflow to {}", path.display()))?;
        info!("📁 Workflow saved to {}", path.display());
    }

    Ok(())
}
