use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use keystroke_guard::biometrics::similarity::similarity;
use keystroke_guard::biometrics::vectorizer::vectorize;
use keystroke_guard::config::{self, Config};
use keystroke_guard::models::RawInputEvent;
use keystroke_guard::relay::{Hub, HttpFetcher};
use keystroke_guard::utils;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    component: Component,
}

#[derive(Subcommand)]
enum Component {
    /// Run the relay hub that brokers service calls for other contexts
    Hub,

    /// Vectorize a captured event log and optionally score it against a
    /// reference capture
    Analyze {
        /// JSON file holding an array of raw key events
        events: PathBuf,

        /// Reference capture to compare the events against
        #[arg(long)]
        reference: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    utils::logging::init_logger();

    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config()?;

    // Run the selected component
    match cli.component {
        Component::Hub => {
            info!("Starting relay hub...");
            run_hub(config).await?;
        }
        Component::Analyze { events, reference } => {
            run_analysis(&config, &events, reference.as_deref())?;
        }
    }

    Ok(())
}

async fn run_hub(config: Config) -> Result<()> {
    let (hub, handle) = Hub::new(Arc::new(HttpFetcher::new()));
    info!("Hub relaying to {}", config.service_base_url);

    let server = tokio::spawn(hub.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down hub");

    drop(handle);
    server.await.context("Hub task failed")?;
    Ok(())
}

fn run_analysis(config: &Config, events_path: &Path, reference: Option<&Path>) -> Result<()> {
    let events = load_events(events_path)?;
    let vector = vectorize(&events);

    println!(
        "{}: {} events, {} matched pairs",
        events_path.display(),
        events.len(),
        vector.len()
    );
    println!("{}", serde_json::to_string_pretty(&vector)?);

    if let Some(reference_path) = reference {
        let reference_events = load_events(reference_path)?;
        let reference_vector = vectorize(&reference_events);
        let score = similarity(&vector, &reference_vector, &config.tolerances);
        println!(
            "similarity against {}: {:.3}",
            reference_path.display(),
            score
        );
    }

    Ok(())
}

fn load_events(path: &Path) -> Result<Vec<RawInputEvent>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse event log {}", path.display()))
}
