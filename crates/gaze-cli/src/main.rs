use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gaze_core::GalleryStore;
use gaze_pipeline::{drive_overlay, Pipeline, PipelineConfig, PipelineEvent};
use std::path::PathBuf;
use std::sync::Arc;

mod overlay;
mod synthetic;

use overlay::TerminalOverlay;
use synthetic::{CenteredDetector, GridEmbedder, SyntheticSource};

#[derive(Parser)]
#[command(name = "gaze", about = "Gaze face recognition pipeline CLI")]
struct Cli {
    /// Path to a TOML pipeline config (env `GAZE_*` overrides apply otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against synthetic subjects or a directory of stills
    Run {
        /// Number of generated subjects to enroll and cycle through
        #[arg(short, long, default_value_t = 3)]
        subjects: usize,

        /// Use the images in this directory (labeled by file stem) instead
        /// of generated subjects
        #[arg(long)]
        images: Option<PathBuf>,

        /// Descriptor noise amplitude; raises distances to exercise the
        /// rejection threshold
        #[arg(long, default_value_t = 0.0)]
        jitter: f32,

        /// Stop after this many completed cycles (default: run until ctrl-c)
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Print the effective pipeline configuration as JSON
    Config,
}

fn load_config(path: &Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(PipelineConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            subjects,
            images,
            jitter,
            cycles,
        } => run(config, subjects, images, jitter, cycles).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(
    config: PipelineConfig,
    subjects: usize,
    images: Option<PathBuf>,
    jitter: f32,
    cycles: Option<u64>,
) -> Result<()> {
    let source = match &images {
        Some(dir) => SyntheticSource::from_dir(dir)
            .with_context(|| format!("loading stills from {}", dir.display()))?,
        None => SyntheticSource::generate(subjects),
    };

    let detector = CenteredDetector;
    let embedder = GridEmbedder::new(jitter);
    let store = Arc::new(GalleryStore::new());

    // Build the gallery up front: one reference image per subject.
    for (index, label) in source.labels().into_iter().enumerate() {
        let frame = source.reference_frame(index);
        store
            .enroll(&label, &[frame], &detector, &embedder)
            .await
            .with_context(|| format!("enrolling {label}"))?;
    }
    tracing::info!(
        identities = store.len(),
        jitter,
        "gallery built, starting pipeline"
    );

    let handle = Pipeline::new(source, detector, embedder, store, config).spawn()?;

    let overlay_task = tokio::spawn(drive_overlay(handle.subscribe(), TerminalOverlay::new()));

    match cycles {
        Some(limit) => {
            let mut rx = handle.subscribe();
            let mut completed = 0;
            while completed < limit {
                match rx.recv().await {
                    Ok(PipelineEvent::CycleCompleted { .. }) => completed += 1,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
        }
    }

    let stats = handle.stats();
    handle.shutdown().await;
    let _ = overlay_task.await;

    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
