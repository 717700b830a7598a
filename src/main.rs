//! Driftwave CLI - Soundscape Renderer
//!
//! Command-line front-end for the offline render pipeline: load a session
//! spec, render it to a WAV file, report progress.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use driftwave::events::EngineEvent;
use driftwave::timeline::{LayerKey, SessionSpec, SessionTimeline, StageRecipe, ToggleSet};
use driftwave::{EngineConfig, EventBus, RenderHandle, RenderOutcome, RenderRequest, Renderer};

#[derive(Parser)]
#[command(name = "driftwave-cli", version, about = "Ambient soundscape renderer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a session spec to a WAV file
    Render {
        /// Path to a session spec JSON (see `example-session`)
        #[arg(long)]
        session: PathBuf,
        /// Output WAV path
        #[arg(long, short)]
        out: PathBuf,
        #[arg(long, default_value_t = 44_100)]
        sample_rate: u32,
        /// Chunk length in seconds
        #[arg(long, default_value_t = 15.0)]
        chunk_secs: f64,
    },
    /// Print a session spec template to stdout
    ExampleSession,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            session,
            out,
            sample_rate,
            chunk_secs,
        } => render(session, out, sample_rate, chunk_secs),
        Commands::ExampleSession => {
            println!("{}", serde_json::to_string_pretty(&example_session())?);
            Ok(())
        }
    }
}

fn render(session: PathBuf, out: PathBuf, sample_rate: u32, chunk_secs: f64) -> anyhow::Result<()> {
    let spec: SessionSpec = serde_json::from_str(
        &fs::read_to_string(&session)
            .with_context(|| format!("reading session spec {}", session.display()))?,
    )
    .context("parsing session spec")?;

    let events = EventBus::new();
    let progress = events.subscribe();
    let printer = std::thread::spawn(move || {
        for event in progress {
            match event {
                EngineEvent::RenderProgress { elapsed_sec } => {
                    eprintln!("rendered {:.0}s", elapsed_sec);
                }
                EngineEvent::LayerUnavailable(key) => {
                    eprintln!("layer '{}' unavailable, continuing without it", key);
                }
                EngineEvent::RenderComplete { .. } | EngineEvent::RenderCancelled => break,
                _ => {}
            }
        }
    });

    let request = RenderRequest::from_spec(&spec, sample_rate, chunk_secs);
    let renderer = Renderer::new(EngineConfig::default(), events);
    let outcome = renderer.render(&request, &RenderHandle::new())?;
    printer.join().ok();

    match outcome {
        RenderOutcome::Complete { wav_bytes, job } => {
            fs::write(&out, wav_bytes.as_slice())
                .with_context(|| format!("writing {}", out.display()))?;
            info!(
                "wrote {} ({} chunks, {} bytes)",
                out.display(),
                job.chunks_produced,
                wav_bytes.len()
            );
            Ok(())
        }
        RenderOutcome::Cancelled { .. } => bail!("render cancelled"),
    }
}

/// A five-stage full-spectrum session, everything melodic enabled
fn example_session() -> SessionSpec {
    let stages = vec![
        stage("Grounding", 55.0, 2.5, 900.0, 2.0, 0.08),
        stage("Energetic", 95.0, 6.5, 1200.0, 4.5, 0.095),
        stage("Focus", 140.0, 10.0, 1800.0, 3.0, 0.06),
        stage("Intuitive", 160.0, 7.5, 2500.0, 2.0, 0.045),
        stage("Bliss", 240.0, 40.0, 4800.0, 0.8, 0.02),
    ];
    let mut toggles = ToggleSet::all_disabled();
    for key in [
        LayerKey::Iso,
        LayerKey::Noise,
        LayerKey::Wind,
        LayerKey::Drum,
        LayerKey::Bowl,
    ] {
        toggles.set(key, true);
    }
    SessionSpec {
        timeline: SessionTimeline {
            stages,
            total_duration_sec: 600.0,
        },
        toggles,
        intensity: 0.6,
        master_volume: 0.45,
    }
}

fn stage(name: &str, base: f64, beat: f64, cutoff: f64, iso: f64, noise: f64) -> StageRecipe {
    StageRecipe {
        name: name.to_string(),
        base_frequency: base,
        beat_frequency: beat,
        pad_cutoff_hz: cutoff,
        iso_rate_hz: iso,
        noise_gain: noise,
        deep_sleep_on: false,
    }
}
