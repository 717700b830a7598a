//! Driftwave - Procedural Ambient Soundscape Engine
//!
//! Driftwave generates layered, continuously-evolving ambient soundscapes
//! (binaural tones, modulated pads, noise beds, percussive loops, resonance
//! layers) and either plays them live with smooth parameter automation or
//! bulk-renders a session to an uncompressed audio file.
//!
//! # Architecture
//!
//! Data flows bottom-up and control flows top-down:
//! - `dsp`: signal primitives (oscillators, LFOs, noise, filters, panning,
//!   reverb, limiters, automation parameters)
//! - `layers`: one factory per soundscape layer, each a self-contained
//!   subgraph with named automation setters
//! - `graph`: the assembler wiring enabled layers into one mix graph, the
//!   stage scheduler, and the pre-render buffer cache
//! - `engine`: buffers, rendering contexts, and the live session lifecycle
//! - `render`: the chunked, cancellable, phase-continuous offline pipeline
//!
//! Live playback and offline rendering share the same graph and scheduler;
//! an offline chunk reconstructs the phases and values a continuous render
//! would have reached at its start offset, so both paths produce the same
//! audio.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod layers;
pub mod render;
pub mod timeline;

pub use config::EngineConfig;
pub use engine::{EngineSession, SessionState};
pub use error::{DriftwaveError, Result};
pub use events::{EngineEvent, EventBus};
pub use render::{RenderHandle, RenderOutcome, RenderRequest, Renderer};
