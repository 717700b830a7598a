//! Engine event bus
//!
//! The core never calls into UI code. Everything a collaborator might care
//! about (stage changes, degraded layers, render progress) is published as
//! an [`EngineEvent`] on a broadcast bus; subscribers hold their own
//! receiver and drain it at their convenience.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::timeline::LayerKey;

/// Events published by the engine core
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The live session moved to a new stage index
    StageChanged(usize),
    /// Playback fully stopped and the graph was torn down
    Stopped,
    /// An optional layer failed to construct and is disabled for the session
    LayerUnavailable(LayerKey),
    /// The phase-controlled modulator processor could not be selected;
    /// all LFOs fall back to plain generators (emitted once per context)
    ProcessorLoadFailed,
    /// An offline render finished another chunk
    RenderProgress {
        /// Seconds of session audio rendered so far
        elapsed_sec: f64,
    },
    /// An offline render completed; payload is the encoded WAV container
    RenderComplete { wav_bytes: Arc<Vec<u8>> },
    /// An offline render was cancelled between chunks
    RenderCancelled,
}

/// Broadcast channel fanning engine events out to any number of subscribers
///
/// Cloning the bus shares the subscriber list; a clone held by the offline
/// renderer publishes to the same receivers as the live session.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<EngineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    /// Publish an event to every live subscriber
    ///
    /// Subscribers whose receiver has been dropped are pruned here.
    pub fn emit(&self, event: EngineEvent) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
