//! Offline render pipeline
//!
//! Bulk-renders a session to 16-bit PCM in fixed-duration chunks. Every
//! chunk gets a fresh rendering context and a full graph built at
//! `global_time_offset = chunk start`, so oscillator phases, LFO cycles,
//! loop positions and mid-ramp automation all land exactly where a
//! continuous render would put them. Chunks re-use one buffer cache (the
//! pre-rendered loops are deterministic per seed and sample rate) and a
//! short warm-up pre-roll primes filter and limiter state before each
//! chunk's first sample. Cancellation is cooperative and only checked
//! between chunks.

pub mod wav;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::{Capabilities, RenderContext};
use crate::error::{DriftwaveError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::graph::cache::BufferCache;
use crate::graph::scheduler::apply_offline_schedule;
use crate::graph::{assemble, GraphSettings, MixGraph};
use crate::timeline::{LayerKey, SessionSpec, SessionTimeline, ToggleSet};

/// Stateful-effect pre-roll rendered and discarded ahead of each chunk
/// (filters, limiter envelopes, reverb onset). Chunk zero starts cold, like
/// a continuous render does.
const WARMUP_SEC: f64 = 1.5;

/// Everything needed to render one session offline
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub timeline: SessionTimeline,
    pub toggles: ToggleSet,
    pub intensity: f64,
    pub master_volume: f64,
    pub sample_rate: u32,
    pub chunk_duration_sec: f64,
}

impl RenderRequest {
    pub fn from_spec(spec: &SessionSpec, sample_rate: u32, chunk_duration_sec: f64) -> Self {
        Self {
            timeline: spec.timeline.clone(),
            toggles: spec.toggles.clone(),
            intensity: spec.intensity,
            master_volume: spec.master_volume,
            sample_rate,
            chunk_duration_sec,
        }
    }
}

/// Cooperative cancellation flag for an in-flight render
#[derive(Debug, Clone, Default)]
pub struct RenderHandle {
    cancel: Arc<AtomicBool>,
}

impl RenderHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Bookkeeping for one render job
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: Uuid,
    pub total_duration_sec: f64,
    pub chunk_duration_sec: f64,
    pub sample_rate: u32,
    pub chunks_produced: usize,
}

/// What came out of a render
#[derive(Debug)]
pub enum RenderOutcome {
    /// Encoded WAV container bytes
    Complete {
        wav_bytes: Arc<Vec<u8>>,
        job: RenderJob,
    },
    /// Cancelled between chunks; no result
    Cancelled { job: RenderJob },
}

/// Drives chunked offline rendering; at most one job at a time
#[derive(Debug)]
pub struct Renderer {
    config: EngineConfig,
    events: EventBus,
    capabilities: Capabilities,
    active: AtomicBool,
}

impl Renderer {
    pub fn new(config: EngineConfig, events: EventBus) -> Self {
        Self {
            config,
            events,
            capabilities: Capabilities::default(),
            active: AtomicBool::new(false),
        }
    }

    /// Override context capabilities (used to exercise degraded paths)
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Render a session and encode it as a WAV container
    pub fn render(&self, request: &RenderRequest, handle: &RenderHandle) -> Result<RenderOutcome> {
        let channels = 2u16;
        let mut pcm: Vec<i16> = Vec::new();
        let outcome = self.run_job(request, handle, |chunk| {
            pcm.extend(wav::pcm16_from_buffer(&chunk));
        })?;

        match outcome {
            JobEnd::Cancelled(job) => {
                self.events.emit(EngineEvent::RenderCancelled);
                info!("render {} cancelled after {} chunks", job.id, job.chunks_produced);
                Ok(RenderOutcome::Cancelled { job })
            }
            JobEnd::Complete(job) => {
                let bytes = Arc::new(wav::wav_bytes(&pcm, channels, request.sample_rate)?);
                self.events.emit(EngineEvent::RenderComplete {
                    wav_bytes: Arc::clone(&bytes),
                });
                info!(
                    "render {} complete: {} chunks, {} bytes",
                    job.id,
                    job.chunks_produced,
                    bytes.len()
                );
                Ok(RenderOutcome::Complete {
                    wav_bytes: bytes,
                    job,
                })
            }
        }
    }

    /// Render a session to a float buffer instead of encoding it
    ///
    /// Returns `None` when cancelled. Useful for analysis and for hosts
    /// that feed an external encoder.
    pub fn render_to_buffer(
        &self,
        request: &RenderRequest,
        handle: &RenderHandle,
    ) -> Result<Option<AudioBuffer>> {
        let mut left: Vec<f32> = Vec::new();
        let mut right: Vec<f32> = Vec::new();
        let outcome = self.run_job(request, handle, |chunk| {
            left.extend_from_slice(chunk.channel(0));
            right.extend_from_slice(chunk.channel(1));
        })?;
        match outcome {
            JobEnd::Cancelled(_) => {
                self.events.emit(EngineEvent::RenderCancelled);
                Ok(None)
            }
            JobEnd::Complete(_) => Ok(Some(AudioBuffer::from_channels(
                vec![left, right],
                request.sample_rate,
            )?)),
        }
    }

    fn run_job<F: FnMut(AudioBuffer)>(
        &self,
        request: &RenderRequest,
        handle: &RenderHandle,
        mut sink: F,
    ) -> Result<JobEnd> {
        request.timeline.validate()?;
        if request.chunk_duration_sec <= 0.0 {
            return Err(DriftwaveError::InvalidParameter {
                param: "chunk_duration_sec",
                value: request.chunk_duration_sec.to_string(),
                expected: "a positive chunk length",
            });
        }

        // The pipeline is exclusive: a second job is rejected, not queued
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DriftwaveError::RenderActive);
        }
        let _guard = ActiveGuard(&self.active);

        let sr = request.sample_rate as f64;
        let total = request.timeline.total_duration_sec;
        let chunk = request.chunk_duration_sec;
        let total_frames = (total * sr).round() as u64;
        let num_chunks = (total / chunk).ceil() as usize;

        let mut job = RenderJob {
            id: Uuid::new_v4(),
            total_duration_sec: total,
            chunk_duration_sec: chunk,
            sample_rate: request.sample_rate,
            chunks_produced: 0,
        };
        info!(
            "render {}: {}s in {} chunks of {}s at {} Hz",
            job.id, total, num_chunks, chunk, request.sample_rate
        );

        // One cache for the whole job: pre-rendered loops depend only on the
        // seed and sample rate, both fixed here
        let mut cache = BufferCache::new();
        let mut toggles = request.toggles.clone();

        for i in 0..num_chunks {
            if handle.is_cancelled() {
                return Ok(JobEnd::Cancelled(job));
            }

            let start_frame = ((i as f64 * chunk) * sr).round() as u64;
            let end_frame = ((((i + 1) as f64 * chunk).min(total)) * sr).round() as u64;
            let end_frame = end_frame.min(total_frames).max(start_frame);
            let frames = (end_frame - start_frame) as usize;
            if frames == 0 {
                continue;
            }
            let offset_sec = start_frame as f64 / sr;
            let chunk_sec = frames as f64 / sr;

            let chunk_buf = self.render_chunk(
                request,
                &mut cache,
                &mut toggles,
                start_frame,
                offset_sec,
                frames,
                chunk_sec,
            )?;
            sink(chunk_buf);

            job.chunks_produced += 1;
            self.events.emit(EngineEvent::RenderProgress {
                elapsed_sec: end_frame as f64 / sr,
            });
            debug!(
                "render {}: chunk {}/{} ({}s)",
                job.id,
                i + 1,
                num_chunks,
                end_frame as f64 / sr
            );
        }

        Ok(JobEnd::Complete(job))
    }

    #[allow(clippy::too_many_arguments)]
    fn render_chunk(
        &self,
        request: &RenderRequest,
        cache: &mut BufferCache,
        toggles: &mut ToggleSet,
        start_frame: u64,
        offset_sec: f64,
        frames: usize,
        chunk_sec: f64,
    ) -> Result<AudioBuffer> {
        let sr = request.sample_rate as f64;
        let warm_frames = ((WARMUP_SEC * sr) as u64).min(start_frame);

        let mut ctx = RenderContext::new(request.sample_rate, self.capabilities, self.events.clone())?;
        let settings = GraphSettings {
            timeline: &request.timeline,
            toggles,
            intensity: request.intensity,
            master_gain: request.master_volume,
            offline: true,
            origin_frames: start_frame - warm_frames,
            initial_stage: 0,
            seed: self.config.seed,
        };
        let mut graph = assemble(&mut ctx, cache, &settings, &self.config)?;

        // A layer that failed here stays off for the rest of the job
        let newly_disabled: Vec<LayerKey> = graph.disabled_layers().iter().copied().collect();
        for key in newly_disabled {
            toggles.set(key, false);
        }

        let warmup_sec = warm_frames as f64 / sr;
        apply_offline_schedule(
            &mut graph,
            &request.timeline,
            offset_sec,
            chunk_sec,
            warmup_sec,
            &self.config,
        );
        if graph.has_layer(LayerKey::Bowl) {
            schedule_bowl_strikes(&mut graph, &request.timeline, offset_sec, chunk_sec, &self.config);
        }

        // Pre-roll: bring filters, limiter envelopes and the reverb onset up
        // to where a continuous render would have them, then discard
        if warm_frames > 0 {
            let mut warm = AudioBuffer::new(warm_frames as usize, ChannelLayout::Stereo, request.sample_rate);
            graph.render_block(&mut warm, -(warm_frames as f64) / sr);
        }

        let mut chunk_buf = AudioBuffer::new(frames, ChannelLayout::Stereo, request.sample_rate);
        graph.render_block(&mut chunk_buf, 0.0);
        Ok(chunk_buf)
    }
}

/// Lay the session's bowl strikes into one chunk's local time base
///
/// Strikes land every `bowl_interval_sec` from session start. The most
/// recent strikes before the chunk are scheduled at negative local times so
/// a mid-decay envelope resumes at its correct value.
fn schedule_bowl_strikes(
    graph: &mut MixGraph,
    timeline: &SessionTimeline,
    offset_sec: f64,
    chunk_sec: f64,
    config: &EngineConfig,
) {
    let interval = config.bowl_interval_sec;
    let lookback = offset_sec - 2.0 * interval;
    if let Some(bowl) = graph.bowl_mut() {
        let mut t = 0.0;
        while t < timeline.total_duration_sec && t < offset_sec + chunk_sec {
            if t >= lookback {
                bowl.trigger(t - offset_sec);
            }
            t += interval;
        }
    }
}

enum JobEnd {
    Complete(RenderJob),
    Cancelled(RenderJob),
}

struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
