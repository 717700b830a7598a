//! Live engine session and lifecycle controller
//!
//! One `EngineSession` owns everything a playing soundscape needs: the
//! rendering context, the assembled graph, the buffer cache, toggle and
//! stage state, and the clock. Time advances only through `process()` calls
//! on the host's audio cadence; fades, crossfaded preset transitions, the
//! autoplay stage walk and the bowl's look-ahead strike loop all progress on
//! that clock, so the control plane stays single-threaded and deterministic.
//! A single `interacting` guard (the pending-operation slot) rejects
//! overlapping lifecycle operations instead of interleaving them.

use std::collections::BTreeSet;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, MIN_GAIN};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::{Capabilities, RenderContext};
use crate::error::{DriftwaveError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::graph::cache::BufferCache;
use crate::graph::scheduler::set_stage_live;
use crate::graph::{assemble, GraphSettings, MixGraph};
use crate::layers::LayerBuild;
use crate::timeline::{LayerKey, Preset, SessionTimeline, ToggleSet};

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Graph built, master faded down
    Suspended,
    /// Audible and advancing through the timeline
    Running,
    /// Graph torn down; `play` rebuilds it
    Closed,
}

/// A multi-step operation in flight; doubles as the interacting guard
#[derive(Debug)]
enum PendingOp {
    Stop { at: f64 },
    PresetOut { at: f64, preset: Preset },
    PresetIn { until: f64 },
}

/// The live mutable engine state
#[derive(Debug)]
pub struct EngineSession {
    id: Uuid,
    config: EngineConfig,
    capabilities: Capabilities,
    events: EventBus,
    sample_rate: u32,
    timeline: SessionTimeline,
    toggles: ToggleSet,
    intensity: f64,
    master_volume: f64,
    ctx: RenderContext,
    cache: BufferCache,
    graph: Option<MixGraph>,
    state: SessionState,
    pending: Option<PendingOp>,
    /// Layers that failed to construct; never attempted again this session
    disabled: BTreeSet<LayerKey>,
    current_stage: usize,
    elapsed_sec: f64,
    frames: u64,
    bowl_next_strike: Option<f64>,
}

impl EngineSession {
    /// Build a session and its initial graph, suspended and silent
    pub fn create(
        config: EngineConfig,
        timeline: SessionTimeline,
        toggles: ToggleSet,
        intensity: f64,
        master_volume: f64,
        sample_rate: u32,
    ) -> Result<Self> {
        Self::create_with_capabilities(
            config,
            timeline,
            toggles,
            intensity,
            master_volume,
            sample_rate,
            Capabilities::default(),
        )
    }

    pub fn create_with_capabilities(
        config: EngineConfig,
        timeline: SessionTimeline,
        toggles: ToggleSet,
        intensity: f64,
        master_volume: f64,
        sample_rate: u32,
        capabilities: Capabilities,
    ) -> Result<Self> {
        timeline.validate()?;
        let events = EventBus::new();
        let ctx = RenderContext::new(sample_rate, capabilities, events.clone())?;

        let mut session = Self {
            id: Uuid::new_v4(),
            config,
            capabilities,
            events,
            sample_rate,
            timeline,
            toggles,
            intensity: intensity.clamp(0.0, 1.0),
            master_volume: master_volume.clamp(0.0, 1.0),
            ctx,
            cache: BufferCache::new(),
            graph: None,
            state: SessionState::Closed,
            pending: None,
            disabled: BTreeSet::new(),
            current_stage: 0,
            elapsed_sec: 0.0,
            frames: 0,
            bowl_next_strike: None,
        };
        session.build_graph()?;
        session.state = SessionState::Suspended;
        info!("session {} created at {} Hz", session.id, sample_rate);
        Ok(session)
    }

    /// Tear down and rebuild the graph for the current timeline/toggles
    ///
    /// Fatal failures leave the session closed with no graph.
    fn build_graph(&mut self) -> Result<()> {
        self.teardown_graph();
        self.ctx = RenderContext::new(self.sample_rate, self.capabilities, self.events.clone())?;

        // Layers already known-bad stay off
        let mut toggles = self.toggles.clone();
        for key in &self.disabled {
            toggles.set(*key, false);
        }

        let settings = GraphSettings {
            timeline: &self.timeline,
            toggles: &toggles,
            intensity: self.intensity,
            master_gain: 0.0,
            offline: false,
            origin_frames: self.frames,
            initial_stage: self.current_stage,
            seed: self.config.seed,
        };
        match assemble(&mut self.ctx, &mut self.cache, &settings, &self.config) {
            Ok(graph) => {
                for key in graph.disabled_layers() {
                    self.disabled.insert(*key);
                    self.toggles.set(*key, false);
                }
                self.graph = Some(graph);
                Ok(())
            }
            Err(e) => {
                // Best-effort cleanup, then surface the failure
                self.teardown_graph();
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    fn teardown_graph(&mut self) {
        self.graph = None;
        self.cache.clear();
    }

    fn now(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    fn guard(&self, operation: &'static str) -> Result<()> {
        if self.pending.is_some() {
            return Err(DriftwaveError::Busy { operation });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle commands
    // ------------------------------------------------------------------

    /// Start (or resume) playback with a fade-in
    pub fn play(&mut self) -> Result<()> {
        self.guard("play")?;
        if self.state == SessionState::Running {
            return Ok(());
        }
        if self.graph.is_none() {
            self.build_graph()?;
        }
        let now = self.now();
        let fade = self.config.resume_fade_sec;
        let volume = self.master_volume;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(volume, now, fade);
        }
        self.state = SessionState::Running;
        self.start_bowl_loop();
        Ok(())
    }

    /// Resume after a pause; identical to `play` apart from intent
    pub fn resume(&mut self) -> Result<()> {
        self.play()
    }

    /// Fade down and hold; the graph stays built
    pub fn pause(&mut self) -> Result<()> {
        self.guard("pause")?;
        if self.state != SessionState::Running {
            return Ok(());
        }
        let now = self.now();
        let fade = self.config.pause_fade_sec;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(MIN_GAIN, now, fade);
        }
        self.stop_bowl_loop(now);
        self.state = SessionState::Suspended;
        Ok(())
    }

    /// Fade out, then tear the graph down
    ///
    /// Teardown happens on the `process()` call that crosses the fade
    /// deadline; keep processing until the `Stopped` event arrives.
    pub fn stop(&mut self) -> Result<()> {
        self.guard("stop")?;
        if self.graph.is_none() {
            return Ok(());
        }
        let now = self.now();
        let fade = self.config.fade_duration_sec;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(MIN_GAIN, now, fade);
        }
        self.stop_bowl_loop(now);
        self.pending = Some(PendingOp::Stop { at: now + fade });
        Ok(())
    }

    /// Crossfade into a different preset: fade to silence, rebuild the
    /// whole graph for the preset's first stage and toggles, fade back in
    pub fn transition_to_preset(&mut self, preset: Preset) -> Result<()> {
        self.guard("transition_to_preset")?;
        if self.state != SessionState::Running {
            debug!("preset transition ignored while not running");
            return Ok(());
        }
        let now = self.now();
        let fade = self.config.preset_fade_sec;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(MIN_GAIN, now, fade);
        }
        self.stop_bowl_loop(now);
        self.pending = Some(PendingOp::PresetOut {
            at: now + fade,
            preset,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameter commands
    // ------------------------------------------------------------------

    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity.clamp(0.0, 1.0);
        let now = self.now();
        let ramp = self.config.control_ramp_sec;
        let value = self.intensity;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_intensity(value, now, ramp);
        }
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        self.master_volume = volume.clamp(0.0, 1.0);
        if self.state != SessionState::Running {
            return;
        }
        let now = self.now();
        let ramp = self.config.control_ramp_sec;
        let value = self.master_volume;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(value, now, ramp);
        }
    }

    /// Toggle a layer on or off with a ramped switch
    ///
    /// A layer disabled by an earlier construction failure stays off. A
    /// layer toggled off before the session started was never built; turning
    /// it on now constructs it in place.
    pub fn toggle_layer(&mut self, key: LayerKey, enabled: bool) -> Result<()> {
        self.toggles.set(key, enabled);
        let now = self.now();
        let ramp = self.config.toggle_ramp_sec;

        let Some(graph) = self.graph.as_mut() else {
            return Ok(());
        };

        if !enabled {
            graph.set_layer_gain(key, false, now, ramp);
            if key == LayerKey::Bowl {
                self.stop_bowl_loop(now);
            }
            return Ok(());
        }

        if self.disabled.contains(&key) {
            warn!("layer '{}' is disabled for this session", key);
            self.toggles.set(key, false);
            return Ok(());
        }

        let stage_index = self.current_stage.min(self.timeline.stages.len() - 1);
        let build = LayerBuild {
            initial: &self.timeline.stages[stage_index],
            timeline: None,
            origin_frames: self.frames,
            stage_ramp_sec: self.config.stage_ramp_sec,
            config: &self.config,
            seed: self.config.seed,
        };
        let present = graph.enable_layer(&mut self.ctx, &mut self.cache, &build, key, now, ramp);
        if !present {
            self.disabled.insert(key);
            self.toggles.set(key, false);
            return Ok(());
        }
        if key == LayerKey::Bowl && self.state == SessionState::Running {
            self.start_bowl_loop();
        }
        Ok(())
    }

    /// Jump to a stage, ramping every automated parameter
    pub fn set_stage(&mut self, index: usize) -> Result<()> {
        self.guard("set_stage")?;
        if index >= self.timeline.stages.len() {
            return Err(DriftwaveError::InvalidParameter {
                param: "stage_index",
                value: index.to_string(),
                expected: "an index into the stage sequence",
            });
        }
        let now = self.now();
        let Some(graph) = self.graph.as_mut() else {
            return Err(DriftwaveError::SessionClosed);
        };
        let recipe = self.timeline.stages[index].clone();
        set_stage_live(graph, &recipe, 0.0, self.config.stage_ramp_sec, now);
        self.current_stage = index;
        // Pin the elapsed clock into the new stage so autoplay agrees
        self.elapsed_sec = self.timeline.stage_start(index);
        self.events.emit(EngineEvent::StageChanged(index));
        Ok(())
    }

    pub fn next_stage(&mut self) -> Result<()> {
        let next = (self.current_stage + 1).min(self.timeline.stages.len() - 1);
        self.set_stage(next)
    }

    pub fn previous_stage(&mut self) -> Result<()> {
        self.set_stage(self.current_stage.saturating_sub(1))
    }

    // ------------------------------------------------------------------
    // The clock
    // ------------------------------------------------------------------

    /// Render the next block of live audio and advance all cooperative
    /// tasks (fades, pending transitions, stage autoplay, bowl strikes)
    pub fn process(&mut self, out: &mut AudioBuffer) -> Result<()> {
        let now = self.now();
        self.advance_pending(now)?;
        self.schedule_bowl_strikes(now, out.len() as f64 / self.sample_rate as f64);

        match self.graph.as_mut() {
            Some(graph) => graph.render_block(out, now),
            None => out.clear(),
        }

        let block_sec = out.len() as f64 / self.sample_rate as f64;
        self.frames += out.len() as u64;
        if self.state == SessionState::Running && self.pending.is_none() {
            self.elapsed_sec += block_sec;
            self.advance_timeline()?;
        }
        Ok(())
    }

    /// Execute a multi-step operation whose deadline has passed
    fn advance_pending(&mut self, now: f64) -> Result<()> {
        match self.pending.take() {
            None => {}
            Some(PendingOp::Stop { at }) if at <= now => {
                self.teardown_graph();
                self.state = SessionState::Closed;
                self.current_stage = 0;
                self.elapsed_sec = 0.0;
                self.events.emit(EngineEvent::Stopped);
                info!("session {} stopped", self.id);
            }
            Some(PendingOp::PresetOut { at, preset }) if at <= now => {
                self.timeline = SessionTimeline::new(
                    preset.stages,
                    self.timeline.total_duration_sec,
                )?;
                self.toggles = preset.toggles;
                self.intensity = preset.intensity.clamp(0.0, 1.0);
                self.current_stage = 0;
                self.elapsed_sec = 0.0;
                self.build_graph()?;

                let fade = self.config.preset_fade_sec;
                let volume = self.master_volume;
                if let Some(graph) = self.graph.as_mut() {
                    graph.set_master(volume, now, fade);
                }
                self.state = SessionState::Running;
                self.start_bowl_loop();
                self.events.emit(EngineEvent::StageChanged(0));
                self.pending = Some(PendingOp::PresetIn { until: now + fade });
            }
            Some(PendingOp::PresetIn { until }) if until <= now => {}
            Some(op) => self.pending = Some(op),
        }
        Ok(())
    }

    /// Autoplay: walk stages as the session clock crosses their intervals
    fn advance_timeline(&mut self) -> Result<()> {
        if self.elapsed_sec >= self.timeline.total_duration_sec {
            return self.stop();
        }
        let expected = self.timeline.stage_index_at(self.elapsed_sec);
        if expected != self.current_stage {
            let now = self.now();
            if let Some(graph) = self.graph.as_mut() {
                let recipe = self.timeline.stages[expected].clone();
                set_stage_live(graph, &recipe, 0.0, self.config.stage_ramp_sec, now);
            }
            self.current_stage = expected;
            self.events.emit(EngineEvent::StageChanged(expected));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bowl strike loop (look-ahead self-scheduler)
    // ------------------------------------------------------------------

    fn start_bowl_loop(&mut self) {
        if !self.toggles.enabled(LayerKey::Bowl) {
            return;
        }
        let now = self.now();
        if let Some(graph) = self.graph.as_mut() {
            if let Some(bowl) = graph.bowl_mut() {
                bowl.start_loop();
                if self.bowl_next_strike.is_none() {
                    self.bowl_next_strike = Some(now);
                }
            }
        }
    }

    fn stop_bowl_loop(&mut self, now: f64) {
        self.bowl_next_strike = None;
        if let Some(graph) = self.graph.as_mut() {
            if let Some(bowl) = graph.bowl_mut() {
                if bowl.loop_active() {
                    bowl.stop_loop(now);
                }
            }
        }
    }

    /// Schedule any strikes falling inside this block plus the lookahead
    /// window; re-arms itself for the next strike each time
    fn schedule_bowl_strikes(&mut self, now: f64, block_sec: f64) {
        if self.state != SessionState::Running {
            return;
        }
        let lookahead = self.config.bowl_lookahead_sec;
        let interval = self.config.bowl_interval_sec;
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let Some(bowl) = graph.bowl_mut() else {
            return;
        };
        if !bowl.loop_active() {
            return;
        }
        while let Some(next) = self.bowl_next_strike {
            if next - lookahead <= now + block_sec {
                bowl.trigger(next);
                self.bowl_next_strike = Some(next + interval);
            } else {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.elapsed_sec
    }

    pub fn layer_active(&self, key: LayerKey) -> bool {
        self.graph
            .as_ref()
            .map(|graph| graph.has_layer(key))
            .unwrap_or(false)
    }

    pub fn disabled_layers(&self) -> &BTreeSet<LayerKey> {
        &self.disabled
    }

    pub fn graph(&self) -> Option<&MixGraph> {
        self.graph.as_ref()
    }
}
