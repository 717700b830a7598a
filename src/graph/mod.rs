//! Graph assembly and the mix graph
//!
//! The assembler wires enabled layers into one signal graph: an effects bus
//! whose gain is the shared intensity, a reverb send shared by the melodic
//! layers, and a ramped on/off gain switch around every optional layer. The
//! carrier and pad are unconditional — their failure aborts assembly — while
//! any optional layer that fails to construct is logged, reported as an
//! event, and skipped without taking the graph down.

pub mod cache;
pub mod scheduler;

use std::collections::BTreeSet;

use log::warn;

use crate::config::EngineConfig;
use crate::dsp::{AutomatedParam, BlockClock, RampCurve, Reverb, ReverbParams};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::{DriftwaveError, Result};
use crate::events::EngineEvent;
use crate::layers::{
    BowlLayer, BrainPulseLayer, CarrierLayer, DeepSleepLayer, DrumLayer, IsoLayer, LayerBuild,
    LayerKind, NoiseBedLayer, PadLayer, ResonantPulseLayer, WindLayer,
};
use crate::timeline::{LayerKey, SessionTimeline, StageRecipe, ToggleSet};

use cache::BufferCache;
use scheduler::{initial_value, StageField};

/// Everything the assembler needs to build one graph
#[derive(Debug, Clone, Copy)]
pub struct GraphSettings<'a> {
    pub timeline: &'a SessionTimeline,
    pub toggles: &'a ToggleSet,
    /// Shared effects-bus gain in [0, 1]
    pub intensity: f64,
    /// Initial master gain (0 for live graphs that fade in)
    pub master_gain: f64,
    /// Offline graphs reconstruct stage-tracked values and phases at the
    /// origin; live graphs start from the initial stage's targets
    pub offline: bool,
    /// Continuous-render frames before this graph's local time zero
    pub origin_frames: u64,
    /// Stage whose targets seed live parameter values
    pub initial_stage: usize,
    pub seed: u64,
}

/// One optional layer wired into the graph
#[derive(Debug)]
pub struct LayerSlot {
    pub key: LayerKey,
    pub layer: LayerKind,
    /// Ramped on/off switch; never stepped
    gain_switch: AutomatedParam,
    send_reverb: bool,
}

/// The assembled signal graph for one rendering context
#[derive(Debug)]
pub struct MixGraph {
    sample_rate: f64,
    carrier: CarrierLayer,
    pad: PadLayer,
    slots: Vec<LayerSlot>,
    effects_gain: AutomatedParam,
    master_gain: AutomatedParam,
    reverb: Reverb,
    reverb_return: f32,
    /// Layers that failed to construct; permanently off for this session
    disabled: BTreeSet<LayerKey>,
    scratch: AudioBuffer,
    effects_bus: AudioBuffer,
    reverb_bus: AudioBuffer,
}

/// Build a complete mix graph
pub fn assemble(
    ctx: &mut RenderContext,
    cache: &mut BufferCache,
    settings: &GraphSettings,
    config: &EngineConfig,
) -> Result<MixGraph> {
    let rate = ctx.sample_rate();
    let build = LayerBuild {
        initial: &settings.timeline.stages[settings.initial_stage.min(settings.timeline.stages.len() - 1)],
        timeline: settings.offline.then_some(settings.timeline),
        origin_frames: settings.origin_frames,
        stage_ramp_sec: config.stage_ramp_sec,
        config,
        seed: settings.seed,
    };

    let mut reverb_rng = build.rng("reverb");
    let reverb = Reverb::new(&ReverbParams::default(), rate, &mut reverb_rng)?;

    // The two unconditional layers: their failure is fatal
    let carrier =
        CarrierLayer::build(ctx, &build).map_err(|e| DriftwaveError::CoreLayerFailed {
            layer: "carrier",
            reason: e.to_string(),
        })?;
    let pad = PadLayer::build(ctx, cache, &build).map_err(|e| DriftwaveError::CoreLayerFailed {
        layer: "pad",
        reason: e.to_string(),
    })?;

    let mut graph = MixGraph {
        sample_rate: rate as f64,
        carrier,
        pad,
        slots: Vec::new(),
        effects_gain: AutomatedParam::new(settings.intensity),
        master_gain: AutomatedParam::new(settings.master_gain),
        reverb,
        reverb_return: config.reverb_return as f32,
        disabled: BTreeSet::new(),
        scratch: AudioBuffer::new(0, ChannelLayout::Stereo, rate),
        effects_bus: AudioBuffer::new(0, ChannelLayout::Stereo, rate),
        reverb_bus: AudioBuffer::new(0, ChannelLayout::Stereo, rate),
    };

    for key in LayerKey::ALL {
        if !settings.toggles.enabled(key) {
            continue;
        }
        graph.construct_slot(ctx, cache, &build, key, 1.0);
    }

    Ok(graph)
}

/// Layers whose spatial character the shared reverb would muddy
fn sends_to_reverb(key: LayerKey) -> bool {
    !matches!(key, LayerKey::DeepSleep | LayerKey::BrainPulse)
}

fn build_optional(
    ctx: &mut RenderContext,
    cache: &mut BufferCache,
    build: &LayerBuild,
    key: LayerKey,
) -> Result<LayerKind> {
    let wrap = |e: DriftwaveError| DriftwaveError::LayerConstruction {
        layer: key,
        reason: e.to_string(),
    };
    Ok(match key {
        LayerKey::Iso => LayerKind::Iso(IsoLayer::build(ctx, build).map_err(wrap)?),
        LayerKey::Noise => LayerKind::Noise(NoiseBedLayer::build(ctx, build).map_err(wrap)?),
        LayerKey::Wind => LayerKind::Wind(WindLayer::build(ctx, build).map_err(wrap)?),
        LayerKey::Drum => LayerKind::Drum(DrumLayer::build(ctx, cache, build).map_err(wrap)?),
        LayerKey::Bowl => LayerKind::Bowl(BowlLayer::build(ctx, build).map_err(wrap)?),
        LayerKey::DeepSleep => {
            LayerKind::DeepSleep(DeepSleepLayer::build(ctx, build).map_err(wrap)?)
        }
        LayerKey::BrainPulse => {
            LayerKind::BrainPulse(BrainPulseLayer::build(ctx, cache, build).map_err(wrap)?)
        }
        LayerKey::ResonantPulse => {
            LayerKind::ResonantPulse(ResonantPulseLayer::build(ctx, build).map_err(wrap)?)
        }
    })
}

impl MixGraph {
    /// Construct one optional layer and wire it in behind a gain switch
    ///
    /// Failure is isolated: the layer is disabled for the session, a
    /// `LayerUnavailable` event fires, and assembly continues.
    fn construct_slot(
        &mut self,
        ctx: &mut RenderContext,
        cache: &mut BufferCache,
        build: &LayerBuild,
        key: LayerKey,
        switch_gain: f64,
    ) -> bool {
        match build_optional(ctx, cache, build, key) {
            Ok(layer) => {
                self.slots.push(LayerSlot {
                    key,
                    layer,
                    gain_switch: AutomatedParam::new(switch_gain),
                    send_reverb: sends_to_reverb(key),
                });
                true
            }
            Err(e) => {
                warn!("layer '{}' unavailable: {}", key, e);
                ctx.events().emit(EngineEvent::LayerUnavailable(key));
                self.disabled.insert(key);
                false
            }
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn has_layer(&self, key: LayerKey) -> bool {
        self.slots.iter().any(|slot| slot.key == key)
    }

    pub fn disabled_layers(&self) -> &BTreeSet<LayerKey> {
        &self.disabled
    }

    /// The on/off switch value of a layer at time `t`, if it exists
    pub fn switch_value(&self, key: LayerKey, t: f64) -> Option<f64> {
        self.slots
            .iter()
            .find(|slot| slot.key == key)
            .map(|slot| slot.gain_switch.value_at(t))
    }

    /// Ramp a present layer's switch; returns false when the layer was
    /// never built
    pub fn set_layer_gain(&mut self, key: LayerKey, on: bool, when: f64, ramp: f64) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.key == key) {
            let target = if on { 1.0 } else { 0.0 };
            slot.gain_switch.ramp_to(target, when, ramp, RampCurve::Linear);
            true
        } else {
            false
        }
    }

    /// Toggle a layer on, constructing it first if this session never built
    /// it. Returns whether the layer is (now) present; a failed construction
    /// reports the layer unavailable and returns false.
    pub fn enable_layer(
        &mut self,
        ctx: &mut RenderContext,
        cache: &mut BufferCache,
        build: &LayerBuild,
        key: LayerKey,
        when: f64,
        ramp: f64,
    ) -> bool {
        if self.disabled.contains(&key) {
            return false;
        }
        if self.has_layer(key) {
            self.set_layer_gain(key, true, when, ramp);
            return true;
        }
        // Built mid-session: come up from silence through the ramp
        if self.construct_slot(ctx, cache, build, key, 0.0) {
            self.set_layer_gain(key, true, when, ramp);
            true
        } else {
            false
        }
    }

    pub fn bowl_mut(&mut self) -> Option<&mut BowlLayer> {
        self.slots.iter_mut().find_map(|slot| match &mut slot.layer {
            LayerKind::Bowl(bowl) => Some(bowl),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Control-plane automation
    // ------------------------------------------------------------------

    pub fn set_master(&mut self, gain: f64, when: f64, ramp: f64) {
        self.master_gain.ramp_to(gain, when, ramp, RampCurve::Linear);
    }

    pub fn master_value(&self, t: f64) -> f64 {
        self.master_gain.value_at(t)
    }

    pub fn set_intensity(&mut self, intensity: f64, when: f64, ramp: f64) {
        self.effects_gain
            .ramp_to(intensity.clamp(0.0, 1.0), when, ramp, RampCurve::Linear);
    }

    /// Ramp every stage-automated parameter toward a stage's targets
    pub fn automate_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.carrier.apply_stage(recipe, when, ramp);
        self.pad.apply_stage(recipe, when, ramp);
        for slot in &mut self.slots {
            match &mut slot.layer {
                LayerKind::Iso(layer) => layer.apply_stage(recipe, when, ramp),
                LayerKind::Noise(layer) => layer.apply_stage(recipe, when, ramp),
                LayerKind::DeepSleep(layer) => layer.apply_stage(recipe, when, ramp),
                _ => {}
            }
        }
    }

    /// Pin every stage-automated parameter to the value it holds `offset`
    /// seconds into a continuous render, at chunk-local time `at` (offline
    /// chunk initialization; `at` is negative when a warm-up pre-roll runs)
    pub fn pin_stage_values(&mut self, timeline: &SessionTimeline, offset: f64, ramp: f64, at: f64) {
        let iv = |field| initial_value(timeline, field, offset, ramp);
        self.carrier
            .pin_frequencies(iv(StageField::EarLeft), iv(StageField::EarRight), at);
        self.pad.pin_filter(iv(StageField::PadCutoff), at);
        for slot in &mut self.slots {
            match &mut slot.layer {
                LayerKind::Iso(layer) => layer.pin_rate(iv(StageField::IsoRate), at),
                LayerKind::Noise(layer) => layer.pin_gain(iv(StageField::NoiseGain), at),
                LayerKind::DeepSleep(layer) => layer.pin_stage(
                    iv(StageField::DeepEarLeft),
                    iv(StageField::DeepEarRight),
                    iv(StageField::DeepPulseRate),
                    iv(StageField::DeepSleepGain),
                    at,
                ),
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render one block starting at context time `start_sec` into `out`
    pub fn render_block(&mut self, out: &mut AudioBuffer, start_sec: f64) {
        let frames = out.len();
        let clock = BlockClock {
            start_sec,
            sample_rate: self.sample_rate,
        };
        if self.scratch.len() != frames {
            self.scratch.resize(frames);
            self.effects_bus.resize(frames);
            self.reverb_bus.resize(frames);
        }
        out.clear();
        self.effects_bus.clear();
        self.reverb_bus.clear();

        // Unconditional layers feed the master mix and the reverb send
        self.carrier.render(&mut self.scratch, &clock);
        out.mix_from(&self.scratch, 1.0);
        self.reverb_bus.mix_from(&self.scratch, 1.0);

        self.pad.render(&mut self.scratch, &clock);
        out.mix_from(&self.scratch, 1.0);
        self.reverb_bus.mix_from(&self.scratch, 1.0);

        // Optional layers behind their switches
        for slot in &mut self.slots {
            slot.layer.render(&mut self.scratch, &clock);
            {
                let (l_buf, r_buf) = self.scratch.stereo_mut();
                for i in 0..frames {
                    let g = slot.gain_switch.value_at(clock.t(i)) as f32;
                    l_buf[i] *= g;
                    r_buf[i] *= g;
                }
            }
            self.effects_bus.mix_from(&self.scratch, 1.0);
            if slot.send_reverb {
                self.reverb_bus.mix_from(&self.scratch, 1.0);
            }
        }

        // Intensity bus into the master mix
        {
            let effects = &self.effects_bus;
            for ch in 0..2 {
                let dst = out.channel_mut(ch);
                let src = effects.channel(ch);
                for i in 0..frames {
                    dst[i] += src[i] * self.effects_gain.value_at(clock.t(i)) as f32;
                }
            }
        }

        // Shared reverb return
        self.reverb
            .process_into(&self.reverb_bus, out, self.reverb_return);

        // Master volume last
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let g = self.master_gain.value_at(clock.t(i)) as f32;
            l_buf[i] *= g;
            r_buf[i] *= g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Capabilities;
    use crate::events::EventBus;
    use crate::timeline::StageRecipe;

    fn stage(name: &str) -> StageRecipe {
        StageRecipe {
            name: name.to_string(),
            base_frequency: 55.0,
            beat_frequency: 2.5,
            pad_cutoff_hz: 900.0,
            iso_rate_hz: 2.0,
            noise_gain: 0.08,
            deep_sleep_on: false,
        }
    }

    fn timeline() -> SessionTimeline {
        SessionTimeline::new(vec![stage("a")], 120.0).unwrap()
    }

    fn assemble_graph(
        toggles: &ToggleSet,
        caps: Capabilities,
    ) -> (Result<MixGraph>, crossbeam_channel::Receiver<EngineEvent>) {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let mut ctx = RenderContext::new(8_000, caps, bus).unwrap();
        let mut cache = BufferCache::new();
        let timeline = timeline();
        let settings = GraphSettings {
            timeline: &timeline,
            toggles,
            intensity: 0.6,
            master_gain: 0.45,
            offline: false,
            origin_frames: 0,
            initial_stage: 0,
            seed: 42,
        };
        let graph = assemble(
            &mut ctx,
            &mut cache,
            &settings,
            &EngineConfig::default(),
        );
        (graph, rx)
    }

    #[test]
    fn test_disabled_layer_never_attempted() {
        let mut toggles = ToggleSet::all_enabled();
        toggles.set(LayerKey::Iso, false);
        let (graph, rx) = assemble_graph(&toggles, Capabilities::default());
        let graph = graph.unwrap();

        assert!(!graph.has_layer(LayerKey::Iso));
        assert!(graph.has_layer(LayerKey::Noise));
        // No layer-unavailable event fired for a layer that was never tried
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, EngineEvent::LayerUnavailable(LayerKey::Iso)));
        }
    }

    #[test]
    fn test_optional_failure_degrades_not_aborts() {
        // A pre-render budget large enough for the pad (unconditional) but
        // too small for the drum loop forces one optional layer to fail.
        let caps = Capabilities {
            phase_modulators: true,
            // Pad needs 30 s, noise 2 s, wind 2 s; drum needs 10 s and the
            // brain pulse 15 s. Budget covers everything up to the drum.
            prerender_budget_frames: 8_000 * 35,
        };
        let mut toggles = ToggleSet::new();
        toggles.set(LayerKey::Noise, true);
        toggles.set(LayerKey::Drum, true);

        let (graph, rx) = assemble_graph(&toggles, caps);
        let graph = graph.unwrap();

        assert!(graph.has_layer(LayerKey::Noise));
        assert!(!graph.has_layer(LayerKey::Drum));
        assert!(graph.disabled_layers().contains(&LayerKey::Drum));

        let mut saw_unavailable = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::LayerUnavailable(LayerKey::Drum)) {
                saw_unavailable = true;
            }
        }
        assert!(saw_unavailable);
    }

    #[test]
    fn test_render_produces_audio_and_respects_master() {
        let (graph, _rx) = assemble_graph(&ToggleSet::all_disabled(), Capabilities::default());
        let mut graph = graph.unwrap();

        let mut out = AudioBuffer::new(4_000, ChannelLayout::Stereo, 8_000);
        graph.render_block(&mut out, 0.0);
        assert!(out.peak() > 0.01);

        graph.set_master(0.0, 0.5, 0.0);
        let mut tail = AudioBuffer::new(4_000, ChannelLayout::Stereo, 8_000);
        graph.render_block(&mut tail, 0.5);
        assert_eq!(tail.peak(), 0.0);
    }

    #[test]
    fn test_toggle_switch_ramps() {
        let mut toggles = ToggleSet::new();
        toggles.set(LayerKey::Noise, true);
        let (graph, _rx) = assemble_graph(&toggles, Capabilities::default());
        let mut graph = graph.unwrap();

        graph.set_layer_gain(LayerKey::Noise, false, 0.0, 0.5);
        assert_eq!(graph.switch_value(LayerKey::Noise, 0.0), Some(1.0));
        assert_eq!(graph.switch_value(LayerKey::Noise, 0.25), Some(0.5));
        assert_eq!(graph.switch_value(LayerKey::Noise, 0.5), Some(0.0));
    }
}
