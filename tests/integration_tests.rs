//! Integration Tests
//!
//! End-to-end properties of the soundscape engine: carrier frequency
//! derivation, chunked-render sample accounting, chunked-vs-continuous
//! phase continuity, cancellation, toggle trajectories, and session
//! lifecycle behavior.

use std::sync::mpsc;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;

use driftwave::engine::{AudioBuffer, Capabilities, ChannelLayout, EngineSession, SessionState};
use driftwave::events::EngineEvent;
use driftwave::graph::cache::BufferCache;
use driftwave::graph::scheduler::{initial_value, StageField};
use driftwave::graph::{assemble, GraphSettings};
use driftwave::timeline::{
    binaural_ears, LayerKey, Preset, SessionTimeline, StageRecipe, ToggleSet,
};
use driftwave::{
    EngineConfig, EventBus, RenderHandle, RenderOutcome, RenderRequest, Renderer,
};

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

fn single_stage_timeline(total_sec: f64) -> SessionTimeline {
    SessionTimeline::new(vec![stage("Grounding", 55.0, 2.5, 900.0, 2.0, 0.08)], total_sec).unwrap()
}

fn request(
    timeline: SessionTimeline,
    toggles: ToggleSet,
    sample_rate: u32,
    chunk_secs: f64,
) -> RenderRequest {
    RenderRequest {
        timeline,
        toggles,
        intensity: 0.6,
        master_volume: 0.45,
        sample_rate,
        chunk_duration_sec: chunk_secs,
    }
}

// === Carrier frequency law ===

#[test]
fn test_derived_ear_frequencies_clamped() {
    for &(base, beat) in &[(55.0, 2.5), (95.0, 6.5), (240.0, 40.0), (10.0, 40.0), (5.0, 1.0)] {
        let (left, right) = binaural_ears(base, beat);
        assert_abs_diff_eq!(left, (base - beat / 2.0).max(8.0));
        assert_abs_diff_eq!(right, (base + beat / 2.0).max(8.0));
    }
}

// === Offline sample accounting ===

#[test]
fn test_chunked_render_sample_count_exact() {
    // 35 s in 15 s chunks: 15 + 15 + 5, no duplicated or missing frames
    let req = request(
        single_stage_timeline(35.0),
        ToggleSet::all_disabled(),
        8_000,
        15.0,
    );
    let bus = EventBus::new();
    let progress_rx = bus.subscribe();
    let renderer = Renderer::new(EngineConfig::default(), bus);

    let outcome = renderer.render(&req, &RenderHandle::new()).unwrap();
    let RenderOutcome::Complete { wav_bytes, job } = outcome else {
        panic!("render did not complete");
    };

    assert_eq!(job.chunks_produced, 3);
    // 44-byte header + stereo 16-bit frames
    let expected_frames = (35.0f64 * 8_000.0).round() as usize;
    assert_eq!(wav_bytes.len(), 44 + expected_frames * 2 * 2);

    let progress: Vec<f64> = progress_rx
        .try_iter()
        .filter_map(|e| match e {
            EngineEvent::RenderProgress { elapsed_sec } => Some(elapsed_sec),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![15.0, 30.0, 35.0]);
}

#[test]
fn test_ten_minute_session_frame_count() {
    // 10 minutes in 60 s chunks at 44.1 kHz: 10 chunks, 26,460,000 frames
    let req = request(
        single_stage_timeline(600.0),
        ToggleSet::all_disabled(),
        44_100,
        60.0,
    );
    let bus = EventBus::new();
    let progress_rx = bus.subscribe();
    let renderer = Renderer::new(EngineConfig::default(), bus);

    let outcome = renderer.render(&req, &RenderHandle::new()).unwrap();
    let RenderOutcome::Complete { wav_bytes, job } = outcome else {
        panic!("render did not complete");
    };

    assert_eq!(job.chunks_produced, 10);
    assert_eq!(wav_bytes.len() - 44, 26_460_000 * 2 * 2);

    let progress_count = progress_rx
        .try_iter()
        .filter(|e| matches!(e, EngineEvent::RenderProgress { .. }))
        .count();
    assert_eq!(progress_count, 10);
}

// === Phase continuity ===

#[test]
fn test_chunked_render_matches_continuous() {
    // Two stages over 36 s with the stage ramp (18..22 s) straddling the
    // 10 s chunk grid, every layer enabled. The reverb return is silenced:
    // its tail is the one stateful element that legitimately resets at
    // chunk boundaries.
    let mut stages = vec![
        stage("a", 55.0, 2.5, 900.0, 2.0, 0.08),
        stage("b", 95.0, 6.5, 1400.0, 4.5, 0.03),
    ];
    stages[1].deep_sleep_on = true;
    let timeline = SessionTimeline::new(stages, 36.0).unwrap();

    let config = EngineConfig {
        reverb_return: 0.0,
        ..EngineConfig::default()
    };

    let render_with_chunk = |chunk_secs: f64| -> AudioBuffer {
        let req = request(
            timeline.clone(),
            ToggleSet::all_enabled(),
            8_000,
            chunk_secs,
        );
        let renderer = Renderer::new(config.clone(), EventBus::new());
        renderer
            .render_to_buffer(&req, &RenderHandle::new())
            .unwrap()
            .unwrap()
    };

    let continuous = render_with_chunk(36.0);
    let chunked = render_with_chunk(10.0);

    assert_eq!(continuous.len(), chunked.len());
    let mut max_diff = 0.0f32;
    for ch in 0..2 {
        for (a, b) in continuous.channel(ch).iter().zip(chunked.channel(ch)) {
            max_diff = max_diff.max((a - b).abs());
        }
    }
    assert!(
        max_diff < 3e-3,
        "chunked render diverged from continuous: max diff {}",
        max_diff
    );
}

#[test]
fn test_initial_value_exact_on_stage_boundary() {
    let timeline = SessionTimeline::new(
        vec![
            stage("a", 55.0, 2.5, 900.0, 2.0, 0.08),
            stage("b", 95.0, 6.5, 1400.0, 4.5, 0.03),
        ],
        200.0,
    )
    .unwrap();

    // Exactly on the boundary the ramp has not departed: the previous
    // stage's settled target, no interpolation residue
    assert_abs_diff_eq!(
        initial_value(&timeline, StageField::PadCutoff, 100.0, 4.0),
        900.0
    );
    // One ramp-length later: settled at the new target
    assert_abs_diff_eq!(
        initial_value(&timeline, StageField::PadCutoff, 104.0, 4.0),
        1400.0
    );
}

// === Toggle trajectories ===

#[test]
fn test_toggle_off_on_gain_trajectory() {
    let timeline = single_stage_timeline(120.0);
    let mut toggles = ToggleSet::all_disabled();
    toggles.set(LayerKey::Noise, true);

    let config = EngineConfig::default();
    let bus = EventBus::new();
    let mut ctx =
        driftwave::engine::RenderContext::new(8_000, Capabilities::default(), bus).unwrap();
    let mut cache = BufferCache::new();
    let settings = GraphSettings {
        timeline: &timeline,
        toggles: &toggles,
        intensity: 0.6,
        master_gain: 0.45,
        offline: false,
        origin_frames: 0,
        initial_stage: 0,
        seed: config.seed,
    };
    let mut graph = assemble(&mut ctx, &mut cache, &settings, &config).unwrap();

    let ramp = config.toggle_ramp_sec;
    graph.set_layer_gain(LayerKey::Noise, false, 1.0, ramp);
    graph.set_layer_gain(LayerKey::Noise, true, 2.0, ramp);

    // Sample the switch at audio rate: max per-sample step never exceeds
    // the ramp's slope, and the trajectory lands exactly on 0 and 1
    let dt = 1.0 / 8_000.0;
    let mut prev = graph.switch_value(LayerKey::Noise, 0.0).unwrap();
    let mut max_step = 0.0f64;
    for i in 1..(8_000 * 3) {
        let v = graph.switch_value(LayerKey::Noise, i as f64 * dt).unwrap();
        max_step = max_step.max((v - prev).abs());
        prev = v;
    }
    assert!(max_step <= dt / ramp * 1.000001, "step {}", max_step);
    assert_abs_diff_eq!(graph.switch_value(LayerKey::Noise, 1.75).unwrap(), 0.0);
    assert_abs_diff_eq!(graph.switch_value(LayerKey::Noise, 2.25).unwrap(), 0.5);
    assert_abs_diff_eq!(graph.switch_value(LayerKey::Noise, 3.0).unwrap(), 1.0);
}

// === Cancellation ===

#[test]
fn test_cancel_mid_render_produces_no_result() {
    // Heavy chunks (every layer on) keep the per-chunk wall time well above
    // the cancel latency, so the flag lands long before the last chunk
    let req = request(
        single_stage_timeline(60.0),
        ToggleSet::all_enabled(),
        8_000,
        2.0,
    );
    let bus = EventBus::new();
    let events_rx = bus.subscribe();
    let renderer = Renderer::new(EngineConfig::default(), bus);
    let handle = RenderHandle::new();

    let (done_tx, done_rx) = mpsc::channel();
    let render_handle = handle.clone();
    let worker = std::thread::spawn(move || {
        let outcome = renderer.render(&req, &render_handle).unwrap();
        done_tx.send(()).ok();
        outcome
    });

    // Cancel after the second chunk reports progress
    let mut seen = 0;
    while seen < 2 {
        match events_rx.recv().unwrap() {
            EngineEvent::RenderProgress { .. } => seen += 1,
            _ => {}
        }
    }
    handle.cancel();
    done_rx.recv().unwrap();
    let outcome = worker.join().unwrap();

    let RenderOutcome::Cancelled { job } = outcome else {
        panic!("cancelled render must not complete");
    };
    assert!(job.chunks_produced >= 2);
    assert!(job.chunks_produced < 30, "cancel had no effect");

    // A cancelled event fires; a complete event never does
    let mut saw_cancelled = false;
    for event in events_rx.try_iter() {
        match event {
            EngineEvent::RenderCancelled => saw_cancelled = true,
            EngineEvent::RenderComplete { .. } => panic!("complete after cancel"),
            _ => {}
        }
    }
    assert!(saw_cancelled);
}

// === Session lifecycle ===

#[test]
fn test_disabled_layer_never_attempted_in_session() {
    let timeline = single_stage_timeline(120.0);
    let mut toggles = ToggleSet::all_enabled();
    toggles.set(LayerKey::Iso, false);

    let session = EngineSession::create(
        EngineConfig::default(),
        timeline,
        toggles,
        0.6,
        0.45,
        8_000,
    )
    .unwrap();
    let rx = session.events().subscribe();

    assert!(!session.layer_active(LayerKey::Iso));
    assert!(session.layer_active(LayerKey::Noise));
    for event in rx.try_iter() {
        assert!(
            !matches!(event, EngineEvent::LayerUnavailable(LayerKey::Iso)),
            "iso was never attempted, no unavailable event may fire"
        );
    }
}

#[test]
fn test_modulator_fallback_notifies_once() {
    // Every enabled layer asks for LFOs; a context without the
    // phase-controlled processor degrades them all but reports it once
    let timeline = single_stage_timeline(120.0);
    let toggles = ToggleSet::all_enabled();
    let config = EngineConfig::default();
    let bus = EventBus::new();
    let rx = bus.subscribe();

    let mut ctx = driftwave::engine::RenderContext::new(
        8_000,
        Capabilities {
            phase_modulators: false,
            ..Capabilities::default()
        },
        bus,
    )
    .unwrap();
    let mut cache = BufferCache::new();
    let settings = GraphSettings {
        timeline: &timeline,
        toggles: &toggles,
        intensity: 0.6,
        master_gain: 0.45,
        offline: false,
        origin_frames: 0,
        initial_stage: 0,
        seed: config.seed,
    };
    assemble(&mut ctx, &mut cache, &settings, &config).unwrap();

    assert_eq!(
        rx.try_iter()
            .filter(|e| matches!(e, EngineEvent::ProcessorLoadFailed))
            .count(),
        1
    );
}

#[test]
fn test_preset_transition_crossfades_and_guards() {
    let timeline = SessionTimeline::new(
        vec![
            stage("a", 55.0, 2.5, 900.0, 2.0, 0.08),
            stage("b", 95.0, 6.5, 1400.0, 4.5, 0.03),
        ],
        600.0,
    )
    .unwrap();
    let mut session = EngineSession::create(
        EngineConfig::default(),
        timeline,
        ToggleSet::all_disabled(),
        0.6,
        0.45,
        8_000,
    )
    .unwrap();

    session.play().unwrap();
    let mut block = AudioBuffer::new(800, ChannelLayout::Stereo, 8_000);
    for _ in 0..10 {
        session.process(&mut block).unwrap();
    }

    let mut preset_toggles = ToggleSet::all_disabled();
    preset_toggles.set(LayerKey::Noise, true);
    let preset = Preset {
        stages: vec![stage("calm", 120.0, 8.0, 1000.0, 4.0, 0.03)],
        toggles: preset_toggles,
        intensity: 0.4,
    };
    session.transition_to_preset(preset.clone()).unwrap();

    // Overlapping lifecycle operations are rejected, not interleaved
    let err = session.transition_to_preset(preset).unwrap_err();
    assert_eq!(err.error_code(), "BUSY");

    // Run through fade-out, rebuild, fade-in
    for _ in 0..40 {
        session.process(&mut block).unwrap();
    }
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.current_stage(), 0);
    assert!(session.layer_active(LayerKey::Noise));
    assert!(!session.layer_active(LayerKey::Wind));

    // Guard released after the fade-in completes
    session.pause().unwrap();
}
