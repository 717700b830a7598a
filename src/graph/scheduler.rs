//! Stage scheduling and offline value reconstruction
//!
//! Two jobs live here. First, applying a stage's targets to the live graph
//! as ramps. Second, the offline half: an isolated chunk starts its clock at
//! zero, so every automated parameter must first be pinned to the value it
//! would hold at the chunk's global offset had the whole session rendered
//! continuously, and every oscillator must resume the phase it would have
//! accumulated by then. Values come from a piecewise-linear [`StageTrack`];
//! phases come from exact closed-form sums over the same per-sample
//! frequency sequence the renderer itself would have produced.

use crate::config::EngineConfig;
use crate::graph::MixGraph;
use crate::timeline::{binaural_ears, SessionTimeline, StageRecipe};

/// Pulse-rate bounds for the deep-sleep amplitude LFO, in Hz
const DEEP_PULSE_MIN_HZ: f64 = 0.05;
const DEEP_PULSE_MAX_HZ: f64 = 2.0;

// ============================================================================
// Stage-automated parameters
// ============================================================================

/// Every parameter the stage scheduler drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageField {
    /// Left carrier ear frequency (clamped target)
    EarLeft,
    /// Right carrier ear frequency (clamped target)
    EarRight,
    /// Pad low-pass cutoff
    PadCutoff,
    /// Isochronic gating rate
    IsoRate,
    /// Pink-noise bed gain
    NoiseGain,
    /// Deep-sleep left ear frequency
    DeepEarLeft,
    /// Deep-sleep right ear frequency
    DeepEarRight,
    /// Deep-sleep amplitude pulse rate (tracks the beat frequency)
    DeepPulseRate,
    /// Deep-sleep audibility gate (1 when the stage enables it)
    DeepSleepGain,
}

/// A stage's settled target value for one field
pub fn stage_target(recipe: &StageRecipe, field: StageField) -> f64 {
    match field {
        StageField::EarLeft => binaural_ears(recipe.base_frequency, recipe.beat_frequency).0,
        StageField::EarRight => binaural_ears(recipe.base_frequency, recipe.beat_frequency).1,
        StageField::PadCutoff => recipe.pad_cutoff_hz,
        StageField::IsoRate => recipe.iso_rate_hz,
        StageField::NoiseGain => recipe.noise_gain,
        // The deep layer sits an octave under the main carrier
        StageField::DeepEarLeft => {
            binaural_ears(recipe.base_frequency / 2.0, recipe.beat_frequency).0
        }
        StageField::DeepEarRight => {
            binaural_ears(recipe.base_frequency / 2.0, recipe.beat_frequency).1
        }
        StageField::DeepPulseRate => recipe
            .beat_frequency
            .clamp(DEEP_PULSE_MIN_HZ, DEEP_PULSE_MAX_HZ),
        StageField::DeepSleepGain => {
            if recipe.deep_sleep_on {
                1.0
            } else {
                0.0
            }
        }
    }
}

// ============================================================================
// Stage tracks
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct TrackSeg {
    t0: f64,
    t1: f64,
    v0: f64,
    v1: f64,
}

/// One field's value over the whole session timeline
///
/// Piecewise linear: constant at stage targets, with a ramp of the
/// configured duration starting at each stage boundary.
#[derive(Debug, Clone)]
pub struct StageTrack {
    initial: f64,
    segs: Vec<TrackSeg>,
}

impl StageTrack {
    pub fn build(timeline: &SessionTimeline, field: StageField, ramp_sec: f64) -> Self {
        let stage_dur = timeline.stage_duration();
        let mut prev = stage_target(&timeline.stages[0], field);
        let mut segs = Vec::with_capacity(timeline.stages.len().saturating_sub(1));
        for (i, stage) in timeline.stages.iter().enumerate().skip(1) {
            let target = stage_target(stage, field);
            let t0 = i as f64 * stage_dur;
            segs.push(TrackSeg {
                t0,
                t1: t0 + ramp_sec,
                v0: prev,
                v1: target,
            });
            prev = target;
        }
        Self {
            initial: stage_target(&timeline.stages[0], field),
            segs,
        }
    }

    /// Value the field holds at timeline position `t`
    ///
    /// At a stage boundary the ramp has not yet departed, so the previous
    /// stage's settled target is returned exactly — no interpolation
    /// residue.
    pub fn value_at(&self, t: f64) -> f64 {
        for seg in self.segs.iter().rev() {
            if seg.t0 <= t {
                if t >= seg.t1 || seg.t1 <= seg.t0 {
                    return seg.v1;
                }
                let u = (t - seg.t0) / (seg.t1 - seg.t0);
                return seg.v0 + (seg.v1 - seg.v0) * u;
            }
        }
        self.initial
    }

    /// Exact sum of `value_at(i / rate) / rate` for `i` in `[0, frames)`
    ///
    /// This is, in closed form, the phase (in cycles) a renderer accumulates
    /// by stepping `phase += value * dt` over the first `frames` samples.
    pub fn sample_sum(&self, sample_rate: f64, frames: u64) -> f64 {
        let n = frames as i64;
        let dt = 1.0 / sample_rate;
        let mut total = 0.0;
        let mut cursor = 0i64;
        let mut held = self.initial;

        for seg in &self.segs {
            let a = first_index_at_or_after(seg.t0, sample_rate).min(n);
            // Samples before this segment hold the previous value
            if a > cursor {
                total += held * (a - cursor) as f64 * dt;
            }
            // Segments never overlap for sane ramp settings; clamping keeps
            // a degenerate ramp-longer-than-stage config from double counting
            let a = a.max(cursor);
            let b = first_index_at_or_after(seg.t1, sample_rate).clamp(a, n);
            if b > a {
                // Arithmetic series over the linear span
                let c = (b - a) as f64;
                let m = if seg.t1 > seg.t0 {
                    (seg.v1 - seg.v0) / (seg.t1 - seg.t0)
                } else {
                    0.0
                };
                let t_first = a as f64 * dt;
                let sum_t = c * t_first + (c * (c - 1.0) / 2.0) * dt;
                total += dt * (seg.v0 * c + m * (sum_t - c * seg.t0));
            }
            cursor = cursor.max(b);
            held = seg.v1;
            if cursor >= n {
                break;
            }
        }
        if n > cursor {
            total += held * (n - cursor) as f64 * dt;
        }
        total
    }
}

/// Smallest sample index `i` with `i / rate >= t`, agreeing bit-for-bit with
/// the comparison the renderer makes when it evaluates automation at `i / rate`
fn first_index_at_or_after(t: f64, sample_rate: f64) -> i64 {
    if t <= 0.0 {
        return 0;
    }
    let mut i = (t * sample_rate).ceil() as i64;
    while i > 0 && (i - 1) as f64 / sample_rate >= t {
        i -= 1;
    }
    while (i as f64 / sample_rate) < t {
        i += 1;
    }
    i
}

/// Closed-form `Σ_{i<frames} sin(τ·(phase0 + f·i/rate)) / rate`
///
/// The phase (in cycles) contributed to a carrier by a constant-rate,
/// unit-amplitude sine modulator over the first `frames` samples. Scale by
/// the modulator amplitude to get the real contribution.
pub fn sin_phase_sum(lfo_hz: f64, phase0_cycles: f64, sample_rate: f64, frames: u64) -> f64 {
    if frames == 0 {
        return 0.0;
    }
    let n = frames as f64;
    let tau = std::f64::consts::TAU;
    let theta0 = tau * phase0_cycles;
    let delta = tau * lfo_hz / sample_rate;
    let half = delta * 0.5;
    let series = if half.sin().abs() < 1e-12 {
        n * theta0.sin()
    } else {
        (n * half).sin() * (theta0 + (n - 1.0) * half).sin() / half.sin()
    };
    series / sample_rate
}

// ============================================================================
// Stage application
// ============================================================================

/// The value a stage-automated field holds at `offset` seconds into a
/// continuous render of the timeline
pub fn initial_value(
    timeline: &SessionTimeline,
    field: StageField,
    offset: f64,
    ramp_sec: f64,
) -> f64 {
    StageTrack::build(timeline, field, ramp_sec).value_at(offset)
}

/// Ramp every automatable parameter on the graph to one stage's targets
///
/// Live mode only; the offline pipeline uses [`apply_offline_schedule`],
/// which lays out the entire timeline at once.
pub fn set_stage_live(
    graph: &mut MixGraph,
    recipe: &StageRecipe,
    schedule_time: f64,
    ramp_sec: f64,
    now: f64,
) {
    let start = now + schedule_time;
    graph.automate_stage(recipe, start, ramp_sec);
}

/// Reproduce the timeline's automation inside one offline chunk
///
/// Pins each parameter to its continuous-render value at the start of the
/// chunk's warm-up pre-roll, then schedules each stage ramp at chunk-local
/// time. A ramp that ends before the pre-roll or starts after the chunk is
/// skipped (it belongs to another chunk); a ramp straddling the chunk start
/// is scheduled at its true (negative) local time, so the value at local
/// zero is the correct mid-ramp value and the remainder continues to the
/// target — chunked output stays identical to a continuous render.
pub fn apply_offline_schedule(
    graph: &mut MixGraph,
    timeline: &SessionTimeline,
    offset: f64,
    chunk_duration: f64,
    warmup_sec: f64,
    config: &EngineConfig,
) {
    let ramp = config.stage_ramp_sec;
    graph.pin_stage_values(timeline, offset - warmup_sec, ramp, -warmup_sec);

    let stage_dur = timeline.stage_duration();
    for (i, stage) in timeline.stages.iter().enumerate() {
        let start_local = i as f64 * stage_dur - offset;
        let end_local = start_local + ramp;
        if end_local <= -warmup_sec || start_local >= chunk_duration {
            continue;
        }
        if start_local < -warmup_sec {
            // Already in flight when the pre-roll begins: continue the same
            // line from the pinned mid-ramp value to the target
            graph.automate_stage(stage, -warmup_sec, end_local + warmup_sec);
        } else {
            graph.automate_stage(stage, start_local, ramp);
        }
    }
}
