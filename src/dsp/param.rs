//! Continuous-value automation parameters
//!
//! An [`AutomatedParam`] is a scalar whose value over time is described by
//! piecewise automation segments: steps, linear ramps and exponential ramps.
//! Scheduling a new target cancels anything not yet reached (cancel-and-hold
//! semantics) so commands for one parameter apply strictly in issue order and
//! never stack. Values are defined for every time, including negative local
//! times — offline chunks lean on this to resume mid-ramp and mid-decay
//! trajectories scheduled before the chunk began.

/// Shape of a scheduled transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampCurve {
    /// Straight line from the current value to the target
    Linear,
    /// `v0 * (v1/v0)^u` — natural decay/release shape; requires both
    /// endpoints positive, otherwise evaluated as linear
    Exponential,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    t0: f64,
    t1: f64,
    v0: f64,
    v1: f64,
    curve: RampCurve,
}

impl Segment {
    fn eval(&self, t: f64) -> f64 {
        if t >= self.t1 || self.t1 <= self.t0 {
            return self.v1;
        }
        let u = (t - self.t0) / (self.t1 - self.t0);
        match self.curve {
            RampCurve::Linear => self.v0 + (self.v1 - self.v0) * u,
            RampCurve::Exponential => {
                if self.v0 > 0.0 && self.v1 > 0.0 {
                    self.v0 * (self.v1 / self.v0).powf(u)
                } else {
                    self.v0 + (self.v1 - self.v0) * u
                }
            }
        }
    }
}

/// A scalar parameter with sample-accurate scheduled automation
#[derive(Debug, Clone)]
pub struct AutomatedParam {
    base: f64,
    /// Sorted by start time; later segments shadow earlier spanning ones
    segments: Vec<Segment>,
}

impl AutomatedParam {
    pub fn new(value: f64) -> Self {
        Self {
            base: value,
            segments: Vec::new(),
        }
    }

    /// Value the parameter holds at time `t`
    pub fn value_at(&self, t: f64) -> f64 {
        for seg in self.segments.iter().rev() {
            if seg.t0 <= t {
                return seg.eval(t);
            }
        }
        self.base
    }

    /// Pin the parameter to `value` from time `t` onward
    ///
    /// Anything scheduled at or after `t` is cancelled.
    pub fn set_value_at(&mut self, value: f64, t: f64) {
        self.truncate_from(t);
        self.segments.push(Segment {
            t0: t,
            t1: t,
            v0: value,
            v1: value,
            curve: RampCurve::Linear,
        });
    }

    /// Schedule a transition to `target` starting at `start`
    ///
    /// The ramp departs from whatever value the parameter holds at `start`
    /// (cancel-and-hold); previously scheduled-but-unreached automation is
    /// dropped, never layered.
    pub fn ramp_to(&mut self, target: f64, start: f64, duration: f64, curve: RampCurve) {
        let from = self.value_at(start);
        self.truncate_from(start);
        self.segments.push(Segment {
            t0: start,
            t1: start + duration.max(0.0),
            v0: from,
            v1: target,
            curve,
        });
    }

    /// Drop scheduled automation starting at or after `t`
    ///
    /// A segment already in flight at `t` is kept; whatever is pushed next
    /// shadows it from its own start time.
    fn truncate_from(&mut self, t: f64) {
        self.segments.retain(|seg| seg.t0 < t);
    }
}
