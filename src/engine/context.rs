//! Rendering context
//!
//! One `RenderContext` backs each constructed graph: the live session owns
//! one for the duration of playback, and the offline pipeline creates a
//! fresh one per chunk. The context carries the sample rate, the capability
//! probe for the phase-controlled modulator processor (resolved once and
//! memoized), and a pre-render frame budget that bounds how much loop
//! memory layer factories may claim.

use log::warn;

use crate::error::{DriftwaveError, Result};
use crate::events::{EngineEvent, EventBus};

/// Which modulator implementation a context resolved to
///
/// `PhaseControlled` honors an explicit start phase (required for chunked
/// phase continuity); `Fallback` is a plain generator/scaler pair with the
/// same frequency and amplitude contract but no start-phase accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulatorMode {
    PhaseControlled,
    Fallback,
}

/// Host capabilities granted to a rendering context
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether the phase-controlled modulator processor is available
    pub phase_modulators: bool,
    /// Total frames layer factories may pre-render into loop buffers
    pub prerender_budget_frames: u64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            phase_modulators: true,
            // Generous: roughly 100 minutes of stereo loop material at 44.1k
            prerender_budget_frames: 1 << 28,
        }
    }
}

/// Sample-rate scoped rendering host state
#[derive(Debug)]
pub struct RenderContext {
    sample_rate: u32,
    capabilities: Capabilities,
    /// Memoized modulator resolution; `None` until first requested
    modulator_mode: Option<ModulatorMode>,
    prerender_frames_used: u64,
    events: EventBus,
}

impl RenderContext {
    pub fn new(sample_rate: u32, capabilities: Capabilities, events: EventBus) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DriftwaveError::ContextCreation {
                reason: "sample rate must be non-zero".to_string(),
            });
        }
        Ok(Self {
            sample_rate,
            capabilities,
            modulator_mode: None,
            prerender_frames_used: 0,
            events,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds per sample
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate as f64
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Resolve the modulator implementation for this context
    ///
    /// The probe runs at most once; all later callers share the memoized
    /// result. A failed probe emits a single `ProcessorLoadFailed` event and
    /// every LFO built on this context degrades to the fallback generator.
    pub fn modulator_mode(&mut self) -> ModulatorMode {
        if let Some(mode) = self.modulator_mode {
            return mode;
        }
        let mode = if self.capabilities.phase_modulators {
            ModulatorMode::PhaseControlled
        } else {
            warn!("phase-controlled modulator processor unavailable; using generator fallback");
            self.events.emit(EngineEvent::ProcessorLoadFailed);
            ModulatorMode::Fallback
        };
        self.modulator_mode = Some(mode);
        mode
    }

    /// Claim pre-render loop memory from the context budget
    ///
    /// Layer factories call this before synthesizing a loop buffer; an
    /// exhausted budget degrades that one layer, not the whole graph.
    pub fn reserve_prerender(&mut self, frames: u64) -> Result<()> {
        let available = self
            .capabilities
            .prerender_budget_frames
            .saturating_sub(self.prerender_frames_used);
        if frames > available {
            return Err(DriftwaveError::PrerenderBudget {
                requested: frames,
                available,
            });
        }
        self.prerender_frames_used += frames;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(caps: Capabilities) -> (RenderContext, crossbeam_channel::Receiver<EngineEvent>) {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        (RenderContext::new(48_000, caps, bus).unwrap(), rx)
    }

    #[test]
    fn test_zero_sample_rate_is_fatal() {
        let err = RenderContext::new(0, Capabilities::default(), EventBus::new()).unwrap_err();
        assert_eq!(err.error_code(), "CONTEXT_CREATION");
    }

    #[test]
    fn test_modulator_mode_memoized() {
        let (mut ctx, rx) = ctx(Capabilities {
            phase_modulators: false,
            ..Capabilities::default()
        });

        assert_eq!(ctx.modulator_mode(), ModulatorMode::Fallback);
        assert_eq!(ctx.modulator_mode(), ModulatorMode::Fallback);

        // Exactly one notification no matter how many LFOs asked
        assert_eq!(rx.len(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::ProcessorLoadFailed
        ));
    }

    #[test]
    fn test_prerender_budget_enforced() {
        let (mut ctx, _rx) = ctx(Capabilities {
            phase_modulators: true,
            prerender_budget_frames: 1_000,
        });

        assert!(ctx.reserve_prerender(600).is_ok());
        let err = ctx.reserve_prerender(600).unwrap_err();
        assert_eq!(err.error_code(), "PRERENDER_BUDGET");
        // The remainder is still claimable
        assert!(ctx.reserve_prerender(400).is_ok());
    }
}
