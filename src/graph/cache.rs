//! Pre-render buffer cache
//!
//! The percussive loop, the pad chorus mix and the brain-pulse loop are
//! expensive to synthesize and fully deterministic for a given session seed
//! and sample rate. The cache memoizes them for one rendering-context
//! generation: a live session clears it when the graph is torn down, and an
//! offline job shares one cache across all of its chunks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::buffer::AudioBuffer;
use crate::error::Result;

/// Identity of each cacheable pre-render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    PadLoop,
    DrumLoop,
    BrainPulseLoop,
}

/// Memoized deterministic waveform buffers
#[derive(Debug, Default)]
pub struct BufferCache {
    entries: HashMap<CacheKey, Arc<AudioBuffer>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a cached buffer, rendering it on first request
    pub fn get_or_insert_with<F>(&mut self, key: CacheKey, render: F) -> Result<Arc<AudioBuffer>>
    where
        F: FnOnce() -> Result<AudioBuffer>,
    {
        if let Some(buffer) = self.entries.get(&key) {
            return Ok(Arc::clone(buffer));
        }
        let buffer = Arc::new(render()?);
        self.entries.insert(key, Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Invalidate everything; called when the rendering context goes away
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
