//! Engine core
//!
//! Audio buffers, the rendering context, and the live session lifecycle
//! controller.

pub mod buffer;
pub mod context;
pub mod session;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use context::{Capabilities, ModulatorMode, RenderContext};
pub use session::{EngineSession, SessionState};
