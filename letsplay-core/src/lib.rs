//! # letsplay-core
//!
//! Engine for sharing one emulated game session among many viewers.
//!
//! This crate contains:
//! - **Video**: `VideoFormat` pixel decoding, `FrameBuffer`, and the
//!   `FrameCompositor` that produces key and delta frames
//! - **Turns**: `UserRegistry` with generation-tagged `UserId`s and the
//!   FIFO `TurnScheduler`
//! - **Session**: the `RetroCore` boundary, `SessionController`
//!   bootstrap, and the `SessionProxy` used by serving layers
//! - **Error**: `SessionError`, the one error enum every fallible call returns

pub mod config;
pub mod error;
pub mod session;
pub mod turn;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{
    AvInfo, Broadcast, Broadcaster, ChannelBroadcaster, CoreCallbacks, EmuId,
    EnvironmentCommand, GameInfo, GameSource, Payload, RetroCore, Session, SessionController,
    SessionProxy, SystemInfo,
};
pub use turn::{TurnScheduler, User, UserId, UserRegistry};
pub use video::{
    FrameBuffer, FrameCompositor, FrameEncoder, Pixels, RetroPixelFormat, Rgb, Rgba,
    VideoFormat, ZstdFrameEncoder, overlay,
};
