//! The boundary between a session and an emulator core.
//!
//! A core is a black box that renders frames and polls input. Whatever
//! binds the actual shared object (symbol loading, `extern "C"`
//! trampolines) implements [`RetroCore`] and forwards the core's
//! callbacks into the [`CoreCallbacks`] object it was handed. Because
//! that object is an `Arc` owned by one session, several sessions can
//! run side by side without any process-wide callback table.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::SessionError;

/// libretro `RETRO_ENVIRONMENT_SET_PIXEL_FORMAT`.
pub const ENV_SET_PIXEL_FORMAT: u32 = 10;
/// libretro `RETRO_ENVIRONMENT_SET_SYSTEM_AV_INFO`.
pub const ENV_SET_SYSTEM_AV_INFO: u32 = 32;

// ── Core metadata ────────────────────────────────────────────────

/// Static description of a core, queried before loading a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    /// File extensions the core accepts, without dots.
    pub valid_extensions: Vec<String>,
    /// The core opens the game itself and only wants its path.
    pub need_fullpath: bool,
}

/// Timing and geometry reported after a game is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvInfo {
    pub base_width: u32,
    pub base_height: u32,
    /// Native emulation rate.
    pub fps: f64,
    pub sample_rate: f64,
}

impl AvInfo {
    /// Wall-clock time of one emulated frame. Nonsense rates fall back to 60 Hz.
    pub fn frame_time(&self) -> std::time::Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            60.0
        };
        std::time::Duration::from_secs_f64(1.0 / fps)
    }
}

impl Default for AvInfo {
    fn default() -> Self {
        Self {
            base_width: 0,
            base_height: 0,
            fps: 60.0,
            sample_rate: 44_100.0,
        }
    }
}

/// A game handed to [`RetroCore::load_game`].
#[derive(Debug, Clone, Default)]
pub struct GameInfo {
    pub path: Option<PathBuf>,
    /// Image contents; `None` when the core loads from `path` itself.
    pub data: Option<Bytes>,
}

// ── Environment ──────────────────────────────────────────────────

/// Environment requests a core may issue.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentCommand {
    /// Raw `retro_pixel_format` value.
    SetPixelFormat(u32),
    SetSystemAvInfo(AvInfo),
    /// Any other command id; always declined.
    Other(u32),
}

impl EnvironmentCommand {
    pub fn id(&self) -> u32 {
        match self {
            EnvironmentCommand::SetPixelFormat(_) => ENV_SET_PIXEL_FORMAT,
            EnvironmentCommand::SetSystemAvInfo(_) => ENV_SET_SYSTEM_AV_INFO,
            EnvironmentCommand::Other(id) => *id,
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// Entry points a core calls on its own thread.
pub trait CoreCallbacks: Send + Sync {
    /// Returns `true` if the command was understood and applied.
    fn environment(&self, command: EnvironmentCommand) -> bool;

    /// A new frame. `None` repeats the previous one.
    fn video_refresh(&self, data: Option<Bytes>, width: u32, height: u32, pitch: usize);

    fn poll_input(&self);

    fn input_state(&self, port: u32, device: u32, index: u32, id: u32) -> i16;

    fn audio_sample(&self, left: i16, right: i16);

    /// Interleaved stereo samples. Returns the number of frames consumed.
    fn audio_sample_batch(&self, samples: &[i16]) -> usize;
}

/// A bound emulator core.
///
/// Calls happen in a fixed order: [`set_callbacks`](Self::set_callbacks),
/// [`init`](Self::init), [`system_info`](Self::system_info),
/// [`load_game`](Self::load_game), [`av_info`](Self::av_info), then
/// [`run`](Self::run) repeatedly on a dedicated thread.
pub trait RetroCore: Send + 'static {
    fn set_callbacks(&mut self, callbacks: Arc<dyn CoreCallbacks>);

    fn init(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn system_info(&self) -> SystemInfo;

    /// Returns `false` if the core refused the game.
    fn load_game(&mut self, game: &GameInfo) -> bool;

    fn av_info(&self) -> AvInfo;

    /// Emulate one frame, invoking callbacks as it goes.
    fn run(&mut self);

    fn deinit(&mut self) {}
}
