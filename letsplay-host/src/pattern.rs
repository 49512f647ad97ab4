//! Built-in emulator core that draws a scrolling gradient.
//!
//! Lets the host run end to end without a real emulator. The pattern
//! is seeded from the game image, so two different images produce
//! visibly different output.

use std::sync::Arc;

use bytes::Bytes;
use letsplay_core::{
    AvInfo, CoreCallbacks, EnvironmentCommand, GameInfo, RetroCore, RetroPixelFormat,
    SessionError, SystemInfo,
};
use tracing::debug;

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 144;
pub const FPS: f64 = 60.0;
pub const SAMPLE_RATE: f64 = 44_100.0;

const BYTES_PER_PIXEL: usize = 4;
const PITCH: usize = WIDTH as usize * BYTES_PER_PIXEL;

// ── TestPatternCore ──────────────────────────────────────────────

pub struct TestPatternCore {
    callbacks: Option<Arc<dyn CoreCallbacks>>,
    seed: u8,
    frame: u64,
    silence: Vec<i16>,
}

impl TestPatternCore {
    pub fn new() -> Self {
        let samples_per_frame = (SAMPLE_RATE / FPS) as usize;
        Self {
            callbacks: None,
            seed: 0,
            frame: 0,
            silence: vec![0; samples_per_frame * 2],
        }
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Render the current frame as XRGB8888 (`B G R X` in memory).
    fn render(&self) -> Vec<u8> {
        let shift = self.frame as usize;
        let seed = self.seed as usize;
        let mut buf = vec![0u8; PITCH * HEIGHT as usize];

        for y in 0..HEIGHT as usize {
            let row = &mut buf[y * PITCH..(y + 1) * PITCH];
            for x in 0..WIDTH as usize {
                let px = &mut row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL];
                px[0] = ((x ^ y) + seed) as u8;
                px[1] = (y + shift / 2) as u8;
                px[2] = (x + shift + seed) as u8;
            }
        }
        buf
    }
}

impl Default for TestPatternCore {
    fn default() -> Self {
        Self::new()
    }
}

impl RetroCore for TestPatternCore {
    fn set_callbacks(&mut self, callbacks: Arc<dyn CoreCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn init(&mut self) -> Result<(), SessionError> {
        let Some(cb) = &self.callbacks else {
            return Err(SessionError::CoreInit("callbacks not installed".into()));
        };
        let format = RetroPixelFormat::Xrgb8888 as u32;
        if !cb.environment(EnvironmentCommand::SetPixelFormat(format)) {
            return Err(SessionError::CoreInit("XRGB8888 not accepted".into()));
        }
        Ok(())
    }

    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            library_name: "testpattern".into(),
            library_version: env!("CARGO_PKG_VERSION").into(),
            valid_extensions: Vec::new(),
            need_fullpath: false,
        }
    }

    fn load_game(&mut self, game: &GameInfo) -> bool {
        let Some(data) = &game.data else {
            return false;
        };
        self.seed = data.iter().fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(*b));
        debug!("test pattern seeded with {:#04x}", self.seed);
        true
    }

    fn av_info(&self) -> AvInfo {
        AvInfo {
            base_width: WIDTH,
            base_height: HEIGHT,
            fps: FPS,
            sample_rate: SAMPLE_RATE,
        }
    }

    fn run(&mut self) {
        let Some(cb) = self.callbacks.clone() else {
            return;
        };

        cb.poll_input();
        let frame = Bytes::from(self.render());
        cb.video_refresh(Some(frame), WIDTH, HEIGHT, PITCH);
        cb.audio_sample_batch(&self.silence);
        self.frame += 1;
    }
}

// ── Tests ────────────────────────────────────────────────────────
