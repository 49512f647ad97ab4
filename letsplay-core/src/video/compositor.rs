//! Key/delta frame production from a core's native framebuffer.
//!
//! The core hands over its framebuffer through
//! [`FrameCompositor::on_video_refresh`]; nothing is decoded at that
//! point. Decoding happens lazily in
//! [`capture_frame`](FrameCompositor::capture_frame), which either emits
//! a full opaque key frame (and retains it) or a translucent delta frame
//! whose opaque pixels are exactly the ones that differ from the
//! retained key frame.
//!
//! All video state lives behind one mutex. The lock is held for the
//! decode/compare pass only; no I/O happens under it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::video::format::{RetroPixelFormat, VideoFormat};
use crate::video::frame::{FrameBuffer, Pixels, Rgb, Rgba};

// ── Geometry ─────────────────────────────────────────────────────

/// Dimensions last reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub pitch: usize,
}

impl Geometry {
    /// Minimum source length able to hold this geometry.
    fn required_len(&self, bytes_per_pixel: usize) -> usize {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.pitch + self.width as usize * bytes_per_pixel
    }
}

struct VideoState {
    format: VideoFormat,
    geometry: Geometry,
    key_frame: FrameBuffer,
    source: Option<Bytes>,
    /// Geometry changed since the last key frame; viewers hold a
    /// picture of the wrong size, so deltas are meaningless.
    force_key_frame: bool,
}

// ── FrameCompositor ──────────────────────────────────────────────

/// Owner of the retained key frame and the negotiated pixel format.
pub struct FrameCompositor {
    state: Mutex<VideoState>,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VideoState {
                format: VideoFormat::default(),
                geometry: Geometry::default(),
                key_frame: FrameBuffer::empty(),
                source: None,
                force_key_frame: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VideoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently negotiated pixel format.
    pub fn format(&self) -> VideoFormat {
        self.lock().format
    }

    pub fn geometry(&self) -> Geometry {
        self.lock().geometry
    }

    /// Replace the pixel format wholesale.
    pub fn set_format(&self, format: VideoFormat) {
        self.lock().format = format;
    }

    /// Accept a negotiation request carrying a raw libretro format value.
    ///
    /// Unknown values are declined and the current format is kept.
    pub fn negotiate(&self, requested: u32) -> bool {
        match RetroPixelFormat::try_from(requested) {
            Ok(fmt) => {
                info!("pixel format negotiated: {fmt:?}");
                self.set_format(VideoFormat::from_retro(fmt));
                true
            }
            Err(e) => {
                debug!("pixel format rejected: {e}");
                false
            }
        }
    }

    /// Record a new framebuffer from the core.
    ///
    /// A change of width, height or pitch is treated as a scene change:
    /// the retained key frame is flagged for reallocation. `None` means
    /// the core repeated its previous frame, so the old source is kept.
    pub fn on_video_refresh(&self, data: Option<Bytes>, width: u32, height: u32, pitch: usize) {
        let mut state = self.lock();
        let next = Geometry {
            width,
            height,
            pitch,
        };

        if next != state.geometry {
            info!(
                "screen resolution changed from {}x{} to {}x{}",
                state.geometry.width, state.geometry.height, width, height
            );
            state.geometry = next;
            state.key_frame.set_dimensions(width, height);
            state.key_frame.mark_resize();
            state.force_key_frame = true;
        }

        if let Some(data) = data {
            state.source = Some(data);
        }
    }

    /// Produce a key frame (`want_key_frame`) or a delta frame.
    ///
    /// The first capture after a geometry change is always a key frame,
    /// whatever was asked for; check [`FrameBuffer::has_alpha`] to tell
    /// which one came back.
    ///
    /// Returns [`FrameBuffer::empty`] until the core has delivered a
    /// frame, or if the delivered buffer is too short for its geometry.
    pub fn capture_frame(&self, want_key_frame: bool) -> FrameBuffer {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(source) = state.source.as_ref() else {
            return FrameBuffer::empty();
        };

        let format = state.format;
        let geometry = state.geometry;
        let bpp = format.bytes_per_pixel();
        let required = geometry.required_len(bpp);
        if source.len() < required {
            warn!(
                "video buffer too short: {} bytes for {}x{} pitch {} (need {required})",
                source.len(),
                geometry.width,
                geometry.height,
                geometry.pitch
            );
            return FrameBuffer::empty();
        }

        if state.key_frame.needs_resize() {
            state.key_frame.rebuild();
        }
        let want_key_frame = want_key_frame || state.force_key_frame;

        let width = geometry.width as usize;
        let height = geometry.height as usize;

        let pixels = if want_key_frame {
            let mut out = Vec::with_capacity(width * height);
            for h in 0..height {
                let row = &source[h * geometry.pitch..];
                for w in 0..width {
                    out.push(Rgb::from(format.decode_le(&row[w * bpp..w * bpp + bpp])));
                }
            }
            Pixels::Opaque(out)
        } else {
            let baseline = match state.key_frame.pixels() {
                Pixels::Opaque(p) => p.as_slice(),
                Pixels::Translucent(_) => &[],
            };
            let mut out = Vec::with_capacity(width * height);
            for h in 0..height {
                let row = &source[h * geometry.pitch..];
                for w in 0..width {
                    let color = Rgb::from(format.decode_le(&row[w * bpp..w * bpp + bpp]));
                    let unchanged = baseline.get(h * width + w) == Some(&color);
                    out.push(if unchanged {
                        Rgba::TRANSPARENT
                    } else {
                        Rgba::opaque(color)
                    });
                }
            }
            Pixels::Translucent(out)
        };

        let frame = FrameBuffer::from_pixels(geometry.width, geometry.height, pixels);

        if want_key_frame {
            state.key_frame = frame.clone();
            state.force_key_frame = false;
        } else {
            overlay(&frame, &mut state.key_frame);
        }

        frame
    }

    /// Snapshot of what the screen currently looks like: the last key
    /// frame with every delta captured since composited on top.
    pub fn current_screen(&self) -> FrameBuffer {
        self.lock().key_frame.clone()
    }
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Overlay ──────────────────────────────────────────────────────

/// Paint every non-transparent pixel of `foreground` onto `background`.
///
/// `foreground` must be translucent and `background` opaque; otherwise
/// nothing is touched and `false` is returned.
pub fn overlay(foreground: &FrameBuffer, background: &mut FrameBuffer) -> bool {
    let Pixels::Translucent(fg) = foreground.pixels() else {
        debug!("overlay skipped: foreground has no alpha channel");
        return false;
    };
    let Pixels::Opaque(bg) = background.pixels_mut() else {
        debug!("overlay skipped: background is not opaque");
        return false;
    };

    for (dst, src) in bg.iter_mut().zip(fg) {
        if src.a != 0 {
            *dst = src.rgb();
        }
    }
    true
}

// ── Tests ────────────────────────────────────────────────────────
