//! Frame payload encoding with zstd compression.
//!
//! Turns a [`FrameBuffer`] into the binary payload handed to the
//! broadcast layer. Delta frames compress extremely well here because
//! every unchanged pixel is the same `00 00 00 00` run.
//!
//! Payload layout (little-endian):
//!
//! ```text
//! width:    u32
//! height:   u32
//! kind:     u8    (0 = key frame / RGB, 1 = delta frame / RGBA)
//! reserved: [u8; 3]
//! pixels:   zstd(packed RGB or RGBA bytes)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::SessionError;
use crate::video::frame::FrameBuffer;

/// Size of the fixed header preceding the compressed pixels.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Kind byte for key frames.
pub const KIND_KEY: u8 = 0;
/// Kind byte for delta frames.
pub const KIND_DELTA: u8 = 1;

// ── FrameEncoder ─────────────────────────────────────────────────

/// Converts decoded frames into broadcastable bytes.
///
/// Implement this to plug in an image codec (e.g. lossless WebP).
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &FrameBuffer) -> Result<Bytes, SessionError>;
}

// ── ZstdFrameEncoder ─────────────────────────────────────────────

/// Default encoder: fixed header followed by zstd-compressed pixels.
#[derive(Debug, Clone)]
pub struct ZstdFrameEncoder {
    /// zstd level, 1 (fast) ..= 19 (small).
    compression_level: i32,
}

impl ZstdFrameEncoder {
    pub fn new(compression_level: i32) -> Self {
        Self {
            compression_level: compression_level.clamp(1, 19),
        }
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }
}

impl Default for ZstdFrameEncoder {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FrameEncoder for ZstdFrameEncoder {
    fn encode(&self, frame: &FrameBuffer) -> Result<Bytes, SessionError> {
        let raw = frame.to_bytes();
        let compressed = zstd::encode_all(raw.as_slice(), self.compression_level)
            .map_err(|e| SessionError::Encoding(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + compressed.len());
        out.put_u32_le(frame.width());
        out.put_u32_le(frame.height());
        out.put_u8(if frame.has_alpha() { KIND_DELTA } else { KIND_KEY });
        out.put_bytes(0, 3);
        out.extend_from_slice(&compressed);
        Ok(out.freeze())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::{Pixels, Rgb, Rgba};

    #[test]
    fn key_frame_header_and_body() {
        let frame = FrameBuffer::from_pixels(64, 32, Pixels::Opaque(vec![Rgb::new(7, 8, 9); 64 * 32]));
        let payload = ZstdFrameEncoder::default().encode(&frame).unwrap();

        assert_eq!(&payload[0..4], &64u32.to_le_bytes());
        assert_eq!(&payload[4..8], &32u32.to_le_bytes());
        assert_eq!(payload[8], KIND_KEY);

        let body = zstd::decode_all(&payload[FRAME_HEADER_SIZE..]).unwrap();
        assert_eq!(body, frame.to_bytes());
    }

    #[test]
    fn transparent_delta_compresses_well() {
        let frame = FrameBuffer::from_pixels(
            256,
            256,
            Pixels::Translucent(vec![Rgba::TRANSPARENT; 256 * 256]),
        );
        let payload = ZstdFrameEncoder::new(3).encode(&frame).unwrap();

        assert_eq!(payload[8], KIND_DELTA);
        assert!(payload.len() < 256 * 256 * 4 / 100);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZstdFrameEncoder::new(0).compression_level(), 1);
        assert_eq!(ZstdFrameEncoder::new(99).compression_level(), 19);
    }
}
