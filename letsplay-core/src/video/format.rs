//! Native pixel layouts produced by emulator cores.
//!
//! A [`VideoFormat`] describes how to pull red, green and blue out of a
//! raw little-endian pixel integer and scale each channel to `0..=255`.
//! Cores announce their layout once through environment negotiation;
//! the compositor swaps the whole description in one assignment.

use crate::error::SessionError;

// ── RetroPixelFormat ─────────────────────────────────────────────

/// Pixel layouts a core may request during negotiation.
///
/// Discriminants match the libretro `retro_pixel_format` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RetroPixelFormat {
    /// 16 bits, `0RRRRRGGGGGBBBBB`. The default until a core says otherwise.
    Orgb1555 = 0,
    /// 32 bits, `XXXXXXXXRRRRRRRRGGGGGGGGBBBBBBBB`.
    Xrgb8888 = 1,
    /// 16 bits, `RRRRRGGGGGGBBBBB`.
    Rgb565 = 2,
}

impl TryFrom<u32> for RetroPixelFormat {
    type Error = SessionError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Orgb1555),
            1 => Ok(Self::Xrgb8888),
            2 => Ok(Self::Rgb565),
            other => Err(SessionError::UnknownVariant {
                type_name: "RetroPixelFormat",
                value: other as u64,
            }),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// One colour channel inside a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Channel {
    /// Bits belonging to this channel, in place.
    pub mask: u32,
    /// Offset of the channel's least significant bit.
    pub shift: u8,
    /// Width of the channel in bits.
    pub bits: u8,
}

impl Channel {
    pub const fn new(mask: u32, shift: u8, bits: u8) -> Self {
        Self { mask, shift, bits }
    }

    /// An absent channel. Always decodes to zero.
    pub const fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Largest raw value this channel can hold.
    pub const fn max_value(self) -> u32 {
        match self.bits {
            0 => 0,
            32.. => u32::MAX,
            bits => (1u32 << bits) - 1,
        }
    }

    /// Extract and scale the channel to `0..=255`, rounding to nearest.
    pub fn normalize(self, raw: u32) -> u8 {
        let max = self.max_value() as u64;
        if max == 0 || self.mask == 0 {
            return 0;
        }
        let value = ((raw & self.mask) >> self.shift) as u64;
        ((value.min(max) * 255 + max / 2) / max) as u8
    }
}

// ── VideoFormat ──────────────────────────────────────────────────

/// Complete description of a packed pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    /// Unused by the supported layouts but carried for completeness.
    pub alpha: Channel,
    /// 16 or 32.
    pub bits_per_pixel: u8,
}

impl VideoFormat {
    pub const ORGB1555: Self = Self {
        red: Channel::new(0x7C00, 10, 5),
        green: Channel::new(0x03E0, 5, 5),
        blue: Channel::new(0x001F, 0, 5),
        alpha: Channel::none(),
        bits_per_pixel: 16,
    };

    pub const XRGB8888: Self = Self {
        red: Channel::new(0x00FF_0000, 16, 8),
        green: Channel::new(0x0000_FF00, 8, 8),
        blue: Channel::new(0x0000_00FF, 0, 8),
        alpha: Channel::none(),
        bits_per_pixel: 32,
    };

    pub const RGB565: Self = Self {
        red: Channel::new(0xF800, 11, 5),
        green: Channel::new(0x07E0, 5, 6),
        blue: Channel::new(0x001F, 0, 5),
        alpha: Channel::none(),
        bits_per_pixel: 16,
    };

    pub const fn from_retro(format: RetroPixelFormat) -> Self {
        match format {
            RetroPixelFormat::Orgb1555 => Self::ORGB1555,
            RetroPixelFormat::Xrgb8888 => Self::XRGB8888,
            RetroPixelFormat::Rgb565 => Self::RGB565,
        }
    }

    /// Bytes one source pixel occupies: 2 for 16-bit layouts, else 4.
    pub const fn bytes_per_pixel(&self) -> usize {
        if self.bits_per_pixel == 16 { 2 } else { 4 }
    }

    /// Decode a raw pixel into normalised `(r, g, b)`.
    #[inline]
    pub fn decode(&self, raw: u32) -> (u8, u8, u8) {
        (
            self.red.normalize(raw),
            self.green.normalize(raw),
            self.blue.normalize(raw),
        )
    }

    /// Read one little-endian pixel from `bytes` and decode it.
    ///
    /// `bytes` must hold at least [`bytes_per_pixel`](Self::bytes_per_pixel)
    /// bytes; missing bytes read as zero.
    #[inline]
    pub fn decode_le(&self, bytes: &[u8]) -> (u8, u8, u8) {
        let mut raw = 0u32;
        for (i, b) in bytes.iter().take(self.bytes_per_pixel()).enumerate() {
            raw |= (*b as u32) << (8 * i);
        }
        self.decode(raw)
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::ORGB1555
    }
}

impl From<RetroPixelFormat> for VideoFormat {
    fn from(format: RetroPixelFormat) -> Self {
        Self::from_retro(format)
    }
}

// ── Tests ────────────────────────────────────────────────────────
