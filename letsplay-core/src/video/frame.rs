//! Decoded frame representations shared by the compositor and encoders.
//!
//! A [`FrameBuffer`] is either a full opaque snapshot (a key frame) or a
//! sparse translucent layer (a delta frame) where `(0, 0, 0, 0)` marks a
//! pixel that has not changed since the retained key frame.

// ── Colours ──────────────────────────────────────────────────────

/// Opaque 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self { r, g, b }
    }
}

/// 8-bit-per-channel colour with coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// The "unchanged" marker used by delta frames.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(color: Rgb) -> Self {
        Self::new(color.r, color.g, color.b, 255)
    }

    pub const fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

// ── Pixels ───────────────────────────────────────────────────────

/// Pixel storage. Exactly one layout is ever allocated per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels {
    Opaque(Vec<Rgb>),
    Translucent(Vec<Rgba>),
}

impl Pixels {
    pub fn len(&self) -> usize {
        match self {
            Pixels::Opaque(p) => p.len(),
            Pixels::Translucent(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Pixels {
    fn default() -> Self {
        Pixels::Opaque(Vec::new())
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// A `width × height` grid of pixels in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Pixels,
    /// Set whenever the dimensions change; cleared by [`rebuild`](Self::rebuild).
    needs_resize: bool,
}

impl FrameBuffer {
    /// The 0×0 frame returned when no video has been produced yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An all-black opaque frame.
    pub fn opaque(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Pixels::Opaque(vec![Rgb::default(); area(width, height)]),
            needs_resize: false,
        }
    }

    /// Wrap pixels that were produced for the given dimensions.
    pub fn from_pixels(width: u32, height: u32, pixels: Pixels) -> Self {
        let needs_resize = pixels.len() != area(width, height);
        Self {
            width,
            height,
            pixels,
            needs_resize,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut Pixels {
        &mut self.pixels
    }

    /// `true` for delta frames.
    pub fn has_alpha(&self) -> bool {
        matches!(self.pixels, Pixels::Translucent(_))
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }

    pub fn needs_resize(&self) -> bool {
        self.needs_resize
    }

    /// Record new dimensions. Storage is left alone until the next
    /// [`rebuild`](Self::rebuild).
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.needs_resize = true;
        }
    }

    /// Force the next write to reallocate, even if the size is unchanged.
    pub fn mark_resize(&mut self) {
        self.needs_resize = true;
    }

    /// Reallocate as a cleared opaque buffer of `width * height` pixels.
    pub fn rebuild(&mut self) {
        self.pixels = Pixels::Opaque(vec![Rgb::default(); area(self.width, self.height)]);
        self.needs_resize = false;
    }

    /// Opaque pixel at `index`, if this is an opaque frame.
    pub fn rgb_at(&self, index: usize) -> Option<Rgb> {
        match &self.pixels {
            Pixels::Opaque(p) => p.get(index).copied(),
            Pixels::Translucent(_) => None,
        }
    }

    /// Whether any pixel differs from the base it would be drawn on.
    ///
    /// Key frames always count as changed; delta frames only when at
    /// least one pixel has non-zero alpha.
    pub fn has_changes(&self) -> bool {
        match &self.pixels {
            Pixels::Opaque(p) => !p.is_empty(),
            Pixels::Translucent(p) => p.iter().any(|px| px.a != 0),
        }
    }

    /// Packed channel bytes: `RGB` triples or `RGBA` quads.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.pixels {
            Pixels::Opaque(p) => p.iter().flat_map(|px| [px.r, px.g, px.b]).collect(),
            Pixels::Translucent(p) => p.iter().flat_map(|px| [px.r, px.g, px.b, px.a]).collect(),
        }
    }
}

fn area(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame() {
        let f = FrameBuffer::empty();
        assert!(f.is_empty());
        assert!(!f.has_alpha());
        assert!(!f.needs_resize());
        assert_eq!(f.pixel_count(), 0);
    }

    #[test]
    fn resize_is_deferred_until_rebuild() {
        let mut f = FrameBuffer::opaque(2, 2);
        f.set_dimensions(3, 2);
        assert!(f.needs_resize());
        assert_eq!(f.pixel_count(), 4);

        f.rebuild();
        assert!(!f.needs_resize());
        assert_eq!(f.pixel_count(), 6);
        assert_eq!(f.rgb_at(5), Some(Rgb::default()));
    }

    #[test]
    fn same_dimensions_do_not_mark_resize() {
        let mut f = FrameBuffer::opaque(4, 4);
        f.set_dimensions(4, 4);
        assert!(!f.needs_resize());
    }

    #[test]
    fn from_pixels_flags_length_mismatch() {
        let f = FrameBuffer::from_pixels(2, 2, Pixels::Opaque(vec![Rgb::default(); 3]));
        assert!(f.needs_resize());
    }

    #[test]
    fn delta_change_detection() {
        let mut px = vec![Rgba::TRANSPARENT; 4];
        let f = FrameBuffer::from_pixels(2, 2, Pixels::Translucent(px.clone()));
        assert!(f.has_alpha());
        assert!(!f.has_changes());

        px[2] = Rgba::opaque(Rgb::new(1, 2, 3));
        let f = FrameBuffer::from_pixels(2, 2, Pixels::Translucent(px));
        assert!(f.has_changes());
    }

    #[test]
    fn to_bytes_packs_channels() {
        let f = FrameBuffer::from_pixels(1, 1, Pixels::Opaque(vec![Rgb::new(1, 2, 3)]));
        assert_eq!(f.to_bytes(), vec![1, 2, 3]);

        let f = FrameBuffer::from_pixels(1, 1, Pixels::Translucent(vec![Rgba::new(4, 5, 6, 7)]));
        assert_eq!(f.to_bytes(), vec![4, 5, 6, 7]);
    }
}
