//! # Video pipeline
//!
//! ```text
//! core thread                         timer / viewers
//! ┌──────────────────┐               ┌──────────────────────────┐
//! │ on_video_refresh │── Bytes ──►   │ FrameCompositor          │
//! └──────────────────┘   (no copy)   │   capture_frame(key?)    │
//!                                    │     ↓ decode VideoFormat │
//!                                    │     ↓ diff vs key frame  │
//!                                    │ FrameEncoder (zstd)      │
//!                                    └──────────────────────────┘
//! ```
//!
//! | Module       | Purpose                                            |
//! |--------------|----------------------------------------------------|
//! | `format`     | Native pixel layouts and channel normalisation     |
//! | `frame`      | Opaque / translucent frame buffers                 |
//! | `compositor` | Key and delta frame capture, overlay compositing   |
//! | `encoder`    | Payload encoding for broadcast                     |

pub mod compositor;
pub mod encoder;
pub mod format;
pub mod frame;

pub use compositor::{FrameCompositor, Geometry, overlay};
pub use encoder::{FrameEncoder, ZstdFrameEncoder};
pub use format::{Channel, RetroPixelFormat, VideoFormat};
pub use frame::{FrameBuffer, Pixels, Rgb, Rgba};
