//! Session tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of one user's turn in seconds.
    pub turn_length_secs: u64,
    /// A key frame is broadcast at least this often.
    pub key_frame_interval_ms: u64,
    /// Broadcast cadence; 33 ms is roughly 30 fps.
    pub frame_interval_ms: u64,
    /// zstd level for frame payloads.
    pub compression_level: i32,
    /// Don't broadcast delta frames in which nothing changed.
    pub skip_unchanged_deltas: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_length_secs: 20,
            key_frame_interval_ms: 2000,
            frame_interval_ms: 33,
            compression_level: 1,
            skip_unchanged_deltas: true,
        }
    }
}

impl SessionConfig {
    pub fn turn_length(&self) -> Duration {
        Duration::from_secs(self.turn_length_secs.max(1))
    }

    pub fn key_frame_interval(&self) -> Duration {
        Duration::from_millis(self.key_frame_interval_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}
