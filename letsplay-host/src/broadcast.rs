//! Broadcast sink that writes to the log.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use letsplay_core::{Broadcaster, EmuId, Payload, SessionError};
use tracing::{debug, info};

/// Logs every notice and counts frame traffic.
#[derive(Debug, Default)]
pub struct LogBroadcaster {
    notices: AtomicU64,
    frames: AtomicU64,
    frame_bytes: AtomicU64,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text notices delivered.
    pub fn notices(&self) -> u64 {
        self.notices.load(Ordering::Relaxed)
    }

    /// Binary frame payloads delivered.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Total size of all frame payloads.
    pub fn frame_bytes(&self) -> u64 {
        self.frame_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn broadcast(&self, emu: &EmuId, payload: Payload) -> Result<(), SessionError> {
        match payload {
            Payload::Text(text) => {
                self.notices.fetch_add(1, Ordering::Relaxed);
                info!("[{emu}] {text}");
            }
            Payload::Binary(bytes) => {
                self.frames.fetch_add(1, Ordering::Relaxed);
                self.frame_bytes
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                debug!("[{emu}] frame payload: {} bytes", bytes.len());
            }
        }
        Ok(())
    }
}
