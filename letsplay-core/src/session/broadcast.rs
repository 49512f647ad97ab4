//! The "send to everyone in this session" collaborator.
//!
//! Transport is out of scope for this crate: a websocket server, a test
//! harness or the host's log sink all sit behind [`Broadcaster`].

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::SessionError;

// ── EmuId ────────────────────────────────────────────────────────

/// Identifier of one emulator session, stable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmuId(String);

impl EmuId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmuId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EmuId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Payload ──────────────────────────────────────────────────────

/// What gets delivered, with its framing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Human-readable notices (turn start/end).
    Text(String),
    /// Encoded frames.
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(t) => t.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            Payload::Binary(_) => None,
        }
    }
}

// ── Broadcaster ──────────────────────────────────────────────────

/// Delivers a payload to every member of a session.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, emu: &EmuId, payload: Payload) -> Result<(), SessionError>;
}

// ── ChannelBroadcaster ───────────────────────────────────────────

/// One delivered message, as seen by a [`ChannelBroadcaster`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub emu: EmuId,
    pub payload: Payload,
}

/// Forwards every broadcast into an unbounded mpsc channel.
///
/// Useful as the bridge into a serving layer's own fan-out task.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<Broadcast>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Broadcast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn broadcast(&self, emu: &EmuId, payload: Payload) -> Result<(), SessionError> {
        self.tx.send(Broadcast {
            emu: emu.clone(),
            payload,
        })?;
        Ok(())
    }
}
