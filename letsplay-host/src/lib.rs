//! # letsplay-host — Headless Session Host
//!
//! Runs one shared emulator session without a serving layer. Frames
//! and turn notices go to the log, which makes the host useful for
//! watching the scheduler and the frame pipeline in isolation.
//!
//! ## Parts
//!
//! - **config**: TOML `HostConfig` with defaults for every section.
//! - **pattern**: `TestPatternCore`, a built-in core that draws a
//!   scrolling gradient.
//! - **broadcast**: `LogBroadcaster`, a sink that logs and counts.
//! - **service**: `HostService`, which boots the session, drives the
//!   demo users and shuts everything down on request.

pub mod broadcast;
pub mod config;
pub mod pattern;
pub mod service;
