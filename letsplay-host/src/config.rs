//! Configuration for the host binary.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use letsplay_core::{GameSource, SessionConfig};

/// Image handed to the built-in core when no game path is configured.
pub const BUILTIN_GAME: &[u8] = b"letsplay test pattern";

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Turn length, frame cadence and payload compression.
    pub session: SessionConfig,
    /// What to run.
    pub game: GameConfig,
    /// Synthetic users.
    pub demo: DemoConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Game settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Session identifier used in notices and logs.
    pub emu_id: String,
    /// Game image path. Empty runs the built-in image.
    pub path: String,
}

/// Demo-user settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of synthetic users to register.
    pub users: u32,
    /// How often each demo user re-requests a turn, in seconds.
    pub request_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            emu_id: "testpattern".into(),
            path: String::new(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            users: 0,
            request_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Where the session should load its game from.
    pub fn game_source(&self) -> GameSource {
        if self.game.path.is_empty() {
            GameSource::Memory(Bytes::from_static(BUILTIN_GAME))
        } else {
            GameSource::Path(PathBuf::from(&self.game.path))
        }
    }

    pub fn request_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.demo.request_interval_secs.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&HostConfig::default()).unwrap();
        assert!(text.contains("[session]"));
        assert!(text.contains("turn_length_secs"));
        assert!(text.contains("emu_id"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&HostConfig::default()).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.session.turn_length_secs, 20);
        assert_eq!(parsed.game.emu_id, "testpattern");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: HostConfig = toml::from_str(
            r#"
            [session]
            turn_length_secs = 45

            [demo]
            users = 3
            "#,
        )
        .unwrap();
        assert_eq!(parsed.session.turn_length_secs, 45);
        assert_eq!(parsed.session.key_frame_interval_ms, 2000);
        assert_eq!(parsed.demo.users, 3);
        assert_eq!(parsed.demo.request_interval_secs, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = HostConfig::load(Path::new("/nonexistent/letsplay-host.toml"));
        assert_eq!(cfg.demo.users, 0);
    }

    #[test]
    fn write_default_then_load() {
        let path = std::env::temp_dir().join(format!("letsplay-host-{}.toml", std::process::id()));
        HostConfig::write_default(&path).unwrap();
        let cfg = HostConfig::load(&path);
        assert_eq!(cfg.game.emu_id, "testpattern");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn game_source_follows_path() {
        let mut cfg = HostConfig::default();
        assert!(matches!(cfg.game_source(), GameSource::Memory(ref b) if b == BUILTIN_GAME));

        cfg.game.path = "/roms/tetris.gb".into();
        match cfg.game_source() {
            GameSource::Path(p) => assert_eq!(p, PathBuf::from("/roms/tetris.gb")),
            other => panic!("expected a path, got {other:?}"),
        }
    }

    #[test]
    fn request_interval_is_clamped() {
        let mut cfg = HostConfig::default();
        cfg.demo.request_interval_secs = 0;
        assert_eq!(cfg.request_interval(), std::time::Duration::from_secs(1));
    }
}
