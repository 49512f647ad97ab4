//! letsplay host — entry point.
//!
//! ```text
//! letsplay-host                    Run with letsplay-host.toml (or defaults)
//! letsplay-host --config <path>    Load a custom config TOML
//! letsplay-host --gen-config       Write default config to stdout
//! letsplay-host --write-config     Write default config to the --config path
//! letsplay-host --game <path>      Override the game image
//! letsplay-host --demo-users <n>   Register n synthetic turn-takers
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use letsplay_host::config::HostConfig;
use letsplay_host::service::HostService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "letsplay-host", about = "Headless shared emulator session host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "letsplay-host.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the `--config` path and exit.
    #[arg(long, conflicts_with = "gen_config")]
    write_config: bool,

    /// Game image to load instead of the configured one.
    #[arg(short, long)]
    game: Option<PathBuf>,

    /// Number of demo users that keep requesting turns.
    #[arg(long)]
    demo_users: Option<u32>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --write-config: bootstrap a config file and exit.
    if cli.write_config {
        HostConfig::write_default(&cli.config)?;
        println!("Default config written to {}.", cli.config.display());
        return Ok(());
    }

    // Load config, then apply CLI overrides.
    let mut config = HostConfig::load(&cli.config);
    if let Some(game) = cli.game {
        config.game.path = game.display().to_string();
    }
    if let Some(n) = cli.demo_users {
        config.demo.users = n;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("letsplay-host v{}", env!("CARGO_PKG_VERSION"));
    info!("session: {}", config.game.emu_id);
    info!(
        "game: {}",
        if config.game.path.is_empty() { "<built-in>" } else { &config.game.path }
    );
    info!("turn length: {}s", config.session.turn_length().as_secs());
    info!("demo users: {}", config.demo.users);

    let service = HostService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_config_uses_config_path() {
        let cli = Cli::try_parse_from(["letsplay-host", "--write-config", "-c", "host.toml"]).unwrap();
        assert!(cli.write_config);
        assert_eq!(cli.config, PathBuf::from("host.toml"));
    }

    #[test]
    fn write_and_gen_config_conflict() {
        assert!(Cli::try_parse_from(["letsplay-host", "--write-config", "--gen-config"]).is_err());
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::try_parse_from(["letsplay-host", "--game", "rom.bin", "--demo-users", "3"])
            .unwrap();
        assert_eq!(cli.game, Some(PathBuf::from("rom.bin")));
        assert_eq!(cli.demo_users, Some(3));
        assert!(!cli.write_config);
    }
}
