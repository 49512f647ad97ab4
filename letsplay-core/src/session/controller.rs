//! Session orchestration.
//!
//! [`SessionController`] wires one emulator core to the video pipeline
//! and the turn scheduler, then [`start`](SessionController::start)s
//! three independent cadences:
//!
//! 1. the core's step loop on a dedicated OS thread, paced at the
//!    core's own frame rate;
//! 2. the [`TurnScheduler`] loop;
//! 3. the frame-broadcast timer, which asks the compositor for a key
//!    frame every `key_frame_interval` and a delta frame otherwise.
//!
//! The only state the core thread and the timer share is the
//! compositor's lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::broadcast::{Broadcaster, EmuId, Payload};
use crate::session::retro::{
    AvInfo, CoreCallbacks, EnvironmentCommand, GameInfo, RetroCore, SystemInfo,
};
use crate::turn::{TurnScheduler, UserId, UserRegistry};
use crate::video::{FrameBuffer, FrameCompositor, FrameEncoder, ZstdFrameEncoder};

// ── GameSource ───────────────────────────────────────────────────

/// Where the game image comes from.
#[derive(Debug, Clone)]
pub enum GameSource {
    Path(PathBuf),
    Memory(Bytes),
}

// ── SessionCallbacks ─────────────────────────────────────────────

/// The callback object handed to the core.
pub struct SessionCallbacks {
    compositor: Arc<FrameCompositor>,
}

impl SessionCallbacks {
    pub fn new(compositor: Arc<FrameCompositor>) -> Self {
        Self { compositor }
    }
}

impl CoreCallbacks for SessionCallbacks {
    fn environment(&self, command: EnvironmentCommand) -> bool {
        match command {
            EnvironmentCommand::SetPixelFormat(raw) => self.compositor.negotiate(raw),
            other => {
                trace!("declined environment command {}", other.id());
                false
            }
        }
    }

    fn video_refresh(&self, data: Option<Bytes>, width: u32, height: u32, pitch: usize) {
        self.compositor.on_video_refresh(data, width, height, pitch);
    }

    fn poll_input(&self) {}

    fn input_state(&self, _port: u32, _device: u32, _index: u32, _id: u32) -> i16 {
        0
    }

    fn audio_sample(&self, _left: i16, _right: i16) {}

    fn audio_sample_batch(&self, samples: &[i16]) -> usize {
        samples.len() / 2
    }
}

// ── SessionProxy ─────────────────────────────────────────────────

struct Shared {
    emu: EmuId,
    compositor: Arc<FrameCompositor>,
    scheduler: Arc<TurnScheduler>,
    ready: AtomicBool,
}

/// The handle a serving layer uses to talk to a session.
///
/// Cheap to clone; every clone addresses the same session.
#[derive(Clone)]
pub struct SessionProxy {
    shared: Arc<Shared>,
}

impl SessionProxy {
    pub fn emu_id(&self) -> &EmuId {
        &self.shared.emu
    }

    /// Queue a user for a turn. See [`TurnScheduler::request_turn`].
    pub fn add_turn_request(&self, user: UserId) -> bool {
        self.shared.scheduler.request_turn(user)
    }

    pub fn user_disconnected(&self, user: UserId) {
        self.shared.scheduler.user_disconnected(user);
    }

    pub fn user_connected(&self, user: UserId) {
        self.shared.scheduler.user_connected(user);
    }

    /// Capture a key or delta frame. Empty until the core has drawn.
    pub fn capture_frame(&self, want_key_frame: bool) -> FrameBuffer {
        self.shared.compositor.capture_frame(want_key_frame)
    }

    /// Full picture for a viewer that just joined.
    pub fn current_screen(&self) -> FrameBuffer {
        self.shared.compositor.current_screen()
    }

    /// `false` until bootstrap has completed, and again after shutdown.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> &Arc<TurnScheduler> {
        &self.shared.scheduler
    }
}

// ── SessionController ────────────────────────────────────────────

/// Builds and boots a session.
pub struct SessionController {
    config: SessionConfig,
    shared: Arc<Shared>,
    broadcaster: Arc<dyn Broadcaster>,
    encoder: Arc<dyn FrameEncoder>,
}

impl SessionController {
    pub fn new(
        emu: EmuId,
        config: SessionConfig,
        registry: Arc<UserRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let scheduler = Arc::new(TurnScheduler::new(
            emu.clone(),
            config.turn_length(),
            registry,
            Arc::clone(&broadcaster),
        ));
        let encoder = Arc::new(ZstdFrameEncoder::new(config.compression_level));

        Self {
            config,
            shared: Arc::new(Shared {
                emu,
                compositor: Arc::new(FrameCompositor::new()),
                scheduler,
                ready: AtomicBool::new(false),
            }),
            broadcaster,
            encoder,
        }
    }

    /// Replace the default zstd payload encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn proxy(&self) -> SessionProxy {
        SessionProxy {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Boot the core and start every loop.
    ///
    /// Order: callbacks → init → load game → AV info → loops. Any
    /// failure aborts this session only; nothing has been spawned yet.
    /// Core calls run on the blocking pool, since loading a game can
    /// take a while.
    pub async fn start<C: RetroCore>(
        self,
        core: C,
        game: GameSource,
    ) -> Result<Session, SessionError> {
        let emu = self.shared.emu.clone();

        let callbacks: Arc<dyn CoreCallbacks> = Arc::new(SessionCallbacks::new(Arc::clone(
            &self.shared.compositor,
        )));
        let (mut core, system) = tokio::task::spawn_blocking(move || {
            let mut core = core;
            core.set_callbacks(callbacks);
            core.init()?;
            let system = core.system_info();
            Ok::<_, SessionError>((core, system))
        })
        .await??;
        info!(
            "{emu}: core {} {}",
            system.library_name, system.library_version
        );

        let game = match load_game_info(game, &system).await {
            Ok(game) => game,
            Err(e) => {
                error!("{emu}: {e}");
                let _ = tokio::task::spawn_blocking(move || core.deinit()).await;
                return Err(e);
            }
        };

        let library_name = system.library_name.clone();
        let (core, av_info) = tokio::task::spawn_blocking(move || {
            if !core.load_game(&game) {
                core.deinit();
                return Err(SessionError::GameRejected(format!(
                    "{library_name} refused the game image"
                )));
            }
            let av_info = core.av_info();
            Ok((core, av_info))
        })
        .await??;
        info!(
            "{emu}: {}x{} @ {:.2} fps",
            av_info.base_width, av_info.base_height, av_info.fps
        );

        let shutdown = CancellationToken::new();

        let scheduler_task = tokio::spawn(Arc::clone(&self.shared.scheduler).run());

        let frame_task = tokio::spawn(broadcast_frames(
            self.proxy(),
            Arc::clone(&self.encoder),
            Arc::clone(&self.broadcaster),
            self.config.clone(),
            shutdown.clone(),
        ));

        let core_token = shutdown.clone();
        let frame_time = av_info.frame_time();
        let core_thread = thread::Builder::new()
            .name(format!("core-{emu}"))
            .spawn(move || drive_core(core, frame_time, core_token));
        let core_thread = match core_thread {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.cancel();
                self.shared.scheduler.shutdown();
                return Err(SessionError::Worker(format!("spawn core thread: {e}")));
            }
        };

        self.shared.ready.store(true, Ordering::SeqCst);
        info!("{emu}: session ready");

        Ok(Session {
            proxy: self.proxy(),
            system,
            av_info,
            shutdown,
            scheduler_task: Some(scheduler_task),
            frame_task: Some(frame_task),
            core_thread: Some(core_thread),
        })
    }
}

// ── Session ──────────────────────────────────────────────────────

/// A running session. Dropping it signals every loop to stop; call
/// [`shutdown`](Self::shutdown) to also wait for them.
pub struct Session {
    proxy: SessionProxy,
    system: SystemInfo,
    av_info: AvInfo,
    shutdown: CancellationToken,
    scheduler_task: Option<JoinHandle<()>>,
    frame_task: Option<JoinHandle<()>>,
    core_thread: Option<thread::JoinHandle<()>>,
}

impl Session {
    pub fn proxy(&self) -> SessionProxy {
        self.proxy.clone()
    }

    pub fn emu_id(&self) -> &EmuId {
        self.proxy.emu_id()
    }

    pub fn system_info(&self) -> &SystemInfo {
        &self.system
    }

    pub fn av_info(&self) -> AvInfo {
        self.av_info
    }

    fn signal_stop(&self) {
        self.proxy.shared.ready.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        self.proxy.shared.scheduler.shutdown();
    }

    /// Stop all loops and wait for them to exit.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.signal_stop();

        if let Some(task) = self.scheduler_task.take() {
            task.await?;
        }
        if let Some(task) = self.frame_task.take() {
            task.await?;
        }
        if let Some(handle) = self.core_thread.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await?
                .map_err(|_| SessionError::Worker("core thread panicked".into()))?;
        }

        info!("{}: session stopped", self.emu_id());
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

// ── Internal ─────────────────────────────────────────────────────

async fn load_game_info(game: GameSource, system: &SystemInfo) -> Result<GameInfo, SessionError> {
    match game {
        GameSource::Path(path) if system.need_fullpath => {
            tokio::fs::metadata(&path)
                .await
                .map_err(|source| SessionError::GameLoad {
                    path: path.clone(),
                    source,
                })?;
            Ok(GameInfo {
                path: Some(path),
                data: None,
            })
        }
        GameSource::Path(path) => {
            let data = tokio::fs::read(&path)
                .await
                .map_err(|source| SessionError::GameLoad {
                    path: path.clone(),
                    source,
                })?;
            debug!("read {} bytes from {}", data.len(), path.display());
            Ok(GameInfo {
                path: Some(path),
                data: Some(Bytes::from(data)),
            })
        }
        GameSource::Memory(_) if system.need_fullpath => Err(SessionError::GameRejected(format!(
            "{} needs a file path, not an in-memory image",
            system.library_name
        ))),
        GameSource::Memory(data) => Ok(GameInfo {
            path: None,
            data: Some(data),
        }),
    }
}

/// Core thread body: step, then sleep out the rest of the frame.
fn drive_core<C: RetroCore>(mut core: C, frame_time: Duration, shutdown: CancellationToken) {
    while !shutdown.is_cancelled() {
        let started = std::time::Instant::now();
        core.run();
        if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    core.deinit();
}

/// Frame-broadcast timer.
async fn broadcast_frames(
    proxy: SessionProxy,
    encoder: Arc<dyn FrameEncoder>,
    broadcaster: Arc<dyn Broadcaster>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let emu = proxy.emu_id().clone();
    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_key_frame = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let frame = proxy.capture_frame(now >= next_key_frame);

        if frame.is_empty() {
            continue;
        }
        // The compositor may upgrade a delta request after a resize.
        let is_key_frame = !frame.has_alpha();
        if is_key_frame {
            next_key_frame = now + config.key_frame_interval();
        } else if config.skip_unchanged_deltas && !frame.has_changes() {
            continue;
        }

        let payload = match encoder.encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{emu}: frame encoding failed: {e}");
                continue;
            }
        };

        debug!(
            "{emu}: {} frame {}x{} → {} bytes",
            if is_key_frame { "key" } else { "delta" },
            frame.width(),
            frame.height(),
            payload.len()
        );

        if let Err(e) = broadcaster.broadcast(&emu, Payload::Binary(payload)).await {
            warn!("{emu}: frame broadcast failed: {e}");
        }
    }

    debug!("{emu}: frame timer stopped");
}

// ── Tests ────────────────────────────────────────────────────────
