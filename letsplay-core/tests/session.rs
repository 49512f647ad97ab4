//! Integration tests — full bootstrap with a scripted core, frame
//! broadcasting, turn notices and shutdown.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use letsplay_core::session::{Broadcast, GameInfo};
use letsplay_core::video::encoder::{FRAME_HEADER_SIZE, KIND_DELTA, KIND_KEY};
use letsplay_core::{
    AvInfo, ChannelBroadcaster, CoreCallbacks, EmuId, EnvironmentCommand, GameSource, Payload,
    RetroCore, SessionConfig, SessionController, SessionError, SystemInfo, User, UserRegistry,
};
use tokio::sync::mpsc::UnboundedReceiver;

// ── Helpers ──────────────────────────────────────────────────────

/// A core that negotiates RGB565 and draws a solid frame (4×2 unless
/// resized) whose colour can be changed from the test.
struct ScriptedCore {
    callbacks: Option<Arc<dyn CoreCallbacks>>,
    need_fullpath: bool,
    accept_game: bool,
    color: Arc<Mutex<u16>>,
    size: Arc<Mutex<(u32, u32)>>,
    loaded: Arc<Mutex<Option<GameInfo>>>,
    load_time: Duration,
    frames: u64,
}

impl ScriptedCore {
    fn new() -> Self {
        Self {
            callbacks: None,
            need_fullpath: false,
            accept_game: true,
            color: Arc::new(Mutex::new(0xF800)),
            size: Arc::new(Mutex::new((4, 2))),
            loaded: Arc::new(Mutex::new(None)),
            load_time: Duration::ZERO,
            frames: 0,
        }
    }
}

impl RetroCore for ScriptedCore {
    fn set_callbacks(&mut self, callbacks: Arc<dyn CoreCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            library_name: "scripted".into(),
            library_version: "1.0".into(),
            valid_extensions: vec!["bin".into()],
            need_fullpath: self.need_fullpath,
        }
    }

    fn load_game(&mut self, game: &GameInfo) -> bool {
        std::thread::sleep(self.load_time);
        *self.loaded.lock().unwrap() = Some(game.clone());
        self.accept_game
    }

    fn av_info(&self) -> AvInfo {
        AvInfo {
            base_width: 4,
            base_height: 2,
            fps: 120.0,
            sample_rate: 48_000.0,
        }
    }

    fn run(&mut self) {
        let cb = self.callbacks.as_ref().expect("callbacks set before run");
        if self.frames == 0 {
            assert!(cb.environment(EnvironmentCommand::SetPixelFormat(2)));
            assert!(!cb.environment(EnvironmentCommand::Other(99)));
        }
        self.frames += 1;

        cb.poll_input();
        let color = *self.color.lock().unwrap();
        let (w, h) = *self.size.lock().unwrap();
        let data: Vec<u8> = (0..w * h).flat_map(|_| color.to_le_bytes()).collect();
        cb.video_refresh(Some(Bytes::from(data)), w, h, w as usize * 2);
    }
}

fn controller(
    config: SessionConfig,
) -> (
    SessionController,
    Arc<UserRegistry>,
    UnboundedReceiver<Broadcast>,
) {
    let registry = Arc::new(UserRegistry::new());
    let (broadcaster, rx) = ChannelBroadcaster::new();
    let controller = SessionController::new(
        EmuId::from("emu"),
        config,
        Arc::clone(&registry),
        Arc::new(broadcaster),
    );
    (controller, registry, rx)
}

async fn next_binary(rx: &mut UnboundedReceiver<Broadcast>) -> Bytes {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = rx.recv().await.expect("broadcast channel closed");
            if let Payload::Binary(bytes) = msg.payload {
                return bytes;
            }
        }
    })
    .await
    .expect("no frame broadcast within 5s")
}

async fn next_text(rx: &mut UnboundedReceiver<Broadcast>) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = rx.recv().await.expect("broadcast channel closed");
            if let Payload::Text(text) = msg.payload {
                return text;
            }
        }
    })
    .await
    .expect("no notice within 5s")
}

fn temp_rom(name: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("letsplay-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Bootstrap ────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_broadcasts_key_frame() {
    let (controller, _registry, mut rx) = controller(SessionConfig::default());
    let proxy = controller.proxy();
    assert!(!proxy.is_ready());

    let mut session = tokio_test::assert_ok!(
        controller
            .start(ScriptedCore::new(), GameSource::Memory(Bytes::from_static(b"rom")))
            .await
    );
    assert!(proxy.is_ready());
    assert_eq!(session.emu_id().as_str(), "emu");
    assert_eq!(session.system_info().library_name, "scripted");

    let payload = next_binary(&mut rx).await;
    assert_eq!(&payload[0..4], &4u32.to_le_bytes());
    assert_eq!(&payload[4..8], &2u32.to_le_bytes());
    assert_eq!(payload[8], KIND_KEY);

    let body = zstd::decode_all(&payload[FRAME_HEADER_SIZE..]).unwrap();
    assert_eq!(body.len(), 4 * 2 * 3);
    assert!(body.chunks(3).all(|px| px == [255, 0, 0]));

    tokio_test::assert_ok!(session.shutdown().await);
    assert!(!proxy.is_ready());
}

#[tokio::test]
async fn test_changed_pixels_produce_delta() {
    let config = SessionConfig {
        key_frame_interval_ms: 60_000,
        frame_interval_ms: 10,
        ..Default::default()
    };
    let (controller, _registry, mut rx) = controller(config);
    let core = ScriptedCore::new();
    let color = Arc::clone(&core.color);

    let mut session = controller
        .start(core, GameSource::Memory(Bytes::from_static(b"rom")))
        .await
        .unwrap();

    assert_eq!(next_binary(&mut rx).await[8], KIND_KEY);

    *color.lock().unwrap() = 0x001F;
    let delta = next_binary(&mut rx).await;
    assert_eq!(delta[8], KIND_DELTA);
    let body = zstd::decode_all(&delta[FRAME_HEADER_SIZE..]).unwrap();
    assert!(body.chunks(4).all(|px| px == [0, 0, 255, 255]));

    let screen = session.proxy().current_screen();
    assert_eq!(screen.rgb_at(0).map(|c| (c.r, c.g, c.b)), Some((0, 0, 255)));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_static_screen_only_sends_key_frames() {
    let config = SessionConfig {
        key_frame_interval_ms: 150,
        frame_interval_ms: 10,
        skip_unchanged_deltas: true,
        ..Default::default()
    };
    let (controller, _registry, mut rx) = controller(config);
    let mut session = controller
        .start(ScriptedCore::new(), GameSource::Memory(Bytes::from_static(b"rom")))
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(next_binary(&mut rx).await[8], KIND_KEY);
    }

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_memory_image_reaches_core() {
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let core = ScriptedCore::new();
    let loaded = Arc::clone(&core.loaded);

    let mut session = controller
        .start(core, GameSource::Memory(Bytes::from_static(b"\x01\x02\x03")))
        .await
        .unwrap();

    let game = loaded.lock().unwrap().clone().unwrap();
    assert_eq!(game.data.as_deref(), Some(&b"\x01\x02\x03"[..]));
    assert!(game.path.is_none());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fullpath_core_receives_path_only() {
    let path = temp_rom("fullpath.bin", b"cartridge");
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let mut core = ScriptedCore::new();
    core.need_fullpath = true;
    let loaded = Arc::clone(&core.loaded);

    let mut session = controller
        .start(core, GameSource::Path(path.clone()))
        .await
        .unwrap();

    let game = loaded.lock().unwrap().clone().unwrap();
    assert_eq!(game.path.as_deref(), Some(path.as_path()));
    assert!(game.data.is_none());

    session.shutdown().await.unwrap();
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_path_is_read_for_memory_core() {
    let path = temp_rom("read.bin", b"cartridge");
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let core = ScriptedCore::new();
    let loaded = Arc::clone(&core.loaded);

    let mut session = controller
        .start(core, GameSource::Path(path.clone()))
        .await
        .unwrap();

    let game = loaded.lock().unwrap().clone().unwrap();
    assert_eq!(game.data.as_deref(), Some(&b"cartridge"[..]));

    session.shutdown().await.unwrap();
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_slow_game_load_does_not_stall_runtime() {
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let mut core = ScriptedCore::new();
    core.load_time = Duration::from_millis(300);

    // Current-thread runtime: the ticker only advances while bootstrap
    // yields instead of blocking the thread.
    let ticks = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = Arc::clone(&ticks);
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let mut session = controller
        .start(core, GameSource::Memory(Bytes::from_static(b"rom")))
        .await
        .unwrap();
    ticker.abort();

    let ticks = ticks.load(std::sync::atomic::Ordering::SeqCst);
    assert!(ticks >= 5, "runtime stalled during game load ({ticks} ticks)");

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delta_request_after_resize_yields_key_frame() {
    let config = SessionConfig {
        key_frame_interval_ms: 60_000,
        frame_interval_ms: 10,
        ..Default::default()
    };
    let (controller, _registry, mut rx) = controller(config);
    let core = ScriptedCore::new();
    let size = Arc::clone(&core.size);

    let mut session = controller
        .start(core, GameSource::Memory(Bytes::from_static(b"rom")))
        .await
        .unwrap();
    assert_eq!(next_binary(&mut rx).await[8], KIND_KEY);

    *size.lock().unwrap() = (2, 1);
    let payload = loop {
        let payload = next_binary(&mut rx).await;
        if payload[0..4] == 2u32.to_le_bytes() {
            break payload;
        }
    };
    assert_eq!(&payload[4..8], &1u32.to_le_bytes());
    assert_eq!(payload[8], KIND_KEY);

    session.shutdown().await.unwrap();
}

// ── Error scenarios ──────────────────────────────────────────────

#[tokio::test]
async fn test_missing_game_aborts_bootstrap() {
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let proxy = controller.proxy();

    let result = controller
        .start(
            ScriptedCore::new(),
            GameSource::Path(PathBuf::from("/nonexistent/letsplay/game.bin")),
        )
        .await;

    assert!(matches!(result, Err(SessionError::GameLoad { .. })));
    assert!(!proxy.is_ready());
}

#[tokio::test]
async fn test_rejected_game_aborts_bootstrap() {
    let (controller, _registry, _rx) = controller(SessionConfig::default());
    let mut core = ScriptedCore::new();
    core.accept_game = false;

    let result = controller
        .start(core, GameSource::Memory(Bytes::from_static(b"junk")))
        .await;

    assert!(matches!(result, Err(SessionError::GameRejected(_))));
}

// ── Turns through the proxy ──────────────────────────────────────

#[tokio::test]
async fn test_turn_notices_through_proxy() {
    let config = SessionConfig {
        turn_length_secs: 30,
        ..Default::default()
    };
    let (controller, registry, mut rx) = controller(config);
    let mut session = controller
        .start(ScriptedCore::new(), GameSource::Memory(Bytes::from_static(b"rom")))
        .await
        .unwrap();
    let proxy = session.proxy();

    let alice = registry.insert(User::new("alice"));
    let bob = registry.insert(User::new("bob"));
    proxy.user_connected(alice);
    proxy.user_connected(bob);
    assert!(proxy.add_turn_request(alice));
    assert!(proxy.add_turn_request(bob));

    assert_eq!(next_text(&mut rx).await, "emu: alice now has a turn!");

    registry.remove(alice);
    proxy.user_disconnected(alice);

    assert_eq!(next_text(&mut rx).await, "emu: alice's turn has ended!");
    assert_eq!(next_text(&mut rx).await, "emu: bob now has a turn!");
    assert_eq!(proxy.scheduler().users_connected(), 1);
    assert_eq!(proxy.scheduler().active_user(), Some(bob));

    session.shutdown().await.unwrap();
}
