//! # Session
//!
//! One emulator core shared by many viewers.
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `retro`      | Traits and metadata at the emulator-core boundary    |
//! | `broadcast`  | Session identity and the "send to everyone" seam     |
//! | `controller` | Bootstrap, loops, and the proxy for serving layers   |

pub mod broadcast;
pub mod controller;
pub mod retro;

pub use broadcast::{Broadcast, Broadcaster, ChannelBroadcaster, EmuId, Payload};
pub use controller::{GameSource, Session, SessionCallbacks, SessionController, SessionProxy};
pub use retro::{
    AvInfo, CoreCallbacks, ENV_SET_PIXEL_FORMAT, ENV_SET_SYSTEM_AV_INFO, EnvironmentCommand,
    GameInfo, RetroCore, SystemInfo,
};
