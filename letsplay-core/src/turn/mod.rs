//! Turn queue and the users it schedules.

pub mod registry;
pub mod scheduler;

pub use registry::{DEFAULT_PONG_TIMEOUT, User, UserId, UserRegistry};
pub use scheduler::TurnScheduler;
