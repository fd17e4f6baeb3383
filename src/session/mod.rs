//! Session lifecycle: the actor owning connect/disconnect, the idle
//! watchdog and the single transmit path both input modalities share

pub mod engine;
pub mod handle;
pub mod watchdog;

pub use engine::{InputEvent, SessionError, SessionState, SessionStatus};
pub use handle::SessionHandle;
pub use watchdog::IdleWatchdog;
