//! steprig — command translation and session state machine for a
//! pointer/key driven stepper-motor rig
//!
//! Raw events from a presentation layer (pointer samples, key edges, speed
//! submissions, connect/disconnect requests) are translated into
//! single-character motion commands for an external controller on a serial
//! link. The core guarantees:
//!
//! - exactly one of Up/Down/Left/Right/Stop is commanded at any time, with
//!   redundant transmissions suppressed,
//! - motion is force-stopped after an inactivity window, on pointer leave
//!   and before every disconnect,
//! - both input modalities funnel through one transmit path, so they can
//!   never leave the motor in an inconsistent commanded state.
//!
//! [`session::SessionHandle`] is the entry point; everything else is the
//! machinery behind it.

pub mod config;
pub mod link;
pub mod mapping;
pub mod session;

pub use config::RigSettings;
pub use link::{available_ports, ChannelError, CommandChannel, MotionToken};
pub use mapping::{KeyDirection, MotionMapper, PointerSample, SpeedCommand, SpeedError};
pub use session::{InputEvent, SessionError, SessionHandle, SessionState, SessionStatus};
