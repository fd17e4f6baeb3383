//! Input classification: pointer displacement, key edges and speed values
//!
//! Everything in this module is pure state-plus-logic; transmission and
//! timing live in [`crate::session`], which feeds classified tokens through
//! the single command channel.

pub mod keys;
pub mod pointer;
pub mod speed;

pub use keys::{KeyDirection, KeyInputController};
pub use pointer::{MotionMapper, PointerSample};
pub use speed::{SpeedCommand, SpeedError};
