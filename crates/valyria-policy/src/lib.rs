//! # valyria-policy
//!
//! The process-wide operating mode and the gate every chat message and
//! explicit tool request passes through before Valyria acts on it.

pub mod gate;
pub mod mode;

pub use gate::{POLICY_TEXT, decide, parse_mode, parse_tool};
pub use mode::ModeState;
