//! # valyria-runtime
//!
//! Turns a chat message into an answer. The [`Brain`] asks the online model
//! (with the workspace tools attached) and falls back to the rule-based
//! offline brain whenever the model is unavailable.

pub mod brain;
pub mod offline;
pub mod prompt;
pub mod tools;

pub use brain::{Brain, BrainSource, ThinkInput, Thought};
pub use offline::offline_reply;
pub use prompt::{active_rules, detect_text_speak, system_prompt};
pub use tools::WorkspaceTools;
