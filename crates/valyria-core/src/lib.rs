//! # valyria-core
//!
//! Core types, traits, and primitives for the Valyria guardian service.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{Result, ValyriaError};
pub use message::{Message, MessageContent, Role};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolResult};
pub use types::*;
