//! # valyria-llm
//!
//! Provider abstraction for the online brain. The production provider talks
//! to the Anthropic Messages API with tool use; the mock provider replays
//! queued responses for tests.

pub mod anthropic;
pub mod mock;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, MockResponse};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
