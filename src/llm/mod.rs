//! Text-completion client for the Anthropic Messages API.

mod client;
mod types;

pub use client::CompletionClient;
pub use types::*;
