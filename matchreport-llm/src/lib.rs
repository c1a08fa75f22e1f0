//! # matchreport-llm
//!
//! LLM backends for match report generation.
//!
//! The report agent only needs "messages in, text out"; this crate keeps the
//! HTTP details of each vendor behind the [`LlmProvider`] trait.

pub mod provider;

pub use matchreport_error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError,
    ChatMessage, Role, CompletionRequest, CompletionResponse,
    FinishReason, Usage, UsageTracker,
    OpenAIProvider, AnthropicProvider,
};
