//! # matchreport-agent
//!
//! The agent turns one football match record into a prose report:
//! 1. The fact extractor validates the record and annotates it with flags
//! 2. A report generator (usually an LLM provider) writes a draft from the facts
//! 3. The length gate counts words and either accepts the draft or produces
//!    feedback for a revision
//! 4. Revisions repeat until the draft fits or the retry cap is reached
//!
//! The generator is injected, so the whole loop runs against a deterministic
//! closure in tests.

mod agent;
mod config;
mod facts;
mod generator;
mod grounding;
mod length;
mod prompt;

pub use agent::{PipelineState, Report, ReportAgent, Transition};
pub use config::AgentConfig;
pub use facts::{
    extract_facts, EventKind, FactSet, MatchEvent, MatchPayload, Minute, ShootoutKick, TeamFacts,
};
pub use generator::{FnGenerator, GenerationRequest, ProviderGenerator, ReportGenerator, Revision};
pub use grounding::untraceable_numbers;
pub use length::{count_words, LengthGate, LengthStatus, LengthVerdict, DEFAULT_MAX_WORDS, DEFAULT_MIN_WORDS};
pub use prompt::PromptBuilder;
