//! Agent implementation - drives the extract -> generate -> check loop

use matchreport_error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::facts::{extract_facts, FactSet, MatchPayload};
use crate::generator::{GenerationRequest, ReportGenerator, Revision};
use crate::grounding::untraceable_numbers;
use crate::length::{LengthGate, LengthVerdict};

/// Where the pipeline is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Extracting,
    Generating,
    Checking,
    Retrying,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Extracting => "Extracting",
            PipelineState::Generating => "Generating",
            PipelineState::Checking => "Checking",
            PipelineState::Retrying => "Retrying",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub attempt: usize,
    pub note: String,
}

/// Accepted report
#[derive(Debug, Clone)]
pub struct Report {
    pub text: String,
    pub verdict: LengthVerdict,
    /// Generation calls made, including the accepted one
    pub attempts: usize,
    pub facts: FactSet,
    /// Numbers in the text that the facts do not account for
    pub ungrounded: Vec<String>,
}

/// Work still to do after extraction; each variant carries what its step needs.
enum Step {
    Generating { attempt: usize, revision: Option<Revision> },
    Checking { attempt: usize, draft: String },
    Retrying { attempt: usize, revision: Revision },
}

/// The report agent - validates the match, asks the generator for a draft
/// and keeps asking until the draft fits the word range or the retry cap is hit.
pub struct ReportAgent<G> {
    generator: G,
    gate: LengthGate,
    config: AgentConfig,
    trace: Vec<Transition>,
}

impl<G: ReportGenerator> ReportAgent<G> {
    pub fn new(generator: G, config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let gate = LengthGate::new(config.min_words, config.max_words)?;
        Ok(Self {
            generator,
            gate,
            config,
            trace: Vec::new(),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// State changes of the most recent run
    pub fn trace(&self) -> &[Transition] {
        &self.trace
    }

    /// Final state of the most recent run, if it finished
    pub fn final_state(&self) -> Option<PipelineState> {
        self.trace.last().map(|t| t.to)
    }

    /// Run on a natural-language instruction that embeds the match JSON
    pub async fn run_instruction(&mut self, instruction: &str) -> Result<Report> {
        self.trace.clear();
        match MatchPayload::from_instruction(instruction) {
            Ok(payload) => self.run_payload(payload).await,
            Err(err) => Err(self.fail_extraction(err)),
        }
    }

    /// Run on a JSON payload (wrapped or bare match record)
    pub async fn run(&mut self, payload: &Value) -> Result<Report> {
        self.trace.clear();
        match MatchPayload::from_value(payload) {
            Ok(payload) => self.run_payload(payload).await,
            Err(err) => Err(self.fail_extraction(err)),
        }
    }

    async fn run_payload(&mut self, payload: MatchPayload) -> Result<Report> {
        let facts = match extract_facts(payload.record()) {
            Ok(facts) => facts,
            Err(err) => return Err(self.fail_extraction(err)),
        };
        self.record(PipelineState::Extracting, PipelineState::Generating, 0, "facts validated");

        let mut step = Step::Generating { attempt: 1, revision: None };
        loop {
            step = match step {
                Step::Generating { attempt, revision } => {
                    let request = GenerationRequest {
                        facts: &facts,
                        attempt,
                        revision: revision.as_ref(),
                    };
                    let draft = match self.generator.generate(&request).await {
                        Ok(draft) => draft,
                        Err(err) => {
                            self.record(PipelineState::Generating, PipelineState::Failed, attempt, err.message());
                            return Err(err.with_operation("agent::run"));
                        }
                    };
                    self.record(PipelineState::Generating, PipelineState::Checking, attempt, "draft received");
                    Step::Checking { attempt, draft }
                }
                Step::Checking { attempt, draft } => {
                    let verdict = self.gate.check(&draft);
                    match verdict.feedback() {
                        None => {
                            self.record(
                                PipelineState::Checking,
                                PipelineState::Done,
                                attempt,
                                format!("{} words accepted", verdict.count),
                            );
                            return Ok(self.accept(draft, verdict, attempt, facts));
                        }
                        Some(feedback) => {
                            warn!(attempt, count = verdict.count, delta = ?verdict.delta, "draft rejected");
                            self.record(
                                PipelineState::Checking,
                                PipelineState::Retrying,
                                attempt,
                                format!("{} words outside {}..={}", verdict.count, verdict.min, verdict.max),
                            );
                            Step::Retrying {
                                attempt,
                                revision: Revision { draft, verdict, feedback },
                            }
                        }
                    }
                }
                Step::Retrying { attempt, revision } => {
                    if attempt > self.config.max_retries {
                        self.record(PipelineState::Retrying, PipelineState::Failed, attempt, "length not convergent");
                        return Err(Error::length_not_convergent(attempt, revision.verdict.count)
                            .with_operation("agent::run")
                            .with_context("min", revision.verdict.min.to_string())
                            .with_context("max", revision.verdict.max.to_string()));
                    }
                    self.record(PipelineState::Retrying, PipelineState::Generating, attempt, revision.feedback.clone());
                    Step::Generating {
                        attempt: attempt + 1,
                        revision: Some(revision),
                    }
                }
            };
        }
    }

    fn accept(&self, text: String, verdict: LengthVerdict, attempts: usize, facts: FactSet) -> Report {
        let ungrounded = untraceable_numbers(&text, &facts);
        if !ungrounded.is_empty() {
            warn!(numbers = ?ungrounded, "report mentions numbers absent from the facts");
        }
        info!(attempts, words = verdict.count, "report accepted");

        Report {
            text,
            verdict,
            attempts,
            facts,
            ungrounded,
        }
    }

    fn fail_extraction(&mut self, err: Error) -> Error {
        self.record(PipelineState::Extracting, PipelineState::Failed, 0, err.message());
        err
    }

    fn record(&mut self, from: PipelineState, to: PipelineState, attempt: usize, note: impl Into<String>) {
        let note = note.into();
        debug!(%from, %to, attempt, note = %note, "transition");
        self.trace.push(Transition { from, to, attempt, note });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FnGenerator;
    use matchreport_error::ErrorKind;
    use serde_json::json;
    use std::cell::RefCell;

    fn derby() -> Value {
        json!({
            "date": "2024-05-01",
            "home_team": { "name": "Sparta", "score": 2 },
            "away_team": { "name": "Slavia", "score": 1 },
            "events": [],
            "penalty_shootout": []
        })
    }

    /// A grounded sentence repeated until the draft has `n` words
    fn draft(n: usize) -> String {
        let sentence = ["Sparta", "porazila", "Slavii", "2:1", "dne", "2024-05-01."];
        (0..n).map(|i| sentence[i % sentence.len()]).collect::<Vec<_>>().join(" ")
    }

    fn states(agent: &ReportAgent<impl ReportGenerator>) -> Vec<(PipelineState, PipelineState)> {
        agent.trace().iter().map(|t| (t.from, t.to)).collect()
    }

    #[tokio::test]
    async fn test_first_draft_accepted() {
        let mut agent = ReportAgent::new(
            FnGenerator::new(|_: &GenerationRequest<'_>| Ok(draft(300))),
            AgentConfig::default(),
        )
        .unwrap();

        let report = agent.run(&derby()).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.verdict.count, 300);
        assert!(report.ungrounded.is_empty());
        assert!(!report.facts.has_cards);
        assert_eq!(
            states(&agent),
            vec![
                (PipelineState::Extracting, PipelineState::Generating),
                (PipelineState::Generating, PipelineState::Checking),
                (PipelineState::Checking, PipelineState::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_short_then_long_then_ok() {
        let seen = RefCell::new(Vec::new());
        let mut lengths = vec![200, 350, 300].into_iter();
        let generator = FnGenerator::new(|request: &GenerationRequest<'_>| {
            seen.borrow_mut().push(request.revision.map(|r| r.verdict.clone()));
            Ok(draft(lengths.next().unwrap_or(0)))
        });
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();

        let report = agent.run(&derby()).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(agent.final_state(), Some(PipelineState::Done));
        drop(agent);

        let seen = seen.into_inner();
        assert!(seen[0].is_none());
        assert_eq!(seen[1].as_ref().and_then(|v| v.shortfall()), Some(60));
        assert_eq!(seen[2].as_ref().and_then(|v| v.excess()), Some(10));
    }

    #[tokio::test]
    async fn test_missing_date_never_generates() {
        let calls = RefCell::new(0);
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| {
            *calls.borrow_mut() += 1;
            Ok(draft(300))
        });
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();

        let mut record = derby();
        record.as_object_mut().unwrap().remove("date");
        let err = agent.run(&record).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.message().contains("'date'"));
        assert_eq!(states(&agent), vec![(PipelineState::Extracting, PipelineState::Failed)]);
        drop(agent);
        assert_eq!(calls.into_inner(), 0);
    }

    #[tokio::test]
    async fn test_retry_cap() {
        let calls = RefCell::new(0);
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| {
            *calls.borrow_mut() += 1;
            Ok(draft(100))
        });
        let config = AgentConfig {
            max_retries: 2,
            ..AgentConfig::default()
        };
        let mut agent = ReportAgent::new(generator, config).unwrap();

        let err = agent.run(&derby()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LengthNotConvergent);
        assert_eq!(err.message(), "length not convergent");
        assert!(err.context().contains(&("last_count", "100".to_string())));
        assert_eq!(agent.final_state(), Some(PipelineState::Failed));
        assert_eq!(
            agent.trace().last().map(|t| t.from),
            Some(PipelineState::Retrying)
        );
        drop(agent);
        assert_eq!(calls.into_inner(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| Ok(draft(400)));
        let config = AgentConfig {
            max_retries: 0,
            ..AgentConfig::default()
        };
        let mut agent = ReportAgent::new(generator, config).unwrap();
        let err = agent.run(&derby()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LengthNotConvergent);
        assert!(err.context().contains(&("attempts", "1".to_string())));
    }

    #[tokio::test]
    async fn test_generator_error_propagates() {
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| {
            Err(Error::inference_failed("upstream timeout").temporary())
        });
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();

        let err = agent.run(&derby()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(err.is_retryable());
        assert_eq!(
            states(&agent).last(),
            Some(&(PipelineState::Generating, PipelineState::Failed))
        );
    }

    #[tokio::test]
    async fn test_run_instruction() {
        let generator = FnGenerator::new(|request: &GenerationRequest<'_>| {
            assert_eq!(request.facts.full_time_score, "2:1");
            Ok(draft(280))
        });
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();

        let instruction = format!("Vytvoř report z následujících dat: match_json:{}", derby());
        let report = agent.run_instruction(&instruction).await.unwrap();
        assert_eq!(report.verdict.count, 280);
    }

    #[tokio::test]
    async fn test_trace_reset_between_runs() {
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| Ok(draft(300)));
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();

        agent.run(&derby()).await.unwrap();
        agent.run(&json!({ "match_json": "nope" })).await.unwrap_err();
        assert_eq!(states(&agent), vec![(PipelineState::Extracting, PipelineState::Failed)]);
    }

    #[tokio::test]
    async fn test_ungrounded_numbers_reported() {
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| {
            Ok(format!("{} Na stadionu bylo 18000 diváků.", draft(290)))
        });
        let mut agent = ReportAgent::new(generator, AgentConfig::default()).unwrap();
        let report = agent.run(&derby()).await.unwrap();
        assert_eq!(report.ungrounded, vec!["18000"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AgentConfig {
            min_words: 500,
            max_words: 100,
            ..AgentConfig::default()
        };
        let generator = FnGenerator::new(|_: &GenerationRequest<'_>| Ok(String::new()));
        assert!(ReportAgent::new(generator, config).is_err());
    }
}
