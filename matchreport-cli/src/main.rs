//! # matchreport CLI
//!
//! Command-line interface for the match report agent.
//!
//! Usage:
//!   matchreport generate [--file match.json] [--provider openai|anthropic|local]
//!   matchreport generate --instruction "Vytvoř report z následujících dat: match_json:{...}"
//!   matchreport facts [--file match.json]
//!   matchreport count [--file report.txt]
//!
//! Input is read from stdin when no file is given.

use clap::{Parser, Subcommand, ValueEnum};
use matchreport_agent::{
    extract_facts, AgentConfig, LengthGate, MatchPayload, ProviderGenerator, ReportAgent,
};
use matchreport_error::{Error, ErrorKind, Result};
use matchreport_llm::{AnthropicProvider, LlmProvider, OpenAIProvider, ProviderConfig};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "matchreport")]
#[command(author, version, about = "matchreport - football match reports from validated facts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show verdicts, the state trace and token usage
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only print the result
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a report from a match record
    Generate {
        /// Match JSON file (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Instruction text with an embedded `match_json:{...}` payload
        #[arg(short, long, conflicts_with = "file")]
        instruction: Option<String>,

        /// LLM backend
        #[arg(short, long, value_enum, default_value = "openai")]
        provider: ProviderKind,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// API base URL override
        #[arg(long)]
        base_url: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Regenerations allowed after the first rejected draft
        #[arg(long)]
        max_retries: Option<usize>,

        #[arg(long)]
        min_words: Option<usize>,

        #[arg(long)]
        max_words: Option<usize>,

        /// Report language
        #[arg(long)]
        language: Option<String>,
    },
    /// Validate a match record and print its fact set
    Facts {
        /// Match JSON file (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Count the words of a text and print the length verdict
    Count {
        /// Text file (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long, default_value = "260")]
        min_words: usize,

        #[arg(long, default_value = "340")]
        max_words: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// OpenAI (needs OPENAI_API_KEY)
    Openai,
    /// Anthropic (needs ANTHROPIC_API_KEY)
    Anthropic,
    /// OpenAI-compatible local server such as Ollama
    Local,
}

/// Overrides from the command line, applied on top of the config file
struct Overrides {
    model: Option<String>,
    max_retries: Option<usize>,
    min_words: Option<usize>,
    max_words: Option<usize>,
    language: Option<String>,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("MATCHREPORT_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).with_context("path", path.display().to_string())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn parse_json(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| {
        Error::parse_failed(format!("Invalid JSON: {}", e))
            .with_operation("cli::parse_json")
            .set_source(e)
    })
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<AgentConfig> {
    let mut config = match path {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(model) = overrides.model {
        config.model = Some(model);
    }
    if let Some(n) = overrides.max_retries {
        config.max_retries = n;
    }
    if let Some(n) = overrides.min_words {
        config.min_words = n;
    }
    if let Some(n) = overrides.max_words {
        config.max_words = n;
    }
    if let Some(language) = overrides.language {
        config.language = language;
    }
    config.validate()?;
    Ok(config)
}

fn api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| {
        Error::config_invalid(format!("set the {} environment variable", var))
            .with_operation("cli::provider")
    })
}

fn provider_config(
    kind: ProviderKind,
    base_url: Option<String>,
    timeout: Option<u64>,
) -> Result<ProviderConfig> {
    let config = match kind {
        ProviderKind::Openai => ProviderConfig::openai(api_key("OPENAI_API_KEY")?),
        ProviderKind::Anthropic => ProviderConfig::anthropic(api_key("ANTHROPIC_API_KEY")?),
        ProviderKind::Local => ProviderConfig::local("http://localhost:11434/v1", "llama3.3"),
    };
    let config = match base_url {
        Some(url) => config.with_base_url(url),
        None => config,
    };
    Ok(match timeout {
        Some(secs) => config.with_timeout(secs),
        None => config,
    })
}

/// Where the match data comes from
enum Input {
    Json(serde_json::Value),
    Instruction(String),
}

impl Input {
    /// JSON when it parses as JSON, otherwise an instruction with embedded JSON
    fn detect(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Input::Json(value),
            Err(_) => Input::Instruction(text),
        }
    }

    /// Validate the match record before any provider is set up
    fn check(&self) -> Result<()> {
        let payload = match self {
            Input::Json(value) => MatchPayload::from_value(value)?,
            Input::Instruction(text) => MatchPayload::from_instruction(text)?,
        };
        extract_facts(payload.record()).map(|_| ())
    }
}

async fn generate_with<P: LlmProvider>(
    provider: P,
    config: AgentConfig,
    input: Input,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        eprintln!(
            "Using {} ({}), target {}-{} words, up to {} retries\n",
            provider.name(),
            config.model.as_deref().unwrap_or(provider.default_model()),
            config.min_words,
            config.max_words,
            config.max_retries
        );
    }

    let generator = ProviderGenerator::new(provider, &config);
    let mut agent = ReportAgent::new(generator, config)?;

    let result = match &input {
        Input::Json(value) => agent.run(value).await,
        Input::Instruction(text) => agent.run_instruction(text).await,
    };

    if verbose {
        eprintln!("--- State Trace ({} transitions) ---", agent.trace().len());
        for t in agent.trace() {
            eprintln!("  [{}] {} -> {}: {}", t.attempt, t.from, t.to, t.note);
        }
        let usage = agent.generator().usage();
        eprintln!(
            "--- Usage: {} calls, {} prompt + {} completion tokens ---\n",
            usage.total_calls, usage.total_prompt_tokens, usage.total_completion_tokens
        );
    }

    let report = result?;
    if verbose {
        eprintln!(
            "Verdict: {}",
            serde_json::to_string(&report.verdict).unwrap_or_default()
        );
    }
    if !report.ungrounded.is_empty() && !quiet {
        eprintln!(
            "Warning: numbers not found in the match data: {}",
            report.ungrounded.join(", ")
        );
    }
    println!("{}", report.text);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        Error::serialization_failed("failed to render JSON")
            .with_operation("cli::print_json")
            .set_source(e)
    })?;
    println!("{}", text);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate {
            file,
            instruction,
            provider,
            model,
            base_url,
            timeout,
            config,
            max_retries,
            min_words,
            max_words,
            language,
        } => {
            let overrides = Overrides {
                model,
                max_retries,
                min_words,
                max_words,
                language,
            };
            let agent_config = load_config(config.as_deref(), overrides)?;
            let input = match instruction {
                Some(text) => Input::Instruction(text),
                None => Input::detect(read_input(file.as_deref())?),
            };

            input.check()?;

            let provider_config = provider_config(provider, base_url, timeout)?;
            match provider {
                ProviderKind::Anthropic => {
                    let provider = AnthropicProvider::new(provider_config)?;
                    generate_with(provider, agent_config, input, cli.verbose, cli.quiet).await
                }
                ProviderKind::Openai | ProviderKind::Local => {
                    let provider = OpenAIProvider::new(provider_config)?;
                    generate_with(provider, agent_config, input, cli.verbose, cli.quiet).await
                }
            }
        }
        Commands::Facts { file } => {
            let value = parse_json(&read_input(file.as_deref())?)?;
            let payload = MatchPayload::from_value(&value)?;
            let facts = extract_facts(payload.record())?;
            print_json(&facts)
        }
        Commands::Count {
            file,
            min_words,
            max_words,
        } => {
            let text = read_input(file.as_deref())?;
            let verdict = LengthGate::new(min_words, max_words)?.check(&text);
            print_json(&verdict)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli).await {
        // validation messages are meant for the user as-is
        if err.kind() == ErrorKind::ValidationFailed {
            eprintln!("Error: {}", err.message());
        } else {
            eprintln!("Error: {}", err);
        }
        std::process::exit(1);
    }
}
