//! # UdaPlay CLI (`udaplay`)
//!
//! Ask a question about video games, answered from the local game index
//! with a web search fallback when local data is too thin.
//!
//! ## Usage
//!
//! ```bash
//! # Build the index from data/games.json, then ask
//! udaplay --rebuild "Which platform did Gran Turismo launch on?"
//!
//! # Interactive session
//! udaplay --interactive
//!
//! # Custom config and data locations
//! udaplay --config ./config/udaplay.toml --data ./data/games.json "Who made Pokemon Gold?"
//! ```
//!
//! `OPENAI_API_KEY` enables LLM answers (and OpenAI embeddings when the
//! embedding provider is `auto`); `TAVILY_API_KEY` enables web search.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use udaplay::agent::Agent;
use udaplay::config::{self, Config, Credentials};
use udaplay::embedding;
use udaplay::error::AgentError;
use udaplay::generation;
use udaplay::index::GameIndex;
use udaplay::ingest;
use udaplay::report;
use udaplay::session::SessionLogger;
use udaplay::synthesize::ResponseSynthesizer;
use udaplay::web_search;

const DEFAULT_CONFIG_PATH: &str = "./config/udaplay.toml";

/// UdaPlay: a video game research agent.
///
/// Settings are read from an optional TOML file (see
/// `config/udaplay.example.toml`); flags override file values.
#[derive(Parser)]
#[command(
    name = "udaplay",
    about = "UdaPlay: video game research agent with local retrieval and web fallback",
    version
)]
struct Cli {
    /// Question about a video game.
    #[arg(required_unless_present = "interactive", conflicts_with = "interactive")]
    question: Option<String>,

    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/udaplay.toml`; built-in defaults are used when
    /// that file does not exist. An explicitly given path must exist.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the games JSON file used by `--rebuild`.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Path to the SQLite index database.
    #[arg(long)]
    persist_path: Option<PathBuf>,

    /// Number of local matches to retrieve.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    top_k: Option<u32>,

    /// Re-ingest the games JSON before answering.
    #[arg(long)]
    rebuild: bool,

    /// Directory for session logs.
    #[arg(long)]
    session_log_dir: Option<PathBuf>,

    /// Read questions from stdin until `exit`, `quit` or EOF.
    #[arg(long, short = 'i')]
    interactive: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let (path, required) = match &self.config {
            Some(path) => (path.as_path(), true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };
        let mut cfg = config::load_or_default(path, required)?;

        if let Some(data) = &self.data {
            cfg.index.data_path = data.clone();
        }
        if let Some(persist_path) = &self.persist_path {
            cfg.index.path = persist_path.clone();
        }
        if let Some(top_k) = self.top_k {
            cfg.retrieval.top_k = top_k as usize;
        }
        if let Some(dir) = &self.session_log_dir {
            cfg.session.log_dir = dir.clone();
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = cli.load_config()?;
    let credentials = Credentials::from_env();
    tracing::debug!(?credentials, "credentials loaded");

    let session = SessionLogger::new(&cfg.session.log_dir)?;
    let outcome = run(&cli, &cfg, &credentials, &session).await;

    // Written on both success and failure.
    let finalized = session.finalize();
    outcome?;
    finalized?;
    Ok(())
}

async fn run(
    cli: &Cli,
    cfg: &Config,
    credentials: &Credentials,
    session: &SessionLogger,
) -> Result<()> {
    let embedder = embedding::create_embedder(&cfg.embedding, credentials)?;
    let index = Arc::new(
        GameIndex::open(&cfg.index.path, embedder, cfg.embedding.batch_size)
            .await
            .with_context(|| format!("Failed to open index: {}", cfg.index.path.display()))?,
    );
    tracing::debug!(model = index.model_name(), "game index opened");

    if cli.rebuild {
        let stats = ingest::ingest_file(&index, &cfg.index.data_path).await?;
        println!(
            "Ingested {} game records from {}",
            stats.ingested,
            cfg.index.data_path.display()
        );
    } else if index.count().await? == 0 {
        tracing::warn!(
            path = %cfg.index.path.display(),
            "game index is empty; run with --rebuild to ingest game data"
        );
    }

    let agent = build_agent(cfg, credentials, index.clone())?;

    if cli.interactive {
        interactive(&agent, cfg.retrieval.top_k, session).await?;
    } else if let Some(question) = &cli.question {
        let answer = agent.answer(question, cfg.retrieval.top_k).await?;
        session.log_turn(question, &answer);
        println!("{}", report::to_markdown(&answer));
    }

    index.close().await;
    Ok(())
}

fn build_agent(cfg: &Config, credentials: &Credentials, index: Arc<GameIndex>) -> Result<Agent> {
    let web = web_search::create_web_search(&cfg.web_search, credentials)?;
    let generator = generation::create_generator(&cfg.generation, credentials)?;

    let synthesizer = ResponseSynthesizer::new(generator)
        .with_limits(cfg.agent.max_context_blocks, cfg.agent.summary_max_chars)
        .with_timeout(cfg.generation.timeout_secs);

    Ok(Agent::new(index, web, synthesizer)
        .with_timeouts(cfg.agent.retrieval_timeout_secs, cfg.web_search.timeout_secs))
}

async fn interactive(agent: &Agent, top_k: usize, session: &SessionLogger) -> Result<()> {
    let cancel = agent.cancellation_token();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut lines = spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"udaplay> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.recv() => line.transpose()?,
            _ = cancel.cancelled() => None,
        };
        let Some(line) = line else {
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match agent.answer(question, top_k).await {
            Ok(answer) => {
                session.log_turn(question, &answer);
                println!("{}", report::to_markdown(&answer));
            }
            Err(AgentError::Cancelled { .. }) => break,
            Err(e) => {
                tracing::warn!(provider = %e.provider(), "question failed");
                eprintln!("Error: {}", e);
            }
        }
    }

    println!();
    println!("Ending session after {} turns.", session.turn_count());
    Ok(())
}

/// Read stdin lines on a plain thread so a pending read never holds up
/// shutdown after Ctrl-C. The channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
