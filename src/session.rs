//! Per-session turn logging.
//!
//! Every CLI run gets a session id. Turns are buffered in memory and written
//! once, on [`SessionLogger::finalize`], to `<log_dir>/<session_id>.json`;
//! a one-line summary is appended to `<log_dir>/sessions.jsonl`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::AgentAnswer;

pub const HISTORY_FILE: &str = "sessions.jsonl";

#[derive(Debug, Clone, Serialize)]
pub struct TurnEvent {
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub used_web_fallback: bool,
    pub citations: Vec<String>,
}

#[derive(Serialize)]
struct SessionRecord<'a> {
    session_id: &'a str,
    started_at: &'a str,
    ended_at: &'a str,
    turn_count: usize,
    events: &'a [TurnEvent],
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    session_id: &'a str,
    started_at: &'a str,
    ended_at: &'a str,
    turn_count: usize,
    file: &'a str,
}

pub struct SessionLogger {
    session_id: String,
    started_at: String,
    session_file: PathBuf,
    history_file: PathBuf,
    events: Mutex<Vec<TurnEvent>>,
    finalized: Mutex<Option<PathBuf>>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "session-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        &suffix[..8]
    )
}

impl SessionLogger {
    /// Start a session, creating `log_dir` if needed.
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir).with_context(|| {
            format!("Failed to create session log dir: {}", log_dir.display())
        })?;

        let session_id = new_session_id();
        tracing::debug!(session_id = %session_id, "session started");

        Ok(Self {
            session_file: log_dir.join(format!("{}.json", session_id)),
            history_file: log_dir.join(HISTORY_FILE),
            session_id,
            started_at: now_rfc3339(),
            events: Mutex::new(Vec::new()),
            finalized: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    pub fn turn_count(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn log_turn(&self, question: &str, answer: &AgentAnswer) {
        let event = TurnEvent {
            timestamp: now_rfc3339(),
            question: question.to_string(),
            answer: answer.answer.clone(),
            confidence: answer.confidence,
            used_web_fallback: answer.used_web_fallback,
            citations: answer.citations.clone(),
        };
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Write the session file and history line. Only the first call
    /// writes; later calls return the same path.
    pub fn finalize(&self) -> Result<PathBuf> {
        let mut finalized = self.finalized.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = finalized.as_ref() {
            return Ok(path.clone());
        }

        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let ended_at = now_rfc3339();

        let record = SessionRecord {
            session_id: &self.session_id,
            started_at: &self.started_at,
            ended_at: &ended_at,
            turn_count: events.len(),
            events: &events,
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.session_file, json).with_context(|| {
            format!("Failed to write session log: {}", self.session_file.display())
        })?;

        let file_name = self
            .session_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let line = serde_json::to_string(&HistoryLine {
            session_id: &self.session_id,
            started_at: &self.started_at,
            ended_at: &ended_at,
            turn_count: events.len(),
            file: file_name,
        })?;

        let mut history = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)
            .with_context(|| {
                format!("Failed to open session history: {}", self.history_file.display())
            })?;
        writeln!(history, "{}", line)?;

        tracing::info!(
            session_id = %self.session_id,
            turns = events.len(),
            path = %self.session_file.display(),
            "session log written"
        );

        *finalized = Some(self.session_file.clone());
        Ok(self.session_file.clone())
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(error = %e, "failed to finalize session log");
        }
    }
}
