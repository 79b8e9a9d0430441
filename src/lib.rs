//! # UdaPlay
//!
//! A video game research agent. Questions are answered from a local
//! semantic index of game records; when the local matches are too weak the
//! agent consults a live web search before composing a cited,
//! confidence-scored answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ games.json │──▶│ Ingest+Embed │──▶│  SQLite  │
//! └────────────┘   └──────────────┘   │  index   │
//!                                     └────┬─────┘
//!                                          ▼
//!   question ──▶ RETRIEVE ──▶ EVALUATE ──▶ (WEB_SEARCH) ──▶ RESPOND
//!                                                             │
//!                                            report + session log
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! udaplay --rebuild "Which platform did Gran Turismo launch on?"
//! udaplay --interactive
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Retrieve/evaluate/search/respond state machine |
//! | [`evaluate`] | Retrieval sufficiency tiers |
//! | [`synthesize`] | Context assembly and answer generation |
//! | [`traits`] | Retrieval, web search and text generation seams |
//! | [`index`] | SQLite game index with vector search |
//! | [`ingest`] | Games JSON loading |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`web_search`] | Tavily web search |
//! | [`generation`] | OpenAI text generation |
//! | [`report`] | Markdown answer report |
//! | [`session`] | Session turn logs |
//! | [`models`] | Game records, retrieval results and answers |
//! | [`config`] | TOML configuration and credentials |
//! | [`error`] | Controller error kinds |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod generation;
pub mod http;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod report;
pub mod session;
pub mod synthesize;
pub mod traits;
pub mod web_search;
