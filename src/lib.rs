//! # repo-oracle
//!
//! Turns a source repository into a queryable knowledge base.
//!
//! Every file is fetched, summarized by a language model into a fixed-shape
//! [`FileSummary`](models::FileSummary), and saved. Questions are answered in
//! two phases: a model ranks the summaries to pick the relevant files, then a
//! second call answers from those files' contents only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────┐   ┌───────────┐   ┌────────────────┐
//! │  Repository  │──▶│  Fetch  │──▶│ Summarize │──▶│ repo_summary_* │
//! │ GitHub/Local │   │ (≤16)   │   │  (≤10)    │   │     .json      │
//! └──────────────┘   └─────────┘   └─────┬─────┘   └────────────────┘
//!                                        │
//!                        question ──▶ ┌──▼─────┐   ┌────────┐
//!                                     │ Select │──▶│ Answer │
//!                                     └────────┘   └────────┘
//! ```
//!
//! Model calls go through an injected
//! [`CompletionGateway`](gateway::CompletionGateway); a failed call never
//! aborts a stage. Summaries fall back to placeholders, selection falls back
//! to keyword scoring, and answers become a diagnostic string.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Workflow errors and states |
//! | [`gateway`] | Completion gateway trait, OpenAI/Gemini clients, call policy |
//! | [`source`] | Repository source trait |
//! | [`source_github`] | GitHub REST source |
//! | [`source_local`] | Local checkout source |
//! | [`fetch`] | Fetch stage |
//! | [`summarize`] | Summarization stage |
//! | [`select`] | Retrieval stage (file selection) |
//! | [`answer`] | Answering stage |
//! | [`workflow`] | Orchestrator and working-set state machine |
//! | [`persist`] | Summary and question-result files |
//! | [`payload`] | JSON extraction from model output |
//! | [`language`] | Extension → language table |
//! | [`stats`] | Summary statistics |
//! | [`progress`] | Progress reporting |

pub mod answer;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod language;
pub mod models;
pub mod payload;
pub mod persist;
pub mod progress;
pub mod select;
pub mod source;
pub mod source_github;
pub mod source_local;
pub mod stats;
pub mod summarize;
pub mod workflow;
