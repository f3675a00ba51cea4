//! One-Shield Flowstream
//!
//! Live network-flow telemetry pipeline.
//!
//! ```text
//! ┌──────────────┐  flows_batch_*.csv  ┌──────────────┐  POST /ingest  ┌──────────────┐
//! │    Batch     │ ──────────────────► │  Directory   │ ─────────────► │    Event     │ ──► GET /events
//! │   Producer   │   (atomic rename)   │   Watcher    │                │    Relay     │     (SSE)
//! └──────────────┘                     └──────┬───────┘                └──────────────┘
//!                                             │ classifier (optional)
//!                                             ▼
//!                                       predictions.csv
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod models;
pub mod naming;
pub mod producer;
pub mod relay;
pub mod schema;
pub mod watcher;

pub use error::{AppError, AppResult};
