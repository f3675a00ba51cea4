//! HTTP handlers

pub mod health;
pub mod ingest;
pub mod events;
pub mod stats;
