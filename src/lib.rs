//! Food Log Library
//!
//! Cached AI nutrition estimates and a per-user daily food log, both
//! persisted as JSON files safe to share between handlers and processes.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod estimate;
pub mod ledger;
pub mod store;
