//! Remote configuration orchestrator for Wowza Streaming Engine hosts.
//!
//! Provisions, updates and removes per-account streaming applications on
//! media servers over ssh, and serves a small control API for the back office.

pub mod app;
pub mod audit;
pub mod config;
pub mod control;
pub mod directory;
pub mod documents;
pub mod error;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod service;
pub mod state;
pub mod status;

#[cfg(test)]
pub mod testing;

pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
