//! mailsift - incremental mailbox synchronization and classification
//!
//! This crate provides the core engine: credential refresh, provider
//! message listing and fetching, MIME parsing, layered classification,
//! and per-account sync coordination with progress events.

pub mod classifier;
pub mod config;
pub mod domain;
pub mod events;
pub mod parser;
pub mod providers;
pub mod services;
pub mod storage;

pub use services::SyncEngine;
