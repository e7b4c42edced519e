//! Mail and model provider implementations.
//!
//! This module contains provider traits and implementations for external
//! services:
//!
//! - [`email`] - Remote mailbox APIs (Gmail)
//! - [`ai`] - Classification model backends (OpenAI-compatible)

pub mod ai;
pub mod email;
