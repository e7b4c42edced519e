//! Engine services layer.
//!
//! The services orchestrate the pipeline, coordinating between providers,
//! storage, and domain types:
//!
//! ```text
//! Caller (binary, API surface)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (Providers, Storage, Events)
//! ```
//!
//! - [`TokenRefresher`]: Keeps provider credentials valid, single-flight
//!   per account
//! - [`SyncEngine`]: Runs sync passes end to end and schedules them in
//!   the background
//!
//! [`TokenRefresher`]: auth_service::TokenRefresher
//! [`SyncEngine`]: sync_service::SyncEngine

pub mod auth_service;
pub mod sync_service;

pub use auth_service::{
    AuthError, CredentialStore, GoogleTokenExchanger, TokenExchanger, TokenGrant, TokenRefresher,
};
pub use sync_service::{SyncEngine, SyncError, SyncReport, SyncSettings, SyncStatus};
