//! Remote mail client implementations.
//!
//! This module contains the [`MailClient`] trait and implementations for
//! remote mailbox backends:
//!
//! - [`GmailClient`] - Gmail REST API with bearer-token auth
//!
//! # Architecture
//!
//! The mail client abstraction keeps the sync pipeline independent of any
//! one provider API. Each client handles:
//!
//! - Paginated listing of message references for a search query
//! - Fetching complete messages in canonical raw form
//!
//! Token refresh is not a client concern; callers supply already-valid
//! credentials with every request.

mod gmail;
mod traits;

pub use gmail::GmailClient;
pub use traits::{MailClient, MessagePage, ProviderError, Result};
