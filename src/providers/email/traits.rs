//! Remote mail client trait definition.
//!
//! This module defines the [`MailClient`] trait which abstracts over remote
//! mailbox APIs. The sync service drives listing and fetching exclusively
//! through this trait, so providers other than Gmail can be added without
//! touching the pipeline.

use async_trait::async_trait;

use crate::domain::{Credentials, MessageRef, RawMessage, SyncWatermark};

/// Result type alias for mail client operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail client operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// One page of a message listing.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    /// References on this page, in the provider's listing order.
    pub refs: Vec<MessageRef>,
    /// Continuation token for the next page. Absent on the last page.
    pub next_page_token: Option<String>,
}

/// Client for a remote mailbox API.
///
/// Implementations are stateless with respect to accounts: credentials
/// arrive with every call, already validated by the token refresher.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Builds the provider search expression for a sync pass starting at
    /// `watermark`.
    fn build_query(&self, watermark: Option<&SyncWatermark>) -> String;

    /// Lists one page of message references matching `query`.
    ///
    /// # Arguments
    ///
    /// * `query` - Provider search expression from [`Self::build_query`]
    /// * `page_token` - Continuation token from the previous page
    /// * `max_results` - Upper bound on references for this page
    async fn list_page(
        &self,
        credentials: &Credentials,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage>;

    /// Fetches one complete message.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the message no longer exists.
    async fn fetch_full(&self, credentials: &Credentials, message: &MessageRef)
        -> Result<RawMessage>;
}
