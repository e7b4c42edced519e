//! Persistence boundary for the engine.
//!
//! The engine persists accounts and emails through the [`Store`] trait and
//! never assumes a backing technology. [`MemoryStore`] is the reference
//! implementation, used by the tests and the demo binary; deployments
//! supply their own implementation over their database of choice.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Account, AccountId, Category, Classification, Email, EmailId, ExternalId, Priority,
    SyncWatermark, UserId,
};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No account with the given id.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// No email with the given id.
    #[error("email not found: {0}")]
    EmailNotFound(EmailId),

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of [`Store::upsert_email`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The email was new and has been inserted.
    Inserted(EmailId),
    /// An email with the same `(account_id, external_id)` already exists.
    /// Nothing was written.
    Skipped(EmailId),
}

/// Aggregate mailbox counts for one user, for dashboard consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxStats {
    /// Total persisted emails.
    pub total: u64,
    /// Unread emails.
    pub unread: u64,
    /// Starred emails.
    pub starred: u64,
    /// Provider-flagged important emails.
    pub important: u64,
    /// Email count per category.
    pub by_category: HashMap<Category, u64>,
    /// Email count per priority.
    pub by_priority: HashMap<Priority, u64>,
    /// Emails received in the last 24 hours.
    pub last_24h: u64,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

/// Persistence operations the engine needs.
///
/// Implementations must be safe for concurrent use; sync passes for
/// different accounts run in parallel.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches an account by id.
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// All active accounts belonging to a user.
    async fn list_active_accounts(&self, user_id: &UserId) -> Result<Vec<Account>>;

    /// Activates or deactivates an account.
    async fn set_account_active(&self, id: &AccountId, active: bool) -> Result<()>;

    /// Whether an email with this provider id is already persisted.
    async fn exists_by_external_id(
        &self,
        account_id: &AccountId,
        external_id: &ExternalId,
    ) -> Result<bool>;

    /// Inserts an email, or does nothing when its `(account_id,
    /// external_id)` pair is already present.
    async fn upsert_email(&self, email: Email) -> Result<UpsertOutcome>;

    /// Replaces the classification block of a persisted email.
    async fn update_classification(
        &self,
        id: &EmailId,
        classification: Classification,
    ) -> Result<()>;

    /// Advances the account's sync watermark and clears its error note.
    async fn update_watermark(&self, account_id: &AccountId, watermark: SyncWatermark)
        -> Result<()>;

    /// Records a failure note against the account.
    async fn record_sync_error(&self, account_id: &AccountId, message: &str) -> Result<()>;

    /// Most recently received emails for an account, newest first.
    async fn recent_emails(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Email>>;

    /// Computes the user's aggregate mailbox counts.
    async fn mailbox_stats(&self, user_id: &UserId) -> Result<MailboxStats>;
}
