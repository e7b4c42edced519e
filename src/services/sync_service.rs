//! Mailbox synchronization pipeline.
//!
//! [`SyncEngine`] runs the full pass for an account: refresh credentials,
//! list message references from the provider, fetch and parse each message,
//! classify it, and persist the result. Passes are exclusive per account,
//! fetch in bounded parallel batches, and report progress through the
//! [`EventSink`]. A scheduled background loop keeps due accounts fresh.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::classifier::Classifier;
use crate::domain::{Account, AccountId, Credentials, MessageRef, SyncWatermark, UserId};
use crate::events::{EventSink, SyncEvent};
use crate::parser::{MessageParser, ParseError};
use crate::providers::email::{MailClient, ProviderError};
use crate::services::auth_service::{AuthError, TokenRefresher};
use crate::storage::{Store, StoreError, UpsertOutcome};

/// Engine-level sync tuning.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Messages fetched concurrently within one batch.
    pub fetch_batch_size: usize,
    /// References requested per provider listing page.
    pub page_size: u32,
    /// Pause between scheduled background ticks.
    pub background_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_batch_size: 10,
            page_size: 100,
            background_interval: Duration::from_secs(60),
        }
    }
}

/// Terminal state of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The pass ran to the end of its listing.
    Completed,
    /// Another pass already held the account; nothing was done.
    AlreadySyncing,
    /// The refresh token is dead. The account was deactivated and stays
    /// that way until the user reconnects it.
    Reconnect,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// How the pass ended.
    pub status: SyncStatus,
    /// Emails parsed, classified, and newly persisted.
    pub processed: usize,
    /// Messages already present and left untouched.
    pub skipped: usize,
    /// Messages that failed to fetch, parse, or persist.
    pub failed: usize,
    /// Message references listed for this pass.
    pub total_listed: usize,
}

impl SyncReport {
    fn empty(status: SyncStatus) -> Self {
        Self {
            status,
            processed: 0,
            skipped: 0,
            failed: 0,
            total_listed: 0,
        }
    }
}

/// Errors that abort a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The account does not exist or is deactivated.
    #[error("account not found or inactive: {0}")]
    AccountNotFound(AccountId),

    /// Credential refresh failed before any messages were fetched.
    #[error("credential refresh failed: {0}")]
    Auth(#[from] AuthError),

    /// Listing messages from the provider failed.
    #[error("provider listing failed: {0}")]
    Provider(#[from] ProviderError),

    /// The store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// How one message fared inside a batch.
enum MessageOutcome {
    Inserted,
    Duplicate,
    Failed,
}

/// Failure of a single message within a pass. Logged and counted, never
/// propagated.
#[derive(Debug, Error)]
enum MessageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Releases the per-account exclusion when the pass ends, on every exit
/// path including panics.
struct PassGuard<'a> {
    in_progress: &'a Mutex<HashSet<AccountId>>,
    account_id: AccountId,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        lock_poisoned(self.in_progress).remove(&self.account_id);
    }
}

/// Coordinates sync passes across accounts.
///
/// Generic over the [`Store`] implementation; everything provider-facing
/// goes through [`MailClient`] and [`TokenRefresher`], so the engine can be
/// exercised end to end without network access.
pub struct SyncEngine<S: Store> {
    store: Arc<S>,
    client: Arc<dyn MailClient>,
    refresher: Arc<TokenRefresher>,
    classifier: Arc<Classifier>,
    parser: MessageParser,
    events: Arc<dyn EventSink>,
    settings: SyncSettings,
    in_progress: Mutex<HashSet<AccountId>>,
    background_running: AtomicBool,
}

impl<S: Store + 'static> SyncEngine<S> {
    /// Creates an engine with default settings.
    pub fn new(
        store: Arc<S>,
        client: Arc<dyn MailClient>,
        refresher: Arc<TokenRefresher>,
        classifier: Arc<Classifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            client,
            refresher,
            classifier,
            parser: MessageParser::default(),
            events,
            settings: SyncSettings::default(),
            in_progress: Mutex::new(HashSet::new()),
            background_running: AtomicBool::new(false),
        }
    }

    /// Overrides the engine settings.
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Whether a pass is currently running for the account.
    pub fn is_syncing(&self, account_id: &AccountId) -> bool {
        lock_poisoned(&self.in_progress).contains(account_id)
    }

    /// Runs one full sync pass for an account.
    ///
    /// At most one pass runs per account; a second caller gets
    /// [`SyncStatus::AlreadySyncing`] without touching the provider. A dead
    /// refresh token ends the pass with [`SyncStatus::Reconnect`] before
    /// anything is fetched. Every other failure is recorded against the
    /// account and returned as an error.
    pub async fn sync_account(&self, account_id: &AccountId) -> Result<SyncReport> {
        let Some(_guard) = self.try_begin(account_id) else {
            tracing::debug!(account_id = %account_id, "sync already in progress");
            return Ok(SyncReport::empty(SyncStatus::AlreadySyncing));
        };

        let account = self
            .store
            .get_account(account_id)
            .await?
            .filter(|a| a.active)
            .ok_or_else(|| SyncError::AccountNotFound(account_id.clone()))?;

        let credentials = match self.refresher.ensure_valid(account_id).await {
            Ok(credentials) => credentials,
            Err(error) => return self.fail_authentication(&account, error).await,
        };

        self.events.emit(SyncEvent::SyncStarted {
            account_id: account.id.clone(),
        });
        tracing::info!(account_id = %account.id, email = %account.email, "sync pass started");
        let started = Instant::now();

        match self.run_pass(&account, &credentials).await {
            Ok(report) => {
                tracing::info!(
                    account_id = %account.id,
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync pass completed"
                );
                Ok(report)
            }
            Err(error) => {
                let message = error.to_string();
                if let Err(store_error) = self.store.record_sync_error(&account.id, &message).await
                {
                    tracing::error!(
                        account_id = %account.id,
                        error = %store_error,
                        "failed to record sync error"
                    );
                }
                self.events.emit(SyncEvent::SyncError {
                    account_id: account.id.clone(),
                    message,
                });
                tracing::error!(account_id = %account.id, error = %error, "sync pass failed");
                Err(error)
            }
        }
    }

    /// Runs a pass only when the account's schedule says one is due.
    pub async fn sync_account_if_due(&self, account_id: &AccountId) -> Result<Option<SyncReport>> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .filter(|a| a.active)
            .ok_or_else(|| SyncError::AccountNotFound(account_id.clone()))?;

        if !account.sync_due(Utc::now()) {
            return Ok(None);
        }
        self.sync_account(account_id).await.map(Some)
    }

    /// Syncs every active account of a user, sequentially.
    ///
    /// Individual failures are recorded against their account and logged;
    /// the remaining accounts still run.
    pub async fn sync_all(&self, user_id: &UserId) -> Result<Vec<SyncReport>> {
        let accounts = self.store.list_active_accounts(user_id).await?;
        let mut reports = Vec::with_capacity(accounts.len());

        for account in &accounts {
            match self.sync_account(&account.id).await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::error!(account_id = %account.id, error = %error, "account sync failed");
                }
            }
        }
        Ok(reports)
    }

    /// Scheduled variant of [`Self::sync_all`]: only accounts whose
    /// interval has elapsed are synced.
    pub async fn sync_due_accounts(&self, user_id: &UserId) -> Result<Vec<SyncReport>> {
        let now = Utc::now();
        let accounts = self.store.list_active_accounts(user_id).await?;
        let mut reports = Vec::new();

        for account in accounts.iter().filter(|a| a.sync_due(now)) {
            match self.sync_account(&account.id).await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::error!(account_id = %account.id, error = %error, "scheduled sync failed");
                }
            }
        }
        Ok(reports)
    }

    /// Re-runs classification over the account's most recent emails.
    ///
    /// Used after rule or model configuration changes. Returns how many
    /// classifications were replaced.
    pub async fn reclassify_account(&self, account_id: &AccountId, limit: usize) -> Result<usize> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| SyncError::AccountNotFound(account_id.clone()))?;

        let emails = self.store.recent_emails(&account.id, limit).await?;
        let mut updated = 0usize;

        for email in emails {
            let classification = self.classifier.classify(&email).await;
            self.store
                .update_classification(&email.id, classification)
                .await?;
            updated += 1;
        }

        if updated > 0 {
            tracing::info!(account_id = %account.id, updated, "reclassification finished");
            self.emit_dashboard(&account).await;
        }
        Ok(updated)
    }

    /// Starts the scheduled sync loop for a user's accounts.
    ///
    /// Every [`SyncSettings::background_interval`] the loop syncs the
    /// accounts that are due. [`Self::stop_background_sync`] ends the loop
    /// after its current tick.
    pub fn start_background_sync(self: Arc<Self>, user_id: UserId) -> JoinHandle<()> {
        self.background_running.store(true, Ordering::SeqCst);
        let interval = self.settings.background_interval;

        tokio::spawn(async move {
            tracing::info!(
                user_id = %user_id,
                interval_secs = interval.as_secs(),
                "background sync started"
            );
            while self.background_running.load(Ordering::SeqCst) {
                if let Err(error) = self.sync_due_accounts(&user_id).await {
                    tracing::error!(user_id = %user_id, error = %error, "scheduled sync tick failed");
                }
                tokio::time::sleep(interval).await;
            }
            tracing::info!(user_id = %user_id, "background sync stopped");
        })
    }

    /// Signals the background loop to exit after its current tick.
    pub fn stop_background_sync(&self) {
        self.background_running.store(false, Ordering::SeqCst);
    }

    /// Whether the background loop is running.
    pub fn is_background_sync_running(&self) -> bool {
        self.background_running.load(Ordering::SeqCst)
    }

    /// Claims the per-account exclusion, or returns `None` when a pass
    /// already holds it.
    fn try_begin(&self, account_id: &AccountId) -> Option<PassGuard<'_>> {
        let mut in_progress = lock_poisoned(&self.in_progress);
        if !in_progress.insert(account_id.clone()) {
            return None;
        }
        Some(PassGuard {
            in_progress: &self.in_progress,
            account_id: account_id.clone(),
        })
    }

    /// Handles a credential refresh failure before anything was fetched.
    ///
    /// A dead refresh token deactivates the account and reports
    /// [`SyncStatus::Reconnect`]; transient failures propagate as errors.
    /// Both record an error note and emit a sync error event.
    async fn fail_authentication(&self, account: &Account, error: AuthError) -> Result<SyncReport> {
        let message = error.to_string();
        if let Err(store_error) = self.store.record_sync_error(&account.id, &message).await {
            tracing::error!(
                account_id = %account.id,
                error = %store_error,
                "failed to record sync error"
            );
        }
        self.events.emit(SyncEvent::SyncError {
            account_id: account.id.clone(),
            message,
        });

        if error.requires_reconnect() {
            tracing::warn!(
                account_id = %account.id,
                error = %error,
                "credentials revoked, account needs reconnect"
            );
            self.store.set_account_active(&account.id, false).await?;
            return Ok(SyncReport::empty(SyncStatus::Reconnect));
        }

        tracing::warn!(account_id = %account.id, error = %error, "token refresh failed");
        Err(error.into())
    }

    /// The pass itself: list, fetch in batches, then advance the watermark.
    async fn run_pass(&self, account: &Account, credentials: &Credentials) -> Result<SyncReport> {
        let pass_started_at = Utc::now();
        let (refs, truncated_cursor) = self.list_references(account, credentials).await?;
        let total = refs.len();
        tracing::debug!(account_id = %account.id, total, "listing complete");

        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;
        let mut handled = 0usize;

        for batch in refs.chunks(self.settings.fetch_batch_size.max(1)) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|message| self.process_message(account, credentials, message)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    MessageOutcome::Inserted => processed += 1,
                    MessageOutcome::Duplicate => skipped += 1,
                    MessageOutcome::Failed => failed += 1,
                }
            }
            handled += batch.len();
            self.events.emit(SyncEvent::SyncProgress {
                account_id: account.id.clone(),
                processed: handled,
                total,
            });
        }

        // The watermark moves only after every batch has landed. The pass
        // start time is used so messages that arrived mid-pass are listed
        // again next run and removed by dedup.
        let watermark = match truncated_cursor {
            Some(token) => SyncWatermark::Cursor { token },
            None => SyncWatermark::Timestamp {
                at: pass_started_at,
            },
        };
        self.store.update_watermark(&account.id, watermark).await?;

        self.events.emit(SyncEvent::SyncCompleted {
            account_id: account.id.clone(),
            count: processed,
        });
        self.emit_dashboard(account).await;

        Ok(SyncReport {
            status: SyncStatus::Completed,
            processed,
            skipped,
            failed,
            total_listed: total,
        })
    }

    /// Accumulates message references up to the account's per-pass cap.
    ///
    /// A cursor watermark resumes the previous listing. When the cap
    /// truncates pagination the unconsumed continuation token is returned
    /// so the next pass picks up where this one stopped.
    async fn list_references(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> Result<(Vec<MessageRef>, Option<String>)> {
        let cap = account.sync.max_messages.max(1) as usize;
        let query = self.client.build_query(account.watermark.as_ref());
        let mut page_token: Option<String> = account
            .watermark
            .as_ref()
            .and_then(|w| w.cursor())
            .map(str::to_string);

        let mut refs: Vec<MessageRef> = Vec::new();
        loop {
            let remaining = (cap - refs.len()) as u32;
            let page_size = self.settings.page_size.min(remaining).max(1);
            let page = self
                .client
                .list_page(credentials, &query, page_token.as_deref(), page_size)
                .await?;
            refs.extend(page.refs);

            match page.next_page_token {
                Some(token) => {
                    if refs.len() >= cap {
                        tracing::debug!(
                            account_id = %account.id,
                            cap,
                            "listing truncated by per-pass cap"
                        );
                        return Ok((refs, Some(token)));
                    }
                    page_token = Some(token);
                }
                None => return Ok((refs, None)),
            }
        }
    }

    /// Processes one message, converting any failure into a counted,
    /// logged outcome so the batch keeps going.
    async fn process_message(
        &self,
        account: &Account,
        credentials: &Credentials,
        message: &MessageRef,
    ) -> MessageOutcome {
        match self.handle_message(account, credentials, message).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    account_id = %account.id,
                    external_id = %message.id,
                    error = %error,
                    "message failed, continuing pass"
                );
                MessageOutcome::Failed
            }
        }
    }

    /// Fetch, parse, dedup-check, classify, persist.
    async fn handle_message(
        &self,
        account: &Account,
        credentials: &Credentials,
        message: &MessageRef,
    ) -> std::result::Result<MessageOutcome, MessageError> {
        let raw = self.client.fetch_full(credentials, message).await?;
        let mut email = self.parser.parse(account, &raw)?;

        if self
            .store
            .exists_by_external_id(&account.id, &email.external_id)
            .await?
        {
            tracing::debug!(
                account_id = %account.id,
                external_id = %email.external_id,
                "duplicate message skipped"
            );
            return Ok(MessageOutcome::Duplicate);
        }

        email.classification = Some(self.classifier.classify(&email).await);

        match self.store.upsert_email(email.clone()).await? {
            UpsertOutcome::Inserted(_) => {
                self.events.emit(SyncEvent::EmailProcessed {
                    email: Box::new(email),
                });
                Ok(MessageOutcome::Inserted)
            }
            UpsertOutcome::Skipped(_) => Ok(MessageOutcome::Duplicate),
        }
    }

    /// Emits fresh dashboard counts; stats failures only log.
    async fn emit_dashboard(&self, account: &Account) {
        match self.store.mailbox_stats(&account.user_id).await {
            Ok(stats) => self.events.emit(SyncEvent::DashboardUpdated {
                user_id: account.user_id.clone(),
                stats,
            }),
            Err(error) => {
                tracing::warn!(
                    account_id = %account.id,
                    error = %error,
                    "dashboard stats unavailable"
                );
            }
        }
    }
}

fn lock_poisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
