//! In-memory reference implementation of the [`Store`] trait.
//!
//! Backed by a plain mutex over maps, with no durability. Suitable for
//! tests and the demo binary; real deployments implement [`Store`] over
//! their own database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{MailboxStats, Result, Store, StoreError, UpsertOutcome};
use crate::domain::{
    Account, AccountId, Classification, Credentials, Email, EmailId, ExternalId, SyncWatermark,
    UserId,
};
use crate::services::auth_service::{AuthError, CredentialStore};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    emails: Vec<Email>,
}

/// Mutex-guarded in-memory store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Registers an account. Replaces any previous account with the same id.
    pub fn insert_account(&self, account: Account) {
        self.lock().accounts.insert(account.id.clone(), account);
    }

    /// Snapshot of one account, if present.
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.lock().accounts.get(id).cloned()
    }

    /// Snapshot of all persisted emails for an account, insertion order.
    pub fn emails_for_account(&self, account_id: &AccountId) -> Vec<Email> {
        self.lock()
            .emails
            .iter()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.lock().accounts.get(id).cloned())
    }

    async fn list_active_accounts(&self, user_id: &UserId) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .lock()
            .accounts
            .values()
            .filter(|a| a.active && &a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(accounts)
    }

    async fn set_account_active(&self, id: &AccountId, active: bool) -> Result<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;
        account.active = active;
        Ok(())
    }

    async fn exists_by_external_id(
        &self,
        account_id: &AccountId,
        external_id: &ExternalId,
    ) -> Result<bool> {
        Ok(self
            .lock()
            .emails
            .iter()
            .any(|e| &e.account_id == account_id && &e.external_id == external_id))
    }

    async fn upsert_email(&self, email: Email) -> Result<UpsertOutcome> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .emails
            .iter()
            .find(|e| e.account_id == email.account_id && e.external_id == email.external_id)
        {
            return Ok(UpsertOutcome::Skipped(existing.id.clone()));
        }
        let id = email.id.clone();
        inner.emails.push(email);
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn update_classification(
        &self,
        id: &EmailId,
        classification: Classification,
    ) -> Result<()> {
        let mut inner = self.lock();
        let email = inner
            .emails
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| StoreError::EmailNotFound(id.clone()))?;
        email.classification = Some(classification);
        Ok(())
    }

    async fn update_watermark(
        &self,
        account_id: &AccountId,
        watermark: SyncWatermark,
    ) -> Result<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.clone()))?;
        account.watermark = Some(watermark);
        account.last_error = None;
        Ok(())
    }

    async fn record_sync_error(&self, account_id: &AccountId, message: &str) -> Result<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.clone()))?;
        account.last_error = Some(message.to_string());
        Ok(())
    }

    async fn recent_emails(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Email>> {
        let mut emails: Vec<Email> = self
            .lock()
            .emails
            .iter()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect();
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        emails.truncate(limit);
        Ok(emails)
    }

    async fn mailbox_stats(&self, user_id: &UserId) -> Result<MailboxStats> {
        let inner = self.lock();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::hours(24);

        let mut stats = MailboxStats {
            total: 0,
            unread: 0,
            starred: 0,
            important: 0,
            by_category: HashMap::new(),
            by_priority: HashMap::new(),
            last_24h: 0,
            computed_at: now,
        };

        for email in inner.emails.iter().filter(|e| &e.user_id == user_id) {
            stats.total += 1;
            if !email.is_read {
                stats.unread += 1;
            }
            if email.is_starred {
                stats.starred += 1;
            }
            if email.is_important {
                stats.important += 1;
            }
            if email.received_at >= cutoff {
                stats.last_24h += 1;
            }
            if let Some(block) = &email.classification {
                *stats.by_category.entry(block.category).or_insert(0) += 1;
                *stats.by_priority.entry(block.priority).or_insert(0) += 1;
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, account_id: &AccountId) -> std::result::Result<Credentials, AuthError> {
        self.lock()
            .accounts
            .get(account_id)
            .map(|a| a.credentials.clone())
            .ok_or_else(|| AuthError::Store(format!("unknown account {}", account_id)))
    }

    async fn update(
        &self,
        account_id: &AccountId,
        credentials: Credentials,
    ) -> std::result::Result<(), AuthError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| AuthError::Store(format!("unknown account {}", account_id)))?;
        account.credentials = credentials;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Address, Category, ClassificationSource, Priority, ProviderType, Sentiment, SyncConfig,
        ThreadId,
    };
    use pretty_assertions::assert_eq;

    fn account(id: &str, user: &str) -> Account {
        Account {
            id: AccountId::from(id),
            user_id: UserId::from(user),
            email: format!("{}@example.com", id),
            provider_type: ProviderType::Gmail,
            credentials: Credentials {
                access_token: "tok".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: None,
            },
            active: true,
            watermark: None,
            sync: SyncConfig::default(),
            last_error: None,
        }
    }

    fn email(account_id: &str, external_id: &str) -> Email {
        Email {
            id: EmailId::generate(),
            account_id: AccountId::from(account_id),
            user_id: UserId::from("user-1"),
            external_id: ExternalId::from(external_id),
            thread_id: ThreadId::from("thread-1"),
            subject: Some("Hello".to_string()),
            from: Address::new("sender@example.com"),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            body_text: Some("Body".to_string()),
            body_html: None,
            snippet: "Body".to_string(),
            labels: vec![],
            attachments: vec![],
            is_read: false,
            is_starred: false,
            is_important: false,
            received_at: Utc::now(),
            classification: None,
        }
    }

    fn classification(category: Category) -> Classification {
        Classification {
            category,
            priority: Priority::Medium,
            sentiment: Sentiment::Neutral,
            summary: "Hello".to_string(),
            action_items: vec![],
            event_time: None,
            confidence: 0.3,
            source: ClassificationSource::Rules,
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_duplicate_is_skipped() {
        let store = MemoryStore::new();
        let first = email("acct-1", "ext-1");
        let first_id = first.id.clone();

        let outcome = store.upsert_email(first).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(first_id.clone()));

        let outcome = store.upsert_email(email("acct-1", "ext-1")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped(first_id));
        assert_eq!(store.emails_for_account(&AccountId::from("acct-1")).len(), 1);
    }

    #[tokio::test]
    async fn same_external_id_under_other_account_inserts() {
        let store = MemoryStore::new();
        store.upsert_email(email("acct-1", "ext-1")).await.unwrap();

        let outcome = store.upsert_email(email("acct-2", "ext-1")).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn exists_by_external_id_sees_persisted_emails() {
        let store = MemoryStore::new();
        let account_id = AccountId::from("acct-1");
        assert!(!store
            .exists_by_external_id(&account_id, &ExternalId::from("ext-1"))
            .await
            .unwrap());

        store.upsert_email(email("acct-1", "ext-1")).await.unwrap();
        assert!(store
            .exists_by_external_id(&account_id, &ExternalId::from("ext-1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn update_watermark_clears_error_note() {
        let store = MemoryStore::new();
        store.insert_account(account("acct-1", "user-1"));
        let account_id = AccountId::from("acct-1");

        store
            .record_sync_error(&account_id, "listing failed")
            .await
            .unwrap();
        assert_eq!(
            store.account(&account_id).unwrap().last_error.as_deref(),
            Some("listing failed")
        );

        let at = Utc::now();
        store
            .update_watermark(&account_id, SyncWatermark::Timestamp { at })
            .await
            .unwrap();

        let stored = store.account(&account_id).unwrap();
        assert_eq!(stored.watermark, Some(SyncWatermark::Timestamp { at }));
        assert!(stored.last_error.is_none());
    }

    #[tokio::test]
    async fn list_active_accounts_filters_and_sorts() {
        let store = MemoryStore::new();
        store.insert_account(account("acct-b", "user-1"));
        store.insert_account(account("acct-a", "user-1"));
        store.insert_account(account("acct-c", "user-2"));
        let mut inactive = account("acct-d", "user-1");
        inactive.active = false;
        store.insert_account(inactive);

        let accounts = store
            .list_active_accounts(&UserId::from("user-1"))
            .await
            .unwrap();
        let ids: Vec<&str> = accounts.iter().map(|a| a.id.0.as_str()).collect();
        assert_eq!(ids, vec!["acct-a", "acct-b"]);
    }

    #[tokio::test]
    async fn set_account_active_toggles() {
        let store = MemoryStore::new();
        store.insert_account(account("acct-1", "user-1"));
        let account_id = AccountId::from("acct-1");

        store.set_account_active(&account_id, false).await.unwrap();
        assert!(!store.account(&account_id).unwrap().active);

        let missing = store
            .set_account_active(&AccountId::from("nope"), true)
            .await;
        assert!(matches!(missing, Err(StoreError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn recent_emails_newest_first_with_limit() {
        let store = MemoryStore::new();
        let account_id = AccountId::from("acct-1");
        for i in 0..3 {
            let mut e = email("acct-1", &format!("ext-{}", i));
            e.received_at = Utc::now() - chrono::Duration::hours(3 - i);
            store.upsert_email(e).await.unwrap();
        }

        let recent = store.recent_emails(&account_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].external_id, ExternalId::from("ext-2"));
        assert_eq!(recent[1].external_id, ExternalId::from("ext-1"));
    }

    #[tokio::test]
    async fn update_classification_rewrites_block() {
        let store = MemoryStore::new();
        let mut e = email("acct-1", "ext-1");
        e.classification = Some(classification(Category::Other));
        let id = e.id.clone();
        store.upsert_email(e).await.unwrap();

        store
            .update_classification(&id, classification(Category::Work))
            .await
            .unwrap();

        let stored = store.emails_for_account(&AccountId::from("acct-1"));
        assert_eq!(
            stored[0].classification.as_ref().unwrap().category,
            Category::Work
        );

        let missing = store
            .update_classification(&EmailId::from("nope"), classification(Category::Work))
            .await;
        assert!(matches!(missing, Err(StoreError::EmailNotFound(_))));
    }

    #[tokio::test]
    async fn mailbox_stats_counts_by_dimension() {
        let store = MemoryStore::new();

        let mut read = email("acct-1", "ext-1");
        read.is_read = true;
        read.classification = Some(classification(Category::Work));
        store.upsert_email(read).await.unwrap();

        let mut starred = email("acct-1", "ext-2");
        starred.is_starred = true;
        starred.classification = Some(classification(Category::Work));
        store.upsert_email(starred).await.unwrap();

        let mut old = email("acct-1", "ext-3");
        old.received_at = Utc::now() - chrono::Duration::days(3);
        store.upsert_email(old).await.unwrap();

        let stats = store.mailbox_stats(&UserId::from("user-1")).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unread, 2);
        assert_eq!(stats.starred, 1);
        assert_eq!(stats.last_24h, 2);
        assert_eq!(stats.by_category.get(&Category::Work), Some(&2));
    }

    #[tokio::test]
    async fn credential_store_round_trip() {
        let store = MemoryStore::new();
        store.insert_account(account("acct-1", "user-1"));
        let account_id = AccountId::from("acct-1");

        let current = CredentialStore::get(&store, &account_id).await.unwrap();
        assert_eq!(current.access_token, "tok");

        let refreshed = Credentials {
            access_token: "fresh".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        CredentialStore::update(&store, &account_id, refreshed)
            .await
            .unwrap();

        let stored = store.account(&account_id).unwrap();
        assert_eq!(stored.credentials.access_token, "fresh");
    }
}
