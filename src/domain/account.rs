//! Account domain types.
//!
//! Represents mailbox accounts, their provider credentials, and the
//! per-account synchronization state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, UserId};

/// A mailbox account registered with the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account.
    pub id: AccountId,
    /// User owning this account.
    pub user_id: UserId,
    /// Email address for this account.
    pub email: String,
    /// Type of email provider.
    pub provider_type: ProviderType,
    /// OAuth credentials for the provider API.
    pub credentials: Credentials,
    /// Whether the account participates in sync at all.
    ///
    /// Cleared (never deleted) when the provider permanently rejects the
    /// refresh token; the user must reconnect the account.
    pub active: bool,
    /// Where the last completed or truncated sync pass left off.
    pub watermark: Option<SyncWatermark>,
    /// Sync behavior for this account.
    pub sync: SyncConfig,
    /// Human-readable note from the last failed sync pass.
    pub last_error: Option<String>,
}

impl Account {
    /// Whether a scheduled sync pass should run now.
    ///
    /// Due when the account has never completed a pass, when the previous
    /// pass was truncated mid-pagination, or when the configured interval
    /// has elapsed since the last completed pass. Always false for
    /// sync-disabled accounts.
    pub fn sync_due(&self, now: DateTime<Utc>) -> bool {
        if !self.sync.enabled {
            return false;
        }
        match &self.watermark {
            Some(SyncWatermark::Timestamp { at }) => {
                let interval =
                    chrono::Duration::from_std(self.sync.interval).unwrap_or(chrono::Duration::MAX);
                now - *at >= interval
            }
            _ => true,
        }
    }
}

/// Type of email provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Gmail REST API provider.
    Gmail,
}

/// OAuth token material for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Current bearer token for API calls.
    pub access_token: String,
    /// Long-lived token used to mint new access tokens.
    pub refresh_token: Option<String>,
    /// When the access token stops working. Absent means unknown.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether the access token must be refreshed before use.
    ///
    /// True when now is within `margin` of the expiry, or when the expiry
    /// is unknown.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expiry) => now >= expiry - margin,
            None => true,
        }
    }
}

/// Position of the last sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncWatermark {
    /// A pass completed; the next query starts at this instant.
    Timestamp {
        /// Start time of the completed pass.
        at: DateTime<Utc>,
    },
    /// A pass hit the per-pass cap mid-pagination; listing resumes here.
    Cursor {
        /// Provider continuation token.
        token: String,
    },
}

impl SyncWatermark {
    /// Timestamp value, if this watermark is one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp { at } => Some(*at),
            Self::Cursor { .. } => None,
        }
    }

    /// Continuation token, if this watermark is one.
    pub fn cursor(&self) -> Option<&str> {
        match self {
            Self::Cursor { token } => Some(token),
            Self::Timestamp { .. } => None,
        }
    }
}

/// Per-account sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether scheduled sync runs for this account.
    pub enabled: bool,
    /// Minimum interval between scheduled passes.
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Maximum messages listed per pass.
    pub max_messages: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            max_messages: 500,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_account() -> Account {
        Account {
            id: AccountId::from("acct-1"),
            user_id: UserId::from("user-1"),
            email: "person@example.com".to_string(),
            provider_type: ProviderType::Gmail,
            credentials: Credentials {
                access_token: "ya29.token".to_string(),
                refresh_token: Some("1//refresh".to_string()),
                expires_at: None,
            },
            active: true,
            watermark: None,
            sync: SyncConfig::default(),
            last_error: None,
        }
    }

    #[test]
    fn account_serialization() {
        let account = test_account();

        let json = serde_json::to_string(&account).unwrap();
        let deserialized: Account = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.email, "person@example.com");
        assert_eq!(deserialized.sync.interval, Duration::from_secs(300));
    }

    #[test]
    fn needs_refresh_when_expiry_absent() {
        let creds = Credentials {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(creds.needs_refresh(Utc::now(), chrono::Duration::minutes(5)));
    }

    #[test]
    fn needs_refresh_within_margin() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let creds = Credentials {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Some(now + chrono::Duration::minutes(3)),
        };
        assert!(creds.needs_refresh(now, chrono::Duration::minutes(5)));
    }

    #[test]
    fn no_refresh_when_comfortably_valid() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let creds = Credentials {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Some(now + chrono::Duration::hours(1)),
        };
        assert!(!creds.needs_refresh(now, chrono::Duration::minutes(5)));
    }

    #[test]
    fn sync_due_without_watermark() {
        let account = test_account();
        assert!(account.sync_due(Utc::now()));
    }

    #[test]
    fn sync_due_respects_interval() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut account = test_account();
        account.watermark = Some(SyncWatermark::Timestamp {
            at: now - chrono::Duration::seconds(60),
        });
        assert!(!account.sync_due(now));

        account.watermark = Some(SyncWatermark::Timestamp {
            at: now - chrono::Duration::seconds(600),
        });
        assert!(account.sync_due(now));
    }

    #[test]
    fn cursor_watermark_is_always_due() {
        let mut account = test_account();
        account.watermark = Some(SyncWatermark::Cursor {
            token: "page-3".to_string(),
        });
        assert!(account.sync_due(Utc::now()));
    }

    #[test]
    fn disabled_sync_is_never_due() {
        let mut account = test_account();
        account.sync.enabled = false;
        assert!(!account.sync_due(Utc::now()));
    }

    #[test]
    fn watermark_serialization_is_tagged() {
        let wm = SyncWatermark::Cursor {
            token: "abc".to_string(),
        };
        let json = serde_json::to_string(&wm).unwrap();
        assert!(json.contains("\"type\":\"cursor\""));

        let back: SyncWatermark = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cursor(), Some("abc"));
    }
}
