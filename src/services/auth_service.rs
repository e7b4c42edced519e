//! Credential management and token refresh.
//!
//! The [`TokenRefresher`] keeps provider access tokens valid ahead of API
//! calls. Refreshes are single-flight per account: concurrent callers for
//! the same account share one exchange against the token endpoint and all
//! observe the same outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use crate::domain::{AccountId, Credentials};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// How long before stated expiry a token is treated as stale.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Grant lifetime assumed when the endpoint omits `expires_in`.
const DEFAULT_GRANT_LIFETIME_SECS: i64 = 3600;

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors from credential validation and refresh.
///
/// Clone, so every caller sharing an in-flight refresh can receive the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No refresh token on file. Terminal until the user reconnects.
    #[error("no refresh token on file; reconnect the account")]
    NoRefreshToken,

    /// The provider permanently rejected the refresh token.
    #[error("refresh token revoked: {0}")]
    Revoked(String),

    /// Temporary failure. A later attempt may succeed.
    #[error("token refresh failed: {0}")]
    Transient(String),

    /// The credential store rejected a read or write.
    #[error("credential store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Whether recovery requires the user to re-run the consent flow.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::NoRefreshToken | Self::Revoked(_))
    }
}

/// External authority for per-account token material.
///
/// Implementations must be safe for concurrent access; the refresher
/// persists refreshed tokens here before handing them to callers.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current credentials for an account.
    async fn get(&self, account_id: &AccountId) -> Result<Credentials>;

    /// Replaces the stored credentials for an account.
    async fn update(&self, account_id: &AccountId, credentials: Credentials) -> Result<()>;
}

/// A successful token-endpoint exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Newly minted access token.
    pub access_token: String,
    /// Lifetime of the token in seconds.
    pub expires_in: i64,
}

/// Raw refresh-token exchange against the provider's token endpoint.
///
/// Separated from [`TokenRefresher`] so the single-flight and persistence
/// logic can be exercised without network access.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchanges a refresh token for a fresh access token.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Token-endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Token-endpoint error body.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// [`TokenExchanger`] implementation for the Google OAuth token endpoint.
pub struct GoogleTokenExchanger {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleTokenExchanger {
    /// Creates an exchanger for the given OAuth client.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Overrides the token endpoint URL.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Maps a non-success token-endpoint response to an [`AuthError`].
    ///
    /// `invalid_grant` means the refresh token itself is dead; everything
    /// else is worth retrying later.
    fn classify_failure(status: reqwest::StatusCode, body: &str) -> AuthError {
        let parsed: Option<TokenErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().and_then(|b| b.error.as_deref());

        if code == Some("invalid_grant") {
            let detail = parsed
                .as_ref()
                .and_then(|b| b.error_description.clone())
                .unwrap_or_else(|| "invalid_grant".to_string());
            AuthError::Revoked(detail)
        } else {
            AuthError::Transient(format!("token endpoint returned {}: {}", status, body))
        }
    }
}

#[async_trait]
impl TokenExchanger for GoogleTokenExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("parse token response: {}", e)))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            expires_in: token.expires_in.unwrap_or(DEFAULT_GRANT_LIFETIME_SECS),
        })
    }
}

type RefreshFlight = Shared<BoxFuture<'static, Result<Credentials>>>;

/// Keeps access tokens valid, refreshing them single-flight per account.
///
/// A token is refreshed when it expires within the margin or carries no
/// expiry at all. The refreshed credentials are persisted through the
/// [`CredentialStore`] before any caller sees them.
pub struct TokenRefresher {
    credentials: Arc<dyn CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
    margin: chrono::Duration,
    flights: Mutex<HashMap<AccountId, RefreshFlight>>,
}

impl TokenRefresher {
    /// Creates a refresher with the default expiry margin.
    pub fn new(credentials: Arc<dyn CredentialStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            credentials,
            exchanger,
            margin: chrono::Duration::minutes(EXPIRY_MARGIN_MINUTES),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the expiry margin.
    pub fn with_margin(mut self, margin: chrono::Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Returns credentials guaranteed fresh for the expiry margin.
    ///
    /// Fast path: the stored token is comfortably valid and is returned
    /// as is. Otherwise the caller joins the account's in-flight refresh,
    /// starting one if none exists.
    pub async fn ensure_valid(&self, account_id: &AccountId) -> Result<Credentials> {
        let current = self.credentials.get(account_id).await?;
        if !current.needs_refresh(Utc::now(), self.margin) {
            return Ok(current);
        }

        let flight = self.join_flight(account_id);
        let result = flight.clone().await;

        // Clear the entry unless a newer flight already replaced it.
        let mut flights = lock_poisoned(&self.flights);
        if let Some(active) = flights.get(account_id) {
            if active.ptr_eq(&flight) {
                flights.remove(account_id);
            }
        }

        result
    }

    /// Joins the account's in-flight refresh, creating it when absent.
    fn join_flight(&self, account_id: &AccountId) -> RefreshFlight {
        let mut flights = lock_poisoned(&self.flights);
        if let Some(flight) = flights.get(account_id) {
            return flight.clone();
        }

        let flight = Self::run_refresh(
            Arc::clone(&self.credentials),
            Arc::clone(&self.exchanger),
            account_id.clone(),
        )
        .boxed()
        .shared();
        flights.insert(account_id.clone(), flight.clone());
        flight
    }

    /// The actual refresh: exchange, then persist, then return.
    async fn run_refresh(
        store: Arc<dyn CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
        account_id: AccountId,
    ) -> Result<Credentials> {
        let current = store.get(&account_id).await?;

        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoRefreshToken)?;

        let grant = exchanger.exchange(refresh_token).await?;

        let refreshed = Credentials {
            access_token: grant.access_token,
            refresh_token: current.refresh_token.clone(),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(grant.expires_in)),
        };

        store.update(&account_id, refreshed.clone()).await?;

        tracing::debug!(account_id = %account_id, "access token refreshed");
        Ok(refreshed)
    }
}

fn lock_poisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockCredentialStore {
        creds: Mutex<HashMap<AccountId, Credentials>>,
    }

    impl MockCredentialStore {
        fn with(account_id: &AccountId, creds: Credentials) -> Self {
            let mut map = HashMap::new();
            map.insert(account_id.clone(), creds);
            Self {
                creds: Mutex::new(map),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for MockCredentialStore {
        async fn get(&self, account_id: &AccountId) -> Result<Credentials> {
            self.creds
                .lock()
                .unwrap()
                .get(account_id)
                .cloned()
                .ok_or_else(|| AuthError::Store(format!("unknown account {}", account_id)))
        }

        async fn update(&self, account_id: &AccountId, credentials: Credentials) -> Result<()> {
            self.creds
                .lock()
                .unwrap()
                .insert(account_id.clone(), credentials);
            Ok(())
        }
    }

    struct CountingExchanger {
        calls: AtomicUsize,
        delay: Duration,
        failure: Option<AuthError>,
    }

    impl CountingExchanger {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                failure: None,
            }
        }

        fn failing(error: AuthError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                failure: Some(error),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(TokenGrant {
                    access_token: format!("fresh-token-{}", n),
                    expires_in: 3600,
                }),
            }
        }
    }

    fn expired_creds() -> Credentials {
        Credentials {
            access_token: "stale-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(10)),
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_exchange() {
        let account_id = AccountId::from("acct-1");
        let creds = Credentials {
            access_token: "good-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        let store = Arc::new(MockCredentialStore::with(&account_id, creds));
        let exchanger = Arc::new(CountingExchanger::succeeding());
        let refresher = TokenRefresher::new(store, exchanger.clone());

        let result = refresher.ensure_valid(&account_id).await.unwrap();

        assert_eq!(result.access_token, "good-token");
        assert_eq!(exchanger.call_count(), 0);
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_and_persisted() {
        let account_id = AccountId::from("acct-1");
        let store = Arc::new(MockCredentialStore::with(&account_id, expired_creds()));
        let exchanger = Arc::new(CountingExchanger::succeeding());
        let refresher = TokenRefresher::new(store.clone(), exchanger.clone());

        let result = refresher.ensure_valid(&account_id).await.unwrap();

        assert_eq!(result.access_token, "fresh-token-0");
        assert_eq!(exchanger.call_count(), 1);

        let stored = store.get(&account_id).await.unwrap();
        assert_eq!(stored.access_token, "fresh-token-0");
        assert!(stored.expires_at.unwrap() > Utc::now() + chrono::Duration::minutes(50));
    }

    #[tokio::test]
    async fn missing_expiry_forces_refresh() {
        let account_id = AccountId::from("acct-1");
        let creds = Credentials {
            access_token: "mystery-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
        };
        let store = Arc::new(MockCredentialStore::with(&account_id, creds));
        let exchanger = Arc::new(CountingExchanger::succeeding());
        let refresher = TokenRefresher::new(store, exchanger.clone());

        refresher.ensure_valid(&account_id).await.unwrap();

        assert_eq!(exchanger.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_is_terminal() {
        let account_id = AccountId::from("acct-1");
        let creds = Credentials {
            access_token: "stale-token".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        let store = Arc::new(MockCredentialStore::with(&account_id, creds));
        let exchanger = Arc::new(CountingExchanger::succeeding());
        let refresher = TokenRefresher::new(store, exchanger.clone());

        let err = refresher.ensure_valid(&account_id).await.unwrap_err();

        assert_eq!(err, AuthError::NoRefreshToken);
        assert!(err.requires_reconnect());
        assert_eq!(exchanger.call_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let account_id = AccountId::from("acct-1");
        let store = Arc::new(MockCredentialStore::with(&account_id, expired_creds()));
        let exchanger = Arc::new(CountingExchanger::succeeding());
        let refresher = Arc::new(TokenRefresher::new(store, exchanger.clone()));

        let callers = (0..8).map(|_| {
            let refresher = Arc::clone(&refresher);
            let account_id = account_id.clone();
            async move { refresher.ensure_valid(&account_id).await }
        });
        let results = futures::future::join_all(callers).await;

        assert_eq!(exchanger.call_count(), 1);
        for result in results {
            assert_eq!(result.unwrap().access_token, "fresh-token-0");
        }
    }

    #[tokio::test]
    async fn concurrent_callers_observe_the_same_error() {
        let account_id = AccountId::from("acct-1");
        let store = Arc::new(MockCredentialStore::with(&account_id, expired_creds()));
        let exchanger = Arc::new(CountingExchanger::failing(AuthError::Revoked(
            "Token has been expired or revoked.".to_string(),
        )));
        let refresher = Arc::new(TokenRefresher::new(store, exchanger.clone()));

        let callers = (0..4).map(|_| {
            let refresher = Arc::clone(&refresher);
            let account_id = account_id.clone();
            async move { refresher.ensure_valid(&account_id).await }
        });
        let results = futures::future::join_all(callers).await;

        assert_eq!(exchanger.call_count(), 1);
        for result in results {
            let err = result.unwrap_err();
            assert!(matches!(err, AuthError::Revoked(_)));
            assert!(err.requires_reconnect());
        }
    }

    #[tokio::test]
    async fn refresh_is_retried_after_a_flight_lands() {
        let account_id = AccountId::from("acct-1");
        let store = Arc::new(MockCredentialStore::with(&account_id, expired_creds()));
        let exchanger = Arc::new(CountingExchanger::failing(AuthError::Transient(
            "503".to_string(),
        )));
        let refresher = TokenRefresher::new(store, exchanger.clone());

        assert!(refresher.ensure_valid(&account_id).await.is_err());
        assert!(refresher.ensure_valid(&account_id).await.is_err());

        // Sequential calls each get their own flight.
        assert_eq!(exchanger.call_count(), 2);
    }

    #[test]
    fn invalid_grant_classifies_as_revoked() {
        let body = r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#;
        let err = GoogleTokenExchanger::classify_failure(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(err, AuthError::Revoked("Token has been revoked.".to_string()));
    }

    #[test]
    fn server_errors_classify_as_transient() {
        let err = GoogleTokenExchanger::classify_failure(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded",
        );
        assert!(matches!(err, AuthError::Transient(_)));
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn unrecognized_client_error_is_transient() {
        let body = r#"{"error":"invalid_client"}"#;
        let err = GoogleTokenExchanger::classify_failure(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(matches!(err, AuthError::Transient(_)));
    }
}
