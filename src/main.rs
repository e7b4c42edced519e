//! mailsift - headless sync daemon entry point
//!
//! Wires the engine over the in-memory store for a single Gmail account
//! described by the environment:
//!
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - OAuth client
//! - `GMAIL_ADDRESS` / `GMAIL_REFRESH_TOKEN` - the account to sync
//! - the key named by `model.api_key_env` (default `OPENAI_API_KEY`),
//!   when model classification is wanted

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use mailsift::classifier::Classifier;
use mailsift::config::Settings;
use mailsift::domain::{Account, AccountId, Credentials, ProviderType, SyncConfig, UserId};
use mailsift::events::{BroadcastSink, SyncEvent};
use mailsift::providers::ai::{ClassificationModel, OpenAiModel};
use mailsift::providers::email::GmailClient;
use mailsift::services::{GoogleTokenExchanger, SyncEngine, SyncSettings, TokenRefresher};
use mailsift::storage::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting mailsift");

    let settings = Settings::load().context("load settings")?;

    let store = Arc::new(MemoryStore::new());
    let user_id = UserId::from("local");
    let account_id = seed_account(&store, &user_id)?;

    let exchanger = Arc::new(GoogleTokenExchanger::new(
        require_env("GOOGLE_CLIENT_ID")?,
        require_env("GOOGLE_CLIENT_SECRET")?,
    ));
    let refresher = Arc::new(TokenRefresher::new(Arc::clone(&store) as _, exchanger));

    let classifier = Arc::new(
        Classifier::new(&settings.rules, build_model(&settings))
            .context("compile classification rules")?,
    );
    if classifier.has_model() && !classifier.probe().await {
        tracing::warn!("classification model unreachable; rule fallback until it recovers");
    }

    let sink = Arc::new(BroadcastSink::default());
    spawn_event_logger(&sink);

    let engine = Arc::new(
        SyncEngine::new(
            store,
            Arc::new(GmailClient::new()),
            refresher,
            classifier,
            sink,
        )
        .with_settings(SyncSettings {
            fetch_batch_size: settings.sync.fetch_batch_size,
            page_size: settings.sync.page_size,
            background_interval: Duration::from_secs(u64::from(settings.sync.interval_seconds.max(1))),
        }),
    );

    let report = engine.sync_account(&account_id).await?;
    tracing::info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "initial sync finished"
    );

    let background = settings
        .sync
        .enabled
        .then(|| Arc::clone(&engine).start_background_sync(user_id));

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    tracing::info!("Shutting down");
    engine.stop_background_sync();
    if let Some(handle) = background {
        handle.abort();
    }
    Ok(())
}

/// Registers the account described by the environment.
///
/// There is no OAuth consent flow here; the refresh token must be minted
/// elsewhere. The empty access token with unknown expiry forces a refresh
/// before the first provider call.
fn seed_account(store: &MemoryStore, user_id: &UserId) -> Result<AccountId> {
    let email = require_env("GMAIL_ADDRESS")?;
    let refresh_token = require_env("GMAIL_REFRESH_TOKEN")?;

    let account_id = AccountId::from("gmail-primary");
    store.insert_account(Account {
        id: account_id.clone(),
        user_id: user_id.clone(),
        email,
        provider_type: ProviderType::Gmail,
        credentials: Credentials {
            access_token: String::new(),
            refresh_token: Some(refresh_token),
            expires_at: None,
        },
        active: true,
        watermark: None,
        sync: SyncConfig::default(),
        last_error: None,
    });
    Ok(account_id)
}

/// Builds the classification model from settings, when usable.
fn build_model(settings: &Settings) -> Option<Arc<dyn ClassificationModel>> {
    if !settings.model.enabled {
        return None;
    }
    let api_key = std::env::var(&settings.model.api_key_env).ok();
    if api_key.is_none() && settings.model.base_url.is_none() {
        tracing::info!(
            env = %settings.model.api_key_env,
            "no model API key; classification uses the rule engine"
        );
        return None;
    }
    let model = match &settings.model.base_url {
        Some(base_url) => OpenAiModel::custom(base_url, api_key, &settings.model.model),
        None => OpenAiModel::openai(api_key.unwrap_or_default(), &settings.model.model),
    };
    let model: Arc<dyn ClassificationModel> = Arc::new(model);
    Some(model)
}

/// Logs the engine's event feed.
fn spawn_event_logger(sink: &BroadcastSink) {
    let mut rx = sink.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SyncEvent::EmailProcessed { email }) => {
                    let classification = email.classification.as_ref();
                    tracing::info!(
                        subject = email.subject.as_deref().unwrap_or("(no subject)"),
                        category = ?classification.map(|c| c.category),
                        priority = ?classification.map(|c| c.priority),
                        "email processed"
                    );
                }
                Ok(event) => tracing::debug!(event = ?event, "engine event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}
