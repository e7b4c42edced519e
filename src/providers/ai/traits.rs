//! Classification model trait and supporting types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{Category, Email, Priority};

/// Maximum number of body characters sent to the model.
pub const MAX_BODY_CHARS: usize = 2000;

/// Maximum summary length kept from a model verdict.
pub const MAX_SUMMARY_CHARS: usize = 100;

/// Errors that can occur during model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Model not available: {0}")]
    Unavailable(String),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Email fields offered to the model for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Subject line, possibly empty.
    pub subject: String,

    /// Sender in display form.
    pub sender: String,

    /// Analysis text, already capped at [`MAX_BODY_CHARS`].
    pub body: String,
}

impl ModelRequest {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            body: truncate_chars(&body.into(), MAX_BODY_CHARS),
        }
    }

    /// Builds a request from an email, preferring the plain-text body
    /// and capping it so large messages stay inside token limits.
    pub fn from_email(email: &Email) -> Self {
        Self::new(
            email.subject_str(),
            email.from.display(),
            email.analysis_text(),
        )
    }
}

/// Validated verdict produced by a classification model.
///
/// Sentiment and action items are intentionally absent. Models answer
/// only the category, priority, summary, and event-time questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVerdict {
    pub category: Category,
    pub priority: Priority,
    pub summary: String,
    pub event_time: Option<DateTime<Utc>>,
}

/// Raw JSON shape models are prompted to produce.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    datetime: Option<String>,
}

impl ModelVerdict {
    /// Parses model output into a verdict.
    ///
    /// The outer JSON object must parse; that failure is the model's and
    /// surfaces as [`ModelError::InvalidResponse`]. Individual fields are
    /// coerced instead: unknown categories become `other`, unknown
    /// priorities `medium`, overlong summaries are truncated, and an
    /// unparseable datetime becomes `None`.
    pub fn from_json(text: &str) -> ModelResult<Self> {
        let raw: RawVerdict = serde_json::from_str(text)
            .map_err(|e| ModelError::InvalidResponse(format!("not a verdict object: {}", e)))?;

        let category = raw
            .category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or(Category::Other);

        let priority = raw
            .priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or(Priority::Medium);

        let summary = match raw.summary {
            Some(s) if !s.trim().is_empty() => clamp_summary(s.trim()),
            _ => "No summary available".to_string(),
        };

        let event_time = raw
            .datetime
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            category,
            priority,
            summary,
            event_time,
        })
    }
}

/// Caps a summary at [`MAX_SUMMARY_CHARS`] characters, ellipsized.
pub(crate) fn clamp_summary(s: &str) -> String {
    if s.chars().count() <= MAX_SUMMARY_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Keeps at most `max` characters of `s`, ellipsized when cut.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Trait for remote classification models.
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    /// Returns the backend's name (e.g., "openai-compatible").
    fn name(&self) -> &str;

    /// Returns the model identifier being used.
    fn model(&self) -> &str;

    /// Classifies one email and returns the validated verdict.
    async fn classify(&self, request: &ModelRequest) -> ModelResult<ModelVerdict>;
}
