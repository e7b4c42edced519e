//! Email classification.
//!
//! Classification layers three strategies:
//!
//! 1. A spam short-circuit from the rule tables, checked first.
//! 2. A remote [`ClassificationModel`], when one is configured.
//! 3. The deterministic rule fallback, used when the model is absent
//!    or fails.
//!
//! Model failures never surface to the caller; every email gets a
//! classification, and the `source` tag plus the confidence score tell
//! downstream consumers which strategy produced it. Sentiment and
//! action items always come from the rule tables since the model is
//! not asked about them.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{Category, Classification, ClassificationSource, Email};
use crate::providers::ai::{ClassificationModel, ModelRequest};

mod rules;

pub use rules::{
    CategoryRuleConfig, RuleConfig, RuleError, RuleInput, RuleSet, SentimentRuleConfig,
    SpamRuleConfig,
};

/// Confidence recorded for verdicts produced by the model.
const MODEL_CONFIDENCE: f32 = 0.9;

/// Confidence recorded when the spam rules short-circuit.
const SPAM_CONFIDENCE: f32 = 0.9;

/// Confidence recorded for rule-fallback verdicts.
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Longest summary kept on a classification.
const MAX_SUMMARY_CHARS: usize = 100;

/// Layered email classifier.
pub struct Classifier {
    model: Option<Arc<dyn ClassificationModel>>,
    rules: RuleSet,
}

impl Classifier {
    /// Compiles the rule tables and wires in the optional model.
    pub fn new(
        config: &RuleConfig,
        model: Option<Arc<dyn ClassificationModel>>,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            model,
            rules: RuleSet::compile(config)?,
        })
    }

    /// Whether a remote model is configured.
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classifies one email. Infallible: the rule fallback answers
    /// whenever the model cannot.
    pub async fn classify(&self, email: &Email) -> Classification {
        let input = RuleInput::new(email);
        let sentiment = self.rules.sentiment(&input);
        let action_items = self.rules.action_items(&input);

        if self.rules.is_spam(&input) {
            tracing::debug!(external_id = %email.external_id, "spam rules matched");
            return Classification {
                category: Category::Spam,
                priority: self.rules.priority(&input),
                sentiment,
                summary: fallback_summary(email),
                action_items,
                event_time: None,
                confidence: SPAM_CONFIDENCE,
                source: ClassificationSource::Rules,
                processed_at: Utc::now(),
            };
        }

        if let Some(model) = &self.model {
            let request = ModelRequest::from_email(email);
            match model.classify(&request).await {
                Ok(verdict) => {
                    return Classification {
                        category: verdict.category,
                        priority: verdict.priority,
                        sentiment,
                        summary: verdict.summary,
                        action_items,
                        event_time: verdict.event_time,
                        confidence: MODEL_CONFIDENCE,
                        source: ClassificationSource::Model,
                        processed_at: Utc::now(),
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        external_id = %email.external_id,
                        error = %error,
                        "classification model failed, using rule fallback"
                    );
                }
            }
        }

        let (category, _) = self.rules.best_category(&input);
        Classification {
            category,
            priority: self.rules.priority(&input),
            sentiment,
            summary: fallback_summary(email),
            action_items,
            event_time: None,
            confidence: FALLBACK_CONFIDENCE,
            source: ClassificationSource::Rules,
            processed_at: Utc::now(),
        }
    }

    /// Health check for the model path.
    ///
    /// Returns true when a model is configured and currently returning
    /// structurally valid verdicts; false when no model is configured.
    pub async fn probe(&self) -> bool {
        let Some(model) = &self.model else {
            return false;
        };

        let request = ModelRequest::new(
            "Connectivity check",
            "probe@localhost",
            "This is a health check message. Classify it normally.",
        );

        match model.classify(&request).await {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(error = %error, "classification model probe failed");
                false
            }
        }
    }
}

/// Summary used when the model did not provide one: the subject line,
/// length-capped, or a fixed placeholder.
fn fallback_summary(email: &Email) -> String {
    let subject = email.subject_str().trim();
    if subject.is_empty() {
        return "No summary available".to_string();
    }
    if subject.chars().count() <= MAX_SUMMARY_CHARS {
        return subject.to_string();
    }
    let mut out: String = subject.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AccountId, Address, EmailId, ExternalId, Priority, Sentiment, ThreadId, UserId,
    };
    use crate::providers::ai::{ModelError, ModelResult, ModelVerdict};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockModel {
        verdict: Option<ModelVerdict>,
        calls: Mutex<u32>,
    }

    impl MockModel {
        fn answering(verdict: ModelVerdict) -> Self {
            Self {
                verdict: Some(verdict),
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                verdict: None,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ClassificationModel for MockModel {
        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn classify(&self, _request: &ModelRequest) -> ModelResult<ModelVerdict> {
            *self.calls.lock().unwrap() += 1;
            match &self.verdict {
                Some(v) => Ok(v.clone()),
                None => Err(ModelError::Unavailable("mock offline".to_string())),
            }
        }
    }

    fn work_verdict() -> ModelVerdict {
        ModelVerdict {
            category: Category::Work,
            priority: Priority::High,
            summary: "Budget review moved to Monday morning.".to_string(),
            event_time: None,
        }
    }

    fn email(subject: &str, from: &str, body: &str) -> Email {
        Email {
            id: EmailId::from("e1"),
            account_id: AccountId::from("a1"),
            user_id: UserId::from("u1"),
            external_id: ExternalId::from("x1"),
            thread_id: ThreadId::from("t1"),
            subject: Some(subject.to_string()),
            from: Address::new(from),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            body_text: Some(body.to_string()),
            body_html: None,
            snippet: String::new(),
            labels: vec![],
            attachments: vec![],
            is_read: false,
            is_starred: false,
            is_important: false,
            received_at: Utc::now(),
            classification: None,
        }
    }

    #[tokio::test]
    async fn test_model_verdict_used_when_model_answers() {
        let model = Arc::new(MockModel::answering(work_verdict()));
        let classifier = Classifier::new(&RuleConfig::default(), Some(model.clone())).unwrap();

        let result = classifier
            .classify(&email(
                "Budget review",
                "cfo@corp.example",
                "Thanks, moving the budget review to Monday. Please confirm attendance.",
            ))
            .await;

        assert_eq!(result.category, Category::Work);
        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.source, ClassificationSource::Model);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.summary, "Budget review moved to Monday morning.");
        // Sentiment and action items still come from the rules.
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(!result.action_items.is_empty());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_when_model_fails() {
        let model = Arc::new(MockModel::failing());
        let classifier = Classifier::new(&RuleConfig::default(), Some(model.clone())).unwrap();

        let result = classifier
            .classify(&email(
                "Project deadline review",
                "pm@corp.example",
                "The client needs the deliverable on schedule.",
            ))
            .await;

        assert_eq!(result.source, ClassificationSource::Rules);
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.category, Category::Work);
        assert_eq!(result.summary, "Project deadline review");
        assert!(result.event_time.is_none());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_rules_used_without_model() {
        let classifier = Classifier::new(&RuleConfig::default(), None).unwrap();
        assert!(!classifier.has_model());

        let result = classifier
            .classify(&email(
                "Flash sale: 40% off everything",
                "deals@shop.example",
                "Limited time offer, unsubscribe below.",
            ))
            .await;

        assert_eq!(result.category, Category::Promotions);
        assert_eq!(result.source, ClassificationSource::Rules);
    }

    #[tokio::test]
    async fn test_spam_short_circuit_skips_model() {
        let model = Arc::new(MockModel::answering(work_verdict()));
        let classifier = Classifier::new(&RuleConfig::default(), Some(model.clone())).unwrap();

        let result = classifier
            .classify(&email(
                "WIN FREE MONEY!!! CLICK HERE",
                "promo99999@spam.example",
                "You are a lottery winner! Click here to claim your free money.",
            ))
            .await;

        assert_eq!(result.category, Category::Spam);
        assert_eq!(result.source, ClassificationSource::Rules);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_summary_rules() {
        let classifier = Classifier::new(&RuleConfig::default(), None).unwrap();

        let mut no_subject = email("x", "a@b.com", "body");
        no_subject.subject = None;
        let result = classifier.classify(&no_subject).await;
        assert_eq!(result.summary, "No summary available");

        let long_subject = "s".repeat(150);
        let result = classifier.classify(&email(&long_subject, "a@b.com", "body")).await;
        assert_eq!(result.summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(result.summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_probe_reports_model_health() {
        let healthy = Classifier::new(
            &RuleConfig::default(),
            Some(Arc::new(MockModel::answering(work_verdict()))),
        )
        .unwrap();
        assert!(healthy.probe().await);

        let failing = Classifier::new(
            &RuleConfig::default(),
            Some(Arc::new(MockModel::failing())),
        )
        .unwrap();
        assert!(!failing.probe().await);

        let unconfigured = Classifier::new(&RuleConfig::default(), None).unwrap();
        assert!(!unconfigured.probe().await);
    }
}
