//! Classification domain types.
//!
//! The closed category/priority/sentiment vocabularies and the
//! classification block attached to each processed email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mailbox category assigned to an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Work correspondence.
    Work,
    /// Personal correspondence.
    Personal,
    /// Marketing and deals.
    Promotions,
    /// Social network notifications.
    Social,
    /// Receipts, shipping notices, statements, alerts.
    Updates,
    /// Mailing lists and discussion groups.
    Forums,
    /// Unsolicited or malicious mail.
    Spam,
    /// Anything that matched nothing else.
    Other,
}

impl Category {
    /// Wire-format name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Promotions => "promotions",
            Self::Social => "social",
            Self::Updates => "updates",
            Self::Forums => "forums",
            Self::Spam => "spam",
            Self::Other => "other",
        }
    }

    /// Parses a category name case-insensitively.
    ///
    /// Accepts the older "promotional" spelling. Returns `None` for
    /// anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "work" => Some(Self::Work),
            "personal" => Some(Self::Personal),
            "promotions" | "promotional" => Some(Self::Promotions),
            "social" => Some(Self::Social),
            "updates" => Some(Self::Updates),
            "forums" => Some(Self::Forums),
            "spam" => Some(Self::Spam),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// All categories, in wire order.
    pub fn all() -> &'static [Category] {
        &[
            Self::Work,
            Self::Personal,
            Self::Promotions,
            Self::Social,
            Self::Updates,
            Self::Forums,
            Self::Spam,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority assigned to an email, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait indefinitely.
    Low,
    /// Default for anything unremarkable.
    Medium,
    /// Wants attention today.
    High,
    /// Wants attention now.
    Urgent,
}

impl Priority {
    /// Wire-format name of this priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Parses a priority name case-insensitively.
    ///
    /// Accepts the older "normal" spelling for medium. Returns `None`
    /// for anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall tone of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// More positive than negative signals.
    Positive,
    /// Balanced or no signals.
    Neutral,
    /// More negative than positive signals.
    Negative,
}

impl Sentiment {
    /// Wire-format name of this sentiment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    /// Remote classification model.
    Model,
    /// Deterministic rule engine.
    Rules,
}

/// Classification outcome attached to an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category.
    pub category: Category,
    /// Assigned priority.
    pub priority: Priority,
    /// Assigned sentiment.
    pub sentiment: Sentiment,
    /// One-line summary, at most 100 characters.
    pub summary: String,
    /// Extracted follow-ups, at most three.
    pub action_items: Vec<String>,
    /// Meeting or deadline time mentioned in the email, if any.
    pub event_time: Option<DateTime<Utc>>,
    /// Strategy confidence in the 0.0 to 1.0 range.
    pub confidence: f32,
    /// Strategy that produced this block.
    pub source: ClassificationSource,
    /// When the classification ran.
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(Category::parse("Work"), Some(Category::Work));
        assert_eq!(Category::parse(" SPAM "), Some(Category::Spam));
        assert_eq!(Category::parse("promotional"), Some(Category::Promotions));
        assert_eq!(Category::parse("newsletter"), None);
    }

    #[test]
    fn priority_parse_accepts_normal() {
        assert_eq!(Priority::parse("normal"), Some(Priority::Medium));
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
        assert_eq!(Priority::parse("critical"), None);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn category_wire_form_is_lowercase() {
        let json = serde_json::to_string(&Category::Promotions).unwrap();
        assert_eq!(json, "\"promotions\"");
    }

    #[test]
    fn classification_round_trip() {
        let block = Classification {
            category: Category::Work,
            priority: Priority::High,
            sentiment: Sentiment::Neutral,
            summary: "Quarterly report due Friday".to_string(),
            action_items: vec!["Send the report by Friday".to_string()],
            event_time: None,
            confidence: 0.9,
            source: ClassificationSource::Model,
            processed_at: Utc::now(),
        };

        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"source\":\"model\""));

        let back: Classification = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, Category::Work);
        assert_eq!(back.priority, Priority::High);
    }
}
