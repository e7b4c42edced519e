//! Deterministic classification rules.
//!
//! The rule engine scores category, priority, sentiment, spam, and
//! action items from keyword, domain, and sender tables. Tables live in
//! a serializable [`RuleConfig`] loaded once at startup and compiled
//! into an immutable [`RuleSet`]; classification itself never mutates
//! rule state.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Category, Email, Priority, Sentiment};

/// Score added per matching sender domain.
const DOMAIN_WEIGHT: f32 = 0.8;
/// Score added per keyword found in the subject.
const SUBJECT_KEYWORD_WEIGHT: f32 = 0.6;
/// Score added per keyword found in the body.
const BODY_KEYWORD_WEIGHT: f32 = 0.3;
/// Score added per matching sender substring.
const SENDER_WEIGHT: f32 = 0.7;
/// Score added per matching subject pattern.
const SUBJECT_PATTERN_WEIGHT: f32 = 0.5;
/// Per-category score ceiling.
const CATEGORY_SCORE_CAP: f32 = 1.0;
/// Below this best score, the category defaults to `other`.
const CATEGORY_THRESHOLD: f32 = 0.3;

/// Body keyword matches count at half the subject weight.
const PRIORITY_BODY_FACTOR: f32 = 0.5;
/// Bonus per time-sensitivity pattern that matches.
const TIME_SENSITIVE_BONUS: f32 = 5.0;
/// Priority score buckets, highest first.
const URGENT_THRESHOLD: f32 = 15.0;
const HIGH_THRESHOLD: f32 = 10.0;
const MEDIUM_THRESHOLD: f32 = 5.0;

/// Distinct spam keywords needed before the keyword rule fires.
const SPAM_KEYWORD_MINIMUM: usize = 2;
/// Uppercase ratio above which a subject looks shouted.
const CAPS_RATIO_LIMIT: f32 = 0.7;
/// Shorter subjects are exempt from the caps check.
const CAPS_MIN_SUBJECT_LEN: usize = 10;

/// Most action items kept per email.
const MAX_ACTION_ITEMS: usize = 3;
/// Action items longer than this are cut and ellipsized.
const MAX_ACTION_ITEM_CHARS: usize = 120;
/// Sentences shorter than this are fragments, not action items.
const MIN_ACTION_SENTENCE_CHARS: usize = 8;

/// Errors that can occur while compiling rule tables.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Matching tables for one category.
///
/// All matching is substring containment against lowercased email
/// fields: `domains` and `senders` against the sender, `keywords`
/// against subject and body, `subjects` against the subject only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRuleConfig {
    pub category: Category,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// Spam detection tables.
///
/// `patterns` and `sender_patterns` are regular expressions matched
/// against lowercased text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpamRuleConfig {
    pub keywords: Vec<String>,
    pub patterns: Vec<String>,
    pub sender_patterns: Vec<String>,
}

/// Sentiment keyword tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SentimentRuleConfig {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Complete rule tables in serializable form.
///
/// The default tables cover common mailbox traffic; deployments can
/// replace any of them through configuration. Category entries keep
/// their order: when two categories score equally, the earlier one
/// wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub categories: Vec<CategoryRuleConfig>,
    pub spam: SpamRuleConfig,
    pub priority_keywords: HashMap<String, f32>,
    pub priority_senders: HashMap<String, f32>,
    pub time_patterns: Vec<String>,
    pub sentiment: SentimentRuleConfig,
    pub action_phrases: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            spam: default_spam(),
            priority_keywords: default_priority_keywords(),
            priority_senders: default_priority_senders(),
            time_patterns: strings(&["today", "tomorrow", "deadline", "expires?", "urgent", "asap"]),
            sentiment: SentimentRuleConfig {
                positive: strings(&[
                    "thank",
                    "great",
                    "awesome",
                    "excellent",
                    "wonderful",
                    "congratulations",
                    "appreciate",
                    "love",
                    "happy",
                    "glad",
                    "perfect",
                    "pleased",
                    "fantastic",
                ]),
                negative: strings(&[
                    "unfortunately",
                    "problem",
                    "issue",
                    "concern",
                    "complaint",
                    "error",
                    "failed",
                    "failure",
                    "disappointed",
                    "sorry",
                    "frustrated",
                    "angry",
                    "wrong",
                    "broken",
                    "delay",
                    "cancelled",
                ]),
            },
            action_phrases: strings(&[
                "please",
                "can you",
                "could you",
                "would you",
                "need to",
                "needs to",
                "must",
                "remember to",
                "don't forget",
                "make sure",
                "action required",
                "let me know",
                "rsvp",
                "respond by",
                "reply by",
                "due by",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_categories() -> Vec<CategoryRuleConfig> {
    vec![
        CategoryRuleConfig {
            category: Category::Social,
            domains: strings(&[
                "facebook.com",
                "twitter.com",
                "linkedin.com",
                "instagram.com",
                "snapchat.com",
                "tiktok.com",
                "youtube.com",
                "pinterest.com",
            ]),
            keywords: strings(&[
                "friend request",
                "connection",
                "follow",
                "mentioned you",
                "comment",
                "share",
                "tagged",
                "story",
            ]),
            senders: strings(&[
                "noreply@facebook.com",
                "notify@twitter.com",
                "messages-noreply@linkedin.com",
            ]),
            subjects: vec![],
        },
        CategoryRuleConfig {
            category: Category::Promotions,
            domains: vec![],
            keywords: strings(&[
                "sale",
                "discount",
                "offer",
                "deal",
                "coupon",
                "promo",
                "special",
                "limited time",
                "exclusive",
                "save",
                "free shipping",
                "clearance",
                "black friday",
                "cyber monday",
                "flash sale",
                "unsubscribe",
            ]),
            senders: strings(&["noreply", "marketing", "promotions", "offers", "deals"]),
            subjects: strings(&["newsletter", "weekly digest", "monthly update"]),
        },
        CategoryRuleConfig {
            category: Category::Updates,
            domains: vec![],
            keywords: strings(&[
                "notification",
                "alert",
                "reminder",
                "update",
                "confirmation",
                "receipt",
                "invoice",
                "statement",
                "report",
                "summary",
                "security",
                "password",
                "account",
                "billing",
            ]),
            senders: strings(&["no-reply", "donotreply", "automated", "system", "support"]),
            subjects: vec![],
        },
        CategoryRuleConfig {
            category: Category::Forums,
            domains: strings(&[
                "reddit.com",
                "stackoverflow.com",
                "github.com",
                "discourse.org",
            ]),
            keywords: strings(&[
                "forum",
                "discussion",
                "thread",
                "digest",
                "community",
                "mailing list",
                "board",
                "topic",
            ]),
            senders: vec![],
            subjects: vec![],
        },
        CategoryRuleConfig {
            category: Category::Work,
            domains: vec![],
            keywords: strings(&[
                "meeting",
                "project",
                "deadline",
                "report",
                "invoice",
                "budget",
                "presentation",
                "conference",
                "review",
                "agenda",
                "schedule",
                "proposal",
                "contract",
                "client",
                "customer",
                "task",
                "assignment",
                "quarterly",
                "annual",
                "performance",
                "strategy",
                "deliverable",
            ]),
            senders: vec![],
            subjects: vec![],
        },
        CategoryRuleConfig {
            category: Category::Personal,
            domains: strings(&["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"]),
            keywords: strings(&[
                "birthday",
                "dinner",
                "weekend",
                "family",
                "friend",
                "vacation",
                "party",
                "wedding",
                "anniversary",
                "celebration",
                "lunch",
                "coffee",
                "drinks",
                "movie",
                "concert",
                "trip",
                "holiday",
            ]),
            senders: vec![],
            subjects: vec![],
        },
    ]
}

fn default_spam() -> SpamRuleConfig {
    SpamRuleConfig {
        keywords: strings(&[
            "viagra",
            "casino",
            "lottery",
            "winner",
            "congratulations",
            "act now",
            "limited time",
            "click here",
            "free money",
            "make money fast",
            "work from home",
            "lose weight",
            "nigerian prince",
            "verify your account",
        ]),
        patterns: strings(&[
            r"\$\d+,?\d*\s*(million|thousand)",
            r"you.*(won|win).*(lottery|prize)",
            r"urgent.*(action|response).*(required|needed)",
        ]),
        sender_patterns: strings(&[r"[0-9]{5,}", "temp", "fake"]),
    }
}

fn default_priority_keywords() -> HashMap<String, f32> {
    weights(&[
        ("urgent", 10.0),
        ("asap", 9.0),
        ("interview", 9.0),
        ("security", 9.0),
        ("important", 8.0),
        ("contract", 8.0),
        ("alert", 8.0),
        ("deadline", 7.0),
        ("invoice", 7.0),
        ("payment", 7.0),
        ("meeting", 6.0),
    ])
}

fn default_priority_senders() -> HashMap<String, f32> {
    weights(&[
        ("boss", 10.0),
        ("security", 10.0),
        ("client", 9.0),
        ("legal", 9.0),
        ("manager", 8.0),
        ("hr@", 8.0),
        ("customer", 7.0),
        ("finance", 7.0),
    ])
}

fn weights(items: &[(&str, f32)]) -> HashMap<String, f32> {
    items.iter().map(|(k, w)| (k.to_string(), *w)).collect()
}

/// Lowercased fields of one email, prepared once per classification.
#[derive(Debug)]
pub struct RuleInput {
    subject_raw: String,
    subject: String,
    from_email: String,
    from_name: String,
    body_raw: String,
    body: String,
}

impl RuleInput {
    pub fn new(email: &Email) -> Self {
        let subject_raw = email.subject_str().to_string();
        let body_raw = email.analysis_text().to_string();
        Self {
            subject: subject_raw.to_lowercase(),
            subject_raw,
            from_email: email.from.email.to_lowercase(),
            from_name: email
                .from
                .name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
            body: body_raw.to_lowercase(),
            body_raw,
        }
    }
}

#[derive(Debug)]
struct CategoryMatcher {
    category: Category,
    domains: Vec<String>,
    keywords: Vec<String>,
    senders: Vec<String>,
    subjects: Vec<String>,
}

#[derive(Debug)]
struct SpamMatcher {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
    sender_patterns: Vec<Regex>,
}

/// Compiled, immutable rule tables.
#[derive(Debug)]
pub struct RuleSet {
    categories: Vec<CategoryMatcher>,
    spam: SpamMatcher,
    priority_keywords: Vec<(String, f32)>,
    priority_senders: Vec<(String, f32)>,
    time_patterns: Vec<Regex>,
    positive: Vec<String>,
    negative: Vec<String>,
    action_phrases: Vec<String>,
}

impl RuleSet {
    /// Compiles a configuration, lowercasing every term and building
    /// the regular expressions. Fails on the first invalid pattern.
    pub fn compile(config: &RuleConfig) -> Result<Self, RuleError> {
        let categories = config
            .categories
            .iter()
            .map(|c| CategoryMatcher {
                category: c.category,
                domains: lower_all(&c.domains),
                keywords: lower_all(&c.keywords),
                senders: lower_all(&c.senders),
                subjects: lower_all(&c.subjects),
            })
            .collect();

        let spam = SpamMatcher {
            keywords: lower_all(&config.spam.keywords),
            patterns: compile_all(&config.spam.patterns)?,
            sender_patterns: compile_all(&config.spam.sender_patterns)?,
        };

        Ok(Self {
            categories,
            spam,
            priority_keywords: lower_weights(&config.priority_keywords),
            priority_senders: lower_weights(&config.priority_senders),
            time_patterns: compile_all(&config.time_patterns)?,
            positive: lower_all(&config.sentiment.positive),
            negative: lower_all(&config.sentiment.negative),
            action_phrases: lower_all(&config.action_phrases),
        })
    }

    /// Spam check, run before any category scoring.
    ///
    /// Fires when enough spam keywords appear, any suspicious pattern
    /// matches, the subject is mostly uppercase, or the sender itself
    /// looks suspicious.
    pub fn is_spam(&self, input: &RuleInput) -> bool {
        let keyword_hits = self
            .spam
            .keywords
            .iter()
            .filter(|kw| input.subject.contains(kw.as_str()) || input.body.contains(kw.as_str()))
            .count();
        if keyword_hits >= SPAM_KEYWORD_MINIMUM {
            return true;
        }

        if self
            .spam
            .patterns
            .iter()
            .any(|p| p.is_match(&input.subject) || p.is_match(&input.body))
        {
            return true;
        }

        let subject_len = input.subject_raw.chars().count();
        if subject_len > CAPS_MIN_SUBJECT_LEN {
            let caps = input
                .subject_raw
                .chars()
                .filter(|c| c.is_ascii_uppercase())
                .count();
            if caps as f32 / subject_len as f32 > CAPS_RATIO_LIMIT {
                return true;
            }
        }

        self.spam
            .sender_patterns
            .iter()
            .any(|p| p.is_match(&input.from_email))
    }

    /// Scores every category and returns the winner with its score.
    ///
    /// Earlier table entries win ties. A best score below the minimum
    /// threshold falls back to [`Category::Other`].
    pub fn best_category(&self, input: &RuleInput) -> (Category, f32) {
        let mut best = (Category::Other, 0.0f32);
        for matcher in &self.categories {
            let score = self.category_score(matcher, input);
            if score > best.1 {
                best = (matcher.category, score);
            }
        }

        if best.1 < CATEGORY_THRESHOLD {
            (Category::Other, best.1)
        } else {
            best
        }
    }

    fn category_score(&self, matcher: &CategoryMatcher, input: &RuleInput) -> f32 {
        let mut score = 0.0;

        for domain in &matcher.domains {
            if input.from_email.contains(domain) {
                score += DOMAIN_WEIGHT;
            }
        }

        for keyword in &matcher.keywords {
            if input.subject.contains(keyword) {
                score += SUBJECT_KEYWORD_WEIGHT;
            }
            if input.body.contains(keyword) {
                score += BODY_KEYWORD_WEIGHT;
            }
        }

        for sender in &matcher.senders {
            if input.from_email.contains(sender) || input.from_name.contains(sender) {
                score += SENDER_WEIGHT;
            }
        }

        for pattern in &matcher.subjects {
            if input.subject.contains(pattern) {
                score += SUBJECT_PATTERN_WEIGHT;
            }
        }

        score.min(CATEGORY_SCORE_CAP)
    }

    /// Buckets the weighted priority score into the priority scale.
    pub fn priority(&self, input: &RuleInput) -> Priority {
        let score = self.priority_score(input);
        if score >= URGENT_THRESHOLD {
            Priority::Urgent
        } else if score >= HIGH_THRESHOLD {
            Priority::High
        } else if score >= MEDIUM_THRESHOLD {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    fn priority_score(&self, input: &RuleInput) -> f32 {
        let mut score = 0.0;

        for (keyword, weight) in &self.priority_keywords {
            if input.subject.contains(keyword) {
                score += weight;
            }
            if input.body.contains(keyword) {
                score += weight * PRIORITY_BODY_FACTOR;
            }
        }

        for (sender, weight) in &self.priority_senders {
            if input.from_email.contains(sender) || input.from_name.contains(sender) {
                score += weight;
            }
        }

        for pattern in &self.time_patterns {
            if pattern.is_match(&input.subject) || pattern.is_match(&input.body) {
                score += TIME_SENSITIVE_BONUS;
            }
        }

        score
    }

    /// Majority vote over positive and negative keyword hits; ties and
    /// silence are neutral.
    pub fn sentiment(&self, input: &RuleInput) -> Sentiment {
        let text = &input.body;
        let positive = self.positive.iter().filter(|w| text.contains(w.as_str())).count();
        let negative = self.negative.iter().filter(|w| text.contains(w.as_str())).count();

        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }

    /// Pulls up to three actionable sentences out of the body.
    ///
    /// A sentence qualifies when it contains any action phrase; kept
    /// sentences are trimmed and length-capped.
    pub fn action_items(&self, input: &RuleInput) -> Vec<String> {
        let mut items = Vec::new();

        for sentence in input
            .body_raw
            .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        {
            let sentence = sentence.trim();
            if sentence.chars().count() < MIN_ACTION_SENTENCE_CHARS {
                continue;
            }

            let lowered = sentence.to_lowercase();
            if self.action_phrases.iter().any(|p| lowered.contains(p)) {
                items.push(clip_item(sentence));
                if items.len() == MAX_ACTION_ITEMS {
                    break;
                }
            }
        }

        items
    }
}

fn lower_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

fn lower_weights(table: &HashMap<String, f32>) -> Vec<(String, f32)> {
    table.iter().map(|(k, w)| (k.to_lowercase(), *w)).collect()
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, RuleError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| RuleError::BadPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

fn clip_item(sentence: &str) -> String {
    if sentence.chars().count() <= MAX_ACTION_ITEM_CHARS {
        return sentence.to_string();
    }
    let mut out: String = sentence.chars().take(MAX_ACTION_ITEM_CHARS - 3).collect();
    out.push_str("...");
    out
}
