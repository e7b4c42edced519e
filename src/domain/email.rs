//! Email domain types.
//!
//! Represents parsed, persisted email messages and related structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Classification, EmailId, ExternalId, ThreadId, UserId};

/// A parsed email message in canonical form.
///
/// Uniqueness is `(account_id, external_id)`; persisting the same pair
/// twice is a no-op on the insert side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Engine-assigned identifier, set when the message is parsed.
    pub id: EmailId,
    /// Account this email belongs to.
    pub account_id: AccountId,
    /// User owning the account.
    pub user_id: UserId,
    /// Provider-native message id. Dedup key within the account.
    pub external_id: ExternalId,
    /// Conversation thread this email belongs to.
    pub thread_id: ThreadId,
    /// Email subject line.
    pub subject: Option<String>,
    /// Sender address.
    pub from: Address,
    /// Primary recipient addresses.
    pub to: Vec<Address>,
    /// Carbon copy recipient addresses.
    pub cc: Vec<Address>,
    /// Blind carbon copy recipient addresses.
    pub bcc: Vec<Address>,
    /// Plain text body content.
    pub body_text: Option<String>,
    /// HTML body content.
    pub body_html: Option<String>,
    /// Short preview of the email content.
    pub snippet: String,
    /// Provider label names applied to this email.
    pub labels: Vec<String>,
    /// Attachment metadata. Content is not downloaded.
    pub attachments: Vec<Attachment>,
    /// Whether the email has been read.
    pub is_read: bool,
    /// Whether the email is starred/flagged.
    pub is_starred: bool,
    /// Whether the provider marked the email important.
    pub is_important: bool,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Classification outcome, once the email has been classified.
    pub classification: Option<Classification>,
}

impl Email {
    /// Body text for analysis: plain body first, then HTML, then snippet.
    pub fn analysis_text(&self) -> &str {
        self.body_text
            .as_deref()
            .or(self.body_html.as_deref())
            .unwrap_or(&self.snippet)
    }

    /// Subject line, or the empty string.
    pub fn subject_str(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }
}

/// An email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the display representation of this address.
    ///
    /// If a name is present, returns "Name <email>", otherwise just the email.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Metadata for a file attachment on an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Provider handle for downloading the content later.
    pub attachment_id: Option<String>,
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_with_name() {
        let addr = Address::with_name("test@example.com", "Test User");
        assert_eq!(addr.display(), "Test User <test@example.com>");
    }

    #[test]
    fn address_display_without_name() {
        let addr = Address::new("test@example.com");
        assert_eq!(addr.display(), "test@example.com");
    }

    #[test]
    fn attachment_serialization() {
        let attachment = Attachment {
            attachment_id: Some("att-1".to_string()),
            filename: "document.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 1024,
        };

        let json = serde_json::to_string(&attachment).unwrap();
        let deserialized: Attachment = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.filename, "document.pdf");
        assert_eq!(deserialized.size_bytes, 1024);
    }

    #[test]
    fn analysis_text_prefers_plain_body() {
        let mut email = test_email();
        email.body_text = Some("plain".to_string());
        email.body_html = Some("<p>html</p>".to_string());
        assert_eq!(email.analysis_text(), "plain");

        email.body_text = None;
        assert_eq!(email.analysis_text(), "<p>html</p>");

        email.body_html = None;
        assert_eq!(email.analysis_text(), "preview");
    }

    fn test_email() -> Email {
        Email {
            id: EmailId::from("email-1"),
            account_id: AccountId::from("acct-1"),
            user_id: UserId::from("user-1"),
            external_id: ExternalId::from("ext-1"),
            thread_id: ThreadId::from("thread-1"),
            subject: Some("Test".to_string()),
            from: Address::with_name("sender@example.com", "Sender"),
            to: vec![Address::new("recipient@example.com")],
            cc: vec![],
            bcc: vec![],
            body_text: None,
            body_html: None,
            snippet: "preview".to_string(),
            labels: vec!["INBOX".to_string()],
            attachments: vec![],
            is_read: false,
            is_starred: false,
            is_important: false,
            received_at: Utc::now(),
            classification: None,
        }
    }
}
