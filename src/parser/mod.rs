//! Raw message parsing.
//!
//! Converts a provider-neutral [`RawMessage`] part tree into the
//! canonical [`Email`] record: headers resolved case-insensitively,
//! bodies pulled out of the MIME tree, attachment metadata collected,
//! and label-derived flags set.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    Account, Address, Attachment, Email, EmailId, Header, MessagePart, RawMessage,
};

/// Recursion limit for MIME part trees.
///
/// Provider payloads are shallow in practice; the guard only protects
/// against a hostile or corrupt tree.
const MAX_MIME_DEPTH: usize = 32;

/// Errors that can occur while parsing a raw message.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("message {0} has no payload")]
    MissingPayload(String),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Parses raw remote messages into canonical emails.
///
/// Stateless; one instance serves every account.
#[derive(Debug, Default, Clone)]
pub struct MessageParser;

impl MessageParser {
    pub fn new() -> Self {
        Self
    }

    /// Converts one fetched message into an [`Email`] owned by `account`.
    ///
    /// The returned email carries a freshly generated id and no
    /// classification block.
    pub fn parse(&self, account: &Account, msg: &RawMessage) -> Result<Email> {
        let payload = msg
            .payload
            .as_ref()
            .ok_or_else(|| ParseError::MissingPayload(msg.id.to_string()))?;

        let subject = get_header(&payload.headers, "Subject").filter(|s| !s.is_empty());

        let from = get_header(&payload.headers, "From")
            .as_deref()
            .and_then(parse_address)
            .unwrap_or_else(|| Address::new("unknown@unknown.invalid"));

        let to = get_header(&payload.headers, "To")
            .map(|v| parse_address_list(&v))
            .unwrap_or_default();

        let cc = get_header(&payload.headers, "Cc")
            .map(|v| parse_address_list(&v))
            .unwrap_or_default();

        let bcc = get_header(&payload.headers, "Bcc")
            .map(|v| parse_address_list(&v))
            .unwrap_or_default();

        let mut body_text = None;
        let mut body_html = None;
        extract_bodies(payload, &mut body_text, &mut body_html, 0);

        let mut attachments = Vec::new();
        collect_attachments(payload, &mut attachments, 0);

        let received_at = msg
            .internal_ms
            .and_then(DateTime::from_timestamp_millis)
            .or_else(|| {
                get_header(&payload.headers, "Date")
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|d| d.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now);

        let is_read = !msg.labels.iter().any(|l| l == "UNREAD");
        let is_starred = msg.labels.iter().any(|l| l == "STARRED");
        let is_important = msg.labels.iter().any(|l| l == "IMPORTANT");

        Ok(Email {
            id: EmailId::generate(),
            account_id: account.id.clone(),
            user_id: account.user_id.clone(),
            external_id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
            subject,
            from,
            to,
            cc,
            bcc,
            body_text,
            body_html,
            snippet: msg.snippet.clone(),
            labels: msg.labels.clone(),
            attachments,
            is_read,
            is_starred,
            is_important,
            received_at,
            classification: None,
        })
    }
}

/// Case-insensitive header lookup; first match wins.
fn get_header(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.trim().to_string())
}

/// Parses one address entry like `"Display Name" <addr@host>` or a bare
/// address. Returns `None` when no usable address can be recovered.
fn parse_address(value: &str) -> Option<Address> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let (Some(start), Some(end)) = (value.find('<'), value.rfind('>')) {
        if start < end {
            let email = value[start + 1..end].trim();
            if !is_plausible_address(email) {
                return None;
            }
            let name = value[..start].trim().trim_matches('"').trim();
            return Some(if name.is_empty() {
                Address::new(email)
            } else {
                Address::with_name(email, name)
            });
        }
    }

    let bare = value.trim_matches('"').trim();
    if is_plausible_address(bare) {
        Some(Address::new(bare))
    } else {
        None
    }
}

/// Splits an address-list header on top-level commas and parses each
/// entry. Commas inside quoted display names or angle brackets do not
/// split. Unparseable entries are dropped.
fn parse_address_list(value: &str) -> Vec<Address> {
    split_top_level(value)
        .iter()
        .filter_map(|entry| parse_address(entry))
        .collect()
}

fn is_plausible_address(s: &str) -> bool {
    !s.is_empty() && s.contains('@')
}

/// Splits on commas outside quotes and angle brackets.
fn split_top_level(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
            ',' if !in_quotes && angle_depth == 0 => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// Walks the part tree and fills the first `text/plain` and first
/// `text/html` bodies found. Recurses into multipart containers.
fn extract_bodies(
    part: &MessagePart,
    text: &mut Option<String>,
    html: &mut Option<String>,
    depth: usize,
) {
    if depth > MAX_MIME_DEPTH || (text.is_some() && html.is_some()) {
        return;
    }

    if part.mime_type == "text/plain" && text.is_none() {
        if let Some(decoded) = decode_part_data(part) {
            *text = Some(decoded);
        }
    } else if part.mime_type == "text/html" && html.is_none() {
        if let Some(decoded) = decode_part_data(part) {
            *html = Some(decoded);
        }
    }

    for nested in &part.parts {
        extract_bodies(nested, text, html, depth + 1);
    }
}

/// Decodes a leaf part's inline base64url body to UTF-8 text.
fn decode_part_data(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    let decoded = BASE64_URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(decoded).ok()
}

/// Collects attachment metadata depth-first: any part carrying a
/// non-empty filename counts, regardless of nesting.
fn collect_attachments(part: &MessagePart, out: &mut Vec<Attachment>, depth: usize) {
    if depth > MAX_MIME_DEPTH {
        return;
    }

    if let Some(filename) = part.filename.as_deref() {
        if !filename.is_empty() {
            out.push(Attachment {
                attachment_id: part.body.as_ref().and_then(|b| b.attachment_id.clone()),
                filename: filename.to_string(),
                content_type: part.mime_type.clone(),
                size_bytes: part.body.as_ref().map(|b| b.size).unwrap_or(0),
            });
        }
    }

    for nested in &part.parts {
        collect_attachments(nested, out, depth + 1);
    }
}
