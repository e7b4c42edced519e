//! Gmail API client implementation.
//!
//! This module provides a [`MailClient`] implementation using the Gmail
//! REST API. Listing and fetching run against the authenticated user's
//! mailbox with a bearer token supplied per call.
//!
//! # API Usage
//!
//! This client uses the Gmail API v1:
//! - `users.messages.list` for paginated message listing
//! - `users.messages.get` with `format=full` for complete messages

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use serde::Deserialize;
use url::form_urlencoded;

use super::{MailClient, MessagePage, ProviderError, Result};
use crate::domain::{
    Credentials, ExternalId, Header, MessagePart, MessageRef, PartBody, RawMessage, SyncWatermark,
    ThreadId,
};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Mailboxes covered by a sync pass.
const QUERY_SCOPE: &str = "in:inbox OR in:sent";

/// Gmail caps `maxResults` on message listing.
const MAX_PAGE_SIZE: u32 = 500;

/// Gmail message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageListEntry>>,
    next_page_token: Option<String>,
    #[allow(dead_code)]
    result_size_estimate: Option<u32>,
}

/// Gmail message list entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListEntry {
    id: String,
    thread_id: String,
}

/// Gmail full message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: String,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    payload: Option<GmailPart>,
    internal_date: Option<String>,
}

/// Gmail MIME part. The message payload root uses the same shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    filename: Option<String>,
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail part body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    data: Option<String>,
    size: Option<u64>,
    attachment_id: Option<String>,
}

/// Gmail API client.
///
/// Stateless: credentials are passed with each call and the client holds
/// only the HTTP connection pool.
pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    /// Creates a client against the production Gmail endpoint.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Builds authorization headers from the supplied credentials.
    fn auth_headers(credentials: &Credentials) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        credentials: &Credentials,
        endpoint: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = Self::auth_headers(credentials)?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after,
            },
            500..=599 => ProviderError::Connection(format!("API error ({}): {}", status, body)),
            _ => ProviderError::Provider(format!("API error ({}): {}", status, body)),
        }
    }

    /// Converts a Gmail wire message to the canonical raw form.
    fn into_raw(msg: GmailMessage) -> RawMessage {
        RawMessage {
            id: ExternalId::from(msg.id),
            thread_id: ThreadId::from(msg.thread_id),
            labels: msg.label_ids.unwrap_or_default(),
            snippet: msg.snippet.unwrap_or_default(),
            internal_ms: msg.internal_date.as_deref().and_then(|d| d.parse().ok()),
            payload: msg.payload.map(Self::convert_part),
        }
    }

    fn convert_part(part: GmailPart) -> MessagePart {
        MessagePart {
            mime_type: part.mime_type.unwrap_or_default(),
            filename: part.filename,
            headers: part
                .headers
                .unwrap_or_default()
                .into_iter()
                .map(|h| Header::new(h.name, h.value))
                .collect(),
            body: part.body.map(|b| PartBody {
                data: b.data,
                size: b.size.unwrap_or(0),
                attachment_id: b.attachment_id,
            }),
            parts: part
                .parts
                .unwrap_or_default()
                .into_iter()
                .map(Self::convert_part)
                .collect(),
        }
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailClient for GmailClient {
    /// Always restricts to inbox and sent mail. A timestamp watermark adds
    /// an `after:` clause in epoch seconds; Gmail treats the bound as
    /// at-or-after, so the boundary message reappears and is dropped by
    /// dedup. A cursor watermark contributes nothing here because the
    /// stored page token resumes the listing by itself.
    fn build_query(&self, watermark: Option<&SyncWatermark>) -> String {
        match watermark.and_then(SyncWatermark::timestamp) {
            Some(at) => format!("{} after:{}", QUERY_SCOPE, at.timestamp()),
            None => QUERY_SCOPE.to_string(),
        }
    }

    async fn list_page(
        &self,
        credentials: &Credentials,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage> {
        // The serializer is not Send; keep it scoped out of the await.
        let endpoint = {
            let mut qs = form_urlencoded::Serializer::new(String::new());
            qs.append_pair("q", query);
            qs.append_pair(
                "maxResults",
                &max_results.clamp(1, MAX_PAGE_SIZE).to_string(),
            );
            if let Some(token) = page_token {
                qs.append_pair("pageToken", token);
            }
            format!("/messages?{}", qs.finish())
        };
        let response: MessageListResponse = self.get(credentials, &endpoint).await?;

        let refs = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageRef {
                id: ExternalId::from(m.id),
                thread_id: ThreadId::from(m.thread_id),
            })
            .collect();

        Ok(MessagePage {
            refs,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_full(
        &self,
        credentials: &Credentials,
        message: &MessageRef,
    ) -> Result<RawMessage> {
        let endpoint = format!("/messages/{}?format=full", message.id);
        let msg: GmailMessage = self.get(credentials, &endpoint).await?;
        Ok(Self::into_raw(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn query_without_watermark_covers_default_window() {
        let client = GmailClient::new();
        assert_eq!(client.build_query(None), "in:inbox OR in:sent");
    }

    #[test]
    fn query_with_timestamp_watermark_adds_after_clause() {
        let client = GmailClient::new();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 45).unwrap();
        let wm = SyncWatermark::Timestamp { at };
        assert_eq!(
            client.build_query(Some(&wm)),
            format!("in:inbox OR in:sent after:{}", at.timestamp())
        );
    }

    #[test]
    fn query_with_cursor_watermark_has_no_date_clause() {
        let client = GmailClient::new();
        let wm = SyncWatermark::Cursor {
            token: "page-7".to_string(),
        };
        assert_eq!(client.build_query(Some(&wm)), "in:inbox OR in:sent");
    }

    #[test]
    fn list_response_deserializes() {
        let json = r#"{
            "messages": [
                {"id": "18c2f0a9", "threadId": "18c2f0a0"},
                {"id": "18c2f0b1", "threadId": "18c2f0a0"}
            ],
            "nextPageToken": "tok-2",
            "resultSizeEstimate": 120
        }"#;

        let response: MessageListResponse = serde_json::from_str(json).unwrap();
        let messages = response.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "18c2f0a9");
        assert_eq!(response.next_page_token, Some("tok-2".to_string()));
    }

    #[test]
    fn empty_list_response_deserializes() {
        let response: MessageListResponse =
            serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(response.messages.is_none());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn full_message_converts_to_raw() {
        let json = r#"{
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "Quick preview",
            "internalDate": "1717243845000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "Subject", "value": "Report"},
                    {"name": "From", "value": "Ana <ana@example.com>"}
                ],
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "body": {"data": "aGVsbG8", "size": 5}
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "report.pdf",
                        "body": {"attachmentId": "att-9", "size": 2048}
                    }
                ]
            }
        }"#;

        let msg: GmailMessage = serde_json::from_str(json).unwrap();
        let raw = GmailClient::into_raw(msg);

        assert_eq!(raw.id, ExternalId::from("m1"));
        assert_eq!(raw.labels, vec!["INBOX", "UNREAD"]);
        assert_eq!(raw.internal_ms, Some(1717243845000));

        let payload = raw.payload.unwrap();
        assert_eq!(payload.mime_type, "multipart/mixed");
        assert_eq!(payload.headers.len(), 2);
        assert_eq!(payload.parts.len(), 2);
        assert_eq!(payload.parts[1].filename.as_deref(), Some("report.pdf"));
        assert_eq!(
            payload.parts[1].body.as_ref().unwrap().attachment_id,
            Some("att-9".to_string())
        );
    }

    #[test]
    fn sparse_message_converts_with_defaults() {
        let msg: GmailMessage = serde_json::from_str(r#"{"id": "m2", "threadId": "t2"}"#).unwrap();
        let raw = GmailClient::into_raw(msg);

        assert!(raw.labels.is_empty());
        assert!(raw.snippet.is_empty());
        assert!(raw.internal_ms.is_none());
        assert!(raw.payload.is_none());
    }
}
