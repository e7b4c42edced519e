//! OpenAI-compatible classification backend.
//!
//! Works with OpenAI, vLLM, LM Studio, and other compatible endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::traits::{ClassificationModel, ModelError, ModelRequest, ModelResult, ModelVerdict};

/// Default base URL for OpenAI API.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Low temperature keeps verdicts deterministic across retries.
const TEMPERATURE: f32 = 0.1;

/// A verdict object fits comfortably in 300 tokens.
const MAX_TOKENS: usize = 300;

const SYSTEM_PROMPT: &str = "You are an expert email classifier. \
    Always respond with valid JSON matching the exact schema provided.";

/// OpenAI API request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

/// Classification backend for OpenAI-compatible APIs.
///
/// Works with:
/// - OpenAI API (api.openai.com)
/// - vLLM
/// - LM Studio
/// - Any other endpoint speaking the chat-completions protocol
pub struct OpenAiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiModel {
    /// Creates a new backend for OpenAI's API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: Some(api_key.into()),
            model: model.into(),
        }
    }

    /// Creates a new backend for a custom endpoint.
    pub fn custom(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn build_request(&self, request: &ModelRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> ModelError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());

            return ModelError::RateLimited {
                retry_after_secs: retry_after,
            };
        }

        if let Ok(body) = response.json::<ApiErrorBody>().await {
            if status == 401 || body.error.code.as_deref() == Some("invalid_api_key") {
                return ModelError::AuthenticationError(body.error.message);
            }
            return ModelError::ApiError {
                status,
                message: body.error.message,
            };
        }

        ModelError::ApiError {
            status,
            message: format!("HTTP {}", status),
        }
    }
}

/// Renders the user prompt for one email.
fn build_prompt(request: &ModelRequest) -> String {
    format!(
        "Analyze this email and provide:\n\
         1. Category: one of work, personal, promotions, social, updates, forums, spam, other\n\
         2. Priority: one of urgent, high, medium, low\n\
         3. Summary (max 100 characters)\n\
         4. The event date or deadline mentioned, if any\n\
         \n\
         Subject: {}\n\
         From: {}\n\
         Content: {}\n\
         \n\
         Respond in JSON format:\n\
         {{\n\
           \"category\": \"work|personal|promotions|social|updates|forums|spam|other\",\n\
           \"priority\": \"urgent|high|medium|low\",\n\
           \"summary\": \"string (max 100 characters)\",\n\
           \"datetime\": \"ISO 8601 date string or null\"\n\
         }}",
        request.subject, request.sender, request.body
    )
}

#[async_trait]
impl ClassificationModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn classify(&self, request: &ModelRequest) -> ModelResult<ModelVerdict> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(request);

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("No choices in response".to_string()))?;

        ModelVerdict::from_json(&text)
    }
}
