//! Gemini `generateContent` client implementing [`AiCapability`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use openkeywords_shared::{AiCapability, AiError, AiRequest, GeminiConfig, Result};

use crate::json::extract_json;
use crate::{build_client, trim_base};

/// Characters of an unparseable body kept in the error message.
const BODY_PREVIEW: usize = 200;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Grounded calls run a web search first and get a longer deadline.
    pub grounded_timeout: Duration,
}

impl GeminiOptions {
    pub fn from_config(config: &GeminiConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            grounded_timeout: Duration::from_secs(config.grounded_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: Client,
    opts: GeminiOptions,
}

impl GeminiClient {
    pub fn new(opts: GeminiOptions) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            trim_base(&self.opts.base_url),
            self.opts.model
        )
    }
}

/// Request body for one call.
///
/// The API refuses a response schema together with the search tool, so
/// grounded calls carry the schema in the prompt instead.
fn request_body(request: &AiRequest) -> Value {
    let mut prompt = request.prompt.clone();
    let mut generation_config = json!({ "temperature": request.temperature });

    match (&request.schema, request.grounded) {
        (Some(schema), false) => {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }
        (Some(schema), true) => {
            prompt.push_str("\n\nRespond with JSON only, matching this schema:\n");
            prompt.push_str(&serde_json::to_string_pretty(schema).unwrap_or_default());
        }
        (None, false) => {
            generation_config["responseMimeType"] = json!("application/json");
        }
        (None, true) => {}
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": generation_config,
    });
    if request.grounded {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW).collect()
}

fn map_send_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Unknown(format!("request failed: {e}"))
    }
}

#[async_trait]
impl AiCapability for GeminiClient {
    #[instrument(skip_all, fields(task = request.task.as_str(), grounded = request.grounded))]
    async fn generate(&self, request: AiRequest) -> std::result::Result<Value, AiError> {
        let timeout = if request.grounded {
            self.opts.grounded_timeout
        } else {
            self.opts.timeout
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.opts.api_key)
            .timeout(timeout)
            .json(&request_body(&request))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("gemini rate limited");
            return Err(AiError::RateLimited);
        }
        let body = response.text().await.map_err(map_send_error)?;
        if !status.is_success() {
            return Err(AiError::Unknown(format!(
                "gemini HTTP {status}: {}",
                preview(&body)
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::InvalidResponse(format!("malformed envelope: {e}")))?;
        let text = parsed.text();
        debug!(chars = text.len(), "gemini response received");

        if text.trim().is_empty() {
            return Err(AiError::InvalidResponse("empty response".into()));
        }
        extract_json(&text).ok_or_else(|| {
            AiError::InvalidResponse(format!("no JSON in response: {}", preview(&text)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openkeywords_shared::AiTask;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiOptions {
            api_key: "test-key".into(),
            model: "gemini-test".into(),
            base_url: format!("{}/", server.uri()),
            timeout: Duration::from_secs(5),
            grounded_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn envelope(text: &str) -> Value {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
    }

    fn scoring_request() -> AiRequest {
        AiRequest::new(AiTask::Scoring, "score these")
            .with_schema(json!({ "type": "object" }))
            .with_temperature(0.2)
    }

    #[test]
    fn structured_body_sets_schema() {
        let body = request_body(&scoring_request());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"], json!({ "type": "object" }));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn grounded_body_moves_schema_into_prompt() {
        let request = AiRequest::new(AiTask::Research, "find threads")
            .with_schema(json!({ "type": "object" }))
            .grounded();
        let body = request_body(&request);
        assert_eq!(body["tools"], json!([{ "google_search": {} }]));
        assert!(body["generationConfig"].get("responseSchema").is_none());
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.starts_with("find threads"));
        assert!(prompt.contains("\"type\": \"object\""));
    }

    #[tokio::test]
    async fn returns_parsed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(
                json!({ "generationConfig": { "responseMimeType": "application/json" } }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                r#"{"scores":[{"keyword":"crm pricing","score":80}]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let value = client(&server).generate(scoring_request()).await.unwrap();
        assert_eq!(value["scores"][0]["score"], 80);
    }

    #[tokio::test]
    async fn grounded_prose_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                "Found these:\n```json\n{\"keywords\": []}\n```",
            )))
            .mount(&server)
            .await;

        let request = AiRequest::new(AiTask::Research, "find").grounded();
        let value = client(&server).generate(request).await.unwrap();
        assert_eq!(value, json!({ "keywords": [] }));
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).generate(scoring_request()).await.unwrap_err();
        assert_eq!(err, AiError::RateLimited);
    }

    #[tokio::test]
    async fn server_error_maps_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).generate(scoring_request()).await.unwrap_err();
        assert!(
            matches!(err, AiError::Unknown(msg) if msg.contains("500") && msg.contains("boom"))
        );
    }

    #[tokio::test]
    async fn non_json_text_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope("I cannot help.")))
            .mount(&server)
            .await;

        let err = client(&server).generate(scoring_request()).await.unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_candidates_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client(&server).generate(scoring_request()).await.unwrap_err();
        assert_eq!(err, AiError::InvalidResponse("empty response".into()));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope("{}"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut gemini = client(&server);
        gemini.opts.timeout = Duration::from_millis(50);
        let err = gemini.generate(scoring_request()).await.unwrap_err();
        assert_eq!(err, AiError::Timeout);
    }
}
