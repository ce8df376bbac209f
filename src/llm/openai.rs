use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::CompletionGateway;
use super::types::{ChatRequest, ImageInput, TranscriptionRequest};
use crate::core::config::{require_setting, LlmSettings};
use crate::core::errors::ApiError;

/// Client for OpenAI-compatible `/v1/chat/completions` and
/// `/v1/audio/transcriptions` endpoints (Groq, LM Studio, Ollama's
/// compatibility layer).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    model: String,
    api_key: String,
    idle_timeout: Duration,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, ApiError> {
        let api_key = require_setting(settings.api_key.as_deref(), "llm.api_key")?;
        let base_url = require_setting(Some(&settings.base_url), "llm.base_url")?;
        let model = require_setting(Some(&settings.model), "llm.model")?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            idle_timeout: Duration::from_secs(settings.stream_idle_timeout_secs.max(1)),
            client,
        })
    }

    fn body(&self, request: ChatRequest, stream: bool) -> Value {
        let messages = match &request.image {
            Some(image) => with_image_part(&request, image),
            None => json!(request.messages),
        };
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(ApiError::upstream)?;
        check_status(res).await
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    Err(status_error(status, &text))
}

/// Messages with the image attached to the last user message as a
/// `data:` URL content part.
fn with_image_part(request: &ChatRequest, image: &ImageInput) -> Value {
    let last_user = request.messages.iter().rposition(|m| m.role == "user");
    let data_url = format!(
        "data:{};base64,{}",
        image.mime_type,
        base64::engine::general_purpose::STANDARD.encode(&image.data)
    );
    let messages: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(idx, message)| {
            if Some(idx) == last_user {
                json!({
                    "role": message.role,
                    "content": [
                        {"type": "text", "text": message.content},
                        {"type": "image_url", "image_url": {"url": data_url}},
                    ],
                })
            } else {
                json!(message)
            }
        })
        .collect();
    Value::Array(messages)
}

/// Rate limits and server-side failures are worth retrying; anything else
/// is a request or credential problem.
fn status_error(status: StatusCode, body: &str) -> ApiError {
    let message = format!("completion endpoint returned {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ApiError::UpstreamUnavailable(message)
    } else {
        ApiError::Internal(message)
    }
}

#[async_trait]
impl CompletionGateway for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ApiError> {
        let body = self.body(request, false);
        let res = self.post(&body).await?;

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::upstream("completion response had no message content"))
    }

    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let body = self.body(request, true);
        let res = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(relay_sse(res.bytes_stream(), tx, self.idle_timeout));
        Ok(rx)
    }

    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ApiError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let file = Part::bytes(request.audio).file_name(request.filename);
        let mut form = Form::new()
            .part("file", file)
            .text("model", request.model)
            .text("response_format", "json")
            .text("temperature", "0");
        if let Some(language) = request.language {
            form = form.text("language", language);
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::upstream)?;
        let payload: Value = check_status(res).await?.json().await.map_err(ApiError::upstream)?;
        payload["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ApiError::upstream("transcription response had no text"))
    }
}

/// Forwards SSE fragments until `[DONE]`, end of body, a read error, or
/// `idle` passing with no data. A stall is reported as a transient error so
/// the consumer never waits forever.
async fn relay_sse<S, B, E>(stream: S, tx: mpsc::Sender<Result<String, ApiError>>, idle: Duration)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let item = match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => return,
            Err(_) => {
                tracing::warn!(idle = ?idle, "Completion stream stalled");
                let _ = tx
                    .send(Err(ApiError::UpstreamUnavailable(format!(
                        "completion stream sent no data for {:?}",
                        idle
                    ))))
                    .await;
                return;
            }
        };
        match item {
            Ok(bytes) => {
                buffer.extend_from_slice(bytes.as_ref());
                for event in drain_sse_events(&mut buffer) {
                    match event {
                        SseEvent::Done => return,
                        SseEvent::Fragment(content) => {
                            if tx.send(Ok(content)).await.is_err() {
                                // Receiver dropped: the caller cancelled.
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(ApiError::upstream(e))).await;
                return;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Fragment(String),
    Done,
}

/// Consumes every complete line in `buffer`, leaving a trailing partial
/// line in place for the next network read. Works on bytes so a multi-byte
/// character split across reads is decoded intact.
fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };
        if data == "[DONE]" {
            events.push(SseEvent::Done);
            break;
        }
        if let Ok(json) = serde_json::from_str::<Value>(data) {
            if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                if !content.is_empty() {
                    events.push(SseEvent::Fragment(content.to_string()));
                }
            }
        }
    }
    events
}
