//! Streaming chat-completion client.
//!
//! The advisor only needs one thing from the hosted model: given a message
//! list and sampling parameters, a stream of content deltas. That seam is the
//! [`CompletionBackend`] trait; [`OpenAiClient`] is the production
//! implementation speaking the OpenAI-compatible `/chat/completions` API in
//! Server-Sent Events mode.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, error, instrument, warn};

use crate::chat::Message;
use crate::constants;
use crate::error::{AdvisorError, Result};

/// Outbound request body, serialized as-is.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

/// Non-empty content deltas, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(&self, request: CompletionRequest) -> Result<DeltaStream>;
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

/// Extracts the content delta from one SSE `data:` payload.
///
/// Returns `Ok(None)` for keep-alive chunks, role-only chunks and the
/// finishing chunk, which carry no text.
pub fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Client configured from `OPENAI_BASE_URL` and `API_KEY`.
    pub fn from_env() -> Self {
        Self::new(constants::OPENAI_BASE_URL.as_str(), constants::API_KEY.as_str())
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn stream_chat(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let url = self.endpoint();
        debug!(%url, "Requesting streaming completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Completion API request failed");
            return Err(AdvisorError::Api { status: status.as_u16(), body });
        }

        Ok(sse_deltas(response))
    }
}

/// Turns an SSE response body into a stream of content deltas.
///
/// Only `data:` fields matter here; the stream ends at `data: [DONE]` or when
/// the connection closes, whichever comes first.
fn sse_deltas(response: reqwest::Response) -> DeltaStream {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let mut lines = tokio::io::BufReader::new(StreamReader::new(bytes)).lines();

    let deltas = async_stream::try_stream! {
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AdvisorError::Stream(e.to_string()))?
        {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                break;
            }
            if data.is_empty() {
                continue;
            }
            let delta = parse_chunk(data).map_err(|e| {
                warn!("Failed to parse completion chunk: {} - Error: {}", data, e);
                e
            })?;
            if let Some(delta) = delta {
                yield delta;
            }
        }
    };
    deltas.boxed()
}
