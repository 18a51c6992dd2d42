//! The streaming chat client behind the advisor persona.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::chat::{project, ChatHistory, Message, Transcript};
use crate::completion::{CompletionBackend, CompletionRequest};
use crate::constants;
use crate::error::Result;
use crate::throttle::Throttle;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a kind and respectful career planning advisor for high school students. \
Help the student explore college majors, schools and careers that fit their grade, location and interests. \
Ask clarifying questions when needed, keep answers encouraging and practical, and never make the student feel judged.";

/// Sampling and pacing parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub emit_interval: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: constants::MODEL_NAME.clone(),
            max_tokens: constants::DEFAULT_MAX_TOKENS,
            temperature: constants::DEFAULT_TEMPERATURE,
            top_p: constants::DEFAULT_TOP_P,
            emit_interval: constants::EMIT_INTERVAL,
        }
    }
}

/// Canned prompts behind the buttons next to the chat box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    SuggestMajors,
    RecommendSchools,
    PersonalStatement,
}

impl QuickAction {
    pub const ALL: [QuickAction; 3] = [
        QuickAction::SuggestMajors,
        QuickAction::RecommendSchools,
        QuickAction::PersonalStatement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QuickAction::SuggestMajors => "Suggest Majors",
            QuickAction::RecommendSchools => "Recommend Schools",
            QuickAction::PersonalStatement => "Write Personal Statement",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            QuickAction::SuggestMajors => "Can you suggest some college majors based on my interests?",
            QuickAction::RecommendSchools => "Can you recommend some schools based on my profile?",
            QuickAction::PersonalStatement => {
                "Can you help me write a personal statement for university application?"
            }
        }
    }
}

/// One emission from [`Advisor::send`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatUpdate {
    pub transcript: Transcript,
    /// Set only on the last emission, after the exchange was committed to history.
    pub complete: bool,
}

pub fn latency_suffix(first_chunk: Duration, total: Duration) -> String {
    format!(
        " (First Chunk: {:.2}s, Total: {:.2}s)",
        first_chunk.as_secs_f64(),
        total.as_secs_f64()
    )
}

#[derive(Clone)]
pub struct Advisor {
    backend: Arc<dyn CompletionBackend>,
    settings: ChatSettings,
    system_prompt: String,
}

impl Advisor {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: ChatSettings) -> Self {
        Self {
            backend,
            settings,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// `[system prompt] + history + [user_text]` with the fixed parameters.
    pub fn build_request(&self, user_text: &str, history: &ChatHistory) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_text));
        CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            stream: true,
        }
    }

    /// Streams a reply to `user_text`.
    ///
    /// Partial transcripts are emitted at most once per `emit_interval`, the
    /// first delta always going out immediately. When the upstream stream
    /// ends, the user turn and the reply (with its latency suffix) are
    /// appended to `history` and a final `complete` update is emitted.
    ///
    /// If the model produces no content at all nothing is appended and
    /// nothing is emitted. Upstream errors end the stream with that error
    /// and leave `history` untouched.
    pub fn send<'a>(
        &'a self,
        user_text: &'a str,
        history: &'a mut ChatHistory,
    ) -> impl Stream<Item = Result<ChatUpdate>> + Send + 'a {
        async_stream::try_stream! {
            let request = self.build_request(user_text, history);
            let started = Instant::now();
            let mut deltas = self.backend.stream_chat(request).await?;

            let user_msg = Message::user(user_text);
            let mut reply = String::new();
            let mut first_chunk: Option<Duration> = None;
            let mut throttle = Throttle::new(self.settings.emit_interval);

            while let Some(delta) = deltas.next().await {
                let delta = delta?;
                if delta.is_empty() {
                    continue;
                }
                let now = Instant::now();
                if first_chunk.is_none() {
                    first_chunk = Some(now.duration_since(started));
                }
                reply.push_str(&delta);
                if throttle.ready(now) {
                    let partial = Message::assistant(reply.clone());
                    let transcript = project(history.iter().chain([&user_msg, &partial]));
                    yield ChatUpdate { transcript, complete: false };
                }
            }

            match first_chunk {
                Some(first_chunk) => {
                    let total = started.elapsed();
                    reply.push_str(&latency_suffix(first_chunk, total));
                    history.push_user(user_text);
                    history.push_assistant(reply);
                    info!(
                        first_chunk_ms = first_chunk.as_millis() as u64,
                        total_ms = total.as_millis() as u64,
                        "Advisor reply committed"
                    );
                    yield ChatUpdate {
                        transcript: project(&*history),
                        complete: true,
                    };
                }
                None => debug!("Completion stream produced no content; history left unchanged"),
            }
        }
    }
}
