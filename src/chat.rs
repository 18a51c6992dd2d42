// Conversation state shared by the chat client and the transcript view.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Ordered, append-only model context for one session.
///
/// Only `user` and `assistant` messages are ever stored; the system prompt is
/// injected at request time and never lands here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// One rendered exchange. `user` is `None` for a bubble that has no prompt
/// in front of it, such as the welcome line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: Option<String>,
    pub assistant: String,
}

pub type Transcript = Vec<Turn>;

/// Pairs each assistant message with the user message in front of it.
///
/// A user message with no reply yet is held back until an assistant message
/// arrives; a second user message before any reply replaces it. The welcome
/// text seeded under the `user` role therefore drops out of the transcript
/// once the first real exchange completes.
pub fn project<'a, I>(messages: I) -> Transcript
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut transcript = Vec::new();
    let mut pending: Option<&str> = None;
    for msg in messages {
        match msg.role {
            Role::User => pending = Some(&msg.content),
            Role::Assistant => transcript.push(Turn {
                user: pending.take().map(str::to_string),
                assistant: msg.content.clone(),
            }),
            Role::System => {}
        }
    }
    transcript
}
