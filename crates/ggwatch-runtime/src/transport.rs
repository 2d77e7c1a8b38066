//! Chat transport seam: post and delete bot messages.
//!
//! Delivery, rate limits and transport-level retries belong to the chat
//! gateway behind this trait. `LogTransport` is the bundled stand-in used
//! when the daemon runs without a gateway.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use ggwatch_core::types::{ChatId, MessageId};

use crate::actions::Action;
use crate::error::TransportError;

// ─── Content ─────────────────────────────────────────────────────

/// What a tapped button does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonTarget {
    /// Sent back to the daemon as an `action` request.
    Action(Action),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    pub fn action(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Action(action),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Url(url.into()),
        }
    }
}

/// A rendered message: text, keyboard rows and an optional photo URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Same content without the photo.
    pub fn without_photo(&self) -> Self {
        Self {
            photo: None,
            ..self.clone()
        }
    }
}

// ─── Transport trait ─────────────────────────────────────────────

pub trait MessageTransport: Send + Sync {
    /// Post a message and return its id.
    fn post(
        &self,
        chat: ChatId,
        content: &Content,
    ) -> impl Future<Output = Result<MessageId, TransportError>> + Send;

    /// Delete a message. `false` when it was already gone or could not be removed.
    fn delete(&self, chat: ChatId, message: MessageId) -> impl Future<Output = bool> + Send;

    /// Fire-and-forget notification outside the single-message UI.
    fn send(
        &self,
        chat: ChatId,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let content = Content::text(text);
        async move { self.post(chat, &content).await.map(|_| ()) }
    }
}

// ─── Log transport ───────────────────────────────────────────────

/// Transport that writes every post/delete to the log and hands out
/// increasing message ids.
pub struct LogTransport {
    next_id: AtomicI64,
    live: Mutex<HashSet<(ChatId, MessageId)>>,
}

impl LogTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Messages posted and not yet deleted.
    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for LogTransport {
    async fn post(&self, chat: ChatId, content: &Content) -> Result<MessageId, TransportError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((chat, id));
        let headline = content.text.lines().next().unwrap_or("");
        tracing::info!(
            chat = %chat,
            message_id = %id,
            buttons = content.buttons.iter().map(Vec::len).sum::<usize>(),
            photo = content.photo.is_some(),
            "post: {headline}"
        );
        Ok(id)
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> bool {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(chat, message));
        tracing::info!(chat = %chat, message_id = %message, removed, "delete");
        removed
    }
}
