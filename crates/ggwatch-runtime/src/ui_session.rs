//! UISessionController: one live bot message per chat.
//!
//! Each chat has its own async mutex, held for the whole delete-then-post
//! sequence. Two taps from the same chat queue behind each other; different
//! chats never wait on one another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use ggwatch_core::session::{UiSession, ViewState};
use ggwatch_core::types::{ChatId, MessageId};

use crate::error::TransportError;
use crate::store::SubscriptionStore;
use crate::transport::{Content, MessageTransport};

type SessionSlot = Arc<AsyncMutex<UiSession>>;

pub struct UiSessionController<T> {
    transport: Arc<T>,
    store: Arc<SubscriptionStore>,
    sessions: Mutex<HashMap<ChatId, SessionSlot>>,
}

impl<T: MessageTransport> UiSessionController<T> {
    pub fn new(transport: Arc<T>, store: Arc<SubscriptionStore>) -> Self {
        Self {
            transport,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Load cached sessions so messages posted before a restart are still
    /// retired on the next navigation. Returns how many were restored.
    pub fn restore(&self) -> usize {
        let cached = match self.store.load_sessions() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("ui session cache unreadable, starting fresh: {e}");
                return 0;
            }
        };
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let count = cached.len();
        for session in cached {
            sessions.insert(session.chat_id, Arc::new(AsyncMutex::new(session)));
        }
        count
    }

    fn slot(&self, chat_id: ChatId) -> SessionSlot {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            sessions
                .entry(chat_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(UiSession::new(chat_id)))),
        )
    }

    fn persist(&self, session: &UiSession) {
        if let Err(e) = self.store.save_session(session) {
            tracing::warn!(chat = %session.chat_id, "failed to cache ui session: {e}");
        }
    }

    /// Replace the chat's live message with `content`.
    ///
    /// The previous message is deleted first; a failed delete is logged and
    /// ignored. A failed post leaves the session `Idle` and returns
    /// `SendFailed`.
    pub async fn navigate(
        &self,
        chat_id: ChatId,
        view: ViewState,
        content: Content,
    ) -> Result<MessageId, TransportError> {
        let slot = self.slot(chat_id);
        let mut session = slot.lock().await;

        if let Some(previous) = session.retire() {
            if !self.transport.delete(chat_id, previous).await {
                tracing::debug!(chat = %chat_id, message_id = %previous, "previous message already gone");
            }
        }
        // Idle is recorded before posting so a failed post never leaves a
        // reference to the message just deleted.
        self.persist(&session);

        let posted = match self.transport.post(chat_id, &content).await {
            Ok(id) => Ok(id),
            Err(e) if content.photo.is_some() => {
                tracing::debug!(chat = %chat_id, "photo post failed, retrying as text: {e}");
                self.transport.post(chat_id, &content.without_photo()).await
            }
            Err(e) => Err(e),
        };

        match posted {
            Ok(message_id) => {
                session.record(message_id, view);
                self.persist(&session);
                Ok(message_id)
            }
            Err(e) => {
                tracing::warn!(chat = %chat_id, "failed to show view: {e}");
                Err(e)
            }
        }
    }

    /// Delete the live message, if any, and go idle.
    pub async fn clear(&self, chat_id: ChatId) -> Option<MessageId> {
        let slot = self.slot(chat_id);
        let mut session = slot.lock().await;
        let previous = session.retire()?;
        if !self.transport.delete(chat_id, previous).await {
            tracing::debug!(chat = %chat_id, message_id = %previous, "message already gone");
        }
        self.persist(&session);
        Some(previous)
    }

    pub async fn session(&self, chat_id: ChatId) -> UiSession {
        self.slot(chat_id).lock().await.clone()
    }

    pub async fn hide_epic(&self, chat_id: ChatId) -> bool {
        self.slot(chat_id).lock().await.hide_epic
    }

    pub async fn set_hide_epic(&self, chat_id: ChatId, hide_epic: bool) {
        let slot = self.slot(chat_id);
        let mut session = slot.lock().await;
        if session.hide_epic != hide_epic {
            session.hide_epic = hide_epic;
            self.persist(&session);
        }
    }

    /// Flip the Hide-Epic toggle and return the new value.
    pub async fn toggle_hide_epic(&self, chat_id: ChatId) -> bool {
        let slot = self.slot(chat_id);
        let mut session = slot.lock().await;
        session.hide_epic = !session.hide_epic;
        self.persist(&session);
        session.hide_epic
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
