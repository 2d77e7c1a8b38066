//! Per-chat UI session: which bot message is live and what it shows.
//!
//! The bot keeps at most one message on screen per chat. Every navigation
//! retires the previous message before the next one is posted.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId, TargetRef};

/// Default and bounds for the "top" page size.
pub const TOP_DEFAULT_LIMIT: u32 = 10;
pub const TOP_MIN_LIMIT: u32 = 5;
pub const TOP_MAX_LIMIT: u32 = 30;

/// Entries per upstream "most played" page.
pub const UPSTREAM_PAGE_SIZE: u32 = 28;

/// Thresholds offered as one-tap buttons on map and creator cards.
pub const QUICK_THRESHOLDS: [u32; 4] = [50, 100, 500, 1000];

// ─── Pagination ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPage {
    pub offset: u32,
    pub limit: u32,
}

impl TopPage {
    /// Build a page, clamping `limit` into `TOP_MIN_LIMIT..=TOP_MAX_LIMIT`.
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(TOP_MIN_LIMIT, TOP_MAX_LIMIT),
        }
    }

    pub fn first() -> Self {
        Self::new(0, TOP_DEFAULT_LIMIT)
    }

    pub fn prev(self) -> Self {
        Self::new(self.offset.saturating_sub(self.limit), self.limit)
    }

    pub fn next(self) -> Self {
        Self::new(self.offset.saturating_add(self.limit), self.limit)
    }

    /// Number of upstream pages needed to cover this window.
    pub fn upstream_pages(self) -> u32 {
        self.offset
            .saturating_add(self.limit)
            .div_ceil(UPSTREAM_PAGE_SIZE)
    }
}

impl Default for TopPage {
    fn default() -> Self {
        Self::first()
    }
}

// ─── Views ───────────────────────────────────────────────────────

/// What the active message is showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewState {
    Home,
    Help,
    Settings,
    Top { page: TopPage },
    Map { code: String },
    Creator { name: String },
    Subscriptions,
    /// Player-count statistics menu.
    Stats,
    PopularReleases,
    BuildSplit,
    /// Hint telling the user how to set a custom threshold.
    CustomThreshold { target: TargetRef },
    /// One-off text such as "not found" or "try again".
    Notice { text: String },
}

// ─── Session state machine ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UiState {
    Idle,
    Showing {
        message_id: MessageId,
        view: ViewState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSession {
    pub chat_id: ChatId,
    pub state: UiState,
    /// Hide maps published by Epic in top lists.
    pub hide_epic: bool,
}

impl UiSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            state: UiState::Idle,
            hide_epic: true,
        }
    }

    pub fn active_message(&self) -> Option<MessageId> {
        match self.state {
            UiState::Idle => None,
            UiState::Showing { message_id, .. } => Some(message_id),
        }
    }

    pub fn view(&self) -> Option<&ViewState> {
        match &self.state {
            UiState::Idle => None,
            UiState::Showing { view, .. } => Some(view),
        }
    }

    /// Drop the active message and return it so the caller can delete it.
    /// The session is `Idle` afterwards.
    pub fn retire(&mut self) -> Option<MessageId> {
        let previous = self.active_message();
        self.state = UiState::Idle;
        previous
    }

    /// Record a freshly posted message as the live one.
    ///
    /// Returns the message that was still recorded, if any. Callers retire
    /// before posting, so this is `None` in normal operation.
    pub fn record(&mut self, message_id: MessageId, view: ViewState) -> Option<MessageId> {
        let previous = self.active_message();
        self.state = UiState::Showing { message_id, view };
        previous
    }
}

// ─── Tests ───────────────────────────────────────────────────────
