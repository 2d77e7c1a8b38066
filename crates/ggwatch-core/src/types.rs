use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ─── Identities ───────────────────────────────────────────────────

/// Chat the bot talks to. One chat is one logical user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-assigned id of a message the bot posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Targets ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Map,
    Creator,
}

impl TargetKind {
    pub const ALL: [Self; 2] = [Self::Map, Self::Creator];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Creator => "creator",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "map" => Ok(Self::Map),
            "creator" => Ok(Self::Creator),
            _ => Err(CoreError::UnknownTargetKind(s.to_string())),
        }
    }
}

/// A map (island code) or a creator (name) in the data provider's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: String,
}

impl TargetRef {
    pub fn map(code: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Map,
            id: code.into(),
        }
    }

    pub fn creator(name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Creator,
            id: name.into(),
        }
    }
}

/// Renders as `map:1234-5678-9012` / `creator:name`.
impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ─── Subscriptions ────────────────────────────────────────────────

/// Unique key of a subscription: one per chat per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub chat_id: ChatId,
    pub target: TargetRef,
}

/// A chat's request to be told when a target's online count reaches `threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub chat_id: ChatId,
    pub target: TargetRef,
    /// Online count that must be reached or exceeded. Always > 0.
    pub threshold: u32,
    /// `true` while waiting for the next crossing; `false` after firing,
    /// until the count drops back below `threshold`.
    pub armed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            chat_id: self.chat_id,
            target: self.target.clone(),
        }
    }
}

/// Validate a user-supplied threshold.
pub fn validate_threshold(raw: u64) -> Result<u32, CoreError> {
    match u32::try_from(raw) {
        Ok(t) if t > 0 => Ok(t),
        _ => Err(CoreError::InvalidThreshold(raw)),
    }
}

/// Last value the poll loop saw for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub target: TargetRef,
    pub last_value: Option<u64>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl TargetSnapshot {
    pub fn empty(target: TargetRef) -> Self {
        Self {
            target,
            last_value: None,
            last_polled_at: None,
        }
    }
}

/// Emitted when an armed subscription's threshold is crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub chat_id: ChatId,
    pub target: TargetRef,
    pub value: u64,
    pub threshold: u32,
}

// ─── Provider data ────────────────────────────────────────────────

/// One row of the "most played" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSummary {
    pub rank: Option<u32>,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub players_now: u64,
    #[serde(default)]
    pub all_time_peak: u64,
    #[serde(default)]
    pub plays_24h: Option<String>,
    #[serde(default)]
    pub by_epic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCard {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub creator: Option<String>,
    pub players_now: u64,
    #[serde(default)]
    pub peak_24h: Option<u64>,
    #[serde(default)]
    pub all_time_peak: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorCard {
    pub name: String,
    /// Sum of `players_now` over the creator's maps.
    pub total_players_now: u64,
    pub total_maps: u32,
    #[serde(default)]
    pub maps: Vec<MapSummary>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// One entry of the weekly "popular releases" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub rank: u32,
    pub code: String,
    pub title: String,
    pub players_now: u64,
    #[serde(default)]
    pub peak_24h: Option<u64>,
}

/// Players currently in Build versus Zero Build modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSplit {
    pub build_now: u64,
    pub zero_build_now: u64,
}

impl BuildSplit {
    /// Rounded share of Build players, `None` when nobody is online.
    pub fn build_pct(&self) -> Option<u8> {
        let build = u128::from(self.build_now);
        let total = build + u128::from(self.zero_build_now);
        if total == 0 {
            return None;
        }
        Some(((build * 100 + total / 2) / total) as u8)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
