//! In-memory provider and transport fakes shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use ggwatch_core::session::UPSTREAM_PAGE_SIZE;
use ggwatch_core::types::{
    BuildSplit, ChatId, CreatorCard, MapCard, MapSummary, MessageId, ReleaseSummary, TargetRef,
};

use crate::error::{ProviderError, TransportError};
use crate::provider::DataProvider;
use crate::transport::{Content, MessageTransport};

// ─── Transport ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeTransport {
    next_id: AtomicI64,
    live: Mutex<HashSet<(ChatId, MessageId)>>,
    posted: Mutex<Vec<(ChatId, Content)>>,
    deletes: AtomicUsize,
    fail_posts: AtomicBool,
    fail_photos: AtomicBool,
    fail_deletes: AtomicBool,
    failing_chats: Mutex<HashSet<ChatId>>,
    post_delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = Some(delay);
        self
    }

    pub fn fail_posts(&self, on: bool) {
        self.fail_posts.store(on, Ordering::SeqCst);
    }

    pub fn fail_photos(&self, on: bool) {
        self.fail_photos.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    /// Refuse every post to `chat`.
    pub fn fail_chat(&self, chat: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat);
    }

    /// Live message ids for a chat, ascending.
    pub fn live(&self, chat: ChatId) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, m)| *m)
            .collect();
        ids.sort_by_key(|m| m.0);
        ids
    }

    /// Every successful post, in order.
    pub fn posted(&self) -> Vec<(ChatId, Content)> {
        self.posted.lock().unwrap().clone()
    }

    /// Texts posted to `chat`.
    pub fn texts(&self, chat: ChatId) -> Vec<String> {
        self.posted()
            .into_iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, content)| content.text)
            .collect()
    }

    /// Delete calls that reached the transport.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

impl MessageTransport for FakeTransport {
    async fn post(&self, chat: ChatId, content: &Content) -> Result<MessageId, TransportError> {
        if let Some(delay) = self.post_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_posts.load(Ordering::SeqCst)
            || self.failing_chats.lock().unwrap().contains(&chat)
        {
            return Err(TransportError::SendFailed("fake post failure".into()));
        }
        if content.photo.is_some() && self.fail_photos.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("fake photo failure".into()));
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().insert((chat, id));
        self.posted.lock().unwrap().push((chat, content.clone()));
        Ok(id)
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> bool {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        // Failed deletes leave the message up, like a chat API refusing.
        if self.fail_deletes.load(Ordering::SeqCst) {
            return false;
        }
        self.live.lock().unwrap().remove(&(chat, message))
    }
}

// ─── Provider ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeProvider {
    online: Mutex<BTreeMap<TargetRef, Result<u64, ProviderError>>>,
    delays: Mutex<HashMap<TargetRef, Duration>>,
    top: Mutex<Vec<MapSummary>>,
    top_error: Mutex<Option<ProviderError>>,
    maps: Mutex<HashMap<String, MapCard>>,
    creators: Mutex<HashMap<String, CreatorCard>>,
    releases: Mutex<Vec<ReleaseSummary>>,
    build_split: Mutex<Option<BuildSplit>>,
    top_calls: Mutex<Vec<(u32, bool)>>,
    online_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, target: &TargetRef, value: u64) {
        self.online.lock().unwrap().insert(target.clone(), Ok(value));
    }

    pub fn set_error(&self, target: &TargetRef, err: ProviderError) {
        self.online.lock().unwrap().insert(target.clone(), Err(err));
    }

    pub fn set_delay(&self, target: &TargetRef, delay: Duration) {
        self.delays.lock().unwrap().insert(target.clone(), delay);
    }

    /// Ranked maps `1..=n` with codes `0000-0000-NNNN`.
    pub fn set_top(&self, n: u32) {
        let rows = (1..=n)
            .map(|i| MapSummary {
                rank: Some(i),
                code: format!("0000-0000-{i:04}"),
                title: format!("Map {i}"),
                players_now: u64::from(1000 - i),
                all_time_peak: 5000,
                plays_24h: None,
                by_epic: false,
            })
            .collect();
        *self.top.lock().unwrap() = rows;
    }

    /// Fail the list fetches: top and popular releases.
    pub fn fail_top(&self, err: ProviderError) {
        *self.top_error.lock().unwrap() = Some(err);
    }

    pub fn add_map(&self, card: MapCard) {
        self.maps.lock().unwrap().insert(card.code.clone(), card);
    }

    pub fn add_creator(&self, card: CreatorCard) {
        self.creators
            .lock()
            .unwrap()
            .insert(card.name.to_ascii_lowercase(), card);
    }

    /// Releases `1..=n` with codes `1111-0000-NNNN`.
    pub fn set_releases(&self, n: u32) {
        let rows = (1..=n)
            .map(|i| ReleaseSummary {
                rank: i,
                code: format!("1111-0000-{i:04}"),
                title: format!("Release {i}"),
                players_now: u64::from(500 - i),
                peak_24h: Some(900),
            })
            .collect();
        *self.releases.lock().unwrap() = rows;
    }

    pub fn set_build_split(&self, split: BuildSplit) {
        *self.build_split.lock().unwrap() = Some(split);
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// `(page, hide_epic)` of every `fetch_top` call.
    pub fn top_calls(&self) -> Vec<(u32, bool)> {
        self.top_calls.lock().unwrap().clone()
    }

    pub fn online_calls(&self) -> usize {
        self.online_calls.load(Ordering::SeqCst)
    }
}

pub fn map_card(code: &str, players_now: u64) -> MapCard {
    MapCard {
        code: code.into(),
        name: format!("Island {code}"),
        creator: Some("builder".into()),
        players_now,
        peak_24h: None,
        all_time_peak: None,
        tags: vec![],
        image: None,
    }
}

impl DataProvider for FakeProvider {
    async fn fetch_online(&self, target: &TargetRef) -> Result<u64, ProviderError> {
        self.online_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(target).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.online
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::NotFound(target.to_string())))
    }

    async fn fetch_top(&self, page: u32, hide_epic: bool) -> Result<Vec<MapSummary>, ProviderError> {
        self.top_calls.lock().unwrap().push((page, hide_epic));
        if let Some(err) = self.top_error.lock().unwrap().clone() {
            return Err(err);
        }
        let start = (page.saturating_sub(1) * UPSTREAM_PAGE_SIZE) as usize;
        Ok(self
            .top
            .lock()
            .unwrap()
            .iter()
            .skip(start)
            .take(UPSTREAM_PAGE_SIZE as usize)
            .cloned()
            .collect())
    }

    async fn fetch_map(&self, code: &str) -> Result<MapCard, ProviderError> {
        self.maps
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(code.to_string()))
    }

    async fn fetch_creator(&self, name: &str) -> Result<CreatorCard, ProviderError> {
        self.creators
            .lock()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    async fn fetch_popular_releases(&self, limit: u32) -> Result<Vec<ReleaseSummary>, ProviderError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.top_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_build_split(&self) -> Result<BuildSplit, ProviderError> {
        let split = *self.build_split.lock().unwrap();
        split.ok_or_else(|| ProviderError::NotFound("build split".into()))
    }
}
