//! DataProvider trait and the bundled JSON catalog provider.
//!
//! The trait is the seam to the upstream analytics site; tests and the
//! daemon inject their own implementation.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use ggwatch_core::session::UPSTREAM_PAGE_SIZE;
use ggwatch_core::types::{
    BuildSplit, CreatorCard, MapCard, MapSummary, ReleaseSummary, TargetKind, TargetRef,
};

use crate::error::ProviderError;

/// Source of live player counts and metadata.
pub trait DataProvider: Send + Sync {
    /// Current online count of a map, or the summed count of a creator's maps.
    fn fetch_online(
        &self,
        target: &TargetRef,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send;

    /// One upstream page (1-based) of the "most played" list.
    fn fetch_top(
        &self,
        page: u32,
        hide_epic: bool,
    ) -> impl Future<Output = Result<Vec<MapSummary>, ProviderError>> + Send;

    fn fetch_map(&self, code: &str) -> impl Future<Output = Result<MapCard, ProviderError>> + Send;

    fn fetch_creator(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CreatorCard, ProviderError>> + Send;

    /// Up to `limit` maps released in the last week, most played first.
    fn fetch_popular_releases(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ReleaseSummary>, ProviderError>> + Send;

    fn fetch_build_split(&self) -> impl Future<Output = Result<BuildSplit, ProviderError>> + Send;
}

/// Bound a provider call. Elapsed calls count as `Unavailable`.
pub async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Unavailable(format!(
            "timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// A single cached value that expires `ttl` after it was stored.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn put(&self, value: T) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some((Instant::now(), value));
    }
}

// ─── Catalog provider ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    maps: Vec<CatalogMap>,
    #[serde(default)]
    creators: Vec<CatalogCreator>,
    /// Codes of this week's releases, in upstream order.
    #[serde(default)]
    releases: Vec<String>,
    #[serde(default)]
    build_split: Option<BuildSplit>,
}

#[derive(Debug, Deserialize)]
struct CatalogMap {
    #[serde(flatten)]
    card: MapCard,
    #[serde(default)]
    plays_24h: Option<String>,
    #[serde(default)]
    by_epic: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogCreator {
    name: String,
    #[serde(default)]
    avatar: Option<String>,
}

impl Catalog {
    fn summaries(&self, hide_epic: bool) -> Vec<MapSummary> {
        let mut maps: Vec<&CatalogMap> = self
            .maps
            .iter()
            .filter(|m| !(hide_epic && m.by_epic))
            .collect();
        maps.sort_by(|a, b| b.card.players_now.cmp(&a.card.players_now));
        maps.iter()
            .enumerate()
            .map(|(i, m)| summary(m, Some(i as u32 + 1)))
            .collect()
    }

    fn creator_maps(&self, name: &str) -> Vec<&CatalogMap> {
        self.maps
            .iter()
            .filter(|m| {
                m.card
                    .creator
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(name))
            })
            .collect()
    }
}

fn summary(m: &CatalogMap, rank: Option<u32>) -> MapSummary {
    MapSummary {
        rank,
        code: m.card.code.clone(),
        title: m.card.name.clone(),
        players_now: m.card.players_now,
        all_time_peak: m.card.all_time_peak.unwrap_or(0),
        plays_24h: m.plays_24h.clone(),
        by_epic: m.by_epic,
    }
}

/// Provider backed by a JSON catalog file, re-read on every call so the
/// numbers can be edited while the daemon runs.
///
/// ```json
/// { "maps": [ { "code": "1234-5678-9012", "name": "Box Fights",
///               "creator": "builder", "players_now": 420 } ],
///   "creators": [ { "name": "builder", "avatar": "https://..." } ],
///   "releases": [ "1234-5678-9012" ],
///   "build_split": { "build_now": 900, "zero_build_now": 1100 } }
/// ```
pub struct FixtureProvider {
    path: PathBuf,
}

impl FixtureProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Catalog, ProviderError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::Unavailable(format!("read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ProviderError::Unavailable(format!("parse {}: {e}", self.path.display()))
        })
    }
}

impl DataProvider for FixtureProvider {
    async fn fetch_online(&self, target: &TargetRef) -> Result<u64, ProviderError> {
        let catalog = self.load().await?;
        match target.kind {
            TargetKind::Map => catalog
                .maps
                .iter()
                .find(|m| m.card.code == target.id)
                .map(|m| m.card.players_now)
                .ok_or_else(|| ProviderError::NotFound(target.to_string())),
            TargetKind::Creator => {
                let maps = catalog.creator_maps(&target.id);
                if maps.is_empty() {
                    return Err(ProviderError::NotFound(target.to_string()));
                }
                Ok(maps.iter().map(|m| m.card.players_now).sum())
            }
        }
    }

    async fn fetch_top(&self, page: u32, hide_epic: bool) -> Result<Vec<MapSummary>, ProviderError> {
        let catalog = self.load().await?;
        let start = page.saturating_sub(1).saturating_mul(UPSTREAM_PAGE_SIZE) as usize;
        Ok(catalog
            .summaries(hide_epic)
            .into_iter()
            .skip(start)
            .take(UPSTREAM_PAGE_SIZE as usize)
            .collect())
    }

    async fn fetch_map(&self, code: &str) -> Result<MapCard, ProviderError> {
        let catalog = self.load().await?;
        catalog
            .maps
            .into_iter()
            .find(|m| m.card.code == code)
            .map(|m| m.card)
            .ok_or_else(|| ProviderError::NotFound(TargetRef::map(code).to_string()))
    }

    async fn fetch_creator(&self, name: &str) -> Result<CreatorCard, ProviderError> {
        let catalog = self.load().await?;
        let maps = catalog.creator_maps(name);
        if maps.is_empty() {
            return Err(ProviderError::NotFound(TargetRef::creator(name).to_string()));
        }
        let mut rows: Vec<MapSummary> = maps.iter().map(|m| summary(m, None)).collect();
        rows.sort_by(|a, b| b.players_now.cmp(&a.players_now));
        let display_name = maps[0].card.creator.clone().unwrap_or_else(|| name.to_string());
        let avatar = catalog
            .creators
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|c| c.avatar.clone());
        Ok(CreatorCard {
            name: display_name,
            total_players_now: rows.iter().map(|r| r.players_now).sum(),
            total_maps: rows.len() as u32,
            maps: rows,
            avatar,
        })
    }

    async fn fetch_popular_releases(&self, limit: u32) -> Result<Vec<ReleaseSummary>, ProviderError> {
        let catalog = self.load().await?;
        let mut released: Vec<&CatalogMap> = catalog
            .releases
            .iter()
            .filter_map(|code| catalog.maps.iter().find(|m| &m.card.code == code))
            .collect();
        released.sort_by(|a, b| b.card.players_now.cmp(&a.card.players_now));
        Ok(released
            .into_iter()
            .take(limit as usize)
            .enumerate()
            .map(|(i, m)| ReleaseSummary {
                rank: i as u32 + 1,
                code: m.card.code.clone(),
                title: m.card.name.clone(),
                players_now: m.card.players_now,
                peak_24h: m.card.peak_24h,
            })
            .collect())
    }

    async fn fetch_build_split(&self) -> Result<BuildSplit, ProviderError> {
        self.load()
            .await?
            .build_split
            .ok_or_else(|| ProviderError::NotFound("build split".into()))
    }
}
