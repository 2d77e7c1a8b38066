//! User actions: what a button tap or typed message asks the bot to do.
//!
//! `ActionHandler` resolves an action into a view, renders it through the
//! `MenuCatalog` and hands it to the `UiSessionController`. Lookup
//! failures are shown to the user as notices; only transport and store
//! failures surface as `ActionError`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ggwatch_core::CoreError;
use ggwatch_core::ident::{classify_text, parse_creator, parse_map};
use ggwatch_core::session::{TOP_DEFAULT_LIMIT, TopPage, UPSTREAM_PAGE_SIZE, ViewState};
use ggwatch_core::types::{
    ChatId, MapSummary, MessageId, ReleaseSummary, TargetKind, TargetRef, validate_threshold,
};

use crate::error::{ActionError, ProviderError};
use crate::menu::MenuCatalog;
use crate::provider::{DataProvider, TtlCache, with_timeout};
use crate::store::SubscriptionStore;
use crate::transport::{Content, MessageTransport};
use crate::ui_session::UiSessionController;

const TRY_AGAIN: &str = "fortnite.gg is not answering right now. Try again in a minute.";

/// Popular releases change slowly; one fetch serves every chat for this long.
const RELEASES_TTL: Duration = Duration::from_secs(300);
const RELEASES_LIMIT: u32 = 10;

fn default_limit() -> u32 {
    TOP_DEFAULT_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Home,
    Help,
    Settings,
    ShowTop {
        #[serde(default)]
        offset: u32,
        #[serde(default = "default_limit")]
        limit: u32,
        /// Overrides the session's Hide-Epic toggle when set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hide_epic: Option<bool>,
    },
    ToggleHideEpic,
    FindPrompt {
        kind: TargetKind,
    },
    ShowMap {
        ident: String,
    },
    ShowCreator {
        ident: String,
    },
    Subscribe {
        target: TargetRef,
        threshold: u64,
    },
    Unsubscribe {
        target: TargetRef,
    },
    ShowSubscriptions,
    ShowStats,
    ShowPopularReleases,
    ShowBuildSplit,
    CustomThreshold {
        target: TargetRef,
    },
    /// Free text typed by the user: a slash command, code, name or link.
    Text {
        text: String,
    },
    Clear,
}

/// Result of a handled action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// The chat's live message after the action, if one was posted.
    pub message_id: Option<MessageId>,
    /// Short acknowledgement for the gateway to show as a popup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toast: Option<String>,
    /// What was rendered for `message_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

// ─── Text routing ────────────────────────────────────────────────

/// Translate typed text into an action. `None` means the text is not
/// addressed to the bot and is ignored.
pub fn route_text(text: &str) -> Option<Action> {
    let text = text.trim();
    let Some(command) = text.strip_prefix('/') else {
        return classify_text(text).map(|target| match target.kind {
            TargetKind::Map => Action::ShowMap { ident: target.id },
            TargetKind::Creator => Action::ShowCreator { ident: target.id },
        });
    };

    let mut words = command.split_whitespace();
    // "/top@SomeBot" addresses the same command in group chats.
    let name = words.next()?.split('@').next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let action = match (name, args.as_slice()) {
        ("start" | "home" | "menu", _) => Action::Home,
        ("help", _) => Action::Help,
        ("settings", _) => Action::Settings,
        ("stats", _) => Action::ShowStats,
        ("top", []) => Action::ShowTop {
            offset: 0,
            limit: TOP_DEFAULT_LIMIT,
            hide_epic: None,
        },
        ("top", [limit, ..]) => Action::ShowTop {
            offset: 0,
            limit: limit.parse().unwrap_or(TOP_DEFAULT_LIMIT),
            hide_epic: None,
        },
        ("map", []) => Action::FindPrompt {
            kind: TargetKind::Map,
        },
        ("map", [ident, ..]) => Action::ShowMap {
            ident: ident.to_string(),
        },
        ("creator", []) => Action::FindPrompt {
            kind: TargetKind::Creator,
        },
        ("creator", [ident, ..]) => Action::ShowCreator {
            ident: ident.to_string(),
        },
        ("alerts", _) => Action::ShowSubscriptions,
        ("alert_add", args) => subscribe_command(TargetKind::Map, args)?,
        ("alertc_add", args) => subscribe_command(TargetKind::Creator, args)?,
        ("alert_del", [ident, ..]) => Action::Unsubscribe {
            target: TargetRef::map(*ident),
        },
        ("alertc_del", [ident, ..]) => Action::Unsubscribe {
            target: TargetRef::creator(*ident),
        },
        _ => return None,
    };
    Some(action)
}

fn subscribe_command(kind: TargetKind, args: &[&str]) -> Option<Action> {
    let (ident, threshold) = match args {
        [] => {
            return Some(Action::FindPrompt { kind });
        }
        [ident] => (*ident, None),
        [ident, threshold, ..] => (*ident, threshold.parse::<u64>().ok()),
    };
    let target = TargetRef {
        kind,
        id: ident.to_string(),
    };
    Some(match threshold {
        Some(threshold) => Action::Subscribe { target, threshold },
        // Missing or unreadable threshold: repeat the usage hint.
        None => Action::CustomThreshold { target },
    })
}

/// Normalize a target's identifier (code, name or fortnite.gg link).
/// Creator names are matched case-insensitively upstream, so they are
/// stored lower-cased.
fn normalize(target: &TargetRef) -> Result<TargetRef, CoreError> {
    Ok(match target.kind {
        TargetKind::Map => TargetRef::map(parse_map(&target.id)?),
        TargetKind::Creator => {
            TargetRef::creator(parse_creator(&target.id)?.to_ascii_lowercase())
        }
    })
}

fn provider_notice(err: &ProviderError) -> String {
    match err {
        ProviderError::NotFound(what) => format!("Nothing found for {what}."),
        ProviderError::Unavailable(_) => TRY_AGAIN.to_string(),
    }
}

fn core_notice(err: &CoreError) -> String {
    match err {
        CoreError::InvalidThreshold(_) => "The threshold must be a positive number.".to_string(),
        CoreError::InvalidIdentifier(raw) => {
            format!("\"{raw}\" is not a map code, creator name or fortnite.gg link.")
        }
        CoreError::UnknownTargetKind(kind) => format!("Unknown target type {kind}."),
    }
}

// ─── Handler ─────────────────────────────────────────────────────

pub struct ActionHandler<P, T, M> {
    provider: Arc<P>,
    store: Arc<SubscriptionStore>,
    ui: Arc<UiSessionController<T>>,
    menu: Arc<M>,
    fetch_timeout: Duration,
    releases: TtlCache<Vec<ReleaseSummary>>,
}

impl<P, T, M> ActionHandler<P, T, M>
where
    P: DataProvider,
    T: MessageTransport,
    M: MenuCatalog,
{
    pub fn new(
        provider: Arc<P>,
        store: Arc<SubscriptionStore>,
        ui: Arc<UiSessionController<T>>,
        menu: Arc<M>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            ui,
            menu,
            fetch_timeout,
            releases: TtlCache::new(RELEASES_TTL),
        }
    }

    pub async fn handle(&self, chat: ChatId, action: Action) -> Result<Outcome, ActionError> {
        tracing::debug!(chat = %chat, ?action, "action");

        let action = match action {
            Action::Text { text } => match route_text(&text) {
                Some(action) => action,
                None => {
                    tracing::debug!(chat = %chat, "ignoring unrecognized text");
                    return Ok(Outcome::default());
                }
            },
            other => other,
        };

        match action {
            Action::Home => self.show_home(chat).await,
            Action::Help => self.show(chat, ViewState::Help, self.menu.help()).await,
            Action::Settings => {
                let hide_epic = self.ui.hide_epic(chat).await;
                self.show(chat, ViewState::Settings, self.menu.settings(hide_epic))
                    .await
            }
            Action::ShowTop {
                offset,
                limit,
                hide_epic,
            } => {
                if let Some(hide_epic) = hide_epic {
                    self.ui.set_hide_epic(chat, hide_epic).await;
                }
                self.show_top(chat, TopPage::new(offset, limit)).await
            }
            Action::ToggleHideEpic => {
                let hide_epic = self.ui.toggle_hide_epic(chat).await;
                let mut outcome = self.show_top(chat, TopPage::first()).await?;
                outcome.toast = Some(format!(
                    "Hide Epic: {}",
                    if hide_epic { "ON" } else { "OFF" }
                ));
                Ok(outcome)
            }
            Action::FindPrompt { kind } => {
                let content = self.menu.find_prompt(kind);
                let view = ViewState::Notice {
                    text: content.text.clone(),
                };
                self.show(chat, view, content).await
            }
            Action::ShowMap { ident } => self.show_map(chat, &ident).await,
            Action::ShowCreator { ident } => self.show_creator(chat, &ident).await,
            Action::Subscribe { target, threshold } => {
                self.subscribe(chat, &target, threshold).await
            }
            Action::Unsubscribe { target } => {
                let target = normalize(&target).unwrap_or(target);
                let removed = self.store.remove(chat, &target)?;
                let mut outcome = self.show_subscriptions(chat).await?;
                outcome.toast = Some(if removed {
                    format!("Alert removed: {target}")
                } else {
                    format!("No alert for {target}")
                });
                Ok(outcome)
            }
            Action::ShowSubscriptions => self.show_subscriptions(chat).await,
            Action::ShowStats => self.show(chat, ViewState::Stats, self.menu.stats_home()).await,
            Action::ShowPopularReleases => self.show_popular_releases(chat).await,
            Action::ShowBuildSplit => self.show_build_split(chat).await,
            Action::CustomThreshold { target } => {
                let target = normalize(&target).unwrap_or(target);
                let content = self.menu.custom_threshold(&target);
                self.show(chat, ViewState::CustomThreshold { target }, content)
                    .await
            }
            Action::Clear => {
                self.ui.clear(chat).await;
                Ok(Outcome::default())
            }
            Action::Text { .. } => Ok(Outcome::default()),
        }
    }

    async fn show(
        &self,
        chat: ChatId,
        view: ViewState,
        content: Content,
    ) -> Result<Outcome, ActionError> {
        let message_id = self.ui.navigate(chat, view, content.clone()).await?;
        Ok(Outcome {
            message_id: Some(message_id),
            toast: None,
            content: Some(content),
        })
    }

    async fn notice(&self, chat: ChatId, text: String) -> Result<Outcome, ActionError> {
        let content = self.menu.notice(&text);
        self.show(chat, ViewState::Notice { text }, content).await
    }

    async fn show_home(&self, chat: ChatId) -> Result<Outcome, ActionError> {
        let count = self.store.list_by_user(chat)?.len();
        let hide_epic = self.ui.hide_epic(chat).await;
        self.show(chat, ViewState::Home, self.menu.home(hide_epic, count))
            .await
    }

    async fn show_top(&self, chat: ChatId, page: TopPage) -> Result<Outcome, ActionError> {
        let hide_epic = self.ui.hide_epic(chat).await;
        match self.fetch_top_window(page, hide_epic).await {
            Ok(items) => {
                let content = self.menu.top(page, hide_epic, &items);
                self.show(chat, ViewState::Top { page }, content).await
            }
            Err(e) => {
                tracing::warn!(chat = %chat, "top list fetch failed: {e}");
                self.notice(chat, provider_notice(&e)).await
            }
        }
    }

    /// Fetch enough upstream pages to cover the window, then cut it out.
    async fn fetch_top_window(
        &self,
        page: TopPage,
        hide_epic: bool,
    ) -> Result<Vec<MapSummary>, ProviderError> {
        let mut rows = Vec::new();
        for upstream in 1..=page.upstream_pages() {
            let chunk =
                with_timeout(self.fetch_timeout, self.provider.fetch_top(upstream, hide_epic))
                    .await?;
            let short = (chunk.len() as u32) < UPSTREAM_PAGE_SIZE;
            rows.extend(chunk);
            if short {
                break;
            }
        }
        Ok(rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn show_map(&self, chat: ChatId, ident: &str) -> Result<Outcome, ActionError> {
        let code = match parse_map(ident) {
            Ok(code) => code,
            Err(e) => return self.notice(chat, core_notice(&e)).await,
        };
        match with_timeout(self.fetch_timeout, self.provider.fetch_map(&code)).await {
            Ok(card) => {
                let content = self.menu.map_card(&card);
                self.show(chat, ViewState::Map { code }, content).await
            }
            Err(e) => {
                tracing::debug!(chat = %chat, code = %code, "map lookup failed: {e}");
                self.notice(chat, provider_notice(&e)).await
            }
        }
    }

    async fn show_creator(&self, chat: ChatId, ident: &str) -> Result<Outcome, ActionError> {
        let name = match parse_creator(ident) {
            Ok(name) => name,
            Err(e) => return self.notice(chat, core_notice(&e)).await,
        };
        match with_timeout(self.fetch_timeout, self.provider.fetch_creator(&name)).await {
            Ok(card) => {
                let content = self.menu.creator_card(&card);
                self.show(chat, ViewState::Creator { name }, content).await
            }
            Err(e) => {
                tracing::debug!(chat = %chat, name = %name, "creator lookup failed: {e}");
                self.notice(chat, provider_notice(&e)).await
            }
        }
    }

    async fn show_popular_releases(&self, chat: ChatId) -> Result<Outcome, ActionError> {
        let items = match self.releases.get() {
            Some(items) => items,
            None => {
                let fetched = with_timeout(
                    self.fetch_timeout,
                    self.provider.fetch_popular_releases(RELEASES_LIMIT),
                )
                .await;
                match fetched {
                    Ok(items) => {
                        // An empty list is not cached so the next tap asks again.
                        if !items.is_empty() {
                            self.releases.put(items.clone());
                        }
                        items
                    }
                    Err(e) => {
                        tracing::warn!(chat = %chat, "popular releases fetch failed: {e}");
                        return self.notice(chat, provider_notice(&e)).await;
                    }
                }
            }
        };
        let content = self.menu.popular_releases(&items);
        self.show(chat, ViewState::PopularReleases, content).await
    }

    async fn show_build_split(&self, chat: ChatId) -> Result<Outcome, ActionError> {
        match with_timeout(self.fetch_timeout, self.provider.fetch_build_split()).await {
            Ok(split) => {
                let content = self.menu.build_split(&split);
                self.show(chat, ViewState::BuildSplit, content).await
            }
            Err(e) => {
                tracing::warn!(chat = %chat, "build split fetch failed: {e}");
                self.notice(chat, provider_notice(&e)).await
            }
        }
    }

    async fn show_subscriptions(&self, chat: ChatId) -> Result<Outcome, ActionError> {
        let subs = self.store.list_by_user(chat)?;
        let content = self.menu.subscriptions(&subs);
        self.show(chat, ViewState::Subscriptions, content).await
    }

    async fn subscribe(
        &self,
        chat: ChatId,
        target: &TargetRef,
        threshold: u64,
    ) -> Result<Outcome, ActionError> {
        let target = match normalize(target) {
            Ok(t) => t,
            Err(e) => return self.notice(chat, core_notice(&e)).await,
        };
        if let Err(e) = validate_threshold(threshold) {
            return self.notice(chat, core_notice(&e)).await;
        }

        let sub = self.store.upsert(chat, &target, threshold)?;
        tracing::info!(chat = %chat, watch = %target, threshold = sub.threshold, "subscribed");

        let mut outcome = match target.kind {
            TargetKind::Map => self.show_map(chat, &target.id).await?,
            TargetKind::Creator => self.show_creator(chat, &target.id).await?,
        };
        outcome.toast = Some(format!("Alert set: {} >= {}", target.id, sub.threshold));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::TextMenu;
    use crate::testing::{FakeProvider, FakeTransport, map_card};
    use ggwatch_core::types::CreatorCard;

    const CHAT: ChatId = ChatId(7);

    struct Fixture {
        provider: Arc<FakeProvider>,
        transport: Arc<FakeTransport>,
        store: Arc<SubscriptionStore>,
        ui: Arc<UiSessionController<FakeTransport>>,
        handler: ActionHandler<FakeProvider, FakeTransport, TextMenu>,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(FakeProvider::new());
        let transport = Arc::new(FakeTransport::new());
        let store = Arc::new(SubscriptionStore::open_in_memory().unwrap());
        let ui = Arc::new(UiSessionController::new(
            Arc::clone(&transport),
            Arc::clone(&store),
        ));
        let handler = ActionHandler::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&ui),
            Arc::new(TextMenu::default()),
            Duration::from_secs(1),
        );
        Fixture {
            provider,
            transport,
            store,
            ui,
            handler,
        }
    }

    fn last_text(f: &Fixture) -> String {
        f.transport.texts(CHAT).pop().unwrap_or_default()
    }

    // ── 1. Routing ──

    #[test]
    fn route_codes_names_and_links() {
        assert_eq!(
            route_text("1234-5678-9012"),
            Some(Action::ShowMap {
                ident: "1234-5678-9012".into()
            })
        );
        assert_eq!(
            route_text("https://fortnite.gg/creator?name=builder"),
            Some(Action::ShowCreator {
                ident: "builder".into()
            })
        );
        assert_eq!(route_text("hello there, bot"), None);
    }

    #[test]
    fn route_slash_commands() {
        assert_eq!(route_text("/start"), Some(Action::Home));
        assert_eq!(route_text("/help@ggbot"), Some(Action::Help));
        assert_eq!(route_text("/stats"), Some(Action::ShowStats));
        assert_eq!(
            route_text("/top 20"),
            Some(Action::ShowTop {
                offset: 0,
                limit: 20,
                hide_epic: None
            })
        );
        assert_eq!(
            route_text("/alert_add 1234-5678-9012 150"),
            Some(Action::Subscribe {
                target: TargetRef::map("1234-5678-9012"),
                threshold: 150
            })
        );
        assert_eq!(
            route_text("/alertc_add builder lots"),
            Some(Action::CustomThreshold {
                target: TargetRef::creator("builder")
            })
        );
        assert_eq!(
            route_text("/alertc_del builder"),
            Some(Action::Unsubscribe {
                target: TargetRef::creator("builder")
            })
        );
        assert_eq!(route_text("/unknown"), None);
    }

    #[test]
    fn action_wire_format() {
        let json = r#"{"action":"subscribe","target":{"kind":"map","id":"1234-5678-9012"},"threshold":100}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(action, Action::Subscribe {
            target: TargetRef::map("1234-5678-9012"),
            threshold: 100
        });

        let top: Action = serde_json::from_str(r#"{"action":"show_top"}"#).unwrap();
        assert_eq!(top, Action::ShowTop {
            offset: 0,
            limit: TOP_DEFAULT_LIMIT,
            hide_epic: None
        });
    }

    // ── 2. Navigation ──

    #[tokio::test]
    async fn home_then_help_keeps_one_message() {
        let f = fixture();
        let home = f.handler.handle(CHAT, Action::Home).await.unwrap();
        let help = f.handler.handle(CHAT, Action::Help).await.unwrap();

        assert_ne!(home.message_id, help.message_id);
        assert_eq!(f.transport.live(CHAT), vec![help.message_id.unwrap()]);
    }

    #[tokio::test]
    async fn top_window_spans_upstream_pages() {
        let f = fixture();
        f.provider.set_top(60);

        f.handler
            .handle(CHAT, Action::ShowTop {
                offset: 20,
                limit: 10,
                hide_epic: None,
            })
            .await
            .unwrap();

        assert_eq!(f.provider.top_calls(), vec![(1, true), (2, true)]);
        let text = last_text(&f);
        assert!(text.starts_with("Top 21-30"), "{text}");
        assert!(text.contains("Map 21"));
        assert!(!text.contains("Map 31"));
        assert_eq!(
            f.ui.session(CHAT).await.view(),
            Some(&ViewState::Top {
                page: TopPage::new(20, 10)
            })
        );
    }

    #[tokio::test]
    async fn top_override_updates_session_toggle() {
        let f = fixture();
        f.provider.set_top(3);
        f.handler
            .handle(CHAT, Action::ShowTop {
                offset: 0,
                limit: 10,
                hide_epic: Some(false),
            })
            .await
            .unwrap();
        assert_eq!(f.provider.top_calls(), vec![(1, false)]);
        assert!(!f.ui.hide_epic(CHAT).await);
    }

    #[tokio::test]
    async fn top_unavailable_shows_try_again() {
        let f = fixture();
        f.provider
            .fail_top(ProviderError::Unavailable("503".into()));
        let out = f
            .handler
            .handle(CHAT, Action::ShowTop {
                offset: 0,
                limit: 10,
                hide_epic: None,
            })
            .await
            .unwrap();
        assert!(out.message_id.is_some());
        assert_eq!(last_text(&f), TRY_AGAIN);
    }

    #[tokio::test]
    async fn toggle_hide_epic_flips_and_shows_top() {
        let f = fixture();
        f.provider.set_top(5);
        let out = f
            .handler
            .handle(CHAT, Action::ToggleHideEpic)
            .await
            .unwrap();
        assert_eq!(out.toast.as_deref(), Some("Hide Epic: OFF"));
        assert_eq!(f.provider.top_calls(), vec![(1, false)]);
        assert!(last_text(&f).starts_with("Top 1-5"));
    }

    #[tokio::test]
    async fn top_near_max_offset_shows_no_data() {
        let f = fixture();
        f.provider.set_top(3);
        let out = f
            .handler
            .handle(CHAT, Action::ShowTop {
                offset: u32::MAX - 2,
                limit: 10,
                hide_epic: None,
            })
            .await
            .unwrap();
        assert!(out.message_id.is_some());
        assert_eq!(f.provider.top_calls(), vec![(1, true)]);
        assert!(last_text(&f).contains("No data"));
    }

    #[tokio::test]
    async fn outcome_carries_rendered_content() {
        let f = fixture();
        let out = f.handler.handle(CHAT, Action::Help).await.unwrap();
        let (_, posted) = f.transport.posted().pop().unwrap();
        assert_eq!(out.content, Some(posted));
    }

    // ── 3. Lookups ──

    #[tokio::test]
    async fn map_by_link_shows_card() {
        let f = fixture();
        f.provider.add_map(map_card("1234-5678-9012", 42));
        f.handler
            .handle(CHAT, Action::ShowMap {
                ident: "https://fortnite.gg/island?code=1234-5678-9012".into(),
            })
            .await
            .unwrap();
        assert!(last_text(&f).contains("Players: 42"));
        assert_eq!(
            f.ui.session(CHAT).await.view(),
            Some(&ViewState::Map {
                code: "1234-5678-9012".into()
            })
        );
    }

    #[tokio::test]
    async fn unknown_map_shows_not_found() {
        let f = fixture();
        f.handler
            .handle(CHAT, Action::ShowMap {
                ident: "9999-9999-9999".into(),
            })
            .await
            .unwrap();
        assert!(last_text(&f).starts_with("Nothing found"));
    }

    #[tokio::test]
    async fn garbage_identifier_shows_notice() {
        let f = fixture();
        f.handler
            .handle(CHAT, Action::ShowMap {
                ident: "not a code".into(),
            })
            .await
            .unwrap();
        assert!(last_text(&f).contains("is not a map code"));
    }

    #[tokio::test]
    async fn typed_code_routes_to_map_card() {
        let f = fixture();
        f.provider.add_map(map_card("1111-2222-3333", 5));
        f.handler
            .handle(CHAT, Action::Text {
                text: " 1111-2222-3333 ".into(),
            })
            .await
            .unwrap();
        assert!(last_text(&f).contains("1111-2222-3333"));
    }

    #[tokio::test]
    async fn unrecognized_text_posts_nothing() {
        let f = fixture();
        let out = f
            .handler
            .handle(CHAT, Action::Text {
                text: "what's up?".into(),
            })
            .await
            .unwrap();
        assert_eq!(out, Outcome::default());
        assert!(f.transport.posted().is_empty());
    }

    // ── 4. Subscriptions ──

    #[tokio::test]
    async fn subscribe_normalizes_and_reshows_card() {
        let f = fixture();
        f.provider.add_creator(CreatorCard {
            name: "builder".into(),
            total_players_now: 10,
            total_maps: 0,
            maps: vec![],
            avatar: None,
        });

        let out = f
            .handler
            .handle(CHAT, Action::Subscribe {
                target: TargetRef::creator("https://fortnite.gg/creator?name=builder"),
                threshold: 500,
            })
            .await
            .unwrap();

        assert_eq!(out.toast.as_deref(), Some("Alert set: builder >= 500"));
        let subs = f.store.list_by_user(CHAT).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].target, TargetRef::creator("builder"));
        assert!(last_text(&f).starts_with("Creator: builder"));
    }

    #[tokio::test]
    async fn creator_names_differing_in_case_share_one_subscription() {
        let f = fixture();
        for name in ["Builder", "builder", "https://fortnite.gg/creator?name=BUILDER"] {
            f.handler
                .handle(CHAT, Action::Subscribe {
                    target: TargetRef::creator(name),
                    threshold: 50,
                })
                .await
                .unwrap();
        }
        let subs = f.store.list_by_user(CHAT).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].target, TargetRef::creator("builder"));

        let out = f
            .handler
            .handle(CHAT, Action::Text {
                text: "/alertc_del Builder".into(),
            })
            .await
            .unwrap();
        assert_eq!(out.toast.as_deref(), Some("Alert removed: creator:builder"));
        assert!(f.store.list_by_user(CHAT).unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_threshold_is_refused() {
        let f = fixture();
        f.handler
            .handle(CHAT, Action::Subscribe {
                target: TargetRef::map("1234-5678-9012"),
                threshold: 0,
            })
            .await
            .unwrap();
        assert!(f.store.list_by_user(CHAT).unwrap().is_empty());
        assert!(last_text(&f).contains("positive number"));
    }

    #[tokio::test]
    async fn subscribe_command_with_missing_map_still_subscribes() {
        let f = fixture();
        f.handler
            .handle(CHAT, Action::Text {
                text: "/alert_add 1234-5678-9012 100".into(),
            })
            .await
            .unwrap();
        assert_eq!(f.store.list_by_user(CHAT).unwrap().len(), 1);
        assert!(last_text(&f).starts_with("Nothing found"));
    }

    #[tokio::test]
    async fn unsubscribe_shows_list() {
        let f = fixture();
        let target = TargetRef::map("1234-5678-9012");
        f.store.upsert(CHAT, &target, 100).unwrap();

        let out = f
            .handler
            .handle(CHAT, Action::Unsubscribe {
                target: target.clone(),
            })
            .await
            .unwrap();
        assert_eq!(out.toast.as_deref(), Some("Alert removed: map:1234-5678-9012"));
        assert!(last_text(&f).contains("None yet."));

        let again = f
            .handler
            .handle(CHAT, Action::Unsubscribe { target })
            .await
            .unwrap();
        assert!(again.toast.unwrap().starts_with("No alert"));
    }

    #[tokio::test]
    async fn home_counts_subscriptions() {
        let f = fixture();
        f.store
            .upsert(CHAT, &TargetRef::creator("builder"), 50)
            .unwrap();
        f.handler.handle(CHAT, Action::Home).await.unwrap();
        let (_, content) = f.transport.posted().pop().unwrap();
        let labels: Vec<&str> = content
            .buttons
            .iter()
            .flatten()
            .map(|b| b.label.as_str())
            .collect();
        assert!(labels.contains(&"Subscriptions (1)"));
    }

    // ── 5. Stats ──

    #[tokio::test]
    async fn stats_menu_links_both_pages() {
        let f = fixture();
        let out = f.handler.handle(CHAT, Action::ShowStats).await.unwrap();
        let content = out.content.unwrap();
        assert_eq!(content.text, "Fortnite statistics (Player Count)");
        let actions: Vec<&Action> = content
            .buttons
            .iter()
            .flatten()
            .filter_map(|b| match &b.target {
                crate::transport::ButtonTarget::Action(a) => Some(a),
                crate::transport::ButtonTarget::Url(_) => None,
            })
            .collect();
        assert!(actions.contains(&&Action::ShowPopularReleases));
        assert!(actions.contains(&&Action::ShowBuildSplit));
        assert_eq!(f.ui.session(CHAT).await.view(), Some(&ViewState::Stats));
    }

    #[tokio::test(start_paused = true)]
    async fn popular_releases_are_cached_for_five_minutes() {
        let f = fixture();
        f.provider.set_releases(12);

        f.handler
            .handle(CHAT, Action::ShowPopularReleases)
            .await
            .unwrap();
        let text = last_text(&f);
        assert!(text.starts_with("Popular Releases (7d)"));
        assert!(text.contains("#10 Release 10"));
        assert!(!text.contains("Release 11"));

        tokio::time::advance(Duration::from_secs(299)).await;
        f.handler
            .handle(ChatId(8), Action::ShowPopularReleases)
            .await
            .unwrap();
        assert_eq!(f.provider.release_calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        f.handler
            .handle(CHAT, Action::ShowPopularReleases)
            .await
            .unwrap();
        assert_eq!(f.provider.release_calls(), 2);
        assert_eq!(
            f.ui.session(CHAT).await.view(),
            Some(&ViewState::PopularReleases)
        );
    }

    #[tokio::test]
    async fn popular_releases_unavailable_is_not_cached() {
        let f = fixture();
        f.provider
            .fail_top(ProviderError::Unavailable("503".into()));
        f.handler
            .handle(CHAT, Action::ShowPopularReleases)
            .await
            .unwrap();
        assert_eq!(last_text(&f), TRY_AGAIN);
        f.handler
            .handle(CHAT, Action::ShowPopularReleases)
            .await
            .unwrap();
        assert_eq!(f.provider.release_calls(), 2);
    }

    #[tokio::test]
    async fn build_split_page_and_missing_data() {
        let f = fixture();
        f.handler
            .handle(CHAT, Action::ShowBuildSplit)
            .await
            .unwrap();
        assert!(last_text(&f).starts_with("Nothing found"));

        f.provider.set_build_split(ggwatch_core::types::BuildSplit {
            build_now: 1,
            zero_build_now: 3,
        });
        f.handler
            .handle(CHAT, Action::ShowBuildSplit)
            .await
            .unwrap();
        assert!(last_text(&f).contains("Zero Build: 3 (75%)"));
        assert_eq!(f.ui.session(CHAT).await.view(), Some(&ViewState::BuildSplit));
    }

    // ── 6. Errors and clear ──

    #[tokio::test]
    async fn send_failure_surfaces_as_error() {
        let f = fixture();
        f.transport.fail_posts(true);
        let err = f.handler.handle(CHAT, Action::Help).await.unwrap_err();
        assert!(matches!(err, ActionError::Transport(_)));
    }

    #[tokio::test]
    async fn clear_removes_live_message() {
        let f = fixture();
        f.handler.handle(CHAT, Action::Settings).await.unwrap();
        let out = f.handler.handle(CHAT, Action::Clear).await.unwrap();
        assert_eq!(out.message_id, None);
        assert!(f.transport.live(CHAT).is_empty());
    }
}
