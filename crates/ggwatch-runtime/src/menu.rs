//! MenuCatalog: turns provider data into message content.
//!
//! A chat gateway may restyle the text and buttons it receives.

use ggwatch_core::session::{QUICK_THRESHOLDS, TopPage};
use ggwatch_core::types::{
    AlertEvent, BuildSplit, CreatorCard, MapCard, MapSummary, ReleaseSummary, Subscription,
    TargetKind, TargetRef,
};

use crate::actions::Action;
use crate::transport::{Button, Content};

const SITE: &str = "https://fortnite.gg";

pub trait MenuCatalog: Send + Sync {
    fn home(&self, hide_epic: bool, subscription_count: usize) -> Content;
    fn help(&self) -> Content;
    fn settings(&self, hide_epic: bool) -> Content;
    fn top(&self, page: TopPage, hide_epic: bool, items: &[MapSummary]) -> Content;
    fn map_card(&self, card: &MapCard) -> Content;
    fn creator_card(&self, card: &CreatorCard) -> Content;
    fn subscriptions(&self, subs: &[Subscription]) -> Content;
    fn stats_home(&self) -> Content;
    fn popular_releases(&self, items: &[ReleaseSummary]) -> Content;
    fn build_split(&self, split: &BuildSplit) -> Content;
    fn custom_threshold(&self, target: &TargetRef) -> Content;
    /// Ask the user to send a map code or creator name.
    fn find_prompt(&self, kind: TargetKind) -> Content;
    fn notice(&self, text: &str) -> Content;
    /// Text of a threshold notification.
    fn alert(&self, event: &AlertEvent) -> String;
}

/// Plain-text catalog with an optional banner photo on the home screen.
#[derive(Debug, Clone, Default)]
pub struct TextMenu {
    banner: Option<String>,
}

impl TextMenu {
    pub fn new(banner: Option<String>) -> Self {
        Self { banner }
    }
}

fn home_row() -> Vec<Button> {
    vec![Button::action("Home", Action::Home)]
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

fn epic_toggle(hide_epic: bool) -> Button {
    let label = if hide_epic { "Show Epic" } else { "Hide Epic" };
    Button::action(label, Action::ToggleHideEpic)
}

fn alert_rows(target: &TargetRef) -> Vec<Vec<Button>> {
    let quick = QUICK_THRESHOLDS
        .iter()
        .map(|&t| {
            Button::action(
                format!("Alert {t}"),
                Action::Subscribe {
                    target: target.clone(),
                    threshold: u64::from(t),
                },
            )
        })
        .collect();
    vec![
        quick,
        vec![Button::action(
            "Custom threshold",
            Action::CustomThreshold {
                target: target.clone(),
            },
        )],
    ]
}

fn stats_back_row() -> Vec<Button> {
    vec![
        Button::action("Back", Action::ShowStats),
        Button::action("Home", Action::Home),
    ]
}

fn percent(pct: Option<u8>) -> String {
    pct.map(|p| format!("{p}%")).unwrap_or_else(|| "-".into())
}

fn format_row(row: &MapSummary) -> String {
    let rank = row.rank.map(|r| format!("#{r} ")).unwrap_or_default();
    let plays = row.plays_24h.as_deref().unwrap_or("-");
    format!(
        "{rank}{}\n{}\nNow: {}   Peak: {}   24h plays: {plays}",
        row.title, row.code, row.players_now, row.all_time_peak
    )
}

fn target_url(target: &TargetRef) -> String {
    match target.kind {
        TargetKind::Map => format!("{SITE}/island?code={}", target.id),
        TargetKind::Creator => format!("{SITE}/creator?name={}", target.id),
    }
}

impl MenuCatalog for TextMenu {
    fn home(&self, hide_epic: bool, subscription_count: usize) -> Content {
        Content {
            text: format!(
                "fortnite.gg creative stats.\n\nHide Epic: {}\nPick a section:",
                on_off(hide_epic)
            ),
            buttons: vec![
                vec![Button::action("Top 10", Action::ShowTop {
                    offset: 0,
                    limit: 10,
                    hide_epic: None,
                })],
                vec![
                    Button::action("Find map", Action::FindPrompt {
                        kind: TargetKind::Map,
                    }),
                    Button::action("Creator", Action::FindPrompt {
                        kind: TargetKind::Creator,
                    }),
                ],
                vec![
                    Button::action(
                        format!("Subscriptions ({subscription_count})"),
                        Action::ShowSubscriptions,
                    ),
                    Button::action("Settings", Action::Settings),
                ],
                vec![
                    Button::action("Stats", Action::ShowStats),
                    Button::action("Help", Action::Help),
                ],
            ],
            photo: self.banner.clone(),
        }
    }

    fn help(&self) -> Content {
        Content {
            text: "Use the buttons to navigate. Commands: /top, /map, /creator, /stats, \
                   /alert_add, /alertc_add, /alerts."
                .into(),
            buttons: vec![home_row()],
            photo: None,
        }
    }

    fn settings(&self, hide_epic: bool) -> Content {
        Content {
            text: format!("Settings:\n- Hide Epic: {}", on_off(hide_epic)),
            buttons: vec![vec![epic_toggle(hide_epic)], home_row()],
            photo: None,
        }
    }

    fn top(&self, page: TopPage, hide_epic: bool, items: &[MapSummary]) -> Content {
        let mut text = format!(
            "Top {}-{} most played | Hide Epic: {}\n",
            page.offset.saturating_add(1),
            page.offset.saturating_add(items.len() as u32),
            on_off(hide_epic)
        );
        if items.is_empty() {
            text.push_str("\nNo data");
        } else {
            let rows: Vec<String> = items.iter().map(format_row).collect();
            text.push_str(&rows.join("\n"));
        }

        let prev = page.prev();
        let next = page.next();
        let open: Vec<Vec<Button>> = items
            .iter()
            .map(|row| {
                vec![Button::action(row.title.clone(), Action::ShowMap {
                    ident: row.code.clone(),
                })]
            })
            .collect();

        let mut buttons = open;
        buttons.push(vec![
            Button::action("Back", Action::ShowTop {
                offset: prev.offset,
                limit: prev.limit,
                hide_epic: None,
            }),
            Button::action("Next", Action::ShowTop {
                offset: next.offset,
                limit: next.limit,
                hide_epic: None,
            }),
        ]);
        buttons.push(vec![epic_toggle(hide_epic)]);
        buttons.push(home_row());

        Content {
            text,
            buttons,
            photo: None,
        }
    }

    fn map_card(&self, card: &MapCard) -> Content {
        let mut lines = vec![
            card.name.clone(),
            card.code.clone(),
            format!("Players: {}", card.players_now),
        ];
        if let Some(creator) = &card.creator {
            lines.push(format!("By: {creator}"));
        }
        if let Some(peak) = card.peak_24h {
            lines.push(format!("24h peak: {peak}"));
        }
        if let Some(peak) = card.all_time_peak {
            lines.push(format!("All-time peak: {peak}"));
        }
        if !card.tags.is_empty() {
            lines.push(format!("Tags: {}", card.tags.join(", ")));
        }

        let target = TargetRef::map(card.code.clone());
        let mut buttons = vec![vec![Button::url("Open on fortnite.gg", target_url(&target))]];
        buttons.extend(alert_rows(&target));
        buttons.push(home_row());

        Content {
            text: lines.join("\n"),
            buttons,
            photo: card.image.clone(),
        }
    }

    fn creator_card(&self, card: &CreatorCard) -> Content {
        let mut text = format!(
            "Creator: {}\nNow (sum): {} | Maps: {}\n",
            card.name, card.total_players_now, card.total_maps
        );
        let rows: Vec<String> = card.maps.iter().take(10).map(format_row).collect();
        if !rows.is_empty() {
            text.push('\n');
            text.push_str(&rows.join("\n"));
        }

        let target = TargetRef::creator(card.name.clone());
        let mut buttons = vec![vec![Button::url("Open on fortnite.gg", target_url(&target))]];
        buttons.extend(alert_rows(&target));
        buttons.push(home_row());

        Content {
            text,
            buttons,
            photo: card.avatar.clone(),
        }
    }

    fn subscriptions(&self, subs: &[Subscription]) -> Content {
        let mut lines = vec!["Your subscriptions:".to_string()];
        let mut buttons = Vec::new();

        for kind in [TargetKind::Map, TargetKind::Creator] {
            let of_kind: Vec<&Subscription> =
                subs.iter().filter(|s| s.target.kind == kind).collect();
            if of_kind.is_empty() {
                continue;
            }
            lines.push(match kind {
                TargetKind::Map => "\nMaps:".to_string(),
                TargetKind::Creator => "\nCreators:".to_string(),
            });
            for sub in of_kind {
                let state = if sub.armed { "" } else { " (notified)" };
                lines.push(format!("- {} >= {}{state}", sub.target.id, sub.threshold));
                let open = match kind {
                    TargetKind::Map => Action::ShowMap {
                        ident: sub.target.id.clone(),
                    },
                    TargetKind::Creator => Action::ShowCreator {
                        ident: sub.target.id.clone(),
                    },
                };
                buttons.push(vec![
                    Button::action(sub.target.id.clone(), open),
                    Button::action("Unsubscribe", Action::Unsubscribe {
                        target: sub.target.clone(),
                    }),
                ]);
            }
        }
        if subs.is_empty() {
            lines.push("\nNone yet.".to_string());
        }
        buttons.push(home_row());

        Content {
            text: lines.join("\n"),
            buttons,
            photo: None,
        }
    }

    fn stats_home(&self) -> Content {
        Content {
            text: "Fortnite statistics (Player Count)".into(),
            buttons: vec![
                vec![Button::action(
                    "Popular Releases (7d)",
                    Action::ShowPopularReleases,
                )],
                vec![Button::action("Build vs Zero Build", Action::ShowBuildSplit)],
                vec![Button::url("Player count", format!("{SITE}/player-count"))],
                home_row(),
            ],
            photo: None,
        }
    }

    fn popular_releases(&self, items: &[ReleaseSummary]) -> Content {
        let mut text = "Popular Releases (7d)\n".to_string();
        if items.is_empty() {
            text.push_str("\nNo data");
        }
        for row in items {
            let peak = row
                .peak_24h
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into());
            text.push_str(&format!(
                "\n#{} {}\n{}\nOnline: {}   Peak 24h: {peak}",
                row.rank, row.title, row.code, row.players_now
            ));
        }

        let mut buttons: Vec<Vec<Button>> = items
            .iter()
            .map(|row| {
                vec![Button::action(row.title.clone(), Action::ShowMap {
                    ident: row.code.clone(),
                })]
            })
            .collect();
        buttons.push(stats_back_row());

        Content {
            text,
            buttons,
            photo: None,
        }
    }

    fn build_split(&self, split: &BuildSplit) -> Content {
        let build = split.build_pct();
        let zero = build.map(|p| 100 - p);
        Content {
            text: format!(
                "Build vs Zero Build\n\nBuild: {} ({})\nZero Build: {} ({})",
                split.build_now,
                percent(build),
                split.zero_build_now,
                percent(zero)
            ),
            buttons: vec![stats_back_row()],
            photo: None,
        }
    }

    fn custom_threshold(&self, target: &TargetRef) -> Content {
        let command = match target.kind {
            TargetKind::Map => "/alert_add",
            TargetKind::Creator => "/alertc_add",
        };
        Content {
            text: format!("Send: {command} {} <threshold>", target.id),
            buttons: vec![home_row()],
            photo: None,
        }
    }

    fn find_prompt(&self, kind: TargetKind) -> Content {
        let text = match kind {
            TargetKind::Map => {
                "Send a code like 1234-5678-9012 or a fortnite.gg/island?code=... link."
            }
            TargetKind::Creator => "Send a creator name or a fortnite.gg/creator?name=... link.",
        };
        self.notice(text)
    }

    fn notice(&self, text: &str) -> Content {
        Content {
            text: text.to_string(),
            buttons: vec![home_row()],
            photo: None,
        }
    }

    fn alert(&self, event: &AlertEvent) -> String {
        let what = match event.target.kind {
            TargetKind::Map => "Map",
            TargetKind::Creator => "Creator",
        };
        format!(
            "{what} {} reached {} players (threshold {}).\n{}",
            event.target.id,
            event.value,
            event.threshold,
            target_url(&event.target)
        )
    }
}
