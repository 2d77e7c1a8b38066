//! SQLite persistence for subscriptions and the UI session cache.
//!
//! One connection behind a mutex: every public method is a single atomic
//! unit with respect to the poll loop and concurrent user actions.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use ggwatch_core::session::{UiSession, UiState, ViewState};
use ggwatch_core::threshold::{AlertPolicy, Decision, Transition};
use ggwatch_core::types::{
    ChatId, MessageId, Subscription, TargetKind, TargetRef, validate_threshold,
};

use crate::error::StoreError;

const SUBSCRIPTION_COLUMNS: &str =
    "chat_id, target_kind, target_id, threshold, armed, created_at, updated_at";

pub struct SubscriptionStore {
    conn: Mutex<Connection>,
}

impl SubscriptionStore {
    /// Open (or create) a database at the given path, run migrations and
    /// verify it is readable.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open the database, starting empty when the file is unreadable.
    ///
    /// The unreadable file is moved to `<path>.corrupt-<unix-ts>`. If a fresh
    /// file cannot be created either, the store lives in memory.
    pub fn open_or_recover(path: &Path) -> Result<Self, StoreError> {
        let err = match Self::open(path) {
            Ok(store) => return Ok(store),
            Err(e) => e,
        };
        tracing::warn!(
            "subscription store at {} is unreadable, starting empty: {err}",
            path.display()
        );

        let aside = corrupt_path(path, Utc::now());
        match std::fs::rename(path, &aside) {
            Ok(()) => tracing::warn!("moved unreadable store to {}", aside.display()),
            Err(e) => tracing::warn!("could not move unreadable store aside: {e}"),
        }

        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::warn!("cannot create store at {}, using memory: {e}", path.display());
                Self::open_in_memory()
            }
        }
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        verify(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied write:
        // multi-statement updates run in a transaction that rolls back on drop.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Subscriptions ───────────────────────────────────────────

    /// Create or replace the chat's subscription to `target`.
    ///
    /// Replacing keeps `created_at`, takes the new threshold and re-arms.
    pub fn upsert(
        &self,
        chat_id: ChatId,
        target: &TargetRef,
        threshold: u64,
    ) -> Result<Subscription, StoreError> {
        let threshold = validate_threshold(threshold)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO subscriptions
                (chat_id, target_kind, target_id, threshold, armed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
             ON CONFLICT (chat_id, target_kind, target_id) DO UPDATE SET
                threshold = excluded.threshold,
                armed = 1,
                updated_at = excluded.updated_at",
            params![chat_id.0, target.kind.as_str(), target.id, threshold, now],
        )?;
        let raw = conn.query_row(
            &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                 WHERE chat_id = ?1 AND target_kind = ?2 AND target_id = ?3"
            ),
            params![chat_id.0, target.kind.as_str(), target.id],
            RawSubscription::from_row,
        )?;
        raw.decode()
    }

    /// Delete a subscription. Returns `false` if none existed.
    pub fn remove(&self, chat_id: ChatId, target: &TargetRef) -> Result<bool, StoreError> {
        let n = self.lock().execute(
            "DELETE FROM subscriptions
             WHERE chat_id = ?1 AND target_kind = ?2 AND target_id = ?3",
            params![chat_id.0, target.kind.as_str(), target.id],
        )?;
        Ok(n > 0)
    }

    pub fn list_by_user(&self, chat_id: ChatId) -> Result<Vec<Subscription>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE chat_id = ?1 ORDER BY target_kind, target_id"
        ))?;
        let rows = stmt.query_map(params![chat_id.0], RawSubscription::from_row)?;
        collect_rows(rows)
    }

    pub fn list_by_target(&self, target: &TargetRef) -> Result<Vec<Subscription>, StoreError> {
        let conn = self.lock();
        select_by_target(&conn, target)
    }

    /// Every target with at least one subscription.
    pub fn distinct_targets(&self) -> Result<BTreeSet<TargetRef>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT target_kind, target_id FROM subscriptions")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut targets = BTreeSet::new();
        for row in rows {
            let (kind, id) = row?;
            match kind.parse::<TargetKind>() {
                Ok(kind) => {
                    targets.insert(TargetRef { kind, id });
                }
                Err(e) => tracing::warn!("skipping subscription row: {e}"),
            }
        }
        Ok(targets)
    }

    /// Apply threshold decisions for one target atomically.
    ///
    /// `decide` sees the target's current subscriptions; the decisions it
    /// returns are written in the same transaction, so no `upsert` or
    /// `remove` can land between the read and the write. Returns the
    /// decisions that matched a row.
    pub fn update_target<F>(
        &self,
        target: &TargetRef,
        policy: AlertPolicy,
        decide: F,
    ) -> Result<Vec<Decision>, StoreError>
    where
        F: FnOnce(&[Subscription]) -> Vec<Decision>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let subs = select_by_target(&tx, target)?;
        let decisions = decide(&subs);

        let now = Utc::now().to_rfc3339();
        let mut applied = Vec::with_capacity(decisions.len());
        for decision in decisions {
            if apply_decision(&tx, &decision, policy, &now)? {
                applied.push(decision);
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    // ─── UI session cache ────────────────────────────────────────

    pub fn save_session(&self, session: &UiSession) -> Result<(), StoreError> {
        let (message_id, view) = match &session.state {
            UiState::Idle => (None, None),
            UiState::Showing { message_id, view } => {
                (Some(message_id.0), Some(serde_json::to_string(view)?))
            }
        };
        self.lock().execute(
            "INSERT INTO ui_sessions (chat_id, active_message_id, view, hide_epic, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (chat_id) DO UPDATE SET
                active_message_id = excluded.active_message_id,
                view = excluded.view,
                hide_epic = excluded.hide_epic,
                updated_at = excluded.updated_at",
            params![
                session.chat_id.0,
                message_id,
                view,
                session.hide_epic,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn load_session(&self, chat_id: ChatId) -> Result<Option<UiSession>, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT chat_id, active_message_id, view, hide_epic
                 FROM ui_sessions WHERE chat_id = ?1",
                params![chat_id.0],
                RawSession::from_row,
            )
            .optional()?;
        Ok(raw.map(RawSession::decode))
    }

    pub fn load_sessions(&self) -> Result<Vec<UiSession>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT chat_id, active_message_id, view, hide_epic FROM ui_sessions")?;
        let rows = stmt.query_map([], RawSession::from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?.decode());
        }
        Ok(result)
    }
}

// ─── Schema ──────────────────────────────────────────────────────

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            chat_id      INTEGER NOT NULL,
            target_kind  TEXT NOT NULL,
            target_id    TEXT NOT NULL,
            threshold    INTEGER NOT NULL CHECK (threshold > 0),
            armed        INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            PRIMARY KEY (chat_id, target_kind, target_id)
        );
        CREATE INDEX IF NOT EXISTS subscriptions_by_target
            ON subscriptions (target_kind, target_id);
        CREATE TABLE IF NOT EXISTS ui_sessions (
            chat_id            INTEGER PRIMARY KEY,
            active_message_id  INTEGER,
            view               TEXT,
            hide_epic          INTEGER NOT NULL DEFAULT 1,
            updated_at         TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn verify(conn: &Connection) -> Result<(), StoreError> {
    let status: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if status != "ok" {
        return Err(StoreError::Corrupt(status));
    }
    Ok(())
}

fn corrupt_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".corrupt-{}", now.timestamp()));
    PathBuf::from(name)
}

// ─── Row decoding ────────────────────────────────────────────────

struct RawSubscription {
    chat_id: i64,
    target_kind: String,
    target_id: String,
    threshold: i64,
    armed: bool,
    created_at: String,
    updated_at: String,
}

impl RawSubscription {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(0)?,
            target_kind: row.get(1)?,
            target_id: row.get(2)?,
            threshold: row.get(3)?,
            armed: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Subscription, StoreError> {
        let kind = self.target_kind.parse::<TargetKind>()?;
        let threshold = validate_threshold(u64::try_from(self.threshold).unwrap_or(0))?;
        Ok(Subscription {
            chat_id: ChatId(self.chat_id),
            target: TargetRef {
                kind,
                id: self.target_id,
            },
            threshold,
            armed: self.armed,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Decode rows, skipping (and logging) any that no longer make sense.
fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawSubscription>>,
) -> Result<Vec<Subscription>, StoreError> {
    let mut result = Vec::new();
    for row in rows {
        match row?.decode() {
            Ok(sub) => result.push(sub),
            Err(e) => tracing::warn!("skipping subscription row: {e}"),
        }
    }
    Ok(result)
}

fn select_by_target(conn: &Connection, target: &TargetRef) -> Result<Vec<Subscription>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
         WHERE target_kind = ?1 AND target_id = ?2 ORDER BY chat_id"
    ))?;
    let rows = stmt.query_map(
        params![target.kind.as_str(), target.id],
        RawSubscription::from_row,
    )?;
    collect_rows(rows)
}

/// Write one decision. The `threshold`/`armed` guard makes a decision
/// computed against an older version of the row a no-op.
fn apply_decision(
    tx: &Transaction<'_>,
    decision: &Decision,
    policy: AlertPolicy,
    now: &str,
) -> Result<bool, StoreError> {
    let key = &decision.key;
    let kind = key.target.kind.as_str();
    let n = match (decision.transition, policy) {
        (Transition::Fire, AlertPolicy::Rearm) => tx.execute(
            "UPDATE subscriptions SET armed = 0, updated_at = ?5
             WHERE chat_id = ?1 AND target_kind = ?2 AND target_id = ?3
               AND threshold = ?4 AND armed = 1",
            params![key.chat_id.0, kind, key.target.id, decision.threshold, now],
        )?,
        (Transition::Fire, AlertPolicy::OneShot) => tx.execute(
            "DELETE FROM subscriptions
             WHERE chat_id = ?1 AND target_kind = ?2 AND target_id = ?3
               AND threshold = ?4 AND armed = 1",
            params![key.chat_id.0, kind, key.target.id, decision.threshold],
        )?,
        (Transition::Rearm, _) => tx.execute(
            "UPDATE subscriptions SET armed = 1, updated_at = ?5
             WHERE chat_id = ?1 AND target_kind = ?2 AND target_id = ?3
               AND threshold = ?4 AND armed = 0",
            params![key.chat_id.0, kind, key.target.id, decision.threshold, now],
        )?,
    };
    Ok(n == 1)
}

struct RawSession {
    chat_id: i64,
    active_message_id: Option<i64>,
    view: Option<String>,
    hide_epic: bool,
}

impl RawSession {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(0)?,
            active_message_id: row.get(1)?,
            view: row.get(2)?,
            hide_epic: row.get(3)?,
        })
    }

    /// An unreadable view still restores the message id, so the message is
    /// deleted on the next navigation instead of being orphaned.
    fn decode(self) -> UiSession {
        let state = match self.active_message_id {
            None => UiState::Idle,
            Some(id) => {
                let view = self
                    .view
                    .as_deref()
                    .and_then(|v| serde_json::from_str::<ViewState>(v).ok())
                    .unwrap_or(ViewState::Home);
                UiState::Showing {
                    message_id: MessageId(id),
                    view,
                }
            }
        };
        UiSession {
            chat_id: ChatId(self.chat_id),
            state,
            hide_epic: self.hide_epic,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
