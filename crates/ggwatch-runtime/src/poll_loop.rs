//! PollingLoop: fetch every subscribed target on a fixed cadence and feed
//! the readings to the threshold engine.
//!
//! One cycle at a time. Fetches within a cycle run concurrently and are
//! each bounded by `fetch_timeout`; a failing target keeps its previous
//! snapshot and is simply retried next cycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ggwatch_core::types::{TargetRef, TargetSnapshot};

use crate::engine::ThresholdEngine;
use crate::error::ProviderError;
use crate::menu::MenuCatalog;
use crate::provider::{DataProvider, with_timeout};
use crate::store::SubscriptionStore;
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub polled: usize,
    pub failed: usize,
    pub alerts: usize,
}

pub struct PollingLoop<P, T, M> {
    provider: Arc<P>,
    store: Arc<SubscriptionStore>,
    engine: Arc<ThresholdEngine<T, M>>,
    config: PollConfig,
    snapshots: Mutex<BTreeMap<TargetRef, TargetSnapshot>>,
    last_report: Mutex<Option<CycleReport>>,
}

impl<P, T, M> PollingLoop<P, T, M>
where
    P: DataProvider,
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    pub fn new(
        provider: Arc<P>,
        store: Arc<SubscriptionStore>,
        engine: Arc<ThresholdEngine<T, M>>,
        config: PollConfig,
    ) -> Self {
        Self {
            provider,
            store,
            engine,
            config,
            snapshots: Mutex::new(BTreeMap::new()),
            last_report: Mutex::new(None),
        }
    }

    /// Current snapshot of every subscribed target.
    pub fn snapshots(&self) -> Vec<TargetSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run one cycle over every subscribed target.
    pub async fn poll_cycle(&self) -> CycleReport {
        let targets = match self.store.distinct_targets() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("cannot list subscribed targets: {e}");
                return CycleReport::default();
            }
        };

        // Rebuild the snapshot set from the live target list, keeping the
        // previous readings of targets that are still subscribed.
        {
            let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
            snapshots.retain(|t, _| targets.contains(t));
            for t in &targets {
                snapshots
                    .entry(t.clone())
                    .or_insert_with(|| TargetSnapshot::empty(t.clone()));
            }
        }

        let fetches = targets.iter().map(|target| async move {
            let result = with_timeout(
                self.config.fetch_timeout,
                self.provider.fetch_online(target),
            )
            .await;
            (target, result)
        });
        let results = join_all(fetches).await;

        let mut report = CycleReport {
            polled: results.len(),
            ..CycleReport::default()
        };
        for (target, result) in results {
            match result {
                Ok(value) => {
                    self.record(target, value);
                    match self.engine.process(target, value) {
                        Ok(fired) => report.alerts += fired,
                        Err(e) => {
                            tracing::warn!(watch = %target, "threshold update failed: {e}");
                            report.failed += 1;
                        }
                    }
                }
                Err(ProviderError::NotFound(_)) => {
                    tracing::debug!(watch = %target, "target not found upstream, keeping subscription");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(watch = %target, "fetch failed: {e}");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            polled = report.polled,
            failed = report.failed,
            alerts = report.alerts,
            "poll cycle done"
        );
        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    fn record(&self, target: &TargetRef, value: u64) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        let snap = snapshots
            .entry(target.clone())
            .or_insert_with(|| TargetSnapshot::empty(target.clone()));
        snap.last_value = Some(value);
        snap.last_polled_at = Some(Utc::now());
    }

    /// Poll until `shutdown` is cancelled. A cycle already running when the
    /// token fires is finished, and the alerts it fired are delivered,
    /// before returning.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "poll loop started"
        );
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_cycle().await;
                }
            }
        }
        self.engine.drain().await;
        tracing::info!("poll loop stopped");
    }
}
