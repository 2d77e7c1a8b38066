//! ThresholdEngine: applies a fresh reading to a target's subscriptions
//! and hands resulting alerts to the notification dispatcher.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use ggwatch_core::threshold::{self, AlertPolicy};
use ggwatch_core::types::{AlertEvent, TargetRef};

use crate::error::StoreError;
use crate::menu::MenuCatalog;
use crate::store::SubscriptionStore;
use crate::transport::MessageTransport;

pub struct ThresholdEngine<T, M> {
    store: Arc<SubscriptionStore>,
    transport: Arc<T>,
    menu: Arc<M>,
    policy: AlertPolicy,
    deliveries: TaskTracker,
}

impl<T, M> ThresholdEngine<T, M>
where
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    pub fn new(
        store: Arc<SubscriptionStore>,
        transport: Arc<T>,
        menu: Arc<M>,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            menu,
            policy,
            deliveries: TaskTracker::new(),
        }
    }

    /// Evaluate every subscription on `target` against `value` and persist
    /// the transitions. Returns the alerts to deliver.
    pub fn evaluate(&self, target: &TargetRef, value: u64) -> Result<Vec<AlertEvent>, StoreError> {
        let applied = self
            .store
            .update_target(target, self.policy, |subs| threshold::evaluate(subs, value))?;

        let alerts: Vec<AlertEvent> = applied.iter().filter_map(|d| d.alert(value)).collect();
        let rearmed = applied.len() - alerts.len();
        if rearmed > 0 {
            tracing::debug!(watch = %target, value, rearmed, "subscriptions re-armed");
        }
        Ok(alerts)
    }

    /// Send each alert on its own task. Delivery failures are logged and
    /// dropped; the caller does not wait, but `drain` does.
    pub fn dispatch(&self, alerts: Vec<AlertEvent>) -> Vec<JoinHandle<()>> {
        alerts
            .into_iter()
            .map(|event| {
                let transport = Arc::clone(&self.transport);
                let text = self.menu.alert(&event);
                self.deliveries.spawn(async move {
                    match transport.send(event.chat_id, &text).await {
                        Ok(()) => tracing::info!(
                            chat = %event.chat_id,
                            watch = %event.target,
                            value = event.value,
                            threshold = event.threshold,
                            "alert sent"
                        ),
                        Err(e) => tracing::warn!(
                            chat = %event.chat_id,
                            watch = %event.target,
                            "alert dropped: {e}"
                        ),
                    }
                })
            })
            .collect()
    }

    /// `evaluate` followed by `dispatch`. Returns how many alerts fired.
    pub fn process(&self, target: &TargetRef, value: u64) -> Result<usize, StoreError> {
        let alerts = self.evaluate(target, value)?;
        let fired = alerts.len();
        self.dispatch(alerts);
        Ok(fired)
    }

    /// Wait for every alert handed to `dispatch` so far. The subscriptions
    /// behind them are already disarmed, so dropping one here loses it.
    pub async fn drain(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
        self.deliveries.reopen();
    }
}
