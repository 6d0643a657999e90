//! SID-based routing of GENA deliveries.
//!
//! Only notifications whose `SID` was registered reach the consumer's channel.
//! Devices may notify before the `SUBSCRIBE` response has been processed, so a
//! few deliveries for unknown SIDs are held back and replayed when their SID
//! is registered.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// A notification delivered for a registered subscription.
///
/// The body is passed through untouched; interpreting the property set is
/// left to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Value of the `SID` header
    pub subscription_id: String,
    /// Value of the `SEQ` header
    pub seq: u32,
    /// Raw request body
    pub event_xml: String,
}

/// Everything the server forwards to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    /// A well-formed notification for a registered subscription
    Notification(NotificationPayload),
    /// A request that lacked or carried unusable GENA headers
    Rejected {
        subscription_id: Option<String>,
        reason: String,
    },
}

/// Unknown-SID deliveries kept for a later `register`; oldest go first.
const UNCLAIMED_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Routes {
    subscriptions: HashSet<String>,
    unclaimed: VecDeque<NotificationPayload>,
}

/// Routes inbound notifications by subscription ID.
///
/// Notifications for unregistered subscription IDs never reach the channel
/// unless their SID is registered shortly after, so a delivery racing an
/// unsubscribe is harmless.
#[derive(Clone)]
pub struct EventRouter {
    routes: Arc<RwLock<Routes>>,
    event_sender: mpsc::UnboundedSender<CallbackEvent>,
}

impl EventRouter {
    pub fn new(event_sender: mpsc::UnboundedSender<CallbackEvent>) -> Self {
        Self {
            routes: Arc::new(RwLock::new(Routes::default())),
            event_sender,
        }
    }

    /// Start accepting notifications for `subscription_id`.
    ///
    /// Held-back deliveries for it are forwarded first, in arrival order.
    pub async fn register(&self, subscription_id: String) {
        let mut routes = self.routes.write().await;

        let (claimed, rest): (VecDeque<_>, VecDeque<_>) = routes
            .unclaimed
            .drain(..)
            .partition(|payload| payload.subscription_id == subscription_id);
        routes.unclaimed = rest;

        if !claimed.is_empty() {
            debug!(sid = %subscription_id, count = claimed.len(), "Replaying early notifications");
        }
        for payload in claimed {
            let _ = self.event_sender.send(CallbackEvent::Notification(payload));
        }
        routes.subscriptions.insert(subscription_id);
    }

    /// Stop accepting notifications for `subscription_id`.
    pub async fn unregister(&self, subscription_id: &str) {
        let mut routes = self.routes.write().await;
        routes.subscriptions.remove(subscription_id);
        routes
            .unclaimed
            .retain(|payload| payload.subscription_id != subscription_id);
    }

    pub async fn is_registered(&self, subscription_id: &str) -> bool {
        self.routes
            .read()
            .await
            .subscriptions
            .contains(subscription_id)
    }

    /// Forward a notification if its subscription is registered.
    ///
    /// Returns `true` when the payload was handed to the channel. Otherwise
    /// it is held back for a possible `register`.
    pub async fn route_event(&self, payload: NotificationPayload) -> bool {
        let mut routes = self.routes.write().await;

        if routes.subscriptions.contains(&payload.subscription_id) {
            // Receiver gone means nobody is listening any more
            let _ = self.event_sender.send(CallbackEvent::Notification(payload));
            return true;
        }

        debug!(
            sid = %payload.subscription_id,
            "Holding notification for unknown subscription"
        );
        if routes.unclaimed.len() == UNCLAIMED_CAPACITY {
            routes.unclaimed.pop_front();
        }
        routes.unclaimed.push_back(payload);
        false
    }

    /// Report a request whose headers could not be used.
    pub fn reject(&self, subscription_id: Option<String>, reason: impl Into<String>) {
        let _ = self.event_sender.send(CallbackEvent::Rejected {
            subscription_id,
            reason: reason.into(),
        });
    }
}
