//! Subscription Manager
//!
//! Owns the callback listener and one GENA subscription per service type.
//! Each active subscription has a spawned renewal task whose handle lives in
//! the registry entry; unsubscribe, listener stop and shutdown abort it.
//!
//! Lock order is listener, then registry. Neither lock is held across a
//! request to the device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use soap_client::SoapClient;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::DescriptionCatalog;
use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result};
use crate::event::{ControlPointEvent, ErrorSource};
use crate::listener::EventListener;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Initial `SUBSCRIBE` in flight
    Subscribing,
    Active,
    /// Renewal request in flight
    Renewing,
    /// Last renewal failed; retrying until expiry
    RenewFailed,
    /// `UNSUBSCRIBE` in flight
    Unsubscribing,
}

/// Snapshot of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub service_type: String,
    /// Issued by the device; `None` while subscribing
    pub sid: Option<String>,
    pub event_url: Option<Url>,
    /// Timeout granted by the device
    pub timeout: Option<Duration>,
    pub state: SubscriptionState,
    pub expires_at: Option<std::time::Instant>,
}

/// Renewals are never scheduled closer together than this.
const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

/// Delay before renewing a subscription granted for `timeout`.
///
/// Renewal happens `margin` before expiry, or halfway when the timeout is
/// not longer than the margin, but never sooner than one second.
pub fn renewal_delay(timeout: Duration, margin: Duration) -> Duration {
    let delay = if timeout > margin {
        timeout - margin
    } else {
        timeout / 2
    };
    delay.max(MIN_RENEWAL_DELAY)
}

#[derive(Debug)]
struct Entry {
    sid: Option<String>,
    event_url: Option<Url>,
    timeout: Option<Duration>,
    state: SubscriptionState,
    expires_at: Option<Instant>,
    renewal: Option<JoinHandle<()>>,
    /// Unsubscribe requested while the initial `SUBSCRIBE` was in flight
    cancel_requested: bool,
}

impl Entry {
    fn subscribing() -> Self {
        Self {
            sid: None,
            event_url: None,
            timeout: None,
            state: SubscriptionState::Subscribing,
            expires_at: None,
            renewal: None,
            cancel_requested: false,
        }
    }

    fn has_sid(&self, sid: &str) -> bool {
        self.sid.as_deref() == Some(sid)
    }

    fn cancel_renewal(&mut self) {
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
    }

    fn info(&self, service_type: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            service_type: service_type.to_string(),
            sid: self.sid.clone(),
            event_url: self.event_url.clone(),
            timeout: self.timeout,
            state: self.state,
            expires_at: self.expires_at.map(Instant::into_std),
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    /// Bumped whenever the listener starts or stops
    epoch: u64,
    entries: HashMap<String, Entry>,
}

struct Shared {
    catalog: Arc<DescriptionCatalog>,
    client: SoapClient,
    config: ControlPointConfig,
    events: mpsc::UnboundedSender<ControlPointEvent>,
    listener: Mutex<Option<EventListener>>,
    registry: Mutex<Registry>,
}

impl Shared {
    fn emit(&self, event: ControlPointEvent) {
        let _ = self.events.send(event);
    }
}

pub(crate) struct SubscriptionManager {
    shared: Arc<Shared>,
}

impl SubscriptionManager {
    pub(crate) fn new(
        catalog: Arc<DescriptionCatalog>,
        client: SoapClient,
        config: ControlPointConfig,
        events: mpsc::UnboundedSender<ControlPointEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                client,
                config,
                events,
                listener: Mutex::new(None),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Start the callback listener, or return the running one's URL.
    pub(crate) async fn start_listener(&self) -> Result<String> {
        let mut listener = self.shared.listener.lock().await;
        if let Some(running) = listener.as_ref() {
            return Ok(running.callback_url().to_string());
        }

        let started =
            EventListener::start(&self.shared.config.listener, self.shared.events.clone()).await?;
        let callback_url = started.callback_url().to_string();
        *listener = Some(started);
        self.shared.registry.lock().await.epoch += 1;

        info!(%callback_url, "Listening for events");
        self.shared.emit(ControlPointEvent::ListeningStateChanged {
            listening: true,
            callback_url: Some(callback_url.clone()),
        });
        Ok(callback_url)
    }

    /// Drop every subscription, then stop the listener.
    ///
    /// No `UNSUBSCRIBE` is sent; the device lets the subscriptions lapse.
    pub(crate) async fn stop_listener(&self) -> Result<()> {
        let mut listener = self.shared.listener.lock().await;
        let Some(running) = listener.take() else {
            return Ok(());
        };

        let dropped: Vec<(String, String)> = {
            let mut registry = self.shared.registry.lock().await;
            registry.epoch += 1;
            registry
                .entries
                .drain()
                .filter_map(|(service_type, mut entry)| {
                    entry.cancel_renewal();
                    entry.sid.take().map(|sid| (sid, service_type))
                })
                .collect()
        };

        let stopped = running.stop().await;
        drop(listener);

        for (sid, service_type) in dropped {
            self.shared
                .emit(ControlPointEvent::Unsubscribed { sid, service_type });
        }
        info!("Stopped listening for events");
        self.shared.emit(ControlPointEvent::ListeningStateChanged {
            listening: false,
            callback_url: None,
        });
        stopped
    }

    pub(crate) async fn callback_url(&self) -> Option<String> {
        self.shared
            .listener
            .lock()
            .await
            .as_ref()
            .map(|running| running.callback_url().to_string())
    }

    pub(crate) async fn subscribe(&self, service_type: &str) -> Result<()> {
        let shared = &self.shared;

        let (callback_url, epoch) = {
            let listener = shared.listener.lock().await;
            let Some(running) = listener.as_ref() else {
                return Err(ControlPointError::ListenerNotRunning);
            };

            let mut registry = shared.registry.lock().await;
            if let Some(entry) = registry.entries.get_mut(service_type) {
                // Subscribing again revokes a pending cancel
                entry.cancel_requested = false;
                debug!(%service_type, "Already subscribed");
                return Ok(());
            }
            registry
                .entries
                .insert(service_type.to_string(), Entry::subscribing());
            (running.callback_url().to_string(), registry.epoch)
        };

        let attempt = self.request_subscription(service_type, &callback_url).await;
        let (event_url, granted) = match attempt {
            Ok(result) => result,
            Err(e) => {
                let mut registry = shared.registry.lock().await;
                let placeholder = registry.epoch == epoch
                    && registry
                        .entries
                        .get(service_type)
                        .is_some_and(|entry| entry.state == SubscriptionState::Subscribing);
                if placeholder {
                    registry.entries.remove(service_type);
                }
                return Err(e);
            }
        };

        let sid = granted.sid;
        let timeout = Duration::from_secs(u64::from(granted.timeout_seconds));
        {
            let listener = shared.listener.lock().await;
            let mut registry = shared.registry.lock().await;

            if listener.is_none() || registry.epoch != epoch {
                warn!(%service_type, %sid, "Listener stopped while subscribing");
                return Err(ControlPointError::ListenerNotRunning);
            }
            let Some(entry) = registry.entries.get_mut(service_type) else {
                return Err(ControlPointError::ListenerNotRunning);
            };

            if entry.cancel_requested {
                registry.entries.remove(service_type);
                drop(registry);
                drop(listener);
                self.cancel_granted(service_type, &event_url, &sid).await;
                return Ok(());
            }

            entry.sid = Some(sid.clone());
            entry.event_url = Some(event_url);
            entry.timeout = Some(timeout);
            entry.state = SubscriptionState::Active;
            entry.expires_at = Some(Instant::now() + timeout);
            entry.renewal = Some(spawn_renewal(
                shared.clone(),
                service_type.to_string(),
                sid.clone(),
                renewal_delay(timeout, shared.config.renewal_margin),
            ));

            drop(registry);
            if let Some(running) = listener.as_ref() {
                running.register(&sid, service_type).await;
            }
        }

        info!(%service_type, %sid, timeout_secs = timeout.as_secs(), "Subscribed");
        shared.emit(ControlPointEvent::Subscribed {
            sid,
            service_type: service_type.to_string(),
            timeout,
        });
        Ok(())
    }

    /// Release a subscription the caller unsubscribed from while it was
    /// being granted.
    async fn cancel_granted(&self, service_type: &str, event_url: &Url, sid: &str) {
        info!(%service_type, %sid, "Unsubscribed before the subscription became active");
        if let Err(e) = self.shared.client.unsubscribe(event_url.as_str(), sid).await {
            // The device lets it lapse at the granted timeout
            warn!(%service_type, %sid, error = %e, "UNSUBSCRIBE of cancelled subscription failed");
        }
        self.shared.emit(ControlPointEvent::Unsubscribed {
            sid: sid.to_string(),
            service_type: service_type.to_string(),
        });
    }

    async fn request_subscription(
        &self,
        service_type: &str,
        callback_url: &str,
    ) -> Result<(Url, soap_client::SubscriptionResponse)> {
        let event_url = self.shared.catalog.event_url(service_type).await?;
        let granted = self
            .shared
            .client
            .subscribe(
                event_url.as_str(),
                callback_url,
                self.shared.config.timeout_seconds(),
            )
            .await?;
        Ok((event_url, granted))
    }

    pub(crate) async fn unsubscribe(&self, service_type: &str) -> Result<()> {
        let shared = &self.shared;

        let (sid, event_url) = {
            let mut registry = shared.registry.lock().await;
            let Some(entry) = registry.entries.get_mut(service_type) else {
                return Ok(());
            };
            let (Some(sid), Some(event_url)) = (entry.sid.clone(), entry.event_url.clone()) else {
                // Still subscribing: released as soon as it is granted
                entry.cancel_requested = true;
                debug!(%service_type, "Unsubscribe requested while subscribing");
                return Ok(());
            };
            if entry.state == SubscriptionState::Unsubscribing {
                return Ok(());
            }

            entry.cancel_renewal();
            entry.state = SubscriptionState::Unsubscribing;
            (sid, event_url)
        };

        let outcome = shared.client.unsubscribe(event_url.as_str(), &sid).await;

        let removed = {
            let listener = shared.listener.lock().await;
            let mut registry = shared.registry.lock().await;
            let tracked = registry
                .entries
                .get(service_type)
                .is_some_and(|entry| entry.has_sid(&sid));
            if tracked {
                registry.entries.remove(service_type);
            }
            drop(registry);

            if tracked {
                if let Some(running) = listener.as_ref() {
                    running.unregister(&sid).await;
                }
            }
            tracked
        };

        if removed {
            info!(%service_type, %sid, "Unsubscribed");
            shared.emit(ControlPointEvent::Unsubscribed {
                sid,
                service_type: service_type.to_string(),
            });
        }

        outcome.map_err(ControlPointError::from)
    }

    pub(crate) async fn subscription(&self, service_type: &str) -> Option<SubscriptionInfo> {
        let registry = self.shared.registry.lock().await;
        registry
            .entries
            .get(service_type)
            .map(|entry| entry.info(service_type))
    }

    pub(crate) async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let registry = self.shared.registry.lock().await;
        let mut all: Vec<SubscriptionInfo> = registry
            .entries
            .iter()
            .map(|(service_type, entry)| entry.info(service_type))
            .collect();
        all.sort_by(|a, b| a.service_type.cmp(&b.service_type));
        all
    }

    /// Number of renewal tasks still scheduled or running.
    pub(crate) async fn pending_renewals(&self) -> usize {
        let registry = self.shared.registry.lock().await;
        registry
            .entries
            .values()
            .filter(|entry| {
                entry
                    .renewal
                    .as_ref()
                    .is_some_and(|handle| !handle.is_finished())
            })
            .count()
    }

    pub(crate) async fn is_listening(&self) -> bool {
        self.shared.listener.lock().await.is_some()
    }

    /// Stop the listener, drop every subscription and forget cached descriptions.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        let stopped = self.stop_listener().await;

        {
            let mut registry = self.shared.registry.lock().await;
            registry.epoch += 1;
            for (_, mut entry) in registry.entries.drain() {
                entry.cancel_renewal();
            }
        }

        self.shared.catalog.reset().await;
        stopped
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        // Renewal tasks hold the shared state; stop them so it can be freed
        if let Ok(mut registry) = self.shared.registry.try_lock() {
            for entry in registry.entries.values_mut() {
                entry.cancel_renewal();
            }
        }
    }
}

fn spawn_renewal(
    shared: Arc<Shared>,
    service_type: String,
    sid: String,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(renew_until_cancelled(shared, service_type, sid, delay))
}

async fn renew_until_cancelled(
    shared: Arc<Shared>,
    service_type: String,
    sid: String,
    mut delay: Duration,
) {
    loop {
        tokio::time::sleep(delay).await;

        let (event_url, expires_at) = {
            let mut registry = shared.registry.lock().await;
            let Some(entry) = registry.entries.get_mut(&service_type) else {
                return;
            };
            let (true, Some(event_url), Some(expires_at)) =
                (entry.has_sid(&sid), entry.event_url.clone(), entry.expires_at)
            else {
                return;
            };
            entry.state = SubscriptionState::Renewing;
            (event_url, expires_at)
        };

        debug!(%service_type, %sid, "Renewing subscription");
        let outcome = shared
            .client
            .renew_subscription(event_url.as_str(), &sid, shared.config.timeout_seconds())
            .await;

        let mut registry = shared.registry.lock().await;
        let Some(entry) = registry.entries.get_mut(&service_type) else {
            return;
        };
        if !entry.has_sid(&sid) || entry.state != SubscriptionState::Renewing {
            return;
        }

        match outcome {
            Ok(granted) => {
                let timeout = Duration::from_secs(u64::from(granted.timeout_seconds));
                entry.state = SubscriptionState::Active;
                entry.timeout = Some(timeout);
                entry.expires_at = Some(Instant::now() + timeout);
                drop(registry);

                delay = renewal_delay(timeout, shared.config.renewal_margin);
                debug!(%service_type, %sid, next_in_secs = delay.as_secs(), "Subscription renewed");
                shared.emit(ControlPointEvent::Subscribed {
                    sid: sid.clone(),
                    service_type: service_type.clone(),
                    timeout,
                });
            }
            Err(e) => {
                let now = Instant::now();
                if now >= expires_at {
                    registry.entries.remove(&service_type);
                    drop(registry);
                    expire(&shared, &service_type, &sid, &e.to_string()).await;
                    return;
                }

                entry.state = SubscriptionState::RenewFailed;
                drop(registry);

                delay = shared
                    .config
                    .renewal_retry_backoff
                    .min(expires_at.saturating_duration_since(now));
                warn!(%service_type, %sid, error = %e, retry_in_secs = delay.as_secs(), "Renewal failed");
                shared.emit(ControlPointEvent::error(
                    ErrorSource::Renewal,
                    format!("Renewal of {} ({}) failed: {}", service_type, sid, e),
                ));
            }
        }
    }
}

async fn expire(shared: &Shared, service_type: &str, sid: &str, last_error: &str) {
    if let Some(running) = shared.listener.lock().await.as_ref() {
        running.unregister(sid).await;
    }

    warn!(%service_type, %sid, "Subscription expired");
    shared.emit(ControlPointEvent::error(
        ErrorSource::Expired,
        format!(
            "Subscription {} for {} expired: {}",
            sid, service_type, last_error
        ),
    ));
    shared.emit(ControlPointEvent::Unsubscribed {
        sid: sid.to_string(),
        service_type: service_type.to_string(),
    });
}
