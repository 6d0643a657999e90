//! Event Listener
//!
//! Adapter between the generic callback server and the control point: it
//! knows which service each subscription ID belongs to and turns property
//! sets into [`EventNotification`]s.

use std::collections::HashMap;
use std::sync::Arc;

use callback_server::{CallbackEvent, CallbackServer, NotificationPayload};
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use xmltree::{Element, XMLNode};

use crate::config::ListenerConfig;
use crate::error::Result;
use crate::event::{ControlPointEvent, ErrorSource, EventNotification};

/// A running callback listener and its adapter task.
pub(crate) struct EventListener {
    server: CallbackServer,
    /// Subscription ID to service type
    services: Arc<RwLock<HashMap<String, String>>>,
    adapter: JoinHandle<()>,
}

impl EventListener {
    pub(crate) async fn start(
        config: &ListenerConfig,
        events: mpsc::UnboundedSender<ControlPointEvent>,
    ) -> Result<Self> {
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let server =
            CallbackServer::start(config.bind_addr(), config.advertise_ip, callback_tx).await?;

        let services: Arc<RwLock<HashMap<String, String>>> =
            Arc::new(RwLock::new(HashMap::new()));

        // Ends by itself once the server is gone and the channel closes
        let adapter = tokio::spawn(run_adapter(callback_rx, services.clone(), events));

        Ok(Self {
            server,
            services,
            adapter,
        })
    }

    pub(crate) fn callback_url(&self) -> &str {
        self.server.base_url()
    }

    pub(crate) async fn register(&self, sid: &str, service_type: &str) {
        self.services
            .write()
            .await
            .insert(sid.to_string(), service_type.to_string());
        self.server.router().register(sid.to_string()).await;
    }

    pub(crate) async fn unregister(&self, sid: &str) {
        self.server.router().unregister(sid).await;
        self.services.write().await.remove(sid);
    }

    pub(crate) async fn stop(self) -> Result<()> {
        let Self {
            server, adapter, ..
        } = self;

        server.shutdown().await?;
        if let Err(e) = adapter.await {
            warn!("Event adapter task ended abnormally: {}", e);
        }
        Ok(())
    }
}

async fn run_adapter(
    mut callback_rx: mpsc::UnboundedReceiver<CallbackEvent>,
    services: Arc<RwLock<HashMap<String, String>>>,
    events: mpsc::UnboundedSender<ControlPointEvent>,
) {
    while let Some(callback_event) = callback_rx.recv().await {
        let event = match callback_event {
            CallbackEvent::Notification(payload) => {
                let service_type = services.read().await.get(&payload.subscription_id).cloned();
                match service_type {
                    Some(service_type) => to_event(payload, service_type),
                    // Unsubscribed while the delivery was in flight
                    None => continue,
                }
            }
            CallbackEvent::Rejected {
                subscription_id,
                reason,
            } => ControlPointEvent::error(
                ErrorSource::MalformedNotification,
                match subscription_id {
                    Some(sid) => format!("{}: {}", sid, reason),
                    None => reason,
                },
            ),
        };

        let _ = events.send(event);
    }
}

fn to_event(payload: NotificationPayload, service_type: String) -> ControlPointEvent {
    match parse_property_set(&payload.event_xml) {
        Ok(properties) => {
            debug!(
                sid = %payload.subscription_id,
                seq = payload.seq,
                %service_type,
                properties = properties.len(),
                "Event received"
            );
            ControlPointEvent::Event(EventNotification {
                service_type,
                sid: payload.subscription_id,
                seq: payload.seq,
                properties,
                raw_body: payload.event_xml,
                received_at: Utc::now(),
            })
        }
        Err(message) => {
            warn!(sid = %payload.subscription_id, %message, "Undecodable property set");
            ControlPointEvent::error(
                ErrorSource::MalformedPropertySet,
                format!("{}: {}", payload.subscription_id, message),
            )
        }
    }
}

/// Decode a GENA property set into (variable, value) pairs.
///
/// The root element must be a `propertyset` whose element children are all
/// `property` elements, at least one. Variables of every property are
/// merged in document order; values are the variables' text content.
pub fn parse_property_set(xml: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| format!("Failed to parse property set: {}", e))?;

    if !root.name.contains("propertyset") {
        return Err(format!("Unexpected root element {}", root.name));
    }

    let mut properties = Vec::new();
    let mut property_count = 0;

    for property in child_elements(&root) {
        if !property.name.contains("property") {
            return Err(format!("Unexpected element {} in property set", property.name));
        }
        property_count += 1;

        for variable in child_elements(property) {
            let value = variable
                .get_text()
                .map(|text| text.into_owned())
                .unwrap_or_default();
            properties.push((variable.name.clone(), value));
        }
    }

    if property_count == 0 {
        return Err("Property set has no property elements".to_string());
    }

    Ok(properties)
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}
