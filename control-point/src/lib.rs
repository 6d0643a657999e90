//! UPnP control point for a single remote device.
//!
//! A [`ControlPoint`] is created from the URL of a device description. It
//! offers four things:
//!
//! - **Description catalog**: the device description and each service's SCPD,
//!   fetched on demand and cached ([`ControlPoint::resolve_device`],
//!   [`ControlPoint::resolve_service`]).
//! - **Actions**: SOAP invocations checked against the catalog
//!   ([`ControlPoint::invoke`]) or sent as given ([`ControlPoint::invoke_raw`]).
//! - **Event listener**: an embedded HTTP server receiving GENA notifications
//!   ([`ControlPoint::start_listener`]).
//! - **Subscriptions**: one GENA subscription per service type, renewed
//!   automatically before it expires ([`ControlPoint::subscribe`]).
//!
//! Asynchronous happenings (subscriptions, events, errors with no caller to
//! return to) arrive on the channel returned by [`ControlPoint::new`].
//!
//! # Example
//!
//! ```no_run
//! use upnp_control::{ControlPoint, ControlPointConfig, ControlPointEvent};
//!
//! #[tokio::main]
//! async fn main() -> upnp_control::Result<()> {
//!     let (control_point, mut events) = ControlPoint::new(
//!         "http://192.168.1.50:1400/xml/device_description.xml",
//!         ControlPointConfig::default(),
//!     )?;
//!
//!     let volume = control_point
//!         .invoke(
//!             "urn:schemas-upnp-org:service:RenderingControl:1",
//!             "GetVolume",
//!             [("InstanceID", "0"), ("Channel", "Master")],
//!             false,
//!         )
//!         .await?;
//!     println!("Volume: {:?}", volume.get("CurrentVolume"));
//!
//!     control_point.start_listener().await?;
//!     control_point
//!         .subscribe("urn:schemas-upnp-org:service:RenderingControl:1")
//!         .await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let ControlPointEvent::Event(notification) = event {
//!             println!("{:?}", notification.properties);
//!         }
//!     }
//!
//!     control_point.shutdown().await
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod invoker;
pub mod listener;
pub mod logging;
pub mod subscription;

pub use catalog::{DescriptionCatalog, DeviceDescriptor, ServiceCatalogEntry};
pub use config::{ControlPointConfig, ListenerConfig};
pub use error::{ControlPointError, Result};
pub use event::{ControlPointEvent, ErrorNotice, ErrorSource, EventNotification};
pub use invoker::ActionResult;
pub use subscription::{SubscriptionInfo, SubscriptionState};

pub use soap_client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, UpnpFault};
pub use upnp_description::{ActionSpec, ArgumentSpec, Direction, ServiceEndpoints, StateVariable};

use std::sync::Arc;

use soap_client::SoapClient;
use tokio::sync::mpsc;
use url::Url;

use crate::invoker::ActionInvoker;
use crate::subscription::SubscriptionManager;

/// Control point bound to one device description URL.
pub struct ControlPoint {
    catalog: Arc<DescriptionCatalog>,
    invoker: ActionInvoker,
    subscriptions: SubscriptionManager,
}

impl ControlPoint {
    /// Create a control point using the default `reqwest` transport.
    ///
    /// Nothing is fetched until the first operation needs it.
    pub fn new(
        location: &str,
        config: ControlPointConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ControlPointEvent>)> {
        let transport = Arc::new(ReqwestTransport::with_timeouts(
            config.http_connect_timeout,
            config.http_request_timeout,
        ));
        Self::with_transport(location, config, transport)
    }

    /// Create a control point on top of a custom HTTP transport.
    pub fn with_transport(
        location: &str,
        config: ControlPointConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ControlPointEvent>)> {
        config.validate()?;
        let location = Url::parse(location).map_err(|e| {
            ControlPointError::Configuration(format!("Invalid device location {}: {}", location, e))
        })?;

        let client = SoapClient::with_transport(transport);
        let catalog = Arc::new(DescriptionCatalog::new(location, client.clone())?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let control_point = Self {
            invoker: ActionInvoker::new(catalog.clone(), client.clone()),
            subscriptions: SubscriptionManager::new(catalog.clone(), client, config, events_tx),
            catalog,
        };
        Ok((control_point, events_rx))
    }

    /// URL of the device description.
    pub fn location(&self) -> &Url {
        self.catalog.location()
    }

    /// The device description, fetched on first use or when forced.
    pub async fn resolve_device(&self, force_reload: bool) -> Result<Arc<DeviceDescriptor>> {
        self.catalog.resolve_device(force_reload).await
    }

    /// The catalog entry of a service type, fetched on first use or when forced.
    ///
    /// Fails with [`ControlPointError::ServiceNotFound`] when the device does
    /// not offer the service.
    pub async fn resolve_service(
        &self,
        service_type: &str,
        force_reload: bool,
    ) -> Result<Arc<ServiceCatalogEntry>> {
        self.catalog
            .resolve_service(service_type, force_reload)
            .await
    }

    /// Invoke an action listed in the service's catalog.
    ///
    /// Only the action's declared `in` arguments are sent, in declared order.
    /// Keys the action does not declare are ignored and declared arguments
    /// missing from `args` are left out.
    pub async fn invoke<I, K, V>(
        &self,
        service_type: &str,
        action: &str,
        args: I,
        force_reload: bool,
    ) -> Result<ActionResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        self.invoker
            .invoke(service_type, action, args, force_reload)
            .await
    }

    /// Invoke an action without consulting the catalog.
    ///
    /// `control_path` is joined to the device root URL and the arguments are
    /// sent in the given order.
    pub async fn invoke_raw<K, V>(
        &self,
        service_type: &str,
        action: &str,
        ordered_args: &[(K, V)],
        control_path: &str,
    ) -> Result<ActionResult>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.invoker
            .invoke_raw(service_type, action, ordered_args, control_path)
            .await
    }

    /// Start the event listener; returns the callback URL.
    ///
    /// Calling it again while running returns the same URL.
    pub async fn start_listener(&self) -> Result<String> {
        self.subscriptions.start_listener().await
    }

    /// Drop all subscriptions and stop the event listener.
    pub async fn stop_listener(&self) -> Result<()> {
        self.subscriptions.stop_listener().await
    }

    pub async fn is_listening(&self) -> bool {
        self.subscriptions.is_listening().await
    }

    pub async fn callback_url(&self) -> Option<String> {
        self.subscriptions.callback_url().await
    }

    /// Subscribe to a service's events.
    ///
    /// Requires a running listener. Succeeds without a request when the
    /// service is already subscribed.
    pub async fn subscribe(&self, service_type: &str) -> Result<()> {
        self.subscriptions.subscribe(service_type).await
    }

    /// Cancel a service's subscription; a no-op when there is none.
    ///
    /// The local subscription is removed even when the device rejects the
    /// request, in which case the error is still returned. A subscription
    /// still being granted is released as soon as the device answers.
    pub async fn unsubscribe(&self, service_type: &str) -> Result<()> {
        self.subscriptions.unsubscribe(service_type).await
    }

    pub async fn subscription(&self, service_type: &str) -> Option<SubscriptionInfo> {
        self.subscriptions.subscription(service_type).await
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.subscriptions().await
    }

    /// Number of renewal timers still scheduled.
    pub async fn pending_renewals(&self) -> usize {
        self.subscriptions.pending_renewals().await
    }

    /// Tear everything down: renewal timers, subscriptions, the listener and
    /// the cached descriptions.
    ///
    /// The control point can be used again afterwards, as if new.
    pub async fn shutdown(&self) -> Result<()> {
        self.subscriptions.shutdown().await
    }
}
