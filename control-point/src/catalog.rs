//! Description Catalog
//!
//! Fetches and caches the device description and the per-service
//! descriptions (SCPD) of one remote device. Concurrent resolutions of the
//! same document coalesce into a single request.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use soap_client::SoapClient;
use tokio::sync::Mutex;
use tracing::{debug, info};
use upnp_description::{
    ActionSpec, DeviceDescription, ServiceDescription, ServiceEndpoints, StateVariable,
};
use url::Url;

use crate::error::{ControlPointError, Result};

/// A parsed device description plus the URLs needed to reach its services.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Where the description was fetched from
    pub location: Url,
    /// `scheme://host:port/` of the device; relative endpoint paths are joined to it
    pub root_url: Url,
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub udn: Option<String>,
    /// Services of the root device and all embedded devices, one per service type
    pub services: Vec<ServiceEndpoints>,
    /// The document as received
    pub raw_document: String,
}

impl DeviceDescriptor {
    /// Parse a device description fetched from `location`.
    pub fn from_document(location: &Url, raw_document: String) -> Result<Self> {
        let root_url = root_url(location)?;
        let description = DeviceDescription::from_xml(&raw_document)?;

        let DeviceDescription {
            device_type,
            friendly_name,
            manufacturer,
            model_name,
            udn,
            services: listed,
        } = description;

        // First occurrence of a service type wins
        let mut services: Vec<ServiceEndpoints> = Vec::with_capacity(listed.len());
        for service in listed {
            if services
                .iter()
                .any(|known| known.service_type == service.service_type)
            {
                debug!(service_type = %service.service_type, "Ignoring duplicate service");
                continue;
            }
            services.push(service);
        }

        Ok(Self {
            location: location.clone(),
            root_url,
            device_type,
            friendly_name,
            manufacturer,
            model_name,
            udn,
            services,
            raw_document,
        })
    }

    pub fn service(&self, service_type: &str) -> Option<&ServiceEndpoints> {
        self.services
            .iter()
            .find(|service| service.service_type == service_type)
    }

    pub fn service_types(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.service_type.as_str())
    }

    /// Resolve an endpoint path from the description.
    ///
    /// Absolute URLs are used verbatim; anything else is joined to the
    /// device root URL, with or without a leading slash.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        join_endpoint(&self.root_url, path)
    }
}

/// One service's endpoints and action catalog.
#[derive(Debug, Clone)]
pub struct ServiceCatalogEntry {
    pub service_type: String,
    pub service_id: Option<String>,
    pub control_url: Url,
    pub event_url: Url,
    pub description_url: Url,
    /// Action name to declared signature
    pub actions: HashMap<String, ActionSpec>,
    pub state_variables: Vec<StateVariable>,
}

impl ServiceCatalogEntry {
    pub fn new(
        device: &DeviceDescriptor,
        endpoints: &ServiceEndpoints,
        description: ServiceDescription,
    ) -> Result<Self> {
        let mut actions = HashMap::with_capacity(description.actions.len());
        for action in description.actions {
            actions.entry(action.name.clone()).or_insert(action);
        }

        Ok(Self {
            service_type: endpoints.service_type.clone(),
            service_id: endpoints.service_id.clone(),
            control_url: device.url_for(&endpoints.control_path)?,
            event_url: device.url_for(&endpoints.event_path)?,
            description_url: device.url_for(&endpoints.description_path)?,
            actions,
            state_variables: description.state_variables,
        })
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    /// Action names in alphabetical order.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

type ServiceSlot = Arc<Mutex<Option<Arc<ServiceCatalogEntry>>>>;

/// Cache of description documents for one device.
///
/// Snapshots are handed out as `Arc`s, so a forced reload never disturbs a
/// caller that is still using the previous descriptor.
#[derive(Debug)]
pub struct DescriptionCatalog {
    location: Url,
    root_url: Url,
    client: SoapClient,
    device: Mutex<Option<Arc<DeviceDescriptor>>>,
    services: DashMap<String, ServiceSlot>,
}

impl DescriptionCatalog {
    pub fn new(location: Url, client: SoapClient) -> Result<Self> {
        let root_url = root_url(&location)?;
        Ok(Self {
            location,
            root_url,
            client,
            device: Mutex::new(None),
            services: DashMap::new(),
        })
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Fetch and parse the device description, or return the cached one.
    ///
    /// A forced reload replaces the descriptor and drops every cached
    /// service entry.
    pub async fn resolve_device(&self, force_reload: bool) -> Result<Arc<DeviceDescriptor>> {
        // Held across the fetch so concurrent callers share one request
        let mut slot = self.device.lock().await;

        if !force_reload {
            if let Some(device) = slot.as_ref() {
                return Ok(device.clone());
            }
        }

        debug!(location = %self.location, "Fetching device description");
        let document = self.client.fetch(self.location.as_str()).await?;
        let device = Arc::new(DeviceDescriptor::from_document(&self.location, document)?);

        info!(
            location = %self.location,
            friendly_name = ?device.friendly_name,
            services = device.services.len(),
            "Device description loaded"
        );

        if force_reload {
            self.services.clear();
        }
        *slot = Some(device.clone());
        Ok(device)
    }

    /// Resolve the catalog entry of one service type.
    ///
    /// `force_reload` is forwarded to the device resolution and also
    /// refetches the service description.
    pub async fn resolve_service(
        &self,
        service_type: &str,
        force_reload: bool,
    ) -> Result<Arc<ServiceCatalogEntry>> {
        let device = self.resolve_device(force_reload).await?;
        let endpoints = device
            .service(service_type)
            .ok_or_else(|| ControlPointError::ServiceNotFound(service_type.to_string()))?;

        let slot = self
            .services
            .entry(service_type.to_string())
            .or_default()
            .clone();
        let mut cached = slot.lock().await;

        if !force_reload {
            if let Some(entry) = cached.as_ref() {
                return Ok(entry.clone());
            }
        }

        let description_url = device.url_for(&endpoints.description_path)?;
        debug!(%service_type, url = %description_url, "Fetching service description");
        let document = self.client.fetch(description_url.as_str()).await?;
        let description = ServiceDescription::from_xml(&document)?;

        let entry = Arc::new(ServiceCatalogEntry::new(&device, endpoints, description)?);
        debug!(%service_type, actions = entry.actions.len(), "Service description loaded");

        *cached = Some(entry.clone());
        Ok(entry)
    }

    /// Event subscription URL of a service; needs only the device description.
    pub async fn event_url(&self, service_type: &str) -> Result<Url> {
        let device = self.resolve_device(false).await?;
        let endpoints = device
            .service(service_type)
            .ok_or_else(|| ControlPointError::ServiceNotFound(service_type.to_string()))?;
        device.url_for(&endpoints.event_path)
    }

    /// Join a path to the device root URL without fetching anything.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        join_endpoint(&self.root_url, path)
    }

    /// Forget every cached document.
    pub async fn reset(&self) {
        *self.device.lock().await = None;
        self.services.clear();
    }
}

fn root_url(location: &Url) -> Result<Url> {
    if location.cannot_be_a_base() || location.host_str().is_none() {
        return Err(ControlPointError::Configuration(format!(
            "Device location has no host: {}",
            location
        )));
    }

    let mut root = location.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    Ok(root)
}

/// Absolute URLs are used verbatim; anything else is joined to `root`,
/// with or without a leading slash.
fn join_endpoint(root: &Url, path: &str) -> Result<Url> {
    let path = path.trim();
    match Url::parse(path) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => root.join(path).map_err(|e| {
            ControlPointError::MalformedDescription(format!(
                "Invalid endpoint path {}: {}",
                path, e
            ))
        }),
        Err(e) => Err(ControlPointError::MalformedDescription(format!(
            "Invalid endpoint URL {}: {}",
            path, e
        ))),
    }
}
