//! Device description parsing and validation.
//!
//! This module handles parsing UPnP device description XML into the list of
//! services the device (and any embedded devices) expose.

use crate::error::{optional, required, DescriptionError, Result};
use serde::Deserialize;

/// UPnP device description root element.
#[derive(Debug, Deserialize)]
struct Root {
    device: DeviceNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceNode {
    device_type: Option<String>,
    friendly_name: Option<String>,
    manufacturer: Option<String>,
    model_name: Option<String>,
    #[serde(rename = "UDN")]
    udn: Option<String>,
    service_list: Option<ServiceList>,
    device_list: Option<DeviceList>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceList {
    #[serde(rename = "service", default)]
    services: Vec<ServiceNode>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceList {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceNode>,
}

#[derive(Debug, Deserialize)]
struct ServiceNode {
    #[serde(rename = "serviceType")]
    service_type: Option<String>,
    #[serde(rename = "serviceId")]
    service_id: Option<String>,
    #[serde(rename = "controlURL")]
    control_url: Option<String>,
    #[serde(rename = "eventSubURL")]
    event_sub_url: Option<String>,
    #[serde(rename = "SCPDURL")]
    scpd_url: Option<String>,
}

/// Endpoints of one service, as written in the device description.
///
/// Paths are kept verbatim; they may be absolute URLs or paths relative to
/// the device's root URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Service type URN, e.g. `urn:schemas-upnp-org:service:AVTransport:1`
    pub service_type: String,
    /// Service identifier, when the device provides one
    pub service_id: Option<String>,
    /// Control endpoint for SOAP actions
    pub control_path: String,
    /// Event endpoint for GENA subscriptions
    pub event_path: String,
    /// Location of the service description (SCPD)
    pub description_path: String,
}

/// A parsed device description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub udn: Option<String>,
    /// Services of the root device followed by those of embedded devices,
    /// in document order
    pub services: Vec<ServiceEndpoints>,
}

impl DeviceDescription {
    /// Parse device description from XML.
    ///
    /// # Errors
    ///
    /// Returns `DescriptionError::Parse` if the XML is malformed and
    /// `DescriptionError::Malformed` if no service is listed or a listed
    /// service lacks its type or one of its endpoints.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml)
            .map_err(|e| DescriptionError::Parse(format!("Failed to parse device XML: {}", e)))?;

        let mut services = Vec::new();
        collect_services(&root.device, &mut services)?;

        if services.is_empty() {
            return Err(DescriptionError::Malformed(
                "Device description lists no services".to_string(),
            ));
        }

        let device = root.device;
        Ok(Self {
            device_type: optional(device.device_type),
            friendly_name: optional(device.friendly_name),
            manufacturer: optional(device.manufacturer),
            model_name: optional(device.model_name),
            udn: optional(device.udn),
            services,
        })
    }

    /// Endpoints for the given service type.
    pub fn service(&self, service_type: &str) -> Option<&ServiceEndpoints> {
        self.services
            .iter()
            .find(|service| service.service_type == service_type)
    }
}

fn collect_services(device: &DeviceNode, out: &mut Vec<ServiceEndpoints>) -> Result<()> {
    if let Some(list) = &device.service_list {
        for node in &list.services {
            out.push(to_endpoints(node)?);
        }
    }
    if let Some(list) = &device.device_list {
        for embedded in &list.devices {
            collect_services(embedded, out)?;
        }
    }
    Ok(())
}

fn to_endpoints(node: &ServiceNode) -> Result<ServiceEndpoints> {
    let service_type = required(node.service_type.clone(), "serviceType", "service")?;
    let context = format!("service {}", service_type);

    Ok(ServiceEndpoints {
        control_path: required(node.control_url.clone(), "controlURL", &context)?,
        event_path: required(node.event_sub_url.clone(), "eventSubURL", &context)?,
        description_path: required(node.scpd_url.clone(), "SCPDURL", &context)?,
        service_id: optional(node.service_id.clone()),
        service_type,
    })
}
