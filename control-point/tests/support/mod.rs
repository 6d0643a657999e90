//! Shared fixtures: a scripted device behind a recording `HttpTransport`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use soap_client::{HttpRequest, HttpResponse, HttpTransport, SoapError};
use tokio::sync::mpsc;
use upnp_control::{ControlPoint, ControlPointConfig, ControlPointEvent, ListenerConfig};

pub const LOCATION: &str = "http://192.168.1.50:1400/xml/device_description.xml";
pub const RENDERING: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
pub const AV_TRANSPORT: &str = "urn:schemas-upnp-org:service:AVTransport:1";

pub const RENDERING_SCPD_URL: &str = "http://192.168.1.50:1400/xml/RenderingControl1.xml";
pub const RENDERING_CONTROL_URL: &str = "http://192.168.1.50:1400/MediaRenderer/RenderingControl/Control";
pub const RENDERING_EVENT_URL: &str = "http://192.168.1.50:1400/MediaRenderer/RenderingControl/Event";
pub const AV_TRANSPORT_EVENT_URL: &str = "http://192.168.1.50:1400/MediaRenderer/AVTransport/Event";

pub const DEVICE_DESCRIPTION: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <UDN>uuid:RINCON_000E58A0123401400</UDN>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
            <controlURL>/MediaRenderer/RenderingControl/Control</controlURL>
            <eventSubURL>/MediaRenderer/RenderingControl/Event</eventSubURL>
            <SCPDURL>/xml/RenderingControl1.xml</SCPDURL>
          </service>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
            <controlURL>/MediaRenderer/AVTransport/Control</controlURL>
            <eventSubURL>/MediaRenderer/AVTransport/Event</eventSubURL>
            <SCPDURL>/xml/AVTransport1.xml</SCPDURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

pub const RENDERING_SCPD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction></argument>
        <argument><name>Channel</name><direction>in</direction></argument>
        <argument><name>CurrentVolume</name><direction>out</direction></argument>
      </argumentList>
    </action>
    <action>
      <name>SetVolume</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction></argument>
        <argument><name>Channel</name><direction>in</direction></argument>
        <argument><name>DesiredVolume</name><direction>in</direction></argument>
      </argumentList>
    </action>
  </actionList>
</scpd>"#;

/// A scripted device. Responses are keyed by method and URL; one-shot
/// responses are consumed before the sticky one. Unscripted requests fail
/// like a refused connection.
#[derive(Debug, Default)]
pub struct FakeDevice {
    once: Mutex<HashMap<(String, String), VecDeque<HttpResponse>>>,
    sticky: Mutex<HashMap<(String, String), HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A device serving the standard description and RenderingControl SCPD.
    pub fn with_descriptions() -> Arc<Self> {
        let device = Self::new();
        device.respond("GET", LOCATION, ok(DEVICE_DESCRIPTION));
        device.respond("GET", RENDERING_SCPD_URL, ok(RENDERING_SCPD));
        device
    }

    pub fn respond(&self, method: &str, url: &str, response: HttpResponse) {
        self.sticky
            .lock()
            .unwrap()
            .insert((method.to_string(), url.to_string()), response);
    }

    pub fn respond_once(&self, method: &str, url: &str, response: HttpResponse) {
        self.once
            .lock()
            .unwrap()
            .entry((method.to_string(), url.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Delay every response; with paused time this only advances the clock.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    pub fn last(&self, method: &str, url: &str) -> Option<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|request| request.method == method && request.url == url)
            .cloned()
    }
}

#[async_trait]
impl HttpTransport for FakeDevice {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SoapError> {
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = (request.method.clone(), request.url.clone());
        let queued = {
            let mut once = self.once.lock().unwrap();
            once.get_mut(&key).and_then(VecDeque::pop_front)
        };
        if let Some(response) = queued {
            return Ok(response);
        }

        let sticky = self.sticky.lock().unwrap().get(&key).cloned();
        sticky.ok_or_else(|| SoapError::Network(format!("connection refused: {} {}", key.0, key.1)))
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body: body.to_string(),
    }
}

pub fn ok(body: &str) -> HttpResponse {
    response(200, &[], body)
}

pub fn status(code: u16) -> HttpResponse {
    response(code, &[], "")
}

/// A successful GENA response granting `sid` for `timeout` seconds.
pub fn granted(sid: &str, timeout: u32) -> HttpResponse {
    let timeout = format!("Second-{}", timeout);
    response(200, &[("SID", sid), ("TIMEOUT", timeout.as_str())], "")
}

pub fn soap_response(action: &str, service_type: &str, values: &[(&str, &str)]) -> HttpResponse {
    let inner: String = values
        .iter()
        .map(|(name, value)| format!("<{name}>{value}</{name}>"))
        .collect();
    ok(&format!(
        r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action}Response xmlns:u="{service_type}">{inner}</u:{action}Response></s:Body></s:Envelope>"#
    ))
}

/// Loopback listener so tests never depend on the host's routes.
pub fn test_config() -> ControlPointConfig {
    ControlPointConfig::default().with_listener(ListenerConfig {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        advertise_ip: None,
    })
}

pub fn control_point(
    device: &Arc<FakeDevice>,
    config: ControlPointConfig,
) -> (ControlPoint, mpsc::UnboundedReceiver<ControlPointEvent>) {
    ControlPoint::with_transport(LOCATION, config, device.clone()).unwrap()
}

/// Everything currently queued on the events channel.
pub fn drain(events: &mut mpsc::UnboundedReceiver<ControlPointEvent>) -> Vec<ControlPointEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
