//! SOAP client for UPnP device communication
//!
//! This crate provides the wire half of a UPnP control point: the SOAP 1.1
//! codec used for action invocation and the GENA `SUBSCRIBE`/`UNSUBSCRIBE`
//! exchanges used for eventing. It holds no state beyond the HTTP transport.

mod envelope;
mod error;
mod transport;

pub use envelope::{
    build_action_request, decode_action_response, escape_xml, parse_action_response,
    ActionResponse, SOAP_ENCODING_STYLE, SOAP_ENVELOPE_NS,
};
pub use error::{SoapError, UpnpFault};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use std::sync::Arc;

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    transport: Arc<dyn HttpTransport>,
}

impl SoapClient {
    /// Create a new SOAP client backed by [`ReqwestTransport`]
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    /// Create a SOAP client over a custom transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch a document with `GET`, failing on any non-2xx status
    pub async fn fetch(&self, url: &str) -> Result<String, SoapError> {
        tracing::debug!("GET {}", url);
        let response = self.transport.send(HttpRequest::new("GET", url)).await?;

        if !response.is_success() {
            return Err(SoapError::Status {
                method: "GET".to_string(),
                url: url.to_string(),
                status: response.status,
            });
        }

        Ok(response.body)
    }

    /// Send a SOAP request and return the decoded action response
    ///
    /// # Arguments
    /// * `control_url` - Absolute URL of the service's control endpoint
    /// * `service_type` - Service type URN, used as the action namespace
    /// * `action` - Action name
    /// * `args` - Unescaped argument name/value pairs, in wire order
    pub async fn call<K, V>(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(K, V)],
    ) -> Result<ActionResponse, SoapError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = build_action_request(action, service_type, args);
        let soap_action = format!("\"{}#{}\"", service_type, action);

        tracing::debug!("POST {} SOAPACTION {}", control_url, soap_action);
        let request = HttpRequest::new("POST", control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", soap_action)
            .body(body);

        let response = self.transport.send(request).await?;

        // Faults arrive with a 500 status, so the body is decoded first and the
        // status only matters when the body is not a recognizable envelope.
        match parse_action_response(&response.body, action) {
            Err(SoapError::Parse(message)) if !response.is_success() => {
                tracing::debug!("Undecodable {} response: {}", action, message);
                Err(SoapError::Status {
                    method: "POST".to_string(),
                    url: control_url.to_string(),
                    status: response.status,
                })
            }
            other => other,
        }
    }

    /// Subscribe to UPnP events for a service's event endpoint
    ///
    /// # Arguments
    /// * `event_url` - Absolute URL of the event endpoint
    /// * `callback_url` - URL where events should be sent
    /// * `timeout_seconds` - Requested subscription timeout in seconds
    ///
    /// # Returns
    /// A `SubscriptionResponse` containing the SID and actual timeout
    pub async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        tracing::debug!("SUBSCRIBE {} CALLBACK <{}>", event_url, callback_url);
        let request = HttpRequest::new("SUBSCRIBE", event_url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", timeout_seconds));

        let response = self.transport.send(request).await?;
        Self::expect_ok("SUBSCRIBE", event_url, &response)?;

        let sid = required_header(&response, "SID", "SUBSCRIBE")?;
        let timeout = required_header(&response, "TIMEOUT", "SUBSCRIBE")?;
        let timeout_seconds = parse_timeout_header(&timeout, timeout_seconds).ok_or_else(|| {
            SoapError::MalformedResponse(format!("Unparseable TIMEOUT header: {}", timeout))
        })?;

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds,
        })
    }

    /// Renew an existing UPnP subscription
    ///
    /// The renewal is only accepted when the device answers 200, returns both
    /// `SID` and `TIMEOUT`, and the returned SID is the one being renewed.
    ///
    /// # Arguments
    /// * `event_url` - Absolute URL of the event endpoint
    /// * `sid` - Subscription ID to renew
    /// * `timeout_seconds` - Requested renewal timeout in seconds
    pub async fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        tracing::debug!("SUBSCRIBE (renew) {} SID {}", event_url, sid);
        let request = HttpRequest::new("SUBSCRIBE", event_url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", timeout_seconds));

        let response = self.transport.send(request).await?;
        Self::expect_ok("SUBSCRIBE", event_url, &response)?;

        let returned_sid = required_header(&response, "SID", "renewal")?;
        if returned_sid != sid {
            return Err(SoapError::MalformedResponse(format!(
                "Renewal returned SID {} for subscription {}",
                returned_sid, sid
            )));
        }

        let timeout = required_header(&response, "TIMEOUT", "renewal")?;
        let timeout_seconds = parse_timeout_header(&timeout, timeout_seconds).ok_or_else(|| {
            SoapError::MalformedResponse(format!("Unparseable TIMEOUT header: {}", timeout))
        })?;

        Ok(SubscriptionResponse {
            sid: returned_sid,
            timeout_seconds,
        })
    }

    /// Unsubscribe from UPnP events
    ///
    /// # Arguments
    /// * `event_url` - Absolute URL of the event endpoint
    /// * `sid` - Subscription ID to cancel
    pub async fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        tracing::debug!("UNSUBSCRIBE {} SID {}", event_url, sid);
        let request = HttpRequest::new("UNSUBSCRIBE", event_url).header("SID", sid);

        let response = self.transport.send(request).await?;
        Self::expect_ok("UNSUBSCRIBE", event_url, &response)
    }

    fn expect_ok(method: &str, url: &str, response: &HttpResponse) -> Result<(), SoapError> {
        if response.status != 200 {
            return Err(SoapError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(())
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

fn required_header(
    response: &HttpResponse,
    name: &str,
    context: &str,
) -> Result<String, SoapError> {
    response
        .header(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            SoapError::MalformedResponse(format!("Missing {} header in {} response", name, context))
        })
}

/// Parse a GENA `TIMEOUT` header value.
///
/// `Second-<n>` yields `n`. `Second-infinite` (or a bare `infinite`) is
/// treated as the requested timeout so renewals keep being scheduled. A zero
/// timeout grants nothing and is rejected.
pub fn parse_timeout_header(value: &str, requested_seconds: u32) -> Option<u32> {
    let value = value.trim();
    let seconds = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("Second-") => &value[7..],
        _ => value,
    };

    if seconds.eq_ignore_ascii_case("infinite") {
        return Some(requested_seconds);
    }
    seconds.parse::<u32>().ok().filter(|&seconds| seconds > 0)
}
