//! Error types for the SOAP client

use thiserror::Error;

/// A UPnP fault decoded from a SOAP `Fault` body.
///
/// The raw response body is kept alongside the decoded fields because devices
/// frequently put vendor detail in places the UPnP schema does not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    /// `faultcode` element, e.g. `s:Client`
    pub fault_code: String,
    /// `faultstring` element, usually `UPnPError`
    pub fault_string: String,
    /// `detail/UPnPError/errorCode`, 500 when the device omits it
    pub error_code: u16,
    /// `detail/UPnPError/errorDescription`
    pub error_description: Option<String>,
    /// The undecoded response body
    pub raw_body: String,
}

/// Errors that can occur during SOAP and GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The response body does not have any recognized shape
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault returned by the device
    #[error("SOAP fault: error code {}", .0.error_code)]
    Fault(Box<UpnpFault>),

    /// A GENA response lacked required headers or carried unparseable ones
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The device answered with a non-success status
    #[error("{method} {url} failed: HTTP {status}")]
    Status {
        /// Request method
        method: String,
        /// Request URL
        url: String,
        /// Status code returned by the device
        status: u16,
    },
}

impl SoapError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SoapError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
