//! Error types for the control point.

use callback_server::CallbackError;
use soap_client::{SoapError, UpnpFault};
use upnp_description::DescriptionError;

/// Errors returned by control point operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlPointError {
    /// Connection or I/O failure talking to the device
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device answered with an unexpected HTTP status
    #[error("{method} {url} failed: HTTP {status}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
    },

    /// A description document lacks required fields or is not XML
    #[error("Malformed description: {0}")]
    MalformedDescription(String),

    /// The device does not offer the requested service type
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// The service description does not list the requested action
    #[error("Action {action} not implemented by {service_type}")]
    ActionNotImplemented {
        service_type: String,
        action: String,
    },

    /// A GENA response lacked required headers or carried unparseable ones
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The device rejected the request with a UPnP fault
    #[error("UPnP fault {}", describe_fault(.0))]
    ProtocolFault(Box<UpnpFault>),

    /// A response does not match any recognized shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Subscribing requires a running callback listener
    #[error("Callback listener is not running")]
    ListenerNotRunning,

    /// The callback listener failed to start or stop
    #[error("Callback listener error: {0}")]
    Listener(#[from] CallbackError),

    /// Invalid configuration or device location
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ControlPointError {
    /// `true` when a requested service type is absent from the device.
    ///
    /// Distinguishes "service absent" from network or parse failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPointError::ServiceNotFound(_))
    }

    /// The decoded UPnP fault, if the device returned one.
    pub fn fault(&self) -> Option<&UpnpFault> {
        match self {
            ControlPointError::ProtocolFault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<SoapError> for ControlPointError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Network(message) => ControlPointError::Transport(message),
            SoapError::Parse(message) => ControlPointError::Parse(message),
            SoapError::Fault(fault) => ControlPointError::ProtocolFault(fault),
            SoapError::MalformedResponse(message) => ControlPointError::MalformedResponse(message),
            SoapError::Status {
                method,
                url,
                status,
            } => ControlPointError::HttpStatus {
                method,
                url,
                status,
            },
        }
    }
}

impl From<DescriptionError> for ControlPointError {
    fn from(error: DescriptionError) -> Self {
        match error {
            DescriptionError::Parse(message) | DescriptionError::Malformed(message) => {
                ControlPointError::MalformedDescription(message)
            }
        }
    }
}

fn describe_fault(fault: &UpnpFault) -> String {
    let description = fault
        .error_description
        .as_deref()
        .unwrap_or(&fault.fault_string);
    format!("{} ({})", fault.error_code, description)
}

/// Convenience Result type alias for control point operations.
pub type Result<T> = std::result::Result<T, ControlPointError>;
