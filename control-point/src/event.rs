//! Notifications emitted to the application.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Everything the control point reports asynchronously.
///
/// Delivered over the unbounded channel returned by
/// [`ControlPoint::new`](crate::ControlPoint::new).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPointEvent {
    /// A subscription was established or renewed
    Subscribed {
        sid: String,
        service_type: String,
        timeout: Duration,
    },

    /// A subscription ended: explicit unsubscribe, listener stop or expiry
    Unsubscribed { sid: String, service_type: String },

    /// A property set was delivered for an active subscription
    Event(EventNotification),

    /// The callback listener started or stopped
    ListeningStateChanged {
        listening: bool,
        callback_url: Option<String>,
    },

    /// Something went wrong with no caller to return it to
    Error(ErrorNotice),
}

/// A decoded GENA property set.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub service_type: String,
    pub sid: String,
    pub seq: u32,
    /// Changed variables in document order
    pub properties: Vec<(String, String)>,
    pub raw_body: String,
    pub received_at: DateTime<Utc>,
}

impl EventNotification {
    /// Value of a changed state variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Where an asynchronous error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// A delivery lacked usable `SID`/`SEQ` headers
    MalformedNotification,
    /// A delivery body was not a property set
    MalformedPropertySet,
    /// A renewal attempt failed and will be retried
    Renewal,
    /// A subscription lapsed without a successful renewal
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNotice {
    pub source: ErrorSource,
    pub message: String,
}

impl ControlPointEvent {
    pub(crate) fn error(source: ErrorSource, message: impl Into<String>) -> Self {
        ControlPointEvent::Error(ErrorNotice {
            source,
            message: message.into(),
        })
    }
}
