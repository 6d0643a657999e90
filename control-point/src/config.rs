//! Configuration types for the control point
//!
//! One [`ControlPointConfig`] is owned by each control point instance; it
//! covers subscription timing, the callback listener, and the HTTP client.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{ControlPointError, Result};

/// Configuration for a [`ControlPoint`](crate::ControlPoint)
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// Timeout requested in every `SUBSCRIBE`
    /// Default: 1800 seconds (30 minutes)
    pub subscription_timeout: Duration,

    /// Lead time subtracted from the granted timeout when scheduling a renewal
    /// Default: 30 seconds
    pub renewal_margin: Duration,

    /// Delay before retrying a failed renewal
    /// Default: 10 seconds
    pub renewal_retry_backoff: Duration,

    /// Callback listener settings
    pub listener: ListenerConfig,

    /// Connect timeout of the default HTTP transport
    /// Default: 5 seconds
    pub http_connect_timeout: Duration,

    /// Whole-request timeout of the default HTTP transport
    /// Default: 10 seconds
    pub http_request_timeout: Duration,
}

/// Where the callback listener binds and what address it advertises
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Default: 0.0.0.0
    pub bind_ip: IpAddr,

    /// Default: 0, an ephemeral port
    pub port: u16,

    /// Host put in the callback URL; detected when `None`
    pub advertise_ip: Option<IpAddr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            advertise_ip: None,
        }
    }
}

impl ListenerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Listen on loopback only, for tests and single-host setups.
    pub fn loopback() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Self::default()
        }
    }
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            subscription_timeout: Duration::from_secs(1800),
            renewal_margin: Duration::from_secs(30),
            renewal_retry_backoff: Duration::from_secs(10),
            listener: ListenerConfig::default(),
            http_connect_timeout: Duration::from_secs(5),
            http_request_timeout: Duration::from_secs(10),
        }
    }
}

impl ControlPointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscription_timeout.as_secs() == 0 {
            return Err(ControlPointError::Configuration(
                "Subscription timeout must be at least one second".to_string(),
            ));
        }

        if self.subscription_timeout.as_secs() > u64::from(u32::MAX) {
            return Err(ControlPointError::Configuration(
                "Subscription timeout does not fit a TIMEOUT header".to_string(),
            ));
        }

        if self.renewal_retry_backoff == Duration::ZERO {
            return Err(ControlPointError::Configuration(
                "Renewal retry backoff must be greater than 0".to_string(),
            ));
        }

        if self.renewal_margin >= self.subscription_timeout {
            return Err(ControlPointError::Configuration(
                "Renewal margin must be smaller than the subscription timeout".to_string(),
            ));
        }

        Ok(())
    }

    /// Requested subscription timeout in whole seconds.
    pub(crate) fn timeout_seconds(&self) -> u32 {
        u32::try_from(self.subscription_timeout.as_secs()).unwrap_or(u32::MAX)
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_renewal_margin(mut self, margin: Duration) -> Self {
        self.renewal_margin = margin;
        self
    }

    pub fn with_renewal_retry_backoff(mut self, backoff: Duration) -> Self {
        self.renewal_retry_backoff = backoff;
        self
    }

    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_http_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.http_connect_timeout = connect;
        self.http_request_timeout = request;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControlPointConfig::default();
        assert_eq!(config.subscription_timeout, Duration::from_secs(1800));
        assert_eq!(config.renewal_margin, Duration::from_secs(30));
        assert_eq!(config.renewal_retry_backoff, Duration::from_secs(10));
        assert_eq!(config.listener.port, 0);
        assert!(config.listener.bind_ip.is_unspecified());
        assert!(config.listener.advertise_ip.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_timeout = ControlPointConfig::new().with_subscription_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let zero_backoff = ControlPointConfig::new().with_renewal_retry_backoff(Duration::ZERO);
        assert!(zero_backoff.validate().is_err());

        let margin_too_large = ControlPointConfig::new()
            .with_subscription_timeout(Duration::from_secs(60))
            .with_renewal_margin(Duration::from_secs(60));
        assert!(matches!(
            margin_too_large.validate(),
            Err(ControlPointError::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_methods() {
        let config = ControlPointConfig::new()
            .with_subscription_timeout(Duration::from_secs(300))
            .with_renewal_margin(Duration::from_secs(15))
            .with_listener(ListenerConfig::loopback())
            .with_http_timeouts(Duration::from_secs(1), Duration::from_secs(2));

        assert_eq!(config.timeout_seconds(), 300);
        assert_eq!(config.listener.bind_addr(), "127.0.0.1:0".parse().unwrap());
        assert_eq!(config.http_request_timeout, Duration::from_secs(2));
    }
}
