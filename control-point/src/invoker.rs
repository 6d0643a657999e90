//! Action Invoker
//!
//! Marshals caller arguments against the catalog, posts the SOAP request
//! and decodes the response.

use std::collections::HashMap;
use std::sync::Arc;

use soap_client::SoapClient;
use tracing::debug;
use upnp_description::ActionSpec;
use url::Url;

use crate::catalog::DescriptionCatalog;
use crate::error::{ControlPointError, Result};

/// Decoded output of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub service_type: String,
    pub action: String,
    /// Output arguments in response order
    pub values: Vec<(String, String)>,
    /// The undecoded response body
    pub raw_body: String,
}

impl ActionResult {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Pick the caller values for the declared `in` arguments, in declared order.
///
/// Keys the action does not declare are dropped; declared arguments the
/// caller did not provide are omitted.
pub fn marshal_arguments(
    spec: &ActionSpec,
    provided: &HashMap<String, String>,
) -> Vec<(String, String)> {
    spec.in_arguments()
        .filter_map(|argument| {
            provided
                .get(&argument.name)
                .map(|value| (argument.name.clone(), value.clone()))
        })
        .collect()
}

#[derive(Debug)]
pub(crate) struct ActionInvoker {
    catalog: Arc<DescriptionCatalog>,
    client: SoapClient,
}

impl ActionInvoker {
    pub(crate) fn new(catalog: Arc<DescriptionCatalog>, client: SoapClient) -> Self {
        Self { catalog, client }
    }

    pub(crate) async fn invoke<I, K, V>(
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
        let entry = self.catalog.resolve_service(service_type, force_reload).await?;
        let spec = entry
            .action(action)
            .ok_or_else(|| ControlPointError::ActionNotImplemented {
                service_type: service_type.to_string(),
                action: action.to_string(),
            })?;

        let provided: HashMap<String, String> = args
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_string(), value.to_string()))
            .collect();
        let ordered = marshal_arguments(spec, &provided);

        self.post(&entry.control_url, service_type, action, &ordered)
            .await
    }

    pub(crate) async fn invoke_raw<K, V>(
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
        let control_url = self.catalog.url_for(control_path)?;
        self.post(&control_url, service_type, action, ordered_args)
            .await
    }

    async fn post<K, V>(
        &self,
        control_url: &Url,
        service_type: &str,
        action: &str,
        args: &[(K, V)],
    ) -> Result<ActionResult>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        debug!(%service_type, %action, url = %control_url, args = args.len(), "Invoking action");

        let response = self
            .client
            .call(control_url.as_str(), service_type, action, args)
            .await?;

        Ok(ActionResult {
            service_type: service_type.to_string(),
            action: response.action,
            values: response.values,
            raw_body: response.raw_body,
        })
    }
}
