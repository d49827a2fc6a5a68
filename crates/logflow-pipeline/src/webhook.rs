//! HTTP alert delivery.

use std::collections::HashMap;
use std::time::Duration;

use logflow_store::LogEntry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AlertError;
use crate::traits::{AlertFuture, AlertWebhook};

/// Default request timeout.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Where and how an alert is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// The URL the entry is POSTed to.
    pub url: String,
    /// HTTP headers to include with requests.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Timeout in seconds for HTTP requests.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

impl WebhookEndpoint {
    /// Creates an endpoint posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// An [`AlertWebhook`] that POSTs the triggering entry as JSON.
///
/// Alerts are registered by name. Calling an unregistered alert fails with
/// [`AlertError::NotFound`]; any non-2xx answer fails with
/// [`AlertError::Status`].
#[derive(Debug, Default)]
pub struct HttpWebhook {
    client: reqwest::Client,
    endpoints: RwLock<HashMap<String, WebhookEndpoint>>,
}

impl HttpWebhook {
    /// Creates a webhook with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a webhook sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoints: RwLock::default(),
        }
    }

    /// Registers or replaces the endpoint of `alert`.
    pub fn register(&self, alert: impl Into<String>, endpoint: WebhookEndpoint) {
        self.endpoints.write().insert(alert.into(), endpoint);
    }

    /// Removes the endpoint of `alert`. Returns true if it existed.
    pub fn unregister(&self, alert: &str) -> bool {
        self.endpoints.write().remove(alert).is_some()
    }

    fn endpoint(&self, alert: &str) -> Option<WebhookEndpoint> {
        self.endpoints.read().get(alert).cloned()
    }

    async fn deliver(&self, alert: &str, entry: &LogEntry) -> Result<(), AlertError> {
        let endpoint = self
            .endpoint(alert)
            .ok_or_else(|| AlertError::NotFound(alert.to_string()))?;

        let mut request = self
            .client
            .post(&endpoint.url)
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .json(entry);
        for (key, value) in &endpoint.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            warn!(alert = %alert, url = %endpoint.url, error = %e, "alert webhook request failed");
            AlertError::Request {
                alert: alert.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(alert = %alert, status = status.as_u16(), "alert webhook rejected");
            return Err(AlertError::Status {
                alert: alert.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(alert = %alert, status = status.as_u16(), "alert delivered");
        Ok(())
    }
}

impl AlertWebhook for HttpWebhook {
    fn call<'a>(&'a self, alert: &'a str, entry: &'a LogEntry) -> AlertFuture<'a> {
        Box::pin(self.deliver(alert, entry))
    }
}
