//! Endpoint probing used by the test suite.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::millis;
use crate::error::ProbeError;

/// What a single unauthenticated `GET` observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Time until the body was fully received.
    pub latency: Duration,
    /// True when the body parses as JSON.
    pub json_body: bool,
}

impl ProbeResponse {
    /// Creates a response record.
    #[must_use]
    pub const fn new(status: u16, latency: Duration, json_body: bool) -> Self {
        Self {
            status,
            latency,
            json_body,
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// 401 or 403.
    #[must_use]
    pub const fn is_auth_challenge(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Issues requests against a live service endpoint.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Sends an unauthenticated `GET` to `url`.
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError>;
}

/// [`EndpointProbe`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    /// Creates a probe whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bazaar-probe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Connect {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let target = reqwest::Url::parse(url).map_err(|_| ProbeError::InvalidUrl {
            url: url.to_string(),
        })?;

        let started = Instant::now();
        let response = self.http.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    target: url.to_string(),
                    after: self.timeout,
                }
            } else {
                ProbeError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| ProbeError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let latency = started.elapsed();

        let json_body = serde_json::from_slice::<serde_json::Value>(&body).is_ok();
        tracing::debug!(%url, status, latency_ms = millis(latency), json_body, "Probe");

        Ok(ProbeResponse::new(status, latency, json_body))
    }
}

/// Joins `path` onto the endpoint `url` without doubling slashes.
pub(crate) fn join_path(url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
