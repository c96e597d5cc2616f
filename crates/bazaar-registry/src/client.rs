//! HTTP client for the catalog registry API.
//!
//! | Operation | Request |
//! |---|---|
//! | register | `PUT /v1/services/{idempotency-key}` |
//! | update | `PATCH /v1/entries/{registry-id}` |
//! | status | `PUT /v1/entries/{registry-id}/status` |
//! | rollback | `DELETE /v1/entries/{registry-id}?serviceId=...` |

use async_trait::async_trait;
use bazaar_core::{ServiceId, ServiceSpecification, ServiceStatus};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;
use crate::registry::{idempotency_key, Registry};

/// Header carrying the registration idempotency key.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest<'a> {
    name: &'a str,
    version: &'a str,
    spec: &'a ServiceSpecification,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    registry_id: String,
}

#[derive(Debug, Serialize)]
struct StatusRequest {
    status: ServiceStatus,
}

/// Registry client speaking the catalog's JSON API.
#[derive(Debug)]
pub struct HttpRegistryClient {
    config: RegistryConfig,
    base: Url,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, TLS material cannot be
    /// loaded, or the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use bazaar_registry::{HttpRegistryClient, RegistryConfig};
    ///
    /// let client = HttpRegistryClient::new(RegistryConfig::new("https://catalog.example.com"))?;
    /// # Ok::<(), bazaar_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let base = Url::parse(&config.url).map_err(|_| RegistryError::InvalidUrl {
            url: config.url.clone(),
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl {
                url: config.url.clone(),
            });
        }
        let http = Self::build_http_client(&config)?;

        Ok(Self { config, base, http })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::InvalidUrl {
                url: self.config.url.clone(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::InvalidTls {
                        message: format!("invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }

            if let (Some(ref cert_path), Some(ref key_path)) = (&tls.client_cert, &tls.client_key)
            {
                let mut pem = std::fs::read(cert_path).map_err(|e| RegistryError::IoError {
                    path: cert_path.clone(),
                    source: e,
                })?;
                let key_pem = std::fs::read(key_path).map_err(|e| RegistryError::IoError {
                    path: key_path.clone(),
                    source: e,
                })?;
                pem.extend_from_slice(&key_pem);

                let identity =
                    reqwest::Identity::from_pem(&pem).map_err(|e| RegistryError::InvalidTls {
                        message: format!("invalid client certificate: {e}"),
                    })?;
                builder = builder.identity(identity);
            }
        }

        builder.build().map_err(|e| RegistryError::ConnectionFailed {
            url: config.url.clone(),
            source: e,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        match &self.config.auth {
            RegistryAuth::None => {}
            RegistryAuth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid credentials".to_string(),
                        }
                    })?,
                );
            }
            RegistryAuth::Bearer { token } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid token".to_string(),
                        }
                    })?,
                );
            }
        }

        Ok(headers)
    }

    /// Maps non-success responses onto [`RegistryError`].
    async fn check(response: Response, registry_id: Option<&str>) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match (status, registry_id) {
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                Err(RegistryError::AuthenticationFailed {
                    message: format!("registry answered {status}"),
                })
            }
            (StatusCode::NOT_FOUND, Some(id)) => Err(RegistryError::NotFound {
                registry_id: id.to_string(),
            }),
            _ => Err(RegistryError::HttpError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl Registry for HttpRegistryClient {
    async fn register_service(&self, spec: &ServiceSpecification) -> Result<String, RegistryError> {
        let key = idempotency_key(&spec.name, &spec.version);
        let url = self.endpoint(&["v1", "services", &key])?;
        let header = HeaderValue::from_str(&key).map_err(|_| RegistryError::InvalidResponse {
            message: "idempotency key is not a valid header value".to_string(),
        })?;

        tracing::debug!(%url, service = %spec.name, version = %spec.version, "Registering service");

        let response = self
            .http
            .put(url)
            .headers(self.auth_headers()?)
            .header(IDEMPOTENCY_KEY, header)
            .json(&RegistrationRequest {
                name: &spec.name,
                version: &spec.version,
                spec,
            })
            .send()
            .await?;

        let body: RegistrationResponse = Self::check(response, None).await?.json().await?;
        if body.registry_id.trim().is_empty() {
            return Err(RegistryError::InvalidResponse {
                message: "registry returned an empty registry id".to_string(),
            });
        }
        Ok(body.registry_id)
    }

    async fn update_service(
        &self,
        registry_id: &str,
        spec: &ServiceSpecification,
    ) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "entries", registry_id])?;
        let response = self
            .http
            .patch(url)
            .headers(self.auth_headers()?)
            .json(spec)
            .send()
            .await?;
        Self::check(response, Some(registry_id)).await?;
        Ok(())
    }

    async fn update_service_status(
        &self,
        registry_id: &str,
        status: ServiceStatus,
    ) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "entries", registry_id, "status"])?;
        let response = self
            .http
            .put(url)
            .headers(self.auth_headers()?)
            .json(&StatusRequest { status })
            .send()
            .await?;
        Self::check(response, Some(registry_id)).await?;
        Ok(())
    }

    async fn rollback(&self, service_id: &ServiceId, registry_id: &str) -> Result<(), RegistryError> {
        let mut url = self.endpoint(&["v1", "entries", registry_id])?;
        url.query_pairs_mut()
            .append_pair("serviceId", &service_id.to_string());

        let response = self
            .http
            .delete(url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        // Already gone counts as rolled back.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(%registry_id, "Registry entry already absent");
            return Ok(());
        }
        Self::check(response, Some(registry_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: RegistryConfig) -> HttpRegistryClient {
        HttpRegistryClient::new(config).unwrap()
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpRegistryClient::new(RegistryConfig::new("https://catalog.example.com")).is_ok());
    }

    #[test]
    fn test_rejects_invalid_url() {
        let err = HttpRegistryClient::new(RegistryConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl { .. }));

        let err = HttpRegistryClient::new(RegistryConfig::new("mailto:ops@example.com")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl { .. }));
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = client(RegistryConfig::new("https://catalog.example.com/api/"));
        let url = c.endpoint(&["v1", "entries", "reg-1", "status"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://catalog.example.com/api/v1/entries/reg-1/status"
        );
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let c = client(RegistryConfig::new("https://catalog.example.com"));
        let url = c.endpoint(&["v1", "entries", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://catalog.example.com/v1/entries/a%2Fb");
    }

    #[test]
    fn test_auth_headers_none() {
        let c = client(RegistryConfig::new("https://catalog.example.com"));
        assert!(c.auth_headers().unwrap().is_empty());
    }

    #[test]
    fn test_auth_headers_basic() {
        let c = client(
            RegistryConfig::new("https://catalog.example.com")
                .with_auth(RegistryAuth::basic("user", "pass")),
        );
        let headers = c.auth_headers().unwrap();
        // base64("user:pass")
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[test]
    fn test_auth_headers_bearer() {
        let c = client(
            RegistryConfig::new("https://catalog.example.com")
                .with_auth(RegistryAuth::bearer("my-token")),
        );
        let headers = c.auth_headers().unwrap();
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer my-token"
        );
    }

    #[test]
    fn test_missing_ca_cert_is_io_error() {
        let config = RegistryConfig::new("https://catalog.example.com")
            .with_tls(crate::TlsConfig::new().with_ca_cert("/nonexistent/ca.pem"));
        let err = HttpRegistryClient::new(config).unwrap_err();
        assert!(matches!(err, RegistryError::IoError { .. }));
    }
}
