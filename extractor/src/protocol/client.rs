use std::future::Future;
use std::time::Duration;

use config::shared::IlsApiConfig;
use tracing::debug;

use crate::error::{ErrorKind, ExtractResult};
use crate::extract_error;

/// Trait for transports that can deliver a request envelope to the MarcOut
/// endpoint and return the response body.
///
/// The production implementation is [`HttpTransport`]. Tests substitute a
/// scripted transport so protocol and merge behavior can be exercised without
/// a live ILS.
pub trait SoapTransport {
    /// Posts a request envelope and returns the raw response body.
    fn post_envelope(&self, envelope: &str) -> impl Future<Output = ExtractResult<String>> + Send;
}

/// HTTP transport for the MarcOut endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for the configured MarcOut endpoint.
    pub fn new(config: &IlsApiConfig) -> ExtractResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                extract_error!(
                    ErrorKind::ConfigError,
                    "failed to build the MarcOut HTTP client",
                    source: err
                )
            })?;
        Ok(Self {
            url: config.marcout_url(),
            client,
        })
    }
}

impl SoapTransport for HttpTransport {
    async fn post_envelope(&self, envelope: &str) -> ExtractResult<String> {
        debug!(url = %self.url, bytes = envelope.len(), "posting MarcOut request");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(envelope.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
