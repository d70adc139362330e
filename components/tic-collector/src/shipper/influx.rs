//! InfluxDB v2 HTTP writer.
//!
//! Connection details (endpoint, token, organisation, bucket) come from
//! configuration; this module only turns a [`Point`] into a
//! `POST /api/v2/write` request and reports the outcome.

// Local crates
use crate::helpers::load_config::RemoteConfig;
use crate::shipper::point::Point;
use crate::shipper::shipper::{PointWriter, WriteError};

// External crates
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::instrument;

// Longest server error body kept in a `WriteError`.
const MAX_ERROR_BODY: usize = 512;

pub struct InfluxWriter {
    client: Option<Client>,
    endpoint: Url,
    org: String,
    bucket: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for InfluxWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxWriter")
            .field("endpoint", &self.endpoint.as_str())
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl InfluxWriter {
    pub fn new(config: &RemoteConfig) -> Result<Self, WriteError> {
        let endpoint = write_endpoint(&config.url)?;
        if config.token.is_none() {
            tracing::warn!("No InfluxDB token configured, writes will be unauthenticated");
        }

        // The client timeout covers connect, request and response body.
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| WriteError::Request(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client: Some(client),
            endpoint,
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
            timeout: config.timeout(),
        })
    }

    /// `{url}/api/v2/write`, without the query.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn send_error(&self, e: reqwest::Error) -> WriteError {
        if e.is_timeout() {
            WriteError::Timeout(self.timeout)
        } else {
            WriteError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    #[instrument(
        name = "tic_influx::write",
        target = "shipper::influx",
        skip_all,
        level = "debug"
    )]
    async fn write(&mut self, point: &Point) -> Result<(), WriteError> {
        let client = self.client.as_ref().ok_or(WriteError::Closed)?;

        let mut request = client
            .post(self.endpoint.clone())
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(ACCEPT, "application/json")
            .body(point.to_line_protocol());
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        let response = request.send().await.map_err(|e| self.send_error(e))?;

        let status = response.status();
        if status.is_success() {
            // Drain body for connection reuse.
            let _ = response.bytes().await;
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map(|text| text.chars().take(MAX_ERROR_BODY).collect())
            .unwrap_or_default();

        Err(WriteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!("InfluxDB client released");
        }
    }
}

fn write_endpoint(base: &str) -> Result<Url, WriteError> {
    let raw = format!("{}/api/v2/write", base.trim_end_matches('/'));
    let url = Url::parse(&raw).map_err(|e| WriteError::InvalidEndpoint(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WriteError::InvalidEndpoint(format!(
            "{raw}: unsupported scheme {other}"
        ))),
    }
}
