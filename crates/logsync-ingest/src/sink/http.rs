//! HTTP ingestion client
//!
//! Speaks the dataset API of the analytics service:
//!
//! - `GET  /v1/datasets` lists destinations
//! - `POST /v1/datasets` creates one (409 when it already exists)
//! - `POST /v1/datasets/{name}/ingest?timestamp-field=..` takes a gzip NDJSON
//!   body and answers `{"ingested":..,"failed":..,"processedBytes":..}`
//!
//! Destination names are percent-encoded as a single path segment.

use async_trait::async_trait;
use reqwest::{
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    RequestBuilder, Response, StatusCode, Url,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{IngestError, IngestSink, IngestStatus};
use crate::storage::ByteStream;

pub const DEFAULT_INGEST_URL: &str = "https://api.axiom.co";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const ORG_ID_HEADER: &str = "X-Axiom-Org-Id";

#[derive(Debug, Clone)]
pub struct HttpIngestConfig {
    pub base_url: String,
    pub token: String,
    /// Organization id, required by personal tokens
    pub org_id: Option<String>,
    pub connect_timeout: Duration,
    /// Description given to destinations this client creates
    pub description: String,
}

impl HttpIngestConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            org_id: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            description: "imported from log export".to_string(),
        }
    }

    pub fn with_org_id(mut self, org_id: Option<String>) -> Self {
        self.org_id = org_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("Ingest URL cannot be empty");
        }
        self.parsed_base_url()?;
        if self.token.trim().is_empty() {
            anyhow::bail!("Ingest token is required");
        }
        Ok(())
    }

    fn parsed_base_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|e| anyhow::anyhow!("Invalid ingest URL {}: {e}", self.base_url))?;
        if url.cannot_be_a_base() {
            anyhow::bail!("Ingest URL cannot carry a path: {}", self.base_url);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct DatasetEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateDataset<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Clone)]
pub struct HttpIngestClient {
    client: reqwest::Client,
    base_url: Url,
    config: HttpIngestConfig,
}

impl HttpIngestClient {
    pub fn new(config: HttpIngestConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let base_url = config.parsed_base_url()?;
        // No overall timeout: a backfill body can stream for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("logsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Appends `segments` to the base URL, encoding each one
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `validate`: the base URL always has a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.bearer_auth(&self.config.token);
        match &self.config.org_id {
            Some(org_id) => request.header(ORG_ID_HEADER, org_id),
            None => request,
        }
    }
}

fn request_error(endpoint: &str) -> impl FnOnce(reqwest::Error) -> IngestError + '_ {
    move |e| IngestError::Request {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

fn decode_error(endpoint: &str) -> impl FnOnce(reqwest::Error) -> IngestError + '_ {
    move |e| IngestError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

async fn ensure_success(endpoint: &str, response: Response) -> Result<Response, IngestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IngestError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IngestSink for HttpIngestClient {
    #[instrument(skip(self))]
    async fn ensure_destination(&self, name: &str) -> Result<(), IngestError> {
        let url = self.url(&["v1", "datasets"]);
        let endpoint = url.to_string();

        let response = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(request_error(&endpoint))?;
        let datasets: Vec<DatasetEntry> = ensure_success(&endpoint, response)
            .await?
            .json()
            .await
            .map_err(decode_error(&endpoint))?;

        if datasets.iter().any(|dataset| dataset.name == name) {
            return Ok(());
        }

        let response = self
            .authorized(self.client.post(url))
            .json(&CreateDataset {
                name,
                description: &self.config.description,
            })
            .send()
            .await
            .map_err(request_error(&endpoint))?;

        if response.status() == StatusCode::CONFLICT {
            debug!(destination = name, "Destination created concurrently");
            return Ok(());
        }
        ensure_success(&endpoint, response).await?;

        info!(destination = name, "Created destination");
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn ingest(
        &self,
        name: &str,
        body: ByteStream,
        timestamp_field: &str,
    ) -> Result<IngestStatus, IngestError> {
        let url = self.url(&["v1", "datasets", name, "ingest"]);
        let endpoint = url.to_string();

        let response = self
            .authorized(self.client.post(url))
            .query(&[("timestamp-field", timestamp_field)])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .header(CONTENT_ENCODING, "gzip")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(request_error(&endpoint))?;

        ensure_success(&endpoint, response)
            .await?
            .json()
            .await
            .map_err(decode_error(&endpoint))
    }
}
