//! [`DataSource`] over the FHIR REST API.

use async_trait::async_trait;
use fhir_sync_core::{Bundle, DataSource, DataSourceError, ResourceType};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

const FHIR_JSON: &str = "application/fhir+json";
const JSON_PATCH: &str = "application/json-patch+json";
/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a FHIR server rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: Client,
    base_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport_err)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URLs (server-provided `next` links) are used verbatim.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    fn resource_url(&self, resource_type: &ResourceType, resource_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource_type, resource_id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, DataSourceError> {
        let response = request.send().await.map_err(transport_err)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_err)?;

        if !status.is_success() {
            return Err(DataSourceError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn transport_err(e: reqwest::Error) -> DataSourceError {
    DataSourceError::Other(e.to_string())
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn load_data(&self, url: &str) -> Result<Bundle, DataSourceError> {
        let url = self.resolve(url);
        tracing::debug!("GET {}", url);

        let body = self
            .send(self.client.get(&url).header(ACCEPT, FHIR_JSON))
            .await?;
        serde_json::from_str(&body).map_err(|e| DataSourceError::Decode(e.to_string()))
    }

    async fn insert(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
        payload: &str,
    ) -> Result<(), DataSourceError> {
        let url = self.resource_url(resource_type, resource_id);
        tracing::debug!("PUT {}", url);

        self.send(
            self.client
                .put(&url)
                .header(ACCEPT, FHIR_JSON)
                .header(CONTENT_TYPE, FHIR_JSON)
                .body(payload.to_string()),
        )
        .await
        .map(|_| ())
    }

    async fn update(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
        patch: &str,
    ) -> Result<(), DataSourceError> {
        let url = self.resource_url(resource_type, resource_id);
        tracing::debug!("PATCH {}", url);

        self.send(
            self.client
                .patch(&url)
                .header(ACCEPT, FHIR_JSON)
                .header(CONTENT_TYPE, JSON_PATCH)
                .body(patch.to_string()),
        )
        .await
        .map(|_| ())
    }

    async fn delete(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
    ) -> Result<(), DataSourceError> {
        let url = self.resource_url(resource_type, resource_id);
        tracing::debug!("DELETE {}", url);

        self.send(self.client.delete(&url).header(ACCEPT, FHIR_JSON))
            .await
            .map(|_| ())
    }
}
