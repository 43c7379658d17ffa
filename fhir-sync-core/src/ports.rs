//! Collaborator interfaces the synchronizer talks to.

use async_trait::async_trait;

use crate::bundle::Bundle;
use crate::error::{DataSourceError, StoreError};
use crate::local_change::{LocalChange, LocalChangeToken};
use crate::resource::ResourceType;

/// The remote FHIR server.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Fetches one page of results. `url` is either relative to the server
    /// base (`Patient?_sort=_lastUpdated`) or an absolute `next` link.
    async fn load_data(&self, url: &str) -> Result<Bundle, DataSourceError>;

    async fn insert(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
        payload: &str,
    ) -> Result<(), DataSourceError>;

    async fn update(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
        patch: &str,
    ) -> Result<(), DataSourceError>;

    async fn delete(
        &self,
        resource_type: &ResourceType,
        resource_id: &str,
    ) -> Result<(), DataSourceError>;
}

/// The local database: pending changes to upload and the resources
/// downloaded so far.
#[async_trait]
pub trait LocalChangeStore: Send + Sync + 'static {
    /// All pending changes, oldest first
    async fn get_all_local_changes(
        &self,
    ) -> Result<Vec<(LocalChangeToken, LocalChange)>, StoreError>;

    async fn delete_local_changes(&self, tokens: &[LocalChangeToken]) -> Result<(), StoreError>;

    /// Inserts or replaces downloaded resources of one type
    async fn save_remote_resources(
        &self,
        resource_type: &ResourceType,
        resources: Vec<serde_json::Value>,
    ) -> Result<(), StoreError>;

    /// Most recent `meta.lastUpdated` seen for a type, if any
    async fn last_updated(&self, resource_type: &ResourceType)
        -> Result<Option<String>, StoreError>;
}
