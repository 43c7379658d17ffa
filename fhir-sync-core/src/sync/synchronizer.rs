//! A single synchronization pass: upload pending local changes, then
//! download each configured resource type.

use chrono::Utc;
use std::sync::Arc;

use crate::bundle::BundleType;
use crate::error::SyncError;
use crate::local_change::LocalChangeType;
use crate::params::{initial_url, ParamMap, SyncParams};
use crate::ports::{DataSource, LocalChangeStore};
use crate::resource::ResourceType;
use crate::state::{ResourceSyncException, SyncOutcome};

/// Runs sync passes against a data source and a local store.
///
/// A failure for one resource type is recorded and the pass moves on to the
/// next; the pass always completes with a [`SyncOutcome`].
pub struct Synchronizer {
    store: Arc<dyn LocalChangeStore>,
    data_source: Arc<dyn DataSource>,
    params: SyncParams,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn LocalChangeStore>,
        data_source: Arc<dyn DataSource>,
        params: SyncParams,
    ) -> Self {
        Self {
            store,
            data_source,
            params,
        }
    }

    pub fn params(&self) -> &SyncParams {
        &self.params
    }

    /// Uploads, downloads, and merges the failures of both phases
    /// (upload failures first).
    pub async fn run_pass(&self) -> SyncOutcome {
        let mut exceptions = self.upload().await;
        exceptions.extend(self.download().await);

        for ex in &exceptions {
            tracing::warn!("Sync failure: {}", ex);
        }

        let outcome = SyncOutcome::from_exceptions(Utc::now(), exceptions);
        match &outcome {
            SyncOutcome::Success { .. } => tracing::info!("Sync pass succeeded"),
            SyncOutcome::Error { exceptions, .. } => {
                tracing::info!("Sync pass finished with {} failure(s)", exceptions.len())
            }
        }
        outcome
    }

    async fn upload(&self) -> Vec<ResourceSyncException> {
        let mut exceptions = Vec::new();

        let changes = match self.store.get_all_local_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                exceptions.push(ResourceSyncException::new(None, e));
                return exceptions;
            }
        };

        if changes.is_empty() {
            tracing::debug!("No local changes to upload");
            return exceptions;
        }

        let mut uploaded = Vec::with_capacity(changes.len());
        for (token, change) in &changes {
            let rt = &change.resource_type;
            let id = change.resource_id.as_str();
            let res = match change.change_type {
                LocalChangeType::Insert => self.data_source.insert(rt, id, &change.payload).await,
                LocalChangeType::Update => self.data_source.update(rt, id, &change.payload).await,
                LocalChangeType::Delete => self.data_source.delete(rt, id).await,
            };

            match res {
                Ok(()) => uploaded.push(*token),
                Err(e) => exceptions.push(ResourceSyncException::new(Some(rt.clone()), e)),
            }
        }

        tracing::debug!("Uploaded {}/{} local change(s)", uploaded.len(), changes.len());

        if !uploaded.is_empty() {
            if let Err(e) = self.store.delete_local_changes(&uploaded).await {
                exceptions.push(ResourceSyncException::new(None, e));
            }
        }

        exceptions
    }

    async fn download(&self) -> Vec<ResourceSyncException> {
        let mut exceptions = Vec::new();

        for (resource_type, params) in self.params.iter() {
            match self.download_resource_type(resource_type, params).await {
                Ok(count) => {
                    tracing::debug!("Downloaded {} {} resource(s)", count, resource_type)
                }
                Err(e) => exceptions.push(ResourceSyncException::new(
                    Some(resource_type.clone()),
                    e,
                )),
            }
        }

        exceptions
    }

    /// Follows `next` links until the server stops returning them.
    async fn download_resource_type(
        &self,
        resource_type: &ResourceType,
        params: &ParamMap,
    ) -> Result<usize, SyncError> {
        let marker = self.store.last_updated(resource_type).await?;
        let mut next_url = Some(initial_url(resource_type, params, marker.as_deref()));
        let mut saved = 0;

        while let Some(url) = next_url.take() {
            tracing::debug!("Loading {}", url);
            let bundle = self.data_source.load_data(&url).await?;

            next_url = bundle.next_url().map(str::to_string);
            if next_url.as_deref() == Some(url.as_str()) {
                tracing::warn!("Server returned a self-referencing next link: {}", url);
                next_url = None;
            }

            if bundle.bundle_type == BundleType::Searchset {
                let resources = bundle.into_resources();
                saved += resources.len();
                self.store
                    .save_remote_resources(resource_type, resources)
                    .await?;
            }
        }

        Ok(saved)
    }
}
