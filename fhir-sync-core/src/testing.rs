//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::bundle::Bundle;
use crate::error::{DataSourceError, StoreError};
use crate::local_change::{LocalChange, LocalChangeToken};
use crate::ports::{DataSource, LocalChangeStore};
use crate::resource::ResourceType;

type ErrFn<E> = Box<dyn Fn() -> E + Send + Sync>;

pub fn rt(name: &str) -> ResourceType {
    ResourceType::new(name).unwrap()
}

#[derive(Default)]
pub struct FakeDataSource {
    responses: Mutex<HashMap<String, Bundle>>,
    failures: Mutex<Vec<(String, ErrFn<DataSourceError>)>>,
    upload_failures: Mutex<HashMap<String, ErrFn<DataSourceError>>>,
    loaded: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    panic_on_load: Mutex<bool>,
    loads: AtomicUsize,
}

impl FakeDataSource {
    pub fn respond(&self, url: &str, bundle: Bundle) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), bundle);
    }

    /// Fails every search for `resource_type`
    pub fn fail_on<F>(&self, resource_type: &str, make: F)
    where
        F: Fn() -> DataSourceError + Send + Sync + 'static,
    {
        self.failures
            .lock()
            .unwrap()
            .push((format!("{}?", resource_type), Box::new(make)));
    }

    pub fn fail_upload<F>(&self, resource_id: &str, make: F)
    where
        F: Fn() -> DataSourceError + Send + Sync + 'static,
    {
        self.upload_failures
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), Box::new(make));
    }

    /// Every `load_data` call sleeps this long first
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn panic_on_load(&self) {
        *self.panic_on_load.lock().unwrap() = true;
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn record_upload(&self, kind: &str, rt: &ResourceType, id: &str) -> Result<(), DataSourceError> {
        self.uploads
            .lock()
            .unwrap()
            .push(format!("{} {}/{}", kind, rt, id));
        match self.upload_failures.lock().unwrap().get(id) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for FakeDataSource {
    async fn load_data(&self, url: &str) -> Result<Bundle, DataSourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().unwrap().push(url.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.panic_on_load.lock().unwrap() {
            panic!("data source exploded");
        }

        if let Some((_, make)) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
        {
            return Err(make());
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(Bundle::searchset))
    }

    async fn insert(&self, rt: &ResourceType, id: &str, _payload: &str) -> Result<(), DataSourceError> {
        self.record_upload("insert", rt, id)
    }

    async fn update(&self, rt: &ResourceType, id: &str, _patch: &str) -> Result<(), DataSourceError> {
        self.record_upload("update", rt, id)
    }

    async fn delete(&self, rt: &ResourceType, id: &str) -> Result<(), DataSourceError> {
        self.record_upload("delete", rt, id)
    }
}

#[derive(Default)]
pub struct FakeStore {
    changes: Mutex<Vec<(LocalChangeToken, LocalChange)>>,
    next_token: AtomicI64,
    saved: Mutex<HashMap<ResourceType, Vec<serde_json::Value>>>,
    markers: Mutex<HashMap<ResourceType, String>>,
    read_failure: Mutex<Option<ErrFn<StoreError>>>,
}

impl FakeStore {
    pub fn push_change(&self, change: LocalChange) {
        let token = LocalChangeToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.changes.lock().unwrap().push((token, change));
    }

    pub fn pending(&self) -> Vec<LocalChange> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn set_last_updated(&self, rt: &ResourceType, marker: &str) {
        self.markers
            .lock()
            .unwrap()
            .insert(rt.clone(), marker.to_string());
    }

    pub fn fail_reads<F>(&self, make: F)
    where
        F: Fn() -> StoreError + Send + Sync + 'static,
    {
        *self.read_failure.lock().unwrap() = Some(Box::new(make));
    }

    pub fn saved_ids(&self, rt: &ResourceType) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .get(rt)
            .map(|resources| {
                resources
                    .iter()
                    .filter_map(|r| r["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LocalChangeStore for FakeStore {
    async fn get_all_local_changes(
        &self,
    ) -> Result<Vec<(LocalChangeToken, LocalChange)>, StoreError> {
        if let Some(make) = self.read_failure.lock().unwrap().as_ref() {
            return Err(make());
        }
        Ok(self.changes.lock().unwrap().clone())
    }

    async fn delete_local_changes(&self, tokens: &[LocalChangeToken]) -> Result<(), StoreError> {
        self.changes
            .lock()
            .unwrap()
            .retain(|(t, _)| !tokens.contains(t));
        Ok(())
    }

    async fn save_remote_resources(
        &self,
        rt: &ResourceType,
        resources: Vec<serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.saved
            .lock()
            .unwrap()
            .entry(rt.clone())
            .or_default()
            .extend(resources);
        Ok(())
    }

    async fn last_updated(&self, rt: &ResourceType) -> Result<Option<String>, StoreError> {
        Ok(self.markers.lock().unwrap().get(rt).cloned())
    }
}
