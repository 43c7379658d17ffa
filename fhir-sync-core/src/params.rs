//! Download scoping: which resource types to fetch and with which search
//! parameters.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::resource::ResourceType;

/// Search parameter controlling result ordering
pub const SORT_KEY: &str = "_sort";
/// Search parameter filtering by last modification time
pub const LAST_UPDATED_KEY: &str = "_lastUpdated";
/// Ascending sort on last modification time
pub const LAST_UPDATED_ASC_VALUE: &str = "_lastUpdated";

/// Query parameter name -> value
pub type ParamMap = BTreeMap<String, String>;

/// Mapping from resource type to the search parameters used when
/// downloading that type.
///
/// Types keep the order they were configured in, and passes download them
/// in that order. Re-adding a type replaces its parameters in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncParams(Vec<(ResourceType, ParamMap)>);

impl SyncParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the parameters for a resource type.
    pub fn with(mut self, resource_type: ResourceType, params: ParamMap) -> Self {
        self.insert(resource_type, params);
        self
    }

    pub fn insert(&mut self, resource_type: ResourceType, params: ParamMap) {
        match self.0.iter_mut().find(|(t, _)| *t == resource_type) {
            Some((_, existing)) => *existing = params,
            None => self.0.push((resource_type, params)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceType, &ParamMap)> {
        self.0.iter().map(|(t, p)| (t, p))
    }

    pub fn get(&self, resource_type: &ResourceType) -> Option<&ParamMap> {
        self.0
            .iter()
            .find(|(t, _)| t == resource_type)
            .map(|(_, p)| p)
    }
}

impl FromIterator<(ResourceType, ParamMap)> for SyncParams {
    fn from_iter<I: IntoIterator<Item = (ResourceType, ParamMap)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (resource_type, query) in iter {
            params.insert(resource_type, query);
        }
        params
    }
}

impl Serialize for SyncParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (resource_type, params) in &self.0 {
            map.serialize_entry(resource_type, params)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SyncParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SyncParamsVisitor;

        impl<'de> Visitor<'de> for SyncParamsVisitor {
            type Value = SyncParams;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of resource type to search parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SyncParams, A::Error> {
                let mut params = SyncParams::new();
                while let Some((resource_type, query)) =
                    access.next_entry::<ResourceType, ParamMap>()?
                {
                    params.insert(resource_type, query);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(SyncParamsVisitor)
    }
}

/// Builds the first search URL for a resource type, relative to the
/// server base.
///
/// Results are sorted by `_lastUpdated` unless the caller chose a sort, and
/// when a previous download left a marker only newer resources are requested.
pub fn initial_url(
    resource_type: &ResourceType,
    params: &ParamMap,
    last_updated: Option<&str>,
) -> String {
    let mut query = params.clone();
    query
        .entry(SORT_KEY.to_string())
        .or_insert_with(|| LAST_UPDATED_ASC_VALUE.to_string());
    if let Some(marker) = last_updated {
        query.insert(LAST_UPDATED_KEY.to_string(), format!("gt{}", marker));
    }

    format!("{}?{}", resource_type, concat_params(&query))
}

fn concat_params(params: &ParamMap) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
