use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::resource::ResourceType;

/// Kind of pending mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalChangeType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for LocalChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalChangeType::Insert => write!(f, "insert"),
            LocalChangeType::Update => write!(f, "update"),
            LocalChangeType::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for LocalChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(LocalChangeType::Insert),
            "update" => Ok(LocalChangeType::Update),
            "delete" => Ok(LocalChangeType::Delete),
            _ => Err(format!(
                "Invalid change type '{}'. Valid types: insert, update, delete",
                s
            )),
        }
    }
}

/// Identifies a stored local change so it can be removed once uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalChangeToken(pub i64);

/// A create/update/delete made locally and not yet pushed to the server.
///
/// For inserts `payload` is the full resource JSON, for updates a JSON
/// patch, and for deletes it is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChange {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub change_type: LocalChangeType,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl LocalChange {
    pub fn new(
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        change_type: LocalChangeType,
    ) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            change_type,
            payload: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

impl fmt::Display for LocalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} ({})",
            self.change_type,
            self.resource_type,
            self.resource_id,
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
