//! FHIR resource type names.
//!
//! Resource payloads themselves are treated as opaque JSON; only the type
//! name is modeled, since it scopes downloads and routes uploads.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a resource type name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceTypeError {
    #[error("Resource type cannot be empty")]
    Empty,

    #[error("Invalid resource type '{0}': must start with an uppercase letter")]
    NotCapitalized(String),

    #[error("Invalid resource type '{0}': only ASCII letters and digits are allowed")]
    InvalidCharacters(String),
}

/// A FHIR resource type name such as `Patient` or `Observation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(String);

impl ResourceType {
    /// Parse and validate a resource type name
    pub fn new(name: impl Into<String>) -> Result<Self, ResourceTypeError> {
        let name = name.into();
        let first = name.chars().next().ok_or(ResourceTypeError::Empty)?;
        if !first.is_ascii_uppercase() {
            return Err(ResourceTypeError::NotCapitalized(name));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ResourceTypeError::InvalidCharacters(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceType {
    type Err = ResourceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ResourceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
