//! Sync lifecycle states and pass outcomes.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::SyncError;
use crate::resource::ResourceType;

/// A failure recorded during a pass, tagged with the resource type it
/// concerned when there was one.
#[derive(Debug, Clone)]
pub struct ResourceSyncException {
    pub resource_type: Option<ResourceType>,
    pub error: Arc<SyncError>,
}

impl ResourceSyncException {
    pub fn new(resource_type: Option<ResourceType>, error: impl Into<SyncError>) -> Self {
        Self {
            resource_type,
            error: Arc::new(error.into()),
        }
    }
}

impl fmt::Display for ResourceSyncException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_type {
            Some(rt) => write!(f, "{}: {}", rt, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Terminal result of one synchronization pass.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Success {
        timestamp: DateTime<Utc>,
    },
    Error {
        timestamp: DateTime<Utc>,
        exceptions: Vec<ResourceSyncException>,
    },
}

impl SyncOutcome {
    /// Success when nothing was recorded, otherwise an error carrying every
    /// exception in the order it was recorded.
    pub fn from_exceptions(
        timestamp: DateTime<Utc>,
        exceptions: Vec<ResourceSyncException>,
    ) -> Self {
        if exceptions.is_empty() {
            SyncOutcome::Success { timestamp }
        } else {
            SyncOutcome::Error {
                timestamp,
                exceptions,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }
}

/// Observable state of a [`SyncJob`](crate::SyncJob).
#[derive(Debug, Clone, Default)]
pub enum SyncState {
    /// Idle, nothing has been requested
    #[default]
    Nothing,
    /// A run was requested and is about to execute
    Started,
    /// The pass is executing
    InProgress,
    Success {
        last_sync_timestamp: DateTime<Utc>,
    },
    Error {
        last_sync_timestamp: DateTime<Utc>,
        exceptions: Vec<ResourceSyncException>,
    },
}

impl SyncState {
    /// `Success` and `Error` end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Success { .. } | SyncState::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Nothing => "nothing",
            SyncState::Started => "started",
            SyncState::InProgress => "in_progress",
            SyncState::Success { .. } => "success",
            SyncState::Error { .. } => "error",
        }
    }
}

impl From<SyncOutcome> for SyncState {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Success { timestamp } => SyncState::Success {
                last_sync_timestamp: timestamp,
            },
            SyncOutcome::Error {
                timestamp,
                exceptions,
            } => SyncState::Error {
                last_sync_timestamp: timestamp,
                exceptions,
            },
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Success {
                last_sync_timestamp,
            } => write!(f, "success at {}", last_sync_timestamp.to_rfc3339()),
            SyncState::Error {
                last_sync_timestamp,
                exceptions,
            } => write!(
                f,
                "error at {} ({} failure{})",
                last_sync_timestamp.to_rfc3339(),
                exceptions.len(),
                if exceptions.len() == 1 { "" } else { "s" }
            ),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataSourceError;

    #[test]
    fn test_outcome_without_exceptions_is_success() {
        let outcome = SyncOutcome::from_exceptions(Utc::now(), Vec::new());
        assert!(outcome.is_success());
    }

    #[test]
    fn test_outcome_with_exceptions_is_error() {
        let ex = ResourceSyncException::new(
            Some(ResourceType::new("Patient").unwrap()),
            DataSourceError::Other("boom".into()),
        );
        let outcome = SyncOutcome::from_exceptions(Utc::now(), vec![ex]);
        assert!(!outcome.is_success());

        let state = SyncState::from(outcome);
        assert!(state.is_terminal());
        match state {
            SyncState::Error { exceptions, .. } => {
                assert_eq!(exceptions.len(), 1);
                assert_eq!(exceptions[0].to_string(), "Patient: Data source error: boom");
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_non_terminal_states() {
        assert!(!SyncState::Nothing.is_terminal());
        assert!(!SyncState::Started.is_terminal());
        assert!(!SyncState::InProgress.is_terminal());
        assert_eq!(SyncState::default().name(), "nothing");
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncState::InProgress.to_string(), "in_progress");
        let ts = Utc::now();
        let state = SyncState::Error {
            last_sync_timestamp: ts,
            exceptions: vec![ResourceSyncException::new(
                None,
                SyncError::Internal("x".into()),
            )],
        };
        assert!(state.to_string().ends_with("(1 failure)"));
    }
}
