//! fhirsync core library
//!
//! Background synchronization of a local FHIR store with a remote server,
//! exposed as an observable sequence of [`SyncState`]s.

pub mod bundle;
pub mod error;
pub mod local_change;
pub mod params;
pub mod ports;
pub mod resource;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use bundle::{Bundle, BundleEntry, BundleLink, BundleType};
pub use error::{DataSourceError, StoreError, SyncError};
pub use local_change::{LocalChange, LocalChangeToken, LocalChangeType};
pub use params::{ParamMap, SyncParams};
pub use ports::{DataSource, LocalChangeStore};
pub use resource::{ResourceType, ResourceTypeError};
pub use state::{ResourceSyncException, SyncOutcome, SyncState};
pub use sync::{SyncJob, SyncStateStream, Synchronizer, MIN_POLL_PERIOD};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
