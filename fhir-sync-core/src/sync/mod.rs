//! Sync orchestration.
//!
//! - [`Synchronizer`] runs a single pass: upload pending local changes,
//!   then download every configured resource type, following `next` links.
//! - [`SyncJob`] serializes passes on one worker task, drives periodic
//!   polling, and fans state transitions out to subscribers.

mod job;
mod stream;
mod synchronizer;

pub use job::{SyncJob, MIN_POLL_PERIOD};
pub use stream::SyncStateStream;
pub use synchronizer::Synchronizer;
