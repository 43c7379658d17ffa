mod changes;
mod config_cmd;
mod poll;
mod sync_cmd;

pub use changes::ChangesCommand;
pub use config_cmd::ConfigCommand;
pub use poll::PollCommand;
pub use sync_cmd::SyncCommand;
