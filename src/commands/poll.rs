//! Periodic sync until interrupted.

use clap::Args;
use futures::StreamExt;
use std::time::Duration;

use super::sync_cmd::{build_job, print_state, SyncCommandError};
use crate::config::Config;

/// Poll the FHIR server on a fixed schedule
#[derive(Debug, Args)]
pub struct PollCommand {
    /// Milliseconds between runs (defaults to sync.poll_period_ms)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Milliseconds to wait before the first run (defaults to sync.initial_delay_ms)
    #[arg(long)]
    initial_delay_ms: Option<u64>,

    /// Stop after this many completed runs
    #[arg(long)]
    cycles: Option<usize>,
}

impl PollCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        let period = self
            .period_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.sync.poll_period());
        let initial_delay = self
            .initial_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.sync.initial_delay());

        let (job, _store) = build_job(config).await?;
        let mut states = job.poll(period, initial_delay);

        println!(
            "Polling every {} ms (Ctrl+C to stop)...",
            period.as_millis()
        );

        let mut completed = 0usize;
        let mut failed = 0usize;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    println!("Interrupted.");
                    break;
                }
                state = states.next() => {
                    let Some(state) = state else { break };
                    print_state(&state);
                    if state.is_terminal() {
                        completed += 1;
                        if matches!(state, fhir_sync_core::SyncState::Error { .. }) {
                            failed += 1;
                        }
                        if self.cycles.is_some_and(|n| completed >= n) {
                            break;
                        }
                    }
                }
            }
        }

        job.close();
        println!();
        println!("{} run(s) completed, {} failed.", completed, failed);
        Ok(())
    }
}
