//! Fan-out of [`SyncState`] transitions to any number of subscribers.
//!
//! Each subscriber owns an unbounded channel, so a slow consumer never
//! causes another to miss a transition and nothing is ever dropped.

use futures::channel::mpsc;
use futures::Stream;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio_util::sync::DropGuard;

use crate::state::SyncState;

#[derive(Default)]
struct EmitterState {
    current: SyncState,
    subscribers: Vec<mpsc::UnboundedSender<SyncState>>,
    closed: bool,
}

/// Holds the current state and the live subscriber list.
#[derive(Default)]
pub(crate) struct Emitter {
    state: Mutex<EmitterState>,
}

impl Emitter {
    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// New subscription, starting with `Nothing`. Once closed the returned
    /// stream is already finished.
    pub(crate) fn subscribe(&self) -> SyncStateStream {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.lock();
        if !state.closed && tx.unbounded_send(SyncState::Nothing).is_ok() {
            state.subscribers.push(tx);
        }
        SyncStateStream { rx, timer: None }
    }

    /// Makes `next` current and delivers it to every subscriber, pruning the
    /// ones that went away.
    pub(crate) fn emit(&self, next: SyncState) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.current = next.clone();
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(next.clone()).is_ok());
    }

    pub(crate) fn current(&self) -> SyncState {
        self.lock().current.clone()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Ends every subscription. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.subscribers.clear();
        true
    }
}

/// Starts a poll timer, returning the guard that stops it.
pub(crate) type TimerStart = Box<dyn FnOnce() -> DropGuard + Send + Sync>;

enum Timer {
    Idle(TimerStart),
    Running(DropGuard),
}

/// Ordered stream of sync states for one subscriber.
///
/// Ends when the job is closed. A stream returned by
/// [`SyncJob::poll`](crate::SyncJob::poll) also owns its poll timer, which
/// starts on the first read; dropping the stream stops the timer.
pub struct SyncStateStream {
    rx: mpsc::UnboundedReceiver<SyncState>,
    timer: Option<Timer>,
}

impl SyncStateStream {
    pub(crate) fn attach_timer(&mut self, start: TimerStart) {
        self.timer = Some(Timer::Idle(start));
    }

    /// True when this stream drives a poll timer
    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    /// True once the poll timer has been started by a read
    pub fn timer_started(&self) -> bool {
        matches!(self.timer, Some(Timer::Running(_)))
    }
}

impl Stream for SyncStateStream {
    type Item = SyncState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.timer = match self.timer.take() {
            Some(Timer::Idle(start)) => Some(Timer::Running(start())),
            other => other,
        };
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl std::fmt::Debug for SyncStateStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateStream")
            .field("polling", &self.is_polling())
            .field("timer_started", &self.timer_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn names(states: &[SyncState]) -> Vec<&'static str> {
        states.iter().map(|s| s.name()).collect()
    }

    #[tokio::test]
    async fn test_subscription_starts_with_nothing() {
        let emitter = Emitter::default();
        let mut stream = emitter.subscribe();

        emitter.emit(SyncState::Started);
        emitter.close();

        let states: Vec<SyncState> = (&mut stream).collect().await;
        assert_eq!(names(&states), vec!["nothing", "started"]);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_state() {
        let emitter = Emitter::default();
        let a = emitter.subscribe();
        let b = emitter.subscribe();

        emitter.emit(SyncState::Started);
        emitter.emit(SyncState::InProgress);
        emitter.close();

        let a: Vec<SyncState> = a.collect().await;
        let b: Vec<SyncState> = b.collect().await;
        assert_eq!(names(&a), vec!["nothing", "started", "in_progress"]);
        assert_eq!(names(&a), names(&b));
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let emitter = Emitter::default();
        let keep = emitter.subscribe();
        drop(emitter.subscribe());

        emitter.emit(SyncState::Started);
        assert_eq!(emitter.subscriber_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn test_timer_starts_on_first_read() {
        let emitter = Emitter::default();
        let token = tokio_util::sync::CancellationToken::new();
        let started = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut stream = emitter.subscribe();
        let (count, guard_token) = (started.clone(), token.clone());
        stream.attach_timer(Box::new(move || {
            count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            guard_token.drop_guard()
        }));
        assert!(stream.is_polling());
        assert!(!stream.timer_started());
        assert_eq!(started.load(std::sync::atomic::Ordering::SeqCst), 0);

        assert_eq!(stream.next().await.map(|s| s.name()), Some("nothing"));
        emitter.emit(SyncState::Started);
        assert_eq!(stream.next().await.map(|s| s.name()), Some("started"));
        assert!(stream.timer_started());
        assert_eq!(started.load(std::sync::atomic::Ordering::SeqCst), 1);

        drop(stream);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_emitter_is_silent() {
        let emitter = Emitter::default();
        assert!(emitter.close());
        assert!(!emitter.close());

        emitter.emit(SyncState::Started);
        assert_eq!(emitter.current().name(), "nothing");

        let states: Vec<SyncState> = emitter.subscribe().collect().await;
        assert!(states.is_empty());
    }
}
