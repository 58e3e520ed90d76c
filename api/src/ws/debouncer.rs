//! Debouncer for notification-mode watches.
//!
//! Collapses bursts of upstream events into `resource.changes`
//! notifications spaced at least one interval apart:
//!
//! - The first event is emitted immediately.
//! - An event arriving while idle opens a window and is held.
//! - Events arriving inside the window replace the held value, so the
//!   latest revision always wins.
//! - When the window elapses the held value is emitted and the debouncer
//!   goes idle again.
//!
//! An upstream error is forwarded at once and ends the debouncer. When the
//! input closes with a value still held, the value is emitted when its
//! window elapses. After stopping for any reason the output is closed and
//! the input is drained until its producer closes it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::messages::{ApiEvent, EventName};
use crate::schema::EventReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebouncerState {
    /// Nothing emitted yet; the next event passes straight through.
    FirstNotification,
    /// Idle; the next event opens a window.
    TimerStopped,
    /// A window is open and a value is held.
    TimerStarted,
}

/// Rate limiter turning upstream events into debounced notifications.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    interval: Duration,
}

impl Debouncer {
    /// Creates a debouncer with the given interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the debounce interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the debouncer over `input`, returning its notification channel.
    pub fn spawn(
        self,
        input: EventReceiver,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<ApiEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(input, tx, cancel));
        (rx, handle)
    }

    /// Runs until the input closes, an error is forwarded, the output is
    /// dropped, or `cancel` fires.
    pub async fn run(
        self,
        mut input: EventReceiver,
        output: mpsc::Sender<ApiEvent>,
        cancel: CancellationToken,
    ) {
        let mut state = DebouncerState::FirstNotification;
        let mut pending: Option<ApiEvent> = None;

        let timer = tokio::time::sleep(self.interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                event = input.recv() => {
                    let Some(event) = event else {
                        if let Some(held) = pending.take() {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => {}
                                () = &mut timer => {
                                    emit(&output, held, &cancel).await;
                                }
                            }
                        }
                        break;
                    };

                    if event.is_error() {
                        emit(&output, event, &cancel).await;
                        break;
                    }

                    let notification = ApiEvent::new(EventName::Changes).with_revision(event.revision);
                    match state {
                        DebouncerState::FirstNotification => {
                            if !emit(&output, notification, &cancel).await {
                                break;
                            }
                            state = DebouncerState::TimerStopped;
                        }
                        DebouncerState::TimerStopped => {
                            timer.as_mut().reset(Instant::now() + self.interval);
                            pending = Some(notification);
                            state = DebouncerState::TimerStarted;
                        }
                        DebouncerState::TimerStarted => {
                            pending = Some(notification);
                        }
                    }
                }

                () = &mut timer, if state == DebouncerState::TimerStarted => {
                    state = DebouncerState::TimerStopped;
                    if let Some(held) = pending.take() {
                        if !emit(&output, held, &cancel).await {
                            break;
                        }
                    }
                }
            }
        }

        drop(output);
        debug!("debouncer stopped, draining input");
        while input.recv().await.is_some() {}
    }
}

/// Sends `event` unless `cancel` fires first. Returns false if it was not delivered.
async fn emit(
    output: &mpsc::Sender<ApiEvent>,
    event: ApiEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = output.send(event) => sent.is_ok(),
    }
}
