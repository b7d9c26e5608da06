//! Trigger strategies: the algorithms deciding when a task fires and what stops it.
//!
//! Each strategy is a free function that takes ownership of a [`Producer`]
//! and returns a lazy stream. Nothing runs until the stream is polled, and the
//! only suspension points are the producer's sleeps (plus the cooperative
//! yield of `repeat_forever`). Every one of those races the sequence's
//! cancellation token.

pub mod calendar;
pub(crate) mod point;
pub(crate) mod repeat;

use crate::clock::{Clock, Instant};
use crate::config::CadenceConfig;
use crate::error::{CadenceError, Result};
use crate::events::{TriggerEvent, TriggerKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A computation bound into a `Task`.
pub type Computation<A, T> = dyn Fn(&A) -> anyhow::Result<T> + Send + Sync;

/// Everything one sequence needs to run: the bound computation, its clock,
/// its tuning, and its own cancellation token.
///
/// A producer is owned by exactly one sequence, so nothing in here is shared
/// mutable scheduling state. The clock is read-only from this side.
pub(crate) struct Producer<A, T> {
    pub(crate) compute: Arc<Computation<A, T>>,
    pub(crate) arguments: Arc<A>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Arc<CadenceConfig>,
    pub(crate) events: broadcast::Sender<TriggerEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) trigger: TriggerKind,
    fired: u64,
}

impl<A, T> Producer<A, T> {
    pub(crate) fn new(
        compute: Arc<Computation<A, T>>,
        arguments: Arc<A>,
        clock: Arc<dyn Clock>,
        config: Arc<CadenceConfig>,
        events: broadcast::Sender<TriggerEvent>,
        cancel: CancellationToken,
        trigger: TriggerKind,
    ) -> Self {
        Self {
            compute,
            arguments,
            clock,
            config,
            events,
            cancel,
            trigger,
            fired: 0,
        }
    }

    pub(crate) fn now(&self) -> Result<Instant> {
        self.clock.now()
    }

    /// Runs the computation synchronously and reports the firing.
    pub(crate) fn fire(&mut self) -> Result<T> {
        let value = (self.compute)(&self.arguments).map_err(CadenceError::Computation)?;
        self.fired += 1;
        trace!(trigger = %self.trigger, count = self.fired, "fired");
        self.emit(TriggerEvent::Fired {
            trigger: self.trigger,
            count: self.fired,
        });
        Ok(value)
    }

    pub(crate) fn skip(&self, at: Instant) {
        trace!(trigger = %self.trigger, %at, "tick skipped");
        self.emit(TriggerEvent::TickSkipped {
            trigger: self.trigger,
            at,
        });
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleeps for `duration`. Returns `false` if the sequence was cancelled first.
    pub(crate) async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Hands the thread back to the runtime once. Returns `false` if cancelled.
    pub(crate) async fn yield_turn(&self) -> bool {
        tokio::task::yield_now().await;
        !self.cancel.is_cancelled()
    }

    fn emit(&self, event: TriggerEvent) {
        // No subscribers is not an error.
        self.events.send(event).ok();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::SimulatedClock;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Monday 2024-01-01 at the given time of day.
    pub(crate) fn monday_at(hour: u32, minute: u32, second: u32) -> Instant {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    /// A producer whose computation counts its invocations and returns the count.
    pub(crate) fn counting_producer(
        clock: SimulatedClock,
        trigger: TriggerKind,
    ) -> (Producer<(), usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let compute: Arc<Computation<(), usize>> =
            Arc::new(move |_: &()| -> anyhow::Result<usize> {
                Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
            });
        let (events, _) = broadcast::channel(16);
        let producer = Producer::new(
            compute,
            Arc::new(()),
            Arc::new(clock),
            Arc::new(CadenceConfig::default()),
            events,
            CancellationToken::new(),
            trigger,
        );
        (producer, calls)
    }
}
