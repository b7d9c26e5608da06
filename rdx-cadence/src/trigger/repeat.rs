//! Unconditional repetition.
//!
//! This family sleeps a flat `interval` after each firing, so the time spent
//! inside the computation adds to the cadence. The calendar family in
//! [`calendar`](super::calendar) measures its sleep against a target instead.

use super::Producer;
use crate::clock::Instant;
use crate::error::Result;
use chrono::TimeDelta;
use futures::Stream;
use std::time::Duration;
use tracing::debug;

pub(crate) fn repeat_forever<A, T>(mut producer: Producer<A, T>) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        while !producer.is_cancelled() {
            yield producer.fire()?;
            if !producer.yield_turn().await {
                break;
            }
        }
    }
}

pub(crate) fn repeat_every<A, T>(
    mut producer: Producer<A, T>,
    interval: Duration,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        while !producer.is_cancelled() {
            yield producer.fire()?;
            if !producer.pause(interval).await {
                break;
            }
        }
    }
}

pub(crate) fn repeat_every_for<A, T>(
    mut producer: Producer<A, T>,
    length: Duration,
    interval: Duration,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        let start = producer.now()?;
        while !producer.is_cancelled() && within(start, producer.now()?, Some(length)) {
            yield producer.fire()?;
            if !producer.pause(interval).await {
                break;
            }
        }
        debug!(trigger = %producer.trigger, ?length, "window elapsed");
    }
}

pub(crate) fn repeat_every_until<A, T>(
    mut producer: Producer<A, T>,
    until: Instant,
    interval: Duration,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        while !producer.is_cancelled() && producer.now()? < until {
            yield producer.fire()?;
            if !producer.pause(interval).await {
                break;
            }
        }
        debug!(trigger = %producer.trigger, %until, "deadline reached");
    }
}

/// Whether `now - start` is still shorter than `length`.
///
/// `None`, or a length too large for chrono, means the window never closes.
pub(crate) fn within(start: Instant, now: Instant, length: Option<Duration>) -> bool {
    match length.map(TimeDelta::from_std) {
        Some(Ok(length)) => now.signed_duration_since(start) < length,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::events::TriggerKind;
    use crate::trigger::testing::{counting_producer, monday_at};
    use futures::StreamExt;
    use std::pin::pin;
    use std::sync::atomic::Ordering;

    #[tokio::test(start_paused = true)]
    async fn every_fires_immediately_then_once_per_interval() {
        let clock = SimulatedClock::starting_at(monday_at(6, 0, 0));
        let (producer, _calls) = counting_producer(clock, TriggerKind::Every);
        let started = tokio::time::Instant::now();

        let results: Vec<usize> = repeat_every(producer, Duration::from_secs(2))
            .take(3)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(results, vec![1, 2, 3]);
        // Two full sleeps separate three firings.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn every_for_stops_once_the_window_has_elapsed() {
        let clock = SimulatedClock::starting_at(monday_at(6, 0, 0));
        let (producer, calls) = counting_producer(clock.clone(), TriggerKind::EveryFor);
        let mut firings = pin!(repeat_every_for(
            producer,
            Duration::from_secs(3),
            Duration::from_secs(1)
        ));

        // The driver moves the simulated clock one second per firing.
        for expected in 1..=3 {
            assert_eq!(firings.next().await.unwrap().unwrap(), expected);
            clock.advance(Duration::from_secs(1)).unwrap();
        }
        assert!(firings.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn every_until_checks_the_deadline_before_firing() {
        let clock = SimulatedClock::starting_at(monday_at(6, 0, 0));
        let (producer, calls) = counting_producer(clock.clone(), TriggerKind::EveryUntil);
        let mut firings = pin!(repeat_every_until(
            producer,
            monday_at(6, 0, 2),
            Duration::from_secs(1)
        ));

        assert_eq!(firings.next().await.unwrap().unwrap(), 1);
        clock.set_now(monday_at(6, 0, 1));
        assert_eq!(firings.next().await.unwrap().unwrap(), 2);
        clock.set_now(monday_at(6, 0, 2));
        assert!(firings.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forever_keeps_firing_until_cancelled() {
        let clock = SimulatedClock::starting_at(monday_at(6, 0, 0));
        let (producer, calls) = counting_producer(clock, TriggerKind::Forever);
        let cancel = producer.cancel.clone();
        let mut firings = pin!(repeat_forever(producer));

        for expected in 1..=100 {
            assert_eq!(firings.next().await.unwrap().unwrap(), expected);
        }
        cancel.cancel();
        assert!(firings.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn computation_failure_ends_the_sequence() {
        let clock = SimulatedClock::starting_at(monday_at(6, 0, 0));
        let (mut producer, _calls) = counting_producer(clock, TriggerKind::Every);
        let inner = producer.compute.clone();
        producer.compute = std::sync::Arc::new(move |args: &()| -> anyhow::Result<usize> {
            let n = inner(args)?;
            anyhow::ensure!(n < 3, "third call refused");
            Ok(n)
        });

        let results: Vec<_> = repeat_every(producer, Duration::from_millis(10))
            .collect()
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(crate::CadenceError::Computation(_))
        ));
    }

    #[test]
    fn unbounded_window_never_closes() {
        let start = monday_at(0, 0, 0);
        let much_later = monday_at(23, 59, 59);
        assert!(within(start, much_later, None));
        assert!(within(start, much_later, Some(Duration::MAX)));
        assert!(!within(start, much_later, Some(Duration::from_secs(60))));
    }
}
