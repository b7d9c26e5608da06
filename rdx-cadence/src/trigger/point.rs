//! Immediate and point-in-time firing.

use super::Producer;
use crate::clock::{self, Instant};
use crate::error::Result;
use futures::Stream;
use std::time::Duration;
use tracing::{debug, trace};

pub(crate) fn fire_once<A, T>(mut producer: Producer<A, T>) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        if !producer.is_cancelled() {
            yield producer.fire()?;
        }
    }
}

pub(crate) fn fire_after<A, T>(
    mut producer: Producer<A, T>,
    delay: Duration,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        let target = clock::offset(producer.now()?, delay)?;
        if converge(&producer, target).await? {
            yield producer.fire()?;
        }
    }
}

pub(crate) fn fire_at<A, T>(
    mut producer: Producer<A, T>,
    target: Instant,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        if converge(&producer, target).await? {
            yield producer.fire()?;
        }
    }
}

/// Sleeps in shrinking steps until the clock reaches `target`.
///
/// With `remaining` time units left, the next sleep lasts `remaining ^ exponent`
/// units. The exponent is below one, so every sleep undershoots and the number
/// of wake-ups grows only as the target gets close. "Now" is re-read through
/// the clock on every iteration, so an externally advanced clock is honored
/// without restarting. Returns `false` if the sequence was cancelled.
async fn converge<A, T>(producer: &Producer<A, T>, target: Instant) -> Result<bool> {
    let unit = producer.config.convergence.unit().as_secs_f64();
    let exponent = producer.config.convergence.exponent;
    let mut wakeups = 0u32;
    loop {
        let remaining = clock::seconds_between(producer.now()?, target) / unit;
        if remaining.is_nan() || remaining <= 0.0 {
            break;
        }
        let step = remaining.powf(exponent);
        if !step.is_finite() {
            break;
        }
        let sleep = Duration::try_from_secs_f64(step * unit).unwrap_or(Duration::MAX);
        trace!(trigger = %producer.trigger, remaining, ?sleep, "converging");
        if !producer.pause(sleep).await {
            return Ok(false);
        }
        wakeups += 1;
    }
    debug!(trigger = %producer.trigger, %target, wakeups, "target reached");
    Ok(true)
}
