//! The `Task`: a computation bound to its arguments and a clock.

use crate::clock::{Clock, Instant, SystemClock};
use crate::config::CadenceConfig;
use crate::events::{TriggerEvent, TriggerKind};
use crate::sequence::Firings;
use crate::trigger::calendar::{self, CalendarField, CalendarFilter, RepeatWhere};
use crate::trigger::{point, repeat, Computation, Producer};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A computation bound to a fixed argument value and a clock.
///
/// The computation and arguments never change after construction. Every
/// trigger method borrows the task immutably and returns an independent
/// [`Firings`] stream, so any number of triggers may run on one task at the
/// same time without interfering. Cloning a task is cheap and shares the
/// computation, arguments, clock and event channel.
///
/// There are two sleep disciplines, and both are intentional parts of the
/// contract:
///
/// - `repeat_every`, `repeat_every_for`, `repeat_every_until` and
///   `repeat_where` sleep a flat interval after each firing, so the
///   computation's running time adds to the cadence.
/// - The single-field calendar methods (`repeat_on_weekdays` and friends) fix
///   the next tick before firing and sleep only what is left of it, so the
///   cadence stays at `interval`. The remainder is measured when the consumer
///   asks for the next element, so a consumer slower than `interval` gets
///   the following ticks back to back with no sleep in between.
pub struct Task<A, T> {
    compute: Arc<Computation<A, T>>,
    arguments: Arc<A>,
    clock: Arc<dyn Clock>,
    config: Arc<CadenceConfig>,
    events: broadcast::Sender<TriggerEvent>,
}

impl<A, T> Clone for Task<A, T> {
    fn clone(&self) -> Self {
        Self {
            compute: self.compute.clone(),
            arguments: self.arguments.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        }
    }
}

// Construction and accessors.
impl<A, T> Task<A, T>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Binds `compute` to `arguments`, reading time from a [`SystemClock`].
    pub fn new(
        compute: impl Fn(&A) -> anyhow::Result<T> + Send + Sync + 'static,
        arguments: A,
    ) -> Self {
        Self::with_clock(compute, arguments, Arc::new(SystemClock::new()))
    }

    /// Binds `compute` to `arguments`, reading time from `clock`.
    ///
    /// The clock is shared: hand the same `Arc` (or a clone of a
    /// `SimulatedClock`) to as many tasks as needed.
    pub fn with_clock(
        compute: impl Fn(&A) -> anyhow::Result<T> + Send + Sync + 'static,
        arguments: A,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = CadenceConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            compute: Arc::new(compute),
            arguments: Arc::new(arguments),
            clock,
            config: Arc::new(config),
            events,
        }
    }

    /// Binds a computation that cannot fail.
    pub fn infallible(compute: impl Fn(&A) -> T + Send + Sync + 'static, arguments: A) -> Self {
        Self::new(move |args: &A| Ok(compute(args)), arguments)
    }

    /// Replaces the engine tuning.
    ///
    /// This also opens a fresh event channel sized to the new capacity, so
    /// call it before [`subscribe_events`](Self::subscribe_events).
    pub fn with_config(mut self, config: CadenceConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        self.events = events;
        self.config = Arc::new(config);
        self
    }

    pub fn arguments(&self) -> &A {
        &self.arguments
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Subscribes to the lifecycle events of every sequence this task produces.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TriggerEvent> {
        self.events.subscribe()
    }

    fn launch<S>(&self, trigger: TriggerKind, build: impl FnOnce(Producer<A, T>) -> S) -> Firings<T>
    where
        S: Stream<Item = crate::Result<T>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let producer = Producer::new(
            self.compute.clone(),
            self.arguments.clone(),
            self.clock.clone(),
            self.config.clone(),
            self.events.clone(),
            cancel.clone(),
            trigger,
        );
        debug!(%trigger, "sequence created");
        Firings::new(build(producer).boxed(), cancel, self.events.clone(), trigger)
    }
}

// Trigger methods.
impl<A, T> Task<A, T>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Fires once, immediately.
    pub fn fire_once(&self) -> Firings<T> {
        self.launch(TriggerKind::Once, point::fire_once)
    }

    /// Fires once, `delay` after the call.
    ///
    /// The wait closes in on the target with shrinking sleeps rather than one
    /// long sleep, re-reading the clock on each wake-up. A zero delay fires
    /// without sleeping.
    pub fn fire_after(&self, delay: Duration) -> Firings<T> {
        self.launch(TriggerKind::After, move |p| point::fire_after(p, delay))
    }

    /// Fires once, when the clock reaches `instant`. A past instant fires
    /// without sleeping.
    pub fn fire_at(&self, instant: Instant) -> Firings<T> {
        self.launch(TriggerKind::At, move |p| point::fire_at(p, instant))
    }

    /// Fires back to back until cancelled, yielding to the runtime in between.
    pub fn repeat_forever(&self) -> Firings<T> {
        self.launch(TriggerKind::Forever, repeat::repeat_forever)
    }

    /// Fires now, then after every `interval`, until cancelled.
    pub fn repeat_every(&self, interval: Duration) -> Firings<T> {
        self.launch(TriggerKind::Every, move |p| repeat::repeat_every(p, interval))
    }

    /// Fires every `interval` while less than `length` has elapsed since the call.
    ///
    /// The window is checked before each firing; a firing that would start
    /// after the window closed is skipped.
    pub fn repeat_every_for(&self, length: Duration, interval: Duration) -> Firings<T> {
        self.launch(TriggerKind::EveryFor, move |p| {
            repeat::repeat_every_for(p, length, interval)
        })
    }

    /// Fires every `interval` while the clock is before `instant`.
    pub fn repeat_every_until(&self, instant: Instant, interval: Duration) -> Firings<T> {
        self.launch(TriggerKind::EveryUntil, move |p| {
            repeat::repeat_every_until(p, instant, interval)
        })
    }

    /// Ticks on a flat interval and fires on ticks that match the calendar filter.
    ///
    /// Filter fields combine with OR; see [`CalendarFilter`]. With no filter
    /// values at all, every tick fires.
    pub fn repeat_where(&self, options: RepeatWhere) -> Firings<T> {
        self.launch(TriggerKind::Where, move |p| calendar::repeat_where(p, options))
    }

    /// Ticks every `interval` and fires when today's ISO weekday
    /// (1 = Monday ... 7 = Sunday) is in `weekdays`.
    pub fn repeat_on_weekdays(
        &self,
        weekdays: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        self.repeat_on(CalendarField::Weekday, weekdays, interval)
    }

    /// Ticks every `interval` and fires when the day of the month is in `days`.
    pub fn repeat_on_dates_of_month(
        &self,
        days: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        self.repeat_on(CalendarField::DayOfMonth, days, interval)
    }

    pub fn repeat_on_hours(
        &self,
        hours: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        self.repeat_on(CalendarField::Hour, hours, interval)
    }

    pub fn repeat_on_minutes(
        &self,
        minutes: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        self.repeat_on(CalendarField::Minute, minutes, interval)
    }

    pub fn repeat_on_seconds(
        &self,
        seconds: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        self.repeat_on(CalendarField::Second, seconds, interval)
    }

    /// The single-field calendar trigger behind the `repeat_on_*` methods.
    ///
    /// Runs until cancelled. An empty value set places no constraint, so every
    /// tick fires.
    pub fn repeat_on(
        &self,
        field: CalendarField,
        values: impl IntoIterator<Item = u32>,
        interval: Duration,
    ) -> Firings<T> {
        let filter = CalendarFilter::only(field, values);
        let trigger = match field {
            CalendarField::Weekday => TriggerKind::OnWeekdays,
            CalendarField::DayOfMonth => TriggerKind::OnDatesOfMonth,
            CalendarField::Hour => TriggerKind::OnHours,
            CalendarField::Minute => TriggerKind::OnMinutes,
            CalendarField::Second => TriggerKind::OnSeconds,
        };
        self.launch(trigger, move |p| calendar::repeat_aligned(p, filter, interval))
    }
}
