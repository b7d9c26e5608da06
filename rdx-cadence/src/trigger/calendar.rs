//! Calendar-filtered repetition.
//!
//! A [`CalendarFilter`] holds one set of accepted values per calendar field.
//! An empty set places no constraint, and the fields combine with logical OR:
//! a tick fires when *any* non-empty set contains the matching field of the
//! current instant. This is deliberately not cron's AND semantics. A filter
//! with every set empty matches every tick.
//!
//! Weekdays are numbered ISO-style: 1 = Monday ... 7 = Sunday.

use super::repeat::within;
use super::Producer;
use crate::clock::{self, Instant};
use crate::error::Result;
use chrono::{Datelike, Timelike};
use futures::Stream;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// One field of a calendar instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarField {
    /// 1 = Monday ... 7 = Sunday.
    Weekday,
    /// 1..=31.
    DayOfMonth,
    /// 0..=23.
    Hour,
    /// 0..=59.
    Minute,
    /// 0..=59.
    Second,
}

impl CalendarField {
    pub const ALL: [CalendarField; 5] = [
        CalendarField::Weekday,
        CalendarField::DayOfMonth,
        CalendarField::Hour,
        CalendarField::Minute,
        CalendarField::Second,
    ];

    /// Reads this field from `instant`.
    pub fn of(&self, instant: &Instant) -> u32 {
        match self {
            CalendarField::Weekday => instant.weekday().number_from_monday(),
            CalendarField::DayOfMonth => instant.day(),
            CalendarField::Hour => instant.hour(),
            CalendarField::Minute => instant.minute(),
            CalendarField::Second => instant.second(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarField::Weekday => "weekday",
            CalendarField::DayOfMonth => "day",
            CalendarField::Hour => "hour",
            CalendarField::Minute => "minute",
            CalendarField::Second => "second",
        }
    }
}

impl fmt::Display for CalendarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekday" | "weekdays" => Ok(CalendarField::Weekday),
            "day" | "days" | "date" | "dates" => Ok(CalendarField::DayOfMonth),
            "hour" | "hours" => Ok(CalendarField::Hour),
            "minute" | "minutes" => Ok(CalendarField::Minute),
            "second" | "seconds" => Ok(CalendarField::Second),
            other => Err(format!("unknown calendar field '{other}'")),
        }
    }
}

/// Accepted values per calendar field, combined with OR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarFilter {
    pub weekdays: BTreeSet<u32>,
    pub days_of_month: BTreeSet<u32>,
    pub hours: BTreeSet<u32>,
    pub minutes: BTreeSet<u32>,
    pub seconds: BTreeSet<u32>,
}

impl CalendarFilter {
    /// A filter that matches every instant.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter constraining a single field.
    pub fn only(field: CalendarField, values: impl IntoIterator<Item = u32>) -> Self {
        let mut filter = Self::new();
        filter.set_mut(field).extend(values);
        filter
    }

    /// Accepts these weekdays (1 = Monday ... 7 = Sunday).
    pub fn weekdays(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.weekdays.extend(values);
        self
    }

    pub fn days_of_month(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.days_of_month.extend(values);
        self
    }

    pub fn hours(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.hours.extend(values);
        self
    }

    pub fn minutes(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.minutes.extend(values);
        self
    }

    pub fn seconds(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.seconds.extend(values);
        self
    }

    /// The accepted values for `field`.
    pub fn set(&self, field: CalendarField) -> &BTreeSet<u32> {
        match field {
            CalendarField::Weekday => &self.weekdays,
            CalendarField::DayOfMonth => &self.days_of_month,
            CalendarField::Hour => &self.hours,
            CalendarField::Minute => &self.minutes,
            CalendarField::Second => &self.seconds,
        }
    }

    fn set_mut(&mut self, field: CalendarField) -> &mut BTreeSet<u32> {
        match field {
            CalendarField::Weekday => &mut self.weekdays,
            CalendarField::DayOfMonth => &mut self.days_of_month,
            CalendarField::Hour => &mut self.hours,
            CalendarField::Minute => &mut self.minutes,
            CalendarField::Second => &mut self.seconds,
        }
    }

    /// True when no field is constrained.
    pub fn is_unconstrained(&self) -> bool {
        CalendarField::ALL.iter().all(|field| self.set(*field).is_empty())
    }

    /// Whether a tick at `instant` should fire.
    pub fn matches(&self, instant: &Instant) -> bool {
        if self.is_unconstrained() {
            return true;
        }
        CalendarField::ALL.iter().any(|field| {
            let accepted = self.set(*field);
            !accepted.is_empty() && accepted.contains(&field.of(instant))
        })
    }
}

/// Options for [`Task::repeat_where`](crate::task::Task::repeat_where).
#[derive(Debug, Clone, Default)]
pub struct RepeatWhere {
    /// How long to keep ticking. `None` ticks indefinitely.
    pub length: Option<Duration>,
    /// Tick spacing. `None` uses the configured default (one second).
    pub interval: Option<Duration>,
    pub filter: CalendarFilter,
}

impl RepeatWhere {
    pub fn new(filter: CalendarFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn length(mut self, length: Duration) -> Self {
        self.length = Some(length);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// Ticks every `interval` for `length`, firing on ticks the filter accepts.
///
/// The tick sleeps a flat interval, exactly like `repeat_every_for`.
pub(crate) fn repeat_where<A, T>(
    mut producer: Producer<A, T>,
    options: RepeatWhere,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        let interval = options
            .interval
            .unwrap_or_else(|| producer.config.default_interval());
        let start = producer.now()?;
        while !producer.is_cancelled() {
            let sample = producer.now()?;
            if !within(start, sample, options.length) {
                debug!(trigger = %producer.trigger, "window elapsed");
                break;
            }
            if options.filter.matches(&sample) {
                yield producer.fire()?;
            } else {
                producer.skip(sample);
            }
            if !producer.pause(interval).await {
                break;
            }
        }
    }
}

/// Ticks every `interval` indefinitely, firing on ticks the filter accepts.
///
/// The next tick's target is fixed before the filter check and the firing,
/// and the sleep covers only what is left of it afterwards. Time spent in the
/// computation (or by the consumer before asking for the next element) is
/// absorbed, so the cadence stays aligned to `interval`.
pub(crate) fn repeat_aligned<A, T>(
    mut producer: Producer<A, T>,
    filter: CalendarFilter,
    interval: Duration,
) -> impl Stream<Item = Result<T>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    async_stream::try_stream! {
        while !producer.is_cancelled() {
            let sample = producer.now()?;
            let target = clock::offset(sample, interval)?;
            if filter.matches(&sample) {
                yield producer.fire()?;
            } else {
                producer.skip(sample);
            }
            let remaining = clock::duration_until(producer.now()?, target);
            if !producer.pause(remaining).await {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SimulatedClock};
    use crate::events::TriggerKind;
    use crate::trigger::testing::{counting_producer, monday_at};
    use chrono::NaiveDate;
    use futures::StreamExt;
    use std::pin::pin;
    use std::sync::atomic::Ordering;

    #[test]
    fn fields_read_iso_weekdays() {
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(17, 4, 9)
            .unwrap();
        assert_eq!(CalendarField::Weekday.of(&monday_at(0, 0, 0)), 1);
        assert_eq!(CalendarField::Weekday.of(&sunday), 7);
        assert_eq!(CalendarField::DayOfMonth.of(&sunday), 7);
        assert_eq!(CalendarField::Hour.of(&sunday), 17);
        assert_eq!(CalendarField::Minute.of(&sunday), 4);
        assert_eq!(CalendarField::Second.of(&sunday), 9);
    }

    #[test]
    fn dimensions_combine_with_or() {
        let filter = CalendarFilter::new().weekdays([3]).hours([12]);
        // Monday at noon: weekday misses, hour hits.
        assert!(filter.matches(&monday_at(12, 0, 0)));
        // Monday at 13:00: both miss.
        assert!(!filter.matches(&monday_at(13, 0, 0)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = CalendarFilter::new();
        assert!(filter.is_unconstrained());
        assert!(filter.matches(&monday_at(3, 14, 15)));
    }

    #[test]
    fn field_names_parse() {
        assert_eq!("weekdays".parse::<CalendarField>(), Ok(CalendarField::Weekday));
        assert_eq!("Dates".parse::<CalendarField>(), Ok(CalendarField::DayOfMonth));
        assert!("fortnight".parse::<CalendarField>().is_err());
        assert_eq!(
            CalendarFilter::only(CalendarField::Minute, [0, 30]).minutes,
            BTreeSet::from([0, 30])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unfiltered_repeat_where_fires_on_every_tick() {
        let clock = SimulatedClock::starting_at(monday_at(10, 0, 0));
        let (producer, calls) = counting_producer(clock.clone(), TriggerKind::Where);
        let options = RepeatWhere::default()
            .length(Duration::from_secs(4))
            .interval(Duration::from_secs(1));
        let mut firings = pin!(repeat_where(producer, options));

        for expected in 1..=4 {
            assert_eq!(firings.next().await.unwrap().unwrap(), expected);
            clock.advance(Duration::from_secs(1)).unwrap();
        }
        assert!(firings.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_where_skips_ticks_outside_the_filter() {
        let clock = SimulatedClock::starting_at(monday_at(10, 59, 58));
        let (producer, calls) = counting_producer(clock.clone(), TriggerKind::Where);
        let mut events = producer.events.subscribe();
        let options = RepeatWhere::new(CalendarFilter::new().hours([11]))
            .interval(Duration::from_secs(1));
        let mut firings = pin!(repeat_where(producer, options));

        // Drive the clock half a second at a time, offset from the tick boundaries.
        let driver = tokio::spawn({
            let clock = clock.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                clock.advance(Duration::from_millis(500)).unwrap();
                loop {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    clock.advance(Duration::from_millis(500)).unwrap();
                }
            }
        });

        assert_eq!(firings.next().await.unwrap().unwrap(), 1);
        assert!(clock.now().unwrap() >= monday_at(11, 0, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        driver.abort();

        let mut skipped = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, crate::TriggerEvent::TickSkipped { .. }) {
                skipped += 1;
            }
        }
        assert_eq!(skipped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn aligned_repeat_absorbs_computation_time() {
        let clock = SimulatedClock::starting_at(monday_at(10, 0, 0));
        let (mut producer, _calls) = counting_producer(clock.clone(), TriggerKind::OnSeconds);
        // The computation "takes" 400ms of simulated time.
        let inner = producer.compute.clone();
        let slow_clock = clock.clone();
        producer.compute = std::sync::Arc::new(move |args: &()| -> anyhow::Result<usize> {
            slow_clock.advance(Duration::from_millis(400))?;
            inner(args)
        });
        let started = tokio::time::Instant::now();
        let mut firings = pin!(repeat_aligned(
            producer,
            CalendarFilter::new(),
            Duration::from_secs(1)
        ));

        firings.next().await.unwrap().unwrap();
        firings.next().await.unwrap().unwrap();
        // Only the 600ms left of the first tick were slept.
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn aligned_repeat_runs_back_to_back_behind_a_slow_consumer() {
        let clock = SimulatedClock::starting_at(monday_at(10, 0, 0));
        let (producer, calls) = counting_producer(clock.clone(), TriggerKind::OnSeconds);
        let started = tokio::time::Instant::now();
        let mut firings = pin!(repeat_aligned(
            producer,
            CalendarFilter::new(),
            Duration::from_secs(1)
        ));

        for expected in 1..=3 {
            assert_eq!(firings.next().await.unwrap().unwrap(), expected);
            // The consumer holds each element longer than the interval.
            clock.advance(Duration::from_secs(2)).unwrap();
        }

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
