//! Defines the lifecycle events broadcast by trigger sequences.
//!
//! Every `Task` owns a broadcast channel. Each sequence it produces reports
//! its progress there, so observers (loggers, shells, tests) can follow
//! firings without consuming the sequence themselves.

use crate::clock::Instant;
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Identifies which trigger method produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Once,
    After,
    At,
    Forever,
    Every,
    EveryFor,
    EveryUntil,
    Where,
    OnWeekdays,
    OnDatesOfMonth,
    OnHours,
    OnMinutes,
    OnSeconds,
}

impl TriggerKind {
    /// A stable, lowercase name suitable for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Once => "once",
            TriggerKind::After => "after",
            TriggerKind::At => "at",
            TriggerKind::Forever => "forever",
            TriggerKind::Every => "every",
            TriggerKind::EveryFor => "every_for",
            TriggerKind::EveryUntil => "every_until",
            TriggerKind::Where => "where",
            TriggerKind::OnWeekdays => "on_weekdays",
            TriggerKind::OnDatesOfMonth => "on_dates_of_month",
            TriggerKind::OnHours => "on_hours",
            TriggerKind::OnMinutes => "on_minutes",
            TriggerKind::OnSeconds => "on_seconds",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress reports from a single trigger sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// The sequence was polled for the first time.
    SequenceStarted { trigger: TriggerKind },
    /// The computation ran; `count` is the 1-based firing number in this sequence.
    Fired { trigger: TriggerKind, count: u64 },
    /// A calendar tick found no matching filter and did not fire.
    TickSkipped { trigger: TriggerKind, at: Instant },
    /// The stopping condition was reached.
    SequenceCompleted { trigger: TriggerKind },
    /// The consumer cancelled the sequence.
    SequenceCancelled { trigger: TriggerKind },
    /// The clock or the computation failed; the sequence ended with that error.
    SequenceFailed { trigger: TriggerKind, reason: String },
}

impl TriggerEvent {
    /// The trigger this event belongs to.
    pub fn trigger(&self) -> TriggerKind {
        match self {
            TriggerEvent::SequenceStarted { trigger }
            | TriggerEvent::Fired { trigger, .. }
            | TriggerEvent::TickSkipped { trigger, .. }
            | TriggerEvent::SequenceCompleted { trigger }
            | TriggerEvent::SequenceCancelled { trigger }
            | TriggerEvent::SequenceFailed { trigger, .. } => *trigger,
        }
    }
}

/// Receives the next event from a task's channel.
///
/// A receiver that falls more than the channel capacity behind loses the
/// oldest events; those are logged and skipped rather than ending the
/// subscription. Returns `None` only once every sender is gone.
pub async fn next_event(events: &mut broadcast::Receiver<TriggerEvent>) -> Option<TriggerEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event listener lagged behind, oldest events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CadenceConfig;
    use crate::task::Task;
    use futures::StreamExt;

    #[tokio::test]
    async fn lagging_listener_resumes_with_the_newest_events() {
        let config = CadenceConfig {
            event_capacity: 4,
            ..CadenceConfig::default()
        };
        let task = Task::infallible(|_: &()| 1u8, ()).with_config(config);
        let mut events = task.subscribe_events();

        let fired: Vec<_> = task.repeat_forever().take(100).collect().await;
        assert_eq!(fired.len(), 100);
        drop(task);

        let mut seen = Vec::new();
        while let Some(event) = next_event(&mut events).await {
            seen.push(event);
        }
        let counts: Vec<u64> = seen
            .iter()
            .map(|event| match event {
                TriggerEvent::Fired { count, .. } => *count,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![97, 98, 99, 100]);
    }

    #[tokio::test]
    async fn closed_channel_ends_the_listener() {
        let (sender, mut events) = broadcast::channel(4);
        sender
            .send(TriggerEvent::SequenceStarted {
                trigger: TriggerKind::Once,
            })
            .unwrap();
        drop(sender);

        assert_eq!(
            next_event(&mut events).await,
            Some(TriggerEvent::SequenceStarted {
                trigger: TriggerKind::Once
            })
        );
        assert_eq!(next_event(&mut events).await, None);
    }
}
