//! The consumer side of a trigger: a lazy, cancellable stream of results.

use crate::error::Result;
use crate::events::{TriggerEvent, TriggerKind};
use futures::stream::{BoxStream, FusedStream};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The sequence of results produced by one trigger call.
///
/// Nothing fires until the stream is polled. Elements arrive strictly in
/// firing order. The stream ends when its trigger's stopping condition is met,
/// after it yields an error, or once it is cancelled. Cancellation is honored
/// at every sleep, so no firing happens after [`cancel`](Self::cancel)
/// returns. Dropping the stream stops it as well.
#[must_use = "streams do nothing unless polled"]
pub struct Firings<T> {
    inner: Option<BoxStream<'static, Result<T>>>,
    cancel: CancellationToken,
    events: broadcast::Sender<TriggerEvent>,
    trigger: TriggerKind,
    started: bool,
}

impl<T> Firings<T> {
    pub(crate) fn new(
        inner: BoxStream<'static, Result<T>>,
        cancel: CancellationToken,
        events: broadcast::Sender<TriggerEvent>,
        trigger: TriggerKind,
    ) -> Self {
        Self {
            inner: Some(inner),
            cancel,
            events,
            trigger,
            started: false,
        }
    }

    /// Stops the sequence. Any pending sleep is interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels this sequence from elsewhere, e.g. another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Which trigger method produced this sequence.
    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    fn finish(&mut self, event: TriggerEvent) {
        self.inner = None;
        debug!(trigger = %self.trigger, ?event, "sequence finished");
        self.events.send(event).ok();
    }
}

impl<T> Stream for Firings<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let trigger = this.trigger;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        if !this.started {
            this.started = true;
            this.events.send(TriggerEvent::SequenceStarted { trigger }).ok();
        }
        if this.cancel.is_cancelled() {
            this.finish(TriggerEvent::SequenceCancelled { trigger });
            return Poll::Ready(None);
        }

        match inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Err(err))) => {
                let reason = err.to_string();
                this.finish(TriggerEvent::SequenceFailed { trigger, reason });
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                let event = if this.cancel.is_cancelled() {
                    TriggerEvent::SequenceCancelled { trigger }
                } else {
                    TriggerEvent::SequenceCompleted { trigger }
                };
                this.finish(event);
                Poll::Ready(None)
            }
        }
    }
}

impl<T> FusedStream for Firings<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}
