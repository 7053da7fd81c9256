//! The progress stream handed to callers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::observer::{AuthEvent, AuthObserver};
use crate::state::ProgressState;

type Driver = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Emits progress states of one run to its stream and observer.
#[derive(Clone)]
pub(crate) struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressState>,
    observer: Arc<dyn AuthObserver>,
}

impl ProgressSink {
    pub(crate) fn emit(&self, state: ProgressState) {
        self.observer
            .on_event(&AuthEvent::StateEmitted(state.clone()), None);
        // A dropped stream also drops the driver, so nothing is lost here.
        let _ = self.tx.send(state);
    }
}

/// Lazy, single-subscriber stream of [`ProgressState`]s for one run.
///
/// Nothing happens until the stream is first polled. The run is driven by
/// polling; dropping the stream cancels it, releasing the card connection
/// before `drop` returns. A run that completes ends the stream after exactly
/// one terminal state, while a cancelled run ends it without one.
pub struct ProgressStream {
    driver: Option<Driver>,
    states: mpsc::UnboundedReceiver<ProgressState>,
}

impl ProgressStream {
    /// Builds a stream whose run is produced by `start` from its sink.
    pub(crate) fn new<F, Fut>(observer: Arc<dyn AuthObserver>, start: F) -> Self
    where
        F: FnOnce(ProgressSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, states) = mpsc::unbounded_channel();
        let sink = ProgressSink { tx, observer };
        Self {
            driver: Some(Box::pin(start(sink))),
            states,
        }
    }
}

impl Stream for ProgressStream {
    type Item = ProgressState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressState>> {
        let this = self.get_mut();

        if let Some(driver) = this.driver.as_mut() {
            if driver.as_mut().poll(cx).is_ready() {
                // Drops the sink, so the receiver ends after draining.
                this.driver = None;
            }
        }

        this.states.poll_recv(cx)
    }
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream")
            .field("running", &self.driver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TracingObserver;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let stream = ProgressStream::new(Arc::new(TracingObserver), move |sink| async move {
            flag.store(true, Ordering::SeqCst);
            sink.emit(ProgressState::Initialized);
            sink.emit(ProgressState::FlowFinished);
        });

        tokio::task::yield_now().await;
        assert!(!started.load(Ordering::SeqCst));

        let states: Vec<_> = stream.collect().await;
        assert!(started.load(Ordering::SeqCst));
        assert_eq!(
            states,
            vec![ProgressState::Initialized, ProgressState::FlowFinished]
        );
    }

    #[test]
    fn test_stream_wakes_when_driver_progresses() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let mut stream = tokio_test::task::spawn(ProgressStream::new(
            Arc::new(TracingObserver),
            move |sink| async move {
                let _ = release_rx.await;
                sink.emit(ProgressState::FlowFinished);
            },
        ));

        tokio_test::assert_pending!(stream.poll_next());
        release_tx.send(()).unwrap();
        assert!(stream.is_woken());
        tokio_test::assert_ready_eq!(stream.poll_next(), Some(ProgressState::FlowFinished));
        tokio_test::assert_ready_eq!(stream.poll_next(), None);
    }

    #[tokio::test]
    async fn test_stream_yields_states_while_running() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let mut stream = ProgressStream::new(Arc::new(TracingObserver), move |sink| async move {
            sink.emit(ProgressState::Initialized);
            let _ = release_rx.await;
            sink.emit(ProgressState::FlowFinished);
        });

        assert_eq!(stream.next().await, Some(ProgressState::Initialized));
        release_tx.send(()).unwrap();
        assert_eq!(stream.next().await, Some(ProgressState::FlowFinished));
        assert_eq!(stream.next().await, None);
    }
}
