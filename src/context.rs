//! Execution context for metered calls and receipt polling: cancellation, deadlines and time.

use crate::error::{MeterError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Creates a linked cancellation handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal(self.0.subscribe())
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_canceled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Cancellation plus an optional deadline, passed to every metered call.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancelSignal,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn background() -> Self {
        Self {
            cancel: CancelSignal::never(),
            deadline: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Fails when the context is already canceled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            return Err(MeterError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(MeterError::Timeout),
            _ => Ok(()),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Time source for the polling loop.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer, so paused test runtimes control it too.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
