use crate::{
    context::{CancelSignal, Clock, TokioClock},
    error::{MeterError, Result},
    models::PaymentHistoryEntry,
    services::gateway::PaymentGateway,
};
use ethers::types::Address;
use std::cmp::Ordering;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_POLL_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Confirmed,
    TimedOut,
    Canceled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Confirmed | PollState::TimedOut | PollState::Canceled
        )
    }
}

/// Watches the payment history of one token/partner pair for new entries.
///
/// The baseline is the last history this poller accepted. It only ever grows: a fetch that comes
/// back shorter is treated as an inconsistent read and ignored.
///
/// [`next_receipt`](Self::next_receipt) hands out baseline entries one at a time through a cursor,
/// so several payments landing between two fetches are each seen once.
pub struct ReceiptPoller<G, C = TokioClock> {
    gateway: G,
    clock: C,
    token: Address,
    partner: Address,
    poll_pause: Duration,
    baseline: Vec<PaymentHistoryEntry>,
    state: PollState,
    fetches: u64,
    cursor: usize,
}

impl<G: PaymentGateway> ReceiptPoller<G, TokioClock> {
    pub async fn new(
        gateway: G,
        token: Address,
        partner: Address,
        poll_pause: Duration,
    ) -> Result<Self> {
        Self::with_clock(gateway, TokioClock, token, partner, poll_pause).await
    }
}

impl<G: PaymentGateway, C: Clock> ReceiptPoller<G, C> {
    /// Fetches the current history once to set the baseline; fails if that fetch fails.
    pub async fn with_clock(
        gateway: G,
        clock: C,
        token: Address,
        partner: Address,
        poll_pause: Duration,
    ) -> Result<Self> {
        let baseline = gateway.payment_history(token, partner).await.map_err(|e| {
            tracing::warn!("Could not retrieve payment history for {:?}: {}", partner, e);
            e
        })?;

        tracing::info!(
            "Watching payments from {:?} (token {:?}), baseline of {} entries",
            partner,
            token,
            baseline.len()
        );

        Ok(Self {
            gateway,
            clock,
            token,
            partner,
            poll_pause,
            cursor: baseline.len(),
            baseline,
            state: PollState::Idle,
            fetches: 1,
        })
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn partner(&self) -> Address {
        self.partner
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    pub fn baseline(&self) -> &[PaymentHistoryEntry] {
        &self.baseline
    }

    /// Baseline entries not yet handed out by `next_receipt`.
    pub fn unconsumed(&self) -> usize {
        self.baseline.len() - self.cursor
    }

    /// History fetches issued so far, including the initial one.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Returns true if a payment arrived within `max_wait`.
    pub async fn await_payment(&mut self, max_wait: Duration, cancel: &CancelSignal) -> bool {
        self.await_receipt(max_wait, cancel).await.is_ok()
    }

    /// Like [`await_payment`](Self::await_payment) but hands back the newest history entry.
    ///
    /// Errors are `Timeout` or `Canceled`; individual fetch failures never end the wait.
    pub async fn await_receipt(
        &mut self,
        max_wait: Duration,
        cancel: &CancelSignal,
    ) -> Result<PaymentHistoryEntry> {
        let started = self.clock.now();
        self.arm();

        loop {
            if let Some(entry) = self.poll_history().await {
                self.cursor = self.baseline.len();
                self.state = PollState::Confirmed;
                tracing::info!(
                    "Received payment with value {} from {:?}",
                    entry.amount,
                    self.partner
                );
                return Ok(entry);
            }

            self.give_up_or_wait(started, max_wait, cancel).await?;
        }
    }

    /// Waits for the oldest unconsumed entry that `accept` admits and consumes it.
    ///
    /// Rejected entries are consumed too. Unlike `await_receipt`, entries that arrived together
    /// are returned by successive calls instead of being folded into one.
    pub async fn next_receipt<F>(
        &mut self,
        max_wait: Duration,
        cancel: &CancelSignal,
        accept: F,
    ) -> Result<PaymentHistoryEntry>
    where
        F: Fn(&PaymentHistoryEntry) -> bool,
    {
        let started = self.clock.now();
        self.arm();

        loop {
            self.poll_history().await;

            if let Some(entry) = self.take_unconsumed(&accept) {
                self.state = PollState::Confirmed;
                tracing::info!(
                    "Received payment with value {} from {:?}",
                    entry.amount,
                    self.partner
                );
                return Ok(entry);
            }

            self.give_up_or_wait(started, max_wait, cancel).await?;
        }
    }

    fn arm(&mut self) {
        if self.state.is_terminal() {
            tracing::debug!("Re-arming receipt poller after {:?}", self.state);
        }
        self.state = PollState::Polling;
    }

    fn take_unconsumed<F>(&mut self, accept: &F) -> Option<PaymentHistoryEntry>
    where
        F: Fn(&PaymentHistoryEntry) -> bool,
    {
        while self.cursor < self.baseline.len() {
            let entry = &self.baseline[self.cursor];
            self.cursor += 1;
            if accept(entry) {
                return Some(entry.clone());
            }
            tracing::debug!(
                "Skipping history entry {:?} ({:?})",
                entry.identifier,
                entry.event
            );
        }
        None
    }

    /// Ends the session on timeout or cancellation, otherwise sleeps one poll pause.
    async fn give_up_or_wait(
        &mut self,
        started: Instant,
        max_wait: Duration,
        cancel: &CancelSignal,
    ) -> Result<()> {
        if self.clock.now().duration_since(started) > max_wait {
            self.state = PollState::TimedOut;
            tracing::debug!("No payment from {:?} within {:?}", self.partner, max_wait);
            return Err(MeterError::Timeout);
        }

        if cancel.is_canceled() {
            self.state = PollState::Canceled;
            return Err(MeterError::Canceled);
        }

        self.clock.sleep(self.poll_pause).await;
        Ok(())
    }

    async fn poll_history(&mut self) -> Option<PaymentHistoryEntry> {
        self.fetches += 1;
        let history = match self.gateway.payment_history(self.token, self.partner).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("Payment history fetch failed: {}", e);
                return None;
            }
        };

        match history.len().cmp(&self.baseline.len()) {
            Ordering::Greater => {
                let newest = history.last().cloned();
                self.baseline = history;
                newest
            }
            Ordering::Equal => None,
            Ordering::Less => {
                tracing::warn!(
                    "Ignoring payment history of {} entries, baseline has {}",
                    history.len(),
                    self.baseline.len()
                );
                None
            }
        }
    }
}
