use crate::models::{ChargeOutcome, ChargeRecord, Stats};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

const MAX_RECENT: usize = 100;

/// In-memory tally of charge records. Nothing here is persisted.
pub struct ChargeLedger {
    paid: AtomicU64,
    failed: AtomicU64,
    units_paid: AtomicU64,
    recent: RwLock<VecDeque<ChargeRecord>>,
    start_time: Instant,
}

impl ChargeLedger {
    pub fn new() -> Self {
        Self {
            paid: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            units_paid: AtomicU64::new(0),
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT)),
            start_time: Instant::now(),
        }
    }

    pub async fn record(&self, record: ChargeRecord) {
        match record.outcome {
            ChargeOutcome::Paid => {
                self.paid.fetch_add(1, Ordering::SeqCst);
                self.units_paid
                    .fetch_add(record.cost_units, Ordering::SeqCst);
            }
            ChargeOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        tracing::debug!(
            category = %record.category,
            cost = record.cost_units,
            outcome = ?record.outcome,
            "Charge recorded"
        );

        let mut recent = self.recent.write().await;
        if recent.len() >= MAX_RECENT {
            recent.pop_front();
        }
        recent.push_back(record);
    }

    pub fn paid(&self) -> u64 {
        self.paid.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn units_paid(&self) -> u64 {
        self.units_paid.load(Ordering::SeqCst)
    }

    pub async fn recent(&self) -> Vec<ChargeRecord> {
        self.recent.read().await.iter().cloned().collect()
    }

    pub async fn stats(&self) -> Stats {
        Stats {
            charges_paid: self.paid(),
            charges_failed: self.failed(),
            units_paid: self.units_paid(),
            uptime_seconds: self.uptime_seconds(),
            recent: self.recent().await,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for ChargeLedger {
    fn default() -> Self {
        Self::new()
    }
}
