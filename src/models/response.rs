use super::ChargeRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub gateway: bool,
    pub upstream_rpc: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Stats {
    pub charges_paid: u64,
    pub charges_failed: u64,
    pub units_paid: u64,
    pub uptime_seconds: u64,
    pub recent: Vec<ChargeRecord>,
}
