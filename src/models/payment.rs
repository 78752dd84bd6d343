use super::decimal;
use crate::services::tariff::CallCategory;
use chrono::{DateTime, NaiveDateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    #[serde(rename = "EventPaymentReceivedSuccess")]
    Received,
    #[serde(rename = "EventPaymentSentSuccess")]
    Sent,
    #[serde(rename = "EventPaymentSentFailed")]
    SentFailed,
    #[serde(other)]
    Other,
}

/// One entry of the payment history kept by the gateway for a token/partner pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    #[serde(default, deserialize_with = "decimal::opaque::deserialize")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub log_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Address>,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub event: PaymentEvent,
    pub token_address: Address,
}

impl PaymentHistoryEntry {
    pub fn is_received(&self) -> bool {
        self.event == PaymentEvent::Received
    }

    /// The other side of the payment: the initiator of a received payment, the target of a sent one.
    pub fn counterparty(&self) -> Option<Address> {
        match self.event {
            PaymentEvent::Received => self.initiator.or(self.target),
            _ => self.target.or(self.initiator),
        }
    }
}

/// Gateway acknowledgement of a `PayToken` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(default, deserialize_with = "decimal::opaque::deserialize")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeOutcome {
    Paid,
    Failed,
}

/// The result of charging for one metered call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub category: CallCategory,
    pub cost_units: u64,
    pub outcome: ChargeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ChargeRecord {
    pub fn paid(category: CallCategory, cost_units: u64, payment_id: Option<String>) -> Self {
        Self {
            category,
            cost_units,
            outcome: ChargeOutcome::Paid,
            payment_id,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(category: CallCategory, cost_units: u64) -> Self {
        Self {
            category,
            cost_units,
            outcome: ChargeOutcome::Failed,
            payment_id: None,
            recorded_at: Utc::now(),
        }
    }
}
