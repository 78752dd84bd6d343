use crate::services::tariff::CallCategory;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, MeterError>;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Gateway unreachable: {0}")]
    GatewayTransport(String),

    #[error("Gateway protocol error: {0}")]
    GatewayProtocol(String),

    #[error("Payment of {cost} for {category} call failed: {source}")]
    PaymentFailed {
        category: CallCategory,
        cost: u64,
        #[source]
        source: Box<MeterError>,
    },

    #[error("{method} failed after payment: {reason}")]
    UnderlyingCallFailed { method: String, reason: String },

    #[error("No payment confirmed before the deadline")]
    Timeout,

    #[error("Canceled")]
    Canceled,

    #[error("No channel for token {token:?} with partner {partner:?}")]
    ChannelNotFound { token: Address, partner: Address },

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Payment required: {} units", .0.payment.amount)]
    PaymentRequired(PaymentInstructions),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Method is not metered: {0}")]
    UnmeteredMethod(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MeterError {
    /// True when the error was raised after a charge went through.
    pub fn money_moved(&self) -> bool {
        matches!(self, MeterError::UnderlyingCallFailed { .. })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instructions: Option<PaymentInstructions>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentInstructions {
    #[serde(rename = "type")]
    pub type_: String,
    pub version: String,
    pub payment: PaymentDetails,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    pub rail: String,
    pub token: Address,
    pub amount: String,
    pub category: CallCategory,
}

impl PaymentInstructions {
    pub fn new(token: Address, category: CallCategory, amount: u64) -> Self {
        Self {
            type_: "rpc_meter.payment_required".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            payment: PaymentDetails {
                rail: "raiden".to_string(),
                token,
                amount: amount.to_string(),
                category,
            },
        }
    }
}

impl IntoResponse for MeterError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            MeterError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            MeterError::PaymentVerificationFailed(_) => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_VERIFICATION_FAILED")
            }
            MeterError::PaymentFailed { .. } => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_FAILED"),
            MeterError::UnmeteredMethod(_) => (StatusCode::BAD_REQUEST, "UNMETERED_METHOD"),
            MeterError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            MeterError::GatewayTransport(_) | MeterError::GatewayProtocol(_) => {
                (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR")
            }
            MeterError::UnderlyingCallFailed { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            MeterError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            MeterError::Canceled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELED"),
            MeterError::ChannelNotFound { .. } | MeterError::ChannelUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CHANNEL_UNAVAILABLE")
            }
            MeterError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let payment_instructions = match &self {
            MeterError::PaymentRequired(instructions) => Some(instructions.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
            payment_instructions,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
