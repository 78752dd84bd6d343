use crate::error::{MeterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Category of a remote call, used to look up its price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallCategory {
    /// Block, header, transaction and subscription reads.
    General,
    /// Balance, nonce, storage and code reads, including pending-state variants.
    StateAccess,
    /// Log queries and log subscriptions.
    Filter,
    /// `eth_call` variants.
    ContractCall,
    /// Gas price and gas limit suggestions.
    GasEstimation,
    SendTransaction,
}

impl CallCategory {
    pub const ALL: [CallCategory; 6] = [
        CallCategory::General,
        CallCategory::StateAccess,
        CallCategory::Filter,
        CallCategory::ContractCall,
        CallCategory::GasEstimation,
        CallCategory::SendTransaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallCategory::General => "general",
            CallCategory::StateAccess => "state-access",
            CallCategory::Filter => "filter",
            CallCategory::ContractCall => "contract-call",
            CallCategory::GasEstimation => "gas-estimation",
            CallCategory::SendTransaction => "send-transaction",
        }
    }

    /// Maps an Ethereum JSON-RPC method name to the category it is billed under.
    pub fn for_method(method: &str) -> Option<Self> {
        let category = match method {
            "eth_blockNumber"
            | "eth_chainId"
            | "eth_getBlockByHash"
            | "eth_getBlockByNumber"
            | "eth_getBlockTransactionCountByHash"
            | "eth_getBlockTransactionCountByNumber"
            | "eth_getTransactionByHash"
            | "eth_getTransactionByBlockHashAndIndex"
            | "eth_getTransactionByBlockNumberAndIndex"
            | "eth_getTransactionReceipt"
            | "eth_syncing"
            | "eth_subscribe"
            | "eth_unsubscribe" => CallCategory::General,
            "net_version"
            | "eth_getBalance"
            | "eth_getStorageAt"
            | "eth_getCode"
            | "eth_getTransactionCount" => CallCategory::StateAccess,
            "eth_getLogs"
            | "eth_newFilter"
            | "eth_newBlockFilter"
            | "eth_getFilterChanges"
            | "eth_getFilterLogs"
            | "eth_uninstallFilter" => CallCategory::Filter,
            "eth_call" => CallCategory::ContractCall,
            "eth_gasPrice" | "eth_estimateGas" | "eth_maxPriorityFeePerGas" | "eth_feeHistory" => {
                CallCategory::GasEstimation
            }
            "eth_sendRawTransaction" | "eth_sendTransaction" => CallCategory::SendTransaction,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price list for metered calls, in payment-network token units.
///
/// Immutable once built; share it by value or behind an `Arc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tariff {
    general: NonZeroU64,
    state_access: NonZeroU64,
    filter: NonZeroU64,
    contract_call: NonZeroU64,
    gas_estimation: NonZeroU64,
    send_transaction: NonZeroU64,
}

impl Tariff {
    pub fn new(
        general: u64,
        state_access: u64,
        filter: u64,
        contract_call: u64,
        gas_estimation: u64,
        send_transaction: u64,
    ) -> Result<Self> {
        Ok(Self {
            general: positive(CallCategory::General, general)?,
            state_access: positive(CallCategory::StateAccess, state_access)?,
            filter: positive(CallCategory::Filter, filter)?,
            contract_call: positive(CallCategory::ContractCall, contract_call)?,
            gas_estimation: positive(CallCategory::GasEstimation, gas_estimation)?,
            send_transaction: positive(CallCategory::SendTransaction, send_transaction)?,
        })
    }

    pub fn cost_of(&self, category: CallCategory) -> u64 {
        let cost = match category {
            CallCategory::General => self.general,
            CallCategory::StateAccess => self.state_access,
            CallCategory::Filter => self.filter,
            CallCategory::ContractCall => self.contract_call,
            CallCategory::GasEstimation => self.gas_estimation,
            CallCategory::SendTransaction => self.send_transaction,
        };
        cost.get()
    }

    /// Returns a copy with one category repriced.
    pub fn with_cost(mut self, category: CallCategory, cost: u64) -> Result<Self> {
        let cost = positive(category, cost)?;
        match category {
            CallCategory::General => self.general = cost,
            CallCategory::StateAccess => self.state_access = cost,
            CallCategory::Filter => self.filter = cost,
            CallCategory::ContractCall => self.contract_call = cost,
            CallCategory::GasEstimation => self.gas_estimation = cost,
            CallCategory::SendTransaction => self.send_transaction = cost,
        }
        Ok(self)
    }
}

impl Default for Tariff {
    fn default() -> Self {
        let unit = |v: u64| NonZeroU64::new(v).unwrap_or(NonZeroU64::MIN);
        Self {
            general: unit(4),
            state_access: unit(4),
            filter: unit(8),
            contract_call: unit(3),
            gas_estimation: unit(1),
            send_transaction: unit(1),
        }
    }
}

fn positive(category: CallCategory, cost: u64) -> Result<NonZeroU64> {
    NonZeroU64::new(cost)
        .ok_or_else(|| MeterError::ConfigError(format!("cost for {} must be positive", category)))
}
