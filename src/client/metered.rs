//! Pay-per-call wrapper around an Ethereum JSON-RPC provider.
//!
//! Every call is charged through the payment gateway before it is forwarded. The charge is not
//! refunded when the forwarded call fails: callers pay to try. `MeterError::PaymentFailed` means
//! no money moved and the provider was never contacted; `MeterError::UnderlyingCallFailed` means
//! the charge went through and the provider call failed afterwards.

use crate::{
    context::CallContext,
    error::{MeterError, Result},
    models::{ChargeRecord, PaymentConfirmation},
    services::{
        gateway::PaymentGateway,
        ledger::ChargeLedger,
        tariff::{CallCategory, Tariff},
    },
};
use ethers::{
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, BlockId, BlockNumber, Bytes,
        Filter, Log, SyncingStatus, Transaction, TransactionReceipt, TxHash, H256, U256, U64,
    },
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub struct MeteredClient<M, G> {
    inner: M,
    gateway: G,
    tariff: Tariff,
    token: Address,
    partner: Address,
    ledger: Arc<ChargeLedger>,
}

fn pending() -> Option<BlockId> {
    Some(BlockId::Number(BlockNumber::Pending))
}

impl<M: Middleware, G: PaymentGateway> MeteredClient<M, G> {
    /// `partner` is the endpoint operator being paid, in `token`.
    pub fn new(inner: M, gateway: G, tariff: Tariff, token: Address, partner: Address) -> Self {
        Self {
            inner,
            gateway,
            tariff,
            token,
            partner,
            ledger: Arc::new(ChargeLedger::new()),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<ChargeLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    pub fn ledger(&self) -> &Arc<ChargeLedger> {
        &self.ledger
    }

    /// Pays the tariff for `category` to the partner and records the outcome.
    pub async fn charge(&self, category: CallCategory) -> Result<PaymentConfirmation> {
        let cost = self.tariff.cost_of(category);

        match self
            .gateway
            .pay_token(self.token, self.partner, U256::from(cost))
            .await
        {
            Ok(confirmation) => {
                self.ledger
                    .record(ChargeRecord::paid(
                        category,
                        cost,
                        confirmation.identifier.clone(),
                    ))
                    .await;
                Ok(confirmation)
            }
            Err(e) => {
                tracing::warn!("Charging {} for {} call failed: {}", cost, category, e);
                self.ledger.record(ChargeRecord::failed(category, cost)).await;
                Err(MeterError::PaymentFailed {
                    category,
                    cost,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn metered<'a, T, E, F, Fut>(
        &'a self,
        ctx: &CallContext,
        category: CallCategory,
        method: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: FnOnce(&'a M) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        ctx.check()?;
        self.charge(category).await?;

        let failed = |reason: String| MeterError::UnderlyingCallFailed {
            method: method.to_string(),
            reason,
        };

        let call = call(&self.inner);
        let outcome = match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| failed("deadline exceeded".to_string()))?,
            None => call.await,
        };
        outcome.map_err(|e| failed(e.to_string()))
    }

    // General

    pub async fn block_number(&self, ctx: &CallContext) -> Result<U64> {
        self.metered(ctx, CallCategory::General, "eth_blockNumber", |m| {
            m.get_block_number()
        })
        .await
    }

    pub async fn chain_id(&self, ctx: &CallContext) -> Result<U256> {
        self.metered(ctx, CallCategory::General, "eth_chainId", |m| m.get_chainid())
            .await
    }

    pub async fn block(&self, ctx: &CallContext, id: BlockId) -> Result<Option<Block<TxHash>>> {
        self.metered(ctx, CallCategory::General, "eth_getBlock", |m| {
            m.get_block(id)
        })
        .await
    }

    pub async fn block_with_txs(
        &self,
        ctx: &CallContext,
        id: BlockId,
    ) -> Result<Option<Block<Transaction>>> {
        self.metered(ctx, CallCategory::General, "eth_getBlock", |m| {
            m.get_block_with_txs(id)
        })
        .await
    }

    pub async fn transaction(&self, ctx: &CallContext, hash: TxHash) -> Result<Option<Transaction>> {
        self.metered(ctx, CallCategory::General, "eth_getTransactionByHash", |m| {
            m.get_transaction(hash)
        })
        .await
    }

    pub async fn transaction_receipt(
        &self,
        ctx: &CallContext,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>> {
        self.metered(ctx, CallCategory::General, "eth_getTransactionReceipt", |m| {
            m.get_transaction_receipt(hash)
        })
        .await
    }

    /// The block without its transactions; `None` when the node does not know it.
    pub async fn header_by_number(
        &self,
        ctx: &CallContext,
        number: BlockNumber,
    ) -> Result<Option<Block<TxHash>>> {
        self.metered(ctx, CallCategory::General, "eth_getBlockByNumber", |m| {
            m.get_block(number)
        })
        .await
    }

    /// Number of transactions in the block with the given hash.
    pub async fn transaction_count(&self, ctx: &CallContext, block_hash: H256) -> Result<U64> {
        self.metered(
            ctx,
            CallCategory::General,
            "eth_getBlockTransactionCountByHash",
            |m| {
                m.provider()
                    .request("eth_getBlockTransactionCountByHash", [block_hash])
            },
        )
        .await
    }

    pub async fn transaction_in_block(
        &self,
        ctx: &CallContext,
        block_hash: H256,
        index: U64,
    ) -> Result<Option<Transaction>> {
        self.metered(
            ctx,
            CallCategory::General,
            "eth_getTransactionByBlockHashAndIndex",
            |m| m.get_transaction_by_block_and_index(block_hash, index),
        )
        .await
    }

    pub async fn syncing(&self, ctx: &CallContext) -> Result<SyncingStatus> {
        self.metered(ctx, CallCategory::General, "eth_syncing", |m| m.syncing())
            .await
    }

    // State access

    pub async fn network_id(&self, ctx: &CallContext) -> Result<String> {
        self.metered(ctx, CallCategory::StateAccess, "net_version", |m| {
            m.get_net_version()
        })
        .await
    }

    pub async fn balance(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.metered(ctx, CallCategory::StateAccess, "eth_getBalance", |m| {
            m.get_balance(account, block)
        })
        .await
    }

    pub async fn storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        slot: H256,
        block: Option<BlockId>,
    ) -> Result<H256> {
        self.metered(ctx, CallCategory::StateAccess, "eth_getStorageAt", |m| {
            m.get_storage_at(account, slot, block)
        })
        .await
    }

    pub async fn code(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.metered(ctx, CallCategory::StateAccess, "eth_getCode", |m| {
            m.get_code(account, block)
        })
        .await
    }

    pub async fn nonce(
        &self,
        ctx: &CallContext,
        account: Address,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.metered(ctx, CallCategory::StateAccess, "eth_getTransactionCount", |m| {
            m.get_transaction_count(account, block)
        })
        .await
    }

    /// Number of transactions in the pending block.
    pub async fn pending_transaction_count(&self, ctx: &CallContext) -> Result<U64> {
        self.metered(
            ctx,
            CallCategory::StateAccess,
            "eth_getBlockTransactionCountByNumber",
            |m| {
                m.provider()
                    .request("eth_getBlockTransactionCountByNumber", [BlockNumber::Pending])
            },
        )
        .await
    }

    pub async fn pending_balance(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.balance(ctx, account, pending()).await
    }

    pub async fn pending_storage_at(
        &self,
        ctx: &CallContext,
        account: Address,
        slot: H256,
    ) -> Result<H256> {
        self.storage_at(ctx, account, slot, pending()).await
    }

    pub async fn pending_code(&self, ctx: &CallContext, account: Address) -> Result<Bytes> {
        self.code(ctx, account, pending()).await
    }

    /// The nonce to use for the account's next transaction.
    pub async fn pending_nonce(&self, ctx: &CallContext, account: Address) -> Result<U256> {
        self.nonce(ctx, account, pending()).await
    }

    // Filters

    pub async fn logs(&self, ctx: &CallContext, filter: &Filter) -> Result<Vec<Log>> {
        self.metered(ctx, CallCategory::Filter, "eth_getLogs", |m| {
            m.get_logs(filter)
        })
        .await
    }

    // Contract calls

    pub async fn call(
        &self,
        ctx: &CallContext,
        tx: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<Bytes> {
        self.metered(ctx, CallCategory::ContractCall, "eth_call", |m| {
            m.call(tx, block)
        })
        .await
    }

    pub async fn pending_call(&self, ctx: &CallContext, tx: &TypedTransaction) -> Result<Bytes> {
        self.call(ctx, tx, pending()).await
    }

    // Gas estimation

    pub async fn gas_price(&self, ctx: &CallContext) -> Result<U256> {
        self.metered(ctx, CallCategory::GasEstimation, "eth_gasPrice", |m| {
            m.get_gas_price()
        })
        .await
    }

    pub async fn estimate_gas(
        &self,
        ctx: &CallContext,
        tx: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<U256> {
        self.metered(ctx, CallCategory::GasEstimation, "eth_estimateGas", |m| {
            m.estimate_gas(tx, block)
        })
        .await
    }

    // Transactions

    /// Submits a signed transaction and returns its hash without waiting for inclusion.
    pub async fn send_raw_transaction(&self, ctx: &CallContext, tx: Bytes) -> Result<TxHash> {
        self.metered(
            ctx,
            CallCategory::SendTransaction,
            "eth_sendRawTransaction",
            |m| async move { m.send_raw_transaction(tx).await.map(|pending| *pending) },
        )
        .await
    }
}
