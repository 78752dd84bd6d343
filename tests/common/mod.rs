//! In-memory payment gateway shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, U256};
use rpc_meter::{
    models::{Channel, ChannelState, PaymentConfirmation, PaymentEvent, PaymentHistoryEntry},
    services::PaymentGateway,
    MeterError, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn token() -> Address {
    "0x95B2d84De40a0121061b105E6B54016a49621B44".parse().unwrap()
}

pub fn partner() -> Address {
    "0x1F916ab5cf1B30B22f24Ebf435f53Ee665344Acf".parse().unwrap()
}

pub fn received(amount: u64) -> PaymentHistoryEntry {
    PaymentHistoryEntry {
        identifier: Some(format!("{}", amount * 1000 + 7)),
        log_time: None,
        target: None,
        initiator: Some(partner()),
        amount: U256::from(amount),
        event: PaymentEvent::Received,
        token_address: token(),
    }
}

pub fn channel(state: ChannelState, total_deposit: u64) -> Channel {
    Channel {
        token_address: token(),
        partner_address: partner(),
        token_network_address: None,
        channel_identifier: U256::from(1),
        balance: U256::from(total_deposit),
        total_deposit: U256::from(total_deposit),
        total_withdraw: U256::zero(),
        state,
        settle_timeout: 500,
        reveal_timeout: 50,
    }
}

/// One scripted answer for a history fetch.
pub enum Scripted {
    History(Vec<PaymentHistoryEntry>),
    Failure,
}

#[derive(Default)]
pub struct FakeGateway {
    history: Mutex<Vec<PaymentHistoryEntry>>,
    scripted: Mutex<VecDeque<Scripted>>,
    history_fetches: AtomicUsize,
    fail_payments: AtomicBool,
    payments: Mutex<Vec<(Address, Address, U256)>>,
    channel: Mutex<Option<Channel>>,
    deposits: Mutex<Vec<U256>>,
    opened: AtomicUsize,
    events: Option<Arc<Mutex<Vec<String>>>>,
}

impl FakeGateway {
    pub fn with_history(entries: Vec<PaymentHistoryEntry>) -> Self {
        let gateway = Self::default();
        *gateway.history.lock().unwrap() = entries;
        gateway
    }

    /// Shares an event log with other fakes so call order can be asserted.
    pub fn with_events(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_channel(self, channel: Channel) -> Self {
        *self.channel.lock().unwrap() = Some(channel);
        self
    }

    pub fn append(&self, entry: PaymentHistoryEntry) {
        self.history.lock().unwrap().push(entry);
    }

    pub fn script(&self, answer: Scripted) {
        self.scripted.lock().unwrap().push_back(answer);
    }

    pub fn fail_payments(&self, fail: bool) {
        self.fail_payments.store(fail, Ordering::SeqCst);
    }

    pub fn history_fetches(&self) -> usize {
        self.history_fetches.load(Ordering::SeqCst)
    }

    pub fn payments(&self) -> Vec<(Address, Address, U256)> {
        self.payments.lock().unwrap().clone()
    }

    pub fn deposits(&self) -> Vec<U256> {
        self.deposits.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn set_channel_state(&self, state: ChannelState) {
        if let Some(channel) = self.channel.lock().unwrap().as_mut() {
            channel.state = state;
        }
    }

    fn log(&self, event: String) {
        if let Some(events) = &self.events {
            events.lock().unwrap().push(event);
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn open_channel(
        &self,
        partner: Address,
        token: Address,
        deposit: U256,
        settle_timeout: u64,
    ) -> Result<Channel> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut opened = channel(ChannelState::Opened, deposit.as_u64());
        opened.partner_address = partner;
        opened.token_address = token;
        opened.settle_timeout = settle_timeout;
        *self.channel.lock().unwrap() = Some(opened.clone());
        Ok(opened)
    }

    async fn deposit_token(
        &self,
        _token: Address,
        _partner: Address,
        total_deposit: U256,
    ) -> Result<()> {
        self.deposits.lock().unwrap().push(total_deposit);
        if let Some(channel) = self.channel.lock().unwrap().as_mut() {
            channel.balance += total_deposit - channel.total_deposit;
            channel.total_deposit = total_deposit;
        }
        Ok(())
    }

    async fn pay_token(
        &self,
        token: Address,
        partner: Address,
        amount: U256,
    ) -> Result<PaymentConfirmation> {
        self.log(format!("pay:{}", amount));
        if self.fail_payments.load(Ordering::SeqCst) {
            return Err(MeterError::GatewayProtocol(
                "409 Conflict: insufficient balance".to_string(),
            ));
        }
        self.payments.lock().unwrap().push((token, partner, amount));
        Ok(PaymentConfirmation {
            identifier: Some(self.payments.lock().unwrap().len().to_string()),
            ..Default::default()
        })
    }

    async fn query_channel(&self, token: Address, partner: Address) -> Result<Channel> {
        self.channel
            .lock()
            .unwrap()
            .clone()
            .ok_or(MeterError::ChannelNotFound { token, partner })
    }

    async fn payment_history(
        &self,
        _token: Address,
        _partner: Address,
    ) -> Result<Vec<PaymentHistoryEntry>> {
        self.history_fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::History(entries)) => Ok(entries),
            Some(Scripted::Failure) => Err(MeterError::GatewayTransport(
                "connection reset by peer".to_string(),
            )),
            None => Ok(self.history.lock().unwrap().clone()),
        }
    }

    async fn join_network(&self, _token: Address, _funds: U256) -> Result<()> {
        Ok(())
    }

    async fn token_list(&self) -> Result<Vec<Address>> {
        Ok(vec![token()])
    }
}
