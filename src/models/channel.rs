use super::decimal;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Unopened,
    Opened,
    Settling,
    #[serde(alias = "settled")]
    Closed,
}

impl ChannelState {
    fn rank(self) -> u8 {
        match self {
            ChannelState::Unopened => 0,
            ChannelState::Opened => 1,
            ChannelState::Settling => 2,
            ChannelState::Closed => 3,
        }
    }

    /// States only move forward, except that a closed channel may be opened again.
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        if self == ChannelState::Closed && next != ChannelState::Settling {
            return true;
        }
        next.rank() >= self.rank()
    }

    pub fn accepts_payments(self) -> bool {
        self == ChannelState::Opened
    }
}

/// A payment channel as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub token_address: Address,
    pub partner_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_network_address: Option<Address>,
    #[serde(with = "decimal")]
    pub channel_identifier: U256,
    #[serde(with = "decimal")]
    pub balance: U256,
    #[serde(with = "decimal")]
    pub total_deposit: U256,
    #[serde(with = "decimal", default)]
    pub total_withdraw: U256,
    pub state: ChannelState,
    #[serde(with = "decimal::small")]
    pub settle_timeout: u64,
    #[serde(with = "decimal::small")]
    pub reveal_timeout: u64,
}

impl Channel {
    pub fn can_pay(&self, amount: U256) -> bool {
        self.state.accepts_payments() && self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL_JSON: &str = r#"{
        "token_network_address": "0x3C158a20b47d9613DDb9409099Be186fC272421a",
        "channel_identifier": "14",
        "partner_address": "0x1F916ab5cf1B30B22f24Ebf435f53Ee665344Acf",
        "token_address": "0x95B2d84De40a0121061b105E6B54016a49621B44",
        "balance": "25",
        "total_deposit": "35",
        "total_withdraw": "0",
        "state": "opened",
        "settle_timeout": "500",
        "reveal_timeout": 50
    }"#;

    #[test]
    fn decodes_gateway_channel() {
        let channel: Channel = serde_json::from_str(CHANNEL_JSON).unwrap();
        assert_eq!(channel.channel_identifier, U256::from(14));
        assert_eq!(channel.balance, U256::from(25));
        assert_eq!(channel.total_deposit, U256::from(35));
        assert_eq!(channel.state, ChannelState::Opened);
        assert_eq!(channel.settle_timeout, 500);
        assert_eq!(channel.reveal_timeout, 50);
        assert!(channel.can_pay(U256::from(25)));
        assert!(!channel.can_pay(U256::from(26)));
    }

    #[test]
    fn amounts_serialize_as_decimal_strings() {
        let channel: Channel = serde_json::from_str(CHANNEL_JSON).unwrap();
        let value = serde_json::to_value(&channel).unwrap();
        assert_eq!(value["total_deposit"], "35");
        assert_eq!(value["reveal_timeout"], "50");
    }

    #[test]
    fn settled_is_closed() {
        let state: ChannelState = serde_json::from_str("\"settled\"").unwrap();
        assert_eq!(state, ChannelState::Closed);
    }

    #[test]
    fn lifecycle_is_monotonic_except_reopen() {
        use ChannelState::*;
        assert!(Unopened.can_transition_to(Opened));
        assert!(Opened.can_transition_to(Opened));
        assert!(Opened.can_transition_to(Settling));
        assert!(Opened.can_transition_to(Closed));
        assert!(Settling.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Unopened));
        assert!(Closed.can_transition_to(Opened));

        assert!(!Opened.can_transition_to(Unopened));
        assert!(!Settling.can_transition_to(Opened));
        assert!(!Closed.can_transition_to(Settling));
    }
}
