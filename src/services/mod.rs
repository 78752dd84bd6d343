pub mod channel;
pub mod gateway;
pub mod ledger;
pub mod poller;
pub mod tariff;
pub mod upstream;

pub use channel::ChannelManager;
pub use gateway::{PaymentGateway, RaidenGateway};
pub use ledger::ChargeLedger;
pub use poller::{PollState, ReceiptPoller, DEFAULT_POLL_PAUSE};
pub use tariff::{CallCategory, Tariff};
pub use upstream::UpstreamRpc;
