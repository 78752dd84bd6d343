pub mod confirm;

pub use confirm::{confirm_payment_layer, PaymentGate};
