pub mod metered;

pub use metered::MeteredClient;
