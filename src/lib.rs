pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use error::{MeterError, Result};
