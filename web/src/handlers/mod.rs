//! HTTP request handlers.

pub mod health;
pub mod installations;
pub mod invoices;

pub use health::{health_check, readiness_check};
