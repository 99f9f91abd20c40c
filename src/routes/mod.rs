pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
