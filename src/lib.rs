pub mod api;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
