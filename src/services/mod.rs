//! Business logic behind the HTTP handlers

pub mod notification;
pub mod payout;
pub mod transaction_lifecycle;
pub mod webhook_processor;
