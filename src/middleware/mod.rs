pub mod error;
pub mod logging;
pub mod webhook_auth;
