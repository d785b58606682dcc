pub mod auth;
pub mod efi;
pub mod error;
pub mod ids;
pub mod provider;
pub mod types;
pub mod utils;

pub use efi::EfiPixClient;
pub use error::{PixError, PixResult};
pub use provider::PixGateway;
pub use types::{Charge, PixAmount, PixRefund, PixTransfer, QrCode};
