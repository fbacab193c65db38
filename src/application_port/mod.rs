mod crypto;
mod error;
mod login_service;
mod otp_flow;
mod registration_service;
mod token_service;

pub use crypto::*;
pub use error::*;
pub use login_service::*;
pub use otp_flow::*;
pub use registration_service::*;
pub use token_service::*;
