mod credential_hasher;
mod jwt_codec;
mod login_service_impl;
mod notification_dispatcher;
mod otp_codec;
mod otp_flow;
mod registration_service_impl;
mod token_hasher;
mod token_service_impl;
mod validation;

#[cfg(test)]
mod test_support;

pub use credential_hasher::{Argon2Cost, Argon2PasswordHasher};
pub use jwt_codec::*;
pub use login_service_impl::*;
pub use notification_dispatcher::*;
pub use otp_codec::*;
pub use otp_flow::{OtpFlowConfig, RateLimitPolicy};
pub use registration_service_impl::*;
pub use token_hasher::*;
pub use token_service_impl::{RealTokenService, TokenDeps, TokenServiceConfig};
pub use validation::{MINIMUM_AGE, PasswordPolicy};
