mod blacklist_store_redis;
mod json_session;
mod rate_limit_store_redis;
mod redis_args;
mod session_store_redis;

pub use blacklist_store_redis::*;
pub use rate_limit_store_redis::*;
pub use session_store_redis::*;
