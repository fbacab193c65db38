// store

mod blacklist_store;
mod session_store;

pub use blacklist_store::*;
pub use session_store::*;

// repo

mod auth_repo;
mod profile_repo;
mod refresh_token_repo;
mod user_repo;
mod user_session_repo;

mod repo_tx;

pub use auth_repo::*;
pub use profile_repo::*;
pub use refresh_token_repo::*;
pub use user_repo::*;
pub use user_session_repo::*;

pub use repo_tx::*;

// outbound

mod clock;
mod notification_sender;

pub use clock::*;
pub use notification_sender::*;
