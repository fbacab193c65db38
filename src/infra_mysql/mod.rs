mod auth_repo_mysql;
mod profile_repo_mysql;
mod refresh_token_repo_mysql;
mod user_repo_mysql;
mod user_session_repo_mysql;

pub use auth_repo_mysql::*;
pub use profile_repo_mysql::*;
pub use refresh_token_repo_mysql::*;
pub use user_repo_mysql::*;
pub use user_session_repo_mysql::*;

mod repo_tx_mysql;

pub use repo_tx_mysql::*;

mod util;
