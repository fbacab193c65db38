mod blacklist_store_memory;
mod clock;
mod directory_memory;
mod notification_sender_memory;
mod session_store_memory;
mod token_repo_memory;
mod ttl_map;
mod tx_memory;

pub use blacklist_store_memory::*;
pub use clock::*;
pub use directory_memory::*;
pub use notification_sender_memory::*;
pub use session_store_memory::*;
pub use token_repo_memory::*;
pub use tx_memory::{MemoryTx, MemoryTxManager};
