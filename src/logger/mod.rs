//! Process-wide `tracing` setup: a bootstrap subscriber whose filter is
//! reloaded once settings are known. `bin/logger_demo.rs` shows both stages.
//!
//! Security-relevant events are logged with `target: "audit"`, so a filter
//! such as `info,audit=warn` can route them separately.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
