//! Layered TOML settings with environment overrides for secrets.
//! `bin/settings_demo.rs` prints what a given file resolves to.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
