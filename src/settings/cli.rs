use super::Parser;

/// Session and token lifecycle engine.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Settings file; the build profile picks dev.toml or release.toml when omitted.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<String>,
}
