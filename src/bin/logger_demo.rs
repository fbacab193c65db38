use pensionid::logger::*;

fn main() -> anyhow::Result<()> {
    // $ LOG_FORMAT=json cargo run --bin logger_demo
    let logger = Logger::new_bootstrap();
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let config = LogConfig {
        filter: "debug,audit=warn".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!("application trace log");
    debug!("application debug log");
    info!(target: "audit", "filtered audit log");
    warn!(target: "audit", user_id = "demo", "audit warning");

    Ok(())
}
