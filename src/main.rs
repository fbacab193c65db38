use pensionid::logger::*;
use pensionid::server::*;
use pensionid::settings::*;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let server = Server::try_new(&project_settings).await?;

    info!(run_id = %server.run_id, "engine ready, ctrl-c to stop");
    signal::ctrl_c().await?;

    let shutdown_timeout =
        std::time::Duration::from_secs(project_settings.notification.shutdown_grace_secs + 5);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => tracing::info!("server shutdown successfully"),
        Err(_) => tracing::error!("server shutdown timed out"),
    }

    Ok(())
}
