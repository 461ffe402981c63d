use std::{net::SocketAddr, sync::Arc};

use pm_today::{
    dashboard_router, init_logging, loader_config_from_env, log_app_bind, log_app_start,
    log_source_selected, logging_config_from_env, system_clock, DataLoader, SourceFetcher,
    ViewController,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let addr: SocketAddr = std::env::var("PMT_SERVER_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8090".to_string())
        .parse()?;

    let loader_cfg = loader_config_from_env()?;
    log_source_selected(&loader_cfg.source, loader_cfg.timeout_ms);

    let fetcher = SourceFetcher::from_config(&loader_cfg)?;
    let controller = Arc::new(ViewController::spawn(
        DataLoader::new(fetcher, &loader_cfg),
        system_clock(),
    ));

    let app = dashboard_router(controller.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.teardown();
    Ok(())
}

async fn shutdown_signal() {
    // An error here means no handler could be installed; serve until killed.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
