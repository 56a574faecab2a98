//! Gateway entry point: configuration → telemetry → pipeline → serve.

use std::sync::Arc;

use sentinel_gateway::api::router::{AppState, metrics_router, router};
use sentinel_gateway::config::GatewayConfig;
use sentinel_gateway::filters::pipeline::FilterPipeline;
use sentinel_gateway::proxy::handler::ProxyHandler;
use sentinel_gateway::telemetry;
use sentinel_gateway::telemetry::stats::StatsStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(GatewayConfig::from_env()?);

    telemetry::init(&config);

    let metrics_handle = if config.metrics_enabled {
        Some(telemetry::metrics::install(env!("CARGO_PKG_VERSION"))?)
    } else {
        None
    };

    // Singletons are constructed once here and passed through state;
    // nothing request-scoped is shared.
    let pipeline = Arc::new(FilterPipeline::with_default_filters(&config)?);
    let proxy = Arc::new(ProxyHandler::new(config.clone()));
    let stats = Arc::new(StatsStore::new(config.injection_threshold));

    let state = AppState {
        config: config.clone(),
        pipeline,
        proxy: proxy.clone(),
        stats,
        metrics: metrics_handle.clone(),
    };

    // Dedicated exposition listener so scrapers that expect an isolated
    // metrics port work unchanged.
    if let Some(handle) = metrics_handle {
        let addr = format!("{}:{}", config.host, config.metrics_port);
        let exposition = metrics_router(handle);
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, exposition).await {
                        tracing::error!(error = %e, "metrics listener failed");
                    }
                }
                Err(e) => {
                    tracing::error!(addr = %addr, error = %e, "metrics listener bind failed");
                }
            }
        });
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.default_provider,
        metrics_enabled = config.metrics_enabled,
        "gateway listening",
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    proxy.close().await;
    tracing::info!("gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
