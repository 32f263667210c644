// Poller service entry point: periodic pipeline plus liveness server

#[path = "repo/mod.rs"]
mod repo;
mod router;

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use pest_risk_backend::config::Config;
use pest_risk_backend::id_generator::RandomIdGenerator;
use pest_risk_backend::model::RiskClassifier;
use pest_risk_backend::pipeline::Poller;
use pest_risk_backend::time::SystemClock;
use pest_risk_backend::weather::{NasaPowerClient, WeatherEnricher};
use repo::FirebaseStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Pest risk poller starting");

    let config = Config::from_env().context("Failed to load configuration")?;

    // The model must be usable before anything is served or polled
    let classifier = RiskClassifier::load(&config.model_dir)
        .with_context(|| {
            format!(
                "Failed to load model artifacts from {}",
                config.model_dir.display()
            )
        })?
        .with_watch_ratio(config.watch_ratio);
    info!(
        model_dir = %config.model_dir.display(),
        threshold = classifier.threshold(),
        watch_ratio = ?classifier.watch_ratio(),
        "Model loaded"
    );

    let store = FirebaseStore::new(&config.store).context("Failed to create database client")?;
    let weather = NasaPowerClient::new(config.weather_api_url.clone(), config.weather_timeout)
        .context("Failed to create weather client")?;

    let poller = Poller::new(
        store,
        WeatherEnricher::new(weather, config.weather_lookback_days),
        classifier,
        config.pipeline_settings(),
        Box::new(SystemClock::new()),
        Box::new(RandomIdGenerator::new()),
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health server to {}", addr))?;
    let server = axum::serve(listener, router::build_router(Arc::new(RandomIdGenerator::new())))
        .into_future();
    info!(addr = %addr, "Health server listening");

    info!(
        interval_secs = config.poll_interval.as_secs(),
        "Starting poll loop"
    );

    tokio::select! {
        result = server => {
            result.context("Health server failed")?;
        }
        _ = poller.run(config.poll_interval) => {
            error!("Poll loop exited");
        }
        _ = shutdown_signal() => {}
    }

    info!("Pest risk poller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
