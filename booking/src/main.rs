//! PG Stay booking HTTP server.

use anyhow::Context;
use pgstay_booking::{
    BookingEnvironment, BookingReducer, BookingService, BookingState, BookingStore, Config, InMemorySessions,
    LogNotifier, MockPaymentGateway, PaymentGateway, RazorpayGateway,
    config::GatewayMode,
    server::{AppState, build_router},
    sessions,
};
use pgstay_core::environment::{Clock, SystemClock};
use pgstay_runtime::metrics::MetricsExporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        address = %config.bind_address(),
        gateway = ?config.gateway.mode,
        currency = %config.gateway.currency,
        "Starting PG Stay booking server"
    );

    let metrics = if config.observability.metrics_enabled {
        Some(MetricsExporter::install().context("Failed to install metrics exporter")?)
    } else {
        None
    };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
        GatewayMode::Mock => {
            warn!("Using the mock payment gateway; payments are not real");
            Arc::new(MockPaymentGateway::new(config.gateway.key_secret.clone()))
        }
        GatewayMode::Razorpay => Arc::new(
            RazorpayGateway::new(
                config.gateway.base_url.clone(),
                config.gateway.key_id.clone(),
                config.gateway.key_secret.clone(),
                Duration::from_secs(config.gateway.timeout),
            )
            .context("Failed to build Razorpay client")?,
        ),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let environment = BookingEnvironment::new(clock.clone(), gateway, Arc::new(LogNotifier))
        .with_currency(config.gateway.currency.clone());
    let store: BookingStore = BookingStore::with_broadcast_capacity(
        BookingState::new(),
        BookingReducer::new(),
        environment,
        config.runtime.broadcast_capacity,
    );

    let directory = Arc::new(InMemorySessions::new());
    let service = BookingService::new(store, clock, directory.clone())
        .with_request_timeout(config.request_timeout())
        .with_due_period_days(config.booking.due_period_days);

    if let Some(path) = &config.booking.sessions_file {
        let seeds = sessions::load_seed_file(path)?;
        for seed in &seeds {
            service
                .register_account(seed.account())
                .await
                .with_context(|| format!("Failed to register seeded account {}", seed.email))?;
            directory.insert(seed.token.clone(), seed.user_id);
        }
        info!(count = seeds.len(), path = %path.display(), "Sessions loaded");
    } else {
        warn!("No sessions file configured; every API call will be rejected as unauthenticated");
    }

    let mut state = AppState::new(service.clone());
    if let Some(exporter) = metrics {
        state = state.with_metrics(exporter);
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, draining in-flight effects");
    if let Err(e) = service.shutdown(config.shutdown_timeout()).await {
        error!(error = %e, "Shutdown did not complete cleanly");
    }

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
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
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
