//! # settle-cart checkout server
//!
//! ## Usage
//!
//! ```bash
//! # Optional: card and wallet gateways
//! export STRIPE_SECRET_KEY=sk_test_...
//! export PAYPAL_CLIENT_ID=...
//! export PAYPAL_CLIENT_SECRET=...
//!
//! # Persist to SQLite instead of memory
//! export DATABASE_URL=sqlite://settle.db
//!
//! # Run the server
//! checkout-server
//! ```

use checkout_api::{routes, AppConfig, AppState, LogFormat};
use checkout_core::Logger;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }

    print_banner();

    let logger = Logger::init_global(config.log_min_level, config.log_buffer_size);
    let addr = config.socket_addr()?;
    let is_prod = config.is_production();

    let state = AppState::from_config(config, logger).await?;

    info!("Environment: {}", state.config.environment);
    info!("Datastore: {}", state.config.database_url);
    info!("Payment providers: {:?}", state.payments.factory().supported());
    info!("Shipping methods: {:?}", state.shipping.names());

    let app = routes::create_router(state);

    info!("🚀 settle-cart starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("💳 Checkout: POST http://{}/api/v1/checkout", addr);
        info!("🚚 Shipping: GET http://{}/api/v1/shipping/options?subtotal=100000", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn print_banner() {
    println!(
        r#"
  🛒 settle-cart RS 🛒
  ━━━━━━━━━━━━━━━━━━━━━━━
  Checkout settlement pipeline
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
