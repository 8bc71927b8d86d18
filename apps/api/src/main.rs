mod catalog;
mod config;
mod db;
mod entitlement;
mod errors;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::catalog::ProductCatalog;
use crate::config::Config;
use crate::db::create_pool;
use crate::entitlement::ledger::PgPurchaseLedger;
use crate::entitlement::payment::{GatewayVerifier, PaymentVerifier, TrustedConfirmation};
use crate::entitlement::service::{EntitlementService, ReadRetryPolicy};
use crate::entitlement::store::PgEntitlementStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("paywall_api={},audit={}", &config.rust_log, &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Paywall API v{}", env!("CARGO_PKG_VERSION"));

    // Catalog is fixed for the lifetime of the process
    let catalog = match &config.catalog_path {
        Some(path) => ProductCatalog::from_file(path)?,
        None => ProductCatalog::default(),
    };
    info!(
        "Product catalog loaded: {}",
        catalog.tool_ids().collect::<Vec<_>>().join(", ")
    );

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    let verifier: Arc<dyn PaymentVerifier> =
        match (&config.payment_verify_url, &config.payment_api_key) {
            (Some(url), Some(key)) => {
                info!("Payment tokens verified against gateway at {url}");
                Arc::new(GatewayVerifier::new(url.clone(), key.clone())?)
            }
            _ => {
                info!("Payment tokens trusted as supplied by checkout (no gateway verification)");
                Arc::new(TrustedConfirmation)
            }
        };

    let entitlements = EntitlementService::new(
        Arc::new(PgEntitlementStore::new(db.clone())),
        Arc::new(PgPurchaseLedger::new(db)),
        catalog,
    )
    .with_verifier(verifier)
    .with_term_days(config.entitlement_term_days)
    .with_read_retry(ReadRetryPolicy {
        attempts: config.read_retry_attempts,
        base_delay: Duration::from_millis(config.read_retry_base_ms),
    });

    // Build app state
    let state = AppState {
        entitlements: Arc::new(entitlements),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web app's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
