use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use nexus_facilitator_local::util::{SigDown, Telemetry};
use nexus_facilitator_local::{FacilitatorLocal, handlers};
use nexus_registry::ServiceRegistry;
use nexus_types::chain::ChainRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use crate::config::Config;
use crate::{chain, discovery};

/// Starts the Nexus facilitator server.
///
/// - Loads `.env` variables.
/// - Initializes logging, and OpenTelemetry export when enabled.
/// - Builds the chain registry, settlement providers and ledger backend.
/// - Attaches the on-chain service registry when an address is configured.
/// - Serves the HTTP API until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .is_err()
    {
        tracing::warn!("A rustls crypto provider was already installed");
    }

    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();
    let telemetry_layer = telemetry.http_tracing();

    let config = Config::load()?;

    let chain_registry = Arc::new(ChainRegistry::from_config(config.chains())?);
    let settlement = chain::settlement_registry(&chain_registry, &config).await?;
    let ledger = chain::ledger_store(&config).await?;

    let facilitator = FacilitatorLocal::new(chain_registry.clone(), ledger, settlement)
        .with_settlement_timeout(config.settlement_timeout());
    if facilitator.is_demo_mode() {
        tracing::warn!("Running in demo mode, no payment is settled on-chain");
    }

    let service_registry = match config.registry_address()? {
        Some(address) => match config.registry_chain_id() {
            Some(chain_id) => {
                let chain = chain_registry.config_for(chain_id)?;
                ServiceRegistry::connect(address, [chain])?
            }
            None => ServiceRegistry::connect(address, chain_registry.iter())?,
        },
        None => {
            tracing::info!("No REGISTRY_ADDRESS configured, serving the built-in service catalog");
            ServiceRegistry::new()
        }
    };

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(Arc::new(facilitator)))
        .merge(discovery::routes().with_state(Arc::new(service_registry)))
        .layer(telemetry_layer)
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
