use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use uma_sender::config::Config;
use uma_sender::handlers::{self, AppState};
use uma_sender::invoice::DefaultInvoiceDecoder;
use uma_sender::keys::CachingKeyResolver;
use uma_sender::orchestrator::ProtocolOrchestrator;
use uma_sender::signing::VaspSigner;
use uma_sender::store::PendingRequestStore;
use uma_sender::users::ConfiguredUserService;
use uma_sender::util::{SigDown, Telemetry};

/// Starts the sending VASP server.
///
/// - Loads `.env` variables.
/// - Installs logging, and OpenTelemetry export when configured.
/// - Builds the orchestrator from the JSON configuration.
/// - Serves the HTTP routes until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize rustls crypto provider (ring)
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| "Failed to initialize rustls crypto provider")?;

    // Load .env variables
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let http = Client::new();
    let key_resolver = CachingKeyResolver::new(http.clone()).with_timeout(config.http_timeout());
    let store = Arc::new(PendingRequestStore::new(config.pending_request_ttl()));
    let orchestrator = ProtocolOrchestrator::new(
        VaspSigner::new(config.signing_private_key()),
        Arc::new(key_resolver),
        Arc::new(DefaultInvoiceDecoder),
        store,
    )
    .with_http_client(http)
    .with_http_timeout(config.http_timeout())
    .with_nonce_window(config.nonce_window())
    .with_travel_rule(config.is_subject_to_travel_rule());

    let user = config.user();
    let users = ConfiguredUserService::new(user.local_user(), user.credentials());
    if user.credentials().is_none() {
        tracing::warn!("No user credentials configured, client routes are open");
    }
    let axum_state = Arc::new(AppState {
        orchestrator,
        users: Arc::new(users),
        sending_vasp_domain: config.sending_vasp_domain().map(str::to_string),
        encryption_public_key: config.encryption_public_key(),
    });

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(telemetry.http_tracing())
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
    sig_down.recv().await;

    Ok(())
}
