use std::path::Path;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::auth::{
    broker::AuthorizationBroker, credentials::CredentialStore, services::ServiceRegistry,
    session::SessionStore, tokens::TokenStore,
};
use crate::config::{decode_cookie_key, AppConfig};
use crate::db::SqlitePool;
use crate::repos::{sqlite::SqliteAccountsRepo, AccountsRepo};
use crate::web::{handlers, middleware::require_authenticated};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cookie_key: Key,
    pub sessions: SessionStore,
    pub accounts: Arc<dyn AccountsRepo>,
    pub credentials: CredentialStore,
    pub tokens: TokenStore,
    pub services: Arc<ServiceRegistry>,
    pub broker: AuthorizationBroker,
}

impl AppState {
    pub fn new(config: AppConfig, pool: SqlitePool) -> anyhow::Result<Self> {
        config.validate()?;
        let key_bytes = decode_cookie_key(&config.server.cookie_key_base64)?;
        let accounts: Arc<dyn AccountsRepo> = SqliteAccountsRepo::new(pool);
        let services = Arc::new(ServiceRegistry::from_config(&config));
        let tokens = TokenStore::new(accounts.clone());
        let broker = AuthorizationBroker::new(&config, services.clone(), tokens.clone())?;

        for svc in services.services() {
            if !svc.available {
                tracing::warn!(service = %svc.name, "service is missing client credentials and will be unavailable");
            }
        }

        Ok(Self {
            cookie_key: Key::from(&key_bytes),
            sessions: SessionStore::new(config.server.session_ttl_minutes),
            credentials: CredentialStore::new(accounts.clone()),
            accounts,
            tokens,
            services,
            broker,
            config: Arc::new(config),
        })
    }
}

/// Command line overrides applied on top of the loaded configuration.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub db: Option<String>,
}

pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> anyhow::Result<()> {
    // logging
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let mut config = AppConfig::load(config_path)?;
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(db) = overrides.db {
        config.db.url = db;
    }
    tracing::info!(
        db = %config.db.url,
        services = ?config.services.keys().collect::<Vec<_>>(),
        "loaded config"
    );

    let pool = crate::db::init(&config.db.url)?;
    let addr = config.server.bind_addr();
    let app = build_router(AppState::new(config, pool)?);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/authorize/{service}", get(handlers::oauth::authorize))
        .route("/callback/{service}", get(handlers::oauth::callback))
        .route("/api/tokens", get(handlers::oauth::api_tokens))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));

    Router::new()
        .route("/", get(handlers::pages::dashboard))
        .route("/healthz", get(handlers::pages::healthz))
        .route("/login", get(handlers::auth::login_form).post(handlers::auth::login))
        .route("/register", get(handlers::auth::register_form).post(handlers::auth::register))
        .route("/logout", get(handlers::auth::logout))
        .merge(protected)
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &axum::extract::Request| {
            // Callback queries carry provider codes; record the path only.
            tracing::debug_span!("request", method = %req.method(), path = %req.uri().path())
        }))
}
