use std::{net::SocketAddr, str::FromStr};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    Res,
    api::{self, AppState},
    config::Settings,
};

/// Every route of the service, bound to `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/auth/login", get(api::login))
        .route("/api/auth/callback", get(api::callback))
        .route("/api/auth/logout", get(api::logout).post(api::logout))
        .route("/api/me", get(api::me))
        .route("/api/playlist/generate", post(api::generate))
        .route("/api/playlist/publish", post(api::publish))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `SERVER_ADDRESS` and serves until the process is stopped.
pub async fn start_api_server(settings: Settings) -> Res<()> {
    let listener = bind(&settings.server_addr).await?;
    serve(listener, &settings).await
}

/// Binds the listen address without serving yet.
///
/// # Errors
///
/// Fails when the address cannot be parsed or bound.
pub async fn bind(server_addr: &str) -> Res<TcpListener> {
    let addr = SocketAddr::from_str(server_addr)
        .map_err(|e| format!("Failed to parse server address '{server_addr}': {e}"))?;
    Ok(TcpListener::bind(&addr).await?)
}

pub async fn serve(listener: TcpListener, settings: &Settings) -> Res<()> {
    let app = create_router(AppState::from_settings(settings));
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
