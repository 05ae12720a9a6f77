//! Admin web surface.
//!
//! Every `/admin` route sits behind the [`auth::require_operator`] gate. Actions are plain HTML
//! form posts that perform one lifecycle step and redirect back to the list, so the page always
//! shows the stored state. `/api/health` is left open for load balancers.

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AdminCredentials;
use crate::console::GrantConsole;

pub mod auth;
mod error;
mod handlers;
pub mod render;

pub use auth::CredentialGate;

pub const ADMIN_PATH: &str = "/admin";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub console: GrantConsole,
    pub gate: CredentialGate,
}

impl AppState {
    pub fn new(console: GrantConsole, admin: &AdminCredentials) -> Self {
        Self {
            console,
            gate: CredentialGate::new(admin),
        }
    }
}

/// Build the console's router.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route(ADMIN_PATH, get(handlers::list_requests))
        .route("/admin/new", post(handlers::create_request))
        .route("/admin/run/{id}", post(handlers::run_request))
        .route("/admin/download/{id}", get(handlers::download_report))
        .route("/admin/delivered/{id}", post(handlers::deliver_request))
        .route("/admin/archive/{id}", post(handlers::archive_request))
        .route("/admin/delete/{id}", post(handlers::delete_request))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_operator,
        ));

    Router::new()
        .merge(admin)
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}
