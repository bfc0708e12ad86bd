use anyhow::{Context, Result};
use std::time::Duration;

use tracing::info;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::services::ServeDir;

use super::analytics_routes::analytics_routes;
use super::auth_routes::auth_routes;
use super::chat_routes::chat_routes;
use super::process_routes::process_routes;
use super::session::Session;
use super::{log_requests, state::ServerState};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub user_id: Option<i64>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> Json<ServerStats> {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        user_id: session.map(|s| s.user_id),
    })
}

pub fn make_app(state: ServerState) -> Router {
    let mut app: Router<ServerState> = Router::new()
        .route("/", get(home))
        .nest("/auth", auth_routes())
        .nest("/process", process_routes(state.config.max_upload_bytes))
        .nest("/analytics", analytics_routes())
        .nest("/chat", chat_routes());

    if let Some(media_dir) = &state.config.media_dir {
        app = app.nest_service("/media", ServeDir::new(media_dir));
    }

    app.layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Could not bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
