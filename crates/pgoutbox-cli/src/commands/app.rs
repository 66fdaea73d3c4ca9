use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use pgoutbox_core::NewUser;
use pgoutbox_pg::{connect_postgres, store_user};
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::{error, info};

use super::shutdown_signal;
use crate::config::ProjectConfig;

#[derive(Clone)]
struct AppState {
    client: Arc<Mutex<Client>>,
}

type HandlerError = (StatusCode, String);

pub async fn cmd_app(config: ProjectConfig, bind: Option<String>) -> Result<()> {
    let client = connect_postgres(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;

    let bind = bind.unwrap_or_else(|| config.http.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(addr = %bind, "HTTP server listening");

    axum::serve(listener, router(client))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("App stopped");
    Ok(())
}

fn router(client: Client) -> Router {
    let state = AppState {
        client: Arc::new(Mutex::new(client)),
    };

    Router::new()
        .route("/users", post(create_user))
        .with_state(state)
}

async fn create_user(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, HandlerError> {
    let user = parse_user(&body)?;

    let mut client = state.client.lock().await;
    let id = store_user(&mut client, &user).await.map_err(|e| {
        error!(error = %e, "Failed to store user");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    info!(user_id = id, email = %user.email, "User created");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_user(body: &[u8]) -> Result<NewUser, HandlerError> {
    serde_json::from_slice(body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}
