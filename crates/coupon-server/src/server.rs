// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server combining the coupon routes, health check and request timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ApiCode, ApiError, Envelope};
use crate::routes::{AppState, coupon_routes};

/// Full application router.
///
/// Every request races `request_timeout`; a handler that loses keeps running
/// in the background while the client gets 503.
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health_routes(state.clone()))
        .merge(coupon_routes(state))
        .fallback(unsupported_url)
        .layer(middleware::from_fn_with_state(request_timeout, race_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve `router` on `addr` until `shutdown` is notified.
pub async fn serve(addr: SocketAddr, router: Router, shutdown: Arc<Notify>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Coupon HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await
}

async fn race_timeout(State(timeout): State<Duration>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let handler = tokio::spawn(next.run(request));

    match tokio::time::timeout(timeout, handler).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(method = %method, uri = %uri, error = %e, "Request handler panicked");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, ApiCode::Unknown).into_response()
        }
        Err(_) => {
            warn!(
                method = %method,
                uri = %uri,
                timeout_ms = timeout.as_millis() as u64,
                "Request timed out"
            );
            ApiError::timeout().into_response()
        }
    }
}

async fn unsupported_url() -> ApiError {
    ApiError::not_found_route()
}

// ==================
// Health
// ==================

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
struct HealthStatus {
    /// Serving gate phase.
    phase: &'static str,
    /// `ok`, `unreachable` or `disconnected`.
    database: &'static str,
}

fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Response {
    let supervisor = state.engine.supervisor();
    let gate = supervisor.gate();

    let database = match supervisor.handle() {
        Some(store) => match store.ping().await {
            Ok(()) => "ok",
            Err(_) => "unreachable",
        },
        None => "disconnected",
    };
    let status = HealthStatus {
        phase: gate.phase().as_str(),
        database,
    };

    if gate.is_serving() && database == "ok" {
        return Envelope::ok(status).into_response();
    }

    let code = ApiCode::DbNotInitialized;
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(Envelope {
            code: code.value(),
            msg: code.message().to_string(),
            data: Some(status),
        }),
    )
        .into_response()
}
