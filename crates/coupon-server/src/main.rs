// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon Server
//!
//! Connects to the coupon database, brings its schema to the latest version,
//! keeps the connection healthy and serves the coupon HTTP API.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coupon_core::{
    ConnectionSupervisor, CouponEngine, DB_NAME, EngineSettings, ServingGate, SupervisorConfig,
    UPGRADERS, UpgradeOptions, UrlConnector,
};
use coupon_server::config::Config;
use coupon_server::identity::{AdminUsers, HttpIdentityResolver};
use coupon_server::recharge::HttpRechargeNotifier;
use coupon_server::routes::AppState;
use coupon_server::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coupon_server=info,coupon_core=info,tower_http=info".into());
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }
    if config.admin_users.is_empty() {
        warn!("ADMINUSERS is empty; administrative endpoints will refuse every caller");
    }
    if config.recharge_addr.is_none() {
        warn!("RECHARGE_API_ADDR is not set; every redemption will fail");
    }

    info!(
        http_addr = %config.http_addr,
        max_connections = config.max_connections,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        upgrade_tables = config.upgrade_tables,
        "Starting Coupon Server"
    );

    // Connect and upgrade the schema; the gate opens when this returns
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::new(UrlConnector::new(
            config.database_url.clone(),
            config.max_connections,
        )),
        Arc::new(ServingGate::new()),
        SupervisorConfig::default(),
    ));
    let options = UpgradeOptions {
        really_upgrade: config.upgrade_tables,
        ..UpgradeOptions::default()
    };
    supervisor.initialize(DB_NAME, UPGRADERS, &options).await?;
    info!(phase = supervisor.gate().phase().as_str(), "Database ready");

    let monitor = supervisor.clone();
    let monitor_handle = tokio::spawn(async move { monitor.run().await });

    let engine = Arc::new(CouponEngine::new(
        supervisor.clone(),
        EngineSettings::with_offset_hours(config.storage_offset_hours)?,
    ));
    let state = Arc::new(AppState {
        engine,
        identity: Arc::new(HttpIdentityResolver::new(
            config.identity_host.clone(),
            config.region_hosts.clone(),
        )?),
        notifier: Arc::new(HttpRechargeNotifier::new(
            config.recharge_addr.clone(),
            config.recharge_token.clone(),
        )?),
        admins: AdminUsers::new(config.admin_users.clone()),
    });

    let router = server::build_router(state, config.request_timeout);
    let http_shutdown = Arc::new(Notify::new());
    let http_handle = tokio::spawn(server::serve(
        config.http_addr,
        router,
        http_shutdown.clone(),
    ));

    info!(addr = %config.http_addr, "Coupon Server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    http_shutdown.notify_one();
    http_handle.await??;

    supervisor.shutdown_handle().notify_one();
    monitor_handle.await?;

    if let Some(store) = supervisor.handle() {
        store.close().await;
    }

    info!("Coupon Server shut down");

    Ok(())
}
