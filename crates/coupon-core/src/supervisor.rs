// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Owner of the shared database handle.
//!
//! The handle lives in a slot guarded by a short, never-awaited lock. A
//! background loop pings it and swaps in a fresh pool when the ping fails.
//! A failed reconnect leaves the previous handle in place.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::{CouponError, SupervisorError};
use crate::gate::ServingGate;
use crate::store::{self, CouponStore};
use crate::upgrade::{SchemaUpgrader, UpgradeOptions, upgrade_database};

/// Opens new database handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a handle.
    async fn connect(&self) -> Result<Arc<dyn CouponStore>, sqlx::Error>;
}

/// Connector for a database URL.
#[derive(Debug, Clone)]
pub struct UrlConnector {
    url: String,
    max_connections: u32,
}

impl UrlConnector {
    /// Connector for `url` with a pool of `max_connections`.
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
        }
    }
}

#[async_trait]
impl Connector for UrlConnector {
    async fn connect(&self) -> Result<Arc<dyn CouponStore>, sqlx::Error> {
        store::connect(&self.url, self.max_connections).await
    }
}

/// Timing for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Connection attempts at startup before giving up.
    pub startup_attempts: u32,
    /// Pause between startup attempts.
    pub startup_spacing: Duration,
    /// Interval between health checks.
    pub ping_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_attempts: 3,
            startup_spacing: Duration::from_secs(10),
            ping_interval: Duration::from_secs(5),
        }
    }
}

/// Shared handle plus its health-check loop.
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    slot: RwLock<Option<Arc<dyn CouponStore>>>,
    gate: Arc<ServingGate>,
    config: SupervisorConfig,
    shutdown: Arc<Notify>,
}

impl ConnectionSupervisor {
    /// New supervisor with an empty slot.
    pub fn new(
        connector: Arc<dyn Connector>,
        gate: Arc<ServingGate>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            connector,
            slot: RwLock::new(None),
            gate,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Serving gate consulted by [`current`](Self::current).
    pub fn gate(&self) -> &Arc<ServingGate> {
        &self.gate
    }

    /// Handle that stops [`run`](Self::run).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// The handle, if the gate allows serving and one is connected.
    pub fn current(&self) -> Result<Arc<dyn CouponStore>, CouponError> {
        let phase = self.gate.phase();
        if !self.gate.is_serving() {
            return Err(CouponError::ServiceUnavailable(format!(
                "service is {}",
                phase.as_str()
            )));
        }
        self.handle().ok_or_else(|| {
            CouponError::ServiceUnavailable("database is not connected".to_string())
        })
    }

    /// The handle regardless of the gate.
    pub fn handle(&self) -> Option<Arc<dyn CouponStore>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, store: Arc<dyn CouponStore>) -> Option<Arc<dyn CouponStore>> {
        self.slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(store)
    }

    /// Connect, retrying per [`SupervisorConfig`]. Stores and returns the handle.
    pub async fn connect_with_retries(&self) -> Result<Arc<dyn CouponStore>, SupervisorError> {
        let attempts = self.config.startup_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connector.connect().await {
                Ok(store) => {
                    info!(attempt, "Connected to database");
                    self.replace(store.clone());
                    return Ok(store);
                }
                Err(e) if attempt >= attempts => {
                    error!(attempt, error = %e, "Giving up connecting to database");
                    return Err(SupervisorError::ConnectFailed {
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        retry_in_secs = self.config.startup_spacing.as_secs(),
                        error = %e,
                        "Failed to connect to database"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.startup_spacing).await;
                }
            }
        }
    }

    /// Connect and bring the schema up to date. The gate is serving on success.
    pub async fn initialize(
        &self,
        db_name: &str,
        chain: &[&dyn SchemaUpgrader],
        options: &UpgradeOptions,
    ) -> Result<(), SupervisorError> {
        let store = self.connect_with_retries().await?;
        upgrade_database(store.as_ref(), db_name, chain, &self.gate, options).await?;
        Ok(())
    }

    /// One health check: ping, and reconnect if the ping fails or no handle exists.
    pub async fn check_once(&self) {
        match self.handle() {
            Some(store) => match store.ping().await {
                Ok(()) => debug!("Database ping ok"),
                Err(e) => {
                    warn!(error = %e, "Database ping failed, reconnecting");
                    self.reconnect().await;
                }
            },
            None => {
                warn!("No database handle, connecting");
                self.reconnect().await;
            }
        }
    }

    async fn reconnect(&self) {
        match self.connector.connect().await {
            Ok(store) => {
                info!("Reconnected to database");
                if let Some(old) = self.replace(store) {
                    tokio::spawn(async move { old.close().await });
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to reconnect to database, keeping previous handle");
            }
        }
    }

    /// Health-check loop. Exits when the shutdown handle is notified.
    pub async fn run(&self) {
        info!(
            ping_interval_secs = self.config.ping_interval.as_secs(),
            "Connection supervisor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Connection supervisor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.ping_interval) => {
                    self.check_once().await;
                }
            }
        }

        info!("Connection supervisor stopped");
    }
}
