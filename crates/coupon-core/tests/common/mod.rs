// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for coupon-core integration tests.
//!
//! Everything runs against a single-connection in-memory SQLite pool, so the
//! schema lives exactly as long as the pool.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;

use coupon_core::model::{CreateCoupon, CreatedCoupon};
use coupon_core::store::SqliteStore;
use coupon_core::{
    ConnectionSupervisor, Connector, CouponEngine, CouponStore, DB_NAME, EngineSettings,
    NotifyError, RechargeNotifier, RechargeRequest, ServingGate, SupervisorConfig, UPGRADERS,
    UpgradeOptions,
};

/// Fresh in-memory SQLite store without any tables.
pub async fn sqlite_store() -> Arc<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    Arc::new(SqliteStore::new(pool))
}

/// Connector that always hands out the same store.
pub struct FixedConnector {
    store: Arc<dyn CouponStore>,
    pub calls: AtomicUsize,
}

impl FixedConnector {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self {
            store,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for FixedConnector {
    async fn connect(&self) -> Result<Arc<dyn CouponStore>, sqlx::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}

/// Supervisor timings small enough for tests.
pub fn fast_supervisor_config() -> SupervisorConfig {
    SupervisorConfig {
        startup_attempts: 3,
        startup_spacing: Duration::from_millis(10),
        ping_interval: Duration::from_millis(20),
    }
}

/// Upgrade options without the settle delay.
pub fn fast_upgrade_options() -> UpgradeOptions {
    UpgradeOptions {
        really_upgrade: true,
        settle_delay: Duration::ZERO,
    }
}

/// Engine over an initialized in-memory store, plus the store itself.
pub async fn serving_engine() -> (Arc<CouponEngine>, Arc<dyn CouponStore>) {
    let store: Arc<dyn CouponStore> = sqlite_store().await;
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::new(FixedConnector::new(store.clone())),
        Arc::new(ServingGate::new()),
        fast_supervisor_config(),
    ));
    supervisor
        .initialize(DB_NAME, UPGRADERS, &fast_upgrade_options())
        .await
        .expect("Failed to initialize supervisor");

    let engine = CouponEngine::new(supervisor, EngineSettings::default());
    (Arc::new(engine), store)
}

/// Create a coupon worth `amount` expiring `days` from now.
pub async fn create_coupon(engine: &CouponEngine, amount: i64, days: i64) -> CreatedCoupon {
    engine
        .create(CreateCoupon {
            kind: None,
            amount: Decimal::from(amount),
            expire_on: engine.expiry_after_days(Utc::now(), days).unwrap(),
        })
        .await
        .expect("Failed to create coupon")
}

/// Notifier that records requests and optionally fails.
#[derive(Default)]
pub struct RecordingNotifier {
    pub requests: Mutex<Vec<RechargeRequest>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RechargeNotifier for RecordingNotifier {
    async fn recharge(&self, request: &RechargeRequest) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "billing down".to_string(),
            });
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}
