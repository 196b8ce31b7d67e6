// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for coupon-server integration tests.
//!
//! The router runs over an in-memory SQLite engine; identity and recharge are
//! replaced by in-process stubs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use coupon_core::store::SqliteStore;
use coupon_core::upgrade::UpgradeOptions;
use coupon_core::{
    ConnectionSupervisor, Connector, CouponEngine, CouponStore, DB_NAME, EngineSettings,
    NotifyError, RechargeNotifier, RechargeRequest, ServingGate, SupervisorConfig, UPGRADERS,
};
use coupon_server::identity::{AdminUsers, IdentityError, IdentityResolver};
use coupon_server::routes::AppState;
use coupon_server::server::build_router;

pub const ADMIN_TOKEN: &str = "Bearer admin-token";
pub const USER_TOKEN: &str = "Bearer user-token";

/// Maps `Authorization` header values to usernames.
pub struct StubIdentity {
    users: HashMap<String, String>,
    pub regions: Mutex<Vec<Option<String>>>,
}

impl StubIdentity {
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert(ADMIN_TOKEN.to_string(), "admin".to_string());
        users.insert(USER_TOKEN.to_string(), "alice".to_string());
        Self {
            users,
            regions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdentityResolver for StubIdentity {
    async fn resolve(
        &self,
        authorization: &str,
        region: Option<&str>,
    ) -> Result<String, IdentityError> {
        self.regions
            .lock()
            .unwrap()
            .push(region.map(str::to_string));
        self.users
            .get(authorization)
            .cloned()
            .ok_or(IdentityError::Rejected {
                url: "stub".to_string(),
                status: 401,
            })
    }
}

/// Notifier that records requests, optionally after a delay or failing.
#[derive(Default)]
pub struct StubNotifier {
    pub requests: Mutex<Vec<RechargeRequest>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl StubNotifier {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RechargeNotifier for StubNotifier {
    async fn recharge(&self, request: &RechargeRequest) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "billing down".to_string(),
            });
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

struct FixedConnector(Arc<dyn CouponStore>);

#[async_trait]
impl Connector for FixedConnector {
    async fn connect(&self) -> Result<Arc<dyn CouponStore>, sqlx::Error> {
        Ok(self.0.clone())
    }
}

/// A router plus the pieces tests inspect.
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<CouponEngine>,
    pub identity: Arc<StubIdentity>,
    pub notifier: Arc<StubNotifier>,
}

pub struct TestAppBuilder {
    notifier: StubNotifier,
    timeout: Duration,
    serving: bool,
}

impl TestAppBuilder {
    pub fn notifier(mut self, notifier: StubNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Leave the serving gate closed.
    pub fn not_serving(mut self) -> Self {
        self.serving = false;
        self
    }

    pub async fn build(self) -> TestApp {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        let store: Arc<dyn CouponStore> = Arc::new(SqliteStore::new(pool));

        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::new(FixedConnector(store)),
            Arc::new(ServingGate::new()),
            SupervisorConfig {
                startup_attempts: 1,
                startup_spacing: Duration::from_millis(10),
                ping_interval: Duration::from_millis(20),
            },
        ));
        if self.serving {
            supervisor
                .initialize(
                    DB_NAME,
                    UPGRADERS,
                    &UpgradeOptions {
                        really_upgrade: true,
                        settle_delay: Duration::ZERO,
                    },
                )
                .await
                .expect("Failed to initialize supervisor");
        } else {
            supervisor
                .connect_with_retries()
                .await
                .expect("Failed to connect");
        }

        let engine = Arc::new(CouponEngine::new(supervisor, EngineSettings::default()));
        let identity = Arc::new(StubIdentity::new());
        let notifier = Arc::new(self.notifier);
        let state = Arc::new(AppState {
            engine: engine.clone(),
            identity: identity.clone(),
            notifier: notifier.clone(),
            admins: AdminUsers::new(vec!["admin".to_string()]),
        });

        TestApp {
            router: build_router(state, self.timeout),
            engine,
            identity,
            notifier,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            notifier: StubNotifier::default(),
            timeout: Duration::from_secs(5),
            serving: true,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Send one request; returns the status and the parsed envelope.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", token);
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Send a request with a raw (possibly malformed) body.
    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", token);
        }
        let request = request.body(Body::from(body)).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Create a coupon through the API and return its `data` object.
    pub async fn create(&self, amount: f64, days: i64) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/charge/v1/coupons",
                Some(ADMIN_TOKEN),
                Some(serde_json::json!({"amount": amount, "expire_on": days})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {body}");
        body["data"].clone()
    }
}
