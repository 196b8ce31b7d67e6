// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon Core - single-use coupon lifecycle engine
//!
//! This crate issues, provisions and redeems single-use value coupons stored
//! in one relational table. Correctness under concurrent writers comes only
//! from conditional updates and transaction boundaries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  coupon-server (HTTP API)                    │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CouponEngine                          │
//! │     create / delete / retrieve / provision / redeem / list   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ current()
//!                               ▼
//! ┌───────────────────────┐          ┌──────────────────────────┐
//! │ ConnectionSupervisor  │─────────►│       ServingGate        │
//! │  ping every 5s        │  reads   │ unknown/serving/upgrading│
//! └───────────────────────┘          └──────────────────────────┘
//!            │                                    ▲ writes
//!            ▼                                    │
//! ┌───────────────────────┐          ┌──────────────────────────┐
//! │     CouponStore       │◄─────────│   Schema upgrader chain  │
//! │  PostgreSQL / SQLite  │          │  version/phase counters  │
//! └───────────────────────┘          └──────────────────────────┘
//! ```
//!
//! # Startup
//!
//! 1. [`supervisor::ConnectionSupervisor::initialize`] connects (3 attempts,
//!    10 s apart) and runs [`upgrade::upgrade_database`].
//! 2. The upgrader creates missing tables, seeds or advances the persisted
//!    version, and opens the [`gate::ServingGate`].
//! 3. [`supervisor::ConnectionSupervisor::run`] keeps the handle healthy.
//!
//! # Modules
//!
//! - [`codes`]: serial/code generation and case normalization
//! - [`engine`]: lifecycle operations
//! - [`error`]: error types
//! - [`gate`]: process-wide serving gate
//! - [`lifecycle`]: state machine rules and expiry checks
//! - [`model`]: coupon records and request/response types
//! - [`notify`]: recharge side-effect interface
//! - [`stats`]: counter keys and compare-and-set rules
//! - [`store`]: storage trait with PostgreSQL and SQLite backends
//! - [`supervisor`]: shared handle and health checks
//! - [`upgrade`]: versioned schema upgrades

#![deny(missing_docs)]

/// Serial and code generation.
pub mod codes;

/// Coupon lifecycle operations.
pub mod engine;

/// Error types for coupon operations and startup.
pub mod error;

/// Process-wide serving gate.
pub mod gate;

/// Coupon state machine.
pub mod lifecycle;

/// Coupon records and request/response types.
pub mod model;

/// Recharge side-effect interface.
pub mod notify;

/// Counter keys and compare-and-set rules.
pub mod stats;

/// Storage trait and backends.
pub mod store;

/// Shared database handle and health checks.
pub mod supervisor;

/// Versioned schema upgrades.
pub mod upgrade;

pub use engine::{CouponEngine, EngineSettings};
pub use error::{CouponError, Result, StatError, SupervisorError, UpgradeError};
pub use gate::{Phase, ServingGate};
pub use model::CouponStatus;
pub use notify::{NotifyError, RechargeNotifier, RechargeRequest};
pub use store::{Backend, CouponStore};
pub use supervisor::{ConnectionSupervisor, Connector, SupervisorConfig, UrlConnector};
pub use upgrade::{SchemaUpgrader, UPGRADERS, UpgradeOptions};

/// Logical database name used for the version and phase counters.
pub const DB_NAME: &str = "datafoundry:coupon";
