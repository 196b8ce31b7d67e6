// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon Server - HTTP API for single-use coupons
//!
//! Wraps [`coupon_core::CouponEngine`] in an axum router. Callers are
//! identified through the platform's user endpoint, redemptions are credited
//! through the billing service, and every response uses the
//! `{code, msg, data}` envelope.
//!
//! # Modules
//!
//! - [`config`]: environment configuration
//! - [`error`]: envelope and error codes
//! - [`identity`]: bearer credential to username
//! - [`recharge`]: billing service client
//! - [`routes`]: coupon endpoints
//! - [`server`]: router assembly, request timeout and health

pub mod config;
pub mod error;
pub mod identity;
pub mod recharge;
pub mod routes;
pub mod server;

pub use config::{Config, ConfigError};
pub use error::{ApiCode, ApiError};
pub use routes::AppState;
pub use server::build_router;
