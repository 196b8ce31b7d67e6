// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recharge side effect invoked inside the redemption transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Credit request sent when a coupon is redeemed.
#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRequest {
    /// Namespace to credit.
    pub namespace: String,
    /// Amount to credit.
    pub amount: Decimal,
    /// Reason recorded by the billing service (the coupon serial).
    pub reason: String,
    /// Redeeming user.
    pub username: String,
    /// Region/tenant hint.
    pub region: Option<String>,
}

/// Recharge failures. Any of them rolls the redemption back.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum NotifyError {
    /// The request could not be delivered.
    #[error("recharge request failed: {0}")]
    Transport(String),

    /// The billing service answered with a non-success status.
    #[error("recharge rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// No recharge endpoint is configured.
    #[error("recharge endpoint is not configured")]
    NotConfigured,
}

/// External credit operation, called while the redemption transaction is open.
///
/// Returning an error rolls back the redemption, leaving the coupon in the
/// status it had before the attempt.
#[async_trait]
pub trait RechargeNotifier: Send + Sync {
    /// Credit `request.amount` to `request.namespace`.
    async fn recharge(&self, request: &RechargeRequest) -> Result<(), NotifyError>;
}
