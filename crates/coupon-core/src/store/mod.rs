// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage interface and backends.
//!
//! Every coupon transition is a conditional `UPDATE … WHERE status = <expected>`
//! with the affected-row count checked, inside one transaction per operation.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;

use crate::error::{CouponError, StatError};
use crate::model::{
    CouponPage, CouponQuery, CouponRecord, CouponView, NewCoupon, ProvisionRequest,
    RedeemReceipt, Redemption, WithdrawOutcome,
};
use crate::notify::RechargeNotifier;

/// Database engine behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

/// Coupon table, recipient table and counters.
///
/// Identifiers passed in are already in storage (lowercase) form.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Engine behind this store.
    fn backend(&self) -> Backend;

    /// Round-trip to the database.
    async fn ping(&self) -> Result<(), sqlx::Error>;

    /// Close the pool. Later calls fail.
    async fn close(&self);

    /// Run a multi-statement script (DDL).
    async fn execute_script(&self, script: &str) -> Result<(), sqlx::Error>;

    // ========== Counters ==========

    /// Counter value, 0 when absent.
    async fn get_stat(&self, key: &str) -> Result<i64, StatError>;

    /// Unconditional overwrite. Returns the stored value.
    async fn set_stat(&self, key: &str, value: i64) -> Result<i64, StatError>;

    /// Compare-and-set. A missing row matches only `expected == 0`.
    async fn set_stat_if(&self, key: &str, value: i64, expected: i64) -> Result<i64, StatError>;

    /// Add `delta`. Returns the stored value.
    async fn update_stat(&self, key: &str, delta: i64) -> Result<i64, StatError>;

    /// Delete a counter, returning its last value (0 when absent).
    async fn remove_stat(&self, key: &str) -> Result<i64, StatError>;

    /// All counters, ordered by key.
    async fn list_stats(&self) -> Result<Vec<(String, i64)>, StatError>;

    // ========== Coupons ==========

    /// Insert an `available` coupon. Unique violations surface as database errors.
    async fn insert_coupon(&self, coupon: &NewCoupon) -> Result<(), CouponError>;

    /// `available -> unavailable`.
    async fn withdraw_coupon(&self, serial: &str) -> Result<WithdrawOutcome, CouponError>;

    /// Mark `available -> queried` and return the row with its prior status.
    async fn retrieve_by_code(&self, code: &str) -> Result<Option<CouponView>, CouponError>;

    /// Reserve exactly `count` available coupons. Returns their codes.
    async fn provision(&self, request: &ProvisionRequest) -> Result<Vec<String>, CouponError>;

    /// Redeem a coupon, calling `notifier` inside the open transaction.
    async fn redeem(
        &self,
        redemption: &Redemption,
        storage_offset: FixedOffset,
        notifier: &dyn RechargeNotifier,
    ) -> Result<RedeemReceipt, CouponError>;

    /// One page of coupons plus the total count.
    async fn list_coupons(&self, query: &CouponQuery) -> Result<CouponPage, CouponError>;

    /// Full row for a serial.
    async fn get_coupon(&self, serial: &str) -> Result<Option<CouponRecord>, CouponError>;
}

/// Open a pool for `url` and wrap it in the matching backend.
///
/// `sqlite:` URLs select SQLite; anything else is treated as PostgreSQL.
pub async fn connect(url: &str, max_connections: u32) -> Result<Arc<dyn CouponStore>, sqlx::Error> {
    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url, max_connections).await?;
        Ok(Arc::new(store))
    } else {
        let store = PostgresStore::connect(url, max_connections).await?;
        Ok(Arc::new(store))
    }
}

/// Whether `err` is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Outcome of a withdraw that updated zero rows, given the row's status.
pub(crate) fn withdraw_miss(
    serial: &str,
    status: Option<crate::model::CouponStatus>,
) -> Result<WithdrawOutcome, CouponError> {
    use crate::model::CouponStatus;
    match status {
        None => Err(CouponError::NotFound {
            key: serial.to_string(),
        }),
        Some(CouponStatus::Unavailable) => Ok(WithdrawOutcome::AlreadyWithdrawn),
        Some(CouponStatus::Available) => Err(CouponError::Conflict(format!(
            "coupon '{}' changed while being withdrawn",
            serial
        ))),
        Some(from) => Err(CouponError::InvalidTransition {
            serial: serial.to_string(),
            from,
            to: CouponStatus::Unavailable,
        }),
    }
}
