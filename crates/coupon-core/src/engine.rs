// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon lifecycle operations.
//!
//! The engine normalizes and validates input, asks the supervisor for a
//! handle (failing fast when the gate is closed) and runs one store
//! transaction per call.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::codes::{display_form, generate_code, generate_serial, normalize_code, normalize_serial};
use crate::error::{CouponError, Result};
use crate::lifecycle::expiry_after_days;
use crate::model::{
    CouponPage, CouponQuery, CouponRecord, CouponView, CreateCoupon, CreatedCoupon, NewCoupon,
    ProvisionRequest, RedeemReceipt, Redemption, WithdrawOutcome,
};
use crate::notify::RechargeNotifier;
use crate::supervisor::ConnectionSupervisor;

/// Default storage offset in hours east of UTC.
pub const DEFAULT_STORAGE_OFFSET_HOURS: i32 = 8;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Offset in which expiry dates are interpreted.
    pub storage_offset: FixedOffset,
}

impl EngineSettings {
    /// Settings with a storage offset of `hours` east of UTC.
    pub fn with_offset_hours(hours: i32) -> Result<Self> {
        let storage_offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| {
            CouponError::validation("storage_offset", format!("{} hours is out of range", hours))
        })?;
        Ok(Self { storage_offset })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::with_offset_hours(DEFAULT_STORAGE_OFFSET_HOURS).unwrap_or(Self {
            storage_offset: Utc.fix(),
        })
    }
}

/// Coupon lifecycle engine.
pub struct CouponEngine {
    supervisor: Arc<ConnectionSupervisor>,
    settings: EngineSettings,
}

impl CouponEngine {
    /// Engine over `supervisor`'s handle.
    pub fn new(supervisor: Arc<ConnectionSupervisor>, settings: EngineSettings) -> Self {
        Self {
            supervisor,
            settings,
        }
    }

    /// The supervisor owning the database handle.
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Expiry date `days` from now, in the storage offset.
    pub fn expiry_after_days(&self, now: DateTime<Utc>, days: i64) -> Result<NaiveDate> {
        expiry_after_days(now, days, self.settings.storage_offset).ok_or_else(|| {
            CouponError::validation("expire_on", format!("{} days is out of range", days))
        })
    }

    /// Create an `available` coupon.
    pub async fn create(&self, request: CreateCoupon) -> Result<CreatedCoupon> {
        check_amount(request.amount)?;
        let kind = request
            .kind
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());

        let store = self.supervisor.current()?;
        let coupon = NewCoupon {
            serial: generate_serial(),
            code: generate_code(),
            kind,
            amount: request.amount,
            expire_on: request.expire_on,
        };
        store.insert_coupon(&coupon).await?;

        info!(
            serial = %coupon.serial,
            amount = %coupon.amount,
            expire_on = %coupon.expire_on,
            "Coupon created"
        );

        Ok(CreatedCoupon {
            serial: display_form(&coupon.serial),
            code: display_form(&coupon.code),
            expire_on: coupon.expire_on.format("%Y-%m-%d").to_string(),
            amount: coupon.amount,
        })
    }

    /// Withdraw an `available` coupon.
    pub async fn delete(&self, serial: &str) -> Result<WithdrawOutcome> {
        let serial = normalize_serial(serial);
        if serial.is_empty() {
            return Err(CouponError::validation("serial", "must not be empty"));
        }

        let store = self.supervisor.current()?;
        let outcome = store.withdraw_coupon(&serial).await?;
        info!(serial = %serial, outcome = ?outcome, "Coupon withdrawn");
        Ok(outcome)
    }

    /// Look a coupon up by code, marking an `available` one as `queried`.
    ///
    /// The returned status is the one observed before the mark.
    pub async fn retrieve(&self, code: &str) -> Result<Option<CouponView>> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(CouponError::validation("code", "must not be empty"));
        }

        let store = self.supervisor.current()?;
        store.retrieve_by_code(&code).await
    }

    /// Reserve exactly `request.count` available coupons.
    ///
    /// Returns the storage-form codes; on any error nothing is changed.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<Vec<String>> {
        if request.count == 0 {
            return Err(CouponError::validation("count", "must be at least 1"));
        }
        if let Some(amount) = request.amount {
            check_amount(amount)?;
        }
        if let Some(recipient) = &request.recipient
            && recipient.open_id.trim().is_empty()
        {
            return Err(CouponError::validation("openId", "must not be empty"));
        }

        let store = self.supervisor.current()?;
        let codes = store.provision(&request).await?;
        info!(
            count = codes.len(),
            amount = ?request.amount,
            recipient = ?request.recipient.as_ref().map(|r| r.open_id.as_str()),
            "Coupons provided"
        );
        Ok(codes)
    }

    /// Redeem a coupon and credit its amount through `notifier`.
    pub async fn redeem(
        &self,
        redemption: Redemption,
        notifier: &dyn RechargeNotifier,
    ) -> Result<RedeemReceipt> {
        let redemption = Redemption {
            serial: normalize_serial(&redemption.serial),
            code: normalize_code(&redemption.code),
            ..redemption
        };
        if redemption.serial.is_empty() {
            return Err(CouponError::validation("serial", "must not be empty"));
        }
        if redemption.code.is_empty() {
            return Err(CouponError::validation("code", "must not be empty"));
        }
        if redemption.username.is_empty() {
            return Err(CouponError::validation("username", "must not be empty"));
        }
        if redemption.namespace.trim().is_empty() {
            return Err(CouponError::validation("namespace", "must not be empty"));
        }

        let store = self.supervisor.current()?;
        match store
            .redeem(&redemption, self.settings.storage_offset, notifier)
            .await
        {
            Ok(receipt) => {
                info!(
                    serial = %redemption.serial,
                    username = %redemption.username,
                    namespace = %receipt.namespace,
                    amount = %receipt.amount,
                    "Coupon redeemed"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    serial = %redemption.serial,
                    username = %redemption.username,
                    error = %e,
                    "Coupon redemption failed"
                );
                Err(e)
            }
        }
    }

    /// One page of coupons, newest expiry first unless ordered by creation time.
    pub async fn list(&self, query: CouponQuery) -> Result<CouponPage> {
        if query.offset < 0 {
            return Err(CouponError::validation("offset", "must not be negative"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&query.limit) {
            return Err(CouponError::validation(
                "size",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        let query = CouponQuery {
            kind: query
                .kind
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty()),
            ..query
        };

        let store = self.supervisor.current()?;
        store.list_coupons(&query).await
    }

    /// Full record for a serial.
    pub async fn get(&self, serial: &str) -> Result<Option<CouponRecord>> {
        let serial = normalize_serial(serial);
        let store = self.supervisor.current()?;
        store.get_coupon(&serial).await
    }
}

/// Amounts are positive with at most two fractional digits, the precision
/// both backends store.
fn check_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(CouponError::validation("amount", "must be positive"));
    }
    if amount.normalize().scale() > 2 {
        return Err(CouponError::validation(
            "amount",
            "must have at most two decimal places",
        ));
    }
    Ok(())
}
