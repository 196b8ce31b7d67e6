// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon state machine.
//!
//! ```text
//!                  ┌───────────┐
//!        ┌─────────│ AVAILABLE │─────────┬──────────────┐
//!        │         └─────┬─────┘         │              │
//!  retrieve          provision        delete          redeem
//!        ▼               ▼               ▼              │
//!   ┌─────────┐    ┌──────────┐    ┌─────────────┐      │
//!   │ QUERIED │    │ PROVIDED │    │ UNAVAILABLE │      │
//!   └────┬────┘    └────┬─────┘    └─────────────┘      │
//!        └──────┬───────┘                               │
//!               │ redeem                                │
//!        ┌──────┴───────┐◄──────────────────────────────┘
//!        ▼              ▼
//!   ┌────────┐    ┌─────────┐
//!   │  USED  │    │ EXPIRED │
//!   └────────┘    └─────────┘
//! ```
//!
//! The SQL layer guards `available -> {queried, provided, unavailable}` with
//! conditional updates. Redemption re-reads the row and applies
//! [`check_redeemable`] before its own conditional update.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::error::CouponError;
use crate::model::CouponStatus;

/// Whether `from -> to` is a legal transition.
pub fn can_transition(from: CouponStatus, to: CouponStatus) -> bool {
    use CouponStatus::*;
    match from {
        Available => matches!(to, Queried | Provided | Used | Expired | Unavailable),
        Queried | Provided => matches!(to, Used | Expired | Unavailable),
        Used | Expired | Unavailable => false,
    }
}

/// What a redemption should do after validating the freshly read row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemCheck {
    /// Mark the coupon used and run the side effect.
    Proceed,
    /// Persist `expired` and fail.
    Expire,
}

/// Validate a coupon row for redemption at `use_time`.
///
/// The coupon stops being redeemable at midnight starting `expire_on`, in the
/// storage offset.
pub fn check_redeemable(
    serial: &str,
    status: CouponStatus,
    expire_on: NaiveDate,
    use_time: DateTime<Utc>,
    storage_offset: FixedOffset,
) -> Result<RedeemCheck, CouponError> {
    match status {
        CouponStatus::Expired => {
            return Err(CouponError::Expired {
                serial: serial.to_string(),
            });
        }
        CouponStatus::Used => {
            return Err(CouponError::AlreadyUsed {
                serial: serial.to_string(),
            });
        }
        CouponStatus::Unavailable => {
            return Err(CouponError::CouponUnavailable {
                serial: serial.to_string(),
            });
        }
        CouponStatus::Available | CouponStatus::Queried | CouponStatus::Provided => {}
    }

    let local_use = use_time.with_timezone(&storage_offset).naive_local();
    let expires_at = expire_on.and_time(NaiveTime::MIN);

    if expires_at - local_use < chrono::Duration::zero() {
        Ok(RedeemCheck::Expire)
    } else {
        Ok(RedeemCheck::Proceed)
    }
}

/// Expiry date `days` from `now`, in the storage offset.
///
/// `None` when the date falls outside the four-digit years both backends
/// store.
pub fn expiry_after_days(
    now: DateTime<Utc>,
    days: i64,
    storage_offset: FixedOffset,
) -> Option<NaiveDate> {
    let delta = TimeDelta::try_days(days)?;
    now.with_timezone(&storage_offset)
        .checked_add_signed(delta)
        .map(|local| local.date_naive())
        .filter(|date| (1..=9999).contains(&date.year()))
}
