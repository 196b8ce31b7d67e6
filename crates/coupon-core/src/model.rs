// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon records and the request/response types exchanged with the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CouponError;

/// Coupon status as stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    /// Freshly created, never shown or handed out.
    Available,
    /// Shown to a viewer through a retrieval by code.
    Queried,
    /// Reserved by a batch provisioning.
    Provided,
    /// Redeemed.
    Used,
    /// Redemption was attempted past the expiry date.
    Expired,
    /// Withdrawn by an administrator.
    Unavailable,
}

impl CouponStatus {
    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Queried => "queried",
            Self::Provided => "provided",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CouponStatus {
    type Err = CouponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "queried" => Ok(Self::Queried),
            "provided" => Ok(Self::Provided),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(CouponError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// Canonical two-decimal text form of an amount.
///
/// SQLite stores amounts as text, so exact-amount filters compare this form.
pub fn amount_to_text(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

/// Parse an amount stored by [`amount_to_text`].
pub fn amount_from_text(text: &str) -> Result<Decimal, CouponError> {
    Decimal::from_str(text)
        .map_err(|e| CouponError::Corrupt(format!("invalid amount '{}': {}", text, e)))
}

/// Request to create one coupon.
#[derive(Debug, Clone)]
pub struct CreateCoupon {
    /// Optional category tag.
    pub kind: Option<String>,
    /// Value credited on redemption.
    pub amount: Decimal,
    /// Last valid day (redemption at or after midnight of this day fails).
    pub expire_on: NaiveDate,
}

/// Row handed to the store for insertion. Identifiers are already lowercase.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    /// Storage-form serial.
    pub serial: String,
    /// Storage-form code.
    pub code: String,
    /// Optional category tag (lowercase).
    pub kind: Option<String>,
    /// Value credited on redemption.
    pub amount: Decimal,
    /// Expiry date.
    pub expire_on: NaiveDate,
}

/// Result of a successful create, in display form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedCoupon {
    /// Upper-case serial.
    pub serial: String,
    /// Upper-case code.
    pub code: String,
    /// Expiry date as `YYYY-MM-DD`.
    pub expire_on: String,
    /// Value credited on redemption.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Public view of a coupon returned by retrieval and listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponView {
    /// Upper-case serial.
    pub serial: String,
    /// Expiry date.
    pub expire_on: NaiveDate,
    /// Value credited on redemption.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Status observed by this call.
    pub status: CouponStatus,
}

/// Full coupon row, for administrative inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponRecord {
    /// Storage-form serial.
    pub serial: String,
    /// Storage-form code.
    pub code: String,
    /// Optional category tag.
    pub kind: Option<String>,
    /// Value credited on redemption.
    pub amount: Decimal,
    /// Expiry date.
    pub expire_on: NaiveDate,
    /// Current status.
    pub status: CouponStatus,
    /// Redeeming user.
    pub username: Option<String>,
    /// Namespace credited at redemption.
    pub namespace: Option<String>,
    /// Redemption time (storage offset applied).
    pub use_time: Option<DateTime<Utc>>,
}

/// Outcome of a withdraw (delete) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The coupon moved from `available` to `unavailable`.
    Withdrawn,
    /// The coupon was already `unavailable`; nothing changed.
    AlreadyWithdrawn,
}

/// A recipient claiming a provided coupon.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Opaque recipient identifier (open-id).
    pub open_id: String,
    /// When the recipient asked for a coupon.
    pub provided_at: DateTime<Utc>,
}

/// Batch reservation request.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Exact number of coupons to reserve.
    pub count: u32,
    /// Only reserve coupons of exactly this amount.
    pub amount: Option<Decimal>,
    /// Record this recipient inside the same transaction.
    pub recipient: Option<Recipient>,
}

/// Redemption request.
#[derive(Debug, Clone)]
pub struct Redemption {
    /// Serial (any case).
    pub serial: String,
    /// Code (any case, dashes allowed).
    pub code: String,
    /// Redeeming user.
    pub username: String,
    /// Namespace to credit.
    pub namespace: String,
    /// When the redemption was requested.
    pub use_time: DateTime<Utc>,
    /// Region/tenant hint forwarded to the recharge notifier.
    pub region: Option<String>,
}

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedeemReceipt {
    /// Credited amount.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Credited namespace.
    pub namespace: String,
}

/// Sort column for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouponOrder {
    /// Order by expiry date, newest first (sort direction is ignored).
    #[default]
    ExpireOn,
    /// Order by creation time.
    CreateTime,
}

/// Listing query.
#[derive(Debug, Clone)]
pub struct CouponQuery {
    /// Only coupons of this kind.
    pub kind: Option<String>,
    /// Sort column.
    pub order: CouponOrder,
    /// Ascending when true.
    pub ascending: bool,
    /// Rows to skip.
    pub offset: i64,
    /// Page size.
    pub limit: i64,
}

impl Default for CouponQuery {
    fn default() -> Self {
        Self {
            kind: None,
            order: CouponOrder::ExpireOn,
            ascending: false,
            offset: 0,
            limit: 30,
        }
    }
}

impl CouponQuery {
    /// SQL `ORDER BY` clause for this query.
    pub(crate) fn order_clause(&self) -> &'static str {
        match (self.order, self.ascending) {
            (CouponOrder::ExpireOn, _) => "expire_on DESC, serial ASC",
            (CouponOrder::CreateTime, true) => "create_time ASC, serial ASC",
            (CouponOrder::CreateTime, false) => "create_time DESC, serial ASC",
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponPage {
    /// Total matching rows.
    pub total: i64,
    /// Rows in this page.
    pub results: Vec<CouponView>,
}

/// Clamp `offset`/`limit` against a total row count.
pub(crate) fn clamp_page(total: i64, offset: i64, limit: i64) -> (i64, i64) {
    let mut limit = limit.max(1);
    let mut offset = offset;
    if offset >= total {
        offset = total - limit;
    }
    if offset < 0 {
        offset = 0;
    }
    if offset + limit > total {
        limit = total - offset;
    }
    (offset, limit)
}
