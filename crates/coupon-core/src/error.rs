// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for coupon-core.
//!
//! [`CouponError`] is what request-path operations return. The startup path
//! (stats, upgrader chain, supervisor) has its own error types because their
//! failures are fatal to the process rather than to a single request.

use thiserror::Error;

use crate::model::CouponStatus;

/// Result type using CouponError.
pub type Result<T> = std::result::Result<T, CouponError>;

/// Errors surfaced by coupon lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CouponError {
    /// No database handle, or the serving gate denies service.
    #[error("Coupon service unavailable: {0}")]
    ServiceUnavailable(String),

    /// No coupon matches the given serial/code.
    #[error("Coupon '{key}' not found")]
    NotFound {
        /// The serial or code that was looked up.
        key: String,
    },

    /// The coupon is past its expiry date.
    #[error("Coupon '{serial}' has expired")]
    Expired {
        /// Serial of the expired coupon.
        serial: String,
    },

    /// The coupon was already redeemed.
    #[error("Coupon '{serial}' has already been used")]
    AlreadyUsed {
        /// Serial of the used coupon.
        serial: String,
    },

    /// The coupon was withdrawn by an administrator.
    #[error("Coupon '{serial}' is unavailable")]
    CouponUnavailable {
        /// Serial of the withdrawn coupon.
        serial: String,
    },

    /// The requested transition is not allowed from the coupon's current status.
    #[error("Coupon '{serial}' cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        /// Serial of the coupon.
        serial: String,
        /// Current status.
        from: CouponStatus,
        /// Requested status.
        to: CouponStatus,
    },

    /// A conditional update affected zero rows (lost race).
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Fewer coupons are available than were requested.
    #[error("Only {available} of {requested} requested coupons are available")]
    InsufficientCoupons {
        /// Number of coupons requested.
        requested: u32,
        /// Number of candidates found.
        available: u32,
    },

    /// The recipient was already provided a coupon.
    #[error("Recipient '{0}' has already been provided a coupon")]
    AlreadyProvided(String),

    /// The recharge side effect failed; the redemption was rolled back.
    #[error("Recharge failed: {0}")]
    Recharge(#[from] crate::notify::NotifyError),

    /// Input validation failed.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("Corrupt coupon record: {0}")]
    Corrupt(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CouponError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::NotFound { .. } => "COUPON_NOT_FOUND",
            Self::Expired { .. } => "COUPON_EXPIRED",
            Self::AlreadyUsed { .. } => "COUPON_USED",
            Self::CouponUnavailable { .. } => "COUPON_UNAVAILABLE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::InsufficientCoupons { .. } => "INSUFFICIENT_COUPONS",
            Self::AlreadyProvided(_) => "ALREADY_PROVIDED",
            Self::Recharge(_) => "RECHARGE_FAILED",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Corrupt(_) => "CORRUPT_RECORD",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors from the version/phase counter store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatError {
    /// Compare-and-set precondition did not hold.
    #[error("Old stat not match for '{key}': expected {expected}, found {actual:?}")]
    StaleCompareAndSet {
        /// Counter key.
        key: String,
        /// Value the caller expected.
        expected: i64,
        /// Value actually stored (`None` when no row exists).
        actual: Option<i64>,
    },

    /// A counter cannot be initialized below zero.
    #[error("Stat '{key}' cannot be initialized to negative value {value}")]
    NegativeInitial {
        /// Counter key.
        key: String,
        /// Rejected value.
        value: i64,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fatal errors raised while bringing the schema up to date.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpgradeError {
    /// The upgrader chain is empty.
    #[error("At least one schema upgrader is required")]
    EmptyChain,

    /// A step's old version does not match the persisted version.
    #[error(
        "Upgrader {old_version}->{new_version} does not continue from current version {current}"
    )]
    ChainGap {
        /// Step's expected starting version.
        old_version: i64,
        /// Step's target version.
        new_version: i64,
        /// Persisted version.
        current: i64,
    },

    /// A step's migration action failed.
    #[error("Migration to version {version} failed: {reason}")]
    Migration {
        /// Target version of the failing step.
        version: i64,
        /// Failure details.
        reason: String,
    },

    /// Version/phase bookkeeping failed (including concurrent upgraders).
    #[error("Stat error: {0}")]
    Stat(#[from] StatError),

    /// Table creation or another statement failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the connection supervisor's startup path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// Every startup connection attempt failed.
    #[error("Failed to connect to database after {attempts} attempts: {source}")]
    ConnectFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: sqlx::Error,
    },

    /// Schema upgrade failed.
    #[error("Schema upgrade failed: {0}")]
    Upgrade(#[from] UpgradeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_error_codes() {
        let test_cases = vec![
            (
                CouponError::ServiceUnavailable("upgrading".to_string()),
                "SERVICE_UNAVAILABLE",
            ),
            (
                CouponError::NotFound {
                    key: "abc".to_string(),
                },
                "COUPON_NOT_FOUND",
            ),
            (
                CouponError::Expired {
                    serial: "df1r".to_string(),
                },
                "COUPON_EXPIRED",
            ),
            (
                CouponError::AlreadyUsed {
                    serial: "df1r".to_string(),
                },
                "COUPON_USED",
            ),
            (CouponError::Conflict("lost".to_string()), "CONFLICT"),
            (
                CouponError::InsufficientCoupons {
                    requested: 3,
                    available: 2,
                },
                "INSUFFICIENT_COUPONS",
            ),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.error_code(), expected, "{error}");
        }
    }

    #[test]
    fn test_stale_cas_message_mentions_key() {
        let err = StatError::StaleCompareAndSet {
            key: "datafoundry:coupon#phase".to_string(),
            expected: 0,
            actual: Some(1),
        };
        let msg = err.to_string();
        assert!(msg.contains("datafoundry:coupon#phase"));
        assert!(msg.contains("Old stat not match"));
    }

    #[test]
    fn test_insufficient_message() {
        let err = CouponError::InsufficientCoupons {
            requested: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "Only 2 of 3 requested coupons are available"
        );
    }
}
