// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response envelope and API error mapping.
//!
//! Every response body is `{code, msg, data}`. `code` is 0 on success and a
//! value from the 1300 range otherwise.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use coupon_core::CouponError;

/// Numeric result codes carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ApiCode {
    Ok = 0,
    Unknown = 1300,
    JsonBuilding = 1301,
    ParseJsonFailed = 1302,
    UrlNotSupported = 1303,
    DbNotInitialized = 1304,
    AuthFailed = 1305,
    PermissionDenied = 1306,
    InvalidParameters = 1307,
    CreateCoupon = 1308,
    UseCoupon = 1309,
    DeleteCoupon = 1310,
    GetCoupon = 1311,
    QueryCoupons = 1312,
    CallRecharge = 1313,
    GetCouponById = 1314,
    CouponNotFound = 1315,
    CouponUsed = 1316,
    CouponExpired = 1317,
    CouponUnavailable = 1318,
    ProvideCoupons = 1319,
    NoMoreCoupons = 1320,
    RequestTimeout = 1321,
    Conflict = 1322,
}

impl ApiCode {
    /// Numeric value.
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Base message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Unknown => "unknown error",
            Self::JsonBuilding => "json building error",
            Self::ParseJsonFailed => "parse json failed",
            Self::UrlNotSupported => "unsupported url",
            Self::DbNotInitialized => "db is not inited",
            Self::AuthFailed => "auth failed",
            Self::PermissionDenied => "permission denied",
            Self::InvalidParameters => "invalid parameters",
            Self::CreateCoupon => "failed to create coupon",
            Self::UseCoupon => "failed to use a coupon",
            Self::DeleteCoupon => "failed to delete coupon",
            Self::GetCoupon => "failed to get coupon",
            Self::QueryCoupons => "failed to query coupons",
            Self::CallRecharge => "failed to call recharge api",
            Self::GetCouponById => "failed to get coupon by id",
            Self::CouponNotFound => "this coupon does not exist",
            Self::CouponUsed => "this coupon has been used",
            Self::CouponExpired => "this coupon has expired",
            Self::CouponUnavailable => "this coupon is not available",
            Self::ProvideCoupons => "failed to provide coupons",
            Self::NoMoreCoupons => "no more coupons",
            Self::RequestTimeout => "request timeout",
            Self::Conflict => "concurrent modification, please retry",
        }
    }
}

/// Response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    /// Success envelope carrying `data`.
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: ApiCode::Ok.value(),
            msg: ApiCode::Ok.message().to_string(),
            data: Some(data),
        })
    }
}

impl Envelope<()> {
    /// Success envelope without data.
    pub fn empty() -> Json<Self> {
        Json(Self {
            code: ApiCode::Ok.value(),
            msg: ApiCode::Ok.message().to_string(),
            data: None,
        })
    }
}

/// Error answered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ApiCode,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ApiCode) -> Self {
        Self {
            status,
            code,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn auth_failed(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiCode::AuthFailed).with_detail(detail)
    }

    pub fn permission_denied() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiCode::PermissionDenied)
    }

    pub fn invalid_parameter(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiCode::InvalidParameters).with_detail(detail)
    }

    pub fn parse_json(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiCode::ParseJsonFailed).with_detail(detail)
    }

    pub fn not_found_route() -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiCode::UrlNotSupported)
    }

    pub fn timeout() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, ApiCode::RequestTimeout)
    }

    /// Map an engine error raised while performing `operation`.
    ///
    /// Domain outcomes get their own codes; storage failures are reported
    /// under the operation's code.
    pub fn from_coupon(err: CouponError, operation: ApiCode) -> Self {
        let (status, code) = match &err {
            CouponError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiCode::DbNotInitialized)
            }
            CouponError::NotFound { .. } => (StatusCode::NOT_FOUND, ApiCode::CouponNotFound),
            CouponError::Expired { .. } => (StatusCode::BAD_REQUEST, ApiCode::CouponExpired),
            CouponError::AlreadyUsed { .. } => (StatusCode::BAD_REQUEST, ApiCode::CouponUsed),
            CouponError::CouponUnavailable { .. } => {
                (StatusCode::BAD_REQUEST, ApiCode::CouponUnavailable)
            }
            CouponError::InvalidTransition { .. } | CouponError::Conflict(_) => {
                (StatusCode::CONFLICT, ApiCode::Conflict)
            }
            CouponError::InsufficientCoupons { .. } => {
                (StatusCode::BAD_REQUEST, ApiCode::NoMoreCoupons)
            }
            CouponError::AlreadyProvided(_) => (StatusCode::CONFLICT, ApiCode::ProvideCoupons),
            CouponError::Recharge(_) => (StatusCode::BAD_GATEWAY, ApiCode::CallRecharge),
            CouponError::Validation { .. } => (StatusCode::BAD_REQUEST, ApiCode::InvalidParameters),
            CouponError::Corrupt(_) | CouponError::Database(_) => {
                error!(error = %err, error_code = err.error_code(), "Coupon storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, operation)
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, operation),
        };
        Self::new(status, code).with_detail(err.to_string())
    }

    /// `msg` field: the code's message, with the detail in parentheses.
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} ({})", self.code.message(), detail),
            None => self.code.message().to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code.value(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            code: self.code.value(),
            msg: self.message(),
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}
