// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coupon HTTP routes.
//!
//! Administrative endpoints (create, delete, list) require a caller listed in
//! `ADMINUSERS`; lookup and redemption accept any authenticated caller;
//! provisioning is open.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post, put},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use coupon_core::codes::grouped_code;
use coupon_core::engine::MAX_PAGE_SIZE;
use coupon_core::model::{
    CouponOrder, CouponPage, CouponQuery, CouponView, CreateCoupon, CreatedCoupon,
    ProvisionRequest, Recipient, RedeemReceipt, Redemption,
};
use coupon_core::{CouponEngine, CouponError, CouponStatus, RechargeNotifier};

use crate::error::{ApiCode, ApiError, Envelope};
use crate::identity::{AdminUsers, IdentityResolver};

const DEFAULT_PAGE_SIZE: i64 = 30;

// ==================
// Shared State
// ==================

/// State shared across coupon handlers
pub struct AppState {
    pub engine: Arc<CouponEngine>,
    pub identity: Arc<dyn IdentityResolver>,
    pub notifier: Arc<dyn RechargeNotifier>,
    pub admins: AdminUsers,
}

impl AppState {
    /// Username behind the request's `Authorization` header.
    async fn authenticate(
        &self,
        headers: &HeaderMap,
        region: Option<&str>,
    ) -> Result<String, ApiError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if authorization.is_empty() {
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, ApiCode::AuthFailed));
        }

        let username = self
            .identity
            .resolve(authorization, region)
            .await
            .map_err(|e| ApiError::auth_failed(e.to_string()))?;
        debug!(username = %username, "Caller authenticated");
        Ok(username)
    }

    async fn authenticate_admin(
        &self,
        headers: &HeaderMap,
        region: Option<&str>,
    ) -> Result<String, ApiError> {
        let username = self.authenticate(headers, region).await?;
        if !self.admins.contains(&username) {
            info!(username = %username, "Administrative request denied");
            return Err(ApiError::permission_denied());
        }
        Ok(username)
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Default, Deserialize)]
pub struct RegionQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub kind: Option<String>,
    /// Days from today.
    #[serde(default)]
    pub expire_on: i64,
    pub amount: Option<serde_json::Number>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub region: Option<String>,
    pub kind: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
    pub orderby: Option<String>,
    pub sortorder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UseCouponRequest {
    pub code: String,
    pub namespace: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvideQuery {
    pub number: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvideRequest {
    #[serde(rename = "openId")]
    pub open_id: Option<String>,
    /// Unix seconds.
    #[serde(rename = "provideTime")]
    pub provide_time: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProvideResponse {
    /// True when the recipient had already been provided a coupon.
    #[serde(rename = "isProvide")]
    pub is_provide: bool,
    /// First provided code, grouped and upper-cased.
    pub code: String,
    /// Every provided code, grouped and upper-cased.
    pub codes: Vec<String>,
}

// ==================
// Router
// ==================

/// Coupon routes under `/charge/v1/coupons`.
pub fn coupon_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/charge/v1/coupons", post(create_coupon).get(list_coupons))
        .route("/charge/v1/coupons/provide", post(provide_coupons))
        .route("/charge/v1/coupons/use/{serial}", put(use_coupon))
        .route(
            "/charge/v1/coupons/{id}",
            get(retrieve_coupon).delete(delete_coupon),
        )
        .with_state(state)
}

// ==================
// Handlers
// ==================

/// POST /charge/v1/coupons
async fn create_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RegionQuery>,
    body: Bytes,
) -> Result<Json<Envelope<CreatedCoupon>>, ApiError> {
    state
        .authenticate_admin(&headers, query.region.as_deref())
        .await?;

    let request: CreateCouponRequest = parse_json(&body)?;
    if request.expire_on < 0 {
        return Err(ApiError::invalid_parameter("expire_on must not be negative"));
    }
    let amount = request
        .amount
        .as_ref()
        .ok_or_else(|| ApiError::invalid_parameter("amount is required"))
        .and_then(parse_amount)?;

    let expire_on = state
        .engine
        .expiry_after_days(Utc::now(), request.expire_on)
        .map_err(|e| ApiError::from_coupon(e, ApiCode::CreateCoupon))?;

    let created = state
        .engine
        .create(CreateCoupon {
            kind: request.kind,
            amount,
            expire_on,
        })
        .await
        .map_err(|e| ApiError::from_coupon(e, ApiCode::CreateCoupon))?;

    Ok(Envelope::ok(created))
}

/// DELETE /charge/v1/coupons/{serial}
async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(serial): Path<String>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state
        .authenticate_admin(&headers, query.region.as_deref())
        .await?;

    state
        .engine
        .delete(&serial)
        .await
        .map_err(|e| ApiError::from_coupon(e, ApiCode::DeleteCoupon))?;

    Ok(Envelope::empty())
}

/// GET /charge/v1/coupons/{code}
///
/// Answers used, expired and withdrawn coupons with their own error codes.
async fn retrieve_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<Envelope<CouponView>>, ApiError> {
    state.authenticate(&headers, query.region.as_deref()).await?;

    let view = state
        .engine
        .retrieve(&code)
        .await
        .map_err(|e| ApiError::from_coupon(e, ApiCode::GetCouponById))?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, ApiCode::CouponNotFound))?;

    let refused = match view.status {
        CouponStatus::Used => Some(ApiCode::CouponUsed),
        CouponStatus::Expired => Some(ApiCode::CouponExpired),
        CouponStatus::Unavailable => Some(ApiCode::CouponUnavailable),
        _ => None,
    };
    if let Some(code) = refused {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, code));
    }

    Ok(Envelope::ok(view))
}

/// GET /charge/v1/coupons
async fn list_coupons(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<CouponPage>>, ApiError> {
    state
        .authenticate_admin(&headers, query.region.as_deref())
        .await?;

    let coupon_query = list_query(&query);
    let page = state
        .engine
        .list(coupon_query)
        .await
        .map_err(|e| ApiError::from_coupon(e, ApiCode::QueryCoupons))?;

    Ok(Envelope::ok(page))
}

/// PUT /charge/v1/coupons/use/{serial}
async fn use_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(serial): Path<String>,
    Query(query): Query<RegionQuery>,
    body: Bytes,
) -> Result<Json<Envelope<RedeemReceipt>>, ApiError> {
    let region = query.region.filter(|r| !r.is_empty());
    let username = state.authenticate(&headers, region.as_deref()).await?;
    let request: UseCouponRequest = parse_json(&body)?;

    let receipt = state
        .engine
        .redeem(
            Redemption {
                serial,
                code: request.code,
                username,
                namespace: request.namespace,
                use_time: Utc::now(),
                region,
            },
            state.notifier.as_ref(),
        )
        .await
        .map_err(|e| ApiError::from_coupon(e, ApiCode::UseCoupon))?;

    Ok(Envelope::ok(receipt))
}

/// POST /charge/v1/coupons/provide
async fn provide_coupons(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProvideQuery>,
    body: Bytes,
) -> Result<Json<Envelope<ProvideResponse>>, ApiError> {
    let request: ProvideRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ProvideRequest::default()
    } else {
        parse_json(&body)?
    };

    let count = match query.number.as_deref().filter(|n| !n.is_empty()) {
        None => 1,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ApiError::invalid_parameter(format!("number={}", raw)))?,
    };
    let amount = query
        .amount
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(|raw| {
            Decimal::from_str(raw).map_err(|_| ApiError::invalid_parameter(format!("amount={}", raw)))
        })
        .transpose()?;

    let recipient = request
        .open_id
        .filter(|id| !id.trim().is_empty())
        .map(|open_id| Recipient {
            open_id,
            provided_at: request
                .provide_time
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or_else(Utc::now),
        });

    let result = state
        .engine
        .provision(ProvisionRequest {
            count,
            amount,
            recipient,
        })
        .await;

    let codes = match result {
        Ok(codes) => codes,
        Err(CouponError::AlreadyProvided(open_id)) => {
            info!(open_id = %open_id, "Recipient already provided");
            return Ok(Envelope::ok(ProvideResponse {
                is_provide: true,
                code: String::new(),
                codes: Vec::new(),
            }));
        }
        Err(e) => return Err(ApiError::from_coupon(e, ApiCode::ProvideCoupons)),
    };

    let codes: Vec<String> = codes.iter().map(|c| grouped_code(c)).collect();
    Ok(Envelope::ok(ProvideResponse {
        is_provide: false,
        code: codes.first().cloned().unwrap_or_default(),
        codes,
    }))
}

// ==================
// Helpers
// ==================

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::parse_json(e.to_string()))
}

/// Exact decimal from a JSON number.
fn parse_amount(number: &serde_json::Number) -> Result<Decimal, ApiError> {
    let raw = number.to_string();
    Decimal::from_str(&raw).map_err(|_| ApiError::invalid_parameter(format!("amount={}", raw)))
}

/// Page, size and ordering from query parameters.
///
/// Unparsable numbers fall back to their defaults and sizes are clamped to
/// 1..=100.
fn list_query(query: &ListQuery) -> CouponQuery {
    let page = query
        .page
        .as_deref()
        .and_then(|p| p.parse::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    let size = query
        .size
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let order = match query.orderby.as_deref() {
        Some("createtime") => CouponOrder::CreateTime,
        _ => CouponOrder::ExpireOn,
    };
    let ascending = query
        .sortorder
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("asc"));

    CouponQuery {
        kind: query.kind.clone(),
        order,
        ascending,
        offset: (page - 1).saturating_mul(size),
        limit: size,
    }
}
