// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for the billing service's recharge endpoint.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use coupon_core::{NotifyError, RechargeNotifier, RechargeRequest};

#[derive(Debug, Serialize)]
struct RechargeBody<'a> {
    namespace: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    reason: &'a str,
    user: &'a str,
}

/// Credits redeemed coupons through `POST {base}/charge/v1/recharge`.
pub struct HttpRechargeNotifier {
    client: reqwest::Client,
    base_url: Option<String>,
    admin_token: Option<String>,
}

impl HttpRechargeNotifier {
    /// A notifier without `base_url` fails every recharge.
    pub fn new(base_url: Option<String>, admin_token: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.filter(|u| !u.is_empty()),
            admin_token,
        })
    }
}

#[async_trait]
impl RechargeNotifier for HttpRechargeNotifier {
    async fn recharge(&self, request: &RechargeRequest) -> Result<(), NotifyError> {
        let base = self.base_url.as_deref().ok_or(NotifyError::NotConfigured)?;
        let url = format!("{}/charge/v1/recharge", base);

        let mut call = self.client.post(&url).json(&RechargeBody {
            namespace: &request.namespace,
            amount: request.amount,
            reason: &request.reason,
            user: &request.username,
        });
        if let Some(region) = request.region.as_deref().filter(|r| !r.is_empty()) {
            call = call.query(&[("region", region)]);
        }
        if let Some(token) = &self.admin_token {
            call = call.bearer_auth(token);
        }

        let response = call
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                namespace = %request.namespace,
                reason = %request.reason,
                status = status.as_u16(),
                "Recharge rejected"
            );
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            namespace = %request.namespace,
            amount = %request.amount,
            reason = %request.reason,
            "Recharge accepted"
        );
        Ok(())
    }
}
