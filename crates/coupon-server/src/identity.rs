// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Caller identity.
//!
//! The bearer credential is forwarded to the platform's user endpoint
//! (`GET {host}/oapi/v1/users/~`), which answers with the caller's user
//! object. The region query parameter picks the host.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Identity lookup failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing Authorization header")]
    MissingCredential,

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("identity request failed: {0}")]
    Transport(String),

    #[error("remote ({url}) status code: {status}")]
    Rejected { url: String, status: u16 },

    #[error("identity response has no user name")]
    NoUsername,
}

/// Resolves a bearer credential to a username.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `authorization` is the raw `Authorization` header value.
    async fn resolve(
        &self,
        authorization: &str,
        region: Option<&str>,
    ) -> Result<String, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct UserObject {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

/// Resolver backed by the platform's HTTP user endpoint.
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    default_host: String,
    region_hosts: HashMap<String, String>,
}

impl HttpIdentityResolver {
    pub fn new(
        default_host: impl Into<String>,
        region_hosts: HashMap<String, String>,
    ) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            default_host: default_host.into(),
            region_hosts,
        })
    }

    /// Host for `region`; no region means the default host.
    fn host_for(&self, region: Option<&str>) -> Result<&str, IdentityError> {
        match region.filter(|r| !r.is_empty()) {
            None => Ok(&self.default_host),
            Some(region) => self
                .region_hosts
                .get(region)
                .map(String::as_str)
                .ok_or_else(|| IdentityError::UnknownRegion(region.to_string())),
        }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(
        &self,
        authorization: &str,
        region: Option<&str>,
    ) -> Result<String, IdentityError> {
        if authorization.trim().is_empty() {
            return Err(IdentityError::MissingCredential);
        }

        let url = format!("{}/oapi/v1/users/~", self.host_for(region)?);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Identity lookup rejected");
            return Err(IdentityError::Rejected {
                url,
                status: status.as_u16(),
            });
        }

        let user: UserObject = response
            .json()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        if user.metadata.name.is_empty() {
            return Err(IdentityError::NoUsername);
        }
        Ok(user.metadata.name)
    }
}

/// Usernames allowed to administer coupons.
#[derive(Debug, Clone, Default)]
pub struct AdminUsers(Vec<String>);

impl AdminUsers {
    pub fn new(users: Vec<String>) -> Self {
        Self(users)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.iter().any(|u| u == username)
    }
}
