// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for coupon-server.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `postgres://…` or `sqlite:…`
    pub database_url: String,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Pool size
    pub max_connections: u32,
    /// Per-request race timeout
    pub request_timeout: Duration,
    /// Hours east of UTC used for expiry comparison
    pub storage_offset_hours: i32,
    /// Run the schema upgrader chain at startup
    pub upgrade_tables: bool,
    /// Default identity host
    pub identity_host: String,
    /// Per-region identity hosts
    pub region_hosts: HashMap<String, String>,
    /// Usernames allowed to administer coupons
    pub admin_users: Vec<String>,
    /// Recharge service base URL
    pub recharge_addr: Option<String>,
    /// Admin credential for the recharge service
    pub recharge_token: Option<String>,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("COUPON_DATABASE_URL")?;

        let port: u16 = parse_or("COUPON_HTTP_PORT", 8574, "expected a port number")?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let max_connections: u32 =
            parse_or("COUPON_DB_MAX_CONNECTIONS", 10, "expected a positive integer")?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid(
                "COUPON_DB_MAX_CONNECTIONS",
                "expected a positive integer",
            ));
        }

        let timeout_ms: u64 =
            parse_or("COUPON_REQUEST_TIMEOUT_MS", 500, "expected milliseconds")?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "COUPON_REQUEST_TIMEOUT_MS",
                "expected milliseconds",
            ));
        }

        let storage_offset_hours: i32 = parse_or(
            "COUPON_STORAGE_UTC_OFFSET_HOURS",
            coupon_core::engine::DEFAULT_STORAGE_OFFSET_HOURS,
            "expected hours east of UTC",
        )?;
        if !(-23..=23).contains(&storage_offset_hours) {
            return Err(ConfigError::Invalid(
                "COUPON_STORAGE_UTC_OFFSET_HOURS",
                "expected hours east of UTC",
            ));
        }

        let upgrade_tables = optional("COUPON_DONT_UPGRADE_TABLES").as_deref() != Some("yes");

        let identity_host = trim_slash(&required("DATAFOUNDRY_HOST_ADDR")?);
        let region_hosts = parse_region_hosts(&optional("COUPON_REGION_HOSTS").unwrap_or_default())?;

        let admin_users = optional("ADMINUSERS")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let recharge_addr = optional("RECHARGE_API_ADDR").map(|a| trim_slash(&a));
        let recharge_token = optional("RECHARGE_ADMIN_TOKEN");

        let json_logs = match optional("COUPON_LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "COUPON_LOG_FORMAT",
                    "expected 'text' or 'json'",
                ));
            }
        };

        Ok(Self {
            database_url,
            http_addr,
            max_connections,
            request_timeout: Duration::from_millis(timeout_ms),
            storage_offset_hours,
            upgrade_tables,
            identity_host,
            region_hosts,
            admin_users,
            recharge_addr,
            recharge_token,
            json_logs,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    /// An environment variable has an unusable value.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

/// Non-empty value of `key`.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, expected)),
        None => Ok(default),
    }
}

fn trim_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Parse `region=url,region=url`.
fn parse_region_hosts(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut hosts = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (region, host) = entry
            .split_once('=')
            .map(|(r, h)| (r.trim(), h.trim()))
            .filter(|(r, h)| !r.is_empty() && !h.is_empty())
            .ok_or(ConfigError::Invalid(
                "COUPON_REGION_HOSTS",
                "expected region=url pairs separated by commas",
            ))?;
        hosts.insert(region.to_string(), trim_slash(host));
    }
    Ok(hosts)
}
