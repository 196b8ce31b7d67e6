// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Versioned schema upgrades.
//!
//! The chain is a static, append-only list. Each step moves the persisted
//! version from `old_version` to `new_version`; the last step's creation
//! script describes the latest schema and is what a fresh database gets.
//!
//! The persisted phase counter is the only lock between concurrently starting
//! processes: whoever fails the `serving -> upgrading` compare-and-set aborts.

mod v001;

pub use self::v001::InitialSchema;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{StatError, UpgradeError};
use crate::gate::{Phase, ServingGate};
use crate::stats::{phase_key, version_key};
use crate::store::{Backend, CouponStore};

/// Persisted phase value while serving.
pub const PHASE_SERVING: i64 = 0;
/// Persisted phase value while an upgrade step runs.
pub const PHASE_UPGRADING: i64 = 1;

/// One step of the chain.
#[async_trait]
pub trait SchemaUpgrader: Send + Sync {
    /// Version this step starts from.
    fn old_version(&self) -> i64;

    /// Version this step produces. Gaps are allowed.
    fn new_version(&self) -> i64;

    /// Idempotent DDL that creates the schema as of [`new_version`](Self::new_version).
    fn creation_script(&self, backend: Backend) -> &'static str;

    /// Forward migration from `old_version`.
    async fn upgrade(&self, store: &dyn CouponStore) -> Result<(), UpgradeError>;
}

/// The service's upgrader chain.
pub static UPGRADERS: &[&dyn SchemaUpgrader] = &[&InitialSchema];

/// Knobs for [`upgrade_database`].
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// When false, no DDL or migration runs and the gate goes straight to serving.
    pub really_upgrade: bool,
    /// Pause between persisting a new version and releasing the phase.
    pub settle_delay: Duration,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            really_upgrade: true,
            settle_delay: Duration::from_millis(30),
        }
    }
}

/// Bring the database named `db_name` up to the chain's latest version.
///
/// Marks `gate` serving on success. Any error is fatal for startup.
pub async fn upgrade_database(
    store: &dyn CouponStore,
    db_name: &str,
    chain: &[&dyn SchemaUpgrader],
    gate: &ServingGate,
    options: &UpgradeOptions,
) -> Result<(), UpgradeError> {
    let Some(last) = chain.last() else {
        return Err(UpgradeError::EmptyChain);
    };

    if !options.really_upgrade {
        info!(db = %db_name, "Schema upgrade disabled, serving without checks");
        gate.set(Phase::Serving);
        return Ok(());
    }

    store
        .execute_script(last.creation_script(store.backend()))
        .await?;

    let version_key = version_key(&[db_name]);
    let phase_key = phase_key(&[db_name]);
    let latest = last.new_version();

    // A fresh database starts at the latest version; an existing one keeps its own.
    match store.set_stat_if(&version_key, latest, 0).await {
        Ok(_) => info!(db = %db_name, version = latest, "Seeded schema version"),
        Err(StatError::StaleCompareAndSet { actual, .. }) => {
            debug!(db = %db_name, current = ?actual, "Schema version already recorded")
        }
        Err(e) => return Err(e.into()),
    }

    let mut current = store.get_stat(&version_key).await?;
    if current > latest {
        warn!(
            db = %db_name,
            current,
            latest,
            "Database schema is newer than this binary"
        );
    }

    if current < latest {
        for step in chain {
            if step.new_version() <= current {
                continue;
            }
            if step.old_version() != current {
                return Err(UpgradeError::ChainGap {
                    old_version: step.old_version(),
                    new_version: step.new_version(),
                    current,
                });
            }

            store
                .set_stat_if(&phase_key, PHASE_UPGRADING, PHASE_SERVING)
                .await?;
            gate.set(Phase::Upgrading);
            info!(
                db = %db_name,
                from = step.old_version(),
                to = step.new_version(),
                "Upgrading schema"
            );

            step.upgrade(store).await?;
            store.set_stat(&version_key, step.new_version()).await?;
            tokio::time::sleep(options.settle_delay).await;
            store
                .set_stat_if(&phase_key, PHASE_SERVING, PHASE_UPGRADING)
                .await?;

            current = step.new_version();
            info!(db = %db_name, version = current, "Schema upgraded");
        }
    }

    gate.set(Phase::Serving);
    info!(db = %db_name, version = current, "Schema ready, serving");
    Ok(())
}
