// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;

use super::SchemaUpgrader;
use crate::error::UpgradeError;
use crate::store::{Backend, CouponStore};

const POSTGRES_SCHEMA: &str = include_str!("../../schema/postgres/v001.sql");
const SQLITE_SCHEMA: &str = include_str!("../../schema/sqlite/v001.sql");

/// Version 1: coupons, recipients and counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialSchema;

#[async_trait]
impl SchemaUpgrader for InitialSchema {
    fn old_version(&self) -> i64 {
        0
    }

    fn new_version(&self) -> i64 {
        1
    }

    fn creation_script(&self, backend: Backend) -> &'static str {
        match backend {
            Backend::Postgres => POSTGRES_SCHEMA,
            Backend::Sqlite => SQLITE_SCHEMA,
        }
    }

    async fn upgrade(&self, store: &dyn CouponStore) -> Result<(), UpgradeError> {
        store
            .execute_script(self.creation_script(store.backend()))
            .await?;
        Ok(())
    }
}
