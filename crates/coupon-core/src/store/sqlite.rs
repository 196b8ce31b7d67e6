// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed coupon store.
//!
//! SQLite has no row locks, so the conditional updates alone decide races.
//! All statements of an operation run on its transaction, which keeps
//! single-connection pools (`sqlite::memory:`) from waiting on themselves.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::codes::display_form;
use crate::error::{CouponError, StatError};
use crate::lifecycle::{RedeemCheck, check_redeemable};
use crate::model::{
    CouponPage, CouponQuery, CouponRecord, CouponStatus, CouponView, NewCoupon, ProvisionRequest,
    Recipient, RedeemReceipt, Redemption, WithdrawOutcome, amount_from_text, amount_to_text,
    clamp_page,
};
use crate::notify::{RechargeNotifier, RechargeRequest};
use crate::stats::{StatMode, StatWrite, resolve};

use super::{Backend, CouponStore, is_unique_violation, withdraw_miss};

type ViewRow = (String, NaiveDate, String, String);

type RecordRow = (
    String,
    String,
    Option<String>,
    String,
    NaiveDate,
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
);

/// SQLite-backed coupon store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `url`, creating the database file if needed.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn write_stat(
        &self,
        key: &str,
        value: i64,
        expected: Option<i64>,
        mode: StatMode,
    ) -> Result<i64, StatError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT stat_value FROM item_stats WHERE stat_key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        let write = resolve(key, current, value, expected, mode)?;
        match write {
            StatWrite::Insert(v) => {
                let inserted =
                    sqlx::query("INSERT INTO item_stats (stat_key, stat_value) VALUES (?, ?)")
                        .bind(key)
                        .bind(v)
                        .execute(&mut *tx)
                        .await;
                if let Err(e) = inserted {
                    if is_unique_violation(&e) {
                        return Err(StatError::StaleCompareAndSet {
                            key: key.to_string(),
                            expected: expected.unwrap_or(0),
                            actual: None,
                        });
                    }
                    return Err(e.into());
                }
            }
            StatWrite::Update(v) => {
                sqlx::query("UPDATE item_stats SET stat_value = ? WHERE stat_key = ?")
                    .bind(v)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(write.value())
    }
}

async fn claim_recipient(
    conn: &mut SqliteConnection,
    recipient: &Recipient,
) -> Result<(), CouponError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM coupon_recipients WHERE to_user = ?")
            .bind(&recipient.open_id)
            .fetch_optional(&mut *conn)
            .await?;
    if existing.is_some() {
        return Err(CouponError::AlreadyProvided(recipient.open_id.clone()));
    }

    let inserted = sqlx::query("INSERT INTO coupon_recipients (to_user, provide_time) VALUES (?, ?)")
        .bind(&recipient.open_id)
        .bind(recipient.provided_at)
        .execute(&mut *conn)
        .await;
    match inserted {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            Err(CouponError::AlreadyProvided(recipient.open_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn to_view((serial, expire_on, amount, status): ViewRow) -> Result<CouponView, CouponError> {
    Ok(CouponView {
        serial: display_form(&serial),
        expire_on,
        amount: amount_from_text(&amount)?,
        status: status.parse()?,
    })
}

#[async_trait]
impl CouponStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn execute_script(&self, script: &str) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(script).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_stat(&self, key: &str) -> Result<i64, StatError> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT stat_value FROM item_stats WHERE stat_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or(0))
    }

    async fn set_stat(&self, key: &str, value: i64) -> Result<i64, StatError> {
        self.write_stat(key, value, None, StatMode::Set).await
    }

    async fn set_stat_if(&self, key: &str, value: i64, expected: i64) -> Result<i64, StatError> {
        self.write_stat(key, value, Some(expected), StatMode::Set)
            .await
    }

    async fn update_stat(&self, key: &str, delta: i64) -> Result<i64, StatError> {
        self.write_stat(key, delta, None, StatMode::Add).await
    }

    async fn remove_stat(&self, key: &str) -> Result<i64, StatError> {
        let mut tx = self.pool.begin().await?;

        let value: Option<i64> =
            sqlx::query_scalar("SELECT stat_value FROM item_stats WHERE stat_key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        if value.is_some() {
            sqlx::query("DELETE FROM item_stats WHERE stat_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(value.unwrap_or(0))
    }

    async fn list_stats(&self) -> Result<Vec<(String, i64)>, StatError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT stat_key, stat_value FROM item_stats ORDER BY stat_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_coupon(&self, coupon: &NewCoupon) -> Result<(), CouponError> {
        sqlx::query(
            r#"
            INSERT INTO coupons (serial, code, kind, expire_on, amount, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&coupon.serial)
        .bind(&coupon.code)
        .bind(&coupon.kind)
        .bind(coupon.expire_on)
        .bind(amount_to_text(coupon.amount))
        .bind(CouponStatus::Available.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn withdraw_coupon(&self, serial: &str) -> Result<WithdrawOutcome, CouponError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE coupons SET status = ? WHERE serial = ? AND status = ?")
            .bind(CouponStatus::Unavailable.as_str())
            .bind(serial)
            .bind(CouponStatus::Available.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(WithdrawOutcome::Withdrawn);
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM coupons WHERE serial = ?")
            .bind(serial)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let status = status.map(|s| s.parse::<CouponStatus>()).transpose()?;
        withdraw_miss(serial, status)
    }

    async fn retrieve_by_code(&self, code: &str) -> Result<Option<CouponView>, CouponError> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query("UPDATE coupons SET status = ? WHERE code = ? AND status = ?")
            .bind(CouponStatus::Queried.as_str())
            .bind(code)
            .bind(CouponStatus::Available.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let row = sqlx::query_as::<_, ViewRow>(
            "SELECT serial, expire_on, amount, status FROM coupons WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut view = to_view(row)?;
        if marked {
            view.status = CouponStatus::Available;
        }
        Ok(Some(view))
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<Vec<String>, CouponError> {
        let mut tx = self.pool.begin().await?;

        if let Some(recipient) = &request.recipient {
            claim_recipient(&mut *tx, recipient).await?;
        }

        let limit = i64::from(request.count);
        let codes: Vec<String> = match request.amount {
            Some(amount) => {
                sqlx::query_scalar(
                    r#"
                    SELECT code FROM coupons
                    WHERE status = ? AND amount = ?
                    ORDER BY create_time, serial
                    LIMIT ?
                    "#,
                )
                .bind(CouponStatus::Available.as_str())
                .bind(amount_to_text(amount))
                .bind(limit)
                .fetch_all(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT code FROM coupons
                    WHERE status = ?
                    ORDER BY create_time, serial
                    LIMIT ?
                    "#,
                )
                .bind(CouponStatus::Available.as_str())
                .bind(limit)
                .fetch_all(&mut *tx)
                .await?
            }
        };

        if codes.len() < request.count as usize {
            return Err(CouponError::InsufficientCoupons {
                requested: request.count,
                available: codes.len() as u32,
            });
        }

        for code in &codes {
            let result = sqlx::query("UPDATE coupons SET status = ? WHERE code = ? AND status = ?")
                .bind(CouponStatus::Provided.as_str())
                .bind(code)
                .bind(CouponStatus::Available.as_str())
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                warn!(code = %code, "Coupon taken by a concurrent provisioner");
                return Err(CouponError::Conflict(format!(
                    "coupon '{}' was provided concurrently",
                    display_form(code)
                )));
            }
        }

        tx.commit().await?;
        Ok(codes)
    }

    async fn redeem(
        &self,
        redemption: &Redemption,
        storage_offset: FixedOffset,
        notifier: &dyn RechargeNotifier,
    ) -> Result<RedeemReceipt, CouponError> {
        let serial = redemption.serial.as_str();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String, NaiveDate, String)>(
            "SELECT amount, expire_on, status FROM coupons WHERE serial = ? AND code = ?",
        )
        .bind(serial)
        .bind(&redemption.code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((amount, expire_on, status)) = row else {
            return Err(CouponError::NotFound {
                key: display_form(serial),
            });
        };
        let amount = amount_from_text(&amount)?;
        let status: CouponStatus = status.parse()?;

        let check = check_redeemable(
            serial,
            status,
            expire_on,
            redemption.use_time,
            storage_offset,
        )?;
        if check == RedeemCheck::Expire {
            let expired = sqlx::query(
                "UPDATE coupons SET status = ? WHERE serial = ? AND status = ?",
            )
            .bind(CouponStatus::Expired.as_str())
            .bind(serial)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
            if expired.rows_affected() == 0 {
                return Err(CouponError::Conflict(format!(
                    "coupon '{}' changed during redemption",
                    display_form(serial)
                )));
            }
            tx.commit().await?;
            debug!(serial = %serial, "Coupon marked expired on redemption attempt");
            return Err(CouponError::Expired {
                serial: display_form(serial),
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET status = ?, use_time = ?, username = ?, namespace = ?
            WHERE serial = ? AND code = ? AND status = ?
            "#,
        )
        .bind(CouponStatus::Used.as_str())
        .bind(redemption.use_time)
        .bind(&redemption.username)
        .bind(&redemption.namespace)
        .bind(serial)
        .bind(&redemption.code)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CouponError::Conflict(format!(
                "coupon '{}' changed during redemption",
                display_form(serial)
            )));
        }

        notifier
            .recharge(&RechargeRequest {
                namespace: redemption.namespace.clone(),
                amount,
                reason: serial.to_string(),
                username: redemption.username.clone(),
                region: redemption.region.clone(),
            })
            .await?;

        tx.commit().await?;
        Ok(RedeemReceipt {
            amount,
            namespace: redemption.namespace.clone(),
        })
    }

    async fn list_coupons(&self, query: &CouponQuery) -> Result<CouponPage, CouponError> {
        let total: i64 = match &query.kind {
            Some(kind) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM coupons WHERE kind = ?")
                    .bind(kind)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM coupons")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        let (offset, limit) = clamp_page(total, query.offset, query.limit);
        if limit <= 0 {
            return Ok(CouponPage {
                total,
                results: Vec::new(),
            });
        }

        let rows: Vec<ViewRow> = match &query.kind {
            Some(kind) => {
                let sql = format!(
                    "SELECT serial, expire_on, amount, status FROM coupons \
                     WHERE kind = ? ORDER BY {} LIMIT ? OFFSET ?",
                    query.order_clause()
                );
                sqlx::query_as(&sql)
                    .bind(kind)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT serial, expire_on, amount, status FROM coupons \
                     ORDER BY {} LIMIT ? OFFSET ?",
                    query.order_clause()
                );
                sqlx::query_as(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let results = rows
            .into_iter()
            .map(to_view)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CouponPage { total, results })
    }

    async fn get_coupon(&self, serial: &str) -> Result<Option<CouponRecord>, CouponError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT serial, code, kind, amount, expire_on, status, username, namespace, use_time
            FROM coupons
            WHERE serial = ?
            "#,
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await?;

        let Some((serial, code, kind, amount, expire_on, status, username, namespace, use_time)) =
            row
        else {
            return Ok(None);
        };
        Ok(Some(CouponRecord {
            serial,
            code,
            kind,
            amount: amount_from_text(&amount)?,
            expire_on,
            status: status.parse()?,
            username,
            namespace,
            use_time,
        }))
    }
}
