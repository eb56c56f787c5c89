//! Crash-safe outcome store backed by SQLite: one process-wide pool, one
//! `outcomes` table, WAL-mode journaling so readers never block on the
//! writer's commit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::info;

use crate::domain::outcome::{ErrorKind, OutcomeRecord, TerminalStatus, UserState};
use crate::domain::target::TargetFormat;
use crate::error::{BlockSweepError, Result};

const EMBEDDED_SCHEMA: &str = include_str!("../migrations/001_outcomes.sql");

#[derive(Debug, Clone)]
pub struct PersistenceStore {
    pool: SqlitePool,
}

/// Which rows a bulk attempt-reset targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    All,
    FailedOnly,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceStats {
    pub total: u64,
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
    pub retry_eligible: u64,
    pub retry_ceiling_reached: u64,
    pub by_user_state: HashMap<UserState, u64>,
    pub by_error_kind: HashMap<ErrorKind, u64>,
}

impl PersistenceStore {
    pub async fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path: PathBuf = database_path.as_ref().to_path_buf();
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlockSweepError::Persistence(sqlx::Error::Io(e)))?;
        }
        if !database_path.exists() {
            std::fs::File::create(&database_path)
                .map_err(|e| BlockSweepError::Persistence(sqlx::Error::Io(e)))?;
        }

        let database_url = format!("sqlite:{}", database_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // WAL keeps readers (the fan-out callers and the stats reporter) from
        // blocking on the writer's commit, and vice versa, beyond a short
        // checkpoint window.
        sqlx::query("PRAGMA journal_mode = WAL").execute(&self.pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&self.pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&self.pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&self.pool).await?;
        sqlx::query(EMBEDDED_SCHEMA).execute(&self.pool).await?;
        info!("outcome store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new row for a target, or update the existing one keyed on
    /// numeric id (falling back to handle when no numeric id is known).
    /// Attempt count is the existing count plus one on update, one on
    /// insert — never reset implicitly.
    pub async fn record_outcome(&self, record: &OutcomeRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // A numeric id present on the incoming record may still belong to a
        // row that was first written handle-only (the id was unknown at the
        // time). Prefer an exact numeric-id match, but fall back to the
        // handle-only row so the id attaches in place instead of spawning a
        // second row for the same target (spec: "same row, not duplicated").
        let existing_id: Option<i64> = if let Some(numeric_id) = &record.numeric_id {
            let by_numeric_id: Option<i64> = sqlx::query_scalar("SELECT id FROM outcomes WHERE numeric_id = ?")
                .bind(numeric_id)
                .fetch_optional(&mut *tx)
                .await?;
            if by_numeric_id.is_some() {
                by_numeric_id
            } else if let Some(handle) = &record.handle {
                sqlx::query_scalar("SELECT id FROM outcomes WHERE handle = ? AND numeric_id IS NULL")
                    .bind(handle)
                    .fetch_optional(&mut *tx)
                    .await?
            } else {
                None
            }
        } else if let Some(handle) = &record.handle {
            sqlx::query_scalar("SELECT id FROM outcomes WHERE handle = ? AND numeric_id IS NULL")
                .bind(handle)
                .fetch_optional(&mut *tx)
                .await?
        } else {
            return Err(BlockSweepError::Config(
                "outcome record has neither numeric_id nor handle".into(),
            ));
        };

        let error_kind = record.error_kind.map(|k| serde_variant_name(&k));
        let status = serde_variant_name(&record.status);
        let user_state = serde_variant_name(&record.user_state);

        if let Some(id) = existing_id {
            let previous_attempts: i64 =
                sqlx::query_scalar("SELECT attempt_count FROM outcomes WHERE id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            let next_attempts = (previous_attempts + 1).max(1);
            // numeric_id/handle are included so a handle-only row picks up
            // its numeric id (or vice versa) the first time it's resolved,
            // without ever clobbering a known value with a NULL.
            sqlx::query(
                "UPDATE outcomes SET numeric_id = COALESCE(?, numeric_id), handle = COALESCE(?, handle), \
                 display_name = COALESCE(?, display_name), status = ?, user_state = ?, error_kind = ?, \
                 error_message = ?, http_status = ?, attempt_count = ?, last_updated_at = ?, session_id = ? \
                 WHERE id = ?",
            )
            .bind(&record.numeric_id)
            .bind(&record.handle)
            .bind(&record.display_name)
            .bind(&status)
            .bind(&user_state)
            .bind(&error_kind)
            .bind(&record.error_message)
            .bind(record.http_status.map(|s| s as i64))
            .bind(next_attempts)
            .bind(record.last_updated_at.to_rfc3339())
            .bind(&record.session_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO outcomes (numeric_id, handle, display_name, status, user_state, \
                 error_kind, error_message, http_status, attempt_count, first_seen_at, \
                 last_updated_at, session_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
            )
            .bind(&record.numeric_id)
            .bind(&record.handle)
            .bind(&record.display_name)
            .bind(&status)
            .bind(&user_state)
            .bind(&error_kind)
            .bind(&record.error_message)
            .bind(record.http_status.map(|s| s as i64))
            .bind(record.first_seen_at.to_rfc3339())
            .bind(record.last_updated_at.to_rfc3339())
            .bind(&record.session_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Permanent-failure subset of `batch`, as a single bulk query keyed on
    /// whichever column the list's format uses — the primary N+1
    /// elimination: one query per batch, never one per identifier.
    pub async fn get_permanent_failures(&self, batch: &[String], format: TargetFormat) -> Result<HashMap<String, OutcomeRecord>> {
        self.bulk_lookup_by_identifier(
            batch,
            format,
            "status = 'failed' AND user_state IN ('suspended', 'not_found', 'deactivated')",
        )
        .await
    }

    /// Already-succeeded subset of `batch`, same bulk contract.
    pub async fn get_successful(&self, batch: &[String], format: TargetFormat) -> Result<HashMap<String, OutcomeRecord>> {
        self.bulk_lookup_by_identifier(batch, format, "status = 'success'").await
    }

    async fn bulk_lookup_by_identifier(
        &self,
        batch: &[String],
        format: TargetFormat,
        predicate: &str,
    ) -> Result<HashMap<String, OutcomeRecord>> {
        if batch.is_empty() {
            return Ok(HashMap::new());
        }
        let column = match format {
            TargetFormat::UserId => "numeric_id",
            TargetFormat::ScreenName => "handle",
        };

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT * FROM outcomes WHERE {predicate} AND {column} IN ("));
        {
            let mut separated = builder.separated(", ");
            for id in batch {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row)?;
            let key = match format {
                TargetFormat::UserId => record.numeric_id.clone(),
                TargetFormat::ScreenName => record.handle.clone(),
            };
            if let Some(key) = key {
                out.insert(key, record);
            }
        }
        Ok(out)
    }

    pub async fn list_retry_candidates(&self, retry_ceiling: u32) -> Result<Vec<OutcomeRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM outcomes WHERE status = 'failed' AND user_state NOT IN \
             ('suspended', 'not_found', 'deactivated') AND attempt_count < ?",
        )
        .bind(retry_ceiling as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn reset_attempts(&self, scope: ResetScope) -> Result<u64> {
        let result = match scope {
            ResetScope::All => sqlx::query("UPDATE outcomes SET attempt_count = 0")
                .execute(&self.pool)
                .await?,
            ResetScope::FailedOnly => {
                sqlx::query("UPDATE outcomes SET attempt_count = 0 WHERE status = 'failed'")
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<PersistenceStats> {
        let mut stats = PersistenceStats::default();

        let totals = sqlx::query("SELECT status, COUNT(*) as c FROM outcomes GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in totals {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("c")?;
            stats.total += count as u64;
            match status.as_str() {
                "success" => stats.success = count as u64,
                "skipped" => stats.skipped = count as u64,
                "failed" => stats.failed = count as u64,
                _ => {}
            }
        }

        let retry_eligible: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outcomes WHERE status = 'failed' AND user_state NOT IN \
             ('suspended', 'not_found', 'deactivated') AND attempt_count < ?",
        )
        .bind(crate::retry::DEFAULT_RETRY_CEILING as i64)
        .fetch_one(&self.pool)
        .await?;
        stats.retry_eligible = retry_eligible as u64;

        let retry_ceiling_reached: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outcomes WHERE status = 'failed' AND user_state NOT IN \
             ('suspended', 'not_found', 'deactivated') AND attempt_count >= ?",
        )
        .bind(crate::retry::DEFAULT_RETRY_CEILING as i64)
        .fetch_one(&self.pool)
        .await?;
        stats.retry_ceiling_reached = retry_ceiling_reached as u64;

        let user_state_rows =
            sqlx::query("SELECT user_state, COUNT(*) as c FROM outcomes GROUP BY user_state")
                .fetch_all(&self.pool)
                .await?;
        for row in user_state_rows {
            let name: String = row.try_get("user_state")?;
            let count: i64 = row.try_get("c")?;
            if let Some(state) = user_state_from_str(&name) {
                stats.by_user_state.insert(state, count as u64);
            }
        }

        let error_kind_rows = sqlx::query(
            "SELECT error_kind, COUNT(*) as c FROM outcomes WHERE error_kind IS NOT NULL GROUP BY error_kind",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in error_kind_rows {
            let name: String = row.try_get("error_kind")?;
            let count: i64 = row.try_get("c")?;
            if let Some(kind) = error_kind_from_str(&name) {
                stats.by_error_kind.insert(kind, count as u64);
            }
        }

        Ok(stats)
    }

    /// Up to `limit` recent error messages for one error kind, for the
    /// statistics reporter's sample dump.
    pub async fn sample_error_messages(&self, kind: ErrorKind, limit: u32) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT error_message FROM outcomes WHERE error_kind = ? AND error_message IS NOT NULL \
             ORDER BY last_updated_at DESC LIMIT ?",
        )
        .bind(serde_variant_name(&kind))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<Option<String>, _>("error_message").ok().flatten())
            .collect())
    }
}

fn serde_variant_name<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn user_state_from_str(s: &str) -> Option<UserState> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

fn error_kind_from_str(s: &str) -> Option<ErrorKind> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

fn row_to_record(row: &SqliteRow) -> Result<OutcomeRecord> {
    let status_raw: String = row.try_get("status")?;
    let user_state_raw: String = row.try_get("user_state")?;
    let error_kind_raw: Option<String> = row.try_get("error_kind")?;
    let first_seen_raw: String = row.try_get("first_seen_at")?;
    let last_updated_raw: String = row.try_get("last_updated_at")?;
    let http_status_raw: Option<i64> = row.try_get("http_status")?;
    let attempt_count_raw: i64 = row.try_get("attempt_count")?;

    Ok(OutcomeRecord {
        handle: row.try_get("handle")?,
        numeric_id: row.try_get("numeric_id")?,
        display_name: row.try_get("display_name")?,
        status: serde_json::from_value(serde_json::Value::String(status_raw))
            .map_err(|e| BlockSweepError::Config(format!("malformed status in store: {e}")))?,
        user_state: serde_json::from_value(serde_json::Value::String(user_state_raw))
            .map_err(|e| BlockSweepError::Config(format!("malformed user_state in store: {e}")))?,
        error_kind: error_kind_raw
            .map(|s| serde_json::from_value(serde_json::Value::String(s)))
            .transpose()
            .map_err(|e| BlockSweepError::Config(format!("malformed error_kind in store: {e}")))?,
        error_message: row.try_get("error_message")?,
        http_status: http_status_raw.map(|v| v as u16),
        attempt_count: attempt_count_raw as u32,
        first_seen_at: parse_timestamp(&first_seen_raw)?,
        last_updated_at: parse_timestamp(&last_updated_raw)?,
        session_id: row.try_get("session_id")?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BlockSweepError::Config(format!("malformed timestamp in store: {e}")))
}
