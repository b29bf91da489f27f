use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{CacheStore, Op, StoreError, StoreResult};
use crate::db::DbPool;

const LIST: &str = "list";
const SET: &str = "set";
const COUNTER: &str = "counter";

/// Durable cache store on SQLite. Survives restarts, which spares a cold start
/// from backfilling every timeline through the post catalog.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Expects a pool that has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// SQLite integers are signed; counts past `i64::MAX` saturate instead of wrapping
/// negative, which SQLite would read as "no limit" or "offset 0".
fn sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn deadline(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Kind of the live value at `key`. An expired key is deleted on the way.
fn live_kind(conn: &Connection, key: &str, now: i64) -> StoreResult<Option<String>> {
    let row: Option<(String, Option<i64>)> = conn
        .query_row(
            "SELECT kind, expires_at FROM cache_keys WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((_, Some(expires_at))) if expires_at <= now => {
            conn.execute("DELETE FROM cache_keys WHERE key = ?1", params![key])?;
            Ok(None)
        }
        Some((kind, _)) => Ok(Some(kind)),
        None => Ok(None),
    }
}

/// Creates `key` with `kind` if absent; fails if it exists with another kind.
fn ensure_kind(conn: &Connection, key: &str, kind: &str, now: i64) -> StoreResult<()> {
    match live_kind(conn, key, now)? {
        None => {
            conn.execute(
                "INSERT INTO cache_keys (key, kind) VALUES (?1, ?2)",
                params![key, kind],
            )?;
            Ok(())
        }
        Some(existing) if existing == kind => Ok(()),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn require_kind(conn: &Connection, key: &str, kind: &str, now: i64) -> StoreResult<bool> {
    match live_kind(conn, key, now)? {
        None => Ok(false),
        Some(existing) if existing == kind => Ok(true),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn drop_if_empty(conn: &Connection, key: &str) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM cache_keys
         WHERE key = ?1
           AND kind IN ('list', 'set')
           AND NOT EXISTS (SELECT 1 FROM cache_list_items WHERE key = ?1)
           AND NOT EXISTS (SELECT 1 FROM cache_set_members WHERE key = ?1)",
        params![key],
    )?;
    Ok(())
}

fn apply(conn: &Connection, op: Op, now: i64) -> StoreResult<()> {
    match op {
        Op::PushFront { key, value } => {
            ensure_kind(conn, &key, LIST, now)?;
            conn.execute(
                "INSERT INTO cache_list_items (key, pos, value)
                 VALUES (?1, (SELECT COALESCE(MIN(pos), 0) - 1 FROM cache_list_items WHERE key = ?1), ?2)",
                params![key, value],
            )?;
        }
        Op::PushBack { key, values } => {
            ensure_kind(conn, &key, LIST, now)?;
            let mut stmt = conn.prepare_cached(
                "INSERT INTO cache_list_items (key, pos, value)
                 VALUES (?1, (SELECT COALESCE(MAX(pos), 0) + 1 FROM cache_list_items WHERE key = ?1), ?2)",
            )?;
            for value in values {
                stmt.execute(params![key, value])?;
            }
            drop_if_empty(conn, &key)?;
        }
        Op::Trim { key, keep } => {
            if require_kind(conn, &key, LIST, now)? {
                conn.execute(
                    "DELETE FROM cache_list_items
                     WHERE key = ?1
                       AND pos NOT IN (
                         SELECT pos FROM cache_list_items WHERE key = ?1 ORDER BY pos LIMIT ?2
                       )",
                    params![key, sql_int(keep)],
                )?;
                drop_if_empty(conn, &key)?;
            }
        }
        Op::Delete { key } => {
            conn.execute("DELETE FROM cache_keys WHERE key = ?1", params![key])?;
        }
        Op::Expire { key, ttl } => {
            if live_kind(conn, &key, now)?.is_some() {
                conn.execute(
                    "UPDATE cache_keys SET expires_at = ?2 WHERE key = ?1",
                    params![key, deadline(now, ttl)],
                )?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn atomic(&self, ops: Vec<Op>) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let now = now_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for op in ops {
                apply(&tx, op, now)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn range(&self, key: &str, offset: usize, limit: usize) -> StoreResult<Vec<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            if !require_kind(conn, &key, LIST, now_millis())? {
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare_cached(
                "SELECT value FROM cache_list_items WHERE key = ?1 ORDER BY pos LIMIT ?2 OFFSET ?3",
            )?;
            let values = stmt
                .query_map(params![key, sql_int(limit), sql_int(offset)], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(values)
        })
        .await
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_kind(&tx, &key, SET, now_millis())?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO cache_set_members (key, member) VALUES (?1, ?2)",
                params![key, member],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !require_kind(&tx, &key, SET, now_millis())? {
                return Ok(false);
            }
            let removed = tx.execute(
                "DELETE FROM cache_set_members WHERE key = ?1 AND member = ?2",
                params![key, member],
            )?;
            drop_if_empty(&tx, &key)?;
            tx.commit()?;
            Ok(removed == 1)
        })
        .await
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_conn(move |conn| {
            if !require_kind(conn, &key, SET, now_millis())? {
                return Ok(false);
            }
            let found: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM cache_set_members WHERE key = ?1 AND member = ?2",
                params![key, member],
                |row| row.get(0),
            )?;
            Ok(found)
        })
        .await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            if !require_kind(conn, &key, SET, now_millis())? {
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare_cached(
                "SELECT member FROM cache_set_members WHERE key = ?1 ORDER BY member",
            )?;
            let members = stmt
                .query_map(params![key], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(members)
        })
        .await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let now = now_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let count = if require_kind(&tx, &key, COUNTER, now)? {
                tx.execute(
                    "UPDATE cache_keys SET counter = counter + 1 WHERE key = ?1",
                    params![key],
                )?;
                tx.query_row(
                    "SELECT counter FROM cache_keys WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, i64>(0),
                )?
            } else {
                tx.execute(
                    "INSERT INTO cache_keys (key, kind, counter, expires_at) VALUES (?1, ?2, 1, ?3)",
                    params![key, COUNTER, deadline(now, ttl)],
                )?;
                1
            };
            tx.commit()?;
            Ok(count as u64)
        })
        .await
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_keys WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_millis()],
            )?;
            Ok(removed)
        })
        .await
    }
}
