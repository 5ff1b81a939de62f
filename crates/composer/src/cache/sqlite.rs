//! SQLite implementation of CacheStore.
//!
//! Every handle opened on the same file sees the same entries and competes
//! for the same locks, so instances sharing a host or volume share work.
//! Each statement runs under SQLite's write lock, which is what makes
//! `set_if_absent` and `compare_and_delete` atomic across processes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::store::{CacheStore, StoreError, SWEEP_EVERY};

const SCHEMA: &str = "
	CREATE TABLE IF NOT EXISTS cache_entries (
		key TEXT PRIMARY KEY NOT NULL,
		value BLOB NOT NULL,
		expires_at INTEGER
	);
	CREATE INDEX IF NOT EXISTS cache_entries_expires_at ON cache_entries (expires_at);
";

pub struct SqliteStore {
	conn: Arc<Mutex<Connection>>,
	writes: AtomicUsize,
}

impl SqliteStore {
	/// Open (or create) the store at `path`.
	///
	/// `busy_timeout` bounds how long a statement waits for another handle
	/// holding the write lock.
	pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
		let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
		let conn = Connection::open_with_flags(path.as_ref(), flags).map_err(storage)?;
		conn.busy_timeout(busy_timeout).map_err(storage)?;
		conn
			.execute_batch("PRAGMA journal_mode = WAL;")
			.map_err(storage)?;
		conn
			.execute_batch("PRAGMA synchronous = NORMAL;")
			.map_err(storage)?;
		conn.execute_batch(SCHEMA).map_err(storage)?;
		Ok(Self {
			conn: Arc::new(Mutex::new(conn)),
			writes: AtomicUsize::new(0),
		})
	}

	/// Number of rows, including expired ones not yet swept.
	pub async fn len(&self) -> Result<usize, StoreError> {
		self
			.run(|conn| {
				conn
					.query_row("SELECT COUNT(*) FROM cache_entries", params![], |row| row.get::<_, i64>(0))
					.map(|n| n as usize)
			})
			.await
	}

	async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
	where
		T: Send + 'static,
		F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
	{
		let conn = self.conn.clone();
		tokio::task::spawn_blocking(move || op(&conn.lock()))
			.await
			.map_err(|err| StoreError::Storage(err.to_string()))?
			.map_err(storage)
	}

	fn sweep_due(&self) -> bool {
		(self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0
	}
}

fn storage(err: rusqlite::Error) -> StoreError {
	StoreError::Storage(err.to_string())
}

/// Expiry is wall-clock so that separate processes agree on it.
fn now_ms() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
		.unwrap_or(0)
}

fn expires_at(now: i64, ttl: Duration) -> i64 {
	now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn sweep(conn: &Connection, now: i64) -> rusqlite::Result<usize> {
	conn.execute(
		"DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
		params![now],
	)
}

#[async_trait]
impl CacheStore for SqliteStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		let key = key.to_string();
		let now = now_ms();
		self
			.run(move |conn| {
				conn
					.query_row(
						"SELECT value FROM cache_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
						params![key, now],
						|row| row.get(0),
					)
					.optional()
			})
			.await
	}

	async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
		let key = key.to_string();
		let now = now_ms();
		let expires = ttl.map(|ttl| expires_at(now, ttl));
		let sweep_due = self.sweep_due();
		self
			.run(move |conn| {
				if sweep_due {
					sweep(conn, now)?;
				}
				conn.execute(
					"INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
					ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
					params![key, value, expires],
				)?;
				Ok(())
			})
			.await
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
		let key = key.to_string();
		let now = now_ms();
		let expires = expires_at(now, ttl);
		let sweep_due = self.sweep_due();
		self
			.run(move |conn| {
				if sweep_due {
					sweep(conn, now)?;
				}
				// An expired row is taken over in place; a live one leaves the upsert a no-op.
				let changed = conn.execute(
					"INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
					ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
					WHERE cache_entries.expires_at IS NOT NULL AND cache_entries.expires_at <= ?4",
					params![key, value, expires, now],
				)?;
				Ok(changed == 1)
			})
			.await
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		let key = key.to_string();
		self
			.run(move |conn| {
				conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
				Ok(())
			})
			.await
	}

	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
		let key = key.to_string();
		let expected = expected.to_vec();
		let now = now_ms();
		self
			.run(move |conn| {
				let deleted = conn.execute(
					"DELETE FROM cache_entries
					WHERE key = ?1 AND value = ?2 AND (expires_at IS NULL OR expires_at > ?3)",
					params![key, expected, now],
				)?;
				Ok(deleted == 1)
			})
			.await
	}
}
