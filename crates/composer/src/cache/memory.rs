//! In-process implementation of CacheStore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::store::{CacheStore, StoreError, SWEEP_EVERY};

/// Entry in the memory store with optional expiration
struct MemoryEntry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl MemoryEntry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl.map(|d| Instant::now() + d),
		}
	}

	fn is_expired(&self) -> bool {
		self.expires_at.is_some_and(|exp| Instant::now() >= exp)
	}
}

/// In-memory implementation of CacheStore.
///
/// Expiry follows the tokio clock, so tests with a paused runtime can
/// fast-forward through TTLs. Only suitable for single-instance deployments;
/// several instances need a shared store behind the same trait.
#[derive(Default)]
pub struct MemoryStore {
	data: Mutex<HashMap<String, MemoryEntry>>,
	writes: AtomicUsize,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of entries, including expired ones not yet evicted.
	pub fn len(&self) -> usize {
		self.data.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.lock().is_empty()
	}

	/// Drop every expired entry.
	pub fn evict_expired(&self) {
		self.data.lock().retain(|_, entry| !entry.is_expired());
	}

	/// Entries are otherwise only dropped when their own key is read again.
	fn insert(&self, data: &mut HashMap<String, MemoryEntry>, key: &str, entry: MemoryEntry) {
		if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
			data.retain(|_, entry| !entry.is_expired());
		}
		data.insert(key.to_string(), entry);
	}
}

#[async_trait]
impl CacheStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		let mut data = self.data.lock();

		if let Some(entry) = data.get(key) {
			if entry.is_expired() {
				data.remove(key);
				return Ok(None);
			}
			return Ok(Some(entry.value.clone()));
		}

		Ok(None)
	}

	async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
		let mut data = self.data.lock();
		self.insert(&mut data, key, MemoryEntry::new(value, ttl));
		Ok(())
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError> {
		let mut data = self.data.lock();
		if data.get(key).is_some_and(|entry| !entry.is_expired()) {
			return Ok(false);
		}
		self.insert(&mut data, key, MemoryEntry::new(value, Some(ttl)));
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		self.data.lock().remove(key);
		Ok(())
	}

	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
		let mut data = self.data.lock();
		match data.get(key) {
			Some(entry) if !entry.is_expired() && entry.value == expected => {
				data.remove(key);
				Ok(true)
			},
			_ => Ok(false),
		}
	}
}
