use std::time::Duration;

use async_trait::async_trait;

/// Writes between two sweeps of expired entries.
pub(crate) const SWEEP_EVERY: usize = 64;

/// Error type for CacheStore operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("serialization error: {0}")]
	Serialization(String),
	#[error("storage error: {0}")]
	Storage(String),
}

/// Shared key/value store backing the composition cache.
///
/// Implementations are expected to be shared by every service instance, so
/// the lock primitives (`set_if_absent`, `compare_and_delete`) must be atomic
/// in the store itself, not just in-process.
#[async_trait]
pub trait CacheStore: Send + Sync {
	/// Get a value by key.
	///
	/// Returns `Ok(None)` if the key doesn't exist or has expired.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

	/// Set a value with an optional TTL, replacing any existing value.
	async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;

	/// Set a value only if the key is absent (or expired).
	///
	/// Returns whether the value was written.
	async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, StoreError>;

	/// Delete a key.
	///
	/// Returns `Ok(())` regardless of whether the key existed.
	async fn delete(&self, key: &str) -> Result<(), StoreError>;

	/// Delete a key only if it currently holds `expected`.
	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

	/// Check if a key exists and hasn't expired.
	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		Ok(self.get(key).await?.is_some())
	}
}
