//! Distributed memoization of composition results.
//!
//! [`Cache::reuse`] wraps a computation so that, across every caller sharing
//! the same [`CacheStore`], at most one computation per key runs at a time.
//! The computing party holds a leased lock in the store; everyone else polls
//! until the value shows up or the overall timeout elapses.

mod memory;
mod sqlite;
mod store;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{CacheStore, StoreError};

use crate::config::{CacheConfig, StoreConfig};
use crate::crypto::sha256_hex;

/// Error type for cache execution
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	#[error("store error: {0}")]
	Store(#[from] StoreError),
	#[error("serialization error: {0}")]
	Serialization(String),
	#[error("computation failed: {0}")]
	Compute(String),
	#[error("timed out waiting for the cached value")]
	Timeout,
}

impl CacheError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, CacheError::Timeout)
	}
}

/// Retention class of a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
	Long,
	Short,
}

/// Stored alongside the value so a hit can be told apart from a refresh.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry<T> {
	value: T,
	ttl_class: TtlClass,
}

/// Open the store selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>, StoreError> {
	Ok(match config {
		StoreConfig::Memory => Arc::new(MemoryStore::new()),
		StoreConfig::Sqlite { path, busy_timeout } => Arc::new(SqliteStore::open(path, *busy_timeout)?),
	})
}

#[derive(Clone)]
pub struct Cache {
	store: Arc<dyn CacheStore>,
	config: CacheConfig,
}

impl Cache {
	pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
		Self { store, config }
	}

	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Wrap `compute` under `category`.
	///
	/// `compute` receives the call arguments and a token the cache cancels
	/// when the overall timeout elapses while it is still running.
	pub fn reuse<A, T, F, Fut, E>(&self, category: impl Into<String>, compute: F) -> Reuse<A, T, F>
	where
		A: Serialize,
		T: Serialize + DeserializeOwned,
		F: Fn(A, CancellationToken) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		Reuse {
			cache: self.clone(),
			category: category.into(),
			compute,
			classify: None,
			_args: std::marker::PhantomData,
		}
	}

	/// Store key for `args` under `category`.
	///
	/// The arguments' serialized form is hashed as-is, so argument order
	/// (subgraph order, for instance) is part of the key.
	pub fn key<A: Serialize>(&self, category: &str, args: &A) -> Result<String, CacheError> {
		let encoded = serde_json::to_vec(args).map_err(|e| CacheError::Serialization(e.to_string()))?;
		let mut material = Vec::with_capacity(category.len() + encoded.len());
		material.extend_from_slice(category.as_bytes());
		material.extend_from_slice(&encoded);
		Ok(format!("{}:{}", self.config.prefix, sha256_hex(&material)))
	}

	async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
		match self.store.get(key).await? {
			Some(bytes) => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| CacheError::Serialization(e.to_string())),
			None => Ok(None),
		}
	}

	async fn release(&self, lock_key: &str, owner: &str) {
		if let Err(err) = self.store.compare_and_delete(lock_key, owner.as_bytes()).await {
			// The lease runs out on its own.
			warn!(target: "cache", key = %lock_key, error = %err, "failed to release lock");
		}
	}
}

type Classifier<T> = Box<dyn Fn(&T) -> TtlClass + Send + Sync>;

/// A memoized computation, created by [`Cache::reuse`].
pub struct Reuse<A, T, F> {
	cache: Cache,
	category: String,
	compute: F,
	classify: Option<Classifier<T>>,
	_args: std::marker::PhantomData<fn(A)>,
}

impl<A, T, F, Fut, E> Reuse<A, T, F>
where
	A: Serialize,
	T: Serialize + DeserializeOwned,
	F: Fn(A, CancellationToken) -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
{
	/// Pick the retention class per result. Without one, everything is `Long`.
	pub fn classify(mut self, classify: impl Fn(&T) -> TtlClass + Send + Sync + 'static) -> Self {
		self.classify = Some(Box::new(classify));
		self
	}

	pub async fn call(&self, args: A) -> Result<T, CacheError> {
		let config = &self.cache.config;
		let key = self.cache.key(&self.category, &args)?;
		let lock_key = format!("{}:lock", key);
		let deadline = Instant::now() + config.timeout;

		loop {
			if let Some(entry) = self.cache.lookup::<T>(&key).await? {
				debug!(target: "cache", %key, ttl_class = ?entry.ttl_class, "cache hit");
				return Ok(entry.value);
			}

			let owner = uuid::Uuid::new_v4().to_string();
			if self
				.cache
				.store
				.set_if_absent(&lock_key, owner.clone().into_bytes(), config.lock_ttl)
				.await?
			{
				return self.compute(&key, &lock_key, &owner, args, deadline).await;
			}

			let now = Instant::now();
			if now >= deadline {
				debug!(target: "cache", %key, "gave up waiting for computation");
				return Err(CacheError::Timeout);
			}
			tokio::time::sleep(config.poll_interval.min(deadline - now)).await;
		}
	}

	async fn compute(
		&self,
		key: &str,
		lock_key: &str,
		owner: &str,
		args: A,
		deadline: Instant,
	) -> Result<T, CacheError> {
		// Someone may have published between our miss and taking the lock.
		match self.cache.lookup::<T>(key).await {
			Ok(Some(entry)) => {
				self.cache.release(lock_key, owner).await;
				return Ok(entry.value);
			},
			Ok(None) => {},
			Err(err) => {
				self.cache.release(lock_key, owner).await;
				return Err(err);
			},
		}

		debug!(target: "cache", %key, "computing");
		let token = CancellationToken::new();
		let computation = (self.compute)(args, token.clone());
		tokio::pin!(computation);

		let result = tokio::select! {
			result = &mut computation => result,
			_ = tokio::time::sleep_until(deadline) => {
				warn!(target: "cache", %key, "computation timed out, cancelling");
				token.cancel();
				// Let the computation observe the cancellation and wind down.
				let _ = computation.await;
				self.cache.release(lock_key, owner).await;
				return Err(CacheError::Timeout);
			},
		};

		let value = match result {
			Ok(value) => value,
			Err(err) => {
				self.cache.release(lock_key, owner).await;
				return Err(CacheError::Compute(err.to_string()));
			},
		};

		let ttl_class = self.classify.as_ref().map_or(TtlClass::Long, |c| c(&value));
		let ttl = match ttl_class {
			TtlClass::Long => self.cache.config.success_ttl,
			TtlClass::Short => self.cache.config.failure_ttl,
		};
		let stored = serde_json::to_vec(&CacheEntry {
			value: &value,
			ttl_class,
		})
		.map_err(|e| CacheError::Serialization(e.to_string()));

		let published = match stored {
			Ok(bytes) => self
				.cache
				.store
				.set(key, bytes, Some(ttl))
				.await
				.map_err(CacheError::from),
			Err(err) => Err(err),
		};
		self.cache.release(lock_key, owner).await;
		published?;

		debug!(target: "cache", %key, ?ttl_class, "stored");
		Ok(value)
	}
}
