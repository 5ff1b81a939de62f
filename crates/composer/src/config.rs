//! Service configuration, loaded from YAML.
//!
//! Every section has defaults, so an empty file (or no file) yields a
//! working local setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Yaml(#[from] serde_yaml::Error),
	#[error("invalid config: {0}")]
	Invalid(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ComposerConfig {
	pub scheduler: SchedulerConfig,
	pub cache: CacheConfig,
	pub external: ExternalConfig,
	/// Decrypts the per-request external endpoint secret.
	#[serde(deserialize_with = "deserialize_secret")]
	pub encryption_secret: Option<SecretString>,
	pub logging: LoggingConfig,
	pub listen: String,
}

impl Default for ComposerConfig {
	fn default() -> Self {
		Self {
			scheduler: SchedulerConfig::default(),
			cache: CacheConfig::default(),
			external: ExternalConfig::default(),
			encryption_secret: None,
			logging: LoggingConfig::default(),
			listen: "0.0.0.0:3069".to_string(),
		}
	}
}

impl ComposerConfig {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = fs_err::read_to_string(path.as_ref())?;
		Self::from_yaml(&raw)
	}

	pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
		let config: ComposerConfig = if raw.trim().is_empty() {
			ComposerConfig::default()
		} else {
			serde_yaml::from_str(raw)?
		};
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.scheduler.workers == 0 {
			return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
		}
		if self.cache.poll_interval.is_zero() {
			return Err(ConfigError::Invalid("cache.pollInterval must be positive".into()));
		}
		if self.cache.lock_ttl < self.cache.timeout {
			return Err(ConfigError::Invalid(
				"cache.lockTtl must not be shorter than cache.timeout".into(),
			));
		}
		if let StoreConfig::Sqlite { path, .. } = &self.cache.store
			&& path.as_os_str().is_empty()
		{
			return Err(ConfigError::Invalid("cache.store.path must not be empty".into()));
		}
		Ok(())
	}
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw: Option<String> = Option::deserialize(deserializer)?;
	Ok(raw.map(SecretString::from))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SchedulerConfig {
	/// Number of worker threads; each runs one composition at a time.
	pub workers: usize,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			workers: num_cpus::get().max(1),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheConfig {
	/// Prepended to every key written to the store.
	pub prefix: String,
	#[serde(with = "crate::serde_dur")]
	pub poll_interval: Duration,
	/// Overall budget for a single reuse call, computing or waiting.
	#[serde(with = "crate::serde_dur")]
	pub timeout: Duration,
	#[serde(with = "crate::serde_dur")]
	pub success_ttl: Duration,
	#[serde(with = "crate::serde_dur")]
	pub failure_ttl: Duration,
	#[serde(with = "crate::serde_dur")]
	pub lock_ttl: Duration,
	/// Where entries and locks live. Several instances must point at the
	/// same persistent store to share work.
	pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
	/// Process-local; lost on restart.
	#[default]
	Memory,
	/// A SQLite file shared by every instance that opens it.
	#[serde(rename_all = "camelCase")]
	Sqlite {
		path: PathBuf,
		#[serde(with = "crate::serde_dur", default = "default_busy_timeout")]
		busy_timeout: Duration,
	},
}

fn default_busy_timeout() -> Duration {
	Duration::from_secs(5)
}

impl Default for CacheConfig {
	fn default() -> Self {
		let timeout = Duration::from_secs(60);
		Self {
			prefix: "schema-composer".to_string(),
			poll_interval: Duration::from_millis(500),
			timeout,
			success_ttl: Duration::from_secs(24 * 60 * 60),
			failure_ttl: Duration::from_secs(5 * 60),
			lock_ttl: timeout + Duration::from_secs(10),
			store: StoreConfig::Memory,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ExternalConfig {
	#[serde(with = "crate::serde_dur")]
	pub request_timeout: Duration,
}

impl Default for ExternalConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
	pub format: LogFormat,
	/// `EnvFilter` directives; `RUST_LOG` wins when set.
	pub filter: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			format: LogFormat::Text,
			filter: "info".to_string(),
		}
	}
}
