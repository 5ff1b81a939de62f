use std::sync::Arc;
use std::time::Duration;

use composer::cache::MemoryStore;
use composer::composition::{CompositionEngine, EngineSettings};
use composer::config::ComposerConfig;
use composer::crypto::SecretCipher;
use composer::telemetry::TracingErrorReporter;
use composer::CompositionService;
use secrecy::SecretString;

pub const ENCRYPTION_SECRET: &str = "integration-encryption-secret";
pub const SHARED_SECRET: &str = "shared-endpoint-secret";

pub fn cipher() -> Arc<SecretCipher> {
	Arc::new(SecretCipher::new(&SecretString::from(ENCRYPTION_SECRET)).unwrap())
}

pub fn engine() -> CompositionEngine {
	CompositionEngine::new(EngineSettings {
		cipher: Some(cipher()),
		external_timeout: Duration::from_secs(5),
	})
}

pub fn service() -> CompositionService {
	let config = ComposerConfig::from_yaml(&format!(
		r#"
scheduler:
  workers: 2
cache:
  pollInterval: 20ms
  timeout: 10s
  lockTtl: 20s
encryptionSecret: {}
"#,
		ENCRYPTION_SECRET
	))
	.unwrap();
	CompositionService::from_config(&config, Arc::new(MemoryStore::new()), Arc::new(TracingErrorReporter)).unwrap()
}
