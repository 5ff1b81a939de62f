//! Composition strategies and the engine that dispatches between them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::crypto::SecretCipher;
use crate::error::CompositionError;
use crate::types::{CompositionOutcome, CompositionRequest, CompositionResult, CompositionStrategy};

pub mod federation;
pub mod metadata;
pub mod single;
pub mod stitching;

pub use federation::{FederationComposer, FederationEngine, FederationVersion};
pub use single::compose_single;
pub use stitching::compose_stitching;

#[derive(Debug, Clone)]
pub struct EngineSettings {
	/// Decrypts external endpoint secrets; external composition fails without it.
	pub cipher: Option<Arc<SecretCipher>>,
	pub external_timeout: Duration,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			cipher: None,
			external_timeout: Duration::from_secs(30),
		}
	}
}

/// Runs one request through the strategy it asks for.
#[derive(Debug, Clone)]
pub struct CompositionEngine {
	external: federation::ExternalComposer,
}

impl CompositionEngine {
	pub fn new(settings: EngineSettings) -> Self {
		Self {
			external: federation::ExternalComposer::new(settings.cipher, settings.external_timeout),
		}
	}

	pub async fn compose(&self, request: &CompositionRequest, request_id: &str) -> CompositionResult {
		debug!(
			target: "composition",
			%request_id,
			composition_type = %request.strategy,
			schemas = request.schemas.len(),
			"composing"
		);
		let result = match request.strategy {
			CompositionStrategy::Single => match request.schemas.as_slice() {
				[schema] => CompositionResult::new(compose_single(schema)),
				_ => CompositionResult::new(CompositionOutcome::failure(vec![CompositionError::graphql(format!(
					"Single schema composition accepts exactly one schema, got {}.",
					request.schemas.len()
				))])),
			},
			CompositionStrategy::Stitching => CompositionResult::new(compose_stitching(&request.schemas)),
			CompositionStrategy::Federation => {
				FederationEngine::select(request, &self.external)
					.compose(&request.schemas, request.contracts.as_deref(), request_id)
					.await
			},
		};
		info!(
			target: "composition",
			%request_id,
			composition_type = %request.strategy,
			success = result.outcome.is_success(),
			errors = result.outcome.errors().len(),
			"composition finished"
		);
		result
	}
}
