//! The request boundary: validation, cache, scheduler and the wire shape.
//!
//! Composition-domain problems never escape as Rust errors. Whatever goes
//! wrong, [`CompositionService::compose`] answers with a
//! [`CompositionResponse`] clients can render.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{Cache, CacheError, CacheStore, TtlClass};
use crate::composition::{CompositionEngine, EngineSettings};
use crate::config::ComposerConfig;
use crate::crypto::{CryptoError, SecretCipher};
use crate::error::CompositionError;
use crate::scheduler::{
	CompositionScheduler, HandlerFactory, SchedulerError, TaskError, TaskHandler, WorkerMessage,
};
use crate::telemetry::{ErrorContext, ErrorReporter};
use crate::types::{
	CompositionOutcome, CompositionRequest, CompositionResult, ContractOutcome, MetadataAttributes,
	SchemaMetadata,
};

pub const TIMEOUT_MESSAGE: &str = "The composition timed out. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("invalid encryption secret: {0}")]
	Crypto(#[from] CryptoError),
	#[error(transparent)]
	Scheduler(#[from] SchedulerError),
}

/// Runs compositions on a worker thread.
pub struct CompositionHandler {
	engine: CompositionEngine,
}

impl CompositionHandler {
	pub fn new(engine: CompositionEngine) -> Self {
		Self { engine }
	}
}

#[async_trait(?Send)]
impl TaskHandler for CompositionHandler {
	async fn handle(&self, task: &WorkerMessage) -> Result<CompositionResult, TaskError> {
		Ok(self.engine.compose(&task.request, &task.request_id).await)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
	pub id: String,
	pub errors: Vec<CompositionError>,
	pub sdl: Option<String>,
	pub supergraph: Option<String>,
}

impl From<ContractOutcome> for ContractResponse {
	fn from(contract: ContractOutcome) -> Self {
		match contract.outcome {
			CompositionOutcome::Success(schema) => Self {
				id: contract.id,
				errors: Vec::new(),
				sdl: Some(schema.public_sdl),
				supergraph: schema.supergraph_sdl,
			},
			CompositionOutcome::Failure(failure) => Self {
				id: contract.id,
				errors: failure.errors,
				sdl: None,
				supergraph: None,
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionResponse {
	pub errors: Vec<CompositionError>,
	pub sdl: Option<String>,
	pub supergraph: Option<String>,
	pub contracts: Option<Vec<ContractResponse>>,
	pub schema_metadata: Option<SchemaMetadata>,
	pub metadata_attributes: Option<MetadataAttributes>,
	pub tags: Option<Vec<String>>,
	pub includes_network_error: bool,
	pub includes_exception: bool,
}

impl CompositionResponse {
	pub fn failure(errors: Vec<CompositionError>) -> Self {
		Self {
			errors,
			..Default::default()
		}
	}

	pub fn exception(message: impl Into<String>) -> Self {
		Self {
			errors: vec![CompositionError::composition(message)],
			includes_exception: true,
			..Default::default()
		}
	}
}

impl From<CompositionResult> for CompositionResponse {
	fn from(result: CompositionResult) -> Self {
		let contracts = result
			.contracts
			.map(|c| c.into_iter().map(ContractResponse::from).collect());
		match result.outcome {
			CompositionOutcome::Success(schema) => Self {
				errors: Vec::new(),
				sdl: Some(schema.public_sdl),
				supergraph: schema.supergraph_sdl,
				contracts,
				schema_metadata: Some(schema.schema_metadata),
				metadata_attributes: Some(schema.metadata_attributes),
				tags: Some(schema.tags),
				includes_network_error: false,
				includes_exception: false,
			},
			CompositionOutcome::Failure(failure) => Self {
				errors: failure.errors,
				contracts,
				includes_network_error: failure.is_network_error,
				includes_exception: failure.is_internal_exception,
				..Default::default()
			},
		}
	}
}

pub struct CompositionService {
	cache: Cache,
	scheduler: Arc<CompositionScheduler>,
	reporter: Arc<dyn ErrorReporter>,
}

impl CompositionService {
	pub fn new(cache: Cache, scheduler: Arc<CompositionScheduler>, reporter: Arc<dyn ErrorReporter>) -> Self {
		Self {
			cache,
			scheduler,
			reporter,
		}
	}

	/// Wire up the engine, worker pool and cache from configuration.
	pub fn from_config(
		config: &ComposerConfig,
		store: Arc<dyn CacheStore>,
		reporter: Arc<dyn ErrorReporter>,
	) -> Result<Self, ServiceError> {
		let cipher = config
			.encryption_secret
			.as_ref()
			.map(SecretCipher::new)
			.transpose()?
			.map(Arc::new);
		let settings = EngineSettings {
			cipher,
			external_timeout: config.external.request_timeout,
		};
		let factory: HandlerFactory = Arc::new(move |_: usize| -> Box<dyn TaskHandler> {
			Box::new(CompositionHandler::new(CompositionEngine::new(settings.clone())))
		});
		let scheduler = CompositionScheduler::new(config.scheduler.workers, factory, reporter.clone())?;
		Ok(Self::new(
			Cache::new(store, config.cache.clone()),
			Arc::new(scheduler),
			reporter,
		))
	}

	pub fn scheduler(&self) -> &CompositionScheduler {
		&self.scheduler
	}

	pub async fn compose(&self, request: CompositionRequest, request_id: &str) -> CompositionResponse {
		if let Err(errors) = request.validate() {
			debug!(target: "composition", %request_id, errors = errors.len(), "rejected invalid request");
			return CompositionResponse::failure(errors);
		}
		let context = ErrorContext {
			request_id: request_id.to_string(),
			composition_type: request.strategy,
		};

		let scheduler = self.scheduler.clone();
		let owned_request_id = request_id.to_string();
		let reuse = self
			.cache
			.reuse(format!("composition:{}", request.strategy), move |request: CompositionRequest, abort| {
				let scheduler = scheduler.clone();
				let message = WorkerMessage::new(owned_request_id.clone(), request);
				async move {
					match scheduler.process(message, &abort).await {
						Ok(result) => Ok(result),
						// Already reported by the scheduler; cached briefly.
						Err(SchedulerError::WorkerCrashed(err)) => Ok(CompositionResult::internal_exception(err)),
						Err(err) => Err(err),
					}
				}
			})
			.classify(|result: &CompositionResult| {
				if result.is_transient_failure() {
					TtlClass::Short
				} else {
					TtlClass::Long
				}
			});

		match reuse.call(request).await {
			Ok(result) => CompositionResponse::from(result),
			Err(err) if err.is_timeout() => {
				warn!(target: "composition", %request_id, "composition timed out");
				CompositionResponse::exception(TIMEOUT_MESSAGE)
			},
			Err(err) => {
				let message = match &err {
					CacheError::Compute(message) => message.clone(),
					other => other.to_string(),
				};
				self.reporter.report(&message, &context);
				CompositionResponse::exception(message)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use futures::future::join_all;

	use super::*;
	use crate::cache::MemoryStore;
	use crate::config::CacheConfig;
	use crate::telemetry::testing::RecordingReporter;
	use crate::types::{ComposedSchema, SubgraphInput};

	/// Counts calls, then behaves according to the schema body.
	struct CountingHandler {
		calls: Arc<AtomicUsize>,
	}

	#[async_trait(?Send)]
	impl TaskHandler for CountingHandler {
		async fn handle(&self, task: &WorkerMessage) -> Result<CompositionResult, TaskError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let body = task.request.schemas[0].raw_sdl.clone();
			match body.as_str() {
				"panic" => panic!("composer blew up"),
				"slow" => tokio::time::sleep(Duration::from_secs(30)).await,
				_ => tokio::time::sleep(Duration::from_millis(50)).await,
			}
			Ok(CompositionResult::new(CompositionOutcome::Success(ComposedSchema::new(body))))
		}
	}

	fn service() -> (CompositionService, Arc<AtomicUsize>, Arc<RecordingReporter>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let reporter = Arc::new(RecordingReporter::default());
		let handler_calls = calls.clone();
		let factory: HandlerFactory = Arc::new(move |_: usize| -> Box<dyn TaskHandler> {
			Box::new(CountingHandler {
				calls: handler_calls.clone(),
			})
		});
		let scheduler = CompositionScheduler::new(2, factory, reporter.clone()).unwrap();
		let cache = Cache::new(
			Arc::new(MemoryStore::new()),
			CacheConfig {
				poll_interval: Duration::from_millis(20),
				timeout: Duration::from_millis(500),
				lock_ttl: Duration::from_secs(5),
				..Default::default()
			},
		);
		(
			CompositionService::new(cache, Arc::new(scheduler), reporter.clone()),
			calls,
			reporter,
		)
	}

	fn single(body: &str) -> CompositionRequest {
		CompositionRequest::single(SubgraphInput::new("schema", body))
	}

	#[tokio::test]
	async fn test_repeat_request_is_served_from_cache() {
		let (service, calls, _) = service();
		let first = service.compose(single("type Query { a: Int }"), "r1").await;
		let second = service.compose(single("type Query { a: Int }"), "r2").await;
		assert_eq!(first, second);
		assert_eq!(first.sdl.as_deref(), Some("type Query { a: Int }"));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_concurrent_requests_compose_once() {
		let (service, calls, _) = service();
		let ids: Vec<String> = (0..5).map(|i| format!("r{}", i)).collect();
		let responses = join_all(ids.iter().map(|id| service.compose(single("type Query { b: Int }"), id))).await;
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(responses.iter().all(|r| r == &responses[0]));
	}

	#[tokio::test]
	async fn test_timeout_is_a_soft_failure() {
		let (service, _, _) = service();
		let response = service.compose(single("slow"), "r").await;
		assert_eq!(response.errors[0].message, TIMEOUT_MESSAGE);
		assert!(response.includes_exception);
		assert!(response.sdl.is_none() && response.supergraph.is_none());
	}

	#[tokio::test]
	async fn test_crash_becomes_internal_exception() {
		let (service, calls, reporter) = service();
		let response = service.compose(single("panic"), "r").await;
		assert!(response.includes_exception);
		assert_eq!(response.errors[0].message, "composer blew up");
		assert_eq!(reporter.reports.lock().len(), 1);

		let healthy = service.compose(single("type Query { c: Int }"), "r2").await;
		assert!(healthy.errors.is_empty());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_invalid_request_never_reaches_a_worker() {
		let (service, calls, _) = service();
		let mut request = single("type Query { a: Int }");
		request.schemas.clear();
		let response = service.compose(request, "r").await;
		assert_eq!(response.errors.len(), 1);
		assert!(!response.includes_exception);
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}
}
