//! Federation composition: local v1/v2 composers, the external delegate and
//! contract derivation on top of whichever composer a request selects.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::metadata;
use crate::contracts::{ContractSubgraphs, TagFilter, unreachable_types};
use crate::error::CompositionError;
use crate::graphql::{parse_document, print_document};
use crate::types::{
	ComposedSchema, CompositionFailure, CompositionOutcome, CompositionRequest, CompositionResult, ContractOutcome,
	ContractSpec, ExternalEndpoint, SubgraphInput,
};

pub mod api_schema;
mod compose;
pub mod external;
pub mod subgraph;
mod supergraph;

pub use compose::FederationVersion;
pub use external::{ExternalComposer, ExternalError};

pub const SKIPPED_CONTRACT_MESSAGE: &str = "Skipped contract composition, as default graph composition failed.";

/// Turns a set of subgraphs into a supergraph and its public schema.
#[async_trait]
pub trait FederationComposer: Send + Sync {
	async fn compose(&self, subgraphs: &[SubgraphInput], request_id: &str) -> CompositionOutcome;
}

/// In-process composition for either federation version.
#[derive(Debug, Clone, Copy)]
pub struct LocalComposer {
	version: FederationVersion,
}

impl LocalComposer {
	pub fn new(version: FederationVersion) -> Self {
		Self { version }
	}
}

#[async_trait]
impl FederationComposer for LocalComposer {
	async fn compose(&self, subgraphs: &[SubgraphInput], _request_id: &str) -> CompositionOutcome {
		compose_local(self.version, subgraphs)
	}
}

pub fn compose_local(version: FederationVersion, inputs: &[SubgraphInput]) -> CompositionOutcome {
	let mut subgraphs = Vec::with_capacity(inputs.len());
	let mut errors: Vec<CompositionError> = Vec::new();
	for input in inputs {
		match subgraph::normalize(input) {
			Ok(subgraph) => subgraphs.push(subgraph),
			Err(e) => errors.extend(e),
		}
	}
	if !errors.is_empty() {
		return CompositionOutcome::failure(errors);
	}

	let graphs = compose::graph_enum_names(&subgraphs);
	let types = match compose::merge(&subgraphs, &graphs, version) {
		Ok(types) => types,
		Err(errors) => return CompositionOutcome::failure(errors),
	};
	match supergraph::build(version, &subgraphs, &graphs, types) {
		Ok(supergraph) => CompositionOutcome::Success(
			ComposedSchema::new(print_document(&api_schema::api_schema(&supergraph)))
				.with_supergraph(print_document(&supergraph)),
		),
		Err(error) => CompositionOutcome::failure(vec![error]),
	}
}

/// Composition delegated to a configured external endpoint.
#[derive(Debug, Clone)]
pub struct DelegatedComposer {
	composer: ExternalComposer,
	endpoint: ExternalEndpoint,
}

impl DelegatedComposer {
	pub fn new(composer: ExternalComposer, endpoint: ExternalEndpoint) -> Self {
		Self { composer, endpoint }
	}
}

#[async_trait]
impl FederationComposer for DelegatedComposer {
	async fn compose(&self, subgraphs: &[SubgraphInput], request_id: &str) -> CompositionOutcome {
		self.composer.compose(subgraphs, &self.endpoint, request_id).await
	}
}

#[derive(Clone)]
pub struct FederationEngine {
	composer: Arc<dyn FederationComposer>,
}

impl FederationEngine {
	pub fn new(composer: Arc<dyn FederationComposer>) -> Self {
		Self { composer }
	}

	/// Native composition wins over an external endpoint, which wins over v1.
	pub fn select(request: &CompositionRequest, external: &ExternalComposer) -> Self {
		let composer: Arc<dyn FederationComposer> = if request.use_native_composition {
			Arc::new(LocalComposer::new(FederationVersion::V2))
		} else if let Some(endpoint) = &request.external {
			Arc::new(DelegatedComposer::new(external.clone(), endpoint.clone()))
		} else {
			Arc::new(LocalComposer::new(FederationVersion::V1))
		};
		Self::new(composer)
	}

	pub async fn compose(
		&self,
		schemas: &[SubgraphInput],
		contracts: Option<&[ContractSpec]>,
		request_id: &str,
	) -> CompositionResult {
		let inputs: Vec<SubgraphInput> = schemas.iter().map(metadata::propagate).collect();
		let outcome = enrich(self.composer.compose(&inputs, request_id).await, &inputs);

		let Some(contracts) = contracts.filter(|c| !c.is_empty()) else {
			return CompositionResult::new(outcome);
		};

		if !outcome.is_success() {
			debug!(target: "composition", %request_id, contracts = contracts.len(), "skipping contracts");
			let skipped = contracts
				.iter()
				.map(|contract| ContractOutcome {
					id: contract.id.clone(),
					outcome: CompositionOutcome::failure(vec![CompositionError::composition(SKIPPED_CONTRACT_MESSAGE)]),
				})
				.collect();
			return CompositionResult::new(outcome).with_contracts(Some(skipped));
		}

		let inputs = &inputs;
		let results: Vec<ContractOutcome> = join_all(contracts.iter().map(|contract| async move {
			ContractOutcome {
				id: contract.id.clone(),
				outcome: self.compose_contract(inputs, contract, request_id).await,
			}
		}))
		.await;
		info!(
			target: "composition",
			%request_id,
			contracts = results.len(),
			failed = results.iter().filter(|c| !c.outcome.is_success()).count(),
			"contracts composed"
		);

		match results.iter().find(|c| c.outcome.is_network_error()) {
			Some(failed) => {
				warn!(target: "composition", %request_id, contract = %failed.id, "contract hit a network error, failing the composition");
				let demoted = CompositionFailure {
					errors: failed.outcome.errors().to_vec(),
					partial_supergraph_sdl: outcome.as_success().and_then(|s| s.supergraph_sdl.clone()),
					partial_sdl: outcome.as_success().map(|s| s.public_sdl.clone()),
					is_network_error: true,
					is_internal_exception: false,
				};
				CompositionResult::new(CompositionOutcome::Failure(demoted)).with_contracts(Some(results))
			},
			None => CompositionResult::new(outcome).with_contracts(Some(results)),
		}
	}

	async fn compose_contract(
		&self,
		inputs: &[SubgraphInput],
		contract: &ContractSpec,
		request_id: &str,
	) -> CompositionOutcome {
		let mut subgraphs = match ContractSubgraphs::filter(inputs, &TagFilter::from(contract)) {
			Ok(subgraphs) => subgraphs,
			Err(errors) => return CompositionOutcome::failure(errors),
		};
		let filtered = subgraphs.inputs();
		let outcome = self.composer.compose(&filtered, request_id).await;
		if !contract.prune_unreachable_types {
			return enrich(outcome, &filtered);
		}
		let Some(schema) = outcome.as_success() else {
			return outcome;
		};
		let unreachable = match parse_document(&schema.public_sdl) {
			Ok(public) => unreachable_types(&public),
			Err(err) => {
				warn!(target: "composition", %request_id, contract = %contract.id, error = %err.message, "contract schema failed to parse, not pruning");
				return enrich(outcome, &filtered);
			},
		};
		if unreachable.is_empty() {
			return enrich(outcome, &filtered);
		}

		debug!(target: "composition", %request_id, contract = %contract.id, pruned = unreachable.len(), "pruning unreachable types");
		subgraphs.hide_types(&unreachable);
		let pruned = subgraphs.inputs();
		enrich(self.composer.compose(&pruned, request_id).await, &pruned)
	}
}

/// Attach tags and metadata to a successful outcome.
fn enrich(outcome: CompositionOutcome, inputs: &[SubgraphInput]) -> CompositionOutcome {
	let CompositionOutcome::Success(mut schema) = outcome else {
		return outcome;
	};
	let sdl = schema.supergraph_sdl.as_deref().unwrap_or(&schema.public_sdl);
	if let Ok(document) = parse_document(sdl) {
		schema.tags = document.tag_names("tag");
	}
	let (metadata, attributes) = metadata::collect(inputs);
	schema.schema_metadata = metadata;
	schema.metadata_attributes = attributes;
	CompositionOutcome::Success(schema)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	/// Local v2 composition, counting calls.
	#[derive(Default)]
	struct Counting {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl FederationComposer for Counting {
		async fn compose(&self, subgraphs: &[SubgraphInput], _request_id: &str) -> CompositionOutcome {
			self.calls.fetch_add(1, Ordering::SeqCst);
			compose_local(FederationVersion::V2, subgraphs)
		}
	}

	/// Succeeds locally on the first call, then fails with a network error.
	#[derive(Default)]
	struct FlakyAfterFirst {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl FederationComposer for FlakyAfterFirst {
		async fn compose(&self, subgraphs: &[SubgraphInput], _request_id: &str) -> CompositionOutcome {
			if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
				compose_local(FederationVersion::V2, subgraphs)
			} else {
				CompositionOutcome::Failure(CompositionFailure::network("Connection refused"))
			}
		}
	}

	fn mutation_subgraphs(second_tagged: bool) -> Vec<SubgraphInput> {
		let second = if second_tagged { r#" @tag(name: "exclude")"# } else { "" };
		vec![
			SubgraphInput::new(
				"a",
				r#"type Query { a: String } type Mutation { field1: String @tag(name: "exclude") }"#,
			),
			SubgraphInput::new("b", format!("type Query {{ b: String }} type Mutation {{ field2: String{} }}", second)),
		]
	}

	fn public_sdl(result: &CompositionResult, contract: &str) -> String {
		result
			.contract(contract)
			.and_then(CompositionOutcome::as_success)
			.map(|s| s.public_sdl.clone())
			.unwrap_or_else(|| panic!("contract {} failed: {:?}", contract, result.contract(contract)))
	}

	#[tokio::test]
	async fn test_exclude_all_hides_type() {
		let engine = FederationEngine::new(Arc::new(Counting::default()));
		let contracts = [ContractSpec::new("public").exclude(["exclude"])];
		let result = engine.compose(&mutation_subgraphs(true), Some(&contracts[..]), "req").await;
		assert!(result.outcome.is_success());
		let sdl = public_sdl(&result, "public");
		assert!(!sdl.contains("Mutation"), "{}", sdl);
		assert!(sdl.contains("type Query"));
	}

	#[tokio::test]
	async fn test_partial_exclude_keeps_type() {
		let engine = FederationEngine::new(Arc::new(Counting::default()));
		let contracts = [ContractSpec::new("public").exclude(["exclude"])];
		let result = engine.compose(&mutation_subgraphs(false), Some(&contracts[..]), "req").await;
		let sdl = public_sdl(&result, "public");
		assert!(sdl.contains("type Mutation {\n  field2: String\n}"), "{}", sdl);
		assert!(!sdl.contains("field1"));
	}

	#[tokio::test]
	async fn test_include_matches_exclude() {
		let engine = FederationEngine::new(Arc::new(Counting::default()));
		let subgraphs = vec![
			SubgraphInput::new(
				"a",
				r#"type Query { a: String @tag(name: "public") } type Mutation { field1: String @tag(name: "exclude") }"#,
			),
			SubgraphInput::new(
				"b",
				r#"type Query { b: String @tag(name: "public") } type Mutation { field2: String @tag(name: "exclude") }"#,
			),
		];
		let contracts = [
			ContractSpec::new("included").include(["public"]),
			ContractSpec::new("excluded").exclude(["exclude"]),
		];
		let result = engine.compose(&subgraphs, Some(&contracts[..]), "req").await;
		let included = public_sdl(&result, "included");
		assert!(!included.contains("Mutation"), "{}", included);
		assert_eq!(included, public_sdl(&result, "excluded"));
	}

	#[tokio::test]
	async fn test_primary_failure_skips_contracts() {
		let composer = Arc::new(Counting::default());
		let engine = FederationEngine::new(composer.clone());
		let subgraphs = vec![SubgraphInput::new("a", "type Mutation { a: String }")];
		let contracts = [ContractSpec::new("one"), ContractSpec::new("two")];
		let result = engine.compose(&subgraphs, Some(&contracts[..]), "req").await;

		assert!(!result.outcome.is_success());
		assert_eq!(composer.calls.load(Ordering::SeqCst), 1);
		for id in ["one", "two"] {
			assert_eq!(result.contract(id).unwrap().errors()[0].message, SKIPPED_CONTRACT_MESSAGE);
		}
	}

	#[tokio::test]
	async fn test_contract_network_error_demotes_result() {
		let engine = FederationEngine::new(Arc::new(FlakyAfterFirst::default()));
		let contracts = [ContractSpec::new("public").exclude(["exclude"])];
		let result = engine.compose(&mutation_subgraphs(true), Some(&contracts[..]), "req").await;

		let failure = result.outcome.as_failure().expect("demoted");
		assert!(failure.is_network_error);
		assert_eq!(failure.errors[0].message, "Connection refused");
		assert!(failure.partial_sdl.as_deref().unwrap().contains("type Query"));
		assert!(result.contract("public").unwrap().is_network_error());
	}

	#[tokio::test]
	async fn test_pruning_hides_unreachable_types() {
		let engine = FederationEngine::new(Arc::new(Counting::default()));
		let subgraphs = vec![SubgraphInput::new(
			"a",
			r#"type Query { user: User admin: Admin @tag(name: "internal") }
			type User { id: ID }
			type Admin { id: ID secret: Secret }
			type Secret { value: String }"#,
		)];
		let contracts = [
			ContractSpec::new("kept").exclude(["internal"]),
			ContractSpec::new("pruned").exclude(["internal"]).prune_unreachable(),
		];
		let result = engine.compose(&subgraphs, Some(&contracts[..]), "req").await;
		assert!(public_sdl(&result, "kept").contains("type Admin"));
		let pruned = public_sdl(&result, "pruned");
		assert!(!pruned.contains("Admin"), "{}", pruned);
		assert!(!pruned.contains("Secret"), "{}", pruned);
		assert!(pruned.contains("type User"));
	}

	#[tokio::test]
	async fn test_success_carries_tags() {
		let engine = FederationEngine::new(Arc::new(Counting::default()));
		let result = engine.compose(&mutation_subgraphs(true), None, "req").await;
		let schema = result.outcome.as_success().unwrap();
		assert_eq!(schema.tags, vec!["exclude".to_string()]);
		assert!(result.contracts.is_none());
	}
}
