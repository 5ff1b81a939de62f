//! Request and outcome types shared by every composition strategy.
//!
//! A [`CompositionRequest`] is built once at the request boundary and never
//! mutated afterwards; it is also the payload carried to worker threads and
//! the argument hashed into the cache key, so its serialized form must stay
//! stable (field order and `BTreeSet`s for tags).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionStrategy {
	Single,
	Stitching,
	Federation,
}

impl CompositionStrategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			CompositionStrategy::Single => "single",
			CompositionStrategy::Stitching => "stitching",
			CompositionStrategy::Federation => "federation",
		}
	}
}

impl std::fmt::Display for CompositionStrategy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One schema document participating in a composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubgraphInput {
	#[serde(rename = "raw")]
	pub raw_sdl: String,
	#[serde(rename = "source")]
	pub source_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl SubgraphInput {
	pub fn new(source_name: impl Into<String>, raw_sdl: impl Into<String>) -> Self {
		Self {
			raw_sdl: raw_sdl.into(),
			source_name: source_name.into(),
			url: None,
		}
	}

	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}

	/// Same subgraph, different document.
	pub fn with_sdl(&self, raw_sdl: String) -> Self {
		Self {
			raw_sdl,
			source_name: self.source_name.clone(),
			url: self.url.clone(),
		}
	}
}

/// Signed relay used to reach an external composition endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRelay {
	pub endpoint: String,
	pub signature: String,
}

/// External composition delegate configured for a federation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEndpoint {
	pub endpoint: String,
	pub encrypted_secret: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub broker: Option<BrokerRelay>,
}

/// A filtered view of the composed schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSpec {
	pub id: String,
	#[serde(default)]
	pub include_tags: BTreeSet<String>,
	#[serde(default)]
	pub exclude_tags: BTreeSet<String>,
	#[serde(default)]
	pub prune_unreachable_types: bool,
}

impl ContractSpec {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			include_tags: BTreeSet::new(),
			exclude_tags: BTreeSet::new(),
			prune_unreachable_types: false,
		}
	}

	pub fn include<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.include_tags.extend(tags.into_iter().map(Into::into));
		self
	}

	pub fn exclude<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.exclude_tags.extend(tags.into_iter().map(Into::into));
		self
	}

	pub fn prune_unreachable(mut self) -> Self {
		self.prune_unreachable_types = true;
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequest {
	#[serde(rename = "type")]
	pub strategy: CompositionStrategy,
	pub schemas: Vec<SubgraphInput>,
	#[serde(default, rename = "native")]
	pub use_native_composition: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub external: Option<ExternalEndpoint>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contracts: Option<Vec<ContractSpec>>,
}

impl CompositionRequest {
	pub fn single(schema: SubgraphInput) -> Self {
		Self::new(CompositionStrategy::Single, vec![schema])
	}

	pub fn stitching(schemas: Vec<SubgraphInput>) -> Self {
		Self::new(CompositionStrategy::Stitching, schemas)
	}

	pub fn federation(schemas: Vec<SubgraphInput>) -> Self {
		Self::new(CompositionStrategy::Federation, schemas)
	}

	fn new(strategy: CompositionStrategy, schemas: Vec<SubgraphInput>) -> Self {
		Self {
			strategy,
			schemas,
			use_native_composition: false,
			external: None,
			contracts: None,
		}
	}

	pub fn native(mut self) -> Self {
		self.use_native_composition = true;
		self
	}

	pub fn with_external(mut self, external: ExternalEndpoint) -> Self {
		self.external = Some(external);
		self
	}

	pub fn with_contracts(mut self, contracts: Vec<ContractSpec>) -> Self {
		self.contracts = Some(contracts);
		self
	}

	/// Structural checks the transport layer would normally enforce.
	pub fn validate(&self) -> Result<(), Vec<CompositionError>> {
		let mut errors = Vec::new();

		if self.schemas.is_empty() {
			errors.push(CompositionError::graphql("At least one schema is required."));
		}
		if self.strategy == CompositionStrategy::Single && self.schemas.len() > 1 {
			errors.push(CompositionError::graphql(format!(
				"Single schema composition accepts exactly one schema, got {}.",
				self.schemas.len()
			)));
		}

		let mut seen = HashSet::new();
		for schema in &self.schemas {
			if !seen.insert(schema.source_name.as_str()) {
				errors.push(CompositionError::graphql(format!(
					"Schema source name \"{}\" is used more than once.",
					schema.source_name
				)));
			}
		}

		if let Some(contracts) = &self.contracts {
			if self.strategy != CompositionStrategy::Federation && !contracts.is_empty() {
				errors.push(CompositionError::composition(
					"Contracts are only supported for federation composition.",
				));
			}
			let mut ids = HashSet::new();
			for contract in contracts {
				if contract.id.is_empty() {
					errors.push(CompositionError::composition("Contract id must not be empty."));
				} else if !ids.insert(contract.id.as_str()) {
					errors.push(CompositionError::composition(format!(
						"Contract id \"{}\" is used more than once.",
						contract.id
					)));
				}
			}
		}

		if errors.is_empty() { Ok(()) } else { Err(errors) }
	}
}

/// One `@meta` record attached to a schema coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
	pub name: String,
	pub content: String,
	pub source: String,
}

/// Metadata keyed by `Type.field` coordinate.
pub type SchemaMetadata = BTreeMap<String, Vec<MetadataRecord>>;

/// Reverse index: metadata attribute name to every distinct content value.
pub type MetadataAttributes = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedSchema {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub supergraph_sdl: Option<String>,
	pub public_sdl: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub schema_metadata: SchemaMetadata,
	#[serde(default)]
	pub metadata_attributes: MetadataAttributes,
}

impl ComposedSchema {
	pub fn new(public_sdl: String) -> Self {
		Self {
			public_sdl,
			..Default::default()
		}
	}

	pub fn with_supergraph(mut self, supergraph_sdl: String) -> Self {
		self.supergraph_sdl = Some(supergraph_sdl);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionFailure {
	pub errors: Vec<CompositionError>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub partial_supergraph_sdl: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub partial_sdl: Option<String>,
	#[serde(default)]
	pub is_network_error: bool,
	#[serde(default)]
	pub is_internal_exception: bool,
}

impl CompositionFailure {
	pub fn new(errors: Vec<CompositionError>) -> Self {
		Self {
			errors,
			..Default::default()
		}
	}

	pub fn network(message: impl Into<String>) -> Self {
		Self {
			errors: vec![CompositionError::composition(message)],
			is_network_error: true,
			..Default::default()
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self {
			errors: vec![CompositionError::composition(message)],
			is_internal_exception: true,
			..Default::default()
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompositionOutcome {
	Success(ComposedSchema),
	Failure(CompositionFailure),
}

impl CompositionOutcome {
	pub fn failure(errors: Vec<CompositionError>) -> Self {
		CompositionOutcome::Failure(CompositionFailure::new(errors))
	}

	pub fn is_success(&self) -> bool {
		matches!(self, CompositionOutcome::Success(_))
	}

	pub fn as_success(&self) -> Option<&ComposedSchema> {
		match self {
			CompositionOutcome::Success(schema) => Some(schema),
			CompositionOutcome::Failure(_) => None,
		}
	}

	pub fn as_failure(&self) -> Option<&CompositionFailure> {
		match self {
			CompositionOutcome::Success(_) => None,
			CompositionOutcome::Failure(failure) => Some(failure),
		}
	}

	pub fn errors(&self) -> &[CompositionError] {
		match self {
			CompositionOutcome::Success(_) => &[],
			CompositionOutcome::Failure(failure) => &failure.errors,
		}
	}

	pub fn is_network_error(&self) -> bool {
		self.as_failure().is_some_and(|f| f.is_network_error)
	}

	pub fn is_internal_exception(&self) -> bool {
		self.as_failure().is_some_and(|f| f.is_internal_exception)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOutcome {
	pub id: String,
	pub outcome: CompositionOutcome,
}

/// Primary outcome plus any contract outcomes carried alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionResult {
	pub outcome: CompositionOutcome,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contracts: Option<Vec<ContractOutcome>>,
}

impl CompositionResult {
	pub fn new(outcome: CompositionOutcome) -> Self {
		Self {
			outcome,
			contracts: None,
		}
	}

	pub fn with_contracts(mut self, contracts: Option<Vec<ContractOutcome>>) -> Self {
		self.contracts = contracts;
		self
	}

	pub fn internal_exception(message: impl Into<String>) -> Self {
		Self::new(CompositionOutcome::Failure(CompositionFailure::internal(message)))
	}

	/// Network errors and internal exceptions are worth retrying sooner.
	pub fn is_transient_failure(&self) -> bool {
		self.outcome.is_network_error() || self.outcome.is_internal_exception()
	}

	pub fn contract(&self, id: &str) -> Option<&CompositionOutcome> {
		self
			.contracts
			.as_ref()?
			.iter()
			.find(|c| c.id == id)
			.map(|c| &c.outcome)
	}
}
