// Composition error types

use serde::{Deserialize, Serialize};

/// Where a reported composition problem comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
	/// Syntax or type-system validity of a single document.
	Graphql,
	/// Cross-subgraph merge conflicts.
	Composition,
}

/// A single diagnostic surfaced to API clients.
///
/// These are data, not Rust errors: composers collect them into a failure
/// outcome instead of short-circuiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionError {
	pub message: String,
	pub source: ErrorSource,
}

impl CompositionError {
	pub fn graphql(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: ErrorSource::Graphql,
		}
	}

	pub fn composition(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: ErrorSource::Composition,
		}
	}

	/// Prefix the message with the subgraph it was reported for.
	pub fn in_subgraph(mut self, subgraph: &str) -> Self {
		self.message = format!("[{}] {}", subgraph, self.message);
		self
	}
}

impl std::fmt::Display for CompositionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message)
	}
}
