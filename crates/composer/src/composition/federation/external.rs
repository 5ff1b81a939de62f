//! Delegation of federation composition to an external HTTP endpoint.
//!
//! The request body is signed with HMAC-SHA256 under the decrypted shared
//! secret. With a broker configured, the signed request is wrapped in a
//! relay envelope and sent to the broker instead, which authenticates us
//! through its own signature header.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{CryptoError, SecretCipher, sign};
use crate::error::{CompositionError, ErrorSource};
use crate::graphql::parse_document;
use crate::types::{
	ComposedSchema, CompositionFailure, CompositionOutcome, ExternalEndpoint, SubgraphInput,
};

pub const SIGNATURE_HEADER: &str = "x-hive-signature-256";
pub const BROKER_SIGNATURE_HEADER: &str = "x-hive-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error codes that may appear in a failed response, with what we tell users.
const KNOWN_ERRORS: [(&str, &str); 5] = [
	("ECONNREFUSED", "Connection refused: the external composition service is not reachable."),
	("ENOTFOUND", "Host not found: check the address of the external composition service."),
	("ECONNRESET", "Connection reset by the external composition service."),
	("ETIMEDOUT", "Timeout: the external composition service did not respond in time."),
	("ERR_INVALID_SIGNATURE", "The external composition service rejected the request signature."),
];

#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
	#[error("failed to decrypt the secret of the external composition endpoint: {0}")]
	Secret(#[from] CryptoError),
	#[error("failed to encode the composition request: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("{0}")]
	Transport(String),
	#[error("{0}")]
	Status(String),
	#[error("{0}")]
	Malformed(String),
}

impl ExternalError {
	/// Whether this is the endpoint's fault (as opposed to our configuration).
	pub fn is_network(&self) -> bool {
		matches!(
			self,
			ExternalError::Transport(_) | ExternalError::Status(_) | ExternalError::Malformed(_)
		)
	}
}

#[derive(Debug, Serialize)]
struct ExternalSubgraph<'a> {
	sdl: &'a str,
	name: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrokerEnvelope<'a> {
	url: &'a str,
	method: &'static str,
	headers: serde_json::Map<String, serde_json::Value>,
	body: &'a str,
	resolve_response_body: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ExternalResponse {
	Success {
		result: SuccessResult,
		#[serde(default, rename = "includesNetworkError")]
		includes_network_error: bool,
	},
	Failure {
		result: FailureResult,
		#[serde(default)]
		supergraph: Option<String>,
		#[serde(default)]
		sdl: Option<String>,
		#[serde(default, rename = "includesNetworkError")]
		includes_network_error: bool,
	},
}

#[derive(Debug, Deserialize)]
struct SuccessResult {
	supergraph: String,
	sdl: String,
}

#[derive(Debug, Deserialize)]
struct FailureResult {
	#[serde(default)]
	errors: Vec<ExternalErrorEntry>,
	#[serde(default)]
	supergraph: Option<String>,
	#[serde(default)]
	sdl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalErrorEntry {
	message: String,
	#[serde(default)]
	source: Option<ErrorSource>,
}

#[derive(Debug, Clone)]
pub struct ExternalComposer {
	client: reqwest::Client,
	cipher: Option<Arc<SecretCipher>>,
	timeout: Duration,
}

impl ExternalComposer {
	pub fn new(cipher: Option<Arc<SecretCipher>>, timeout: Duration) -> Self {
		Self {
			client: reqwest::Client::new(),
			cipher,
			timeout,
		}
	}

	pub async fn compose(
		&self,
		subgraphs: &[SubgraphInput],
		endpoint: &ExternalEndpoint,
		request_id: &str,
	) -> CompositionOutcome {
		match self.request(subgraphs, endpoint, request_id).await {
			Ok(outcome) => outcome,
			Err(err) if err.is_network() => {
				warn!(target: "composition", %request_id, error = %err, "external composition failed");
				CompositionOutcome::Failure(CompositionFailure::network(err.to_string()))
			},
			Err(err) => CompositionOutcome::failure(vec![CompositionError::composition(err.to_string())]),
		}
	}

	async fn request(
		&self,
		subgraphs: &[SubgraphInput],
		endpoint: &ExternalEndpoint,
		request_id: &str,
	) -> Result<CompositionOutcome, ExternalError> {
		let cipher = self.cipher.as_ref().ok_or(CryptoError::MissingKey)?;
		let secret = cipher.decrypt(&endpoint.encrypted_secret)?;
		let payload: Vec<ExternalSubgraph<'_>> = subgraphs
			.iter()
			.map(|s| ExternalSubgraph {
				sdl: &s.raw_sdl,
				name: &s.source_name,
				url: s.url.as_deref(),
			})
			.collect();
		let body = serde_json::to_string(&payload)?;
		let signature = sign(secret.expose_secret().as_bytes(), body.as_bytes());

		let request = match &endpoint.broker {
			None => self
				.client
				.post(&endpoint.endpoint)
				.header(reqwest::header::CONTENT_TYPE, "application/json")
				.header(SIGNATURE_HEADER, signature)
				.body(body),
			Some(broker) => {
				let mut headers = serde_json::Map::new();
				headers.insert(SIGNATURE_HEADER.into(), signature.into());
				headers.insert("content-type".into(), "application/json".into());
				let envelope = serde_json::to_string(&BrokerEnvelope {
					url: &endpoint.endpoint,
					method: "POST",
					headers,
					body: &body,
					resolve_response_body: true,
				})?;
				self
					.client
					.post(&broker.endpoint)
					.header(reqwest::header::CONTENT_TYPE, "application/json")
					.header(BROKER_SIGNATURE_HEADER, &broker.signature)
					.header(REQUEST_ID_HEADER, request_id)
					.body(envelope)
			},
		};

		debug!(target: "composition", %request_id, broker = endpoint.broker.is_some(), "calling external composition");
		let response = request
			.timeout(self.timeout)
			.send()
			.await
			.map_err(|e| self.transport_error(e))?;
		let status = response.status();
		let text = response.text().await.map_err(|e| self.transport_error(e))?;
		if !status.is_success() {
			return Err(ExternalError::Status(match known_error(&text) {
				Some(message) => message.to_string(),
				None => format!(
					"External composition failed with status {}: {}",
					status.as_u16(),
					truncate(&text, 200)
				),
			}));
		}
		parse_response(&text)
	}

	fn transport_error(&self, err: reqwest::Error) -> ExternalError {
		if err.is_timeout() {
			return ExternalError::Transport(format!(
				"Timeout: reached the limit of {}s while waiting for the external composition service.",
				self.timeout.as_secs()
			));
		}
		let description = format!("{:?}", err);
		match known_error(&description) {
			Some(message) => ExternalError::Transport(message.to_string()),
			None if err.is_connect() => ExternalError::Transport(
				"Failed to connect to the external composition service.".to_string(),
			),
			None => ExternalError::Transport(format!("External composition request failed: {}", err)),
		}
	}
}

fn known_error(text: &str) -> Option<&'static str> {
	KNOWN_ERRORS
		.iter()
		.find(|(code, _)| text.contains(code))
		.map(|(_, message)| *message)
}

fn truncate(text: &str, max: usize) -> &str {
	match text.char_indices().nth(max) {
		Some((end, _)) => &text[..end],
		None => text,
	}
}

const NETWORK_ERROR_MESSAGE: &str = "External composition reported a network error.";

fn parse_response(text: &str) -> Result<CompositionOutcome, ExternalError> {
	let response: ExternalResponse = serde_json::from_str(text).map_err(|e| {
		ExternalError::Malformed(format!(
			"Failed to parse the response of the external composition service: {}",
			e
		))
	})?;
	Ok(match response {
		ExternalResponse::Success {
			result,
			includes_network_error,
		} => {
			if let Err(err) = parse_document(&result.supergraph) {
				// The endpoint's result stands either way.
				warn!(target: "composition", error = %err.message, "external supergraph failed to parse");
			}
			if includes_network_error {
				CompositionOutcome::Failure(CompositionFailure {
					errors: vec![CompositionError::composition(NETWORK_ERROR_MESSAGE)],
					partial_supergraph_sdl: Some(result.supergraph),
					partial_sdl: Some(result.sdl),
					is_network_error: true,
					..Default::default()
				})
			} else {
				CompositionOutcome::Success(ComposedSchema::new(result.sdl).with_supergraph(result.supergraph))
			}
		},
		ExternalResponse::Failure {
			result,
			supergraph,
			sdl,
			includes_network_error,
		} => CompositionOutcome::Failure(CompositionFailure {
			errors: result
				.errors
				.into_iter()
				.map(|e| CompositionError {
					message: e.message,
					source: e.source.unwrap_or(ErrorSource::Composition),
				})
				.collect(),
			partial_supergraph_sdl: result.supergraph.or(supergraph),
			partial_sdl: result.sdl.or(sdl),
			is_network_error: includes_network_error,
			is_internal_exception: false,
		}),
	})
}
