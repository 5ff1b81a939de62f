//! External composition delegate, direct and through the broker relay.

use composer::composition::federation::external::{
	BROKER_SIGNATURE_HEADER, REQUEST_ID_HEADER, SIGNATURE_HEADER,
};
use composer::crypto::sign;
use composer::types::{BrokerRelay, ContractSpec, ExternalEndpoint};
use composer::{CompositionRequest, SubgraphInput};
use serde_json::json;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{SHARED_SECRET, cipher, engine};

const SDL: &str = "type Query { me: String @tag(name: \"public\") }";
const SUPERGRAPH: &str = "type Query { me: String @tag(name: \"public\") }";

fn subgraphs() -> Vec<SubgraphInput> {
	vec![SubgraphInput::new("users", SDL).with_url("http://users")]
}

fn expected_body() -> String {
	serde_json::to_string(&json!([{"sdl": SDL, "name": "users", "url": "http://users"}])).unwrap()
}

fn endpoint(url: String, broker: Option<BrokerRelay>) -> ExternalEndpoint {
	ExternalEndpoint {
		endpoint: url,
		encrypted_secret: cipher().encrypt(SHARED_SECRET).unwrap(),
		broker,
	}
}

fn success() -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({
		"type": "success",
		"result": {"supergraph": SUPERGRAPH, "sdl": "type Query { me: String }"}
	}))
}

#[tokio::test]
async fn test_direct_request_is_signed() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	let body = expected_body();
	Mock::given(method("POST"))
		.and(path("/compose"))
		.and(header(SIGNATURE_HEADER, sign(SHARED_SECRET.as_bytes(), body.as_bytes()).as_str()))
		.and(body_string(body))
		.respond_with(success())
		.expect(1)
		.mount(&server)
		.await;

	let request = CompositionRequest::federation(subgraphs())
		.with_external(endpoint(format!("{}/compose", server.uri()), None));
	let result = engine().compose(&request, "req-1").await;

	let schema = result.outcome.as_success().expect("external success");
	assert_eq!(schema.supergraph_sdl.as_deref(), Some(SUPERGRAPH));
	assert_eq!(schema.public_sdl, "type Query { me: String }");
	assert_eq!(schema.tags, vec!["public".to_string()]);
	Ok(())
}

#[tokio::test]
async fn test_broker_relays_signed_envelope() -> anyhow::Result<()> {
	let broker = MockServer::start().await;
	let body = expected_body();
	let target = "http://composition.internal/compose".to_string();
	Mock::given(method("POST"))
		.and(path("/relay"))
		.and(header(BROKER_SIGNATURE_HEADER, "broker-signature"))
		.and(header(REQUEST_ID_HEADER, "req-2"))
		.and(body_json(json!({
			"url": target,
			"method": "POST",
			"headers": {
				SIGNATURE_HEADER: sign(SHARED_SECRET.as_bytes(), body.as_bytes()),
				"content-type": "application/json",
			},
			"body": body,
			"resolveResponseBody": true,
		})))
		.respond_with(success())
		.expect(1)
		.mount(&broker)
		.await;

	let relay = BrokerRelay {
		endpoint: format!("{}/relay", broker.uri()),
		signature: "broker-signature".into(),
	};
	let request = CompositionRequest::federation(subgraphs()).with_external(endpoint(target, Some(relay)));
	let result = engine().compose(&request, "req-2").await;
	assert!(result.outcome.is_success(), "{:?}", result.outcome.errors());
	Ok(())
}

#[tokio::test]
async fn test_known_error_code_is_a_network_failure() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(502).set_body_string("connect ECONNREFUSED 10.0.0.1:4000"))
		.mount(&server)
		.await;

	let request = CompositionRequest::federation(subgraphs()).with_external(endpoint(server.uri(), None));
	let result = engine().compose(&request, "req-3").await;

	assert!(result.outcome.is_network_error());
	assert!(result.is_transient_failure());
	assert_eq!(
		result.outcome.errors()[0].message,
		"Connection refused: the external composition service is not reachable."
	);
	Ok(())
}

#[tokio::test]
async fn test_failure_response_passes_errors_through() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"type": "failure",
			"result": {"errors": [{"message": "Field \"Query.me\" is broken", "source": "composition"}]},
			"sdl": "type Query { me: String }"
		})))
		.mount(&server)
		.await;

	let request = CompositionRequest::federation(subgraphs()).with_external(endpoint(server.uri(), None));
	let result = engine().compose(&request, "req-4").await;

	let failure = result.outcome.as_failure().expect("failure");
	assert!(!failure.is_network_error);
	assert_eq!(failure.errors[0].message, "Field \"Query.me\" is broken");
	assert_eq!(failure.partial_sdl.as_deref(), Some("type Query { me: String }"));
	Ok(())
}

#[tokio::test]
async fn test_contract_network_error_fails_everything() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(success())
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
		.mount(&server)
		.await;

	let request = CompositionRequest::federation(subgraphs())
		.with_external(endpoint(server.uri(), None))
		.with_contracts(vec![ContractSpec::new("public").include(["public"])]);
	let result = engine().compose(&request, "req-5").await;

	let failure = result.outcome.as_failure().expect("demoted");
	assert!(failure.is_network_error);
	assert!(failure.errors[0].message.contains("status 503"));
	assert!(result.contract("public").unwrap().is_network_error());
	Ok(())
}
