use composer::{CompositionRequest, SubgraphInput};
use serde_json::json;

use crate::common::service;

const HIVE_LINK: &str = r#"extend schema @link(url: "https://specs.graphql-hive.com/hive/v1.0", import: ["@meta"])"#;

#[tokio::test]
async fn test_repeat_composition_is_byte_identical() {
	let service = service();
	let request = CompositionRequest::federation(vec![
		SubgraphInput::new("users", "type Query { me: User } type User @key(fields: \"id\") { id: ID! name: String }"),
		SubgraphInput::new("reviews", "type Query { top: [String] }"),
	]);

	let first = service.compose(request.clone(), "r1").await;
	let second = service.compose(request, "r2").await;
	assert!(first.errors.is_empty(), "{:?}", first.errors);
	assert_eq!(
		serde_json::to_vec(&first).unwrap(),
		serde_json::to_vec(&second).unwrap()
	);
}

#[tokio::test]
async fn test_federation_response_carries_metadata() {
	let users = format!(
		r#"{}
		type Query {{ me: User }}
		type User @meta(name: "owner", content: "identity") {{ id: ID! email: String @meta(name: "pii", content: "true") }}"#,
		HIVE_LINK
	);
	let request = CompositionRequest::federation(vec![SubgraphInput::new("users", users)]).native();
	let response = service().compose(request, "meta-1").await;
	assert!(response.errors.is_empty(), "{:?}", response.errors);

	let metadata = serde_json::to_value(response.schema_metadata.unwrap()).unwrap();
	assert_eq!(
		metadata["User.email"],
		json!([
			{"name": "pii", "content": "true", "source": "users"},
			{"name": "owner", "content": "identity", "source": "users"},
		])
	);
	assert_eq!(metadata["User.id"], json!([{"name": "owner", "content": "identity", "source": "users"}]));
	let attributes = response.metadata_attributes.unwrap();
	assert!(attributes["owner"].contains("identity"));
	assert!(attributes["pii"].contains("true"));
}

#[tokio::test]
async fn test_wire_shape_of_failures() {
	let request: CompositionRequest = serde_json::from_value(json!({
		"type": "stitching",
		"schemas": [{"raw": "type Query { a: Missing }", "source": "a"}]
	}))
	.unwrap();
	let response = service().compose(request, "wire-1").await;
	let wire = serde_json::to_value(&response).unwrap();

	assert_eq!(wire["sdl"], serde_json::Value::Null);
	assert_eq!(wire["supergraph"], serde_json::Value::Null);
	assert_eq!(wire["includesNetworkError"], false);
	assert_eq!(wire["includesException"], false);
	assert_eq!(wire["errors"][0]["source"], "graphql");
	assert!(wire["errors"][0]["message"].as_str().unwrap().starts_with("[a] "));
}
