//! Contract visibility scenarios through the full service stack.

use composer::{CompositionRequest, CompositionResponse, ContractSpec, SubgraphInput};

use crate::common::service;

fn mutation_subgraphs(second_excluded: bool) -> Vec<SubgraphInput> {
	let tag = if second_excluded { r#" @tag(name: "exclude")"# } else { "" };
	vec![
		SubgraphInput::new(
			"foo",
			r#"type Query { foo: String } type Mutation { field1: String @tag(name: "exclude") }"#,
		),
		SubgraphInput::new(
			"bar",
			format!("type Query {{ bar: String }} type Mutation {{ field2: String{} }}", tag),
		),
	]
}

fn contract_sdl(response: &CompositionResponse, id: &str) -> String {
	let contract = response
		.contracts
		.as_ref()
		.and_then(|c| c.iter().find(|c| c.id == id))
		.expect("contract present");
	assert!(contract.errors.is_empty(), "{:?}", contract.errors);
	contract.sdl.clone().expect("contract sdl")
}

#[tokio::test]
async fn test_exclude_all_fields_hides_type() {
	let request = CompositionRequest::federation(mutation_subgraphs(true))
		.with_contracts(vec![ContractSpec::new("public").exclude(["exclude"])]);
	let response = service().compose(request, "contracts-1").await;

	assert!(response.errors.is_empty(), "{:?}", response.errors);
	assert!(response.sdl.as_deref().unwrap().contains("field1"));
	let sdl = contract_sdl(&response, "public");
	assert!(!sdl.contains("Mutation"), "{}", sdl);
}

#[tokio::test]
async fn test_partially_excluded_type_stays() {
	let request = CompositionRequest::federation(mutation_subgraphs(false))
		.with_contracts(vec![ContractSpec::new("public").exclude(["exclude"])]);
	let response = service().compose(request, "contracts-2").await;

	let sdl = contract_sdl(&response, "public");
	assert!(sdl.contains("type Mutation {\n  field2: String\n}"), "{}", sdl);
	assert!(!sdl.contains("field1"));
}

#[tokio::test]
async fn test_include_filter_is_symmetric() {
	let subgraphs = vec![
		SubgraphInput::new(
			"foo",
			r#"type Query { foo: String @tag(name: "include") } type Mutation { field1: String @tag(name: "exclude") }"#,
		),
		SubgraphInput::new(
			"bar",
			r#"type Query { bar: String @tag(name: "include") } type Mutation { field2: String @tag(name: "include") }"#,
		),
	];
	let request = CompositionRequest::federation(subgraphs).with_contracts(vec![
		ContractSpec::new("included").include(["include"]),
		ContractSpec::new("excluded").exclude(["exclude"]),
	]);
	let response = service().compose(request, "contracts-3").await;

	let included = contract_sdl(&response, "included");
	assert!(included.contains("type Mutation {\n  field2: String\n}"), "{}", included);
	assert_eq!(included, contract_sdl(&response, "excluded"));
}

#[tokio::test]
async fn test_failed_primary_skips_contracts() {
	let subgraphs = vec![
		SubgraphInput::new("foo", "type Query { user: User } type User { id: ID }"),
		SubgraphInput::new("bar", "type Query { other: String } interface User { id: ID }"),
	];
	let request = CompositionRequest::federation(subgraphs)
		.with_contracts(vec![ContractSpec::new("public").exclude(["internal"])]);
	let response = service().compose(request, "contracts-4").await;

	assert!(!response.errors.is_empty());
	assert!(response.sdl.is_none() && response.supergraph.is_none());
	let contract = &response.contracts.as_ref().unwrap()[0];
	assert!(contract.errors[0].message.starts_with("Skipped contract composition"));
}

#[tokio::test]
async fn test_single_mode_merges_extensions() {
	let request = CompositionRequest::single(SubgraphInput::new(
		"single",
		"type Query { user: User } type User { id: ID! } extend type User { name: String }",
	));
	let response = service().compose(request, "single-1").await;

	let sdl = response.sdl.expect("sdl");
	assert_eq!(sdl.matches("type User").count(), 1, "{}", sdl);
	assert!(sdl.contains("type User {\n  id: ID!\n  name: String\n}"), "{}", sdl);
	assert!(!sdl.contains("extend"));
	assert!(response.supergraph.is_none());
}
