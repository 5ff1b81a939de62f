//! Schema stitching: independent schemas merged by delegation.
//!
//! Each schema is validated on its own against the stitching directive
//! vocabulary (declared for it when it doesn't declare the directives
//! itself), then every schema is merged type by type. Object, interface and
//! input types merge their fields, enums their values and unions their
//! members; a definition marked `@canonical` takes precedence, otherwise
//! the first schema to define an element wins. Errors from both steps are
//! collected, and whatever could be merged is returned as partial SDL.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::CompositionError;
use crate::graphql::*;
use crate::types::{ComposedSchema, CompositionFailure, CompositionOutcome, SubgraphInput};

const STITCHING_DIRECTIVES: &str = r#"
directive @key(selectionSet: String!) on OBJECT
directive @computed(selectionSet: String!) on FIELD_DEFINITION
directive @merge(argsExpr: String, keyArg: String, keyField: String, key: [String!], additionalArgs: String) on FIELD_DEFINITION
directive @canonical on OBJECT | INTERFACE | INPUT_OBJECT | UNION | ENUM | SCALAR | FIELD_DEFINITION | INPUT_FIELD_DEFINITION
"#;

const STITCHING_DIRECTIVE_NAMES: [&str; 4] = ["key", "computed", "merge", "canonical"];

pub fn compose_stitching(inputs: &[SubgraphInput]) -> CompositionOutcome {
	let vocabulary = match parse_document(STITCHING_DIRECTIVES) {
		Ok(doc) => doc,
		Err(err) => {
			return CompositionOutcome::Failure(CompositionFailure::internal(format!(
				"Invalid stitching directives: {}",
				err.message
			)));
		},
	};

	let mut errors = Vec::new();
	let mut documents = Vec::with_capacity(inputs.len());
	for input in inputs {
		let name = input.source_name.as_str();
		let mut document = match parse_document(&input.raw_sdl) {
			Ok(document) => document,
			Err(err) => {
				errors.push(CompositionError::graphql(err.message).in_subgraph(name));
				continue;
			},
		};
		merge_extensions(&mut document);
		declare_missing(&mut document, &vocabulary);
		errors.extend(
			validate_document(&document, &ValidationOptions::default().without_query_root())
				.into_iter()
				.map(|e| e.in_subgraph(name)),
		);
		normalize_roots(&mut document);
		documents.push((name, document));
	}

	let mut merged = merge(&documents, &mut errors);
	strip_stitching_directives(&mut merged);
	if errors.is_empty() {
		errors.extend(validate_document(&merged, &ValidationOptions::default()));
	}

	let sdl = print_document(&merged);
	if errors.is_empty() {
		CompositionOutcome::Success(ComposedSchema::new(sdl))
	} else {
		debug!(target: "composition", errors = errors.len(), "stitching failed");
		CompositionOutcome::Failure(CompositionFailure {
			errors,
			partial_sdl: (!merged.definitions.is_empty()).then_some(sdl),
			..Default::default()
		})
	}
}

/// Append the stitching directive definitions the document doesn't declare.
fn declare_missing(document: &mut Document, vocabulary: &Document) {
	let declared: HashSet<String> = document.directive_definitions().map(|d| d.name.clone()).collect();
	let missing: Vec<Definition> = vocabulary
		.directive_definitions()
		.filter(|d| !declared.contains(&d.name))
		.cloned()
		.map(Definition::Directive)
		.collect();
	document.definitions.extend(missing);
}

/// Rename custom root types to their default names and drop the schema block.
fn normalize_roots(document: &mut Document) {
	for kind in OperationKind::ALL {
		if let Some(name) = document.root_type_name(kind)
			&& name != kind.default_type_name()
			&& document.type_named(kind.default_type_name()).is_none()
		{
			document.rename_type(&name, kind.default_type_name());
		}
	}
	document.definitions.retain(|d| !matches!(d, Definition::Schema(_)));
}

fn is_canonical(directives: &[Directive]) -> bool {
	has_directive(directives, "canonical")
}

fn merge(documents: &[(&str, Document)], errors: &mut Vec<CompositionError>) -> Document {
	// Canonical definitions go first so that they win every tie.
	let mut occurrences: IndexMap<&str, Vec<(&str, &TypeDefinition)>> = IndexMap::new();
	for (source, document) in documents {
		for ty in document.types() {
			let entry = occurrences.entry(ty.name.as_str()).or_default();
			if is_canonical(&ty.directives) {
				let at = entry.iter().take_while(|(_, t)| is_canonical(&t.directives)).count();
				entry.insert(at, (*source, ty));
			} else {
				entry.push((*source, ty));
			}
		}
	}

	let mut definitions: Vec<Definition> = Vec::new();
	let mut directives: IndexMap<&str, &DirectiveDefinition> = IndexMap::new();
	for (_, document) in documents {
		for directive in document.directive_definitions() {
			directives.entry(directive.name.as_str()).or_insert(directive);
		}
	}
	definitions.extend(directives.into_values().cloned().map(Definition::Directive));

	for (name, group) in occurrences {
		let (first_source, first) = group[0];
		let mut merged = first.clone();
		merged.extend = false;
		for (source, ty) in &group[1..] {
			if !ty.kind.same_kind(&first.kind) {
				errors.push(CompositionError::composition(format!(
					"Type \"{}\" is defined as {} in \"{}\" but {} in \"{}\".",
					name,
					first.kind.label(),
					first_source,
					ty.kind.label(),
					source
				)));
				continue;
			}
			if merged.description.is_none() {
				merged.description = ty.description.clone();
			}
			merge_into(&mut merged.kind, &ty.kind);
		}
		definitions.push(Definition::Type(merged));
	}
	Document { definitions }
}

fn merge_into(target: &mut TypeKind, other: &TypeKind) {
	match (target, other) {
		(TypeKind::Object(target), TypeKind::Object(other))
		| (TypeKind::Interface(target), TypeKind::Interface(other)) => {
			for interface in &other.implements {
				if !target.implements.contains(interface) {
					target.implements.push(interface.clone());
				}
			}
			for field in &other.fields {
				match target.fields.iter().position(|f| f.name == field.name) {
					Some(i) if is_canonical(&field.directives) && !is_canonical(&target.fields[i].directives) => {
						target.fields[i] = field.clone();
					},
					Some(_) => {},
					None => target.fields.push(field.clone()),
				}
			}
		},
		(TypeKind::InputObject(target), TypeKind::InputObject(other)) => {
			for field in other {
				match target.iter().position(|f| f.name == field.name) {
					Some(i) if is_canonical(&field.directives) && !is_canonical(&target[i].directives) => {
						target[i] = field.clone();
					},
					Some(_) => {},
					None => target.push(field.clone()),
				}
			}
		},
		(TypeKind::Enum(target), TypeKind::Enum(other)) => {
			for value in other {
				if !target.iter().any(|v| v.name == value.name) {
					target.push(value.clone());
				}
			}
		},
		(TypeKind::Union(target), TypeKind::Union(other)) => {
			for member in other {
				if !target.contains(member) {
					target.push(member.clone());
				}
			}
		},
		_ => {},
	}
}

fn strip_stitching_directives(document: &mut Document) {
	document.definitions.retain(|d| match d {
		Definition::Directive(directive) => !STITCHING_DIRECTIVE_NAMES.contains(&directive.name.as_str()),
		_ => true,
	});
	document.for_each_directives_mut(|directives| {
		directives.retain(|d| !STITCHING_DIRECTIVE_NAMES.contains(&d.name.as_str()));
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorSource;

	#[test]
	fn test_merges_root_and_shared_types() {
		let outcome = compose_stitching(&[
			SubgraphInput::new(
				"users",
				r#"type Query { user(id: ID!): User @merge(keyField: "id") } type User @key(selectionSet: "{ id }") { id: ID! name: String }"#,
			),
			SubgraphInput::new(
				"posts",
				r#"type Query { posts: [Post] } type Post { title: String author: User } type User { id: ID! posts: [Post] }"#,
			),
		]);
		let sdl = &outcome.as_success().unwrap().public_sdl;
		assert!(sdl.contains("type Query {\n  user(id: ID!): User\n  posts: [Post]\n}"), "{}", sdl);
		assert!(sdl.contains("type User {\n  id: ID!\n  name: String\n  posts: [Post]\n}"), "{}", sdl);
		assert!(!sdl.contains("@key") && !sdl.contains("@merge"), "{}", sdl);
		assert!(!sdl.contains("directive @"), "{}", sdl);
	}

	#[test]
	fn test_canonical_definition_wins() {
		let outcome = compose_stitching(&[
			SubgraphInput::new("a", r#"type Query { a: Item } type Item { id: ID name: String }"#),
			SubgraphInput::new("b", r#"type Query { b: Item } type Item { id: ID! name: String! @canonical }"#),
		]);
		let sdl = &outcome.as_success().unwrap().public_sdl;
		assert!(sdl.contains("name: String!"), "{}", sdl);
		assert!(sdl.contains("id: ID\n"), "{}", sdl);
	}

	#[test]
	fn test_errors_are_collected_with_partial_sdl() {
		let outcome = compose_stitching(&[
			SubgraphInput::new("a", "type Query { a: String } type Thing { id: ID }"),
			SubgraphInput::new("b", "type Query { b: Missing } interface Thing { id: ID }"),
			SubgraphInput::new("c", "type Query {"),
		]);
		let failure = outcome.as_failure().unwrap();
		let messages: Vec<&str> = failure.errors.iter().map(|e| e.message.as_str()).collect();
		assert!(messages.iter().any(|m| m.starts_with("[b] ") && m.contains("Missing")), "{:?}", messages);
		assert!(messages.iter().any(|m| m.starts_with("[c] ")), "{:?}", messages);
		assert!(
			failure
				.errors
				.iter()
				.any(|e| e.source == ErrorSource::Composition && e.message.contains("\"Thing\"")),
			"{:?}",
			messages
		);
		assert!(failure.partial_sdl.as_deref().unwrap().contains("type Query"));
	}

	#[test]
	fn test_declared_vocabulary_is_respected() {
		let outcome = compose_stitching(&[SubgraphInput::new(
			"a",
			r#"directive @key(selectionSet: String!) on OBJECT
			type Query { a: A } type A @key(selectionSet: "{ id }") { id: ID }"#,
		)]);
		assert!(outcome.is_success(), "{:?}", outcome.errors());
	}
}
