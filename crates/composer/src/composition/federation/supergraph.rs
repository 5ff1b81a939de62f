// Supergraph document assembly: spec links, join machinery, graph enum

use super::compose::FederationVersion;
use super::subgraph::Subgraph;
use crate::error::CompositionError;
use crate::graphql::*;

const V2_MACHINERY: &str = r#"
directive @inaccessible on FIELD_DEFINITION | OBJECT | INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION

directive @join__enumValue(graph: join__Graph!) repeatable on ENUM_VALUE

directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet, type: String, external: Boolean, override: String, usedOverridden: Boolean) repeatable on FIELD_DEFINITION | INPUT_FIELD_DEFINITION

directive @join__graph(name: String!, url: String!) on ENUM_VALUE

directive @join__implements(graph: join__Graph!, interface: String!) repeatable on OBJECT | INTERFACE

directive @join__type(graph: join__Graph!, key: join__FieldSet, extension: Boolean! = false, resolvable: Boolean! = true, isInterfaceObject: Boolean! = false) repeatable on OBJECT | INTERFACE | UNION | ENUM | INPUT_OBJECT | SCALAR

directive @join__unionMember(graph: join__Graph!, member: String!) repeatable on UNION

directive @link(url: String, as: String, for: link__Purpose, import: [link__Import]) repeatable on SCHEMA

directive @tag(name: String!) repeatable on FIELD_DEFINITION | OBJECT | INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION | SCHEMA

scalar join__FieldSet

scalar link__Import

enum link__Purpose {
	"""
	`SECURITY` features provide metadata necessary to securely resolve fields.
	"""
	SECURITY

	"""
	`EXECUTION` features provide metadata necessary for operation execution.
	"""
	EXECUTION
}
"#;

const V1_MACHINERY: &str = r#"
directive @core(feature: String!, as: String, for: core__Purpose) repeatable on SCHEMA

directive @inaccessible on FIELD_DEFINITION | OBJECT | INTERFACE | UNION

directive @join__field(graph: join__Graph, requires: join__FieldSet, provides: join__FieldSet) on FIELD_DEFINITION

directive @join__graph(name: String!, url: String!) on ENUM_VALUE

directive @join__owner(graph: join__Graph!) on OBJECT | INTERFACE

directive @join__type(graph: join__Graph!, key: join__FieldSet) repeatable on OBJECT | INTERFACE

directive @tag(name: String!) repeatable on FIELD_DEFINITION | OBJECT | INTERFACE | UNION

enum core__Purpose {
	"""
	`EXECUTION` features provide metadata necessary to for operation execution.
	"""
	EXECUTION

	"""
	`SECURITY` features provide metadata necessary to securely resolve fields.
	"""
	SECURITY
}

scalar join__FieldSet
"#;

fn link(url: &str, purpose: Option<&str>) -> Directive {
	let directive = Directive::new("link").with_argument("url", Value::string(url));
	match purpose {
		Some(purpose) => directive.with_argument("for", Value::Enum(purpose.into())),
		None => directive,
	}
}

fn core(feature: &str, purpose: Option<&str>) -> Directive {
	let directive = Directive::new("core").with_argument("feature", Value::string(feature));
	match purpose {
		Some(purpose) => directive.with_argument("for", Value::Enum(purpose.into())),
		None => directive,
	}
}

/// Assemble the supergraph document around merged type definitions.
pub fn build(
	version: FederationVersion,
	subgraphs: &[Subgraph],
	graphs: &[String],
	types: Vec<TypeDefinition>,
) -> Result<Document, CompositionError> {
	let (machinery, directives) = match version {
		FederationVersion::V2 => (
			V2_MACHINERY,
			vec![
				link("https://specs.apollo.dev/link/v1.0", None),
				link("https://specs.apollo.dev/join/v0.3", Some("EXECUTION")),
				link("https://specs.apollo.dev/tag/v0.3", None),
				link("https://specs.apollo.dev/inaccessible/v0.2", Some("SECURITY")),
			],
		),
		FederationVersion::V1 => (
			V1_MACHINERY,
			vec![
				core("https://specs.apollo.dev/core/v0.2", None),
				core("https://specs.apollo.dev/join/v0.1", Some("EXECUTION")),
				core("https://specs.apollo.dev/tag/v0.1", None),
				core("https://specs.apollo.dev/inaccessible/v0.1", Some("SECURITY")),
			],
		),
	};
	let machinery = parse_document(machinery)
		.map_err(|e| CompositionError::composition(format!("Invalid supergraph machinery: {}", e.message)))?;

	let operations = OperationKind::ALL
		.into_iter()
		.filter(|kind| types.iter().any(|t| t.name == kind.default_type_name()))
		.map(|kind| (kind, kind.default_type_name().to_string()))
		.collect();
	let mut document = Document {
		definitions: vec![Definition::Schema(SchemaDefinition {
			extend: false,
			directives,
			operations,
		})],
	};
	document.definitions.extend(machinery.definitions);
	document
		.definitions
		.push(Definition::Type(graph_enum(subgraphs, graphs)));
	document.definitions.extend(types.into_iter().map(Definition::Type));
	Ok(document)
}

fn graph_enum(subgraphs: &[Subgraph], graphs: &[String]) -> TypeDefinition {
	let values = subgraphs
		.iter()
		.zip(graphs)
		.map(|(subgraph, graph)| EnumValueDefinition {
			description: None,
			name: graph.clone(),
			directives: vec![
				Directive::new("join__graph")
					.with_argument("name", Value::string(subgraph.name.clone()))
					.with_argument("url", Value::string(subgraph.url.clone().unwrap_or_default())),
			],
		})
		.collect();
	TypeDefinition::new("join__Graph", TypeKind::Enum(values))
}
