// Public (API) schema derivation from a supergraph

use std::collections::HashSet;

use crate::graphql::*;

const MACHINERY_PREFIXES: [&str; 3] = ["join__", "link__", "core__"];

/// Directives that stay visible to API consumers.
const PUBLIC_DIRECTIVES: [&str; 3] = ["deprecated", "specifiedBy", "oneOf"];

fn is_machinery(name: &str) -> bool {
	MACHINERY_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn hidden(directives: &[Directive]) -> bool {
	has_directive(directives, "inaccessible")
}

/// Strip federation machinery and everything `@inaccessible` from a
/// supergraph, returning the schema clients see.
pub fn api_schema(supergraph: &Document) -> Document {
	let mut types: Vec<TypeDefinition> = supergraph
		.types()
		.filter(|t| !is_machinery(&t.name) && !hidden(&t.directives))
		.cloned()
		.collect();

	for ty in &mut types {
		ty.directives.retain(|d| PUBLIC_DIRECTIVES.contains(&d.name.as_str()));
		match &mut ty.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => {
				t.fields.retain(|f| !hidden(&f.directives));
				for field in &mut t.fields {
					field.arguments.retain(|a| !hidden(&a.directives));
					strip_directives(&mut field.directives);
					for argument in &mut field.arguments {
						strip_directives(&mut argument.directives);
					}
				}
			},
			TypeKind::Enum(values) => {
				values.retain(|v| !hidden(&v.directives));
				for value in values {
					strip_directives(&mut value.directives);
				}
			},
			TypeKind::InputObject(fields) => {
				fields.retain(|f| !hidden(&f.directives));
				for field in fields {
					strip_directives(&mut field.directives);
				}
			},
			TypeKind::Scalar | TypeKind::Union(_) => {},
		}
	}

	// Removing a type can leave references or whole types dangling.
	loop {
		let defined: HashSet<String> = types
			.iter()
			.map(|t| t.name.clone())
			.chain(BUILTIN_SCALARS.iter().map(|s| s.to_string()))
			.collect();
		let before = types.len();
		for ty in &mut types {
			match &mut ty.kind {
				TypeKind::Object(t) | TypeKind::Interface(t) => {
					t.implements.retain(|i| defined.contains(i));
					t.fields.retain(|f| defined.contains(f.ty.base_name()));
					for field in &mut t.fields {
						field.arguments.retain(|a| defined.contains(a.ty.base_name()));
					}
				},
				TypeKind::Union(members) => members.retain(|m| defined.contains(m)),
				TypeKind::InputObject(fields) => fields.retain(|f| defined.contains(f.ty.base_name())),
				TypeKind::Scalar | TypeKind::Enum(_) => {},
			}
		}
		types.retain(|t| match &t.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => !t.fields.is_empty(),
			TypeKind::Union(members) => !members.is_empty(),
			TypeKind::Enum(values) => !values.is_empty(),
			TypeKind::InputObject(fields) => !fields.is_empty(),
			TypeKind::Scalar => true,
		});
		if types.len() == before {
			break;
		}
	}

	let operations: Vec<(OperationKind, String)> = OperationKind::ALL
		.into_iter()
		.filter_map(|kind| {
			let name = supergraph.root_type_name(kind)?;
			types.iter().any(|t| t.name == name).then_some((kind, name))
		})
		.collect();
	let mut definitions = Vec::new();
	if operations.iter().any(|(kind, name)| name != kind.default_type_name()) {
		definitions.push(Definition::Schema(SchemaDefinition {
			extend: false,
			directives: Vec::new(),
			operations,
		}));
	}
	definitions.extend(types.into_iter().map(Definition::Type));
	Document { definitions }
}

fn strip_directives(directives: &mut Vec<Directive>) {
	directives.retain(|d| PUBLIC_DIRECTIVES.contains(&d.name.as_str()));
}

/// Parse a supergraph and print its public schema.
pub fn public_sdl(supergraph_sdl: &str) -> Result<String, ParseError> {
	let supergraph = parse_document(supergraph_sdl)?;
	Ok(print_document(&api_schema(&supergraph)))
}
