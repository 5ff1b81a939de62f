// Subgraph normalization: link imports, root names, federation machinery

use std::collections::{HashMap, HashSet};

use crate::error::CompositionError;
use crate::graphql::*;
use crate::types::SubgraphInput;

pub const FEDERATION_SPEC_URL: &str = "https://specs.apollo.dev/federation/";

pub const FEDERATION_DIRECTIVES: [&str; 18] = [
	"key",
	"requires",
	"provides",
	"external",
	"extends",
	"shareable",
	"inaccessible",
	"override",
	"tag",
	"composeDirective",
	"interfaceObject",
	"authenticated",
	"requiresScopes",
	"policy",
	"cost",
	"listSize",
	"context",
	"fromContext",
];

/// Types a subgraph exposes only for the federation runtime.
pub const MACHINERY_TYPES: [&str; 11] = [
	"_Service",
	"_Entity",
	"_Any",
	"_FieldSet",
	"FieldSet",
	"federation__FieldSet",
	"federation__Scope",
	"federation__Policy",
	"federation__ContextFieldValue",
	"link__Import",
	"link__Purpose",
];

/// What a subgraph's `@link` directives bring into scope.
#[derive(Debug, Clone, Default)]
pub struct LinkImports {
	pub federation_v2: bool,
	/// Local directive name to federation directive name.
	pub renames: HashMap<String, String>,
	/// Directive names imported from other specs.
	pub foreign: HashSet<String>,
	/// Namespaces of other specs, for `{namespace}__{directive}` usages.
	pub namespaces: HashSet<String>,
}

impl LinkImports {
	pub fn detect(doc: &Document) -> Self {
		let mut imports = LinkImports::default();
		for link in doc.schema_directives().filter(|d| d.name == "link") {
			let Some(url) = link.string_argument("url") else {
				continue;
			};
			let namespace = link
				.string_argument("as")
				.map(str::to_string)
				.unwrap_or_else(|| spec_name(url));
			let imported = import_list(link);
			if url.starts_with(FEDERATION_SPEC_URL) {
				imports.federation_v2 = true;
				for directive in FEDERATION_DIRECTIVES {
					imports
						.renames
						.insert(format!("{}__{}", namespace, directive), directive.to_string());
				}
				for (name, alias) in imported {
					if let Some(name) = name.strip_prefix('@')
						&& FEDERATION_DIRECTIVES.contains(&name)
					{
						let local = alias.as_deref().unwrap_or(name);
						imports
							.renames
							.insert(local.trim_start_matches('@').to_string(), name.to_string());
					}
				}
			} else {
				imports.namespaces.insert(namespace);
				for (name, alias) in imported {
					if let Some(name) = name.strip_prefix('@') {
						let local = alias.as_deref().unwrap_or(name);
						imports.foreign.insert(local.trim_start_matches('@').to_string());
					}
				}
			}
		}
		if !imports.federation_v2 {
			for directive in FEDERATION_DIRECTIVES {
				imports
					.renames
					.insert(directive.to_string(), directive.to_string());
			}
		}
		imports
	}

	/// Local name under which `canonical` is usable, if any.
	pub fn local_name(&self, canonical: &str) -> Option<&str> {
		let mut candidates: Vec<&str> = self
			.renames
			.iter()
			.filter(|(_, c)| c.as_str() == canonical)
			.map(|(local, _)| local.as_str())
			.collect();
		// Prefer the short (imported) name over the namespaced one.
		candidates.sort_by_key(|l| (l.contains("__"), l.len()));
		candidates.first().copied()
	}
}

/// Last path segment of a spec url without its version: `.../federation/v2.3` -> `federation`.
fn spec_name(url: &str) -> String {
	let segments: Vec<&str> = url.trim_end_matches('/').split('/').collect();
	match segments.as_slice() {
		[.., name, version] if version.starts_with('v') => name.to_string(),
		[.., name] => name.to_string(),
		[] => String::new(),
	}
}

/// `(name, alias)` pairs of a `@link(import:)` list.
pub fn import_list(link: &Directive) -> Vec<(String, Option<String>)> {
	let Some(Value::List(items)) = link.argument("import") else {
		return Vec::new();
	};
	items
		.iter()
		.filter_map(|item| match item {
			Value::String(name) => Some((name.clone(), None)),
			Value::Object(fields) => {
				let lookup = |key: &str| {
					fields
						.iter()
						.find(|(k, _)| k == key)
						.and_then(|(_, v)| v.as_str())
						.map(str::to_string)
				};
				lookup("name").map(|name| (name, lookup("as")))
			},
			_ => None,
		})
		.collect()
}

/// A parsed, validated subgraph with federation directives under their
/// canonical names.
#[derive(Debug, Clone)]
pub struct Subgraph {
	pub name: String,
	pub url: Option<String>,
	pub federation_v2: bool,
	pub document: Document,
	/// Types this subgraph only extends.
	pub extensions: HashSet<String>,
}

impl Subgraph {
	pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
		self.document.types()
	}

	/// Fields named by this type's `@key` directives, top level only.
	pub fn key_fields(&self, ty: &TypeDefinition) -> HashSet<String> {
		directives_named(&ty.directives, "key")
			.filter_map(|d| d.string_argument("fields"))
			.flat_map(top_level_fields)
			.collect()
	}

	/// Whether another subgraph may resolve `field` of `ty` too.
	pub fn is_shareable(&self, ty: &TypeDefinition, field: &FieldDefinition) -> bool {
		!self.federation_v2
			|| ty.has_directive("shareable")
			|| field.has_directive("shareable")
			|| self.key_fields(ty).contains(&field.name)
	}
}

/// Top-level field names of a field set such as `"id organization { id }"`.
pub fn top_level_fields(selection: &str) -> Vec<String> {
	let mut fields = Vec::new();
	let mut depth = 0usize;
	let mut current = String::new();
	let flush = |current: &mut String, fields: &mut Vec<String>| {
		if !current.is_empty() {
			fields.push(std::mem::take(current));
		}
	};
	for ch in selection.chars() {
		match ch {
			'{' => {
				if depth == 0 {
					flush(&mut current, &mut fields);
				}
				depth += 1;
			},
			'}' => depth = depth.saturating_sub(1),
			c if depth == 0 && (c.is_alphanumeric() || c == '_') => current.push(c),
			_ if depth == 0 => flush(&mut current, &mut fields),
			_ => {},
		}
	}
	flush(&mut current, &mut fields);
	fields
}

pub fn normalize(input: &SubgraphInput) -> Result<Subgraph, Vec<CompositionError>> {
	let name = input.source_name.as_str();
	let mut document = parse_document(&input.raw_sdl)
		.map_err(|e| vec![CompositionError::graphql(e.message).in_subgraph(name)])?;

	let imports = LinkImports::detect(&document);
	let defined: HashSet<String> = document
		.directive_definitions()
		.map(|d| d.name.clone())
		.collect();
	let mut unimported = std::collections::BTreeSet::new();
	document.for_each_directives_mut(|directives| {
		for directive in directives.iter_mut() {
			if let Some(canonical) = imports.renames.get(&directive.name) {
				directive.name = canonical.clone();
			} else if imports.federation_v2
				&& FEDERATION_DIRECTIVES.contains(&directive.name.as_str())
				&& !defined.contains(&directive.name)
			{
				unimported.insert(directive.name.clone());
			}
		}
	});
	if !unimported.is_empty() {
		return Err(
			unimported
				.into_iter()
				.map(|d| CompositionError::graphql(format!("Unknown directive \"@{}\".", d)).in_subgraph(name))
				.collect(),
		);
	}

	let mut extensions: HashSet<String> = merge_extensions(&mut document).into_iter().collect();
	for ty in document.types().filter(|t| t.has_directive("extends")) {
		extensions.insert(ty.name.clone());
	}

	normalize_roots(&mut document);
	strip_machinery(&mut document);

	let namespaced: Vec<String> = document
		.directive_lists()
		.into_iter()
		.flatten()
		.filter(|d| {
			d.name
				.split_once("__")
				.is_some_and(|(namespace, _)| imports.namespaces.contains(namespace))
		})
		.map(|d| d.name.clone())
		.collect();
	let options = ValidationOptions::default()
		.without_query_root()
		.with_directives(FEDERATION_DIRECTIVES)
		.with_directives(["link"])
		.with_directives(imports.foreign.iter().cloned())
		.with_directives(namespaced)
		.with_types(MACHINERY_TYPES);
	let errors: Vec<CompositionError> = validate_document(&document, &options)
		.into_iter()
		.map(|e| e.in_subgraph(name))
		.collect();
	if !errors.is_empty() {
		return Err(errors);
	}

	Ok(Subgraph {
		name: name.to_string(),
		url: input.url.clone(),
		federation_v2: imports.federation_v2,
		document,
		extensions,
	})
}

/// Rename custom root types to `Query`/`Mutation`/`Subscription` and drop
/// the schema definition.
fn normalize_roots(document: &mut Document) {
	let renames: Vec<(String, &'static str)> = OperationKind::ALL
		.into_iter()
		.filter_map(|kind| {
			let name = document.root_type_name(kind)?;
			let default = kind.default_type_name();
			(name != default).then_some((name, default))
		})
		.collect();
	for (from, to) in renames {
		document.rename_type(&from, to);
	}
	document
		.definitions
		.retain(|d| !matches!(d, Definition::Schema(_)));
}

fn strip_machinery(document: &mut Document) {
	document.definitions.retain(|definition| match definition {
		Definition::Type(ty) => !MACHINERY_TYPES.contains(&ty.name.as_str()),
		Definition::Directive(def) => {
			!FEDERATION_DIRECTIVES.contains(&def.name.as_str()) && def.name != "link" && !def.name.contains("__")
		},
		Definition::Schema(_) => true,
	});
	if let Some(query) = document.type_named_mut("Query")
		&& let Some(fields) = query.fields_mut()
	{
		fields.retain(|f| f.name != "_service" && f.name != "_entities");
	}
	document.definitions.retain(|definition| match definition {
		Definition::Type(ty) if ty.name == "Query" => ty.fields().is_some_and(|f| !f.is_empty()),
		_ => true,
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_detects_imports_and_aliases() {
		let doc = parse_document(
			r#"
			extend schema
				@link(url: "https://specs.apollo.dev/federation/v2.3", import: ["@key", {name: "@shareable", as: "@share"}])
				@link(url: "https://specs.graphql-hive.com/hive/v1.0", import: ["@meta"])
			type Query { a: String }
			"#,
		)
		.unwrap();
		let imports = LinkImports::detect(&doc);
		assert!(imports.federation_v2);
		assert_eq!(imports.renames.get("key").map(String::as_str), Some("key"));
		assert_eq!(imports.renames.get("share").map(String::as_str), Some("shareable"));
		assert_eq!(
			imports.renames.get("federation__tag").map(String::as_str),
			Some("tag")
		);
		assert!(!imports.renames.contains_key("tag"));
		assert!(imports.foreign.contains("meta"));
		assert_eq!(imports.local_name("shareable"), Some("share"));
		assert_eq!(imports.local_name("tag"), Some("federation__tag"));
	}

	#[test]
	fn test_top_level_fields() {
		assert_eq!(top_level_fields("id"), vec!["id"]);
		assert_eq!(
			top_level_fields("id organization { id name } sku"),
			vec!["id", "organization", "sku"]
		);
	}

	#[test]
	fn test_normalize_strips_machinery_and_renames_roots() {
		let input = SubgraphInput::new(
			"products",
			r#"
			schema { query: RootQuery }
			scalar _Any
			scalar _FieldSet
			union _Entity = Product
			type _Service { sdl: String }
			directive @key(fields: _FieldSet!) repeatable on OBJECT | INTERFACE
			type RootQuery { products: [Product] _service: _Service! _entities(representations: [_Any!]!): [_Entity]! }
			type Product @key(fields: "id") { id: ID! }
			extend type User @key(fields: "id") { id: ID! @external }
			"#,
		);
		let subgraph = normalize(&input).unwrap();
		assert!(!subgraph.federation_v2);
		let query = subgraph.document.type_named("Query").unwrap();
		assert_eq!(query.fields().unwrap().len(), 1);
		assert!(subgraph.document.type_named("_Service").is_none());
		assert!(subgraph.document.directive_definitions().next().is_none());
		assert!(subgraph.extensions.contains("User"));
		assert!(!subgraph.extensions.contains("Product"));
	}

	#[test]
	fn test_normalize_reports_prefixed_errors() {
		let input = SubgraphInput::new("reviews", "type Query { review: Review }");
		let errors = normalize(&input).unwrap_err();
		assert_eq!(errors[0].message, "[reviews] Unknown type \"Review\".");
	}

	#[test]
	fn test_unimported_fed2_directive_is_unknown() {
		let input = SubgraphInput::new(
			"a",
			r#"extend schema @link(url: "https://specs.apollo.dev/federation/v2.0", import: ["@key"])
			type Query { a: String @shareable }"#,
		);
		let errors = normalize(&input).unwrap_err();
		assert!(errors[0].message.contains("Unknown directive \"@shareable\""));
	}
}
