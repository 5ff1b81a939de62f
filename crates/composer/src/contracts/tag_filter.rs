// Tag-based visibility filtering of one subgraph

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::composition::federation::subgraph::{FEDERATION_SPEC_URL, LinkImports};
use crate::graphql::*;
use crate::types::ContractSpec;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
	pub include: BTreeSet<String>,
	pub exclude: BTreeSet<String>,
}

impl TagFilter {
	pub fn new(include: BTreeSet<String>, exclude: BTreeSet<String>) -> Self {
		Self { include, exclude }
	}

	/// Whether an element carrying `tags` is hidden.
	pub fn hides(&self, tags: &BTreeSet<String>) -> bool {
		(!self.include.is_empty() && tags.is_disjoint(&self.include))
			|| (!self.exclude.is_empty() && !tags.is_disjoint(&self.exclude))
	}
}

impl From<&ContractSpec> for TagFilter {
	fn from(contract: &ContractSpec) -> Self {
		Self::new(contract.include_tags.clone(), contract.exclude_tags.clone())
	}
}

/// A subgraph document with filtered elements marked inaccessible.
#[derive(Debug, Clone)]
pub struct FilteredSubgraph {
	pub document: Document,
	/// Types whose every field (or value, member) this subgraph hides.
	pub fully_hidden: HashSet<String>,
	/// Local name of `@inaccessible` in this document.
	pub inaccessible: String,
}

impl FilteredSubgraph {
	/// Mark the named types inaccessible wherever this subgraph defines them.
	pub fn hide_types(&mut self, names: &HashSet<String>) {
		let inaccessible = self.inaccessible.clone();
		for ty in self.document.types_mut().filter(|t| names.contains(&t.name)) {
			mark(&mut ty.directives, &inaccessible);
		}
	}
}

fn mark(directives: &mut Vec<Directive>, inaccessible: &str) {
	if !has_directive(directives, inaccessible) {
		directives.push(Directive::new(inaccessible));
	}
}

fn tags_of(directives: &[Directive], tag: &str) -> BTreeSet<String> {
	directives_named(directives, tag)
		.filter_map(|d| d.string_argument("name"))
		.map(str::to_string)
		.collect()
}

/// Apply `filter` to a parsed subgraph.
///
/// Fields, enum values and input fields inherit their type's tags;
/// arguments, scalars and unions are judged by their own tags only, and
/// only when they carry any. Required arguments and input fields are never
/// hidden. Types are not marked here: a type is only hidden once every
/// subgraph defining it hides it fully, which the caller decides.
pub fn apply(filter: &TagFilter, mut document: Document) -> FilteredSubgraph {
	let imports = LinkImports::detect(&document);
	let tag = imports.local_name("tag").unwrap_or("tag").to_string();
	// Follow the tag's style: namespaced usages get the namespaced name,
	// imported ones get `@inaccessible` imported too.
	let inaccessible = match imports.local_name("inaccessible") {
		Some(name) if !name.contains("__") || tag.contains("__") => name.to_string(),
		_ => {
			if imports.federation_v2 {
				import_inaccessible(&mut document);
			}
			"inaccessible".to_string()
		},
	};

	// Per type name: still fully hidden across all of its definitions.
	let mut hidden_types: HashMap<String, bool> = HashMap::new();
	for ty in document.types_mut() {
		let type_tags = tags_of(&ty.directives, &tag);
		let inherit = |own: &[Directive]| {
			let mut tags = tags_of(own, &tag);
			tags.extend(type_tags.iter().cloned());
			tags
		};
		let fully_hidden = match &mut ty.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => {
				let mut all = !t.fields.is_empty();
				for field in &mut t.fields {
					if filter.hides(&inherit(&field.directives)) {
						mark(&mut field.directives, &inaccessible);
					} else {
						all = false;
					}
					for argument in field.arguments.iter_mut().filter(|a| !a.is_required()) {
						let own = tags_of(&argument.directives, &tag);
						if !own.is_empty() && filter.hides(&own) {
							mark(&mut argument.directives, &inaccessible);
						}
					}
				}
				all
			},
			TypeKind::Enum(values) => {
				let mut all = !values.is_empty();
				for value in values {
					if filter.hides(&inherit(&value.directives)) {
						mark(&mut value.directives, &inaccessible);
					} else {
						all = false;
					}
				}
				all
			},
			TypeKind::InputObject(fields) => {
				let mut all = !fields.is_empty();
				for field in fields {
					if !field.is_required() && filter.hides(&inherit(&field.directives)) {
						mark(&mut field.directives, &inaccessible);
					} else {
						all = false;
					}
				}
				all || (!type_tags.is_empty() && filter.hides(&type_tags))
			},
			TypeKind::Scalar | TypeKind::Union(_) => !type_tags.is_empty() && filter.hides(&type_tags),
		};
		let entry = hidden_types.entry(ty.name.clone()).or_insert(true);
		*entry &= fully_hidden;
	}

	FilteredSubgraph {
		document,
		fully_hidden: hidden_types
			.into_iter()
			.filter_map(|(name, hidden)| hidden.then_some(name))
			.collect(),
		inaccessible,
	}
}

/// Add `@inaccessible` to the federation `@link` import list.
fn import_inaccessible(document: &mut Document) {
	for definition in &mut document.definitions {
		let Definition::Schema(schema) = definition else {
			continue;
		};
		for link in schema.directives.iter_mut().filter(|d| d.name == "link") {
			if !link.string_argument("url").is_some_and(|u| u.starts_with(FEDERATION_SPEC_URL)) {
				continue;
			}
			let entry = Value::string("@inaccessible");
			match link.arguments.iter_mut().find(|(name, _)| name == "import") {
				Some((_, Value::List(items))) => items.push(entry),
				Some((_, other)) => *other = Value::List(vec![entry]),
				None => link.arguments.push(("import".to_string(), Value::List(vec![entry]))),
			}
			return;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filter(include: &[&str], exclude: &[&str]) -> TagFilter {
		TagFilter::new(
			include.iter().map(|s| s.to_string()).collect(),
			exclude.iter().map(|s| s.to_string()).collect(),
		)
	}

	fn filtered(filter: &TagFilter, sdl: &str) -> FilteredSubgraph {
		apply(filter, parse_document(sdl).unwrap())
	}

	#[test]
	fn test_hides() {
		let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
		assert!(filter(&[], &["internal"]).hides(&tags(&["internal", "public"])));
		assert!(!filter(&[], &["internal"]).hides(&tags(&[])));
		assert!(filter(&["public"], &[]).hides(&tags(&[])));
		assert!(!filter(&["public"], &[]).hides(&tags(&["public"])));
		assert!(filter(&["public"], &["internal"]).hides(&tags(&["public", "internal"])));
		assert!(!filter(&[], &[]).hides(&tags(&["anything"])));
	}

	#[test]
	fn test_fields_inherit_type_tags() {
		let result = filtered(
			&filter(&[], &["internal"]),
			r#"type Query { a: String b: Admin }
			type Admin @tag(name: "internal") { id: ID name: String }"#,
		);
		let printed = print_document(&result.document);
		assert!(printed.contains("id: ID @inaccessible"));
		assert!(printed.contains("name: String @inaccessible"));
		assert!(!printed.contains("type Admin @tag(name: \"internal\") @inaccessible"));
		assert_eq!(result.fully_hidden, HashSet::from(["Admin".to_string()]));
	}

	#[test]
	fn test_required_arguments_stay() {
		let result = filtered(
			&filter(&[], &["internal"]),
			r#"type Query { user(id: ID! @tag(name: "internal"), debug: Boolean @tag(name: "internal")): String }"#,
		);
		let printed = print_document(&result.document);
		assert!(printed.contains("user(id: ID! @tag(name: \"internal\"), debug: Boolean @tag(name: \"internal\") @inaccessible)"));
	}

	#[test]
	fn test_enum_and_scalar() {
		let result = filtered(
			&filter(&[], &["internal"]),
			r#"type Query { role: Role at: Date }
			enum Role { ADMIN @tag(name: "internal") USER }
			scalar Date @tag(name: "internal")
			scalar Untagged"#,
		);
		let printed = print_document(&result.document);
		assert!(printed.contains("ADMIN @tag(name: \"internal\") @inaccessible"));
		assert!(result.fully_hidden.contains("Date"));
		assert!(!result.fully_hidden.contains("Role"));
		assert!(!result.fully_hidden.contains("Untagged"));
	}

	#[test]
	fn test_adds_inaccessible_import_for_fed2() {
		let result = filtered(
			&filter(&[], &["internal"]),
			r#"extend schema @link(url: "https://specs.apollo.dev/federation/v2.0", import: ["@tag"])
			type Query { a: String @tag(name: "internal") }"#,
		);
		let printed = print_document(&result.document);
		assert!(printed.contains("import: [\"@tag\", \"@inaccessible\"]"));
		assert!(printed.contains("a: String @tag(name: \"internal\") @inaccessible"));
	}

	#[test]
	fn test_uses_namespaced_names() {
		let result = filtered(
			&filter(&[], &["internal"]),
			r#"extend schema @link(url: "https://specs.apollo.dev/federation/v2.0", import: ["@key"])
			type Query { a: String @federation__tag(name: "internal") }"#,
		);
		let printed = print_document(&result.document);
		assert!(printed.contains("@federation__inaccessible"));
	}
}
