//! Merging of normalized subgraphs into supergraph type definitions.
//!
//! The merger walks every type name across all subgraphs in first-seen
//! order, applies the merge rules of the selected federation version and
//! annotates the result with `join__*` directives describing which graph
//! resolves what. Problems are collected, never short-circuited.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use super::subgraph::{Subgraph, top_level_fields};
use crate::error::CompositionError;
use crate::graphql::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederationVersion {
	V1,
	V2,
}

/// Directives a subgraph may attach that survive into the supergraph.
const CARRIED_DIRECTIVES: [&str; 4] = ["tag", "inaccessible", "deprecated", "specifiedBy"];

const ROOT_TYPES: [&str; 3] = ["Query", "Mutation", "Subscription"];

struct Occurrence<'a> {
	graph: usize,
	ty: &'a TypeDefinition,
}

struct FieldOccurrence<'a> {
	graph: usize,
	owner: &'a TypeDefinition,
	field: &'a FieldDefinition,
}

impl FieldOccurrence<'_> {
	fn is_external(&self) -> bool {
		self.field.has_directive("external")
	}
}

/// Merge `subgraphs` into supergraph type definitions.
///
/// `graphs` holds the `join__Graph` value of each subgraph, index-aligned.
pub fn merge(
	subgraphs: &[Subgraph],
	graphs: &[String],
	version: FederationVersion,
) -> Result<Vec<TypeDefinition>, Vec<CompositionError>> {
	let mut merger = Merger {
		subgraphs,
		graphs,
		version,
		errors: Vec::new(),
	};
	if version == FederationVersion::V1 {
		for subgraph in subgraphs.iter().filter(|s| s.federation_v2) {
			merger.errors.push(CompositionError::composition(format!(
				"[{}] Subgraph \"{}\" is a Federation v2 subgraph, which cannot be composed with Federation v1. Enable native Federation v2 composition to compose it.",
				subgraph.name, subgraph.name
			)));
		}
		if !merger.errors.is_empty() {
			return Err(merger.errors);
		}
	}
	merger.validate_keys();
	let types = merger.merge_types();
	merger.check_query_root(&types);
	merger.errors.extend(check_inaccessible(&types));
	if merger.errors.is_empty() {
		Ok(types)
	} else {
		Err(merger.errors)
	}
}

struct Merger<'a> {
	subgraphs: &'a [Subgraph],
	graphs: &'a [String],
	version: FederationVersion,
	errors: Vec<CompositionError>,
}

impl<'a> Merger<'a> {
	fn error(&mut self, message: String) {
		self.errors.push(CompositionError::composition(message));
	}

	fn graph_value(&self, graph: usize) -> Value {
		Value::Enum(self.graphs[graph].clone())
	}

	fn subgraph_names(&self, graphs: impl IntoIterator<Item = usize>) -> String {
		graphs
			.into_iter()
			.map(|g| format!("\"{}\"", self.subgraphs[g].name))
			.collect::<Vec<_>>()
			.join(", ")
	}

	fn validate_keys(&mut self) {
		let mut errors = Vec::new();
		for subgraph in self.subgraphs {
			for ty in subgraph.types() {
				for key in directives_named(&ty.directives, "key") {
					let Some(fields) = key.string_argument("fields") else {
						continue;
					};
					for field in top_level_fields(fields) {
						if ty.field(&field).is_none() {
							errors.push(
								CompositionError::composition(format!(
									"On type \"{}\", for @key(fields: \"{}\"): Cannot query field \"{}\" on type \"{}\" (the field should either be added to this subgraph or, if it should not be resolved by this subgraph, you need to add it to this subgraph with @external).",
									ty.name, fields, field, ty.name
								))
								.in_subgraph(&subgraph.name),
							);
						}
					}
				}
			}
		}
		self.errors.extend(errors);
	}

	fn merge_types(&mut self) -> Vec<TypeDefinition> {
		let subgraphs = self.subgraphs;
		let mut by_name: IndexMap<&'a str, Vec<Occurrence<'a>>> = IndexMap::new();
		for (graph, subgraph) in subgraphs.iter().enumerate() {
			for ty in subgraph.types() {
				by_name
					.entry(ty.name.as_str())
					.or_default()
					.push(Occurrence { graph, ty });
			}
		}
		by_name
			.into_iter()
			.filter_map(|(name, occurrences)| self.merge_type(name, &occurrences))
			.collect()
	}

	fn merge_type(&mut self, name: &str, occurrences: &[Occurrence<'a>]) -> Option<TypeDefinition> {
		let first = occurrences.first()?;
		if let Some(other) = occurrences.iter().find(|o| !o.ty.kind.same_kind(&first.ty.kind)) {
			self.error(format!(
				"Type \"{}\" has mismatched kind: it is defined as {} in subgraph \"{}\" but {} in subgraph \"{}\"",
				name,
				first.ty.kind.label(),
				self.subgraphs[first.graph].name,
				other.ty.kind.label(),
				self.subgraphs[other.graph].name
			));
			return None;
		}

		let kind = match &first.ty.kind {
			TypeKind::Scalar => TypeKind::Scalar,
			TypeKind::Object(_) => TypeKind::Object(self.merge_fields_type(name, occurrences, true)),
			TypeKind::Interface(_) => TypeKind::Interface(self.merge_fields_type(name, occurrences, false)),
			TypeKind::Union(_) => TypeKind::Union(self.merge_union(occurrences)),
			TypeKind::Enum(_) => TypeKind::Enum(self.merge_enum(occurrences)),
			TypeKind::InputObject(_) => TypeKind::InputObject(self.merge_input(name, occurrences)),
		};

		let mut merged = TypeDefinition::new(name, kind);
		merged.description = occurrences.iter().find_map(|o| o.ty.description.clone());
		merged.directives = carried_directives(occurrences.iter().map(|o| o.ty.directives.as_slice()));
		merged.directives.extend(self.type_join_directives(name, occurrences));
		Some(merged)
	}

	fn type_join_directives(&mut self, name: &str, occurrences: &[Occurrence<'a>]) -> Vec<Directive> {
		let mut directives = Vec::new();
		match self.version {
			FederationVersion::V2 => {
				for occurrence in occurrences {
					let extension = self.subgraphs[occurrence.graph].extensions.contains(name);
					let keys: Vec<&Directive> = directives_named(&occurrence.ty.directives, "key").collect();
					if keys.is_empty() {
						let mut join = Directive::new("join__type").with_argument("graph", self.graph_value(occurrence.graph));
						if extension {
							join = join.with_argument("extension", Value::Boolean(true));
						}
						directives.push(join);
					}
					for key in keys {
						let mut join = Directive::new("join__type").with_argument("graph", self.graph_value(occurrence.graph));
						if let Some(fields) = key.string_argument("fields") {
							join = join.with_argument("key", Value::string(fields));
						}
						if extension {
							join = join.with_argument("extension", Value::Boolean(true));
						}
						if key.argument("resolvable").and_then(Value::as_bool) == Some(false) {
							join = join.with_argument("resolvable", Value::Boolean(false));
						}
						directives.push(join);
					}
				}
				for occurrence in occurrences {
					for interface in occurrence.ty.implements() {
						directives.push(
							Directive::new("join__implements")
								.with_argument("graph", self.graph_value(occurrence.graph))
								.with_argument("interface", Value::string(interface.clone())),
						);
					}
				}
			},
			FederationVersion::V1 => {
				if let Some(owner) = self.v1_owner(name, occurrences) {
					directives.push(Directive::new("join__owner").with_argument("graph", self.graph_value(owner)));
					for occurrence in occurrences {
						for key in directives_named(&occurrence.ty.directives, "key") {
							if let Some(fields) = key.string_argument("fields") {
								directives.push(
									Directive::new("join__type")
										.with_argument("graph", self.graph_value(occurrence.graph))
										.with_argument("key", Value::string(fields)),
								);
							}
						}
					}
				}
			},
		}
		directives
	}

	/// The single owning subgraph of a v1 entity, reporting ownership errors.
	fn v1_owner(&mut self, name: &str, occurrences: &[Occurrence<'a>]) -> Option<usize> {
		if ROOT_TYPES.contains(&name) || !occurrences.iter().any(|o| o.ty.has_directive("key")) {
			return None;
		}
		let owners: Vec<usize> = occurrences
			.iter()
			.filter(|o| !self.subgraphs[o.graph].extensions.contains(name))
			.map(|o| o.graph)
			.collect();
		match owners.as_slice() {
			[owner] => Some(*owner),
			[] => {
				self.error(format!(
					"Type \"{}\" is an extension type, but there is no type definition for \"{}\" in any subgraph.",
					name, name
				));
				None
			},
			[owner, ..] => {
				let names = self.subgraph_names(owners.iter().copied());
				self.error(format!(
					"Entity \"{}\" is defined in multiple subgraphs ({}); an entity can only be owned by one subgraph.",
					name, names
				));
				Some(*owner)
			},
		}
	}

	fn merge_fields_type(&mut self, name: &str, occurrences: &[Occurrence<'a>], resolvable: bool) -> FieldsType {
		let mut implements: Vec<String> = Vec::new();
		for occurrence in occurrences {
			for interface in occurrence.ty.implements() {
				if !implements.contains(interface) {
					implements.push(interface.clone());
				}
			}
		}

		let mut by_field: IndexMap<&'a str, Vec<FieldOccurrence<'a>>> = IndexMap::new();
		for occurrence in occurrences {
			for field in occurrence.ty.fields().unwrap_or_default() {
				by_field
					.entry(field.name.as_str())
					.or_default()
					.push(FieldOccurrence {
						graph: occurrence.graph,
						owner: occurrence.ty,
						field,
					});
			}
		}

		if self.version == FederationVersion::V1 {
			self.check_v1_type(name, occurrences, &by_field);
		}

		let type_graphs = occurrences.len();
		let fields = by_field
			.into_iter()
			.filter_map(|(field, group)| self.merge_field(name, field, &group, type_graphs, resolvable))
			.collect();
		FieldsType { implements, fields }
	}

	fn check_v1_type(
		&mut self,
		name: &str,
		occurrences: &[Occurrence<'a>],
		by_field: &IndexMap<&'a str, Vec<FieldOccurrence<'a>>>,
	) {
		let is_root = ROOT_TYPES.contains(&name);
		let is_entity = occurrences.iter().any(|o| o.ty.has_directive("key"));
		if is_root || is_entity {
			for (field, group) in by_field {
				let defining: Vec<usize> = group.iter().filter(|f| !f.is_external()).map(|f| f.graph).collect();
				if defining.len() > 1 {
					let names = self.subgraph_names(defining);
					self.error(format!(
						"Field \"{}.{}\" can only be defined once; it is defined in subgraphs {}.",
						name, field, names
					));
				}
			}
			return;
		}
		if occurrences.iter().all(|o| self.subgraphs[o.graph].extensions.contains(name)) {
			self.error(format!(
				"Type \"{}\" is an extension type, but there is no type definition for \"{}\" in any subgraph.",
				name, name
			));
			return;
		}
		// Value types must be identical everywhere they appear.
		let shape = |ty: &TypeDefinition| -> BTreeSet<(String, String)> {
			ty.fields()
				.unwrap_or_default()
				.iter()
				.map(|f| (f.name.clone(), f.ty.to_string()))
				.collect()
		};
		let first = &occurrences[0];
		let expected = shape(first.ty);
		if let Some(other) = occurrences[1..].iter().find(|o| shape(o.ty) != expected) {
			self.error(format!(
				"Type \"{}\" is a value type but is defined differently in subgraphs \"{}\" and \"{}\".",
				name, self.subgraphs[first.graph].name, self.subgraphs[other.graph].name
			));
		}
	}

	fn merge_field(
		&mut self,
		type_name: &str,
		name: &str,
		group: &[FieldOccurrence<'a>],
		type_graphs: usize,
		resolvable: bool,
	) -> Option<FieldDefinition> {
		if group.is_empty() {
			return None;
		}
		let coordinate = format!("{}.{}", type_name, name);

		// Graphs whose definition of this field was taken over with @override.
		let overridden: HashSet<usize> = match self.version {
			FederationVersion::V2 => group
				.iter()
				.filter_map(|f| {
					let from = directives_named(&f.field.directives, "override").find_map(|d| d.string_argument("from"))?;
					self.subgraphs.iter().position(|s| s.name == from)
				})
				.collect(),
			FederationVersion::V1 => HashSet::new(),
		};
		let live: Vec<&FieldOccurrence<'a>> = group.iter().filter(|f| !overridden.contains(&f.graph)).collect();

		if self.version == FederationVersion::V2 && resolvable {
			let resolving: Vec<&&FieldOccurrence<'a>> = live.iter().filter(|f| !f.is_external()).collect();
			if resolving.len() > 1 {
				let non_shareable: Vec<usize> = resolving
					.iter()
					.filter(|f| !self.subgraphs[f.graph].is_shareable(f.owner, f.field))
					.map(|f| f.graph)
					.collect();
				if !non_shareable.is_empty() {
					let all = self.subgraph_names(resolving.iter().map(|f| f.graph));
					let culprits = self.subgraph_names(non_shareable);
					self.error(format!(
						"Non-shareable field \"{}\" is resolved from multiple subgraphs: it is resolved from subgraphs {} and defined as non-shareable in subgraph(s) {}",
						coordinate, all, culprits
					));
				}
			}
		}

		let ty = self.merge_field_type(&coordinate, group.iter().map(|f| (f.graph, &f.field.ty)), false)?;
		let arguments = self.merge_arguments(&coordinate, group);

		let mut merged = FieldDefinition::new(name, ty);
		merged.description = group.iter().find_map(|f| f.field.description.clone());
		merged.arguments = arguments;
		merged.directives = carried_directives(group.iter().map(|f| f.field.directives.as_slice()));
		merged.directives.extend(self.field_join_directives(type_name, &live, type_graphs, !overridden.is_empty()));
		Some(merged)
	}

	fn field_join_directives(
		&self,
		type_name: &str,
		live: &[&FieldOccurrence<'a>],
		type_graphs: usize,
		has_override: bool,
	) -> Vec<Directive> {
		let join = |f: &FieldOccurrence<'a>| {
			let mut join = Directive::new("join__field").with_argument("graph", self.graph_value(f.graph));
			for argument in ["requires", "provides"] {
				if let Some(fields) = directives_named(&f.field.directives, argument).find_map(|d| d.string_argument("fields")) {
					join = join.with_argument(argument, Value::string(fields));
				}
			}
			join
		};
		match self.version {
			FederationVersion::V2 => {
				let special = live.iter().any(|f| {
					f.is_external()
						|| f.field.has_directive("requires")
						|| f.field.has_directive("provides")
						|| f.field.has_directive("override")
				});
				if live.len() == type_graphs && !special && !has_override {
					return Vec::new();
				}
				live
					.iter()
					.map(|f| {
						let mut directive = join(f);
						if f.is_external() {
							directive = directive.with_argument("external", Value::Boolean(true));
						}
						if let Some(from) =
							directives_named(&f.field.directives, "override").find_map(|d| d.string_argument("from"))
						{
							directive = directive.with_argument("override", Value::string(from));
						}
						directive
					})
					.collect()
			},
			FederationVersion::V1 => {
				let is_root = ROOT_TYPES.contains(&type_name);
				let is_entity = live.iter().any(|f| f.owner.has_directive("key"));
				live
					.iter()
					.filter(|f| !f.is_external())
					.filter(|f| {
						is_root
							|| (is_entity && self.subgraphs[f.graph].extensions.contains(type_name))
							|| f.field.has_directive("requires")
							|| f.field.has_directive("provides")
					})
					.map(|f| join(f))
					.collect()
			},
		}
	}

	/// Merge the types a field or input field has across graphs.
	///
	/// Output positions take the least strict nullability (v2) and input
	/// positions the strictest; v1 requires identical types.
	fn merge_field_type<'t>(
		&mut self,
		coordinate: &str,
		mut types: impl Iterator<Item = (usize, &'t TypeRef)>,
		input: bool,
	) -> Option<TypeRef> {
		let (first_graph, first) = types.next()?;
		let mut merged = first.clone();
		for (graph, ty) in types {
			let combined = match self.version {
				FederationVersion::V1 => (ty == first).then(|| first.clone()),
				FederationVersion::V2 => merge_type_refs(&merged, ty, input),
			};
			match combined {
				Some(combined) => merged = combined,
				None => {
					self.error(format!(
						"Type of field \"{}\" is incompatible across subgraphs: it has type \"{}\" in subgraph \"{}\" but type \"{}\" in subgraph \"{}\"",
						coordinate, first, self.subgraphs[first_graph].name, ty, self.subgraphs[graph].name
					));
					return None;
				},
			}
		}
		Some(merged)
	}

	fn merge_arguments(&mut self, coordinate: &str, group: &[FieldOccurrence<'a>]) -> Vec<InputValueDefinition> {
		let mut by_name: IndexMap<&'a str, Vec<(usize, &'a InputValueDefinition)>> = IndexMap::new();
		for occurrence in group {
			for argument in &occurrence.field.arguments {
				by_name
					.entry(argument.name.as_str())
					.or_default()
					.push((occurrence.graph, argument));
			}
		}

		let mut merged = Vec::new();
		for (name, defs) in by_name {
			let argument_coordinate = format!("{}({}:)", coordinate, name);
			if self.version == FederationVersion::V2 && defs.len() < group.len() {
				if let Some((graph, _)) = defs.iter().find(|(_, a)| a.is_required()) {
					let missing = group
						.iter()
						.find(|f| !defs.iter().any(|(g, _)| *g == f.graph))
						.map(|f| f.graph)
						.unwrap_or(*graph);
					self.error(format!(
						"Argument \"{}\" is required in some subgraphs but does not appear in all subgraphs: it is required in subgraph \"{}\" but does not appear in subgraph \"{}\"",
						argument_coordinate, self.subgraphs[*graph].name, self.subgraphs[missing].name
					));
				}
				continue;
			}
			let Some(ty) = self.merge_field_type(&argument_coordinate, defs.iter().map(|(g, a)| (*g, &a.ty)), true)
			else {
				continue;
			};
			let (_, first) = defs[0];
			merged.push(InputValueDefinition {
				description: defs.iter().find_map(|(_, a)| a.description.clone()),
				name: name.to_string(),
				ty,
				default_value: first.default_value.clone(),
				directives: carried_directives(defs.iter().map(|(_, a)| a.directives.as_slice())),
			});
		}
		merged
	}

	fn merge_union(&mut self, occurrences: &[Occurrence<'a>]) -> Vec<String> {
		let mut members: Vec<String> = Vec::new();
		for occurrence in occurrences {
			if let TypeKind::Union(own) = &occurrence.ty.kind {
				for member in own {
					if !members.contains(member) {
						members.push(member.clone());
					}
				}
			}
		}
		members
	}

	fn merge_enum(&mut self, occurrences: &[Occurrence<'a>]) -> Vec<EnumValueDefinition> {
		let mut by_value: IndexMap<&'a str, Vec<(usize, &'a EnumValueDefinition)>> = IndexMap::new();
		for occurrence in occurrences {
			if let TypeKind::Enum(values) = &occurrence.ty.kind {
				for value in values {
					by_value
						.entry(value.name.as_str())
						.or_default()
						.push((occurrence.graph, value));
				}
			}
		}
		by_value
			.into_iter()
			.map(|(name, defs)| {
				let mut directives = carried_directives(defs.iter().map(|(_, v)| v.directives.as_slice()));
				if self.version == FederationVersion::V2 {
					directives.extend(
						defs.iter()
							.map(|(g, _)| Directive::new("join__enumValue").with_argument("graph", self.graph_value(*g))),
					);
				}
				EnumValueDefinition {
					description: defs.iter().find_map(|(_, v)| v.description.clone()),
					name: name.to_string(),
					directives,
				}
			})
			.collect()
	}

	fn merge_input(&mut self, type_name: &str, occurrences: &[Occurrence<'a>]) -> Vec<InputValueDefinition> {
		let mut by_field: IndexMap<&'a str, Vec<(usize, &'a InputValueDefinition)>> = IndexMap::new();
		for occurrence in occurrences {
			if let TypeKind::InputObject(fields) = &occurrence.ty.kind {
				for field in fields {
					by_field
						.entry(field.name.as_str())
						.or_default()
						.push((occurrence.graph, field));
				}
			}
		}

		let mut merged = Vec::new();
		for (name, defs) in by_field {
			let coordinate = format!("{}.{}", type_name, name);
			if defs.len() < occurrences.len() {
				if let Some((graph, _)) = defs.iter().find(|(_, f)| f.is_required()) {
					let missing = occurrences
						.iter()
						.find(|o| !defs.iter().any(|(g, _)| *g == o.graph))
						.map(|o| o.graph)
						.unwrap_or(*graph);
					self.error(format!(
						"Input object field \"{}\" is required in some subgraphs but does not appear in all subgraphs: it is required in subgraph \"{}\" but does not appear in subgraph \"{}\"",
						coordinate, self.subgraphs[*graph].name, self.subgraphs[missing].name
					));
				}
				continue;
			}
			let Some(ty) = self.merge_field_type(&coordinate, defs.iter().map(|(g, f)| (*g, &f.ty)), true) else {
				continue;
			};
			merged.push(InputValueDefinition {
				description: defs.iter().find_map(|(_, f)| f.description.clone()),
				name: name.to_string(),
				ty,
				default_value: defs[0].1.default_value.clone(),
				directives: carried_directives(defs.iter().map(|(_, f)| f.directives.as_slice())),
			});
		}
		merged
	}

	fn check_query_root(&mut self, types: &[TypeDefinition]) {
		let has_queries = types
			.iter()
			.find(|t| t.name == "Query")
			.and_then(TypeDefinition::fields)
			.is_some_and(|f| !f.is_empty());
		if !has_queries {
			self.error("No queries found in any subgraph: a supergraph must have a query root type.".to_string());
		}
	}
}

/// Least strict (`input == false`) or strictest (`input == true`) common
/// type of `a` and `b`, if they only differ in nullability.
fn merge_type_refs(a: &TypeRef, b: &TypeRef, input: bool) -> Option<TypeRef> {
	match (a, b) {
		(TypeRef::NonNull(x), TypeRef::NonNull(y)) => Some(TypeRef::non_null(merge_type_refs(x, y, input)?)),
		(TypeRef::NonNull(x), y) | (y, TypeRef::NonNull(x)) => {
			let inner = merge_type_refs(x, y, input)?;
			Some(if input { TypeRef::non_null(inner) } else { inner })
		},
		(TypeRef::List(x), TypeRef::List(y)) => Some(TypeRef::list(merge_type_refs(x, y, input)?)),
		(TypeRef::Named(x), TypeRef::Named(y)) if x == y => Some(a.clone()),
		_ => None,
	}
}

/// Union of the carried directives across several definitions of one element.
fn carried_directives<'d>(lists: impl Iterator<Item = &'d [Directive]>) -> Vec<Directive> {
	let mut carried: Vec<Directive> = Vec::new();
	for directive in lists.flatten() {
		if !CARRIED_DIRECTIVES.contains(&directive.name.as_str()) {
			continue;
		}
		let duplicate = carried.iter().any(|d| {
			d.name == directive.name && (directive.name != "tag" || d.arguments == directive.arguments)
		});
		if !duplicate {
			carried.push(directive.clone());
		}
	}
	carried
}

/// Consistency of `@inaccessible` with what the API schema must contain.
pub fn check_inaccessible(types: &[TypeDefinition]) -> Vec<CompositionError> {
	let hidden: HashSet<&str> = types
		.iter()
		.filter(|t| t.has_directive("inaccessible"))
		.map(|t| t.name.as_str())
		.collect();
	let mut errors = Vec::new();
	if hidden.contains("Query") {
		errors.push(CompositionError::composition(
			"Type \"Query\" is @inaccessible but is the root query type, which must be in the API schema.",
		));
	}
	let referenced = |base: &str, by: String, errors: &mut Vec<CompositionError>| {
		if hidden.contains(base) {
			errors.push(CompositionError::composition(format!(
				"Type \"{}\" is @inaccessible but is referenced by \"{}\", which is in the API schema.",
				base, by
			)));
		}
	};
	let only_hidden = |ty: &TypeDefinition, what: &str, errors: &mut Vec<CompositionError>| {
		errors.push(CompositionError::composition(format!(
			"Type \"{}\" is in the API schema but all of its {} are @inaccessible.",
			ty.name, what
		)));
	};

	for ty in types.iter().filter(|t| !hidden.contains(t.name.as_str())) {
		match &ty.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => {
				let visible: Vec<&FieldDefinition> = t.fields.iter().filter(|f| !f.has_directive("inaccessible")).collect();
				if !t.fields.is_empty() && visible.is_empty() {
					only_hidden(ty, "fields", &mut errors);
				}
				for field in visible {
					referenced(field.ty.base_name(), format!("{}.{}", ty.name, field.name), &mut errors);
					for argument in field
						.arguments
						.iter()
						.filter(|a| !has_directive(&a.directives, "inaccessible"))
					{
						referenced(
							argument.ty.base_name(),
							format!("{}.{}({}:)", ty.name, field.name, argument.name),
							&mut errors,
						);
					}
				}
			},
			TypeKind::Enum(values) => {
				if !values.is_empty() && values.iter().all(|v| has_directive(&v.directives, "inaccessible")) {
					only_hidden(ty, "values", &mut errors);
				}
			},
			TypeKind::InputObject(fields) => {
				let visible: Vec<&InputValueDefinition> = fields
					.iter()
					.filter(|f| !has_directive(&f.directives, "inaccessible"))
					.collect();
				if !fields.is_empty() && visible.is_empty() {
					only_hidden(ty, "input fields", &mut errors);
				}
				for field in visible {
					referenced(field.ty.base_name(), format!("{}.{}", ty.name, field.name), &mut errors);
				}
			},
			TypeKind::Union(members) => {
				if !members.is_empty() && members.iter().all(|m| hidden.contains(m.as_str())) {
					only_hidden(ty, "members", &mut errors);
				}
			},
			TypeKind::Scalar => {},
		}
	}
	errors
}

/// Subgraph name to `join__Graph` value: upper-cased, non-alphanumerics
/// replaced with `_`, suffixed with a counter on collision.
pub fn graph_enum_names(subgraphs: &[Subgraph]) -> Vec<String> {
	let mut seen: HashMap<String, usize> = HashMap::new();
	subgraphs
		.iter()
		.map(|subgraph| {
			let mut base: String = subgraph
				.name
				.chars()
				.map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
				.collect();
			if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
				base.insert(0, '_');
			}
			let count = seen.entry(base.clone()).or_insert(0);
			*count += 1;
			if *count == 1 { base } else { format!("{}_{}", base, count) }
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::super::subgraph::normalize;
	use super::*;
	use crate::types::SubgraphInput;

	const FED2: &str = r#"extend schema @link(url: "https://specs.apollo.dev/federation/v2.3", import: ["@key", "@shareable", "@external", "@override", "@tag", "@inaccessible"])"#;

	fn subgraphs(sdls: &[(&str, &str)]) -> Vec<Subgraph> {
		sdls
			.iter()
			.map(|(name, sdl)| normalize(&SubgraphInput::new(*name, *sdl)).unwrap())
			.collect()
	}

	fn compose(sdls: &[(&str, &str)], version: FederationVersion) -> Result<Vec<TypeDefinition>, Vec<CompositionError>> {
		let subgraphs = subgraphs(sdls);
		let graphs = graph_enum_names(&subgraphs);
		merge(&subgraphs, &graphs, version)
	}

	fn messages(errors: Vec<CompositionError>) -> Vec<String> {
		errors.into_iter().map(|e| e.message).collect()
	}

	#[test]
	fn test_graph_enum_names() {
		let subgraphs = subgraphs(&[
			("my-products", "type Query { a: String }"),
			("my_products", "type Query { b: String }"),
			("1st", "type Query { c: String }"),
		]);
		assert_eq!(
			graph_enum_names(&subgraphs),
			vec!["MY_PRODUCTS", "MY_PRODUCTS_2", "_1ST"]
		);
	}

	#[test]
	fn test_v2_entity_across_subgraphs() {
		let types = compose(
			&[
				(
					"products",
					&format!("{}\ntype Query {{ product: Product }}\ntype Product @key(fields: \"id\") {{ id: ID! name: String }}", FED2),
				),
				(
					"reviews",
					&format!("{}\ntype Product @key(fields: \"id\") {{ id: ID! reviews: [String!] }}", FED2),
				),
			],
			FederationVersion::V2,
		)
		.unwrap();
		let product = types.iter().find(|t| t.name == "Product").unwrap();
		let names: Vec<&str> = product.fields().unwrap().iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, vec!["id", "name", "reviews"]);
		let joins = directives_named(&product.directives, "join__type").count();
		assert_eq!(joins, 2);
		// `id` is resolved by both graphs, so it needs no per-field join.
		assert!(!product.field("id").unwrap().has_directive("join__field"));
		assert!(product.field("name").unwrap().has_directive("join__field"));
	}

	#[test]
	fn test_v2_rejects_unshared_field() {
		let errors = compose(
			&[
				("a", &format!("{}\ntype Query {{ me: String }}", FED2)),
				("b", &format!("{}\ntype Query {{ me: String }}", FED2)),
			],
			FederationVersion::V2,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec![
				"Non-shareable field \"Query.me\" is resolved from multiple subgraphs: it is resolved from subgraphs \"a\", \"b\" and defined as non-shareable in subgraph(s) \"a\", \"b\""
			]
		);
	}

	#[test]
	fn test_v2_shareable_takes_least_strict_type() {
		let types = compose(
			&[
				("a", &format!("{}\ntype Query {{ me: String! @shareable }}", FED2)),
				("b", &format!("{}\ntype Query {{ me: String @shareable }}", FED2)),
			],
			FederationVersion::V2,
		)
		.unwrap();
		let query = types.iter().find(|t| t.name == "Query").unwrap();
		assert_eq!(query.field("me").unwrap().ty.to_string(), "String");
	}

	#[test]
	fn test_v2_override_lifts_sharing_conflict() {
		let types = compose(
			&[
				("a", &format!("{}\ntype Query {{ me: String }}", FED2)),
				("b", &format!("{}\ntype Query {{ me: String @override(from: \"a\") }}", FED2)),
			],
			FederationVersion::V2,
		)
		.unwrap();
		let me = types[0].field("me").unwrap();
		let joins: Vec<&Directive> = directives_named(&me.directives, "join__field").collect();
		assert_eq!(joins.len(), 1);
		assert_eq!(joins[0].string_argument("override"), Some("a"));
	}

	#[test]
	fn test_kind_mismatch() {
		let errors = compose(
			&[
				("a", "type Query { a: Thing } type Thing { id: ID }"),
				("b", "type Query { b: Thing } interface Thing { id: ID }"),
			],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec![
				"Type \"Thing\" has mismatched kind: it is defined as Object Type in subgraph \"a\" but Interface Type in subgraph \"b\""
			]
		);
	}

	#[test]
	fn test_required_argument_must_appear_everywhere() {
		let errors = compose(
			&[
				("a", &format!("{}\ntype Query {{ users(first: Int!): [String] @shareable }}", FED2)),
				("b", &format!("{}\ntype Query {{ users: [String] @shareable }}", FED2)),
			],
			FederationVersion::V2,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec![
				"Argument \"Query.users(first:)\" is required in some subgraphs but does not appear in all subgraphs: it is required in subgraph \"a\" but does not appear in subgraph \"b\""
			]
		);
	}

	#[test]
	fn test_v1_rejects_fed2_subgraph() {
		let errors = compose(
			&[("a", &format!("{}\ntype Query {{ me: String }}", FED2))],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert_eq!(errors.len(), 1);
		assert!(errors[0].message.contains("Enable native Federation v2 composition"));
	}

	#[test]
	fn test_v1_duplicate_root_field() {
		let errors = compose(
			&[
				("a", "type Query { me: String }"),
				("b", "extend type Query { me: String }"),
			],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec!["Field \"Query.me\" can only be defined once; it is defined in subgraphs \"a\", \"b\"."]
		);
	}

	#[test]
	fn test_v1_entity_owner() {
		let types = compose(
			&[
				("users", "type Query { me: User } type User @key(fields: \"id\") { id: ID! name: String }"),
				(
					"reviews",
					"extend type User @key(fields: \"id\") { id: ID! @external reviews: [String] }",
				),
			],
			FederationVersion::V1,
		)
		.unwrap();
		let user = types.iter().find(|t| t.name == "User").unwrap();
		let owner = directives_named(&user.directives, "join__owner").next().unwrap();
		assert_eq!(owner.argument("graph"), Some(&Value::Enum("USERS".into())));
		let reviews = user.field("reviews").unwrap();
		let join = directives_named(&reviews.directives, "join__field").next().unwrap();
		assert_eq!(join.argument("graph"), Some(&Value::Enum("REVIEWS".into())));
	}

	#[test]
	fn test_v1_value_types_must_match() {
		let errors = compose(
			&[
				("a", "type Query { a: Money } type Money { amount: Int }"),
				("b", "type Query { b: Money } type Money { amount: Float }"),
			],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert_matches!(errors.as_slice(), [e] if e.message.contains("value type"));
	}

	#[test]
	fn test_input_required_field_intersection() {
		let errors = compose(
			&[
				("a", &format!("{}\ntype Query {{ a(f: Filter): String }} input Filter {{ q: String limit: Int! }}", FED2)),
				("b", &format!("{}\ntype Query {{ b(f: Filter): String }} input Filter {{ q: String }}", FED2)),
			],
			FederationVersion::V2,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec![
				"Input object field \"Filter.limit\" is required in some subgraphs but does not appear in all subgraphs: it is required in subgraph \"a\" but does not appear in subgraph \"b\""
			]
		);
	}

	#[test]
	fn test_no_queries() {
		let errors = compose(&[("a", "type Mutation { a: String }")], FederationVersion::V1).unwrap_err();
		assert_eq!(
			messages(errors),
			vec!["No queries found in any subgraph: a supergraph must have a query root type."]
		);
	}

	#[test]
	fn test_invalid_key_field() {
		let errors = compose(
			&[("a", "type Query { a: User } type User @key(fields: \"uuid\") { id: ID! }")],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert!(errors[0].message.starts_with("[a] On type \"User\", for @key(fields: \"uuid\")"));
	}

	#[test]
	fn test_inaccessible_consistency() {
		let errors = compose(
			&[(
				"a",
				"type Query { a: Secret b: Hidden } type Secret @inaccessible { id: ID } type Hidden { x: Int @inaccessible }",
			)],
			FederationVersion::V1,
		)
		.unwrap_err();
		assert_eq!(
			messages(errors),
			vec![
				"Type \"Secret\" is @inaccessible but is referenced by \"Query.a\", which is in the API schema.",
				"Type \"Hidden\" is in the API schema but all of its fields are @inaccessible.",
			]
		);
	}
}
