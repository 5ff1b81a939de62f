// Reachability of types from the root operations of a public schema

use std::collections::{HashMap, HashSet};

use crate::composition::federation::subgraph::MACHINERY_TYPES;
use crate::graphql::*;

const MACHINERY_PREFIXES: [&str; 4] = ["join__", "link__", "core__", "federation__"];

fn is_machinery(name: &str) -> bool {
	MACHINERY_TYPES.contains(&name) || MACHINERY_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Types of `public` that no root operation type can reach.
///
/// Implementations of a reachable interface count as reachable.
pub fn unreachable_types(public: &Document) -> HashSet<String> {
	let types: HashMap<&str, &TypeDefinition> = public.types().map(|t| (t.name.as_str(), t)).collect();
	let mut implementations: HashMap<&str, Vec<&str>> = HashMap::new();
	for ty in public.types() {
		for interface in ty.implements() {
			implementations
				.entry(interface.as_str())
				.or_default()
				.push(ty.name.as_str());
		}
	}

	let mut reachable: HashSet<&str> = HashSet::new();
	let mut stack: Vec<&str> = OperationKind::ALL
		.into_iter()
		.filter_map(|kind| public.root_type_name(kind))
		.filter_map(|name| types.get_key_value(name.as_str()).map(|(k, _)| *k))
		.collect();
	while let Some(name) = stack.pop() {
		if !reachable.insert(name) {
			continue;
		}
		let Some(ty) = types.get(name) else {
			continue;
		};
		let mut next: Vec<&str> = Vec::new();
		match &ty.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => {
				next.extend(t.implements.iter().map(String::as_str));
				for field in &t.fields {
					next.push(field.ty.base_name());
					next.extend(field.arguments.iter().map(|a| a.ty.base_name()));
				}
				if let Some(implementors) = implementations.get(name) {
					next.extend(implementors.iter().copied());
				}
			},
			TypeKind::Union(members) => next.extend(members.iter().map(String::as_str)),
			TypeKind::InputObject(fields) => next.extend(fields.iter().map(|f| f.ty.base_name())),
			TypeKind::Scalar | TypeKind::Enum(_) => {},
		}
		stack.extend(next.into_iter().filter(|n| types.contains_key(n) && !reachable.contains(n)));
	}

	types
		.keys()
		.filter(|name| !reachable.contains(*name) && !is_machinery(name))
		.map(|name| name.to_string())
		.collect()
}
