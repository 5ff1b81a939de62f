// Folding of `extend` definitions into their base definitions

use std::collections::HashMap;

use super::*;

/// Merge every type and schema extension into its base definition.
///
/// Extensions without a base definition are promoted: the first one becomes
/// the definition and later ones fold into it. The names of those promoted
/// types are returned in document order. Extensions whose kind does not
/// match the base are left in place for the validator to report.
pub fn merge_extensions(doc: &mut Document) -> Vec<String> {
	let mut base_index: HashMap<String, usize> = HashMap::new();
	let mut extension_only = Vec::new();

	for (i, definition) in doc.definitions.iter().enumerate() {
		if let Definition::Type(ty) = definition
			&& !ty.extend
		{
			base_index.entry(ty.name.clone()).or_insert(i);
		}
	}
	for (i, definition) in doc.definitions.iter().enumerate() {
		if let Definition::Type(ty) = definition
			&& ty.extend
			&& !base_index.contains_key(&ty.name)
		{
			base_index.insert(ty.name.clone(), i);
			extension_only.push(ty.name.clone());
		}
	}

	let mut slots: Vec<Option<Definition>> = std::mem::take(&mut doc.definitions)
		.into_iter()
		.map(Some)
		.collect();

	for i in 0..slots.len() {
		let (target, is_extension) = match &slots[i] {
			Some(Definition::Type(ty)) => (base_index[&ty.name], ty.extend),
			_ => continue,
		};
		if target == i {
			if let Some(Definition::Type(ty)) = &mut slots[i] {
				ty.extend = false;
			}
			continue;
		}
		if !is_extension {
			// duplicate definition, reported by the validator
			continue;
		}
		let compatible = match (&slots[target], &slots[i]) {
			(Some(Definition::Type(base)), Some(Definition::Type(ext))) => base.kind.same_kind(&ext.kind),
			_ => false,
		};
		if !compatible {
			continue;
		}
		if let Some(Definition::Type(ext)) = slots[i].take()
			&& let Some(Definition::Type(base)) = &mut slots[target]
		{
			absorb(base, ext);
		}
	}

	doc.definitions = slots.into_iter().flatten().collect();
	merge_schema_extensions(doc);
	extension_only
}

fn absorb(base: &mut TypeDefinition, ext: TypeDefinition) {
	if base.description.is_none() {
		base.description = ext.description;
	}
	base.directives.extend(ext.directives);
	match (&mut base.kind, ext.kind) {
		(TypeKind::Object(base), TypeKind::Object(ext)) | (TypeKind::Interface(base), TypeKind::Interface(ext)) => {
			for name in ext.implements {
				if !base.implements.contains(&name) {
					base.implements.push(name);
				}
			}
			base.fields.extend(ext.fields);
		},
		(TypeKind::Union(members), TypeKind::Union(more)) => {
			for member in more {
				if !members.contains(&member) {
					members.push(member);
				}
			}
		},
		(TypeKind::Enum(values), TypeKind::Enum(more)) => values.extend(more),
		(TypeKind::InputObject(fields), TypeKind::InputObject(more)) => fields.extend(more),
		_ => {},
	}
}

fn merge_schema_extensions(doc: &mut Document) {
	let positions: Vec<usize> = doc
		.definitions
		.iter()
		.enumerate()
		.filter(|(_, d)| matches!(d, Definition::Schema(_)))
		.map(|(i, _)| i)
		.collect();
	let Some(&first) = positions.first() else {
		return;
	};
	let target = positions
		.iter()
		.copied()
		.find(|&i| matches!(&doc.definitions[i], Definition::Schema(s) if !s.extend))
		.unwrap_or(first);

	let mut merged = SchemaDefinition::default();
	for &i in &positions {
		if let Definition::Schema(schema) = &doc.definitions[i] {
			merged.directives.extend(schema.directives.iter().cloned());
			for (kind, name) in &schema.operations {
				if !merged.operations.iter().any(|(k, _)| k == kind) {
					merged.operations.push((*kind, name.clone()));
				}
			}
		}
	}

	let mut index = 0;
	doc.definitions.retain(|_| {
		let keep = index == target || !positions.contains(&index);
		index += 1;
		keep
	});

	if merged.operations.is_empty() {
		for kind in OperationKind::ALL {
			let name = kind.default_type_name();
			if doc.types().any(|t| t.name == name) {
				merged.operations.push((kind, name.to_string()));
			}
		}
	}

	let target = target - positions.iter().filter(|&&p| p < target).count();
	if merged.operations.is_empty() && merged.directives.is_empty() {
		doc.definitions.remove(target);
	} else {
		doc.definitions[target] = Definition::Schema(merged);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_extension_folds_into_base() {
		let mut doc = parse_document(
			"type User { id: ID! } extend type User { name: String } type Query { user: User }",
		)
		.unwrap();
		let promoted = merge_extensions(&mut doc);
		assert!(promoted.is_empty());
		assert_eq!(doc.types().count(), 2);
		let user = doc.type_named("User").unwrap();
		let names: Vec<&str> = user.fields().unwrap().iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, vec!["id", "name"]);
	}

	#[test]
	fn test_extension_before_base_lands_on_base() {
		let mut doc = parse_document("extend type User @key(fields: \"id\") type User { id: ID! }").unwrap();
		merge_extensions(&mut doc);
		let user = doc.type_named("User").unwrap();
		assert!(!user.extend);
		assert!(user.has_directive("key"));
		assert_eq!(doc.types().count(), 1);
	}

	#[test]
	fn test_extension_only_type_is_promoted() {
		let mut doc =
			parse_document("extend type Product { id: ID! } extend type Product { sku: String }").unwrap();
		let promoted = merge_extensions(&mut doc);
		assert_eq!(promoted, vec!["Product".to_string()]);
		let product = doc.type_named("Product").unwrap();
		assert!(!product.extend);
		assert_eq!(product.fields().unwrap().len(), 2);
	}

	#[test]
	fn test_schema_extension_merges_and_fills_roots() {
		let mut doc = parse_document(
			"extend schema @link(url: \"https://specs.apollo.dev/federation/v2.3\") type Query { a: Int }",
		)
		.unwrap();
		merge_extensions(&mut doc);
		let schema = doc.schema_definitions().next().unwrap();
		assert!(!schema.extend);
		assert_eq!(schema.operations, vec![(OperationKind::Query, "Query".to_string())]);
		assert_eq!(schema.directives.len(), 1);
	}
}
