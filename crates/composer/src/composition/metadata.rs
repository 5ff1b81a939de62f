//! `@meta` annotations: propagation onto fields, extraction and merging.
//!
//! Subgraphs opt in by linking the Hive spec, e.g.
//! `extend schema @link(url: "https://specs.graphql-hive.com/hive/v1.0", import: ["@meta"])`.
//! Type and schema level annotations do not survive composition, so they
//! are copied onto every field before composing. The copy only adds: a
//! field keeps its own annotations first, then gains its type's, then the
//! schema's, even where names repeat.

use crate::composition::federation::subgraph::import_list;
use crate::graphql::*;
use crate::types::{MetadataAttributes, MetadataRecord, SchemaMetadata, SubgraphInput};

pub const HIVE_LINK_PREFIX: &str = "https://specs.graphql-hive.com/hive";

/// Local name of the `@meta` directive, if the document links the Hive spec.
pub fn meta_directive_name(doc: &Document) -> Option<String> {
	let link = doc
		.schema_directives()
		.filter(|d| d.name == "link")
		.find(|d| d.string_argument("url").is_some_and(|u| u.starts_with(HIVE_LINK_PREFIX)))?;
	let imported = import_list(link)
		.into_iter()
		.find(|(name, _)| name == "@meta")
		.map(|(name, alias)| alias.unwrap_or(name).trim_start_matches('@').to_string());
	Some(imported.unwrap_or_else(|| {
		let namespace = link.string_argument("as").unwrap_or("hive");
		format!("{}__meta", namespace)
	}))
}

/// Copy type and schema level `@meta` onto every field of the type.
///
/// Documents that don't link the spec, or don't parse, come back as-is.
pub fn propagate(input: &SubgraphInput) -> SubgraphInput {
	let Ok(mut doc) = parse_document(&input.raw_sdl) else {
		return input.clone();
	};
	let Some(meta) = meta_directive_name(&doc) else {
		return input.clone();
	};
	let schema_level: Vec<Directive> = doc.schema_directives().filter(|d| d.name == meta).cloned().collect();

	let mut changed = false;
	for ty in doc.types_mut() {
		let inherited: Vec<Directive> = ty
			.directives
			.iter()
			.filter(|d| d.name == meta)
			.chain(schema_level.iter())
			.cloned()
			.collect();
		if inherited.is_empty() {
			continue;
		}
		let Some(fields) = ty.fields_mut() else {
			continue;
		};
		for field in fields {
			field.directives.extend(inherited.iter().cloned());
			changed = true;
		}
	}

	if changed {
		input.with_sdl(print_document(&doc))
	} else {
		input.clone()
	}
}

/// `Type.field` records of one subgraph. Annotations missing a name or
/// content are skipped.
pub fn extract(input: &SubgraphInput) -> SchemaMetadata {
	let mut metadata = SchemaMetadata::new();
	let Ok(doc) = parse_document(&input.raw_sdl) else {
		return metadata;
	};
	let Some(meta) = meta_directive_name(&doc) else {
		return metadata;
	};
	for ty in doc.types() {
		for field in ty.fields().unwrap_or_default() {
			let records: Vec<MetadataRecord> = directives_named(&field.directives, &meta)
				.filter_map(|d| {
					Some(MetadataRecord {
						name: d.string_argument("name")?.to_string(),
						content: d.string_argument("content")?.to_string(),
						source: input.source_name.clone(),
					})
				})
				.collect();
			if !records.is_empty() {
				metadata
					.entry(format!("{}.{}", ty.name, field.name))
					.or_default()
					.extend(records);
			}
		}
	}
	metadata
}

/// Concatenate per-subgraph metadata, coordinate by coordinate.
pub fn merge(maps: impl IntoIterator<Item = SchemaMetadata>) -> SchemaMetadata {
	let mut merged = SchemaMetadata::new();
	for map in maps {
		for (coordinate, records) in map {
			merged.entry(coordinate).or_default().extend(records);
		}
	}
	merged
}

/// Attribute name to every distinct content seen for it.
pub fn attributes(metadata: &SchemaMetadata) -> MetadataAttributes {
	let mut attributes = MetadataAttributes::new();
	for record in metadata.values().flatten() {
		attributes
			.entry(record.name.clone())
			.or_default()
			.insert(record.content.clone());
	}
	attributes
}

/// Extract and merge metadata across subgraphs.
pub fn collect(inputs: &[SubgraphInput]) -> (SchemaMetadata, MetadataAttributes) {
	let metadata = merge(inputs.iter().map(extract));
	let attributes = attributes(&metadata);
	(metadata, attributes)
}
