// Single schema normalization and validation

use crate::error::CompositionError;
use crate::graphql::*;
use crate::types::{ComposedSchema, CompositionOutcome, SubgraphInput};

pub fn compose_single(input: &SubgraphInput) -> CompositionOutcome {
	let mut document = match parse_document(&input.raw_sdl) {
		Ok(document) => document,
		Err(err) => return CompositionOutcome::failure(vec![CompositionError::graphql(err.message)]),
	};
	merge_extensions(&mut document);

	let errors = validate_document(&document, &ValidationOptions::default());
	if !errors.is_empty() {
		return CompositionOutcome::failure(errors);
	}

	document.drop_default_schema();
	let sdl = print_document_with(
		&document,
		PrintOptions {
			trim_descriptions: true,
		},
	);
	CompositionOutcome::Success(ComposedSchema::new(sdl))
}
