//! Contracts: tag-filtered views of a federated graph.
//!
//! Every subgraph is filtered on its own, but a type is only hidden once
//! it is fully hidden in every subgraph that defines it. A type one
//! subgraph still exposes stays visible everywhere.

use std::collections::{HashMap, HashSet};

use crate::error::CompositionError;
use crate::graphql::{parse_document, print_document};
use crate::types::SubgraphInput;

pub mod prune;
pub mod tag_filter;

pub use prune::unreachable_types;
pub use tag_filter::{FilteredSubgraph, TagFilter};

/// The filtered subgraphs of one contract, ready to be recomposed.
#[derive(Debug, Clone)]
pub struct ContractSubgraphs {
	subgraphs: Vec<(SubgraphInput, FilteredSubgraph)>,
}

impl ContractSubgraphs {
	pub fn filter(inputs: &[SubgraphInput], filter: &TagFilter) -> Result<Self, Vec<CompositionError>> {
		let mut subgraphs = Vec::with_capacity(inputs.len());
		let mut errors = Vec::new();
		for input in inputs {
			match parse_document(&input.raw_sdl) {
				Ok(document) => subgraphs.push((input.clone(), tag_filter::apply(filter, document))),
				Err(err) => errors.push(CompositionError::graphql(err.message).in_subgraph(&input.source_name)),
			}
		}
		if !errors.is_empty() {
			return Err(errors);
		}

		let mut contract = Self { subgraphs };
		let hidden = contract.hidden_everywhere();
		contract.hide_types(&hidden);
		Ok(contract)
	}

	/// Types fully hidden by every subgraph that defines them.
	fn hidden_everywhere(&self) -> HashSet<String> {
		let mut defined: HashMap<&str, usize> = HashMap::new();
		let mut hidden: HashMap<&str, usize> = HashMap::new();
		for (_, filtered) in &self.subgraphs {
			let names: HashSet<&str> = filtered.document.types().map(|t| t.name.as_str()).collect();
			for name in names {
				*defined.entry(name).or_default() += 1;
				if filtered.fully_hidden.contains(name) {
					*hidden.entry(name).or_default() += 1;
				}
			}
		}
		hidden
			.into_iter()
			.filter(|(name, count)| defined.get(name) == Some(count))
			.map(|(name, _)| name.to_string())
			.collect()
	}

	/// Mark `names` inaccessible in every subgraph defining them.
	pub fn hide_types(&mut self, names: &HashSet<String>) {
		for (_, filtered) in &mut self.subgraphs {
			filtered.hide_types(names);
		}
	}

	pub fn inputs(&self) -> Vec<SubgraphInput> {
		self
			.subgraphs
			.iter()
			.map(|(input, filtered)| input.with_sdl(print_document(&filtered.document)))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn mutation_subgraphs(second_tagged: bool) -> Vec<SubgraphInput> {
		let second = if second_tagged { r#" @tag(name: "exclude")"# } else { "" };
		vec![
			SubgraphInput::new(
				"a",
				r#"type Query { a: String } type Mutation { field1: String @tag(name: "exclude") }"#,
			),
			SubgraphInput::new("b", format!("type Query {{ b: String }} type Mutation {{ field2: String{} }}", second)),
		]
	}

	fn exclude(tag: &str) -> TagFilter {
		TagFilter::new(Default::default(), [tag.to_string()].into())
	}

	#[test]
	fn test_type_hidden_only_when_hidden_everywhere() {
		let all = ContractSubgraphs::filter(&mutation_subgraphs(true), &exclude("exclude")).unwrap();
		for input in all.inputs() {
			assert!(input.raw_sdl.contains("type Mutation @inaccessible"), "{}", input.raw_sdl);
		}

		let partial = ContractSubgraphs::filter(&mutation_subgraphs(false), &exclude("exclude")).unwrap();
		for input in partial.inputs() {
			assert!(!input.raw_sdl.contains("type Mutation @inaccessible"), "{}", input.raw_sdl);
		}
	}

	#[test]
	fn test_parse_errors_are_reported_per_subgraph() {
		let inputs = vec![
			SubgraphInput::new("good", "type Query { a: String }"),
			SubgraphInput::new("bad", "type Query {"),
		];
		let errors = ContractSubgraphs::filter(&inputs, &exclude("x")).unwrap_err();
		assert_eq!(errors.len(), 1);
		assert!(errors[0].message.starts_with("[bad] "));
	}
}
