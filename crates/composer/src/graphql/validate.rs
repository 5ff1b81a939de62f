// Type-system validation of an SDL document

use std::collections::{HashMap, HashSet};

use super::*;
use crate::error::CompositionError;

/// Knobs for documents that lean on directives or types defined elsewhere,
/// such as federation subgraphs.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
	/// Directive names accepted without a definition in the document.
	pub known_directives: HashSet<String>,
	/// Type names accepted without a definition in the document.
	pub known_types: HashSet<String>,
	pub require_query_root: bool,
}

impl Default for ValidationOptions {
	fn default() -> Self {
		Self {
			known_directives: HashSet::new(),
			known_types: HashSet::new(),
			require_query_root: true,
		}
	}
}

impl ValidationOptions {
	pub fn with_directives<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.known_directives.extend(names.into_iter().map(Into::into));
		self
	}

	pub fn with_types<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.known_types.extend(names.into_iter().map(Into::into));
		self
	}

	pub fn without_query_root(mut self) -> Self {
		self.require_query_root = false;
		self
	}
}

/// Validate a document whose extensions have already been merged.
///
/// Every problem found is returned; nothing short-circuits.
pub fn validate_document(doc: &Document, options: &ValidationOptions) -> Vec<CompositionError> {
	Validator::new(doc, options).run()
}

struct Validator<'a> {
	doc: &'a Document,
	options: &'a ValidationOptions,
	types: HashMap<&'a str, &'a TypeDefinition>,
	/// Directive name to "repeatable".
	directives: HashMap<&'a str, bool>,
	errors: Vec<CompositionError>,
}

impl<'a> Validator<'a> {
	fn new(doc: &'a Document, options: &'a ValidationOptions) -> Self {
		let mut types = HashMap::new();
		for ty in doc.types().filter(|t| !t.extend) {
			types.entry(ty.name.as_str()).or_insert(ty);
		}
		let mut directives: HashMap<&str, bool> = HashMap::new();
		for name in BUILTIN_DIRECTIVES {
			directives.insert(name, false);
		}
		for name in &options.known_directives {
			directives.insert(name.as_str(), true);
		}
		for def in doc.directive_definitions() {
			directives.insert(def.name.as_str(), def.repeatable);
		}
		Self {
			doc,
			options,
			types,
			directives,
			errors: Vec::new(),
		}
	}

	fn report(&mut self, message: String) {
		self.errors.push(CompositionError::graphql(message));
	}

	fn run(mut self) -> Vec<CompositionError> {
		self.unique_names();
		self.roots();
		let doc = self.doc;
		for definition in &doc.definitions {
			match definition {
				Definition::Schema(schema) => self.directive_usages(&schema.directives),
				Definition::Type(ty) if ty.extend => self.stray_extension(ty),
				Definition::Type(ty) => self.type_definition(ty),
				Definition::Directive(def) => {
					for argument in &def.arguments {
						self.input_type(&argument.ty, || format!("@{}({}:)", def.name, argument.name));
					}
				},
			}
		}
		self.errors
	}

	fn unique_names(&mut self) {
		let mut seen_types = HashSet::new();
		let mut seen_directives = HashSet::new();
		let mut messages = Vec::new();
		for definition in &self.doc.definitions {
			match definition {
				Definition::Type(ty) if !ty.extend => {
					if !seen_types.insert(ty.name.as_str()) {
						messages.push(format!("There can be only one type named \"{}\".", ty.name));
					} else if BUILTIN_SCALARS.contains(&ty.name.as_str()) && !matches!(ty.kind, TypeKind::Scalar) {
						messages.push(format!(
							"Type \"{}\" already exists in the schema. It cannot also be defined in this type definition.",
							ty.name
						));
					}
				},
				Definition::Directive(def) => {
					if !seen_directives.insert(def.name.as_str()) {
						messages.push(format!("There can be only one directive named \"@{}\".", def.name));
					}
				},
				_ => {},
			}
		}
		for message in messages {
			self.report(message);
		}
	}

	fn roots(&mut self) {
		for kind in OperationKind::ALL {
			let Some(name) = self.doc.root_type_name(kind) else {
				if kind == OperationKind::Query && self.options.require_query_root {
					self.report("Query root type must be provided.".to_string());
				}
				continue;
			};
			let label = match kind {
				OperationKind::Query => "Query",
				OperationKind::Mutation => "Mutation",
				OperationKind::Subscription => "Subscription",
			};
			match self.types.get(name.as_str()) {
				Some(ty) if matches!(ty.kind, TypeKind::Object(_)) => {},
				Some(_) => self.report(format!(
					"{} root type must be Object type, it cannot be {}.",
					label, name
				)),
				None => self.report(format!("Unknown type \"{}\".", name)),
			}
		}
	}

	fn stray_extension(&mut self, ty: &TypeDefinition) {
		match self.types.get(ty.name.as_str()) {
			Some(_) => {
				let expected = match &ty.kind {
					TypeKind::Scalar => "scalar",
					TypeKind::Object(_) => "object",
					TypeKind::Interface(_) => "interface",
					TypeKind::Union(_) => "union",
					TypeKind::Enum(_) => "enum",
					TypeKind::InputObject(_) => "input object",
				};
				self.report(format!("Cannot extend non-{} type \"{}\".", expected, ty.name));
			},
			None => self.report(format!(
				"Cannot extend type \"{}\" because it is not defined.",
				ty.name
			)),
		}
	}

	fn type_definition(&mut self, ty: &'a TypeDefinition) {
		self.directive_usages(&ty.directives);
		match &ty.kind {
			TypeKind::Scalar => {},
			TypeKind::Object(fields) | TypeKind::Interface(fields) => {
				if fields.fields.is_empty() {
					self.report(format!("Type {} must define one or more fields.", ty.name));
				}
				let mut seen = HashSet::new();
				for field in &fields.fields {
					if !seen.insert(field.name.as_str()) {
						self.report(format!(
							"Field \"{}.{}\" can only be defined once.",
							ty.name, field.name
						));
					}
					self.output_type(&field.ty, || format!("{}.{}", ty.name, field.name));
					self.directive_usages(&field.directives);
					let mut seen_args = HashSet::new();
					for argument in &field.arguments {
						if !seen_args.insert(argument.name.as_str()) {
							self.report(format!(
								"Argument \"{}.{}({}:)\" can only be defined once.",
								ty.name, field.name, argument.name
							));
						}
						self.input_type(&argument.ty, || {
							format!("{}.{}({}:)", ty.name, field.name, argument.name)
						});
						self.directive_usages(&argument.directives);
					}
				}
				self.interfaces(ty, fields);
			},
			TypeKind::Union(members) => {
				if members.is_empty() {
					self.report(format!("Union type {} must define one or more member types.", ty.name));
				}
				let mut seen = HashSet::new();
				for member in members {
					if !seen.insert(member.as_str()) {
						self.report(format!(
							"Union type {} can only include type {} once.",
							ty.name, member
						));
					}
					match self.types.get(member.as_str()) {
						Some(def) if matches!(def.kind, TypeKind::Object(_)) => {},
						Some(_) => self.report(format!(
							"Union type {} can only include Object types, it cannot include {}.",
							ty.name, member
						)),
						None if BUILTIN_SCALARS.contains(&member.as_str()) => self.report(format!(
							"Union type {} can only include Object types, it cannot include {}.",
							ty.name, member
						)),
						None if self.options.known_types.contains(member) => {},
						None => self.report(format!("Unknown type \"{}\".", member)),
					}
				}
			},
			TypeKind::Enum(values) => {
				if values.is_empty() {
					self.report(format!("Enum type {} must define one or more values.", ty.name));
				}
				let mut seen = HashSet::new();
				for value in values {
					if !seen.insert(value.name.as_str()) {
						self.report(format!(
							"Enum value \"{}.{}\" can only be defined once.",
							ty.name, value.name
						));
					}
					if matches!(value.name.as_str(), "true" | "false" | "null") {
						self.report(format!("Enum type {} cannot include value: {}.", ty.name, value.name));
					}
					self.directive_usages(&value.directives);
				}
			},
			TypeKind::InputObject(fields) => {
				if fields.is_empty() {
					self.report(format!(
						"Input Object type {} must define one or more fields.",
						ty.name
					));
				}
				let mut seen = HashSet::new();
				for field in fields {
					if !seen.insert(field.name.as_str()) {
						self.report(format!(
							"Field \"{}.{}\" can only be defined once.",
							ty.name, field.name
						));
					}
					self.input_type(&field.ty, || format!("{}.{}", ty.name, field.name));
					self.directive_usages(&field.directives);
				}
			},
		}
	}

	fn interfaces(&mut self, ty: &TypeDefinition, fields: &FieldsType) {
		for name in &fields.implements {
			if name == &ty.name {
				self.report(format!(
					"Type {} cannot implement itself because it would create a circular reference.",
					ty.name
				));
				continue;
			}
			let Some(iface) = self.types.get(name.as_str()).copied() else {
				if !self.options.known_types.contains(name) {
					self.report(format!("Unknown type \"{}\".", name));
				}
				continue;
			};
			let TypeKind::Interface(iface_fields) = &iface.kind else {
				self.report(format!(
					"Type {} must only implement Interface types, it cannot implement {}.",
					ty.name, name
				));
				continue;
			};
			for expected in &iface_fields.fields {
				let Some(actual) = fields.fields.iter().find(|f| f.name == expected.name) else {
					self.report(format!(
						"Interface field {}.{} expected but {} does not provide it.",
						iface.name, expected.name, ty.name
					));
					continue;
				};
				if !self.is_subtype(&actual.ty, &expected.ty) {
					self.report(format!(
						"Interface field {}.{} expects type {} but {}.{} is type {}.",
						iface.name, expected.name, expected.ty, ty.name, actual.name, actual.ty
					));
				}
				for argument in &expected.arguments {
					match actual.arguments.iter().find(|a| a.name == argument.name) {
						None => self.report(format!(
							"Interface field argument {}.{}({}:) expected but {}.{} does not provide it.",
							iface.name, expected.name, argument.name, ty.name, actual.name
						)),
						Some(found) if found.ty != argument.ty => self.report(format!(
							"Interface field argument {}.{}({}:) expects type {} but {}.{}({}:) is type {}.",
							iface.name,
							expected.name,
							argument.name,
							argument.ty,
							ty.name,
							actual.name,
							found.name,
							found.ty
						)),
						Some(_) => {},
					}
				}
			}
			for inherited in iface_fields.implements.iter() {
				if !fields.implements.contains(inherited) {
					self.report(format!(
						"Type {} must implement {} because it is implemented by {}.",
						ty.name, inherited, iface.name
					));
				}
			}
		}
	}

	fn is_subtype(&self, actual: &TypeRef, expected: &TypeRef) -> bool {
		match (actual, expected) {
			(TypeRef::NonNull(a), TypeRef::NonNull(e)) => self.is_subtype(a, e),
			(TypeRef::NonNull(a), e) => self.is_subtype(a, e),
			(_, TypeRef::NonNull(_)) => false,
			(TypeRef::List(a), TypeRef::List(e)) => self.is_subtype(a, e),
			(TypeRef::List(_), _) | (_, TypeRef::List(_)) => false,
			(TypeRef::Named(a), TypeRef::Named(e)) => {
				if a == e {
					return true;
				}
				match self.types.get(e.as_str()).map(|t| &t.kind) {
					Some(TypeKind::Union(members)) => members.contains(a),
					Some(TypeKind::Interface(_)) => self
						.types
						.get(a.as_str())
						.is_some_and(|t| t.implements().contains(e)),
					_ => false,
				}
			},
		}
	}

	fn named_type(&mut self, ty: &TypeRef) -> Option<&'a TypeDefinition> {
		let name = ty.base_name();
		if let Some(def) = self.types.get(name) {
			return Some(*def);
		}
		if !BUILTIN_SCALARS.contains(&name) && !self.options.known_types.contains(name) {
			self.report(format!("Unknown type \"{}\".", name));
		}
		None
	}

	fn output_type(&mut self, ty: &TypeRef, coordinate: impl FnOnce() -> String) {
		if let Some(def) = self.named_type(ty)
			&& !def.is_output_type()
		{
			let message = format!(
				"The type of {} must be Output Type but got: {}.",
				coordinate(),
				ty
			);
			self.report(message);
		}
	}

	fn input_type(&mut self, ty: &TypeRef, coordinate: impl FnOnce() -> String) {
		if let Some(def) = self.named_type(ty)
			&& !def.is_input_type()
		{
			let message = format!(
				"The type of {} must be Input Type but got: {}.",
				coordinate(),
				ty
			);
			self.report(message);
		}
	}

	fn directive_usages(&mut self, directives: &[Directive]) {
		let mut seen = HashSet::new();
		for directive in directives {
			match self.directives.get(directive.name.as_str()) {
				None => self.report(format!("Unknown directive \"@{}\".", directive.name)),
				Some(false) if !seen.insert(directive.name.as_str()) => self.report(format!(
					"The directive \"@{}\" can only be used once at this location.",
					directive.name
				)),
				Some(_) => {},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn messages(sdl: &str, options: &ValidationOptions) -> Vec<String> {
		let mut doc = parse_document(sdl).unwrap();
		merge_extensions(&mut doc);
		validate_document(&doc, options)
			.into_iter()
			.map(|e| e.message)
			.collect()
	}

	#[test]
	fn test_valid_schema() {
		let errors = messages(
			"interface Node { id: ID! } type User implements Node { id: ID! friends: [User!] } type Query { node(id: ID!): Node }",
			&ValidationOptions::default(),
		);
		assert!(errors.is_empty(), "{errors:?}");
	}

	#[test]
	fn test_unknown_type_and_missing_query() {
		let errors = messages("type Foo { bar: Baz }", &ValidationOptions::default());
		assert_eq!(errors, vec![
			"Query root type must be provided.".to_string(),
			"Unknown type \"Baz\".".to_string(),
		]);
	}

	#[test]
	fn test_union_members_must_be_objects() {
		let errors = messages(
			"scalar Date enum Color { RED } type User { id: ID } union U = Int | Date | Color | User | Ghost type Query { u: U }",
			&ValidationOptions::default(),
		);
		assert_eq!(errors, vec![
			"Union type U can only include Object types, it cannot include Int.".to_string(),
			"Union type U can only include Object types, it cannot include Date.".to_string(),
			"Union type U can only include Object types, it cannot include Color.".to_string(),
			"Unknown type \"Ghost\".".to_string(),
		]);
	}

	#[test]
	fn test_input_output_positions() {
		let errors = messages(
			"input In { a: Int } type Out { a: Int } type Query { f(arg: Out): In }",
			&ValidationOptions::default(),
		);
		assert_eq!(errors, vec![
			"The type of Query.f must be Output Type but got: In.".to_string(),
			"The type of Query.f(arg:) must be Input Type but got: Out.".to_string(),
		]);
	}

	#[test]
	fn test_missing_interface_field() {
		let errors = messages(
			"interface Node { id: ID! } type User implements Node { name: String } type Query { u: User }",
			&ValidationOptions::default(),
		);
		assert_eq!(errors, vec![
			"Interface field Node.id expected but User does not provide it.".to_string()
		]);
	}

	#[test]
	fn test_unknown_directive_is_reported_unless_known() {
		let sdl = "type Query { a: Int @shareable }";
		assert_eq!(messages(sdl, &ValidationOptions::default()), vec![
			"Unknown directive \"@shareable\".".to_string()
		]);
		let options = ValidationOptions::default().with_directives(["shareable"]);
		assert!(messages(sdl, &options).is_empty());
	}

	#[test]
	fn test_non_repeatable_directive_twice() {
		let errors = messages(
			"type Query { a: Int @deprecated @deprecated }",
			&ValidationOptions::default(),
		);
		assert_eq!(errors, vec![
			"The directive \"@deprecated\" can only be used once at this location.".to_string()
		]);
	}

	#[test]
	fn test_extension_of_wrong_kind() {
		let errors = messages(
			"type Query { a: Int } enum Role { A } extend type Role { b: Int }",
			&ValidationOptions::default(),
		);
		assert_eq!(errors, vec!["Cannot extend non-object type \"Role\".".to_string()]);
	}
}
