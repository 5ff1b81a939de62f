//! Owned SDL document model.
//!
//! Parsing is delegated to `async-graphql-parser`; everything downstream
//! (extension merging, validation, composition, printing) works on the
//! crate-owned types below so transforms can freely mutate documents.

mod extend;
mod parse;
mod print;
mod validate;

pub use extend::merge_extensions;
pub use parse::{ParseError, parse_document};
pub use print::{PrintOptions, print_document, print_document_with};
pub use validate::{ValidationOptions, validate_document};

pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];
pub const BUILTIN_DIRECTIVES: [&str; 5] = ["skip", "include", "deprecated", "specifiedBy", "oneOf"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
	pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
	Schema(SchemaDefinition),
	Type(TypeDefinition),
	Directive(DirectiveDefinition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
	Query,
	Mutation,
	Subscription,
}

impl OperationKind {
	pub const ALL: [OperationKind; 3] = [
		OperationKind::Query,
		OperationKind::Mutation,
		OperationKind::Subscription,
	];

	pub fn keyword(&self) -> &'static str {
		match self {
			OperationKind::Query => "query",
			OperationKind::Mutation => "mutation",
			OperationKind::Subscription => "subscription",
		}
	}

	pub fn default_type_name(&self) -> &'static str {
		match self {
			OperationKind::Query => "Query",
			OperationKind::Mutation => "Mutation",
			OperationKind::Subscription => "Subscription",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDefinition {
	pub extend: bool,
	pub directives: Vec<Directive>,
	pub operations: Vec<(OperationKind, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
	pub extend: bool,
	pub description: Option<String>,
	pub name: String,
	pub directives: Vec<Directive>,
	pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
	Scalar,
	Object(FieldsType),
	Interface(FieldsType),
	Union(Vec<String>),
	Enum(Vec<EnumValueDefinition>),
	InputObject(Vec<InputValueDefinition>),
}

impl TypeKind {
	pub fn label(&self) -> &'static str {
		match self {
			TypeKind::Scalar => "Scalar Type",
			TypeKind::Object(_) => "Object Type",
			TypeKind::Interface(_) => "Interface Type",
			TypeKind::Union(_) => "Union Type",
			TypeKind::Enum(_) => "Enum Type",
			TypeKind::InputObject(_) => "Input Object Type",
		}
	}

	pub fn same_kind(&self, other: &TypeKind) -> bool {
		std::mem::discriminant(self) == std::mem::discriminant(other)
	}
}

/// Shared shape of object and interface types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldsType {
	pub implements: Vec<String>,
	pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
	pub description: Option<String>,
	pub name: String,
	pub arguments: Vec<InputValueDefinition>,
	pub ty: TypeRef,
	pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
	pub description: Option<String>,
	pub name: String,
	pub ty: TypeRef,
	pub default_value: Option<Value>,
	pub directives: Vec<Directive>,
}

impl InputValueDefinition {
	/// Non-null without a default value.
	pub fn is_required(&self) -> bool {
		self.ty.is_non_null() && self.default_value.is_none()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDefinition {
	pub description: Option<String>,
	pub name: String,
	pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveDefinition {
	pub description: Option<String>,
	pub name: String,
	pub arguments: Vec<InputValueDefinition>,
	pub repeatable: bool,
	pub locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
	pub name: String,
	pub arguments: Vec<(String, Value)>,
}

impl Directive {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			arguments: Vec::new(),
		}
	}

	pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
		self.arguments.push((name.into(), value));
		self
	}

	pub fn argument(&self, name: &str) -> Option<&Value> {
		self
			.arguments
			.iter()
			.find(|(n, _)| n == name)
			.map(|(_, v)| v)
	}

	pub fn string_argument(&self, name: &str) -> Option<&str> {
		self.argument(name).and_then(Value::as_str)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Boolean(bool),
	/// Numeric literal kept verbatim.
	Number(String),
	String(String),
	Enum(String),
	List(Vec<Value>),
	Object(Vec<(String, Value)>),
}

impl Value {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Boolean(b) => Some(*b),
			_ => None,
		}
	}

	pub fn string(s: impl Into<String>) -> Self {
		Value::String(s.into())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
	Named(String),
	List(Box<TypeRef>),
	NonNull(Box<TypeRef>),
}

impl TypeRef {
	pub fn named(name: impl Into<String>) -> Self {
		TypeRef::Named(name.into())
	}

	pub fn non_null(inner: TypeRef) -> Self {
		TypeRef::NonNull(Box::new(inner))
	}

	pub fn list(inner: TypeRef) -> Self {
		TypeRef::List(Box::new(inner))
	}

	/// Innermost named type.
	pub fn base_name(&self) -> &str {
		match self {
			TypeRef::Named(name) => name,
			TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
		}
	}

	pub fn is_non_null(&self) -> bool {
		matches!(self, TypeRef::NonNull(_))
	}

	pub fn nullable(&self) -> &TypeRef {
		match self {
			TypeRef::NonNull(inner) => inner,
			other => other,
		}
	}

	pub fn rename_base(&mut self, from: &str, to: &str) {
		match self {
			TypeRef::Named(name) if name == from => *name = to.to_string(),
			TypeRef::Named(_) => {},
			TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.rename_base(from, to),
		}
	}
}

impl std::fmt::Display for TypeRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			TypeRef::Named(name) => write!(f, "{}", name),
			TypeRef::List(inner) => write!(f, "[{}]", inner),
			TypeRef::NonNull(inner) => write!(f, "{}!", inner),
		}
	}
}

pub fn has_directive(directives: &[Directive], name: &str) -> bool {
	directives.iter().any(|d| d.name == name)
}

pub fn directives_named<'a>(
	directives: &'a [Directive],
	name: &'a str,
) -> impl Iterator<Item = &'a Directive> + 'a {
	directives.iter().filter(move |d| d.name == name)
}

impl TypeDefinition {
	pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
		Self {
			extend: false,
			description: None,
			name: name.into(),
			directives: Vec::new(),
			kind,
		}
	}

	pub fn fields(&self) -> Option<&[FieldDefinition]> {
		match &self.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => Some(&t.fields),
			_ => None,
		}
	}

	pub fn fields_mut(&mut self) -> Option<&mut Vec<FieldDefinition>> {
		match &mut self.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => Some(&mut t.fields),
			_ => None,
		}
	}

	pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
		self.fields()?.iter().find(|f| f.name == name)
	}

	pub fn implements(&self) -> &[String] {
		match &self.kind {
			TypeKind::Object(t) | TypeKind::Interface(t) => &t.implements,
			_ => &[],
		}
	}

	pub fn has_directive(&self, name: &str) -> bool {
		has_directive(&self.directives, name)
	}

	pub fn is_input_type(&self) -> bool {
		matches!(
			self.kind,
			TypeKind::Scalar | TypeKind::Enum(_) | TypeKind::InputObject(_)
		)
	}

	pub fn is_output_type(&self) -> bool {
		!matches!(self.kind, TypeKind::InputObject(_))
	}
}

impl FieldDefinition {
	pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
		Self {
			description: None,
			name: name.into(),
			arguments: Vec::new(),
			ty,
			directives: Vec::new(),
		}
	}

	pub fn has_directive(&self, name: &str) -> bool {
		has_directive(&self.directives, name)
	}
}

impl Document {
	pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
		self.definitions.iter().filter_map(|d| match d {
			Definition::Type(t) => Some(t),
			_ => None,
		})
	}

	pub fn types_mut(&mut self) -> impl Iterator<Item = &mut TypeDefinition> {
		self.definitions.iter_mut().filter_map(|d| match d {
			Definition::Type(t) => Some(t),
			_ => None,
		})
	}

	pub fn schema_definitions(&self) -> impl Iterator<Item = &SchemaDefinition> {
		self.definitions.iter().filter_map(|d| match d {
			Definition::Schema(s) => Some(s),
			_ => None,
		})
	}

	pub fn directive_definitions(&self) -> impl Iterator<Item = &DirectiveDefinition> {
		self.definitions.iter().filter_map(|d| match d {
			Definition::Directive(dd) => Some(dd),
			_ => None,
		})
	}

	/// First non-extension definition of `name`, falling back to an extension.
	pub fn type_named(&self, name: &str) -> Option<&TypeDefinition> {
		self
			.types()
			.filter(|t| t.name == name)
			.min_by_key(|t| t.extend)
	}

	pub fn type_named_mut(&mut self, name: &str) -> Option<&mut TypeDefinition> {
		self.types_mut().find(|t| t.name == name && !t.extend)
	}

	/// Root operation type name, honouring a `schema { ... }` block.
	pub fn root_type_name(&self, kind: OperationKind) -> Option<String> {
		let explicit = self
			.schema_definitions()
			.flat_map(|s| s.operations.iter())
			.find(|(k, _)| *k == kind)
			.map(|(_, name)| name.clone());
		if explicit.is_some() {
			return explicit;
		}
		let has_schema_ops = self.schema_definitions().any(|s| !s.operations.is_empty());
		let default = kind.default_type_name();
		if !has_schema_ops && self.type_named(default).is_some() {
			Some(default.to_string())
		} else {
			None
		}
	}

	/// Every directive application on the schema block(s).
	pub fn schema_directives(&self) -> impl Iterator<Item = &Directive> {
		self.schema_definitions().flat_map(|s| s.directives.iter())
	}

	/// Visit every directive list in the document: schema, types, fields,
	/// arguments, enum values and input fields.
	pub fn for_each_directives_mut(&mut self, mut f: impl FnMut(&mut Vec<Directive>)) {
		for definition in &mut self.definitions {
			match definition {
				Definition::Schema(schema) => f(&mut schema.directives),
				Definition::Directive(def) => {
					for argument in &mut def.arguments {
						f(&mut argument.directives);
					}
				},
				Definition::Type(ty) => {
					f(&mut ty.directives);
					match &mut ty.kind {
						TypeKind::Object(t) | TypeKind::Interface(t) => {
							for field in &mut t.fields {
								f(&mut field.directives);
								for argument in &mut field.arguments {
									f(&mut argument.directives);
								}
							}
						},
						TypeKind::Enum(values) => {
							for value in values {
								f(&mut value.directives);
							}
						},
						TypeKind::InputObject(fields) => {
							for field in fields {
								f(&mut field.directives);
							}
						},
						TypeKind::Scalar | TypeKind::Union(_) => {},
					}
				},
			}
		}
	}

	/// Rename a type and every reference to it.
	pub fn rename_type(&mut self, from: &str, to: &str) {
		for definition in &mut self.definitions {
			match definition {
				Definition::Schema(schema) => {
					for (_, name) in &mut schema.operations {
						if name == from {
							*name = to.to_string();
						}
					}
				},
				Definition::Directive(def) => {
					for argument in &mut def.arguments {
						argument.ty.rename_base(from, to);
					}
				},
				Definition::Type(ty) => {
					if ty.name == from {
						ty.name = to.to_string();
					}
					match &mut ty.kind {
						TypeKind::Object(t) | TypeKind::Interface(t) => {
							for name in &mut t.implements {
								if name == from {
									*name = to.to_string();
								}
							}
							for field in &mut t.fields {
								field.ty.rename_base(from, to);
								for argument in &mut field.arguments {
									argument.ty.rename_base(from, to);
								}
							}
						},
						TypeKind::Union(members) => {
							for member in members {
								if member == from {
									*member = to.to_string();
								}
							}
						},
						TypeKind::InputObject(fields) => {
							for field in fields {
								field.ty.rename_base(from, to);
							}
						},
						TypeKind::Scalar | TypeKind::Enum(_) => {},
					}
				},
			}
		}
	}

	/// Every directive list in the document, in document order.
	pub fn directive_lists(&self) -> Vec<&[Directive]> {
		let mut lists: Vec<&[Directive]> = Vec::new();
		for definition in &self.definitions {
			match definition {
				Definition::Schema(schema) => lists.push(&schema.directives),
				Definition::Directive(def) => lists.extend(def.arguments.iter().map(|a| a.directives.as_slice())),
				Definition::Type(ty) => {
					lists.push(&ty.directives);
					match &ty.kind {
						TypeKind::Object(t) | TypeKind::Interface(t) => {
							for field in &t.fields {
								lists.push(&field.directives);
								lists.extend(field.arguments.iter().map(|a| a.directives.as_slice()));
							}
						},
						TypeKind::Enum(values) => lists.extend(values.iter().map(|v| v.directives.as_slice())),
						TypeKind::InputObject(fields) => lists.extend(fields.iter().map(|f| f.directives.as_slice())),
						TypeKind::Scalar | TypeKind::Union(_) => {},
					}
				},
			}
		}
		lists
	}

	/// Remove a `schema` block that says nothing the type names don't.
	pub fn drop_default_schema(&mut self) {
		self.definitions.retain(|d| match d {
			Definition::Schema(schema) => {
				!schema.directives.is_empty()
					|| schema
						.operations
						.iter()
						.any(|(kind, name)| name != kind.default_type_name())
			},
			_ => true,
		});
	}

	/// Every `name` argument of `directive` usages, sorted and distinct.
	pub fn tag_names(&self, directive: &str) -> Vec<String> {
		let tags: std::collections::BTreeSet<&str> = self
			.directive_lists()
			.into_iter()
			.flat_map(|list| directives_named(list, directive))
			.filter_map(|d| d.string_argument("name"))
			.collect();
		tags.into_iter().map(str::to_string).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_type_ref_display() {
		let ty = TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("User"))));
		assert_eq!(ty.to_string(), "[User!]!");
		assert_eq!(ty.base_name(), "User");
	}

	#[test]
	fn test_root_type_name_honours_schema_block() {
		let doc = parse_document("schema { query: Root } type Root { a: String }").unwrap();
		assert_eq!(doc.root_type_name(OperationKind::Query).as_deref(), Some("Root"));
		assert_eq!(doc.root_type_name(OperationKind::Mutation), None);
	}
}
