// Conversion from the async-graphql-parser AST into the owned SDL model

use async_graphql_parser::Positioned;
use async_graphql_parser::types as ast;
use async_graphql_value::ConstValue;
use heck::ToShoutySnakeCase;

use super::*;

/// Syntax error reported by the parser.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
	pub message: String,
}

impl ParseError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}

/// Parse an SDL document.
pub fn parse_document(sdl: &str) -> Result<Document, ParseError> {
	if sdl.trim().is_empty() {
		return Err(ParseError::new("Syntax Error: Unexpected <EOF>."));
	}
	let parsed = async_graphql_parser::parse_schema(sdl)
		.map_err(|e| ParseError::new(format!("Syntax Error: {}", e)))?;

	let definitions = parsed
		.definitions
		.into_iter()
		.map(|definition| match definition {
			ast::TypeSystemDefinition::Schema(schema) => Definition::Schema(convert_schema(schema.node)),
			ast::TypeSystemDefinition::Type(ty) => Definition::Type(convert_type(ty.node)),
			ast::TypeSystemDefinition::Directive(directive) => {
				Definition::Directive(convert_directive_definition(directive.node))
			},
		})
		.collect();

	Ok(Document { definitions })
}

fn convert_schema(schema: ast::SchemaDefinition) -> SchemaDefinition {
	let mut operations = Vec::new();
	for (kind, name) in [
		(OperationKind::Query, schema.query),
		(OperationKind::Mutation, schema.mutation),
		(OperationKind::Subscription, schema.subscription),
	] {
		if let Some(name) = name {
			operations.push((kind, name.node.to_string()));
		}
	}
	SchemaDefinition {
		extend: schema.extend,
		directives: convert_directives(schema.directives),
		operations,
	}
}

fn convert_type(ty: ast::TypeDefinition) -> TypeDefinition {
	let kind = match ty.kind {
		ast::TypeKind::Scalar => TypeKind::Scalar,
		ast::TypeKind::Object(object) => TypeKind::Object(FieldsType {
			implements: names(object.implements),
			fields: object.fields.into_iter().map(|f| convert_field(f.node)).collect(),
		}),
		ast::TypeKind::Interface(interface) => TypeKind::Interface(FieldsType {
			implements: names(interface.implements),
			fields: interface.fields.into_iter().map(|f| convert_field(f.node)).collect(),
		}),
		ast::TypeKind::Union(union) => TypeKind::Union(names(union.members)),
		ast::TypeKind::Enum(enum_type) => TypeKind::Enum(
			enum_type
				.values
				.into_iter()
				.map(|v| EnumValueDefinition {
					description: v.node.description.map(|d| d.node),
					name: v.node.value.node.to_string(),
					directives: convert_directives(v.node.directives),
				})
				.collect(),
		),
		ast::TypeKind::InputObject(input) => TypeKind::InputObject(
			input
				.fields
				.into_iter()
				.map(|f| convert_input_value(f.node))
				.collect(),
		),
	};

	TypeDefinition {
		extend: ty.extend,
		description: ty.description.map(|d| d.node),
		name: ty.name.node.to_string(),
		directives: convert_directives(ty.directives),
		kind,
	}
}

fn convert_field(field: ast::FieldDefinition) -> FieldDefinition {
	FieldDefinition {
		description: field.description.map(|d| d.node),
		name: field.name.node.to_string(),
		arguments: field
			.arguments
			.into_iter()
			.map(|a| convert_input_value(a.node))
			.collect(),
		ty: convert_type_ref(&field.ty.node),
		directives: convert_directives(field.directives),
	}
}

fn convert_input_value(value: ast::InputValueDefinition) -> InputValueDefinition {
	InputValueDefinition {
		description: value.description.map(|d| d.node),
		name: value.name.node.to_string(),
		ty: convert_type_ref(&value.ty.node),
		default_value: value.default_value.map(|v| convert_value(v.node)),
		directives: convert_directives(value.directives),
	}
}

fn convert_directive_definition(directive: ast::DirectiveDefinition) -> DirectiveDefinition {
	DirectiveDefinition {
		description: directive.description.map(|d| d.node),
		name: directive.name.node.to_string(),
		arguments: directive
			.arguments
			.into_iter()
			.map(|a| convert_input_value(a.node))
			.collect(),
		repeatable: directive.is_repeatable,
		locations: directive
			.locations
			.iter()
			.map(|l| format!("{:?}", l.node).to_shouty_snake_case())
			.collect(),
	}
}

fn convert_directives(directives: Vec<Positioned<ast::ConstDirective>>) -> Vec<Directive> {
	directives
		.into_iter()
		.map(|d| Directive {
			name: d.node.name.node.to_string(),
			arguments: d
				.node
				.arguments
				.into_iter()
				.map(|(name, value)| (name.node.to_string(), convert_value(value.node)))
				.collect(),
		})
		.collect()
}

fn convert_type_ref(ty: &ast::Type) -> TypeRef {
	let base = match &ty.base {
		ast::BaseType::Named(name) => TypeRef::Named(name.to_string()),
		ast::BaseType::List(inner) => TypeRef::List(Box::new(convert_type_ref(inner))),
	};
	if ty.nullable { base } else { TypeRef::NonNull(Box::new(base)) }
}

fn convert_value(value: ConstValue) -> Value {
	match value {
		ConstValue::Null => Value::Null,
		ConstValue::Boolean(b) => Value::Boolean(b),
		ConstValue::Number(n) => Value::Number(n.to_string()),
		ConstValue::String(s) => Value::String(s),
		ConstValue::Enum(name) => Value::Enum(name.to_string()),
		ConstValue::List(items) => Value::List(items.into_iter().map(convert_value).collect()),
		ConstValue::Object(fields) => Value::Object(
			fields
				.into_iter()
				.map(|(k, v)| (k.to_string(), convert_value(v)))
				.collect(),
		),
		#[allow(unreachable_patterns)]
		_ => Value::Null,
	}
}

fn names(names: Vec<Positioned<async_graphql_value::Name>>) -> Vec<String> {
	names.into_iter().map(|n| n.node.to_string()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_object_with_directives() {
		let doc = parse_document(
			r#"
			"A user"
			type User @key(fields: "id") {
				id: ID!
				friends(first: Int = 10): [User!]! @deprecated(reason: "nope")
			}
			"#,
		)
		.unwrap();

		let user = doc.type_named("User").unwrap();
		assert_eq!(user.description.as_deref(), Some("A user"));
		assert_eq!(user.directives[0].string_argument("fields"), Some("id"));
		let friends = user.field("friends").unwrap();
		assert_eq!(friends.ty.to_string(), "[User!]!");
		assert_eq!(friends.arguments[0].default_value, Some(Value::Number("10".into())));
	}

	#[test]
	fn test_parse_extend_schema() {
		let doc = parse_document(
			r#"
			extend schema @link(url: "https://specs.apollo.dev/federation/v2.3", import: ["@key"])
			type Query { a: String }
			"#,
		)
		.unwrap();
		let link = doc.schema_directives().next().unwrap();
		assert_eq!(link.name, "link");
		assert_eq!(
			link.argument("import"),
			Some(&Value::List(vec![Value::string("@key")]))
		);
	}

	#[test]
	fn test_directive_locations() {
		let doc = parse_document("directive @meta(name: String!) repeatable on FIELD_DEFINITION | OBJECT").unwrap();
		let def = doc.directive_definitions().next().unwrap();
		assert!(def.repeatable);
		assert_eq!(def.locations, vec!["FIELD_DEFINITION", "OBJECT"]);
	}

	#[test]
	fn test_syntax_error() {
		let err = parse_document("type Query {").unwrap_err();
		assert!(err.message.starts_with("Syntax Error"));
	}
}
