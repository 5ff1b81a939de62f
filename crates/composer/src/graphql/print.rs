// SDL printer (graphql-js layout)

use std::fmt::Write;

use super::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions {
	/// Trim leading/trailing whitespace of every description.
	pub trim_descriptions: bool,
}

pub fn print_document(doc: &Document) -> String {
	print_document_with(doc, PrintOptions::default())
}

pub fn print_document_with(doc: &Document, options: PrintOptions) -> String {
	let printer = Printer { options };
	let blocks: Vec<String> = doc
		.definitions
		.iter()
		.map(|definition| match definition {
			Definition::Schema(schema) => printer.schema(schema),
			Definition::Type(ty) => printer.type_definition(ty),
			Definition::Directive(directive) => printer.directive_definition(directive),
		})
		.collect();
	let mut out = blocks.join("\n\n");
	out.push('\n');
	out
}

struct Printer {
	options: PrintOptions,
}

impl Printer {
	fn schema(&self, schema: &SchemaDefinition) -> String {
		let mut out = String::new();
		if schema.extend {
			out.push_str("extend ");
		}
		out.push_str("schema");
		out.push_str(&directives(&schema.directives));
		if !schema.operations.is_empty() {
			out.push_str(" {\n");
			for (kind, name) in &schema.operations {
				let _ = writeln!(out, "  {}: {}", kind.keyword(), name);
			}
			out.push('}');
		}
		out
	}

	fn type_definition(&self, ty: &TypeDefinition) -> String {
		let mut out = self.description(ty.description.as_deref(), "");
		if ty.extend {
			out.push_str("extend ");
		}
		match &ty.kind {
			TypeKind::Scalar => {
				let _ = write!(out, "scalar {}{}", ty.name, directives(&ty.directives));
			},
			TypeKind::Object(fields) | TypeKind::Interface(fields) => {
				let keyword = if matches!(ty.kind, TypeKind::Object(_)) {
					"type"
				} else {
					"interface"
				};
				let _ = write!(out, "{} {}", keyword, ty.name);
				if !fields.implements.is_empty() {
					let _ = write!(out, " implements {}", fields.implements.join(" & "));
				}
				out.push_str(&directives(&ty.directives));
				if !fields.fields.is_empty() {
					out.push_str(" {\n");
					for field in &fields.fields {
						out.push_str(&self.field(field));
						out.push('\n');
					}
					out.push('}');
				}
			},
			TypeKind::Union(members) => {
				let _ = write!(out, "union {}{}", ty.name, directives(&ty.directives));
				if !members.is_empty() {
					let _ = write!(out, " = {}", members.join(" | "));
				}
			},
			TypeKind::Enum(values) => {
				let _ = write!(out, "enum {}{}", ty.name, directives(&ty.directives));
				if !values.is_empty() {
					out.push_str(" {\n");
					for value in values {
						out.push_str(&self.description(value.description.as_deref(), "  "));
						let _ = writeln!(out, "  {}{}", value.name, directives(&value.directives));
					}
					out.push('}');
				}
			},
			TypeKind::InputObject(fields) => {
				let _ = write!(out, "input {}{}", ty.name, directives(&ty.directives));
				if !fields.is_empty() {
					out.push_str(" {\n");
					for field in fields {
						out.push_str(&self.description(field.description.as_deref(), "  "));
						let _ = writeln!(out, "  {}", input_value(field));
					}
					out.push('}');
				}
			},
		}
		out
	}

	fn field(&self, field: &FieldDefinition) -> String {
		let mut out = self.description(field.description.as_deref(), "  ");
		let _ = write!(out, "  {}", field.name);
		out.push_str(&self.arguments(&field.arguments, "  "));
		let _ = write!(out, ": {}{}", field.ty, directives(&field.directives));
		out
	}

	fn arguments(&self, arguments: &[InputValueDefinition], indent: &str) -> String {
		if arguments.is_empty() {
			return String::new();
		}
		if arguments.iter().all(|a| a.description.is_none()) {
			let inline: Vec<String> = arguments.iter().map(input_value).collect();
			return format!("({})", inline.join(", "));
		}
		let inner = format!("{}  ", indent);
		let mut out = String::from("(\n");
		for argument in arguments {
			out.push_str(&self.description(argument.description.as_deref(), &inner));
			let _ = writeln!(out, "{}{}", inner, input_value(argument));
		}
		let _ = write!(out, "{})", indent);
		out
	}

	fn directive_definition(&self, directive: &DirectiveDefinition) -> String {
		let mut out = self.description(directive.description.as_deref(), "");
		let _ = write!(out, "directive @{}", directive.name);
		out.push_str(&self.arguments(&directive.arguments, ""));
		if directive.repeatable {
			out.push_str(" repeatable");
		}
		let _ = write!(out, " on {}", directive.locations.join(" | "));
		out
	}

	fn description(&self, description: Option<&str>, indent: &str) -> String {
		let Some(description) = description else {
			return String::new();
		};
		let description = if self.options.trim_descriptions {
			description.trim()
		} else {
			description
		};
		if description.contains('\n') {
			let escaped = description.replace("\"\"\"", "\\\"\"\"");
			let mut out = format!("{}\"\"\"\n", indent);
			for line in escaped.lines() {
				if line.is_empty() {
					out.push('\n');
				} else {
					let _ = writeln!(out, "{}{}", indent, line);
				}
			}
			let _ = writeln!(out, "{}\"\"\"", indent);
			out
		} else {
			format!("{}{}\n", indent, string_literal(description))
		}
	}
}

fn input_value(value: &InputValueDefinition) -> String {
	let mut out = format!("{}: {}", value.name, value.ty);
	if let Some(default) = &value.default_value {
		let _ = write!(out, " = {}", print_value(default));
	}
	out.push_str(&directives(&value.directives));
	out
}

fn directives(directives: &[Directive]) -> String {
	let mut out = String::new();
	for directive in directives {
		out.push(' ');
		out.push_str(&print_directive(directive));
	}
	out
}

pub(crate) fn print_directive(directive: &Directive) -> String {
	if directive.arguments.is_empty() {
		return format!("@{}", directive.name);
	}
	let arguments: Vec<String> = directive
		.arguments
		.iter()
		.map(|(name, value)| format!("{}: {}", name, print_value(value)))
		.collect();
	format!("@{}({})", directive.name, arguments.join(", "))
}

pub(crate) fn print_value(value: &Value) -> String {
	match value {
		Value::Null => "null".to_string(),
		Value::Boolean(b) => b.to_string(),
		Value::Number(n) => n.clone(),
		Value::String(s) => string_literal(s),
		Value::Enum(e) => e.clone(),
		Value::List(items) => {
			let items: Vec<String> = items.iter().map(print_value).collect();
			format!("[{}]", items.join(", "))
		},
		Value::Object(fields) => {
			let fields: Vec<String> = fields
				.iter()
				.map(|(k, v)| format!("{}: {}", k, print_value(v)))
				.collect();
			format!("{{{}}}", fields.join(", "))
		},
	}
}

fn string_literal(s: &str) -> String {
	// JSON string escapes are a subset of GraphQL's.
	serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}
