use crate::error::{RenderError, TemplateError};
use crate::models::options::CompileOptions;
use crate::registry::default_registry;
use crate::tpl::ast::Program;
use crate::tpl::parser::parse_template;
use crate::tpl::whitespace::normalize;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parses `source` and applies whitespace control with default options.
pub fn parse(source: &str) -> Result<Program, TemplateError> {
    parse_with(source, &CompileOptions::default())
}

pub fn parse_with(source: &str, options: &CompileOptions) -> Result<Program, TemplateError> {
    let mut program = parse_template(source)?;
    normalize(&mut program, options);
    Ok(program)
}

/// Renders a program with the default registry (built-in helpers only, no
/// partials).
pub fn render(
    program: &Program,
    data: &Value,
    private_data: Option<BTreeMap<String, Value>>,
) -> Result<String, RenderError> {
    default_registry().render_program(program, data, private_data)
}

/// A compiled template. Cloning shares the program.
#[derive(Debug, Clone)]
pub struct Template {
    program: Arc<Program>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Self::compile_with(source, &CompileOptions::default())
    }

    pub fn compile_with(source: &str, options: &CompileOptions) -> Result<Self, TemplateError> {
        Ok(Self::from(parse_with(source, options)?))
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn shared_program(&self) -> Arc<Program> {
        self.program.clone()
    }

    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, RenderError> {
        default_registry().render(self, data)
    }

    pub fn render_value(&self, data: &Value) -> Result<String, RenderError> {
        default_registry().render_value(self, data)
    }
}

impl From<Program> for Template {
    fn from(program: Program) -> Self {
        Self {
            program: Arc::new(program),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct User {
        name: String,
        age: u8,
    }

    #[test]
    fn test_render_simple() {
        let tpl = Template::compile("Hello {{name}}, you are {{age}}.").unwrap();
        let user = User {
            name: "<b>test</b>".to_string(),
            age: 18,
        };
        assert_eq!(
            tpl.render(&user).unwrap(),
            "Hello &lt;b&gt;test&lt;/b&gt;, you are 18."
        );
    }

    #[test]
    fn test_render_with_private_data() {
        let program = parse("{{@greeting}} {{name}}").unwrap();
        let mut data = BTreeMap::new();
        data.insert("greeting".to_string(), Value::from("hi"));
        let mut root = BTreeMap::new();
        root.insert("name".to_string(), Value::from("ann"));

        let out = render(&program, &Value::Map(root), Some(data)).unwrap();
        assert_eq!(out, "hi ann");
    }

    #[test]
    fn test_parse_applies_whitespace_control() {
        let program = parse("{{#if a}}\nyes\n{{/if}}\n").unwrap();
        let out = render(&program, &Value::from(BTreeMap::from([("a".to_string(), true)])), None);
        assert_eq!(out.unwrap(), "yes\n");

        let raw = parse_with("{{#if a}}\nyes\n{{/if}}\n", &CompileOptions::new().ignore_standalone(true)).unwrap();
        let out = render(&raw, &Value::from(BTreeMap::from([("a".to_string(), true)])), None);
        assert_eq!(out.unwrap(), "\nyes\n\n");
    }
}
