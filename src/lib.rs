//! Handlebars/Mustache templates: compile source once into a [`Program`],
//! then render it against any `serde::Serialize` data.
//!
//! ```
//! use ubars::Template;
//! use std::collections::BTreeMap;
//!
//! let tpl = Template::compile("Hello {{name}}!").unwrap();
//! let data = BTreeMap::from([("name", "world")]);
//! assert_eq!(tpl.render(&data).unwrap(), "Hello world!");
//! ```
pub mod error;
pub mod models;
pub mod partial_loader;
pub mod registry;
pub mod tpl;
pub mod value;

pub use error::{Error, RegistryError, RenderError, TemplateError};
pub use models::{CompileOptions, RenderOptions, UbarsOptions};
pub use registry::Registry;
pub use tpl::ast::Program;
pub use tpl::engine::{Template, parse, parse_with, render};
pub use tpl::escape::escape_html;
pub use tpl::helpers::{Arity, BlockContext, HelperDef, Options};
pub use tpl::printer::print_ast;
pub use value::{Value, to_value};

pub use ubars_macros::partial_assets;
