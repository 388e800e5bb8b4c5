pub mod ast;
pub(crate) mod cache;
pub(crate) mod engine;
pub mod escape;
pub mod helpers;
pub mod lexer;
pub mod parser;
pub mod printer;
pub(crate) mod render;
pub mod render_context;
pub mod token;
pub mod whitespace;
