use thiserror::Error;

/// Errors raised while turning template source into a syntax tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Lexer error on line {line} (byte {pos}): {message}")]
    Lex {
        message: String,
        pos: usize,
        line: usize,
    },
    #[error("Parse error on line {line} (byte {pos}): expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: usize,
        line: usize,
    },
    #[error("Parse error on line {line} (byte {pos}): {open} doesn't match {close}")]
    MismatchedBlock {
        open: String,
        close: String,
        pos: usize,
        line: usize,
    },
    #[error("Parse error on line {line} (byte {pos}): {message}")]
    Invalid {
        message: String,
        pos: usize,
        line: usize,
    },
}

impl TemplateError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            TemplateError::Lex { pos, line, .. }
            | TemplateError::UnexpectedToken { pos, line, .. }
            | TemplateError::MismatchedBlock { pos, line, .. }
            | TemplateError::Invalid { pos, line, .. } => (*pos, *line),
        }
    }
}

/// Errors raised while evaluating a compiled template.
///
/// Output written before the error occurred must be considered incomplete.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Helper '{name}' called with {given} argument(s), expected {expected} (line {line})")]
    Arity {
        name: String,
        given: usize,
        expected: String,
        pos: usize,
        line: usize,
    },
    #[error("Helper '{name}' must return a string or a safe string (line {line})")]
    HelperReturnType { name: String, pos: usize, line: usize },
    #[error("Missing helper: '{name}' (line {line})")]
    MissingHelper { name: String, pos: usize, line: usize },
    #[error("Partial '{name}' not found (line {line})")]
    PartialNotFound { name: String, pos: usize, line: usize },
    #[error("Invalid partial '{name}': {source}")]
    PartialTemplate {
        name: String,
        #[source]
        source: TemplateError,
    },
    #[error("Partials accept at most one parameter (line {line})")]
    InvalidPartialParams { pos: usize, line: usize },
    #[error("Helper error: {0}")]
    Helper(String),
    #[error("Data error: {0}")]
    Data(String),
}

impl RenderError {
    /// Builds a custom failure from inside a helper.
    pub fn helper(message: impl Into<String>) -> Self {
        RenderError::Helper(message.into())
    }
}

impl serde::ser::Error for RenderError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        RenderError::Data(msg.to_string())
    }
}

/// Errors raised while populating a [`crate::Registry`].
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Helper already registered: {0}")]
    DuplicateHelper(String),
    #[error("Partial already registered: {0}")]
    DuplicatePartial(String),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Load error: {0}")]
    Load(String),
}

/// Umbrella error for entry points that both compile and render.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
