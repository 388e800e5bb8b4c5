use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Error,
    Eof,

    /// `{{` or `{{&`
    Open,
    /// `}}`
    Close,
    /// `{{{{`
    OpenRawBlock,
    /// `}}}}`
    CloseRawBlock,
    /// `{{{{/`
    OpenEndRawBlock,
    /// `{{{`
    OpenUnescaped,
    /// `}}}`
    CloseUnescaped,
    /// `{{#`
    OpenBlock,
    /// `{{/`
    OpenEndBlock,
    /// `{{else}}` or `{{^}}`
    Inverse,
    /// `{{^`
    OpenInverse,
    /// `{{else`
    OpenInverseChain,
    /// `{{>`
    OpenPartial,
    /// Whole comment tag, delimiters included.
    Comment,
    /// `(`
    OpenSexpr,
    /// `)`
    CloseSexpr,
    /// `=`
    Equals,
    /// `@`
    Data,
    /// `.` or `/` between path segments
    Sep,
    /// `as |`
    OpenBlockParams,
    /// `|`
    CloseBlockParams,

    Content,
    Id,
    String,
    Number,
    Boolean,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Error => "Error",
            TokenKind::Eof => "EOF",
            TokenKind::Open => "Open",
            TokenKind::Close => "Close",
            TokenKind::OpenRawBlock => "OpenRawBlock",
            TokenKind::CloseRawBlock => "CloseRawBlock",
            TokenKind::OpenEndRawBlock => "OpenEndRawBlock",
            TokenKind::OpenUnescaped => "OpenUnescaped",
            TokenKind::CloseUnescaped => "CloseUnescaped",
            TokenKind::OpenBlock => "OpenBlock",
            TokenKind::OpenEndBlock => "OpenEndBlock",
            TokenKind::Inverse => "Inverse",
            TokenKind::OpenInverse => "OpenInverse",
            TokenKind::OpenInverseChain => "OpenInverseChain",
            TokenKind::OpenPartial => "OpenPartial",
            TokenKind::Comment => "Comment",
            TokenKind::OpenSexpr => "OpenSexpr",
            TokenKind::CloseSexpr => "CloseSexpr",
            TokenKind::Equals => "Equals",
            TokenKind::Data => "Data",
            TokenKind::Sep => "Sep",
            TokenKind::OpenBlockParams => "OpenBlockParams",
            TokenKind::CloseBlockParams => "CloseBlockParams",
            TokenKind::Content => "Content",
            TokenKind::Id => "ID",
            TokenKind::String => "String",
            TokenKind::Number => "Number",
            TokenKind::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Matched source text; unescaped for strings, message for errors.
    pub val: String,
    pub pos: usize,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, val: impl Into<String>, pos: usize, line: usize) -> Self {
        Self {
            kind,
            val: val.into(),
            pos,
            line,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("EOF"),
            TokenKind::Error => write!(f, "Error{{{}}}", self.val),
            _ if self.val.chars().count() > 20 => {
                let short: String = self.val.chars().take(20).collect();
                write!(f, "{}{{\"{}\"...}}", self.kind, short)
            }
            _ => write!(f, "{}{{\"{}\"}}", self.kind, self.val),
        }
    }
}
