use std::fmt;

/// Source location of a node: byte offset and 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub pos: usize,
    pub line: usize,
}

/// Whitespace-strip markers (`~`) on either side of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strip {
    pub open: bool,
    pub close: bool,
}

impl Strip {
    /// Reads the markers from an open and a close delimiter.
    pub fn from_delimiters(open: &str, close: &str) -> Self {
        Self {
            open: open.len() > 2 && open.as_bytes()[2] == b'~',
            close: close.starts_with('~') || close.starts_with("}~"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Node>,
    pub block_params: Vec<String>,
    /// Set on programs that hold a single `{{else if ...}}` block.
    pub chained: bool,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Mustache(MustacheStatement),
    Block(BlockStatement),
    Partial(PartialStatement),
    Content(ContentStatement),
    Comment(CommentStatement),
}

impl Node {
    pub fn loc(&self) -> Loc {
        match self {
            Node::Mustache(n) => n.loc,
            Node::Block(n) => n.loc,
            Node::Partial(n) => n.loc,
            Node::Content(n) => n.loc,
            Node::Comment(n) => n.loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MustacheStatement {
    pub expression: Expression,
    pub unescaped: bool,
    pub strip: Strip,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub expression: Expression,
    /// `{{{{name}}}}...{{{{/name}}}}`: the body is a single literal content node.
    pub raw: bool,
    pub program: Option<Program>,
    pub inverse: Option<Program>,
    pub open_strip: Strip,
    pub inverse_strip: Strip,
    pub close_strip: Strip,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialStatement {
    pub name: Param,
    pub params: Vec<Param>,
    pub hash: Option<Hash>,
    /// Leading whitespace of a standalone partial tag.
    pub indent: String,
    pub strip: Strip,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentStatement {
    pub value: String,
    /// Text as it appeared in the source, never modified.
    pub original: String,
    pub left_stripped: bool,
    pub right_stripped: bool,
    pub loc: Loc,
}

impl ContentStatement {
    pub fn new(text: String, loc: Loc) -> Self {
        Self {
            value: text.clone(),
            original: text,
            left_stripped: false,
            right_stripped: false,
            loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentStatement {
    pub value: String,
    pub strip: Strip,
    pub loc: Loc,
}

/// A helper call or value reference: `path param* hash?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub path: Param,
    pub params: Vec<Param>,
    pub hash: Option<Hash>,
    pub loc: Loc,
}

impl Expression {
    /// Name under which this expression may resolve to a registered helper.
    ///
    /// Scoped paths (`this.foo`, `./foo`, `../foo`), data paths and
    /// multi-segment paths never name a helper.
    pub fn helper_name(&self) -> Option<&str> {
        match &self.path {
            Param::Path(p) if p.is_simple() => p.parts.first().map(String::as_str),
            Param::String(s) => Some(&s.value),
            Param::Number(n) => Some(&n.original),
            Param::Boolean(b) => Some(&b.original),
            _ => None,
        }
    }

    pub fn has_arguments(&self) -> bool {
        !self.params.is_empty() || self.hash.is_some()
    }

    /// Source text of the callee, used in diagnostics.
    pub fn name(&self) -> &str {
        self.path.original()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Path(PathExpression),
    SubExpression(Box<SubExpression>),
    String(StringLiteral),
    Number(NumberLiteral),
    Boolean(BooleanLiteral),
}

impl Param {
    pub fn loc(&self) -> Loc {
        match self {
            Param::Path(p) => p.loc,
            Param::SubExpression(s) => s.loc,
            Param::String(s) => s.loc,
            Param::Number(n) => n.loc,
            Param::Boolean(b) => b.loc,
        }
    }

    pub fn original(&self) -> &str {
        match self {
            Param::Path(p) => &p.original,
            Param::SubExpression(s) => s.expression.name(),
            Param::String(s) => &s.original,
            Param::Number(n) => &n.original,
            Param::Boolean(b) => &b.original,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubExpression {
    pub expression: Expression,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpression {
    pub original: String,
    /// Number of leading `..` segments.
    pub depth: usize,
    /// Segment names with `this` and `.` removed.
    pub parts: Vec<String>,
    pub data: bool,
    pub loc: Loc,
}

impl PathExpression {
    /// `this`, `.` and `this/` all refer to the current context.
    pub fn is_this(&self) -> bool {
        !self.data && self.depth == 0 && self.parts.is_empty()
    }

    /// Starts with `.` or `this`.
    pub fn is_scoped(&self) -> bool {
        self.original.starts_with('.')
            || self.original == "this"
            || self.original.starts_with("this.")
            || self.original.starts_with("this/")
    }

    pub fn is_simple(&self) -> bool {
        !self.data && self.depth == 0 && self.parts.len() == 1 && !self.is_scoped()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    pub original: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanLiteral {
    pub value: bool,
    pub original: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn parse(s: &str) -> Option<Number> {
        if s.contains('.') {
            s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Number::Float)
        } else {
            s.parse::<i64>()
                .ok()
                .map(Number::Int)
                .or_else(|| s.parse::<f64>().ok().map(Number::Float))
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub value: Number,
    pub original: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hash {
    pub pairs: Vec<HashPair>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: String,
    pub value: Param,
    pub loc: Loc,
}
