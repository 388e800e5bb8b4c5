use crate::error::TemplateError;
use crate::tpl::ast::*;
use crate::tpl::lexer::{Lexer, scan};
use crate::tpl::token::{Token, TokenKind};
use std::collections::VecDeque;

/// Parses template source into a raw syntax tree, before whitespace control.
pub fn parse_template(input: &str) -> Result<Program, TemplateError> {
    let mut parser = Parser::new(scan(input), input.len());
    let program = parser.parse_program()?;
    let token = parser.next()?;
    if token.kind != TokenKind::Eof {
        return Err(unexpected(&token, "end of template"));
    }
    Ok(program)
}

/// The opening tag of a block: `{{#path params hash as |x y|}}`.
struct OpenBlock {
    expression: Expression,
    block_params: Vec<String>,
    strip: Strip,
    loc: Loc,
}

/// What follows a block's main program: `{{else}}...` or `{{else if}}...`.
struct InverseChain {
    strip: Strip,
    program: Program,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Token>,
    end: usize,
}

fn unexpected(token: &Token, expected: &str) -> TemplateError {
    if token.kind == TokenKind::Error {
        return TemplateError::Lex {
            message: token.val.clone(),
            pos: token.pos,
            line: token.line,
        };
    }
    TemplateError::UnexpectedToken {
        expected: expected.to_string(),
        found: token.to_string(),
        pos: token.pos,
        line: token.line,
    }
}

fn invalid(message: impl Into<String>, loc: Loc) -> TemplateError {
    TemplateError::Invalid {
        message: message.into(),
        pos: loc.pos,
        line: loc.line,
    }
}

fn loc_of(token: &Token) -> Loc {
    Loc {
        pos: token.pos,
        line: token.line,
    }
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>, end: usize) -> Self {
        Self {
            lexer,
            lookahead: VecDeque::with_capacity(2),
            end,
        }
    }

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            let token = match self.lexer.next() {
                Some(t) => t,
                None => {
                    // the lexer has already produced its terminal token
                    let line = self.lookahead.back().map(|t| t.line).unwrap_or(1);
                    Token::new(TokenKind::Eof, "", self.end, line)
                }
            };
            self.lookahead.push_back(token);
        }
    }

    fn peek_at(&mut self, n: usize) -> &Token {
        self.fill(n);
        &self.lookahead[n]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek_at(0).kind
    }

    fn is(&mut self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn next(&mut self) -> Result<Token, TemplateError> {
        self.fill(0);
        match self.lookahead.pop_front() {
            Some(token) if token.kind == TokenKind::Error => Err(unexpected(&token, "")),
            Some(token) => Ok(token),
            None => Err(invalid("unexpected end of token stream", Loc::default())),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, TemplateError> {
        let token = self.next()?;
        if token.kind != kind {
            return Err(unexpected(&token, kind.name()));
        }
        Ok(token)
    }

    /// program : statement*
    pub fn parse_program(&mut self) -> Result<Program, TemplateError> {
        let loc = loc_of(self.peek_at(0));
        let mut body = Vec::new();
        loop {
            let node = match self.peek_kind() {
                TokenKind::Content => self.parse_content()?,
                TokenKind::Comment => self.parse_comment()?,
                TokenKind::Open | TokenKind::OpenUnescaped => self.parse_mustache()?,
                TokenKind::OpenBlock | TokenKind::OpenInverse => self.parse_block()?,
                TokenKind::OpenRawBlock => self.parse_raw_block()?,
                TokenKind::OpenPartial => self.parse_partial()?,
                TokenKind::Error => {
                    let token = self.next_raw();
                    return Err(unexpected(&token, ""));
                }
                _ => break,
            };
            body.push(node);
        }
        Ok(Program {
            body,
            block_params: Vec::new(),
            chained: false,
            loc,
        })
    }

    fn next_raw(&mut self) -> Token {
        self.fill(0);
        self.lookahead
            .pop_front()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", self.end, 1))
    }

    fn parse_content(&mut self) -> Result<Node, TemplateError> {
        let token = self.expect(TokenKind::Content)?;
        let loc = loc_of(&token);
        Ok(Node::Content(ContentStatement::new(token.val, loc)))
    }

    fn parse_comment(&mut self) -> Result<Node, TemplateError> {
        let token = self.expect(TokenKind::Comment)?;
        let strip = Strip {
            open: token.val.as_bytes().get(2) == Some(&b'~'),
            close: token.val.ends_with("~}}"),
        };
        Ok(Node::Comment(CommentStatement {
            value: strip_comment(&token.val),
            strip,
            loc: loc_of(&token),
        }))
    }

    /// mustache : OPEN expression CLOSE | OPEN_UNESCAPED expression CLOSE_UNESCAPED
    fn parse_mustache(&mut self) -> Result<Node, TemplateError> {
        let open = self.next()?;
        let loc = loc_of(&open);
        let expression = self.parse_expression(loc)?;
        let (close, unescaped) = if open.kind == TokenKind::OpenUnescaped {
            (self.expect(TokenKind::CloseUnescaped)?, true)
        } else {
            (self.expect(TokenKind::Close)?, open.val.ends_with('&'))
        };
        Ok(Node::Mustache(MustacheStatement {
            expression,
            unescaped,
            strip: Strip::from_delimiters(&open.val, &close.val),
            loc,
        }))
    }

    /// block : openBlock program inverseChain? closeBlock
    ///       | openInverse program inverseAndProgram? closeBlock
    fn parse_block(&mut self) -> Result<Node, TemplateError> {
        let inverted = self.is(TokenKind::OpenInverse);
        let open = self.parse_open_block()?;
        let program = self.parse_program()?;
        let chain = self.parse_inverse_chain()?;
        let close_strip = self.parse_close_block(&open.expression)?;
        let mut block = prepare_block(open, program, chain, inverted);
        block.close_strip = close_strip;
        if let Some(inverse) = block.inverse.as_mut() {
            set_chain_close_strip(inverse, close_strip);
        }
        Ok(Node::Block(block))
    }

    /// openBlock : (OPEN_BLOCK | OPEN_INVERSE | OPEN_INVERSE_CHAIN) expression blockParams? CLOSE
    fn parse_open_block(&mut self) -> Result<OpenBlock, TemplateError> {
        let open = self.next()?;
        let loc = loc_of(&open);
        let expression = self.parse_expression(loc)?;
        let block_params = if self.is(TokenKind::OpenBlockParams) {
            self.parse_block_params()?
        } else {
            Vec::new()
        };
        let close = self.expect(TokenKind::Close)?;
        Ok(OpenBlock {
            expression,
            block_params,
            strip: Strip::from_delimiters(&open.val, &close.val),
            loc,
        })
    }

    /// inverseChain : openInverseChain program inverseChain? | INVERSE program
    fn parse_inverse_chain(&mut self) -> Result<Option<InverseChain>, TemplateError> {
        match self.peek_kind() {
            TokenKind::Inverse => {
                let token = self.next()?;
                let strip = Strip {
                    open: token.val.as_bytes().get(2) == Some(&b'~'),
                    close: token.val.ends_with("~}}"),
                };
                let program = self.parse_program()?;
                Ok(Some(InverseChain { strip, program }))
            }
            TokenKind::OpenInverseChain => {
                let open = self.parse_open_block()?;
                let strip = open.strip;
                let loc = open.loc;
                let program = self.parse_program()?;
                let nested = self.parse_inverse_chain()?;
                let block = prepare_block(open, program, nested, false);
                Ok(Some(InverseChain {
                    strip,
                    program: Program {
                        body: vec![Node::Block(block)],
                        block_params: Vec::new(),
                        chained: true,
                        loc,
                    },
                }))
            }
            _ => Ok(None),
        }
    }

    /// closeBlock : OPEN_ENDBLOCK helperName CLOSE
    fn parse_close_block(&mut self, opened: &Expression) -> Result<Strip, TemplateError> {
        let open = self.expect(TokenKind::OpenEndBlock)?;
        let name = self.parse_helper_name()?;
        let close = self.expect(TokenKind::Close)?;
        if name.original() != opened.name() {
            return Err(TemplateError::MismatchedBlock {
                open: opened.name().to_string(),
                close: name.original().to_string(),
                pos: open.pos,
                line: open.line,
            });
        }
        Ok(Strip::from_delimiters(&open.val, &close.val))
    }

    /// rawBlock : OPEN_RAW_BLOCK expression CLOSE_RAW_BLOCK content* OPEN_END_RAW_BLOCK helperName CLOSE_RAW_BLOCK
    fn parse_raw_block(&mut self) -> Result<Node, TemplateError> {
        let open = self.expect(TokenKind::OpenRawBlock)?;
        let loc = loc_of(&open);
        let expression = self.parse_expression(loc)?;
        self.expect(TokenKind::CloseRawBlock)?;

        let body_loc = loc_of(self.peek_at(0));
        let mut text = String::new();
        while self.is(TokenKind::Content) {
            text.push_str(&self.next()?.val);
        }
        let mut body = Vec::new();
        if !text.is_empty() {
            body.push(Node::Content(ContentStatement::new(text, body_loc)));
        }

        let end = self.expect(TokenKind::OpenEndRawBlock)?;
        let name = self.parse_helper_name()?;
        self.expect(TokenKind::CloseRawBlock)?;
        if name.original() != expression.name() {
            return Err(TemplateError::MismatchedBlock {
                open: expression.name().to_string(),
                close: name.original().to_string(),
                pos: end.pos,
                line: end.line,
            });
        }

        Ok(Node::Block(BlockStatement {
            expression,
            raw: true,
            program: Some(Program {
                body,
                block_params: Vec::new(),
                chained: false,
                loc: body_loc,
            }),
            inverse: None,
            open_strip: Strip::default(),
            inverse_strip: Strip::default(),
            close_strip: Strip::default(),
            loc,
        }))
    }

    /// partial : OPEN_PARTIAL partialName param* hash? CLOSE
    fn parse_partial(&mut self) -> Result<Node, TemplateError> {
        let open = self.expect(TokenKind::OpenPartial)?;
        let loc = loc_of(&open);
        let name = if self.is(TokenKind::OpenSexpr) {
            self.parse_sexpr()?
        } else {
            self.parse_helper_name()?
        };
        let (params, hash) = self.parse_arguments()?;
        let close = self.expect(TokenKind::Close)?;
        Ok(Node::Partial(PartialStatement {
            name,
            params,
            hash,
            indent: String::new(),
            strip: Strip::from_delimiters(&open.val, &close.val),
            loc,
        }))
    }

    /// expression : helperName param* hash?
    fn parse_expression(&mut self, loc: Loc) -> Result<Expression, TemplateError> {
        let path = self.parse_helper_name()?;
        let (params, hash) = self.parse_arguments()?;
        Ok(Expression {
            path,
            params,
            hash,
            loc,
        })
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Param>, Option<Hash>), TemplateError> {
        let mut params = Vec::new();
        while self.is_param_start() && !self.is_hash_start() {
            params.push(self.parse_param()?);
        }
        let hash = if self.is_hash_start() {
            Some(self.parse_hash()?)
        } else {
            None
        };
        Ok((params, hash))
    }

    fn is_param_start(&mut self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Id
                | TokenKind::Data
                | TokenKind::String
                | TokenKind::Number
                | TokenKind::Boolean
                | TokenKind::OpenSexpr
        )
    }

    /// Two-token lookahead: `ID '='` starts a hash segment.
    fn is_hash_start(&mut self) -> bool {
        self.peek_at(0).kind == TokenKind::Id && self.peek_at(1).kind == TokenKind::Equals
    }

    /// param : helperName | sexpr
    fn parse_param(&mut self) -> Result<Param, TemplateError> {
        if self.is(TokenKind::OpenSexpr) {
            return self.parse_sexpr();
        }
        self.parse_helper_name()
    }

    /// sexpr : OPEN_SEXPR expression CLOSE_SEXPR
    fn parse_sexpr(&mut self) -> Result<Param, TemplateError> {
        let open = self.expect(TokenKind::OpenSexpr)?;
        let loc = loc_of(&open);
        let expression = self.parse_expression(loc)?;
        self.expect(TokenKind::CloseSexpr)?;
        Ok(Param::SubExpression(Box::new(SubExpression {
            expression,
            loc,
        })))
    }

    /// hash : hashSegment+
    fn parse_hash(&mut self) -> Result<Hash, TemplateError> {
        let loc = loc_of(self.peek_at(0));
        let mut pairs: Vec<HashPair> = Vec::new();
        while self.is_hash_start() {
            let pair = self.parse_hash_segment()?;
            if pairs.iter().any(|p| p.key == pair.key) {
                return Err(invalid(format!("duplicate hash key '{}'", pair.key), pair.loc));
            }
            pairs.push(pair);
        }
        if pairs.is_empty() {
            return Err(invalid("empty hash", loc));
        }
        Ok(Hash { pairs, loc })
    }

    /// hashSegment : ID EQUALS param
    fn parse_hash_segment(&mut self) -> Result<HashPair, TemplateError> {
        let key = self.expect(TokenKind::Id)?;
        self.expect(TokenKind::Equals)?;
        let value = self.parse_param()?;
        Ok(HashPair {
            loc: loc_of(&key),
            key: strip_brackets(&key.val).to_string(),
            value,
        })
    }

    /// blockParams : OPEN_BLOCK_PARAMS ID+ CLOSE_BLOCK_PARAMS
    fn parse_block_params(&mut self) -> Result<Vec<String>, TemplateError> {
        let open = self.expect(TokenKind::OpenBlockParams)?;
        let mut names = Vec::new();
        while self.is(TokenKind::Id) {
            names.push(strip_brackets(&self.next()?.val).to_string());
        }
        if names.is_empty() {
            return Err(invalid(
                "block params need at least one identifier",
                loc_of(&open),
            ));
        }
        self.expect(TokenKind::CloseBlockParams)?;
        Ok(names)
    }

    /// helperName : path | dataName | STRING | NUMBER | BOOLEAN
    fn parse_helper_name(&mut self) -> Result<Param, TemplateError> {
        let token = self.next()?;
        let loc = loc_of(&token);
        match token.kind {
            TokenKind::Id => self.parse_path(token, false, loc),
            TokenKind::Data => {
                let first = self.expect(TokenKind::Id)?;
                self.parse_path(first, true, loc)
            }
            TokenKind::String => Ok(Param::String(StringLiteral {
                original: token.val.clone(),
                value: token.val,
                loc,
            })),
            TokenKind::Number => match Number::parse(&token.val) {
                Some(value) => Ok(Param::Number(NumberLiteral {
                    value,
                    original: token.val,
                    loc,
                })),
                None => Err(invalid(format!("invalid number '{}'", token.val), loc)),
            },
            TokenKind::Boolean => match token.val.as_str() {
                "true" | "false" => Ok(Param::Boolean(BooleanLiteral {
                    value: token.val == "true",
                    original: token.val,
                    loc,
                })),
                _ => Err(invalid(format!("invalid boolean '{}'", token.val), loc)),
            },
            _ => Err(unexpected(&token, "helper name or path")),
        }
    }

    /// path : ID (SEP ID)*
    fn parse_path(&mut self, first: Token, data: bool, loc: Loc) -> Result<Param, TemplateError> {
        let mut original = if data { String::from("@") } else { String::new() };
        original.push_str(&first.val);
        let mut segments = vec![first.val];
        while self.is(TokenKind::Sep) {
            let sep = self.next()?;
            let id = self.expect(TokenKind::Id)?;
            original.push_str(&sep.val);
            original.push_str(&id.val);
            segments.push(id.val);
        }

        let mut depth = 0;
        let mut parts: Vec<String> = Vec::new();
        for segment in &segments {
            let literal = is_bracketed(segment);
            let part = strip_brackets(segment);
            if !literal && (part == ".." || part == "." || part == "this") {
                if !parts.is_empty() {
                    return Err(invalid(format!("Invalid path: {}", original), loc));
                }
                if part == ".." {
                    depth += 1;
                }
            } else {
                parts.push(part.to_string());
            }
        }

        Ok(Param::Path(PathExpression {
            original,
            depth,
            parts,
            data,
            loc,
        }))
    }
}

fn is_bracketed(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('[') && s.ends_with(']')
}

fn strip_brackets(s: &str) -> &str {
    if is_bracketed(s) { &s[1..s.len() - 1] } else { s }
}

/// `{{~!-- text --~}}` -> ` text `
fn strip_comment(raw: &str) -> String {
    let mut s = raw.strip_prefix("{{").unwrap_or(raw);
    s = s.strip_prefix('~').unwrap_or(s);
    s = s.strip_prefix('!').unwrap_or(s);
    s = s.strip_suffix("}}").unwrap_or(s);
    s = s.strip_suffix('~').unwrap_or(s);
    if let Some(inner) = s.strip_prefix("--") {
        s = inner.strip_suffix("--").unwrap_or(inner);
    }
    s.to_string()
}

fn prepare_block(
    open: OpenBlock,
    mut program: Program,
    chain: Option<InverseChain>,
    inverted: bool,
) -> BlockStatement {
    program.block_params = open.block_params;
    let (inverse_strip, inverse) = match chain {
        Some(chain) => (chain.strip, Some(chain.program)),
        None => (Strip::default(), None),
    };
    let (program, inverse) = if inverted {
        (inverse, Some(program))
    } else {
        (Some(program), inverse)
    };
    BlockStatement {
        expression: open.expression,
        raw: false,
        program,
        inverse,
        open_strip: open.strip,
        inverse_strip,
        close_strip: Strip::default(),
        loc: open.loc,
    }
}

/// Chained `{{else if}}` blocks share the closing tag of the outermost block.
fn set_chain_close_strip(inverse: &mut Program, strip: Strip) {
    if !inverse.chained {
        return;
    }
    if let Some(Node::Block(block)) = inverse.body.first_mut() {
        block.close_strip = strip;
        if let Some(next) = block.inverse.as_mut() {
            set_chain_close_strip(next, strip);
        }
    }
}
