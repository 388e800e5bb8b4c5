use crate::tpl::token::{Token, TokenKind};
use std::collections::VecDeque;

const OPEN_MUSTACHE: &str = "{{";
const OPEN_RAW: &str = "{{{{";
const OPEN_END_RAW: &str = "{{{{/";
const CLOSE_RAW: &str = "}}}}";

/// Characters that can never appear in an identifier.
const ID_EXCLUDED: &str = "!\"#%&'()*+,./;<=>@[\\]^`{|}~";

/// Characters allowed right after an identifier.
fn is_id_lookahead(c: char) -> bool {
    c.is_whitespace() || "=~}/.)|".contains(c)
}

/// Characters allowed right after a number or boolean literal.
fn is_literal_lookahead(c: char) -> bool {
    c.is_whitespace() || "~})".contains(c)
}

fn is_id_char(c: char) -> bool {
    !c.is_whitespace() && !ID_EXCLUDED.contains(c)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Content,
    Mustache,
    Comment,
    Raw(String),
}

/// Pull-based tokenizer.
///
/// Yields tokens until it produces an `Eof` or `Error` token, then stops.
/// The sequence cannot be restarted; scanning again requires a new lexer.
pub struct Lexer<'a> {
    input: &'a str,
    start: usize,
    pos: usize,
    line: usize,
    mode: Mode,
    raw_name: Option<String>,
    pending: VecDeque<Token>,
    /// Last emitted token was a path separator.
    after_sep: bool,
    done: bool,
}

/// Starts scanning `input`.
pub fn scan(input: &str) -> Lexer<'_> {
    Lexer::new(input)
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            line: 1,
            mode: Mode::Content,
            raw_name: None,
            pending: VecDeque::new(),
            after_sep: false,
            done: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn emit(&mut self, kind: TokenKind) {
        let val = self.input[self.start..self.pos].to_string();
        self.emit_val(kind, val);
    }

    fn emit_val(&mut self, kind: TokenKind, val: String) {
        self.after_sep = kind == TokenKind::Sep;
        self.pending
            .push_back(Token::new(kind, val, self.start, self.line));
        self.ignore();
    }

    /// Drops the text between `start` and `pos`.
    fn ignore(&mut self) {
        self.line += self.input[self.start..self.pos].matches('\n').count();
        self.start = self.pos;
    }

    fn error(&mut self, message: impl Into<String>) {
        self.pending.push_back(Token::new(
            TokenKind::Error,
            message,
            self.pos,
            self.line + self.input[self.start..self.pos].matches('\n').count(),
        ));
    }

    fn step(&mut self) {
        match self.mode.clone() {
            Mode::Content => self.lex_content(),
            Mode::Mustache => self.lex_mustache(),
            Mode::Comment => self.lex_comment(),
            Mode::Raw(name) => self.lex_raw(&name),
        }
    }

    fn lex_content(&mut self) {
        let Some(idx) = self.rest().find(OPEN_MUSTACHE) else {
            self.pos = self.input.len();
            if self.pos > self.start {
                self.emit(TokenKind::Content);
            }
            self.emit(TokenKind::Eof);
            return;
        };
        let at = self.pos + idx;
        let bytes = self.input.as_bytes();
        let escaped = at > self.start && bytes[at - 1] == b'\\';
        let double_escaped = escaped && at > self.start + 1 && bytes[at - 2] == b'\\';

        if double_escaped {
            // `\\{{` : one literal backslash, then a real mustache
            self.pos = at - 1;
            self.emit(TokenKind::Content);
            self.pos = at;
            self.ignore();
            self.lex_open_mustache();
        } else if escaped {
            // `\{{` : the mustache is literal content up to the next `{{`
            self.pos = at - 1;
            if self.pos > self.start {
                self.emit(TokenKind::Content);
            }
            self.pos = at;
            self.ignore();
            self.pos = at + OPEN_MUSTACHE.len();
            let end = match self.rest().find(OPEN_MUSTACHE) {
                Some(next) => {
                    let mut end = self.pos + next;
                    let mut slashes = 0;
                    while slashes < 2 && end > self.pos && bytes[end - 1] == b'\\' {
                        end -= 1;
                        slashes += 1;
                    }
                    end
                }
                None => self.input.len(),
            };
            self.pos = end;
            self.emit(TokenKind::Content);
        } else {
            self.pos = at;
            if self.pos > self.start {
                self.emit(TokenKind::Content);
            }
            self.lex_open_mustache();
        }
    }

    /// Lexes an opening delimiter; `pos` is on `{{`.
    fn lex_open_mustache(&mut self) {
        let rest = self.rest();
        if rest.starts_with(OPEN_END_RAW) {
            self.pos += OPEN_END_RAW.len();
            self.emit(TokenKind::OpenEndRawBlock);
            self.mode = Mode::Mustache;
            return;
        }
        if rest.starts_with(OPEN_RAW) {
            self.pos += OPEN_RAW.len();
            let name: String = self
                .rest()
                .trim_start()
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '}')
                .collect();
            self.raw_name = Some(name);
            self.emit(TokenKind::OpenRawBlock);
            self.mode = Mode::Mustache;
            return;
        }

        let mut i = OPEN_MUSTACHE.len();
        if rest[i..].starts_with('~') {
            i += 1;
        }
        let after = &rest[i..];
        if after.starts_with('!') {
            self.mode = Mode::Comment;
            return;
        }

        let kind = match after.chars().next() {
            Some('{') => {
                i += 1;
                TokenKind::OpenUnescaped
            }
            Some('&') => {
                i += 1;
                TokenKind::Open
            }
            Some('#') if after[1..].starts_with('>') || after[1..].starts_with('*') => {
                self.error("partial blocks and decorators are not supported");
                return;
            }
            Some('*') => {
                self.error("decorators are not supported");
                return;
            }
            Some('#') => {
                i += 1;
                TokenKind::OpenBlock
            }
            Some('/') => {
                i += 1;
                TokenKind::OpenEndBlock
            }
            Some('>') => {
                i += 1;
                TokenKind::OpenPartial
            }
            Some('^') => {
                i += 1;
                if let Some(len) = standalone_inverse_len(&rest[i..]) {
                    self.pos += i + len;
                    self.emit(TokenKind::Inverse);
                    self.mode = Mode::Content;
                    return;
                }
                TokenKind::OpenInverse
            }
            _ => {
                let trimmed = after.trim_start();
                let ws = after.len() - trimmed.len();
                match trimmed.strip_prefix("else") {
                    Some(tail) => {
                        let else_end = i + ws + "else".len();
                        if let Some(len) = standalone_inverse_len(tail) {
                            self.pos += else_end + len;
                            self.emit(TokenKind::Inverse);
                            self.mode = Mode::Content;
                            return;
                        }
                        if tail.starts_with(char::is_whitespace) || tail.starts_with('~') {
                            i = else_end;
                            TokenKind::OpenInverseChain
                        } else {
                            TokenKind::Open
                        }
                    }
                    None => TokenKind::Open,
                }
            }
        };
        self.pos += i;
        self.emit(kind);
        self.mode = Mode::Mustache;
    }

    fn lex_comment(&mut self) {
        let rest = self.rest();
        let mut head = OPEN_MUSTACHE.len();
        if rest[head..].starts_with('~') {
            head += 1;
        }
        head += 1; // `!`
        let end = if rest[head..].starts_with("--") {
            let body = &rest[head + 2..];
            let plain = body.find("--}}").map(|i| (i, 4));
            let stripped = body.find("--~}}").map(|i| (i, 5));
            let found = match (plain, stripped) {
                (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
                (a, b) => a.or(b),
            };
            found.map(|(i, len)| head + 2 + i + len)
        } else {
            rest[head..].find("}}").map(|i| head + i + 2)
        };
        match end {
            Some(end) => {
                self.pos += end;
                self.emit(TokenKind::Comment);
                self.mode = Mode::Content;
            }
            None => self.error("unclosed comment"),
        }
    }

    fn lex_raw(&mut self, name: &str) {
        let close = format!("{}{}{}", OPEN_END_RAW, name, CLOSE_RAW);
        match self.rest().find(&close) {
            Some(idx) => {
                self.pos += idx;
                if self.pos > self.start {
                    self.emit(TokenKind::Content);
                }
                self.pos += OPEN_END_RAW.len();
                self.emit(TokenKind::OpenEndRawBlock);
                self.mode = Mode::Mustache;
            }
            None => self.error(format!("unclosed raw block '{}'", name)),
        }
    }

    fn lex_mustache(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
        self.ignore();

        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            self.error("unclosed mustache");
            return;
        };

        if rest.starts_with(CLOSE_RAW) {
            self.pos += CLOSE_RAW.len();
            self.emit(TokenKind::CloseRawBlock);
            self.mode = match self.raw_name.take() {
                Some(name) => Mode::Raw(name),
                None => Mode::Content,
            };
            return;
        }
        for (delim, kind) in [
            ("~}}}", TokenKind::CloseUnescaped),
            ("}~}}", TokenKind::CloseUnescaped),
            ("}}}", TokenKind::CloseUnescaped),
            ("~}}", TokenKind::Close),
            ("}}", TokenKind::Close),
        ] {
            if rest.starts_with(delim) {
                self.pos += delim.len();
                self.emit(kind);
                self.mode = Mode::Content;
                return;
            }
        }

        match c {
            '(' => self.single(TokenKind::OpenSexpr),
            ')' => self.single(TokenKind::CloseSexpr),
            '=' => self.single(TokenKind::Equals),
            '@' => self.single(TokenKind::Data),
            '|' => self.single(TokenKind::CloseBlockParams),
            '"' | '\'' => self.lex_string(c),
            '[' => self.lex_literal_segment(),
            _ if rest.starts_with("..") => {
                self.pos += 2;
                self.emit(TokenKind::Id);
            }
            '.' if rest[1..].chars().next().is_none_or(is_id_lookahead) => {
                self.single(TokenKind::Id);
            }
            '.' | '/' => self.single(TokenKind::Sep),
            _ => {
                if let Some(len) = block_params_len(rest) {
                    self.pos += len;
                    self.emit(TokenKind::OpenBlockParams);
                } else if self.after_sep && c.is_ascii_digit() {
                    // numeric path segment, as in `items.0`
                    self.lex_id();
                } else if let Some(len) = number_len(rest) {
                    self.pos += len;
                    self.emit(TokenKind::Number);
                } else if let Some(len) = boolean_len(rest) {
                    self.pos += len;
                    self.emit(TokenKind::Boolean);
                } else if is_id_char(c) {
                    self.lex_id();
                } else {
                    self.error(format!("unexpected character '{}'", c));
                }
            }
        }
    }

    fn single(&mut self, kind: TokenKind) {
        self.pos += 1;
        self.emit(kind);
    }

    fn lex_id(&mut self) {
        let len: usize = self
            .rest()
            .chars()
            .take_while(|c| is_id_char(*c))
            .map(char::len_utf8)
            .sum();
        self.pos += len;
        match self.peek() {
            Some(c) if !is_id_lookahead(c) => {
                self.error(format!("unexpected character '{}' after identifier", c))
            }
            _ => self.emit(TokenKind::Id),
        }
    }

    fn lex_string(&mut self, quote: char) {
        let mut val = String::new();
        let mut chars = self.rest().char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                if let Some(&(_, next)) = chars.peek() {
                    if next == quote {
                        val.push(quote);
                        chars.next();
                        continue;
                    }
                }
                val.push(c);
            } else if c == quote {
                self.pos += i + 1;
                self.emit_val(TokenKind::String, val);
                return;
            } else {
                val.push(c);
            }
        }
        self.error("unterminated string literal");
    }

    /// `[...]` segment; `\]` escapes a closing bracket. Brackets are kept.
    fn lex_literal_segment(&mut self) {
        let mut val = String::from("[");
        let mut chars = self.rest().char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some((_, ']')) | Some((_, '\\'))) => {
                    if let Some((_, escaped)) = chars.next() {
                        val.push(escaped);
                    }
                }
                ']' => {
                    val.push(']');
                    self.pos += i + 1;
                    self.emit_val(TokenKind::Id, val);
                    return;
                }
                _ => val.push(c),
            }
        }
        self.error("unterminated literal segment");
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                if matches!(token.kind, TokenKind::Eof | TokenKind::Error) {
                    self.done = true;
                    self.pending.clear();
                }
                return Some(token);
            }
            if self.done {
                return None;
            }
            self.step();
        }
    }
}

/// Length of `\s* ~? }}` at the start of `s`, if present.
fn standalone_inverse_len(s: &str) -> Option<usize> {
    let trimmed = s.trim_start();
    let mut len = s.len() - trimmed.len();
    let mut tail = trimmed;
    if let Some(t) = tail.strip_prefix('~') {
        len += 1;
        tail = t;
    }
    tail.starts_with("}}").then_some(len + 2)
}

/// Length of `as \s+ |` at the start of `s`, if present.
fn block_params_len(s: &str) -> Option<usize> {
    let tail = s.strip_prefix("as")?;
    let trimmed = tail.trim_start();
    let ws = tail.len() - trimmed.len();
    (ws > 0 && trimmed.starts_with('|')).then_some(2 + ws + 1)
}

/// Length of `-?[0-9]+(\.[0-9]+)?` followed by a literal lookahead.
fn number_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == int_start {
        return None;
    }
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    match s[i..].chars().next() {
        None => Some(i),
        Some(c) if is_literal_lookahead(c) => Some(i),
        _ => None,
    }
}

fn boolean_len(s: &str) -> Option<usize> {
    ["true", "false"].iter().find_map(|lit| {
        let tail = s.strip_prefix(lit)?;
        match tail.chars().next() {
            None => Some(lit.len()),
            Some(c) if is_literal_lookahead(c) => Some(lit.len()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        scan(input).map(|t| t.kind).collect()
    }

    fn vals(input: &str) -> Vec<(TokenKind, std::string::String)> {
        scan(input).map(|t| (t.kind, t.val)).collect()
    }

    #[test]
    fn test_content_only() {
        assert_eq!(
            vals("hello world"),
            vec![(Content, "hello world".into()), (Eof, "".into())]
        );
        assert_eq!(kinds(""), vec![Eof]);
    }

    #[test]
    fn test_simple_mustache() {
        assert_eq!(
            vals("a {{foo}} b"),
            vec![
                (Content, "a ".into()),
                (Open, "{{".into()),
                (Id, "foo".into()),
                (Close, "}}".into()),
                (Content, " b".into()),
                (Eof, "".into()),
            ]
        );
    }

    #[test]
    fn test_paths_and_separators() {
        assert_eq!(
            kinds("{{../foo/bar.baz}}"),
            vec![Open, Id, Sep, Id, Sep, Id, Sep, Id, Close, Eof]
        );
        assert_eq!(kinds("{{.}}"), vec![Open, Id, Close, Eof]);
        assert_eq!(kinds("{{@index}}"), vec![Open, Data, Id, Close, Eof]);
        assert_eq!(
            vals("{{[foo bar].[b\\]z]}}")[1..4].to_vec(),
            vec![
                (Id, "[foo bar]".into()),
                (Sep, ".".into()),
                (Id, "[b]z]".into())
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            vals(r#"{{foo "a\"b" 'c' 12 -1.5 true false}}"#)[2..8].to_vec(),
            vec![
                (String, "a\"b".into()),
                (String, "c".into()),
                (Number, "12".into()),
                (Number, "-1.5".into()),
                (Boolean, "true".into()),
                (Boolean, "false".into()),
            ]
        );
        assert_eq!(kinds("{{truely}}"), vec![Open, Id, Close, Eof]);
    }

    #[test]
    fn test_block_tokens() {
        assert_eq!(
            kinds("{{#each items as |item i|}}x{{else}}y{{/each}}"),
            vec![
                OpenBlock,
                Id,
                Id,
                OpenBlockParams,
                Id,
                Id,
                CloseBlockParams,
                Close,
                Content,
                Inverse,
                Content,
                OpenEndBlock,
                Id,
                Close,
                Eof
            ]
        );
        assert_eq!(
            kinds("{{^foo}}{{^}}{{else if bar}}"),
            vec![OpenInverse, Id, Close, Inverse, OpenInverseChain, Id, Id, Close, Eof]
        );
    }

    #[test]
    fn test_else_prefix_is_identifier() {
        assert_eq!(
            vals("{{elsewhere}}")[1],
            (Id, "elsewhere".into())
        );
    }

    #[test]
    fn test_unescaped_and_partial() {
        assert_eq!(
            kinds("{{{foo}}}{{&bar}}{{> p ctx k=v}}"),
            vec![
                OpenUnescaped,
                Id,
                CloseUnescaped,
                Open,
                Id,
                Close,
                OpenPartial,
                Id,
                Id,
                Id,
                Equals,
                Id,
                Close,
                Eof
            ]
        );
    }

    #[test]
    fn test_numeric_path_segments() {
        assert_eq!(
            vals("{{items.0.name}}")[1..6].to_vec(),
            vec![
                (Id, "items".into()),
                (Sep, ".".into()),
                (Id, "0".into()),
                (Sep, ".".into()),
                (Id, "name".into()),
            ]
        );
        assert_eq!(vals("{{lookup xs 0}}")[3], (Number, "0".into()));
    }

    #[test]
    fn test_triple_stash_right_strip_forms() {
        assert_eq!(
            kinds("{{~{foo}~}}{{{bar~}}}"),
            vec![OpenUnescaped, Id, CloseUnescaped, OpenUnescaped, Id, CloseUnescaped, Eof]
        );
        assert_eq!(vals("{{~{foo}~}}")[2], (CloseUnescaped, "}~}}".into()));
    }

    #[test]
    fn test_strip_markers_kept_in_delimiters() {
        assert_eq!(
            vals("{{~#if a~}}")
                .into_iter()
                .map(|(_, v)| v)
                .collect::<Vec<_>>(),
            vec!["{{~#", "if", "a", "~}}", ""]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            vals("a{{! short }}b{{!-- long }} --}}c"),
            vec![
                (Content, "a".into()),
                (Comment, "{{! short }}".into()),
                (Content, "b".into()),
                (Comment, "{{!-- long }} --}}".into()),
                (Content, "c".into()),
                (Eof, "".into()),
            ]
        );
        assert_eq!(kinds("{{! open"), vec![Error]);
    }

    #[test]
    fn test_escaped_mustache() {
        assert_eq!(
            vals("\\{{foo}} {{bar}}"),
            vec![
                (Content, "{{foo}} ".into()),
                (Open, "{{".into()),
                (Id, "bar".into()),
                (Close, "}}".into()),
                (Eof, "".into()),
            ]
        );
        assert_eq!(
            vals("a\\\\{{foo}}")[0..3].to_vec(),
            vec![
                (Content, "a\\".into()),
                (Open, "{{".into()),
                (Id, "foo".into())
            ]
        );
    }

    #[test]
    fn test_raw_block() {
        assert_eq!(
            vals("{{{{raw}}}} {{x}} {{{{/raw}}}}"),
            vec![
                (OpenRawBlock, "{{{{".into()),
                (Id, "raw".into()),
                (CloseRawBlock, "}}}}".into()),
                (Content, " {{x}} ".into()),
                (OpenEndRawBlock, "{{{{/".into()),
                (Id, "raw".into()),
                (CloseRawBlock, "}}}}".into()),
                (Eof, "".into()),
            ]
        );
        assert_eq!(kinds("{{{{raw}}}} never closed").last(), Some(&Error));
    }

    #[test]
    fn test_sub_expression() {
        assert_eq!(
            kinds("{{foo (bar 1) x=(baz)}}"),
            vec![
                Open, Id, OpenSexpr, Id, Number, CloseSexpr, Id, Equals, OpenSexpr, Id,
                CloseSexpr, Close, Eof
            ]
        );
    }

    #[test]
    fn test_errors_stop_the_stream() {
        let tokens: Vec<Token> = scan("{{foo ; bar}}").collect();
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, Error);
        assert!(last.val.contains("';'"));
        assert_eq!(kinds("{{foo"), vec![Open, Id, Error]);
    }

    #[test]
    fn test_line_tracking() {
        let tokens: Vec<Token> = scan("a\nb\n{{foo}}").collect();
        assert_eq!(tokens[1].kind, Open);
        assert_eq!(tokens[1].line, 3);
        assert_eq!(tokens[1].pos, 4);
    }
}
