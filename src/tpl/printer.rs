use crate::tpl::ast::*;

/// Renders a syntax tree as indented, human-readable text for diagnostics.
///
/// ```text
/// {{ PATH:foo [PATH:bar, "baz"] HASH{k=NUMBER{1}} }}
/// BLOCK:
///   PATH:if [PATH:cond]
///   PROGRAM:
///     CONTENT[ 'yes' ]
/// ```
pub fn print_ast(program: &Program) -> String {
    let mut printer = Printer {
        out: String::new(),
        padding: 0,
    };
    printer.program(program);
    printer.out
}

struct Printer {
    out: String,
    padding: usize,
}

impl Printer {
    fn pad(&mut self, line: &str) {
        for _ in 0..self.padding {
            self.out.push_str("  ");
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn program(&mut self, program: &Program) {
        if !program.block_params.is_empty() {
            let line = format!("BLOCK PARAMS: [ {} ]", program.block_params.join(" "));
            self.pad(&line);
        }
        for node in &program.body {
            self.node(node);
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Mustache(m) => {
                let line = format!("{{{{ {} }}}}", expression(&m.expression));
                self.pad(&line);
            }
            Node::Block(b) => self.block(b),
            Node::Partial(p) => {
                let mut content = format!("PARTIAL:{}", p.name.original());
                if let Some(param) = p.params.first() {
                    content.push(' ');
                    content.push_str(&param_text(param));
                }
                if let Some(hash) = &p.hash {
                    content.push(' ');
                    content.push_str(&hash_text(hash));
                }
                self.pad(&format!("{{{{> {} }}}}", content));
            }
            Node::Content(c) => self.pad(&format!("CONTENT[ '{}' ]", c.value)),
            Node::Comment(c) => self.pad(&format!("{{{{! '{}' }}}}", c.value)),
        }
    }

    fn block(&mut self, block: &BlockStatement) {
        self.pad("BLOCK:");
        self.padding += 1;
        self.pad(&expression(&block.expression));
        if let Some(program) = &block.program {
            self.pad("PROGRAM:");
            self.padding += 1;
            self.program(program);
            self.padding -= 1;
        }
        if let Some(inverse) = &block.inverse {
            if block.program.is_some() {
                self.padding += 1;
            }
            self.pad("{{^}}");
            self.padding += 1;
            self.program(inverse);
            self.padding -= 1;
            if block.program.is_some() {
                self.padding -= 1;
            }
        }
        self.padding -= 1;
    }
}

fn expression(expr: &Expression) -> String {
    let params: Vec<String> = expr.params.iter().map(param_text).collect();
    let mut out = format!("{} [{}]", param_text(&expr.path), params.join(", "));
    if let Some(hash) = &expr.hash {
        out.push(' ');
        out.push_str(&hash_text(hash));
    }
    out
}

fn param_text(param: &Param) -> String {
    match param {
        Param::Path(p) => {
            let sigil = if p.data { "@" } else { "" };
            if p.parts.is_empty() {
                return format!("{}PATH:this", sigil);
            }
            format!("{}PATH:{}", sigil, p.parts.join("/"))
        }
        Param::SubExpression(s) => expression(&s.expression),
        Param::String(s) => format!("\"{}\"", s.value),
        Param::Number(n) => format!("NUMBER{{{}}}", n.value),
        Param::Boolean(b) => format!("BOOLEAN{{{}}}", b.value),
    }
}

fn hash_text(hash: &Hash) -> String {
    let pairs: Vec<String> = hash
        .pairs
        .iter()
        .map(|pair| format!("{}={}", pair.key, param_text(&pair.value)))
        .collect();
    format!("HASH{{{}}}", pairs.join(", "))
}
