use crate::models::options::CompileOptions;
use crate::tpl::ast::*;

/// Trims content around `~` markers and standalone tags, in place.
///
/// Standalone detection always reads `ContentStatement::original`, so
/// running the pass again over its own output changes nothing.
pub fn normalize(program: &mut Program, options: &CompileOptions) {
    let mut control = WhitespaceControl {
        ignore_standalone: options.ignore_standalone,
        root_seen: false,
    };
    control.program(program);
}

/// What a statement asks of its neighbours.
#[derive(Debug, Default, Clone, Copy)]
struct StripInfo {
    open: bool,
    close: bool,
    open_standalone: bool,
    close_standalone: bool,
    inline_standalone: bool,
}

struct WhitespaceControl {
    ignore_standalone: bool,
    root_seen: bool,
}

impl WhitespaceControl {
    fn program(&mut self, program: &mut Program) {
        let do_standalone = !self.ignore_standalone;
        let is_root = !self.root_seen;
        self.root_seen = true;

        let body = &mut program.body;
        for i in 0..body.len() {
            let Some(strip) = self.accept(&mut body[i]) else {
                continue;
            };

            let prev_ws = is_prev_whitespace(body, Some(i), is_root);
            let next_ws = is_next_whitespace(body, Some(i), is_root);
            let open_standalone = strip.open_standalone && prev_ws;
            let close_standalone = strip.close_standalone && next_ws;
            let inline_standalone = strip.inline_standalone && prev_ws && next_ws;

            if strip.close {
                omit_right(body, Some(i), true);
            }
            if strip.open {
                omit_left(body, Some(i), true);
            }

            if do_standalone && inline_standalone {
                omit_right(body, Some(i), false);
                if omit_left(body, Some(i), false) {
                    let indent = match &body[i - 1] {
                        Node::Content(prev) => trailing_blanks(&prev.original).to_string(),
                        _ => String::new(),
                    };
                    if let Node::Partial(partial) = &mut body[i] {
                        partial.indent = indent;
                    }
                }
            }
            if do_standalone && open_standalone {
                if let Node::Block(block) = &mut body[i] {
                    if let Some(inner) = block.program.as_mut().or(block.inverse.as_mut()) {
                        omit_right(&mut inner.body, None, false);
                    }
                }
                omit_left(body, Some(i), false);
            }
            if do_standalone && close_standalone {
                omit_right(body, Some(i), false);
                if let Node::Block(block) = &mut body[i] {
                    if let Some(last) = closing_program(block) {
                        omit_left(&mut last.body, None, false);
                    }
                }
            }
        }
    }

    fn accept(&mut self, node: &mut Node) -> Option<StripInfo> {
        match node {
            Node::Content(_) => None,
            Node::Mustache(m) => Some(StripInfo {
                open: m.strip.open,
                close: m.strip.close,
                ..StripInfo::default()
            }),
            Node::Partial(PartialStatement { strip, .. })
            | Node::Comment(CommentStatement { strip, .. }) => Some(StripInfo {
                open: strip.open,
                close: strip.close,
                inline_standalone: true,
                ..StripInfo::default()
            }),
            Node::Block(block) => self.block(block),
        }
    }

    fn block(&mut self, block: &mut BlockStatement) -> Option<StripInfo> {
        // raw block bodies are literal text
        if block.raw {
            return None;
        }
        if let Some(program) = block.program.as_mut() {
            self.program(program);
        }
        if let Some(inverse) = block.inverse.as_mut() {
            self.program(inverse);
        }

        let has_inverse = block.program.is_some() && block.inverse.is_some();
        let open_standalone = block
            .program
            .as_ref()
            .or(block.inverse.as_ref())
            .is_some_and(|p| is_next_whitespace(&p.body, None, false));
        let close_standalone = closing_program(block)
            .is_some_and(|p| is_prev_whitespace(&p.body, None, false));
        let strip = StripInfo {
            open: block.open_strip.open,
            close: block.close_strip.close,
            open_standalone,
            close_standalone,
            inline_standalone: false,
        };

        if block.open_strip.close {
            if let Some(main) = block.program.as_mut().or(block.inverse.as_mut()) {
                omit_right(&mut main.body, None, true);
            }
        }

        if has_inverse {
            let inverse_strip = block.inverse_strip;
            if inverse_strip.open {
                if let Some(program) = block.program.as_mut() {
                    omit_left(&mut program.body, None, true);
                }
            }
            if inverse_strip.close {
                if let Some(first) = block.inverse.as_mut().and_then(first_inverse) {
                    omit_right(&mut first.body, None, true);
                }
            }
            if block.close_strip.open {
                if let Some(last) = closing_program(block) {
                    omit_left(&mut last.body, None, true);
                }
            }

            // standalone {{else}}
            let else_standalone = !self.ignore_standalone
                && block
                    .program
                    .as_ref()
                    .is_some_and(|p| is_prev_whitespace(&p.body, None, false))
                && block
                    .inverse
                    .as_mut()
                    .and_then(first_inverse)
                    .is_some_and(|p| is_next_whitespace(&p.body, None, false));
            if else_standalone {
                if let Some(program) = block.program.as_mut() {
                    omit_left(&mut program.body, None, false);
                }
                if let Some(first) = block.inverse.as_mut().and_then(first_inverse) {
                    omit_right(&mut first.body, None, false);
                }
            }
        } else if block.close_strip.open {
            if let Some(main) = block.program.as_mut().or(block.inverse.as_mut()) {
                omit_left(&mut main.body, None, true);
            }
        }

        Some(strip)
    }
}

/// Program that starts right after a block's `{{else}}` tag.
fn first_inverse(inverse: &mut Program) -> Option<&mut Program> {
    if !inverse.chained {
        return Some(inverse);
    }
    match inverse.body.first_mut() {
        Some(Node::Block(chained)) => chained.program.as_mut(),
        _ => None,
    }
}

/// Program whose end is followed by the block's closing tag.
fn closing_program(block: &mut BlockStatement) -> Option<&mut Program> {
    let chained = block.program.is_some() && block.inverse.as_ref().is_some_and(|p| p.chained);
    if chained {
        return match block.inverse.as_mut()?.body.last_mut() {
            Some(Node::Block(chained)) => closing_program(chained),
            _ => None,
        };
    }
    match (&mut block.program, &mut block.inverse) {
        (Some(_), Some(inverse)) => Some(inverse),
        (Some(program), None) | (None, Some(program)) => Some(program),
        (None, None) => None,
    }
}

fn trailing_blanks(s: &str) -> &str {
    let trimmed = s.trim_end_matches([' ', '\t']);
    &s[trimmed.len()..]
}

/// Whether the trailing whitespace run of `s` contains a line break.
fn ends_with_line_break(s: &str) -> bool {
    s[s.trim_end().len()..].contains('\n')
}

/// Whether the leading whitespace run of `s` contains a line break.
fn starts_with_line_break(s: &str) -> bool {
    s[..s.len() - s.trim_start().len()].contains('\n')
}

/// True when the content before position `i` ends a line, or when there is
/// nothing before it in the root program.
fn is_prev_whitespace(body: &[Node], i: Option<usize>, is_root: bool) -> bool {
    let i = i.unwrap_or(body.len());
    if i == 0 {
        return is_root;
    }
    let has_sibling = i >= 2;
    match &body[i - 1] {
        Node::Content(prev) if has_sibling || !is_root => ends_with_line_break(&prev.original),
        Node::Content(prev) => {
            prev.original.trim().is_empty() || ends_with_line_break(&prev.original)
        }
        _ => false,
    }
}

/// True when the content after position `i` starts with a line break, or
/// when there is nothing after it in the root program.
fn is_next_whitespace(body: &[Node], i: Option<usize>, is_root: bool) -> bool {
    let idx = i.map_or(0, |i| i + 1);
    if idx >= body.len() {
        return is_root;
    }
    let has_sibling = idx + 1 < body.len();
    match &body[idx] {
        Node::Content(next) if has_sibling || !is_root => starts_with_line_break(&next.original),
        Node::Content(next) => {
            next.original.trim().is_empty() || starts_with_line_break(&next.original)
        }
        _ => false,
    }
}

/// Strips leading whitespace from the content after position `i`.
///
/// `multiple` removes every whitespace character; otherwise only blanks up
/// to and including the first line break go, and only once per node.
fn omit_right(body: &mut [Node], i: Option<usize>, multiple: bool) -> bool {
    let idx = i.map_or(0, |i| i + 1);
    let Some(Node::Content(current)) = body.get_mut(idx) else {
        return false;
    };
    if !multiple && current.right_stripped {
        return false;
    }
    let stripped = if multiple {
        current.value.trim_start()
    } else {
        let rest = current.value.trim_start_matches([' ', '\t']);
        let rest = rest.strip_prefix('\r').filter(|r| r.starts_with('\n')).unwrap_or(rest);
        rest.strip_prefix('\n').unwrap_or(rest)
    };
    let changed = stripped.len() != current.value.len();
    current.value = stripped.to_string();
    current.right_stripped |= changed;
    changed
}

/// Strips trailing whitespace from the content before position `i`.
fn omit_left(body: &mut [Node], i: Option<usize>, multiple: bool) -> bool {
    let idx = match i {
        None if body.is_empty() => return false,
        None => body.len() - 1,
        Some(0) => return false,
        Some(i) => i - 1,
    };
    let Some(Node::Content(current)) = body.get_mut(idx) else {
        return false;
    };
    if !multiple && current.left_stripped {
        return false;
    }
    let stripped = if multiple {
        current.value.trim_end()
    } else {
        current.value.trim_end_matches([' ', '\t'])
    };
    let changed = stripped.len() != current.value.len();
    current.value = stripped.to_string();
    current.left_stripped |= changed;
    changed
}
