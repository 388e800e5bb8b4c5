use crate::error::RenderError;
use crate::models::options::RenderOptions;
use crate::registry::Registry;
use crate::tpl::ast::*;
use crate::tpl::escape::push_escaped;
use crate::tpl::helpers::{self, HelperDef, Options};
use crate::tpl::render_context::{DataFrame, Frame, Scope};
use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::trace;

/// Walks a compiled program against data, writing text output.
pub(crate) struct Evaluator<'r> {
    registry: &'r Registry,
    options: RenderOptions,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: registry.options().render,
        }
    }

    pub fn render(
        &self,
        program: &Program,
        root: &Value,
        data: BTreeMap<String, Value>,
    ) -> Result<String, RenderError> {
        let scope = Scope::new(root);
        let data = DataFrame::new(data);
        let frame = Frame {
            scope: &scope,
            data: &data,
            params: None,
        };
        let mut out = String::new();
        self.render_program(program, &frame, &mut out)?;
        Ok(out)
    }

    pub(crate) fn render_program(
        &self,
        program: &Program,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in &program.body {
            match node {
                Node::Content(content) => out.push_str(&content.value),
                Node::Comment(_) => {}
                Node::Mustache(mustache) => self.render_mustache(mustache, frame, out)?,
                Node::Block(block) => self.render_block(block, frame, out)?,
                Node::Partial(partial) => self.render_partial(partial, frame, out)?,
            }
        }
        Ok(())
    }

    fn render_mustache(
        &self,
        mustache: &MustacheStatement,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let (value, from_helper) = self.eval_expression(&mustache.expression, frame)?;
        if from_helper && !value.is_renderable() {
            return Err(return_type_error(&mustache.expression));
        }
        let raw = mustache.unescaped || self.options.no_escape;
        match value.as_ref() {
            Value::Safe(s) => out.push_str(s),
            Value::Str(s) if raw => out.push_str(s),
            Value::Str(s) => push_escaped(out, s),
            other if raw => out.push_str(&other.to_string()),
            other => push_escaped(out, &other.to_string()),
        }
        Ok(())
    }

    fn render_block(
        &self,
        block: &BlockStatement,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let expr = &block.expression;
        if let Some(name) = expr.helper_name() {
            if let Some(helper) = self.registry.helper(name) {
                let value = self.call_helper(name, helper.as_ref(), expr, Some(block), frame)?;
                return write_block_result(expr, value, out);
            }
        }

        if block.raw {
            if let Some(program) = &block.program {
                self.render_program(program, frame, out)?;
            }
            return Ok(());
        }

        let value = self.resolve_callee(expr, frame)?;
        if let Value::Func(func) = value.as_ref() {
            let helper = func.0.clone();
            let result = self.call_helper(expr.name(), helper.as_ref(), expr, Some(block), frame)?;
            return write_block_result(expr, result, out);
        }
        if expr.has_arguments() {
            return Err(missing_helper(expr));
        }

        let options = Options::new(
            expr.name(),
            Vec::new(),
            BTreeMap::new(),
            block.program.as_ref(),
            block.inverse.as_ref(),
            *frame,
            self,
            expr.loc,
        );
        out.push_str(&helpers::section(&options, value.as_ref())?);
        Ok(())
    }

    fn render_partial(
        &self,
        partial: &PartialStatement,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let loc = partial.loc;
        if partial.params.len() > 1 {
            return Err(RenderError::InvalidPartialParams {
                pos: loc.pos,
                line: loc.line,
            });
        }

        let name: Cow<'_, str> = match &partial.name {
            Param::SubExpression(sub) => {
                let (value, _) = self.eval_expression(&sub.expression, frame)?;
                Cow::Owned(value.to_string())
            }
            Param::String(s) => Cow::Borrowed(s.value.as_str()),
            other => Cow::Borrowed(other.original()),
        };
        let Some(program) = self.registry.partial(&name)? else {
            return Err(RenderError::PartialNotFound {
                name: name.into_owned(),
                pos: loc.pos,
                line: loc.line,
            });
        };
        trace!("render partial: name={}, line={}", name, loc.line);

        let context = match partial.params.first() {
            Some(param) => Some(self.param_value(param, frame)?),
            None => None,
        };
        let hash = self.hash_values(partial.hash.as_ref(), frame)?;

        let overlay;
        let this = if hash.is_empty() {
            context.as_deref()
        } else {
            let base = context.as_deref().unwrap_or(frame.scope.this);
            overlay = overlay_hash(base, &hash);
            Some(&overlay)
        };
        let pushed;
        let scope = match this {
            Some(value) => {
                pushed = Scope::child(value, frame.scope);
                &pushed
            }
            None => frame.scope,
        };
        let derived;
        let data = if hash.is_empty() {
            frame.data
        } else {
            let vars = hash.iter().map(|(k, v)| (k.clone(), v.as_ref().clone()));
            derived = DataFrame::child(frame.data, vars);
            &derived
        };
        let partial_frame = Frame {
            scope,
            data,
            params: None,
        };

        if partial.indent.is_empty() || self.options.prevent_indent {
            return self.render_program(&program, &partial_frame, out);
        }
        let mut rendered = String::new();
        self.render_program(&program, &partial_frame, &mut rendered)?;
        push_indented(out, &rendered, &partial.indent);
        Ok(())
    }

    /// Evaluates a mustache or sub-expression. The flag reports whether a
    /// helper produced the value.
    fn eval_expression<'a>(
        &self,
        expr: &'a Expression,
        frame: &Frame<'a>,
    ) -> Result<(Cow<'a, Value>, bool), RenderError> {
        if let Some(name) = expr.helper_name() {
            if let Some(helper) = self.registry.helper(name) {
                let value = self.call_helper(name, helper.as_ref(), expr, None, frame)?;
                return Ok((Cow::Owned(value), true));
            }
        }

        let value = self.resolve_callee(expr, frame)?;
        if let Value::Func(func) = value.as_ref() {
            let helper = func.0.clone();
            let result = self.call_helper(expr.name(), helper.as_ref(), expr, None, frame)?;
            return Ok((Cow::Owned(result), true));
        }
        if expr.has_arguments() {
            return Err(missing_helper(expr));
        }
        Ok((value, false))
    }

    /// Looks up the value an expression's callee names. Literal names are
    /// single-segment lookups on the current context.
    fn resolve_callee<'a>(
        &self,
        expr: &'a Expression,
        frame: &Frame<'a>,
    ) -> Result<Cow<'a, Value>, RenderError> {
        let this = Cow::Borrowed(frame.scope.this);
        Ok(match &expr.path {
            Param::Path(path) => self.resolve_path(path, frame),
            Param::SubExpression(sub) => self.eval_expression(&sub.expression, frame)?.0,
            Param::String(s) => walk(this, std::slice::from_ref(&s.value)),
            Param::Number(NumberLiteral { original, .. })
            | Param::Boolean(BooleanLiteral { original, .. }) => {
                walk(this, std::slice::from_ref(original))
            }
        })
    }

    fn call_helper<'a>(
        &'a self,
        name: &'a str,
        helper: &dyn HelperDef,
        expr: &'a Expression,
        block: Option<&'a BlockStatement>,
        frame: &Frame<'a>,
    ) -> Result<Value, RenderError> {
        let arity = helper.arity();
        if !arity.accepts(expr.params.len()) {
            return Err(RenderError::Arity {
                name: name.to_string(),
                given: expr.params.len(),
                expected: arity.to_string(),
                pos: expr.loc.pos,
                line: expr.loc.line,
            });
        }
        let params = expr
            .params
            .iter()
            .map(|param| self.param_value(param, frame))
            .collect::<Result<Vec<_>, _>>()?;
        let hash = self.hash_values(expr.hash.as_ref(), frame)?;
        let options = Options::new(
            name,
            params,
            hash,
            block.and_then(|b| b.program.as_ref()),
            block.and_then(|b| b.inverse.as_ref()),
            *frame,
            self,
            expr.loc,
        );
        helper.call(&options)
    }

    fn param_value<'a>(
        &self,
        param: &'a Param,
        frame: &Frame<'a>,
    ) -> Result<Cow<'a, Value>, RenderError> {
        Ok(match param {
            Param::Path(path) => self.resolve_path(path, frame),
            Param::SubExpression(sub) => self.eval_expression(&sub.expression, frame)?.0,
            Param::String(s) => Cow::Owned(Value::Str(s.value.clone())),
            Param::Number(n) => Cow::Owned(match n.value {
                Number::Int(i) => Value::I64(i),
                Number::Float(f) => Value::F64(f),
            }),
            Param::Boolean(b) => Cow::Owned(Value::Bool(b.value)),
        })
    }

    fn hash_values<'a>(
        &self,
        hash: Option<&'a Hash>,
        frame: &Frame<'a>,
    ) -> Result<BTreeMap<String, Cow<'a, Value>>, RenderError> {
        let mut values = BTreeMap::new();
        if let Some(hash) = hash {
            for pair in &hash.pairs {
                values.insert(pair.key.clone(), self.param_value(&pair.value, frame)?);
            }
        }
        Ok(values)
    }

    pub(crate) fn resolve_path<'a>(
        &self,
        path: &PathExpression,
        frame: &Frame<'a>,
    ) -> Cow<'a, Value> {
        if path.data {
            return resolve_data(path, frame);
        }
        if path.depth == 0 && !path.is_scoped() {
            if let (Some((first, rest)), Some(params)) = (path.parts.split_first(), frame.params) {
                if let Some(bound) = params.get(first) {
                    return walk(Cow::Borrowed(bound.as_ref()), rest);
                }
            }
        }
        match frame.scope.ancestor(path.depth) {
            Some(scope) => walk(Cow::Borrowed(scope.this), &path.parts),
            None => Cow::Owned(Value::Null),
        }
    }
}

/// `@name`, `@../name` and `@root`.
fn resolve_data<'a>(path: &PathExpression, frame: &Frame<'a>) -> Cow<'a, Value> {
    let Some((first, rest)) = path.parts.split_first() else {
        return Cow::Owned(Value::Null);
    };
    let Some(data) = frame.data.ancestor(path.depth) else {
        return Cow::Owned(Value::Null);
    };
    let start = match data.get(first) {
        Some(value) => Cow::Borrowed(value),
        None if first == "root" => Cow::Borrowed(frame.scope.root()),
        None => return Cow::Owned(Value::Null),
    };
    walk(start, rest)
}

/// Resolves `parts` one segment at a time; a missing segment yields null.
fn walk<'a>(start: Cow<'a, Value>, parts: &[String]) -> Cow<'a, Value> {
    let mut current = start;
    for part in parts {
        let next = match current {
            Cow::Borrowed(value) => value.field(part),
            Cow::Owned(value) => value.field(part).map(|v| Cow::Owned(v.into_owned())),
        };
        match next {
            Some(value) => current = value,
            None => return Cow::Owned(Value::Null),
        }
    }
    current
}

/// Context of a partial called with hash arguments.
fn overlay_hash(base: &Value, hash: &BTreeMap<String, Cow<'_, Value>>) -> Value {
    let mut map = match base {
        Value::Map(map) => map.clone(),
        Value::Null => BTreeMap::new(),
        other => return other.clone(),
    };
    for (key, value) in hash {
        map.insert(key.clone(), value.as_ref().clone());
    }
    Value::Map(map)
}

/// Prefixes every line with `indent`, except an empty last line.
fn push_indented(out: &mut String, text: &str, indent: &str) {
    let lines: Vec<&str> = text.split('\n').collect();
    let count = lines.len();
    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !(line.is_empty() && i + 1 == count) {
            out.push_str(indent);
        }
        out.push_str(line);
    }
}

fn write_block_result(expr: &Expression, value: Value, out: &mut String) -> Result<(), RenderError> {
    match value {
        Value::Safe(s) | Value::Str(s) => out.push_str(&s),
        Value::Null => {}
        other if other.is_renderable() => out.push_str(&other.to_string()),
        _ => return Err(return_type_error(expr)),
    }
    Ok(())
}

fn return_type_error(expr: &Expression) -> RenderError {
    RenderError::HelperReturnType {
        name: expr.name().to_string(),
        pos: expr.loc.pos,
        line: expr.loc.line,
    }
}

fn missing_helper(expr: &Expression) -> RenderError {
    RenderError::MissingHelper {
        name: expr.name().to_string(),
        pos: expr.loc.pos,
        line: expr.loc.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_indented() {
        let mut out = String::new();
        push_indented(&mut out, "a\nb\n", "  ");
        assert_eq!(out, "  a\n  b\n");

        let mut out = String::new();
        push_indented(&mut out, "a\n\nb", "> ");
        assert_eq!(out, "> a\n> \n> b");
    }

    #[test]
    fn test_walk_missing_segment_is_null() {
        let value = Value::from(vec![Value::from("x")]);
        assert_eq!(walk(Cow::Borrowed(&value), &["0".to_string()]).as_ref(), &Value::from("x"));
        assert_eq!(
            walk(Cow::Borrowed(&value), &["nope".to_string(), "deeper".to_string()]).as_ref(),
            &Value::Null
        );
    }

    #[test]
    fn test_overlay_hash() {
        let mut base = BTreeMap::new();
        base.insert("a".to_string(), Value::from(1));
        base.insert("b".to_string(), Value::from(2));
        let mut hash = BTreeMap::new();
        hash.insert("b".to_string(), Cow::Owned(Value::from("two")));

        let merged = overlay_hash(&Value::Map(base), &hash);
        assert_eq!(merged.field("a").unwrap().as_ref(), &Value::from(1));
        assert_eq!(merged.field("b").unwrap().as_ref(), &Value::from("two"));
        assert_eq!(overlay_hash(&Value::from("s"), &hash), Value::from("s"));
    }
}
