use crate::error::RenderError;
use crate::tpl::ast::{Loc, Program};
use crate::tpl::render::Evaluator;
use crate::tpl::render_context::{BlockParams, DataFrame, Frame, Scope};
use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Number of positional parameters a helper accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Any,
    Exact(usize),
    /// Inclusive bounds.
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, given: usize) -> bool {
        match *self {
            Arity::Any => true,
            Arity::Exact(n) => given == n,
            Arity::Range(min, max) => (min..=max).contains(&given),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Any => f.write_str("any number of"),
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Range(min, max) => write!(f, "{} to {}", min, max),
        }
    }
}

/// A function callable from a template.
///
/// The dispatcher checks [`HelperDef::arity`] before calling. Block
/// helpers render their body through [`Options::render_program`] and
/// friends and return the text, usually as [`Value::Safe`].
pub trait HelperDef: Send + Sync {
    fn arity(&self) -> Arity {
        Arity::Any
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError>;
}

impl<F> HelperDef for F
where
    F: Fn(&Options<'_>) -> Result<Value, RenderError> + Send + Sync,
{
    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        self(options)
    }
}

/// Context, private data and block params for one rendering of a helper's
/// body. Unset parts are inherited from the caller.
#[derive(Debug, Default)]
pub struct BlockContext<'v> {
    pub this: Option<&'v Value>,
    pub data: Vec<(String, Value)>,
    pub block_params: Vec<Cow<'v, Value>>,
}

impl<'v> BlockContext<'v> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn this(mut self, this: &'v Value) -> Self {
        self.this = Some(this);
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.push((key.into(), value.into()));
        self
    }

    pub fn block_param(mut self, value: Cow<'v, Value>) -> Self {
        self.block_params.push(value);
        self
    }
}

/// Arguments of one helper invocation.
pub struct Options<'a> {
    name: &'a str,
    params: Vec<Cow<'a, Value>>,
    hash: BTreeMap<String, Cow<'a, Value>>,
    program: Option<&'a Program>,
    inverse: Option<&'a Program>,
    frame: Frame<'a>,
    eval: &'a Evaluator<'a>,
    loc: Loc,
}

impl<'a> Options<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: &'a str,
        params: Vec<Cow<'a, Value>>,
        hash: BTreeMap<String, Cow<'a, Value>>,
        program: Option<&'a Program>,
        inverse: Option<&'a Program>,
        frame: Frame<'a>,
        eval: &'a Evaluator<'a>,
        loc: Loc,
    ) -> Self {
        Self {
            name,
            params,
            hash,
            program,
            inverse,
            frame,
            eval,
            loc,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index).map(|v| v.as_ref())
    }

    pub fn params(&self) -> impl Iterator<Item = &Value> {
        self.params.iter().map(|v| v.as_ref())
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn hash(&self, key: &str) -> Option<&Value> {
        self.hash.get(key).map(|v| v.as_ref())
    }

    pub fn hash_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.hash.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Current context value.
    pub fn this(&self) -> &Value {
        self.frame.scope.this
    }

    /// Private `@data` variable in the current frame.
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.frame.data.get(key)
    }

    /// Names declared with `as |...|` on the block.
    pub fn block_params(&self) -> &[String] {
        self.program
            .map(|p| p.block_params.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_block(&self) -> bool {
        self.program.is_some() || self.inverse.is_some()
    }

    /// Source position of the call.
    pub fn loc(&self) -> Loc {
        self.loc
    }

    /// Renders the block body against the current context.
    pub fn render_program(&self) -> Result<String, RenderError> {
        self.render_with(self.program, BlockContext::default())
    }

    pub fn render_program_with(&self, ctx: BlockContext<'_>) -> Result<String, RenderError> {
        self.render_with(self.program, ctx)
    }

    /// Renders the `{{else}}` body against the current context.
    pub fn render_inverse(&self) -> Result<String, RenderError> {
        self.render_with(self.inverse, BlockContext::default())
    }

    pub fn render_inverse_with(&self, ctx: BlockContext<'_>) -> Result<String, RenderError> {
        self.render_with(self.inverse, ctx)
    }

    fn render_with(
        &self,
        program: Option<&Program>,
        ctx: BlockContext<'_>,
    ) -> Result<String, RenderError> {
        let Some(program) = program else {
            return Ok(String::new());
        };

        let pushed;
        let scope = match ctx.this {
            Some(this) => {
                pushed = Scope::child(this, self.frame.scope);
                &pushed
            }
            None => self.frame.scope,
        };
        let derived;
        let data = if ctx.data.is_empty() {
            self.frame.data
        } else {
            derived = DataFrame::child(self.frame.data, ctx.data);
            &derived
        };
        let bound;
        let params = if program.block_params.is_empty() {
            self.frame.params
        } else {
            bound = BlockParams::bind(&program.block_params, ctx.block_params, self.frame.params);
            Some(&bound)
        };

        let frame = Frame {
            scope,
            data,
            params,
        };
        let mut out = String::new();
        self.eval.render_program(program, &frame, &mut out)?;
        Ok(out)
    }
}

/// `{{#if cond}}`; `includeZero=true` treats `0` as true.
pub struct IfHelper;

impl HelperDef for IfHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let out = if condition(options) {
            options.render_program()?
        } else {
            options.render_inverse()?
        };
        Ok(Value::Safe(out))
    }
}

pub struct UnlessHelper;

impl HelperDef for UnlessHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let out = if condition(options) {
            options.render_inverse()?
        } else {
            options.render_program()?
        };
        Ok(Value::Safe(out))
    }
}

fn condition(options: &Options<'_>) -> bool {
    let include_zero = options
        .hash("includeZero")
        .is_some_and(|v| v.is_truthy(false));
    options
        .param(0)
        .is_some_and(|v| v.is_truthy(include_zero))
}

/// `{{#with value as |v|}}`
pub struct WithHelper;

impl HelperDef for WithHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let out = match options.param(0) {
            Some(target) if condition(options) => options.render_program_with(
                BlockContext::new()
                    .this(target)
                    .block_param(Cow::Borrowed(target)),
            )?,
            _ => options.render_inverse()?,
        };
        Ok(Value::Safe(out))
    }
}

/// `{{#each items as |item index|}}`
pub struct EachHelper;

impl HelperDef for EachHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let out = match options.param(0) {
            Some(target) => iterate(options, target)?,
            None => options.render_inverse()?,
        };
        Ok(Value::Safe(out))
    }
}

/// Renders the body once per list item or map entry, binding `@index`,
/// `@key`, `@first` and `@last`. Empty and non-iterable values render the
/// inverse.
pub(crate) fn iterate(options: &Options<'_>, target: &Value) -> Result<String, RenderError> {
    let mut out = String::new();
    match target {
        Value::List(items) if !items.is_empty() => {
            let last = items.len() - 1;
            for (i, item) in items.iter().enumerate() {
                let ctx = BlockContext::new()
                    .this(item)
                    .data("index", i)
                    .data("key", i)
                    .data("first", i == 0)
                    .data("last", i == last)
                    .block_param(Cow::Borrowed(item))
                    .block_param(Cow::Owned(Value::from(i)));
                out.push_str(&options.render_program_with(ctx)?);
            }
        }
        Value::Map(entries) if !entries.is_empty() => {
            let last = entries.len() - 1;
            for (i, (key, item)) in entries.iter().enumerate() {
                let ctx = BlockContext::new()
                    .this(item)
                    .data("index", i)
                    .data("key", key.as_str())
                    .data("first", i == 0)
                    .data("last", i == last)
                    .block_param(Cow::Borrowed(item))
                    .block_param(Cow::Owned(Value::from(key.as_str())));
                out.push_str(&options.render_program_with(ctx)?);
            }
        }
        _ => out = options.render_inverse()?,
    }
    Ok(out)
}

/// Body of a block whose name is not a helper: lists iterate, `true`
/// keeps the context, other truthy values become the context.
pub(crate) fn section(options: &Options<'_>, value: &Value) -> Result<String, RenderError> {
    match value {
        Value::List(_) => iterate(options, value),
        Value::Bool(true) => options.render_program(),
        v if v.is_truthy(false) => options.render_program_with(BlockContext::new().this(v)),
        _ => options.render_inverse(),
    }
}

/// `{{lookup obj key}}`
pub struct LookupHelper;

impl HelperDef for LookupHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let (Some(target), Some(key)) = (options.param(0), options.param(1)) else {
            return Ok(Value::Null);
        };
        let key = key.to_string();
        Ok(target
            .field(&key)
            .map(Cow::into_owned)
            .unwrap_or_default())
    }
}

/// `{{log "message" value level="warn"}}`
pub struct LogHelper;

impl HelperDef for LogHelper {
    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let message = options
            .params()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let level = options
            .hash("level")
            .map(|v| match v.as_f64() {
                Some(n) => match n as i64 {
                    0 => "debug".to_string(),
                    1 => "info".to_string(),
                    2 => "warn".to_string(),
                    _ => "error".to_string(),
                },
                None => v.to_string().to_ascii_lowercase(),
            })
            .unwrap_or_default();
        match level.as_str() {
            "debug" => debug!(target: "ubars::log", "{}", message),
            "warn" => warn!(target: "ubars::log", "{}", message),
            "error" => error!(target: "ubars::log", "{}", message),
            _ => info!(target: "ubars::log", "{}", message),
        }
        Ok(Value::Null)
    }
}

/// `{{#equal a b}}`; inline form returns a boolean.
pub struct EqualHelper;

impl HelperDef for EqualHelper {
    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn call(&self, options: &Options<'_>) -> Result<Value, RenderError> {
        let equal = match (options.param(0), options.param(1)) {
            (Some(a), Some(b)) => loosely_equal(a, b),
            _ => false,
        };
        if !options.is_block() {
            return Ok(Value::Bool(equal));
        }
        let out = if equal {
            options.render_program()?
        } else {
            options.render_inverse()?
        };
        Ok(Value::Safe(out))
    }
}

/// Numbers compare by value across integer and float, strings compare
/// regardless of safe marking.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return x == y;
    }
    a == b
}

pub(crate) fn builtins() -> Vec<(&'static str, Arc<dyn HelperDef>)> {
    let helpers: [(&'static str, Arc<dyn HelperDef>); 7] = [
        ("if", Arc::new(IfHelper)),
        ("unless", Arc::new(UnlessHelper)),
        ("with", Arc::new(WithHelper)),
        ("each", Arc::new(EachHelper)),
        ("lookup", Arc::new(LookupHelper)),
        ("log", Arc::new(LogHelper)),
        ("equal", Arc::new(EqualHelper)),
    ];
    helpers.into()
}
