pub mod serializer;

use crate::tpl::helpers::HelperDef;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub use serializer::to_value;

/// Dynamic data a template is rendered against.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    /// A string that is already HTML-escaped and is written verbatim.
    Safe(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A helper placed directly in the data; invoked when referenced.
    Func(Func),
}

/// Callable data value.
#[derive(Clone)]
pub struct Func(pub Arc<dyn HelperDef>);

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Func")
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    pub fn safe(s: impl Into<String>) -> Self {
        Value::Safe(s.into())
    }

    pub fn func(helper: impl HelperDef + 'static) -> Self {
        Value::Func(Func(Arc::new(helper)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Value::I64(v) => *v == 0,
            Value::U64(v) => *v == 0,
            Value::F64(v) => *v == 0.0,
            _ => false,
        }
    }

    /// Template truthiness: empty strings, `false`, zero, null and empty
    /// composites are falsy. `include_zero` makes numeric zero truthy.
    pub fn is_truthy(&self, include_zero: bool) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I64(_) | Value::U64(_) | Value::F64(_) => include_zero || !self.is_zero(),
            Value::Str(s) | Value::Safe(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Func(_) => true,
        }
    }

    /// Whether a helper may return this value into the output stream.
    pub fn is_renderable(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_) | Value::Func(_))
    }

    /// Resolves one path segment against this value.
    ///
    /// Maps try the exact key, then a camel-case alias (`first_name` and
    /// `first-name` find `firstName`), then an ASCII case-insensitive match.
    /// Lists accept numeric indexes and `length`.
    pub fn field(&self, key: &str) -> Option<Cow<'_, Value>> {
        match self {
            Value::Map(m) => {
                if let Some(v) = m.get(key) {
                    return Some(Cow::Borrowed(v));
                }
                let alias = camel_key(key);
                if let Some((_, v)) = m.iter().find(|(k, _)| camel_key(k) == alias) {
                    return Some(Cow::Borrowed(v));
                }
                m.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| Cow::Borrowed(v))
            }
            Value::List(l) => {
                if key == "length" {
                    return Some(Cow::Owned(Value::U64(l.len() as u64)));
                }
                key.parse::<usize>().ok().and_then(|i| l.get(i)).map(Cow::Borrowed)
            }
            Value::Str(s) | Value::Safe(s) if key == "length" => {
                Some(Cow::Owned(Value::U64(s.chars().count() as u64)))
            }
            _ => None,
        }
    }
}

/// `first_name` -> `firstName`. Case is otherwise preserved.
fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' || c == '-' {
            upper = !out.is_empty();
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Map(_) | Value::Func(_) => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) | Value::Safe(s) => f.write_str(s),
            Value::List(l) => l.iter().try_for_each(|v| write!(f, "{}", v)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

impl_from_int!(I64, i64, i8, i16, i32, i64, isize);
impl_from_int!(U64, u64, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F64(v as f64)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(v: HashMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy(false));
        assert!(!Value::from("").is_truthy(false));
        assert!(!Value::from(0).is_truthy(false));
        assert!(Value::from(0).is_truthy(true));
        assert!(!Value::F64(0.0).is_truthy(false));
        assert!(!Value::List(vec![]).is_truthy(false));
        assert!(!map(&[]).is_truthy(false));
        assert!(Value::from("x").is_truthy(false));
        assert!(Value::from(vec![1]).is_truthy(false));
        assert!(map(&[("a", Value::Null)]).is_truthy(false));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(12).to_string(), "12");
        assert_eq!(Value::F64(1.0).to_string(), "1");
        assert_eq!(Value::F64(1.25).to_string(), "1.25");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "ab");
        assert_eq!(map(&[("a", Value::from(1))]).to_string(), "");
    }

    #[test]
    fn test_field_resolution_order() {
        let v = map(&[
            ("firstName", Value::from("camel")),
            ("Title", Value::from("title")),
            ("exact", Value::from("exact")),
        ]);
        assert_eq!(v.field("exact").unwrap().as_ref(), &Value::from("exact"));
        assert_eq!(v.field("first_name").unwrap().as_ref(), &Value::from("camel"));
        assert_eq!(v.field("title").unwrap().as_ref(), &Value::from("title"));
        assert!(v.field("missing").is_none());
        assert!(Value::from(3).field("x").is_none());
    }

    #[test]
    fn test_alias_is_case_sensitive() {
        let v = map(&[
            ("FIRSTNAME", Value::from("upper")),
            ("firstName", Value::from("camel")),
            ("last_name", Value::from("snake")),
        ]);
        assert_eq!(v.field("first_name").unwrap().as_ref(), &Value::from("camel"));
        assert_eq!(v.field("first-name").unwrap().as_ref(), &Value::from("camel"));
        assert_eq!(v.field("lastName").unwrap().as_ref(), &Value::from("snake"));
        // only the case-insensitive step reaches these
        assert_eq!(v.field("firstname").unwrap().as_ref(), &Value::from("upper"));
        assert_eq!(v.field("LAST_NAME").unwrap().as_ref(), &Value::from("snake"));
    }

    #[test]
    fn test_list_fields() {
        let v = Value::from(vec!["a", "b"]);
        assert_eq!(v.field("1").unwrap().as_ref(), &Value::from("b"));
        assert_eq!(v.field("length").unwrap().into_owned(), Value::U64(2));
        assert!(v.field("9").is_none());
    }
}
