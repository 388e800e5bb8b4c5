use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// One frame of the context stack. `../` walks to `parent`.
#[derive(Debug)]
pub struct Scope<'a> {
    pub this: &'a Value,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { this: root, parent: None }
    }

    pub fn child(this: &'a Value, parent: &'a Scope<'a>) -> Self {
        Self {
            this,
            parent: Some(parent),
        }
    }

    /// Walks `depth` frames up; `None` when the stack is not that deep.
    pub fn ancestor(&self, depth: usize) -> Option<&Scope<'a>> {
        let mut scope = self;
        for _ in 0..depth {
            scope = scope.parent?;
        }
        Some(scope)
    }

    /// The value the render started with.
    pub fn root(&self) -> &'a Value {
        let mut scope = self;
        while let Some(parent) = scope.parent {
            scope = parent;
        }
        scope.this
    }
}

/// Private `@data` variables.
///
/// A child frame starts as a copy of its parent's variables; the parent
/// stays reachable for `@../name`.
#[derive(Debug, Default)]
pub struct DataFrame<'a> {
    vars: BTreeMap<String, Value>,
    parent: Option<&'a DataFrame<'a>>,
}

impl<'a> DataFrame<'a> {
    pub fn new(vars: BTreeMap<String, Value>) -> Self {
        Self { vars, parent: None }
    }

    pub fn child<K: Into<String>>(
        parent: &'a DataFrame<'a>,
        overrides: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let mut vars = parent.vars.clone();
        for (k, v) in overrides {
            vars.insert(k.into(), v);
        }
        Self {
            vars,
            parent: Some(parent),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn ancestor(&self, depth: usize) -> Option<&DataFrame<'a>> {
        let mut frame = self;
        for _ in 0..depth {
            frame = frame.parent?;
        }
        Some(frame)
    }
}

/// Names bound by `as |x y|`, innermost block first.
#[derive(Debug)]
pub struct BlockParams<'a> {
    bound: Vec<(String, Cow<'a, Value>)>,
    parent: Option<&'a BlockParams<'a>>,
}

impl<'a> BlockParams<'a> {
    /// Pairs declared names with the values a helper supplied. Names
    /// without a value are bound to null.
    pub fn bind(
        names: &[String],
        values: Vec<Cow<'a, Value>>,
        parent: Option<&'a BlockParams<'a>>,
    ) -> Self {
        let mut values = values.into_iter();
        let bound = names
            .iter()
            .map(|name| {
                let value = values.next().unwrap_or(Cow::Owned(Value::Null));
                (name.clone(), value)
            })
            .collect();
        Self { bound, parent }
    }

    pub fn get(&self, name: &str) -> Option<&Cow<'a, Value>> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if let Some((_, v)) = current.bound.iter().find(|(n, _)| n == name) {
                return Some(v);
            }
            frame = current.parent;
        }
        None
    }
}

/// Everything a program renders against.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub scope: &'a Scope<'a>,
    pub data: &'a DataFrame<'a>,
    pub params: Option<&'a BlockParams<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_ancestors() {
        let root = Value::from("root");
        let mid = Value::from("mid");
        let leaf = Value::from("leaf");
        let s0 = Scope::new(&root);
        let s1 = Scope::child(&mid, &s0);
        let s2 = Scope::child(&leaf, &s1);

        assert_eq!(s2.ancestor(0).unwrap().this, &leaf);
        assert_eq!(s2.ancestor(2).unwrap().this, &root);
        assert!(s2.ancestor(3).is_none());
        assert_eq!(s2.root(), &root);
    }

    #[test]
    fn test_data_frame_copies_parent() {
        let mut vars = BTreeMap::new();
        vars.insert("index".to_string(), Value::from(1));
        vars.insert("user".to_string(), Value::from("bob"));
        let parent = DataFrame::new(vars);
        let child = DataFrame::child(&parent, [("index", Value::from(7))]);

        assert_eq!(child.get("index"), Some(&Value::from(7)));
        assert_eq!(child.get("user"), Some(&Value::from("bob")));
        assert_eq!(child.ancestor(1).unwrap().get("index"), Some(&Value::from(1)));
        assert!(child.ancestor(2).is_none());
    }

    #[test]
    fn test_block_params_shadowing() {
        let outer_names = vec!["item".to_string(), "i".to_string()];
        let outer = BlockParams::bind(
            &outer_names,
            vec![Cow::Owned(Value::from("a")), Cow::Owned(Value::from(0))],
            None,
        );
        let inner_names = vec!["item".to_string()];
        let inner = BlockParams::bind(&inner_names, vec![Cow::Owned(Value::from("b"))], Some(&outer));

        assert_eq!(inner.get("item").unwrap().as_ref(), &Value::from("b"));
        assert_eq!(inner.get("i").unwrap().as_ref(), &Value::from(0));
        assert!(inner.get("missing").is_none());

        let unbound = BlockParams::bind(&outer_names, Vec::new(), None);
        assert_eq!(unbound.get("i").unwrap().as_ref(), &Value::Null);
    }
}
