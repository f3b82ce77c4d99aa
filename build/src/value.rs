use std::{collections::BTreeMap, fmt::Display};

use crate::dependency::Dependency;

/// A product of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Text(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// Not a final product: resolve this dependency instead.
    Dependency(Dependency),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(ref s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(ref values) => Some(values),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(ref fields) => fields.get(name),
            _ => None,
        }
    }

    /// All text leaves in order, descending into lists.
    pub fn texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_texts(&mut out);
        out
    }

    fn collect_texts<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::Text(ref s) => out.push(s),
            Value::List(ref values) => {
                for v in values {
                    v.collect_texts(out);
                }
            }
            _ => {}
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Dependency(d) => write!(f, "<{}>", d),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(lines: Vec<String>) -> Self {
        Value::List(lines.into_iter().map(Value::Text).collect())
    }
}

impl From<Dependency> for Value {
    fn from(d: Dependency) -> Self {
        Value::Dependency(d)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn texts_descend_into_lists() {
        let v = Value::List(vec![
            "a".into(),
            Value::List(vec!["b".into(), Value::Nil, "c".into()]),
        ]);
        assert_eq!(v.texts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn display() {
        let mut fields = BTreeMap::new();
        fields.insert("os".to_owned(), Value::from("GNU/Linux"));
        fields.insert("machine".to_owned(), Value::from("x86_64"));
        let v = Value::List(vec![
            Value::Record(fields),
            Value::Nil,
            Value::Dependency(Dependency::target("all")),
        ]);
        assert_snapshot!(v.to_string(), @"[{machine=x86_64, os=GNU/Linux}, nil, <:all>]");
    }
}
