//! The [`Node`] typed value.
//!
//! Every entity property, every TQL binding entry, and every computed mapper
//! output is a [`Node`]. The variant tag is the type: no external schema is
//! needed to interpret a value, and the serde representation is plain JSON
//! (`null`, booleans, numbers, strings, arrays, objects).
//!
//! ## Paths
//!
//! Nested values are addressed with dot-separated paths such as
//! `sysField._spacePath`. Map segments select keys, numeric segments index
//! arrays. [`Node::set`] materialises missing intermediate maps.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// The kind of a [`Node`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Map,
}

impl Kind {
    /// Lower-case name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Map => "map",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arithmetic operators supported by [`Node::arith`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    /// The operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// A self-describing property value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

impl Node {
    /// An empty map node.
    #[must_use]
    pub fn map() -> Self {
        Node::Map(BTreeMap::new())
    }

    /// Returns the kind tag of this value.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Node::Null => Kind::Null,
            Node::Bool(_) => Kind::Bool,
            Node::Int(_) => Kind::Int,
            Node::Float(_) => Kind::Float,
            Node::String(_) => Kind::String,
            Node::Array(_) => Kind::Array,
            Node::Map(_) => Kind::Map,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Floats with no fractional part are accepted.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            Node::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Numeric view of ints and floats.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Int(i) => Some(*i as f64),
            Node::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Decode a JSON document into a node.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Json`] if the bytes are not valid JSON.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ValueError> {
        serde_json::from_slice(bytes).map_err(|e| ValueError::Json(e.to_string()))
    }

    /// Encode this node as a JSON document.
    #[must_use]
    pub fn to_json_vec(&self) -> Vec<u8> {
        // Serialising a Node cannot fail: every variant maps onto JSON.
        serde_json::to_vec(self).unwrap_or_default()
    }

    // ── Path access ─────────────────────────────────────────────────────────

    /// Look up a nested value by dot-path. The empty path returns `self`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Node> {
        if path.is_empty() {
            return Some(self);
        }
        path.split(PATH_SEPARATOR)
            .try_fold(self, |node, segment| node.child(segment))
    }

    fn child(&self, segment: &str) -> Option<&Node> {
        match self {
            Node::Map(map) => map.get(segment),
            Node::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Write `value` at `path`, creating intermediate maps where segments are
    /// missing or `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidPath`] for empty segments or out-of-range
    /// array indices, and [`ValueError::PathConflict`] when an existing scalar
    /// sits on the path.
    pub fn set(&mut self, path: &str, value: Node) -> Result<(), ValueError> {
        if path.is_empty() || path.split(PATH_SEPARATOR).any(str::is_empty) {
            return Err(ValueError::InvalidPath(path.to_string()));
        }

        let mut segments = path.split(PATH_SEPARATOR).peekable();
        let mut current = self;
        while let Some(segment) = segments.next() {
            if current.is_null() {
                *current = Node::map();
            }
            let last = segments.peek().is_none();
            current = match current {
                Node::Map(map) => {
                    if last {
                        map.insert(segment.to_string(), value);
                        return Ok(());
                    }
                    map.entry(segment.to_string()).or_insert(Node::Null)
                }
                Node::Array(items) => {
                    let index = segment
                        .parse::<usize>()
                        .ok()
                        .filter(|i| *i < items.len())
                        .ok_or_else(|| ValueError::InvalidPath(path.to_string()))?;
                    if last {
                        items[index] = value;
                        return Ok(());
                    }
                    &mut items[index]
                }
                other => {
                    return Err(ValueError::PathConflict {
                        path: path.to_string(),
                        kind: other.kind(),
                    });
                }
            };
        }
        Ok(())
    }

    // ── Arithmetic ──────────────────────────────────────────────────────────

    /// Apply an arithmetic operator.
    ///
    /// `+` concatenates when either side is a string, stringifying the other.
    /// Integer results stay integers while exact; overflow and inexact
    /// division promote to float.
    ///
    /// # Errors
    ///
    /// [`ValueError::DivisionByZero`] for a zero divisor and
    /// [`ValueError::TypeMismatch`] for non-numeric operands.
    pub fn arith(&self, op: ArithOp, rhs: &Node) -> Result<Node, ValueError> {
        if op == ArithOp::Add {
            match (self, rhs) {
                (Node::String(l), r) => return Ok(Node::String(format!("{l}{r}"))),
                (l, Node::String(r)) => return Ok(Node::String(format!("{l}{r}"))),
                _ => {}
            }
        }

        match (self, rhs) {
            (Node::Int(l), Node::Int(r)) => int_arith(op, *l, *r),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => float_arith(op, l, r),
                _ => Err(ValueError::TypeMismatch {
                    op: op.symbol(),
                    left: self.kind(),
                    right: rhs.kind(),
                }),
            },
        }
    }

    /// Numeric negation.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] for non-numeric values.
    pub fn neg(&self) -> Result<Node, ValueError> {
        match self {
            Node::Int(i) => Ok(i
                .checked_neg()
                .map_or(Node::Float(-(*i as f64)), Node::Int)),
            Node::Float(f) => Ok(Node::Float(-f)),
            other => Err(ValueError::TypeMismatch {
                op: "-",
                left: other.kind(),
                right: other.kind(),
            }),
        }
    }

    /// Order two values of comparable kinds: numbers with numbers, strings
    /// with strings, booleans with booleans, nulls with nulls.
    #[must_use]
    pub fn compare(&self, rhs: &Node) -> Option<Ordering> {
        match (self, rhs) {
            (Node::Int(l), Node::Int(r)) => Some(l.cmp(r)),
            (Node::String(l), Node::String(r)) => Some(l.cmp(r)),
            (Node::Bool(l), Node::Bool(r)) => Some(l.cmp(r)),
            (Node::Null, Node::Null) => Some(Ordering::Equal),
            (l, r) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        }
    }
}

fn int_arith(op: ArithOp, l: i64, r: i64) -> Result<Node, ValueError> {
    let exact = match op {
        ArithOp::Add => l.checked_add(r),
        ArithOp::Sub => l.checked_sub(r),
        ArithOp::Mul => l.checked_mul(r),
        ArithOp::Div => {
            if r == 0 {
                return Err(ValueError::DivisionByZero);
            }
            if l.checked_rem(r) == Some(0) { l.checked_div(r) } else { None }
        }
    };
    match exact {
        Some(v) => Ok(Node::Int(v)),
        None => float_arith(op, l as f64, r as f64),
    }
}

fn float_arith(op: ArithOp, l: f64, r: f64) -> Result<Node, ValueError> {
    let v = match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => {
            if r == 0.0 {
                return Err(ValueError::DivisionByZero);
            }
            l / r
        }
    };
    Ok(Node::Float(v))
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => f.write_str("null"),
            Node::Bool(b) => write!(f, "{b}"),
            Node::Int(i) => write!(f, "{i}"),
            Node::Float(v) => write!(f, "{v}"),
            Node::String(s) => f.write_str(s),
            Node::Array(_) | Node::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────────────

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Self {
        Node::Int(i64::from(v))
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Int(v)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Float(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::String(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::String(v)
    }
}

impl From<Vec<Node>> for Node {
    fn from(v: Vec<Node>) -> Self {
        Node::Array(v)
    }
}

impl From<BTreeMap<String, Node>> for Node {
    fn from(v: BTreeMap<String, Node>) -> Self {
        Node::Map(v)
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Node::Int)
                .unwrap_or_else(|| Node::Float(n.as_f64().unwrap_or(f64::NAN))),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_nested_path() {
        let node: Node = serde_json::json!({
            "sysField": { "_spacePath": "root/a" },
            "list": [1, {"name": "tomas"}]
        })
        .into();
        assert_eq!(node.get("sysField._spacePath"), Some(&Node::from("root/a")));
        assert_eq!(node.get("list.1.name"), Some(&Node::from("tomas")));
        assert_eq!(node.get("list.7"), None);
        assert_eq!(node.get("missing.path"), None);
        assert_eq!(node.get(""), Some(&node));
    }

    #[test]
    fn test_set_materialises_intermediate_maps() {
        let mut node = Node::Null;
        node.set("a.b.c", Node::from(1)).unwrap();
        assert_eq!(node.get("a.b.c"), Some(&Node::Int(1)));
        assert_eq!(node.get("a.b").map(Node::kind), Some(Kind::Map));

        node.set("a.x", Node::from("y")).unwrap();
        assert_eq!(node.get("a.x"), Some(&Node::from("y")));
        assert_eq!(node.get("a.b.c"), Some(&Node::Int(1)));
    }

    #[test]
    fn test_set_through_scalar_conflicts() {
        let mut node = Node::map();
        node.set("temp", Node::from(20)).unwrap();
        let err = node.set("temp.unit", Node::from("C")).unwrap_err();
        assert_eq!(
            err,
            ValueError::PathConflict {
                path: "temp.unit".to_string(),
                kind: Kind::Int,
            }
        );
    }

    #[test]
    fn test_set_rejects_empty_segments() {
        let mut node = Node::map();
        assert!(matches!(node.set("a..b", Node::Null), Err(ValueError::InvalidPath(_))));
        assert!(matches!(node.set("", Node::Null), Err(ValueError::InvalidPath(_))));
    }

    #[test]
    fn test_set_array_element() {
        let mut node: Node = serde_json::json!({"list": [1, 2]}).into();
        node.set("list.1", Node::from(5)).unwrap();
        assert_eq!(node.get("list.1"), Some(&Node::Int(5)));
        assert!(node.set("list.9", Node::Null).is_err());
    }

    #[test]
    fn test_int_arithmetic_stays_exact() {
        let sum = Node::from(2).arith(ArithOp::Add, &Node::from(3)).unwrap();
        assert_eq!(sum, Node::Int(5));
        let quotient = Node::from(9).arith(ArithOp::Div, &Node::from(3)).unwrap();
        assert_eq!(quotient, Node::Int(3));
        let inexact = Node::from(7).arith(ArithOp::Div, &Node::from(2)).unwrap();
        assert_eq!(inexact, Node::Float(3.5));
    }

    #[test]
    fn test_int_overflow_promotes_to_float() {
        let result = Node::Int(i64::MAX).arith(ArithOp::Add, &Node::Int(1)).unwrap();
        assert_eq!(result.kind(), Kind::Float);
    }

    #[test]
    fn test_mixed_numeric_yields_float() {
        let result = Node::from(1).arith(ArithOp::Mul, &Node::from(2.5)).unwrap();
        assert_eq!(result, Node::Float(2.5));
    }

    #[test]
    fn test_string_concatenation_stringifies_numbers() {
        let result = Node::from("room-").arith(ArithOp::Add, &Node::from(12)).unwrap();
        assert_eq!(result, Node::from("room-12"));
        let result = Node::from(1.5).arith(ArithOp::Add, &Node::from("x")).unwrap();
        assert_eq!(result, Node::from("1.5x"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            Node::from(1).arith(ArithOp::Div, &Node::from(0)),
            Err(ValueError::DivisionByZero)
        );
        assert_eq!(
            Node::from(1.0).arith(ArithOp::Div, &Node::from(0.0)),
            Err(ValueError::DivisionByZero)
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = Node::from(true).arith(ArithOp::Sub, &Node::from(1)).unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                op: "-",
                left: Kind::Bool,
                right: Kind::Int,
            }
        );
        assert!(Node::from("a").arith(ArithOp::Mul, &Node::from(2)).is_err());
    }

    #[test]
    fn test_compare() {
        assert_eq!(Node::from(1).compare(&Node::from(1.0)), Some(Ordering::Equal));
        assert_eq!(Node::from("a").compare(&Node::from("b")), Some(Ordering::Less));
        assert_eq!(Node::from("a").compare(&Node::from(1)), None);
    }

    #[test]
    fn test_json_is_self_describing() {
        let node = Node::from_json_slice(br#"{"temp": 21, "ratio": 0.5, "tags": ["a"], "on": true, "x": null}"#)
            .unwrap();
        assert_eq!(node.get("temp"), Some(&Node::Int(21)));
        assert_eq!(node.get("ratio"), Some(&Node::Float(0.5)));
        assert_eq!(node.get("tags.0"), Some(&Node::from("a")));
        assert_eq!(node.get("on"), Some(&Node::Bool(true)));
        assert_eq!(node.get("x"), Some(&Node::Null));
        assert!(Node::from_json_slice(b"{").is_err());
    }
}
