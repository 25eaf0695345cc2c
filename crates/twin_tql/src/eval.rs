//! Expression evaluation.
//!
//! [`evaluate`] is a pure function of an [`Expr`] and a [`Binding`]: a flat
//! map from `entity.path` keys to property values. A reference is resolved by
//! exact key first; failing that, the longest key that is a dot-prefix of the
//! reference is descended with [`Node::get`], so a binding holding
//! `sensor7.sysField` also answers `sensor7.sysField._spacePath`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use twin_value::{Kind, Node, PATH_SEPARATOR, ValueError};

use crate::ast::{CmpOp, Expr, FieldRef};

/// Snapshot of source property values keyed by `entity.path`.
pub type Binding = BTreeMap<String, Node>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The binding holds no value for the reference.
    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: Kind,
        right: Kind,
    },

    #[error(transparent)]
    Value(ValueError),
}

impl From<ValueError> for EvalError {
    fn from(e: ValueError) -> Self {
        match e {
            ValueError::DivisionByZero => EvalError::DivisionByZero,
            ValueError::TypeMismatch { op, left, right } => {
                EvalError::TypeMismatch { op, left, right }
            }
            other => EvalError::Value(other),
        }
    }
}

/// Evaluate `expr` against `binding`.
///
/// # Errors
///
/// Returns [`EvalError::UnresolvedReference`] for references missing from
/// the binding, and the arithmetic errors of [`Node::arith`].
pub fn evaluate(expr: &Expr, binding: &Binding) -> Result<Node, EvalError> {
    match expr {
        Expr::Literal(node) => Ok(node.clone()),
        Expr::Ref(field) => resolve(field, binding).cloned(),
        Expr::Neg(inner) => Ok(evaluate(inner, binding)?.neg()?),
        Expr::Arith { op, lhs, rhs } => {
            let l = evaluate(lhs, binding)?;
            let r = evaluate(rhs, binding)?;
            Ok(l.arith(*op, &r)?)
        }
        Expr::Compare { op, lhs, rhs } => {
            let l = evaluate(lhs, binding)?;
            let r = evaluate(rhs, binding)?;
            compare(*op, &l, &r).map(Node::Bool)
        }
    }
}

/// Look up a reference in the binding.
///
/// # Errors
///
/// Returns [`EvalError::UnresolvedReference`] if neither the full key nor any
/// prefix of it leads to a value.
pub fn resolve<'b>(field: &FieldRef, binding: &'b Binding) -> Result<&'b Node, EvalError> {
    let key = field.key();
    if let Some(node) = binding.get(&key) {
        return Ok(node);
    }

    // Walk prefixes from longest to shortest: `a.b.c` tries `a.b`, then `a`.
    let mut split = key.len();
    while let Some(idx) = key[..split].rfind(PATH_SEPARATOR) {
        let (prefix, rest) = (&key[..idx], &key[idx + 1..]);
        if let Some(found) = binding.get(prefix).and_then(|node| node.get(rest)) {
            return Ok(found);
        }
        split = idx;
    }

    Err(EvalError::UnresolvedReference(key))
}

fn compare(op: CmpOp, l: &Node, r: &Node) -> Result<bool, EvalError> {
    let Some(ordering) = l.compare(r) else {
        return match op {
            CmpOp::Eq => Ok(l == r),
            CmpOp::Ne => Ok(l != r),
            _ => Err(EvalError::TypeMismatch {
                op: op.symbol(),
                left: l.kind(),
                right: r.kind(),
            }),
        };
    };
    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn eval(expr: &str, binding: &Binding) -> Result<Node, EvalError> {
        let stmt = Parser::parse(&format!("insert into t select {expr} as r")).unwrap();
        evaluate(&stmt.fields[0].expr, binding)
    }

    fn binding(entries: &[(&str, Node)]) -> Binding {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let b = binding(&[("a.x", Node::Int(7))]);
        assert_eq!(eval("a.x * 2 + 1", &b).unwrap(), Node::Int(15));
        assert_eq!(eval("a.x / 7", &b).unwrap(), Node::Int(1));
        assert_eq!(eval("a.x / 2", &b).unwrap(), Node::Float(3.5));
    }

    #[test]
    fn test_float_operand_yields_float() {
        let b = binding(&[("a.x", Node::Int(10))]);
        assert_eq!(eval("a.x * 1.5", &b).unwrap(), Node::Float(15.0));
    }

    #[test]
    fn test_string_concatenation() {
        let b = binding(&[
            ("p.sysField._spacePath", Node::from("root/floor1")),
            ("a.n", Node::Int(3)),
        ]);
        assert_eq!(
            eval("p.sysField._spacePath + '/room'", &b).unwrap(),
            Node::from("root/floor1/room")
        );
        assert_eq!(eval("'n=' + a.n", &b).unwrap(), Node::from("n=3"));
    }

    #[test]
    fn test_division_by_zero() {
        let b = binding(&[("a.x", Node::Int(1)), ("a.f", Node::Float(1.0))]);
        assert_eq!(eval("a.x / 0", &b), Err(EvalError::DivisionByZero));
        assert_eq!(eval("a.f / 0.0", &b), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_type_mismatch() {
        let b = binding(&[("a.s", Node::from("x"))]);
        assert!(matches!(
            eval("a.s * 2", &b),
            Err(EvalError::TypeMismatch {
                op: "*",
                left: Kind::String,
                right: Kind::Int
            })
        ));
    }

    #[test]
    fn test_unresolved_reference() {
        assert_eq!(
            eval("a.missing + 1", &Binding::new()),
            Err(EvalError::UnresolvedReference("a.missing".to_string()))
        );
    }

    #[test]
    fn test_prefix_key_is_descended() {
        let nested: Node = serde_json::json!({"_spacePath": "root"}).into();
        let b = binding(&[("p.sysField", nested)]);
        assert_eq!(eval("p.sysField._spacePath", &b).unwrap(), Node::from("root"));
    }

    #[test]
    fn test_negation() {
        let b = binding(&[("a.x", Node::Int(4))]);
        assert_eq!(eval("-a.x + 1", &b).unwrap(), Node::Int(-3));
        assert_eq!(eval("--a.x", &b).unwrap(), Node::Int(4));
    }

    #[test]
    fn test_comparisons() {
        let b = binding(&[("a.x", Node::Int(30)), ("a.s", Node::from("on"))]);
        assert_eq!(eval("a.x > 29.5", &b).unwrap(), Node::Bool(true));
        assert_eq!(eval("a.x <= 29", &b).unwrap(), Node::Bool(false));
        assert_eq!(eval("a.s = 'on'", &b).unwrap(), Node::Bool(true));
        assert_eq!(eval("a.s != 1", &b).unwrap(), Node::Bool(true));
        assert!(eval("a.s > 1", &b).is_err());
    }
}
