/// Abstract syntax tree for TQL statements.
use std::fmt;

use twin_value::{ArithOp, Node};

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

/// `insert into <target> select <field> {, <field>}`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: String,
    pub fields: Vec<SelectField>,
}

/// One `<expr> [as <path>]` item of the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectField {
    pub expr: Expr,
    pub alias: Option<String>,
    /// Position of the first token of the field, for diagnostics.
    pub line: usize,
    pub col: usize,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A reference to a property of another entity: `entity.path.to.prop`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub entity: String,
    pub path: String,
}

impl FieldRef {
    /// The binding key for this reference, `entity.path`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.entity, self.path)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number or string constant.
    Literal(Node),
    /// Property of a source entity.
    Ref(FieldRef),
    /// Unary minus.
    Neg(Box<Expr>),
    /// `+ - * /`
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `= != > < >= <=`
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// All field references in evaluation order (left to right).
    pub fn references(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(r) => out.push(r),
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
        }
    }
}
