//! Boolean condition expressions over the variable namespace.
//!
//! Supported forms: `==  !=  <  <=  >  >=  &&  ||  !`, parentheses, numeric
//! and string literals, `true`/`false`, and namespace path references.
//! Comparisons coerce conservatively: when both sides look numeric they
//! compare as numbers, otherwise equality falls back to string form.
//! Parse failures surface [`NodeError::ConditionInvalid`]; unresolved path
//! references propagate [`NodeError::PathNotFound`].

mod lexer;
mod parser;

use serde_json::Value;

use crate::error::NodeError;
use crate::namespace::{stringify, Namespace, NamespaceTracker};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed condition expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Path(String),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Resolves namespace path references during evaluation.
pub trait PathReader {
    fn read_path(&self, path: &str) -> Result<Value, NodeError>;
}

impl PathReader for Namespace {
    fn read_path(&self, path: &str) -> Result<Value, NodeError> {
        self.read(path)
    }
}

impl PathReader for NamespaceTracker {
    fn read_path(&self, path: &str) -> Result<Value, NodeError> {
        self.read(path)
    }
}

/// Parse a condition expression.
pub fn parse(input: &str) -> Result<Expr, NodeError> {
    parser::parse(input)
}

/// Parse and evaluate a condition against the given reader.
pub fn evaluate(input: &str, reader: &dyn PathReader) -> Result<bool, NodeError> {
    let expr = parse(input)?;
    expr.eval(reader)?.truthy(input)
}

/// An evaluated operand.
#[derive(Debug, Clone)]
enum Operand {
    Json(Value),
}

impl Operand {
    fn truthy(&self, src: &str) -> Result<bool, NodeError> {
        match self {
            Operand::Json(Value::Bool(b)) => Ok(*b),
            other => Err(NodeError::ConditionInvalid(format!(
                "condition did not evaluate to a boolean ({other:?}): {src}"
            ))),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Json(Value::Number(n)) => n.as_f64(),
            Operand::Json(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_string(&self) -> String {
        match self {
            Operand::Json(v) => stringify(v),
        }
    }
}

impl Expr {
    fn eval(&self, reader: &dyn PathReader) -> Result<Operand, NodeError> {
        match self {
            Expr::Number(n) => Ok(Operand::Json(
                serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Expr::Str(s) => Ok(Operand::Json(Value::String(s.clone()))),
            Expr::Bool(b) => Ok(Operand::Json(Value::Bool(*b))),
            Expr::Path(p) => Ok(Operand::Json(reader.read_path(p)?)),
            Expr::Cmp(op, l, r) => {
                let left = l.eval(reader)?;
                let right = r.eval(reader)?;
                Ok(Operand::Json(Value::Bool(compare(*op, &left, &right))))
            }
            Expr::And(l, r) => {
                // Short-circuit on a false left side.
                let left = l.eval(reader)?.truthy("&&")?;
                if !left {
                    return Ok(Operand::Json(Value::Bool(false)));
                }
                let right = r.eval(reader)?.truthy("&&")?;
                Ok(Operand::Json(Value::Bool(right)))
            }
            Expr::Or(l, r) => {
                let left = l.eval(reader)?.truthy("||")?;
                if left {
                    return Ok(Operand::Json(Value::Bool(true)));
                }
                let right = r.eval(reader)?.truthy("||")?;
                Ok(Operand::Json(Value::Bool(right)))
            }
            Expr::Not(inner) => {
                let value = inner.eval(reader)?.truthy("!")?;
                Ok(Operand::Json(Value::Bool(!value)))
            }
        }
    }
}

fn compare(op: CmpOp, left: &Operand, right: &Operand) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return match op {
            CmpOp::Eq => (a - b).abs() < f64::EPSILON,
            CmpOp::Ne => (a - b).abs() >= f64::EPSILON,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }

    let a = left.as_string();
    let b = right.as_string();
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}
