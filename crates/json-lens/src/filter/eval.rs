//! Predicate evaluation with loose type coercion.
//!
//! Each candidate child is materialized into a dynamic value and judged in
//! its own context. Paths that fail to resolve yield a not-found sentinel
//! that is falsy but never aborts the filter; ordering between
//! incomparable types does abort, surfacing as a filter error on the
//! query result.

use serde_json::Value;

use crate::error::{Error, NodeType, Result};
use crate::filter::parser::{BinaryOp, Expr, PathExpr, PathHead};
use crate::node::Node;

/// Evaluation context for one candidate: the materialized item, the
/// materialized query root (only when the expression mentions `$`), the
/// 1-based position of the item in its parent, and the parent's size.
pub(crate) struct Context<'a> {
    pub(crate) item: &'a Value,
    pub(crate) root: Option<&'a Value>,
    pub(crate) position: usize,
    pub(crate) size: usize,
}

/// The result of evaluating a sub-expression: a value, or "not found".
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Missing,
    Val(Value),
}

/// Keep the children of `target` for which `expr` is truthy, in document
/// order. `root` anchors `$` paths.
pub(crate) fn apply_filter(target: &Node, expr: &Expr, root: &Node) -> Result<Vec<Node>> {
    let children = match target.node_type() {
        NodeType::Array => target.array()?,
        NodeType::Object => {
            target.parse_all_object();
            target.with_object(|st| st.children.values().cloned().collect())
        }
        other => {
            return Err(Error::Filter(format!(
                "cannot filter the children of a {other}"
            )))
        }
    };
    let root_value = if expr.uses_root() {
        Some(root.to_value()?)
    } else {
        None
    };

    let size = children.len();
    let mut kept = Vec::new();
    for (i, child) in children.into_iter().enumerate() {
        let item = child.to_value()?;
        let ctx = Context {
            item: &item,
            root: root_value.as_ref(),
            position: i + 1,
            size,
        };
        if truthy(&eval(expr, &ctx)?) {
            kept.push(child);
        }
    }
    Ok(kept)
}

pub(crate) fn eval(expr: &Expr, ctx: &Context<'_>) -> Result<Operand> {
    match expr {
        Expr::Literal(v) => Ok(Operand::Val(v.clone())),
        Expr::Path(p) => Ok(resolve(p, ctx)),
        Expr::Not(inner) => Ok(Operand::Val(Value::Bool(!truthy(&eval(inner, ctx)?)))),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::Or => {
                if truthy(&eval(lhs, ctx)?) {
                    return Ok(Operand::Val(Value::Bool(true)));
                }
                Ok(Operand::Val(Value::Bool(truthy(&eval(rhs, ctx)?))))
            }
            BinaryOp::And => {
                if !truthy(&eval(lhs, ctx)?) {
                    return Ok(Operand::Val(Value::Bool(false)));
                }
                Ok(Operand::Val(Value::Bool(truthy(&eval(rhs, ctx)?))))
            }
            _ => {
                let l = eval(lhs, ctx)?;
                let r = eval(rhs, ctx)?;
                Ok(Operand::Val(Value::Bool(compare(*op, &l, &r)?)))
            }
        },
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

/// Truthiness: null and not-found are false, booleans are themselves,
/// numbers are non-zero, strings are non-empty, containers are true.
pub(crate) fn truthy(op: &Operand) -> bool {
    match op {
        Operand::Missing => false,
        Operand::Val(v) => truthy_value(v),
    }
}

fn truthy_value(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: BinaryOp, l: &Operand, r: &Operand) -> Result<bool> {
    let (l, r) = match (l, r) {
        (Operand::Val(l), Operand::Val(r)) => (l, r),
        // A side that did not resolve makes the comparison false rather
        // than failing the whole filter.
        _ => return Ok(false),
    };
    match op {
        BinaryOp::Eq => Ok(loose_eq(l, r)),
        BinaryOp::Ne => Ok(!loose_eq(l, r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = order(l, r)?;
            Ok(match op {
                BinaryOp::Lt => ord == std::cmp::Ordering::Less,
                BinaryOp::Le => ord != std::cmp::Ordering::Greater,
                BinaryOp::Gt => ord == std::cmp::Ordering::Greater,
                BinaryOp::Ge => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            })
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("logical ops are short-circuited"),
    }
}

/// Lenient equality: numbers by float value, booleans against numbers via
/// truthiness, strings lexically, anything else structurally.
fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Bool(b), Value::Number(_)) => *b == truthy_value(r),
        (Value::Number(_), Value::Bool(b)) => truthy_value(l) == *b,
        _ => l == r,
    }
}

/// Ordering is defined for number pairs and string pairs only.
fn order(l: &Value, r: &Value) -> Result<std::cmp::Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).ok_or_else(|| {
                Error::Filter("cannot order non-finite numbers".into())
            })
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(Error::Filter(format!(
            "cannot order {} against {}",
            kind_name(l),
            kind_name(r)
        ))),
    }
}

fn call(name: &str, args: &[Expr], ctx: &Context<'_>) -> Result<Operand> {
    match name {
        "position" => Ok(Operand::Val(Value::from(ctx.position))),
        "last" => Ok(Operand::Val(Value::from(ctx.size))),
        "exists" => {
            let arg = args.first().ok_or_else(|| {
                Error::Filter("exists() takes a path argument".into())
            })?;
            let resolved = eval(arg, ctx)?;
            Ok(Operand::Val(Value::Bool(!matches!(
                resolved,
                Operand::Missing
            ))))
        }
        "includes" => {
            let (hay, needle) = match args {
                [hay, needle] => (eval(hay, ctx)?, eval(needle, ctx)?),
                _ => {
                    return Err(Error::Filter(
                        "includes() takes a haystack and a needle".into(),
                    ))
                }
            };
            let found = match (&hay, &needle) {
                (Operand::Val(Value::Array(items)), Operand::Val(n)) => {
                    items.iter().any(|item| loose_eq(item, n))
                }
                (Operand::Val(Value::String(s)), Operand::Val(Value::String(n))) => {
                    s.contains(n.as_str())
                }
                _ => false,
            };
            Ok(Operand::Val(Value::Bool(found)))
        }
        _ => Err(Error::Filter(format!("unknown function `{name}`"))),
    }
}

/// Resolve a predicate path over materialized values. Any miss along the
/// way produces the not-found sentinel.
fn resolve(path: &PathExpr, ctx: &Context<'_>) -> Operand {
    let mut cur = match path.head {
        PathHead::Current => ctx.item,
        PathHead::Root => match ctx.root {
            Some(root) => root,
            None => return Operand::Missing,
        },
    };
    for seg in &path.segs {
        cur = match cur {
            Value::Object(map) => match map.get(seg.as_str()) {
                Some(v) => v,
                None => return Operand::Missing,
            },
            Value::Array(items) => match seg.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return Operand::Missing,
            },
            _ => return Operand::Missing,
        };
    }
    Operand::Val(cur.clone())
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
