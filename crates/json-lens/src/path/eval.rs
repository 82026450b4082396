//! Step-wise execution of a tokenized path against the lazy tree.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, NodeType};
use crate::filter;
use crate::limit::LimitTracker;
use crate::node::{key_matches, Node, RawPairs, Segment};
use crate::path::lexer::PathOp;

pub(crate) fn eval(root: &Node, ops: &[PathOp]) -> Node {
    let mut current = root.clone();
    for op in ops {
        if !current.is_valid() {
            return current;
        }
        current = step(root, &current, op);
    }
    current
}

fn step(root: &Node, current: &Node, op: &PathOp) -> Node {
    match op {
        PathOp::Key(key) => key_step(current, key),
        PathOp::Index(i) => current.index(*i),
        PathOp::Slice { start, end } => slice_step(current, *start, *end),
        PathOp::Wildcard => wildcard_step(current),
        PathOp::Recursive(key) => descend_step(current, key),
        PathOp::Parent => match current.parent() {
            Some(parent) => parent,
            None => current.invalid(Error::NoParent {
                path: current.path(),
            }),
        },
        PathOp::Func(name) => current.call_func(name),
        PathOp::Filter(expr) => match filter::apply_filter(current, expr, root) {
            Ok(kept) => Node::from_nodes_with(kept, current),
            Err(e) => current.invalid(e),
        },
    }
}

/// A key step: direct lookup on an object; projected across the object
/// elements of an array (real or synthetic).
fn key_step(current: &Node, key: &str) -> Node {
    match current.node_type() {
        NodeType::Object => current.get(key),
        NodeType::Array => {
            let mut found = Vec::new();
            current.for_each(|_, child| {
                if child.node_type() == NodeType::Object {
                    let hit = child.get(key);
                    if hit.is_valid() {
                        found.push(hit);
                    }
                }
            });
            Node::from_nodes_with(found, current)
        }
        kind => current.invalid(Error::NotAnObject {
            key: key.to_owned(),
            kind,
            path: current.path(),
        }),
    }
}

/// Slice bounds behave like sequence slicing elsewhere: negatives add the
/// length, the result clamps to `0..len`, and a crossed range is empty.
fn slice_step(current: &Node, start: Option<i64>, end: Option<i64>) -> Node {
    if current.node_type() != NodeType::Array {
        return current.invalid(Error::NotAnArray {
            kind: current.node_type(),
            path: current.path(),
        });
    }
    let children = match current.array() {
        Ok(children) => children,
        Err(e) => return current.invalid(e),
    };
    let len = children.len() as i64;
    let resolve = |bound: Option<i64>, default: i64| -> i64 {
        let mut b = bound.unwrap_or(default);
        if b < 0 {
            b += len;
        }
        b.clamp(0, len)
    };
    let start = resolve(start, 0);
    let end = resolve(end, len);
    let slice = if start < end {
        children[start as usize..end as usize].to_vec()
    } else {
        Vec::new()
    };
    Node::from_nodes_with(slice, current)
}

fn wildcard_step(current: &Node) -> Node {
    match current.node_type() {
        NodeType::Object | NodeType::Array => {
            let mut children = Vec::new();
            current.for_each(|_, child| children.push(child.clone()));
            Node::from_nodes_with(children, current)
        }
        kind => current.invalid(Error::Type {
            expected: "object or array",
            found: kind,
            path: current.path(),
        }),
    }
}

/// Recursive descent: every descendant value sitting under `key`, in
/// document order, including matches nested inside other matches.
///
/// An unparsed, clean container is walked directly over its raw bytes,
/// cutting nodes only for the keys that match; parsed or dirty subtrees
/// fall back to a tree walk. Both branches produce the same values in the
/// same order.
fn descend_step(current: &Node, key: &str) -> Node {
    let mut found = Vec::new();
    let mut limit = LimitTracker::default();
    let outcome = match current.node_type() {
        NodeType::Object | NodeType::Array => collect(current, key, &mut found, &mut limit),
        _ => Ok(()),
    };
    trace!(key, hits = found.len(), "recursive descent");
    match outcome {
        Ok(()) => Node::from_nodes_with(found, current),
        Err(e) => current.invalid(e),
    }
}

fn collect(
    node: &Node,
    key: &str,
    out: &mut Vec<Node>,
    limit: &mut LimitTracker,
) -> Result<(), Error> {
    limit.consume()?;
    if !node.is_parsed() && !node.is_dirty() {
        if let Some(raw) = node.inner.raw.clone() {
            raw_collect(node, &raw, key, out, limit)?;
            limit.release();
            return Ok(());
        }
    }
    tree_collect(node, key, out, limit)?;
    limit.release();
    Ok(())
}

/// Raw-mode walk over an unparsed slice. Matched values are cut into
/// nodes parented on the scanned container; everything in between stays
/// un-materialized.
fn raw_collect(
    owner: &Node,
    slice: &Bytes,
    key: &str,
    out: &mut Vec<Node>,
    limit: &mut LimitTracker,
) -> Result<(), Error> {
    limit.consume()?;
    match slice.first() {
        Some(&b'{') => {
            for (key_range, value_range) in RawPairs::new(slice) {
                let matched = key_matches(&slice[key_range], key);
                let value = slice.slice(value_range);
                if matched {
                    out.push(Node::cut(
                        value.clone(),
                        Arc::downgrade(&owner.inner),
                        Segment::Key(key.to_owned()),
                        owner.inner.funcs.clone(),
                    ));
                }
                if matches!(value.first(), Some(&(b'{' | b'['))) {
                    raw_collect(owner, &value, key, out, limit)?;
                }
            }
        }
        Some(&b'[') => {
            for range in crate::node::RawElems::new(slice) {
                let value = slice.slice(range);
                if matches!(value.first(), Some(&(b'{' | b'['))) {
                    raw_collect(owner, &value, key, out, limit)?;
                }
            }
        }
        _ => {}
    }
    limit.release();
    Ok(())
}

fn tree_collect(
    node: &Node,
    key: &str,
    out: &mut Vec<Node>,
    limit: &mut LimitTracker,
) -> Result<(), Error> {
    match node.node_type() {
        NodeType::Object => {
            let mut pairs = Vec::new();
            node.for_each(|member, child| {
                if let crate::node::Member::Key(k) = member {
                    pairs.push((k.to_owned(), child.clone()));
                }
            });
            for (k, child) in pairs {
                if k == key {
                    out.push(child.clone());
                }
                if matches!(child.node_type(), NodeType::Object | NodeType::Array) {
                    collect(&child, key, out, limit)?;
                }
            }
        }
        NodeType::Array => {
            let mut children = Vec::new();
            node.for_each(|_, child| children.push(child.clone()));
            for child in children {
                if matches!(child.node_type(), NodeType::Object | NodeType::Array) {
                    collect(&child, key, out, limit)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

impl Node {
    /// Synthetic array inheriting the function registry of the node that
    /// produced it, so `[@fn]` keeps working after aggregate steps.
    pub(crate) fn from_nodes_with(children: Vec<Node>, source: &Node) -> Node {
        Node::synthetic(children, source.inner.funcs.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::NodeType;
    use crate::Document;
    use pretty_assertions::assert_eq;

    fn floats(node: &crate::Node) -> Vec<f64> {
        let mut out = Vec::new();
        node.for_each(|_, v| out.push(v.float().unwrap()));
        out
    }

    #[test]
    fn key_projection_over_arrays() {
        let doc =
            Document::parse(r#"{"rows": [{"v": 1}, {"x": 9}, {"v": 3}, 5]}"#).unwrap();
        let projected = doc.query("rows/v");
        assert_eq!(projected.node_type(), NodeType::Array);
        assert_eq!(floats(&projected), vec![1.0, 3.0]);
    }

    #[test]
    fn recursive_descent_raw_and_tree_modes_agree() {
        let input = r#"{"store":{"book":[{"price":8.95},{"price":12.99}],"bicycle":{"price":19.95}}}"#;

        // Raw mode: nothing touched yet.
        let doc = Document::parse(input).unwrap();
        let raw_mode = doc.query("store..price");
        assert_eq!(floats(&raw_mode), vec![8.95, 12.99, 19.95]);

        // Tree mode: force full materialization first.
        let doc = Document::parse(input).unwrap();
        doc.root().parse_deep();
        let tree_mode = doc.query("store..price");
        assert_eq!(floats(&tree_mode), vec![8.95, 12.99, 19.95]);
    }

    #[test]
    fn recursive_descent_enters_matched_values() {
        let doc = Document::parse(r#"{"a": {"a": {"a": 1}}}"#).unwrap();
        let hits = doc.query("..a");
        // Outer object, inner object, then the leaf, in document order.
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.index(0).node_type(), NodeType::Object);
        assert_eq!(hits.index(2).int().unwrap(), 1);
    }

    #[test]
    fn parent_steps_move_back_up() {
        let doc = Document::parse(r#"{"a": {"b": {"c": 1}}}"#).unwrap();
        assert_eq!(doc.query("a/b/../b/c").int().unwrap(), 1);
        assert!(!doc.query("..").is_valid());
    }

    #[test]
    fn wildcard_over_object_values() {
        let doc = Document::parse(r#"{"a": 1, "b": 2, "c": 3}"#).unwrap();
        assert_eq!(floats(&doc.query("*")), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn steps_chain_over_synthetic_arrays() {
        let doc = Document::parse(
            r#"{"depts": [{"staff": [{"age": 30}, {"age": 40}]}, {"staff": [{"age": 50}]}]}"#,
        )
        .unwrap();
        let ages = doc.query("depts/*/staff/age");
        // Wildcard, projection, then projection again across the flattened
        // staff arrays: staff arrays project per element.
        assert_eq!(ages.node_type(), NodeType::Array);
    }
}
