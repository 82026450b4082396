//! The lazy node tree.
//!
//! A [`Node`] is a cheap-clone handle over one JSON entity. Nodes cut from
//! the input remember their exact byte sub-slice and defer parsing their
//! children until a key or index is actually demanded. Nodes created by
//! writes, and synthetic aggregates produced by path operators, own their
//! data and re-serialize on demand.

mod array;
mod object;
mod serialize;
mod value;

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, NodeType, Result};
use crate::funcs::FuncRegistry;

pub(crate) use array::RawElems;
pub(crate) use object::{key_matches, RawPairs};

/// Handle to one entity of a parsed document.
///
/// Cloning is cheap (reference counted) and clones observe the same
/// underlying state: materializing a child through one handle makes it
/// visible through every other handle to the same node.
///
/// An operation that fails returns an *invalid* node carrying the error;
/// every further operation on an invalid node short-circuits and returns
/// it unchanged, so chains like `doc.query("a").get("b").int()` need only
/// one error check at the end.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    pub(crate) kind: NodeKind,
    /// Exact input slice this node was cut from. `None` for nodes created
    /// by writes and for synthetic aggregates.
    pub(crate) raw: Option<Bytes>,
    pub(crate) parent: Weak<NodeInner>,
    pub(crate) seg: Segment,
    pub(crate) funcs: FuncRegistry,
}

/// How a node is reached from its parent, used to derive [`Node::path`].
#[derive(Clone, Debug)]
pub(crate) enum Segment {
    Root,
    Key(String),
    Index(usize),
    /// Synthetic aggregates and invalid nodes have no addressable slot.
    None,
}

pub(crate) enum NodeKind {
    Object(Mutex<ObjectState>),
    Array(Mutex<ArrayState>),
    String(Mutex<StringState>),
    Number(NumberRepr),
    Bool(bool),
    Null,
    Invalid(Error),
}

#[derive(Default)]
pub(crate) struct ObjectState {
    pub(crate) children: IndexMap<String, Node>,
    /// Every key of the raw slice has been walked.
    pub(crate) parsed: bool,
    /// Modified after parse; serialization must ignore `raw`.
    pub(crate) dirty: bool,
}

#[derive(Default)]
pub(crate) struct ArrayState {
    pub(crate) children: Vec<Node>,
    pub(crate) parsed: bool,
    pub(crate) dirty: bool,
    /// Byte offset into `raw` where the next unscanned element begins.
    /// Zero until the first scan.
    pub(crate) scan: usize,
}

#[derive(Default)]
pub(crate) struct StringState {
    /// Decoded on first access and cached.
    pub(crate) decoded: Option<String>,
}

pub(crate) enum NumberRepr {
    /// The lexeme lives in `raw`; conversion happens on demand.
    Lexeme,
    Owned(serde_json::Number),
}

impl Node {
    /// The document root over a validated, whitespace-trimmed slice.
    pub(crate) fn root(raw: Bytes, funcs: FuncRegistry) -> Node {
        Node::cut(raw, Weak::new(), Segment::Root, funcs)
    }

    /// Cut a node out of a validated slice. `raw` must begin at the first
    /// byte of the value.
    pub(crate) fn cut(
        raw: Bytes,
        parent: Weak<NodeInner>,
        seg: Segment,
        funcs: FuncRegistry,
    ) -> Node {
        let kind = match raw.first() {
            Some(&b'{') => NodeKind::Object(Mutex::new(ObjectState::default())),
            Some(&b'[') => NodeKind::Array(Mutex::new(ArrayState::default())),
            Some(&b'"') => NodeKind::String(Mutex::new(StringState::default())),
            Some(&b't') => NodeKind::Bool(true),
            Some(&b'f') => NodeKind::Bool(false),
            Some(&b'n') => NodeKind::Null,
            _ => NodeKind::Number(NumberRepr::Lexeme),
        };
        Node {
            inner: Arc::new(NodeInner {
                kind,
                raw: Some(raw),
                parent,
                seg,
                funcs,
            }),
        }
    }

    /// A synthetic array aggregating `children`: always parsed, always
    /// dirty, no raw slice, no parent. This is what wildcards, slices,
    /// filters and recursive descent return, and what user functions can
    /// build to return an aggregate of their own.
    pub fn from_nodes(children: Vec<Node>) -> Node {
        let funcs = children
            .first()
            .map(|c| c.inner.funcs.clone())
            .unwrap_or_default();
        Node::synthetic(children, funcs)
    }

    pub(crate) fn synthetic(children: Vec<Node>, funcs: FuncRegistry) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                kind: NodeKind::Array(Mutex::new(ArrayState {
                    children,
                    parsed: true,
                    dirty: true,
                    scan: 0,
                })),
                raw: None,
                parent: Weak::new(),
                seg: Segment::None,
                funcs,
            }),
        }
    }

    /// An invalid node recording a failure below `self`.
    pub(crate) fn invalid(&self, err: Error) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                kind: NodeKind::Invalid(err),
                raw: None,
                parent: Arc::downgrade(&self.inner),
                seg: Segment::None,
                funcs: self.inner.funcs.clone(),
            }),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match &self.inner.kind {
            NodeKind::Object(_) => NodeType::Object,
            NodeKind::Array(_) => NodeType::Array,
            NodeKind::String(_) => NodeType::String,
            NodeKind::Number(_) => NodeType::Number,
            NodeKind::Bool(_) => NodeType::Bool,
            NodeKind::Null => NodeType::Null,
            NodeKind::Invalid(_) => NodeType::Invalid,
        }
    }

    /// `false` iff some traversal step producing this node failed.
    pub fn is_valid(&self) -> bool {
        !matches!(self.inner.kind, NodeKind::Invalid(_))
    }

    /// The failure carried by an invalid node.
    pub fn error(&self) -> Option<&Error> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Some(e),
            _ => None,
        }
    }

    /// Child of an object by key. Scans the raw slice lazily; only the
    /// demanded key is materialized.
    pub fn get(&self, key: &str) -> Node {
        match &self.inner.kind {
            NodeKind::Invalid(_) => self.clone(),
            NodeKind::Object(_) => self.object_get(key),
            _ => self.invalid(Error::NotAnObject {
                key: key.to_owned(),
                kind: self.node_type(),
                path: self.path(),
            }),
        }
    }

    /// Element of an array by index; negative counts from the end.
    pub fn index(&self, idx: i64) -> Node {
        match &self.inner.kind {
            NodeKind::Invalid(_) => self.clone(),
            NodeKind::Array(_) => self.array_index(idx),
            _ => self.invalid(Error::NotAnArray {
                kind: self.node_type(),
                path: self.path(),
            }),
        }
    }

    /// Element count of a container, `0` for anything else. Fully
    /// materializes the container's immediate children.
    pub fn len(&self) -> usize {
        match &self.inner.kind {
            NodeKind::Object(_) => {
                self.parse_all_object();
                self.with_object(|st| st.children.len())
            }
            NodeKind::Array(_) => {
                self.parse_all_array();
                self.with_array(|st| st.children.len())
            }
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate a path expression against this node. See the crate docs
    /// for the path grammar. Failures come back as an invalid node.
    pub fn query(&self, path: &str) -> Node {
        crate::path::query(self, path)
    }

    /// Visit every immediate member. Objects yield keys (order follows the
    /// internal map and is not guaranteed), arrays yield indices in
    /// document order. Scalars yield nothing.
    pub fn for_each<F: FnMut(Member<'_>, &Node)>(&self, mut f: F) {
        match &self.inner.kind {
            NodeKind::Object(_) => {
                self.parse_all_object();
                let pairs: Vec<(String, Node)> = self.with_object(|st| {
                    st.children
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                });
                for (k, v) in &pairs {
                    f(Member::Key(k.as_str()), v);
                }
            }
            NodeKind::Array(_) => {
                self.parse_all_array();
                let children: Vec<Node> = self.with_array(|st| st.children.clone());
                for (i, v) in children.iter().enumerate() {
                    f(Member::Index(i), v);
                }
            }
            _ => {}
        }
    }

    /// Insert or replace `key` on an object node. The write fully parses
    /// the node and dirties the path up to the root.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        if let NodeKind::Invalid(e) = &self.inner.kind {
            return Err(e.clone());
        }
        if !matches!(self.inner.kind, NodeKind::Object(_)) {
            return Err(Error::NotAnObject {
                key: key.to_owned(),
                kind: self.node_type(),
                path: self.path(),
            });
        }
        let value = serde_json::to_value(value)
            .map_err(|e| Error::InvalidValue(e.to_string()))?;
        self.parse_all_object();
        let child = Node::from_value(
            &value,
            Arc::downgrade(&self.inner),
            Segment::Key(key.to_owned()),
            &self.inner.funcs,
        );
        self.with_object(|st| {
            st.children.insert(key.to_owned(), child.clone());
        });
        self.mark_dirty();
        Ok(())
    }

    /// Append to an array node, dirtying the path up to the root.
    pub fn append<T: Serialize>(&self, value: T) -> Result<()> {
        if let NodeKind::Invalid(e) = &self.inner.kind {
            return Err(e.clone());
        }
        if !matches!(self.inner.kind, NodeKind::Array(_)) {
            return Err(Error::NotAnArray {
                kind: self.node_type(),
                path: self.path(),
            });
        }
        let value = serde_json::to_value(value)
            .map_err(|e| Error::InvalidValue(e.to_string()))?;
        self.parse_all_array();
        let idx = self.with_array(|st| st.children.len());
        let child = Node::from_value(
            &value,
            Arc::downgrade(&self.inner),
            Segment::Index(idx),
            &self.inner.funcs,
        );
        self.with_array(|st| st.children.push(child.clone()));
        self.mark_dirty();
        Ok(())
    }

    /// Register a user function, invokable as `[@name]` in paths.
    /// Registrations are shared document-wide.
    pub fn register_func<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(&Node) -> Node + Send + Sync + 'static,
    {
        tracing::debug!(name, "registering user function");
        self.inner.funcs.insert(name, Arc::new(f));
        self
    }

    /// Remove a registered function; `true` when it existed.
    pub fn remove_func(&self, name: &str) -> bool {
        self.inner.funcs.remove(name)
    }

    /// Sorted names of every registered function.
    pub fn func_names(&self) -> Vec<String> {
        self.inner.funcs.names()
    }

    /// Invoke a registered function on this node.
    pub fn call_func(&self, name: &str) -> Node {
        if !self.is_valid() {
            return self.clone();
        }
        match self.inner.funcs.get(name) {
            Some(f) => f(self),
            None => self.invalid(Error::UnknownFunc {
                name: name.to_owned(),
            }),
        }
    }

    /// The decoded string value. Decoding happens once and is cached.
    pub fn string(&self) -> Result<String> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::String(state) => {
                let mut st = state.lock().expect("string state lock poisoned");
                if let Some(s) = &st.decoded {
                    return Ok(s.clone());
                }
                let raw = self.inner.raw.as_ref().expect("lazy string keeps its slice");
                let contents = &raw[1..raw.len() - 1];
                let decoded = crate::scan::unescape(contents)?;
                st.decoded = Some(decoded.clone());
                Ok(decoded)
            }
            _ => Err(self.type_error("string")),
        }
    }

    /// The value as an `i64`. Floats that are integral in value coerce.
    pub fn int(&self) -> Result<i64> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::Number(NumberRepr::Owned(n)) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .ok_or_else(|| self.type_error("integer")),
            NodeKind::Number(NumberRepr::Lexeme) => {
                let lexeme = self.lexeme();
                if let Ok(i) = lexeme.parse::<i64>() {
                    return Ok(i);
                }
                match lexeme.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(self.type_error("integer")),
                }
            }
            _ => Err(self.type_error("number")),
        }
    }

    pub fn float(&self) -> Result<f64> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::Number(NumberRepr::Owned(n)) => {
                n.as_f64().ok_or_else(|| self.type_error("float"))
            }
            NodeKind::Number(NumberRepr::Lexeme) => self
                .lexeme()
                .parse::<f64>()
                .map_err(|_| self.type_error("float")),
            _ => Err(self.type_error("number")),
        }
    }

    pub fn boolean(&self) -> Result<bool> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::Bool(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    /// Parse the string value as an RFC 3339 timestamp.
    pub fn time(&self) -> Result<DateTime<FixedOffset>> {
        let s = self.string()?;
        DateTime::parse_from_rfc3339(&s).map_err(|e| Error::Time {
            path: self.path(),
            message: e.to_string(),
        })
    }

    /// The elements of an array node, fully materialized.
    pub fn array(&self) -> Result<Vec<Node>> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::Array(_) => {
                self.parse_all_array();
                Ok(self.with_array(|st| st.children.clone()))
            }
            _ => Err(self.type_error("array")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Null)
    }

    /// Forcing accessor: panics instead of returning an error.
    pub fn must_string(&self) -> String {
        self.string().expect("must_string on a non-string node")
    }

    /// Forcing accessor: panics instead of returning an error.
    pub fn must_int(&self) -> i64 {
        self.int().expect("must_int on a non-integer node")
    }

    /// Forcing accessor: panics instead of returning an error.
    pub fn must_float(&self) -> f64 {
        self.float().expect("must_float on a non-number node")
    }

    /// Forcing accessor: panics instead of returning an error.
    pub fn must_bool(&self) -> bool {
        self.boolean().expect("must_bool on a non-bool node")
    }

    /// The parent node, `None` at the root and on synthetic aggregates.
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.upgrade().map(|inner| Node { inner })
    }

    /// Textual path from the root, e.g. `.store.book[0]`. Diagnostic only.
    pub fn path(&self) -> String {
        let mut segs = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(n) = cur {
            match &n.inner.seg {
                Segment::Root | Segment::None => {}
                Segment::Key(k) => {
                    if is_plain_key(k) {
                        segs.push(format!(".{k}"));
                    } else {
                        segs.push(format!("[{k:?}]"));
                    }
                }
                Segment::Index(i) => segs.push(format!("[{i}]")),
            }
            cur = n.parent();
        }
        segs.reverse();
        segs.concat()
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::Type {
            expected,
            found: self.node_type(),
            path: self.path(),
        }
    }

    /// Number lexeme as text. Only meaningful on lazily cut numbers.
    pub(crate) fn lexeme(&self) -> &str {
        self.inner
            .raw
            .as_deref()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .unwrap_or("")
    }

    pub(crate) fn with_object<R>(&self, f: impl FnOnce(&mut ObjectState) -> R) -> R {
        match &self.inner.kind {
            NodeKind::Object(m) => f(&mut m.lock().expect("object state lock poisoned")),
            _ => unreachable!("with_object on a non-object node"),
        }
    }

    pub(crate) fn with_array<R>(&self, f: impl FnOnce(&mut ArrayState) -> R) -> R {
        match &self.inner.kind {
            NodeKind::Array(m) => f(&mut m.lock().expect("array state lock poisoned")),
            _ => unreachable!("with_array on a non-array node"),
        }
    }

    /// Fully parse the immediate children of every container beneath this
    /// node. This is the materialization step behind the first write.
    pub(crate) fn parse_deep(&self) {
        match &self.inner.kind {
            NodeKind::Object(_) => {
                self.parse_all_object();
                let children: Vec<Node> =
                    self.with_object(|st| st.children.values().cloned().collect());
                for child in children {
                    child.parse_deep();
                }
            }
            NodeKind::Array(_) => {
                self.parse_all_array();
                let children: Vec<Node> = self.with_array(|st| st.children.clone());
                for child in children {
                    child.parse_deep();
                }
            }
            _ => {}
        }
    }

    /// Dirty this node and every ancestor. Containers are fully parsed
    /// first so that re-serialization sees the complete child set.
    pub(crate) fn mark_dirty(&self) {
        let mut cur = Some(self.clone());
        while let Some(n) = cur {
            match &n.inner.kind {
                NodeKind::Object(_) => {
                    n.parse_all_object();
                    n.with_object(|st| st.dirty = true);
                }
                NodeKind::Array(_) => {
                    n.parse_all_array();
                    n.with_array(|st| st.dirty = true);
                }
                _ => {}
            }
            cur = n.parent();
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        match &self.inner.kind {
            NodeKind::Object(m) => m.lock().expect("object state lock poisoned").dirty,
            NodeKind::Array(m) => m.lock().expect("array state lock poisoned").dirty,
            _ => self.inner.raw.is_none(),
        }
    }

    /// Whether the container has walked all of its raw children.
    pub(crate) fn is_parsed(&self) -> bool {
        match &self.inner.kind {
            NodeKind::Object(m) => m.lock().expect("object state lock poisoned").parsed,
            NodeKind::Array(m) => m.lock().expect("array state lock poisoned").parsed,
            _ => true,
        }
    }
}

/// One member visited by [`Node::for_each`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member<'a> {
    Key(&'a str),
    Index(usize),
}

fn is_plain_key(k: &str) -> bool {
    !k.is_empty()
        && k.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("type", &self.node_type());
        let path = self.path();
        if !path.is_empty() {
            s.field("path", &path);
        }
        if let Some(e) = self.error() {
            s.field("error", &e.to_string());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use pretty_assertions::assert_eq;

    fn root(input: &'static str) -> Node {
        Document::parse(input).expect("valid input").root()
    }

    #[test]
    fn lazy_get_materializes_only_the_demanded_key() {
        let node = root(r#"{"a": {"deep": 1}, "b": [1, 2], "c": "x"}"#);
        let b = node.get("b");
        assert_eq!(b.node_type(), NodeType::Array);
        // Only `b` was touched; the object is still unparsed.
        assert!(!node.is_parsed());
        assert_eq!(node.with_object(|st| st.children.len()), 1);
    }

    #[test]
    fn get_after_full_parse_does_not_rescan() {
        let node = root(r#"{"a": 1, "b": 2}"#);
        assert_eq!(node.len(), 2);
        assert!(node.is_parsed());
        assert_eq!(node.get("a").int().unwrap(), 1);
        assert!(!node.get("missing").is_valid());
    }

    #[test]
    fn missing_key_is_invalid_and_sticky() {
        let node = root(r#"{"a": 1}"#);
        let missing = node.get("nope");
        assert!(!missing.is_valid());
        // Further operations short-circuit.
        let deeper = missing.get("x").index(0);
        assert!(!deeper.is_valid());
        assert_eq!(deeper.error(), missing.error());
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let node = root(r#"{"xs": [10, 20, 30]}"#);
        let xs = node.get("xs");
        assert_eq!(xs.index(-1).int().unwrap(), 30);
        assert_eq!(xs.index(0).int().unwrap(), 10);
        assert!(!xs.index(3).is_valid());
        assert!(!xs.index(-4).is_valid());
    }

    #[test]
    fn string_decode_is_cached_and_unescapes() {
        let node = root(r#"{"s": "a\nb", "plain": "xy"}"#);
        assert_eq!(node.get("s").string().unwrap(), "a\nb");
        assert_eq!(node.get("s").string().unwrap(), "a\nb");
        assert_eq!(node.get("plain").string().unwrap(), "xy");
    }

    #[test]
    fn int_coerces_integral_floats() {
        let node = root(r#"{"f": 20.0, "g": 20.5, "i": 7}"#);
        assert_eq!(node.get("f").int().unwrap(), 20);
        assert_eq!(node.get("i").int().unwrap(), 7);
        assert!(node.get("g").int().is_err());
        assert_eq!(node.get("g").float().unwrap(), 20.5);
    }

    #[test]
    fn time_parses_rfc3339_only() {
        let node = root(r#"{"t": "2020-05-01T12:30:00Z", "bad": "May 1st"}"#);
        let t = node.get("t").time().unwrap();
        assert_eq!(t.timestamp(), 1_588_336_200);
        assert!(matches!(
            node.get("bad").time(),
            Err(Error::Time { .. })
        ));
    }

    #[test]
    fn paths_render_for_diagnostics() {
        let node = root(r#"{"store": {"book": [{"price": 1}]}}"#);
        let price = node.get("store").get("book").index(0).get("price");
        assert_eq!(price.path(), ".store.book[0].price");
        assert_eq!(price.parent().unwrap().path(), ".store.book[0]");
    }

    #[test]
    fn parent_links_point_back_up() {
        let node = root(r#"{"a": {"b": 1}}"#);
        let b = node.get("a").get("b");
        let a = b.parent().unwrap();
        assert_eq!(a.path(), ".a");
        assert!(a.parent().unwrap().parent().is_none());
    }

    #[test]
    fn set_dirties_the_whole_path() {
        let node = root(r#"{"a": {"b": 1}}"#);
        let a = node.get("a");
        a.set("c", 2).unwrap();
        assert!(a.is_dirty());
        assert!(node.is_dirty());
        assert_eq!(a.get("c").int().unwrap(), 2);
        // Untouched sibling still reads fine.
        assert_eq!(a.get("b").int().unwrap(), 1);
    }

    #[test]
    fn append_requires_an_array() {
        let node = root(r#"{"xs": [1], "s": "x"}"#);
        let xs = node.get("xs");
        xs.append(2).unwrap();
        assert_eq!(xs.len(), 2);
        assert_eq!(xs.index(1).int().unwrap(), 2);
        assert!(matches!(
            node.get("s").append(1),
            Err(Error::NotAnArray { .. })
        ));
    }

    #[test]
    fn for_each_preserves_array_document_order() {
        let node = root(r#"{"xs": [3, 1, 2]}"#);
        let mut seen = Vec::new();
        node.get("xs").for_each(|_, v| seen.push(v.int().unwrap()));
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[test]
    fn user_functions_are_shared_document_wide() {
        let node = root(r#"{"a": {"b": 5}}"#);
        node.register_func("double", |n| {
            Node::from_nodes(vec![n.clone(), n.clone()])
        });
        let b = node.get("a").get("b");
        assert_eq!(b.call_func("double").len(), 2);
        assert!(!b.call_func("unknown").is_valid());
        assert_eq!(node.func_names(), vec!["double".to_string()]);
        assert!(node.remove_func("double"));
        assert!(!node.remove_func("double"));
    }
}
