//! The document: parse entry points, serialization, and the
//! materialize-on-write mutation layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, NodeType, Result};
use crate::funcs::FuncRegistry;
use crate::node::{Node, Segment};
use crate::scan;

/// Tuning knobs for a document.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Memoize `query` results by path string. Entries are served only
    /// while the document is unmodified; any write invalidates the cache.
    pub cache_queries: bool,
}

/// A parsed JSON document.
///
/// Parsing validates the input eagerly but materializes nothing: nodes
/// are cut out of the raw bytes as they are demanded. The first `set` or
/// `delete` materializes the whole tree; reads keep working, and
/// [`Document::bytes`] switches from the original input to a
/// re-serialization.
///
/// ## Example
///
/// ```
/// use json_lens::Document;
///
/// let doc = Document::parse(r#"{"store":{"book":[{"price":8.95},{"price":12.99}]}}"#)?;
/// let prices = doc.query("store..price");
/// assert_eq!(prices.len(), 2);
/// assert_eq!(prices.index(0).float()?, 8.95);
///
/// doc.set("store.open", true)?;
/// assert_eq!(doc.query("store.open").boolean()?, true);
/// # Ok::<(), json_lens::Error>(())
/// ```
pub struct Document {
    root: Mutex<Node>,
    raw: Bytes,
    config: Config,
    materialized: AtomicBool,
    query_cache: Mutex<HashMap<String, Node>>,
}

const QUERY_CACHE_CAP: usize = 256;

impl Document {
    /// Parse a document, validating the input eagerly.
    pub fn parse(input: impl Into<Bytes>) -> Result<Document> {
        Document::parse_with(input, Config::default())
    }

    /// Parse from a borrowed string, copying it.
    pub fn parse_str(input: &str) -> Result<Document> {
        Document::parse(Bytes::copy_from_slice(input.as_bytes()))
    }

    /// Parse from a borrowed slice, copying it.
    pub fn parse_slice(input: &[u8]) -> Result<Document> {
        Document::parse(Bytes::copy_from_slice(input))
    }

    /// Parse with explicit [`Config`].
    pub fn parse_with(input: impl Into<Bytes>, config: Config) -> Result<Document> {
        let raw: Bytes = input.into();
        scan::validate(&raw)?;
        let start = scan::skip_ws(&raw, 0);
        let end = raw
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .map(|p| p + 1)
            .unwrap_or(raw.len());
        let root = Node::root(raw.slice(start..end), FuncRegistry::default());
        debug!(len = raw.len(), "parsed document");
        Ok(Document {
            root: Mutex::new(root),
            raw,
            config,
            materialized: AtomicBool::new(false),
            query_cache: Mutex::new(HashMap::new()),
        })
    }

    /// The root node.
    pub fn root(&self) -> Node {
        self.root.lock().expect("document root lock poisoned").clone()
    }

    /// The current serialization: the input bytes verbatim until the
    /// first write, a re-serialization afterwards.
    pub fn bytes(&self) -> Bytes {
        let root = self.root();
        if !root.is_dirty() {
            return self.raw.clone();
        }
        root.raw()
    }

    /// Evaluate a path against the root. See the crate docs for the
    /// grammar; failures come back as an invalid node.
    pub fn query(&self, path: &str) -> Node {
        let root = self.root();
        let cacheable = self.config.cache_queries && !root.is_dirty();
        if cacheable {
            if let Some(hit) = self
                .query_cache
                .lock()
                .expect("query cache lock poisoned")
                .get(path)
            {
                trace!(path, "query cache hit");
                return hit.clone();
            }
        }
        let result = root.query(path);
        if cacheable {
            let mut cache = self.query_cache.lock().expect("query cache lock poisoned");
            if cache.len() >= QUERY_CACHE_CAP {
                cache.clear();
            }
            cache.insert(path.to_owned(), result.clone());
        }
        result
    }

    /// `false` only when the root itself is an invalid node, which a
    /// successful parse never produces.
    pub fn is_valid(&self) -> bool {
        self.root().is_valid()
    }

    /// Whether a write has materialized the document.
    pub fn is_materialized(&self) -> bool {
        self.materialized.load(Ordering::SeqCst)
    }

    /// Install `value` at a dotted path, creating missing intermediate
    /// objects. Numeric segments address array elements and must be in
    /// bounds. An empty path replaces the root value.
    pub fn set<T: Serialize>(&self, path: &str, value: T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::InvalidValue(e.to_string()))?;
        self.materialize();
        self.invalidate_queries();

        let segs: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segs.is_empty() {
            let mut root = self.root.lock().expect("document root lock poisoned");
            let funcs = root.inner.funcs.clone();
            *root = Node::from_value(&value, Weak::new(), Segment::Root, &funcs);
            return Ok(());
        }

        let mut current = self.root();
        for seg in &segs[..segs.len() - 1] {
            current = descend_or_create(&current, seg)?;
        }
        install(&current, segs[segs.len() - 1], value)
    }

    /// Remove the key addressed by a dotted path. The root cannot be
    /// deleted, and array elements cannot be removed.
    pub fn delete(&self, path: &str) -> Result<()> {
        let segs: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let (last, parents) = match segs.split_last() {
            Some(split) => split,
            None => return Err(Error::DeleteRoot),
        };
        self.materialize();
        self.invalidate_queries();

        let mut current = self.root();
        for seg in parents {
            current = descend(&current, seg)?;
        }
        match current.node_type() {
            NodeType::Object => {
                current.parse_all_object();
                let removed =
                    current.with_object(|st| st.children.shift_remove(*last).is_some());
                if !removed {
                    return Err(Error::KeyNotFound {
                        key: (*last).to_owned(),
                        path: current.path(),
                    });
                }
                current.mark_dirty();
                Ok(())
            }
            NodeType::Array => Err(Error::DeleteArrayElement),
            kind => Err(Error::SetThroughScalar {
                kind,
                segment: (*last).to_owned(),
            }),
        }
    }

    /// Register a user function on the document root.
    pub fn register_func<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(&Node) -> Node + Send + Sync + 'static,
    {
        self.root().register_func(name, f);
        self
    }

    /// First write: fully parse the lazy tree so every node owns its
    /// children and edits never race a raw scan.
    fn materialize(&self) {
        if !self.materialized.swap(true, Ordering::SeqCst) {
            debug!("materializing document on first write");
            self.root().parse_deep();
        }
    }

    fn invalidate_queries(&self) {
        self.query_cache
            .lock()
            .expect("query cache lock poisoned")
            .clear();
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.raw.len())
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// One `set` step below the leaf: enter `seg`, creating a missing object
/// member on the way. Array segments must parse as in-bounds indices.
fn descend_or_create(current: &Node, seg: &str) -> Result<Node> {
    match current.node_type() {
        NodeType::Object => {
            let child = current.get(seg);
            if child.is_valid() {
                return Ok(child);
            }
            current.set(seg, Value::Object(Default::default()))?;
            Ok(current.get(seg))
        }
        NodeType::Array => descend_index(current, seg),
        kind => Err(Error::SetThroughScalar {
            kind,
            segment: seg.to_owned(),
        }),
    }
}

/// One `delete` step below the leaf: enter `seg`, never creating.
fn descend(current: &Node, seg: &str) -> Result<Node> {
    match current.node_type() {
        NodeType::Object => {
            let child = current.get(seg);
            match child.error() {
                None => Ok(child),
                Some(e) => Err(e.clone()),
            }
        }
        NodeType::Array => descend_index(current, seg),
        kind => Err(Error::SetThroughScalar {
            kind,
            segment: seg.to_owned(),
        }),
    }
}

fn descend_index(current: &Node, seg: &str) -> Result<Node> {
    let idx: i64 = seg.parse().map_err(|_| Error::BadArrayIndex {
        segment: seg.to_owned(),
        message: "not an integer".into(),
    })?;
    if idx < 0 {
        return Err(Error::BadArrayIndex {
            segment: seg.to_owned(),
            message: "negative index".into(),
        });
    }
    let child = current.index(idx);
    match child.error() {
        None => Ok(child),
        Some(e) => Err(e.clone()),
    }
}

/// Install the value at the final segment.
fn install(parent: &Node, seg: &str, value: Value) -> Result<()> {
    match parent.node_type() {
        NodeType::Object => parent.set(seg, value),
        NodeType::Array => {
            let idx: i64 = seg.parse().map_err(|_| Error::BadArrayIndex {
                segment: seg.to_owned(),
                message: "not an integer".into(),
            })?;
            parent.parse_all_array();
            let len = parent.with_array(|st| st.children.len());
            if idx < 0 || idx as usize >= len {
                return Err(Error::BadArrayIndex {
                    segment: seg.to_owned(),
                    message: format!("out of bounds (len {len})"),
                });
            }
            let child = Node::from_value(
                &value,
                Arc::downgrade(&parent.inner),
                Segment::Index(idx as usize),
                &parent.inner.funcs,
            );
            parent.with_array(|st| st.children[idx as usize] = child.clone());
            parent.mark_dirty();
            Ok(())
        }
        kind => Err(Error::SetThroughScalar {
            kind,
            segment: seg.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bytes_is_verbatim_until_the_first_write() {
        let input = r#"  {"a": [1, 2],  "b": "x"}  "#;
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.bytes(), input.as_bytes());
        assert!(!doc.is_materialized());

        doc.set("c", 3).unwrap();
        assert!(doc.is_materialized());
        let reparsed: Value = serde_json::from_slice(&doc.bytes()).unwrap();
        assert_eq!(reparsed, json!({"a": [1, 2], "b": "x", "c": 3}));
    }

    #[test]
    fn set_creates_missing_intermediate_objects() {
        let doc = Document::parse(r#"{"a": {"b": 1}}"#).unwrap();
        doc.set("a.c.d", 2).unwrap();
        assert_eq!(doc.query("a.c.d").int().unwrap(), 2);
        assert_eq!(doc.query("a.b").int().unwrap(), 1);
    }

    #[test]
    fn set_replaces_array_elements_in_bounds_only() {
        let doc = Document::parse(r#"{"xs": [1, 2, 3]}"#).unwrap();
        doc.set("xs.1", "two").unwrap();
        assert_eq!(doc.query("xs[1]").string().unwrap(), "two");
        assert!(matches!(
            doc.set("xs.9", 0),
            Err(Error::BadArrayIndex { .. })
        ));
        assert!(matches!(
            doc.set("xs.-1", 0),
            Err(Error::BadArrayIndex { .. })
        ));
    }

    #[test]
    fn set_through_a_scalar_fails() {
        let doc = Document::parse(r#"{"a": 1}"#).unwrap();
        assert!(matches!(
            doc.set("a.b.c", 2),
            Err(Error::SetThroughScalar { .. })
        ));
    }

    #[test]
    fn empty_path_replaces_the_root() {
        let doc = Document::parse(r#"{"a": 1}"#).unwrap();
        doc.set("", json!([1, 2, 3])).unwrap();
        assert_eq!(doc.query("[1]").int().unwrap(), 2);
        assert_eq!(doc.bytes(), b"[1,2,3]".as_slice());
    }

    #[test]
    fn delete_removes_keys_but_never_the_root_or_array_elements() {
        let doc = Document::parse(r#"{"a": {"b": 1, "c": 2}, "xs": [1]}"#).unwrap();
        doc.delete("a.b").unwrap();
        assert!(!doc.query("a.b").is_valid());
        assert_eq!(doc.query("a.c").int().unwrap(), 2);

        assert!(matches!(doc.delete(""), Err(Error::DeleteRoot)));
        assert!(matches!(doc.delete("xs.0"), Err(Error::DeleteArrayElement)));
        assert!(matches!(doc.delete("a.gone"), Err(Error::KeyNotFound { .. })));
    }

    #[test]
    fn query_cache_serves_until_a_write() {
        let doc = Document::parse_with(
            Bytes::from_static(br#"{"a": {"b": 41}}"#),
            Config {
                cache_queries: true,
            },
        )
        .unwrap();
        let first = doc.query("a/b");
        let second = doc.query("a/b");
        assert!(Arc::ptr_eq(&first.inner, &second.inner));

        // A write invalidates the cache; reads still resolve.
        doc.set("a.c", 1).unwrap();
        assert_eq!(doc.query("a/b").int().unwrap(), 41);
        assert_eq!(doc.query("a/c").int().unwrap(), 1);
    }

    #[test]
    fn malformed_input_fails_eagerly() {
        assert!(matches!(
            Document::parse(r#"{"a": "#),
            Err(Error::Syntax { .. })
        ));
        assert!(Document::parse_str("[1, 2,]").is_err());
        assert!(Document::parse_slice(b"  [1, 2]  ").is_ok());
    }
}
