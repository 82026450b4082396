//! Path compilation and evaluation.
//!
//! A path string compiles into a stream of [`lexer::PathOp`]s which the
//! evaluator applies step by step. Plain key chains skip compilation
//! entirely: they resolve through the lazy `get`, one raw scan per
//! segment, which is the fast path for the extract-a-few-fields workload.

pub(crate) mod eval;
pub(crate) mod lexer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::trace;

use crate::error::{NodeType, Result};
use crate::node::Node;
use lexer::PathOp;

/// Tokenization is memoized per path string, process-wide. The cache is
/// bounded; at capacity it is dropped wholesale rather than evicted.
static TOKEN_CACHE: Lazy<Mutex<HashMap<String, Arc<Vec<PathOp>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

const TOKEN_CACHE_CAP: usize = 512;

pub(crate) fn tokenize_cached(path: &str) -> Result<Arc<Vec<PathOp>>> {
    if let Some(ops) = TOKEN_CACHE
        .lock()
        .expect("token cache lock poisoned")
        .get(path)
    {
        return Ok(ops.clone());
    }
    let ops = Arc::new(lexer::tokenize(path)?);
    let mut cache = TOKEN_CACHE.lock().expect("token cache lock poisoned");
    if cache.len() >= TOKEN_CACHE_CAP {
        cache.clear();
    }
    cache.insert(path.to_owned(), ops.clone());
    Ok(ops)
}

pub(crate) fn query(root: &Node, path: &str) -> Node {
    if is_plain_key_path(path) {
        if let Some(hit) = fast_query(root, path) {
            trace!(path, "fast path query");
            return hit;
        }
    }
    match tokenize_cached(path) {
        Ok(ops) => eval::eval(root, &ops),
        Err(e) => root.invalid(e),
    }
}

/// A chain of plain keys separated by `/` or `.`, with none of the
/// operator characters. `..` and `//` both spell recursive descent, so
/// either doubled separator disqualifies the path. Strictly
/// semantics-preserving with the tokenized route; it just never allocates
/// a token stream.
fn is_plain_key_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains("..")
        && !path.contains("//")
        && path
            .chars()
            .all(|c| !matches!(c, '[' | ']' | '*' | '\'' | '"' | '@') && !c.is_whitespace())
}

/// Resolve a plain key chain through the lazy `get`. Returns `None` when
/// a segment lands on an array, where the grammar projects the key across
/// the elements; the tokenized evaluator takes over so both routes return
/// equal values.
fn fast_query(root: &Node, path: &str) -> Option<Node> {
    let mut current = root.clone();
    for seg in path.split(|c| c == '/' || c == '.') {
        if seg.is_empty() {
            continue;
        }
        if !current.is_valid() {
            return Some(current);
        }
        if current.node_type() == NodeType::Array {
            return None;
        }
        current = current.get(seg);
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn fast_path_detection() {
        assert!(is_plain_key_path("a/b/c"));
        assert!(is_plain_key_path("a.b.c"));
        assert!(is_plain_key_path("/leading"));
        assert!(!is_plain_key_path("a..b"));
        assert!(!is_plain_key_path("a//b"));
        assert!(!is_plain_key_path("//price"));
        assert!(!is_plain_key_path("a[0]"));
        assert!(!is_plain_key_path("a.*"));
        assert!(!is_plain_key_path("'q'/b"));
        assert!(!is_plain_key_path(""));
    }

    #[test]
    fn fast_and_slow_paths_agree() {
        let doc = Document::parse(r#"{"a": {"b": {"c": 41}}}"#).unwrap();
        let fast = doc.query("a/b/c");
        // Forcing the tokenized route with an equivalent path.
        let slow = doc.query("['a']/b/c");
        assert_eq!(fast.int().unwrap(), 41);
        assert_eq!(slow.int().unwrap(), 41);
        assert_eq!(fast.raw(), slow.raw());
    }

    #[test]
    fn plain_chains_landing_on_arrays_project_like_the_evaluator() {
        let doc =
            Document::parse(r#"{"rows": [{"v": 1}, {"x": 9}, {"v": 3}, 5]}"#).unwrap();
        let fast = doc.query("rows/v");
        let slow = doc.query("['rows']/v");
        assert_eq!(fast.node_type(), crate::NodeType::Array);
        assert_eq!(fast.len(), 2);
        assert_eq!(fast.raw(), slow.raw());
    }

    #[test]
    fn tokenization_is_memoized() {
        let path = "memoized/example[0]";
        let first = tokenize_cached(path).unwrap();
        let second = tokenize_cached(path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_path_returns_the_root() {
        let doc = Document::parse(r#"{"a": 1}"#).unwrap();
        assert_eq!(doc.query("").raw(), doc.bytes());
    }
}
