//! Lazy key/value scanning for object nodes.

use std::ops::Range;
use std::sync::Arc;

use crate::error::Error;
use crate::node::{Node, NodeKind, Segment};
use crate::scan;

/// Iterator over the raw key/value pairs of an object slice, without
/// decoding keys or parsing values. Yields the byte range of each key's
/// contents (quotes excluded) and of each complete value.
///
/// The slice must have passed [`scan::validate`]; on anything malformed
/// the iterator simply stops.
pub(crate) struct RawPairs<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> RawPairs<'a> {
    /// `buf` must begin at the object's `{`.
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        let done = buf.first() != Some(&b'{');
        RawPairs {
            buf,
            pos: scan::skip_ws(buf, 1),
            done,
        }
    }
}

impl Iterator for RawPairs<'_> {
    type Item = (Range<usize>, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.get(self.pos) == Some(&b'}') {
            self.done = true;
            return None;
        }
        if self.buf.get(self.pos) != Some(&b'"') {
            self.done = true;
            return None;
        }
        let key_close = match scan::find_matching_quote(self.buf, self.pos) {
            Some(i) => i,
            None => {
                self.done = true;
                return None;
            }
        };
        let key = self.pos + 1..key_close;

        let mut pos = scan::skip_ws(self.buf, key_close + 1);
        if self.buf.get(pos) != Some(&b':') {
            self.done = true;
            return None;
        }
        pos = scan::skip_ws(self.buf, pos + 1);
        let value = match scan::value_slice(self.buf, pos) {
            Some(r) => r,
            None => {
                self.done = true;
                return None;
            }
        };

        pos = scan::skip_ws(self.buf, value.end);
        match self.buf.get(pos) {
            Some(&b',') => self.pos = scan::skip_ws(self.buf, pos + 1),
            _ => {
                // `}` or (impossible on validated input) anything else.
                self.done = true;
            }
        }
        Some((key, value))
    }
}

/// Compare raw (possibly escaped) key bytes against a decoded key without
/// allocating when no backslash is present.
pub(crate) fn key_matches(raw_key: &[u8], key: &str) -> bool {
    if !raw_key.contains(&b'\\') {
        return raw_key == key.as_bytes();
    }
    scan::unescape(raw_key).map(|k| k == key).unwrap_or(false)
}

impl Node {
    /// Lazy lookup: consult the child map, then scan the raw slice for the
    /// demanded key, installing only that child on a hit.
    pub(crate) fn object_get(&self, key: &str) -> Node {
        let state = match &self.inner.kind {
            NodeKind::Object(m) => m,
            _ => unreachable!("object_get on a non-object node"),
        };
        let mut st = state.lock().expect("object state lock poisoned");
        if let Some(child) = st.children.get(key) {
            return child.clone();
        }
        if st.parsed {
            return self.invalid(Error::KeyNotFound {
                key: key.to_owned(),
                path: self.path(),
            });
        }

        let raw = self
            .inner
            .raw
            .clone()
            .expect("unparsed object keeps its raw slice");
        for (key_range, value_range) in RawPairs::new(&raw) {
            if !key_matches(&raw[key_range], key) {
                continue;
            }
            let child = Node::cut(
                raw.slice(value_range),
                Arc::downgrade(&self.inner),
                Segment::Key(key.to_owned()),
                self.inner.funcs.clone(),
            );
            st.children.insert(key.to_owned(), child.clone());
            return child;
        }
        self.invalid(Error::KeyNotFound {
            key: key.to_owned(),
            path: self.path(),
        })
    }

    /// Walk every pair, installing children for keys not yet touched, and
    /// flip `parsed`. Lookups afterwards never rescan the raw bytes.
    pub(crate) fn parse_all_object(&self) {
        let state = match &self.inner.kind {
            NodeKind::Object(m) => m,
            _ => unreachable!("parse_all_object on a non-object node"),
        };
        let mut st = state.lock().expect("object state lock poisoned");
        if st.parsed {
            return;
        }
        if let Some(raw) = self.inner.raw.clone() {
            for (key_range, value_range) in RawPairs::new(&raw) {
                let raw_key = &raw[key_range];
                let key = if raw_key.contains(&b'\\') {
                    match scan::unescape(raw_key) {
                        Ok(k) => k,
                        Err(_) => continue,
                    }
                } else {
                    match std::str::from_utf8(raw_key) {
                        Ok(k) => k.to_owned(),
                        Err(_) => continue,
                    }
                };
                if st.children.contains_key(&key) {
                    continue;
                }
                let child = Node::cut(
                    raw.slice(value_range),
                    Arc::downgrade(&self.inner),
                    Segment::Key(key.clone()),
                    self.inner.funcs.clone(),
                );
                st.children.insert(key, child);
            }
        }
        st.parsed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pairs_walks_nested_values() {
        let buf = br#"{"a": {"x": 1}, "b": [1, {"y": 2}], "c": "s,}"}"#;
        let pairs: Vec<_> = RawPairs::new(buf)
            .map(|(k, v)| {
                (
                    std::str::from_utf8(&buf[k]).unwrap().to_owned(),
                    std::str::from_utf8(&buf[v]).unwrap().to_owned(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_owned(), r#"{"x": 1}"#.to_owned()),
                ("b".to_owned(), r#"[1, {"y": 2}]"#.to_owned()),
                ("c".to_owned(), r#""s,}""#.to_owned()),
            ]
        );
    }

    #[test]
    fn raw_pairs_on_empty_object() {
        assert_eq!(RawPairs::new(b"{}").count(), 0);
        assert_eq!(RawPairs::new(b"{ }").count(), 0);
    }

    #[test]
    fn escaped_keys_match_without_allocation_on_the_plain_side() {
        assert!(key_matches(br#"plain"#, "plain"));
        assert!(!key_matches(br#"plain"#, "other"));
        assert!(key_matches(br#"a\"b"#, "a\"b"));
        assert!(key_matches(br#"tab\tkey"#, "tab\tkey"));
        assert!(!key_matches(br#"a\"b"#, "ab"));
    }
}
