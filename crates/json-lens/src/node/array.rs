//! Lazy element scanning for array nodes.

use std::ops::Range;
use std::sync::Arc;

use crate::error::Error;
use crate::node::{ArrayState, Node, NodeKind, Segment};
use crate::scan;

/// Iterator over the raw element slices of an array, without parsing them.
/// The slice must have passed [`scan::validate`]; on anything malformed the
/// iterator simply stops.
pub(crate) struct RawElems<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> RawElems<'a> {
    /// `buf` must begin at the array's `[`.
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        let done = buf.first() != Some(&b'[');
        RawElems {
            buf,
            pos: scan::skip_ws(buf, 1),
            done,
        }
    }
}

impl Iterator for RawElems<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.get(self.pos) == Some(&b']') {
            self.done = true;
            return None;
        }
        let value = match scan::value_slice(self.buf, self.pos) {
            Some(r) => r,
            None => {
                self.done = true;
                return None;
            }
        };
        let pos = scan::skip_ws(self.buf, value.end);
        match self.buf.get(pos) {
            Some(&b',') => self.pos = scan::skip_ws(self.buf, pos + 1),
            _ => self.done = true,
        }
        Some(value)
    }
}

impl Node {
    /// Random access by index. Walks unscanned elements only as far as the
    /// demanded index; negative indices force a full walk to learn the
    /// length first.
    pub(crate) fn array_index(&self, idx: i64) -> Node {
        let state = match &self.inner.kind {
            NodeKind::Array(m) => m,
            _ => unreachable!("array_index on a non-array node"),
        };
        let mut st = state.lock().expect("array state lock poisoned");

        let resolved = if idx < 0 {
            self.scan_elements(&mut st, usize::MAX);
            idx + st.children.len() as i64
        } else {
            self.scan_elements(&mut st, idx as usize + 1);
            idx
        };
        if resolved < 0 {
            return self.invalid(Error::IndexOutOfBounds {
                index: idx,
                len: st.children.len(),
                path: self.path(),
            });
        }
        match st.children.get(resolved as usize) {
            Some(child) => child.clone(),
            None => {
                // Ran out of raw elements before reaching the index.
                self.scan_elements(&mut st, usize::MAX);
                self.invalid(Error::IndexOutOfBounds {
                    index: idx,
                    len: st.children.len(),
                    path: self.path(),
                })
            }
        }
    }

    pub(crate) fn parse_all_array(&self) {
        let state = match &self.inner.kind {
            NodeKind::Array(m) => m,
            _ => unreachable!("parse_all_array on a non-array node"),
        };
        let mut st = state.lock().expect("array state lock poisoned");
        self.scan_elements(&mut st, usize::MAX);
    }

    /// Scan raw elements, appending children, until `want` children exist
    /// or the array is exhausted (which flips `parsed`). The resumable
    /// offset in `st.scan` makes repeated partial walks linear overall.
    fn scan_elements(&self, st: &mut ArrayState, want: usize) {
        if st.parsed {
            return;
        }
        let raw = match self.inner.raw.clone() {
            Some(raw) => raw,
            None => {
                st.parsed = true;
                return;
            }
        };
        if st.scan == 0 {
            st.scan = scan::skip_ws(&raw, 1);
        }
        while st.children.len() < want {
            if raw.get(st.scan) == Some(&b']') || st.scan >= raw.len() {
                st.parsed = true;
                return;
            }
            let value = match scan::value_slice(&raw, st.scan) {
                Some(r) => r,
                None => {
                    st.parsed = true;
                    return;
                }
            };
            let child = Node::cut(
                raw.slice(value.clone()),
                Arc::downgrade(&self.inner),
                Segment::Index(st.children.len()),
                self.inner.funcs.clone(),
            );
            st.children.push(child);

            let pos = scan::skip_ws(&raw, value.end);
            match raw.get(pos) {
                Some(&b',') => st.scan = scan::skip_ws(&raw, pos + 1),
                _ => {
                    st.parsed = true;
                    return;
                }
            }
        }
    }
}
