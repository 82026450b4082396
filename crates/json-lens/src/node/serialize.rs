//! Serialization back to JSON text.
//!
//! A clean node (neither it nor anything beneath it was written) hands
//! back its original byte slice verbatim, whitespace included. Anything
//! dirty or synthetic is re-serialized in compact form, with number
//! lexemes preserved from the input where they exist.

use bytes::Bytes;

use crate::node::{Node, NodeKind, NumberRepr};
use crate::scan;

impl Node {
    /// The node's JSON text: the original bytes for clean nodes, a
    /// re-serialization otherwise.
    pub fn raw(&self) -> Bytes {
        if let Some(raw) = self.clean_raw() {
            return raw;
        }
        let mut out = Vec::new();
        self.write_json(&mut out);
        Bytes::from(out)
    }

    /// The original slice, but only while serialization may still use it.
    fn clean_raw(&self) -> Option<Bytes> {
        let raw = self.inner.raw.clone()?;
        if self.is_dirty() {
            return None;
        }
        Some(raw)
    }

    pub(crate) fn write_json(&self, out: &mut Vec<u8>) {
        if let Some(raw) = self.clean_raw() {
            out.extend_from_slice(&raw);
            return;
        }
        match &self.inner.kind {
            NodeKind::Object(_) => {
                // Dirty implies parsed, but owned objects built from
                // values skip the scan; make sure the child set is final.
                self.parse_all_object();
                let pairs: Vec<(String, Node)> = self.with_object(|st| {
                    st.children
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                });
                out.push(b'{');
                for (i, (key, child)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    scan::write_escaped_str(out, key);
                    out.push(b':');
                    child.write_json(out);
                }
                out.push(b'}');
            }
            NodeKind::Array(_) => {
                self.parse_all_array();
                let children: Vec<Node> = self.with_array(|st| st.children.clone());
                out.push(b'[');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    child.write_json(out);
                }
                out.push(b']');
            }
            NodeKind::String(_) => {
                let s = self.string().unwrap_or_default();
                scan::write_escaped_str(out, &s);
            }
            NodeKind::Number(NumberRepr::Owned(n)) => {
                out.extend_from_slice(n.to_string().as_bytes());
            }
            NodeKind::Number(NumberRepr::Lexeme) => {
                out.extend_from_slice(self.lexeme().as_bytes());
            }
            NodeKind::Bool(true) => out.extend_from_slice(b"true"),
            NodeKind::Bool(false) => out.extend_from_slice(b"false"),
            NodeKind::Null | NodeKind::Invalid(_) => out.extend_from_slice(b"null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Document, Node};
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_nodes_return_their_exact_slice() {
        let input = r#"{ "a" : [ 1 ,  2.50 ] , "b" : "x" }"#;
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.root().raw(), input.as_bytes());
        // Touching children does not disturb the raw view.
        assert_eq!(doc.root().get("a").index(1).float().unwrap(), 2.5);
        assert_eq!(doc.root().raw(), input.as_bytes());
        assert_eq!(doc.root().get("a").raw(), "[ 1 ,  2.50 ]".as_bytes());
    }

    #[test]
    fn dirty_nodes_reserialize_compactly() {
        let doc = Document::parse(r#"{ "a" : { "b" : 1 } }"#).unwrap();
        let a = doc.root().get("a");
        a.set("c", true).unwrap();
        assert_eq!(a.raw(), br#"{"b":1,"c":true}"#.as_slice());
    }

    #[test]
    fn number_lexemes_survive_reserialization() {
        let doc = Document::parse(r#"{"n": 1.250e1, "m": 2}"#).unwrap();
        let root = doc.root();
        // Dirty the object without touching `n`.
        root.set("extra", serde_json::Value::Null).unwrap();
        assert_eq!(root.raw(), br#"{"n":1.250e1,"m":2,"extra":null}"#.as_slice());
    }

    #[test]
    fn synthetic_arrays_serialize_their_members() {
        let doc = Document::parse(r#"{"a": 1, "b": "two"}"#).unwrap();
        let synth = Node::from_nodes(vec![doc.root().get("a"), doc.root().get("b")]);
        assert_eq!(synth.raw(), br#"[1,"two"]"#.as_slice());
    }

    #[test]
    fn escapes_are_reemitted_on_owned_strings() {
        let doc = Document::parse(r#"{}"#).unwrap();
        let root = doc.root();
        root.set("s", "a\"b\nc").unwrap();
        assert_eq!(root.raw(), br#"{"s":"a\"b\nc"}"#.as_slice());
    }
}
