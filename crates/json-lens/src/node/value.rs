//! Conversions between the lazy tree and owned `serde_json` values.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::error::Result;
use crate::funcs::FuncRegistry;
use crate::node::{
    ArrayState, Node, NodeInner, NodeKind, NumberRepr, ObjectState, Segment, StringState,
};

impl Node {
    /// Build an owned subtree from a dynamic value. Owned containers are
    /// born parsed and dirty: they have no raw slice to fall back on.
    pub(crate) fn from_value(
        value: &Value,
        parent: Weak<NodeInner>,
        seg: Segment,
        funcs: &FuncRegistry,
    ) -> Node {
        let kind = match value {
            Value::Object(_) => NodeKind::Object(Mutex::new(ObjectState {
                children: Default::default(),
                parsed: true,
                dirty: true,
            })),
            Value::Array(_) => NodeKind::Array(Mutex::new(ArrayState {
                children: Vec::new(),
                parsed: true,
                dirty: true,
                scan: 0,
            })),
            Value::String(s) => NodeKind::String(Mutex::new(StringState {
                decoded: Some(s.clone()),
            })),
            Value::Number(n) => NodeKind::Number(NumberRepr::Owned(n.clone())),
            Value::Bool(b) => NodeKind::Bool(*b),
            Value::Null => NodeKind::Null,
        };
        let node = Node {
            inner: Arc::new(NodeInner {
                kind,
                raw: None,
                parent,
                seg,
                funcs: funcs.clone(),
            }),
        };
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    let child = Node::from_value(
                        v,
                        Arc::downgrade(&node.inner),
                        Segment::Key(k.clone()),
                        funcs,
                    );
                    node.with_object(|st| {
                        st.children.insert(k.clone(), child.clone());
                    });
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    let child = Node::from_value(
                        v,
                        Arc::downgrade(&node.inner),
                        Segment::Index(i),
                        funcs,
                    );
                    node.with_array(|st| st.children.push(child.clone()));
                }
            }
            _ => {}
        }
        node
    }

    /// Materialize this subtree as an owned dynamic value. This is the
    /// "interface-typed view" the predicate evaluator works over.
    pub fn to_value(&self) -> Result<Value> {
        match &self.inner.kind {
            NodeKind::Invalid(e) => Err(e.clone()),
            NodeKind::Null => Ok(Value::Null),
            NodeKind::Bool(b) => Ok(Value::Bool(*b)),
            NodeKind::String(_) => Ok(Value::String(self.string()?)),
            NodeKind::Number(NumberRepr::Owned(n)) => Ok(Value::Number(n.clone())),
            NodeKind::Number(NumberRepr::Lexeme) => {
                let n: serde_json::Number =
                    serde_json::from_str(self.lexeme()).map_err(|e| {
                        crate::error::Error::InvalidValue(format!(
                            "number lexeme {:?}: {e}",
                            self.lexeme()
                        ))
                    })?;
                Ok(Value::Number(n))
            }
            NodeKind::Object(_) => {
                self.parse_all_object();
                let pairs: Vec<(String, Node)> = self.with_object(|st| {
                    st.children
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                });
                let mut map = serde_json::Map::with_capacity(pairs.len());
                for (k, v) in pairs {
                    map.insert(k, v.to_value()?);
                }
                Ok(Value::Object(map))
            }
            NodeKind::Array(_) => {
                self.parse_all_array();
                let children: Vec<Node> = self.with_array(|st| st.children.clone());
                let mut items = Vec::with_capacity(children.len());
                for child in children {
                    items.push(child.to_value()?);
                }
                Ok(Value::Array(items))
            }
        }
    }
}
