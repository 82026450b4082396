use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::node::Node;

/// A user-defined transformation, invokable from the path language as
/// `[@name]` or through [`Node::call_func`].
pub type NodeFn = Arc<dyn Fn(&Node) -> Node + Send + Sync>;

/// Registry of user functions, shared by every node of a document.
///
/// Cloning the registry clones the handle, not the map: a registration
/// through any node is immediately visible document-wide.
#[derive(Clone, Default)]
pub struct FuncRegistry {
    inner: Arc<Mutex<HashMap<String, NodeFn>>>,
}

impl FuncRegistry {
    pub(crate) fn insert(&self, name: &str, f: NodeFn) {
        self.inner
            .lock()
            .expect("function registry lock poisoned")
            .insert(name.to_owned(), f);
    }

    pub(crate) fn remove(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("function registry lock poisoned")
            .remove(name)
            .is_some()
    }

    pub(crate) fn get(&self, name: &str) -> Option<NodeFn> {
        self.inner
            .lock()
            .expect("function registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Names of every registered function, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .expect("function registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for FuncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncRegistry")
            .field("names", &self.names())
            .finish()
    }
}
