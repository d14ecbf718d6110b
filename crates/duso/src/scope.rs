//! Lexical environment chain.
//!
//! A scope frame is an ordered name→value map plus a parent link and a
//! `barrier` flag. Reads walk the whole chain; assignment walks upward
//! looking for an existing binding but never continues past a barrier frame,
//! which is how spawned and parallel units stay write-isolated from the
//! environment they snapshot. The variable map is the same shared type as an
//! object's storage, so a method call can splice the receiver in as a frame
//! and property writes land directly on the object.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::value::{ObjectRef, Value};

struct ScopeFrame {
    vars: ObjectRef,
    parent: Option<Scope>,
    /// Stops the upward assignment walk. Root frames of isolated units are
    /// barriers; ordinary call and block frames are not.
    barrier: bool,
}

/// A handle to one frame of the environment chain. Cloning is cheap and
/// shares the frame.
#[derive(Clone)]
pub struct Scope(Arc<ScopeFrame>);

impl Scope {
    /// A fresh root frame with no parent. Roots are barriers trivially.
    #[must_use]
    pub fn root() -> Self {
        Self(Arc::new(ScopeFrame {
            vars: Arc::new(RwLock::new(IndexMap::new())),
            parent: None,
            barrier: true,
        }))
    }

    /// A child frame for a block or function call.
    #[must_use]
    pub fn child(&self) -> Self {
        self.new_frame(false)
    }

    /// A child frame that blocks upward assignment, for parallel/spawned
    /// units layered over a read-through parent.
    #[must_use]
    pub fn child_barrier(&self) -> Self {
        self.new_frame(true)
    }

    fn new_frame(&self, barrier: bool) -> Self {
        Self(Arc::new(ScopeFrame {
            vars: Arc::new(RwLock::new(IndexMap::new())),
            parent: Some(self.clone()),
            barrier,
        }))
    }

    /// A frame whose variable map *is* the given object, used for method
    /// calls: reads see the object's keys, and writes to existing keys land
    /// on the object itself.
    #[must_use]
    pub fn object_frame(&self, object: ObjectRef) -> Self {
        Self(Arc::new(ScopeFrame {
            vars: object,
            parent: Some(self.clone()),
            barrier: false,
        }))
    }

    /// Looks a name up through the whole chain; first hit wins.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = &self.0;
        loop {
            if let Some(value) = frame.vars.read().get(name) {
                return Some(value.clone());
            }
            frame = &frame.parent.as_ref()?.0;
        }
    }

    /// Assignment without `var`: updates the closest existing binding, but
    /// never walks past a barrier frame; a miss creates the binding in this
    /// frame.
    pub fn assign(&self, name: &str, value: Value) {
        let mut frame = &self.0;
        loop {
            {
                let mut vars = frame.vars.write();
                if vars.contains_key(name) {
                    vars.insert(name.to_owned(), value);
                    return;
                }
            }
            if frame.barrier {
                break;
            }
            match &frame.parent {
                Some(parent) => frame = &parent.0,
                None => break,
            }
        }
        self.declare(name, value);
    }

    /// `var` declaration: always binds in this frame, shadowing any outer
    /// binding of the same name.
    pub fn declare(&self, name: &str, value: Value) {
        self.0.vars.write().insert(name.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_updates_ancestor_binding() {
        let root = Scope::root();
        root.declare("n", Value::Number(1.0));
        let inner = root.child().child();
        inner.assign("n", Value::Number(2.0));
        assert_eq!(root.lookup("n"), Some(Value::Number(2.0)));
    }

    #[test]
    fn assignment_miss_creates_local() {
        let root = Scope::root();
        let inner = root.child();
        inner.assign("fresh", Value::Number(1.0));
        assert_eq!(root.lookup("fresh"), None);
        assert_eq!(inner.lookup("fresh"), Some(Value::Number(1.0)));
    }

    #[test]
    fn var_shadows_outer_binding() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0));
        let inner = root.child();
        inner.declare("x", Value::Number(2.0));
        assert_eq!(inner.lookup("x"), Some(Value::Number(2.0)));
        assert_eq!(root.lookup("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn barrier_blocks_upward_writes_but_not_reads() {
        let root = Scope::root();
        root.declare("shared", Value::Number(1.0));
        let unit = root.child_barrier();
        assert_eq!(unit.lookup("shared"), Some(Value::Number(1.0)));
        unit.assign("shared", Value::Number(9.0));
        assert_eq!(root.lookup("shared"), Some(Value::Number(1.0)));
        assert_eq!(unit.lookup("shared"), Some(Value::Number(9.0)));
    }

    #[test]
    fn object_frame_writes_back_to_object() {
        let root = Scope::root();
        let mut entries = IndexMap::new();
        entries.insert("count".to_owned(), Value::Number(0.0));
        let object: ObjectRef = Arc::new(RwLock::new(entries));
        let frame = root.object_frame(object.clone()).child();
        frame.assign("count", Value::Number(5.0));
        assert_eq!(object.read().get("count"), Some(&Value::Number(5.0)));
    }
}
