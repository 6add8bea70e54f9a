use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use super::Value;

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Library,
    Global,
    Call,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Library => write!(f, "library"),
            ScopeKind::Global => write!(f, "global"),
            ScopeKind::Call => write!(f, "call"),
        }
    }
}

/// One frame of the environment chain. Parents are fixed at creation, so a
/// frame can never become its own ancestor.
#[derive(Clone)]
pub struct Scope {
    bindings: FxHashMap<String, Value>,
    parent: Option<ScopeRef>,
    kind: ScopeKind,
}

impl Scope {
    pub fn boxed(parent: Option<ScopeRef>, kind: ScopeKind) -> ScopeRef {
        Rc::new(RefCell::new(Self::new(parent, kind)))
    }

    pub fn new(parent: Option<ScopeRef>, kind: ScopeKind) -> Self {
        Self {
            bindings: FxHashMap::default(),
            parent,
            kind,
        }
    }

    /// Innermost binding of `name`, searching this frame and then its ancestors.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            None
        }
    }

    /// Binds `name` in this frame only. Bindings of the same name in
    /// ancestor frames are shadowed, never touched.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Local bindings sorted by name.
    pub fn bindings(&self) -> Vec<(&str, &Value)> {
        let mut bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(b.0));
        bindings
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(format!("Scope<{:?}>", std::ptr::from_ref(self)).as_str())
            .field("kind", &self.kind)
            .field(
                "bindings",
                &self
                    .bindings()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<Vec<_>>(),
            )
            .field("parent", &self.parent.as_ref().map(|p| p.as_ptr()))
            .finish()
    }
}
