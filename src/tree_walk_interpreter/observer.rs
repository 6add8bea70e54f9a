use std::{fmt::Display, rc::Rc};

use crate::ast::{Node, NodeId, Tree};

use super::{
    scope::{Scope, ScopeKind, ScopeRef},
    Session, Value,
};

/// Notifications published by the stepper as it runs.
#[derive(Debug)]
pub enum Event<'a> {
    FramePushed(&'a ScopeRef),
    FramePopped(&'a ScopeRef),
    Suspended { node: &'a Rc<Node>, value: &'a Value },
}

pub trait Listener {
    fn notify(&mut self, event: &Event<'_>);
}

/// The frames currently active, outermost first, kept up to date from
/// frame events.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<ScopeRef>,
}

impl FrameStack {
    pub fn frames(&self) -> &[ScopeRef] {
        &self.frames
    }

    pub fn views(&self) -> Vec<FrameView> {
        self.frames
            .iter()
            .map(|frame| FrameView::of(&frame.borrow()))
            .collect()
    }
}

impl Listener for FrameStack {
    fn notify(&mut self, event: &Event<'_>) {
        match event {
            Event::FramePushed(frame) => self.frames.push(Rc::clone(frame)),
            Event::FramePopped(frame) => {
                if let Some(position) = self.frames.iter().rposition(|f| Rc::ptr_eq(f, frame)) {
                    self.frames.remove(position);
                }
            }
            Event::Suspended { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingView {
    pub name: String,
    pub value: String,
    /// Procedures and closures; presentation layers usually print only the name.
    pub callable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameView {
    pub kind: ScopeKind,
    pub bindings: Vec<BindingView>,
}

impl FrameView {
    pub fn of(scope: &Scope) -> Self {
        Self {
            kind: scope.kind(),
            bindings: scope
                .bindings()
                .into_iter()
                .map(|(name, value)| BindingView {
                    name: name.to_string(),
                    value: value.to_string(),
                    callable: value.is_callable(),
                })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BindingView> {
        self.bindings.iter().find(|binding| binding.name == name)
    }
}

impl Display for FrameView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.kind)?;
        for binding in &self.bindings {
            if binding.callable {
                write!(f, " {}", binding.name)?;
            } else {
                write!(f, " {} : {}", binding.name, binding.value)?;
            }
        }
        Ok(())
    }
}

/// Read-only view of a stepper between two steps.
pub struct Snapshot<'a> {
    pub(super) tree: &'a Tree,
    pub(super) session: &'a Session,
    pub(super) current: Option<&'a Rc<Node>>,
    pub(super) frames: &'a FrameStack,
    pub(super) steps: usize,
}

impl<'a> Snapshot<'a> {
    /// The node whose result was produced at the latest suspension point.
    pub fn current(&self) -> Option<&'a Rc<Node>> {
        self.current
    }

    /// Finds `id` in the running tree or, for closure bodies, in an earlier
    /// tree of the same session.
    pub fn node(&self, id: NodeId) -> Option<Rc<Node>> {
        self.tree
            .node(id)
            .cloned()
            .or_else(|| self.session.node(id))
    }

    pub fn result(&self, id: NodeId) -> Option<Value> {
        self.node(id).and_then(|node| node.result())
    }

    /// Every annotated node of the running tree, in pre-order.
    pub fn results(&self) -> Vec<(NodeId, Value)> {
        self.tree
            .nodes()
            .iter()
            .filter_map(|node| node.result().map(|value| (node.id, value)))
            .collect()
    }

    pub fn frames(&self) -> Vec<FrameView> {
        self.frames.views()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Display for Snapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {}: ", self.steps)?;
        match self.current {
            Some(node) => {
                write!(f, "{} {}", node.id, node)?;
                if let Some(result) = node.result() {
                    write!(f, " => {}", result)?;
                }
            }
            None => write!(f, "<not started>")?,
        }
        for frame in self.frames() {
            write!(f, "\n    {}", frame)?;
        }
        Ok(())
    }
}
