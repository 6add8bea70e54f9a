use std::{
    cell::{Cell, RefCell},
    fmt::Display,
    rc::Rc,
};

use crate::{span::Span, tree_walk_interpreter::Value};

/// Identifies a node. Ids are unique among trees parsed with the same
/// [`NodeIds`], and consecutive in pre-order within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Shared id counter. Clones hand out ids from the same sequence.
#[derive(Debug, Clone, Default)]
pub struct NodeIds(Rc<Cell<usize>>);

impl NodeIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> NodeId {
        let id = self.0.get();
        self.0.set(id + 1);
        NodeId(id)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Number(f64),
    Identifier(String),
    Expression(Vec<Rc<Node>>),
}

/// A tree element. The shape never changes after parsing; only the
/// `result` annotation is written, by whichever evaluator walks the tree.
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Span,
    result: RefCell<Option<Value>>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, span: Span) -> Self {
        Self {
            id,
            kind,
            span,
            result: RefCell::new(None),
        }
    }

    pub fn children(&self) -> &[Rc<Node>] {
        match &self.kind {
            NodeKind::Expression(children) => children,
            _ => &[],
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.kind, NodeKind::Expression(_))
    }

    /// Last value computed for this node, if it has been evaluated.
    pub fn result(&self) -> Option<Value> {
        self.result.borrow().clone()
    }

    pub(crate) fn set_result(&self, value: Value) {
        *self.result.borrow_mut() = Some(value);
    }
}

/// Structural equality: ids, spans and results are ignored.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("span", &self.span)
            .field("result", &self.result.borrow())
            .finish()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::Number(n) => write!(f, "{}", n),
            NodeKind::Identifier(name) => write!(f, "{}", name),
            NodeKind::Expression(children) => {
                write!(f, "(")?;
                write_separated(f, children)?;
                write!(f, ")")
            }
        }
    }
}

fn write_separated(f: &mut std::fmt::Formatter<'_>, nodes: &[Rc<Node>]) -> std::fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        write!(f, "{}", node)?;
        if i != nodes.len() - 1 {
            write!(f, " ")?;
        }
    }
    Ok(())
}

/// A parsed program: an implicit root expression plus a pre-order index of every node.
#[derive(Debug)]
pub struct Tree {
    root: Rc<Node>,
    nodes: Vec<Rc<Node>>,
}

impl Tree {
    pub fn new(root: Rc<Node>) -> Self {
        let mut nodes = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(node) = pending.pop() {
            pending.extend(node.children().iter().rev().cloned());
            nodes.push(node);
        }
        debug_assert!(nodes
            .iter()
            .enumerate()
            .all(|(i, n)| n.id == NodeId(root.id.0 + i)));

        Self { root, nodes }
    }

    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }

    /// `None` for ids that belong to another tree.
    pub fn node(&self, id: NodeId) -> Option<&Rc<Node>> {
        id.0.checked_sub(self.root.id.0)
            .and_then(|index| self.nodes.get(index))
    }

    /// Every node, root first, in pre-order.
    pub fn nodes(&self) -> &[Rc<Node>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children().is_empty()
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

/// Prints the top-level forms without the implicit root's parens, so the
/// output parses back into an equal tree.
impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_separated(f, self.root.children())
    }
}
