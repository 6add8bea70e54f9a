mod callable;
mod continuation;
mod direct;
mod form;
mod library;
mod observer;
mod scope;

use std::{
    cell::RefCell,
    fmt::Display,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    ast::{Node, NodeId, NodeIds, Tree},
    parser::{self, SyntaxError},
    span::Span,
};

use self::{
    callable::Application,
    continuation::Continuation,
    form::Form,
};

pub use self::{
    callable::{Builtin, Closure},
    direct::evaluate,
    observer::{BindingView, Event, FrameStack, FrameView, Listener, Snapshot},
    scope::{Scope, ScopeKind, ScopeRef},
};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// The evaluated list of an application whose head is not callable.
    List(Rc<[Value]>),
    /// The result of `define`.
    Void,
}

impl Value {
    /// `false`, zero, NaN and void are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Void => false,
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// Numeric reading used by the primitives: booleans count as 0 and 1,
    /// anything non-numeric is NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            _ => f64::NAN,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Closure(c) => write!(f, "{}", c),
            Value::Builtin(b) => write!(f, "{}", b),
            Value::List(values) => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    write!(f, "{}", value)?;
                    if i != values.len() - 1 {
                        write!(f, " ")?;
                    }
                }
                write!(f, ")")
            }
            Value::Void => write!(f, "void"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Error evaluating {expression} at {span} - {kind}")]
    Execution {
        kind: ExecutionErrorKind,
        node: NodeId,
        expression: String,
        span: Span,
    },
}

impl ExecutionError {
    fn at(node: &Node, kind: ExecutionErrorKind) -> Self {
        ExecutionError::Execution {
            kind,
            node: node.id,
            expression: node.to_string(),
            span: node.span,
        }
    }

    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),
    #[error("Arity mismatch: closure takes {expected} arguments but was given {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Malformed {form}: {reason}")]
    MalformedSpecialForm {
        form: &'static str,
        reason: &'static str,
    },
    #[error("Evaluation already failed, no further steps are possible")]
    Halted,
}

/// The library and global frames shared by every evaluation started from it.
///
/// Closures defined by one tree can run while stepping another, so the
/// session also owns the node id sequence and an index of the nodes of
/// every tree started in it.
#[derive(Debug, Clone)]
pub struct Session {
    library: ScopeRef,
    global: ScopeRef,
    ids: NodeIds,
    nodes: Rc<RefCell<FxHashMap<NodeId, Weak<Node>>>>,
}

impl Session {
    pub fn new() -> Self {
        let library = library::scope();
        let global = Scope::boxed(Some(library.clone()), ScopeKind::Global);
        Self {
            library,
            global,
            ids: NodeIds::new(),
            nodes: Rc::default(),
        }
    }

    pub fn library(&self) -> &ScopeRef {
        &self.library
    }

    pub fn global(&self) -> &ScopeRef {
        &self.global
    }

    pub fn ids(&self) -> &NodeIds {
        &self.ids
    }

    /// Parses `source` with ids that no other tree of this session uses.
    pub fn parse(&self, source: &str) -> Result<Tree, SyntaxError> {
        parser::parse_source_with(source, &self.ids)
    }

    /// Looks up a node of any live tree started in this session.
    pub fn node(&self, id: NodeId) -> Option<Rc<Node>> {
        self.nodes.borrow().get(&id).and_then(Weak::upgrade)
    }

    fn register(&self, tree: &Tree) {
        let mut nodes = self.nodes.borrow_mut();
        nodes.retain(|_, node| node.strong_count() > 0);
        for node in tree.nodes() {
            nodes.insert(node.id, Rc::downgrade(node));
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single [`Stepper::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `node` just produced `value`; evaluation is paused.
    Suspended { node: NodeId, value: Value },
    /// The root expression's value. No further work remains.
    Done(Value),
}

impl Step {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

enum State {
    Eval { node: Rc<Node>, scope: ScopeRef },
    Return(Value),
    Done(Value),
    Failed,
}

enum Transition {
    Continue(State),
    Suspend { node: Rc<Node>, value: Value },
}

/// A tree walk that pauses after every atom and every expression result.
///
/// Nothing runs until [`Stepper::advance`] is called; each call crosses
/// exactly one suspension point, and the call after the last one returns
/// [`Step::Done`]. Pending work lives on an explicit continuation stack, so
/// recursion depth in the program never grows the native stack.
pub struct Stepper {
    tree: Tree,
    session: Session,
    state: State,
    stack: Vec<Continuation>,
    current: Option<Rc<Node>>,
    steps: usize,
    frames: FrameStack,
    listeners: Vec<Box<dyn Listener>>,
}

impl Stepper {
    /// Starts `tree` under a fresh library frame and empty global frame.
    pub fn start(tree: Tree) -> Self {
        Self::start_in(tree, &Session::new())
    }

    /// Starts `tree` in an existing session, so earlier definitions stay visible.
    ///
    /// Parse `tree` with [`Session::parse`] so its node ids stay distinct
    /// from those of closures defined by earlier trees.
    pub fn start_in(tree: Tree, session: &Session) -> Self {
        session.register(&tree);
        let state = State::Eval {
            node: tree.root().clone(),
            scope: session.global.clone(),
        };
        let mut frames = FrameStack::default();
        frames.notify(&Event::FramePushed(&session.library));
        frames.notify(&Event::FramePushed(&session.global));

        Self {
            tree,
            session: session.clone(),
            state,
            stack: Vec::new(),
            current: None,
            steps: 0,
            frames,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener for every subsequent event.
    pub fn subscribe(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            tree: &self.tree,
            session: &self.session,
            current: self.current.as_ref(),
            frames: &self.frames,
            steps: self.steps,
        }
    }

    /// Runs until the next suspension point or until evaluation finishes.
    pub fn advance(&mut self) -> Result<Step, ExecutionError> {
        loop {
            let state = match std::mem::replace(&mut self.state, State::Failed) {
                State::Done(value) => {
                    self.state = State::Done(value.clone());
                    return Ok(Step::Done(value));
                }
                State::Failed => {
                    return Err(ExecutionError::at(
                        self.tree.root(),
                        ExecutionErrorKind::Halted,
                    ))
                }
                State::Eval { node, scope } => self.eval(node, scope)?,
                State::Return(value) => match self.resume(value)? {
                    Transition::Continue(state) => state,
                    Transition::Suspend { node, value } => {
                        self.suspend(node, value.clone());
                        self.state = State::Return(value.clone());
                        return Ok(Step::Suspended {
                            node: self.current_id(),
                            value,
                        });
                    }
                },
            };
            self.state = state;
        }
    }

    /// Advances until done and returns the root's value.
    pub fn run(&mut self) -> Result<Value, ExecutionError> {
        loop {
            if let Step::Done(value) = self.advance()? {
                return Ok(value);
            }
        }
    }

    fn current_id(&self) -> NodeId {
        self.current
            .as_ref()
            .map_or(self.tree.root().id, |node| node.id)
    }

    fn emit(&mut self, event: Event<'_>) {
        self.frames.notify(&event);
        for listener in self.listeners.iter_mut() {
            listener.notify(&event);
        }
    }

    fn suspend(&mut self, node: Rc<Node>, value: Value) {
        node.set_result(value.clone());
        self.steps += 1;
        trace!(step = self.steps, node = %node.id, expression = %node, result = %value, "suspended");
        self.emit(Event::Suspended {
            node: &node,
            value: &value,
        });
        self.current = Some(node);

        #[cfg(feature = "trace")]
        eprintln!("{}", self.snapshot());
    }

    fn eval(&mut self, node: Rc<Node>, scope: ScopeRef) -> Result<State, ExecutionError> {
        self.stack.push(Continuation::Annotate { node: node.clone() });

        let form = Form::of(&node).map_err(|kind| ExecutionError::at(&node, kind))?;
        let state = match form {
            Form::Number(n) => State::Return(Value::Number(n)),
            Form::Identifier(name) => {
                let value = scope.borrow().get(name).ok_or_else(|| {
                    ExecutionError::at(
                        &node,
                        ExecutionErrorKind::UnboundIdentifier(name.to_string()),
                    )
                })?;
                State::Return(value)
            }
            Form::If {
                condition,
                consequence,
                alternative,
            } => {
                self.stack.push(Continuation::Branch {
                    consequence: consequence.clone(),
                    alternative: alternative.clone(),
                    scope: scope.clone(),
                });
                State::Eval {
                    node: condition.clone(),
                    scope,
                }
            }
            Form::Define { name, value } => {
                self.stack.push(Continuation::Define {
                    name: name.to_string(),
                    scope: scope.clone(),
                });
                State::Eval {
                    node: value.clone(),
                    scope,
                }
            }
            Form::Lambda { params, body } => State::Return(Value::Closure(Rc::new(Closure {
                params,
                body: body.clone(),
                scope,
            }))),
            Form::Application(children) => {
                let values = Vec::with_capacity(children.len());
                self.next_argument(node.clone(), values, scope)?
            }
        };

        Ok(state)
    }

    fn next_argument(
        &mut self,
        expression: Rc<Node>,
        values: Vec<Value>,
        scope: ScopeRef,
    ) -> Result<State, ExecutionError> {
        if let Some(child) = expression.children().get(values.len()).cloned() {
            self.stack.push(Continuation::Arguments {
                expression,
                values,
                scope: scope.clone(),
            });
            return Ok(State::Eval { node: child, scope });
        }

        match callable::apply(values).map_err(|kind| ExecutionError::at(&expression, kind))? {
            Application::Value(value) => Ok(State::Return(value)),
            Application::Enter { frame, body } => {
                debug!(frame = ?frame.as_ptr(), body = %body, "entering call frame");
                self.emit(Event::FramePushed(&frame));
                self.stack.push(Continuation::Leave {
                    frame: frame.clone(),
                });
                Ok(State::Eval {
                    node: body,
                    scope: frame,
                })
            }
        }
    }

    fn resume(&mut self, value: Value) -> Result<Transition, ExecutionError> {
        let Some(continuation) = self.stack.pop() else {
            debug!(steps = self.steps, result = %value, "evaluation finished");
            return Ok(Transition::Continue(State::Done(value)));
        };

        let state = match continuation {
            Continuation::Annotate { node } => return Ok(Transition::Suspend { node, value }),
            Continuation::Branch {
                consequence,
                alternative,
                scope,
            } => State::Eval {
                node: if value.is_truthy() {
                    consequence
                } else {
                    alternative
                },
                scope,
            },
            Continuation::Define { name, scope } => {
                debug!(name = %name, value = %value, "define");
                scope.borrow_mut().define(name, value);
                State::Return(Value::Void)
            }
            Continuation::Arguments {
                expression,
                mut values,
                scope,
            } => {
                values.push(value);
                self.next_argument(expression, values, scope)?
            }
            Continuation::Leave { frame } => {
                debug!(frame = ?frame.as_ptr(), result = %value, "leaving call frame");
                self.emit(Event::FramePopped(&frame));
                State::Return(value)
            }
        };

        Ok(Transition::Continue(state))
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse_source;

    fn stepper(source: &str) -> Stepper {
        Stepper::start(parse_source(source).unwrap())
    }

    /// Value of the first top-level form.
    fn first_result(source: &str) -> Value {
        let mut stepper = stepper(source);
        stepper.run().unwrap();
        stepper.tree().root().children()[0].result().unwrap()
    }

    fn count_steps(source: &str) -> usize {
        let mut stepper = stepper(source);
        let mut suspensions = 0;
        while !stepper.advance().unwrap().is_done() {
            suspensions += 1;
        }
        suspensions
    }

    #[test]
    fn test_number() {
        assert_eq!(first_result("42"), Value::Number(42.0));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(first_result("(+ 1 2 3)"), Value::Number(6.0));
        assert_eq!(first_result("(- 10 (* 2 3))"), Value::Number(4.0));
        assert_eq!(first_result("(/ 6 3)"), Value::Number(2.0));
        assert_eq!(first_result("(< 1 2)"), Value::Boolean(true));
        assert_eq!(first_result("(+)"), Value::Number(0.0));
    }

    #[test]
    fn test_one_suspension_per_atom_and_expression() {
        // root, (+ 1 2), +, 1, 2
        assert_eq!(count_steps("(+ 1 2)"), 5);
        // root, 7
        assert_eq!(count_steps("7"), 2);
        // root only
        assert_eq!(count_steps(""), 1);
    }

    #[test]
    fn test_suspension_order() {
        let mut stepper = stepper("(+ 1 2)");
        let mut order = Vec::new();
        loop {
            match stepper.advance().unwrap() {
                Step::Suspended { node, value } => order.push(format!("{node} {value}")),
                Step::Done(_) => break,
            }
        }
        assert_eq!(
            order,
            vec!["#2 <builtin +>", "#3 1", "#4 2", "#1 3", "#0 (3)"]
        );
    }

    #[test]
    fn test_special_form_heads_are_never_evaluated() {
        let mut stepper = stepper("(define x 5) (if x 1 2) (lambda (a) a)");
        stepper.run().unwrap();
        let tree = stepper.tree();
        for node in tree.nodes() {
            if matches!(node.as_identifier(), Some("define" | "if" | "lambda" | "a")) {
                assert_eq!(node.result(), None, "{} should not be evaluated", node);
            }
        }
    }

    #[test]
    fn test_define_returns_void_and_binds_globally() {
        let mut stepper = stepper("(define x 5)");
        stepper.run().unwrap();
        assert_eq!(
            stepper.tree().root().children()[0].result(),
            Some(Value::Void)
        );
        assert_eq!(
            stepper.session().global().borrow().get("x"),
            Some(Value::Number(5.0))
        );
    }

    #[test]
    fn test_closure_application() {
        assert_eq!(first_result("((lambda (x) x) 3)"), Value::Number(3.0));
        assert_eq!(
            first_result("((lambda (a b) (+ a b)) 1 2)"),
            Value::Number(3.0)
        );
    }

    #[test]
    fn test_if_takes_one_branch() {
        let mut stepper = stepper("(if (< 2 1) (+ 1 1) (* 3 3))");
        let value = stepper.run().unwrap();
        assert_eq!(value.to_string(), "(9)");
        let consequence = &stepper.tree().root().children()[0].children()[2];
        assert!(stepper
            .tree()
            .nodes()
            .iter()
            .filter(|node| node.id >= consequence.id && node.id.0 < consequence.id.0 + 4)
            .all(|node| node.result().is_none()));
    }

    #[test]
    fn test_unbound_identifier() {
        let mut stepper = stepper("(+ 1 y)");
        let err = stepper.run().unwrap_err();
        assert_eq!(
            err.kind(),
            &ExecutionErrorKind::UnboundIdentifier("y".to_string())
        );
        assert!(err.to_string().contains("at 1:6"));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut stepper = stepper("((lambda (x y) x) 1)");
        let err = stepper.run().unwrap_err();
        assert_eq!(
            err.kind(),
            &ExecutionErrorKind::ArityMismatch {
                expected: 2,
                found: 1
            }
        );
        let ExecutionError::Execution { expression, .. } = err;
        assert_eq!(expression, "((lambda (x y) x) 1)");
    }

    #[test]
    fn test_halted_after_error() {
        let mut stepper = stepper("(undefined)");
        assert!(stepper.advance().is_err());
        assert_eq!(
            stepper.advance().unwrap_err().kind(),
            &ExecutionErrorKind::Halted
        );
    }

    #[test]
    fn test_done_is_sticky() {
        let mut stepper = stepper("1");
        let value = stepper.run().unwrap();
        assert!(stepper.is_done());
        assert_eq!(stepper.advance().unwrap(), Step::Done(value));
    }

    #[test]
    fn test_snapshot_tracks_current_node_and_frames() {
        let mut stepper = stepper("(define f (lambda (x) x)) (f 4)");
        assert!(stepper.snapshot().current().is_none());
        assert_eq!(stepper.snapshot().frames().len(), 2);

        let mut saw_call_frame = false;
        loop {
            let step = stepper.advance().unwrap();
            let snapshot = stepper.snapshot();
            if let Step::Suspended { node, value } = &step {
                assert_eq!(snapshot.current().map(|n| n.id), Some(*node));
                assert_eq!(snapshot.result(*node).as_ref(), Some(value));
            }
            if let Some(frame) = snapshot.frames().get(2) {
                assert_eq!(frame.kind, ScopeKind::Call);
                assert_eq!(frame.get("x").unwrap().value, "4");
                saw_call_frame = true;
            }
            if step.is_done() {
                break;
            }
        }
        assert!(saw_call_frame);
        assert_eq!(stepper.snapshot().frames().len(), 2);
    }

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Listener for Recorder {
        fn notify(&mut self, event: &Event<'_>) {
            let entry = match event {
                Event::FramePushed(frame) => format!("push {}", frame.borrow().kind()),
                Event::FramePopped(frame) => format!("pop {}", frame.borrow().kind()),
                Event::Suspended { node, .. } => format!("step {}", node.id),
            };
            self.0.borrow_mut().push(entry);
        }
    }

    #[test]
    fn test_listener_sees_frame_events() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stepper = stepper("((lambda (x) x) 1)");
        stepper.subscribe(Box::new(Recorder(log.clone())));
        stepper.run().unwrap();

        let log = log.borrow();
        let push = log.iter().position(|e| e == "push call").unwrap();
        let pop = log.iter().position(|e| e == "pop call").unwrap();
        assert!(push < pop);
        // the body `x` is node #6 and is evaluated inside the call frame
        let body = log.iter().position(|e| e == "step #6").unwrap();
        assert!(push < body && body < pop);
    }

    #[test]
    fn test_closure_from_earlier_tree_reports_its_own_nodes() {
        let session = Session::new();
        let definition = session.parse("(define f (lambda (x) (+ x 100)))").unwrap();
        Stepper::start_in(definition, &session).run().unwrap();

        let mut stepper = Stepper::start_in(session.parse("(f 2)").unwrap(), &session);
        let mut outside = Vec::new();
        loop {
            let Step::Suspended { node, value } = stepper.advance().unwrap() else {
                break;
            };
            let snapshot = stepper.snapshot();
            let current = snapshot.current().unwrap();
            assert_eq!(current.id, node);
            assert!(Rc::ptr_eq(&snapshot.node(node).unwrap(), current));
            assert_eq!(snapshot.result(node), Some(value));
            if stepper.tree().node(node).is_none() {
                outside.push(current.to_string());
            }
        }
        assert_eq!(outside, vec!["+", "x", "100", "(+ x 100)"]);
        assert_eq!(stepper.run().unwrap().to_string(), "(102)");
    }

    #[test]
    fn test_session_keeps_definitions() {
        let session = Session::new();
        Stepper::start_in(session.parse("(define y 10)").unwrap(), &session)
            .run()
            .unwrap();
        let mut stepper = Stepper::start_in(session.parse("(+ y 1)").unwrap(), &session);
        assert_eq!(stepper.run().unwrap().to_string(), "(11)");
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Void.is_truthy());
        assert!(Value::List(Rc::from(Vec::new())).is_truthy());
    }
}
