use std::rc::Rc;

use crate::ast::Node;

use super::{scope::ScopeRef, Value};

/// Pending work on the stepper's stack, resumed with the value of the
/// node evaluated most recently.
#[derive(Debug)]
pub enum Continuation {
    /// Record the value as `node`'s result, then suspend.
    Annotate { node: Rc<Node> },
    /// Pick a branch of an `if` by the condition's truthiness.
    Branch {
        consequence: Rc<Node>,
        alternative: Rc<Node>,
        scope: ScopeRef,
    },
    /// Bind the value in `scope`.
    Define { name: String, scope: ScopeRef },
    /// Collect the value as the next element of `expression`'s evaluated list.
    Arguments {
        expression: Rc<Node>,
        values: Vec<Value>,
        scope: ScopeRef,
    },
    /// A closure body finished; its call frame is no longer active.
    Leave { frame: ScopeRef },
}
