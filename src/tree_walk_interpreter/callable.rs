use std::{fmt::Display, rc::Rc};

use crate::ast::Node;

use super::{
    scope::{Scope, ScopeKind, ScopeRef},
    ExecutionErrorKind, Value,
};

/// A primitive procedure. Primitives never fail.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    function: fn(&[Value]) -> Value,
}

impl Builtin {
    pub const fn new(name: &'static str, function: fn(&[Value]) -> Value) -> Self {
        Self { name, function }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.function)(args)
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

/// The value of a `lambda` form: formals, body and the frame it was created in.
#[derive(Clone)]
pub struct Closure {
    pub params: Rc<[String]>,
    pub body: Rc<Node>,
    pub scope: ScopeRef,
}

impl Closure {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// A fresh call frame chained to the captured scope, with formals bound
    /// positionally to `args`.
    fn bind(&self, args: Vec<Value>) -> Result<ScopeRef, ExecutionErrorKind> {
        if args.len() != self.arity() {
            return Err(ExecutionErrorKind::ArityMismatch {
                expected: self.arity(),
                found: args.len(),
            });
        }

        let frame = Scope::boxed(Some(self.scope.clone()), ScopeKind::Call);
        {
            let mut frame = frame.borrow_mut();
            for (name, value) in self.params.iter().zip(args) {
                frame.define(name.clone(), value);
            }
        }
        Ok(frame)
    }
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body.to_string())
            .field("scope", &self.scope.as_ptr())
            .finish()
    }
}

impl Display for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<lambda ({})>", self.params.join(" "))
    }
}

/// What applying an evaluated list amounts to.
pub enum Application {
    /// The result is already known.
    Value(Value),
    /// Evaluate `body` in the new call `frame`.
    Enter { frame: ScopeRef, body: Rc<Node> },
}

/// Applies the head of `values` to the rest. A head that is not callable
/// makes the whole evaluated list the result.
pub fn apply(values: Vec<Value>) -> Result<Application, ExecutionErrorKind> {
    match values.first() {
        Some(Value::Builtin(builtin)) => Ok(Application::Value(builtin.call(&values[1..]))),
        Some(Value::Closure(closure)) => {
            let closure = closure.clone();
            let args = values.into_iter().skip(1).collect();
            Ok(Application::Enter {
                frame: closure.bind(args)?,
                body: closure.body.clone(),
            })
        }
        _ => Ok(Application::Value(Value::List(values.into()))),
    }
}
