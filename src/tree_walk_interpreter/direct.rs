use std::rc::Rc;

use crate::ast::{Node, Tree};

use super::{
    callable::{self, Application, Closure},
    form::Form,
    scope::ScopeRef,
    ExecutionError, ExecutionErrorKind, Session, Value,
};

/// Evaluates `tree` in one go, with the same semantics and result
/// annotations as a [`super::Stepper`] driven to completion.
///
/// Recursion follows program nesting on the native stack.
pub fn evaluate(tree: &Tree, session: &Session) -> Result<Value, ExecutionError> {
    eval(tree.root(), session.global())
}

fn eval(node: &Rc<Node>, scope: &ScopeRef) -> Result<Value, ExecutionError> {
    let form = Form::of(node).map_err(|kind| ExecutionError::at(node, kind))?;
    let value = match form {
        Form::Number(n) => Value::Number(n),
        Form::Identifier(name) => scope.borrow().get(name).ok_or_else(|| {
            ExecutionError::at(node, ExecutionErrorKind::UnboundIdentifier(name.to_string()))
        })?,
        Form::If {
            condition,
            consequence,
            alternative,
        } => {
            if eval(condition, scope)?.is_truthy() {
                eval(consequence, scope)?
            } else {
                eval(alternative, scope)?
            }
        }
        Form::Define { name, value } => {
            let value = eval(value, scope)?;
            scope.borrow_mut().define(name.to_string(), value);
            Value::Void
        }
        Form::Lambda { params, body } => Value::Closure(Rc::new(Closure {
            params,
            body: body.clone(),
            scope: scope.clone(),
        })),
        Form::Application(children) => {
            let values = children
                .iter()
                .map(|child| eval(child, scope))
                .collect::<Result<Vec<_>, _>>()?;
            match callable::apply(values).map_err(|kind| ExecutionError::at(node, kind))? {
                Application::Value(value) => value,
                Application::Enter { frame, body } => eval(&body, &frame)?,
            }
        }
    };

    node.set_result(value.clone());
    Ok(value)
}
