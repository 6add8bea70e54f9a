use super::{
    callable::Builtin,
    scope::{Scope, ScopeKind, ScopeRef},
    Value,
};

const PRIMITIVES: [Builtin; 5] = [
    Builtin::new("+", add),
    Builtin::new("-", subtract),
    Builtin::new("*", multiply),
    Builtin::new("/", divide),
    Builtin::new("<", less),
];

/// The outermost frame, holding every primitive procedure.
pub fn scope() -> ScopeRef {
    let scope = Scope::boxed(None, ScopeKind::Library);
    for builtin in PRIMITIVES {
        scope
            .borrow_mut()
            .define(builtin.name.to_string(), Value::Builtin(builtin));
    }
    scope
}

fn arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Value::as_number)
}

fn add(args: &[Value]) -> Value {
    Value::Number(args.iter().map(Value::as_number).sum())
}

fn subtract(args: &[Value]) -> Value {
    Value::Number(arg(args, 0) - arg(args, 1))
}

fn multiply(args: &[Value]) -> Value {
    Value::Number(arg(args, 0) * arg(args, 1))
}

fn divide(args: &[Value]) -> Value {
    Value::Number(arg(args, 0) / arg(args, 1))
}

fn less(args: &[Value]) -> Value {
    Value::Boolean(arg(args, 0) < arg(args, 1))
}
