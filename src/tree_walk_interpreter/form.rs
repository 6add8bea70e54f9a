use std::rc::Rc;

use crate::ast::{Node, NodeKind};

use super::ExecutionErrorKind;

/// How a node is evaluated. Special forms are recognized here, at
/// evaluation time, by the identifier in head position.
pub enum Form<'a> {
    Number(f64),
    Identifier(&'a str),
    If {
        condition: &'a Rc<Node>,
        consequence: &'a Rc<Node>,
        alternative: &'a Rc<Node>,
    },
    Define {
        name: &'a str,
        value: &'a Rc<Node>,
    },
    Lambda {
        params: Rc<[String]>,
        body: &'a Rc<Node>,
    },
    Application(&'a [Rc<Node>]),
}

impl<'a> Form<'a> {
    pub fn of(node: &'a Node) -> Result<Self, ExecutionErrorKind> {
        match &node.kind {
            NodeKind::Number(n) => Ok(Form::Number(*n)),
            NodeKind::Identifier(name) => Ok(Form::Identifier(name)),
            NodeKind::Expression(children) => {
                match children.first().and_then(|head| head.as_identifier()) {
                    Some("if") => if_form(children),
                    Some("define") => define_form(children),
                    Some("lambda") => lambda_form(children),
                    _ => Ok(Form::Application(children)),
                }
            }
        }
    }
}

fn malformed(form: &'static str, reason: &'static str) -> ExecutionErrorKind {
    ExecutionErrorKind::MalformedSpecialForm { form, reason }
}

fn if_form(children: &[Rc<Node>]) -> Result<Form<'_>, ExecutionErrorKind> {
    match children {
        [_, condition, consequence, alternative] => Ok(Form::If {
            condition,
            consequence,
            alternative,
        }),
        _ => Err(malformed(
            "if",
            "expected (if condition consequence alternative)",
        )),
    }
}

fn define_form(children: &[Rc<Node>]) -> Result<Form<'_>, ExecutionErrorKind> {
    match children {
        [_, name, value] => match name.as_identifier() {
            Some(name) => Ok(Form::Define { name, value }),
            None => Err(malformed("define", "the defined name must be an identifier")),
        },
        _ => Err(malformed("define", "expected (define name value)")),
    }
}

fn lambda_form(children: &[Rc<Node>]) -> Result<Form<'_>, ExecutionErrorKind> {
    let [_, params, body] = children else {
        return Err(malformed("lambda", "expected (lambda (params...) body)"));
    };
    if !params.is_expression() {
        return Err(malformed("lambda", "parameters must be a parenthesized list"));
    }

    let params = params
        .children()
        .iter()
        .map(|param| param.as_identifier().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed("lambda", "every parameter must be an identifier"))?;

    Ok(Form::Lambda {
        params: params.into(),
        body,
    })
}

#[cfg(test)]
mod test {
    use crate::parser::parse_source;

    use super::*;

    fn form_name(source: &str) -> Result<&'static str, ExecutionErrorKind> {
        let tree = parse_source(source).unwrap();
        let form = Form::of(&tree.root().children()[0])?;
        Ok(match form {
            Form::Number(_) => "number",
            Form::Identifier(_) => "identifier",
            Form::If { .. } => "if",
            Form::Define { .. } => "define",
            Form::Lambda { .. } => "lambda",
            Form::Application(_) => "application",
        })
    }

    #[test]
    fn test_recognizes_forms() {
        assert_eq!(form_name("1"), Ok("number"));
        assert_eq!(form_name("x"), Ok("identifier"));
        assert_eq!(form_name("(if 1 2 3)"), Ok("if"));
        assert_eq!(form_name("(define x 1)"), Ok("define"));
        assert_eq!(form_name("(lambda (a b) a)"), Ok("lambda"));
        assert_eq!(form_name("(f 1)"), Ok("application"));
        assert_eq!(form_name("((lambda (x) x) 1)"), Ok("application"));
        assert_eq!(form_name("()"), Ok("application"));
    }

    #[test]
    fn test_lambda_params() {
        let tree = parse_source("(lambda (a b) (+ a b))").unwrap();
        let Ok(Form::Lambda { params, body }) = Form::of(&tree.root().children()[0]) else {
            panic!("expected a lambda form");
        };
        assert_eq!(&*params, &["a".to_string(), "b".to_string()]);
        assert_eq!(body.to_string(), "(+ a b)");
    }

    #[test]
    fn test_malformed_forms() {
        for source in [
            "(if 1 2)",
            "(define 1 2)",
            "(define x)",
            "(lambda x x)",
            "(lambda (1) x)",
            "(lambda (x))",
        ] {
            assert!(
                matches!(
                    form_name(source),
                    Err(ExecutionErrorKind::MalformedSpecialForm { .. })
                ),
                "{source} should be malformed"
            );
        }
    }
}
