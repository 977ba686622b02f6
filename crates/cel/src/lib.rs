//! A Common Expression Language (CEL) engine: lexer, parser, type
//! checker and tree-walking evaluator over a pluggable function/operator
//! registry (§1, §2).
//!
//! The three stages are independent modules wired together by
//! [`CompiledExpression`]:
//!
//! - [`parser::parse`] turns source text into an [`ast::Node`] tree.
//! - [`typechecker::check_expr`] infers and memoizes a static type for
//!   every node, against an [`Environment`].
//! - [`evaluator::Evaluator`] walks the tree against a runtime context,
//!   dispatching calls and operators through the same `Environment`.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub(crate) mod macros;
pub mod parser;
pub mod registry;
pub(crate) mod stdlib;
pub mod typechecker;
pub mod value;

pub use ast::Node;
pub use error::{EvalErrorKind, EvaluationError, ParseError};
pub use evaluator::Evaluator;
pub use registry::Environment;
pub use value::{CelDuration, CelMap, CelTimestamp, MapKey, Type, Uint, Value};

/// The result of `check()`: either the inferred static type, or the
/// error that type-checking produced (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    Valid(Type),
    Invalid(EvaluationError),
}

/// A parsed expression, ready to be type-checked and/or evaluated
/// repeatedly against different contexts without re-parsing (§6.1).
#[derive(Debug)]
pub struct CompiledExpression {
    source: String,
    ast: Node,
}

impl CompiledExpression {
    /// Type-check without evaluating.
    pub fn check(&self, env: &Environment) -> CheckResult {
        match typechecker::check_expr(&self.ast, env) {
            Ok(ty) => CheckResult::Valid(ty),
            Err(e) => CheckResult::Invalid(e),
        }
    }

    /// Evaluate against `context`, which must be `null` or a `map`.
    pub fn evaluate(&self, env: &Environment, context: &Value) -> Result<Value, EvaluationError> {
        Evaluator::new(env).evaluate(&self.ast, context)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Node {
        &self.ast
    }
}

/// Lex and parse `text`, returning a reusable [`CompiledExpression`]
/// (§6.1).
pub fn parse(text: &str) -> Result<CompiledExpression, ParseError> {
    let ast = parser::parse(text)?;
    Ok(CompiledExpression {
        source: text.to_string(),
        ast,
    })
}

/// Parse, type-check and evaluate `text` against `context` in one call
/// (§6.1: "convenience combining parse + evaluate").
pub fn evaluate(text: &str, context: &Value, env: &Environment) -> Result<Value, EvaluationError> {
    let compiled = parse(text).map_err(|e| EvaluationError::custom(e.to_string()))?;
    compiled.evaluate(env, context)
}

/// Parse and type-check `text`, without evaluating (§6.1).
pub fn check(text: &str, env: &Environment) -> Result<CheckResult, ParseError> {
    let compiled = parse(text)?;
    Ok(compiled.check(env))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_evaluate_with_a_context_variable() {
        let env = Environment::standard().with_unlisted_variables_as_dyn(true);
        let mut ctx = CelMap::new();
        ctx.insert(MapKey::String("name".into()), Value::string("world"));
        let result = evaluate("'hello, ' + name", &Value::map(ctx), &env).unwrap();
        assert_eq!(result, Value::string("hello, world"));
    }

    #[test]
    fn check_reports_the_inferred_type_without_evaluating() {
        let env = Environment::standard();
        match check("1 + 2", &env).unwrap() {
            CheckResult::Valid(ty) => assert_eq!(ty, Type::Int),
            CheckResult::Invalid(e) => panic!("expected a valid type, got {e}"),
        }
    }

    #[test]
    fn check_surfaces_a_type_error_without_touching_evaluate() {
        let env = Environment::standard();
        match check("1 + 'a'", &env).unwrap() {
            CheckResult::Valid(ty) => panic!("expected an error, got {ty}"),
            CheckResult::Invalid(e) => assert!(matches!(e.kind, EvalErrorKind::NoSuchOverload { .. })),
        }
    }

    #[test]
    fn compiled_expression_is_reusable_across_contexts() {
        let env = Environment::standard().with_unlisted_variables_as_dyn(true);
        let compiled = parse("x * 2").unwrap();
        assert_eq!(
            compiled
                .evaluate(&env, &{
                    let mut m = CelMap::new();
                    m.insert(MapKey::String("x".into()), Value::Int(3));
                    Value::map(m)
                })
                .unwrap(),
            Value::Int(6)
        );
        assert_eq!(
            compiled
                .evaluate(&env, &{
                    let mut m = CelMap::new();
                    m.insert(MapKey::String("x".into()), Value::Int(10));
                    Value::map(m)
                })
                .unwrap(),
            Value::Int(20)
        );
    }

    #[test]
    fn parse_error_reports_position() {
        let err = parse("1 +").unwrap_err();
        assert!(err.pos.is_some());
    }
}
