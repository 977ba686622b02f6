//! Macro evaluation: `has`, `all`, `exists`, `exists_one`, `filter` and
//! `map` (§4.7).
//!
//! The registry only knows that these names are macros (`Handler::Macro`,
//! see `registry.rs`); the actual argument-binding and per-element
//! evaluation happens here, against unevaluated AST nodes, because a
//! macro's first argument names a loop variable rather than being an
//! expression to evaluate.

use crate::ast::{ExprKind, Node};
use crate::error::{EvalErrorKind, EvaluationError};
use crate::evaluator::{EvalScope, Evaluator};
use crate::registry::Environment;
use crate::value::Value;

/// Registers the marker overloads the registry and type checker consult
/// to recognize macro call sites; see `Environment::standard`.
pub(crate) fn install_markers(env: &mut Environment) {
    env.register_macro("has(dyn): bool").unwrap();

    for receiver in ["list", "map"] {
        env.register_macro(&format!("{receiver}.all(dyn, dyn): bool")).unwrap();
        env.register_macro(&format!("{receiver}.exists(dyn, dyn): bool")).unwrap();
        env.register_macro(&format!("{receiver}.exists_one(dyn, dyn): bool")).unwrap();
        env.register_macro(&format!("{receiver}.filter(dyn, dyn): dyn")).unwrap();
        env.register_macro(&format!("{receiver}.map(dyn, dyn): dyn")).unwrap();
        env.register_macro(&format!("{receiver}.map(dyn, dyn, dyn): dyn")).unwrap();
    }
}

fn ident_name(node: &Node) -> &str {
    match &node.kind {
        ExprKind::Ident(name) => name,
        _ => unreachable!("the type checker rejects a non-identifier macro binding"),
    }
}

/// The elements a macro iterates over: a list's items, or a map's keys
/// in insertion order (§4.7).
fn elements_of(node: &Node, receiver: &Value) -> Result<Vec<Value>, EvaluationError> {
    match receiver {
        Value::List(items) => Ok((**items).clone()),
        Value::Map(map) => Ok(map.keys().map(|k| k.to_value()).collect()),
        other => Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::CannotIterate {
                type_name: other.type_tag().to_string(),
            },
        )),
    }
}

fn require_bool(value: Value, pos: usize) -> Result<bool, EvaluationError> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => Err(EvaluationError::at(pos, EvalErrorKind::PredicateResultNotBoolean)),
    }
}

/// Evaluate a `call`/`rcall` node the registry has flagged as a macro.
pub(crate) fn eval_macro(
    evaluator: &Evaluator,
    node: &Node,
    name: &str,
    receiver: Option<Value>,
    args: &[Node],
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    if name == "has" {
        let resolved = has_resolve(evaluator, &args[0], scope)?;
        return Ok(Value::Bool(resolved.is_some()));
    }

    let receiver = receiver.expect("method-position macros always carry a receiver");
    let elements = elements_of(node, &receiver)?;
    let var: std::sync::Arc<str> = ident_name(&args[0]).into();

    match (name, args.len()) {
        ("all", 2) => eval_all(evaluator, &elements, var, &args[1], scope),
        ("exists", 2) => eval_exists(evaluator, &elements, var, &args[1], scope),
        ("exists_one", 2) => eval_exists_one(evaluator, &elements, var, &args[1], scope),
        ("filter", 2) => eval_filter(evaluator, &elements, var, &args[1], scope),
        ("map", 2) => eval_map2(evaluator, &elements, var, &args[1], scope),
        ("map", 3) => eval_map3(evaluator, &elements, var, &args[1], &args[2], scope),
        _ => unreachable!("install_markers only registers the macros handled above"),
    }
}

fn eval_all(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    pred: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut deferred: Option<EvaluationError> = None;
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        match evaluator.eval(pred, &child) {
            Ok(v) => match require_bool(v, pred.pos) {
                Ok(true) => {}
                Ok(false) => return Ok(Value::Bool(false)),
                Err(e) => {
                    if deferred.is_none() {
                        deferred = Some(e);
                    }
                }
            },
            Err(e) => {
                if deferred.is_none() {
                    deferred = Some(e);
                }
            }
        }
    }
    match deferred {
        Some(e) => Err(e),
        None => Ok(Value::Bool(true)),
    }
}

fn eval_exists(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    pred: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut deferred: Option<EvaluationError> = None;
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        match evaluator.eval(pred, &child) {
            Ok(v) => match require_bool(v, pred.pos) {
                Ok(false) => {}
                Ok(true) => return Ok(Value::Bool(true)),
                Err(e) => {
                    if deferred.is_none() {
                        deferred = Some(e);
                    }
                }
            },
            Err(e) => {
                if deferred.is_none() {
                    deferred = Some(e);
                }
            }
        }
    }
    match deferred {
        Some(e) => Err(e),
        None => Ok(Value::Bool(false)),
    }
}

fn eval_exists_one(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    pred: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut count = 0;
    let mut deferred: Option<EvaluationError> = None;
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        match evaluator.eval(pred, &child) {
            Ok(v) => match require_bool(v, pred.pos) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    if deferred.is_none() {
                        deferred = Some(e);
                    }
                }
            },
            Err(e) => {
                if deferred.is_none() {
                    deferred = Some(e);
                }
            }
        }
    }
    if let Some(e) = deferred {
        return Err(e);
    }
    Ok(Value::Bool(count == 1))
}

fn eval_filter(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    pred: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut out = Vec::new();
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        if require_bool(evaluator.eval(pred, &child)?, pred.pos)? {
            out.push(item.clone());
        }
    }
    Ok(Value::list(out))
}

fn eval_map2(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    transform: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut out = Vec::with_capacity(elements.len());
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        out.push(evaluator.eval(transform, &child)?);
    }
    Ok(Value::list(out))
}

fn eval_map3(
    evaluator: &Evaluator,
    elements: &[Value],
    var: std::sync::Arc<str>,
    filter: &Node,
    transform: &Node,
    scope: &EvalScope,
) -> Result<Value, EvaluationError> {
    let mut out = Vec::new();
    for item in elements {
        let child = scope.with_local(var.clone(), item.clone());
        if require_bool(evaluator.eval(filter, &child)?, filter.pos)? {
            out.push(evaluator.eval(transform, &child)?);
        }
    }
    Ok(Value::list(out))
}

/// Walks a chain of field/index accesses for `has()`, returning the
/// resolved value if the whole chain is present, `None` the moment a
/// step is undefined (§4.7 — this never raises `NoSuchKey`, since an
/// absent key is exactly what `has()` asks about).
fn has_resolve(
    evaluator: &Evaluator,
    node: &Node,
    scope: &EvalScope,
) -> Result<Option<Value>, EvaluationError> {
    match &node.kind {
        ExprKind::Ident(name) => Ok(scope.lookup(name)),
        ExprKind::Field { receiver, name } => match has_resolve(evaluator, receiver, scope)? {
            Some(Value::Map(m)) => Ok(m.get(&crate::value::MapKey::String(name.clone())).cloned()),
            _ => Ok(None),
        },
        ExprKind::Index { receiver, index } => {
            let recv = has_resolve(evaluator, receiver, scope)?;
            let idx_val = evaluator.eval(index, scope)?;
            match recv {
                Some(Value::Map(m)) => Ok(crate::value::MapKey::from_value(&idx_val).and_then(|k| m.get(&k).cloned())),
                Some(Value::List(l)) => {
                    let i = match idx_val {
                        Value::Int(n) => n,
                        Value::Uint(crate::value::Uint(n)) => n as i64,
                        _ => return Ok(None),
                    };
                    if i < 0 {
                        Ok(None)
                    } else {
                        Ok(l.get(i as usize).cloned())
                    }
                }
                _ => Ok(None),
            }
        }
        _ => unreachable!("the type checker rejects any other has() target shape"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_source(source: &str) -> Result<Value, EvaluationError> {
        let env = Environment::standard();
        let ast = parse(source).unwrap();
        Evaluator::new(&env).evaluate(&ast, &Value::Null)
    }

    #[test]
    fn all_short_circuits_on_first_false() {
        assert_eq!(
            eval_source("[1, -2, 3].all(x, x > 0)").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn all_is_true_for_empty_list() {
        assert_eq!(eval_source("[].all(x, x > 0)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn exists_finds_a_match() {
        assert_eq!(eval_source("[1, 2, 3].exists(x, x == 2)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn exists_one_counts_matches() {
        assert_eq!(
            eval_source("[1, 2, 2, 3].exists_one(x, x == 2)").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_source("[1, 2, 3].exists_one(x, x == 2)").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn filter_keeps_matching_elements() {
        assert_eq!(
            eval_source("[1, 2, 3, 4].filter(x, x % 2 == 0)").unwrap(),
            Value::list(vec![Value::Int(2), Value::Int(4)])
        );
    }

    #[test]
    fn map_transforms_elements() {
        assert_eq!(
            eval_source("[1, 2, 3].map(x, x * 2)").unwrap(),
            Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6)])
        );
    }

    #[test]
    fn three_arg_map_filters_then_transforms() {
        assert_eq!(
            eval_source("[1, 2, 3, 4].map(x, x % 2 == 0, x * 10)").unwrap(),
            Value::list(vec![Value::Int(20), Value::Int(40)])
        );
    }

    #[test]
    fn has_is_false_for_a_missing_field() {
        assert_eq!(eval_source("has({'a': 1}.b)").unwrap(), Value::Bool(false));
        assert_eq!(eval_source("has({'a': 1}.a)").unwrap(), Value::Bool(true));
    }
}
