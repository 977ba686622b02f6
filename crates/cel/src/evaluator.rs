//! Tree-walking evaluator (§4.5).
//!
//! [`Evaluator::evaluate`] lazily type-checks the AST on first use (the
//! inferred types are memoized on the nodes, so repeated evaluation of
//! the same parsed expression never re-checks), then walks it once,
//! dispatching `call`/`rcall` nodes through the registry and handling
//! the `&&`/`||` partial-state truth table directly rather than via
//! ambient exception propagation (§9).

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{BinaryOp, ExprKind, Node};
use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::typechecker::check_expr;
use crate::value::{MapKey, Uint, Value};

/// Per-iteration variable overlay used by macro evaluation; all other
/// names read through to the top-level context (§4.7).
pub(crate) struct EvalScope<'a> {
    context: &'a Value,
    locals: HashMap<Arc<str>, Value>,
}

impl<'a> EvalScope<'a> {
    fn root(context: &'a Value) -> Self {
        EvalScope {
            context,
            locals: HashMap::new(),
        }
    }

    pub(crate) fn with_local(&self, name: Arc<str>, value: Value) -> EvalScope<'a> {
        let mut locals = self.locals.clone();
        locals.insert(name, value);
        EvalScope {
            context: self.context,
            locals,
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        match self.context {
            Value::Map(m) => m.get(&MapKey::String(Arc::from(name))).cloned(),
            _ => None,
        }
    }
}

/// True for errors that may never be absorbed by the other side of a
/// short-circuit operator (§7): the operand's own type error, and an
/// unresolved variable, always propagate.
fn is_absorbable(err: &EvaluationError) -> bool {
    !matches!(
        err.kind,
        EvalErrorKind::UnknownVariable { .. } | EvalErrorKind::LogicalOperandNotBoolean
    )
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Uint(Uint(n)) => Some(*n as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

pub struct Evaluator<'a> {
    env: &'a Environment,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Evaluator { env }
    }

    /// Evaluate `node` against `context`, which must be `null` (no
    /// variables) or a `map` (§7: "Context must be an object").
    pub fn evaluate(&self, node: &Node, context: &Value) -> Result<Value, EvaluationError> {
        self.env.freeze();
        if !matches!(context, Value::Map(_) | Value::Null) {
            return Err(EvaluationError::new(EvalErrorKind::ContextMustBeObject));
        }
        if node.inferred_type().is_none() {
            check_expr(node, self.env)?;
        }
        let scope = EvalScope::root(context);
        self.eval(node, &scope)
    }

    pub(crate) fn eval(&self, node: &Node, scope: &EvalScope) -> Result<Value, EvaluationError> {
        match &node.kind {
            ExprKind::Literal(lit) => Ok(lit.to_value()),
            ExprKind::Ident(name) => scope.lookup(name).ok_or_else(|| {
                EvaluationError::at(
                    node.pos,
                    EvalErrorKind::UnknownVariable {
                        name: name.to_string(),
                    },
                )
            }),
            ExprKind::Field { receiver, name } => self.eval_field(node, receiver, name, scope),
            ExprKind::Index { receiver, index } => self.eval_index(node, receiver, index, scope),
            ExprKind::Call { name, args } => self.dispatch(node, name, None, args, scope),
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => {
                let receiver_val = self.eval(receiver, scope)?;
                self.dispatch(node, name, Some(receiver_val), args, scope)
            }
            ExprKind::List(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element, scope)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Map(entries) => {
                let mut map = crate::value::CelMap::new();
                for entry in entries {
                    let key_val = self.eval(&entry.key, scope)?;
                    let key = MapKey::from_value(&key_val).ok_or_else(|| {
                        EvaluationError::at(
                            entry.key.pos,
                            EvalErrorKind::Custom(
                                "map keys must be string, int, uint or bool".to_string(),
                            ),
                        )
                    })?;
                    let value = self.eval(&entry.value, scope)?;
                    if map.contains_key(&key) {
                        return Err(EvaluationError::at(
                            entry.key.pos,
                            EvalErrorKind::DuplicateKey {
                                key: key_val.to_string(),
                            },
                        ));
                    }
                    map.insert(key, value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Ternary {
                cond,
                then,
                or_else,
            } => match self.eval(cond, scope)? {
                Value::Bool(true) => self.eval(then, scope),
                Value::Bool(false) => self.eval(or_else, scope),
                _ => Err(EvaluationError::at(
                    cond.pos,
                    EvalErrorKind::TernaryConditionNotBoolean,
                )),
            },
            ExprKind::And(a, b) => self.eval_and(a, b, scope),
            ExprKind::Or(a, b) => self.eval_or(a, b, scope),
            ExprKind::Not(operand) => {
                let value = self.eval(operand, scope)?;
                match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => self.dispatch_unary_operator(node, "!", operand.pos, other),
                }
            }
            ExprKind::Neg(operand) => {
                let value = self.eval(operand, scope)?;
                self.dispatch_unary_operator(node, "-", operand.pos, value)
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(node, *op, left, right, scope),
        }
    }

    fn eval_field(
        &self,
        node: &Node,
        receiver: &Node,
        name: &str,
        scope: &EvalScope,
    ) -> Result<Value, EvaluationError> {
        let receiver_val = self.eval(receiver, scope)?;
        match &receiver_val {
            Value::Map(m) => m
                .get(&MapKey::String(Arc::from(name)))
                .cloned()
                .ok_or_else(|| {
                    EvaluationError::at(
                        node.pos,
                        EvalErrorKind::NoSuchKey {
                            key: name.to_string(),
                            type_name: None,
                        },
                    )
                }),
            other => Err(EvaluationError::at(
                node.pos,
                EvalErrorKind::Custom(format!(
                    "{} has no field '{name}'",
                    other.type_tag()
                )),
            )),
        }
    }

    fn eval_index(
        &self,
        node: &Node,
        receiver: &Node,
        index: &Node,
        scope: &EvalScope,
    ) -> Result<Value, EvaluationError> {
        let receiver_val = self.eval(receiver, scope)?;
        let index_val = self.eval(index, scope)?;
        match &receiver_val {
            Value::List(list) => {
                let i = match &index_val {
                    Value::Int(n) => *n,
                    Value::Uint(Uint(n)) => *n as i64,
                    other => {
                        return Err(EvaluationError::at(
                            node.pos,
                            EvalErrorKind::NoSuchKey {
                                key: other.to_string(),
                                type_name: Some(other.type_tag().to_string()),
                            },
                        ));
                    }
                };
                if i < 0 {
                    return Err(EvaluationError::at(
                        node.pos,
                        EvalErrorKind::IndexOutOfBounds { index: i, size: None },
                    ));
                }
                list.get(i as usize).cloned().ok_or_else(|| {
                    EvaluationError::at(
                        node.pos,
                        EvalErrorKind::IndexOutOfBounds {
                            index: i,
                            size: Some(list.len() as i64),
                        },
                    )
                })
            }
            Value::Map(map) => {
                let key = MapKey::from_value(&index_val).ok_or_else(|| {
                    EvaluationError::at(
                        node.pos,
                        EvalErrorKind::NoSuchKey {
                            key: index_val.to_string(),
                            type_name: None,
                        },
                    )
                })?;
                map.get(&key).cloned().ok_or_else(|| {
                    EvaluationError::at(
                        node.pos,
                        EvalErrorKind::NoSuchKey {
                            key: index_val.to_string(),
                            type_name: None,
                        },
                    )
                })
            }
            other => Err(EvaluationError::at(
                node.pos,
                EvalErrorKind::Custom(format!("{} is not indexable", other.type_tag())),
            )),
        }
    }

    fn eval_and(&self, a: &Node, b: &Node, scope: &EvalScope) -> Result<Value, EvaluationError> {
        match self.eval(a, scope) {
            Ok(Value::Bool(false)) => Ok(Value::Bool(false)),
            Ok(Value::Bool(true)) => match self.eval(b, scope)? {
                Value::Bool(x) => Ok(Value::Bool(x)),
                _ => Err(EvaluationError::at(b.pos, EvalErrorKind::LogicalOperandNotBoolean)),
            },
            Ok(_) => Err(EvaluationError::at(a.pos, EvalErrorKind::LogicalOperandNotBoolean)),
            Err(e_a) if !is_absorbable(&e_a) => {
                let _ = self.eval(b, scope);
                Err(e_a)
            }
            Err(e_a) => match self.eval(b, scope) {
                Ok(Value::Bool(false)) => Ok(Value::Bool(false)),
                Ok(Value::Bool(true)) => Err(e_a),
                Ok(_) => Err(EvaluationError::at(b.pos, EvalErrorKind::LogicalOperandNotBoolean)),
                Err(_) => Err(e_a),
            },
        }
    }

    fn eval_or(&self, a: &Node, b: &Node, scope: &EvalScope) -> Result<Value, EvaluationError> {
        match self.eval(a, scope) {
            Ok(Value::Bool(true)) => Ok(Value::Bool(true)),
            Ok(Value::Bool(false)) => match self.eval(b, scope)? {
                Value::Bool(x) => Ok(Value::Bool(x)),
                _ => Err(EvaluationError::at(b.pos, EvalErrorKind::LogicalOperandNotBoolean)),
            },
            Ok(_) => Err(EvaluationError::at(a.pos, EvalErrorKind::LogicalOperandNotBoolean)),
            Err(e_a) if !is_absorbable(&e_a) => {
                let _ = self.eval(b, scope);
                Err(e_a)
            }
            Err(e_a) => match self.eval(b, scope) {
                Ok(Value::Bool(true)) => Ok(Value::Bool(true)),
                Ok(Value::Bool(false)) => Err(e_a),
                Ok(_) => Err(EvaluationError::at(b.pos, EvalErrorKind::LogicalOperandNotBoolean)),
                Err(_) => Err(e_a),
            },
        }
    }

    fn dispatch_unary_operator(
        &self,
        node: &Node,
        op: &str,
        operand_pos: usize,
        operand: Value,
    ) -> Result<Value, EvaluationError> {
        let candidates = self.env.operator_candidates(op, 1);
        let overload = candidates.find_unary(&operand.type_tag()).ok_or_else(|| {
            EvaluationError::at(
                operand_pos,
                EvalErrorKind::NoSuchOverload {
                    op: op.to_string(),
                    left: operand.type_tag().to_string(),
                    right: None,
                },
            )
        })?;
        match &overload.handler {
            crate::registry::Handler::Value(f) => f(&[operand]).map_err(|e| e.with_pos(node.pos)),
            crate::registry::Handler::Macro => unreachable!("operators are never macros"),
        }
    }

    fn eval_binary(
        &self,
        node: &Node,
        op: BinaryOp,
        left: &Node,
        right: &Node,
        scope: &EvalScope,
    ) -> Result<Value, EvaluationError> {
        let left_val = self.eval(left, scope)?;
        let right_val = self.eval(right, scope)?;

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let equal = if left_val.type_tag() == right_val.type_tag() {
                left_val.structural_eq(&right_val)
            } else if left_val.type_tag().is_numeric() && right_val.type_tag().is_numeric() {
                match (as_f64(&left_val), as_f64(&right_val)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            } else {
                return Err(EvaluationError::at(
                    node.pos,
                    EvalErrorKind::NoSuchOverload {
                        op: op.symbol().to_string(),
                        left: left_val.type_tag().to_string(),
                        right: Some(right_val.type_tag().to_string()),
                    },
                ));
            };
            return Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }));
        }

        let candidates = self.env.operator_candidates(op.symbol(), 2);
        let overload = candidates
            .find_binary(&left_val.type_tag(), &right_val.type_tag())
            .ok_or_else(|| {
                EvaluationError::at(
                    node.pos,
                    EvalErrorKind::NoSuchOverload {
                        op: op.symbol().to_string(),
                        left: left_val.type_tag().to_string(),
                        right: Some(right_val.type_tag().to_string()),
                    },
                )
            })?;
        match &overload.handler {
            crate::registry::Handler::Value(f) => {
                f(&[left_val, right_val]).map_err(|e| e.with_pos(node.pos))
            }
            crate::registry::Handler::Macro => unreachable!("operators are never macros"),
        }
    }

    /// Dispatch algorithm for `call`/`rcall` (§4.5).
    fn dispatch(
        &self,
        node: &Node,
        name: &str,
        receiver: Option<Value>,
        args: &[Node],
        scope: &EvalScope,
    ) -> Result<Value, EvaluationError> {
        let candidates = match &receiver {
            Some(_) => self.env.method_candidates(name, args.len()),
            None => self.env.free_candidates(name, args.len()),
        };
        if !candidates.has_any() {
            return Err(EvaluationError::at(
                node.pos,
                EvalErrorKind::FunctionNotFound {
                    name: name.to_string(),
                    receiver_type: receiver.as_ref().map(|v| v.type_tag().to_string()),
                },
            ));
        }
        if candidates.has_macro() {
            return crate::macros::eval_macro(self, node, name, receiver, args, scope);
        }

        let narrowed = match &receiver {
            Some(r) => {
                let narrowed = candidates.filter_by_receiver_type(&r.type_tag());
                if !narrowed.has_any() {
                    return Err(EvaluationError::at(
                        node.pos,
                        EvalErrorKind::FunctionNotFound {
                            name: name.to_string(),
                            receiver_type: Some(r.type_tag().to_string()),
                        },
                    ));
                }
                narrowed
            }
            None => candidates,
        };

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval(arg, scope)?);
        }
        let arg_types: Vec<_> = arg_values.iter().map(|v| v.type_tag()).collect();
        let overload = narrowed.find_match(&arg_types).ok_or_else(|| {
            let joined = arg_types
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let signature = match &receiver {
                Some(r) => format!("{}.{name}({joined})", r.type_tag()),
                None => format!("{name}({joined})"),
            };
            EvaluationError::at(node.pos, EvalErrorKind::NoMatchingOverload { signature })
        })?;

        let mut call_values = Vec::with_capacity(arg_values.len() + 1);
        if let Some(r) = receiver {
            call_values.push(r);
        }
        call_values.extend(arg_values);

        match &overload.handler {
            crate::registry::Handler::Value(f) => f(&call_values).map_err(|e| e.with_pos(node.pos)),
            crate::registry::Handler::Macro => unreachable!("macros are handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_source(source: &str, context: Value) -> Result<Value, EvaluationError> {
        let env = Environment::standard();
        let ast = parse(source).unwrap();
        Evaluator::new(&env).evaluate(&ast, &context)
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_source("1 + 2 * 3", Value::Null).unwrap(), Value::Int(7));
    }

    #[test]
    fn short_circuit_absorbs_right_hand_error() {
        assert_eq!(
            eval_source("false && (1 / 0 > 0)", Value::Null).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_source("true || (1 / 0 > 0)", Value::Null).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn unknown_variable_is_never_absorbed() {
        let err = eval_source("false && x", Value::Null).unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::UnknownVariable {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn integer_overflow_is_detected() {
        let err = eval_source(&format!("{} + 1", i64::MAX), Value::Null).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::IntegerOverflow { .. }));
    }

    #[test]
    fn list_index_out_of_bounds_reports_size() {
        let err = eval_source("[1,2,3][5]", Value::Null).unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::IndexOutOfBounds {
                index: 5,
                size: Some(3)
            }
        );
    }

    #[test]
    fn ternary_picks_a_branch() {
        let mut ctx = crate::value::CelMap::new();
        ctx.insert(MapKey::String(Arc::from("age")), Value::Int(25));
        let err = eval_source("age >= 18 ? \"adult\" : \"minor\"", Value::map(ctx));
        assert_eq!(err.unwrap(), Value::string("adult"));
    }
}
