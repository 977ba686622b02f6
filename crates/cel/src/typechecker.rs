//! Static type inference and validation (§4.4).
//!
//! `check_expr` walks the AST once, consulting a [`Scope`] (an
//! `Environment` plus any macro-bound loop variables) and memoizing the
//! inferred type of every node via [`Node::set_inferred_type`]. A `dyn`
//! static type propagates through operators and method receivers rather
//! than being resolved further — the concrete runtime tag is checked
//! again, cheaply, at evaluation time.

use std::collections::HashMap;

use crate::ast::{BinaryOp, ExprKind, Literal, Node};
use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::value::Type;

struct Scope<'a> {
    env: &'a Environment,
    locals: HashMap<String, Type>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<Type> {
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.env.lookup_variable(name))
    }

    fn with_local(&self, name: &str, ty: Type) -> Scope<'a> {
        let mut locals = self.locals.clone();
        locals.insert(name.to_string(), ty);
        Scope {
            env: self.env,
            locals,
        }
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Null => Type::Null,
        Literal::Bool(_) => Type::Bool,
        Literal::Int(_) => Type::Int,
        Literal::Uint(_) => Type::Uint,
        Literal::Double(_) => Type::Double,
        Literal::String(_) => Type::String,
        Literal::Bytes(_) => Type::Bytes,
    }
}

/// Most-specific common supertype of two statically inferred types, used
/// to unify list/map literal elements and ternary branches (§4.4):
/// identical types unify to themselves, anything else unifies to `dyn`.
fn unify(a: &Type, b: &Type) -> Type {
    if a == b {
        a.clone()
    } else {
        Type::Dyn
    }
}

/// The static type bound to a macro's iteration variable: a list's
/// element type, a map's key type, or `dyn` for anything else (§4.7).
fn element_type_of(receiver: &Type) -> Type {
    match receiver {
        Type::List(elem) => (**elem).clone(),
        Type::Map(key, _) => (**key).clone(),
        _ => Type::Dyn,
    }
}

fn ident_name(node: &Node) -> Option<&str> {
    match &node.kind {
        ExprKind::Ident(name) => Some(name),
        _ => None,
    }
}

/// `has(x.y.z)` requires a chain of field/index accesses rooted at an
/// identifier; atomic or computed expressions are rejected (§4.7).
fn is_valid_has_target(node: &Node) -> bool {
    match &node.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Field { receiver, .. } => is_valid_has_target(receiver),
        ExprKind::Index { receiver, .. } => is_valid_has_target(receiver),
        _ => false,
    }
}

fn check(node: &Node, scope: &Scope) -> Result<Type, EvaluationError> {
    let result = check_kind(node, scope);
    if let Ok(ty) = &result {
        node.set_inferred_type(ty.clone());
    }
    result
}

fn check_kind(node: &Node, scope: &Scope) -> Result<Type, EvaluationError> {
    match &node.kind {
        ExprKind::Literal(lit) => Ok(literal_type(lit)),
        ExprKind::Ident(name) => match scope.lookup(name) {
            Some(ty) => Ok(ty),
            None if scope.env.unlisted_variables_are_dyn => Ok(Type::Dyn),
            None => Err(EvaluationError::at(
                node.pos,
                EvalErrorKind::UnknownVariable {
                    name: name.to_string(),
                },
            )),
        },
        ExprKind::Field { receiver, name } => check_field(node, receiver, name, scope),
        ExprKind::Index { receiver, index } => check_index(node, receiver, index, scope),
        ExprKind::Call { name, args } => check_call(node, name, args, scope),
        ExprKind::MethodCall {
            receiver,
            name,
            args,
        } => check_method_call(node, receiver, name, args, scope),
        ExprKind::List(elements) => {
            let mut elem_type: Option<Type> = None;
            for element in elements {
                let ty = check(element, scope)?;
                elem_type = Some(match elem_type {
                    None => ty,
                    Some(prev) => {
                        if prev != ty && scope.env.homogeneous_aggregate_literals {
                            return Err(EvaluationError::at(
                                element.pos,
                                EvalErrorKind::ListElementTypeMismatch {
                                    expected: prev.to_string(),
                                    found: ty.to_string(),
                                },
                            ));
                        }
                        unify(&prev, &ty)
                    }
                });
            }
            Ok(Type::List(Box::new(elem_type.unwrap_or(Type::Dyn))))
        }
        ExprKind::Map(entries) => {
            let mut key_type: Option<Type> = None;
            let mut value_type: Option<Type> = None;
            for entry in entries {
                let k = check(&entry.key, scope)?;
                let v = check(&entry.value, scope)?;
                key_type = Some(match key_type {
                    None => k,
                    Some(prev) => {
                        if prev != k && scope.env.homogeneous_aggregate_literals {
                            return Err(EvaluationError::at(
                                entry.key.pos,
                                EvalErrorKind::ListElementTypeMismatch {
                                    expected: prev.to_string(),
                                    found: k.to_string(),
                                },
                            ));
                        }
                        unify(&prev, &k)
                    }
                });
                value_type = Some(match value_type {
                    None => v,
                    Some(prev) => {
                        if prev != v && scope.env.homogeneous_aggregate_literals {
                            return Err(EvaluationError::at(
                                entry.value.pos,
                                EvalErrorKind::ListElementTypeMismatch {
                                    expected: prev.to_string(),
                                    found: v.to_string(),
                                },
                            ));
                        }
                        unify(&prev, &v)
                    }
                });
            }
            Ok(Type::Map(
                Box::new(key_type.unwrap_or(Type::Dyn)),
                Box::new(value_type.unwrap_or(Type::Dyn)),
            ))
        }
        ExprKind::Ternary {
            cond,
            then,
            or_else,
        } => {
            let cond_type = check(cond, scope)?;
            if !matches!(cond_type, Type::Bool | Type::Dyn) {
                return Err(EvaluationError::at(
                    cond.pos,
                    EvalErrorKind::TernaryConditionNotBoolean,
                ));
            }
            let then_type = check(then, scope)?;
            let else_type = check(or_else, scope)?;
            Ok(unify(&then_type, &else_type))
        }
        ExprKind::Or(a, b) | ExprKind::And(a, b) => {
            let a_type = check(a, scope)?;
            if !matches!(a_type, Type::Bool | Type::Dyn) {
                return Err(EvaluationError::at(a.pos, EvalErrorKind::LogicalOperandNotBoolean));
            }
            let b_type = check(b, scope)?;
            if !matches!(b_type, Type::Bool | Type::Dyn) {
                return Err(EvaluationError::at(b.pos, EvalErrorKind::LogicalOperandNotBoolean));
            }
            Ok(Type::Bool)
        }
        ExprKind::Not(operand) => {
            let operand_type = check(operand, scope)?;
            let candidates = scope.env.operator_candidates("!", 1);
            match candidates.find_unary(&operand_type) {
                Some(o) => Ok(o.return_type.clone()),
                None if operand_type == Type::Dyn => Ok(Type::Bool),
                None => Err(EvaluationError::at(
                    operand.pos,
                    EvalErrorKind::NoSuchOverload {
                        op: "!".to_string(),
                        left: operand_type.to_string(),
                        right: None,
                    },
                )),
            }
        }
        ExprKind::Neg(operand) => {
            let operand_type = check(operand, scope)?;
            if operand_type == Type::Dyn {
                return Ok(Type::Dyn);
            }
            let candidates = scope.env.operator_candidates("-", 1);
            candidates
                .find_unary(&operand_type)
                .map(|o| o.return_type.clone())
                .ok_or_else(|| {
                    EvaluationError::at(
                        operand.pos,
                        EvalErrorKind::NoSuchOverload {
                            op: "-".to_string(),
                            left: operand_type.to_string(),
                            right: None,
                        },
                    )
                })
        }
        ExprKind::Binary { op, left, right } => check_binary(node, *op, left, right, scope),
    }
}

fn check_field(node: &Node, receiver: &Node, name: &str, scope: &Scope) -> Result<Type, EvaluationError> {
    let receiver_type = check(receiver, scope)?;
    match &receiver_type {
        Type::Dyn => Ok(Type::Dyn),
        Type::Named(_) => Ok(Type::Dyn),
        Type::Map(key, value) => {
            if matches!(**key, Type::String | Type::Dyn) {
                Ok((**value).clone())
            } else {
                Err(EvaluationError::at(
                    node.pos,
                    EvalErrorKind::NoSuchKey {
                        key: name.to_string(),
                        type_name: Some(receiver_type.to_string()),
                    },
                ))
            }
        }
        other => Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::Custom(format!("{other} has no field '{name}'")),
        )),
    }
}

fn check_index(node: &Node, receiver: &Node, index: &Node, scope: &Scope) -> Result<Type, EvaluationError> {
    let receiver_type = check(receiver, scope)?;
    let index_type = check(index, scope)?;
    match &receiver_type {
        Type::Dyn => Ok(Type::Dyn),
        Type::List(elem) => {
            if matches!(index_type, Type::Int | Type::Uint | Type::Dyn) {
                Ok((**elem).clone())
            } else {
                Err(EvaluationError::at(
                    node.pos,
                    EvalErrorKind::NoSuchKey {
                        key: "<index>".to_string(),
                        type_name: Some(index_type.to_string()),
                    },
                ))
            }
        }
        Type::Map(key, value) => {
            if &index_type == key.as_ref() || index_type == Type::Dyn || **key == Type::Dyn {
                Ok((**value).clone())
            } else {
                Err(EvaluationError::at(
                    node.pos,
                    EvalErrorKind::NoSuchKey {
                        key: "<index>".to_string(),
                        type_name: Some(index_type.to_string()),
                    },
                ))
            }
        }
        other => Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::Custom(format!("{other} is not indexable")),
        )),
    }
}

fn check_call(node: &Node, name: &str, args: &[Node], scope: &Scope) -> Result<Type, EvaluationError> {
    let candidates = scope.env.free_candidates(name, args.len());
    if candidates.has_macro() {
        if name == "has" && args.len() == 1 {
            if !is_valid_has_target(&args[0]) {
                return Err(EvaluationError::at(
                    node.pos,
                    EvalErrorKind::Custom(
                        "has() requires a chain of field accesses rooted at a variable".to_string(),
                    ),
                ));
            }
            return Ok(Type::Bool);
        }
        return Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::Custom(format!("unknown macro '{name}/{}'", args.len())),
        ));
    }
    if !candidates.has_any() {
        return Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::FunctionNotFound {
                name: name.to_string(),
                receiver_type: None,
            },
        ));
    }
    let arg_types = args
        .iter()
        .map(|a| check(a, scope))
        .collect::<Result<Vec<_>, _>>()?;
    candidates.find_match(&arg_types).map(|o| o.return_type.clone()).ok_or_else(|| {
        EvaluationError::at(
            node.pos,
            EvalErrorKind::NoMatchingOverload {
                signature: format!("{name}({})", join_types(&arg_types)),
            },
        )
    })
}

fn check_method_call(
    node: &Node,
    receiver: &Node,
    name: &str,
    args: &[Node],
    scope: &Scope,
) -> Result<Type, EvaluationError> {
    let receiver_type = check(receiver, scope)?;
    let candidates = scope.env.method_candidates(name, args.len());

    if receiver_type == Type::Dyn {
        if candidates.has_macro() {
            return check_macro(node, &Type::Dyn, name, args, scope);
        }
        return Ok(Type::Dyn);
    }

    if !candidates.has_any() {
        return Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::FunctionNotFound {
                name: name.to_string(),
                receiver_type: Some(receiver_type.to_string()),
            },
        ));
    }
    if candidates.has_macro() {
        return check_macro(node, &receiver_type, name, args, scope);
    }

    let narrowed = candidates.filter_by_receiver_type(&receiver_type);
    if !narrowed.has_any() {
        return Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::FunctionNotFound {
                name: name.to_string(),
                receiver_type: Some(receiver_type.to_string()),
            },
        ));
    }
    let arg_types = args
        .iter()
        .map(|a| check(a, scope))
        .collect::<Result<Vec<_>, _>>()?;
    narrowed.find_match(&arg_types).map(|o| o.return_type.clone()).ok_or_else(|| {
        EvaluationError::at(
            node.pos,
            EvalErrorKind::NoMatchingOverload {
                signature: format!("{receiver_type}.{name}({})", join_types(&arg_types)),
            },
        )
    })
}

fn check_macro(
    node: &Node,
    receiver_type: &Type,
    name: &str,
    args: &[Node],
    scope: &Scope,
) -> Result<Type, EvaluationError> {
    let elem_type = element_type_of(receiver_type);
    match (name, args.len()) {
        ("all", 2) | ("exists", 2) | ("exists_one", 2) | ("filter", 2) | ("map", 2) => {
            let var_name = ident_name(&args[0]).ok_or_else(|| {
                EvaluationError::at(
                    args[0].pos,
                    EvalErrorKind::Custom(format!("{name}() expects a bare identifier as its first argument")),
                )
            })?;
            let child_scope = scope.with_local(var_name, elem_type.clone());
            let body_type = check(&args[1], &child_scope)?;
            match name {
                "all" | "exists" | "exists_one" => {
                    if !matches!(body_type, Type::Bool | Type::Dyn) {
                        return Err(EvaluationError::at(
                            args[1].pos,
                            EvalErrorKind::PredicateResultNotBoolean,
                        ));
                    }
                    Ok(Type::Bool)
                }
                "filter" => Ok(Type::List(Box::new(elem_type))),
                "map" => Ok(Type::List(Box::new(body_type))),
                _ => unreachable!(),
            }
        }
        ("map", 3) => {
            let var_name = ident_name(&args[0]).ok_or_else(|| {
                EvaluationError::at(
                    args[0].pos,
                    EvalErrorKind::Custom("map() expects a bare identifier as its first argument".to_string()),
                )
            })?;
            let child_scope = scope.with_local(var_name, elem_type);
            let filter_type = check(&args[1], &child_scope)?;
            if !matches!(filter_type, Type::Bool | Type::Dyn) {
                return Err(EvaluationError::at(
                    args[1].pos,
                    EvalErrorKind::PredicateResultNotBoolean,
                ));
            }
            let transform_type = check(&args[2], &child_scope)?;
            Ok(Type::List(Box::new(transform_type)))
        }
        _ => Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::Custom(format!("unknown macro '{name}/{}'", args.len())),
        )),
    }
}

fn check_binary(
    node: &Node,
    op: BinaryOp,
    left: &Node,
    right: &Node,
    scope: &Scope,
) -> Result<Type, EvaluationError> {
    let left_type = check(left, scope)?;
    let right_type = check(right, scope)?;

    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        if left_type == Type::Dyn || right_type == Type::Dyn {
            return Ok(Type::Bool);
        }
        if left_type == right_type {
            return Ok(Type::Bool);
        }
        if left_type.is_numeric() && right_type.is_numeric() {
            // Neither side was statically dyn, so cross-type numeric
            // equality does not apply (§4.6) — this is the same error a
            // genuinely incompatible pair would get.
            return Err(EvaluationError::at(
                node.pos,
                EvalErrorKind::NoSuchOverload {
                    op: op.symbol().to_string(),
                    left: left_type.to_string(),
                    right: Some(right_type.to_string()),
                },
            ));
        }
        return Err(EvaluationError::at(
            node.pos,
            EvalErrorKind::NoSuchOverload {
                op: op.symbol().to_string(),
                left: left_type.to_string(),
                right: Some(right_type.to_string()),
            },
        ));
    }

    if left_type == Type::Dyn || right_type == Type::Dyn {
        return Ok(Type::Dyn);
    }

    let candidates = scope.env.operator_candidates(op.symbol(), 2);
    candidates
        .find_binary(&left_type, &right_type)
        .map(|o| o.return_type.clone())
        .ok_or_else(|| {
            EvaluationError::at(
                node.pos,
                EvalErrorKind::NoSuchOverload {
                    op: op.symbol().to_string(),
                    left: left_type.to_string(),
                    right: Some(right_type.to_string()),
                },
            )
        })
}

fn join_types(types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type-check `node` against `env`, annotating every node with its
/// inferred type and returning the inferred type of the root.
pub fn check_expr(node: &Node, env: &Environment) -> Result<Type, EvaluationError> {
    env.freeze();
    let scope = Scope {
        env,
        locals: HashMap::new(),
    };
    check(node, &scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check_source(source: &str, env: &Environment) -> Result<Type, EvaluationError> {
        let ast = parse(source).unwrap();
        check_expr(&ast, env)
    }

    #[test]
    fn infers_arithmetic_result_type() {
        let env = Environment::standard();
        assert_eq!(check_source("1 + 2 * 3", &env), Ok(Type::Int));
    }

    #[test]
    fn unknown_variable_is_a_type_error() {
        let env = Environment::standard();
        let err = check_source("x + 1", &env).unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::UnknownVariable {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn unlisted_variables_are_dyn_when_enabled() {
        let env = Environment::standard().with_unlisted_variables_as_dyn(true);
        assert_eq!(check_source("x", &env), Ok(Type::Dyn));
    }

    #[test]
    fn ternary_requires_boolean_condition() {
        let env = Environment::standard();
        let err = check_source("1 ? 2 : 3", &env).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TernaryConditionNotBoolean);
    }

    #[test]
    fn ternary_branches_of_equal_type_unify_exactly() {
        let env = Environment::standard();
        assert_eq!(check_source("true ? 1 : 2", &env), Ok(Type::Int));
    }

    #[test]
    fn cross_type_equality_without_dyn_is_rejected() {
        let env = Environment::standard();
        let err = check_source("1 == 1.0", &env).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::NoSuchOverload { .. }));
    }

    #[test]
    fn list_macro_binds_element_type_to_loop_variable() {
        let env = Environment::standard();
        assert_eq!(check_source("[1, 2, 3].all(x, x > 0)", &env), Ok(Type::Bool));
    }
}
