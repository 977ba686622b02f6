//! Environment, Registry and the signature DSL (§3.3, §4.3).
//!
//! A [`Registry`] holds the three independent overload tables (free
//! functions, receiver methods, operators) plus declared variables and
//! type names. An [`Environment`] owns a `Registry` overlay and an
//! optional frozen parent, giving the freeze-on-clone lifecycle in §3.3:
//! registering against a live `Environment` mutates its own overlay;
//! cloning freezes the current overlay into a new parent link and starts
//! a fresh, empty overlay on top of it.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EvalErrorKind, EvaluationError};
use crate::value::{Type, Value};

/// A registered function/operator body. Macros carry no handler of this
/// shape — their evaluation walks unevaluated AST nodes and is
/// implemented directly in `macros.rs`; `Handler::Macro` is a marker so
/// `Candidates::has_macro` can answer without a second lookup table.
#[derive(Clone)]
pub enum Handler {
    Value(Arc<dyn Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync>),
    Macro,
}

impl Handler {
    pub fn value(f: impl Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync + 'static) -> Handler {
        Handler::Value(Arc::new(f))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Value(_) => f.write_str("Handler::Value(..)"),
            Handler::Macro => f.write_str("Handler::Macro"),
        }
    }
}

/// One overload of a free function or receiver method. `receiver_type`
/// is `None` for free functions, `Some(_)` for methods — the two call
/// kinds are stored in separate maps so a free call site can never
/// accidentally match a method-only overload or vice versa.
#[derive(Clone, Debug)]
pub struct Overload {
    pub receiver_type: Option<Type>,
    pub param_types: Vec<Type>,
    pub return_type: Type,
    pub handler: Handler,
    pub is_macro: bool,
}

/// One overload of a binary or unary operator. `right_type` is `None`
/// for unary operators.
#[derive(Clone, Debug)]
pub struct OperatorOverload {
    pub left_type: Type,
    pub right_type: Option<Type>,
    pub return_type: Type,
    pub handler: Handler,
}

/// True if `param` accepts a call-site argument/receiver typed `actual`.
/// `dyn` accepts anything; `list<_>`/`map<_,_>` accept any list/map
/// regardless of element type, since overload selection dispatches on
/// the container shape, not its element type.
fn type_accepts(param: &Type, actual: &Type) -> bool {
    match (param, actual) {
        (Type::Dyn, _) => true,
        (Type::List(_), Type::List(_)) => true,
        (Type::Map(_, _), Type::Map(_, _)) => true,
        (a, b) => a == b,
    }
}

/// Pre-bucketed overload set for one `(receiverType?, name, arity)` call
/// site (§4.3, §9: "Overload dispatch table is naturally a (name, arity)
/// → Candidates map").
pub struct Candidates<'a> {
    overloads: Vec<&'a Overload>,
}

impl<'a> Candidates<'a> {
    pub fn has_any(&self) -> bool {
        !self.overloads.is_empty()
    }

    pub fn has_macro(&self) -> bool {
        self.overloads.iter().any(|o| o.is_macro)
    }

    /// Narrow to overloads whose receiver accepts `t`: exact/shape match
    /// first, then `dyn`, then none (§4.3).
    pub fn filter_by_receiver_type(&self, t: &Type) -> Candidates<'a> {
        let exact: Vec<&Overload> = self
            .overloads
            .iter()
            .filter(|o| {
                o.receiver_type
                    .as_ref()
                    .is_some_and(|rt| type_accepts(rt, t) && !matches!(rt, Type::Dyn))
            })
            .copied()
            .collect();
        if !exact.is_empty() {
            return Candidates { overloads: exact };
        }
        let dyn_matches: Vec<&Overload> = self
            .overloads
            .iter()
            .filter(|o| matches!(o.receiver_type, Some(Type::Dyn)))
            .copied()
            .collect();
        Candidates {
            overloads: dyn_matches,
        }
    }

    /// Exact-match pass first, then a parameter-wise `dyn` fallback pass
    /// (§4.3).
    pub fn find_match(&self, arg_types: &[Type]) -> Option<&'a Overload> {
        let exact = self.overloads.iter().find(|o| {
            o.param_types.len() == arg_types.len()
                && o.param_types.iter().zip(arg_types).all(|(p, a)| p == a)
        });
        if let Some(o) = exact {
            return Some(o);
        }
        self.overloads
            .iter()
            .find(|o| {
                o.param_types.len() == arg_types.len()
                    && o
                        .param_types
                        .iter()
                        .zip(arg_types)
                        .all(|(p, a)| type_accepts(p, a))
            })
            .copied()
    }
}

/// Pre-bucketed operator overload set for one `(symbol, arity)`.
pub struct OperatorCandidates<'a> {
    overloads: Vec<&'a OperatorOverload>,
}

impl<'a> OperatorCandidates<'a> {
    pub fn has_any(&self) -> bool {
        !self.overloads.is_empty()
    }

    pub fn find_binary(&self, left: &Type, right: &Type) -> Option<&'a OperatorOverload> {
        let exact = self.overloads.iter().find(|o| {
            o.right_type.is_some() && &o.left_type == left && o.right_type.as_ref() == Some(right)
        });
        if let Some(o) = exact {
            return Some(o);
        }
        self.overloads
            .iter()
            .find(|o| {
                o.right_type.as_ref().is_some_and(|rt| {
                    type_accepts(&o.left_type, left) && type_accepts(rt, right)
                })
            })
            .copied()
    }

    pub fn find_unary(&self, operand: &Type) -> Option<&'a OperatorOverload> {
        let exact = self
            .overloads
            .iter()
            .find(|o| o.right_type.is_none() && &o.left_type == operand);
        if let Some(o) = exact {
            return Some(o);
        }
        self.overloads
            .iter()
            .find(|o| o.right_type.is_none() && type_accepts(&o.left_type, operand))
            .copied()
    }
}

#[derive(Clone, Default, Debug)]
pub struct Registry {
    types: HashMap<String, ()>,
    variables: HashMap<String, Type>,
    free_functions: HashMap<(String, usize), Vec<Overload>>,
    methods: HashMap<(String, usize), Vec<Overload>>,
    operators: HashMap<(String, usize), Vec<OperatorOverload>>,
}

impl Registry {
    fn known_type(&self, ty: &Type) -> bool {
        match ty {
            Type::Named(name) => self.types.contains_key(name),
            Type::List(elem) => self.known_type(elem),
            Type::Map(k, v) => self.known_type(k) && self.known_type(v),
            _ => true,
        }
    }
}

enum ParsedSignature {
    Free {
        name: String,
        params: Vec<Type>,
        ret: Type,
    },
    Method {
        receiver: Type,
        name: String,
        params: Vec<Type>,
        ret: Type,
    },
    Binary {
        left: Type,
        op: String,
        right: Type,
        ret: Type,
    },
    Unary {
        op: String,
        operand: Type,
        ret: Type,
    },
}

fn is_binary_op(op: &str) -> bool {
    matches!(
        op,
        "+" | "-" | "*" | "/" | "%" | "==" | "!=" | "<" | "<=" | ">" | ">=" | "in"
    )
}

fn is_unary_op(op: &str) -> bool {
    matches!(op, "!" | "-")
}

fn find_top_level_comma(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_top_level_comma(rest) {
        parts.push(&rest[..i]);
        rest = &rest[i + 1..];
    }
    parts.push(rest);
    parts
}

fn parse_type(raw: &str) -> Result<Type, String> {
    let s = raw.trim();
    if let Some(inner) = s.strip_prefix("list<").and_then(|r| r.strip_suffix('>')) {
        return Ok(Type::List(Box::new(parse_type(inner)?)));
    }
    if let Some(inner) = s.strip_prefix("map<").and_then(|r| r.strip_suffix('>')) {
        let comma = find_top_level_comma(inner)
            .ok_or_else(|| format!("malformed map type '{s}'"))?;
        let key = parse_type(&inner[..comma])?;
        let value = parse_type(&inner[comma + 1..])?;
        return Ok(Type::Map(Box::new(key), Box::new(value)));
    }
    match s {
        "null" => Ok(Type::Null),
        "bool" => Ok(Type::Bool),
        "int" => Ok(Type::Int),
        "uint" => Ok(Type::Uint),
        "double" => Ok(Type::Double),
        "string" => Ok(Type::String),
        "bytes" => Ok(Type::Bytes),
        "dyn" => Ok(Type::Dyn),
        "type" => Ok(Type::TypeType),
        "list" => Ok(Type::List(Box::new(Type::Dyn))),
        "map" => Ok(Type::Map(Box::new(Type::Dyn), Box::new(Type::Dyn))),
        "google.protobuf.Timestamp" => Ok(Type::Timestamp),
        "google.protobuf.Duration" => Ok(Type::Duration),
        "" => Err("empty type name".to_string()),
        other => Ok(Type::Named(other.to_string())),
    }
}

fn parse_signature(sig: &str) -> Result<ParsedSignature, String> {
    let (head, ret_str) = sig
        .split_once(':')
        .ok_or_else(|| format!("signature '{sig}' is missing a ': returnType' suffix"))?;
    let ret = parse_type(ret_str)?;
    let head = head.trim();

    if let Some(lparen) = head.find('(') {
        if !head.ends_with(')') {
            return Err(format!("malformed signature '{sig}'"));
        }
        let name_part = head[..lparen].trim();
        let params_part = &head[lparen + 1..head.len() - 1];
        let params = if params_part.trim().is_empty() {
            Vec::new()
        } else {
            split_top_level_commas(params_part)
                .into_iter()
                .map(|p| parse_type(p.trim()))
                .collect::<Result<Vec<_>, _>>()?
        };
        if let Some((receiver, name)) = name_part.split_once('.') {
            Ok(ParsedSignature::Method {
                receiver: parse_type(receiver.trim())?,
                name: name.trim().to_string(),
                params,
                ret,
            })
        } else {
            Ok(ParsedSignature::Free {
                name: name_part.to_string(),
                params,
                ret,
            })
        }
    } else {
        let tokens: Vec<&str> = head.split_whitespace().collect();
        match tokens.as_slice() {
            [op, operand] if is_unary_op(op) => Ok(ParsedSignature::Unary {
                op: op.to_string(),
                operand: parse_type(operand)?,
                ret,
            }),
            [left, op, right] if is_binary_op(op) => Ok(ParsedSignature::Binary {
                left: parse_type(left)?,
                op: op.to_string(),
                right: parse_type(right)?,
                ret,
            }),
            _ => Err(format!("malformed operator signature '{sig}'")),
        }
    }
}

/// A registry overlay plus an optional frozen parent chain (§3.3).
#[derive(Debug)]
pub struct Environment {
    parent: Option<Arc<Environment>>,
    registry: Registry,
    frozen: Cell<bool>,
    pub unlisted_variables_are_dyn: bool,
    pub homogeneous_aggregate_literals: bool,
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            parent: None,
            registry: Registry::default(),
            frozen: Cell::new(false),
            unlisted_variables_are_dyn: false,
            homogeneous_aggregate_literals: false,
        }
    }

    /// An environment with the standard function/operator/macro library
    /// installed, ready for `evaluate`/`check`.
    pub fn standard() -> Environment {
        let mut env = Environment::new();
        crate::stdlib::install(&mut env);
        crate::macros::install_markers(&mut env);
        env
    }

    pub fn with_unlisted_variables_as_dyn(mut self, enabled: bool) -> Self {
        self.unlisted_variables_are_dyn = enabled;
        self
    }

    pub fn with_homogeneous_aggregate_literals(mut self, enabled: bool) -> Self {
        self.homogeneous_aggregate_literals = enabled;
        self
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    fn ensure_mutable(&self) -> Result<(), EvaluationError> {
        if self.frozen.get() {
            Err(EvaluationError::new(EvalErrorKind::FrozenRegistry))
        } else {
            Ok(())
        }
    }

    pub fn register_type(&mut self, name: impl Into<String>) -> Result<&mut Self, EvaluationError> {
        self.ensure_mutable()?;
        self.registry.types.insert(name.into(), ());
        Ok(self)
    }

    pub fn register_variable(
        &mut self,
        name: impl Into<String>,
        ty: Type,
    ) -> Result<&mut Self, EvaluationError> {
        self.ensure_mutable()?;
        let name = name.into();
        if crate::lexer::is_reserved(&name) {
            return Err(EvaluationError::custom(format!(
                "'{name}' is a reserved word and cannot be used as a variable name"
            )));
        }
        self.registry.variables.insert(name, ty);
        Ok(self)
    }

    pub fn register_function(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    ) -> Result<&mut Self, EvaluationError> {
        self.register_overload(signature, Handler::value(handler), false)
    }

    pub(crate) fn register_macro(&mut self, signature: &str) -> Result<&mut Self, EvaluationError> {
        self.register_overload(signature, Handler::Macro, true)
    }

    fn register_overload(
        &mut self,
        signature: &str,
        handler: Handler,
        is_macro: bool,
    ) -> Result<&mut Self, EvaluationError> {
        self.ensure_mutable()?;
        let parsed = parse_signature(signature)
            .map_err(|e| EvaluationError::custom(format!("bad signature '{signature}': {e}")))?;
        match parsed {
            ParsedSignature::Free { name, params, ret } => {
                if !self.registry.known_type(&ret) || params.iter().any(|p| !self.registry.known_type(p)) {
                    return Err(EvaluationError::custom(format!(
                        "signature '{signature}' references an unknown type"
                    )));
                }
                let key = (name, params.len());
                let bucket = self.registry.free_functions.entry(key).or_default();
                if bucket
                    .iter()
                    .any(|o| o.param_types == params && o.receiver_type.is_none())
                {
                    return Err(EvaluationError::custom(format!(
                        "overload already registered for '{signature}'"
                    )));
                }
                bucket.push(Overload {
                    receiver_type: None,
                    param_types: params,
                    return_type: ret,
                    handler,
                    is_macro,
                });
            }
            ParsedSignature::Method {
                receiver,
                name,
                params,
                ret,
            } => {
                let key = (name, params.len());
                let bucket = self.registry.methods.entry(key).or_default();
                if bucket
                    .iter()
                    .any(|o| o.param_types == params && o.receiver_type.as_ref() == Some(&receiver))
                {
                    return Err(EvaluationError::custom(format!(
                        "overload already registered for '{signature}'"
                    )));
                }
                bucket.push(Overload {
                    receiver_type: Some(receiver),
                    param_types: params,
                    return_type: ret,
                    handler,
                    is_macro,
                });
            }
            ParsedSignature::Binary {
                left,
                op,
                right,
                ret,
            } => {
                let key = (op, 2);
                let bucket = self.registry.operators.entry(key).or_default();
                if bucket
                    .iter()
                    .any(|o| o.left_type == left && o.right_type.as_ref() == Some(&right))
                {
                    return Err(EvaluationError::custom(format!(
                        "overload already registered for '{signature}'"
                    )));
                }
                bucket.push(OperatorOverload {
                    left_type: left,
                    right_type: Some(right),
                    return_type: ret,
                    handler,
                });
            }
            ParsedSignature::Unary { op, operand, ret } => {
                let key = (op, 1);
                let bucket = self.registry.operators.entry(key).or_default();
                if bucket
                    .iter()
                    .any(|o| o.right_type.is_none() && o.left_type == operand)
                {
                    return Err(EvaluationError::custom(format!(
                        "overload already registered for '{signature}'"
                    )));
                }
                bucket.push(OperatorOverload {
                    left_type: operand,
                    right_type: None,
                    return_type: ret,
                    handler,
                });
            }
        }
        Ok(self)
    }

    pub fn register_operator(
        &mut self,
        signature: &str,
        handler: impl Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    ) -> Result<&mut Self, EvaluationError> {
        self.register_overload(signature, Handler::value(handler), false)
    }

    pub fn lookup_variable(&self, name: &str) -> Option<Type> {
        self.registry
            .variables
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup_variable(name)))
    }

    fn collect_free<'a>(&'a self, name: &str, arity: usize, out: &mut Vec<&'a Overload>) {
        if let Some(bucket) = self.registry.free_functions.get(&(name.to_string(), arity)) {
            out.extend(bucket.iter());
        }
        if let Some(parent) = &self.parent {
            parent.collect_free(name, arity, out);
        }
    }

    fn collect_methods<'a>(&'a self, name: &str, arity: usize, out: &mut Vec<&'a Overload>) {
        if let Some(bucket) = self.registry.methods.get(&(name.to_string(), arity)) {
            out.extend(bucket.iter());
        }
        if let Some(parent) = &self.parent {
            parent.collect_methods(name, arity, out);
        }
    }

    fn collect_operators<'a>(&'a self, op: &str, arity: usize, out: &mut Vec<&'a OperatorOverload>) {
        if let Some(bucket) = self.registry.operators.get(&(op.to_string(), arity)) {
            out.extend(bucket.iter());
        }
        if let Some(parent) = &self.parent {
            parent.collect_operators(op, arity, out);
        }
    }

    pub fn free_candidates(&self, name: &str, arity: usize) -> Candidates<'_> {
        let mut overloads = Vec::new();
        self.collect_free(name, arity, &mut overloads);
        Candidates { overloads }
    }

    pub fn method_candidates(&self, name: &str, arity: usize) -> Candidates<'_> {
        let mut overloads = Vec::new();
        self.collect_methods(name, arity, &mut overloads);
        Candidates { overloads }
    }

    pub fn operator_candidates(&self, op: &str, arity: usize) -> OperatorCandidates<'_> {
        let mut overloads = Vec::new();
        self.collect_operators(op, arity, &mut overloads);
        OperatorCandidates { overloads }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Clone for Environment {
    /// Freezes the current overlay and links it as the new instance's
    /// parent (§3.3: "Freezes ... on clone()").
    fn clone(&self) -> Self {
        self.frozen.set(true);
        let snapshot = Environment {
            parent: self.parent.clone(),
            registry: self.registry.clone(),
            frozen: Cell::new(true),
            unlisted_variables_are_dyn: self.unlisted_variables_are_dyn,
            homogeneous_aggregate_literals: self.homogeneous_aggregate_literals,
        };
        Environment {
            parent: Some(Arc::new(snapshot)),
            registry: Registry::default(),
            frozen: Cell::new(false),
            unlisted_variables_are_dyn: self.unlisted_variables_are_dyn,
            homogeneous_aggregate_literals: self.homogeneous_aggregate_literals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_free_function_signature() {
        match parse_signature("size(string): int").unwrap() {
            ParsedSignature::Free { name, params, ret } => {
                assert_eq!(name, "size");
                assert_eq!(params, vec![Type::String]);
                assert_eq!(ret, Type::Int);
            }
            _ => panic!("expected a free-function signature"),
        }
    }

    #[test]
    fn parses_method_and_operator_signatures() {
        assert!(matches!(
            parse_signature("string.startsWith(string): bool").unwrap(),
            ParsedSignature::Method { .. }
        ));
        assert!(matches!(
            parse_signature("int + int: int").unwrap(),
            ParsedSignature::Binary { .. }
        ));
        assert!(matches!(
            parse_signature("- int: int").unwrap(),
            ParsedSignature::Unary { .. }
        ));
    }

    #[test]
    fn registering_after_freeze_fails() {
        let mut env = Environment::new();
        env.freeze();
        let err = env.register_variable("x", Type::Int).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::FrozenRegistry);
    }

    #[test]
    fn duplicate_overload_registration_fails() {
        let mut env = Environment::new();
        env.register_function("double(int): int", |args| Ok(args[0].clone()))
            .unwrap();
        assert!(env
            .register_function("double(int): int", |args| Ok(args[0].clone()))
            .is_err());
    }

    #[test]
    fn clone_freezes_parent_and_starts_fresh_overlay() {
        let mut base = Environment::new();
        base.register_variable("x", Type::Int).unwrap();
        let mut child = base.clone();
        // base is now frozen; further registration on base fails.
        assert!(base.register_variable("y", Type::Int).is_err());
        // child can still register, and still sees the parent's variable.
        child.register_variable("y", Type::Int).unwrap();
        assert_eq!(child.lookup_variable("x"), Some(Type::Int));
        assert_eq!(child.lookup_variable("y"), Some(Type::Int));
    }

    #[test]
    fn method_candidates_match_any_list_regardless_of_element_type() {
        let mut env = Environment::new();
        env.register_macro("list.all(dyn, dyn): bool").unwrap();
        let candidates = env.method_candidates("all", 2);
        let narrowed = candidates.filter_by_receiver_type(&Type::List(Box::new(Type::Int)));
        assert!(narrowed.has_any());
    }
}
