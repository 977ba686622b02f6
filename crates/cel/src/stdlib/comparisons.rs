//! Relational operator overloads (`<`, `<=`, `>`, `>=`). Equality and
//! `!=` are handled directly by the evaluator's dyn-gated numeric rule
//! (§4.6) rather than through the registry.

use crate::registry::Environment;
use crate::value::{Uint, Value};

macro_rules! relational {
    ($env:expr, $ty:literal, $pat:path) => {
        $env.register_operator(concat!($ty, " < ", $ty, ": bool"), |args| {
            match (&args[0], &args[1]) {
                ($pat(a), $pat(b)) => Ok(Value::Bool(a < b)),
                _ => unreachable!(),
            }
        })
        .unwrap();
        $env.register_operator(concat!($ty, " <= ", $ty, ": bool"), |args| {
            match (&args[0], &args[1]) {
                ($pat(a), $pat(b)) => Ok(Value::Bool(a <= b)),
                _ => unreachable!(),
            }
        })
        .unwrap();
        $env.register_operator(concat!($ty, " > ", $ty, ": bool"), |args| {
            match (&args[0], &args[1]) {
                ($pat(a), $pat(b)) => Ok(Value::Bool(a > b)),
                _ => unreachable!(),
            }
        })
        .unwrap();
        $env.register_operator(concat!($ty, " >= ", $ty, ": bool"), |args| {
            match (&args[0], &args[1]) {
                ($pat(a), $pat(b)) => Ok(Value::Bool(a >= b)),
                _ => unreachable!(),
            }
        })
        .unwrap();
    };
}

pub(super) fn install(env: &mut Environment) {
    relational!(env, "int", Value::Int);
    relational!(env, "double", Value::Double);
    relational!(env, "string", Value::String);
    relational!(env, "bytes", Value::Bytes);
    relational!(env, "google.protobuf.Timestamp", Value::Timestamp);
    relational!(env, "google.protobuf.Duration", Value::Duration);

    env.register_operator("uint < uint: bool", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Bool(a < b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint <= uint: bool", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Bool(a <= b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint > uint: bool", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Bool(a > b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint >= uint: bool", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Bool(a >= b)),
        _ => unreachable!(),
    })
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::evaluator::Evaluator;
    use crate::parser::parse;

    fn eval(source: &str) -> Result<Value, EvaluationError> {
        let env = Environment::standard();
        Evaluator::new(&env).evaluate(&parse(source).unwrap(), &Value::Null)
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert_eq!(eval("'a' < 'b'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn uint_ordering() {
        assert_eq!(eval("2u > 1u").unwrap(), Value::Bool(true));
    }
}
