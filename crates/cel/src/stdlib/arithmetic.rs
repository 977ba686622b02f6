//! Arithmetic operator overloads (§4.6): checked `int`, wrapping `uint`,
//! IEEE-754 `double`, and the concatenating `+` on `string`/`bytes`/`list`.

use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::value::{Uint, Value};

pub(super) fn install(env: &mut Environment) {
    install_unary(env);
    install_int(env);
    install_uint(env);
    install_double(env);
    install_concat(env);
}

fn install_unary(env: &mut Environment) {
    env.register_operator("! bool: bool", |args| match &args[0] {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => unreachable!("dispatch already matched the bool overload"),
    })
    .unwrap();
    env.register_operator("- int: int", |args| match &args[0] {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvaluationError::new(EvalErrorKind::IntegerOverflow {
                detail: format!("-{n}"),
            })),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("- double: double", |args| match &args[0] {
        Value::Double(d) => Ok(Value::Double(-d)),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_int(env: &mut Environment) {
    env.register_operator("int + int: int", |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| overflow(format!("{a} + {b}"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("int - int: int", |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| overflow(format!("{a} - {b}"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("int * int: int", |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| overflow(format!("{a} * {b}"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("int / int: int", |args| match (&args[0], &args[1]) {
        (Value::Int(_), Value::Int(0)) => Err(EvaluationError::new(EvalErrorKind::DivisionByZero)),
        (Value::Int(a), Value::Int(b)) => a
            .checked_div(*b)
            .map(Value::Int)
            .ok_or_else(|| overflow(format!("{a} / {b}"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("int % int: int", |args| match (&args[0], &args[1]) {
        (Value::Int(_), Value::Int(0)) => Err(EvaluationError::new(EvalErrorKind::ModuloByZero)),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_uint(env: &mut Environment) {
    env.register_operator("uint + uint: uint", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Uint(Uint(a.wrapping_add(*b)))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint - uint: uint", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Uint(Uint(a.wrapping_sub(*b)))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint * uint: uint", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Uint(Uint(a.wrapping_mul(*b)))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint / uint: uint", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(_)), Value::Uint(Uint(0))) => {
            Err(EvaluationError::new(EvalErrorKind::DivisionByZero))
        }
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Uint(Uint(a / b))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("uint % uint: uint", |args| match (&args[0], &args[1]) {
        (Value::Uint(Uint(_)), Value::Uint(Uint(0))) => {
            Err(EvaluationError::new(EvalErrorKind::ModuloByZero))
        }
        (Value::Uint(Uint(a)), Value::Uint(Uint(b))) => Ok(Value::Uint(Uint(a % b))),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_double(env: &mut Environment) {
    env.register_operator("double + double: double", |args| match (&args[0], &args[1]) {
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("double - double: double", |args| match (&args[0], &args[1]) {
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a - b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("double * double: double", |args| match (&args[0], &args[1]) {
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a * b)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("double / double: double", |args| match (&args[0], &args[1]) {
        (Value::Double(_), Value::Double(b)) if *b == 0.0 => {
            Err(EvaluationError::new(EvalErrorKind::DivisionByZero))
        }
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a / b)),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_concat(env: &mut Environment) {
    env.register_operator("string + string: string", |args| match (&args[0], &args[1]) {
        (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("bytes + bytes: bytes", |args| match (&args[0], &args[1]) {
        (Value::Bytes(a), Value::Bytes(b)) => {
            Ok(Value::bytes(a.iter().chain(b.iter()).copied().collect::<Vec<u8>>()))
        }
        _ => unreachable!(),
    })
    .unwrap();
    env.register_operator("list + list: list", |args| match (&args[0], &args[1]) {
        (Value::List(a), Value::List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => unreachable!(),
    })
    .unwrap();
}

fn overflow(detail: String) -> EvaluationError {
    EvaluationError::new(EvalErrorKind::IntegerOverflow { detail })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::parser::parse;

    fn eval(source: &str) -> Result<Value, EvaluationError> {
        let env = Environment::standard();
        Evaluator::new(&env).evaluate(&parse(source).unwrap(), &Value::Null)
    }

    #[test]
    fn int_overflow_is_detected_on_add() {
        let err = eval(&format!("{} + 1", i64::MAX)).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::IntegerOverflow { .. }));
    }

    #[test]
    fn uint_add_wraps() {
        assert_eq!(
            eval(&format!("{}u + 1u", u64::MAX)).unwrap(),
            Value::Uint(Uint(0))
        );
    }

    #[test]
    fn double_division_by_zero_raises() {
        let err = eval("1.0 / 0.0").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval(r#"'a' + 'b'"#).unwrap(), Value::string("ab"));
    }

    #[test]
    fn list_concatenation() {
        assert_eq!(
            eval("[1, 2] + [3]").unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }
}
