//! `int()`, `uint()`, `double()`, `string()` and `type()` conversions
//! (§3.1 lists `type` as a runtime tag; the distilled spec never states
//! how a caller obtains one, so a `type()` function is supplied).

use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::value::{Uint, Value};

fn range_error(detail: impl Into<String>) -> EvaluationError {
    EvaluationError::new(EvalErrorKind::IntegerOverflow { detail: detail.into() })
}

pub(super) fn install(env: &mut Environment) {
    install_int(env);
    install_uint(env);
    install_double(env);
    install_string(env);
    env.register_function("type(dyn): type", |args| Ok(Value::Type(args[0].type_tag())))
        .unwrap();
}

fn install_int(env: &mut Environment) {
    env.register_function("int(int): int", |args| Ok(args[0].clone())).unwrap();
    env.register_function("int(uint): int", |args| match &args[0] {
        Value::Uint(Uint(n)) => i64::try_from(*n)
            .map(Value::Int)
            .map_err(|_| range_error(format!("{n}u does not fit in int"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("int(double): int", |args| match &args[0] {
        Value::Double(d) if d.is_finite() && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 => {
            Ok(Value::Int(*d as i64))
        }
        Value::Double(d) => Err(range_error(format!("{d} does not fit in int"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("int(string): int", |args| match &args[0] {
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvaluationError::custom(format!("'{s}' is not a valid int"))),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_uint(env: &mut Environment) {
    env.register_function("uint(uint): uint", |args| Ok(args[0].clone())).unwrap();
    env.register_function("uint(int): uint", |args| match &args[0] {
        Value::Int(n) => u64::try_from(*n)
            .map(|n| Value::Uint(Uint(n)))
            .map_err(|_| range_error(format!("{n} does not fit in uint"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("uint(double): uint", |args| match &args[0] {
        Value::Double(d) if d.is_finite() && *d >= 0.0 && *d <= u64::MAX as f64 => {
            Ok(Value::Uint(Uint(*d as u64)))
        }
        Value::Double(d) => Err(range_error(format!("{d} does not fit in uint"))),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("uint(string): uint", |args| match &args[0] {
        Value::String(s) => s
            .parse::<u64>()
            .map(|n| Value::Uint(Uint(n)))
            .map_err(|_| EvaluationError::custom(format!("'{s}' is not a valid uint"))),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_double(env: &mut Environment) {
    env.register_function("double(double): double", |args| Ok(args[0].clone())).unwrap();
    env.register_function("double(int): double", |args| match &args[0] {
        Value::Int(n) => Ok(Value::Double(*n as f64)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("double(uint): double", |args| match &args[0] {
        Value::Uint(Uint(n)) => Ok(Value::Double(*n as f64)),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("double(string): double", |args| match &args[0] {
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvaluationError::custom(format!("'{s}' is not a valid double"))),
        _ => unreachable!(),
    })
    .unwrap();
}

fn install_string(env: &mut Environment) {
    env.register_function("string(string): string", |args| Ok(args[0].clone())).unwrap();
    env.register_function("string(int): string", |args| Ok(Value::string(args[0].to_string())))
        .unwrap();
    env.register_function("string(uint): string", |args| match &args[0] {
        Value::Uint(Uint(n)) => Ok(Value::string(n.to_string())),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("string(double): string", |args| match &args[0] {
        Value::Double(d) => Ok(Value::string(d.to_string())),
        _ => unreachable!(),
    })
    .unwrap();
    env.register_function("string(bool): string", |args| Ok(Value::string(args[0].to_string())))
        .unwrap();
    env.register_function("string(bytes): string", |args| match &args[0] {
        Value::Bytes(b) => std::str::from_utf8(b)
            .map(Value::string)
            .map_err(|_| EvaluationError::custom("bytes are not valid UTF-8")),
        _ => unreachable!(),
    })
    .unwrap();
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
    fn int_from_double_truncates() {
        assert_eq!(eval("int(3.9)").unwrap(), Value::Int(3));
    }

    #[test]
    fn uint_from_negative_int_is_an_error() {
        assert!(eval("uint(-1)").is_err());
    }

    #[test]
    fn string_of_int() {
        assert_eq!(eval("string(42)").unwrap(), Value::string("42"));
    }

    #[test]
    fn type_returns_a_type_value() {
        assert_eq!(eval("type(1)").unwrap(), Value::Type(crate::value::Type::Int));
    }
}
