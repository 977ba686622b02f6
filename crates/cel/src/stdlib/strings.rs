//! `string` methods (§4.6 only requires `+`; `contains`/`startsWith`/
//! `endsWith` round out the minimal standard library §[NEW] calls for).
//! `matches` (regex) is intentionally not provided — no regex dependency
//! is introduced.

use crate::registry::Environment;
use crate::value::Value;

pub(super) fn install(env: &mut Environment) {
    env.register_function("string.contains(string): bool", |args| {
        match (&args[0], &args[1]) {
            (Value::String(s), Value::String(needle)) => Ok(Value::Bool(s.contains(needle.as_ref()))),
            _ => unreachable!(),
        }
    })
    .unwrap();
    env.register_function("string.startsWith(string): bool", |args| {
        match (&args[0], &args[1]) {
            (Value::String(s), Value::String(prefix)) => {
                Ok(Value::Bool(s.starts_with(prefix.as_ref())))
            }
            _ => unreachable!(),
        }
    })
    .unwrap();
    env.register_function("string.endsWith(string): bool", |args| {
        match (&args[0], &args[1]) {
            (Value::String(s), Value::String(suffix)) => Ok(Value::Bool(s.ends_with(suffix.as_ref()))),
            _ => unreachable!(),
        }
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
    fn contains_and_prefix_suffix() {
        assert_eq!(eval("'hello world'.contains('world')").unwrap(), Value::Bool(true));
        assert_eq!(eval("'hello'.startsWith('he')").unwrap(), Value::Bool(true));
        assert_eq!(eval("'hello'.endsWith('lo')").unwrap(), Value::Bool(true));
    }
}
