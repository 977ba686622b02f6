//! The `in` operator (§4.6): substring test, list membership (with
//! numeric coercion) and map key presence.

use super::values_equal;
use crate::registry::Environment;
use crate::value::{MapKey, Value};

pub(super) fn install(env: &mut Environment) {
    env.register_operator("string in string: bool", |args| match (&args[0], &args[1]) {
        (Value::String(needle), Value::String(haystack)) => {
            Ok(Value::Bool(haystack.contains(needle.as_ref())))
        }
        _ => unreachable!(),
    })
    .unwrap();

    env.register_operator("dyn in list: bool", |args| match &args[1] {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|item| values_equal(&args[0], item)))),
        _ => unreachable!(),
    })
    .unwrap();

    env.register_operator("dyn in map: bool", |args| match &args[1] {
        Value::Map(map) => match MapKey::from_value(&args[0]) {
            Some(key) => Ok(Value::Bool(map.contains_key(&key))),
            None => Ok(Value::Bool(false)),
        },
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
    fn substring_membership() {
        assert_eq!(eval("'ell' in 'hello'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn list_membership_coerces_numeric_types() {
        assert_eq!(eval("2.0 in [1, 2, 3]").unwrap(), Value::Bool(true));
    }

    #[test]
    fn map_membership_checks_keys_not_values() {
        assert_eq!(eval("'a' in {'a': 1}").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 in {'a': 1}").unwrap(), Value::Bool(false));
    }
}
