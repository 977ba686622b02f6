//! `size()`, as both a free function and a method, for the four
//! aggregate tags that have one (§3.1: "size() counts code points, not
//! bytes").

use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::value::Value;

fn size_of(value: &Value) -> Result<Value, EvaluationError> {
    value.size().map(Value::Int).ok_or_else(|| {
        EvaluationError::new(EvalErrorKind::NoSuchOverload {
            op: "size".to_string(),
            left: value.type_tag().to_string(),
            right: None,
        })
    })
}

pub(super) fn install(env: &mut Environment) {
    env.register_function("size(dyn): int", |args| size_of(&args[0])).unwrap();

    for receiver in ["string", "bytes", "list", "map"] {
        env.register_function(&format!("{receiver}.size(): int"), |args| size_of(&args[0]))
            .unwrap();
    }
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
    fn size_counts_code_points() {
        assert_eq!(eval("size('héllo')").unwrap(), Value::Int(5));
    }

    #[test]
    fn size_as_a_method() {
        assert_eq!(eval("[1, 2, 3].size()").unwrap(), Value::Int(3));
    }
}
