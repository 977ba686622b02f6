//! `google.protobuf.Timestamp`/`Duration` arithmetic (§4.6: "`ts + dur`,
//! `dur + ts` → ts; `ts - dur` → ts; `ts - ts` → dur; `dur ± dur` →
//! dur").

use crate::error::{EvalErrorKind, EvaluationError};
use crate::registry::Environment;
use crate::value::{CelDuration, CelTimestamp, Value};

fn overflow(detail: &str) -> EvaluationError {
    EvaluationError::new(EvalErrorKind::IntegerOverflow {
        detail: detail.to_string(),
    })
}

pub(super) fn install(env: &mut Environment) {
    env.register_operator(
        "google.protobuf.Timestamp + google.protobuf.Duration: google.protobuf.Timestamp",
        |args| match (&args[0], &args[1]) {
            (Value::Timestamp(ts), Value::Duration(dur)) => {
                Ok(Value::Timestamp(CelTimestamp(ts.0 + dur.to_chrono())))
            }
            _ => unreachable!(),
        },
    )
    .unwrap();
    env.register_operator(
        "google.protobuf.Duration + google.protobuf.Timestamp: google.protobuf.Timestamp",
        |args| match (&args[0], &args[1]) {
            (Value::Duration(dur), Value::Timestamp(ts)) => {
                Ok(Value::Timestamp(CelTimestamp(ts.0 + dur.to_chrono())))
            }
            _ => unreachable!(),
        },
    )
    .unwrap();
    env.register_operator(
        "google.protobuf.Timestamp - google.protobuf.Duration: google.protobuf.Timestamp",
        |args| match (&args[0], &args[1]) {
            (Value::Timestamp(ts), Value::Duration(dur)) => {
                Ok(Value::Timestamp(CelTimestamp(ts.0 - dur.to_chrono())))
            }
            _ => unreachable!(),
        },
    )
    .unwrap();
    env.register_operator(
        "google.protobuf.Timestamp - google.protobuf.Timestamp: google.protobuf.Duration",
        |args| match (&args[0], &args[1]) {
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                let delta = a.0 - b.0;
                let total_nanos = delta
                    .num_nanoseconds()
                    .ok_or_else(|| overflow("timestamp difference overflowed a duration"))?;
                let seconds = total_nanos / 1_000_000_000;
                let nanos = (total_nanos % 1_000_000_000) as i32;
                Ok(Value::Duration(CelDuration::new(seconds, nanos)))
            }
            _ => unreachable!(),
        },
    )
    .unwrap();
    env.register_operator(
        "google.protobuf.Duration + google.protobuf.Duration: google.protobuf.Duration",
        |args| match (&args[0], &args[1]) {
            (Value::Duration(a), Value::Duration(b)) => a
                .checked_add(*b)
                .map(Value::Duration)
                .ok_or_else(|| overflow("duration addition overflowed")),
            _ => unreachable!(),
        },
    )
    .unwrap();
    env.register_operator(
        "google.protobuf.Duration - google.protobuf.Duration: google.protobuf.Duration",
        |args| match (&args[0], &args[1]) {
            (Value::Duration(a), Value::Duration(b)) => a
                .checked_sub(*b)
                .map(Value::Duration)
                .ok_or_else(|| overflow("duration subtraction overflowed")),
            _ => unreachable!(),
        },
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::evaluator::Evaluator;
    use crate::parser::parse;
    use crate::registry::Environment;
    use std::sync::Arc;
    use crate::value::MapKey;

    fn eval_with(source: &str, ctx: Value) -> Result<Value, EvaluationError> {
        let env = Environment::standard();
        Evaluator::new(&env).evaluate(&parse(source).unwrap(), &ctx)
    }

    #[test]
    fn duration_subtraction_is_checked() {
        let mut ctx = crate::value::CelMap::new();
        ctx.insert(
            MapKey::String(Arc::from("d1")),
            Value::Duration(CelDuration::new(10, 0)),
        );
        ctx.insert(
            MapKey::String(Arc::from("d2")),
            Value::Duration(CelDuration::new(4, 0)),
        );
        assert_eq!(
            eval_with("d1 - d2", Value::map(ctx)).unwrap(),
            Value::Duration(CelDuration::new(6, 0))
        );
    }
}
