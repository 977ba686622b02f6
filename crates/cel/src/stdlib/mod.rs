//! The standard function/operator library installed by `Environment::standard`
//! (§4.6). Split by concern the way the teacher's own primitive modules
//! were split one-per-value-kind; each submodule owns one `install_*`
//! entry point that registers its overloads against a live `Environment`.

mod arithmetic;
mod collections;
mod comparisons;
mod conversions;
mod membership;
mod strings;
mod time;

use crate::registry::Environment;

/// Registers every built-in operator and function (§4.6) plus the
/// handful of free functions §3.1 implies must exist (`size`, `type`,
/// the numeric/string conversions).
pub(crate) fn install(env: &mut Environment) {
    arithmetic::install(env);
    comparisons::install(env);
    membership::install(env);
    collections::install(env);
    conversions::install(env);
    strings::install(env);
    time::install(env);
}

/// Numeric cross-type equality used by `in` and (via the evaluator's own
/// copy for `==`/`!=`) equality: int/uint/double values compare equal
/// when their magnitudes match, regardless of tag (§4.6, §9).
pub(crate) fn numeric_eq(a: &crate::value::Value, b: &crate::value::Value) -> bool {
    fn as_f64(v: &crate::value::Value) -> Option<f64> {
        match v {
            crate::value::Value::Int(n) => Some(*n as f64),
            crate::value::Value::Uint(crate::value::Uint(n)) => Some(*n as f64),
            crate::value::Value::Double(d) => Some(*d),
            _ => None,
        }
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// `==` used by `in`'s membership test: structural for matching tags,
/// numeric coercion across `int`/`uint`/`double` (§4.6: "numeric elements
/// compare with int/uint coercion").
pub(crate) fn values_equal(a: &crate::value::Value, b: &crate::value::Value) -> bool {
    if a.type_tag() == b.type_tag() {
        a.structural_eq(b)
    } else if a.type_tag().is_numeric() && b.type_tag().is_numeric() {
        numeric_eq(a, b)
    } else {
        false
    }
}
