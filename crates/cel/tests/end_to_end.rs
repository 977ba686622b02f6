//! End-to-end evaluation scenarios against the standard environment.

use cel::{CelMap, Environment, MapKey, Value};

fn eval(source: &str, context: Value) -> Result<Value, cel::EvaluationError> {
    let env = Environment::standard().with_unlisted_variables_as_dyn(true);
    cel::evaluate(source, &context, &env)
}

fn map(pairs: Vec<(&str, Value)>) -> Value {
    let mut m = CelMap::new();
    for (k, v) in pairs {
        m.insert(MapKey::String(k.into()), v);
    }
    Value::map(m)
}

#[test]
fn arithmetic_precedence_without_a_context() {
    assert_eq!(eval("1 + 2 * 3", Value::Null).unwrap(), Value::Int(7));
}

#[test]
fn membership_over_a_nested_list() {
    let ctx = map(vec![(
        "user",
        map(vec![(
            "roles",
            Value::list(vec![Value::string("user"), Value::string("admin")]),
        )]),
    )]);
    assert_eq!(eval("\"admin\" in user.roles", ctx).unwrap(), Value::Bool(true));
}

#[test]
fn filter_then_map_over_a_list_of_records() {
    let user = |name: &str, active: bool| {
        map(vec![("name", Value::string(name)), ("active", Value::Bool(active))])
    };
    let ctx = map(vec![(
        "users",
        Value::list(vec![user("a", true), user("b", false), user("c", true)]),
    )]);
    let result = eval("users.filter(u, u.active).map(u, u.name)", ctx).unwrap();
    assert_eq!(
        result,
        Value::list(vec![Value::string("a"), Value::string("c")])
    );
}

#[test]
fn short_circuit_and_absorbs_a_division_by_zero() {
    assert_eq!(
        eval("false && (1/0 > 0)", Value::Null).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn ternary_picks_the_adult_branch() {
    let ctx = map(vec![("age", Value::Int(25))]);
    assert_eq!(
        eval("age >= 18 ? \"adult\" : \"minor\"", ctx).unwrap(),
        Value::string("adult")
    );
}

#[test]
fn has_short_circuits_a_missing_field_chain() {
    let present = map(vec![(
        "user",
        map(vec![("email", Value::string("a@example.com"))]),
    )]);
    assert_eq!(
        eval(
            "has(user.email) && user.email.endsWith(\"@example.com\")",
            present
        )
        .unwrap(),
        Value::Bool(true)
    );

    let missing = map(vec![("user", map(vec![]))]);
    assert_eq!(
        eval(
            "has(user.email) && user.email.endsWith(\"@example.com\")",
            missing
        )
        .unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn exists_is_the_negation_of_all_with_a_negated_predicate() {
    let xs = Value::list(vec![Value::Int(1), Value::Int(-2), Value::Int(3)]);
    let ctx = map(vec![("xs", xs)]);
    let exists = eval("xs.exists(x, x < 0)", ctx.clone()).unwrap();
    let not_all_nonneg = eval("!xs.all(x, !(x < 0))", ctx).unwrap();
    assert_eq!(exists, not_all_nonneg);
}

#[test]
fn filtered_elements_all_satisfy_their_own_predicate() {
    let xs = Value::list(vec![Value::Int(1), Value::Int(-2), Value::Int(3), Value::Int(-4)]);
    let ctx = map(vec![("xs", xs)]);
    assert_eq!(
        eval("xs.filter(x, x > 0).all(x, x > 0)", ctx).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn list_index_out_of_bounds_reports_index_and_size() {
    let ctx = map(vec![("xs", Value::list(vec![Value::Int(1), Value::Int(2)]))]);
    let err = eval("xs[5]", ctx).unwrap_err();
    assert_eq!(err.to_string(), "index 5 >= size 2");
}

#[test]
fn reserved_word_cannot_be_used_as_an_identifier() {
    let err = cel::parse("let + 1").unwrap_err();
    assert!(err.to_string().contains("let"));
}

#[test]
fn integer_overflow_is_reported_on_addition() {
    let source = format!("{} + 1", i64::MAX);
    let err = eval(&source, Value::Null).unwrap_err();
    assert!(err.to_string().contains("integer overflow"));
}
