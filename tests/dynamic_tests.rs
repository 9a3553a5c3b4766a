//! Dynamic Property-Path Tests
//!
//! Tests for:
//! - Accessor rendering: dotted paths, bracket indices, quoted literals
//! - Escaping of backslashes and double quotes
//! - Strict rejection of malformed paths
//! - Static vs dynamic classification and per-invocation lowering

use wisp::codegen::{CodeGenEnvironment, Op, Place};
use wisp::dynamic::{DynamicValue, PathAccessor, accessor};
use wisp::value::Value;

// ============================================================================
// Accessor rendering
// ============================================================================

#[test]
fn dotted_path_renders_bracket_chain() {
    assert_eq!(accessor("a.b.c").unwrap(), r#"["a"]["b"]["c"]"#);
    assert_eq!(accessor("position.x").unwrap(), r#"["position"]["x"]"#);
}

#[test]
fn quoted_literal_matches_one_segment_form() {
    assert_eq!(accessor("'x'").unwrap(), accessor("x").unwrap());
    assert_eq!(accessor("\"x\"").unwrap(), r#"["x"]"#);
}

#[test]
fn bracket_indices_preserve_left_to_right_order() {
    assert_eq!(
        accessor("list[3].value").unwrap(),
        r#"["list"]["3"]["value"]"#
    );
    assert_eq!(accessor("m[0][1]").unwrap(), r#"["m"]["0"]["1"]"#);
    assert_eq!(accessor("flags[true]").unwrap(), r#"["flags"]["true"]"#);
    assert_eq!(accessor("a['b.c']").unwrap(), r#"["a"]["b.c"]"#);
}

#[test]
fn keys_are_escaped() {
    assert_eq!(accessor(r#"'a"b'"#).unwrap(), "[\"a\\\"b\"]");
    assert_eq!(accessor(r"'a\b'").unwrap(), r#"["a\\b"]"#);
}

#[test]
fn malformed_paths_are_rejected() {
    for path in ["", ".x", "x.", "a..b", "a[b]", "a[", "a]b", "a['x"] {
        assert!(accessor(path).is_err(), "expected rejection of {path:?}");
    }
}

// ============================================================================
// Path resolution
// ============================================================================

#[test]
fn resolve_walks_objects_and_lists() {
    let inner = Value::object();
    inner.set_key("x", Value::Float(0.5));
    let root = Value::object();
    root.set_key("position", inner);
    root.set_key("weights", Value::list(vec![Value::Int(1), Value::Int(2)]));

    let path = PathAccessor::parse("position.x").unwrap();
    assert_eq!(path.resolve(&root), Value::Float(0.5));

    let path = PathAccessor::parse("weights[1]").unwrap();
    assert_eq!(path.resolve(&root), Value::Int(2));

    // Missing steps degrade to Null rather than erroring.
    let path = PathAccessor::parse("position.z.w").unwrap();
    assert_eq!(path.resolve(&root), Value::Null);
}

// ============================================================================
// Classification & lowering
// ============================================================================

#[test]
fn static_values_are_not_dynamic() {
    assert!(!DynamicValue::from(Value::Int(3)).is_dynamic());
    assert!(DynamicValue::prop("color").unwrap().is_dynamic());
    assert!(DynamicValue::context("tick").unwrap().is_dynamic());
    assert!(DynamicValue::this("uniforms").unwrap().is_dynamic());
    assert!(DynamicValue::func(|_, _| Value::Null).is_dynamic());
}

/// Lowers a dynamic value into a two-argument procedure `(context, props)`
/// and invokes it.
fn eval_lowered(value: &DynamicValue, context: Value, props: Value) -> Value {
    let mut env = CodeGenEnvironment::new();
    let body = env.proc("resolve", 2);
    let expr = value.lower(Place::Arg(0), Place::Arg(1), Place::Arg(0));
    let entry = env.entry(body);
    env.push(entry, Op::Return(expr));
    env.compile().call("resolve", &[context, props])
}

#[test]
fn prop_lookup_resolves_per_invocation() {
    let value = DynamicValue::prop("color.r").unwrap();

    let color = Value::object();
    color.set_key("r", Value::Float(1.0));
    let props = Value::object();
    props.set_key("color", color);

    assert_eq!(
        eval_lowered(&value, Value::object(), props),
        Value::Float(1.0)
    );
    // A different props object on the next invocation resolves differently.
    assert_eq!(
        eval_lowered(&value, Value::object(), Value::object()),
        Value::Null
    );
}

#[test]
fn context_lookup_reads_frame_context() {
    let value = DynamicValue::context("tick").unwrap();
    let context = Value::object();
    context.set_key("tick", Value::Int(9));
    assert_eq!(
        eval_lowered(&value, context, Value::object()),
        Value::Int(9)
    );
}

#[test]
fn raw_callable_receives_context_and_props() {
    let value = DynamicValue::func(|context, props| {
        let base = context.get_key("base");
        let offset = props.get_key("offset");
        match (base, offset) {
            (Value::Int(b), Value::Int(o)) => Value::Int(b + o),
            _ => Value::Null,
        }
    });

    let context = Value::object();
    context.set_key("base", Value::Int(100));
    let props = Value::object();
    props.set_key("offset", Value::Int(23));

    assert_eq!(eval_lowered(&value, context, props), Value::Int(123));
}

#[test]
fn static_value_bypasses_resolution() {
    let value = DynamicValue::from(Value::str("constant"));
    assert_eq!(
        eval_lowered(&value, Value::object(), Value::object()),
        Value::str("constant")
    );
}
