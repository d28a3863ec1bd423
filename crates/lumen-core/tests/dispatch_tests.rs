//! Call variants, per-call-site caching and broadcast sweeps

mod common;

use common::test_context;
use lumen_core::{
    broadcast, call_direct, call_direct_strict, call_other, call_strict, CallSite, LwError, Value,
};

#[test]
fn test_strict_call_raises_on_missing() {
    let ctx = test_context();
    let cell = ctx.create("/lwo/cell", &[]).unwrap();

    let err = call_strict(&ctx, &cell, "nonexistent", &[]).unwrap_err();
    match err {
        LwError::MethodNotFound { path, name } => {
            assert_eq!(path, "/lwo/cell");
            assert_eq!(name, "nonexistent");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_non_strict_call_reports_missing_as_none() {
    let ctx = test_context();
    let cell = ctx.create("/lwo/cell", &[]).unwrap();

    assert_eq!(call_other(&ctx, &cell, "nonexistent", &[]).unwrap(), None);
    assert_eq!(
        call_other(&ctx, &cell, "get", &[]).unwrap(),
        Some(Value::zero())
    );
}

#[test]
fn test_direct_call_ignores_inherited_methods() {
    let ctx = test_context();
    let counted = ctx.create("/lwo/counted_stack", &[]).unwrap();

    // pop() is only inherited; push() is overridden locally.
    assert!(matches!(
        call_direct_strict(&ctx, &counted, "pop", &[]),
        Err(LwError::MethodNotFound { .. })
    ));
    assert_eq!(call_direct(&ctx, &counted, "pop", &[]).unwrap(), None);
    assert!(call_direct(&ctx, &counted, "push", &[Value::Int(1)])
        .unwrap()
        .is_some());
}

#[test]
fn test_override_wins_over_inherited() {
    let ctx = test_context();
    let counted = ctx.create("/lwo/counted_stack", &[]).unwrap();

    ctx.call_strict(&counted, "push", &[Value::string("a")])
        .unwrap();
    ctx.call_strict(&counted, "push", &[Value::string("b")])
        .unwrap();
    assert_eq!(counted.var("count"), Some(Value::Int(2)));
    assert_eq!(
        ctx.call_strict(&counted, "pop", &[]).unwrap(),
        Value::string("b")
    );
}

#[test]
fn test_call_site_does_not_serve_stale_binding() {
    // One call site used against instances of two different blueprints
    // that happen to share a method name: each dispatch must land in the
    // receiver's own method, not the one cached from the previous call.
    let ctx = test_context();
    let stack = ctx.create("/lwo/stack", &[]).unwrap();
    let counted = ctx.create("/lwo/counted_stack", &[]).unwrap();
    let site = CallSite::new("push");

    site.call(&ctx, &stack, &[Value::Int(1)]).unwrap();
    site.call(&ctx, &counted, &[Value::Int(2)]).unwrap();
    site.call(&ctx, &stack, &[Value::Int(3)]).unwrap();

    // Only the counted stack counts; the plain stack has no count slot.
    assert_eq!(counted.var("count"), Some(Value::Int(1)));
    assert_eq!(
        stack.var("stack").unwrap().as_array().unwrap().read().len(),
        2
    );
}

#[test]
fn test_call_site_strict_and_non_strict() {
    let ctx = test_context();
    let cell = ctx.create("/lwo/cell", &[]).unwrap();
    let site = CallSite::new("get");

    assert_eq!(site.call(&ctx, &cell, &[]).unwrap(), Value::zero());
    assert_eq!(
        site.try_call(&ctx, &cell, &[]).unwrap(),
        Some(Value::zero())
    );

    let missing = CallSite::new("nonexistent");
    assert!(missing.call(&ctx, &cell, &[]).is_err());
    assert_eq!(missing.try_call(&ctx, &cell, &[]).unwrap(), None);
}

#[test]
fn test_method_error_propagates() {
    let ctx = test_context();
    let bad = ctx.create("/lwo/err_copy", &[]).unwrap();
    assert!(matches!(
        call_strict(&ctx, &bad, "copied", &[]),
        Err(LwError::Runtime(_))
    ));
}

#[test]
fn test_broadcast_over_mixed_targets() {
    let ctx = test_context();
    let a = ctx.create("/lwo/cell", &[]).unwrap();
    let b = ctx.create("/lwo/cell", &[]).unwrap();
    ctx.call_strict(&a, "set", &[Value::string("first")]).unwrap();
    ctx.call_strict(&b, "set", &[Value::string("second")]).unwrap();
    let stack = ctx.create("/lwo/stack", &[]).unwrap();

    let targets = vec![
        Value::Lwo(a),
        Value::Int(42),
        Value::Lwo(stack),
        Value::Lwo(b),
    ];
    let results = broadcast(&ctx, &targets, "get", &[]).unwrap();
    assert_eq!(
        results,
        vec![
            Value::string("first"),
            Value::zero(),
            Value::zero(),
            Value::string("second")
        ]
    );
}

#[test]
fn test_methods_can_dispatch_nested_calls() {
    use lumen_core::ProgramBuilder;

    let ctx = test_context();
    ctx.programs().register(
        ProgramBuilder::new("/lwo/relay")
            .var("peer")
            .method("relay", |ctx, lwo, args| {
                match lwo.var("peer") {
                    Some(Value::Lwo(peer)) => ctx.call_strict(&peer, "set", args),
                    _ => Ok(Value::zero()),
                }
            })
            .build(),
    );

    let cell = ctx.create("/lwo/cell", &[]).unwrap();
    let relay = ctx.create("/lwo/relay", &[]).unwrap();
    relay.set_var("peer", Value::Lwo(cell.clone())).unwrap();

    ctx.call_strict(&relay, "relay", &[Value::string("via relay")])
        .unwrap();
    assert_eq!(cell.var("value"), Some(Value::string("via relay")));
}
