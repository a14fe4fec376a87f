//! Handle lifetimes across collections: transient handles die at the next
//! collection, held handles survive until released, and stale handles
//! never crash.

use dynbridge::{Context, ContextOptions, DynKind};

fn ctx() -> Context {
    Context::init().expect("context")
}

#[test]
fn collect_invalidates_transient_handles() {
    let mut ctx = ctx();
    let obj = ctx.new_object();
    let n = ctx.new_number(1.0);
    assert!(ctx.is_live(obj));

    let stats = ctx.collect();
    assert!(stats.handles_dropped >= 2);
    assert!(!ctx.is_live(obj));
    assert!(!ctx.is_live(n));

    // Stale handles answer predicates negatively and fail operations.
    assert!(!ctx.is_object(obj));
    assert!(!ctx.is_number(n));
    assert_eq!(ctx.type_of(obj), DynKind::Unknown);
    assert!(ctx.get_property(obj, "x").unwrap_err().is_exception());
    assert!(ctx.to_number(n).unwrap_err().is_exception());
}

#[test]
fn held_values_survive_collection() {
    let mut ctx = ctx();
    let obj = ctx.new_object();
    let payload = ctx.new_string("kept");
    ctx.set_property(obj, "payload", payload).unwrap();
    let held = ctx.hold(obj).unwrap();
    assert_eq!(ctx.held_count(), 1);

    ctx.collect();
    assert!(ctx.is_live(held));
    let payload = ctx.get_property(held, "payload").unwrap();
    assert_eq!(ctx.to_display_string(payload).unwrap(), "kept");

    assert!(ctx.release(held));
    assert_eq!(ctx.held_count(), 0);
    assert!(!ctx.is_live(held));
}

#[test]
fn unreachable_objects_are_swept() {
    let mut ctx = ctx();
    ctx.collect();
    let baseline = ctx.live_objects();

    for _ in 0..10 {
        let obj = ctx.new_object();
        let arr = ctx.new_array();
        ctx.set_property(obj, "arr", arr).unwrap();
    }
    assert_eq!(ctx.live_objects(), baseline + 20);

    let stats = ctx.collect();
    assert_eq!(stats.swept_count, 20);
    assert_eq!(ctx.live_objects(), baseline);
}

#[test]
fn held_graphs_keep_their_children() {
    let mut ctx = ctx();
    ctx.collect();
    let baseline = ctx.live_objects();
    let root = ctx.parse_json(r#"{"a": {"b": [1, {"c": 2}]}}"#).unwrap();
    let root = ctx.hold(root).unwrap();
    ctx.collect();
    assert_eq!(ctx.live_objects(), baseline + 4);
    assert_eq!(ctx.to_json(root).unwrap(), r#"{"a":{"b":[1,{"c":2}]}}"#);

    ctx.release(root);
    ctx.collect();
    assert_eq!(ctx.live_objects(), baseline);
}

#[test]
fn registered_classes_and_pending_exceptions_are_roots() {
    let mut ctx = ctx();
    let ctor = ctx.new_host_function("Widget", |ctx, _this, _args| Ok(ctx.new_undefined()));
    ctx.register_class("Widget", ctor).unwrap();
    let thrown = ctx.new_object();
    let _ = ctx.throw_exception(thrown);
    ctx.collect();

    assert!(ctx.new_object_with_class("Widget", &[]).is_ok());
    let thrown = ctx.take_exception().expect("pending exception survives collection");
    assert!(ctx.is_object(thrown));
}

#[test]
fn queued_jobs_keep_their_arguments_alive() {
    let mut ctx = ctx();
    let f = ctx.new_host_function("check", |ctx, _this, args| {
        let v = ctx.get_property(args[0], "tag")?;
        assert_eq!(ctx.to_display_string(v)?, "alive");
        Ok(ctx.new_undefined())
    });
    let arg = ctx.parse_json(r#"{"tag": "alive"}"#).unwrap();
    ctx.enqueue_job(f, &[arg]).unwrap();
    ctx.collect();
    assert!(ctx.execute_pending_jobs().unwrap());
}

#[test]
fn release_of_permanent_or_stale_handles_is_a_logged_no_op() {
    let mut ctx = ctx();
    let undefined = ctx.new_undefined();
    assert!(!ctx.release(undefined));
    assert!(ctx.is_undefined(undefined));

    let n = ctx.new_number(3.0);
    assert!(ctx.release(n));
    assert!(!ctx.release(n));

    assert_eq!(ctx.events().named("release_permanent").count(), 1);
    assert_eq!(ctx.events().named("release_stale").count(), 1);
    assert_eq!(ctx.events().named("release").count(), 1);
}

#[test]
fn singletons_survive_every_collection() {
    let mut ctx = ctx();
    let null = ctx.new_null();
    let undefined = ctx.new_undefined();
    ctx.collect();
    ctx.collect();
    assert!(ctx.is_null(null));
    assert!(ctx.is_undefined(undefined));
    assert_eq!(ctx.new_null(), null);
}

#[test]
fn hold_of_a_stale_handle_fails() {
    let mut ctx = ctx();
    let obj = ctx.new_object();
    ctx.collect();
    assert!(ctx.hold(obj).unwrap_err().is_exception());
    let failure = ctx.events().named("hold").last().expect("hold event");
    assert_eq!(failure.outcome, "fail");
}

#[test]
fn destroy_reports_leaks() {
    let mut ctx = Context::init_with_options(ContextOptions::default().with_trace_id("leaky")).unwrap();
    let s = ctx.new_string("text");
    let _leaked = ctx.to_cstring(s).unwrap();
    let freed = ctx.to_cstring(s).unwrap();
    ctx.free_cstring(freed);
    let obj = ctx.new_object();
    ctx.hold(obj).unwrap();

    let report = ctx.destroy();
    assert_eq!(report.leaked_cstrings, 1);
    assert_eq!(report.live_holds, 1);
    assert!(report.events.iter().all(|e| e.trace_id == "leaky"));
    assert!(report.events.iter().any(|e| e.event == "context_destroy_with_leaks"));
}
