//! Calls across the bridge: static code invoking dynamic functions, dynamic
//! code reaching static functions through the dispatcher, and microtasks.

use std::cell::RefCell;
use std::rc::Rc;

use dynbridge::{
    BridgeError, Context, EnvToken, ErrorClass, ExtRefIndex, ExtRefTag, PromiseStatus, Value,
};

fn ctx() -> Context {
    Context::init().expect("context")
}

/// Dispatcher that records every call and answers with the table index.
fn recording_dispatcher(ctx: &mut Context) -> Rc<RefCell<Vec<(EnvToken, ExtRefIndex, usize)>>> {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = calls.clone();
    ctx.set_callback_dispatcher(move |ctx, env, index, _this, args| {
        seen.borrow_mut().push((env, index, args.len()));
        Ok(ctx.new_number(f64::from(index.0)))
    });
    calls
}

// ---------------------------------------------------------------------------
// static -> dynamic
// ---------------------------------------------------------------------------

#[test]
fn invoke_builtin_methods() {
    let mut ctx = ctx();
    let s = ctx.new_string("Bridge");
    let upper = ctx.invoke("toUpperCase", s, &[]).unwrap();
    assert_eq!(ctx.to_display_string(upper).unwrap(), "BRIDGE");

    let arr = ctx.new_array();
    for n in [3.0, 1.0, 2.0] {
        let v = ctx.new_number(n);
        ctx.invoke("push", arr, &[v]).unwrap();
    }
    let sep = ctx.new_string("-");
    let joined = ctx.invoke("join", arr, &[sep]).unwrap();
    assert_eq!(ctx.to_display_string(joined).unwrap(), "3-1-2");
}

#[test]
fn invoke_on_nullish_is_a_type_error() {
    let mut ctx = ctx();
    let undefined = ctx.new_undefined();
    let err = ctx.invoke("anything", undefined, &[]).unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(err.status().code(), -2);
}

#[test]
fn host_function_throw_surfaces_as_exception() {
    let mut ctx = ctx();
    let f = ctx.new_host_function("fails", |ctx, _this, _args| {
        Err(ctx.throw_error(ErrorClass::RangeError, "out of range"))
    });
    let err = ctx.call_func(f, &[]).unwrap_err();
    assert!(err.is_exception());
    assert_eq!(err.status().code(), -1);
    let thrown = ctx.take_exception().expect("pending exception");
    assert_eq!(ctx.to_display_string(thrown).unwrap(), "RangeError: out of range");
    assert!(!ctx.has_exception());
}

#[test]
fn call_func_rejects_non_callables() {
    let mut ctx = ctx();
    let n = ctx.new_number(4.0);
    assert!(ctx.call_func(n, &[]).unwrap_err().is_type_error());
}

// ---------------------------------------------------------------------------
// dynamic -> static
// ---------------------------------------------------------------------------

#[test]
fn extref_functions_route_through_the_dispatcher() {
    let mut ctx = ctx();
    let calls = recording_dispatcher(&mut ctx);
    let f = ctx.new_extref(ExtRefIndex(9), ExtRefTag::Function, EnvToken(5));
    assert!(ctx.is_function(f));
    let a = ctx.new_number(1.0);
    let b = ctx.new_number(2.0);
    let out = ctx.call_func(f, &[a, b]).unwrap();
    assert_eq!(ctx.to_number(out).unwrap(), 9.0);
    assert_eq!(*calls.borrow(), vec![(EnvToken(5), ExtRefIndex(9), 2)]);
    assert_eq!(ctx.events().named("dispatch").count(), 1);
}

#[test]
fn builtins_call_extref_callbacks() {
    let mut ctx = ctx();
    let calls = recording_dispatcher(&mut ctx);
    let arr = ctx.parse_json("[10, 20, 30]").unwrap();
    let cb = ctx.new_extref(ExtRefIndex(2), ExtRefTag::Function, EnvToken(0));
    let mapped = ctx.invoke("map", arr, &[cb]).unwrap();
    assert_eq!(ctx.to_json(mapped).unwrap(), "[2,2,2]");
    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn missing_dispatcher_is_an_exception() {
    let mut ctx = ctx();
    assert!(!ctx.has_callback_dispatcher());
    let f = ctx.new_extref(ExtRefIndex(0), ExtRefTag::Function, EnvToken(0));
    let err = ctx.call_func(f, &[]).unwrap_err();
    assert!(err.is_exception());
    assert!(ctx.has_exception());
}

#[test]
fn dispatcher_failure_becomes_a_pending_error() {
    let mut ctx = ctx();
    ctx.set_callback_dispatcher(|_ctx, _env, _index, _this, _args| {
        Err(BridgeError::exception("static trap"))
    });
    let f = ctx.new_extref(ExtRefIndex(1), ExtRefTag::Function, EnvToken(0));
    let err = ctx.call_func(f, &[]).unwrap_err();
    assert_eq!(err.message(), "static trap");
    let thrown = ctx.take_exception().expect("pending exception");
    assert_eq!(ctx.to_display_string(thrown).unwrap(), "Error: static trap");
}

#[test]
fn replacing_the_dispatcher_is_logged() {
    let mut ctx = ctx();
    recording_dispatcher(&mut ctx);
    recording_dispatcher(&mut ctx);
    assert_eq!(ctx.events().named("dispatcher_set").count(), 1);
    assert_eq!(ctx.events().named("dispatcher_replaced").count(), 1);
}

// ---------------------------------------------------------------------------
// Jobs and promises
// ---------------------------------------------------------------------------

#[test]
fn jobs_run_one_at_a_time_in_order() {
    let mut ctx = ctx();
    let order: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = order.clone();
    let f = ctx.new_host_function("record", move |ctx, _this, args: &[Value]| {
        let n = ctx.to_number(args[0])?;
        seen.borrow_mut().push(n);
        Ok(ctx.new_undefined())
    });
    for n in [1.0, 2.0] {
        let v = ctx.new_number(n);
        ctx.enqueue_job(f, &[v]).unwrap();
    }
    assert_eq!(ctx.pending_job_count(), 2);
    assert!(ctx.execute_pending_jobs().unwrap());
    assert_eq!(*order.borrow(), vec![1.0]);
    assert!(ctx.execute_pending_jobs().unwrap());
    assert!(!ctx.execute_pending_jobs().unwrap());
    assert_eq!(*order.borrow(), vec![1.0, 2.0]);
}

#[test]
fn promise_reactions_run_as_jobs() {
    let mut ctx = ctx();
    let promise_ctor = ctx.get_global("Promise").unwrap();
    let five = ctx.new_number(5.0);
    let p = ctx.invoke("resolve", promise_ctor, &[five]).unwrap();
    let double = ctx.new_host_function("double", |ctx, _this, args| {
        let n = ctx.to_number(args[0])?;
        Ok(ctx.new_number(n * 2.0))
    });
    let derived = ctx.invoke("then", p, &[double]).unwrap();
    let derived = ctx.hold(derived).unwrap();
    assert_eq!(ctx.promise_state(derived).unwrap(), PromiseStatus::Pending);

    while ctx.execute_pending_jobs().unwrap() {}
    match ctx.promise_state(derived).unwrap() {
        PromiseStatus::Fulfilled(v) => assert_eq!(ctx.to_number(v).unwrap(), 10.0),
        other => panic!("expected fulfilled promise, got {other:?}"),
    }
    ctx.release(derived);
}

#[test]
fn throwing_reaction_rejects_the_derived_promise() {
    let mut ctx = ctx();
    let promise_ctor = ctx.get_global("Promise").unwrap();
    let one = ctx.new_number(1.0);
    let p = ctx.invoke("resolve", promise_ctor, &[one]).unwrap();
    let boom = ctx.new_host_function("boom", |ctx, _this, _args| {
        Err(ctx.throw_error(ErrorClass::TypeError, "nope"))
    });
    let derived = ctx.invoke("then", p, &[boom]).unwrap();
    while ctx.execute_pending_jobs().unwrap() {}
    match ctx.promise_state(derived).unwrap() {
        PromiseStatus::Rejected(reason) => {
            assert_eq!(ctx.to_display_string(reason).unwrap(), "TypeError: nope");
        }
        other => panic!("expected rejected promise, got {other:?}"),
    }
    assert!(!ctx.has_exception());
}

#[test]
fn jobs_cannot_run_jobs() {
    let mut ctx = ctx();
    let nested = ctx.new_host_function("nested", |ctx, _this, _args| {
        let err = ctx.execute_pending_jobs().unwrap_err();
        assert!(err.is_exception());
        Ok(ctx.new_undefined())
    });
    ctx.enqueue_job(nested, &[]).unwrap();
    assert!(ctx.execute_pending_jobs().unwrap());
    assert_eq!(ctx.events().named("execute_pending_jobs_reentrant").count(), 1);
}
