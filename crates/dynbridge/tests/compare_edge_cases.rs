//! Integration edge-case tests for the comparison engine.
//!
//! Covers: operator tokens, routing by kind, the `==`/`!=` complement on
//! every route, native ordering for numbers, strings and bigints, and
//! external-reference identity with and without an attached static heap.

use std::rc::Rc;

use dynbridge::shape::layouts;
use dynbridge::{CmpOperator, CmpRoute, Context, DynKind, EnvToken, ExtRefIndex, ExtRefTag, StructHeap, Value};
use dynbridge::compare::route;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ctx() -> Context {
    Context::init().expect("context")
}

fn sample_values(ctx: &mut Context) -> Vec<Value> {
    let obj = ctx.new_object();
    vec![
        ctx.new_undefined(),
        ctx.new_null(),
        ctx.new_boolean(true),
        ctx.new_number(1.0),
        ctx.new_number(f64::NAN),
        ctx.new_string("1"),
        ctx.new_bigint(1),
        ctx.new_symbol(Some("s")),
        obj,
        ctx.new_extref(ExtRefIndex(0), ExtRefTag::Object, EnvToken(0)),
        ctx.new_extref(ExtRefIndex(1), ExtRefTag::Function, EnvToken(0)),
    ]
}

// ===========================================================================
// Tokens
// ===========================================================================

#[test]
fn tokens_round_trip_and_slot_30_is_reserved() {
    for op in CmpOperator::ALL {
        assert_eq!(CmpOperator::from_token(op.token()), Some(op));
    }
    assert_eq!(CmpOperator::from_token(30), None);
    assert_eq!(CmpOperator::from_token(28), None);
    assert_eq!(CmpOperator::from_token(38), None);

    let mut ctx = ctx();
    let a = ctx.new_number(1.0);
    assert!(ctx.cmp_token(a, a, 30).unwrap_err().is_type_error());
    assert!(ctx.cmp_token(a, a, 34).unwrap());
}

#[test]
fn operator_serde_round_trip() {
    for op in CmpOperator::ALL {
        let json = serde_json::to_string(&op).unwrap();
        let back: CmpOperator = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}

// ===========================================================================
// Routing
// ===========================================================================

#[test]
fn routing_table() {
    assert_eq!(route(DynKind::Number, DynKind::Number), CmpRoute::Native);
    assert_eq!(route(DynKind::Undefined, DynKind::Null), CmpRoute::UndefinedSide);
    assert_eq!(route(DynKind::String, DynKind::Undefined), CmpRoute::UndefinedSide);
    assert_eq!(route(DynKind::ExtRefObj, DynKind::ExtRefObj), CmpRoute::ExtRefIdentity);
    assert_eq!(route(DynKind::ExtRefObj, DynKind::ExtRefInterface), CmpRoute::ExtRefIdentity);
    assert_eq!(route(DynKind::Null, DynKind::ExtRefArray), CmpRoute::ExtRefIdentity);
    assert_eq!(route(DynKind::Number, DynKind::String), CmpRoute::KindMismatch);
    assert_eq!(route(DynKind::Object, DynKind::ExtRefObj), CmpRoute::KindMismatch);
}

// ===========================================================================
// Complement invariant
// ===========================================================================

#[test]
fn not_equal_is_always_the_complement_of_equal() {
    let mut ctx = ctx();
    let values = sample_values(&mut ctx);
    for &a in &values {
        for &b in &values {
            let eq = ctx.cmp(a, b, CmpOperator::Eq).unwrap();
            let ne = ctx.cmp(a, b, CmpOperator::Ne).unwrap();
            assert_ne!(eq, ne, "{:?} vs {:?}", ctx.type_of(a), ctx.type_of(b));
            let seq = ctx.cmp(a, b, CmpOperator::StrictEq).unwrap();
            let sne = ctx.cmp(a, b, CmpOperator::StrictNe).unwrap();
            assert_ne!(seq, sne);
            assert_eq!(eq, seq, "loose and strict equality share one algorithm");
        }
    }
}

// Ordering across mismatched kinds has no defined answer; `false` is the
// documented choice for that ambiguity, not derived behaviour.
#[test]
fn mismatched_kinds_are_never_ordered() {
    let mut ctx = ctx();
    let one = ctx.new_number(1.0);
    let text = ctx.new_string("1");
    for op in [CmpOperator::Lt, CmpOperator::Gt, CmpOperator::Le, CmpOperator::Ge, CmpOperator::Eq] {
        assert!(!ctx.cmp(one, text, op).unwrap(), "{op:?}");
    }
    assert!(ctx.cmp(one, text, CmpOperator::Ne).unwrap());
}

#[test]
fn undefined_against_anything_else_is_unequal() {
    let mut ctx = ctx();
    let undefined = ctx.new_undefined();
    let null = ctx.new_null();
    assert!(!ctx.cmp(undefined, null, CmpOperator::Eq).unwrap());
    assert!(ctx.cmp(undefined, null, CmpOperator::Ne).unwrap());
    assert!(ctx.cmp(undefined, undefined, CmpOperator::Eq).unwrap());
    assert!(!ctx.cmp(undefined, undefined, CmpOperator::Lt).unwrap());
}

// ===========================================================================
// Native comparison
// ===========================================================================

#[test]
fn numbers_follow_ieee_ordering() {
    let mut ctx = ctx();
    let nan = ctx.new_number(f64::NAN);
    let zero = ctx.new_number(0.0);
    let neg_zero = ctx.new_number(-0.0);
    let two = ctx.new_number(2.0);
    assert!(!ctx.cmp(nan, nan, CmpOperator::Eq).unwrap());
    assert!(ctx.cmp(nan, nan, CmpOperator::Ne).unwrap());
    assert!(!ctx.cmp(nan, two, CmpOperator::Lt).unwrap());
    assert!(!ctx.cmp(nan, two, CmpOperator::Ge).unwrap());
    assert!(ctx.cmp(zero, neg_zero, CmpOperator::StrictEq).unwrap());
    assert!(ctx.cmp(zero, two, CmpOperator::Lt).unwrap());
    assert!(ctx.cmp(two, two, CmpOperator::Le).unwrap());
    assert!(ctx.cmp(two, zero, CmpOperator::Ge).unwrap());
}

#[test]
fn strings_compare_by_code_units() {
    let mut ctx = ctx();
    let a = ctx.new_string("apple");
    let b = ctx.new_string("banana");
    let a2 = ctx.new_string("apple");
    // U+FF21 sorts after U+1F600's leading surrogate in UTF-16 order.
    let wide = ctx.new_string("\u{ff21}");
    let astral = ctx.new_string("\u{1f600}");
    assert!(ctx.cmp(a, b, CmpOperator::Lt).unwrap());
    assert!(ctx.cmp(a, a2, CmpOperator::Eq).unwrap());
    assert!(ctx.cmp(wide, astral, CmpOperator::Gt).unwrap());
}

#[test]
fn objects_compare_by_identity_only() {
    let mut ctx = ctx();
    let a = ctx.new_object();
    let b = ctx.new_object();
    let a_held = ctx.hold(a).unwrap();
    assert!(ctx.cmp(a, a_held, CmpOperator::Eq).unwrap());
    assert!(!ctx.cmp(a, b, CmpOperator::Eq).unwrap());
    assert!(!ctx.cmp(a, a, CmpOperator::Le).unwrap());
    let big = ctx.new_bigint(10);
    let small = ctx.new_bigint(-3);
    assert!(ctx.cmp(small, big, CmpOperator::Lt).unwrap());
    ctx.release(a_held);
}

// ===========================================================================
// External references
// ===========================================================================

#[test]
fn extrefs_without_a_heap_compare_by_slot() {
    let mut ctx = ctx();
    let a = ctx.new_extref(ExtRefIndex(3), ExtRefTag::Object, EnvToken(1));
    let same_slot = ctx.new_extref(ExtRefIndex(3), ExtRefTag::Interface, EnvToken(1));
    let other_env = ctx.new_extref(ExtRefIndex(3), ExtRefTag::Object, EnvToken(2));
    assert!(ctx.cmp(a, same_slot, CmpOperator::Eq).unwrap());
    assert!(!ctx.cmp(a, other_env, CmpOperator::Eq).unwrap());
    assert!(ctx.cmp(a, same_slot, CmpOperator::Lt).unwrap());
    assert!(ctx.cmp(a, same_slot, CmpOperator::Ge).unwrap());
    assert!(!ctx.cmp(a, other_env, CmpOperator::Le).unwrap());
}

#[test]
fn interface_wrappers_equal_their_target() {
    let mut ctx = ctx();
    let heap = Rc::new(StructHeap::new());
    let point = heap.define_type("Point", Vec::new(), None);
    let infc = heap.define_type("IPoint", layouts::interface().fields, None);
    let target = heap.alloc_struct(point);
    let other = heap.alloc_struct(point);
    let wrapper = heap.alloc_interface(infc, Some(target));
    let t_index = heap.insert_table(target);
    let w_index = heap.insert_table(wrapper);
    let o_index = heap.insert_table(other);
    ctx.set_static_heap(heap.clone());

    let env = EnvToken(0);
    let direct = ctx.new_extref(t_index, ExtRefTag::Object, env);
    let wrapped = ctx.new_extref(w_index, ExtRefTag::Interface, env);
    let unrelated = ctx.new_extref(o_index, ExtRefTag::Object, env);
    let null = ctx.new_null();

    assert!(ctx.cmp(direct, wrapped, CmpOperator::StrictEq).unwrap());
    assert!(!ctx.cmp(direct, wrapped, CmpOperator::StrictNe).unwrap());
    assert!(!ctx.cmp(direct, unrelated, CmpOperator::Eq).unwrap());
    assert!(!ctx.cmp(null, direct, CmpOperator::Eq).unwrap());
    assert!(ctx.cmp(direct, null, CmpOperator::Ne).unwrap());
}

#[test]
fn ordering_operators_on_extrefs_compare_identity() {
    let mut ctx = ctx();
    let heap = Rc::new(StructHeap::new());
    let point = heap.define_type("Point", Vec::new(), None);
    let infc = heap.define_type("IPoint", layouts::interface().fields, None);
    let target = heap.alloc_struct(point);
    let other = heap.alloc_struct(point);
    let wrapper = heap.alloc_interface(infc, Some(target));
    let [t_index, w_index, o_index] = [target, wrapper, other].map(|o| heap.insert_table(o));
    ctx.set_static_heap(heap.clone());

    let env = EnvToken(0);
    let first = ctx.new_extref(t_index, ExtRefTag::Object, env);
    let second = ctx.new_extref(t_index, ExtRefTag::Object, env);
    let wrapped = ctx.new_extref(w_index, ExtRefTag::Interface, env);
    let unrelated = ctx.new_extref(o_index, ExtRefTag::Object, env);
    let null = ctx.new_null();

    for op in [CmpOperator::Lt, CmpOperator::Gt, CmpOperator::Le, CmpOperator::Ge] {
        assert!(ctx.cmp(first, second, op).unwrap(), "{op:?}");
        assert!(ctx.cmp(wrapped, first, op).unwrap(), "{op:?}");
        assert!(!ctx.cmp(first, unrelated, op).unwrap(), "{op:?}");
        assert!(!ctx.cmp(null, first, op).unwrap(), "{op:?}");
    }
}

#[test]
fn stale_operands_are_exceptions() {
    let mut ctx = ctx();
    let a = ctx.new_number(1.0);
    ctx.collect();
    let b = ctx.new_number(1.0);
    assert!(ctx.cmp(a, b, CmpOperator::Eq).unwrap_err().is_exception());
}
