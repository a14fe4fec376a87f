//! Type predicates, `typeof`, and the strict `to_*` extractions.
//!
//! Predicates are total: a stale handle answers `false` (and `typeof`
//! answers [`DynKind::Unknown`]).  Extractions never coerce implicitly
//! across kinds; asking a string for a number is a `TypeError`.

use std::fmt;
use std::ops::Deref;

use crate::builtins::ErrorClass;
use crate::context::Context;
use crate::error::BridgeError;
use crate::extref::{ExtRefIndex, ExtRefPayload, ExtRefTag, StaticRef};
use crate::object_model::{ObjectKind, PropertyKey};
use crate::value::{DynKind, JsValue, Value, number_to_string};

/// A string handed out by [`Context::to_cstring`].
///
/// Must be returned through [`Context::free_cstring`]; strings still
/// outstanding when the context is destroyed are reported as leaks.
#[derive(Debug, PartialEq, Eq)]
pub struct BridgeString(String);

impl BridgeString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for BridgeString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BridgeString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BridgeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Context {
    // -- classification -------------------------------------------------------

    pub(crate) fn kind_of(&self, value: &JsValue) -> DynKind {
        match value {
            JsValue::Undefined => DynKind::Undefined,
            JsValue::Null => DynKind::Null,
            JsValue::Bool(_) => DynKind::Boolean,
            JsValue::Number(_) => DynKind::Number,
            JsValue::Str(_) => DynKind::String,
            JsValue::Symbol(_) => DynKind::Symbol,
            JsValue::BigInt(_) => DynKind::BigInt,
            JsValue::Object(h) => match self.heap.get(*h) {
                Ok(obj) => match &obj.kind {
                    ObjectKind::ExtRef(payload) if obj.class == self.extref_class => payload.tag.kind(),
                    ObjectKind::Function(_) => DynKind::Function,
                    _ => DynKind::Object,
                },
                Err(_) => DynKind::Unknown,
            },
        }
    }

    /// `typeof`: one of the fourteen kinds.
    pub fn type_of(&self, value: Value) -> DynKind {
        self.peek(value).map_or(DynKind::Unknown, |v| self.kind_of(v))
    }

    /// The string JS `typeof` yields.  Extref functions are `"function"`,
    /// every other extref is `"object"`.
    pub fn typeof_name(&self, value: Value) -> &'static str {
        self.type_of(value).js_type_name()
    }

    /// Shallow kind match.  Stale handles are never type-equal to anything.
    pub fn type_eq(&self, lhs: Value, rhs: Value) -> bool {
        let (l, r) = (self.type_of(lhs), self.type_of(rhs));
        l != DynKind::Unknown && l == r
    }

    fn peek_is(&self, value: Value, pred: impl FnOnce(&JsValue) -> bool) -> bool {
        self.peek(value).is_some_and(pred)
    }

    pub fn is_undefined(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Undefined))
    }

    pub fn is_null(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Null))
    }

    pub fn is_bool(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Bool(_)))
    }

    pub fn is_number(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Number(_)))
    }

    pub fn is_string(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Str(_)))
    }

    pub fn is_symbol(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Symbol(_)))
    }

    pub fn is_bigint(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::BigInt(_)))
    }

    /// True for every heap object, external reference carriers and
    /// functions included.
    pub fn is_object(&self, value: Value) -> bool {
        self.peek_is(value, |v| matches!(v, JsValue::Object(h) if self.heap.contains(*h)))
    }

    pub fn is_array(&self, value: Value) -> bool {
        self.peek_is(value, |v| {
            v.as_object()
                .and_then(|h| self.heap.get(h).ok())
                .is_some_and(|obj| obj.is_array())
        })
    }

    /// Callable: engine functions and ExtRefFunc values.
    pub fn is_function(&self, value: Value) -> bool {
        self.peek_is(value, |v| self.is_callable_js(v))
    }

    pub fn is_extref(&self, value: Value) -> bool {
        self.type_of(value).is_extref()
    }

    pub fn is_falsy(&self, value: Value) -> bool {
        self.peek_is(value, |v| !v.is_truthy())
    }

    // -- extraction -----------------------------------------------------------

    pub fn to_number(&self, value: Value) -> Result<f64, BridgeError> {
        match self.value(value)? {
            JsValue::Number(n) => Ok(n),
            other => Err(BridgeError::type_error(format!(
                "to_number: expected a number, got {}",
                self.kind_of(&other)
            ))),
        }
    }

    pub fn to_bool(&self, value: Value) -> Result<bool, BridgeError> {
        match self.value(value)? {
            JsValue::Bool(b) => Ok(b),
            other => Err(BridgeError::type_error(format!(
                "to_bool: expected a boolean, got {}",
                self.kind_of(&other)
            ))),
        }
    }

    /// Engine string conversion of any value.  Symbols and objects whose
    /// `toString` throws fail with an `Exception`.
    pub fn to_cstring(&mut self, value: Value) -> Result<BridgeString, BridgeError> {
        let v = self.value(value)?;
        let text = self.js_to_string(&v)?;
        self.cstrings_outstanding += 1;
        Ok(BridgeString(text))
    }

    pub fn free_cstring(&mut self, s: BridgeString) {
        drop(s);
        self.cstrings_outstanding = self.cstrings_outstanding.saturating_sub(1);
    }

    /// Tag and table index of an external reference.
    pub fn to_extref(&self, value: Value) -> Result<(ExtRefTag, ExtRefIndex), BridgeError> {
        let v = self.value(value)?;
        match self.extref_payload(&v) {
            Some(payload) => Ok((payload.tag, payload.index)),
            None => Err(BridgeError::type_error(format!(
                "to_extref: {} is not an external reference",
                self.kind_of(&v)
            ))),
        }
    }

    /// Text shown for a value by the compiler's `toString`.
    ///
    /// Extref arrays join the static strings they hold with `,`; other
    /// extrefs render as fixed placeholders.
    pub fn to_display_string(&mut self, value: Value) -> Result<String, BridgeError> {
        let v = self.value(value)?;
        let Some(payload) = self.extref_payload(&v) else {
            return self.js_to_string(&v);
        };
        match payload.tag {
            ExtRefTag::Function => Ok("[wasm Function]".to_string()),
            ExtRefTag::Object | ExtRefTag::Interface => Ok("[object Object]".to_string()),
            ExtRefTag::Array => self.static_array_string(payload),
        }
    }

    fn static_array_string(&self, payload: ExtRefPayload) -> Result<String, BridgeError> {
        let Some(heap) = self.static_heap.as_deref() else {
            return Err(BridgeError::type_error("extref array needs a static heap to render"));
        };
        let array = heap
            .table_element(payload.env, payload.index)
            .ok_or_else(|| BridgeError::exception(format!("{} does not resolve", payload.index)))?;
        let elements = heap
            .array_elements(array)
            .ok_or_else(|| BridgeError::type_error(format!("{array} is not a static array")))?;
        let parts = elements
            .into_iter()
            .map(|element| match element {
                None => Ok(String::new()),
                Some(r) => heap.string_contents(r).ok_or_else(|| non_string_element(r)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(","))
    }

    // -- engine conversions ---------------------------------------------------

    /// `ToString`.
    pub(crate) fn js_to_string(&mut self, value: &JsValue) -> Result<String, BridgeError> {
        match value {
            JsValue::Undefined => Ok("undefined".to_string()),
            JsValue::Null => Ok("null".to_string()),
            JsValue::Bool(b) => Ok(b.to_string()),
            JsValue::Number(n) => Ok(number_to_string(*n)),
            JsValue::Str(s) => Ok(s.clone()),
            JsValue::BigInt(n) => Ok(n.to_string()),
            JsValue::Symbol(_) => Err(self.throw_error(
                ErrorClass::TypeError,
                "cannot convert a Symbol value to a string",
            )),
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, ["toString", "valueOf"])?;
                self.js_to_string(&primitive)
            }
        }
    }

    /// `ToNumber`.
    pub(crate) fn js_to_number(&mut self, value: &JsValue) -> Result<f64, BridgeError> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Bool(b) => Ok(f64::from(u8::from(*b))),
            JsValue::Number(n) => Ok(*n),
            JsValue::Str(s) => Ok(string_to_number(s)),
            JsValue::BigInt(_) | JsValue::Symbol(_) => {
                let kind = self.kind_of(value);
                Err(self.throw_error(
                    ErrorClass::TypeError,
                    format!("cannot convert a {kind} value to a number"),
                ))
            }
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, ["valueOf", "toString"])?;
                self.js_to_number(&primitive)
            }
        }
    }

    /// `OrdinaryToPrimitive`: tries the two methods in order.
    fn to_primitive(&mut self, value: &JsValue, order: [&str; 2]) -> Result<JsValue, BridgeError> {
        for name in order {
            let method = self.get_js(value, &PropertyKey::from(name))?;
            if !self.is_callable_js(&method) {
                continue;
            }
            let result = self.call_value(&method, value, &[])?;
            if result.as_object().is_none() {
                return Ok(result);
            }
        }
        Err(self.throw_error(
            ErrorClass::TypeError,
            "cannot convert object to primitive value",
        ))
    }
}

fn non_string_element(r: StaticRef) -> BridgeError {
    BridgeError::exception(format!("array join for non-string element {r} is not supported"))
}

/// `StringToNumber`: decimal, `0x`/`0o`/`0b` integers and `Infinity`;
/// whitespace is trimmed and the empty string is zero.
fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    let radix = match t.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix).map_or(f64::NAN, |n| n as f64);
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf"/"nan" spellings JS does not.
    if t.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extref::EnvToken;
    use crate::static_heap::StructHeap;
    use std::rc::Rc;

    fn ctx() -> Context {
        Context::init().unwrap()
    }

    #[test]
    fn typeof_covers_primitive_kinds() {
        let mut ctx = ctx();
        let cases = [
            (ctx.new_undefined(), DynKind::Undefined),
            (ctx.new_null(), DynKind::Null),
            (ctx.new_boolean(true), DynKind::Boolean),
            (ctx.new_number(1.5), DynKind::Number),
            (ctx.new_string("s"), DynKind::String),
            (ctx.new_object(), DynKind::Object),
            (ctx.new_array(), DynKind::Object),
        ];
        for (value, kind) in cases {
            assert_eq!(ctx.type_of(value), kind);
        }
        let object_ctor = ctx.get_global("Object").unwrap();
        assert_eq!(ctx.type_of(object_ctor), DynKind::Function);
        assert_eq!(ctx.typeof_name(object_ctor), "function");
    }

    #[test]
    fn undefined_and_null_are_never_type_equal() {
        let mut ctx = ctx();
        let u = ctx.new_undefined();
        let n = ctx.new_null();
        let e = ctx.new_extref(ExtRefIndex(0), ExtRefTag::Object, EnvToken::default());
        assert!(!ctx.type_eq(u, n));
        assert!(!ctx.type_eq(u, e));
        assert!(!ctx.type_eq(n, e));
        assert!(ctx.type_eq(u, u));
        let a = ctx.new_number(1.0);
        let b = ctx.new_number(2.0);
        assert!(ctx.type_eq(a, b));
    }

    #[test]
    fn extref_kinds_and_typeof_names() {
        let mut ctx = ctx();
        let env = EnvToken(3);
        let f = ctx.new_extref(ExtRefIndex(1), ExtRefTag::Function, env);
        let i = ctx.new_extref(ExtRefIndex(2), ExtRefTag::Interface, env);
        let a = ctx.new_extref(ExtRefIndex(3), ExtRefTag::Array, env);
        assert_eq!(ctx.type_of(f), DynKind::ExtRefFunc);
        assert_eq!(ctx.type_of(i), DynKind::ExtRefInterface);
        assert_eq!(ctx.typeof_name(f), "function");
        assert_eq!(ctx.typeof_name(a), "object");
        assert!(ctx.is_extref(a));
        assert!(ctx.is_object(a));
        assert!(ctx.is_function(f));
        assert!(!ctx.is_function(i));
        assert_eq!(ctx.to_extref(i).unwrap(), (ExtRefTag::Interface, ExtRefIndex(2)));
        let plain = ctx.new_object();
        assert!(ctx.to_extref(plain).unwrap_err().is_type_error());
    }

    #[test]
    fn strict_extraction() {
        let mut ctx = ctx();
        let n = ctx.new_number(3.5);
        assert!(ctx.is_number(n));
        assert_eq!(ctx.to_number(n).unwrap(), 3.5);
        assert!(ctx.to_bool(n).unwrap_err().is_type_error());
        let s = ctx.new_string("3.5");
        assert!(ctx.to_number(s).unwrap_err().is_type_error());
        let obj = ctx.new_object();
        assert!(ctx.to_number(obj).unwrap_err().is_type_error());
        let t = ctx.new_boolean(true);
        assert!(ctx.to_bool(t).unwrap());
    }

    #[test]
    fn numbers_round_trip_bit_exact() {
        let mut ctx = ctx();
        for n in [0.0, -0.0, f64::MIN_POSITIVE, 1e308, -7.25, f64::INFINITY] {
            let v = ctx.new_number(n);
            assert_eq!(ctx.to_number(v).unwrap().to_bits(), n.to_bits());
        }
        let nan = ctx.new_number(f64::NAN);
        assert!(ctx.to_number(nan).unwrap().is_nan());
    }

    #[test]
    fn falsy_values() {
        let mut ctx = ctx();
        let falsy = [
            ctx.new_undefined(),
            ctx.new_null(),
            ctx.new_boolean(false),
            ctx.new_number(0.0),
            ctx.new_number(f64::NAN),
            ctx.new_string(""),
        ];
        for v in falsy {
            assert!(ctx.is_falsy(v));
        }
        let obj = ctx.new_object();
        let s = ctx.new_string("0");
        assert!(!ctx.is_falsy(obj));
        assert!(!ctx.is_falsy(s));
    }

    #[test]
    fn stale_handles_answer_false() {
        let mut ctx = ctx();
        let n = ctx.new_number(1.0);
        ctx.collect();
        assert!(!ctx.is_number(n));
        assert!(!ctx.is_falsy(n));
        assert_eq!(ctx.type_of(n), DynKind::Unknown);
        assert!(!ctx.type_eq(n, n));
        assert!(ctx.to_number(n).unwrap_err().is_exception());
    }

    #[test]
    fn cstrings_are_counted() {
        let mut ctx = ctx();
        let v = ctx.new_string("héllo");
        let s = ctx.to_cstring(v).unwrap();
        assert_eq!(s.as_str(), "héllo");
        assert_eq!(ctx.cstrings_outstanding, 1);
        ctx.free_cstring(s);
        assert_eq!(ctx.cstrings_outstanding, 0);

        let n = ctx.new_number(1e21);
        let s = ctx.to_cstring(n).unwrap();
        assert_eq!(&*s, "1e+21");
        ctx.free_cstring(s);
    }

    #[test]
    fn to_cstring_of_symbol_throws() {
        let mut ctx = ctx();
        let symbol_fn = ctx.get_global("Symbol").unwrap();
        let desc = ctx.new_string("tag");
        let sym = ctx.call_func(symbol_fn, &[desc]).unwrap();
        assert!(ctx.is_symbol(sym));
        assert!(ctx.to_cstring(sym).unwrap_err().is_exception());
        assert!(ctx.has_exception());
    }

    #[test]
    fn objects_stringify_through_to_string() {
        let mut ctx = ctx();
        let arr = ctx.parse_json("[1, \"a\", null, true]").unwrap();
        assert_eq!(ctx.to_display_string(arr).unwrap(), "1,a,,true");
        let obj = ctx.new_object();
        assert_eq!(ctx.to_display_string(obj).unwrap(), "[object Object]");
    }

    #[test]
    fn display_string_of_extrefs() {
        let mut ctx = ctx();
        let heap = Rc::new(StructHeap::new());
        let a = heap.alloc_string("a");
        let b = heap.alloc_string("b");
        let arr = heap.alloc_array(vec![Some(a), None, Some(b)]);
        let idx = heap.insert_table(arr);
        let nested = heap.alloc_array(vec![Some(arr)]);
        let nested_idx = heap.insert_table(nested);
        ctx.set_static_heap(heap);

        let env = EnvToken::default();
        let f = ctx.new_extref(ExtRefIndex(0), ExtRefTag::Function, env);
        let o = ctx.new_extref(ExtRefIndex(0), ExtRefTag::Object, env);
        let arr_v = ctx.new_extref(idx, ExtRefTag::Array, env);
        let nested_v = ctx.new_extref(nested_idx, ExtRefTag::Array, env);
        assert_eq!(ctx.to_display_string(f).unwrap(), "[wasm Function]");
        assert_eq!(ctx.to_display_string(o).unwrap(), "[object Object]");
        assert_eq!(ctx.to_display_string(arr_v).unwrap(), "a,,b");
        assert!(ctx.to_display_string(nested_v).unwrap_err().is_exception());
    }

    #[test]
    fn string_to_number_follows_js() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }
}
