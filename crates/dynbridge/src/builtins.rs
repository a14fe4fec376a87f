//! Intrinsic objects of the dynamic engine and the global object.
//!
//! Only the slice of the standard library embedders lean on through the
//! bridge is provided: `Object`, `Array`, the error constructors, `Map`,
//! `Promise`, `String`, `Number`, `Symbol` and `BigInt`.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::BridgeError;
use crate::object_model::{
    FunctionKind, HeapObject, MAX_ARRAY_LENGTH, NativeFn, ObjectError, ObjectHandle, ObjectHeap,
    ObjectKind, PromiseState, PropertyDescriptor, PropertyKey, PropertyLookup,
};
use crate::value::{JsValue, number_to_string};

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 4] = [
        Self::Error,
        Self::TypeError,
        Self::RangeError,
        Self::SyntaxError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::SyntaxError => "SyntaxError",
        }
    }
}

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

/// Handles of the intrinsics.  All of them are permanent collection roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    pub global: ObjectHandle,
    pub object_prototype: ObjectHandle,
    pub function_prototype: ObjectHandle,
    pub array_prototype: ObjectHandle,
    pub error_prototypes: [ObjectHandle; 4],
    pub map_prototype: ObjectHandle,
    pub promise_prototype: ObjectHandle,
    pub string_prototype: ObjectHandle,
    pub number_prototype: ObjectHandle,
    pub symbol_prototype: ObjectHandle,
    pub bigint_prototype: ObjectHandle,
}

impl Realm {
    pub fn error_prototype(&self, class: ErrorClass) -> ObjectHandle {
        self.error_prototypes[class as usize]
    }

    pub fn roots(&self) -> Vec<ObjectHandle> {
        let mut roots = vec![
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.map_prototype,
            self.promise_prototype,
            self.string_prototype,
            self.number_prototype,
            self.symbol_prototype,
            self.bigint_prototype,
        ];
        roots.extend(self.error_prototypes);
        roots
    }
}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

struct Builder<'a> {
    heap: &'a mut ObjectHeap,
    function_prototype: ObjectHandle,
}

impl Builder<'_> {
    fn function(&mut self, name: &'static str, call: NativeFn, construct: Option<NativeFn>) -> ObjectHandle {
        let mut obj = HeapObject::new(
            Some(self.function_prototype),
            ObjectKind::Function(FunctionKind::Native {
                name,
                call,
                construct,
            }),
        );
        obj.properties.insert(
            "name".into(),
            PropertyDescriptor::Data {
                value: JsValue::Str(name.to_string()),
                writable: false,
                enumerable: false,
                configurable: true,
            },
        );
        self.heap.alloc(obj)
    }

    fn method(&mut self, target: ObjectHandle, name: &'static str, call: NativeFn) -> Result<(), ObjectError> {
        let f = self.function(name, call, None);
        self.heap.put_hidden(target, name, JsValue::Object(f))
    }

    fn getter(&mut self, target: ObjectHandle, name: &'static str, call: NativeFn) -> Result<(), ObjectError> {
        let f = self.function(name, call, None);
        self.heap.get_mut(target)?.properties.insert(
            name.into(),
            PropertyDescriptor::Accessor {
                get: Some(f),
                set: None,
                enumerable: false,
                configurable: true,
            },
        );
        Ok(())
    }

    /// Constructor wired to `prototype` both ways, published on `global`.
    fn class(
        &mut self,
        global: ObjectHandle,
        name: &'static str,
        call: NativeFn,
        construct: Option<NativeFn>,
        prototype: ObjectHandle,
    ) -> Result<ObjectHandle, ObjectError> {
        let ctor = self.function(name, call, construct);
        self.heap.get_mut(ctor)?.properties.insert(
            "prototype".into(),
            PropertyDescriptor::Data {
                value: JsValue::Object(prototype),
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
        self.heap.put_hidden(prototype, "constructor", JsValue::Object(ctor))?;
        self.heap.put_hidden(global, name, JsValue::Object(ctor))?;
        Ok(ctor)
    }
}

/// Builds the intrinsics and the global object in `heap`.
pub fn install(heap: &mut ObjectHeap) -> Result<Realm, ObjectError> {
    let object_prototype = heap.alloc_ordinary(None);
    let function_prototype = heap.alloc_ordinary(Some(object_prototype));
    let global = heap.alloc_ordinary(Some(object_prototype));
    let array_prototype = heap.alloc_ordinary(Some(object_prototype));
    let map_prototype = heap.alloc_ordinary(Some(object_prototype));
    let promise_prototype = heap.alloc_ordinary(Some(object_prototype));
    let string_prototype = heap.alloc_ordinary(Some(object_prototype));
    let number_prototype = heap.alloc_ordinary(Some(object_prototype));
    let symbol_prototype = heap.alloc_ordinary(Some(object_prototype));
    let bigint_prototype = heap.alloc_ordinary(Some(object_prototype));

    let base_error = heap.alloc_ordinary(Some(object_prototype));
    let error_prototypes = [
        base_error,
        heap.alloc_ordinary(Some(base_error)),
        heap.alloc_ordinary(Some(base_error)),
        heap.alloc_ordinary(Some(base_error)),
    ];
    for class in ErrorClass::ALL {
        let proto = error_prototypes[class as usize];
        heap.put_hidden(proto, "name", JsValue::Str(class.name().to_string()))?;
        heap.put_hidden(proto, "message", JsValue::Str(String::new()))?;
    }

    let mut b = Builder {
        heap,
        function_prototype,
    };

    b.heap.put_hidden(global, "globalThis", JsValue::Object(global))?;

    // Object
    let object_ctor = b.class(global, "Object", object_call, Some(object_construct), object_prototype)?;
    b.method(object_ctor, "keys", object_keys)?;
    b.method(object_ctor, "getPrototypeOf", object_get_prototype_of)?;
    b.method(object_prototype, "toString", object_to_string)?;
    b.method(object_prototype, "hasOwnProperty", object_has_own_property)?;

    // Array
    let array_ctor = b.class(global, "Array", array_call, Some(array_construct), array_prototype)?;
    b.method(array_ctor, "isArray", array_is_array)?;
    b.method(array_prototype, "push", array_push)?;
    b.method(array_prototype, "pop", array_pop)?;
    b.method(array_prototype, "join", array_join)?;
    b.method(array_prototype, "indexOf", array_index_of)?;
    b.method(array_prototype, "forEach", array_for_each)?;
    b.method(array_prototype, "map", array_map)?;
    b.method(array_prototype, "toString", array_to_string)?;

    // Errors
    let error_ctors: [(NativeFn, NativeFn); 4] = [
        (error_call, error_construct),
        (type_error_call, type_error_construct),
        (range_error_call, range_error_construct),
        (syntax_error_call, syntax_error_construct),
    ];
    for (class, (call, construct)) in ErrorClass::ALL.into_iter().zip(error_ctors) {
        b.class(global, class.name(), call, Some(construct), error_prototypes[class as usize])?;
    }
    b.method(base_error, "toString", error_to_string)?;

    // Map
    b.class(global, "Map", map_call, Some(map_construct), map_prototype)?;
    b.method(map_prototype, "set", map_set)?;
    b.method(map_prototype, "get", map_get)?;
    b.method(map_prototype, "has", map_has)?;
    b.method(map_prototype, "delete", map_delete)?;
    b.method(map_prototype, "clear", map_clear)?;
    b.method(map_prototype, "forEach", map_for_each)?;
    b.getter(map_prototype, "size", map_size)?;

    // Promise
    let promise_ctor = b.class(global, "Promise", promise_call, Some(promise_construct), promise_prototype)?;
    b.method(promise_ctor, "resolve", promise_resolve)?;
    b.method(promise_ctor, "reject", promise_reject)?;
    b.method(promise_prototype, "then", promise_then)?;
    b.method(promise_prototype, "catch", promise_catch)?;

    // String
    b.class(global, "String", string_call, None, string_prototype)?;
    b.method(string_prototype, "toUpperCase", string_to_upper_case)?;
    b.method(string_prototype, "toLowerCase", string_to_lower_case)?;
    b.method(string_prototype, "indexOf", string_index_of)?;
    b.method(string_prototype, "slice", string_slice)?;
    b.method(string_prototype, "concat", string_concat)?;
    b.method(string_prototype, "toString", string_to_string)?;

    // Number, Symbol, BigInt
    b.class(global, "Number", number_call, None, number_prototype)?;
    b.method(number_prototype, "toString", number_to_string_method)?;
    b.class(global, "Symbol", symbol_call, None, symbol_prototype)?;
    b.method(symbol_prototype, "toString", symbol_to_string)?;
    b.class(global, "BigInt", bigint_call, None, bigint_prototype)?;
    b.method(bigint_prototype, "toString", bigint_to_string)?;

    Ok(Realm {
        global,
        object_prototype,
        function_prototype,
        array_prototype,
        error_prototypes,
        map_prototype,
        promise_prototype,
        string_prototype,
        number_prototype,
        symbol_prototype,
        bigint_prototype,
    })
}

/// `"Name: message"` for an error object, read without running any code.
pub(crate) fn error_summary(ctx: &Context, error: ObjectHandle) -> Option<String> {
    let read = |key: &str| match ctx.heap.lookup(error, &PropertyKey::from(key)).ok()? {
        PropertyLookup::Data(JsValue::Str(s)) => Some(s),
        _ => None,
    };
    let name = read("name").unwrap_or_else(|| "Error".to_string());
    let message = read("message").unwrap_or_default();
    Some(if message.is_empty() {
        name
    } else {
        format!("{name}: {message}")
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or(JsValue::Undefined)
}

fn type_error<T>(ctx: &mut Context, message: impl AsRef<str>) -> Result<T, BridgeError> {
    Err(ctx.throw_error(ErrorClass::TypeError, message))
}

fn this_object(ctx: &mut Context, this: &JsValue, method: &str) -> Result<ObjectHandle, BridgeError> {
    match this.as_object() {
        Some(h) => Ok(h),
        None => type_error(ctx, format!("{method} called on non-object")),
    }
}

fn this_array(ctx: &mut Context, this: &JsValue, method: &str) -> Result<ObjectHandle, BridgeError> {
    let h = this_object(ctx, this, method)?;
    if ctx.heap.get(h)?.is_array() {
        Ok(h)
    } else {
        type_error(ctx, format!("Array.prototype.{method} called on non-array"))
    }
}

fn elements_mut(ctx: &mut Context, h: ObjectHandle) -> Result<&mut Vec<JsValue>, BridgeError> {
    match &mut ctx.heap.get_mut(h)?.kind {
        ObjectKind::Array(elements) => Ok(elements),
        _ => Err(BridgeError::type_error(format!("{h} is not an array"))),
    }
}

fn array_len(ctx: &Context, h: ObjectHandle) -> Result<usize, BridgeError> {
    match &ctx.heap.get(h)?.kind {
        ObjectKind::Array(elements) => Ok(elements.len()),
        _ => Ok(0),
    }
}

fn array_element(ctx: &Context, h: ObjectHandle, index: usize) -> Result<JsValue, BridgeError> {
    match &ctx.heap.get(h)?.kind {
        ObjectKind::Array(elements) => Ok(elements.get(index).cloned().unwrap_or(JsValue::Undefined)),
        _ => Ok(JsValue::Undefined),
    }
}

fn require_callable(ctx: &mut Context, f: &JsValue, what: &str) -> Result<(), BridgeError> {
    if ctx.is_callable_js(f) {
        Ok(())
    } else {
        type_error(ctx, format!("{what} is not a function"))
    }
}

/// Prototype a constructor's fresh `this` was created with.
fn prototype_of_this(ctx: &Context, this: &JsValue, fallback: ObjectHandle) -> ObjectHandle {
    this.as_object()
        .and_then(|h| ctx.heap.get(h).ok())
        .and_then(|o| o.prototype)
        .unwrap_or(fallback)
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

fn object_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    match arg(args, 0) {
        v @ JsValue::Object(_) => Ok(v),
        _ => Ok(JsValue::Object(ctx.heap.alloc_ordinary(Some(ctx.realm.object_prototype)))),
    }
}

fn object_construct(_ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    match arg(args, 0) {
        v @ JsValue::Object(_) => Ok(v),
        _ => Ok(this.clone()),
    }
}

fn object_keys(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let Some(h) = arg(args, 0).as_object() else {
        return type_error(ctx, "Object.keys called on non-object");
    };
    let keys = ctx.heap.get(h)?.enumerable_keys();
    Ok(ctx.alloc_array(keys.into_iter().map(JsValue::Str).collect()))
}

fn object_get_prototype_of(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return type_error(ctx, "cannot convert undefined or null to object");
    }
    Ok(ctx
        .prototype_for(&target)?
        .map_or(JsValue::Null, JsValue::Object))
}

fn object_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let tag = match this {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        JsValue::Bool(_) => "Boolean",
        JsValue::Number(_) => "Number",
        JsValue::Str(_) => "String",
        JsValue::Symbol(_) => "Symbol",
        JsValue::BigInt(_) => "BigInt",
        JsValue::Object(h) => match ctx.heap.get(*h)?.kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Ordinary | ObjectKind::ExtRef(_) => "Object",
        },
    };
    Ok(JsValue::Str(format!("[object {tag}]")))
}

fn object_has_own_property(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let key = ctx.property_key(&arg(args, 0))?;
    let found = match this {
        JsValue::Object(h) => ctx.heap.get(*h)?.has_own_property(&key),
        JsValue::Str(s) => match &key {
            PropertyKey::String(k) if k == "length" => true,
            _ => key
                .array_index()
                .is_some_and(|i| (i as usize) < s.encode_utf16().count()),
        },
        _ => false,
    };
    Ok(JsValue::Bool(found))
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

fn array_from_args(ctx: &mut Context, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    if let [JsValue::Number(n)] = args {
        if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(MAX_ARRAY_LENGTH) {
            return Err(ctx.throw_error(ErrorClass::RangeError, format!("invalid array length {}", number_to_string(*n))));
        }
        return Ok(ctx.alloc_array(vec![JsValue::Undefined; *n as usize]));
    }
    Ok(ctx.alloc_array(args.to_vec()))
}

fn array_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    array_from_args(ctx, args)
}

fn array_construct(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let proto = prototype_of_this(ctx, this, ctx.realm.array_prototype);
    let array = array_from_args(ctx, args)?;
    if let Some(h) = array.as_object() {
        ctx.heap.get_mut(h)?.prototype = Some(proto);
    }
    Ok(array)
}

fn array_is_array(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let is_array = match arg(args, 0) {
        JsValue::Object(h) => ctx.heap.get(h)?.is_array(),
        _ => false,
    };
    Ok(JsValue::Bool(is_array))
}

fn array_push(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "push")?;
    let elements = elements_mut(ctx, h)?;
    if elements.len() + args.len() > MAX_ARRAY_LENGTH as usize {
        let requested = (elements.len() + args.len()) as u64;
        return Err(ctx.throw_object_error(ObjectError::ArrayLengthTooLarge {
            requested,
            max: MAX_ARRAY_LENGTH,
        }));
    }
    elements.extend(args.iter().cloned());
    Ok(JsValue::Number(elements.len() as f64))
}

fn array_pop(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "pop")?;
    Ok(elements_mut(ctx, h)?.pop().unwrap_or(JsValue::Undefined))
}

fn array_join(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "join")?;
    let separator = match arg(args, 0) {
        JsValue::Undefined => ",".to_string(),
        other => ctx.js_to_string(&other)?,
    };
    // Cyclic arrays render their repeated occurrence as empty.
    if ctx.joining.contains(&h) {
        return Ok(JsValue::Str(String::new()));
    }
    ctx.joining.push(h);
    let joined = join_elements(ctx, h, &separator);
    ctx.joining.retain(|j| *j != h);
    joined.map(JsValue::Str)
}

fn join_elements(ctx: &mut Context, h: ObjectHandle, separator: &str) -> Result<String, BridgeError> {
    let mut out = String::new();
    for index in 0..array_len(ctx, h)? {
        if index > 0 {
            out.push_str(separator);
        }
        let element = array_element(ctx, h, index)?;
        if !element.is_nullish() {
            out.push_str(&ctx.js_to_string(&element)?);
        }
    }
    Ok(out)
}

fn array_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    array_join(ctx, this, &[])
}

fn array_index_of(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "indexOf")?;
    let needle = arg(args, 0);
    let position = match &ctx.heap.get(h)?.kind {
        // Strict equality: NaN is never found.
        ObjectKind::Array(elements) => elements.iter().position(|e| *e == needle),
        _ => None,
    };
    Ok(JsValue::Number(position.map_or(-1.0, |p| p as f64)))
}

fn array_for_each(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "forEach")?;
    let callback = arg(args, 0);
    require_callable(ctx, &callback, "forEach callback")?;
    let mut index = 0;
    while index < array_len(ctx, h)? {
        let element = array_element(ctx, h, index)?;
        ctx.call_value(&callback, &JsValue::Undefined, &[element, JsValue::Number(index as f64), this.clone()])?;
        index += 1;
    }
    Ok(JsValue::Undefined)
}

fn array_map(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_array(ctx, this, "map")?;
    let callback = arg(args, 0);
    require_callable(ctx, &callback, "map callback")?;
    let len = array_len(ctx, h)?;
    let out = ctx.alloc_array(vec![JsValue::Undefined; len]);
    ctx.with_roots([out.clone()], |ctx| -> Result<JsValue, BridgeError> {
        for index in 0..len {
            let element = array_element(ctx, h, index)?;
            let mapped = ctx.call_value(
                &callback,
                &JsValue::Undefined,
                &[element, JsValue::Number(index as f64), this.clone()],
            )?;
            if let Some(target) = out.as_object()
                && let Some(slot) = elements_mut(ctx, target)?.get_mut(index)
            {
                *slot = mapped;
            }
        }
        Ok(out.clone())
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

fn make_error(ctx: &mut Context, class: ErrorClass, proto: Option<ObjectHandle>, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let proto = proto.unwrap_or_else(|| ctx.realm.error_prototype(class));
    let mut error = HeapObject::new(Some(proto), ObjectKind::Error);
    match arg(args, 0) {
        JsValue::Undefined => {}
        message => {
            let text = ctx.js_to_string(&message)?;
            error
                .properties
                .insert("message".into(), PropertyDescriptor::hidden(JsValue::Str(text)));
        }
    }
    Ok(JsValue::Object(ctx.heap.alloc(error)))
}

macro_rules! error_constructor {
    ($call:ident, $construct:ident, $class:expr) => {
        fn $call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
            make_error(ctx, $class, None, args)
        }

        fn $construct(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
            let proto = prototype_of_this(ctx, this, ctx.realm.error_prototype($class));
            make_error(ctx, $class, Some(proto), args)
        }
    };
}

error_constructor!(error_call, error_construct, ErrorClass::Error);
error_constructor!(type_error_call, type_error_construct, ErrorClass::TypeError);
error_constructor!(range_error_call, range_error_construct, ErrorClass::RangeError);
error_constructor!(syntax_error_call, syntax_error_construct, ErrorClass::SyntaxError);

fn error_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let h = this_object(ctx, this, "Error.prototype.toString")?;
    let name = match ctx.get_js(this, &PropertyKey::from("name"))? {
        JsValue::Undefined => "Error".to_string(),
        other => ctx.js_to_string(&other)?,
    };
    let message = match ctx.get_js(&JsValue::Object(h), &PropertyKey::from("message"))? {
        JsValue::Undefined => String::new(),
        other => ctx.js_to_string(&other)?,
    };
    Ok(JsValue::Str(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{name}: {message}"),
    }))
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

fn map_entries<'a>(ctx: &'a mut Context, this: &JsValue, method: &str) -> Result<&'a mut Vec<(JsValue, JsValue)>, BridgeError> {
    let h = this_object(ctx, this, method)?;
    if !matches!(ctx.heap.get(h)?.kind, ObjectKind::Map(_)) {
        return type_error(ctx, format!("Map.prototype.{method} called on incompatible receiver"));
    }
    match &mut ctx.heap.get_mut(h)?.kind {
        ObjectKind::Map(entries) => Ok(entries),
        _ => Err(BridgeError::type_error("not a Map")),
    }
}

/// `-0` keys are stored as `+0`.
fn normalize_key(key: JsValue) -> JsValue {
    match key {
        JsValue::Number(n) if n == 0.0 => JsValue::Number(0.0),
        other => other,
    }
}

fn map_call(ctx: &mut Context, _this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    type_error(ctx, "Constructor Map requires 'new'")
}

fn map_construct(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let proto = prototype_of_this(ctx, this, ctx.realm.map_prototype);
    let mut entries: Vec<(JsValue, JsValue)> = Vec::new();
    match arg(args, 0) {
        JsValue::Undefined | JsValue::Null => {}
        JsValue::Object(h) if ctx.heap.get(h)?.is_array() => {
            for index in 0..array_len(ctx, h)? {
                let pair = array_element(ctx, h, index)?;
                let (key, value) = match pair.as_object() {
                    Some(p) if ctx.heap.get(p)?.is_array() => (array_element(ctx, p, 0)?, array_element(ctx, p, 1)?),
                    _ => return type_error(ctx, "iterator value is not an entry object"),
                };
                let key = normalize_key(key);
                match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
        }
        _ => return type_error(ctx, "Map constructor expects an array of entries"),
    }
    Ok(JsValue::Object(ctx.heap.alloc(HeapObject::new(Some(proto), ObjectKind::Map(entries)))))
}

fn map_set(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let key = normalize_key(arg(args, 0));
    let value = arg(args, 1);
    let entries = map_entries(ctx, this, "set")?;
    match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
    Ok(this.clone())
}

fn map_get(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let key = arg(args, 0);
    let entries = map_entries(ctx, this, "get")?;
    Ok(entries
        .iter()
        .find(|(k, _)| k.same_value_zero(&key))
        .map_or(JsValue::Undefined, |(_, v)| v.clone()))
}

fn map_has(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let key = arg(args, 0);
    let entries = map_entries(ctx, this, "has")?;
    Ok(JsValue::Bool(entries.iter().any(|(k, _)| k.same_value_zero(&key))))
}

fn map_delete(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let key = arg(args, 0);
    let entries = map_entries(ctx, this, "delete")?;
    let before = entries.len();
    entries.retain(|(k, _)| !k.same_value_zero(&key));
    Ok(JsValue::Bool(entries.len() != before))
}

fn map_clear(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    map_entries(ctx, this, "clear")?.clear();
    Ok(JsValue::Undefined)
}

fn map_size(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    Ok(JsValue::Number(map_entries(ctx, this, "size")?.len() as f64))
}

fn map_for_each(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let callback = arg(args, 0);
    map_entries(ctx, this, "forEach")?;
    require_callable(ctx, &callback, "forEach callback")?;
    let mut index = 0;
    loop {
        let Some((key, value)) = map_entries(ctx, this, "forEach")?.get(index).cloned() else {
            break;
        };
        ctx.call_value(&callback, &JsValue::Undefined, &[value, key, this.clone()])?;
        index += 1;
    }
    Ok(JsValue::Undefined)
}

// ---------------------------------------------------------------------------
// Promise
// ---------------------------------------------------------------------------

fn this_promise(ctx: &mut Context, this: &JsValue, method: &str) -> Result<ObjectHandle, BridgeError> {
    let h = this_object(ctx, this, method)?;
    if matches!(ctx.heap.get(h)?.kind, ObjectKind::Promise(_)) {
        Ok(h)
    } else {
        type_error(ctx, format!("Promise.prototype.{method} called on non-promise"))
    }
}

fn promise_call(ctx: &mut Context, _this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    type_error(ctx, "Constructor Promise requires 'new'")
}

fn promise_construct(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let executor = arg(args, 0);
    require_callable(ctx, &executor, "Promise resolver")?;
    let proto = prototype_of_this(ctx, this, ctx.realm.promise_prototype);
    let promise = ctx.alloc_promise(proto);
    let promise_value = JsValue::Object(promise);
    ctx.with_roots([promise_value.clone()], |ctx| -> Result<JsValue, BridgeError> {
        let resolve = ctx.alloc_resolver(promise, false);
        let reject = ctx.alloc_resolver(promise, true);
        if let Err(err) = ctx.call_value(&executor, &JsValue::Undefined, &[resolve, reject]) {
            let reason = ctx.exception_value(&err);
            ctx.reject_promise(promise, reason)?;
        }
        Ok(promise_value.clone())
    })
}

fn promise_resolve(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let value = arg(args, 0);
    if let Some(h) = value.as_object()
        && matches!(ctx.heap.get(h)?.kind, ObjectKind::Promise(_))
    {
        return Ok(value);
    }
    let promise = ctx.alloc_promise(ctx.realm.promise_prototype);
    ctx.with_roots([JsValue::Object(promise)], |ctx| ctx.resolve_promise(promise, value))?;
    Ok(JsValue::Object(promise))
}

fn promise_reject(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let promise = ctx.alloc_promise(ctx.realm.promise_prototype);
    if let ObjectKind::Promise(state) = &mut ctx.heap.get_mut(promise)?.kind {
        *state = PromiseState::Rejected(arg(args, 0));
    }
    Ok(JsValue::Object(promise))
}

fn promise_then(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let promise = this_promise(ctx, this, "then")?;
    let derived = ctx.alloc_promise(ctx.realm.promise_prototype);
    ctx.with_roots([JsValue::Object(derived)], |ctx| {
        ctx.perform_then(promise, arg(args, 0), arg(args, 1), Some(derived))
    })?;
    Ok(JsValue::Object(derived))
}

fn promise_catch(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    promise_then(ctx, this, &[JsValue::Undefined, arg(args, 0)])
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

fn this_string(ctx: &mut Context, this: &JsValue, method: &str) -> Result<String, BridgeError> {
    match this {
        JsValue::Str(s) => Ok(s.clone()),
        _ => type_error(ctx, format!("String.prototype.{method} requires a string receiver")),
    }
}

/// Relative index clamped into `0..=len`, as `slice` reads its arguments.
fn relative_index(ctx: &mut Context, value: &JsValue, len: usize, default: usize) -> Result<usize, BridgeError> {
    if matches!(value, JsValue::Undefined) {
        return Ok(default);
    }
    let n = ctx.js_to_number(value)?;
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let len_f = len as f64;
    let resolved = if n < 0.0 { (len_f + n).max(0.0) } else { n.min(len_f) };
    Ok(resolved as usize)
}

fn string_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let text = match args.first() {
        None => String::new(),
        Some(JsValue::Symbol(id)) => format!("Symbol({})", ctx.heap.symbol_description(*id).unwrap_or("")),
        Some(other) => ctx.js_to_string(other)?,
    };
    Ok(JsValue::Str(text))
}

fn string_to_upper_case(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    Ok(JsValue::Str(this_string(ctx, this, "toUpperCase")?.to_uppercase()))
}

fn string_to_lower_case(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    Ok(JsValue::Str(this_string(ctx, this, "toLowerCase")?.to_lowercase()))
}

fn string_index_of(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let haystack: Vec<u16> = this_string(ctx, this, "indexOf")?.encode_utf16().collect();
    let needle: Vec<u16> = ctx.js_to_string(&arg(args, 0))?.encode_utf16().collect();
    let start = relative_index(ctx, &arg(args, 1), haystack.len(), 0)?;
    if needle.is_empty() {
        return Ok(JsValue::Number(start as f64));
    }
    let found = (start..haystack.len())
        .find(|&i| haystack[i..].starts_with(&needle))
        .map_or(-1.0, |i| i as f64);
    Ok(JsValue::Number(found))
}

fn string_slice(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let units: Vec<u16> = this_string(ctx, this, "slice")?.encode_utf16().collect();
    let start = relative_index(ctx, &arg(args, 0), units.len(), 0)?;
    let end = relative_index(ctx, &arg(args, 1), units.len(), units.len())?;
    let slice = if start < end { &units[start..end] } else { &[][..] };
    Ok(JsValue::Str(String::from_utf16_lossy(slice)))
}

fn string_concat(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let mut out = this_string(ctx, this, "concat")?;
    for value in args {
        out.push_str(&ctx.js_to_string(value)?);
    }
    Ok(JsValue::Str(out))
}

fn string_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    this_string(ctx, this, "toString").map(JsValue::Str)
}

// ---------------------------------------------------------------------------
// Number, Symbol, BigInt
// ---------------------------------------------------------------------------

fn number_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    match args.first() {
        None => Ok(JsValue::Number(0.0)),
        Some(v) => ctx.js_to_number(v).map(JsValue::Number),
    }
}

fn number_to_string_method(ctx: &mut Context, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let JsValue::Number(n) = this else {
        return type_error(ctx, "Number.prototype.toString requires a number receiver");
    };
    let radix = match arg(args, 0) {
        JsValue::Undefined => 10,
        other => {
            let r = ctx.js_to_number(&other)?;
            if !(2.0..=36.0).contains(&r) || r.fract() != 0.0 {
                return Err(ctx.throw_error(ErrorClass::RangeError, "toString() radix must be between 2 and 36"));
            }
            r as u32
        }
    };
    Ok(JsValue::Str(if radix == 10 {
        number_to_string(*n)
    } else {
        to_radix_string(*n, radix)
    }))
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let digit = |d: u32| char::from_digit(d, radix).unwrap_or('0');
    let negative = n < 0.0;
    let magnitude = n.abs();
    let mut int_part = magnitude.trunc();
    let mut frac_part = magnitude - int_part;

    let mut int_digits = Vec::new();
    let base = f64::from(radix);
    loop {
        int_digits.push(digit((int_part % base) as u32));
        int_part = (int_part / base).trunc();
        if int_part < 1.0 {
            break;
        }
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(int_digits.iter().rev());
    if frac_part > 0.0 {
        out.push('.');
        for _ in 0..52 {
            frac_part *= base;
            let d = frac_part.trunc();
            out.push(digit(d as u32));
            frac_part -= d;
            if frac_part == 0.0 {
                break;
            }
        }
    }
    out
}

fn symbol_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let description = match arg(args, 0) {
        JsValue::Undefined => None,
        other => Some(ctx.js_to_string(&other)?),
    };
    Ok(JsValue::Symbol(ctx.heap.alloc_symbol(description)))
}

fn symbol_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    let JsValue::Symbol(id) = this else {
        return type_error(ctx, "Symbol.prototype.toString requires a symbol receiver");
    };
    let description = ctx.heap.symbol_description(*id).unwrap_or("");
    Ok(JsValue::Str(format!("Symbol({description})")))
}

fn bigint_call(ctx: &mut Context, _this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
    match arg(args, 0) {
        JsValue::BigInt(n) => Ok(JsValue::BigInt(n)),
        JsValue::Bool(b) => Ok(JsValue::BigInt(i64::from(b))),
        JsValue::Number(n) => {
            if n.fract() != 0.0 || !n.is_finite() || n.abs() >= 9.223_372_036_854_776e18 {
                return Err(ctx.throw_error(
                    ErrorClass::RangeError,
                    format!("{} cannot be converted to a BigInt", number_to_string(n)),
                ));
            }
            Ok(JsValue::BigInt(n as i64))
        }
        JsValue::Str(s) => {
            let trimmed = s.trim();
            let parsed = if trimmed.is_empty() { Some(0) } else { trimmed.parse::<i64>().ok() };
            match parsed {
                Some(n) => Ok(JsValue::BigInt(n)),
                None => Err(ctx.throw_error(ErrorClass::SyntaxError, format!("cannot convert {s} to a BigInt"))),
            }
        }
        other => {
            let kind = ctx.kind_of(&other);
            type_error(ctx, format!("cannot convert {kind} to a BigInt"))
        }
    }
}

fn bigint_to_string(ctx: &mut Context, this: &JsValue, _args: &[JsValue]) -> Result<JsValue, BridgeError> {
    match this {
        JsValue::BigInt(n) => Ok(JsValue::Str(n.to_string())),
        _ => type_error(ctx, "BigInt.prototype.toString requires a bigint receiver"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm() -> (ObjectHeap, Realm) {
        let mut heap = ObjectHeap::new(64);
        let realm = install(&mut heap).unwrap();
        (heap, realm)
    }

    #[test]
    fn global_exposes_constructors() {
        let (heap, realm) = realm();
        for name in ["Object", "Array", "Error", "TypeError", "Map", "Promise", "String", "Number", "Symbol", "BigInt"] {
            assert!(
                matches!(heap.lookup(realm.global, &PropertyKey::from(name)).unwrap(), PropertyLookup::Data(JsValue::Object(_))),
                "{name} missing"
            );
        }
        assert_eq!(
            heap.lookup(realm.global, &PropertyKey::from("globalThis")).unwrap(),
            PropertyLookup::Data(JsValue::Object(realm.global))
        );
    }

    #[test]
    fn error_prototypes_chain_to_base() {
        let (heap, realm) = realm();
        let range = realm.error_prototype(ErrorClass::RangeError);
        assert!(heap.chain_contains(range, realm.error_prototype(ErrorClass::Error)).unwrap());
        assert_eq!(
            heap.lookup(range, &PropertyKey::from("name")).unwrap(),
            PropertyLookup::Data(JsValue::Str("RangeError".into()))
        );
    }

    #[test]
    fn builtin_methods_are_hidden() {
        let (heap, realm) = realm();
        assert!(heap.get(realm.array_prototype).unwrap().enumerable_keys().is_empty());
        assert!(heap.get(realm.global).unwrap().enumerable_keys().is_empty());
    }

    #[test]
    fn map_size_is_an_accessor() {
        let (heap, realm) = realm();
        assert!(matches!(
            heap.lookup(realm.map_prototype, &PropertyKey::from("size")).unwrap(),
            PropertyLookup::Accessor { get: Some(_), set: None }
        ));
    }

    #[test]
    fn roots_cover_every_intrinsic() {
        let (_, realm) = realm();
        let roots = realm.roots();
        assert_eq!(roots.len(), 14);
        assert!(roots.contains(&realm.error_prototype(ErrorClass::SyntaxError)));
    }

    #[test]
    fn radix_rendering() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
        assert_eq!(to_radix_string(0.0, 36), "0");
    }
}
