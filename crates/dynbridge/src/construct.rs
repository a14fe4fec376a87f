//! Value constructors.
//!
//! Constructors that cannot fail return a [`Value`] directly.  The rest
//! return `Err` where the embedding ABI returns its null sentinel.

use crate::builtins::ErrorClass;
use crate::context::Context;
use crate::error::{BridgeError, TYPE_ERROR_CODE};
use crate::extref::{EnvToken, ExtRefIndex, ExtRefPayload, ExtRefTag};
use crate::object_model::{HeapObject, MAX_ARRAY_LENGTH, ObjectKind, PropertyKey};
use crate::value::{JsValue, Value};

const COMPONENT: &str = "context";

impl Context {
    pub fn new_undefined(&self) -> Value {
        self.undefined
    }

    pub fn new_null(&self) -> Value {
        self.null
    }

    pub fn new_boolean(&mut self, b: bool) -> Value {
        self.wrap(JsValue::Bool(b))
    }

    pub fn new_number(&mut self, n: f64) -> Value {
        self.wrap(JsValue::Number(n))
    }

    /// Copies `s`.
    pub fn new_string(&mut self, s: &str) -> Value {
        self.wrap(JsValue::Str(s.to_string()))
    }

    /// Copies the first `len` bytes of `bytes`, which must be UTF-8.
    pub fn new_string_with_length(&mut self, bytes: &[u8], len: usize) -> Result<Value, BridgeError> {
        let Some(prefix) = bytes.get(..len) else {
            return Err(BridgeError::type_error(format!(
                "string length {len} exceeds buffer of {} bytes",
                bytes.len()
            )));
        };
        let text = std::str::from_utf8(prefix)
            .map_err(|err| BridgeError::exception(format!("invalid UTF-8 in string: {err}")))?;
        Ok(self.new_string(text))
    }

    pub fn new_symbol(&mut self, description: Option<&str>) -> Value {
        let id = self.heap.alloc_symbol(description.map(str::to_string));
        self.wrap(JsValue::Symbol(id))
    }

    pub fn new_bigint(&mut self, n: i64) -> Value {
        self.wrap(JsValue::BigInt(n))
    }

    /// Empty plain object inheriting from `Object.prototype`.
    pub fn new_object(&mut self) -> Value {
        let h = self.heap.alloc_ordinary(Some(self.realm.object_prototype));
        self.wrap(JsValue::Object(h))
    }

    pub fn new_array(&mut self) -> Value {
        let array = self.alloc_array(Vec::new());
        self.wrap(array)
    }

    /// Array of `len` undefined elements.
    pub fn new_array_with_length(&mut self, len: u32) -> Result<Value, BridgeError> {
        if len > MAX_ARRAY_LENGTH {
            return Err(self.throw_error(
                ErrorClass::RangeError,
                format!("array length {len} exceeds max {MAX_ARRAY_LENGTH}"),
            ));
        }
        let array = self.alloc_array(vec![JsValue::Undefined; len as usize]);
        Ok(self.wrap(array))
    }

    /// Plain object whose prototype is `proto` (an object or `null`).
    pub fn new_object_with_proto(&mut self, proto: Value) -> Result<Value, BridgeError> {
        let proto = match self.value(proto)? {
            JsValue::Object(h) => Some(h),
            JsValue::Null => None,
            other => {
                return Err(BridgeError::type_error(format!(
                    "prototype must be an object or null, got {}",
                    self.kind_of(&other)
                )));
            }
        };
        let h = self.heap.alloc_ordinary(proto);
        Ok(self.wrap(JsValue::Object(h)))
    }

    /// Makes `ctor` findable by [`Context::new_object_with_class`].  A second
    /// registration under the same name replaces the first.
    pub fn register_class(&mut self, name: &str, ctor: Value) -> Result<(), BridgeError> {
        let js = self.value(ctor)?;
        let h = match js.as_object() {
            Some(h) if matches!(self.heap.get(h)?.kind, ObjectKind::Function(_)) => h,
            _ => {
                self.events.fail(COMPONENT, "register_class", TYPE_ERROR_CODE);
                return Err(BridgeError::type_error(format!(
                    "class '{name}' needs a function constructor, got {}",
                    self.kind_of(&js)
                )));
            }
        };
        let event = if self.classes.insert(name.to_string(), h).is_some() {
            "class_replaced"
        } else {
            "class_registered"
        };
        self.events.pass(COMPONENT, event);
        Ok(())
    }

    /// `new <name>(...args)`.
    ///
    /// Registered classes are searched first, then constructors on the
    /// global object.  An unknown name is a `TypeError`; a throwing
    /// constructor is an `Exception`.
    pub fn new_object_with_class(&mut self, name: &str, args: &[Value]) -> Result<Value, BridgeError> {
        let ctor = match self.classes.get(name) {
            Some(h) => JsValue::Object(*h),
            None => {
                let global = self.heap.get(self.realm.global)?;
                match global.own_property(&PropertyKey::from(name)).and_then(|d| d.value().cloned()) {
                    Some(v @ JsValue::Object(_)) if self.is_callable_js(&v) => v,
                    _ => {
                        return Err(BridgeError::type_error(format!("no class named '{name}'")));
                    }
                }
            }
        };
        let args = self.values(args)?;
        let created = self.construct_value(&ctor, &args)?;
        Ok(self.wrap(created))
    }

    /// Boxes an external reference table slot.  `env` is passed back to the
    /// static heap on lookups and never interpreted here.
    pub fn new_extref(&mut self, index: ExtRefIndex, tag: ExtRefTag, env: EnvToken) -> Value {
        let proto = match tag {
            ExtRefTag::Function => self.realm.function_prototype,
            _ => self.realm.object_prototype,
        };
        let carrier = HeapObject::new(Some(proto), ObjectKind::ExtRef(ExtRefPayload { tag, index, env }))
            .with_class(self.extref_class);
        let h = self.heap.alloc(carrier);
        self.wrap(JsValue::Object(h))
    }
}
