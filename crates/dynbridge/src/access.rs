//! Property, element and prototype access.

use crate::builtins::ErrorClass;
use crate::context::Context;
use crate::error::BridgeError;
use crate::extref::{ExtRefPayload, unwrap_interface};
use crate::object_model::{ObjectHandle, ObjectKind, PropertyDescriptor, PropertyKey, PropertyLookup};
use crate::value::{JsValue, Value};

impl Context {
    // -- engine-internal ------------------------------------------------------

    /// `ToPropertyKey` for keys coming from engine values.
    pub(crate) fn property_key(&mut self, key: &JsValue) -> Result<PropertyKey, BridgeError> {
        match key {
            JsValue::Symbol(id) => Ok(PropertyKey::Symbol(*id)),
            JsValue::Str(s) => Ok(PropertyKey::String(s.clone())),
            other => self.js_to_string(other).map(PropertyKey::String),
        }
    }

    /// Object whose properties a primitive receiver sees.
    pub(crate) fn prototype_for(&self, value: &JsValue) -> Result<Option<ObjectHandle>, BridgeError> {
        Ok(match value {
            JsValue::Object(h) => self.heap.get_prototype_of(*h)?,
            JsValue::Str(_) => Some(self.realm.string_prototype),
            JsValue::Number(_) => Some(self.realm.number_prototype),
            JsValue::Symbol(_) => Some(self.realm.symbol_prototype),
            JsValue::BigInt(_) => Some(self.realm.bigint_prototype),
            JsValue::Bool(_) => Some(self.realm.object_prototype),
            JsValue::Undefined | JsValue::Null => None,
        })
    }

    /// `receiver[key]`, running getters.  Reading from `undefined` or
    /// `null` throws.
    pub(crate) fn get_js(&mut self, receiver: &JsValue, key: &PropertyKey) -> Result<JsValue, BridgeError> {
        let holder = match receiver {
            JsValue::Object(h) => *h,
            JsValue::Undefined | JsValue::Null => {
                let kind = self.kind_of(receiver);
                return Err(self.throw_error(
                    ErrorClass::TypeError,
                    format!("cannot read property '{key}' of {kind}"),
                ));
            }
            JsValue::Str(s) => {
                if let Some(found) = string_own_property(s, key) {
                    return Ok(found);
                }
                self.realm.string_prototype
            }
            other => match self.prototype_for(other)? {
                Some(p) => p,
                None => return Ok(JsValue::Undefined),
            },
        };
        match self.heap.lookup(holder, key) {
            Ok(PropertyLookup::Data(v)) => Ok(v),
            Ok(PropertyLookup::Accessor { get: Some(g), .. }) => {
                self.call_value(&JsValue::Object(g), receiver, &[])
            }
            Ok(PropertyLookup::Accessor { get: None, .. } | PropertyLookup::Missing) => Ok(JsValue::Undefined),
            Err(err) => Err(self.throw_object_error(err)),
        }
    }

    /// `target[key] = value`, running setters.  Refused writes throw.
    pub(crate) fn set_js(&mut self, target: ObjectHandle, key: PropertyKey, value: JsValue) -> Result<(), BridgeError> {
        match self.heap.lookup(target, &key) {
            Ok(PropertyLookup::Accessor { set: Some(s), .. }) => {
                self.call_value(&JsValue::Object(s), &JsValue::Object(target), &[value])?;
                return Ok(());
            }
            Ok(PropertyLookup::Accessor { set: None, .. }) => {
                return Err(self.throw_error(
                    ErrorClass::TypeError,
                    format!("cannot set property '{key}' which has only a getter"),
                ));
            }
            Ok(_) => {}
            Err(err) => return Err(self.throw_object_error(err)),
        }
        match self.heap.put(target, key.clone(), value) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.throw_error(
                ErrorClass::TypeError,
                format!("cannot assign to read only property '{key}'"),
            )),
            Err(err) => Err(self.throw_object_error(err)),
        }
    }

    pub(crate) fn alloc_array(&mut self, elements: Vec<JsValue>) -> JsValue {
        let array = crate::object_model::HeapObject::new(Some(self.realm.array_prototype), ObjectKind::Array(elements));
        JsValue::Object(self.heap.alloc(array))
    }

    fn data_property(&mut self, desc: ObjectHandle, name: &str) -> Result<JsValue, BridgeError> {
        self.get_js(&JsValue::Object(desc), &PropertyKey::from(name))
    }

    /// Reads a descriptor-shaped object (`value`, `writable`, `enumerable`,
    /// `configurable`, `get`, `set`).  Omitted flags default to `false`.
    fn to_property_descriptor(&mut self, desc: Value) -> Result<PropertyDescriptor, BridgeError> {
        let Some(h) = self.value(desc)?.as_object() else {
            return Err(BridgeError::type_error("property descriptor must be an object"));
        };
        let has = |ctx: &Context, name: &str| ctx.heap.has_property(h, &PropertyKey::from(name));
        let flag = |ctx: &mut Context, name: &str| -> Result<bool, BridgeError> {
            Ok(ctx.data_property(h, name)?.is_truthy())
        };
        let enumerable = flag(self, "enumerable")?;
        let configurable = flag(self, "configurable")?;
        let is_accessor = has(self, "get")? || has(self, "set")?;
        if !is_accessor {
            return Ok(PropertyDescriptor::Data {
                value: self.data_property(h, "value")?,
                writable: flag(self, "writable")?,
                enumerable,
                configurable,
            });
        }
        if has(self, "value")? || has(self, "writable")? {
            return Err(BridgeError::type_error(
                "property descriptor cannot be both an accessor and a data descriptor",
            ));
        }
        let mut accessor = |name: &str| -> Result<Option<ObjectHandle>, BridgeError> {
            match self.data_property(h, name)? {
                JsValue::Undefined => Ok(None),
                f if self.is_callable_js(&f) => Ok(f.as_object()),
                _ => Err(BridgeError::type_error(format!("accessor '{name}' must be a function"))),
            }
        };
        let get = accessor("get")?;
        let set = accessor("set")?;
        Ok(PropertyDescriptor::Accessor {
            get,
            set,
            enumerable,
            configurable,
        })
    }

    fn require_object(&self, value: Value, op: &str) -> Result<ObjectHandle, BridgeError> {
        match self.value(value)? {
            JsValue::Object(h) => Ok(h),
            other => Err(BridgeError::type_error(format!(
                "{op}: expected an object, got {}",
                self.kind_of(&other)
            ))),
        }
    }

    // -- properties -----------------------------------------------------------

    pub fn set_property(&mut self, obj: Value, prop: &str, value: Value) -> Result<(), BridgeError> {
        let target = self.require_object(obj, "set_property")?;
        let value = self.value(value)?;
        self.set_js(target, PropertyKey::from(prop), value)
    }

    /// Defines `prop` from a descriptor-shaped object.  A definition the
    /// object refuses (non-configurable conflict, non-extensible object)
    /// throws.
    pub fn define_property(&mut self, obj: Value, prop: &str, desc: Value) -> Result<(), BridgeError> {
        let target = self.require_object(obj, "define_property")?;
        let desc = self.to_property_descriptor(desc)?;
        match self.heap.define_property(target, PropertyKey::from(prop), desc) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.throw_error(
                ErrorClass::TypeError,
                format!("cannot redefine property: {prop}"),
            )),
            Err(err) => Err(self.throw_object_error(err)),
        }
    }

    /// Reads `prop` through the prototype chain; missing properties read as
    /// `undefined`.  Primitive receivers see their wrapper prototype.
    pub fn get_property(&mut self, obj: Value, prop: &str) -> Result<Value, BridgeError> {
        let receiver = self.value(obj)?;
        if receiver.is_nullish() {
            return Err(BridgeError::type_error(format!(
                "get_property: cannot read '{prop}' of {}",
                self.kind_of(&receiver)
            )));
        }
        let v = self.get_js(&receiver, &PropertyKey::from(prop))?;
        Ok(self.wrap(v))
    }

    pub fn has_property(&mut self, obj: Value, prop: &str) -> Result<bool, BridgeError> {
        let target = self.require_object(obj, "has_property")?;
        self.heap
            .has_property(target, &PropertyKey::from(prop))
            .map_err(|err| self.throw_object_error(err))
    }

    /// `false` when the property is non-configurable.
    pub fn delete_property(&mut self, obj: Value, prop: &str) -> Result<bool, BridgeError> {
        let target = self.require_object(obj, "delete_property")?;
        Ok(self.heap.delete_property(target, &PropertyKey::from(prop))?)
    }

    /// Own property value, or `None` if `obj` has no own `prop`.  Accessors
    /// are run.
    pub fn get_own_property(&mut self, obj: Value, prop: &str) -> Result<Option<Value>, BridgeError> {
        let target = self.require_object(obj, "get_own_property")?;
        let found = match self.heap.get_own_property(target, &PropertyKey::from(prop))? {
            None => return Ok(None),
            Some(PropertyDescriptor::Data { value, .. }) => value,
            Some(PropertyDescriptor::Accessor { get: Some(g), .. }) => {
                self.call_value(&JsValue::Object(g), &JsValue::Object(target), &[])?
            }
            Some(PropertyDescriptor::Accessor { get: None, .. }) => JsValue::Undefined,
        };
        Ok(Some(self.wrap(found)))
    }

    // -- elements -------------------------------------------------------------

    /// Element `index` of an array; reading past the end is a `RangeError`
    /// exception.  Other objects are read by index key.
    pub fn get_elem(&mut self, obj: Value, index: u32) -> Result<Value, BridgeError> {
        let target = self.require_object(obj, "get_elem")?;
        let found = match &self.heap.get(target)?.kind {
            ObjectKind::Array(elements) => Some(elements.get(index as usize).cloned()),
            _ => None,
        };
        let v = match found {
            Some(Some(v)) => v,
            Some(None) => {
                return Err(self.throw_error(
                    ErrorClass::RangeError,
                    format!("index {index} out of range"),
                ));
            }
            None => self.get_js(&JsValue::Object(target), &PropertyKey::index(index))?,
        };
        Ok(self.wrap(v))
    }

    /// Writes element `index`, growing arrays as needed.
    pub fn set_elem(&mut self, obj: Value, index: u32, value: Value) -> Result<(), BridgeError> {
        let target = self.require_object(obj, "set_elem")?;
        let value = self.value(value)?;
        self.set_js(target, PropertyKey::index(index), value)
    }

    pub fn has_elem(&mut self, obj: Value, index: u32) -> Result<bool, BridgeError> {
        let target = self.require_object(obj, "has_elem")?;
        self.heap
            .has_property(target, &PropertyKey::index(index))
            .map_err(|err| self.throw_object_error(err))
    }

    /// Array elements are left as holes; the length does not shrink.
    pub fn delete_elem(&mut self, obj: Value, index: u32) -> Result<bool, BridgeError> {
        let target = self.require_object(obj, "delete_elem")?;
        Ok(self.heap.delete_property(target, &PropertyKey::index(index))?)
    }

    /// Appends to an array.
    pub fn add_elem(&mut self, arr: Value, value: Value) -> Result<(), BridgeError> {
        let target = self.require_object(arr, "add_elem")?;
        let value = self.value(value)?;
        let len = self.array_length(arr)?;
        if let Err(err) = self.heap.put(target, PropertyKey::index(len), value) {
            return Err(self.throw_object_error(err));
        }
        Ok(())
    }

    pub fn array_length(&self, arr: Value) -> Result<u32, BridgeError> {
        let target = self.require_object(arr, "array_length")?;
        match &self.heap.get(target)?.kind {
            ObjectKind::Array(elements) => Ok(elements.len() as u32),
            _ => Err(BridgeError::type_error(format!("{arr} is not an array"))),
        }
    }

    // -- globals and prototypes -----------------------------------------------

    /// Property of the global object; `undefined` when absent.
    pub fn get_global(&mut self, name: &str) -> Result<Value, BridgeError> {
        let global = JsValue::Object(self.realm.global);
        let v = self.get_js(&global, &PropertyKey::from(name))?;
        Ok(self.wrap(v))
    }

    pub fn get_prototype(&mut self, obj: Value) -> Result<Value, BridgeError> {
        let target = self.require_object(obj, "get_prototype")?;
        let proto = self.heap.get_prototype_of(target)?;
        Ok(self.wrap(proto.map_or(JsValue::Null, JsValue::Object)))
    }

    /// `proto` must be an object or `null`.  Cycles and changes to a
    /// non-extensible object throw.
    pub fn set_prototype(&mut self, obj: Value, proto: Value) -> Result<(), BridgeError> {
        let target = self.require_object(obj, "set_prototype")?;
        let proto = match self.value(proto)? {
            JsValue::Object(p) => Some(p),
            JsValue::Null => None,
            other => {
                return Err(BridgeError::type_error(format!(
                    "prototype must be an object or null, got {}",
                    self.kind_of(&other)
                )));
            }
        };
        match self.heap.set_prototype_of(target, proto) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.throw_error(
                ErrorClass::TypeError,
                format!("{target} is not extensible"),
            )),
            Err(err) => Err(self.throw_object_error(err)),
        }
    }

    /// `src instanceof target`.
    ///
    /// External references are checked against the static type hierarchy
    /// after unwrapping interfaces; the target must resolve to a struct.
    /// Dynamic targets must be callable and are checked by prototype chain.
    pub fn instanceof(&mut self, src: Value, target: Value) -> Result<bool, BridgeError> {
        let src = self.value(src)?;
        let target = self.value(target)?;
        if let Some(target_ref) = self.extref_payload(&target) {
            let Some(src_ref) = self.extref_payload(&src) else {
                return Ok(false);
            };
            return self.static_instanceof(src_ref, target_ref);
        }
        if !self.is_callable_js(&target) {
            return Err(BridgeError::type_error(format!(
                "instanceof target is a {}, not a constructor",
                self.kind_of(&target)
            )));
        }
        let Some(src) = src.as_object() else {
            return Ok(false);
        };
        let ctor = JsValue::Object(target.as_object().ok_or_else(|| BridgeError::type_error("instanceof target"))?);
        match self.get_js(&ctor, &PropertyKey::from("prototype"))? {
            JsValue::Object(proto) => self
                .heap
                .chain_contains(src, proto)
                .map_err(|err| self.throw_object_error(err)),
            _ => Err(self.throw_error(
                ErrorClass::TypeError,
                "function has non-object prototype in instanceof check",
            )),
        }
    }

    pub(crate) fn extref_payload(&self, value: &JsValue) -> Option<ExtRefPayload> {
        let obj = self.heap.get(value.as_object()?).ok()?;
        match obj.kind {
            ObjectKind::ExtRef(payload) if obj.class == self.extref_class => Some(payload),
            _ => None,
        }
    }

    fn static_instanceof(&mut self, src: ExtRefPayload, target: ExtRefPayload) -> Result<bool, BridgeError> {
        let Some(heap) = self.static_heap.clone() else {
            return Err(BridgeError::type_error("instanceof on external references needs a static heap"));
        };
        let resolve = |payload: ExtRefPayload| {
            heap.table_element(payload.env, payload.index)
                .ok_or_else(|| BridgeError::exception(format!("external reference {} does not resolve", payload.index)))
        };
        let src_obj = unwrap_interface(heap.as_ref(), self.shapes.as_ref(), resolve(src)?);
        let target_obj = unwrap_interface(heap.as_ref(), self.shapes.as_ref(), resolve(target)?);
        if heap.struct_shape(target_obj).is_none() {
            return Err(BridgeError::type_error(format!(
                "instanceof target {target_obj} is not a struct"
            )));
        }
        Ok(heap.is_instance_of(src_obj, target_obj))
    }
}

/// `length` and index properties of a string primitive, in UTF-16 units.
fn string_own_property(s: &str, key: &PropertyKey) -> Option<JsValue> {
    let PropertyKey::String(name) = key else {
        return None;
    };
    if name == "length" {
        return Some(JsValue::Number(s.encode_utf16().count() as f64));
    }
    let index = key.array_index()? as usize;
    let unit = s.encode_utf16().nth(index)?;
    Some(JsValue::Str(String::from_utf16_lossy(&[unit])))
}
