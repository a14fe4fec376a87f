//! Dynamic-heap object model: property descriptors, prototype chains, and
//! the arena the dynamic engine allocates its objects in.
//!
//! Objects live in a slot arena addressed by [`ObjectHandle`].  Freed slots
//! are recycled through a free list; the collector in [`crate::gc`] decides
//! which slots to free.
//!
//! - **Property descriptors**: data vs accessor, configurable/enumerable/writable
//! - **Prototype chains**: walked with a depth limit and cycle detection
//! - **Array exotics**: dense element storage behind index keys and `length`
//! - **Symbol keys**: property keys that are either strings or symbols
//!
//! `BTreeMap`/`BTreeSet` for deterministic ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::BridgeError;
use crate::extref::ExtRefPayload;
use crate::value::{JsValue, Value};

/// Arrays longer than this are refused instead of allocated.
pub const MAX_ARRAY_LENGTH: u32 = 1 << 24;

// ---------------------------------------------------------------------------
// PropertyKey — string or symbol
// ---------------------------------------------------------------------------

/// Unique symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    String(String),
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Canonical array index of a string key (`"0"`, `"17"`, not `"01"`).
    pub fn array_index(&self) -> Option<u32> {
        let Self::String(s) = self else {
            return None;
        };
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>().ok().filter(|n| *n != u32::MAX)
    }

    pub fn index(index: u32) -> Self {
        Self::String(index.to_string())
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Slot index of an object in the [`ObjectHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Engine class an object was created with.  The context reserves one class
/// to mark external-reference carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u32);

pub const ORDINARY_CLASS: ClassId = ClassId(0);

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyDescriptor {
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable data property.
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, configurable, but hidden from enumeration; used for
    /// builtin methods and `message`.
    pub fn hidden(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    fn is_plain_data(&self) -> bool {
        matches!(
            self,
            Self::Data {
                writable: true,
                enumerable: true,
                configurable: true,
                ..
            }
        )
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectError {
    TypeError(String),
    /// Handle does not name a live object.
    ObjectNotFound(ObjectHandle),
    PrototypeCycleDetected,
    PrototypeChainTooDeep { depth: u32, max: u32 },
    ArrayLengthTooLarge { requested: u64, max: u32 },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Self::ObjectNotFound(h) => write!(f, "{h} not found"),
            Self::PrototypeCycleDetected => write!(f, "TypeError: prototype chain cycle detected"),
            Self::PrototypeChainTooDeep { depth, max } => {
                write!(f, "TypeError: prototype chain depth {depth} exceeds max {max}")
            }
            Self::ArrayLengthTooLarge { requested, max } => {
                write!(f, "RangeError: array length {requested} exceeds max {max}")
            }
        }
    }
}

impl std::error::Error for ObjectError {}

// ---------------------------------------------------------------------------
// Function and promise payloads
// ---------------------------------------------------------------------------

/// Builtin implemented in Rust against engine values.
pub type NativeFn = fn(&mut Context, &JsValue, &[JsValue]) -> Result<JsValue, BridgeError>;

/// Embedder-supplied function working on [`Value`] handles.
pub type HostFn = Rc<dyn Fn(&mut Context, Value, &[Value]) -> Result<Value, BridgeError>>;

#[derive(Clone)]
pub enum FunctionKind {
    Native {
        name: &'static str,
        call: NativeFn,
        /// `None` for functions that cannot be used with `new`.
        construct: Option<NativeFn>,
    },
    Host {
        name: String,
        call: HostFn,
    },
    /// The `resolve`/`reject` pair handed to a promise executor.
    PromiseResolver {
        promise: ObjectHandle,
        reject: bool,
    },
}

impl FunctionKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Native { name, .. } => name,
            Self::Host { name, .. } => name,
            Self::PromiseResolver { reject: false, .. } => "resolve",
            Self::PromiseResolver { reject: true, .. } => "reject",
        }
    }
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { name, construct, .. } => f
                .debug_struct("Native")
                .field("name", name)
                .field("constructible", &construct.is_some())
                .finish(),
            Self::Host { name, .. } => f.debug_struct("Host").field("name", name).finish(),
            Self::PromiseResolver { promise, reject } => f
                .debug_struct("PromiseResolver")
                .field("promise", promise)
                .field("reject", reject)
                .finish(),
        }
    }
}

/// Handlers registered by `then` on a pending promise.
#[derive(Debug, Clone, PartialEq)]
pub struct PromiseReaction {
    pub on_fulfilled: JsValue,
    pub on_rejected: JsValue,
    /// Promise settled with the handler's outcome.
    pub derived: Option<ObjectHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending { reactions: Vec<PromiseReaction> },
    Fulfilled(JsValue),
    Rejected(JsValue),
}

impl PromiseState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyMap — own properties in insertion order
// ---------------------------------------------------------------------------

/// Keyed lookup plus the order keys were first added in.  Redefining a
/// key keeps its position; deleting and re-adding moves it to the end.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: BTreeMap<PropertyKey, (u64, PropertyDescriptor)>,
    next_seq: u64,
}

impl PropertyMap {
    pub fn insert(&mut self, key: PropertyKey, desc: PropertyDescriptor) -> Option<PropertyDescriptor> {
        if let Some((_, slot)) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(slot, desc));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, (seq, desc));
        None
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.entries.get(key).map(|(_, desc)| desc)
    }

    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertyDescriptor> {
        self.entries.get_mut(key).map(|(_, desc)| desc)
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.entries.remove(key).map(|(_, desc)| desc)
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &PropertyDescriptor> + '_ {
        self.entries.values().map(|(_, desc)| desc)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<&PropertyKey> {
        let mut keyed: Vec<(u64, &PropertyKey)> = self.entries.iter().map(|(k, (seq, _))| (*seq, k)).collect();
        keyed.sort_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, k)| k).collect()
    }
}

// ---------------------------------------------------------------------------
// HeapObject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<JsValue>),
    Function(FunctionKind),
    Error,
    ExtRef(ExtRefPayload),
    /// Insertion-ordered entries compared with SameValueZero.
    Map(Vec<(JsValue, JsValue)>),
    Promise(PromiseState),
}

#[derive(Debug, Clone)]
pub struct HeapObject {
    pub class: ClassId,
    pub prototype: Option<ObjectHandle>,
    pub extensible: bool,
    pub properties: PropertyMap,
    pub kind: ObjectKind,
}

impl HeapObject {
    pub fn new(prototype: Option<ObjectHandle>, kind: ObjectKind) -> Self {
        Self {
            class: ORDINARY_CLASS,
            prototype,
            extensible: true,
            properties: PropertyMap::default(),
            kind,
        }
    }

    pub fn ordinary(prototype: Option<ObjectHandle>) -> Self {
        Self::new(prototype, ObjectKind::Ordinary)
    }

    pub fn with_class(mut self, class: ClassId) -> Self {
        self.class = class;
        self
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array(_))
    }

    /// Own property descriptor, including synthesized array elements.
    pub fn own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if let ObjectKind::Array(elements) = &self.kind {
            if let Some(index) = key.array_index() {
                return elements
                    .get(index as usize)
                    .map(|v| PropertyDescriptor::data(v.clone()));
            }
            if matches!(key, PropertyKey::String(s) if s == "length") {
                return Some(PropertyDescriptor::Data {
                    value: JsValue::Number(elements.len() as f64),
                    writable: true,
                    enumerable: false,
                    configurable: false,
                });
            }
        }
        self.properties.get(key).cloned()
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.own_property(key).is_some()
    }

    /// Plain assignment to an own data property.  Accessors are left to the
    /// caller; `Ok(false)` means the write was refused.
    pub fn put_own(&mut self, key: PropertyKey, value: JsValue) -> Result<bool, ObjectError> {
        if let ObjectKind::Array(elements) = &mut self.kind {
            if let Some(index) = key.array_index() {
                set_element(elements, index, value)?;
                return Ok(true);
            }
            if matches!(&key, PropertyKey::String(s) if s == "length") {
                set_array_length(elements, &value)?;
                return Ok(true);
            }
        }
        match self.properties.get_mut(&key) {
            Some(PropertyDescriptor::Data {
                value: slot,
                writable: true,
                ..
            }) => {
                *slot = value;
                Ok(true)
            }
            Some(_) => Ok(false),
            None if self.extensible => {
                self.properties.insert(key, PropertyDescriptor::data(value));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Define or update a property.  `Ok(false)` when the definition
    /// conflicts with a non-configurable property or the object is sealed.
    pub fn define_own_property(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        if let ObjectKind::Array(elements) = &mut self.kind {
            if let Some(index) = key.array_index() {
                // Elements are always plain data slots.
                let PropertyDescriptor::Data { value, .. } = &desc else {
                    return Ok(false);
                };
                if !desc.is_plain_data() {
                    return Ok(false);
                }
                set_element(elements, index, value.clone())?;
                return Ok(true);
            }
            if matches!(&key, PropertyKey::String(s) if s == "length") {
                return match &desc {
                    PropertyDescriptor::Data {
                        value,
                        writable: true,
                        configurable: false,
                        enumerable: false,
                    } => {
                        set_array_length(elements, value)?;
                        Ok(true)
                    }
                    _ => Ok(false),
                };
            }
        }

        let Some(current) = self.properties.get(&key) else {
            if !self.extensible {
                return Ok(false);
            }
            self.properties.insert(key, desc);
            return Ok(true);
        };
        if !current.is_configurable() {
            if desc.is_configurable() || desc.is_enumerable() != current.is_enumerable() {
                return Ok(false);
            }
            if current.is_data() != desc.is_data() {
                return Ok(false);
            }
            match (current, &desc) {
                (
                    PropertyDescriptor::Data {
                        writable: false,
                        value: current_value,
                        ..
                    },
                    PropertyDescriptor::Data {
                        writable: new_writable,
                        value: new_value,
                        ..
                    },
                ) if *new_writable || !same_value(current_value, new_value) => {
                    return Ok(false);
                }
                (
                    PropertyDescriptor::Accessor {
                        get: cur_get,
                        set: cur_set,
                        ..
                    },
                    PropertyDescriptor::Accessor {
                        get: new_get,
                        set: new_set,
                        ..
                    },
                ) if cur_get != new_get || cur_set != new_set => {
                    return Ok(false);
                }
                _ => {}
            }
        }
        self.properties.insert(key, desc);
        Ok(true)
    }

    /// `false` if the property exists and is non-configurable.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(elements) = &mut self.kind {
            if let Some(index) = key.array_index() {
                if let Some(slot) = elements.get_mut(index as usize) {
                    *slot = JsValue::Undefined;
                }
                return true;
            }
            if matches!(key, PropertyKey::String(s) if s == "length") {
                return false;
            }
        }
        match self.properties.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                self.properties.remove(key);
                true
            }
            None => true,
        }
    }

    /// Own keys: integer indices ascending, then string keys, then symbols.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut int_keys: Vec<(u32, PropertyKey)> = Vec::new();
        let mut str_keys: Vec<PropertyKey> = Vec::new();
        let mut sym_keys: Vec<PropertyKey> = Vec::new();

        if let ObjectKind::Array(elements) = &self.kind {
            for index in 0..elements.len() as u32 {
                int_keys.push((index, PropertyKey::index(index)));
            }
            str_keys.push(PropertyKey::from("length"));
        }
        for key in self.properties.keys() {
            match key.array_index() {
                Some(n) => int_keys.push((n, key.clone())),
                None if matches!(key, PropertyKey::Symbol(_)) => sym_keys.push(key.clone()),
                None => str_keys.push(key.clone()),
            }
        }

        int_keys.sort_by_key(|(n, _)| *n);
        let mut result: Vec<PropertyKey> = int_keys.into_iter().map(|(_, k)| k).collect();
        result.extend(str_keys);
        result.extend(sym_keys);
        result
    }

    /// Enumerable own string keys, as `Object.keys` reports them.
    pub fn enumerable_keys(&self) -> Vec<String> {
        self.own_property_keys()
            .into_iter()
            .filter(|k| self.own_property(k).is_some_and(|d| d.is_enumerable()))
            .filter_map(|k| match k {
                PropertyKey::String(s) => Some(s),
                PropertyKey::Symbol(_) => None,
            })
            .collect()
    }
}

fn set_element(elements: &mut Vec<JsValue>, index: u32, value: JsValue) -> Result<(), ObjectError> {
    let index = index as usize;
    if index >= elements.len() {
        grow_to(elements, index as u64 + 1)?;
    }
    elements[index] = value;
    Ok(())
}

fn set_array_length(elements: &mut Vec<JsValue>, value: &JsValue) -> Result<(), ObjectError> {
    let JsValue::Number(n) = value else {
        return Err(ObjectError::TypeError("array length must be a number".to_string()));
    };
    if n.fract() != 0.0 || *n < 0.0 {
        return Err(ObjectError::TypeError(format!("invalid array length {n}")));
    }
    let requested = *n as u64;
    if requested <= elements.len() as u64 {
        elements.truncate(requested as usize);
        Ok(())
    } else {
        grow_to(elements, requested)
    }
}

fn grow_to(elements: &mut Vec<JsValue>, len: u64) -> Result<(), ObjectError> {
    if len > u64::from(MAX_ARRAY_LENGTH) {
        return Err(ObjectError::ArrayLengthTooLarge {
            requested: len,
            max: MAX_ARRAY_LENGTH,
        });
    }
    elements.resize(len as usize, JsValue::Undefined);
    Ok(())
}

/// `Object.is`: NaN equals itself, `+0` and `-0` differ.
pub fn same_value(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Number(x), JsValue::Number(y)) => {
            (x.is_nan() && y.is_nan()) || (x == y && x.is_sign_negative() == y.is_sign_negative())
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// PropertyLookup — result of a prototype-chain walk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyLookup {
    Data(JsValue),
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
    },
    Missing,
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ObjectHeap {
    slots: Vec<Option<HeapObject>>,
    free: Vec<u32>,
    live: usize,
    symbols: Vec<Option<String>>,
    class_names: Vec<String>,
    max_depth: u32,
}

impl ObjectHeap {
    pub fn new(max_depth: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            symbols: Vec::new(),
            class_names: vec!["Object".to_string()],
            max_depth,
        }
    }

    pub fn register_class(&mut self, name: &str) -> ClassId {
        self.class_names.push(name.to_string());
        ClassId((self.class_names.len() - 1) as u32)
    }

    pub fn class_name(&self, class: ClassId) -> Option<&str> {
        self.class_names.get(class.0 as usize).map(String::as_str)
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjectHandle {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(object);
            return ObjectHandle(slot);
        }
        self.slots.push(Some(object));
        ObjectHandle((self.slots.len() - 1) as u32)
    }

    pub fn alloc_ordinary(&mut self, prototype: Option<ObjectHandle>) -> ObjectHandle {
        self.alloc(HeapObject::ordinary(prototype))
    }

    pub fn alloc_symbol(&mut self, description: Option<String>) -> SymbolId {
        self.symbols.push(description);
        SymbolId((self.symbols.len() - 1) as u32)
    }

    pub fn symbol_description(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get(id.0 as usize).and_then(|d| d.as_deref())
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&HeapObject, ObjectError> {
        self.slots
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut HeapObject, ObjectError> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live handles in slot order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| ObjectHandle(i as u32))
    }

    /// Releases a slot; used by the sweeper.
    pub(crate) fn free(&mut self, handle: ObjectHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.0 as usize) else {
            return false;
        };
        if slot.take().is_none() {
            return false;
        }
        self.free.push(handle.0);
        self.live -= 1;
        true
    }

    /// Walks the prototype chain starting at `handle` looking for `key`.
    pub fn lookup(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<PropertyLookup, ObjectError> {
        let mut current = Some(handle);
        let mut depth: u32 = 0;
        let mut visited = BTreeSet::new();

        while let Some(h) = current {
            if depth > self.max_depth {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: self.max_depth,
                });
            }
            if !visited.insert(h) {
                return Err(ObjectError::PrototypeCycleDetected);
            }
            let obj = self.get(h)?;
            if let Some(desc) = obj.own_property(key) {
                return Ok(match desc {
                    PropertyDescriptor::Data { value, .. } => PropertyLookup::Data(value),
                    PropertyDescriptor::Accessor { get, set, .. } => {
                        PropertyLookup::Accessor { get, set }
                    }
                });
            }
            current = obj.prototype;
            depth += 1;
        }
        Ok(PropertyLookup::Missing)
    }

    pub fn has_property(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(!matches!(self.lookup(handle, key)?, PropertyLookup::Missing))
    }

    pub fn get_own_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        Ok(self.get(handle)?.own_property(key))
    }

    pub fn put(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        self.get_mut(handle)?.put_own(key, value)
    }

    /// Installs a hidden data property, as builtins do for their methods.
    pub fn put_hidden(
        &mut self,
        handle: ObjectHandle,
        key: impl Into<PropertyKey>,
        value: JsValue,
    ) -> Result<(), ObjectError> {
        self.get_mut(handle)?
            .properties
            .insert(key.into(), PropertyDescriptor::hidden(value));
        Ok(())
    }

    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        self.get_mut(handle)?.define_own_property(key, desc)
    }

    pub fn delete_property(
        &mut self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<bool, ObjectError> {
        Ok(self.get_mut(handle)?.delete(key))
    }

    pub fn get_prototype_of(&self, handle: ObjectHandle) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.get(handle)?.prototype)
    }

    /// `Ok(false)` when the object is non-extensible and the prototype would
    /// change.
    pub fn set_prototype_of(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<bool, ObjectError> {
        if let Some(p) = proto {
            let mut current = Some(p);
            let mut visited = BTreeSet::new();
            visited.insert(handle);
            while let Some(h) = current {
                if !visited.insert(h) {
                    return Err(ObjectError::PrototypeCycleDetected);
                }
                current = self.get(h)?.prototype;
            }
        }

        let obj = self.get_mut(handle)?;
        if !obj.extensible {
            return Ok(obj.prototype == proto);
        }
        obj.prototype = proto;
        Ok(true)
    }

    /// Does `proto` appear on the prototype chain of `handle` (excluding
    /// `handle` itself)?
    pub fn chain_contains(&self, handle: ObjectHandle, proto: ObjectHandle) -> Result<bool, ObjectError> {
        let mut current = self.get(handle)?.prototype;
        let mut depth: u32 = 0;
        while let Some(h) = current {
            if h == proto {
                return Ok(true);
            }
            depth += 1;
            if depth > self.max_depth {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: self.max_depth,
                });
            }
            current = self.get(h)?.prototype;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PropertyKey {
        PropertyKey::from(s)
    }

    fn num(n: f64) -> JsValue {
        JsValue::Number(n)
    }

    fn heap() -> ObjectHeap {
        ObjectHeap::new(16)
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    #[test]
    fn array_index_parsing_is_canonical() {
        assert_eq!(key("0").array_index(), Some(0));
        assert_eq!(key("42").array_index(), Some(42));
        assert_eq!(key("042").array_index(), None);
        assert_eq!(key("-1").array_index(), None);
        assert_eq!(key("1.5").array_index(), None);
        assert_eq!(key("4294967295").array_index(), None);
        assert_eq!(PropertyKey::Symbol(SymbolId(1)).array_index(), None);
    }

    #[test]
    fn key_display() {
        assert_eq!(key("foo").to_string(), "foo");
        assert_eq!(PropertyKey::Symbol(SymbolId(42)).to_string(), "Symbol(42)");
    }

    // -----------------------------------------------------------------------
    // Ordinary properties
    // -----------------------------------------------------------------------

    #[test]
    fn non_configurable_property_rejects_redefinition() {
        let mut obj = HeapObject::ordinary(None);
        let frozen = PropertyDescriptor::Data {
            value: num(1.0),
            writable: false,
            enumerable: true,
            configurable: false,
        };
        assert!(obj.define_own_property(key("x"), frozen.clone()).unwrap());
        assert!(!obj
            .define_own_property(key("x"), PropertyDescriptor::data(num(2.0)))
            .unwrap());
        // Same value, same flags is allowed.
        assert!(obj.define_own_property(key("x"), frozen).unwrap());
        assert!(!obj.delete(&key("x")));
        assert!(!obj.put_own(key("x"), num(3.0)).unwrap());
    }

    #[test]
    fn non_extensible_object_refuses_new_properties() {
        let mut obj = HeapObject::ordinary(None);
        obj.extensible = false;
        assert!(!obj.put_own(key("a"), num(1.0)).unwrap());
        assert!(!obj
            .define_own_property(key("a"), PropertyDescriptor::data(num(1.0)))
            .unwrap());
    }

    #[test]
    fn own_keys_put_indices_first() {
        let mut obj = HeapObject::ordinary(None);
        obj.put_own(key("b"), num(1.0)).unwrap();
        obj.put_own(key("10"), num(1.0)).unwrap();
        obj.put_own(key("2"), num(1.0)).unwrap();
        obj.put_own(PropertyKey::Symbol(SymbolId(0)), num(1.0)).unwrap();
        let keys: Vec<String> = obj.own_property_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2", "10", "b", "Symbol(0)"]);
    }

    #[test]
    fn string_keys_keep_insertion_order() {
        let mut obj = HeapObject::ordinary(None);
        for name in ["zeta", "alpha", "mid"] {
            obj.put_own(key(name), num(1.0)).unwrap();
        }
        obj.put_own(key("alpha"), num(2.0)).unwrap();
        assert_eq!(obj.enumerable_keys(), vec!["zeta", "alpha", "mid"]);

        assert!(obj.delete(&key("zeta")));
        obj.put_own(key("zeta"), num(3.0)).unwrap();
        assert_eq!(obj.enumerable_keys(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(obj.properties.len(), 3);
    }

    #[test]
    fn hidden_properties_are_not_enumerable() {
        let mut obj = HeapObject::ordinary(None);
        obj.put_own(key("shown"), num(1.0)).unwrap();
        obj.properties
            .insert(key("hidden"), PropertyDescriptor::hidden(num(2.0)));
        assert_eq!(obj.enumerable_keys(), vec!["shown".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Arrays
    // -----------------------------------------------------------------------

    #[test]
    fn array_elements_and_length() {
        let mut arr = HeapObject::new(None, ObjectKind::Array(vec![num(1.0)]));
        assert_eq!(arr.own_property(&key("0")).and_then(|d| d.value().cloned()), Some(num(1.0)));
        assert!(arr.own_property(&key("1")).is_none());
        arr.put_own(key("3"), num(4.0)).unwrap();
        assert_eq!(
            arr.own_property(&key("length")).and_then(|d| d.value().cloned()),
            Some(num(4.0))
        );
        assert_eq!(arr.own_property(&key("2")).and_then(|d| d.value().cloned()), Some(JsValue::Undefined));
        arr.put_own(key("length"), num(1.0)).unwrap();
        assert!(arr.own_property(&key("3")).is_none());
        assert!(!arr.delete(&key("length")));
    }

    #[test]
    fn oversized_array_is_refused() {
        let mut arr = HeapObject::new(None, ObjectKind::Array(Vec::new()));
        let err = arr
            .put_own(key("length"), num(f64::from(MAX_ARRAY_LENGTH) + 1.0))
            .unwrap_err();
        assert!(matches!(err, ObjectError::ArrayLengthTooLarge { .. }));
    }

    #[test]
    fn array_elements_reject_accessors() {
        let mut arr = HeapObject::new(None, ObjectKind::Array(Vec::new()));
        let accessor = PropertyDescriptor::Accessor {
            get: None,
            set: None,
            enumerable: true,
            configurable: true,
        };
        assert!(!arr.define_own_property(key("0"), accessor).unwrap());
    }

    // -----------------------------------------------------------------------
    // Heap
    // -----------------------------------------------------------------------

    #[test]
    fn lookup_walks_the_prototype_chain() {
        let mut heap = heap();
        let proto = heap.alloc_ordinary(None);
        heap.put(proto, key("inherited"), num(7.0)).unwrap();
        let child = heap.alloc_ordinary(Some(proto));
        assert_eq!(
            heap.lookup(child, &key("inherited")).unwrap(),
            PropertyLookup::Data(num(7.0))
        );
        assert_eq!(heap.lookup(child, &key("absent")).unwrap(), PropertyLookup::Missing);
        assert!(heap.chain_contains(child, proto).unwrap());
        assert!(!heap.chain_contains(proto, child).unwrap());
    }

    #[test]
    fn set_prototype_rejects_cycles() {
        let mut heap = heap();
        let a = heap.alloc_ordinary(None);
        let b = heap.alloc_ordinary(Some(a));
        assert_eq!(
            heap.set_prototype_of(a, Some(b)),
            Err(ObjectError::PrototypeCycleDetected)
        );
        assert_eq!(heap.set_prototype_of(a, Some(a)), Err(ObjectError::PrototypeCycleDetected));
    }

    #[test]
    fn deep_chains_are_cut_off() {
        let mut heap = heap();
        let mut current = heap.alloc_ordinary(None);
        for _ in 0..20 {
            current = heap.alloc_ordinary(Some(current));
        }
        assert!(matches!(
            heap.lookup(current, &key("x")),
            Err(ObjectError::PrototypeChainTooDeep { max: 16, .. })
        ));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = heap();
        let a = heap.alloc_ordinary(None);
        let _b = heap.alloc_ordinary(None);
        assert_eq!(heap.len(), 2);
        assert!(heap.free(a));
        assert!(!heap.free(a));
        assert_eq!(heap.get(a).unwrap_err(), ObjectError::ObjectNotFound(a));
        let c = heap.alloc_ordinary(None);
        assert_eq!(c, a);
        assert_eq!(heap.handles().count(), 2);
    }

    #[test]
    fn same_value_distinguishes_signed_zero() {
        assert!(same_value(&num(f64::NAN), &num(f64::NAN)));
        assert!(!same_value(&num(0.0), &num(-0.0)));
    }

    #[test]
    fn class_registry_names_classes() {
        let mut heap = heap();
        let class = heap.register_class("ExtRef");
        assert_eq!(heap.class_name(class), Some("ExtRef"));
        assert_eq!(heap.class_name(ORDINARY_CLASS), Some("Object"));
    }
}
