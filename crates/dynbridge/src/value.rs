//! Dynamic values: the engine-side representation, the kinds the bridge
//! reports for them, and the handles embedders hold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extref::ExtRefTag;
use crate::object_model::{ObjectHandle, SymbolId};

// ---------------------------------------------------------------------------
// DynKind — the fourteen logical kinds
// ---------------------------------------------------------------------------

/// Logical kind of a dynamic value as classified by `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DynKind {
    Unknown,
    Null,
    Undefined,
    Object,
    Boolean,
    Number,
    String,
    Function,
    Symbol,
    BigInt,
    ExtRefObj,
    ExtRefFunc,
    ExtRefInterface,
    ExtRefArray,
}

impl DynKind {
    pub const ALL: [DynKind; 14] = [
        Self::Unknown,
        Self::Null,
        Self::Undefined,
        Self::Object,
        Self::Boolean,
        Self::Number,
        Self::String,
        Self::Function,
        Self::Symbol,
        Self::BigInt,
        Self::ExtRefObj,
        Self::ExtRefFunc,
        Self::ExtRefInterface,
        Self::ExtRefArray,
    ];

    /// Ordinal used at the embedding ABI.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Is this one of the four external reference kinds?
    pub fn is_extref(self) -> bool {
        matches!(
            self,
            Self::ExtRefObj | Self::ExtRefFunc | Self::ExtRefInterface | Self::ExtRefArray
        )
    }

    pub fn extref_tag(self) -> Option<ExtRefTag> {
        match self {
            Self::ExtRefObj => Some(ExtRefTag::Object),
            Self::ExtRefFunc => Some(ExtRefTag::Function),
            Self::ExtRefInterface => Some(ExtRefTag::Interface),
            Self::ExtRefArray => Some(ExtRefTag::Array),
            _ => None,
        }
    }

    /// The string the `typeof` operator yields for this kind.
    pub fn js_type_name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::Function | Self::ExtRefFunc => "function",
            Self::Null
            | Self::Object
            | Self::ExtRefObj
            | Self::ExtRefInterface
            | Self::ExtRefArray => "object",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DynKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Object => "object",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Function => "function",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::ExtRefObj => "extref-object",
            Self::ExtRefFunc => "extref-function",
            Self::ExtRefInterface => "extref-interface",
            Self::ExtRefArray => "extref-array",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// JsValue — engine-side value
// ---------------------------------------------------------------------------

/// A value as stored inside the dynamic heap.
///
/// Objects are referenced through [`ObjectHandle`]; everything else is held
/// inline.  External references are objects of the context's extref class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Symbol(SymbolId),
    BigInt(i64),
    Object(ObjectHandle),
}

impl JsValue {
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// JS truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => !(n.is_nan() || *n == 0.0),
            Self::Str(s) => !s.is_empty(),
            Self::BigInt(n) => *n != 0,
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// SameValueZero, used for Map keys and `indexOf`.
    pub fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self == other,
        }
    }
}

// ---------------------------------------------------------------------------
// Value — embedder-facing handle
// ---------------------------------------------------------------------------

/// Opaque handle to a dynamic value, meaningful only inside the
/// [`Context`](crate::Context) that produced it.
///
/// Handles are generation-checked: once a handle is released or invalidated
/// by a collection, every operation on it fails cleanly instead of reading a
/// reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Value {
    slot: u32,
    generation: u32,
}

impl Value {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(self) -> u32 {
        self.slot
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}.{}", self.slot, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Renders a number the way `Number.prototype.toString()` does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&n.abs()) {
        return format!("{n}");
    }
    let text = format!("{n:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => text,
    }
}
