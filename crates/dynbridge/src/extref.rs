//! External references: dynamic values that carry a static-heap identity.
//!
//! A dynamic value never holds a static-heap pointer.  It holds a tag and an
//! index into the embedder's external reference table, plus the embedder
//! environment token needed to read that table.  [`StaticHeap`] is the only
//! way the bridge looks into the static side.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shape::{ShapeClassifier, ShapeKind, StructShape};
use crate::value::DynKind;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExtRefTag {
    Object,
    Function,
    Interface,
    Array,
}

impl ExtRefTag {
    pub fn kind(self) -> DynKind {
        match self {
            Self::Object => DynKind::ExtRefObj,
            Self::Function => DynKind::ExtRefFunc,
            Self::Interface => DynKind::ExtRefInterface,
            Self::Array => DynKind::ExtRefArray,
        }
    }

    /// Tag for a static struct of the given recognized shape.
    pub fn for_shape(shape: ShapeKind) -> Self {
        match shape {
            ShapeKind::Interface => Self::Interface,
            ShapeKind::Array => Self::Array,
            ShapeKind::Closure => Self::Function,
            ShapeKind::String | ShapeKind::Struct => Self::Object,
        }
    }
}

impl fmt::Display for ExtRefTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Object => "object",
            Self::Function => "function",
            Self::Interface => "interface",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Slot in the embedder's external reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExtRefIndex(pub u32);

impl fmt::Display for ExtRefIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table[{}]", self.0)
    }
}

/// Embedder execution environment, threaded through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EnvToken(pub u64);

/// Identity of a static-heap object.  Equal refs name the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StaticRef(pub u64);

impl fmt::Display for StaticRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "static@{:#x}", self.0)
    }
}

/// Payload of a dynamic-heap object that carries an external reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtRefPayload {
    pub tag: ExtRefTag,
    pub index: ExtRefIndex,
    pub env: EnvToken,
}

// ---------------------------------------------------------------------------
// StaticHeap — the embedder's side
// ---------------------------------------------------------------------------

/// Read access to the static heap and its external reference table.
///
/// The bridge never mutates table contents.  The optional methods let the
/// bridge render static strings and arrays and box static references, and
/// default to "unsupported".
pub trait StaticHeap {
    fn table_element(&self, env: EnvToken, index: ExtRefIndex) -> Option<StaticRef>;

    /// Layout of a struct object; `None` for arrays, functions and unknown refs.
    fn struct_shape(&self, obj: StaticRef) -> Option<StructShape>;

    fn struct_field_ref(&self, obj: StaticRef, field: usize) -> Option<StaticRef>;

    /// Static subtype check of `obj`'s type against the type of `target`.
    fn is_instance_of(&self, obj: StaticRef, target: StaticRef) -> bool;

    fn string_contents(&self, _obj: StaticRef) -> Option<String> {
        None
    }

    /// Element refs of a static array struct.
    fn array_elements(&self, _obj: StaticRef) -> Option<Vec<Option<StaticRef>>> {
        None
    }

    /// Table slot for `obj`, allocating one if needed.
    fn intern(&self, _env: EnvToken, _obj: StaticRef) -> Option<ExtRefIndex> {
        None
    }

    fn alloc_string(&self, _env: EnvToken, _text: &str) -> Option<StaticRef> {
        None
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Identity an external reference resolves to for comparison purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedRef {
    Static(StaticRef),
    /// No static heap attached, or the table slot is empty: identity is the
    /// `(index, env)` pair itself.
    Unresolved { index: ExtRefIndex, env: EnvToken },
}

/// Looks up `payload` in the table and unwraps interface wrappers to the
/// object they point at.
pub fn resolve_identity(
    heap: Option<&dyn StaticHeap>,
    shapes: &dyn ShapeClassifier,
    payload: &ExtRefPayload,
) -> ResolvedRef {
    let unresolved = ResolvedRef::Unresolved {
        index: payload.index,
        env: payload.env,
    };
    let Some(heap) = heap else {
        return unresolved;
    };
    let Some(obj) = heap.table_element(payload.env, payload.index) else {
        return unresolved;
    };
    ResolvedRef::Static(unwrap_interface(heap, shapes, obj))
}

/// Backing object of an interface wrapper, or `obj` itself when it is not
/// one.  A wrapper whose target field is null stays as it is.
pub fn unwrap_interface(heap: &dyn StaticHeap, shapes: &dyn ShapeClassifier, obj: StaticRef) -> StaticRef {
    match heap.struct_shape(obj) {
        Some(shape) if shapes.is_interface(&shape) => heap
            .struct_field_ref(obj, shapes.interface_target_field())
            .unwrap_or(obj),
        _ => obj,
    }
}
