//! Structural recognition of static-heap object layouts.
//!
//! The static heap carries no nominal tag saying "this struct is an
//! interface wrapper" or "this struct is a string".  The bridge recognizes
//! those layouts by field count, field types and mutability.  The rules sit
//! behind [`ShapeClassifier`] so a context can swap them for another
//! compiler's layout conventions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a static array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    AnyRef,
    StructRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    I32,
    I64,
    F32,
    F64,
    AnyRef,
    FuncRef,
    StructRef,
    ArrayRef { elem: ElemType, mutable: bool },
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::AnyRef => f.write_str("anyref"),
            Self::FuncRef => f.write_str("funcref"),
            Self::StructRef => f.write_str("structref"),
            Self::ArrayRef { elem, mutable } => {
                let m = if *mutable { "mut " } else { "" };
                write!(f, "(array {m}{elem:?})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDesc {
    pub ty: FieldType,
    pub mutable: bool,
}

impl FieldDesc {
    pub const fn immutable(ty: FieldType) -> Self {
        Self { ty, mutable: false }
    }

    pub const fn mutable(ty: FieldType) -> Self {
        Self { ty, mutable: true }
    }
}

/// Layout of a static struct type, as reflection reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StructShape {
    pub fields: Vec<FieldDesc>,
}

impl StructShape {
    pub fn new(fields: Vec<FieldDesc>) -> Self {
        Self { fields }
    }

    pub fn field(&self, index: usize) -> Option<&FieldDesc> {
        self.fields.get(index)
    }
}

/// What a static struct stands for once its layout is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Interface,
    Closure,
    Array,
    String,
    Struct,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interface => "interface",
            Self::Closure => "closure",
            Self::Array => "array",
            Self::String => "string",
            Self::Struct => "struct",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ShapeClassifier
// ---------------------------------------------------------------------------

pub trait ShapeClassifier {
    /// Interface wrapper: the backing object sits in [`Self::interface_target_field`].
    fn is_interface(&self, shape: &StructShape) -> bool;
    fn is_closure(&self, shape: &StructShape) -> bool;
    fn is_array(&self, shape: &StructShape) -> bool;
    fn is_string(&self, shape: &StructShape) -> bool;

    fn interface_target_field(&self) -> usize {
        3
    }

    /// First matching rule wins; interfaces are checked first.
    fn classify(&self, shape: &StructShape) -> ShapeKind {
        if self.is_interface(shape) {
            ShapeKind::Interface
        } else if self.is_closure(shape) {
            ShapeKind::Closure
        } else if self.is_array(shape) {
            ShapeKind::Array
        } else if self.is_string(shape) {
            ShapeKind::String
        } else {
            ShapeKind::Struct
        }
    }
}

/// Layout rules of the TypeScript-to-WasmGC compiler.
///
/// - interface: `(i32, i32, i32, mut anyref)`
/// - closure: `(structref, funcref)`
/// - array: `(mut (array _), mut i32)`
/// - string: `(mut i32, mut (array mut i8))`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WasmGcShapes;

impl ShapeClassifier for WasmGcShapes {
    fn is_interface(&self, shape: &StructShape) -> bool {
        let [flag, index, extra, target] = shape.fields.as_slice() else {
            return false;
        };
        [flag, index, extra]
            .iter()
            .all(|f| f.ty == FieldType::I32 && !f.mutable)
            && target.ty == FieldType::AnyRef
            && target.mutable
    }

    fn is_closure(&self, shape: &StructShape) -> bool {
        matches!(
            shape.fields.as_slice(),
            [
                FieldDesc {
                    ty: FieldType::StructRef,
                    ..
                },
                FieldDesc {
                    ty: FieldType::FuncRef,
                    ..
                }
            ]
        )
    }

    fn is_array(&self, shape: &StructShape) -> bool {
        matches!(
            shape.fields.as_slice(),
            [
                FieldDesc {
                    ty: FieldType::ArrayRef { .. },
                    mutable: true
                },
                FieldDesc {
                    ty: FieldType::I32,
                    mutable: true
                }
            ]
        )
    }

    fn is_string(&self, shape: &StructShape) -> bool {
        matches!(
            shape.fields.as_slice(),
            [
                FieldDesc {
                    ty: FieldType::I32,
                    mutable: true
                },
                FieldDesc {
                    ty: FieldType::ArrayRef {
                        elem: ElemType::I8,
                        mutable: true
                    },
                    mutable: true
                }
            ]
        )
    }
}

/// Canonical layouts matching [`WasmGcShapes`], handy for building test
/// heaps.
pub mod layouts {
    use super::{ElemType, FieldDesc, FieldType, StructShape};

    pub fn interface() -> StructShape {
        StructShape::new(vec![
            FieldDesc::immutable(FieldType::I32),
            FieldDesc::immutable(FieldType::I32),
            FieldDesc::immutable(FieldType::I32),
            FieldDesc::mutable(FieldType::AnyRef),
        ])
    }

    pub fn closure() -> StructShape {
        StructShape::new(vec![
            FieldDesc::immutable(FieldType::StructRef),
            FieldDesc::immutable(FieldType::FuncRef),
        ])
    }

    pub fn array(elem: ElemType) -> StructShape {
        StructShape::new(vec![
            FieldDesc::mutable(FieldType::ArrayRef { elem, mutable: true }),
            FieldDesc::mutable(FieldType::I32),
        ])
    }

    pub fn string() -> StructShape {
        StructShape::new(vec![
            FieldDesc::mutable(FieldType::I32),
            FieldDesc::mutable(FieldType::ArrayRef {
                elem: ElemType::I8,
                mutable: true,
            }),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_layouts_classify() {
        let shapes = WasmGcShapes;
        assert_eq!(shapes.classify(&layouts::interface()), ShapeKind::Interface);
        assert_eq!(shapes.classify(&layouts::closure()), ShapeKind::Closure);
        assert_eq!(shapes.classify(&layouts::array(ElemType::AnyRef)), ShapeKind::Array);
        assert_eq!(shapes.classify(&layouts::string()), ShapeKind::String);
        assert_eq!(shapes.classify(&StructShape::default()), ShapeKind::Struct);
    }

    #[test]
    fn interface_requires_exact_mutability() {
        let shapes = WasmGcShapes;
        let mut shape = layouts::interface();
        shape.fields[3].mutable = false;
        assert!(!shapes.is_interface(&shape));

        let mut shape = layouts::interface();
        shape.fields[0].mutable = true;
        assert!(!shapes.is_interface(&shape));

        let mut shape = layouts::interface();
        shape.fields.push(FieldDesc::immutable(FieldType::I32));
        assert!(!shapes.is_interface(&shape));
    }

    #[test]
    fn string_needs_mutable_byte_array() {
        let shapes = WasmGcShapes;
        let shape = StructShape::new(vec![
            FieldDesc::mutable(FieldType::I32),
            FieldDesc::mutable(FieldType::ArrayRef {
                elem: ElemType::I8,
                mutable: false,
            }),
        ]);
        assert!(!shapes.is_string(&shape));
        // Field order tells strings and arrays apart.
        assert!(!shapes.is_array(&layouts::string()));
        assert_eq!(shapes.classify(&shape), ShapeKind::Struct);
    }

    #[test]
    fn array_needs_mutable_length() {
        let shapes = WasmGcShapes;
        let mut shape = layouts::array(ElemType::F64);
        shape.fields[1].mutable = false;
        assert!(!shapes.is_array(&shape));
    }

    #[test]
    fn field_type_display() {
        let ty = FieldType::ArrayRef {
            elem: ElemType::I8,
            mutable: true,
        };
        assert_eq!(ty.to_string(), "(array mut I8)");
        assert_eq!(FieldType::AnyRef.to_string(), "anyref");
    }
}
