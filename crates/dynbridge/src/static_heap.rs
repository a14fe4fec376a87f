//! In-process static heap: typed structs with declared supertypes, arrays,
//! byte strings and an external reference table.
//!
//! Embedders prototyping against the bridge, and the tests, use this in
//! place of a real WasmGC runtime.  It models only what [`StaticHeap`]
//! exposes.

use std::cell::RefCell;

use crate::extref::{EnvToken, ExtRefIndex, StaticHeap, StaticRef};
use crate::shape::{layouts, ElemType, FieldDesc, FieldType, StructShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone)]
struct TypeDef {
    name: String,
    shape: StructShape,
    supertype: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Ref(Option<StaticRef>),
}

impl FieldValue {
    fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::I32 | FieldType::I64 => Self::Int(0),
            FieldType::F32 | FieldType::F64 => Self::Float(0.0),
            _ => Self::Ref(None),
        }
    }
}

#[derive(Debug, Clone)]
enum StaticObject {
    Struct { ty: TypeId, fields: Vec<FieldValue> },
    Array(Vec<Option<StaticRef>>),
    Bytes(Vec<u8>),
}

#[derive(Debug, Default)]
struct Inner {
    types: Vec<TypeDef>,
    objects: Vec<StaticObject>,
    table: Vec<StaticRef>,
    string_type: Option<TypeId>,
    array_type: Option<TypeId>,
}

impl Inner {
    fn add_type(&mut self, name: &str, fields: Vec<FieldDesc>, supertype: Option<TypeId>) -> TypeId {
        self.types.push(TypeDef {
            name: name.to_string(),
            shape: StructShape::new(fields),
            supertype,
        });
        TypeId((self.types.len() - 1) as u32)
    }

    fn add_object(&mut self, object: StaticObject) -> StaticRef {
        self.objects.push(object);
        StaticRef((self.objects.len() - 1) as u64)
    }

    fn object(&self, obj: StaticRef) -> Option<&StaticObject> {
        usize::try_from(obj.0).ok().and_then(|i| self.objects.get(i))
    }

    fn struct_type(&self, obj: StaticRef) -> Option<TypeId> {
        match self.object(obj)? {
            StaticObject::Struct { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    fn string_type(&mut self) -> TypeId {
        match self.string_type {
            Some(ty) => ty,
            None => {
                let ty = self.add_type("string", layouts::string().fields, None);
                self.string_type = Some(ty);
                ty
            }
        }
    }

    fn array_type(&mut self) -> TypeId {
        match self.array_type {
            Some(ty) => ty,
            None => {
                let ty = self.add_type("array<any>", layouts::array(ElemType::AnyRef).fields, None);
                self.array_type = Some(ty);
                ty
            }
        }
    }

    fn alloc_string(&mut self, text: &str) -> StaticRef {
        let ty = self.string_type();
        let bytes = self.add_object(StaticObject::Bytes(text.as_bytes().to_vec()));
        self.add_object(StaticObject::Struct {
            ty,
            fields: vec![FieldValue::Int(0), FieldValue::Ref(Some(bytes))],
        })
    }
}

#[derive(Debug, Default)]
pub struct StructHeap {
    inner: RefCell<Inner>,
}

impl StructHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_type(&self, name: &str, fields: Vec<FieldDesc>, supertype: Option<TypeId>) -> TypeId {
        self.inner.borrow_mut().add_type(name, fields, supertype)
    }

    pub fn type_name(&self, ty: TypeId) -> Option<String> {
        self.inner.borrow().types.get(ty.0 as usize).map(|t| t.name.clone())
    }

    pub fn type_of(&self, obj: StaticRef) -> Option<TypeId> {
        self.inner.borrow().struct_type(obj)
    }

    /// New struct of type `ty` with every field zeroed or null.
    pub fn alloc_struct(&self, ty: TypeId) -> StaticRef {
        let mut inner = self.inner.borrow_mut();
        let fields: Vec<FieldValue> = inner
            .types
            .get(ty.0 as usize)
            .map(|t| t.shape.fields.iter().map(|f| FieldValue::zero(f.ty)).collect())
            .unwrap_or_default();
        inner.add_object(StaticObject::Struct { ty, fields })
    }

    /// Interface wrapper of type `ty` pointing at `target`.
    pub fn alloc_interface(&self, ty: TypeId, target: Option<StaticRef>) -> StaticRef {
        let obj = self.alloc_struct(ty);
        self.set_field(obj, 3, FieldValue::Ref(target));
        obj
    }

    pub fn alloc_string(&self, text: &str) -> StaticRef {
        self.inner.borrow_mut().alloc_string(text)
    }

    /// Array struct (`(mut (array anyref), mut i32)`) over `elements`.
    pub fn alloc_array(&self, elements: Vec<Option<StaticRef>>) -> StaticRef {
        let mut inner = self.inner.borrow_mut();
        let ty = inner.array_type();
        let len = elements.len() as i64;
        let data = inner.add_object(StaticObject::Array(elements));
        inner.add_object(StaticObject::Struct {
            ty,
            fields: vec![FieldValue::Ref(Some(data)), FieldValue::Int(len)],
        })
    }

    /// Returns `false` if `obj` is not a struct or has no such field.
    pub fn set_field(&self, obj: StaticRef, field: usize, value: FieldValue) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Ok(index) = usize::try_from(obj.0) else {
            return false;
        };
        let Some(StaticObject::Struct { fields, .. }) = inner.objects.get_mut(index) else {
            return false;
        };
        match fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn field(&self, obj: StaticRef, field: usize) -> Option<FieldValue> {
        match self.inner.borrow().object(obj)? {
            StaticObject::Struct { fields, .. } => fields.get(field).cloned(),
            _ => None,
        }
    }

    /// Appends `obj` to the external reference table.
    pub fn insert_table(&self, obj: StaticRef) -> ExtRefIndex {
        let mut inner = self.inner.borrow_mut();
        inner.table.push(obj);
        ExtRefIndex((inner.table.len() - 1) as u32)
    }

    pub fn table_len(&self) -> usize {
        self.inner.borrow().table.len()
    }
}

impl StaticHeap for StructHeap {
    fn table_element(&self, _env: EnvToken, index: ExtRefIndex) -> Option<StaticRef> {
        self.inner.borrow().table.get(index.0 as usize).copied()
    }

    fn struct_shape(&self, obj: StaticRef) -> Option<StructShape> {
        let inner = self.inner.borrow();
        let ty = inner.struct_type(obj)?;
        inner.types.get(ty.0 as usize).map(|t| t.shape.clone())
    }

    fn struct_field_ref(&self, obj: StaticRef, field: usize) -> Option<StaticRef> {
        match self.field(obj, field)? {
            FieldValue::Ref(r) => r,
            _ => None,
        }
    }

    fn is_instance_of(&self, obj: StaticRef, target: StaticRef) -> bool {
        let inner = self.inner.borrow();
        let (Some(mut ty), Some(wanted)) = (inner.struct_type(obj), inner.struct_type(target)) else {
            return false;
        };
        loop {
            if ty == wanted {
                return true;
            }
            match inner.types.get(ty.0 as usize).and_then(|t| t.supertype) {
                Some(parent) => ty = parent,
                None => return false,
            }
        }
    }

    fn string_contents(&self, obj: StaticRef) -> Option<String> {
        let inner = self.inner.borrow();
        let ty = inner.struct_type(obj)?;
        if Some(ty) != inner.string_type {
            return None;
        }
        let StaticObject::Struct { fields, .. } = inner.object(obj)? else {
            return None;
        };
        let FieldValue::Ref(Some(bytes)) = fields.get(1)? else {
            return None;
        };
        match inner.object(*bytes)? {
            StaticObject::Bytes(data) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }

    fn array_elements(&self, obj: StaticRef) -> Option<Vec<Option<StaticRef>>> {
        let inner = self.inner.borrow();
        let StaticObject::Struct { fields, .. } = inner.object(obj)? else {
            return None;
        };
        let (FieldValue::Ref(Some(data)), FieldValue::Int(len)) = (fields.first()?, fields.get(1)?)
        else {
            return None;
        };
        match inner.object(*data)? {
            StaticObject::Array(elements) => {
                let len = usize::try_from(*len).ok()?.min(elements.len());
                Some(elements[..len].to_vec())
            }
            _ => None,
        }
    }

    fn intern(&self, _env: EnvToken, obj: StaticRef) -> Option<ExtRefIndex> {
        let mut inner = self.inner.borrow_mut();
        inner.object(obj)?;
        if let Some(pos) = inner.table.iter().position(|r| *r == obj) {
            return Some(ExtRefIndex(pos as u32));
        }
        inner.table.push(obj);
        Some(ExtRefIndex((inner.table.len() - 1) as u32))
    }

    fn alloc_string(&self, _env: EnvToken, text: &str) -> Option<StaticRef> {
        Some(self.inner.borrow_mut().alloc_string(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_checks_follow_declared_supertypes() {
        let heap = StructHeap::new();
        let base = heap.define_type("Base", vec![FieldDesc::mutable(FieldType::I32)], None);
        let derived = heap.define_type(
            "Derived",
            vec![
                FieldDesc::mutable(FieldType::I32),
                FieldDesc::mutable(FieldType::F64),
            ],
            Some(base),
        );
        let other = heap.define_type("Other", Vec::new(), None);
        let b = heap.alloc_struct(base);
        let d = heap.alloc_struct(derived);
        let o = heap.alloc_struct(other);

        assert!(heap.is_instance_of(d, b));
        assert!(heap.is_instance_of(d, d));
        assert!(!heap.is_instance_of(b, d));
        assert!(!heap.is_instance_of(o, b));
        assert_eq!(heap.type_name(derived).as_deref(), Some("Derived"));
    }

    #[test]
    fn strings_and_arrays_are_readable() {
        let heap = StructHeap::new();
        let a = heap.alloc_string("a");
        let b = heap.alloc_string("bc");
        let arr = heap.alloc_array(vec![Some(a), Some(b)]);
        assert_eq!(heap.string_contents(b).as_deref(), Some("bc"));
        assert_eq!(heap.string_contents(arr), None);
        assert_eq!(heap.array_elements(arr), Some(vec![Some(a), Some(b)]));
        assert!(heap.struct_shape(arr).is_some());
    }

    #[test]
    fn intern_reuses_table_slots() {
        let heap = StructHeap::new();
        let s = heap.alloc_string("x");
        let first = heap.intern(EnvToken(0), s).unwrap();
        let second = heap.intern(EnvToken(0), s).unwrap();
        assert_eq!(first, second);
        assert_eq!(heap.table_len(), 1);
        assert_eq!(heap.table_element(EnvToken(0), first), Some(s));
        assert_eq!(heap.intern(EnvToken(0), StaticRef(999)), None);
    }

    #[test]
    fn field_writes_are_bounds_checked() {
        let heap = StructHeap::new();
        let ty = heap.define_type("Pair", layouts::closure().fields, None);
        let obj = heap.alloc_struct(ty);
        assert!(heap.set_field(obj, 0, FieldValue::Ref(Some(obj))));
        assert!(!heap.set_field(obj, 5, FieldValue::Int(1)));
        assert_eq!(heap.struct_field_ref(obj, 0), Some(obj));
        assert_eq!(heap.struct_field_ref(obj, 1), None);
    }
}
