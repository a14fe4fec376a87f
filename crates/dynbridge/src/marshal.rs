//! Moving values between static-heap slots and the dynamic heap.
//!
//! Static code passes `i32` booleans, `f64` numbers, `anyref` slots that
//! already hold a dynamic value, and typed struct references.  Strings are
//! copied across; every other struct crosses as an external reference
//! tagged by its shape.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{BridgeError, TYPE_ERROR_CODE};
use crate::extref::{EnvToken, ExtRefTag, StaticHeap, StaticRef};
use crate::shape::ShapeKind;
use crate::value::Value;

const COMPONENT: &str = "marshal";

/// A value as it sits in a static-heap slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaticValue {
    I32(i32),
    F64(f64),
    /// Slot typed `anyref`: already a dynamic value.
    AnyRef(Value),
    /// Typed struct reference; `None` is the null reference.
    Ref(Option<StaticRef>),
}

/// Slot type requested when unboxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaticType {
    I32,
    F64,
    AnyRef,
    /// The static string struct.
    String,
    /// Any other struct type, reached through the external reference table.
    Struct,
}

impl Context {
    /// Boxes a static slot value into the dynamic heap.
    ///
    /// `i32` becomes a boolean (non-zero is `true`), `f64` a number.  A
    /// struct reference becomes a string when it has the static string
    /// shape, otherwise an external reference interned in the table.
    pub fn box_static_value(&mut self, value: StaticValue, env: EnvToken) -> Result<Value, BridgeError> {
        match value {
            StaticValue::I32(n) => Ok(self.new_boolean(n != 0)),
            StaticValue::F64(n) => Ok(self.new_number(n)),
            StaticValue::AnyRef(v) => {
                self.value(v)?;
                Ok(v)
            }
            StaticValue::Ref(None) => Ok(self.new_null()),
            StaticValue::Ref(Some(obj)) => self.box_static_ref(obj, env),
        }
    }

    fn box_static_ref(&mut self, obj: StaticRef, env: EnvToken) -> Result<Value, BridgeError> {
        let heap = self.require_static_heap("box")?;
        let kind = heap
            .struct_shape(obj)
            .map_or(ShapeKind::Struct, |shape| self.shapes.classify(&shape));
        if kind == ShapeKind::String {
            let text = heap
                .string_contents(obj)
                .ok_or_else(|| BridgeError::exception(format!("unreadable static string {obj}")))?;
            return Ok(self.new_string(&text));
        }
        let Some(index) = heap.intern(env, obj) else {
            self.events.fail(COMPONENT, "box_extref", TYPE_ERROR_CODE);
            return Err(BridgeError::type_error(format!(
                "static heap cannot place {obj} in the reference table"
            )));
        };
        Ok(self.new_extref(index, ExtRefTag::for_shape(kind), env))
    }

    /// Unboxes `value` into a slot of type `ty`.
    ///
    /// Numbers and booleans are extracted strictly, as `to_number` and
    /// `to_bool` do.  `String` stringifies the value and allocates it on
    /// the static heap; `Struct` requires an external reference and reads
    /// its table slot.
    pub fn unbox_static_value(
        &mut self,
        value: Value,
        ty: StaticType,
        env: EnvToken,
    ) -> Result<StaticValue, BridgeError> {
        match ty {
            StaticType::I32 => Ok(StaticValue::I32(i32::from(self.to_bool(value)?))),
            StaticType::F64 => Ok(StaticValue::F64(self.to_number(value)?)),
            StaticType::AnyRef => {
                self.value(value)?;
                Ok(StaticValue::AnyRef(value))
            }
            StaticType::String => {
                let heap = self.require_static_heap("unbox string")?;
                let js = self.value(value)?;
                let text = self.js_to_string(&js)?;
                match heap.alloc_string(env, &text) {
                    Some(obj) => Ok(StaticValue::Ref(Some(obj))),
                    None => Err(BridgeError::type_error("static heap cannot allocate strings")),
                }
            }
            StaticType::Struct => {
                if self.is_null(value) {
                    return Ok(StaticValue::Ref(None));
                }
                let (_, index) = self.to_extref(value)?;
                let heap = self.require_static_heap("unbox struct")?;
                match heap.table_element(env, index) {
                    Some(obj) => Ok(StaticValue::Ref(Some(obj))),
                    None => Err(BridgeError::exception(format!("{index} is empty"))),
                }
            }
        }
    }

    fn require_static_heap(&mut self, op: &str) -> Result<std::rc::Rc<dyn StaticHeap>, BridgeError> {
        match &self.static_heap {
            Some(heap) => Ok(heap.clone()),
            None => {
                self.events.fail(COMPONENT, "no_static_heap", TYPE_ERROR_CODE);
                Err(BridgeError::type_error(format!("{op} needs an attached static heap")))
            }
        }
    }
}
