//! JSON in and out of the dynamic heap, on top of `serde_json`.

use serde_json::{Map, Number};

use crate::builtins::ErrorClass;
use crate::context::Context;
use crate::error::BridgeError;
use crate::object_model::{ObjectHandle, ObjectKind, PropertyDescriptor, PropertyKey};
use crate::value::{JsValue, Value};

impl Context {
    /// Parses `text` into fresh engine values.  Malformed input throws a
    /// `SyntaxError` inside the engine and fails with `Exception`.
    pub fn parse_json(&mut self, text: &str) -> Result<Value, BridgeError> {
        let doc: serde_json::Value = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(err) => {
                return Err(self.throw_error(
                    ErrorClass::SyntaxError,
                    format!("JSON.parse: {err}"),
                ));
            }
        };
        let value = self.import_json(doc)?;
        Ok(self.wrap(value))
    }

    fn import_json(&mut self, doc: serde_json::Value) -> Result<JsValue, BridgeError> {
        Ok(match doc {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(b),
            serde_json::Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => JsValue::Str(s),
            serde_json::Value::Array(items) => {
                let elements = items
                    .into_iter()
                    .map(|item| self.import_json(item))
                    .collect::<Result<Vec<_>, _>>()?;
                self.alloc_array(elements)
            }
            serde_json::Value::Object(fields) => {
                let h = self.heap.alloc_ordinary(Some(self.realm.object_prototype));
                for (key, field) in fields {
                    let value = self.import_json(field)?;
                    self.heap
                        .define_property(h, PropertyKey::String(key), PropertyDescriptor::data(value))?;
                }
                JsValue::Object(h)
            }
        })
    }

    /// `JSON.stringify` without a replacer or indentation.
    ///
    /// Functions, symbols and `undefined` are skipped inside objects and
    /// become `null` inside arrays; at the top level they are a
    /// `TypeError`.  Cycles and bigints throw.
    pub fn to_json(&mut self, value: Value) -> Result<String, BridgeError> {
        let v = self.value(value)?;
        let mut stack = Vec::new();
        match self.export_json(&v, &mut stack)? {
            Some(doc) => serde_json::to_string(&doc)
                .map_err(|err| BridgeError::exception(format!("JSON serialization failed: {err}"))),
            None => Err(BridgeError::type_error(format!(
                "{} has no JSON representation",
                self.kind_of(&v)
            ))),
        }
    }

    fn export_json(
        &mut self,
        value: &JsValue,
        stack: &mut Vec<ObjectHandle>,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let h = match value {
            JsValue::Undefined | JsValue::Symbol(_) => return Ok(None),
            JsValue::Null => return Ok(Some(serde_json::Value::Null)),
            JsValue::Bool(b) => return Ok(Some(serde_json::Value::Bool(*b))),
            JsValue::Number(n) => return Ok(Some(json_number(*n))),
            JsValue::Str(s) => return Ok(Some(serde_json::Value::String(s.clone()))),
            JsValue::BigInt(_) => {
                return Err(self.throw_error(ErrorClass::TypeError, "cannot serialize a BigInt"));
            }
            JsValue::Object(h) => *h,
        };
        if self.is_callable_js(value) {
            return Ok(None);
        }
        if stack.contains(&h) {
            return Err(self.throw_error(
                ErrorClass::TypeError,
                "converting circular structure to JSON",
            ));
        }
        stack.push(h);
        let out = self.export_object(h, stack);
        stack.pop();
        out.map(Some)
    }

    fn export_object(
        &mut self,
        h: ObjectHandle,
        stack: &mut Vec<ObjectHandle>,
    ) -> Result<serde_json::Value, BridgeError> {
        let obj = self.heap.get(h)?;
        if let ObjectKind::Array(elements) = &obj.kind {
            let elements = elements.clone();
            let mut items = Vec::with_capacity(elements.len());
            for element in &elements {
                items.push(self.export_json(element, stack)?.unwrap_or(serde_json::Value::Null));
            }
            return Ok(serde_json::Value::Array(items));
        }
        let keys = obj.enumerable_keys();
        let mut fields = Map::new();
        for key in keys {
            let field = self.get_js(&JsValue::Object(h), &PropertyKey::String(key.clone()))?;
            if let Some(doc) = self.export_json(&field, stack)? {
                fields.insert(key, doc);
            }
        }
        Ok(serde_json::Value::Object(fields))
    }
}

/// Integral values print without a fraction, as `JSON.stringify` does;
/// non-finite values are `null`.
fn json_number(n: f64) -> serde_json::Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}
