//! Diagnostic rendering of dynamic values.
//!
//! Rendering only reads the heap; no getters or `toString` methods run, so
//! dumping never changes engine state, the pending exception included.

use std::io::Write;

use crate::builtins;
use crate::context::Context;
use crate::error::BridgeError;
use crate::object_model::{ObjectHandle, ObjectKind, PromiseState, PropertyDescriptor, PropertyKey};
use crate::value::{JsValue, Value, number_to_string};

/// Containers nested deeper than this render as `[Object]` / `[Array]`.
pub const MAX_DUMP_DEPTH: usize = 3;

impl Context {
    /// The text `dump_value` writes, without the trailing newline.
    pub fn dump_value_string(&self, value: Value) -> Result<String, BridgeError> {
        let v = self.value(value)?;
        let mut out = String::new();
        Renderer {
            ctx: self,
            seen: Vec::new(),
        }
        .render(&v, 0, &mut out);
        Ok(out)
    }

    /// Writes a one-line rendering of `value` to `out`.
    pub fn dump_value(&self, value: Value, out: &mut dyn Write) -> Result<(), BridgeError> {
        let text = self.dump_value_string(value)?;
        writeln!(out, "{text}").map_err(io_error)
    }

    /// Copies the rendering into `buf` and returns the bytes written.
    ///
    /// When the rendering does not fit, the prefix that fits is copied and
    /// the call fails with `Exception`.
    pub fn dump_value_buffer(&self, value: Value, buf: &mut [u8]) -> Result<usize, BridgeError> {
        let text = self.dump_value_string(value)?;
        let bytes = text.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        if n < bytes.len() {
            return Err(BridgeError::exception(format!(
                "dump needs {} bytes, buffer holds {}",
                bytes.len(),
                buf.len()
            )));
        }
        Ok(n)
    }

    /// Writes the pending exception, if any, without clearing it.  Returns
    /// whether there was one.
    pub fn dump_error(&self, out: &mut dyn Write) -> Result<bool, BridgeError> {
        let Some(thrown) = &self.pending_exception else {
            return Ok(false);
        };
        let mut text = String::new();
        Renderer {
            ctx: self,
            seen: Vec::new(),
        }
        .render(thrown, 0, &mut text);
        writeln!(out, "Uncaught {text}").map_err(io_error)?;
        Ok(true)
    }
}

fn io_error(err: std::io::Error) -> BridgeError {
    BridgeError::exception(format!("dump write failed: {err}"))
}

struct Renderer<'a> {
    ctx: &'a Context,
    seen: Vec<ObjectHandle>,
}

impl Renderer<'_> {
    fn render(&mut self, value: &JsValue, depth: usize, out: &mut String) {
        match value {
            JsValue::Str(s) if depth == 0 => out.push_str(s),
            JsValue::Str(s) => out.push_str(&quote(s)),
            JsValue::Undefined => out.push_str("undefined"),
            JsValue::Null => out.push_str("null"),
            JsValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            JsValue::Number(n) => out.push_str(&number_to_string(*n)),
            JsValue::BigInt(n) => out.push_str(&format!("{n}n")),
            JsValue::Symbol(id) => {
                let description = self.ctx.heap.symbol_description(*id).unwrap_or("");
                out.push_str(&format!("Symbol({description})"));
            }
            JsValue::Object(h) => self.render_object(*h, depth, out),
        }
    }

    fn render_object(&mut self, h: ObjectHandle, depth: usize, out: &mut String) {
        let Ok(obj) = self.ctx.heap.get(h) else {
            out.push_str("<dead object>");
            return;
        };
        match &obj.kind {
            ObjectKind::ExtRef(payload) => {
                out.push_str(&format!("[ExtRef {} {}]", payload.tag, payload.index));
                return;
            }
            ObjectKind::Function(f) => {
                match f.name() {
                    "" => out.push_str("[Function (anonymous)]"),
                    name => out.push_str(&format!("[Function: {name}]")),
                }
                return;
            }
            ObjectKind::Error => {
                out.push_str(&builtins::error_summary(self.ctx, h).unwrap_or_else(|| "Error".to_string()));
                return;
            }
            _ => {}
        }
        if self.seen.contains(&h) {
            out.push_str("[Circular]");
            return;
        }
        if depth > MAX_DUMP_DEPTH {
            out.push_str(if obj.is_array() { "[Array]" } else { "[Object]" });
            return;
        }
        self.seen.push(h);
        match &obj.kind {
            ObjectKind::Array(elements) => {
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(element, depth + 1, out);
                }
                out.push(']');
            }
            ObjectKind::Map(entries) => {
                out.push_str(&format!("Map({}) {{", entries.len()));
                for (i, (key, value)) in entries.iter().enumerate() {
                    out.push_str(if i > 0 { ", " } else { " " });
                    self.render(key, depth + 1, out);
                    out.push_str(" => ");
                    self.render(value, depth + 1, out);
                }
                out.push_str(if entries.is_empty() { "}" } else { " }" });
            }
            ObjectKind::Promise(state) => {
                out.push_str("Promise { ");
                match state {
                    PromiseState::Pending { .. } => out.push_str("<pending>"),
                    PromiseState::Fulfilled(v) => self.render(v, depth + 1, out),
                    PromiseState::Rejected(v) => {
                        out.push_str("<rejected> ");
                        self.render(v, depth + 1, out);
                    }
                }
                out.push_str(" }");
            }
            _ => self.render_properties(h, depth, out),
        }
        self.seen.pop();
    }

    fn render_properties(&mut self, h: ObjectHandle, depth: usize, out: &mut String) {
        let Ok(obj) = self.ctx.heap.get(h) else {
            return;
        };
        let keys = obj.enumerable_keys();
        if keys.is_empty() {
            out.push_str("{}");
            return;
        }
        out.push_str("{ ");
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&display_key(key));
            out.push_str(": ");
            match obj.own_property(&PropertyKey::from(key.as_str())) {
                Some(PropertyDescriptor::Data { value, .. }) => self.render(&value, depth + 1, out),
                Some(PropertyDescriptor::Accessor { get, set, .. }) => out.push_str(match (get, set) {
                    (Some(_), Some(_)) => "[Getter/Setter]",
                    (Some(_), None) => "[Getter]",
                    _ => "[Setter]",
                }),
                None => out.push_str("undefined"),
            }
        }
        out.push_str(" }");
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Identifier-like keys print bare, anything else quoted.
fn display_key(key: &str) -> String {
    let mut chars = key.chars();
    let identifier = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if identifier { key.to_string() } else { quote(key) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::ErrorClass;
    use crate::extref::{EnvToken, ExtRefIndex, ExtRefTag};

    #[test]
    fn primitives_render_plainly() {
        let mut ctx = Context::init().unwrap();
        let cases = [
            (ctx.new_number(3.5), "3.5"),
            (ctx.new_string("hi"), "hi"),
            (ctx.new_undefined(), "undefined"),
            (ctx.new_boolean(true), "true"),
            (ctx.new_bigint(7), "7n"),
        ];
        for (v, expected) in cases {
            assert_eq!(ctx.dump_value_string(v).unwrap(), expected);
        }
    }

    #[test]
    fn containers_render_recursively() {
        let mut ctx = Context::init().unwrap();
        let doc = ctx.parse_json(r#"{"a": [1, "x"], "b c": {}, "n": null}"#).unwrap();
        assert_eq!(
            ctx.dump_value_string(doc).unwrap(),
            r#"{ a: [1, "x"], "b c": {}, n: null }"#
        );
        let deep = ctx.parse_json("[[[[[1]]]]]").unwrap();
        assert_eq!(ctx.dump_value_string(deep).unwrap(), "[[[[[Array]]]]]");
    }

    #[test]
    fn cycles_and_special_objects() {
        let mut ctx = Context::init().unwrap();
        let obj = ctx.new_object();
        ctx.set_property(obj, "me", obj).unwrap();
        assert_eq!(ctx.dump_value_string(obj).unwrap(), "{ me: [Circular] }");

        let f = ctx.new_host_function("cb", |ctx, _this, _args| Ok(ctx.new_undefined()));
        assert_eq!(ctx.dump_value_string(f).unwrap(), "[Function: cb]");
        let e = ctx.new_extref(ExtRefIndex(2), ExtRefTag::Interface, EnvToken(0));
        assert_eq!(ctx.dump_value_string(e).unwrap(), "[ExtRef interface table[2]]");
    }

    #[test]
    fn buffer_dump_signals_truncation() {
        let mut ctx = Context::init().unwrap();
        let v = ctx.new_string("abcdef");
        let mut big = [0u8; 16];
        assert_eq!(ctx.dump_value_buffer(v, &mut big).unwrap(), 6);
        assert_eq!(&big[..6], b"abcdef");
        let mut small = [0u8; 4];
        assert!(ctx.dump_value_buffer(v, &mut small).unwrap_err().is_exception());
        assert_eq!(&small, b"abcd");
    }

    #[test]
    fn dump_error_keeps_the_exception() {
        let mut ctx = Context::init().unwrap();
        let mut out = Vec::new();
        assert!(!ctx.dump_error(&mut out).unwrap());
        assert!(out.is_empty());

        let _ = ctx.throw_error(ErrorClass::TypeError, "bad operand");
        assert!(ctx.dump_error(&mut out).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "Uncaught TypeError: bad operand\n");
        assert!(ctx.has_exception());
    }

    #[test]
    fn dump_value_writes_a_line() {
        let mut ctx = Context::init().unwrap();
        let arr = ctx.parse_json("[true, null]").unwrap();
        let mut out = Vec::new();
        ctx.dump_value(arr, &mut out).unwrap();
        assert_eq!(out, b"[true, null]\n");
    }
}
