//! Calls in both directions.
//!
//! Static code calls dynamic code through [`Context::invoke`] and
//! [`Context::call_func`].  Dynamic code reaches static code only by calling
//! an ExtRefFunc value, which is routed to the one dispatcher registered on
//! the context.

use std::rc::Rc;

use crate::builtins::ErrorClass;
use crate::context::{Context, Dispatcher};
use crate::error::{BridgeError, EXCEPTION_ERROR_CODE, TYPE_ERROR_CODE};
use crate::extref::{EnvToken, ExtRefIndex, ExtRefPayload, ExtRefTag};
use crate::object_model::{FunctionKind, HeapObject, HostFn, ObjectHandle, ObjectKind, PropertyKey, PropertyLookup};
use crate::value::{JsValue, Value};

const COMPONENT: &str = "invoke";

/// What a callable object turned out to be.
enum Callee {
    Function(FunctionKind),
    Static(ExtRefPayload),
}

impl Context {
    // -- dispatcher -----------------------------------------------------------

    /// Registers the callback dispatcher.  A second registration replaces
    /// the first.
    pub fn set_callback_dispatcher<F>(&mut self, dispatcher: F)
    where
        F: Fn(&mut Context, EnvToken, ExtRefIndex, Value, &[Value]) -> Result<Value, BridgeError> + 'static,
    {
        let event = if self.dispatcher.is_some() {
            "dispatcher_replaced"
        } else {
            "dispatcher_set"
        };
        let dispatcher: Dispatcher = Rc::new(dispatcher);
        self.dispatcher = Some(dispatcher);
        self.events.pass(COMPONENT, event);
    }

    pub fn has_callback_dispatcher(&self) -> bool {
        self.dispatcher.is_some()
    }

    // -- static -> dynamic ----------------------------------------------------

    /// Looks up `name` on `this` and calls it with `this` bound.
    ///
    /// A missing or non-callable property is a `TypeError`; a throw inside
    /// the callee is an `Exception`.
    pub fn invoke(&mut self, name: &str, this: Value, args: &[Value]) -> Result<Value, BridgeError> {
        let receiver = self.value(this)?;
        if receiver.is_nullish() {
            self.events.fail(COMPONENT, "invoke", TYPE_ERROR_CODE);
            return Err(BridgeError::type_error(format!(
                "cannot invoke '{name}' on {}",
                self.kind_of(&receiver)
            )));
        }
        let method = self.get_js(&receiver, &PropertyKey::from(name))?;
        if !self.is_callable_js(&method) {
            self.events.fail(COMPONENT, "invoke", TYPE_ERROR_CODE);
            return Err(BridgeError::type_error(format!("property '{name}' is not a function")));
        }
        let args = self.values(args)?;
        self.finish_call("invoke", &method, &receiver, &args)
    }

    /// Calls `func` with `this` undefined.
    pub fn call_func(&mut self, func: Value, args: &[Value]) -> Result<Value, BridgeError> {
        let callee = self.value(func)?;
        if !self.is_callable_js(&callee) {
            self.events.fail(COMPONENT, "call_func", TYPE_ERROR_CODE);
            return Err(BridgeError::type_error(format!("{func} is not callable")));
        }
        let args = self.values(args)?;
        self.finish_call("call_func", &callee, &JsValue::Undefined, &args)
    }

    fn finish_call(
        &mut self,
        event: &str,
        func: &JsValue,
        this: &JsValue,
        args: &[JsValue],
    ) -> Result<Value, BridgeError> {
        match self.call_value(func, this, args) {
            Ok(result) => Ok(self.wrap(result)),
            Err(err) => {
                self.events.fail(COMPONENT, event, err.error_code());
                Err(err)
            }
        }
    }

    /// Wraps a host closure as a dynamic function value.
    pub fn new_host_function<F>(&mut self, name: &str, f: F) -> Value
    where
        F: Fn(&mut Context, Value, &[Value]) -> Result<Value, BridgeError> + 'static,
    {
        let h = self.alloc_host_function(name, Rc::new(f));
        self.wrap(JsValue::Object(h))
    }

    pub(crate) fn alloc_host_function(&mut self, name: &str, call: HostFn) -> ObjectHandle {
        let function = HeapObject::new(
            Some(self.realm.function_prototype),
            ObjectKind::Function(FunctionKind::Host {
                name: name.to_string(),
                call,
            }),
        );
        self.heap.alloc(function)
    }

    // -- engine-internal calls ------------------------------------------------

    pub(crate) fn is_callable_js(&self, value: &JsValue) -> bool {
        self.callee(value).is_some()
    }

    fn callee(&self, value: &JsValue) -> Option<Callee> {
        let obj = self.heap.get(value.as_object()?).ok()?;
        match &obj.kind {
            ObjectKind::Function(f) => Some(Callee::Function(f.clone())),
            ObjectKind::ExtRef(payload) if payload.tag == ExtRefTag::Function => Some(Callee::Static(*payload)),
            _ => None,
        }
    }

    /// Calls any callable engine value.  Calling a non-callable throws a
    /// `TypeError` inside the engine.
    pub(crate) fn call_value(&mut self, func: &JsValue, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let Some(callee) = self.callee(func) else {
            let kind = self.kind_of(func);
            return Err(self.throw_error(ErrorClass::TypeError, format!("{kind} is not a function")));
        };
        let roots = std::iter::once(func.clone())
            .chain(std::iter::once(this.clone()))
            .chain(args.iter().cloned());
        self.with_roots(roots, |ctx| match callee {
            Callee::Function(FunctionKind::Native { call, .. }) => call(ctx, this, args),
            Callee::Function(FunctionKind::Host { call, .. }) => ctx.call_host(&call, this, args),
            Callee::Function(FunctionKind::PromiseResolver { promise, reject }) => {
                let value = args.first().cloned().unwrap_or(JsValue::Undefined);
                if reject {
                    ctx.reject_promise(promise, value)?;
                } else {
                    ctx.resolve_promise(promise, value)?;
                }
                Ok(JsValue::Undefined)
            }
            Callee::Static(payload) => ctx.dispatch(payload, this, args),
        })
    }

    fn call_host(&mut self, call: &HostFn, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let this_handle = self.wrap(this.clone());
        let arg_handles: Vec<Value> = args.iter().map(|a| self.wrap(a.clone())).collect();
        let outcome = call(self, this_handle, &arg_handles);
        let result = outcome.and_then(|v| self.value(v));
        self.drop_transient(this_handle);
        for handle in arg_handles {
            self.drop_transient(handle);
        }
        result
    }

    fn dispatch(&mut self, payload: ExtRefPayload, this: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let Some(dispatcher) = self.dispatcher.clone() else {
            self.events.fail(COMPONENT, "dispatch", EXCEPTION_ERROR_CODE);
            return Err(self.throw_error(
                ErrorClass::Error,
                format!("no callback dispatcher registered for {}", payload.index),
            ));
        };
        let this_handle = self.wrap(this.clone());
        let arg_handles: Vec<Value> = args.iter().map(|a| self.wrap(a.clone())).collect();
        let outcome = dispatcher(self, payload.env, payload.index, this_handle, &arg_handles);
        let result = outcome.and_then(|v| self.value(v));
        self.drop_transient(this_handle);
        for handle in arg_handles {
            self.drop_transient(handle);
        }
        match result {
            Ok(v) => {
                self.events.pass(COMPONENT, "dispatch");
                Ok(v)
            }
            Err(err) => {
                self.events.fail(COMPONENT, "dispatch", err.error_code());
                if self.pending_exception.is_none() {
                    let error = self.new_error_object(ErrorClass::Error, err.message());
                    self.pending_exception = Some(JsValue::Object(error));
                }
                Err(err)
            }
        }
    }

    /// `new ctor(...args)` inside the engine.
    pub(crate) fn construct_value(&mut self, ctor: &JsValue, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let constructible = match self.callee(ctor) {
            Some(Callee::Function(FunctionKind::Native {
                construct: Some(construct),
                ..
            })) => Some(Ok(construct)),
            Some(Callee::Function(FunctionKind::Host { call, .. })) => Some(Err(call)),
            _ => None,
        };
        let (Some(h), Some(target)) = (ctor.as_object(), constructible) else {
            let kind = self.kind_of(ctor);
            return Err(self.throw_error(ErrorClass::TypeError, format!("{kind} is not a constructor")));
        };
        let proto = match self.heap.lookup(h, &PropertyKey::from("prototype")) {
            Ok(PropertyLookup::Data(JsValue::Object(p))) => p,
            Ok(_) => self.realm.object_prototype,
            Err(err) => return Err(self.throw_object_error(err)),
        };
        let this = JsValue::Object(self.heap.alloc_ordinary(Some(proto)));
        let roots = [ctor.clone(), this.clone()].into_iter().chain(args.iter().cloned());
        let result = self.with_roots(roots, |ctx| match &target {
            Ok(construct) => construct(ctx, &this, args),
            Err(call) => ctx.call_host(call, &this, args),
        })?;
        Ok(match result {
            JsValue::Object(_) => result,
            _ => this,
        })
    }
}
