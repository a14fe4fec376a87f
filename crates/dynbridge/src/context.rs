//! The bridge context: one dynamic engine instance plus everything the
//! bridge keeps alongside it.
//!
//! A [`Context`] owns the dynamic heap, the handle table embedders see, the
//! registered callback dispatcher, the attached static heap and the
//! microtask queue.  There is no process-wide state; every operation is a
//! method on the context.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::builtins::{self, ErrorClass, Realm};
use crate::config::ContextOptions;
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventLog};
use crate::extref::{EnvToken, ExtRefIndex, StaticHeap};
use crate::gc::{self, CollectionStats, HandleTable, Pin};
use crate::jobs::JobQueue;
use crate::object_model::{
    ClassId, HeapObject, ObjectError, ObjectHandle, ObjectHeap, ObjectKind, PropertyDescriptor,
};
use crate::shape::{ShapeClassifier, WasmGcShapes};
use crate::value::{JsValue, Value};

const COMPONENT: &str = "context";
const GC_COMPONENT: &str = "gc";

/// Engine class name reserved for external-reference carriers.
pub const EXTREF_CLASS_NAME: &str = "ExtRef";

/// The single seam through which dynamic code calls static code.
///
/// Receives the embedder environment and table index of the called
/// function, the `this` value and the arguments.
pub type Dispatcher =
    Rc<dyn Fn(&mut Context, EnvToken, ExtRefIndex, Value, &[Value]) -> Result<Value, BridgeError>>;

/// What [`Context::destroy`] leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub events: Vec<BridgeEvent>,
    /// Strings from `to_cstring` never handed back to `free_cstring`.
    pub leaked_cstrings: usize,
    /// `hold` handles never released.
    pub live_holds: usize,
}

pub struct Context {
    pub(crate) heap: ObjectHeap,
    pub(crate) handles: HandleTable,
    pub(crate) realm: Realm,
    /// Host-registered constructors, by class name.
    pub(crate) classes: BTreeMap<String, ObjectHandle>,
    pub(crate) extref_class: ClassId,
    pub(crate) undefined: Value,
    pub(crate) null: Value,
    pub(crate) dispatcher: Option<Dispatcher>,
    pub(crate) static_heap: Option<Rc<dyn StaticHeap>>,
    pub(crate) shapes: Box<dyn ShapeClassifier>,
    pub(crate) jobs: JobQueue,
    pub(crate) pending_exception: Option<JsValue>,
    /// Values in use by native frames; collection roots.
    pub(crate) stack_roots: Vec<JsValue>,
    /// Objects currently being stringified, to cut cycles.
    pub(crate) joining: Vec<ObjectHandle>,
    pub(crate) options: ContextOptions,
    pub(crate) events: EventLog,
    pub(crate) cstrings_outstanding: usize,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("trace_id", &self.options.trace_id)
            .field("live_objects", &self.heap.len())
            .field("held", &self.handles.count(Pin::Held))
            .field("pending_jobs", &self.jobs.len())
            .field("has_dispatcher", &self.dispatcher.is_some())
            .field("has_static_heap", &self.static_heap.is_some())
            .finish()
    }
}

impl Context {
    /// `context_init()`: a context with default options.
    pub fn init() -> Result<Self, BridgeError> {
        Self::init_with_options(ContextOptions::default())
    }

    pub fn init_with_options(options: ContextOptions) -> Result<Self, BridgeError> {
        if options.max_prototype_depth == 0 {
            return Err(BridgeError::type_error("max_prototype_depth must be positive"));
        }
        let mut heap = ObjectHeap::new(options.max_prototype_depth);
        let extref_class = heap.register_class(EXTREF_CLASS_NAME);
        let realm = builtins::install(&mut heap)?;
        let mut handles = HandleTable::with_capacity(options.initial_handle_capacity);
        let undefined = handles.insert(JsValue::Undefined, Pin::Permanent);
        let null = handles.insert(JsValue::Null, Pin::Permanent);
        let mut events = EventLog::new(options.trace_id.clone(), options.record_events);
        events.pass(COMPONENT, "context_init");

        Ok(Self {
            heap,
            handles,
            realm,
            classes: BTreeMap::new(),
            extref_class,
            undefined,
            null,
            dispatcher: None,
            static_heap: None,
            shapes: Box::new(WasmGcShapes),
            jobs: JobQueue::new(options.max_pending_jobs),
            pending_exception: None,
            stack_roots: Vec::new(),
            joining: Vec::new(),
            options,
            events,
            cstrings_outstanding: 0,
        })
    }

    /// `context_destroy()`: consumes the context and reports what leaked.
    pub fn destroy(mut self) -> ContextReport {
        let leaked_cstrings = self.cstrings_outstanding;
        let live_holds = self.handles.count(Pin::Held);
        if leaked_cstrings > 0 || live_holds > 0 {
            self.events.skip(COMPONENT, "context_destroy_with_leaks");
        }
        self.events.pass(COMPONENT, "context_destroy");
        ContextReport {
            events: self.events.events().to_vec(),
            leaked_cstrings,
            live_holds,
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Attaches the static heap used to resolve external references.
    pub fn set_static_heap(&mut self, heap: Rc<dyn StaticHeap>) {
        let event = if self.static_heap.is_some() {
            "static_heap_replaced"
        } else {
            "static_heap_attached"
        };
        self.static_heap = Some(heap);
        self.events.pass(COMPONENT, event);
    }

    pub fn set_shape_classifier(&mut self, shapes: impl ShapeClassifier + 'static) {
        self.shapes = Box::new(shapes);
        self.events.pass(COMPONENT, "shape_classifier_replaced");
    }

    pub fn shapes(&self) -> &dyn ShapeClassifier {
        self.shapes.as_ref()
    }

    /// Number of live objects in the dynamic heap.
    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    pub fn held_count(&self) -> usize {
        self.handles.count(Pin::Held)
    }

    /// Is `value` still a live handle?
    pub fn is_live(&self, value: Value) -> bool {
        self.handles.is_live(value)
    }

    // -- handle conversion --------------------------------------------------

    /// Hands an engine value out as a transient handle.
    pub(crate) fn wrap(&mut self, value: JsValue) -> Value {
        match value {
            JsValue::Undefined => self.undefined,
            JsValue::Null => self.null,
            other => self.handles.insert(other, Pin::Transient),
        }
    }

    pub(crate) fn peek(&self, value: Value) -> Option<&JsValue> {
        self.handles.get(value)
    }

    pub(crate) fn value(&self, value: Value) -> Result<JsValue, BridgeError> {
        self.handles
            .get(value)
            .cloned()
            .ok_or_else(|| BridgeError::exception(format!("stale value handle {value}")))
    }

    pub(crate) fn values(&self, values: &[Value]) -> Result<Vec<JsValue>, BridgeError> {
        values.iter().map(|v| self.value(*v)).collect()
    }

    /// The object a handle refers to; `TypeError` for primitives.
    pub(crate) fn object(&self, value: Value) -> Result<ObjectHandle, BridgeError> {
        self.value(value)?
            .as_object()
            .ok_or_else(|| BridgeError::type_error(format!("{value} is not an object")))
    }

    /// Frees a handle the bridge created for a native frame.  Held and
    /// permanent handles are left alone.
    pub(crate) fn drop_transient(&mut self, value: Value) {
        if self.handles.pin(value) == Some(Pin::Transient) {
            self.handles.remove(value);
        }
    }

    /// Runs `f` with `values` pinned as collection roots.
    pub(crate) fn with_roots<T>(
        &mut self,
        values: impl IntoIterator<Item = JsValue>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let base = self.stack_roots.len();
        self.stack_roots.extend(values);
        let out = f(self);
        self.stack_roots.truncate(base);
        out
    }

    // -- GC safety protocol -------------------------------------------------

    /// Returns a new handle that survives collections until released.
    pub fn hold(&mut self, value: Value) -> Result<Value, BridgeError> {
        let js = match self.value(value) {
            Ok(js) => js,
            Err(err) => {
                self.events.fail(GC_COMPONENT, "hold", err.error_code());
                return Err(err);
            }
        };
        let held = self.handles.insert(js, Pin::Held);
        self.events.pass(GC_COMPONENT, "hold");
        Ok(held)
    }

    /// Drops a held or transient handle.  Returns `false` (and logs a
    /// skipped release) for permanent or already-stale handles.
    pub fn release(&mut self, value: Value) -> bool {
        match self.handles.pin(value) {
            Some(Pin::Permanent) => {
                self.events.skip(GC_COMPONENT, "release_permanent");
                false
            }
            None => {
                self.events.skip(GC_COMPONENT, "release_stale");
                false
            }
            Some(_) => {
                self.handles.remove(value);
                self.events.pass(GC_COMPONENT, "release");
                true
            }
        }
    }

    /// Runs a full collection now.  Every transient handle is invalidated.
    pub fn collect(&mut self) -> CollectionStats {
        let handles_dropped = self.handles.drop_transients() as u64;

        let mut roots = self.realm.roots();
        roots.extend(self.classes.values().copied());
        roots.extend(
            self.handles
                .live_values()
                .chain(self.stack_roots.iter())
                .chain(self.pending_exception.iter())
                .filter_map(JsValue::as_object),
        );
        self.jobs.trace(&mut roots);

        let (marked_count, swept_count) = gc::mark_and_sweep(&mut self.heap, roots);
        self.events.pass(GC_COMPONENT, "collect");
        CollectionStats {
            marked_count,
            swept_count,
            handles_dropped,
        }
    }

    // -- exceptions ---------------------------------------------------------

    /// Records `thrown` as the pending exception.
    pub(crate) fn raise(&mut self, thrown: JsValue, message: String) -> BridgeError {
        self.pending_exception = Some(thrown);
        BridgeError::exception(message)
    }

    pub(crate) fn new_error_object(&mut self, class: ErrorClass, message: &str) -> ObjectHandle {
        let mut obj = HeapObject::new(Some(self.realm.error_prototype(class)), ObjectKind::Error);
        obj.properties.insert(
            "message".into(),
            PropertyDescriptor::hidden(JsValue::Str(message.to_string())),
        );
        self.heap.alloc(obj)
    }

    /// Throws a fresh error object of `class` inside the engine.
    pub fn throw_error(&mut self, class: ErrorClass, message: impl AsRef<str>) -> BridgeError {
        let message = message.as_ref();
        let error = self.new_error_object(class, message);
        self.raise(JsValue::Object(error), format!("{}: {message}", class.name()))
    }

    /// Throws `value` as-is.  The returned error is meant to be propagated.
    pub fn throw_exception(&mut self, value: Value) -> BridgeError {
        match self.value(value) {
            Ok(js) => {
                let message = self.describe_thrown(&js);
                self.raise(js, message)
            }
            Err(err) => err,
        }
    }

    pub fn has_exception(&self) -> bool {
        self.pending_exception.is_some()
    }

    /// Clears and returns the pending exception.
    pub fn take_exception(&mut self) -> Option<Value> {
        let thrown = self.pending_exception.take()?;
        Some(self.wrap(thrown))
    }

    /// The engine value behind a failure: the pending exception if there
    /// is one, otherwise a new `Error` carrying the message.
    pub(crate) fn exception_value(&mut self, err: &BridgeError) -> JsValue {
        match self.pending_exception.take() {
            Some(thrown) => thrown,
            None => JsValue::Object(self.new_error_object(ErrorClass::Error, err.message())),
        }
    }

    /// Turns an object-model failure into a thrown engine error.
    pub(crate) fn throw_object_error(&mut self, err: ObjectError) -> BridgeError {
        match err {
            ObjectError::TypeError(msg) => self.throw_error(ErrorClass::TypeError, msg),
            ObjectError::ArrayLengthTooLarge { requested, max } => self.throw_error(
                ErrorClass::RangeError,
                format!("array length {requested} exceeds max {max}"),
            ),
            ObjectError::PrototypeCycleDetected => {
                self.throw_error(ErrorClass::TypeError, "cyclic prototype chain")
            }
            ObjectError::PrototypeChainTooDeep { depth, max } => self.throw_error(
                ErrorClass::RangeError,
                format!("prototype chain depth {depth} exceeds max {max}"),
            ),
            err @ ObjectError::ObjectNotFound(_) => err.into(),
        }
    }

    fn describe_thrown(&self, thrown: &JsValue) -> String {
        match thrown {
            JsValue::Object(h) => match self.heap.get(*h) {
                Ok(obj) if matches!(obj.kind, ObjectKind::Error) => {
                    builtins::error_summary(self, *h).unwrap_or_else(|| "Error".to_string())
                }
                _ => "uncaught object".to_string(),
            },
            JsValue::Str(s) => s.clone(),
            other => format!("uncaught {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DynKind;

    #[test]
    fn init_records_event_and_singletons() {
        let ctx = Context::init().unwrap();
        assert_eq!(ctx.events().named("context_init").count(), 1);
        assert_eq!(ctx.peek(ctx.undefined), Some(&JsValue::Undefined));
        assert_eq!(ctx.peek(ctx.null), Some(&JsValue::Null));
        assert_eq!(ctx.heap.class_name(ctx.extref_class), Some(EXTREF_CLASS_NAME));
    }

    #[test]
    fn zero_prototype_depth_is_rejected() {
        let opts = ContextOptions {
            max_prototype_depth: 0,
            ..ContextOptions::default()
        };
        assert!(Context::init_with_options(opts).unwrap_err().is_type_error());
    }

    #[test]
    fn undefined_and_null_are_cached() {
        let mut ctx = Context::init().unwrap();
        assert_eq!(ctx.wrap(JsValue::Undefined), ctx.undefined);
        assert_eq!(ctx.wrap(JsValue::Null), ctx.null);
        ctx.collect();
        assert!(ctx.is_live(ctx.undefined));
    }

    #[test]
    fn release_of_permanent_handle_is_a_logged_noop() {
        let mut ctx = Context::init().unwrap();
        let undefined = ctx.new_undefined();
        assert!(!ctx.release(undefined));
        assert!(ctx.is_live(undefined));
        assert_eq!(ctx.events().named("release_permanent").count(), 1);
    }

    #[test]
    fn hold_survives_collect_and_release_invalidates() {
        let mut ctx = Context::init().unwrap();
        let obj = ctx.new_object();
        let held = ctx.hold(obj).unwrap();
        let stats = ctx.collect();
        assert!(stats.handles_dropped >= 1);
        assert!(!ctx.is_live(obj));
        assert_eq!(ctx.type_of(held), DynKind::Object);

        assert!(ctx.release(held));
        assert!(!ctx.release(held));
        assert_eq!(ctx.type_of(held), DynKind::Unknown);
        assert_eq!(ctx.events().named("release_stale").count(), 1);
    }

    #[test]
    fn collect_reclaims_unreferenced_objects() {
        let mut ctx = Context::init().unwrap();
        let baseline = {
            ctx.collect();
            ctx.live_objects()
        };
        for _ in 0..10 {
            ctx.new_object();
        }
        assert_eq!(ctx.live_objects(), baseline + 10);
        let stats = ctx.collect();
        assert_eq!(stats.swept_count, 10);
        assert_eq!(ctx.live_objects(), baseline);
    }

    #[test]
    fn thrown_errors_become_pending() {
        let mut ctx = Context::init().unwrap();
        let err = ctx.throw_error(ErrorClass::RangeError, "too far");
        assert!(err.is_exception());
        assert_eq!(err.message(), "RangeError: too far");
        assert!(ctx.has_exception());
        let thrown = ctx.take_exception().unwrap();
        assert!(!ctx.has_exception());
        assert_eq!(ctx.to_display_string(thrown).unwrap(), "RangeError: too far");
    }

    #[test]
    fn destroy_reports_leaks() {
        let mut ctx = Context::init().unwrap();
        let n = ctx.new_number(1.0);
        let _held = ctx.hold(n).unwrap();
        let _s = ctx.to_cstring(n).unwrap();
        let report = ctx.destroy();
        assert_eq!(report.live_holds, 1);
        assert_eq!(report.leaked_cstrings, 1);
        assert_eq!(report.events.last().map(|e| e.event.as_str()), Some("context_destroy"));
    }
}
