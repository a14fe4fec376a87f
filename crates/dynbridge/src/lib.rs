#![forbid(unsafe_code)]

//! Dynamic-value interop between a statically typed GC heap and a dynamic
//! object heap.
//!
//! A [`Context`] owns the dynamic heap.  Static code reaches dynamic values
//! through [`Value`] handles, and dynamic code reaches static objects
//! through external references resolved by a [`StaticHeap`].

pub mod access;
pub mod builtins;
pub mod coerce;
pub mod compare;
pub mod config;
pub mod construct;
pub mod context;
pub mod diagnostics;
pub mod dump;
pub mod error;
pub mod events;
pub mod extref;
pub mod gc;
pub mod invoke;
pub mod jobs;
pub mod json;
pub mod marshal;
pub mod object_model;
pub mod shape;
pub mod static_heap;
pub mod value;

pub use builtins::ErrorClass;
pub use coerce::BridgeString;
pub use compare::{CmpOperator, CmpRoute};
pub use config::ContextOptions;
pub use context::{Context, ContextReport, Dispatcher};
pub use diagnostics::{DumpReport, inspect_json};
pub use error::{BridgeError, Status};
pub use events::{BridgeEvent, EventLog};
pub use extref::{EnvToken, ExtRefIndex, ExtRefTag, StaticHeap, StaticRef};
pub use gc::{CollectionStats, Pin};
pub use jobs::PromiseStatus;
pub use marshal::{StaticType, StaticValue};
pub use shape::{ShapeClassifier, ShapeKind, StructShape, WasmGcShapes};
pub use static_heap::{FieldValue, StructHeap, TypeId};
pub use value::{DynKind, Value};
