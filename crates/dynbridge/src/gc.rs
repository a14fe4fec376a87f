//! Handle table and mark-sweep collector for the dynamic heap.
//!
//! Embedders see dynamic values only through generation-checked [`Value`]
//! handles.  Every handle is a root while it lives.  A collection first drops
//! transient handles, then marks from the remaining handles plus the
//! context's own roots and sweeps whatever was not reached.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::{
    FunctionKind, HeapObject, ObjectHandle, ObjectHeap, ObjectKind, PromiseState, PropertyDescriptor,
};
use crate::value::{JsValue, Value};

// ---------------------------------------------------------------------------
// Pin — how strongly a handle holds its value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pin {
    /// Cached singletons; never released.
    Permanent,
    /// Returned by `hold`; survives collections until released.
    Held,
    /// Returned by every other operation; dropped at the next collection.
    Transient,
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Permanent => "permanent",
            Self::Held => "held",
            Self::Transient => "transient",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// HandleTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct HandleSlot {
    generation: u32,
    entry: Option<(JsValue, Pin)>,
}

#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    slots: Vec<HandleSlot>,
    free: Vec<u32>,
}

impl HandleTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: JsValue, pin: Pin) -> Value {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.entry = Some((value, pin));
            return Value::new(slot, entry.generation);
        }
        self.slots.push(HandleSlot {
            generation: 0,
            entry: Some((value, pin)),
        });
        Value::new((self.slots.len() - 1) as u32, 0)
    }

    fn slot(&self, handle: Value) -> Option<&(JsValue, Pin)> {
        self.slots
            .get(handle.slot() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.entry.as_ref())
    }

    pub fn get(&self, handle: Value) -> Option<&JsValue> {
        self.slot(handle).map(|(v, _)| v)
    }

    pub fn pin(&self, handle: Value) -> Option<Pin> {
        self.slot(handle).map(|(_, p)| *p)
    }

    pub fn is_live(&self, handle: Value) -> bool {
        self.slot(handle).is_some()
    }

    /// Frees the slot and bumps its generation so stale copies stop
    /// resolving.
    pub fn remove(&mut self, handle: Value) -> Option<(JsValue, Pin)> {
        let index = handle.slot() as usize;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot());
        Some(entry)
    }

    /// Drops every transient handle; returns how many were dropped.
    pub fn drop_transients(&mut self) -> usize {
        let mut dropped = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if matches!(slot.entry, Some((_, Pin::Transient))) {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                dropped += 1;
            }
        }
        dropped
    }

    pub fn count(&self, pin: Pin) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.entry, Some((_, p)) if p == pin))
            .count()
    }

    pub fn live_values(&self) -> impl Iterator<Item = &JsValue> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref().map(|(v, _)| v))
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Statistics from a single collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub marked_count: u64,
    pub swept_count: u64,
    /// Transient handles invalidated before marking.
    pub handles_dropped: u64,
}

/// Objects directly referenced by `obj`.
pub(crate) fn trace_children(obj: &HeapObject, out: &mut Vec<ObjectHandle>) {
    fn push_value(value: &JsValue, out: &mut Vec<ObjectHandle>) {
        if let JsValue::Object(h) = value {
            out.push(*h);
        }
    }

    out.extend(obj.prototype);
    for desc in obj.properties.values() {
        match desc {
            PropertyDescriptor::Data { value, .. } => push_value(value, out),
            PropertyDescriptor::Accessor { get, set, .. } => {
                out.extend(*get);
                out.extend(*set);
            }
        }
    }
    match &obj.kind {
        ObjectKind::Array(elements) => elements.iter().for_each(|v| push_value(v, out)),
        ObjectKind::Map(entries) => {
            for (k, v) in entries {
                push_value(k, out);
                push_value(v, out);
            }
        }
        ObjectKind::Promise(state) => match state {
            PromiseState::Pending { reactions } => {
                for reaction in reactions {
                    push_value(&reaction.on_fulfilled, out);
                    push_value(&reaction.on_rejected, out);
                    out.extend(reaction.derived);
                }
            }
            PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => push_value(v, out),
        },
        ObjectKind::Function(FunctionKind::PromiseResolver { promise, .. }) => out.push(*promise),
        ObjectKind::Ordinary | ObjectKind::Function(_) | ObjectKind::Error | ObjectKind::ExtRef(_) => {}
    }
}

/// Marks everything reachable from `roots` and frees the rest.
///
/// Dangling root handles are ignored.
pub(crate) fn mark_and_sweep(heap: &mut ObjectHeap, roots: Vec<ObjectHandle>) -> (u64, u64) {
    let mut marked: BTreeSet<ObjectHandle> = BTreeSet::new();
    let mut work_stack = roots;
    let mut children = Vec::new();

    while let Some(handle) = work_stack.pop() {
        if marked.contains(&handle) {
            continue;
        }
        let Ok(obj) = heap.get(handle) else {
            continue;
        };
        marked.insert(handle);
        children.clear();
        trace_children(obj, &mut children);
        work_stack.extend(children.iter().filter(|c| !marked.contains(*c)));
    }

    let garbage: Vec<ObjectHandle> = heap.handles().filter(|h| !marked.contains(h)).collect();
    let mut swept = 0;
    for handle in garbage {
        if heap.free(handle) {
            swept += 1;
        }
    }
    (marked.len() as u64, swept)
}
