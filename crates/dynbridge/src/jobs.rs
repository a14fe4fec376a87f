//! Microtask queue and promise settlement.
//!
//! Jobs run only when the embedder calls
//! [`Context::execute_pending_jobs`], one job per call.  Promise reactions
//! are queued here when a promise settles.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::builtins::ErrorClass;
use crate::context::Context;
use crate::error::{BridgeError, EXCEPTION_ERROR_CODE, TYPE_ERROR_CODE};
use crate::object_model::{FunctionKind, HeapObject, ObjectHandle, ObjectKind, PromiseReaction, PromiseState};
use crate::value::{JsValue, Value};

const COMPONENT: &str = "jobs";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Job {
    /// `enqueue_job`: call `func` with `this` undefined.
    Call { func: JsValue, args: Vec<JsValue> },
    /// A promise handler run with the settled value.  A non-callable
    /// handler passes the value straight through to `derived`.
    Reaction {
        handler: JsValue,
        argument: JsValue,
        derived: Option<ObjectHandle>,
        rejected: bool,
    },
}

impl Job {
    fn trace(&self, out: &mut Vec<ObjectHandle>) {
        match self {
            Self::Call { func, args } => {
                out.extend(func.as_object());
                out.extend(args.iter().filter_map(JsValue::as_object));
            }
            Self::Reaction {
                handler,
                argument,
                derived,
                ..
            } => {
                out.extend(handler.as_object());
                out.extend(argument.as_object());
                out.extend(*derived);
            }
        }
    }

    fn roots(&self) -> Vec<JsValue> {
        let mut out = Vec::new();
        match self {
            Self::Call { func, args } => {
                out.push(func.clone());
                out.extend(args.iter().cloned());
            }
            Self::Reaction {
                handler,
                argument,
                derived,
                ..
            } => {
                out.push(handler.clone());
                out.push(argument.clone());
                out.extend(derived.map(JsValue::Object));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct JobQueue {
    queue: VecDeque<Job>,
    limit: usize,
    running: bool,
}

impl JobQueue {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            limit,
            running: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn trace(&self, out: &mut Vec<ObjectHandle>) {
        for job in &self.queue {
            job.trace(out);
        }
    }
}

/// Settlement of a promise as seen from outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromiseStatus {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl Context {
    // -- queue ----------------------------------------------------------------

    /// Queues a call of `func` with `args`, run by a later
    /// [`execute_pending_jobs`](Self::execute_pending_jobs).
    pub fn enqueue_job(&mut self, func: Value, args: &[Value]) -> Result<(), BridgeError> {
        let func = self.value(func)?;
        if !self.is_callable_js(&func) {
            self.events.fail(COMPONENT, "enqueue_job", TYPE_ERROR_CODE);
            return Err(BridgeError::type_error("enqueue_job: job is not callable"));
        }
        let args = self.values(args)?;
        self.push_job(Job::Call { func, args })
    }

    pub(crate) fn push_job(&mut self, job: Job) -> Result<(), BridgeError> {
        if self.jobs.queue.len() >= self.jobs.limit {
            self.events.fail(COMPONENT, "enqueue_job", EXCEPTION_ERROR_CODE);
            let limit = self.jobs.limit;
            return Err(self.throw_error(
                ErrorClass::RangeError,
                format!("pending job limit of {limit} reached"),
            ));
        }
        self.jobs.queue.push_back(job);
        Ok(())
    }

    pub fn pending_job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.queue.is_empty()
    }

    /// Runs the oldest pending job.  `Ok(false)` when the queue was empty;
    /// an error when the job threw or when called from inside a job.
    pub fn execute_pending_jobs(&mut self) -> Result<bool, BridgeError> {
        if self.jobs.running {
            self.events.fail(COMPONENT, "execute_pending_jobs_reentrant", EXCEPTION_ERROR_CODE);
            return Err(BridgeError::exception("execute_pending_jobs called from inside a job"));
        }
        let Some(job) = self.jobs.queue.pop_front() else {
            return Ok(false);
        };
        self.jobs.running = true;
        let roots = job.roots();
        let outcome = self.with_roots(roots, |ctx| ctx.run_job(job));
        self.jobs.running = false;
        match outcome {
            Ok(()) => {
                self.events.pass(COMPONENT, "job_run");
                Ok(true)
            }
            Err(err) => {
                self.events.fail(COMPONENT, "job_run", err.error_code());
                Err(err)
            }
        }
    }

    fn run_job(&mut self, job: Job) -> Result<(), BridgeError> {
        match job {
            Job::Call { func, args } => self.call_value(&func, &JsValue::Undefined, &args).map(|_| ()),
            Job::Reaction {
                handler,
                argument,
                derived,
                rejected,
            } => {
                if !self.is_callable_js(&handler) {
                    return match (derived, rejected) {
                        (Some(d), false) => self.resolve_promise(d, argument),
                        (Some(d), true) => self.reject_promise(d, argument),
                        (None, _) => Ok(()),
                    };
                }
                match self.call_value(&handler, &JsValue::Undefined, &[argument]) {
                    Ok(result) => match derived {
                        Some(d) => self.resolve_promise(d, result),
                        None => Ok(()),
                    },
                    Err(err) => match derived {
                        Some(d) => {
                            let reason = self.exception_value(&err);
                            self.reject_promise(d, reason)
                        }
                        None => Err(err),
                    },
                }
            }
        }
    }

    // -- promises -------------------------------------------------------------

    pub(crate) fn alloc_promise(&mut self, proto: ObjectHandle) -> ObjectHandle {
        self.heap.alloc(HeapObject::new(
            Some(proto),
            ObjectKind::Promise(PromiseState::Pending { reactions: Vec::new() }),
        ))
    }

    /// One half of the resolving-function pair handed to an executor.
    pub(crate) fn alloc_resolver(&mut self, promise: ObjectHandle, reject: bool) -> JsValue {
        let f = self.heap.alloc(HeapObject::new(
            Some(self.realm.function_prototype),
            ObjectKind::Function(FunctionKind::PromiseResolver { promise, reject }),
        ));
        JsValue::Object(f)
    }

    fn is_promise(&self, h: ObjectHandle) -> bool {
        matches!(self.heap.get(h).map(|o| &o.kind), Ok(ObjectKind::Promise(_)))
    }

    /// Resolves `promise` with `value`, adopting the state of `value` when
    /// it is itself a promise.
    pub(crate) fn resolve_promise(&mut self, promise: ObjectHandle, value: JsValue) -> Result<(), BridgeError> {
        match value.as_object() {
            Some(h) if h == promise => {
                let error = self.new_error_object(ErrorClass::TypeError, "promise resolved with itself");
                self.settle(promise, PromiseState::Rejected(JsValue::Object(error)))
            }
            Some(h) if self.is_promise(h) => {
                self.perform_then(h, JsValue::Undefined, JsValue::Undefined, Some(promise))
            }
            _ => self.settle(promise, PromiseState::Fulfilled(value)),
        }
    }

    pub(crate) fn reject_promise(&mut self, promise: ObjectHandle, reason: JsValue) -> Result<(), BridgeError> {
        self.settle(promise, PromiseState::Rejected(reason))
    }

    /// Moves a pending promise to `state` and queues its reactions.
    /// Already-settled promises are left alone.
    fn settle(&mut self, promise: ObjectHandle, state: PromiseState) -> Result<(), BridgeError> {
        let ObjectKind::Promise(current) = &mut self.heap.get_mut(promise)?.kind else {
            return Err(BridgeError::type_error(format!("{promise} is not a promise")));
        };
        if !matches!(current, PromiseState::Pending { .. }) {
            return Ok(());
        }
        let previous = std::mem::replace(current, state.clone());
        let PromiseState::Pending { reactions } = previous else {
            return Ok(());
        };
        for reaction in reactions {
            self.push_job(reaction_job(reaction, &state))?;
        }
        Ok(())
    }

    /// Registers handlers on `promise`; queues them at once if it has
    /// already settled.
    pub(crate) fn perform_then(
        &mut self,
        promise: ObjectHandle,
        on_fulfilled: JsValue,
        on_rejected: JsValue,
        derived: Option<ObjectHandle>,
    ) -> Result<(), BridgeError> {
        let reaction = PromiseReaction {
            on_fulfilled,
            on_rejected,
            derived,
        };
        let ObjectKind::Promise(state) = &mut self.heap.get_mut(promise)?.kind else {
            return Err(BridgeError::type_error(format!("{promise} is not a promise")));
        };
        match state {
            PromiseState::Pending { reactions } => {
                reactions.push(reaction);
                Ok(())
            }
            settled => {
                let job = reaction_job(reaction, settled);
                self.push_job(job)
            }
        }
    }

    /// Current state of a promise value; `TypeError` for anything else.
    pub fn promise_state(&mut self, value: Value) -> Result<PromiseStatus, BridgeError> {
        let h = self.object(value)?;
        let state = match &self.heap.get(h)?.kind {
            ObjectKind::Promise(state) => state.clone(),
            _ => return Err(BridgeError::type_error(format!("{value} is not a promise"))),
        };
        Ok(match state {
            PromiseState::Pending { .. } => PromiseStatus::Pending,
            PromiseState::Fulfilled(v) => PromiseStatus::Fulfilled(self.wrap(v)),
            PromiseState::Rejected(v) => PromiseStatus::Rejected(self.wrap(v)),
        })
    }
}

fn reaction_job(reaction: PromiseReaction, state: &PromiseState) -> Job {
    let (handler, argument, rejected) = match state {
        PromiseState::Rejected(reason) => (reaction.on_rejected, reason.clone(), true),
        PromiseState::Fulfilled(value) => (reaction.on_fulfilled, value.clone(), false),
        PromiseState::Pending { .. } => (reaction.on_fulfilled, JsValue::Undefined, false),
    };
    Job::Reaction {
        handler,
        argument,
        derived: reaction.derived,
        rejected,
    }
}
