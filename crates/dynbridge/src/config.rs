//! Options accepted by [`Context::init_with_options`](crate::Context::init_with_options).

use serde::{Deserialize, Serialize};

pub const DEFAULT_TRACE_ID: &str = "dynbridge";
pub const DEFAULT_MAX_PENDING_JOBS: usize = 4096;
pub const DEFAULT_HANDLE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_PROTOTYPE_DEPTH: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Correlation id stamped on every recorded event.
    pub trace_id: String,
    pub record_events: bool,
    /// Upper bound on queued microtasks; enqueueing past it is an exception.
    pub max_pending_jobs: usize,
    pub initial_handle_capacity: usize,
    /// Prototype walks longer than this fail instead of looping.
    pub max_prototype_depth: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            trace_id: DEFAULT_TRACE_ID.to_string(),
            record_events: true,
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
            initial_handle_capacity: DEFAULT_HANDLE_CAPACITY,
            max_prototype_depth: DEFAULT_MAX_PROTOTYPE_DEPTH,
        }
    }
}

impl ContextOptions {
    /// Loads options from JSON; absent fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Options with event recording switched off.
    pub fn quiet() -> Self {
        Self {
            record_events: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let opts = ContextOptions::from_json_str(r#"{"max_pending_jobs": 3}"#).unwrap();
        assert_eq!(opts.max_pending_jobs, 3);
        assert_eq!(opts.trace_id, DEFAULT_TRACE_ID);
        assert!(opts.record_events);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ContextOptions::from_json_str("{max_pending_jobs").is_err());
    }

    #[test]
    fn quiet_disables_events() {
        let opts = ContextOptions::quiet().with_trace_id("t-1");
        assert!(!opts.record_events);
        assert_eq!(opts.trace_id, "t-1");
    }
}
