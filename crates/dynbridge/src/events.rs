//! Structured event records emitted by a [`Context`](crate::Context).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// Monotonic sequence number within one context.
    pub sequence: u64,
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    trace_id: String,
    enabled: bool,
    next_sequence: u64,
    events: Vec<BridgeEvent>,
}

impl EventLog {
    pub fn new(trace_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            trace_id: trace_id.into(),
            enabled,
            next_sequence: 0,
            events: Vec::new(),
        }
    }

    pub fn pass(&mut self, component: &str, event: &str) {
        self.push(component, event, "pass", None);
    }

    pub fn fail(&mut self, component: &str, event: &str, error_code: &str) {
        self.push(component, event, "fail", Some(error_code));
    }

    /// Records an event that neither passed nor failed (a tolerated no-op).
    pub fn skip(&mut self, component: &str, event: &str) {
        self.push(component, event, "skip", None);
    }

    fn push(&mut self, component: &str, event: &str, outcome: &str, error_code: Option<&str>) {
        if !self.enabled {
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(BridgeEvent {
            sequence,
            trace_id: self.trace_id.clone(),
            component: component.to_string(),
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: error_code.map(str::to_string),
        });
    }

    pub fn events(&self) -> &[BridgeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded for `event`, in sequence order.
    pub fn named<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a BridgeEvent> + 'a {
        self.events.iter().filter(move |e| e.event == event)
    }

    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
