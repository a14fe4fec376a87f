//! One-shot inspection of a JSON document through a fresh context, as run by
//! the `dynbridge_dump` binary.

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::ContextOptions;
use crate::context::Context;
use crate::events::BridgeEvent;
use crate::value::DynKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpReport {
    pub trace_id: String,
    pub kind: DynKind,
    pub typeof_name: String,
    /// `dump_value` rendering.
    pub rendering: String,
    /// Re-serialized through the bridge.
    pub json: String,
    pub live_objects: usize,
    pub events: Vec<BridgeEvent>,
}

/// Parses `text` into a new context, renders it and tears the context down.
pub fn inspect_json(text: &str, options: ContextOptions) -> Result<DumpReport> {
    if text.trim().is_empty() {
        bail!("document is empty");
    }
    let trace_id = options.trace_id.clone();
    let mut ctx = Context::init_with_options(options).context("context init failed")?;
    let value = match ctx.parse_json(text) {
        Ok(value) => value,
        Err(err) => {
            let mut uncaught = Vec::new();
            ctx.dump_error(&mut uncaught)?;
            bail!("{} ({err})", String::from_utf8_lossy(&uncaught).trim_end());
        }
    };
    let rendering = ctx.dump_value_string(value)?;
    let json = ctx.to_json(value).context("re-serializing the document")?;
    let kind = ctx.type_of(value);
    let typeof_name = ctx.typeof_name(value).to_string();
    let live_objects = ctx.live_objects();
    let report = ctx.destroy();
    Ok(DumpReport {
        trace_id,
        kind,
        typeof_name,
        rendering,
        json,
        live_objects,
        events: report.events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspects_a_document() {
        let report = inspect_json(r#"{"k": [1, 2]}"#, ContextOptions::default()).unwrap();
        assert_eq!(report.kind, DynKind::Object);
        assert_eq!(report.typeof_name, "object");
        assert_eq!(report.rendering, "{ k: [1, 2] }");
        assert_eq!(report.json, r#"{"k":[1,2]}"#);
        assert!(report.events.iter().any(|e| e.event == "context_destroy"));
    }

    #[test]
    fn scalars_are_documents_too() {
        let report = inspect_json("\"text\"", ContextOptions::quiet()).unwrap();
        assert_eq!(report.kind, DynKind::String);
        assert_eq!(report.rendering, "text");
        assert!(report.events.is_empty());
    }

    #[test]
    fn malformed_input_reports_the_uncaught_error() {
        let err = inspect_json("[1,", ContextOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("Uncaught SyntaxError: JSON.parse"));
        assert!(inspect_json("  ", ContextOptions::default()).is_err());
    }
}
