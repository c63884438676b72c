//! Terminal rendering. Strings print as-is; structures print as pretty JSON.

use analyst_session::{InboundMessage, ViewResponse};
use serde_json::Value;

pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub(crate) fn render_message(message: InboundMessage) -> String {
    match message.into_value() {
        Value::String(text) => text,
        other => render_value(&other),
    }
}

/// The latest value of each field the view shows, in the view's order.
/// Single-field views print the bare value.
pub(crate) fn render_response(response: &ViewResponse) -> String {
    let fields = response.view.profile().fields;
    if let [only] = fields {
        return response
            .field(only.name)
            .map(|v| format!("{}\n", render_value(v)))
            .unwrap_or_default();
    }

    let mut out = String::new();
    for spec in fields {
        if let Some(value) = response.field(spec.name) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n{}\n", spec.name, render_value(value)));
        }
    }
    out
}
