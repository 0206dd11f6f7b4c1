//! Conversion of result values into response bodies.

use serde_json::Value;
use vigate_common::Result;

/// Turns an execution-context value into response text.
pub trait ValueSerializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<String>;
}

/// Strings are written verbatim; everything else as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextSerializer;

impl ValueSerializer for PlainTextSerializer {
    fn serialize(&self, value: &Value) -> Result<String> {
        match value {
            Value::String(text) => Ok(text.clone()),
            other => Ok(serde_json::to_string(other)?),
        }
    }
}
