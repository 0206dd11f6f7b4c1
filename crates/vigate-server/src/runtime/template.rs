//! File-backed engine whose methods render text templates.
//!
//! A component is a JSON file listing methods. Each method declares its
//! parameters with default values and a template whose `{Name}`
//! placeholders are replaced by parameter values when the method runs:
//!
//! ```json
//! {
//!   "methods": {
//!     "Greet": {
//!       "parameters": { "Who": "nobody" },
//!       "template": "Hello, {Who}!",
//!       "errors": [
//!         { "parameter": "Who", "equals": "teapot", "status": 418, "message": "teapot" }
//!       ],
//!       "delay_ms": 0
//!     }
//!   }
//! }
//! ```
//!
//! The rendered text is written to the `output` parameter (default
//! `Response`). When the method declares an `error_output` parameter
//! (default `Error`), every run writes a `{ success, status, message }`
//! triple to it, failing when one of the `errors` rules matches.
//!
//! Methods are not reentrant: starting a method while its previous run is
//! still in progress fails with an engine error.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use vigate_common::{GateError, Result};

use super::{ComponentHandle, DataSpace, ExecutionEngine, MethodHandle, RunCompletion};

#[derive(Debug, Deserialize)]
struct ComponentFile {
    #[serde(default)]
    methods: HashMap<String, MethodDefinition>,
}

fn default_output() -> String {
    "Response".to_string()
}

fn default_error_output() -> String {
    "Error".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct MethodDefinition {
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    template: String,
    #[serde(default = "default_output")]
    output: String,
    #[serde(default = "default_error_output")]
    error_output: String,
    #[serde(default)]
    errors: Vec<ErrorRule>,
    #[serde(default)]
    delay_ms: u64,
}

/// Fails the run with `status`/`message` when `parameter` renders as `equals`.
#[derive(Debug, Clone, Deserialize)]
struct ErrorRule {
    parameter: String,
    equals: String,
    status: u16,
    #[serde(default)]
    message: String,
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Substitutes `{Name}` placeholders in one pass over `template`.
/// Inserted values are never scanned again and unknown names stay literal.
fn render(template: &str, values: &[(String, Value)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };

        let name = &after[..close];
        match values.iter().find(|(declared, _)| declared == name) {
            Some((_, value)) if !name.contains('{') => {
                rendered.push_str(&render_value(value));
                rest = &after[close + 1..];
            }
            _ => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

impl MethodDefinition {
    fn execute(&self, data: &DataSpace) -> Result<()> {
        let values = data.snapshot();

        let rendered = render(&self.template, &values);
        data.set(&self.output, Value::String(rendered))?;

        if let Some(error_name) = data.resolve(&self.error_output) {
            let failure = self.errors.iter().find(|rule| {
                values.iter().any(|(name, value)| {
                    name.eq_ignore_ascii_case(&rule.parameter) && render_value(value) == rule.equals
                })
            });
            let triple = match failure {
                Some(rule) => json!({ "success": false, "status": rule.status, "message": rule.message }),
                None => json!({ "success": true, "status": 0, "message": "" }),
            };
            data.set(&error_name, triple)?;
        }
        Ok(())
    }
}

/// Engine that loads template components from JSON files.
#[derive(Debug, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionEngine for TemplateEngine {
    async fn load_component(&self, path: &Path) -> Result<Arc<dyn ComponentHandle>> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GateError::load(path, e))?;
        let file: ComponentFile =
            serde_json::from_str(&source).map_err(|e| GateError::load(path, e))?;

        tracing::info!(
            component = %path.display(),
            methods = file.methods.len(),
            "Template component loaded"
        );

        Ok(Arc::new(TemplateComponent {
            path: path.to_path_buf(),
            methods: file.methods,
        }))
    }
}

struct TemplateComponent {
    path: PathBuf,
    methods: HashMap<String, MethodDefinition>,
}

#[async_trait]
impl ComponentHandle for TemplateComponent {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn open_method(&self, name: &str) -> Result<Arc<dyn MethodHandle>> {
        let definition = self.methods.get(name).ok_or_else(|| {
            GateError::open(name, format!("not found in {}", self.path.display()))
        })?;
        Ok(Arc::new(TemplateMethod {
            name: name.to_string(),
            definition: Arc::new(definition.clone()),
            running: Arc::new(AtomicBool::new(false)),
            residents: AtomicUsize::new(0),
        }))
    }

    async fn close(&self) {
        tracing::debug!(component = %self.path.display(), "Template component closed");
    }
}

struct TemplateMethod {
    name: String,
    definition: Arc<MethodDefinition>,
    running: Arc<AtomicBool>,
    residents: AtomicUsize,
}

impl MethodHandle for TemplateMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_resident(&self) -> Result<DataSpace> {
        let mut parameters: Vec<(String, Value)> = self
            .definition
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !parameters.iter().any(|(name, _)| *name == self.definition.output) {
            parameters.push((self.definition.output.clone(), Value::String(String::new())));
        }

        self.residents.fetch_add(1, Ordering::SeqCst);
        Ok(DataSpace::new(parameters))
    }

    fn release_resident(&self, _data: &DataSpace) {
        let previous = self.residents.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(method = %self.name, remaining = previous.saturating_sub(1), "Resident context released");
    }

    fn start(&self, data: &DataSpace) -> Result<RunCompletion> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GateError::Engine(format!(
                "{} started while a previous run is in progress",
                self.name
            )));
        }

        let (done, completion) = oneshot::channel();
        let definition = Arc::clone(&self.definition);
        let running = Arc::clone(&self.running);
        let data = data.clone();

        tokio::spawn(async move {
            if definition.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(definition.delay_ms)).await;
            }
            let outcome = definition.execute(&data);
            running.store(false, Ordering::SeqCst);
            // The waiter may have given up after a timeout.
            let _ = done.send(outcome);
        });

        Ok(completion)
    }
}
