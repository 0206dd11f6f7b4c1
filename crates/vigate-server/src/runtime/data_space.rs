//! Execution context backing one opened method.
//!
//! A [`DataSpace`] holds the named parameters of a method together with
//! their current values. It is shared between the gate that owns the
//! resident lease and the engine that runs the method, so clones refer to
//! the same storage.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vigate_common::{GateError, Result};

#[derive(Debug)]
struct Parameter {
    name: String,
    value: Value,
}

/// Shared, ordered parameter store for one method.
#[derive(Debug, Clone, Default)]
pub struct DataSpace {
    parameters: Arc<Mutex<Vec<Parameter>>>,
}

impl DataSpace {
    /// Creates a data space with the given parameters in declaration order.
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let parameters = parameters
            .into_iter()
            .map(|(name, value)| Parameter {
                name: name.into(),
                value,
            })
            .collect();
        Self {
            parameters: Arc::new(Mutex::new(parameters)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Parameter>> {
        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Declared parameter names in declaration order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.lock().iter().map(|p| p.name.clone()).collect()
    }

    /// Returns the declared (correctly cased) name matching `name`
    /// case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.name.clone())
    }

    /// Current value of the parameter named exactly `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.clone())
    }

    /// Replaces the value of an existing parameter.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut parameters = self.lock();
        let parameter = parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| GateError::UnknownParameter(name.to_string()))?;
        parameter.value = value;
        Ok(())
    }

    /// Writes `text` into a parameter, converting it to the type the
    /// parameter currently holds.
    pub fn assign_text(&self, name: &str, text: &str) -> Result<()> {
        let mut parameters = self.lock();
        let parameter = parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| GateError::UnknownParameter(name.to_string()))?;
        parameter.value = coerce(&parameter.name, &parameter.value, text)?;
        Ok(())
    }

    /// Copy of every parameter and its value.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.lock()
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

fn coerce(name: &str, current: &Value, text: &str) -> Result<Value> {
    let rejected = |reason: &str| GateError::Coercion {
        parameter: name.to_string(),
        value: text.to_string(),
        reason: reason.to_string(),
    };

    match current {
        Value::Null | Value::String(_) => Ok(Value::String(text.to_string())),
        Value::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(rejected("expected a boolean")),
        },
        Value::Number(_) => {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Value::from(int));
            }
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| rejected("expected a number"))
        }
        Value::Array(_) | Value::Object(_) => {
            serde_json::from_str(text).map_err(|e| rejected(&e.to_string()))
        }
    }
}
