//! State container and reducer library.
//!
//! Session state is a JSON object whose fields each carry a declared merge policy. Tasks
//! never mutate state; they return partial updates, and [`StateSchema::apply`] folds an
//! update into the current state field by field:
//!
//! - **replace**: last write wins (round counters, the final verdict),
//! - **append**: new elements concatenate onto the existing sequence,
//! - **append-distinct-by-id**: like append, but an element whose id matches an
//!   existing one replaces it *in place*, which makes re-applying a step's output after
//!   a crash idempotent.
//!
//! The schema is closed: an update naming an undeclared field is rejected with
//! [`GraphError::MalformedUpdate`], as is any element that fails its field's validator.
//! `apply` is pure: it builds a new state value and leaves the input untouched, so a
//! failed merge provably changes nothing.

use crate::error::{GraphError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Merge rule for a single state field.
///
/// Implementations must be pure: same inputs, same output, no side effects.
pub trait Reducer: Send + Sync {
    /// Combine `update` into `current`, producing the field's next value.
    /// `field` is provided for error context only.
    fn apply(&self, field: &str, current: &Value, update: &Value) -> Result<Value>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
}

/// Validation hook run against the incoming update value for a field, before any merge.
pub type ValidatorFn = Arc<dyn Fn(&str, &Value) -> Result<()> + Send + Sync>;

/// Last write wins.
pub fn replace() -> Arc<dyn Reducer> {
    Arc::new(ReplaceReducer)
}

/// Concatenate onto the existing sequence (a scalar update appends one element).
pub fn append() -> Arc<dyn Reducer> {
    Arc::new(AppendReducer)
}

/// Append, but an incoming element whose `id_field` matches an existing element
/// replaces that element in place instead of duplicating it.
pub fn append_distinct_by(id_field: impl Into<String>) -> Arc<dyn Reducer> {
    Arc::new(AppendDistinctReducer {
        id_field: id_field.into(),
    })
}

struct ReplaceReducer;

impl Reducer for ReplaceReducer {
    fn apply(&self, _field: &str, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "replace"
    }
}

struct AppendReducer;

impl Reducer for AppendReducer {
    fn apply(&self, field: &str, current: &Value, update: &Value) -> Result<Value> {
        let mut items = existing_sequence(field, current)?;
        match update {
            Value::Array(new_items) => items.extend(new_items.iter().cloned()),
            other => items.push(other.clone()),
        }
        Ok(Value::Array(items))
    }

    fn name(&self) -> &str {
        "append"
    }
}

struct AppendDistinctReducer {
    id_field: String,
}

impl Reducer for AppendDistinctReducer {
    fn apply(&self, field: &str, current: &Value, update: &Value) -> Result<Value> {
        let mut items = existing_sequence(field, current)?;
        let incoming: Vec<&Value> = match update {
            Value::Array(new_items) => new_items.iter().collect(),
            other => vec![other],
        };

        for element in incoming {
            let id = element
                .get(&self.id_field)
                .filter(|id| !id.is_null())
                .ok_or_else(|| {
                    GraphError::malformed_update(
                        field,
                        format!("element is missing its '{}' id", self.id_field),
                    )
                })?;
            match items
                .iter_mut()
                .find(|existing| existing.get(&self.id_field) == Some(id))
            {
                Some(slot) => *slot = element.clone(),
                None => items.push(element.clone()),
            }
        }
        Ok(Value::Array(items))
    }

    fn name(&self) -> &str {
        "append_distinct"
    }
}

fn existing_sequence(field: &str, current: &Value) -> Result<Vec<Value>> {
    match current {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        other => Err(GraphError::malformed_update(
            field,
            format!("cannot append to existing {} value", json_type(other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct FieldSpec {
    reducer: Arc<dyn Reducer>,
    validator: Option<ValidatorFn>,
}

/// Declares every state field together with its reducer and optional validator.
///
/// Built once per workflow and shared by the engine. Applying an update touches only
/// the fields the update names; every other field passes through unchanged.
#[derive(Default)]
pub struct StateSchema {
    fields: HashMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with its merge policy.
    pub fn field(mut self, name: impl Into<String>, reducer: Arc<dyn Reducer>) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                reducer,
                validator: None,
            },
        );
        self
    }

    /// Declare a field with a merge policy and a shape validator for incoming updates.
    pub fn validated_field(
        mut self,
        name: impl Into<String>,
        reducer: Arc<dyn Reducer>,
        validator: ValidatorFn,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                reducer,
                validator: Some(validator),
            },
        );
        self
    }

    /// Whether `field` is declared.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared field names, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Merge a partial update into `current`, producing the next state.
    ///
    /// Fails with [`GraphError::MalformedUpdate`] if the update names an undeclared
    /// field or an element fails validation; `current` is never modified.
    pub fn apply(&self, current: &Value, update: &Value) -> Result<Value> {
        let update_fields = update.as_object().ok_or_else(|| {
            GraphError::malformed_update("update", "partial update must be a JSON object")
        })?;
        let mut merged = current
            .as_object()
            .ok_or_else(|| {
                GraphError::malformed_update("state", "current state must be a JSON object")
            })?
            .clone();

        for (name, incoming) in update_fields {
            let spec = self.fields.get(name).ok_or_else(|| {
                GraphError::malformed_update(name, "field is not declared in the state schema")
            })?;
            if let Some(validator) = &spec.validator {
                validator(name, incoming)?;
            }
            let existing = merged.get(name).cloned().unwrap_or(Value::Null);
            let next = spec.reducer.apply(name, &existing, incoming)?;
            merged.insert(name.clone(), next);
        }

        Ok(Value::Object(merged))
    }
}
