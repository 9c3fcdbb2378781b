//! State schema and reducer system
//!
//! A graph carries one state value of an application-defined type `S`. Every
//! time a node finishes, the engine combines the node's output with the
//! running state through a [`StateSchema`]. The same operation merges the
//! outputs of concurrent branches at a fan-in point.
//!
//! # Overview
//!
//! | Schema | State type | Behavior |
//! |--------|-----------|----------|
//! | [`LastValue`] | any | Output replaces the state (the default) |
//! | [`FieldSchema`] | `serde_json::Value` objects | Per-field [`Reducer`]s, overwrite for the rest |
//! | [`FnSchema`] | any | Typed merge closure |
//!
//! With [`LastValue`] a node returns the **whole** next state. With the other
//! schemas a node returns a **partial update** that the schema folds into the
//! current state.
//!
//! ## Built-in Reducers
//!
//! | Reducer | Behavior | Use Case |
//! |---------|----------|----------|
//! | [`OverwriteReducer`] | Last write wins | Status fields |
//! | [`AppendReducer`] | Concatenate arrays | Logs, message history |
//! | [`MergeReducer`] | Shallow object merge | Partial config updates |
//! | [`SumReducer`] | Add numbers | Counters, token totals |
//!
//! Reducers must be pure and associative: the engine may call them any
//! number of times, and a fan-in folds branch outputs pairwise.
//!
//! # Examples
//!
//! ## Dynamic State
//!
//! ```rust
//! use flowgraph_core::state::{AppendReducer, FieldSchema, StateSchema, SumReducer};
//! use serde_json::json;
//!
//! let schema = FieldSchema::new()
//!     .with_field("messages", AppendReducer)
//!     .with_field("tokens", SumReducer);
//!
//! let current = json!({"messages": ["hello"], "tokens": 10, "status": "thinking"});
//! let update = json!({"messages": ["world"], "tokens": 5, "status": "done"});
//!
//! let merged = schema.update(&current, &update).unwrap();
//! assert_eq!(merged["messages"], json!(["hello", "world"]));
//! assert_eq!(merged["tokens"], json!(15));
//! assert_eq!(merged["status"], json!("done"));
//! ```
//!
//! ## Typed State
//!
//! ```rust
//! use flowgraph_core::state::{append, FnSchema, StateSchema};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Research {
//!     notes: Vec<String>,
//!     verdict: Option<String>,
//! }
//!
//! let schema = FnSchema::new(|current: &Research, update: &Research| {
//!     Ok(Research {
//!         notes: append(&current.notes, &update.notes),
//!         verdict: update.verdict.clone().or_else(|| current.verdict.clone()),
//!     })
//! })
//! .with_reduced_fields(["notes"]);
//!
//! let a = Research { notes: vec!["a".into()], verdict: None };
//! let b = Research { notes: vec!["b".into()], verdict: Some("ok".into()) };
//!
//! let merged = schema.update(&a, &b).unwrap();
//! assert_eq!(merged.notes, vec!["a", "b"]);
//! assert!(schema.has_reducer("notes"));
//! ```

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Bound shared by every state type a graph can carry
pub trait State: Clone + Send + Sync + 'static {}

impl<T> State for T where T: Clone + Send + Sync + 'static {}

/// Errors raised by schemas and reducers
///
/// # Example
///
/// ```rust
/// use flowgraph_core::state::{AppendReducer, Reducer, StateError};
/// use serde_json::json;
///
/// let result = AppendReducer.reduce(&json!(42), &json!("not an array"));
/// assert!(matches!(result, Err(StateError::ReducerError(_))));
/// ```
#[derive(Debug, Error)]
pub enum StateError {
    /// State structure is invalid (e.g., not an object when expected)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reducer encountered incompatible types or failed to merge
    #[error("Reducer error: {0}")]
    ReducerError(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// How a graph folds node outputs into its running state
pub trait StateSchema<S>: Send + Sync {
    /// Combine the current state with an update into the next state
    fn update(&self, current: &S, update: &S) -> Result<S>;

    /// Whether concurrent writes to `field` are reconciled by a reducer
    ///
    /// Used by the compiler to reject fan-outs whose branches declare writes
    /// to the same unreduced field.
    fn has_reducer(&self, _field: &str) -> bool {
        false
    }

    /// Human-readable name
    fn name(&self) -> &str {
        "schema"
    }
}

/// Default schema: the update replaces the state
#[derive(Debug, Clone, Copy, Default)]
pub struct LastValue;

impl<S: Clone> StateSchema<S> for LastValue {
    fn update(&self, _current: &S, update: &S) -> Result<S> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "last_value"
    }
}

/// Concatenate two sequences, preserving order and duplicates
pub fn append<T: Clone>(current: &[T], update: &[T]) -> Vec<T> {
    let mut merged = Vec::with_capacity(current.len() + update.len());
    merged.extend_from_slice(current);
    merged.extend_from_slice(update);
    merged
}

type MergeFn<S> = dyn Fn(&S, &S) -> Result<S> + Send + Sync;

/// Schema backed by a typed merge closure
pub struct FnSchema<S> {
    merge: Box<MergeFn<S>>,
    reduced: HashSet<String>,
}

impl<S> FnSchema<S> {
    /// Wrap a merge closure
    pub fn new<F>(merge: F) -> Self
    where
        F: Fn(&S, &S) -> Result<S> + Send + Sync + 'static,
    {
        Self {
            merge: Box::new(merge),
            reduced: HashSet::new(),
        }
    }

    /// Declare which fields the closure reduces (as opposed to overwrites)
    pub fn with_reduced_fields<I, T>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.reduced.extend(fields.into_iter().map(Into::into));
        self
    }
}

impl<S> fmt::Debug for FnSchema<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSchema")
            .field("merge", &"<function>")
            .field("reduced", &self.reduced)
            .finish()
    }
}

impl<S> StateSchema<S> for FnSchema<S> {
    fn update(&self, current: &S, update: &S) -> Result<S> {
        (self.merge)(current, update)
    }

    fn has_reducer(&self, field: &str) -> bool {
        self.reduced.contains(field)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Combines two values of one field of a dynamic state
pub trait Reducer: Send + Sync {
    /// Apply an update to the current value (which may be null)
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Get a human-readable name for this reducer
    fn name(&self) -> &str;
}

/// Overwrite reducer - replaces the current value with the update
///
/// ```rust
/// use flowgraph_core::state::{OverwriteReducer, Reducer};
/// use serde_json::json;
///
/// let result = OverwriteReducer.reduce(&json!("analyze"), &json!("execute")).unwrap();
/// assert_eq!(result, json!("execute"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Append reducer - concatenates arrays
///
/// - **Array + Array**: concatenation
/// - **Array + Scalar**: push
/// - **Null + Array**: the array
/// - **Null + Scalar**: single-element array
///
/// ```rust
/// use flowgraph_core::state::{AppendReducer, Reducer};
/// use serde_json::json;
///
/// let result = AppendReducer.reduce(&json!(["User: Hello"]), &json!(["AI: Hi"])).unwrap();
/// assert_eq!(result, json!(["User: Hello", "AI: Hi"]));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr), Value::Array(upd)) => Ok(Value::Array(append(curr, upd))),
            (Value::Null, Value::Array(upd)) => Ok(Value::Array(upd.clone())),
            (Value::Array(curr), single) => {
                let mut result = curr.clone();
                result.push(single.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single) => Ok(Value::Array(vec![single.clone()])),
            _ => Err(StateError::ReducerError(
                "AppendReducer requires array values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Merge reducer - shallow object merge, update keys win
///
/// Nested objects are replaced, not merged recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Object(curr), Value::Object(upd)) => {
                let mut result = curr.clone();
                for (key, value) in upd {
                    result.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(result))
            }
            (Value::Null, Value::Object(upd)) => Ok(Value::Object(upd.clone())),
            _ => Err(StateError::ReducerError(
                "MergeReducer requires object values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Sum reducer - adds numbers
///
/// Integer sums are exact: the result is an `i64` when it fits, a `u64`
/// above that, and an error outside both ranges. Anything involving a float
/// is added as `f64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumReducer;

fn as_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a), Some(b)) = (as_integer(a), as_integer(b)) {
                    let sum = a + b;
                    i64::try_from(sum)
                        .map(Value::from)
                        .or_else(|_| u64::try_from(sum).map(Value::from))
                        .map_err(|_| StateError::ReducerError(format!("integer sum {} is out of range", sum)))
                } else if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                    serde_json::Number::from_f64(a + b)
                        .map(Value::Number)
                        .ok_or_else(|| {
                            StateError::ReducerError("sum is not a finite number".to_string())
                        })
                } else {
                    Err(StateError::ReducerError(
                        "Cannot add non-numeric values".to_string(),
                    ))
                }
            }
            (Value::Null, Value::Number(_)) => Ok(update.clone()),
            _ => Err(StateError::ReducerError(
                "SumReducer requires numeric values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Per-field schema for dynamic (`serde_json::Value` object) states
///
/// Fields with a registered reducer are reduced; all other fields present in
/// an update overwrite the current value, unless a default reducer is set.
/// Fields absent from an update are left untouched.
#[derive(Default)]
pub struct FieldSchema {
    fields: HashMap<String, Box<dyn Reducer>>,
    default_reducer: Option<Box<dyn Reducer>>,
}

impl FieldSchema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer for a field
    pub fn add_field(&mut self, field_name: impl Into<String>, reducer: impl Reducer + 'static) {
        self.fields.insert(field_name.into(), Box::new(reducer));
    }

    /// Builder form of [`add_field`](Self::add_field)
    pub fn with_field(mut self, field_name: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.add_field(field_name, reducer);
        self
    }

    /// Set the reducer used for fields without their own
    pub fn with_default_reducer(mut self, reducer: impl Reducer + 'static) -> Self {
        self.default_reducer = Some(Box::new(reducer));
        self
    }

    fn get_reducer(&self, field_name: &str) -> Option<&dyn Reducer> {
        self.fields
            .get(field_name)
            .map(|r| r.as_ref())
            .or_else(|| self.default_reducer.as_deref())
    }

    /// Apply an update to a state in place
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<()> {
        if state.is_null() {
            *state = Value::Object(Default::default());
        }
        let state_obj = state
            .as_object_mut()
            .ok_or_else(|| StateError::InvalidState("State must be an object".to_string()))?;
        let update_obj = match update {
            Value::Object(obj) => obj,
            Value::Null => return Ok(()),
            _ => {
                return Err(StateError::InvalidState(
                    "Update must be an object".to_string(),
                ))
            }
        };

        for (field_name, update_value) in update_obj {
            let reduced = match self.get_reducer(field_name) {
                Some(reducer) => {
                    let current = state_obj.get(field_name).unwrap_or(&Value::Null);
                    reducer.reduce(current, update_value)?
                }
                None => update_value.clone(),
            };
            state_obj.insert(field_name.clone(), reduced);
        }

        Ok(())
    }

    /// Names of fields with an explicit reducer
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.fields.keys().cloned().collect();
        fields.sort();
        fields
    }
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reducers: HashMap<&str, &str> = self
            .fields
            .iter()
            .map(|(field, reducer)| (field.as_str(), reducer.name()))
            .collect();
        f.debug_struct("FieldSchema")
            .field("fields", &reducers)
            .field("default_reducer", &self.default_reducer.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl StateSchema<Value> for FieldSchema {
    fn update(&self, current: &Value, update: &Value) -> Result<Value> {
        let mut next = current.clone();
        self.apply(&mut next, update)?;
        Ok(next)
    }

    fn has_reducer(&self, field: &str) -> bool {
        self.fields.contains_key(field) || self.default_reducer.is_some()
    }

    fn name(&self) -> &str {
        "fields"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_value_replaces() {
        let merged = LastValue.update(&json!({"a": 1}), &json!({"b": 2})).unwrap();
        assert_eq!(merged, json!({"b": 2}));
    }

    #[test]
    fn test_append_reducer_variants() {
        let r = AppendReducer;
        assert_eq!(r.reduce(&json!([1, 2]), &json!([3])).unwrap(), json!([1, 2, 3]));
        assert_eq!(r.reduce(&Value::Null, &json!([1])).unwrap(), json!([1]));
        assert_eq!(r.reduce(&json!([1]), &json!(2)).unwrap(), json!([1, 2]));
        assert_eq!(r.reduce(&Value::Null, &json!("x")).unwrap(), json!(["x"]));
        assert!(r.reduce(&json!(1), &json!([1])).is_err());
    }

    #[test]
    fn test_merge_reducer() {
        let merged = MergeReducer
            .reduce(&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4}))
            .unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
        assert!(MergeReducer.reduce(&json!([1]), &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_sum_reducer() {
        assert_eq!(SumReducer.reduce(&json!(5), &json!(3)).unwrap(), json!(8));
        assert_eq!(SumReducer.reduce(&json!(2.5), &json!(3.5)).unwrap(), json!(6.0));
        assert_eq!(SumReducer.reduce(&Value::Null, &json!(4)).unwrap(), json!(4));
        let past_max = SumReducer.reduce(&json!(i64::MAX), &json!(1)).unwrap();
        assert_eq!(past_max, json!(i64::MAX as u64 + 1));
        assert_eq!(SumReducer.reduce(&past_max, &json!(-1)).unwrap(), json!(i64::MAX));
        assert_eq!(SumReducer.reduce(&json!(u64::MAX), &json!(-1)).unwrap(), json!(u64::MAX - 1));
        assert!(SumReducer.reduce(&json!(u64::MAX), &json!(1)).is_err());
        assert!(SumReducer.reduce(&json!(i64::MIN), &json!(-1)).is_err());
        assert!(SumReducer.reduce(&json!("a"), &json!(1)).is_err());
    }

    #[test]
    fn test_field_schema_reduces_and_overwrites() {
        let schema = FieldSchema::new()
            .with_field("messages", AppendReducer)
            .with_field("count", SumReducer);

        let mut state = json!({"messages": ["hello"], "count": 1, "status": "old"});
        schema
            .apply(&mut state, &json!({"messages": ["world"], "count": 2, "status": "new"}))
            .unwrap();

        assert_eq!(state["messages"], json!(["hello", "world"]));
        assert_eq!(state["count"], json!(3));
        assert_eq!(state["status"], json!("new"));
    }

    #[test]
    fn test_field_schema_keeps_untouched_fields() {
        let schema = FieldSchema::new();
        let merged = schema
            .update(&json!({"keep": true, "x": 1}), &json!({"x": 2}))
            .unwrap();
        assert_eq!(merged, json!({"keep": true, "x": 2}));
    }

    #[test]
    fn test_field_schema_null_state_and_update() {
        let schema = FieldSchema::new().with_field("log", AppendReducer);
        let merged = schema.update(&Value::Null, &json!({"log": "a"})).unwrap();
        assert_eq!(merged, json!({"log": ["a"]}));

        let unchanged = schema.update(&merged, &Value::Null).unwrap();
        assert_eq!(unchanged, merged);
    }

    #[test]
    fn test_field_schema_rejects_non_objects() {
        let schema = FieldSchema::new();
        assert!(schema.update(&json!("scalar"), &json!({"a": 1})).is_err());
        assert!(schema.update(&json!({}), &json!([1])).is_err());
    }

    #[test]
    fn test_field_schema_has_reducer() {
        let schema = FieldSchema::new().with_field("log", AppendReducer);
        assert!(schema.has_reducer("log"));
        assert!(!schema.has_reducer("status"));
        assert_eq!(schema.fields(), vec!["log".to_string()]);

        let defaulted = FieldSchema::new().with_default_reducer(OverwriteReducer);
        assert!(defaulted.has_reducer("anything"));
    }

    #[test]
    fn test_fn_schema() {
        let schema = FnSchema::new(|a: &Vec<u8>, b: &Vec<u8>| Ok(append(a, b)))
            .with_reduced_fields(["items"]);
        assert_eq!(schema.update(&vec![1], &vec![2, 3]).unwrap(), vec![1, 2, 3]);
        assert!(schema.has_reducer("items"));
        assert!(!schema.has_reducer("other"));
    }

    #[test]
    fn test_reducer_names() {
        assert_eq!(OverwriteReducer.name(), "overwrite");
        assert_eq!(AppendReducer.name(), "append");
        assert_eq!(MergeReducer.name(), "merge");
        assert_eq!(SumReducer.name(), "sum");
    }
}
