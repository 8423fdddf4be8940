//! Last-applied diffing of child objects.
//!
//! The observed object is compared against the desired one field by field.
//! Fields the server adds on its own (defaults, status, bookkeeping metadata)
//! are ignored because they are absent from the desired object. Fields the
//! operator stopped setting are detected through the last-applied annotation:
//! a key present in the last applied state, gone from the desired state and
//! still present on the observed object counts as drift.
//!
//! The server omits zero values of optional fields (`false`, `0`, `""`,
//! empty maps and lists), so a desired zero value matches a missing key.

use kube::core::DynamicObject;
use serde_json::{Map, Value};

use crate::controller::error::Result;
use crate::resources::common::LAST_APPLIED_ANNOTATION;

/// Metadata fields assigned by the server.
const SERVER_METADATA: [&str; 8] = [
    "uid",
    "resourceVersion",
    "generation",
    "creationTimestamp",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
    "managedFields",
    "selfLink",
];

/// Outcome of comparing an observed object with its desired state.
#[derive(Clone, Debug)]
pub struct Diff {
    /// Whether the observed object must be replaced.
    pub needs_update: bool,
    /// The replacement (desired, freshly stamped) when an update is needed,
    /// otherwise the observed object unchanged.
    pub object: DynamicObject,
}

/// Compare `observed` with `desired`.
pub fn needs_update(observed: &DynamicObject, desired: &DynamicObject) -> Result<Diff> {
    let current = comparable(serde_json::to_value(observed)?);
    let wanted = comparable(serde_json::to_value(desired)?);
    let last_applied = last_applied(observed);

    if differs(&wanted, &current, last_applied.as_ref()) {
        let mut object = desired.clone();
        stamp_last_applied(&mut object)?;
        Ok(Diff {
            needs_update: true,
            object,
        })
    } else {
        Ok(Diff {
            needs_update: false,
            object: observed.clone(),
        })
    }
}

/// Record the object's own comparable state in the last-applied annotation.
pub fn stamp_last_applied(object: &mut DynamicObject) -> Result<()> {
    let snapshot = serde_json::to_string(&comparable(serde_json::to_value(&*object)?))?;
    object
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_ANNOTATION.to_string(), snapshot);
    Ok(())
}

/// Parse the last-applied annotation. A missing or unreadable annotation
/// means only additions and changes can be detected, not removals.
fn last_applied(observed: &DynamicObject) -> Option<Value> {
    let raw = observed.metadata.annotations.as_ref()?.get(LAST_APPLIED_ANNOTATION)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unreadable last-applied annotation");
            None
        }
    }
}

/// Strip everything that does not take part in the comparison.
fn comparable(mut value: Value) -> Value {
    if let Value::Object(root) = &mut value {
        root.remove("status");
        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            for field in SERVER_METADATA {
                metadata.remove(field);
            }
            let drop_annotations = match metadata.get_mut("annotations") {
                Some(Value::Object(annotations)) => {
                    annotations.remove(LAST_APPLIED_ANNOTATION);
                    annotations.is_empty()
                }
                Some(Value::Null) => true,
                _ => false,
            };
            if drop_annotations {
                metadata.remove("annotations");
            }
        }
    }
    value
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
    }
}

/// Whether `current` deviates from `desired` in a field that matters.
fn differs(desired: &Value, current: &Value, last: Option<&Value>) -> bool {
    match (desired, current) {
        (Value::Object(d), Value::Object(c)) => {
            let last = match last {
                Some(Value::Object(l)) => Some(l),
                _ => None,
            };
            objects_differ(d, c, last)
        }
        (Value::Array(d), Value::Array(c)) => {
            if d.len() != c.len() {
                return true;
            }
            let last = match last {
                Some(Value::Array(l)) => Some(l),
                _ => None,
            };
            d.iter().zip(c).enumerate().any(|(i, (dv, cv))| {
                differs(dv, cv, last.and_then(|l| l.get(i)))
            })
        }
        _ => desired != current,
    }
}

fn objects_differ(
    desired: &Map<String, Value>,
    current: &Map<String, Value>,
    last: Option<&Map<String, Value>>,
) -> bool {
    let changed = desired.iter().any(|(key, dv)| match current.get(key) {
        None => !is_zero(dv),
        Some(cv) => differs(dv, cv, last.and_then(|l| l.get(key))),
    });
    if changed {
        return true;
    }
    last.is_some_and(|last| {
        last.keys()
            .any(|key| !desired.contains_key(key) && current.contains_key(key))
    })
}
