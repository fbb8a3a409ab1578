//! Patches applied to the store and the change notifications they produce.

use std::collections::BTreeMap;

use serde_json::Value;

/// Flattened store contents: `"<kind>.<field>"` → JSON value.
pub type StoreState = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A set of field writes merged atomically by
/// [`StateStore::merge_patch`](super::StateStore::merge_patch).
///
/// `Some(value)` sets a field, `None` removes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, Option<Value>>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), Some(value.into()));
        self
    }

    /// Remove `field`.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), None);
        self
    }

    /// Apply to `state`, returning the fields whose value actually changed.
    pub(crate) fn apply(self, state: &mut StoreState) -> BTreeMap<String, FieldChange> {
        let mut changes = BTreeMap::new();
        for (field, value) in self.fields {
            let old = match &value {
                Some(v) => state.insert(field.clone(), v.clone()),
                None => state.remove(&field),
            };
            if old != value {
                changes.insert(field, FieldChange { old, new: value });
            }
        }
        changes
    }
}

/// Per-field difference between two snapshots.
pub(crate) fn diff(old: &StoreState, new: &StoreState) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    for (field, value) in new {
        if old.get(field) != Some(value) {
            changes.insert(
                field.clone(),
                FieldChange {
                    old: old.get(field).cloned(),
                    new: Some(value.clone()),
                },
            );
        }
    }
    for (field, value) in old {
        if !new.contains_key(field) {
            changes.insert(
                field.clone(),
                FieldChange {
                    old: Some(value.clone()),
                    new: None,
                },
            );
        }
    }
    changes
}

// ---------------------------------------------------------------------------
// StoreChange
// ---------------------------------------------------------------------------

/// Old and new value of one field.  `None` means the field was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Notification delivered to subscribers once per committed merge.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    /// Commit sequence number, strictly increasing per store.
    pub seq: u64,
    /// Fields whose value differs from before the merge.  May be empty when
    /// the merge rewrote values unchanged.
    pub changes: BTreeMap<String, FieldChange>,
    /// `true` when the values were written by another handle on the same
    /// store file and picked up from disk.
    pub external: bool,
}

impl StoreChange {
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// `true` if any changed field starts with `prefix`.
    pub fn touches(&self, prefix: &str) -> bool {
        self.changes.keys().any(|k| k.starts_with(prefix))
    }
}
