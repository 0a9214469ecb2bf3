//! Reactive Wrapper Layer
//!
//! A `Reactive` presents the same shape as the underlying plain object but
//! intercepts reads (for dependency tracking) and writes (for change
//! notification). Since this is a systems language without property traps,
//! the wrapper is an explicit handle with accessor methods; the tracking
//! and notification contract is unchanged.
//!
//! # Laziness
//!
//! Nested objects are wrapped on access, not on creation: `child` /
//! `child_at` return a fresh handle over the nested `RawObject`, carrying
//! the parent's readonly flag. Substructures that are never reached are
//! never wrapped.
//!
//! # Idempotence
//!
//! Handles are cheap (an `Arc` plus a flag) and carry no state of their
//! own, so wrapping the same object twice yields interchangeable handles:
//! they share all data and subscriber bookkeeping and compare equal. There
//! is no wrapper-of-wrapper shape to guard against.
//!
//! # Readonly Variant
//!
//! A readonly handle tracks reads like a mutable one, but every write is a
//! warned no-op: state is left untouched and no notification fires.
//!
//! # List Normalization
//!
//! Writing past the end of a list pads with `Null` and reports an add,
//! which notifies subscribers of the written index and of the length.
//! Shrinking a list notifies the length and every index at or past the
//! new length.

use std::sync::Arc;

use crate::value::{ObjectData, RawObject, Value};

use super::store::{self, DepKey, TriggerOp};

/// Transparent tracked view over a [`RawObject`].
#[derive(Clone)]
pub struct Reactive {
    raw: Arc<RawObject>,
    readonly: bool,
}

/// Wrap an object in a mutable reactive handle.
pub fn reactive(raw: Arc<RawObject>) -> Reactive {
    Reactive {
        raw,
        readonly: false,
    }
}

/// Wrap an object in a read-only reactive handle.
pub fn readonly(raw: Arc<RawObject>) -> Reactive {
    Reactive {
        raw,
        readonly: true,
    }
}

impl Reactive {
    /// The wrapped object.
    pub fn raw(&self) -> &Arc<RawObject> {
        &self.raw
    }

    /// Whether writes through this handle are forbidden.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// A read-only view over the same object.
    pub fn as_readonly(&self) -> Reactive {
        readonly(self.raw.clone())
    }

    fn id(&self) -> u64 {
        self.raw.id()
    }

    fn deny_write(&self, what: &str) -> bool {
        if self.readonly {
            tracing::warn!(
                target_id = self.id(),
                operation = what,
                "write to readonly object ignored"
            );
        }
        self.readonly
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a map field. Reading a missing field yields `Null` and still
    /// records the dependency, so a later insertion notifies.
    pub fn get(&self, key: &str) -> Value {
        store::track(self.id(), DepKey::prop(key));
        match &*self.raw.data().read() {
            ObjectData::Map(fields) => fields.get(key).cloned().unwrap_or(Value::Null),
            ObjectData::List(_) => Value::Null,
        }
    }

    /// Read a map field and wrap it if it is a nested object.
    pub fn child(&self, key: &str) -> Option<Reactive> {
        let value = self.get(key);
        value.as_obj().map(|raw| Reactive {
            raw: raw.clone(),
            readonly: self.readonly,
        })
    }

    /// Read a list element. Out-of-range reads yield `Null` and still
    /// record the dependency.
    pub fn index(&self, i: usize) -> Value {
        store::track(self.id(), DepKey::Index(i));
        match &*self.raw.data().read() {
            ObjectData::List(items) => items.get(i).cloned().unwrap_or(Value::Null),
            ObjectData::Map(_) => Value::Null,
        }
    }

    /// Read a list element and wrap it if it is a nested object.
    pub fn child_at(&self, i: usize) -> Option<Reactive> {
        let value = self.index(i);
        value.as_obj().map(|raw| Reactive {
            raw: raw.clone(),
            readonly: self.readonly,
        })
    }

    /// List length (or map field count), tracked against `Length`.
    pub fn len(&self) -> usize {
        store::track(self.id(), DepKey::Length);
        match &*self.raw.data().read() {
            ObjectData::Map(fields) => fields.len(),
            ObjectData::List(items) => items.len(),
        }
    }

    /// Whether the object has no entries, tracked against `Length`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map field names in insertion order, tracked against `Length`.
    pub fn keys(&self) -> Vec<String> {
        store::track(self.id(), DepKey::Length);
        match &*self.raw.data().read() {
            ObjectData::Map(fields) => fields.keys().cloned().collect(),
            ObjectData::List(_) => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a map field. Notifies only when the stored value changes;
    /// inserting a fresh field also notifies length subscribers.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if self.deny_write("set") {
            return;
        }
        let value = value.into();

        let op = {
            let mut data = self.raw.data().write();
            match &mut *data {
                ObjectData::Map(fields) => match fields.get_mut(key) {
                    Some(slot) => {
                        if *slot == value {
                            None
                        } else {
                            *slot = value;
                            Some(TriggerOp::Set)
                        }
                    }
                    None => {
                        fields.insert(key.to_string(), value);
                        Some(TriggerOp::Add)
                    }
                },
                ObjectData::List(_) => {
                    tracing::warn!(key, "field write on a list object ignored");
                    None
                }
            }
        };

        if let Some(op) = op {
            store::trigger(self.id(), op, Some(DepKey::prop(key)));
        }
    }

    /// Remove a map field. Notifies the field and length subscribers.
    pub fn remove(&self, key: &str) {
        if self.deny_write("remove") {
            return;
        }

        let removed = {
            let mut data = self.raw.data().write();
            match &mut *data {
                ObjectData::Map(fields) => fields.shift_remove(key).is_some(),
                ObjectData::List(_) => false,
            }
        };

        if removed {
            // A removal notifies the same set as an insertion: the key's
            // subscribers plus anyone watching the entry count.
            store::trigger(self.id(), TriggerOp::Add, Some(DepKey::prop(key)));
        }
    }

    /// Write a list element. A write at or past the current length pads
    /// with `Null` and counts as an add.
    pub fn set_index(&self, i: usize, value: impl Into<Value>) {
        if self.deny_write("set_index") {
            return;
        }
        let value = value.into();

        let op = {
            let mut data = self.raw.data().write();
            match &mut *data {
                ObjectData::List(items) => {
                    if i < items.len() {
                        if items[i] == value {
                            None
                        } else {
                            items[i] = value;
                            Some(TriggerOp::Set)
                        }
                    } else {
                        items.resize(i, Value::Null);
                        items.push(value);
                        Some(TriggerOp::Add)
                    }
                }
                ObjectData::Map(_) => {
                    tracing::warn!(index = i, "indexed write on a map object ignored");
                    None
                }
            }
        };

        if let Some(op) = op {
            store::trigger(self.id(), op, Some(DepKey::Index(i)));
        }
    }

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) {
        if self.deny_write("push") {
            return;
        }
        let value = value.into();

        let index = {
            let mut data = self.raw.data().write();
            match &mut *data {
                ObjectData::List(items) => {
                    items.push(value);
                    Some(items.len() - 1)
                }
                ObjectData::Map(_) => {
                    tracing::warn!("push on a map object ignored");
                    None
                }
            }
        };

        if let Some(index) = index {
            store::trigger(self.id(), TriggerOp::Add, Some(DepKey::Index(index)));
        }
    }

    /// Resize a list. Shrinking notifies length subscribers and every
    /// index at or past the new length; growing pads with `Null`.
    pub fn set_len(&self, new_len: usize) {
        if self.deny_write("set_len") {
            return;
        }

        let op = {
            let mut data = self.raw.data().write();
            match &mut *data {
                ObjectData::List(items) => {
                    let old_len = items.len();
                    if new_len == old_len {
                        None
                    } else {
                        items.resize(new_len, Value::Null);
                        if new_len < old_len {
                            Some(TriggerOp::Resize { new_len })
                        } else {
                            Some(TriggerOp::Set)
                        }
                    }
                }
                ObjectData::Map(_) => {
                    tracing::warn!("set_len on a map object ignored");
                    None
                }
            }
        };

        match op {
            Some(op @ TriggerOp::Resize { .. }) => store::trigger(self.id(), op, None),
            Some(op) => store::trigger(self.id(), op, Some(DepKey::Length)),
            None => {}
        }
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.raw, &other.raw) && self.readonly == other.readonly
    }
}

impl std::fmt::Debug for Reactive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.raw.id())
            .field("readonly", &self.readonly)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn effect_reruns_on_tracked_write() {
        let state = reactive(RawObject::from_entries([("count", 0)]));
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = state_clone.get("count");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("count", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unrelated_key_write_does_not_rerun() {
        let state = reactive(RawObject::from_entries([("a", 1), ("b", 2)]));
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = state_clone.get("a");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("b", 99);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_value_write_is_suppressed() {
        let state = reactive(RawObject::from_entries([("x", 7)]));
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = state_clone.get("x");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("x", 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("x", 8);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nan_write_always_notifies() {
        let state = reactive(RawObject::from_entries([("x", f64::NAN)]));
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = state_clone.get("x");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("x", f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_write_is_warned_noop() {
        let raw = RawObject::from_entries([("x", 1)]);
        let view = readonly(raw.clone());
        let writable = reactive(raw);

        view.set("x", 2);
        assert_eq!(writable.get("x"), Value::from(1));
    }

    #[test]
    fn readonly_reads_still_track() {
        let raw = RawObject::from_entries([("x", 1)]);
        let view = readonly(raw.clone());
        let writable = reactive(raw);
        let runs = Arc::new(AtomicI32::new(0));

        let view_clone = view.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = view_clone.get("x");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        writable.set("x", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_objects_wrap_lazily_with_same_mode() {
        let inner = RawObject::from_entries([("deep", 1)]);
        let outer = readonly(RawObject::from_entries([("inner", inner)]));

        let child = outer.child("inner").unwrap();
        assert!(child.is_readonly());
        assert_eq!(child.get("deep"), Value::from(1));
    }

    #[test]
    fn missing_key_read_subscribes_to_insertion() {
        let state = reactive(RawObject::map());
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _eff = effect(move || {
            let _ = state_clone.get("later");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("later", 5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn out_of_range_write_notifies_length_subscribers() {
        let list = reactive(RawObject::from_values([1, 2]));
        let lens = Arc::new(AtomicI32::new(-1));

        let list_clone = list.clone();
        let lens_clone = lens.clone();
        let _eff = effect(move || {
            lens_clone.store(list_clone.len() as i32, Ordering::SeqCst);
        });
        assert_eq!(lens.load(Ordering::SeqCst), 2);

        list.set_index(5, 9);
        assert_eq!(lens.load(Ordering::SeqCst), 6);
        assert_eq!(list.index(3), Value::Null);
        assert_eq!(list.index(5), Value::from(9));
    }

    #[test]
    fn shrink_notifies_truncated_index_subscribers() {
        let list = reactive(RawObject::from_values([10, 20, 30]));
        let seen = Arc::new(AtomicI32::new(0));

        let list_clone = list.clone();
        let seen_clone = seen.clone();
        let _eff = effect(move || {
            let _ = list_clone.index(2);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        list.set_len(1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrapping_is_idempotent() {
        let raw = RawObject::from_entries([("x", 1)]);
        let a = reactive(raw.clone());
        let b = reactive(raw);
        assert_eq!(a, b);

        a.set("x", 2);
        assert_eq!(b.get("x"), Value::from(2));
    }
}
