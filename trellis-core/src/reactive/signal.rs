//! Signal Implementation
//!
//! A `Signal` is a single-value reactive cell: the degenerate case of a
//! wrapped object with exactly one slot. Reading it inside a running
//! effect records a dependency; writing a different value notifies.
//!
//! Signals share the dependency store with structured objects, so a
//! signal read and an object-field read subscribe and notify through the
//! same machinery.

use std::sync::Arc;

use parking_lot::RwLock;

use super::store::{self, DepKey, TriggerOp};

struct SignalInner<T> {
    /// Target id in the dependency store.
    id: u64,
    value: RwLock<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        store::purge_target(self.id);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Clones share the same cell: writes through one handle are visible to,
/// and notify subscribers of, every other handle.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: store::next_target_id(),
                value: RwLock::new(value),
            }),
        }
    }

    /// The signal's target id in the dependency store.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Read the current value, registering the running effect (if any) as
    /// a subscriber.
    pub fn get(&self) -> T {
        store::track(self.inner.id, DepKey::Value);
        self.inner.value.read().clone()
    }

    /// Read the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Write a new value; subscribers are notified only if it differs
    /// from the stored one.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };
        if changed {
            store::trigger(self.inner.id, TriggerOp::Set, Some(DepKey::Value));
        }
    }

    /// Derive the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.read());
        self.set(next);
    }
}

impl<T> std::fmt::Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .finish()
    }
}
