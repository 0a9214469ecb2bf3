//! Computed Values
//!
//! A `Computed` is a cached derivation: a lazy inner effect plus a dirty
//! flag. Reading the value recomputes only when a dependency has changed
//! since the last read; otherwise the cache is returned.
//!
//! When a dependency notifies, the computed does not recompute eagerly.
//! It flips its dirty flag and forwards the notification to its own
//! subscribers, which will pull the fresh value on their next read. A
//! chain of computeds therefore does no work until something at the end
//! actually reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use super::effect::{EffectOptions, ReactiveEffect};
use super::store::{self, DepKey, TriggerOp};

struct ComputedInner<T> {
    /// Target id under which readers of this cell subscribe.
    id: u64,

    /// Cache slot; `None` until the first computation.
    value: RwLock<Option<T>>,

    /// Whether the cache needs refreshing.
    dirty: AtomicBool,

    /// The lazy effect that runs the getter with dependency tracking.
    effect: OnceLock<ReactiveEffect>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(effect) = self.effect.get() {
            effect.stop();
        }
        store::purge_target(self.id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed from a getter. The getter does not run until the
    /// first `get`.
    pub fn new(getter: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let inner = Arc::new(ComputedInner {
            id: store::next_target_id(),
            value: RwLock::new(None),
            dirty: AtomicBool::new(true),
            effect: OnceLock::new(),
        });

        // The runner writes into the cache; the policy invalidates it.
        // Both hold weak references so the cell owns the effect, not the
        // other way around.
        let runner_slot: Weak<ComputedInner<T>> = Arc::downgrade(&inner);
        let policy_slot: Weak<ComputedInner<T>> = Arc::downgrade(&inner);

        let effect = ReactiveEffect::new(
            move || {
                if let Some(cell) = runner_slot.upgrade() {
                    let fresh = getter();
                    *cell.value.write() = Some(fresh);
                }
            },
            EffectOptions {
                lazy: true,
                scheduler: Some(Arc::new(move |_| {
                    if let Some(cell) = policy_slot.upgrade() {
                        // First invalidation since the last read forwards
                        // the notification to this cell's subscribers.
                        if !cell.dirty.swap(true, Ordering::SeqCst) {
                            store::trigger(cell.id, TriggerOp::Set, Some(DepKey::Value));
                        }
                    }
                })),
                ..Default::default()
            },
        );
        let _ = inner.effect.set(effect);

        Self { inner }
    }

    /// The cell's target id in the dependency store.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Read the value, recomputing if a dependency changed since the last
    /// read. Registers the running effect (if any) as a subscriber of the
    /// cell itself.
    pub fn get(&self) -> T {
        if self.inner.dirty.swap(false, Ordering::SeqCst) {
            if let Some(effect) = self.inner.effect.get() {
                effect.run();
            }
        }
        store::track(self.inner.id, DepKey::Value);

        self.inner
            .value
            .read()
            .clone()
            .expect("clean computed should have a value")
    }
}

impl<T> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.inner.dirty.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::signal::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computes_on_first_access_only() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let doubled = Computed::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.get(), 42);
        assert_eq!(doubled.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recomputes_after_dependency_change() {
        let source = Signal::new(10);
        let calls = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let calls_clone = calls.clone();
        let doubled = Computed::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 2
        });

        assert_eq!(doubled.get(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_recompute_while_clean() {
        let source = Signal::new(1);
        let calls = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let calls_clone = calls.clone();
        let derived = Computed::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() + 1
        });

        assert_eq!(derived.get(), 2);
        assert_eq!(derived.get(), 2);
        assert_eq!(derived.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notifies_its_own_subscribers() {
        let source = Signal::new(1);

        let source_clone = source.clone();
        let derived = Computed::new(move || source_clone.get() * 10);

        let observed = Arc::new(AtomicI32::new(0));
        let observed_clone = observed.clone();
        let derived_clone = derived.clone();
        let _eff = effect(move || {
            observed_clone.store(derived_clone.get(), Ordering::SeqCst);
        });
        assert_eq!(observed.load(Ordering::SeqCst), 10);

        source.set(3);
        assert_eq!(observed.load(Ordering::SeqCst), 30);
    }

    #[test]
    fn chained_computeds_stay_lazy() {
        let source = Signal::new(2);
        let mid_calls = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let mid_calls_clone = mid_calls.clone();
        let mid = Computed::new(move || {
            mid_calls_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 2
        });

        let mid_clone = mid.clone();
        let top = Computed::new(move || mid_clone.get() + 1);

        assert_eq!(top.get(), 5);
        assert_eq!(mid_calls.load(Ordering::SeqCst), 1);

        // Invalidation alone must not recompute anything.
        source.set(10);
        assert_eq!(mid_calls.load(Ordering::SeqCst), 1);

        assert_eq!(top.get(), 21);
        assert_eq!(mid_calls.load(Ordering::SeqCst), 2);
    }
}
