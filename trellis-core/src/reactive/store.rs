//! Dependency Store
//!
//! The store is a per-target, per-key subscriber registry: it records which
//! effects read which piece of data, and notifies those effects when the
//! data changes.
//!
//! # Structure
//!
//! Two global tables:
//!
//! - `TargetId -> DepKey -> IndexSet<EffectId>`: the subscriber sets. A
//!   target is any trackable unit (a structured object, a signal cell, a
//!   computed cell). Set semantics guarantee an effect appears at most once
//!   per key; insertion order is preserved so notification order is
//!   deterministic.
//! - effects are resolved through a weak registry owned by the effect
//!   runtime, so the store never keeps an effect alive on its own.
//!
//! Subscriber sets are created lazily on first tracked read. An emptied set
//! is logically absent and may linger; a target's whole entry is purged
//! when the target is dropped.
//!
//! # Tracking Gate
//!
//! A thread-local flag stack controls whether reads record dependencies.
//! `pause_tracking` / `enable_tracking` push the current state and
//! `reset_tracking` restores it, mirroring the running-effect stack so a
//! stopped effect can never re-subscribe itself mid-teardown.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::effect::{self, EffectId};

/// Identifier of a trackable target (object, signal, or computed cell).
pub type TargetId = u64;

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique target ID.
pub(crate) fn next_target_id() -> TargetId {
    TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The key within a target that a dependency is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named field of a map object.
    Prop(Arc<str>),
    /// A position in a list object.
    Index(usize),
    /// The length of a list (or field count of a map).
    Length,
    /// The single value of a signal or computed cell.
    Value,
}

impl DepKey {
    /// Build a field key.
    pub fn prop(name: impl AsRef<str>) -> Self {
        Self::Prop(Arc::from(name.as_ref()))
    }
}

/// The kind of mutation being reported to `trigger`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TriggerOp {
    /// An existing entry changed value.
    Set,
    /// A new entry appeared (new map field, or list write past the end).
    /// Notifies the written key plus `Length` subscribers.
    Add,
    /// A list shrank. Notifies `Length` plus every index at or past the
    /// new length.
    Resize { new_len: usize },
}

type SubscriberMap = HashMap<TargetId, HashMap<DepKey, IndexSet<EffectId>>>;

static SUBSCRIBERS: OnceLock<RwLock<SubscriberMap>> = OnceLock::new();

fn subscribers() -> &'static RwLock<SubscriberMap> {
    SUBSCRIBERS.get_or_init(|| RwLock::new(HashMap::new()))
}

thread_local! {
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// Whether reads currently record dependencies on this thread.
pub fn is_tracking() -> bool {
    SHOULD_TRACK.with(|t| t.get())
}

/// Disable dependency collection until the matching `reset_tracking`.
pub fn pause_tracking() {
    TRACK_STACK.with(|s| s.borrow_mut().push(is_tracking()));
    SHOULD_TRACK.with(|t| t.set(false));
}

/// Enable dependency collection until the matching `reset_tracking`.
pub fn enable_tracking() {
    TRACK_STACK.with(|s| s.borrow_mut().push(is_tracking()));
    SHOULD_TRACK.with(|t| t.set(true));
}

/// Restore the tracking state saved by the last pause/enable.
pub fn reset_tracking() {
    let last = TRACK_STACK.with(|s| s.borrow_mut().pop());
    SHOULD_TRACK.with(|t| t.set(last.unwrap_or(true)));
}

/// Record that the running effect (if any) depends on `(target, key)`.
pub(crate) fn track(target: TargetId, key: DepKey) {
    if !is_tracking() {
        return;
    }
    let Some(current) = effect::active_effect() else {
        return;
    };

    let mut map = subscribers().write();
    let set = map.entry(target).or_default().entry(key.clone()).or_default();
    if set.insert(current.id()) {
        // Both sides remember the edge: the effect needs the (target, key)
        // pair to detach itself before its next run.
        current.record_dep(target, key);
    }
}

/// Notify subscribers of a mutation on `(target, key)`.
///
/// The currently running effect is skipped unless it allows recursion.
/// Collection happens under the lock; execution happens after it is
/// released, since a notified effect will re-track immediately.
pub(crate) fn trigger(target: TargetId, op: TriggerOp, key: Option<DepKey>) {
    let due: Vec<EffectId> = {
        let map = subscribers().read();
        let Some(keys) = map.get(&target) else {
            return;
        };

        let mut due: IndexSet<EffectId> = IndexSet::new();
        let mut add_set = |set: Option<&IndexSet<EffectId>>| {
            if let Some(set) = set {
                due.extend(set.iter().copied());
            }
        };

        match op {
            TriggerOp::Set => {
                if let Some(key) = &key {
                    add_set(keys.get(key));
                }
            }
            TriggerOp::Add => {
                if let Some(key) = &key {
                    add_set(keys.get(key));
                }
                add_set(keys.get(&DepKey::Length));
            }
            TriggerOp::Resize { new_len } => {
                add_set(keys.get(&DepKey::Length));
                for (k, set) in keys.iter() {
                    if let DepKey::Index(i) = k {
                        if *i >= new_len {
                            add_set(Some(set));
                        }
                    }
                }
            }
        }
        due.into_iter().collect()
    };

    if due.is_empty() {
        return;
    }

    let running = effect::active_effect();
    for eff in effect::lookup(&due) {
        if let Some(current) = &running {
            if current.id() == eff.id() && !eff.allows_recursion() {
                continue;
            }
        }
        eff.notify();
    }
}

/// Remove one effect from one subscriber set (effect cleanup path).
pub(crate) fn remove_subscriber(target: TargetId, key: &DepKey, effect_id: EffectId) {
    let mut map = subscribers().write();
    if let Some(keys) = map.get_mut(&target) {
        if let Some(set) = keys.get_mut(key) {
            set.shift_remove(&effect_id);
        }
    }
}

/// Drop every subscriber set of a target (called when the target drops).
pub(crate) fn purge_target(target: TargetId) {
    if let Some(map) = SUBSCRIBERS.get() {
        map.write().remove(&target);
    }
}

/// Number of subscribers currently recorded for `(target, key)`.
///
/// Diagnostic accessor, mainly for tests asserting subscription lifecycles.
pub fn subscriber_count(target: TargetId, key: &DepKey) -> usize {
    subscribers()
        .read()
        .get(&target)
        .and_then(|keys| keys.get(key))
        .map(|set| set.len())
        .unwrap_or(0)
}
