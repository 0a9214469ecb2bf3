//! Watchers
//!
//! A watcher observes the result of a tracked getter and fires a callback
//! when it changes. Unlike a bare effect, the callback does not run inside
//! the tracking context and its timing is configurable relative to the
//! render flush:
//!
//! - `FlushMode::Pre` (default): the callback runs in the pre-flush phase,
//!   observing fresh state before the owning render executes.
//! - `FlushMode::Post`: the callback runs after the host tree was
//!   produced.
//! - `FlushMode::Sync`: the callback runs synchronously on trigger,
//!   bypassing batching.
//!
//! A watcher created while a component's setup is running registers with
//! that component and stops with it.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::component;
use crate::error::{call_with_error_handling, Error, ErrorSource};
use crate::scheduler::{self, Job};
use crate::value::Value;

use super::effect::{EffectOptions, EffectScheduler, ReactiveEffect};
use super::wrapper::reactive;

/// When a watcher's callback runs relative to the render flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    Pre,
    Post,
    Sync,
}

/// Options controlling watcher creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire the callback once immediately with the initial value.
    pub immediate: bool,
    /// Track every nested field of object results, and treat every
    /// trigger as a change.
    pub deep: bool,
    pub flush: FlushMode,
}

/// Registration point for a cleanup closure that runs before the next
/// callback invocation and when the watcher stops.
pub struct OnInvalidate {
    slot: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl OnInvalidate {
    /// Register the cleanup for the current invocation.
    pub fn register(&self, f: impl FnOnce() + Send + 'static) {
        *self.slot.lock() = Some(Box::new(f));
    }
}

/// Stop handle returned by `watch` / `watch_effect`.
pub struct WatchHandle {
    effect: ReactiveEffect,
}

impl WatchHandle {
    /// Detach the watcher; no further callbacks will fire.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

/// Watcher callback: (new value, previous value, cleanup registrar).
pub type WatchCallback =
    dyn Fn(&Value, Option<&Value>, &OnInvalidate) -> Result<(), Error> + Send + Sync;

fn run_cleanup(slot: &Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>) {
    if let Some(cleanup) = slot.lock().take() {
        call_with_error_handling(ErrorSource::WatchCleanup, || {
            cleanup();
            Ok(())
        });
    }
}

fn policy_for(flush: FlushMode, job: Job) -> EffectScheduler {
    match flush {
        FlushMode::Sync => Arc::new(move |_| job.invoke()),
        FlushMode::Pre => Arc::new(move |_| scheduler::queue_pre_flush_cb(job.clone())),
        FlushMode::Post => Arc::new(move |_| scheduler::queue_post_flush_cb(job.clone())),
    }
}

/// Watch a tracked getter and invoke `cb` when its result changes.
pub fn watch(
    getter: impl Fn() -> Value + Send + Sync + 'static,
    cb: impl Fn(&Value, Option<&Value>, &OnInvalidate) -> Result<(), Error> + Send + Sync + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let deep = options.deep;

    // The effective getter optionally walks the whole result so that any
    // nested mutation becomes a dependency.
    let effective_getter = move || {
        let value = call_with_error_handling(ErrorSource::WatchGetter, || Ok(getter()))
            .unwrap_or(Value::Null);
        if deep {
            let mut seen = HashSet::new();
            traverse(&value, &mut seen);
        }
        value
    };

    // Latest getter result, written by the runner effect.
    let latest: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let previous: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let cleanup: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> = Arc::new(Mutex::new(None));

    // The job re-runs the getter and fires the callback on change. It
    // reaches the runner effect through a weak cell so neither owns the
    // other.
    let effect_cell: Arc<OnceLock<super::effect::WeakEffect>> = Arc::new(OnceLock::new());

    let cb: Arc<WatchCallback> = Arc::new(cb);
    let job = {
        let latest = latest.clone();
        let previous = previous.clone();
        let cleanup = cleanup.clone();
        let effect_cell = effect_cell.clone();
        let cb = cb.clone();
        Job::new(move || {
            let Some(runner) = effect_cell.get().and_then(|w| w.upgrade()) else {
                return;
            };
            if !runner.is_active() {
                return;
            }
            runner.run();

            let new_value = latest.lock().clone().unwrap_or(Value::Null);
            let old_value = previous.lock().clone();
            let fire = deep || old_value.as_ref() != Some(&new_value);
            if fire {
                run_cleanup(&cleanup);
                let registrar = OnInvalidate {
                    slot: cleanup.clone(),
                };
                call_with_error_handling(ErrorSource::WatchCallback, || {
                    cb(&new_value, old_value.as_ref(), &registrar)
                });
                *previous.lock() = Some(new_value);
            }
        })
        .allow_recurse(true)
    };

    let runner = {
        let latest = latest.clone();
        let cleanup_at_stop = cleanup.clone();
        ReactiveEffect::new(
            move || {
                *latest.lock() = Some(effective_getter());
            },
            EffectOptions {
                lazy: true,
                scheduler: Some(policy_for(options.flush, job.clone())),
                on_stop: Some(Box::new(move || run_cleanup(&cleanup_at_stop))),
                ..Default::default()
            },
        )
    };
    let _ = effect_cell.set(runner.downgrade());

    if options.immediate {
        job.invoke();
    } else {
        runner.run();
        *previous.lock() = latest.lock().clone();
    }

    component::register_effect(&runner);
    WatchHandle { effect: runner }
}

/// Run a tracked side effect that re-runs when anything it read changes.
pub fn watch_effect(
    f: impl Fn() + Send + Sync + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let effect_cell: Arc<OnceLock<super::effect::WeakEffect>> = Arc::new(OnceLock::new());

    let job = {
        let effect_cell = effect_cell.clone();
        Job::new(move || {
            if let Some(runner) = effect_cell.get().and_then(|w| w.upgrade()) {
                if runner.is_active() {
                    runner.run();
                }
            }
        })
        .allow_recurse(true)
    };

    let runner = ReactiveEffect::new(
        f,
        EffectOptions {
            lazy: true,
            scheduler: Some(policy_for(options.flush, job.clone())),
            ..Default::default()
        },
    );
    let _ = effect_cell.set(runner.downgrade());

    if options.flush == FlushMode::Post {
        scheduler::queue_post_flush_cb(job);
    } else {
        runner.run();
    }

    component::register_effect(&runner);
    WatchHandle { effect: runner }
}

/// Touch every nested field so deep watchers subscribe to all of them.
fn traverse(value: &Value, seen: &mut HashSet<u64>) {
    let Some(raw) = value.as_obj() else {
        return;
    };
    if !seen.insert(raw.id()) {
        return;
    }
    let view = reactive(raw.clone());
    if raw.is_list() {
        let len = view.len();
        for i in 0..len {
            traverse(&view.index(i), seen);
        }
    } else {
        for key in view.keys() {
            traverse(&view.get(&key), seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::wrapper::reactive;
    use crate::scheduler::flush_jobs;
    use crate::value::RawObject;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn sync_watch_fires_on_change_with_old_and_new() {
        let state = reactive(RawObject::from_entries([("count", 0)]));
        let log = Arc::new(Mutex::new(Vec::new()));

        let state_clone = state.clone();
        let log_clone = log.clone();
        let _handle = watch(
            move || state_clone.get("count"),
            move |new, old, _| {
                log_clone
                    .lock()
                    .push((old.cloned(), new.clone()));
                Ok(())
            },
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );
        assert!(log.lock().is_empty());

        state.set("count", 3);
        let entries = log.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Some(Value::from(0)));
        assert_eq!(entries[0].1, Value::from(3));
    }

    #[test]
    fn immediate_watch_fires_once_with_no_old_value() {
        let state = reactive(RawObject::from_entries([("x", 1)]));
        let log = Arc::new(Mutex::new(Vec::new()));

        let state_clone = state.clone();
        let log_clone = log.clone();
        let _handle = watch(
            move || state_clone.get("x"),
            move |new, old, _| {
                log_clone.lock().push((old.cloned(), new.clone()));
                Ok(())
            },
            WatchOptions {
                immediate: true,
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        let entries = log.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, None);
        assert_eq!(entries[0].1, Value::from(1));
    }

    #[test]
    fn pre_flush_watch_batches_until_flush() {
        let state = reactive(RawObject::from_entries([("n", 0)]));
        let fires = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let fires_clone = fires.clone();
        let _handle = watch(
            move || state_clone.get("n"),
            move |_, _, _| {
                fires_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatchOptions::default(),
        );

        state.set("n", 1);
        state.set("n", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        flush_jobs().unwrap();
        // Two writes in one synchronous section merge into one callback.
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unchanged_value_does_not_fire_callback() {
        let state = reactive(RawObject::from_entries([("a", 1), ("b", 1)]));
        let fires = Arc::new(AtomicI32::new(0));

        // Getter depends on both fields but returns only `a`.
        let state_clone = state.clone();
        let fires_clone = fires.clone();
        let _handle = watch(
            move || {
                let _ = state_clone.get("b");
                state_clone.get("a")
            },
            move |_, _, _| {
                fires_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        state.set("b", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        state.set("a", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stopped_watch_never_fires_again() {
        let state = reactive(RawObject::from_entries([("x", 0)]));
        let fires = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let fires_clone = fires.clone();
        let handle = watch(
            move || state_clone.get("x"),
            move |_, _, _| {
                fires_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        state.set("x", 1);
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        handle.stop();
        state.set("x", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_before_next_fire_and_on_stop() {
        let state = reactive(RawObject::from_entries([("x", 0)]));
        let cleanups = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let cleanups_clone = cleanups.clone();
        let handle = watch(
            move || state_clone.get("x"),
            move |_, _, on_invalidate| {
                let counter = cleanups_clone.clone();
                on_invalidate.register(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                Ok(())
            },
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        state.set("x", 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        state.set("x", 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deep_watch_sees_nested_mutations() {
        let inner = RawObject::from_entries([("leaf", 1)]);
        let state = reactive(RawObject::from_entries([("inner", inner.clone())]));
        let fires = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let fires_clone = fires.clone();
        let _handle = watch(
            move || state_clone.get("inner"),
            move |_, _, _| {
                fires_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatchOptions {
                deep: true,
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        reactive(inner).set("leaf", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watch_effect_reruns_through_scheduler() {
        let state = reactive(RawObject::from_entries([("x", 0)]));
        let runs = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let runs_clone = runs.clone();
        let _handle = watch_effect(
            move || {
                let _ = state_clone.get("x");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("x", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        flush_jobs().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn callback_fault_is_contained() {
        let state = reactive(RawObject::from_entries([("x", 0)]));
        let fires = Arc::new(AtomicI32::new(0));

        let state_clone = state.clone();
        let fires_clone = fires.clone();
        let _handle = watch(
            move || state_clone.get("x"),
            move |_, _, _| {
                fires_clone.fetch_add(1, Ordering::SeqCst);
                Err(Error::hook(ErrorSource::WatchCallback, "intentional"))
            },
            WatchOptions {
                flush: FlushMode::Sync,
                ..Default::default()
            },
        );

        // The fault is logged and swallowed; the watcher keeps working.
        state.set("x", 1);
        state.set("x", 2);
        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }
}
