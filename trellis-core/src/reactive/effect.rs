//! Effect Runtime
//!
//! A `ReactiveEffect` is a re-runnable computation that subscribes to
//! whatever reactive state it read during its last execution.
//!
//! # Execution Protocol
//!
//! Before each run the effect detaches itself from every subscriber set it
//! was recorded in, so stale subscriptions from a previous run can never
//! fire. It then pushes itself onto a thread-local running stack, enables
//! tracking, executes the computation, and pops on completion. The stack
//! (rather than a single slot) is what lets a nested effect restore the
//! outer effect as "current" when it finishes.
//!
//! # Re-entrancy
//!
//! An effect that would re-enter itself is suppressed by a membership test
//! against the running stack. When the effect allows recursion, the search
//! starts just past its own innermost frame, so one recursive hop is legal
//! while deeper self-nesting is still refused.
//!
//! # Scheduling Policy
//!
//! When a dependency changes, the effect is notified. Without a policy the
//! computation runs synchronously; with one, the policy decides (the
//! component renderer queues a scheduler job, watchers queue pre- or
//! post-flush callbacks). Manual `run()` always bypasses the policy.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::store::{self, DepKey, TargetId};

/// Unique identifier for an effect.
pub type EffectId = u64;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_effect_id() -> EffectId {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A scheduling policy invoked instead of running the effect directly.
pub type EffectScheduler = Arc<dyn Fn(&ReactiveEffect) + Send + Sync>;

/// Options controlling effect creation.
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run the computation at creation time.
    pub lazy: bool,
    /// Allow one level of self-triggered re-execution.
    pub allow_recurse: bool,
    /// Deferred-execution policy used when a dependency notifies.
    pub scheduler: Option<EffectScheduler>,
    /// Invoked exactly once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce() + Send>>,
}

struct EffectInner {
    id: EffectId,

    /// The user computation.
    func: Box<dyn Fn() + Send + Sync>,

    /// Cleared by `stop`; a stopped effect is never notified again.
    active: AtomicBool,

    allow_recurse: bool,

    scheduler: Option<EffectScheduler>,

    /// One-shot stop hook.
    on_stop: Mutex<Option<Box<dyn FnOnce() + Send>>>,

    /// Every (target, key) subscriber set this effect is recorded in,
    /// kept for detachment before the next run and at stop.
    deps: Mutex<SmallVec<[(TargetId, DepKey); 4]>>,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        unregister(self.id);
        let deps = std::mem::take(&mut *self.deps.lock());
        for (target, key) in deps {
            store::remove_subscriber(target, &key, self.id);
        }
    }
}

/// Shared handle to a reactive computation.
#[derive(Clone)]
pub struct ReactiveEffect {
    inner: Arc<EffectInner>,
}

// Global registry resolving effect ids to live effects. Weak entries keep
// the dependency store from owning effects.
static REGISTRY: OnceLock<RwLock<HashMap<EffectId, Weak<EffectInner>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<EffectId, Weak<EffectInner>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn unregister(id: EffectId) {
    if let Some(reg) = REGISTRY.get() {
        reg.write().remove(&id);
    }
}

/// Resolve a batch of effect ids to live handles, preserving order.
pub(crate) fn lookup(ids: &[EffectId]) -> Vec<ReactiveEffect> {
    let reg = registry().read();
    ids.iter()
        .filter_map(|id| reg.get(id))
        .filter_map(Weak::upgrade)
        .map(|inner| ReactiveEffect { inner })
        .collect()
}

thread_local! {
    static EFFECT_STACK: RefCell<Vec<ReactiveEffect>> = const { RefCell::new(Vec::new()) };
}

/// The innermost currently running effect, if any.
pub(crate) fn active_effect() -> Option<ReactiveEffect> {
    EFFECT_STACK.with(|s| s.borrow().last().cloned())
}

/// Pops the running stack and restores tracking even if the computation
/// unwinds.
struct RunGuard;

impl Drop for RunGuard {
    fn drop(&mut self) {
        EFFECT_STACK.with(|s| {
            s.borrow_mut().pop();
        });
        store::reset_tracking();
    }
}

impl ReactiveEffect {
    /// Create an effect and, unless `options.lazy`, run it once to
    /// establish its initial dependencies.
    pub fn new(f: impl Fn() + Send + Sync + 'static, options: EffectOptions) -> Self {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            func: Box::new(f),
            active: AtomicBool::new(true),
            allow_recurse: options.allow_recurse,
            scheduler: options.scheduler,
            on_stop: Mutex::new(options.on_stop),
            deps: Mutex::new(SmallVec::new()),
        });
        registry().write().insert(inner.id, Arc::downgrade(&inner));

        let effect = Self { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// The effect's unique id.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Whether the effect still reacts to notifications.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub(crate) fn allows_recursion(&self) -> bool {
        self.inner.allow_recurse
    }

    /// Downgrade to a weak handle (used to break job/effect cycles).
    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Arc::downgrade(&self.inner))
    }

    /// Execute the computation now, outside any scheduling policy.
    ///
    /// A stopped effect still executes, but without dependency cleanup or
    /// collection: it runs as a plain function call.
    pub fn run(&self) {
        if !self.is_active() {
            (self.inner.func)();
            return;
        }
        if !self.can_run() {
            return;
        }

        self.cleanup();

        EFFECT_STACK.with(|s| s.borrow_mut().push(self.clone()));
        store::enable_tracking();
        let _guard = RunGuard;

        (self.inner.func)();
    }

    /// Re-entrancy check against the running stack.
    fn can_run(&self) -> bool {
        EFFECT_STACK.with(|s| {
            let stack = s.borrow();
            if self.inner.allow_recurse {
                // Skip our own innermost frame; a second frame below it
                // means runaway recursion.
                match stack.iter().position(|e| e.id() == self.id()) {
                    Some(pos) => !stack[pos + 1..].iter().any(|e| e.id() == self.id()),
                    None => true,
                }
            } else {
                !stack.iter().any(|e| e.id() == self.id())
            }
        })
    }

    /// Dependency-change notification: defer to the policy when present.
    pub(crate) fn notify(&self) {
        if !self.is_active() {
            return;
        }
        match &self.inner.scheduler {
            Some(policy) => policy(self),
            None => self.run(),
        }
    }

    /// Record membership in a subscriber set (called by the store).
    pub(crate) fn record_dep(&self, target: TargetId, key: DepKey) {
        self.inner.deps.lock().push((target, key));
    }

    /// Detach from every subscriber set recorded by the previous run.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.lock());
        for (target, key) in deps {
            store::remove_subscriber(target, &key, self.id());
        }
    }

    /// Permanently deactivate the effect: detach all subscriptions and run
    /// the stop hook exactly once. Manual `run()` keeps working.
    pub fn stop(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.cleanup();
            if let Some(hook) = self.inner.on_stop.lock().take() {
                hook();
            }
        }
    }
}

impl std::fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("dep_count", &self.inner.deps.lock().len())
            .finish()
    }
}

/// Weak counterpart of `ReactiveEffect`.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<ReactiveEffect> {
        self.0.upgrade().map(|inner| ReactiveEffect { inner })
    }
}

/// Create an effect with default options and run it immediately.
pub fn effect(f: impl Fn() + Send + Sync + 'static) -> ReactiveEffect {
    ReactiveEffect::new(f, EffectOptions::default())
}
