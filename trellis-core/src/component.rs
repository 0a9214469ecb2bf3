//! Component Instances
//!
//! A `Component` is a definition: an optional `setup` and/or a `render`
//! function. A `ComponentInstance` binds one mounted occurrence of that
//! definition to its props, its state, its render effect, and the subtree
//! it last produced.
//!
//! # Instance Numbering
//!
//! Instance uids come from the scheduler's job counter, in creation
//! order. A parent is always instantiated before its children, so when
//! instances push their update jobs, ancestors sort ahead of descendants
//! in the flush.
//!
//! # Current Instance
//!
//! While `setup` or `render` runs, the instance is pushed onto a
//! thread-local stack. Watchers created during `setup` find it there and
//! attach themselves, so stopping the component stops them too.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{call_with_error_handling, Error, ErrorSource};
use crate::reactive::effect::ReactiveEffect;
use crate::reactive::wrapper::{reactive, Reactive};
use crate::render::vnode::{comment, Props, VNode};
use crate::scheduler::{self, Job};
use crate::value::{RawObject, Value};

/// A component's render function. Receives the owning instance for
/// access to props and state.
pub type RenderFn = Arc<dyn Fn(&ComponentInstance) -> Result<VNode, Error> + Send + Sync>;

/// A component's setup function. Receives a read-only view of the props
/// and a context for emitting events.
pub type SetupFn = Arc<dyn Fn(Reactive, &SetupContext) -> Result<Setup, Error> + Send + Sync>;

/// What `setup` produced.
pub enum Setup {
    /// A render closure; overrides the definition-level `render`.
    Render(RenderFn),
    /// A state object exposed to the definition-level `render`.
    State(Reactive),
}

/// A component definition.
pub struct Component {
    name: Option<String>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
}

impl Component {
    /// A named definition with neither setup nor render yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            setup: None,
            render: None,
        }
    }

    /// An unnamed definition.
    pub fn anonymous() -> Self {
        Self {
            name: None,
            setup: None,
            render: None,
        }
    }

    /// Attach a setup function.
    pub fn with_setup(
        mut self,
        f: impl Fn(Reactive, &SetupContext) -> Result<Setup, Error> + Send + Sync + 'static,
    ) -> Self {
        self.setup = Some(Arc::new(f));
        self
    }

    /// Attach a render function.
    pub fn with_render(
        mut self,
        f: impl Fn(&ComponentInstance) -> Result<VNode, Error> + Send + Sync + 'static,
    ) -> Self {
        self.render = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Context handed to `setup`.
pub struct SetupContext {
    instance: Weak<ComponentInstance>,
}

impl SetupContext {
    /// Invoke the `on<Event>` handler prop of the owning vnode.
    pub fn emit(&self, event: &str, payload: Value) {
        if let Some(instance) = self.instance.upgrade() {
            instance.emit(event, payload);
        }
    }
}

/// One mounted occurrence of a component definition.
pub struct ComponentInstance {
    uid: u64,
    def: Arc<Component>,
    parent: Weak<ComponentInstance>,

    /// The component-typed vnode currently representing this instance.
    vnode: RwLock<VNode>,
    /// Replacement vnode set by the parent ahead of a forced update.
    next: RwLock<Option<VNode>>,

    /// Reactive props object; render effects re-run when entries change.
    props: Reactive,
    /// State object returned by `setup`, if any.
    state: RwLock<Option<Reactive>>,

    render_fn: RwLock<Option<RenderFn>>,

    /// The subtree produced by the last successful render.
    subtree: RwLock<Option<VNode>>,

    /// The render effect driving mount and updates.
    update: RwLock<Option<ReactiveEffect>>,
    /// The scheduler job wrapping the render effect, id = uid.
    update_job: RwLock<Option<Job>>,

    /// Effects registered during setup (watchers); stopped on unmount.
    effects: Mutex<Vec<ReactiveEffect>>,

    is_mounted: AtomicBool,
    is_unmounted: AtomicBool,
}

impl ComponentInstance {
    /// Create an instance for a component-typed vnode.
    pub(crate) fn new(
        vnode: VNode,
        def: Arc<Component>,
        parent: Option<&Arc<ComponentInstance>>,
    ) -> Arc<Self> {
        let props_obj = match vnode.props() {
            Some(props) => RawObject::from_entries(
                props.iter().map(|(k, v)| (k.clone(), v.clone())),
            ),
            None => RawObject::map(),
        };

        Arc::new(Self {
            uid: scheduler::next_job_id(),
            def,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            vnode: RwLock::new(vnode),
            next: RwLock::new(None),
            props: reactive(props_obj),
            state: RwLock::new(None),
            render_fn: RwLock::new(None),
            subtree: RwLock::new(None),
            update: RwLock::new(None),
            update_job: RwLock::new(None),
            effects: Mutex::new(Vec::new()),
            is_mounted: AtomicBool::new(false),
            is_unmounted: AtomicBool::new(false),
        })
    }

    /// Creation-ordered uid; doubles as the update job id.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn definition(&self) -> &Arc<Component> {
        &self.def
    }

    pub fn parent(&self) -> Option<Arc<ComponentInstance>> {
        self.parent.upgrade()
    }

    /// The reactive props object (mutable handle; the renderer writes
    /// through it during forced updates).
    pub fn props(&self) -> Reactive {
        self.props.clone()
    }

    /// The state object returned by `setup`, if any.
    pub fn state(&self) -> Option<Reactive> {
        self.state.read().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_mounted(&self) {
        self.is_mounted.store(true, Ordering::SeqCst);
    }

    pub fn is_unmounted(&self) -> bool {
        self.is_unmounted.load(Ordering::SeqCst)
    }

    pub(crate) fn vnode(&self) -> VNode {
        self.vnode.read().clone()
    }

    pub(crate) fn set_vnode(&self, vnode: VNode) {
        *self.vnode.write() = vnode;
    }

    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.next.write().take()
    }

    pub(crate) fn set_next(&self, vnode: VNode) {
        *self.next.write() = Some(vnode);
    }

    pub(crate) fn subtree(&self) -> Option<VNode> {
        self.subtree.read().clone()
    }

    pub(crate) fn set_subtree(&self, subtree: VNode) {
        *self.subtree.write() = Some(subtree);
    }

    pub(crate) fn take_subtree(&self) -> Option<VNode> {
        self.subtree.write().take()
    }

    pub(crate) fn set_update(&self, effect: ReactiveEffect, job: Job) {
        *self.update.write() = Some(effect);
        *self.update_job.write() = Some(job);
    }

    pub(crate) fn update_effect(&self) -> Option<ReactiveEffect> {
        self.update.read().clone()
    }

    /// Run `setup`, resolving the render function. A setup fault is
    /// logged and the definition-level render (if any) is used instead.
    pub(crate) fn setup(self: &Arc<Self>) {
        let _guard = push_current(self.clone());
        let mut render = self.def.render.clone();

        if let Some(setup_fn) = self.def.setup.clone() {
            let ctx = SetupContext {
                instance: Arc::downgrade(self),
            };
            let props_view = self.props.as_readonly();
            match call_with_error_handling(ErrorSource::SetupFunction, || {
                setup_fn(props_view, &ctx)
            }) {
                Some(Setup::Render(f)) => render = Some(f),
                Some(Setup::State(state)) => *self.state.write() = Some(state),
                None => {}
            }
        }

        if render.is_none() {
            tracing::warn!(
                component = self.def.name(),
                "component has no render function; a comment placeholder will be rendered"
            );
        }
        *self.render_fn.write() = render;
    }

    /// Produce the next subtree. `None` means the render function
    /// faulted; the caller keeps the previous tree.
    pub(crate) fn render_root(self: &Arc<Self>) -> Option<VNode> {
        let Some(render) = self.render_fn.read().clone() else {
            return Some(comment(""));
        };

        let _guard = push_current(self.clone());
        let result = call_with_error_handling(ErrorSource::RenderFunction, || render(self));
        result.map(|node| {
            if node.is_mounted() {
                node.clone_fresh()
            } else {
                node
            }
        })
    }

    /// Reconcile the reactive props object with the next vnode's props.
    /// Only genuinely changed entries notify.
    pub(crate) fn update_props(&self, next: Option<&Props>) {
        if let Some(next) = next {
            for (key, value) in next {
                if self.props.get(key) != *value {
                    self.props.set(key, value.clone());
                }
            }
        }
        for key in self.props.keys() {
            if next.map_or(true, |n| !n.contains_key(&key)) {
                self.props.remove(&key);
            }
        }
    }

    /// Invoke the `on<Event>` handler prop, isolating handler faults.
    pub fn emit(&self, event: &str, payload: Value) {
        let handler_key = handler_prop_name(event);
        let vnode = self.vnode();
        let handler = vnode
            .props()
            .and_then(|props| props.get(&handler_key))
            .cloned();

        match handler {
            Some(Value::Func(handler)) => {
                call_with_error_handling(ErrorSource::ComponentEventHandler, || {
                    handler.call(payload)
                });
            }
            Some(_) => {
                tracing::warn!(event, prop = handler_key, "event handler prop is not callable");
            }
            None => {}
        }
    }

    /// Stop everything that could re-enter this instance: watchers, the
    /// render effect, and its queued job.
    pub(crate) fn teardown(&self) {
        for effect in self.effects.lock().drain(..) {
            effect.stop();
        }
        if let Some(update) = self.update.write().take() {
            update.stop();
        }
        self.update_job.write().take();
        scheduler::invalidate_job(self.uid);
        self.is_unmounted.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.def.name())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// "click" -> "onClick".
fn handler_prop_name(event: &str) -> String {
    let mut name = String::with_capacity(event.len() + 2);
    name.push_str("on");
    let mut chars = event.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

/// Decide whether a parent-driven re-render needs to touch the child at
/// all: unchanged props and childless nodes skip the render effect.
pub(crate) fn should_update_component(prev: &VNode, next: &VNode) -> bool {
    use crate::render::vnode::Children;

    let children_force = !matches!(
        (prev.children(), next.children()),
        (Children::None, Children::None)
    );
    children_force || prev.props() != next.props()
}

thread_local! {
    static INSTANCE_STACK: RefCell<Vec<Arc<ComponentInstance>>> = const { RefCell::new(Vec::new()) };
}

/// The instance whose setup or render is currently executing.
pub fn current_instance() -> Option<Arc<ComponentInstance>> {
    INSTANCE_STACK.with(|s| s.borrow().last().cloned())
}

pub(crate) struct InstanceGuard;

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

pub(crate) fn push_current(instance: Arc<ComponentInstance>) -> InstanceGuard {
    INSTANCE_STACK.with(|s| s.borrow_mut().push(instance));
    InstanceGuard
}

/// Attach an effect to the current instance, if setup is running.
pub(crate) fn register_effect(effect: &ReactiveEffect) {
    if let Some(instance) = current_instance() {
        instance.effects.lock().push(effect.clone());
    }
}
