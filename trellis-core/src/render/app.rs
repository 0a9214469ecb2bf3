//! Application Surface
//!
//! `create_app` binds a root component definition to a renderer. Mounting
//! renders the root synchronously; subsequent reactive updates batch
//! through the scheduler and the embedder settles them with
//! [`flush_jobs`](crate::scheduler::flush_jobs) or
//! [`next_tick`](crate::scheduler::next_tick).

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::Component;
use crate::render::host::NodeId;
use crate::render::renderer::Renderer;
use crate::render::vnode::{Children, Props, VNode, VNodeKind};

/// A mountable application: one root component plus its root props.
pub struct App {
    renderer: Arc<Renderer>,
    root: Arc<Component>,
    root_props: Option<Props>,
    container: Mutex<Option<NodeId>>,
}

/// Create an application around a root component.
pub fn create_app(
    renderer: Arc<Renderer>,
    root: Arc<Component>,
    root_props: Option<Props>,
) -> App {
    App {
        renderer,
        root,
        root_props,
        container: Mutex::new(None),
    }
}

impl App {
    /// Mount the root component into a host container. Mounting an
    /// already-mounted app is a warned no-op.
    pub fn mount(&self, container: NodeId) {
        let mut mounted = self.container.lock();
        if mounted.is_some() {
            tracing::warn!("app is already mounted; ignoring the second mount");
            return;
        }

        let vnode = VNode::new(
            VNodeKind::Component(self.root.clone()),
            self.root_props.clone(),
            Children::None,
        );
        self.renderer.render(Some(vnode), container);
        *mounted = Some(container);
    }

    /// Unmount the root component and everything below it.
    pub fn unmount(&self) {
        let mut mounted = self.container.lock();
        match mounted.take() {
            Some(container) => self.renderer.render(None, container),
            None => tracing::warn!("app is not mounted; nothing to unmount"),
        }
    }

    /// Whether the app currently owns a container.
    pub fn is_mounted(&self) -> bool {
        self.container.lock().is_some()
    }
}
