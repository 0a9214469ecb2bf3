//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI
//! framework. It implements:
//!
//! - Reactive primitives (wrapped objects, signals, computed values,
//!   watchers) over a fine-grained dependency store
//! - A deterministic batching scheduler with pre/main/post flush phases
//! - A virtual node tree and keyed reconciler emitting minimal host
//!   operations
//! - Component instances binding render functions to reactive effects
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: dependency tracking, effects, and derived primitives
//! - `scheduler`: id-ordered batched flushing of due effects
//! - `render`: virtual nodes, the host-operations trait, the reconciler
//! - `component`: component definitions and mounted instances
//! - `value`: the plain data model shared by all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_core::prelude::*;
//!
//! let dom = MemoryDom::new();
//! let renderer = Renderer::new(dom.clone());
//!
//! let counter = Arc::new(Component::new("Counter").with_setup(|_props, _ctx| {
//!     let state = reactive(RawObject::from_entries([("count", 0)]));
//!     Ok(Setup::Render(Arc::new(move |_| {
//!         Ok(h("p", (), format!("count: {}", state.get("count"))))
//!     })))
//! }));
//!
//! let app = create_app(renderer, counter, None);
//! app.mount(dom.create_root());
//! // ...mutate state, then settle the batch:
//! trellis_core::scheduler::flush_jobs()?;
//! ```

pub mod component;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;
pub mod value;

pub use component::{Component, ComponentInstance, Setup, SetupContext};
pub use error::{Error, ErrorSource};
pub use reactive::{
    effect, reactive, readonly, watch, watch_effect, Computed, FlushMode, Reactive,
    ReactiveEffect, Signal, WatchOptions,
};
pub use render::{
    comment, create_app, fragment, h, text, App, HostOps, MemoryDom, NodeId, Renderer, VNode,
    VNodeKind,
};
pub use scheduler::{flush_jobs, next_tick};
pub use value::{Handler, RawObject, Value};

/// Convenience re-exports for embedding code and tests.
pub mod prelude {
    pub use crate::component::{Component, Setup, SetupContext};
    pub use crate::error::{Error, ErrorSource};
    pub use crate::reactive::{
        effect, reactive, readonly, watch, watch_effect, Computed, FlushMode, Reactive, Signal,
        WatchOptions,
    };
    pub use crate::render::{
        comment, create_app, fragment, h, text, App, HostOps, MemoryDom, Renderer, VNode,
        VNodeKind,
    };
    pub use crate::scheduler::{flush_jobs, next_tick};
    pub use crate::value::{Handler, RawObject, Value};
}
