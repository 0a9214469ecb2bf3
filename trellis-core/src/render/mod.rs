//! Virtual Tree & Rendering Pipeline
//!
//! The render layer turns component output into host mutations:
//!
//! - `vnode`: the virtual node representation and construction surface
//! - `host`: the operations trait any embedding supplies, plus the
//!   in-memory reference host
//! - `renderer`: the mount/patch/unmount paths and the keyed diff
//! - `app`: the top-level mount surface

pub mod app;
pub mod host;
pub mod renderer;
pub mod vnode;

pub use app::{create_app, App};
pub use host::{HostOp, HostOps, MemoryDom, NodeId};
pub use renderer::Renderer;
pub use vnode::{comment, fragment, h, text, Children, Key, Props, VNode, VNodeKind};
