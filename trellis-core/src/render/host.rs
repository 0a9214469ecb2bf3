//! Host Operations
//!
//! The reconciler never touches a host tree directly; every mutation goes
//! through the [`HostOps`] trait over opaque node ids. Any embedding that
//! can create nodes, insert them before an anchor, remove them, and write
//! text and properties can back this runtime.
//!
//! `MemoryDom` is the reference host: an in-memory node arena that keeps
//! real parent/child relationships (so anchor-relative insertion and
//! sibling queries behave like a browser tree) and records every
//! operation it performs. Tests assert against the operation log, and the
//! keyed-diff benchmark runs against it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::value::Value;

/// Opaque identifier of a host node.
pub type NodeId = u64;

/// The operation surface a host must provide.
pub trait HostOps: Send + Sync {
    fn create_element(&self, tag: &str) -> NodeId;
    fn create_text(&self, content: &str) -> NodeId;
    fn create_comment(&self, content: &str) -> NodeId;

    /// Replace the content of a text or comment node.
    fn set_text(&self, node: NodeId, content: &str);

    /// Replace an element's entire child content with raw text.
    fn set_element_text(&self, el: NodeId, content: &str);

    /// Insert `node` into `parent`, before `anchor` (append when `None`).
    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>);

    /// Detach a node from its parent.
    fn remove(&self, node: NodeId);

    fn parent_of(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling_of(&self, node: NodeId) -> Option<NodeId>;

    /// Write or remove (`new == None`) one property.
    fn patch_prop(&self, el: NodeId, key: &str, old: Option<&Value>, new: Option<&Value>);
}

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId },
    CreateComment { node: NodeId },
    SetText { node: NodeId, content: String },
    SetElementText { node: NodeId, content: String },
    Insert { node: NodeId, parent: NodeId, anchor: Option<NodeId> },
    Remove { node: NodeId },
    PatchProp { node: NodeId, key: String, value: Option<Value> },
}

#[derive(Debug, Clone)]
enum MemNodeKind {
    Root,
    Element(String),
    Text,
    Comment,
}

#[derive(Debug)]
struct MemNode {
    kind: MemNodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    props: IndexMap<String, Value>,
    text: String,
}

#[derive(Default)]
struct MemDomInner {
    nodes: HashMap<NodeId, MemNode>,
    next_id: NodeId,
    ops: Vec<HostOp>,
}

impl MemDomInner {
    fn alloc(&mut self, kind: MemNodeKind, text: String) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        self.nodes.insert(
            id,
            MemNode {
                kind,
                parent: None,
                children: Vec::new(),
                props: IndexMap::new(),
                text,
            },
        );
        id
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = None;
        }
    }
}

/// In-memory host tree with an operation log.
#[derive(Default)]
pub struct MemoryDom {
    inner: Mutex<MemDomInner>,
}

impl MemoryDom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a detached container node to mount into.
    pub fn create_root(&self) -> NodeId {
        self.inner.lock().alloc(MemNodeKind::Root, String::new())
    }

    /// Every operation performed so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.inner.lock().ops.clone()
    }

    /// Drain the operation log (typically called between test phases).
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.inner.lock().ops)
    }

    /// How many operations were performed since the last drain.
    pub fn op_count(&self) -> usize {
        self.inner.lock().ops.len()
    }

    /// Operations that move or remove host nodes (layout mutations), as
    /// opposed to text and property writes.
    pub fn structural_ops(&self) -> Vec<HostOp> {
        self.inner
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, HostOp::Insert { .. } | HostOp::Remove { .. }))
            .cloned()
            .collect()
    }

    /// Serialize a subtree to an HTML-like string for assertions.
    pub fn render_to_string(&self, node: NodeId) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        render_node(&inner, node, &mut out);
        out
    }

    /// A node's current property value.
    pub fn prop(&self, node: NodeId, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.props.get(key).cloned())
    }

    /// Child ids of a node, in tree order.
    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }
}

fn render_node(inner: &MemDomInner, id: NodeId, out: &mut String) {
    let Some(node) = inner.nodes.get(&id) else {
        return;
    };
    match &node.kind {
        MemNodeKind::Root => {
            for child in &node.children {
                render_node(inner, *child, out);
            }
        }
        MemNodeKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (key, value) in &node.props {
                if matches!(value, Value::Func(_)) {
                    continue;
                }
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&value.to_string());
                out.push('"');
            }
            out.push('>');
            if node.children.is_empty() {
                out.push_str(&node.text);
            } else {
                for child in &node.children {
                    render_node(inner, *child, out);
                }
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        MemNodeKind::Text => out.push_str(&node.text),
        MemNodeKind::Comment => {
            out.push_str("<!--");
            out.push_str(&node.text);
            out.push_str("-->");
        }
    }
}

impl HostOps for MemoryDom {
    fn create_element(&self, tag: &str) -> NodeId {
        let mut inner = self.inner.lock();
        let id = inner.alloc(MemNodeKind::Element(tag.to_string()), String::new());
        inner.ops.push(HostOp::CreateElement {
            node: id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_text(&self, content: &str) -> NodeId {
        let mut inner = self.inner.lock();
        let id = inner.alloc(MemNodeKind::Text, content.to_string());
        inner.ops.push(HostOp::CreateText { node: id });
        id
    }

    fn create_comment(&self, content: &str) -> NodeId {
        let mut inner = self.inner.lock();
        let id = inner.alloc(MemNodeKind::Comment, content.to_string());
        inner.ops.push(HostOp::CreateComment { node: id });
        id
    }

    fn set_text(&self, node: NodeId, content: &str) {
        let mut inner = self.inner.lock();
        if let Some(n) = inner.nodes.get_mut(&node) {
            n.text = content.to_string();
        }
        inner.ops.push(HostOp::SetText {
            node,
            content: content.to_string(),
        });
    }

    fn set_element_text(&self, el: NodeId, content: &str) {
        let mut inner = self.inner.lock();
        let children = inner
            .nodes
            .get(&el)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            inner.detach(child);
        }
        if let Some(n) = inner.nodes.get_mut(&el) {
            n.text = content.to_string();
        }
        inner.ops.push(HostOp::SetElementText {
            node: el,
            content: content.to_string(),
        });
    }

    fn insert(&self, node: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        let mut inner = self.inner.lock();
        inner.detach(node);
        let position = match anchor {
            Some(anchor) => inner
                .nodes
                .get(&parent)
                .and_then(|p| p.children.iter().position(|c| *c == anchor)),
            None => None,
        };
        if let Some(p) = inner.nodes.get_mut(&parent) {
            match position {
                Some(pos) => p.children.insert(pos, node),
                None => p.children.push(node),
            }
        }
        if let Some(n) = inner.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        inner.ops.push(HostOp::Insert {
            node,
            parent,
            anchor,
        });
    }

    fn remove(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        inner.detach(node);
        inner.ops.push(HostOp::Remove { node });
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.inner.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    fn next_sibling_of(&self, node: NodeId) -> Option<NodeId> {
        let inner = self.inner.lock();
        let parent = inner.nodes.get(&node).and_then(|n| n.parent)?;
        let siblings = &inner.nodes.get(&parent)?.children;
        let pos = siblings.iter().position(|c| *c == node)?;
        siblings.get(pos + 1).copied()
    }

    fn patch_prop(&self, el: NodeId, key: &str, _old: Option<&Value>, new: Option<&Value>) {
        let mut inner = self.inner.lock();
        if let Some(n) = inner.nodes.get_mut(&el) {
            match new {
                Some(value) => {
                    n.props.insert(key.to_string(), value.clone());
                }
                None => {
                    n.props.shift_remove(key);
                }
            }
        }
        inner.ops.push(HostOp::PatchProp {
            node: el,
            key: key.to_string(),
            value: new.cloned(),
        });
    }
}
