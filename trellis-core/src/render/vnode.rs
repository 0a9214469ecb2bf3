//! Virtual Nodes
//!
//! A `VNode` is an immutable description of one rendered unit: an element,
//! a text node, a comment, a fragment marker, or a component placeholder.
//! The reconciler diffs a fresh tree against its predecessor to compute
//! minimal host mutations.
//!
//! # Sameness
//!
//! Two nodes are "the same node across renders" iff their kind and key are
//! equal. That identity, not deep equality, decides whether the reconciler
//! reuses the host node (patch in place) or replaces it (unmount and
//! remount).
//!
//! # Mount State
//!
//! Kind, key, props, and children are fixed at construction. What a node
//! acquired by being mounted (its host node, a fragment's end anchor, a
//! component's instance) lives in a separate slot filled in during
//! patching. A node handle that already carries mount state and reappears
//! in a new tree is cloned fresh at construction time, so one mounted
//! handle is never claimed by two trees.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::component::{Component, ComponentInstance};
use crate::value::Value;

use super::host::NodeId;

/// Props attached to a node, in declaration order.
pub type Props = IndexMap<String, Value>;

/// Stable identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Arc<str>),
    Num(i64),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s.as_str()))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Num(n)
    }
}

/// The kind of rendered unit a node describes.
#[derive(Clone)]
pub enum VNodeKind {
    /// A host element with a tag name.
    Element(Arc<str>),
    /// A text node; content lives in the children slot.
    Text,
    /// A comment node; content lives in the children slot.
    Comment,
    /// A keyed grouping with no host node of its own; delimited by two
    /// empty text anchors.
    Fragment,
    /// A component placeholder resolved through its definition.
    Component(Arc<Component>),
}

impl PartialEq for VNodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Element(a), Self::Element(b)) => a == b,
            (Self::Text, Self::Text) => true,
            (Self::Comment, Self::Comment) => true,
            (Self::Fragment, Self::Fragment) => true,
            (Self::Component(a), Self::Component(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Element(tag) => write!(f, "Element({tag})"),
            Self::Text => f.write_str("Text"),
            Self::Comment => f.write_str("Comment"),
            Self::Fragment => f.write_str("Fragment"),
            Self::Component(def) => match def.name() {
                Some(name) => write!(f, "Component({name})"),
                None => f.write_str("Component"),
            },
        }
    }
}

impl From<&str> for VNodeKind {
    fn from(tag: &str) -> Self {
        Self::Element(Arc::from(tag))
    }
}

impl From<Arc<Component>> for VNodeKind {
    fn from(def: Arc<Component>) -> Self {
        Self::Component(def)
    }
}

/// A node's children.
#[derive(Clone, Debug)]
pub enum Children {
    None,
    Text(Arc<str>),
    Nodes(Vec<VNode>),
}

impl Children {
    /// The child list, when children are nodes.
    pub fn as_nodes(&self) -> Option<&[VNode]> {
        match self {
            Self::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// The text content, when children are text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Default)]
struct MountState {
    /// Host node produced by mounting (for fragments: the start anchor).
    el: Option<NodeId>,
    /// Fragment end anchor.
    anchor: Option<NodeId>,
    /// Component instance bound at mount.
    component: Option<Arc<ComponentInstance>>,
}

struct VNodeInner {
    kind: VNodeKind,
    key: Option<Key>,
    props: Option<Props>,
    children: Children,
    state: RwLock<MountState>,
}

/// Shared handle to one virtual node.
#[derive(Clone)]
pub struct VNode {
    inner: Arc<VNodeInner>,
}

impl VNode {
    fn from_parts(
        kind: VNodeKind,
        key: Option<Key>,
        props: Option<Props>,
        children: Children,
    ) -> Self {
        Self {
            inner: Arc::new(VNodeInner {
                kind,
                key,
                props,
                children,
                state: RwLock::new(MountState::default()),
            }),
        }
    }

    /// Build a node, extracting the `key` prop and normalizing children
    /// for the node kind.
    pub fn new(kind: VNodeKind, mut props: Option<Props>, children: Children) -> Self {
        let key = props.as_mut().and_then(extract_key);
        if let Some(p) = &props {
            if p.contains_key("") {
                tracing::warn!("empty prop name on vnode ignored by the renderer");
            }
        }
        let children = normalize_children(&kind, children);
        Self::from_parts(kind, key, props, children)
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.inner.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.inner.key.as_ref()
    }

    pub fn props(&self) -> Option<&Props> {
        self.inner.props.as_ref()
    }

    pub fn children(&self) -> &Children {
        &self.inner.children
    }

    /// Host node acquired at mount (a fragment's start anchor).
    pub fn el(&self) -> Option<NodeId> {
        self.inner.state.read().el
    }

    pub(crate) fn set_el(&self, el: Option<NodeId>) {
        self.inner.state.write().el = el;
    }

    /// Fragment end anchor.
    pub fn anchor(&self) -> Option<NodeId> {
        self.inner.state.read().anchor
    }

    pub(crate) fn set_anchor(&self, anchor: Option<NodeId>) {
        self.inner.state.write().anchor = anchor;
    }

    /// Bound component instance, for component nodes that are mounted.
    pub fn component(&self) -> Option<Arc<ComponentInstance>> {
        self.inner.state.read().component.clone()
    }

    pub(crate) fn set_component(&self, instance: Option<Arc<ComponentInstance>>) {
        self.inner.state.write().component = instance;
    }

    /// Whether this handle already produced host content.
    pub fn is_mounted(&self) -> bool {
        self.inner.state.read().el.is_some()
    }

    /// Same-node test: kind and key both equal.
    pub fn same_vnode_type(&self, other: &VNode) -> bool {
        self.inner.kind == other.inner.kind && self.inner.key == other.inner.key
    }

    /// Deep copy with cleared mount state (the children list is copied
    /// recursively so no mounted handle is shared with the clone).
    pub fn clone_fresh(&self) -> VNode {
        let children = match &self.inner.children {
            Children::Nodes(nodes) => {
                Children::Nodes(nodes.iter().map(VNode::clone_fresh).collect())
            }
            other => other.clone(),
        };
        Self::from_parts(
            self.inner.kind.clone(),
            self.inner.key.clone(),
            self.inner.props.clone(),
            children,
        )
    }
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.inner.kind)
            .field("key", &self.inner.key)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

fn extract_key(props: &mut Props) -> Option<Key> {
    match props.shift_remove("key") {
        Some(Value::Str(s)) => Some(Key::Str(s)),
        Some(Value::Num(n)) => {
            if n.is_nan() {
                tracing::warn!("vnode key is NaN; ignoring it");
                None
            } else {
                Some(Key::Num(n as i64))
            }
        }
        Some(Value::Null) | None => None,
        Some(other) => {
            tracing::warn!(value = %other, "unsupported vnode key type; ignoring it");
            None
        }
    }
}

fn normalize_children(kind: &VNodeKind, children: Children) -> Children {
    let children = match (kind, children) {
        // Text-bearing nodes always carry text content.
        (VNodeKind::Text | VNodeKind::Comment, Children::Text(t)) => Children::Text(t),
        (VNodeKind::Text | VNodeKind::Comment, Children::None) => Children::Text(Arc::from("")),
        (VNodeKind::Text | VNodeKind::Comment, Children::Nodes(_)) => {
            tracing::warn!("text/comment nodes cannot have node children; dropping them");
            Children::Text(Arc::from(""))
        }
        // Fragments always carry a child list.
        (VNodeKind::Fragment, Children::Nodes(nodes)) => Children::Nodes(nodes),
        (VNodeKind::Fragment, Children::Text(t)) => Children::Nodes(vec![text(&*t)]),
        (VNodeKind::Fragment, Children::None) => Children::Nodes(Vec::new()),
        (_, c) => c,
    };

    // A handle that was mounted in a previous tree must not be claimed
    // twice; give the new tree its own copy.
    match children {
        Children::Nodes(nodes) => Children::Nodes(
            nodes
                .into_iter()
                .map(|n| if n.is_mounted() { n.clone_fresh() } else { n })
                .collect(),
        ),
        other => other,
    }
}

// ----------------------------------------------------------------------
// Construction surface
// ----------------------------------------------------------------------

/// Middle argument of [`h`]: either a props map or something child-like.
///
/// This mirrors the two-argument construction overloads: a map-like
/// second argument means "props, no children", anything child-like means
/// "no props, these are the children".
pub enum PropsOrChildren {
    None,
    Props(Props),
    Children(Children),
}

impl From<()> for PropsOrChildren {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<Props> for PropsOrChildren {
    fn from(p: Props) -> Self {
        Self::Props(p)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for PropsOrChildren {
    fn from(entries: [(&str, Value); N]) -> Self {
        Self::Props(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl From<&str> for PropsOrChildren {
    fn from(s: &str) -> Self {
        Self::Children(Children::Text(Arc::from(s)))
    }
}

impl From<String> for PropsOrChildren {
    fn from(s: String) -> Self {
        Self::Children(Children::Text(Arc::from(s.as_str())))
    }
}

impl From<VNode> for PropsOrChildren {
    fn from(n: VNode) -> Self {
        Self::Children(Children::Nodes(vec![n]))
    }
}

impl From<Vec<VNode>> for PropsOrChildren {
    fn from(nodes: Vec<VNode>) -> Self {
        Self::Children(Children::Nodes(nodes))
    }
}

/// Trailing argument of [`h`]: the children in any accepted shape.
pub enum ChildrenArg {
    None,
    Text(Arc<str>),
    Node(VNode),
    Nodes(Vec<VNode>),
}

impl From<()> for ChildrenArg {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<&str> for ChildrenArg {
    fn from(s: &str) -> Self {
        Self::Text(Arc::from(s))
    }
}

impl From<String> for ChildrenArg {
    fn from(s: String) -> Self {
        Self::Text(Arc::from(s.as_str()))
    }
}

impl From<VNode> for ChildrenArg {
    fn from(n: VNode) -> Self {
        Self::Node(n)
    }
}

impl From<Vec<VNode>> for ChildrenArg {
    fn from(nodes: Vec<VNode>) -> Self {
        Self::Nodes(nodes)
    }
}

impl From<ChildrenArg> for Children {
    fn from(arg: ChildrenArg) -> Self {
        match arg {
            ChildrenArg::None => Children::None,
            ChildrenArg::Text(t) => Children::Text(t),
            ChildrenArg::Node(n) => Children::Nodes(vec![n]),
            ChildrenArg::Nodes(nodes) => Children::Nodes(nodes),
        }
    }
}

/// Construct a virtual node.
///
/// The middle argument is either a props map or the children (the
/// two-argument overload of the construction call, discriminated by type
/// instead of at runtime); the trailing argument is the children when
/// props are present. Children passed in both positions is a warned
/// mistake, and the trailing argument wins.
pub fn h(
    kind: impl Into<VNodeKind>,
    props: impl Into<PropsOrChildren>,
    children: impl Into<ChildrenArg>,
) -> VNode {
    let kind = kind.into();
    let second = props.into();
    let third = children.into();

    match second {
        PropsOrChildren::Props(p) => VNode::new(kind, Some(p), third.into()),
        PropsOrChildren::None => VNode::new(kind, None, third.into()),
        PropsOrChildren::Children(c) => {
            if matches!(third, ChildrenArg::None) {
                VNode::new(kind, None, c)
            } else {
                tracing::warn!("children passed in both argument positions; using the trailing one");
                VNode::new(kind, None, third.into())
            }
        }
    }
}

/// A text node.
pub fn text(content: impl AsRef<str>) -> VNode {
    VNode::new(
        VNodeKind::Text,
        None,
        Children::Text(Arc::from(content.as_ref())),
    )
}

/// A comment node.
pub fn comment(content: impl AsRef<str>) -> VNode {
    VNode::new(
        VNodeKind::Comment,
        None,
        Children::Text(Arc::from(content.as_ref())),
    )
}

/// A fragment wrapping a child list.
pub fn fragment(children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Fragment, None, Children::Nodes(children))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_vnode_type_requires_kind_and_key() {
        let a = h("div", [("key", Value::from("a"))], ());
        let a2 = h("div", [("key", Value::from("a"))], ());
        let b = h("div", [("key", Value::from("b"))], ());
        let s = h("span", [("key", Value::from("a"))], ());

        assert!(a.same_vnode_type(&a2));
        assert!(!a.same_vnode_type(&b));
        assert!(!a.same_vnode_type(&s));
    }

    #[test]
    fn key_prop_is_extracted_from_props() {
        let node = h("li", [("key", Value::from("x")), ("class", Value::from("row"))], ());
        assert_eq!(node.key(), Some(&Key::from("x")));
        let props = node.props().unwrap();
        assert!(!props.contains_key("key"));
        assert!(props.contains_key("class"));
    }

    #[test]
    fn numeric_keys_are_supported() {
        let node = h("li", [("key", Value::from(3))], ());
        assert_eq!(node.key(), Some(&Key::Num(3)));
    }

    #[test]
    fn second_argument_may_be_children() {
        let with_text = h("div", "hello", ());
        assert_eq!(with_text.children().as_text(), Some("hello"));
        assert!(with_text.props().is_none());

        let child = h("span", (), "inner");
        let with_nodes = h("div", vec![child], ());
        assert_eq!(with_nodes.children().as_nodes().map(<[VNode]>::len), Some(1));
    }

    #[test]
    fn three_argument_form_takes_props_and_children() {
        let node = h("div", [("id", Value::from("root"))], "body");
        assert!(node.props().unwrap().contains_key("id"));
        assert_eq!(node.children().as_text(), Some("body"));
    }

    #[test]
    fn fragment_children_are_always_a_list() {
        let frag = h(VNodeKind::Fragment, (), "just text");
        let nodes = frag.children().as_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].kind(), VNodeKind::Text));
    }

    #[test]
    fn mounted_child_is_cloned_into_a_new_tree() {
        let child = text("cached");
        child.set_el(Some(7));

        let parent = h("div", vec![child.clone()], ());
        let adopted = &parent.children().as_nodes().unwrap()[0];
        assert!(!adopted.is_mounted());
        assert!(child.is_mounted());
    }

    #[test]
    fn clone_fresh_clears_mount_state_recursively() {
        let inner = text("x");
        let node = h("div", vec![inner], ());
        node.set_el(Some(1));
        node.children().as_nodes().unwrap()[0].set_el(Some(2));

        let copy = node.clone_fresh();
        assert!(!copy.is_mounted());
        assert!(!copy.children().as_nodes().unwrap()[0].is_mounted());
    }
}
