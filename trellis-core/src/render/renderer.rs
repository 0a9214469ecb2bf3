//! Renderer & Reconciler
//!
//! The renderer walks two versions of a virtual tree and emits the
//! minimal host operations that turn one into the other. Every mutation
//! goes through the [`HostOps`](super::host::HostOps) trait; the renderer
//! itself never touches host internals.
//!
//! # Patch Protocol
//!
//! `patch(prev, next, ...)` dispatches on the node kind. A previous node
//! of a different kind or key is unmounted wholesale and the new node is
//! mounted in its place; identity (kind + key), never deep equality,
//! decides reuse.
//!
//! # Keyed Children Diff
//!
//! `patch_keyed_children` implements the two-end strategy: matching
//! prefixes and suffixes are patched in place, pure insertions and pure
//! removals are handled directly, and only the genuinely unstable middle
//! region pays for key-map matching. When a reordering is detected there,
//! the longest increasing subsequence over matched old positions marks
//! the nodes already in relative order; everything else is moved before
//! its right-hand neighbor, processed tail to head so each neighbor is
//! already in its final position.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::component::{should_update_component, ComponentInstance};
use crate::reactive::effect::{EffectOptions, ReactiveEffect};
use crate::scheduler::{self, Job};

use super::host::{HostOps, NodeId};
use super::vnode::{comment, Children, Key, Props, VNode, VNodeKind};

/// Renderer over one host backend.
pub struct Renderer {
    host: Arc<dyn HostOps>,
    /// Last rendered root per container, for top-level re-render diffs.
    roots: Mutex<HashMap<NodeId, VNode>>,
}

impl Renderer {
    pub fn new(host: Arc<dyn HostOps>) -> Arc<Self> {
        Arc::new(Self {
            host,
            roots: Mutex::new(HashMap::new()),
        })
    }

    pub fn host(&self) -> &Arc<dyn HostOps> {
        &self.host
    }

    /// Render a root vnode into a container. `None` unmounts whatever the
    /// container currently shows.
    pub fn render(self: &Arc<Self>, vnode: Option<VNode>, container: NodeId) {
        let prev = self.roots.lock().get(&container).cloned();
        match (&prev, &vnode) {
            (_, Some(next)) => {
                self.patch(prev.as_ref(), next, container, None, None);
            }
            (Some(old), None) => {
                self.unmount(old, None, true);
            }
            (None, None) => {}
        }

        let mut roots = self.roots.lock();
        match vnode {
            Some(next) => {
                roots.insert(container, next);
            }
            None => {
                roots.remove(&container);
            }
        }
    }

    /// Core dispatch: mount when `n1` is absent, patch when it is the
    /// same node, replace otherwise.
    pub(crate) fn patch(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let mut n1 = n1;
        let mut anchor = anchor;
        if let Some(prev) = n1 {
            if !prev.same_vnode_type(n2) {
                // Different identity: the old node is destroyed and the
                // new one mounts where it used to sit.
                anchor = self.next_host_node(prev);
                self.unmount(prev, parent, true);
                n1 = None;
            }
        }

        match n2.kind() {
            VNodeKind::Text => self.process_text(n1, n2, container, anchor),
            VNodeKind::Comment => self.process_comment(n1, n2, container, anchor),
            VNodeKind::Fragment => self.process_fragment(n1, n2, container, anchor, parent),
            VNodeKind::Element(_) => self.process_element(n1, n2, container, anchor, parent),
            VNodeKind::Component(_) => self.process_component(n1, n2, container, anchor, parent),
        }
    }

    // ------------------------------------------------------------------
    // Text & comment
    // ------------------------------------------------------------------

    fn process_text(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) {
        let content = n2.children().as_text().unwrap_or("");
        match n1 {
            None => {
                let el = self.host.create_text(content);
                n2.set_el(Some(el));
                self.host.insert(el, container, anchor);
            }
            Some(prev) => {
                let el = prev.el();
                n2.set_el(el);
                if prev.children().as_text() != Some(content) {
                    if let Some(el) = el {
                        self.host.set_text(el, content);
                    }
                }
            }
        }
    }

    fn process_comment(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) {
        match n1 {
            None => {
                let el = self
                    .host
                    .create_comment(n2.children().as_text().unwrap_or(""));
                n2.set_el(Some(el));
                self.host.insert(el, container, anchor);
            }
            Some(prev) => {
                // A comment updates to a comment; content is static.
                n2.set_el(prev.el());
            }
        }
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    fn process_element(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => self.mount_element(n2, container, anchor, parent),
            Some(prev) => self.patch_element(prev, n2, parent),
        }
    }

    fn mount_element(
        self: &Arc<Self>,
        vnode: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let VNodeKind::Element(tag) = vnode.kind() else {
            return;
        };
        let el = self.host.create_element(tag);
        vnode.set_el(Some(el));

        match vnode.children() {
            Children::Text(text) => self.host.set_element_text(el, text),
            Children::Nodes(children) => self.mount_children(children, el, None, parent, 0),
            Children::None => {}
        }

        if let Some(props) = vnode.props() {
            for (key, value) in props {
                if key.is_empty() {
                    continue;
                }
                self.host.patch_prop(el, key, None, Some(value));
            }
        }

        self.host.insert(el, container, anchor);
    }

    fn patch_element(
        self: &Arc<Self>,
        n1: &VNode,
        n2: &VNode,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let Some(el) = n1.el() else {
            return;
        };
        n2.set_el(Some(el));
        self.patch_props(el, n1.props(), n2.props());
        self.patch_children(n1, n2, el, None, parent);
    }

    fn patch_props(&self, el: NodeId, old: Option<&Props>, new: Option<&Props>) {
        if let Some(new_props) = new {
            for (key, next) in new_props {
                if key.is_empty() {
                    continue;
                }
                let prev = old.and_then(|p| p.get(key));
                if prev != Some(next) {
                    self.host.patch_prop(el, key, prev, Some(next));
                }
            }
        }
        if let Some(old_props) = old {
            for (key, prev) in old_props {
                if key.is_empty() {
                    continue;
                }
                if new.map_or(true, |p| !p.contains_key(key)) {
                    self.host.patch_prop(el, key, Some(prev), None);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Fragments
    // ------------------------------------------------------------------

    fn process_fragment(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => {
                // Two empty text nodes delimit the fragment's span.
                let start = self.host.create_text("");
                let end = self.host.create_text("");
                n2.set_el(Some(start));
                n2.set_anchor(Some(end));
                self.host.insert(start, container, anchor);
                self.host.insert(end, container, anchor);

                if let Children::Nodes(children) = n2.children() {
                    self.mount_children(children, container, Some(end), parent, 0);
                }
            }
            Some(prev) => {
                n2.set_el(prev.el());
                n2.set_anchor(prev.anchor());
                self.patch_children(prev, n2, container, n2.anchor(), parent);
            }
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    fn process_component(
        self: &Arc<Self>,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => self.mount_component(n2, container, anchor, parent),
            Some(prev) => self.update_component(prev, n2),
        }
    }

    fn mount_component(
        self: &Arc<Self>,
        vnode: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let VNodeKind::Component(def) = vnode.kind() else {
            return;
        };
        let instance = ComponentInstance::new(vnode.clone(), def.clone(), parent);
        vnode.set_component(Some(instance.clone()));

        instance.setup();
        self.setup_render_effect(&instance, container, anchor);
    }

    /// Bind the instance's render function to a reactive effect whose
    /// scheduling policy queues an id-ordered job, then run it once to
    /// mount.
    fn setup_render_effect(
        self: &Arc<Self>,
        instance: &Arc<ComponentInstance>,
        container: NodeId,
        anchor: Option<NodeId>,
    ) {
        let renderer = Arc::downgrade(self);
        let weak_instance = Arc::downgrade(instance);

        let component_effect = move || {
            let Some(renderer) = renderer.upgrade() else {
                return;
            };
            let Some(instance) = weak_instance.upgrade() else {
                return;
            };
            if instance.is_unmounted() {
                return;
            }

            if !instance.is_mounted() {
                // Mount path: render the first subtree and patch it in.
                // A faulting render mounts an empty comment placeholder.
                let subtree = instance.render_root().unwrap_or_else(|| comment(""));
                renderer.patch(None, &subtree, container, anchor, Some(&instance));
                instance.vnode().set_el(subtree.el());
                instance.set_subtree(subtree);
                instance.set_mounted();
            } else {
                // Update path: a parent may have staged a replacement
                // vnode; fold its props in before rendering.
                if let Some(next) = instance.take_next() {
                    next.set_el(instance.vnode().el());
                    instance.set_vnode(next.clone());
                    instance.update_props(next.props());
                }

                let Some(prev_tree) = instance.subtree() else {
                    return;
                };
                // A faulting render keeps the previous subtree intact.
                let Some(next_tree) = instance.render_root() else {
                    return;
                };

                let host_parent = prev_tree
                    .el()
                    .and_then(|el| renderer.host.parent_of(el));
                let Some(host_parent) = host_parent else {
                    return;
                };
                let next_anchor = renderer.next_host_node(&prev_tree);

                renderer.patch(
                    Some(&prev_tree),
                    &next_tree,
                    host_parent,
                    next_anchor,
                    Some(&instance),
                );
                instance.vnode().set_el(next_tree.el());
                instance.set_subtree(next_tree);
            }
        };

        // The job reaches the effect weakly so neither owns the other.
        let effect_cell: Arc<OnceLock<crate::reactive::effect::WeakEffect>> =
            Arc::new(OnceLock::new());
        let job = {
            let effect_cell = effect_cell.clone();
            Job::with_id(instance.uid(), move || {
                if let Some(update) = effect_cell.get().and_then(|w| w.upgrade()) {
                    if update.is_active() {
                        update.run();
                    }
                }
            })
            .allow_recurse(true)
        };
        let policy = {
            let job = job.clone();
            Arc::new(move |_: &ReactiveEffect| scheduler::queue_job(job.clone()))
        };

        let update = ReactiveEffect::new(
            component_effect,
            EffectOptions {
                lazy: true,
                allow_recurse: true,
                scheduler: Some(policy),
                ..Default::default()
            },
        );
        let _ = effect_cell.set(update.downgrade());
        instance.set_update(update.clone(), job);

        update.run();
    }

    fn update_component(self: &Arc<Self>, n1: &VNode, n2: &VNode) {
        let Some(instance) = n1.component() else {
            tracing::warn!("component vnode updated without a bound instance");
            return;
        };
        n2.set_component(Some(instance.clone()));

        if should_update_component(n1, n2) {
            // The child's own pending self-update is redundant now that
            // the parent forces one.
            instance.set_next(n2.clone());
            scheduler::invalidate_job(instance.uid());
            if let Some(update) = instance.update_effect() {
                update.run();
            }
            // Folding the new props in during the forced run re-notified
            // the child's render effect; that echo is redundant too.
            scheduler::invalidate_job(instance.uid());
        } else {
            n2.set_el(n1.el());
            instance.set_vnode(n2.clone());
        }
    }

    fn unmount_component(
        self: &Arc<Self>,
        instance: &Arc<ComponentInstance>,
        do_remove: bool,
    ) {
        instance.teardown();
        if let Some(subtree) = instance.take_subtree() {
            self.unmount(&subtree, Some(instance), do_remove);
        }
        instance.vnode().set_component(None);
    }

    // ------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------

    fn mount_children(
        self: &Arc<Self>,
        children: &[VNode],
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
        start: usize,
    ) {
        for child in &children[start..] {
            self.patch(None, child, container, anchor, parent);
        }
    }

    /// Children diff by case: text/list/empty on either side.
    fn patch_children(
        self: &Arc<Self>,
        n1: &VNode,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let prev = n1.children();
        let next = n2.children();

        match (prev, next) {
            (_, Children::Text(text)) => {
                if let Children::Nodes(old) = prev {
                    // Old node children are torn down before the text
                    // write wipes their host nodes.
                    self.unmount_children(old, parent, false);
                }
                if prev.as_text() != Some(text.as_ref()) {
                    self.host.set_element_text(container, text);
                }
            }
            (Children::Nodes(old), Children::Nodes(new)) => {
                self.patch_keyed_children(old, new, container, anchor, parent);
            }
            (Children::Nodes(old), Children::None) => {
                self.unmount_children(old, parent, true);
            }
            (Children::Text(_), Children::Nodes(new)) => {
                self.host.set_element_text(container, "");
                self.mount_children(new, container, anchor, parent, 0);
            }
            (Children::None, Children::Nodes(new)) => {
                self.mount_children(new, container, anchor, parent, 0);
            }
            (Children::Text(_), Children::None) => {
                self.host.set_element_text(container, "");
            }
            (Children::None, Children::None) => {}
        }
    }

    /// Full keyed diff of two sibling lists.
    fn patch_keyed_children(
        self: &Arc<Self>,
        c1: &[VNode],
        c2: &[VNode],
        container: NodeId,
        parent_anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let l2 = c2.len();
        let mut i = 0usize;
        let mut e1 = c1.len() as isize - 1;
        let mut e2 = l2 as isize - 1;

        // 1. Sync from the head while both sides are the same node.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let n1 = &c1[i];
            let n2 = &c2[i];
            if n1.same_vnode_type(n2) {
                self.patch(Some(n1), n2, container, None, parent);
            } else {
                break;
            }
            i += 1;
        }

        // 2. Sync from the tail.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let n1 = &c1[e1 as usize];
            let n2 = &c2[e2 as usize];
            if n1.same_vnode_type(n2) {
                self.patch(Some(n1), n2, container, None, parent);
            } else {
                break;
            }
            e1 -= 1;
            e2 -= 1;
        }

        if (i as isize) > e1 {
            // 3. Old side exhausted: the remaining new nodes are pure
            // insertions, anchored before the node just after the range.
            if (i as isize) <= e2 {
                let next_pos = (e2 + 1) as usize;
                let anchor = if next_pos < l2 {
                    c2[next_pos].el()
                } else {
                    parent_anchor
                };
                while (i as isize) <= e2 {
                    self.patch(None, &c2[i], container, anchor, parent);
                    i += 1;
                }
            }
        } else if (i as isize) > e2 {
            // 4. New side exhausted: the remaining old nodes are pure
            // removals.
            while (i as isize) <= e1 {
                self.unmount(&c1[i], parent, true);
                i += 1;
            }
        } else {
            // 5. Unstable middle region.
            self.patch_unstable_middle(c1, c2, i, e1 as usize, e2 as usize, container, parent_anchor, parent);
        }
    }

    /// The hard case of the keyed diff: match the unmatched middle by
    /// key, remove the unmatched, and minimize host moves via the longest
    /// increasing subsequence of matched old positions.
    #[allow(clippy::too_many_arguments)]
    fn patch_unstable_middle(
        self: &Arc<Self>,
        c1: &[VNode],
        c2: &[VNode],
        start: usize,
        e1: usize,
        e2: usize,
        container: NodeId,
        parent_anchor: Option<NodeId>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let l2 = c2.len();
        let s1 = start;
        let s2 = start;

        // 5.1 Map each new key to its position.
        let mut key_to_new_index: HashMap<Key, usize> = HashMap::new();
        for (ni, node) in c2.iter().enumerate().take(e2 + 1).skip(s2) {
            if let Some(key) = node.key() {
                if key_to_new_index.insert(key.clone(), ni).is_some() {
                    tracing::warn!(
                        key = ?key,
                        "duplicate key among new siblings; the last occurrence wins"
                    );
                }
            }
        }

        // 5.2 Walk old nodes in order: patch matches, remove the rest.
        // new_index_to_old_index records, per new position, the 1-based
        // old position it came from (0 = freshly created).
        let to_patch = e2 - s2 + 1;
        let mut patched = 0usize;
        let mut new_index_to_old_index = vec![0usize; to_patch];
        let mut moved = false;
        let mut max_new_index_so_far = 0usize;

        for (oi, old) in c1.iter().enumerate().take(e1 + 1).skip(s1) {
            if patched >= to_patch {
                // Every new slot is claimed; the rest of the old list is
                // surplus.
                self.unmount(old, parent, true);
                continue;
            }

            let new_index = match old.key() {
                Some(key) => key_to_new_index.get(key).copied(),
                None => {
                    // Keyless fallback: first unclaimed same-type match.
                    let mut found = None;
                    for nj in s2..=e2 {
                        if new_index_to_old_index[nj - s2] == 0
                            && old.same_vnode_type(&c2[nj])
                        {
                            found = Some(nj);
                            break;
                        }
                    }
                    found
                }
            };

            match new_index {
                None => self.unmount(old, parent, true),
                Some(ni) => {
                    new_index_to_old_index[ni - s2] = oi + 1;
                    if ni >= max_new_index_so_far {
                        max_new_index_so_far = ni;
                    } else {
                        moved = true;
                    }
                    self.patch(Some(old), &c2[ni], container, None, parent);
                    patched += 1;
                }
            }
        }

        // 5.3 Mount the new, move the displaced. Only when a reordering
        // was seen is the LIS computed; nodes on it stay untouched.
        let sequence = if moved {
            longest_increasing_subsequence(&new_index_to_old_index)
        } else {
            Vec::new()
        };
        let mut seq_tail = sequence.len() as isize - 1;

        for idx in (0..to_patch).rev() {
            let next_index = s2 + idx;
            let next_child = &c2[next_index];
            let anchor = if next_index + 1 < l2 {
                c2[next_index + 1].el()
            } else {
                parent_anchor
            };

            if new_index_to_old_index[idx] == 0 {
                // Never matched an old node: fresh mount.
                self.patch(None, next_child, container, anchor, parent);
            } else if moved {
                if seq_tail < 0 || idx != sequence[seq_tail as usize] {
                    self.move_vnode(next_child, container, anchor);
                } else {
                    seq_tail -= 1;
                }
            }
        }
    }

    /// Reposition an already-mounted node before `anchor`.
    fn move_vnode(self: &Arc<Self>, vnode: &VNode, container: NodeId, anchor: Option<NodeId>) {
        match vnode.kind() {
            VNodeKind::Component(_) => {
                if let Some(subtree) = vnode.component().and_then(|i| i.subtree()) {
                    self.move_vnode(&subtree, container, anchor);
                }
            }
            VNodeKind::Fragment => {
                if let Some(start) = vnode.el() {
                    self.host.insert(start, container, anchor);
                }
                if let Children::Nodes(children) = vnode.children() {
                    for child in children {
                        self.move_vnode(child, container, anchor);
                    }
                }
                if let Some(end) = vnode.anchor() {
                    self.host.insert(end, container, anchor);
                }
            }
            _ => {
                if let Some(el) = vnode.el() {
                    self.host.insert(el, container, anchor);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Unmounting
    // ------------------------------------------------------------------

    pub(crate) fn unmount(
        self: &Arc<Self>,
        vnode: &VNode,
        parent: Option<&Arc<ComponentInstance>>,
        do_remove: bool,
    ) {
        if let VNodeKind::Component(_) = vnode.kind() {
            if let Some(instance) = vnode.component() {
                self.unmount_component(&instance, do_remove);
            }
            return;
        }

        let is_fragment = matches!(vnode.kind(), VNodeKind::Fragment);
        if is_fragment || matches!(vnode.children(), Children::Nodes(_)) {
            if let Children::Nodes(children) = vnode.children() {
                // Recursive teardown without per-node host removal; the
                // subtree root is removed wholesale below.
                self.unmount_children(children, parent, false);
            }
        }

        if do_remove {
            self.remove_vnode(vnode);
        }
    }

    fn unmount_children(
        self: &Arc<Self>,
        children: &[VNode],
        parent: Option<&Arc<ComponentInstance>>,
        do_remove: bool,
    ) {
        for child in children {
            self.unmount(child, parent, do_remove);
        }
    }

    fn remove_vnode(&self, vnode: &VNode) {
        if matches!(vnode.kind(), VNodeKind::Fragment) {
            if let (Some(start), Some(end)) = (vnode.el(), vnode.anchor()) {
                self.remove_fragment(start, end);
            }
            return;
        }
        if let Some(el) = vnode.el() {
            self.host.remove(el);
        }
    }

    /// Remove every host node between the fragment anchors, inclusive.
    fn remove_fragment(&self, start: NodeId, end: NodeId) {
        let mut cursor = start;
        while cursor != end {
            let next = self.host.next_sibling_of(cursor);
            self.host.remove(cursor);
            match next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        self.host.remove(end);
    }

    /// The host node immediately after a vnode's rendered content.
    fn next_host_node(self: &Arc<Self>, vnode: &VNode) -> Option<NodeId> {
        if let VNodeKind::Component(_) = vnode.kind() {
            let subtree = vnode.component().and_then(|i| i.subtree())?;
            return self.next_host_node(&subtree);
        }
        let reference = vnode.anchor().or_else(|| vnode.el())?;
        self.host.next_sibling_of(reference)
    }
}

/// Indices of a longest increasing subsequence of `arr`, ignoring zero
/// entries (zero marks a freshly created slot, not a position).
///
/// Binary-search construction with predecessor backtracking; O(n log n).
fn longest_increasing_subsequence(arr: &[usize]) -> Vec<usize> {
    if arr.is_empty() {
        return Vec::new();
    }

    let mut predecessors = arr.to_vec();
    let mut result: Vec<usize> = vec![0];

    for (i, &value) in arr.iter().enumerate() {
        if value == 0 {
            continue;
        }
        let last = result[result.len() - 1];
        if arr[last] < value {
            predecessors[i] = last;
            result.push(i);
            continue;
        }

        let mut lo = 0usize;
        let mut hi = result.len() - 1;
        while lo < hi {
            let mid = (lo + hi) >> 1;
            if arr[result[mid]] < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if value < arr[result[lo]] {
            if lo > 0 {
                predecessors[i] = result[lo - 1];
            }
            result[lo] = i;
        }
    }

    let mut u = result.len();
    let mut v = result[u - 1];
    while u > 0 {
        u -= 1;
        result[u] = v;
        v = predecessors[v];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::super::host::{HostOp, MemoryDom};
    use super::super::vnode::{fragment, h, text};
    use super::*;
    use crate::value::Value;

    fn keyed(tag: &str, key: &str) -> VNode {
        h(tag, [("key", Value::from(key))], key)
    }

    fn keyed_list(keys: &[&str]) -> VNode {
        h("ul", keys.iter().map(|k| keyed("li", k)).collect::<Vec<_>>(), ())
    }

    #[test]
    fn lis_picks_the_longest_run() {
        // Values 1-based; zero entries are skipped.
        assert_eq!(longest_increasing_subsequence(&[2, 1, 3, 4]), vec![0, 2, 3]);
        assert_eq!(longest_increasing_subsequence(&[4, 3, 2, 1]), vec![3]);
        assert_eq!(longest_increasing_subsequence(&[1, 0, 2]), vec![0, 2]);
    }

    #[test]
    fn mounts_an_element_tree() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        let tree = h(
            "div",
            [("id", Value::from("app"))],
            vec![h("span", (), "hello"), text(" world")],
        );
        renderer.render(Some(tree), root);

        assert_eq!(
            dom.render_to_string(root),
            "<div id=\"app\"><span>hello</span> world</div>"
        );
    }

    #[test]
    fn patches_changed_props_and_removes_stale_ones() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(
            Some(h("div", [("a", Value::from(1)), ("b", Value::from(2))], ())),
            root,
        );
        dom.take_ops();

        renderer.render(
            Some(h("div", [("a", Value::from(1)), ("c", Value::from(3))], ())),
            root,
        );
        let ops: Vec<_> = dom
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::PatchProp { .. }))
            .collect();

        // `a` unchanged: untouched. `c` written, `b` removed.
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().any(|op| matches!(
            op,
            HostOp::PatchProp { key, value: Some(_), .. } if key == "c"
        )));
        assert!(ops.iter().any(|op| matches!(
            op,
            HostOp::PatchProp { key, value: None, .. } if key == "b"
        )));
    }

    #[test]
    fn diffing_identical_trees_emits_no_operations() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["a", "b", "c", "d"])), root);
        dom.take_ops();

        renderer.render(Some(keyed_list(&["a", "b", "c", "d"])), root);
        assert_eq!(dom.take_ops(), Vec::new());
    }

    #[test]
    fn swap_of_two_middle_items_moves_exactly_one_node() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["a", "b", "c", "d"])), root);
        assert_eq!(
            dom.render_to_string(root),
            "<ul><li>a</li><li>b</li><li>c</li><li>d</li></ul>"
        );
        dom.take_ops();

        renderer.render(Some(keyed_list(&["a", "c", "b", "d"])), root);
        assert_eq!(
            dom.render_to_string(root),
            "<ul><li>a</li><li>c</li><li>b</li><li>d</li></ul>"
        );

        // All four matched by key; only the displaced node of the swapped
        // pair is moved, nothing is created or removed.
        let ops = dom.take_ops();
        assert!(!ops.iter().any(|op| matches!(
            op,
            HostOp::CreateElement { .. } | HostOp::Remove { .. }
        )));
        let moves: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, HostOp::Insert { .. }))
            .collect();
        assert_eq!(moves.len(), 1);
    }

    #[test]
    fn reversal_keeps_one_node_in_place() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["a", "b", "c", "d"])), root);
        dom.take_ops();

        renderer.render(Some(keyed_list(&["d", "c", "b", "a"])), root);
        assert_eq!(
            dom.render_to_string(root),
            "<ul><li>d</li><li>c</li><li>b</li><li>a</li></ul>"
        );

        // LIS of a reversal has length one: three moves, never four.
        let moves = dom
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::Insert { .. }))
            .count();
        assert_eq!(moves, 3);
    }

    #[test]
    fn disjoint_key_sets_replace_every_node() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["a", "b", "c"])), root);
        dom.take_ops();

        renderer.render(Some(keyed_list(&["x", "y", "z"])), root);
        assert_eq!(
            dom.render_to_string(root),
            "<ul><li>x</li><li>y</li><li>z</li></ul>"
        );

        let ops = dom.take_ops();
        let removals = ops
            .iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .count();
        let creations = ops
            .iter()
            .filter(|op| matches!(op, HostOp::CreateElement { .. }))
            .count();
        assert_eq!(removals, 3);
        assert_eq!(creations, 3);
    }

    #[test]
    fn head_insertion_uses_the_old_head_as_anchor() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["b", "c"])), root);
        dom.take_ops();

        renderer.render(Some(keyed_list(&["a", "b", "c"])), root);
        assert_eq!(
            dom.render_to_string(root),
            "<ul><li>a</li><li>b</li><li>c</li></ul>"
        );
    }

    #[test]
    fn tail_removal_unmounts_only_the_tail() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(keyed_list(&["a", "b", "c"])), root);
        dom.take_ops();

        renderer.render(Some(keyed_list(&["a", "b"])), root);
        assert_eq!(dom.render_to_string(root), "<ul><li>a</li><li>b</li></ul>");

        let removals = dom
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .count();
        assert_eq!(removals, 1);
    }

    #[test]
    fn text_children_replace_node_children() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(h("div", vec![h("span", (), "x")], ())), root);
        renderer.render(Some(h("div", "plain", ())), root);

        assert_eq!(dom.render_to_string(root), "<div>plain</div>");
    }

    #[test]
    fn node_children_replace_text_children() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(h("div", "plain", ())), root);
        renderer.render(Some(h("div", vec![h("b", (), "bold")], ())), root);

        assert_eq!(dom.render_to_string(root), "<div><b>bold</b></div>");
    }

    #[test]
    fn kind_change_replaces_and_remounts() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(h("div", (), "old")), root);
        renderer.render(Some(h("section", (), "new")), root);

        assert_eq!(dom.render_to_string(root), "<section>new</section>");
    }

    #[test]
    fn fragments_span_between_their_anchors() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        let frag = fragment(vec![keyed("li", "a"), keyed("li", "b")]);
        renderer.render(Some(h("ul", vec![frag], ())), root);
        assert_eq!(dom.render_to_string(root), "<ul><li>a</li><li>b</li></ul>");

        renderer.render(Some(h("ul", (), ())), root);
        assert_eq!(dom.render_to_string(root), "<ul></ul>");
    }

    #[test]
    fn root_rerender_with_none_unmounts() {
        let dom = MemoryDom::new();
        let renderer = Renderer::new(dom.clone());
        let root = dom.create_root();

        renderer.render(Some(h("div", (), "x")), root);
        assert_eq!(dom.render_to_string(root), "<div>x</div>");

        renderer.render(None, root);
        assert_eq!(dom.render_to_string(root), "");
    }
}
