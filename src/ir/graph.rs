//! The CPS program graph.
//!
//! `CpsGraph` owns every node and reference in two arenas. Three relations
//! are maintained on top of the ownership tree:
//!
//! - **parent pointers**: every node except the root records its structural
//!   parent; `refresh_parents` rebuilds them and every splice keeps them
//!   consistent.
//! - **use-lists**: each definition heads a doubly-linked list of the
//!   references that use it; `unlink` removes a reference in O(1).
//! - **body slots**: rewrites replace a node inside its parent's slot with
//!   `replace_child`, which updates the slot and the new child's parent
//!   together.
//!
//! Orphaned nodes (detached by a rewrite) stay in the arena but are no
//! longer reachable from the root; tree walks, `verify`, and `dump` ignore
//! them. A later shrinking pass collects their definitions.

use smallvec::SmallVec;
use std::fmt::Write as _;

use crate::opt::internal_error;

use super::arena::Arena;
use super::node::{Node, NodeId, NodeKind, Reference, RefId};

#[derive(Clone)]
pub struct CpsGraph {
    nodes: Arena<Node>,
    refs: Arena<Reference>,
    root: NodeId,
}

impl CpsGraph {
    /// Create a graph holding an empty root: no parameters, a fresh
    /// one-parameter return continuation, and no body.
    pub fn new() -> Self {
        let mut graph = CpsGraph {
            nodes: Arena::with_capacity(64),
            refs: Arena::with_capacity(64),
            root: NodeId::new(0),
        };
        let ret_param = graph.add_node(NodeKind::Parameter { index: 0 });
        let return_cont = graph.add_node(NodeKind::Continuation {
            params: vec![ret_param],
            body: None,
        });
        graph.root = graph.add_node(NodeKind::Root {
            params: Vec::new(),
            return_cont,
            body: None,
        });
        graph
    }

    // =========================================================================
    // Access
    // =========================================================================

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root's return continuation.
    pub fn return_cont(&self) -> NodeId {
        match &self.nodes[self.root].kind {
            NodeKind::Root { return_cont, .. } => *return_cont,
            other => internal_error(other.name(), "root node has non-root kind"),
        }
    }

    /// The root's body, if any.
    pub fn body(&self) -> Option<NodeId> {
        match &self.nodes[self.root].kind {
            NodeKind::Root { body, .. } => *body,
            other => internal_error(other.name(), "root node has non-root kind"),
        }
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn reference(&self, id: RefId) -> &Reference {
        &self.refs[id]
    }

    /// Total node count, including orphans.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total reference count, including unlinked ones.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    /// The definition a reference slot points at.
    #[inline]
    pub fn def_of(&self, r: RefId) -> NodeId {
        self.refs[r].def
    }

    /// Iterate over every allocated node, including orphans.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Allocate a node and claim every reference embedded in its kind.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.alloc(Node::new(kind));
        let refs = self.nodes[id].kind.refs();
        for r in refs {
            debug_assert!(self.refs[r].user.is_none(), "reference claimed twice");
            self.refs[r].user = Some(id);
        }
        id
    }

    /// Create a reference to `def` and link it into `def`'s use-list. The
    /// holder is recorded when the reference is embedded via `add_node`.
    pub fn new_ref(&mut self, def: NodeId) -> RefId {
        debug_assert!(
            self.nodes[def].kind.is_definition(),
            "reference to non-definition {}",
            self.nodes[def].kind.name()
        );
        let r = self.refs.alloc(Reference {
            def,
            user: None,
            prev: None,
            next: None,
            linked: false,
        });
        self.link(r);
        r
    }

    fn link(&mut self, r: RefId) {
        let def = self.refs[r].def;
        let head = self.nodes[def].first_use;
        self.refs[r].prev = None;
        self.refs[r].next = head;
        if let Some(h) = head {
            self.refs[h].prev = Some(r);
        }
        self.nodes[def].first_use = Some(r);
        self.refs[r].linked = true;
    }

    // =========================================================================
    // Use-lists
    // =========================================================================

    /// Remove a reference from its definition's use-list. O(1).
    pub fn unlink(&mut self, r: RefId) {
        if !self.refs[r].linked {
            return;
        }
        let Reference {
            def, prev, next, ..
        } = self.refs[r];
        match prev {
            Some(p) => self.refs[p].next = next,
            None => self.nodes[def].first_use = next,
        }
        if let Some(n) = next {
            self.refs[n].prev = prev;
        }
        let slot = &mut self.refs[r];
        slot.prev = None;
        slot.next = None;
        slot.linked = false;
    }

    /// Unlink every reference held by `node`.
    pub fn unlink_node_refs(&mut self, node: NodeId) {
        let refs = self.nodes[node].kind.refs();
        for r in refs {
            self.unlink(r);
        }
    }

    /// Iterate over the references currently using `def`.
    pub fn uses(&self, def: NodeId) -> impl Iterator<Item = RefId> + '_ {
        std::iter::successors(self.nodes[def].first_use, move |&r| self.refs[r].next)
    }

    pub fn use_count(&self, def: NodeId) -> usize {
        self.uses(def).count()
    }

    /// Redirect every use of `old` to `new`, relinking each reference.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        let moved: SmallVec<[RefId; 8]> = self.uses(old).collect();
        for r in moved {
            self.unlink(r);
            self.refs[r].def = new;
            self.link(r);
        }
    }

    // =========================================================================
    // Tree surgery
    // =========================================================================

    /// Swap `old` for `new` in `parent`'s owning slot and point `new`'s
    /// parent back at `parent`. The detached `old` keeps its subtree.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let found = match &mut self.nodes[parent].kind {
            NodeKind::Root { body, .. } | NodeKind::Continuation { body, .. } => {
                if *body == Some(old) {
                    *body = Some(new);
                    true
                } else {
                    false
                }
            }
            NodeKind::LetPrim { prim, body } => {
                Self::swap_slot(prim, old, new) || Self::swap_slot(body, old, new)
            }
            NodeKind::LetCont { cont, body } => {
                Self::swap_slot(cont, old, new) || Self::swap_slot(body, old, new)
            }
            NodeKind::LetHandler { handler, body } => {
                Self::swap_slot(handler, old, new) || Self::swap_slot(body, old, new)
            }
            NodeKind::LetMutable { variable, body, .. }
            | NodeKind::DeclareFunction { variable, body, .. } => {
                Self::swap_slot(variable, old, new) || Self::swap_slot(body, old, new)
            }
            NodeKind::SetMutable { body, .. }
            | NodeKind::SetField { body, .. }
            | NodeKind::SetStatic { body, .. } => Self::swap_slot(body, old, new),
            other => internal_error(other.name(), "node has no child slots"),
        };
        if !found {
            internal_error("replace_child", "old node is not a child of the given parent");
        }
        self.nodes[new].parent = Some(parent);
    }

    fn swap_slot(slot: &mut NodeId, old: NodeId, new: NodeId) -> bool {
        if *slot == old {
            *slot = new;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child].parent = Some(parent);
    }

    /// Rebuild every parent pointer by walking the tree from the root.
    pub fn refresh_parents(&mut self) {
        self.nodes[self.root].parent = None;
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let children = self.nodes[current].kind.children();
            for child in children {
                self.nodes[child].parent = Some(current);
                stack.push(child);
            }
        }
    }

    // =========================================================================
    // Consistency checking
    // =========================================================================

    /// Check structural well-formedness of the tree reachable from the
    /// root: parent pointers match the ownership structure, every embedded
    /// reference is linked, is held by the node embedding it, and sits in
    /// its definition's use-list.
    pub fn verify(&self) -> Result<(), String> {
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            for child in self.nodes[current].kind.children() {
                if self.nodes[child].parent != Some(current) {
                    return Err(format!(
                        "node {:?} ({}) has parent {:?}, expected {:?}",
                        child,
                        self.nodes[child].kind.name(),
                        self.nodes[child].parent,
                        current
                    ));
                }
                stack.push(child);
            }
            for r in self.nodes[current].kind.refs() {
                let reference = &self.refs[r];
                if !reference.linked {
                    return Err(format!("reference {:?} in {:?} is unlinked", r, current));
                }
                if reference.user != Some(current) {
                    return Err(format!(
                        "reference {:?} held by {:?} records user {:?}",
                        r, current, reference.user
                    ));
                }
                let listed = self.uses(reference.def).filter(|&u| u == r).count();
                if listed != 1 {
                    return Err(format!(
                        "reference {:?} appears {} times in the use-list of {:?}",
                        r, listed, reference.def
                    ));
                }
            }
            // Use-list back-link integrity for definitions.
            if self.nodes[current].kind.is_definition() {
                let mut prev = None;
                for r in self.uses(current) {
                    let reference = &self.refs[r];
                    if reference.def != current {
                        return Err(format!(
                            "use-list of {:?} contains reference {:?} to {:?}",
                            current, r, reference.def
                        ));
                    }
                    if reference.prev != prev {
                        return Err(format!("broken back-link at reference {:?}", r));
                    }
                    prev = Some(r);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Deterministic textual rendering of the tree reachable from the
    /// root. Stable across runs that do not mutate the graph, so tests can
    /// compare dumps to establish idempotence.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, self.root, 0);
        out
    }

    fn dump_node(&self, out: &mut String, id: NodeId, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        let node = &self.nodes[id];
        let _ = write!(out, "{} {}", node.kind.name(), id);
        match &node.kind {
            NodeKind::Constant { value } => {
                let _ = write!(out, " = {}", value);
            }
            NodeKind::Parameter { index } => {
                let _ = write!(out, " p{}", index);
            }
            NodeKind::InvokeMethod { selector, .. }
            | NodeKind::InvokeMethodDirectly { selector, .. }
            | NodeKind::CreateInvocationMirror { selector, .. } => {
                let _ = write!(out, " '{}'", selector.name);
            }
            _ => {}
        }
        let refs = node.kind.refs();
        if !refs.is_empty() {
            let _ = write!(out, " uses[");
            for (i, r) in refs.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{}", self.refs[*r].def);
            }
            out.push(']');
        }
        out.push('\n');
        for child in node.kind.children() {
            self.dump_node(out, child, depth + 1);
        }
    }
}

impl Default for CpsGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpsGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dump())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ConstantValue;
    use smallvec::smallvec;

    #[test]
    fn test_new_graph_has_empty_root() {
        let graph = CpsGraph::new();
        assert!(graph.body().is_none());
        assert!(matches!(
            graph.node(graph.return_cont()).kind,
            NodeKind::Continuation { .. }
        ));
    }

    #[test]
    fn test_use_list_link_and_unlink() {
        let mut graph = CpsGraph::new();
        let def = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Int(1),
        });
        let r1 = graph.new_ref(def);
        let r2 = graph.new_ref(def);
        let r3 = graph.new_ref(def);
        assert_eq!(graph.use_count(def), 3);

        // Unlink the middle of the list.
        graph.unlink(r2);
        assert_eq!(graph.use_count(def), 2);
        let remaining: Vec<_> = graph.uses(def).collect();
        assert!(remaining.contains(&r1));
        assert!(remaining.contains(&r3));

        graph.unlink(r3);
        graph.unlink(r1);
        assert_eq!(graph.use_count(def), 0);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut graph = CpsGraph::new();
        let a = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Int(1),
        });
        let b = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Int(2),
        });
        let r1 = graph.new_ref(a);
        let r2 = graph.new_ref(a);
        graph.replace_all_uses(a, b);
        assert_eq!(graph.use_count(a), 0);
        assert_eq!(graph.use_count(b), 2);
        assert_eq!(graph.def_of(r1), b);
        assert_eq!(graph.def_of(r2), b);
    }

    #[test]
    fn test_add_node_claims_refs() {
        let mut graph = CpsGraph::new();
        let left = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Bool(true),
        });
        let right = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Bool(false),
        });
        let lr = graph.new_ref(left);
        let rr = graph.new_ref(right);
        let identical = graph.add_node(NodeKind::Identical {
            left: lr,
            right: rr,
        });
        assert_eq!(graph.reference(lr).user, Some(identical));
        assert_eq!(graph.reference(rr).user, Some(identical));
    }

    #[test]
    fn test_refresh_parents_and_verify() {
        let mut graph = CpsGraph::new();
        let c = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Int(7),
        });
        let ret = graph.return_cont();
        let cont_ref = graph.new_ref(ret);
        let arg = graph.new_ref(c);
        let invoke = graph.add_node(NodeKind::InvokeContinuation {
            cont: cont_ref,
            args: smallvec![arg],
        });
        let body = graph.add_node(NodeKind::LetPrim {
            prim: c,
            body: invoke,
        });
        let root = graph.root();
        match &mut graph.node_mut(root).kind {
            NodeKind::Root { body: slot, .. } => *slot = Some(body),
            _ => unreachable!(),
        }
        graph.refresh_parents();

        assert_eq!(graph.node(c).parent, Some(body));
        assert_eq!(graph.node(invoke).parent, Some(body));
        assert_eq!(graph.node(body).parent, Some(root));
        graph.verify().expect("well-formed graph");
    }

    #[test]
    fn test_replace_child_updates_parent() {
        let mut graph = CpsGraph::new();
        let c = graph.add_node(NodeKind::Constant {
            value: ConstantValue::Int(7),
        });
        let ret = graph.return_cont();
        let cont_ref = graph.new_ref(ret);
        let arg = graph.new_ref(c);
        let invoke = graph.add_node(NodeKind::InvokeContinuation {
            cont: cont_ref,
            args: smallvec![arg],
        });
        let body = graph.add_node(NodeKind::LetPrim {
            prim: c,
            body: invoke,
        });
        let root = graph.root();
        match &mut graph.node_mut(root).kind {
            NodeKind::Root { body: slot, .. } => *slot = Some(body),
            _ => unreachable!(),
        }
        graph.refresh_parents();

        let cont_ref2 = graph.new_ref(ret);
        let replacement = graph.add_node(NodeKind::InvokeContinuation {
            cont: cont_ref2,
            args: smallvec![],
        });
        graph.replace_child(body, invoke, replacement);
        // The detached invoke still holds linked refs until unlinked.
        graph.unlink_node_refs(invoke);

        assert_eq!(graph.node(replacement).parent, Some(body));
        graph.verify().expect("still well-formed after splice");
        assert!(graph.dump().contains("InvokeContinuation"));
    }

    #[test]
    fn test_dump_is_stable() {
        let graph = CpsGraph::new();
        assert_eq!(graph.dump(), graph.dump());
    }
}
