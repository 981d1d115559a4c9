//! Hierarchical mutable state.
//!
//! All nodes of one generator (the root, every rule's counter node, local
//! scopes and detached temporaries) live in a single arena and are addressed by
//! [`NodeId`]. A child map stores ids, and each node remembers the slot it is
//! attached to, so moving a subtree is an index rewrite rather than a copy.
//!
//! ```text
//! root ── hero ── name = "Ava"
//!   │       └──── gold = 12
//!   └──── flags ── met = 0
//! ```
//!
//! A child map may hold an id whose parent link points somewhere else: that is
//! how a rule parameter shares its caller's node. The parent link names the
//! slot the node was most recently bound to, so removing or replacing the node
//! through a parameter empties the parameter's slot and leaves the caller's
//! entry alone.
//!
//! Nodes are never freed while a generation is running. [`StateTree::sweep`]
//! reclaims everything unreachable from a set of roots once the caller knows no
//! temporaries are in flight.

use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolTable};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// A node bound into a parameter slot while its home slot keeps pointing at it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Loan {
    node: NodeId,
    home: (NodeId, Symbol),
    slot: (NodeId, Symbol),
}

/// Stable index of a node in a [`StateTree`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
struct StateNode {
    value: Value,
    children: HashMap<Symbol, NodeId>,
    parent: Option<(NodeId, Symbol)>,
}

/// Arena of state nodes.
#[derive(Debug, Default)]
pub struct StateTree {
    nodes: Vec<StateNode>,
    free: Vec<NodeId>,
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, value: Value) -> NodeId {
        let node = StateNode { value, ..StateNode::default() };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn node(&self, id: NodeId) -> &StateNode {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut StateNode {
        &mut self.nodes[id.index()]
    }

    pub fn value(&self, id: NodeId) -> &Value {
        &self.node(id).value
    }

    /// Overwrite the value in place; the node keeps its slot and children.
    pub fn set_value(&mut self, id: NodeId, value: Value) {
        self.node_mut(id).value = value;
    }

    pub fn parent(&self, id: NodeId) -> Option<(NodeId, Symbol)> {
        self.node(id).parent
    }

    pub fn child(&self, id: NodeId, name: Symbol) -> Option<NodeId> {
        self.node(id).children.get(&name).copied()
    }

    /// Look up a child, fabricating it (with value 0) when `create` is set.
    pub fn child_or_create(&mut self, id: NodeId, name: Symbol, create: bool) -> Option<NodeId> {
        if let Some(child) = self.child(id, name) {
            return Some(child);
        }
        if !create {
            return None;
        }
        let child = self.alloc(Value::Int(0));
        self.node_mut(child).parent = Some((id, name));
        self.node_mut(id).children.insert(name, child);
        Some(child)
    }

    /// Attach `child` under `id` at `name`, taking ownership of it.
    pub fn attach(&mut self, id: NodeId, name: Symbol, child: NodeId) {
        self.release_slot(child);
        self.node_mut(child).parent = Some((id, name));
        self.node_mut(id).children.insert(name, child);
    }

    /// Put `replacement` in `target`'s slot, detaching `target`.
    ///
    /// The replacement is relocated: it leaves whatever slot it occupied
    /// before. A `None` replacement simply empties the slot. Returns `target`.
    pub fn replace(&mut self, target: NodeId, replacement: Option<NodeId>) -> Result<NodeId> {
        let (parent, name) = self.node(target).parent.ok_or_else(|| Error::structure("cannot replace a node that has no parent"))?;
        if replacement == Some(target) {
            return Ok(target);
        }

        self.node_mut(target).parent = None;
        match replacement {
            Some(node) => self.attach(parent, name, node),
            None => {
                self.node_mut(parent).children.remove(&name);
            }
        }
        Ok(target)
    }

    /// Put `argument` in `target`'s slot the way a rule parameter takes its
    /// argument.
    ///
    /// The argument is re-homed to the slot, but the map entry of the slot it
    /// came from is kept, so the caller still reaches it. Detached arguments
    /// are simply adopted. A `None` argument empties the slot.
    ///
    /// Returns a [`Loan`] when the argument had a home; hand it to
    /// [`StateTree::give_back`] once the slot goes out of scope.
    pub fn bind(&mut self, target: NodeId, argument: Option<NodeId>) -> Result<Option<Loan>> {
        let slot = self.node(target).parent.ok_or_else(|| Error::structure("cannot bind a node that has no parent"))?;
        if argument == Some(target) {
            return Ok(None);
        }

        self.node_mut(target).parent = None;
        let (parent, name) = slot;
        let Some(node) = argument else {
            self.node_mut(parent).children.remove(&name);
            return Ok(None);
        };
        let home = self.node_mut(node).parent.replace(slot);
        self.node_mut(parent).children.insert(name, node);
        Ok(home.map(|home| Loan { node, home, slot }))
    }

    /// Point a bound node back at the slot it was lent from.
    ///
    /// Nothing happens when the home slot no longer holds the node, or when
    /// the node has since been moved somewhere other than the bound slot.
    pub fn give_back(&mut self, loan: Loan) {
        let current = self.node(loan.node).parent;
        if current.is_some() && current != Some(loan.slot) {
            return;
        }
        let (home, name) = loan.home;
        if self.child(home, name) == Some(loan.node) {
            self.node_mut(loan.node).parent = Some(loan.home);
        }
    }

    /// Remove `id` from its parent and return it.
    pub fn detach(&mut self, id: NodeId) -> Result<NodeId> {
        if self.node(id).parent.is_none() {
            return Err(Error::structure("cannot remove a node that has no parent"));
        }
        self.release_slot(id);
        Ok(id)
    }

    /// Remove the child `name` of `id` and return it.
    pub fn remove_child(&mut self, id: NodeId, name: Symbol) -> Result<NodeId> {
        let child = self
            .node_mut(id)
            .children
            .remove(&name)
            .ok_or_else(|| Error::structure("cannot remove a child that does not exist"))?;
        if self.node(child).parent == Some((id, name)) {
            self.node_mut(child).parent = None;
        }
        Ok(child)
    }

    /// Clear the slot `id` owns, if any.
    fn release_slot(&mut self, id: NodeId) {
        if let Some((parent, name)) = self.node_mut(id).parent.take() {
            let children = &mut self.node_mut(parent).children;
            if children.get(&name) == Some(&id) {
                children.remove(&name);
            }
        }
    }

    /// Walk `path` from `id`, creating missing nodes when `create` is set.
    pub fn walk(&mut self, id: NodeId, path: &[Symbol], create: bool) -> Option<NodeId> {
        path.iter().try_fold(id, |node, &name| self.child_or_create(node, name, create))
    }

    /// Read-only variant of [`StateTree::walk`].
    pub fn find(&self, id: NodeId, path: &[Symbol]) -> Option<NodeId> {
        path.iter().try_fold(id, |node, &name| self.child(node, name))
    }

    /// Number of slots currently holding a node (reachable or not).
    pub fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Reclaim every node not reachable from `roots`; returns how many were freed.
    ///
    /// Surviving nodes whose parent link pointed into a reclaimed node are
    /// re-homed under the first reachable slot that holds them.
    pub fn sweep(&mut self, roots: &[NodeId]) -> usize {
        let free: HashSet<NodeId> = self.free.iter().copied().collect();
        let mut marked = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut marked[id.index()], true) {
                continue;
            }
            stack.extend(self.node(id).children.values().copied());
        }

        let mut reclaimed = 0;
        for index in 0..self.nodes.len() {
            let id = NodeId(index as u32);
            if marked[index] || free.contains(&id) {
                continue;
            }
            self.nodes[index] = StateNode::default();
            self.free.push(id);
            reclaimed += 1;
        }

        let mut orphans = Vec::new();
        for index in 0..self.nodes.len() {
            if !marked[index] {
                continue;
            }
            if let Some((parent, _)) = self.nodes[index].parent {
                if !marked[parent.index()] {
                    self.nodes[index].parent = None;
                    orphans.push(NodeId(index as u32));
                }
            }
        }
        if !orphans.is_empty() {
            let orphans: HashSet<NodeId> = orphans.into_iter().collect();
            for index in 0..self.nodes.len() {
                if !marked[index] {
                    continue;
                }
                let owner = NodeId(index as u32);
                let adopt: Vec<(Symbol, NodeId)> =
                    self.nodes[index].children.iter().filter(|(_, c)| orphans.contains(c)).map(|(&n, &c)| (n, c)).collect();
                for (name, child) in adopt {
                    if self.node(child).parent.is_none() {
                        self.node_mut(child).parent = Some((owner, name));
                    }
                }
            }
        }

        reclaimed
    }

    /// Indented dump of the subtree under `id`, children sorted by name.
    pub fn render(&self, id: NodeId, label: &str, symbols: &SymbolTable) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        self.render_into(&mut out, id, label, 0, symbols, &mut seen);
        out
    }

    fn render_into(
        &self,
        out: &mut String,
        id: NodeId,
        label: &str,
        depth: usize,
        symbols: &SymbolTable,
        seen: &mut HashSet<NodeId>,
    ) {
        let _ = writeln!(out, "{:indent$}{}: {}", "", label, describe(self.value(id)), indent = depth * 2);
        if !seen.insert(id) {
            return;
        }
        let mut children: Vec<(&str, NodeId)> =
            self.node(id).children.iter().map(|(&name, &child)| (symbols.get(name).unwrap_or("?"), child)).collect();
        children.sort_by(|a, b| a.0.cmp(b.0));
        for (name, child) in children {
            self.render_into(out, child, name, depth + 1, symbols, seen);
        }
        seen.remove(&id);
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("{s:?}"),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Null-safe equality of two optional node references, by value.
pub fn nodes_equal(tree: &StateTree, a: Option<NodeId>, b: Option<NodeId>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => tree.value(a).loose_eq(tree.value(b)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (StateTree, SymbolTable, NodeId) {
        let mut tree = StateTree::new();
        let root = tree.alloc(Value::Null);
        (tree, SymbolTable::new(), root)
    }

    #[test]
    fn create_mode_materializes_whole_path() {
        let (mut tree, mut symbols, root) = setup();
        let path = [symbols.intern("hero"), symbols.intern("inventory"), symbols.intern("gold")];

        assert_eq!(tree.walk(root, &path, false), None);
        let gold = tree.walk(root, &path, true).unwrap();
        assert_eq!(tree.value(gold), &Value::Int(0));
        assert_eq!(tree.find(root, &path), Some(gold));
        assert_eq!(tree.parent(gold).map(|(_, name)| name), Some(path[2]));
    }

    #[test]
    fn replace_relocates_the_replacement() {
        let (mut tree, mut symbols, root) = setup();
        let a = symbols.intern("a");
        let b = symbols.intern("b");
        let slot = tree.child_or_create(root, a, true).unwrap();
        let other = tree.child_or_create(root, b, true).unwrap();
        tree.set_value(other, Value::from("moved"));

        let detached = tree.replace(slot, Some(other)).unwrap();
        assert_eq!(detached, slot);
        assert_eq!(tree.parent(slot), None);
        assert_eq!(tree.child(root, a), Some(other));
        assert_eq!(tree.child(root, b), None);
        assert_eq!(tree.parent(other), Some((root, a)));
    }

    #[test]
    fn replace_with_none_empties_the_slot() {
        let (mut tree, mut symbols, root) = setup();
        let a = symbols.intern("a");
        let slot = tree.child_or_create(root, a, true).unwrap();
        tree.replace(slot, None).unwrap();
        assert_eq!(tree.child(root, a), None);
    }

    #[test]
    fn bind_rehomes_attached_arguments() {
        let (mut tree, mut symbols, root) = setup();
        let hero = symbols.intern("hero");
        let param = symbols.intern("Who");
        let scope = tree.alloc(Value::Int(0));
        let original = tree.child_or_create(root, hero, true).unwrap();
        let slot = tree.child_or_create(scope, param, true).unwrap();

        let loan = tree.bind(slot, Some(original)).unwrap().unwrap();
        assert_eq!(tree.child(scope, param), Some(original));
        assert_eq!(tree.child(root, hero), Some(original));
        assert_eq!(tree.parent(original), Some((scope, param)));

        tree.give_back(loan);
        assert_eq!(tree.parent(original), Some((root, hero)));
    }

    #[test]
    fn removing_a_bound_node_keeps_the_home_entry() {
        let (mut tree, mut symbols, root) = setup();
        let hero = symbols.intern("hero");
        let param = symbols.intern("Who");
        let scope = tree.alloc(Value::Int(0));
        let original = tree.child_or_create(root, hero, true).unwrap();
        let slot = tree.child_or_create(scope, param, true).unwrap();
        let loan = tree.bind(slot, Some(original)).unwrap().unwrap();

        tree.detach(original).unwrap();
        assert_eq!(tree.child(scope, param), None);
        assert_eq!(tree.child(root, hero), Some(original));

        tree.give_back(loan);
        assert_eq!(tree.parent(original), Some((root, hero)));
        assert_eq!(tree.detach(original).unwrap(), original);
        assert_eq!(tree.child(root, hero), None);
    }

    #[test]
    fn give_back_leaves_moved_nodes_alone() {
        let (mut tree, mut symbols, root) = setup();
        let hero = symbols.intern("hero");
        let param = symbols.intern("Who");
        let elsewhere = symbols.intern("elsewhere");
        let scope = tree.alloc(Value::Int(0));
        let original = tree.child_or_create(root, hero, true).unwrap();
        let slot = tree.child_or_create(scope, param, true).unwrap();
        let loan = tree.bind(slot, Some(original)).unwrap().unwrap();

        tree.attach(root, elsewhere, original);
        tree.give_back(loan);
        assert_eq!(tree.parent(original), Some((root, elsewhere)));
    }

    #[test]
    fn bind_adopts_detached_arguments() {
        let (mut tree, mut symbols, _) = setup();
        let param = symbols.intern("Who");
        let scope = tree.alloc(Value::Int(0));
        let slot = tree.child_or_create(scope, param, true).unwrap();
        let literal = tree.alloc(Value::from("Ava"));

        assert_eq!(tree.bind(slot, Some(literal)).unwrap(), None);
        assert_eq!(tree.parent(literal), Some((scope, param)));
    }

    #[test]
    fn detach_requires_a_parent() {
        let (mut tree, mut symbols, root) = setup();
        assert!(matches!(tree.detach(root), Err(Error::Structure(_))));

        let key = symbols.intern("key");
        let child = tree.child_or_create(root, key, true).unwrap();
        assert_eq!(tree.detach(child).unwrap(), child);
        assert_eq!(tree.child(root, key), None);
        assert!(tree.detach(child).is_err());
    }

    #[test]
    fn remove_child_fails_when_absent() {
        let (mut tree, mut symbols, root) = setup();
        let key = symbols.intern("key");
        assert!(matches!(tree.remove_child(root, key), Err(Error::Structure(_))));
        let child = tree.child_or_create(root, key, true).unwrap();
        assert_eq!(tree.remove_child(root, key).unwrap(), child);
        assert_eq!(tree.parent(child), None);
    }

    #[test]
    fn null_safe_node_equality() {
        let (mut tree, _, _) = setup();
        let a = tree.alloc(Value::Int(3));
        let b = tree.alloc(Value::Float(3.0));
        assert!(nodes_equal(&tree, None, None));
        assert!(!nodes_equal(&tree, Some(a), None));
        assert!(nodes_equal(&tree, Some(a), Some(b)));
    }

    #[test]
    fn sweep_reclaims_unreachable_nodes_and_rehomes_aliases() {
        let (mut tree, mut symbols, root) = setup();
        let x = symbols.intern("x");
        let local = symbols.intern("Local");
        let scope = tree.alloc(Value::Int(0));
        let owned = tree.child_or_create(scope, local, true).unwrap();
        let slot = tree.child_or_create(root, x, true).unwrap();
        // Bind a scope-owned node into the root, as a lowercase parameter would.
        tree.bind(slot, Some(owned)).unwrap();
        let garbage = tree.alloc(Value::from("temp"));

        let before = tree.live();
        let reclaimed = tree.sweep(&[root]);
        assert_eq!(reclaimed, 3); // scope, the old `x` slot, the temporary
        assert_eq!(tree.live(), before - 3);
        assert_eq!(tree.child(root, x), Some(owned));
        assert_eq!(tree.parent(owned), Some((root, x)));

        let reused = tree.alloc(Value::Int(1));
        assert!([scope, slot, garbage].contains(&reused));
    }

    #[test]
    fn render_lists_children_sorted() {
        let (mut tree, mut symbols, root) = setup();
        let path = [symbols.intern("hero"), symbols.intern("name")];
        let name = tree.walk(root, &path, true).unwrap();
        tree.set_value(name, Value::from("Ava"));
        let gold = tree.walk(root, &[symbols.intern("gold")], true).unwrap();
        tree.set_value(gold, Value::Int(5));

        assert_eq!(tree.render(root, "root", &symbols), "root: null\n  gold: 5\n  hero: 0\n    name: \"Ava\"\n");
    }
}
