//! Arena-backed unified config tree
//!
//! Nodes live in one `Vec` and link to each other through [`NodeId`] handles.
//! A node's children are recorded once while the tree is built and are
//! read-only afterwards.

use std::collections::VecDeque;

use indexmap::IndexMap;

use crate::parser::{Module, ModuleCall};

/// Handle of a node inside a [`ConfigTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One module of the unified tree
#[derive(Debug, Clone)]
pub struct ConfigNode {
    /// `root`, or the name of the module call that instantiated this node
    pub name: String,
    pub module: Module,
    pub parent: Option<NodeId>,
    /// The call in the parent module that instantiated this node
    pub parent_call: Option<ModuleCall>,
    /// Synthetic version, distinct for every instantiated child
    pub version: String,
    children: IndexMap<String, NodeId>,
}

impl ConfigNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<ConfigNode>,
}

impl ConfigTree {
    pub const ROOT_NAME: &'static str = "root";

    pub fn new(root: Module) -> Self {
        Self {
            nodes: vec![ConfigNode {
                name: Self::ROOT_NAME.to_string(),
                module: root,
                parent: None,
                parent_call: None,
                version: String::new(),
                children: IndexMap::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ConfigNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach `module` as a child of `parent` under the name of `call`
    pub fn add_child(&mut self, parent: NodeId, call: ModuleCall, module: Module, version: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        let name = call.name.clone();
        self.nodes.push(ConfigNode {
            name: name.clone(),
            module,
            parent: Some(parent),
            parent_call: Some(call),
            version,
            children: IndexMap::new(),
        });
        self.nodes[parent.0].children.insert(name, id);
        id
    }

    /// Child of `id` named `name`
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).children.get(name).copied()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.node(id)
            .children
            .iter()
            .map(|(name, child)| (name.as_str(), *child))
    }

    /// `id`'s parent, grandparent and so on up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |current| self.node(*current).parent)
    }

    /// Every node, parents before children, siblings in insertion order
    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node(id).children.values().copied());
        }
        order
    }
}
