//! Arena-backed draw tree.
//!
//! Nodes are addressed by [`NodeId`]; each keeps the ids of its children in creation order and a
//! back-index to its parent. Node 0 is the root.

use std::collections::HashMap;

use crate::draw::DrawcallDescription;
use crate::ids::{EventId, ResourceId};
use crate::indirect::IndirectPatch;
use crate::usage::EventUsage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawTreeNode {
    pub draw: DrawcallDescription,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub indirect_patch: Option<IndirectPatch>,
    pub resource_usage: Vec<(ResourceId, EventUsage)>,
}

impl DrawTreeNode {
    fn new(draw: DrawcallDescription, parent: Option<NodeId>) -> Self {
        Self {
            draw,
            parent,
            children: Vec::new(),
            indirect_patch: None,
            resource_usage: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawTree {
    nodes: Vec<DrawTreeNode>,
    by_event: HashMap<EventId, NodeId>,
}

impl Default for DrawTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![DrawTreeNode::new(
                DrawcallDescription::new("root", Default::default()),
                None,
            )],
            by_event: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &DrawTreeNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DrawTreeNode {
        &mut self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&DrawTreeNode> {
        self.nodes.get(id.index())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Adds `draw` as the last child of `parent`.
    pub fn push_child(&mut self, parent: NodeId, draw: DrawcallDescription) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.by_event.entry(draw.event_id).or_insert(id);
        self.nodes.push(DrawTreeNode::new(draw, Some(parent)));
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Node whose draw carries `event_id`. When several nodes share an event the first one
    /// created wins.
    pub fn find_by_event(&self, event_id: EventId) -> Option<NodeId> {
        self.by_event.get(&event_id).copied()
    }

    /// Copies every child of `src`'s root (recursively) under `parent`, shifting event ids by
    /// `event_offset`. Returns the ids of the copied top-level nodes.
    pub fn graft(&mut self, parent: NodeId, src: &DrawTree, event_offset: EventId) -> Vec<NodeId> {
        let mut top = Vec::with_capacity(src.children(src.root()).len());
        // (node in src, new parent in self)
        let mut stack: Vec<(NodeId, NodeId)> = src
            .children(src.root())
            .iter()
            .rev()
            .map(|&c| (c, parent))
            .collect();

        while let Some((src_id, dst_parent)) = stack.pop() {
            let src_node = src.node(src_id);
            let mut draw = src_node.draw.clone();
            rebase_draw(&mut draw, event_offset);
            let new_id = self.push_child(dst_parent, draw);
            {
                let node = self.node_mut(new_id);
                node.indirect_patch = src_node.indirect_patch.clone();
                node.resource_usage = src_node
                    .resource_usage
                    .iter()
                    .map(|(r, u)| {
                        (
                            *r,
                            EventUsage {
                                event_id: u.event_id + event_offset,
                                ..*u
                            },
                        )
                    })
                    .collect();
            }
            if dst_parent == parent {
                top.push(new_id);
            }
            stack.extend(src_node.children.iter().rev().map(|&c| (c, new_id)));
        }
        top
    }

    /// Pre-order walk of every node except the root, with depth (top-level nodes are depth 0).
    pub fn walk(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::with_capacity(self.nodes.len().saturating_sub(1));
        let mut stack: Vec<(usize, NodeId)> =
            self.children(self.root()).iter().rev().map(|&c| (0, c)).collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            stack.extend(self.children(id).iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    /// Event ids of every node, in tree order.
    pub fn event_ids(&self) -> Vec<EventId> {
        self.walk()
            .into_iter()
            .map(|(_, id)| self.node(id).draw.event_id)
            .collect()
    }
}

fn rebase_draw(draw: &mut DrawcallDescription, event_offset: EventId) {
    draw.event_id += event_offset;
    for ev in &mut draw.events {
        ev.event_id += event_offset;
    }
}
