use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::Graph;
use crate::node::{NodeId, NodeRef};
use crate::op::OpKind;

/// Buffer lifetimes over a graph's topological order.
///
/// Buffers belong to the node that defines them. `GetOutputElement` nodes
/// own nothing: they read their producer's buffer, so a use of one counts as
/// a use of the producer. Parameters, constants and results that own their
/// buffer are persistent and never freed.
#[derive(Debug, Clone)]
pub struct Liveness {
    order: Vec<NodeRef>,
    last_use: HashMap<NodeId, usize>,
    persistent: HashSet<NodeId>,
    frees: Vec<Vec<NodeRef>>,
}

impl Liveness {
    pub fn compute(graph: &Graph) -> Liveness {
        let order: Vec<NodeRef> = graph.topological_order().collect();

        let mut persistent: HashSet<NodeId> = order
            .iter()
            .filter(|n| n.is_parameter() || n.is_constant())
            .map(|n| n.id())
            .collect();
        persistent.extend(
            graph
                .results()
                .iter()
                .filter(|r| !is_alias(r))
                .map(|r| r.id()),
        );

        let mut last_use = HashMap::new();
        for (position, node) in order.iter().enumerate() {
            if !is_alias(node) {
                last_use.insert(node.id(), position);
            }
            for input in node.inputs() {
                last_use.insert(buffer_owner(input).id(), position);
            }
        }

        let mut frees = vec![Vec::new(); order.len()];
        for node in &order {
            if is_alias(node) || persistent.contains(&node.id()) {
                continue;
            }
            if let Some(&position) = last_use.get(&node.id()) {
                frees[position].push(Arc::clone(node));
            }
        }

        Liveness {
            order,
            last_use,
            persistent,
            frees,
        }
    }

    /// The topological order positions refer to.
    pub fn order(&self) -> &[NodeRef] {
        &self.order
    }

    /// Position of the last node reading `node`'s buffer.
    pub fn last_use(&self, node: &NodeRef) -> Option<usize> {
        self.last_use.get(&buffer_owner(node).id()).copied()
    }

    pub fn is_persistent(&self, node: &NodeRef) -> bool {
        self.persistent.contains(&buffer_owner(node).id())
    }

    /// Buffers that die once the node at `position` has run.
    pub fn freed_after(&self, position: usize) -> &[NodeRef] {
        self.frees.get(position).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn is_alias(node: &NodeRef) -> bool {
    matches!(node.op(), OpKind::GetOutputElement { .. })
}

/// The node whose buffer `node` reads from.
pub fn buffer_owner(node: &NodeRef) -> &NodeRef {
    let mut owner = node;
    while is_alias(owner) {
        match owner.inputs().first() {
            Some(producer) => owner = producer,
            None => break,
        }
    }
    owner
}
