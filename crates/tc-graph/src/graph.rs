use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{GraphError, ValidationError};
use crate::liveness::Liveness;
use crate::node::{Node, NodeId, NodeRef};

pub type Result<T> = std::result::Result<T, GraphError>;

/// A computation: every node reachable from `results`, fed by `parameters`.
///
/// The graph owns nothing but the two lists; membership is the transitive
/// closure over node inputs, so sharing a node between graphs is free.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    parameters: Vec<NodeRef>,
    results: Vec<NodeRef>,
}

impl Graph {
    /// Build a graph, checking that `parameters` are distinct `Parameter`
    /// nodes and that every parameter reachable from `results` is declared.
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<NodeRef>,
        results: Vec<NodeRef>,
    ) -> Result<Graph> {
        let name = name.into();
        check_declarations(&parameters, &results)?;
        log::debug!(
            "graph '{}': {} parameters, {} results",
            name,
            parameters.len(),
            results.len()
        );
        Ok(Graph {
            name,
            parameters,
            results,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[NodeRef] {
        &self.parameters
    }

    pub fn results(&self) -> &[NodeRef] {
        &self.results
    }

    /// Append `node` to the result list.
    pub fn add_result(&mut self, node: NodeRef) -> Result<()> {
        let mut results = self.results.clone();
        results.push(node);
        check_declarations(&self.parameters, &results)?;
        self.results = results;
        Ok(())
    }

    /// Parameters in declaration order, then every other node after all of
    /// its inputs. Deterministic for a given graph.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        TopologicalOrder::new(&self.parameters, &self.results)
    }

    /// Call `f` on every node in topological order.
    pub fn traverse_nodes<F: FnMut(&NodeRef)>(&self, mut f: F) {
        for node in self.topological_order() {
            f(&node);
        }
    }

    pub fn node_count(&self) -> usize {
        self.topological_order().count()
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.topological_order().any(|n| n.is_same(node))
    }

    /// Consumers of every node, each listed once per producer, in
    /// topological order.
    pub fn users(&self) -> HashMap<NodeId, Vec<NodeRef>> {
        let mut users: HashMap<NodeId, Vec<NodeRef>> = HashMap::new();
        for node in self.topological_order() {
            let mut seen = HashSet::new();
            for input in node.inputs() {
                if seen.insert(input.id()) {
                    users.entry(input.id()).or_default().push(Arc::clone(&node));
                }
            }
        }
        users
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::compute(self)
    }

    /// Rewire every consumer of `old` to read from `new` instead.
    ///
    /// Consumers are rebuilt bottom-up through
    /// [`Node::copy_with_new_inputs`], so each one is validated again. On
    /// any error the graph is left as it was.
    pub fn replace_node(&mut self, old: &NodeRef, new: &NodeRef) -> Result<()> {
        if old.is_same(new) {
            return Ok(());
        }
        let order: Vec<NodeRef> = self.topological_order().collect();
        if !order.iter().any(|n| n.is_same(old)) {
            return Err(GraphError::NodeNotInGraph(old.name().to_string()));
        }

        // Everything downstream of `old` gets rebuilt; `new` may not depend
        // on any of it.
        let mut downstream = HashSet::new();
        for node in &order {
            if node
                .inputs()
                .iter()
                .any(|i| i.is_same(old) || downstream.contains(&i.id()))
            {
                downstream.insert(node.id());
            }
        }
        if let Some(hit) = find_ancestor(new, |n| downstream.contains(&n.id())) {
            return Err(GraphError::CycleDetected {
                producer: new.name().to_string(),
                consumer: hit.name().to_string(),
            });
        }

        let mut parameters = self.parameters.clone();
        if old.is_parameter() {
            if !new.is_parameter() {
                return Err(GraphError::NotAParameter(new.name().to_string()));
            }
            for slot in parameters.iter_mut().filter(|p| p.is_same(old)) {
                *slot = Arc::clone(new);
            }
        }

        let mut rebuilt: HashMap<NodeId, NodeRef> = HashMap::new();
        rebuilt.insert(old.id(), Arc::clone(new));
        for node in &order {
            if !downstream.contains(&node.id()) {
                continue;
            }
            let inputs = node
                .inputs()
                .iter()
                .map(|i| rebuilt.get(&i.id()).cloned().unwrap_or_else(|| Arc::clone(i)))
                .collect();
            let copy = node.copy_with_new_inputs(inputs)?;
            rebuilt.insert(node.id(), copy);
        }

        let results: Vec<NodeRef> = self
            .results
            .iter()
            .map(|r| rebuilt.get(&r.id()).cloned().unwrap_or_else(|| Arc::clone(r)))
            .collect();
        check_declarations(&parameters, &results)?;

        log::debug!(
            "graph '{}': replaced '{}' with '{}', rebuilt {} consumers",
            self.name,
            old.name(),
            new.name(),
            downstream.len()
        );
        self.parameters = parameters;
        self.results = results;
        Ok(())
    }

    /// Make input `input_index` of `consumer` read from `producer`.
    ///
    /// Returns the rebuilt consumer, which takes the old one's place.
    pub fn connect(
        &mut self,
        consumer: &NodeRef,
        input_index: usize,
        producer: &NodeRef,
    ) -> Result<NodeRef> {
        let arity = consumer.inputs().len();
        if input_index >= arity {
            return Err(GraphError::InputIndexOutOfRange {
                node: consumer.name().to_string(),
                index: input_index,
                arity,
            });
        }
        if !self.contains(consumer) {
            return Err(GraphError::NodeNotInGraph(consumer.name().to_string()));
        }
        if producer.is_same(consumer)
            || find_ancestor(producer, |n| n.is_same(consumer)).is_some()
        {
            return Err(GraphError::CycleDetected {
                producer: producer.name().to_string(),
                consumer: consumer.name().to_string(),
            });
        }

        let mut inputs = consumer.inputs().to_vec();
        inputs[input_index] = Arc::clone(producer);
        let replacement = consumer.copy_with_new_inputs(inputs)?;
        self.replace_node(consumer, &replacement)?;
        Ok(replacement)
    }
}

/// True when every node's inputs appear before it in `nodes`.
pub fn validate_list(nodes: &[NodeRef]) -> bool {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !node.inputs().iter().all(|i| seen.contains(&i.id())) {
            return false;
        }
        seen.insert(node.id());
    }
    true
}

/// Lazy post-order walk over a graph, driven by an explicit stack.
pub struct TopologicalOrder<'g> {
    parameters: std::slice::Iter<'g, NodeRef>,
    roots: std::slice::Iter<'g, NodeRef>,
    stack: Vec<(NodeRef, usize)>,
    visited: HashSet<NodeId>,
}

impl<'g> TopologicalOrder<'g> {
    fn new(parameters: &'g [NodeRef], results: &'g [NodeRef]) -> Self {
        TopologicalOrder {
            parameters: parameters.iter(),
            roots: results.iter(),
            stack: Vec::new(),
            visited: HashSet::new(),
        }
    }
}

impl Iterator for TopologicalOrder<'_> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        for param in self.parameters.by_ref() {
            if self.visited.insert(param.id()) {
                return Some(Arc::clone(param));
            }
        }

        loop {
            let Some((node, next_input)) = self.stack.last_mut() else {
                let root = self.roots.next()?;
                if self.visited.insert(root.id()) {
                    self.stack.push((Arc::clone(root), 0));
                }
                continue;
            };
            if let Some(input) = node.inputs().get(*next_input) {
                *next_input += 1;
                if self.visited.insert(input.id()) {
                    let input = Arc::clone(input);
                    self.stack.push((input, 0));
                }
                continue;
            }
            return self.stack.pop().map(|(node, _)| node);
        }
    }
}

/// Depth-first search over the inputs of `start` (excluding `start`).
fn find_ancestor(start: &NodeRef, mut pred: impl FnMut(&NodeRef) -> bool) -> Option<NodeRef> {
    let mut visited = HashSet::new();
    let mut stack: Vec<NodeRef> = start.inputs().to_vec();
    while let Some(node) = stack.pop() {
        if !visited.insert(node.id()) {
            continue;
        }
        if pred(&node) {
            return Some(node);
        }
        stack.extend(node.inputs().iter().cloned());
    }
    None
}

fn check_declarations(parameters: &[NodeRef], results: &[NodeRef]) -> Result<()> {
    let mut declared = HashSet::new();
    for param in parameters {
        if !param.is_parameter() {
            return Err(GraphError::NotAParameter(param.name().to_string()));
        }
        if !declared.insert(param.id()) {
            return Err(GraphError::DuplicateParameter(param.name().to_string()));
        }
    }
    for (index, result) in results.iter().enumerate() {
        if result.outputs().len() != 1 {
            return Err(ValidationError::MultiOutputInput {
                op: "Result",
                index,
                outputs: result.outputs().len(),
            }
            .into());
        }
    }
    for node in TopologicalOrder::new(&[], results) {
        if node.is_parameter() && !declared.contains(&node.id()) {
            return Err(GraphError::UndeclaredParameter(node.name().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use tc_tensor::{DType, Shape};

    /// Six scalar parameters combined as
    /// `((a0 + a1) . a2 + a4) + ((a0 + a1) * a3 + a5)`.
    fn make_test_graph() -> (Graph, Vec<NodeRef>) {
        let params: Vec<NodeRef> = (0..6)
            .map(|i| ops::named_parameter(&format!("arg{i}"), DType::F32, Shape::scalar()))
            .collect();
        let t0 = ops::add(&params[0], &params[1]).unwrap();
        let t1 = ops::dot(&t0, &params[2]).unwrap();
        let t2 = ops::multiply(&t0, &params[3]).unwrap();
        let t3 = ops::add(&t1, &params[4]).unwrap();
        let t4 = ops::add(&t2, &params[5]).unwrap();
        let r0 = ops::add(&t3, &t4).unwrap();
        let graph = Graph::new("test_graph", params.clone(), vec![r0]).unwrap();
        (graph, params)
    }

    fn position(order: &[NodeRef], op: &str) -> usize {
        order.iter().position(|n| n.op_name() == op).unwrap()
    }

    #[test]
    fn test_topological_order_of_test_graph() {
        let (graph, params) = make_test_graph();
        let order: Vec<NodeRef> = graph.topological_order().collect();
        assert_eq!(order.len(), 12);
        assert!(validate_list(&order));

        for (i, param) in params.iter().enumerate() {
            assert!(order[i].is_same(param));
        }
        let first_add = position(&order, "Add");
        assert!(order[first_add].inputs()[0].is_same(&params[0]));
        assert!(first_add < position(&order, "Dot"));
        assert!(first_add < position(&order, "Multiply"));
        assert!(order[11].is_same(&graph.results()[0]));
    }

    #[test]
    fn test_order_is_deterministic() {
        let (graph, _) = make_test_graph();
        let a: Vec<NodeId> = graph.topological_order().map(|n| n.id()).collect();
        let b: Vec<NodeId> = graph.topological_order().map(|n| n.id()).collect();
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 12);
    }

    #[test]
    fn test_validate_list_rejects_bad_order() {
        let (graph, _) = make_test_graph();
        let mut order: Vec<NodeRef> = graph.topological_order().collect();
        order.reverse();
        assert!(!validate_list(&order));
        assert!(validate_list(&[]));
    }

    #[test]
    fn test_shared_subexpression_visited_once() {
        let a = ops::parameter(DType::F32, [2]);
        let mut node = ops::negative(&a).unwrap();
        for _ in 0..5 {
            node = ops::add(&node, &node).unwrap();
        }
        let graph = Graph::new("diamond", vec![a], vec![node]).unwrap();
        let order: Vec<NodeRef> = graph.topological_order().collect();
        assert_eq!(order.len(), 7);
        assert!(validate_list(&order));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let a = ops::parameter(DType::F32, [1]);
        let mut node = Arc::clone(&a);
        for _ in 0..50_000 {
            node = ops::relu(&node).unwrap();
        }
        let graph = Graph::new("chain", vec![a], vec![node]).unwrap();
        assert_eq!(graph.node_count(), 50_001);
    }

    #[test]
    fn test_parameter_declarations() {
        let a = ops::parameter(DType::F32, [2]);
        let b = ops::parameter(DType::F32, [2]);
        let sum = ops::add(&a, &b).unwrap();

        let err = Graph::new("g", vec![a.clone()], vec![sum.clone()]).unwrap_err();
        assert_eq!(err, GraphError::UndeclaredParameter(b.name().to_string()));

        let duplicated = vec![a.clone(), a.clone(), b.clone()];
        let err = Graph::new("g", duplicated, vec![sum.clone()]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateParameter(_)));

        let err = Graph::new("g", vec![a.clone(), sum.clone()], vec![sum.clone()]).unwrap_err();
        assert!(matches!(err, GraphError::NotAParameter(_)));

        // Unused declared parameters are still part of the graph.
        let c = ops::parameter(DType::F32, [2]);
        let graph = Graph::new("g", vec![a, b, c.clone()], vec![sum]).unwrap();
        assert!(graph.contains(&c));
    }

    #[test]
    fn test_add_result() {
        let a = ops::parameter(DType::F32, [2]);
        let b = ops::parameter(DType::F32, [2]);
        let mut graph = Graph::new("g", vec![a.clone()], vec![ops::negative(&a).unwrap()]).unwrap();

        let undeclared = ops::add(&a, &b).unwrap();
        assert!(graph.add_result(undeclared).is_err());
        assert_eq!(graph.results().len(), 1);

        graph.add_result(ops::exp(&a).unwrap()).unwrap();
        assert_eq!(graph.results().len(), 2);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_users() {
        let (graph, params) = make_test_graph();
        let users = graph.users();
        let t0_users = &users[&graph
            .topological_order()
            .find(|n| n.op_name() == "Add")
            .unwrap()
            .id()];
        assert_eq!(t0_users.len(), 2);
        assert_eq!(users[&params[0].id()].len(), 1);
        assert!(!users.contains_key(&graph.results()[0].id()));
    }

    #[test]
    fn test_replace_node_rebuilds_consumers() {
        let (mut graph, params) = make_test_graph();
        let t0 = graph
            .topological_order()
            .find(|n| n.op_name() == "Add")
            .unwrap();
        let sub = ops::subtract(&params[0], &params[1]).unwrap();
        graph.replace_node(&t0, &sub).unwrap();

        assert!(!graph.contains(&t0));
        assert!(graph.contains(&sub));
        assert_eq!(graph.node_count(), 12);
        let order: Vec<NodeRef> = graph.topological_order().collect();
        assert!(validate_list(&order));
    }

    #[test]
    fn test_replace_node_rejects_cycle_and_keeps_graph() {
        let (mut graph, params) = make_test_graph();
        let before: Vec<NodeId> = graph.topological_order().map(|n| n.id()).collect();
        let t0 = graph
            .topological_order()
            .find(|n| n.op_name() == "Add")
            .unwrap();
        let t2 = graph
            .topological_order()
            .find(|n| n.op_name() == "Multiply")
            .unwrap();
        // Feeding t0's replacement from t2 would make t2 its own ancestor.
        let looped = ops::add(&t2, &params[1]).unwrap();
        let err = graph.replace_node(&t0, &looped).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));

        let after: Vec<NodeId> = graph.topological_order().map(|n| n.id()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_replace_node_validation_failure_keeps_graph() {
        let a = ops::parameter(DType::F32, [2]);
        let b = ops::parameter(DType::F32, [2]);
        let neg = ops::negative(&a).unwrap();
        let sum = ops::add(&neg, &b).unwrap();
        let mut graph = Graph::new("g", vec![a.clone(), b], vec![sum.clone()]).unwrap();

        let wide = ops::constant(DType::F32, [3], vec![1.0]).unwrap();
        let err = graph.replace_node(&neg, &wide).unwrap_err();
        assert!(matches!(err, GraphError::Validation(ValidationError::ShapeMismatch { .. })));
        assert!(graph.results()[0].is_same(&sum));

        let stranger = ops::parameter(DType::F32, [2]);
        let err = graph.replace_node(&stranger, &neg).unwrap_err();
        assert!(matches!(err, GraphError::NodeNotInGraph(_)));
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let a = ops::parameter(DType::F32, [2]);
        let n1 = ops::negative(&a).unwrap();
        let n2 = ops::negative(&n1).unwrap();
        let mut graph = Graph::new("g", vec![a.clone()], vec![n2.clone()]).unwrap();

        let err = graph.connect(&n1, 0, &n2).unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                producer: n2.name().to_string(),
                consumer: n1.name().to_string(),
            }
        );
        assert!(matches!(
            graph.connect(&n1, 0, &n1).unwrap_err(),
            GraphError::CycleDetected { .. }
        ));
        assert!(graph.results()[0].is_same(&n2));
    }

    #[test]
    fn test_connect_rebinds_edge() {
        let a = ops::parameter(DType::F32, [2]);
        let b = ops::parameter(DType::F32, [2]);
        let n1 = ops::negative(&a).unwrap();
        let n2 = ops::exp(&n1).unwrap();
        let mut graph = Graph::new("g", vec![a, b.clone()], vec![n2.clone()]).unwrap();

        let rebuilt = graph.connect(&n2, 0, &b).unwrap();
        assert!(graph.results()[0].is_same(&rebuilt));
        assert!(rebuilt.inputs()[0].is_same(&b));
        assert!(!graph.contains(&n1));

        let err = graph.connect(&rebuilt, 3, &b).unwrap_err();
        assert!(matches!(err, GraphError::InputIndexOutOfRange { index: 3, arity: 1, .. }));
    }

    #[test]
    fn test_multi_output_result_rejected() {
        let (n, c, h) = (1, 2, 2);
        let params = vec![
            ops::parameter(DType::F32, [n, c]),
            ops::parameter(DType::F32, [2 * n, h]),
            ops::parameter(DType::F32, [4 * h, c]),
            ops::parameter(DType::F32, [4 * h, h]),
            ops::parameter(DType::F32, [4 * h]),
        ];
        let cell =
            ops::lstm_fused(&params[0], &params[1], &params[2], &params[3], &params[4]).unwrap();
        let err = Graph::new("g", params.clone(), vec![cell.clone()]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Validation(ValidationError::MultiOutputInput { op: "Result", .. })
        ));
        let h_out = ops::get_output_element(&cell, 0).unwrap();
        assert!(Graph::new("g", params, vec![h_out]).is_ok());
    }
}
