use super::{EdgeId, Network, Node, NodeId};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

const CEILING_EPSILON: f64 = 1e-9;

/// A route with residual capacity on every element.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub unit_cost: f64,
    pub lead_time: u64,
}

// Candidate route in the search frontier. Ordered by cost, then lead time,
// then the node and edge sequences so equal-cost ties resolve the same way
// every run.
#[derive(Debug, Clone)]
struct Label {
    cost: f64,
    lead_time: u64,
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.lead_time.cmp(&other.lead_time))
            .then_with(|| self.nodes.cmp(&other.nodes))
            .then_with(|| self.edges.cmp(&other.edges))
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

/// Intermediate hops must be able to hold goods; factories and markets only
/// appear at the ends of a route.
pub(crate) fn can_transit(node: &Node) -> bool {
    node.node_type().holds_stock()
}

/// Cheapest route from `source` to `sink` with spare capacity everywhere.
///
/// `cost_ceiling` bounds the per-unit cost; anything pricier counts as no route.
pub(crate) fn cheapest_path(
    net: &Network,
    source: NodeId,
    sink: NodeId,
    cost_ceiling: Option<f64>,
) -> Option<Path> {
    if net.node(source)?.residual() == 0 {
        return None;
    }

    let mut settled = vec![false; net.nodes().len()];
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(Label {
        cost: 0.0,
        lead_time: 0,
        nodes: vec![source],
        edges: Vec::new(),
    }));

    while let Some(Reverse(label)) = frontier.pop() {
        let at = *label.nodes.last()?;
        if settled[at.index()] {
            continue;
        }
        settled[at.index()] = true;

        if at == sink {
            return Some(Path {
                nodes: label.nodes,
                edges: label.edges,
                unit_cost: label.cost,
                lead_time: label.lead_time,
            });
        }
        if at != source && !can_transit(net.node(at)?) {
            continue;
        }

        for &eid in net.outgoing(at) {
            let Some(edge) = net.edge(eid) else { continue };
            if edge.residual() == 0 || settled[edge.target.index()] {
                continue;
            }
            let Some(next) = net.node(edge.target) else { continue };
            if next.residual() == 0 {
                continue;
            }

            let cost = label.cost + edge.cost_per_unit;
            if cost_ceiling.is_some_and(|c| cost > c + CEILING_EPSILON) {
                continue;
            }

            let mut nodes = label.nodes.clone();
            nodes.push(edge.target);
            let mut edges = label.edges.clone();
            edges.push(eid);
            frontier.push(Reverse(Label {
                cost,
                lead_time: label.lead_time + u64::from(edge.lead_time),
                nodes,
                edges,
            }));
        }
    }

    None
}
