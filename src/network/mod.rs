pub mod definition;
pub mod edge;
pub mod node;
pub mod routing;
pub mod synthetic;
mod degradation;

pub use definition::{EdgeDefinition, NetworkDefinition, NodeDefinition};
pub use edge::{Edge, EdgeId, TransportMode};
pub use node::{Node, NodeId, NodeKind, NodeType};
pub use routing::Path;

use crate::disruption::{DisruptionEvent, DisruptionId, ElementKey, TargetScope};
use crate::error::{Result, SimError};
use degradation::Degradation;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

pub type Units = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementRef {
    Node(NodeId),
    Edge(EdgeId),
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => id.fmt(f),
            Self::Edge(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UtilizationSnapshot {
    pub step: u64,
    pub node_utilization: Vec<Units>,
    pub edge_flow: Vec<Units>,
}

#[derive(Debug, Clone)]
pub struct ActiveDisruption {
    pub event: DisruptionEvent,
    pub targets: Vec<ElementRef>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutedPath {
    pub units: Units,
    pub unit_cost: f64,
    pub lead_time: u64,
}

/// What a `request_flow` call actually achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowOutcome {
    pub requested: Units,
    pub routed: Units,
    pub cost: f64,
    // units × steps, summed over every path used
    pub lead_time_units: u64,
    pub paths: Vec<RoutedPath>,
}

impl FlowOutcome {
    pub fn unmet(requested: Units) -> Self {
        Self { requested, ..Self::default() }
    }

    pub fn shortfall(&self) -> Units {
        self.requested - self.routed
    }

    pub fn avg_lead_time(&self) -> f64 {
        if self.routed == 0 {
            0.0
        } else {
            self.lead_time_units as f64 / self.routed as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Arrival {
    node: NodeId,
    units: Units,
}

/// The supply-chain graph for one run.
///
/// Nodes and edges live in arenas indexed by `NodeId`/`EdgeId`, string keys
/// from the definition only matter when resolving configuration. State changes
/// go through `apply_disruption`, `request_flow` and `advance_step`.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_keys: HashMap<String, NodeId>,
    edge_keys: HashMap<String, EdgeId>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    step: u64,
    in_transit: BTreeMap<u64, Vec<Arrival>>,
    active: BTreeMap<DisruptionId, ActiveDisruption>,
    history: Vec<UtilizationSnapshot>,
}

impl Network {
    pub fn from_definition(def: &NetworkDefinition) -> Result<Self> {
        let mut nodes = Vec::with_capacity(def.nodes.len());
        let mut node_keys = HashMap::new();

        for (i, nd) in def.nodes.iter().enumerate() {
            if nd.id.trim().is_empty() {
                return Err(SimError::config(format!("node #{} has an empty id", i)));
            }
            let id = NodeId::new(i as u32);
            if node_keys.insert(nd.id.clone(), id).is_some() {
                return Err(SimError::config(format!("duplicate node id '{}'", nd.id)));
            }

            let kind = match nd.node_type {
                NodeType::Factory => NodeKind::Factory {
                    production_rate: nd.production_rate.unwrap_or(nd.capacity),
                },
                NodeType::Port => NodeKind::Port,
                NodeType::Warehouse => NodeKind::Warehouse,
                NodeType::TransportHub => NodeKind::TransportHub,
                NodeType::Market => NodeKind::Market {
                    demand_rate: nd.demand_rate.unwrap_or(0),
                },
            };

            let stock = if nd.node_type.holds_stock() {
                nd.initial_inventory
            } else {
                if nd.initial_inventory > 0 {
                    warn!("Ignoring initial inventory on {} '{}'", nd.node_type, nd.id);
                }
                0
            };

            nodes.push(Node {
                id,
                key: nd.id.clone(),
                kind,
                region: nd.region.clone(),
                capacity: nd.capacity,
                utilization: 0,
                stock,
                degradation: Degradation::default(),
            });
        }

        let mut edges = Vec::with_capacity(def.edges.len());
        let mut edge_keys = HashMap::new();
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];

        for (i, ed) in def.edges.iter().enumerate() {
            let id = EdgeId::new(i as u32);
            if edge_keys.insert(ed.id.clone(), id).is_some() {
                return Err(SimError::config(format!("duplicate edge id '{}'", ed.id)));
            }
            let source = *node_keys.get(&ed.source).ok_or_else(|| {
                SimError::target(format!("edge '{}' starts at unknown node '{}'", ed.id, ed.source))
            })?;
            let target = *node_keys.get(&ed.target).ok_or_else(|| {
                SimError::target(format!("edge '{}' ends at unknown node '{}'", ed.id, ed.target))
            })?;
            if source == target {
                return Err(SimError::config(format!("edge '{}' is a self loop", ed.id)));
            }
            if !ed.cost_per_unit.is_finite() || ed.cost_per_unit < 0.0 {
                return Err(SimError::config(format!(
                    "edge '{}' has invalid cost per unit {}", ed.id, ed.cost_per_unit
                )));
            }

            outgoing[source.index()].push(id);
            incoming[target.index()].push(id);
            edges.push(Edge {
                id,
                key: ed.id.clone(),
                source,
                target,
                mode: ed.mode,
                capacity: ed.capacity,
                cost_per_unit: ed.cost_per_unit,
                lead_time: ed.lead_time,
                flow: 0,
                degradation: Degradation::default(),
            });
        }

        info!("Network '{}' built with {} nodes and {} edges", def.name, nodes.len(), edges.len());

        Ok(Self {
            name: def.name.clone(),
            nodes,
            edges,
            node_keys,
            edge_keys,
            outgoing,
            incoming,
            step: 0,
            in_transit: BTreeMap::new(),
            active: BTreeMap::new(),
            history: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    pub fn node_id(&self, key: &str) -> Option<NodeId> {
        self.node_keys.get(key).copied()
    }

    pub fn edge_id(&self, key: &str) -> Option<EdgeId> {
        self.edge_keys.get(key).copied()
    }

    pub fn outgoing(&self, id: NodeId) -> &[EdgeId] {
        self.outgoing.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: NodeId) -> &[EdgeId] {
        self.incoming.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == node_type)
            .map(|n| n.id)
            .collect()
    }

    pub fn active_disruptions(&self) -> impl Iterator<Item = &ActiveDisruption> {
        self.active.values()
    }

    pub fn history(&self) -> &[UtilizationSnapshot] {
        &self.history
    }

    pub fn in_transit(&self) -> Units {
        self.in_transit.values().flatten().map(|a| a.units).sum()
    }

    pub fn nominal_capacity(&self, element: ElementRef) -> Units {
        match element {
            ElementRef::Node(id) => self.node(id).map_or(0, |n| n.capacity),
            ElementRef::Edge(id) => self.edge(id).map_or(0, |e| e.capacity),
        }
    }

    pub fn effective_capacity(&self, element: ElementRef) -> Units {
        match element {
            ElementRef::Node(id) => self.node(id).map_or(0, Node::effective_capacity),
            ElementRef::Edge(id) => self.edge(id).map_or(0, Edge::effective_capacity),
        }
    }

    pub fn multiplier(&self, element: ElementRef) -> f64 {
        match element {
            ElementRef::Node(id) => self.node(id).map_or(1.0, Node::multiplier),
            ElementRef::Edge(id) => self.edge(id).map_or(1.0, Edge::multiplier),
        }
    }

    fn degradation_mut(&mut self, element: ElementRef) -> &mut Degradation {
        match element {
            ElementRef::Node(id) => &mut self.nodes[id.index()].degradation,
            ElementRef::Edge(id) => &mut self.edges[id.index()].degradation,
        }
    }

    fn degradation(&self, element: ElementRef) -> Option<&Degradation> {
        match element {
            ElementRef::Node(id) => self.node(id).map(|n| &n.degradation),
            ElementRef::Edge(id) => self.edge(id).map(|e| &e.degradation),
        }
    }

    /// Capacity the given disruption removes on its own, summed over its targets.
    pub fn capacity_removed_by(&self, disruption: &ActiveDisruption) -> Units {
        disruption
            .targets
            .iter()
            .filter_map(|&t| {
                let factor = self.degradation(t)?.factor_of(disruption.event.id)?;
                let nominal = self.nominal_capacity(t);
                Some(nominal.saturating_sub(degradation::scale(nominal, factor)))
            })
            .sum()
    }

    /// Elements a scope currently matches, sorted and deduplicated.
    pub fn resolve_scope(&self, scope: &TargetScope) -> Vec<ElementRef> {
        let mut found: Vec<ElementRef> = match scope {
            TargetScope::Elements { ids } => ids
                .iter()
                .filter_map(|key| {
                    let resolved = match key {
                        ElementKey::Node(k) => self.node_id(k).map(ElementRef::Node),
                        ElementKey::Edge(k) => self.edge_id(k).map(ElementRef::Edge),
                    };
                    if resolved.is_none() {
                        warn!("Disruption target {:?} does not exist in network '{}'", key, self.name);
                    }
                    resolved
                })
                .collect(),
            TargetScope::Selector { node_type, region } => self
                .nodes
                .iter()
                .filter(|n| node_type.is_none_or(|t| n.node_type() == t))
                .filter(|n| region.as_ref().is_none_or(|r| n.region.as_ref() == Some(r)))
                .map(|n| ElementRef::Node(n.id))
                .collect(),
            TargetScope::Mode { mode } => self
                .edges
                .iter()
                .filter(|e| e.mode == *mode)
                .map(|e| ElementRef::Edge(e.id))
                .collect(),
        };
        found.sort();
        found.dedup();
        found
    }

    /// Explicit keys in `scope` that name no node or edge.
    pub fn unknown_keys<'s>(&self, scope: &'s TargetScope) -> Vec<&'s ElementKey> {
        let TargetScope::Elements { ids } = scope else {
            return Vec::new();
        };
        ids.iter()
            .filter(|key| match key {
                ElementKey::Node(k) => self.node_id(k).is_none(),
                ElementKey::Edge(k) => self.edge_id(k).is_none(),
            })
            .collect()
    }

    /// Degrades every element the event targets until its window closes.
    pub fn apply_disruption(&mut self, event: &DisruptionEvent) -> Result<usize> {
        event.validate()?;
        let targets = self.resolve_scope(&event.target);
        if targets.is_empty() {
            return Err(SimError::target(format!(
                "disruption {} ({:?}) matches no element of network '{}'",
                event.id, event.disruption_type, self.name
            )));
        }

        let expires_at = event.expires_at();
        for &t in &targets {
            self.degradation_mut(t).push(event.id, event.magnitude, expires_at);
        }

        info!("Disruption {} {:?} (magnitude {:.2}) hits {} element(s) until step {}",
              event.id, event.disruption_type, event.magnitude, targets.len(), expires_at);

        let count = targets.len();
        self.active.insert(event.id, ActiveDisruption { event: event.clone(), targets });
        Ok(count)
    }

    /// Routes up to `amount` units from `source` to `sink`.
    ///
    /// Uses successive cheapest paths with residual capacity on every node and
    /// edge along the way. A stocking source (port, warehouse, hub) can only
    /// ship what it holds. Goods for a non-market sink land in its stock once
    /// the path lead time has elapsed.
    pub fn request_flow(
        &mut self,
        source: NodeId,
        sink: NodeId,
        amount: Units,
        cost_ceiling: Option<f64>,
    ) -> Result<FlowOutcome> {
        let (Some(src), Some(dst)) = (self.node(source), self.node(sink)) else {
            return Err(SimError::target(format!(
                "flow request {} -> {} references a node outside network '{}'",
                source, sink, self.name
            )));
        };
        if source == sink {
            return Err(SimError::InvalidRequest(format!("flow request from {} to itself", src.key)));
        }
        if cost_ceiling.is_some_and(f64::is_nan) {
            return Err(SimError::InvalidRequest("cost ceiling is NaN".to_string()));
        }

        let stocked_source = src.node_type().holds_stock();
        let consumed_at_sink = dst.node_type() == NodeType::Market;

        let mut outcome = FlowOutcome::unmet(amount);
        let mut remaining = if stocked_source { amount.min(src.stock) } else { amount };

        while remaining > 0 {
            let Some(path) = routing::cheapest_path(self, source, sink, cost_ceiling) else {
                break;
            };
            let units = self.bottleneck(&path).min(remaining);
            if units == 0 {
                break;
            }

            for &e in &path.edges {
                self.edges[e.index()].flow += units;
            }
            for &n in &path.nodes {
                self.nodes[n.index()].utilization += units;
            }

            if !consumed_at_sink {
                self.in_transit
                    .entry(self.step + path.lead_time)
                    .or_default()
                    .push(Arrival { node: sink, units });
            }

            outcome.routed += units;
            outcome.cost += units as f64 * path.unit_cost;
            outcome.lead_time_units += units * path.lead_time;
            outcome.paths.push(RoutedPath {
                units,
                unit_cost: path.unit_cost,
                lead_time: path.lead_time,
            });
            remaining -= units;
        }

        if stocked_source {
            self.nodes[source.index()].stock -= outcome.routed;
        }

        debug!("Flow {} -> {}: routed {}/{} over {} path(s)",
               self.nodes[source.index()].key, self.nodes[sink.index()].key,
               outcome.routed, amount, outcome.paths.len());

        Ok(outcome)
    }

    fn bottleneck(&self, path: &Path) -> Units {
        let edges = path.edges.iter().map(|&e| self.edges[e.index()].residual());
        let nodes = path.nodes.iter().map(|&n| self.nodes[n.index()].residual());
        edges.chain(nodes).min().unwrap_or(0)
    }

    /// Closes the current step.
    ///
    /// Snapshots utilization, clears per-step counters, moves to the next step,
    /// expires ended disruptions and delivers goods that have arrived. Returns
    /// the disruptions that expired.
    pub fn advance_step(&mut self) -> Vec<DisruptionId> {
        self.history.push(UtilizationSnapshot {
            step: self.step,
            node_utilization: self.nodes.iter().map(|n| n.utilization).collect(),
            edge_flow: self.edges.iter().map(|e| e.flow).collect(),
        });
        for n in &mut self.nodes {
            n.utilization = 0;
        }
        for e in &mut self.edges {
            e.flow = 0;
        }

        self.step += 1;
        let step = self.step;

        for n in &mut self.nodes {
            n.degradation.expire(step);
        }
        for e in &mut self.edges {
            e.degradation.expire(step);
        }

        let expired: Vec<DisruptionId> = self
            .active
            .iter()
            .filter(|(_, d)| d.event.expires_at() <= step)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(d) = self.active.remove(id) {
                info!("Disruption {} {:?} expired at step {}", id, d.event.disruption_type, step);
            }
        }

        let later = self.in_transit.split_off(&(step + 1));
        let arrived = std::mem::replace(&mut self.in_transit, later);
        for arrival in arrived.into_values().flatten() {
            self.nodes[arrival.node.index()].stock += arrival.units;
        }

        expired
    }

    /// Fails on the first node or edge carrying more than its effective capacity.
    pub fn check_capacity(&self) -> Result<()> {
        for n in &self.nodes {
            let capacity = n.effective_capacity();
            if n.utilization > capacity {
                return Err(SimError::CapacityViolation {
                    element: ElementRef::Node(n.id),
                    utilization: n.utilization,
                    capacity,
                });
            }
        }
        for e in &self.edges {
            let capacity = e.effective_capacity();
            if e.flow > capacity {
                return Err(SimError::CapacityViolation {
                    element: ElementRef::Edge(e.id),
                    utilization: e.flow,
                    capacity,
                });
            }
        }
        Ok(())
    }

    /// Whether any route exists from `from` to `to`, ignoring capacity.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if self.node(from).is_none() || self.node(to).is_none() || from == to {
            return false;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([from]);
        seen[from.index()] = true;

        while let Some(at) = queue.pop_front() {
            for &e in self.outgoing(at) {
                let next = self.edges[e.index()].target;
                if next == to {
                    return true;
                }
                if !seen[next.index()] && routing::can_transit(&self.nodes[next.index()]) {
                    seen[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }
}
