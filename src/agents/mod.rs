pub mod disruption;
pub mod export_sector;
pub mod logistics;
pub mod market;

pub use disruption::{DisruptionAgent, DisruptionPolicy, MagnitudeModel};
pub use export_sector::ExportSectorAgent;
pub use logistics::LogisticsAgent;
pub use market::{DemandModel, MarketAgent};

use crate::disruption::DisruptionSchedule;
use crate::error::{Result, SimError};
use crate::network::{ElementRef, FlowOutcome, Network, NodeId, NodeType, Units};
use crate::simulation::config::AgentConfig;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent #{}", self.0)
    }
}

/// Declaration order is activation order within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Disruption,
    ExportSector,
    Logistics,
    Market,
}

/// A shipment an exporter hands to the logistics agent managing `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentRequest {
    pub requester: AgentId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub amount: Units,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShipmentOutcome {
    pub requester: AgentId,
    pub destination: NodeId,
    pub requested: Units,
    pub routed: Units,
}

/// Per-step exchange between exporters and logistics agents.
#[derive(Debug, Default)]
pub struct RequestBook {
    managed: BTreeSet<NodeId>,
    queued: BTreeMap<NodeId, Vec<ShipmentRequest>>,
    outcomes: Vec<ShipmentOutcome>,
}

impl RequestBook {
    pub fn new(managed: BTreeSet<NodeId>) -> Self {
        Self { managed, ..Self::default() }
    }

    pub fn is_managed(&self, node: NodeId) -> bool {
        self.managed.contains(&node)
    }

    pub fn submit(&mut self, request: ShipmentRequest) {
        self.queued.entry(request.destination).or_default().push(request);
    }

    pub fn take_queue(&mut self, destination: NodeId) -> Vec<ShipmentRequest> {
        self.queued.remove(&destination).unwrap_or_default()
    }

    pub fn resolve(&mut self, outcome: ShipmentOutcome) {
        self.outcomes.push(outcome);
    }

    /// Resolved outcomes, plus a zero outcome for anything nobody picked up.
    pub fn drain(&mut self) -> Vec<ShipmentOutcome> {
        let leftovers = std::mem::take(&mut self.queued);
        let mut outcomes = std::mem::take(&mut self.outcomes);
        outcomes.extend(leftovers.into_values().flatten().map(|r| ShipmentOutcome {
            requester: r.requester,
            destination: r.destination,
            requested: r.amount,
            routed: 0,
        }));
        outcomes
    }
}

/// Counters agents add to during a step; the engine turns it into a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub export_volume: Units,
    pub market_deliveries: Units,
    pub unmet_demand: Units,
    pub backlog: Units,
    pub transport_cost: f64,
    pub routed_units: Units,
    pub lead_time_units: u64,
    pub anomalies: u32,
    pub disruptions_emitted: u32,
}

impl StepReport {
    pub fn record_flow(&mut self, outcome: &FlowOutcome) {
        self.transport_cost += outcome.cost;
        self.routed_units += outcome.routed;
        self.lead_time_units += outcome.lead_time_units;
    }

    pub fn anomaly(&mut self, agent: AgentId, error: &SimError) {
        warn!("{}: {}", agent, error);
        self.anomalies += 1;
    }

    pub fn avg_lead_time(&self) -> f64 {
        if self.routed_units == 0 {
            0.0
        } else {
            self.lead_time_units as f64 / self.routed_units as f64
        }
    }
}

/// Everything an agent may touch while it is active.
pub struct StepContext<'a> {
    pub step: u64,
    pub network: &'a mut Network,
    pub schedule: &'a mut DisruptionSchedule,
    pub requests: &'a mut RequestBook,
    pub report: &'a mut StepReport,
    pub rng: ChaCha8Rng,
}

impl StepContext<'_> {
    /// Routes a flow, turning boundary errors into anomalies with nothing routed.
    pub fn flow(&mut self, agent: AgentId, source: NodeId, sink: NodeId, amount: Units, cost_ceiling: Option<f64>) -> FlowOutcome {
        match self.network.request_flow(source, sink, amount, cost_ceiling) {
            Ok(outcome) => {
                self.report.record_flow(&outcome);
                outcome
            }
            Err(e) => {
                self.report.anomaly(agent, &e);
                FlowOutcome::unmet(amount)
            }
        }
    }
}

pub trait Agent {
    fn id(&self) -> AgentId;
    fn role(&self) -> AgentRole;
    /// Network elements this agent acts on.
    fn elements(&self) -> Vec<ElementRef>;
    fn step(&mut self, ctx: &mut StepContext<'_>);
    fn reconcile(&mut self, _outcome: &ShipmentOutcome) {}
    /// Closes the step once every outcome has come back.
    fn settle(&mut self, _report: &mut StepReport) {}
}

#[derive(Debug, Clone)]
pub enum SimAgent {
    Disruption(DisruptionAgent),
    ExportSector(ExportSectorAgent),
    Logistics(LogisticsAgent),
    Market(MarketAgent),
}

macro_rules! dispatch {
    ($self:ident, $agent:ident => $body:expr) => {
        match $self {
            SimAgent::Disruption($agent) => $body,
            SimAgent::ExportSector($agent) => $body,
            SimAgent::Logistics($agent) => $body,
            SimAgent::Market($agent) => $body,
        }
    };
}

impl Agent for SimAgent {
    fn id(&self) -> AgentId {
        dispatch!(self, a => a.id())
    }

    fn role(&self) -> AgentRole {
        dispatch!(self, a => a.role())
    }

    fn elements(&self) -> Vec<ElementRef> {
        dispatch!(self, a => a.elements())
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) {
        dispatch!(self, a => a.step(ctx))
    }

    fn reconcile(&mut self, outcome: &ShipmentOutcome) {
        dispatch!(self, a => a.reconcile(outcome))
    }

    fn settle(&mut self, report: &mut StepReport) {
        dispatch!(self, a => a.settle(report))
    }
}

/// All agents of a run, indexed by `AgentId`.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<SimAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the agent set for a network.
    ///
    /// Ids are handed out role by role in activation order, so iterating by id
    /// is already the activation order. Counts larger than the number of
    /// matching nodes are capped.
    pub fn from_config(config: &AgentConfig, network: &Network) -> Result<Self> {
        let mut registry = Self::new();

        for i in 0..config.num_disruption_agents {
            let policy = config.disruption_policy(i)?;
            registry.register(|id| DisruptionAgent::new(id, policy).into());
        }

        let factories = network.nodes_of_type(NodeType::Factory);
        for &factory in take_capped(&factories, config.num_export_sector_agents, "export sector") {
            let destinations = [NodeType::Port, NodeType::Warehouse]
                .into_iter()
                .flat_map(|t| network.nodes_of_type(t))
                .filter(|&d| network.reaches(factory, d))
                .collect();
            let rate = network.node(factory).map_or(0, |n| n.production_rate());
            registry.register(|id| {
                ExportSectorAgent::new(id, factory, rate, destinations)
                    .with_max_backlog(rate.saturating_mul(config.max_backlog_steps))
                    .with_cost_ceiling(config.cost_ceiling)
                    .into()
            });
        }

        // Exporters only queue at ports and warehouses, so those are staffed before hubs
        let hubs: Vec<NodeId> = [NodeType::Port, NodeType::Warehouse, NodeType::TransportHub]
            .into_iter()
            .flat_map(|t| network.nodes_of_type(t))
            .collect();
        for &node in take_capped(&hubs, config.num_logistics_agents, "logistics") {
            let edges = network.incoming(node).to_vec();
            registry.register(|id| {
                LogisticsAgent::new(id, node, edges)
                    .with_cost_ceiling(config.cost_ceiling)
                    .into()
            });
        }

        let markets = network.nodes_of_type(NodeType::Market);
        for &market in take_capped(&markets, config.num_market_agents, "market") {
            let mut supplies: Vec<NodeId> = [NodeType::Port, NodeType::Warehouse]
                .into_iter()
                .flat_map(|t| network.nodes_of_type(t))
                .filter(|&s| network.reaches(s, market))
                .collect();
            supplies.sort();
            let rate = network.node(market).map_or(0, |n| n.demand_rate());
            registry.register(|id| {
                MarketAgent::new(id, market, rate, supplies)
                    .with_demand_model(config.market_demand)
                    .with_max_backlog(rate.saturating_mul(config.max_backlog_steps))
                    .into()
            });
        }

        info!("Registered {} agents ({} disruption, {} export, {} logistics, {} market)",
              registry.len(),
              registry.count(AgentRole::Disruption),
              registry.count(AgentRole::ExportSector),
              registry.count(AgentRole::Logistics),
              registry.count(AgentRole::Market));

        Ok(registry)
    }

    /// Adds an agent built for the next free id.
    pub fn register<F>(&mut self, build: F) -> AgentId
    where
        F: FnOnce(AgentId) -> SimAgent,
    {
        let id = AgentId::new(self.agents.len() as u32);
        self.agents.push(build(id));
        id
    }

    pub fn get(&self, id: AgentId) -> Option<&SimAgent> {
        self.agents.get(id.get() as usize)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut SimAgent> {
        self.agents.get_mut(id.get() as usize)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimAgent> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SimAgent> {
        self.agents.iter_mut()
    }

    pub fn count(&self, role: AgentRole) -> usize {
        self.agents.iter().filter(|a| a.role() == role).count()
    }

    /// Ids sorted by (role, id).
    pub fn activation_order(&self) -> Vec<AgentId> {
        let mut order: Vec<(AgentRole, AgentId)> = self.agents.iter().map(|a| (a.role(), a.id())).collect();
        order.sort();
        order.into_iter().map(|(_, id)| id).collect()
    }

    /// Nodes whose inbound shipments go through a logistics agent.
    pub fn managed_nodes(&self) -> BTreeSet<NodeId> {
        self.agents
            .iter()
            .filter_map(|a| match a {
                SimAgent::Logistics(l) => Some(l.node()),
                _ => None,
            })
            .collect()
    }
}

fn take_capped<'a>(nodes: &'a [NodeId], requested: usize, role: &str) -> &'a [NodeId] {
    if requested > nodes.len() {
        warn!("Requested {} {} agents but the network only has {} candidate nodes", requested, role, nodes.len());
    }
    &nodes[..requested.min(nodes.len())]
}

impl From<DisruptionAgent> for SimAgent {
    fn from(agent: DisruptionAgent) -> Self {
        Self::Disruption(agent)
    }
}

impl From<ExportSectorAgent> for SimAgent {
    fn from(agent: ExportSectorAgent) -> Self {
        Self::ExportSector(agent)
    }
}

impl From<LogisticsAgent> for SimAgent {
    fn from(agent: LogisticsAgent) -> Self {
        Self::Logistics(agent)
    }
}

impl From<MarketAgent> for SimAgent {
    fn from(agent: MarketAgent) -> Self {
        Self::Market(agent)
    }
}
