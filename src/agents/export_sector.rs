use super::{Agent, AgentId, AgentRole, ShipmentOutcome, ShipmentRequest, StepContext, StepReport};
use crate::network::{ElementRef, NodeId, Units};
use tracing::debug;

/// Produces at one factory and ships toward ports and warehouses.
#[derive(Debug, Clone)]
pub struct ExportSectorAgent {
    id: AgentId,
    factory: NodeId,
    production_rate: Units,
    // Ports first, then warehouses, each in id order
    destinations: Vec<NodeId>,
    cost_ceiling: Option<f64>,
    max_backlog: Units,
    backlog: Units,
    // Per-step state, cleared in settle
    produced: Units,
    available: Units,
    shipped: Units,
}

impl ExportSectorAgent {
    pub fn new(id: AgentId, factory: NodeId, production_rate: Units, destinations: Vec<NodeId>) -> Self {
        Self {
            id,
            factory,
            production_rate,
            destinations,
            cost_ceiling: None,
            max_backlog: Units::MAX,
            backlog: 0,
            produced: 0,
            available: 0,
            shipped: 0,
        }
    }

    pub fn with_cost_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.cost_ceiling = ceiling;
        self
    }

    pub fn with_max_backlog(mut self, max_backlog: Units) -> Self {
        self.max_backlog = max_backlog;
        self
    }

    pub fn factory(&self) -> NodeId {
        self.factory
    }

    pub fn backlog(&self) -> Units {
        self.backlog
    }
}

impl Agent for ExportSectorAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn role(&self) -> AgentRole {
        AgentRole::ExportSector
    }

    fn elements(&self) -> Vec<ElementRef> {
        std::iter::once(self.factory)
            .chain(self.destinations.iter().copied())
            .map(ElementRef::Node)
            .collect()
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) {
        let capacity = ctx.network.node(self.factory).map_or(0, |n| n.effective_capacity());
        self.produced = self.production_rate.min(capacity);
        self.available = self.backlog + self.produced;
        self.shipped = 0;

        let mut remaining = self.available;
        for &destination in &self.destinations {
            if remaining == 0 {
                break;
            }
            if ctx.requests.is_managed(destination) {
                ctx.requests.submit(ShipmentRequest {
                    requester: self.id,
                    origin: self.factory,
                    destination,
                    amount: remaining,
                });
                break;
            }
            let outcome = ctx.flow(self.id, self.factory, destination, remaining, self.cost_ceiling);
            self.shipped += outcome.routed;
            remaining -= outcome.routed;
        }

        debug!("{} step {}: produced {}, {} available, {} shipped directly",
               self.id, ctx.step, self.produced, self.available, self.shipped);
    }

    fn reconcile(&mut self, outcome: &ShipmentOutcome) {
        self.shipped += outcome.routed;
    }

    fn settle(&mut self, report: &mut StepReport) {
        let shipped = self.shipped.min(self.available);
        // Fresh production ships first, so carried backlog is never counted as unmet twice
        let unmet = self.produced.saturating_sub(shipped);
        self.backlog = (self.available - shipped).min(self.max_backlog);

        report.export_volume += shipped;
        report.unmet_demand += unmet;
        report.backlog += self.backlog;

        self.produced = 0;
        self.available = 0;
        self.shipped = 0;
    }
}
