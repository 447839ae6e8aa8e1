use super::{Agent, AgentId, AgentRole, StepContext, StepReport};
use crate::network::{ElementRef, NodeId, Units};
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DemandModel {
    #[default]
    Constant,
    /// Poisson draw around the node's demand rate.
    Poisson,
}

/// Consumes goods at one market node.
#[derive(Debug, Clone)]
pub struct MarketAgent {
    id: AgentId,
    market: NodeId,
    demand_rate: Units,
    supplies: Vec<NodeId>,
    demand_model: DemandModel,
    max_backlog: Units,
    backlog: Units,
    fresh: Units,
    wanted: Units,
    delivered: Units,
}

impl MarketAgent {
    pub fn new(id: AgentId, market: NodeId, demand_rate: Units, supplies: Vec<NodeId>) -> Self {
        Self {
            id,
            market,
            demand_rate,
            supplies,
            demand_model: DemandModel::Constant,
            max_backlog: Units::MAX,
            backlog: 0,
            fresh: 0,
            wanted: 0,
            delivered: 0,
        }
    }

    pub fn with_demand_model(mut self, model: DemandModel) -> Self {
        self.demand_model = model;
        self
    }

    pub fn with_max_backlog(mut self, max_backlog: Units) -> Self {
        self.max_backlog = max_backlog;
        self
    }

    pub fn backlog(&self) -> Units {
        self.backlog
    }

    fn draw_demand(&self, ctx: &mut StepContext<'_>) -> Units {
        match self.demand_model {
            DemandModel::Constant => self.demand_rate,
            DemandModel::Poisson if self.demand_rate == 0 => 0,
            DemandModel::Poisson => match Poisson::new(self.demand_rate as f64) {
                Ok(poisson) => {
                    let draw: f64 = poisson.sample(&mut ctx.rng);
                    draw as Units
                }
                Err(_) => self.demand_rate,
            },
        }
    }
}

impl Agent for MarketAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn role(&self) -> AgentRole {
        AgentRole::Market
    }

    fn elements(&self) -> Vec<ElementRef> {
        std::iter::once(self.market)
            .chain(self.supplies.iter().copied())
            .map(ElementRef::Node)
            .collect()
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) {
        self.fresh = self.draw_demand(ctx);
        self.wanted = self.backlog + self.fresh;
        self.delivered = 0;

        for &supply in &self.supplies {
            let remaining = self.wanted - self.delivered;
            if remaining == 0 {
                break;
            }
            // Nothing in stock means nothing to draw, skip without an error
            if ctx.network.node(supply).is_some_and(|n| n.stock() == 0) {
                continue;
            }
            self.delivered += ctx.flow(self.id, supply, self.market, remaining, None).routed;
        }

        debug!("{} step {}: demand {} (+{} backlog), delivered {}",
               self.id, ctx.step, self.fresh, self.backlog, self.delivered);
    }

    fn settle(&mut self, report: &mut StepReport) {
        let unmet = self.fresh.saturating_sub(self.delivered);
        self.backlog = (self.wanted - self.delivered).min(self.max_backlog);

        report.market_deliveries += self.delivered;
        report.unmet_demand += unmet;
        report.backlog += self.backlog;

        self.fresh = 0;
        self.wanted = 0;
        self.delivered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RequestBook;
    use crate::disruption::DisruptionSchedule;
    use crate::network::{Network, NetworkDefinition, NodeType};
    use crate::simulation::rng::agent_stream;

    fn stocked(inventory: Units) -> Network {
        let mut def = NetworkDefinition::new("market")
            .node("W", NodeType::Warehouse, 500)
            .market("M", 500, 80)
            .link("W-M", "W", "M", 500, 2.0, 1);
        def.nodes[0].initial_inventory = inventory;
        Network::from_definition(&def).unwrap()
    }

    fn step_once(agent: &mut MarketAgent, net: &mut Network, seed: u64) -> StepReport {
        let mut schedule = DisruptionSchedule::new();
        let mut book = RequestBook::default();
        let mut report = StepReport::default();
        let step = net.step();
        let mut ctx = StepContext {
            step,
            network: net,
            schedule: &mut schedule,
            requests: &mut book,
            report: &mut report,
            rng: agent_stream(seed, agent.id(), step),
        };
        agent.step(&mut ctx);
        agent.settle(&mut report);
        net.advance_step();
        report
    }

    #[test]
    fn short_supply_is_unmet_and_carried() {
        let mut net = stocked(50);
        let (w, m) = (net.node_id("W").unwrap(), net.node_id("M").unwrap());
        let mut agent = MarketAgent::new(AgentId::new(0), m, 80, vec![w]).with_max_backlog(100);

        let report = step_once(&mut agent, &mut net, 1);
        assert_eq!(report.market_deliveries, 50);
        assert_eq!(report.unmet_demand, 30);
        assert_eq!(agent.backlog(), 30);

        // Empty warehouse: nothing delivered, backlog capped
        let report = step_once(&mut agent, &mut net, 1);
        assert_eq!(report.market_deliveries, 0);
        assert_eq!(report.unmet_demand, 80);
        assert_eq!(agent.backlog(), 100);
        assert_eq!(report.anomalies, 0);
    }

    #[test]
    fn poisson_demand_is_reproducible() {
        let draws = |seed| {
            let mut net = stocked(10_000);
            let (w, m) = (net.node_id("W").unwrap(), net.node_id("M").unwrap());
            let mut agent = MarketAgent::new(AgentId::new(4), m, 80, vec![w])
                .with_demand_model(DemandModel::Poisson);
            (0..5).map(|_| step_once(&mut agent, &mut net, seed).market_deliveries).collect::<Vec<_>>()
        };
        assert_eq!(draws(11), draws(11));
        assert!(draws(11).iter().all(|&d| d > 0));
    }
}
