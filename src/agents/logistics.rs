use super::{Agent, AgentId, AgentRole, ShipmentOutcome, ShipmentRequest, StepContext};
use crate::network::{EdgeId, ElementRef, Network, NodeId, Units};
use tracing::debug;

/// Allocates inbound capacity of one port, warehouse or hub between exporters.
#[derive(Debug, Clone)]
pub struct LogisticsAgent {
    id: AgentId,
    node: NodeId,
    edges: Vec<EdgeId>,
    cost_ceiling: Option<f64>,
}

impl LogisticsAgent {
    pub fn new(id: AgentId, node: NodeId, edges: Vec<EdgeId>) -> Self {
        Self { id, node, edges, cost_ceiling: None }
    }

    pub fn with_cost_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.cost_ceiling = ceiling;
        self
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Capacity this agent can hand out right now.
    pub fn pool(&self, network: &Network) -> Units {
        let node = network.node(self.node).map_or(0, |n| n.residual());
        let edges: Units = self
            .edges
            .iter()
            .filter_map(|&e| network.edge(e))
            .map(|e| e.residual())
            .sum();
        node.min(edges)
    }
}

/// Splits `pool` across requests in proportion to what each asked for.
///
/// Nobody gets more than they asked for; share freed by a capped request goes
/// back around. Units left over after flooring go one each to the lowest
/// requester ids. `requests` must already be sorted by requester id.
pub fn allocate(pool: Units, requests: &[ShipmentRequest]) -> Vec<Units> {
    let total: Units = requests.iter().map(|r| r.amount).sum();
    if total <= pool {
        return requests.iter().map(|r| r.amount).collect();
    }

    let mut quotas = vec![0; requests.len()];
    let mut remaining = pool;
    let mut open: Vec<usize> = (0..requests.len()).filter(|&i| requests[i].amount > 0).collect();

    while remaining > 0 && !open.is_empty() {
        let weight: u128 = open.iter().map(|&i| requests[i].amount as u128).sum();
        let mut handed_out = 0;

        for &i in &open {
            let share = (remaining as u128 * requests[i].amount as u128 / weight) as Units;
            let share = share.min(requests[i].amount - quotas[i]);
            quotas[i] += share;
            handed_out += share;
        }
        remaining -= handed_out;
        open.retain(|&i| quotas[i] < requests[i].amount);

        if handed_out == 0 {
            // Only flooring remainders are left, fewer than there are open requests
            for &i in &open {
                if remaining == 0 {
                    break;
                }
                quotas[i] += 1;
                remaining -= 1;
            }
            break;
        }
    }

    quotas
}

impl Agent for LogisticsAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn role(&self) -> AgentRole {
        AgentRole::Logistics
    }

    fn elements(&self) -> Vec<ElementRef> {
        std::iter::once(ElementRef::Node(self.node))
            .chain(self.edges.iter().copied().map(ElementRef::Edge))
            .collect()
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) {
        let mut requests = ctx.requests.take_queue(self.node);
        if requests.is_empty() {
            return;
        }
        requests.sort_by_key(|r| r.requester);

        let pool = self.pool(ctx.network);
        let quotas = allocate(pool, &requests);
        debug!("{} step {}: pool {} over {} request(s), quotas {:?}",
               self.id, ctx.step, pool, requests.len(), quotas);

        for (request, quota) in requests.iter().zip(quotas) {
            let routed = if quota == 0 {
                0
            } else {
                ctx.flow(self.id, request.origin, self.node, quota, self.cost_ceiling).routed
            };
            ctx.requests.resolve(ShipmentOutcome {
                requester: request.requester,
                destination: self.node,
                requested: request.amount,
                routed,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{RequestBook, StepReport};
    use crate::disruption::DisruptionSchedule;
    use crate::network::{NetworkDefinition, NodeType};
    use crate::simulation::rng::agent_stream;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn request(requester: u32, amount: Units) -> ShipmentRequest {
        ShipmentRequest {
            requester: AgentId::new(requester),
            origin: NodeId::new(0),
            destination: NodeId::new(1),
            amount,
        }
    }

    #[test]
    fn equal_backlogs_give_the_remainder_to_the_lower_id() {
        let quotas = allocate(101, &[request(1, 100), request(2, 100)]);
        assert_eq!(quotas, vec![51, 50]);
    }

    #[test]
    fn larger_backlog_gets_more() {
        let quotas = allocate(100, &[request(1, 50), request(2, 150)]);
        assert_eq!(quotas, vec![25, 75]);
    }

    #[test]
    fn uneven_split_rounds_toward_the_lower_id() {
        // 5.71 and 114.29 floor to 5 and 114, the spare unit goes to id 1
        let quotas = allocate(120, &[request(1, 10), request(2, 200)]);
        assert_eq!(quotas, vec![6, 114]);
    }

    #[test]
    fn everyone_served_when_pool_suffices() {
        assert_eq!(allocate(500, &[request(1, 10), request(2, 20)]), vec![10, 20]);
        assert_eq!(allocate(0, &[request(1, 10)]), vec![0]);
    }

    proptest! {
        #[test]
        fn allocation_uses_the_pool_without_exceeding_requests(
            pool in 0u64..10_000,
            amounts in prop::collection::vec(0u64..5_000, 1..8),
        ) {
            let requests: Vec<_> = amounts.iter().enumerate().map(|(i, &a)| request(i as u32, a)).collect();
            let quotas = allocate(pool, &requests);
            let total: u64 = amounts.iter().sum();

            prop_assert_eq!(quotas.iter().sum::<u64>(), pool.min(total));
            for (q, a) in quotas.iter().zip(&amounts) {
                prop_assert!(q <= a);
            }
        }
    }

    #[test]
    fn routes_contested_edge_at_full_capacity() {
        let def = NetworkDefinition::new("contested")
            .factory("F1", 200, 100)
            .factory("F2", 200, 100)
            .node("H", NodeType::TransportHub, 1000)
            .node("P", NodeType::Port, 1000)
            .link("F1-H", "F1", "H", 200, 1.0, 1)
            .link("F2-H", "F2", "H", 200, 1.0, 1)
            .link("H-P", "H", "P", 101, 1.0, 1);
        let mut net = Network::from_definition(&def).unwrap();
        let (f1, f2, p) = (net.node_id("F1").unwrap(), net.node_id("F2").unwrap(), net.node_id("P").unwrap());
        let hp = net.edge_id("H-P").unwrap();

        let mut agent = LogisticsAgent::new(AgentId::new(2), p, vec![hp]);
        let mut book = RequestBook::new(BTreeSet::from([p]));
        book.submit(ShipmentRequest { requester: AgentId::new(1), origin: f2, destination: p, amount: 100 });
        book.submit(ShipmentRequest { requester: AgentId::new(0), origin: f1, destination: p, amount: 100 });

        let mut schedule = DisruptionSchedule::new();
        let mut report = StepReport::default();
        let mut ctx = StepContext {
            step: 0,
            network: &mut net,
            schedule: &mut schedule,
            requests: &mut book,
            report: &mut report,
            rng: agent_stream(1, agent.id(), 0),
        };
        agent.step(&mut ctx);

        let outcomes = book.drain();
        let routed: Vec<(u32, Units)> = outcomes.iter().map(|o| (o.requester.get(), o.routed)).collect();
        assert_eq!(routed, vec![(0, 51), (1, 50)]);
        assert_eq!(report.routed_units, 101);
        net.check_capacity().unwrap();
    }
}
