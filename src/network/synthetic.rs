// Seeded random networks for experiments without real data

use super::{EdgeDefinition, NetworkDefinition, NodeDefinition, NodeType, TransportMode, Units};
use crate::error::{Result, SimError};
use crate::simulation::rng::run_stream;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const REGIONS: [&str; 8] = [
    "Dhaka", "Chittagong", "Khulna", "Rajshahi", "Sylhet", "Barisal", "Rangpur", "Mymensingh",
];

const MODES: [TransportMode; 4] = [TransportMode::Road, TransportMode::Rail, TransportMode::Sea, TransportMode::Air];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticParams {
    pub num_factories: usize,
    pub num_ports: usize,
    pub num_warehouses: usize,
    pub num_markets: usize,
    pub num_transport_hubs: usize,
    pub connection_probability: f64,
    pub factory_capacity: (Units, Units),
    pub port_capacity: (Units, Units),
    pub warehouse_capacity: (Units, Units),
    pub hub_capacity: (Units, Units),
    pub market_demand: (Units, Units),
    pub warehouse_inventory: (Units, Units),
    pub edge_capacity: (Units, Units),
    pub cost_per_unit: (f64, f64),
    pub lead_time: (u32, u32),
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            num_factories: 5,
            num_ports: 2,
            num_warehouses: 3,
            num_markets: 4,
            num_transport_hubs: 2,
            connection_probability: 0.3,
            factory_capacity: (100, 1000),
            port_capacity: (500, 3000),
            warehouse_capacity: (300, 1500),
            hub_capacity: (200, 1200),
            market_demand: (50, 500),
            warehouse_inventory: (100, 500),
            edge_capacity: (50, 500),
            cost_per_unit: (1.0, 10.0),
            lead_time: (1, 2),
        }
    }
}

impl SyntheticParams {
    pub fn with_counts(mut self, factories: usize, ports: usize, warehouses: usize, markets: usize, hubs: usize) -> Self {
        self.num_factories = factories;
        self.num_ports = ports;
        self.num_warehouses = warehouses;
        self.num_markets = markets;
        self.num_transport_hubs = hubs;
        self
    }

    pub fn with_connection_probability(mut self, p: f64) -> Self {
        self.connection_probability = p;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.connection_probability) {
            return Err(SimError::config(format!(
                "connection_probability must be within [0, 1], got {}",
                self.connection_probability
            )));
        }
        let ranges = [
            ("factory_capacity", self.factory_capacity),
            ("port_capacity", self.port_capacity),
            ("warehouse_capacity", self.warehouse_capacity),
            ("hub_capacity", self.hub_capacity),
            ("market_demand", self.market_demand),
            ("warehouse_inventory", self.warehouse_inventory),
            ("edge_capacity", self.edge_capacity),
        ];
        for (name, (lo, hi)) in ranges {
            if lo > hi {
                return Err(SimError::config(format!("{} range is inverted: {} > {}", name, lo, hi)));
            }
        }
        let (lo, hi) = self.cost_per_unit;
        if !(lo.is_finite() && hi.is_finite() && lo >= 0.0 && lo <= hi) {
            return Err(SimError::config(format!("cost_per_unit range ({}, {}) is invalid", lo, hi)));
        }
        if self.lead_time.0 > self.lead_time.1 {
            return Err(SimError::config("lead_time range is inverted"));
        }
        Ok(())
    }

    fn total_nodes(&self) -> usize {
        self.num_factories + self.num_ports + self.num_warehouses + self.num_markets + self.num_transport_hubs
    }
}

// Which node types a link may run to, by source type
fn plausible_targets(source: NodeType) -> &'static [NodeType] {
    match source {
        NodeType::Factory => &[NodeType::Port, NodeType::Warehouse, NodeType::TransportHub],
        NodeType::Port => &[NodeType::Warehouse, NodeType::TransportHub, NodeType::Market],
        NodeType::Warehouse => &[NodeType::TransportHub, NodeType::Market, NodeType::Factory],
        NodeType::TransportHub => &[NodeType::Port, NodeType::Warehouse, NodeType::Market, NodeType::Factory],
        NodeType::Market => &[],
    }
}

fn draw<R: Rng>(rng: &mut R, (lo, hi): (Units, Units)) -> Units {
    rng.gen_range(lo..=hi)
}

/// Builds a random network definition. The same params and seed always give
/// the same definition.
pub fn generate(params: &SyntheticParams, seed: u64) -> Result<NetworkDefinition> {
    params.validate()?;
    let mut rng = run_stream(seed, "network");
    let mut def = NetworkDefinition::new(format!("synthetic_{}", seed));

    info!("Generating synthetic network: {} factories, {} ports, {} warehouses, {} markets, {} hubs",
          params.num_factories, params.num_ports, params.num_warehouses,
          params.num_markets, params.num_transport_hubs);

    let counts = [
        (NodeType::Factory, params.num_factories),
        (NodeType::Port, params.num_ports),
        (NodeType::Warehouse, params.num_warehouses),
        (NodeType::Market, params.num_markets),
        (NodeType::TransportHub, params.num_transport_hubs),
    ];

    for (node_type, count) in counts {
        for i in 1..=count {
            let mut node = NodeDefinition::plain(&format!("{}_{}", node_type, i), node_type, 0);
            node.region = REGIONS.choose(&mut rng).map(|r| r.to_string());
            match node_type {
                NodeType::Factory => {
                    node.capacity = draw(&mut rng, params.factory_capacity);
                    node.production_rate = Some(node.capacity);
                }
                NodeType::Port => node.capacity = draw(&mut rng, params.port_capacity),
                NodeType::Warehouse => {
                    node.capacity = draw(&mut rng, params.warehouse_capacity);
                    node.initial_inventory = draw(&mut rng, params.warehouse_inventory);
                }
                NodeType::TransportHub => node.capacity = draw(&mut rng, params.hub_capacity),
                NodeType::Market => {
                    let demand = draw(&mut rng, params.market_demand);
                    node.demand_rate = Some(demand);
                    node.capacity = demand.saturating_mul(2);
                }
            }
            def.nodes.push(node);
        }
    }

    if params.total_nodes() < 2 {
        warn!("Not enough nodes to generate edges");
        return Ok(def);
    }

    let mut edges = Vec::new();
    for source in &def.nodes {
        let targets = plausible_targets(source.node_type);
        for target in &def.nodes {
            if source.id == target.id || !targets.contains(&target.node_type) {
                continue;
            }
            if !rng.gen_bool(params.connection_probability) {
                continue;
            }
            let (lo, hi) = params.cost_per_unit;
            let cost = rng.gen_range(lo..=hi);
            edges.push(EdgeDefinition {
                id: format!("{}->{}", source.id, target.id),
                source: source.id.clone(),
                target: target.id.clone(),
                capacity: draw(&mut rng, params.edge_capacity),
                cost_per_unit: (cost * 100.0).round() / 100.0,
                lead_time: rng.gen_range(params.lead_time.0..=params.lead_time.1),
                mode: MODES.choose(&mut rng).copied().unwrap_or_default(),
            });
        }
    }
    def.edges = edges;

    info!("Generated {} nodes and {} edges (connection probability {})",
          def.nodes.len(), def.edges.len(), params.connection_probability);
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;

    #[test]
    fn same_seed_same_network() {
        let params = SyntheticParams::default();
        assert_eq!(generate(&params, 7).unwrap(), generate(&params, 7).unwrap());
        assert_ne!(generate(&params, 7).unwrap(), generate(&params, 8).unwrap());
    }

    #[test]
    fn full_connectivity_follows_plausible_types() {
        let params = SyntheticParams::default()
            .with_counts(2, 1, 1, 1, 1)
            .with_connection_probability(1.0);
        let def = generate(&params, 1).unwrap();
        assert_eq!(def.nodes.len(), 6);
        assert_eq!(def.nodes[0].id, "Factory_1");

        // F→P,W,H (2×3) + P→W,M,H (3) + W→H,M,F (1+1+2) + H→P,W,M,F (1+1+1+2)
        assert_eq!(def.edges.len(), 6 + 3 + 4 + 5);
        assert!(def.edges.iter().all(|e| !e.source.starts_with("Market")));

        let net = Network::from_definition(&def).unwrap();
        assert_eq!(net.edges().len(), def.edges.len());
    }

    #[test]
    fn bad_probability_is_rejected() {
        let params = SyntheticParams::default().with_connection_probability(1.5);
        assert!(matches!(generate(&params, 1), Err(SimError::Configuration(_))));
    }
}
