//! Invariants that must hold for any network and any sequence of requests.

use proptest::prelude::*;
use tradeflow::disruption::{DisruptionEvent, DisruptionType, TargetScope};
use tradeflow::network::{NetworkDefinition, NodeDefinition, NodeId};
use tradeflow::network::synthetic::SyntheticParams;
use tradeflow::prelude::*;
use tradeflow::simulation::NetworkSource;

const TYPES: [NodeType; 5] = [
    NodeType::Factory,
    NodeType::Port,
    NodeType::Warehouse,
    NodeType::TransportHub,
    NodeType::Market,
];

#[derive(Debug, Clone)]
struct Request {
    source: usize,
    sink: usize,
    amount: Units,
    ceiling: Option<f64>,
}

fn network_strategy() -> impl Strategy<Value = NetworkDefinition> {
    let nodes = prop::collection::vec((0..TYPES.len(), 0u64..300, 0u64..200), 2..8);
    nodes.prop_flat_map(|nodes| {
        let n = nodes.len();
        let edges = prop::collection::vec((0..n, 0..n, 0u64..300, 0.0f64..10.0, 0u32..3), 0..20);
        (Just(nodes), edges)
    })
    .prop_map(|(nodes, edges)| {
        let mut def = NetworkDefinition::new("random");
        for (i, (t, capacity, inventory)) in nodes.into_iter().enumerate() {
            let mut node = NodeDefinition::plain(&format!("N{}", i), TYPES[t], capacity);
            if TYPES[t].holds_stock() {
                node.initial_inventory = inventory;
            }
            def.nodes.push(node);
        }
        for (i, (s, t, capacity, cost, lead)) in edges.into_iter().enumerate() {
            if s != t {
                def = def.link(&format!("E{}", i), &format!("N{}", s), &format!("N{}", t), capacity, cost, lead);
            }
        }
        def
    })
}

fn requests_strategy() -> impl Strategy<Value = Vec<Request>> {
    prop::collection::vec(
        (0usize..8, 0usize..8, 0u64..500, prop::option::of(0.0f64..20.0)),
        1..25,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(source, sink, amount, ceiling)| Request { source, sink, amount, ceiling })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn flows_never_exceed_capacity_or_request(
        def in network_strategy(),
        requests in requests_strategy(),
        magnitude in 0.0f64..=1.0,
    ) {
        let mut net = Network::from_definition(&def).unwrap();
        let n = net.nodes().len();

        let event = DisruptionEvent::new(DisruptionType::Other, magnitude, 2, TargetScope::node("N0"), 0);
        net.apply_disruption(&event).unwrap();

        for (round, chunk) in requests.chunks(5).enumerate() {
            for r in chunk {
                let (source, sink) = (NodeId::new((r.source % n) as u32), NodeId::new((r.sink % n) as u32));
                let stock_before = net.node(source).unwrap().stock();
                match net.request_flow(source, sink, r.amount, r.ceiling) {
                    Ok(out) => {
                        prop_assert!(out.routed <= r.amount);
                        prop_assert_eq!(out.paths.iter().map(|p| p.units).sum::<Units>(), out.routed);
                        if let Some(c) = r.ceiling {
                            prop_assert!(out.paths.iter().all(|p| p.unit_cost <= c + 1e-9));
                        }
                        if net.node(source).unwrap().node_type().holds_stock() {
                            prop_assert!(out.routed <= stock_before);
                        }
                    }
                    Err(e) => prop_assert!(e.is_recoverable()),
                }
                prop_assert!(net.check_capacity().is_ok());
            }
            net.advance_step();
            prop_assert_eq!(net.step(), round as u64 + 1);
        }

        // Everything has expired by now
        if requests.len() > 10 {
            prop_assert!(net.nodes().iter().all(|node| node.multiplier() == 1.0));
        }
    }

    #[test]
    fn synthetic_runs_always_complete(seed in 0u64..1_000, steps in 1u64..15) {
        let mut config = SimConfig::default()
            .with_steps(steps)
            .with_seed(seed)
            .with_agents(AgentConfig::default().with_counts(4, 2, 3, 1).with_advanced_disruptions(true));
        config.agents.disruption_defaults.probability = 0.5;
        config.network = NetworkSource::Synthetic(
            SyntheticParams::default().with_counts(4, 2, 2, 3, 2).with_connection_probability(0.5),
        );

        let mut engine = Engine::from_config(&config).unwrap();
        engine.run().unwrap();
        prop_assert_eq!(engine.get_metrics().len() as u64, steps);
    }
}
