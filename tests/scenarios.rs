//! End-to-end runs of small, hand-checked supply chains.

use tradeflow::agents::SimAgent;
use tradeflow::disruption::{DisruptionEvent, DisruptionId, DisruptionType, TargetScope};
use tradeflow::network::synthetic::SyntheticParams;
use tradeflow::prelude::*;
use tradeflow::simulation::NetworkSource;
use tradeflow::agents::{DemandModel, MagnitudeModel};

fn port_lane() -> NetworkDefinition {
    NetworkDefinition::new("port_lane")
        .factory("Factory_1", 100, 100)
        .node("Port_1", NodeType::Port, 100)
        .link("Factory_1->Port_1", "Factory_1", "Port_1", 100, 1.0, 1)
}

fn congestion(start_step: u64, duration: u64, magnitude: f64) -> DisruptionEvent {
    DisruptionEvent::new(DisruptionType::PortCongestion, magnitude, duration, TargetScope::node("Port_1"), start_step)
}

#[test]
fn port_congestion_halves_exports_for_three_steps() {
    let config = SimConfig::default()
        .with_name("port_congestion")
        .with_steps(7)
        .with_network(port_lane())
        .with_agents(AgentConfig::default().with_counts(1, 0, 0, 0))
        .with_disruption(congestion(2, 3, 0.5));

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();
    let records = engine.get_metrics();

    let volume: Vec<Units> = records.iter().map(|r| r.export_volume).collect();
    let unmet: Vec<Units> = records.iter().map(|r| r.unmet_demand).collect();
    assert_eq!(volume, vec![100, 100, 50, 50, 50, 100, 100]);
    assert_eq!(unmet, vec![0, 0, 50, 50, 50, 0, 0]);
    assert!(records.iter().all(|r| r.anomalies == 0));
}

#[test]
fn zero_agents_run_every_step_quietly() {
    let config = SimConfig::default()
        .with_name("idle")
        .with_steps(12)
        .with_agents(AgentConfig::default());

    let mut engine = Engine::from_config(&config).unwrap();
    assert!(engine.registry().is_empty());
    engine.run().unwrap();

    let records = engine.get_metrics();
    assert_eq!(records.len(), 12);
    for r in &records {
        assert_eq!(r.export_volume, 0);
        assert_eq!(r.unmet_demand, 0);
        assert_eq!(r.market_deliveries, 0);
    }
    assert_eq!(engine.phase(), EnginePhase::Completed);
}

fn stochastic_config(seed: u64) -> SimConfig {
    let mut agents = AgentConfig::default()
        .with_counts(5, 3, 4, 2)
        .with_advanced_disruptions(true)
        .with_market_demand(DemandModel::Poisson);
    agents.disruption_defaults.probability = 0.3;
    agents.disruption_defaults.magnitude_model = MagnitudeModel::Beta { alpha: 2.0, beta: 3.0 };

    let mut config = SimConfig::default()
        .with_name("stochastic")
        .with_steps(40)
        .with_seed(seed)
        .with_agents(agents);
    config.network = NetworkSource::Synthetic(SyntheticParams::default().with_connection_probability(0.6));
    config
}

#[test]
fn same_seed_gives_identical_records() {
    let run = |seed| {
        let mut engine = Engine::from_config(&stochastic_config(seed)).unwrap();
        engine.run().unwrap();
        engine.get_metrics()
    };

    let first = run(2024);
    assert_eq!(first.len(), 40);
    assert_eq!(first, run(2024));
    assert_ne!(first, run(2025));
}

#[test]
fn disruption_window_is_exactly_start_to_start_plus_duration() {
    let config = SimConfig::default()
        .with_steps(18)
        .with_network(port_lane())
        .with_disruption(congestion(10, 5, 0.5))
        .with_disruption(congestion(12, 5, 0.2));

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();
    let records = engine.get_metrics();

    for r in &records[..10] {
        assert!(!r.is_disrupted(), "step {} should be calm", r.step);
    }
    for r in &records[10..15] {
        let first = r.disruptions.iter().find(|d| d.id == DisruptionId::new(1));
        assert_eq!(first.map(|d| d.capacity_removed), Some(50), "step {}", r.step);
    }
    // The overlapping event alone is left for steps 15 and 16
    for r in &records[15..17] {
        assert_eq!(r.disruptions.len(), 1);
        assert_eq!(r.capacity_removed(), 20);
    }
    assert!(!records[17].is_disrupted());

    let port = engine.network().node_id("Port_1").unwrap();
    assert_eq!(engine.network().node(port).unwrap().multiplier(), 1.0);
    assert_eq!(engine.network().node(port).unwrap().effective_capacity(), 100);
}

fn contested(hub_first: bool) -> NetworkDefinition {
    let def = NetworkDefinition::new("contested")
        .factory("F1", 200, 100)
        .factory("F2", 200, 100);
    let def = if hub_first {
        def.node("H", NodeType::TransportHub, 1000).node("P", NodeType::Port, 1000)
    } else {
        def.node("P", NodeType::Port, 1000).node("H", NodeType::TransportHub, 1000)
    };
    def.link("F1-H", "F1", "H", 200, 1.0, 1)
        .link("F2-H", "F2", "H", 200, 1.0, 1)
        .link("H-P", "H", "P", 101, 1.0, 1)
}

fn exporter_backlogs(engine: &Engine) -> Vec<Units> {
    engine
        .registry()
        .iter()
        .filter_map(|a| match a {
            SimAgent::ExportSector(e) => Some(e.backlog()),
            _ => None,
        })
        .collect()
}

#[test]
fn contested_port_splits_capacity_by_agent_id() {
    let config = SimConfig::default()
        .with_steps(1)
        .with_network(contested(false))
        .with_agents(AgentConfig::default().with_counts(2, 1, 0, 0));

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();

    let record = &engine.get_metrics()[0];
    assert_eq!(record.export_volume, 101);
    assert_eq!(record.unmet_demand, 99);
    assert_eq!(exporter_backlogs(&engine), vec![49, 50]);
}

#[test]
fn hub_declared_first_still_leaves_the_port_staffed() {
    let config = SimConfig::default()
        .with_steps(1)
        .with_network(contested(true))
        .with_agents(AgentConfig::default().with_counts(2, 1, 0, 0));

    let mut engine = Engine::from_config(&config).unwrap();
    let port = engine.network().node_id("P").unwrap();
    assert_eq!(engine.registry().managed_nodes().into_iter().collect::<Vec<_>>(), vec![port]);

    engine.run().unwrap();
    assert_eq!(engine.get_metrics()[0].export_volume, 101);
    assert_eq!(exporter_backlogs(&engine), vec![49, 50]);
}

#[test]
fn scheduled_disruption_on_missing_node_fails_at_construction() {
    let mut agents = AgentConfig::default().with_counts(1, 0, 0, 1);
    agents.disruption_defaults.target = TargetScope::node("Ghost_Port");
    agents.disruption_defaults.start_step = 1;

    let config = SimConfig::default()
        .with_steps(3)
        .with_network(port_lane())
        .with_agents(agents);

    assert!(matches!(Engine::from_config(&config), Err(SimError::InvalidTarget(_))));
}

#[test]
fn stochastic_selector_matching_nothing_is_an_anomaly() {
    let mut agents = AgentConfig::default().with_counts(1, 0, 0, 1).with_advanced_disruptions(true);
    agents.disruption_defaults.target = TargetScope::region("Sylhet");
    agents.disruption_defaults.probability = 1.0;

    let config = SimConfig::default()
        .with_steps(3)
        .with_network(port_lane())
        .with_agents(agents);

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();
    let records = engine.get_metrics();
    let anomalies: Vec<u32> = records.iter().map(|r| r.anomalies).collect();
    assert_eq!(anomalies, vec![1, 1, 1]);
    assert!(records.iter().all(|r| r.export_volume == 100));
}

#[test]
fn metrics_handle_reads_while_running() {
    let config = SimConfig::default()
        .with_steps(5)
        .with_network(port_lane())
        .with_agents(AgentConfig::default().with_counts(1, 0, 0, 0));
    let mut engine = Engine::from_config(&config).unwrap();
    let handle = engine.metrics_handle();

    let mut seen = Vec::new();
    engine.run_with(|_| seen.push(handle.len())).unwrap();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert_eq!(handle.totals().export_volume, 500);
}

#[test]
fn goods_reach_markets_through_warehouses() {
    let def = NetworkDefinition::new("to_market")
        .factory("F", 100, 100)
        .node("W", NodeType::Warehouse, 200)
        .market("M", 200, 60)
        .link("F-W", "F", "W", 100, 1.0, 1)
        .link("W-M", "W", "M", 100, 2.0, 1);
    let config = SimConfig::default()
        .with_steps(4)
        .with_network(def)
        .with_agents(AgentConfig::default().with_counts(1, 0, 1, 0));

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();
    let records = engine.get_metrics();

    // Nothing is in the warehouse before the first shipment lands
    assert_eq!(records[0].market_deliveries, 0);
    assert_eq!(records[0].unmet_demand, 60);
    // 60 carried + 60 fresh wanted, 100 in stock
    assert_eq!(records[1].market_deliveries, 100);
    assert_eq!(records[1].unmet_demand, 0);
    // 20 carried + 60 fresh
    assert_eq!(records[2].market_deliveries, 80);
    assert_eq!(records[3].market_deliveries, 60);
    assert!(records.iter().all(|r| r.export_volume == 100));
}

#[test]
fn bundled_scenarios_load_and_build() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    for name in ["port_congestion.json", "stochastic_sweep.json"] {
        let config = SimConfig::load(dir.join(name)).unwrap();
        config.validate().unwrap();
        let mut engine = Engine::from_config(&config.with_steps(10)).unwrap();
        engine.run().unwrap();
        assert_eq!(engine.get_metrics().len(), 10, "{}", name);
    }
}

#[test]
fn run_lead_time_counts_market_draws() {
    let def = NetworkDefinition::new("slow_last_mile")
        .factory("F", 100, 100)
        .node("W", NodeType::Warehouse, 200)
        .market("M", 200, 100)
        .link("F-W", "F", "W", 100, 1.0, 1)
        .link("W-M", "W", "M", 100, 1.0, 3);
    let config = SimConfig::default()
        .with_steps(2)
        .with_network(def)
        .with_agents(AgentConfig::default().with_counts(1, 0, 1, 0));

    let mut engine = Engine::from_config(&config).unwrap();
    engine.run().unwrap();
    let records = engine.get_metrics();

    let per_step: Vec<f64> = records.iter().map(|r| r.avg_lead_time).collect();
    assert_eq!(per_step, vec![1.0, 2.0]);
    assert_eq!(records[1].routed_units, 200);

    let report = tradeflow::metrics::analyzer::analyze(&records, "slow_last_mile", 42);
    assert!((report.avg_lead_time - 5.0 / 3.0).abs() < 1e-9);
}
