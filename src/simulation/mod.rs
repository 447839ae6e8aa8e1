pub mod config;
pub mod rng;

pub use config::{AgentConfig, NetworkSource, RunConfig, SimConfig};

use crate::agents::{Agent, AgentRegistry, AgentRole, RequestBook, SimAgent, StepContext, StepReport};
use crate::disruption::{DisruptionEvent, DisruptionSchedule, TargetScope};
use crate::error::{Result, SimError};
use crate::metrics::{DisruptionImpact, MetricsCollector, MetricsRecord};
use crate::network::Network;
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Initialized,
    Running,
    ApplyingDisruptions,
    ActivatingAgents,
    Reconciling,
    MetricsEmitted,
    Completed,
    Failed,
}

impl EnginePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one run: owns the network, the agents and the disruption schedule.
pub struct Engine {
    run: RunConfig,
    network: Network,
    registry: AgentRegistry,
    schedule: DisruptionSchedule,
    metrics: MetricsCollector,
    phase: EnginePhase,
    step: u64,
}

impl Engine {
    /// Builds agents from `config.agents` and schedules `config.disruptions`.
    pub fn new(config: &SimConfig, network: Network) -> Result<Self> {
        config.validate()?;
        let registry = AgentRegistry::from_config(&config.agents, &network)?;
        Self::with_registry(config.simulation.clone(), network, registry, &config.disruptions)
    }

    /// Builds the network from the config source, then the engine.
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        let network = config.build_network()?;
        Self::new(config, network)
    }

    pub fn with_registry(
        run: RunConfig,
        network: Network,
        registry: AgentRegistry,
        disruptions: &[DisruptionEvent],
    ) -> Result<Self> {
        if run.total_steps == 0 {
            return Err(SimError::config("total_steps must be at least 1"));
        }

        let mut schedule = DisruptionSchedule::new();
        for event in disruptions {
            event.validate()?;
            check_target(&network, &event.target, || {
                format!("configured {:?} disruption at step {}", event.disruption_type, event.start_step)
            })?;
            schedule.enqueue(event.clone(), 0)?;
        }
        for agent in registry.iter() {
            let SimAgent::Disruption(agent) = agent else { continue };
            if let Some(target) = agent.fixed_target() {
                check_target(&network, target, || agent.id().to_string())?;
            }
        }

        info!("Engine '{}' initialized: {} steps, seed {}, {} agents, {} scheduled disruptions",
              run.simulation_name, run.total_steps, run.random_seed, registry.len(), schedule.len());

        Ok(Self {
            run,
            network,
            registry,
            schedule,
            metrics: MetricsCollector::new(),
            phase: EnginePhase::Initialized,
            step: 0,
        })
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Records of every completed step, in order.
    pub fn get_metrics(&self) -> Vec<MetricsRecord> {
        self.metrics.get_records()
    }

    pub fn metrics_handle(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn run(&mut self) -> Result<()> {
        self.run_with(|_| {})
    }

    /// Runs every step, calling `observer` with each record as it is emitted.
    pub fn run_with<F>(&mut self, mut observer: F) -> Result<()>
    where
        F: FnMut(&MetricsRecord),
    {
        if self.phase != EnginePhase::Initialized {
            return Err(SimError::EngineState(self.phase.to_string()));
        }

        self.phase = EnginePhase::Running;
        info!("Starting simulation: {}", self.run.simulation_name);

        while self.step < self.run.total_steps {
            match self.run_step() {
                Ok(record) => observer(&record),
                Err(e) => {
                    error!("Step {} aborted: {}", self.step, e);
                    self.phase = EnginePhase::Failed;
                    return Err(e);
                }
            }
        }

        self.phase = EnginePhase::Completed;
        let totals = self.metrics.totals();
        info!("Simulation '{}' completed: {} steps, {} units exported, {} unmet",
              self.run.simulation_name, totals.steps, totals.export_volume, totals.unmet_demand);
        Ok(())
    }

    fn run_step(&mut self) -> Result<MetricsRecord> {
        let step = self.step;
        let order = self.registry.activation_order();
        let mut report = StepReport::default();
        let mut book = RequestBook::new(self.registry.managed_nodes());

        self.phase = EnginePhase::ApplyingDisruptions;
        for &id in &order {
            let Some(agent) = self.registry.get_mut(id) else { continue };
            if agent.role() != AgentRole::Disruption {
                continue;
            }
            let mut ctx = StepContext {
                step,
                network: &mut self.network,
                schedule: &mut self.schedule,
                requests: &mut book,
                report: &mut report,
                rng: rng::agent_stream(self.run.random_seed, id, step),
            };
            agent.step(&mut ctx);
        }

        for event in self.schedule.take_due(step) {
            match self.network.apply_disruption(&event) {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("Disruption {} dropped: {}", event.id, e);
                    report.anomalies += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.phase = EnginePhase::ActivatingAgents;
        for &id in &order {
            let Some(agent) = self.registry.get_mut(id) else { continue };
            if agent.role() == AgentRole::Disruption {
                continue;
            }
            let mut ctx = StepContext {
                step,
                network: &mut self.network,
                schedule: &mut self.schedule,
                requests: &mut book,
                report: &mut report,
                rng: rng::agent_stream(self.run.random_seed, id, step),
            };
            agent.step(&mut ctx);
        }

        self.phase = EnginePhase::Reconciling;
        for outcome in book.drain() {
            match self.registry.get_mut(outcome.requester) {
                Some(agent) => agent.reconcile(&outcome),
                None => {
                    warn!("Shipment outcome for unknown {}", outcome.requester);
                    report.anomalies += 1;
                }
            }
        }
        for agent in self.registry.iter_mut() {
            agent.settle(&mut report);
        }
        self.network.check_capacity()?;

        let disruptions: Vec<DisruptionImpact> = self
            .network
            .active_disruptions()
            .map(|d| DisruptionImpact {
                id: d.event.id,
                disruption_type: d.event.disruption_type,
                targets: d.targets.len(),
                capacity_removed: self.network.capacity_removed_by(d),
                steps_remaining: d.event.expires_at().saturating_sub(step),
            })
            .collect();

        let expired = self.network.advance_step();
        if !expired.is_empty() {
            debug!("Step {}: {} disruption(s) expired", step, expired.len());
        }

        self.phase = EnginePhase::MetricsEmitted;
        let record = MetricsRecord {
            step,
            export_volume: report.export_volume,
            market_deliveries: report.market_deliveries,
            unmet_demand: report.unmet_demand,
            backlog: report.backlog,
            in_transit: self.network.in_transit(),
            transport_cost: report.transport_cost,
            routed_units: report.routed_units,
            lead_time_units: report.lead_time_units,
            avg_lead_time: report.avg_lead_time(),
            anomalies: report.anomalies,
            disruptions_emitted: report.disruptions_emitted,
            disruptions,
        };
        debug!("Step {}: exported {}, delivered {}, unmet {}",
               step, record.export_volume, record.market_deliveries, record.unmet_demand);
        self.metrics.record(record.clone());
        self.step += 1;
        self.phase = EnginePhase::Running;

        Ok(record)
    }
}

/// Fails when a target fixed by the config names a missing element or matches nothing.
fn check_target<F>(network: &Network, target: &TargetScope, what: F) -> Result<()>
where
    F: Fn() -> String,
{
    if let Some(key) = network.unknown_keys(target).first() {
        return Err(SimError::target(format!("{}: {:?} does not exist", what(), key)));
    }
    if network.resolve_scope(target).is_empty() {
        return Err(SimError::target(format!("{}: target matches no element", what())));
    }
    Ok(())
}
