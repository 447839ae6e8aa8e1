use crate::agents::{DemandModel, DisruptionPolicy, MagnitudeModel};
use crate::disruption::{DisruptionEvent, DisruptionType, TargetScope};
use crate::error::{Result, SimError};
use crate::network::synthetic::{self, SyntheticParams};
use crate::network::{Network, NetworkDefinition, NodeType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub simulation_name: String,
    pub total_steps: u64,
    pub random_seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            simulation_name: "export_resilience".to_string(),
            total_steps: 100,
            random_seed: 42,
        }
    }
}

/// Where the initial network comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NetworkSource {
    Synthetic(SyntheticParams),
    File { path: PathBuf },
    Inline(NetworkDefinition),
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::Synthetic(SyntheticParams::default())
    }
}

/// Base record every disruption agent starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptionAgentConfig {
    pub disruption_type: DisruptionType,
    pub magnitude: f64,
    pub duration: u64,
    pub target: TargetScope,
    pub start_step: u64,
    pub repeat_every: Option<u64>,
    // Only read by the stochastic model
    pub probability: f64,
    pub magnitude_model: MagnitudeModel,
    pub min_duration: u64,
    pub max_duration: u64,
}

impl Default for DisruptionAgentConfig {
    fn default() -> Self {
        Self {
            disruption_type: DisruptionType::PortCongestion,
            magnitude: 0.5,
            duration: 5,
            target: TargetScope::node_type(NodeType::Port),
            start_step: 10,
            repeat_every: None,
            probability: 0.05,
            magnitude_model: MagnitudeModel::default(),
            min_duration: 2,
            max_duration: 6,
        }
    }
}

/// Per-agent changes on top of `disruption_defaults`; `agent` is the index
/// among disruption agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisruptionOverride {
    pub agent: usize,
    #[serde(default)]
    pub disruption_type: Option<DisruptionType>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub target: Option<TargetScope>,
    #[serde(default)]
    pub start_step: Option<u64>,
    #[serde(default)]
    pub repeat_every: Option<u64>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub magnitude_model: Option<MagnitudeModel>,
    #[serde(default)]
    pub min_duration: Option<u64>,
    #[serde(default)]
    pub max_duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub num_export_sector_agents: usize,
    pub num_logistics_agents: usize,
    pub num_market_agents: usize,
    pub num_disruption_agents: usize,
    pub advanced_disruption_model: bool,
    pub disruption_defaults: DisruptionAgentConfig,
    pub disruption_overrides: Vec<DisruptionOverride>,
    pub market_demand: DemandModel,
    pub max_backlog_steps: u64,
    pub cost_ceiling: Option<f64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            num_export_sector_agents: 0,
            num_logistics_agents: 0,
            num_market_agents: 0,
            num_disruption_agents: 0,
            advanced_disruption_model: false,
            disruption_defaults: DisruptionAgentConfig::default(),
            disruption_overrides: Vec::new(),
            market_demand: DemandModel::Constant,
            max_backlog_steps: 5,
            cost_ceiling: None,
        }
    }
}

impl AgentConfig {
    /// Settings of the `index`-th disruption agent, overrides applied.
    pub fn disruption_settings(&self, index: usize) -> DisruptionAgentConfig {
        let mut settings = self.disruption_defaults.clone();
        for o in self.disruption_overrides.iter().filter(|o| o.agent == index) {
            if let Some(t) = o.disruption_type {
                settings.disruption_type = t;
            }
            if let Some(m) = o.magnitude {
                settings.magnitude = m;
            }
            if let Some(d) = o.duration {
                settings.duration = d;
            }
            if let Some(target) = &o.target {
                settings.target = target.clone();
            }
            if let Some(s) = o.start_step {
                settings.start_step = s;
            }
            if o.repeat_every.is_some() {
                settings.repeat_every = o.repeat_every;
            }
            if let Some(p) = o.probability {
                settings.probability = p;
            }
            if let Some(m) = o.magnitude_model {
                settings.magnitude_model = m;
            }
            if let Some(d) = o.min_duration {
                settings.min_duration = d;
            }
            if let Some(d) = o.max_duration {
                settings.max_duration = d;
            }
        }
        settings
    }

    pub fn disruption_policy(&self, index: usize) -> Result<DisruptionPolicy> {
        let s = self.disruption_settings(index);

        if self.advanced_disruption_model {
            if !(0.0..=1.0).contains(&s.probability) {
                return Err(SimError::config(format!(
                    "disruption agent {}: probability must be within [0, 1], got {}", index, s.probability
                )));
            }
            if s.min_duration == 0 || s.min_duration > s.max_duration {
                return Err(SimError::config(format!(
                    "disruption agent {}: duration range {}..={} is invalid", index, s.min_duration, s.max_duration
                )));
            }
            s.magnitude_model.validate()?;
            Ok(DisruptionPolicy::Stochastic {
                disruption_type: s.disruption_type,
                target: s.target,
                probability: s.probability,
                magnitude: s.magnitude_model,
                min_duration: s.min_duration,
                max_duration: s.max_duration,
            })
        } else {
            let template = DisruptionEvent::new(s.disruption_type, s.magnitude, s.duration, s.target, s.start_step);
            template.validate()?;
            Ok(DisruptionPolicy::Scheduled { template, repeat_every: s.repeat_every })
        }
    }

    pub fn with_counts(mut self, export: usize, logistics: usize, market: usize, disruption: usize) -> Self {
        self.num_export_sector_agents = export;
        self.num_logistics_agents = logistics;
        self.num_market_agents = market;
        self.num_disruption_agents = disruption;
        self
    }

    pub fn with_advanced_disruptions(mut self, enabled: bool) -> Self {
        self.advanced_disruption_model = enabled;
        self
    }

    pub fn with_market_demand(mut self, model: DemandModel) -> Self {
        self.market_demand = model;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    pub write_csv: bool,
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            write_csv: true,
            write_json: true,
        }
    }
}

/// Everything a run needs, as read from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: RunConfig,
    pub network: NetworkSource,
    pub agents: AgentConfig,
    pub disruptions: Vec<DisruptionEvent>,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| SimError::config(format!("malformed config {}: {}", path.display(), e)))?;
        info!("Loaded config '{}' from {}", config.simulation.simulation_name, path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Checks everything that can be checked without building the network.
    pub fn validate(&self) -> Result<()> {
        if self.simulation.simulation_name.trim().is_empty() {
            return Err(SimError::config("simulation_name is empty"));
        }
        if self.simulation.total_steps == 0 {
            return Err(SimError::config("total_steps must be at least 1"));
        }
        if let NetworkSource::Synthetic(params) = &self.network {
            params.validate()?;
        }
        if self.agents.cost_ceiling.is_some_and(|c| c.is_nan() || c < 0.0) {
            return Err(SimError::config("cost_ceiling must be a non-negative number"));
        }
        for i in 0..self.agents.num_disruption_agents {
            self.agents.disruption_policy(i)?;
        }
        for o in &self.agents.disruption_overrides {
            if o.agent >= self.agents.num_disruption_agents {
                warn!("Disruption override for agent {} ignored, only {} disruption agents configured",
                      o.agent, self.agents.num_disruption_agents);
            }
        }
        for event in &self.disruptions {
            event.validate()?;
        }
        Ok(())
    }

    pub fn build_network(&self) -> Result<Network> {
        let def = match &self.network {
            NetworkSource::Synthetic(params) => synthetic::generate(params, self.simulation.random_seed)?,
            NetworkSource::File { path } => NetworkDefinition::load(path)?,
            NetworkSource::Inline(def) => def.clone(),
        };
        Network::from_definition(&def)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.simulation.simulation_name = name.into();
        self
    }

    pub fn with_steps(mut self, total_steps: u64) -> Self {
        self.simulation.total_steps = total_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.random_seed = seed;
        self
    }

    pub fn with_network(mut self, def: NetworkDefinition) -> Self {
        self.network = NetworkSource::Inline(def);
        self
    }

    pub fn with_agents(mut self, agents: AgentConfig) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_disruption(mut self, event: DisruptionEvent) -> Self {
        self.disruptions.push(event);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{"simulation": {"total_steps": 12}}"#).unwrap();
        assert_eq!(config.simulation.total_steps, 12);
        assert_eq!(config.simulation.random_seed, 42);
        assert_eq!(config.network, NetworkSource::default());
        assert_eq!(config.output.results_dir, PathBuf::from("results"));
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_config() {
        let json = r#"{
            "simulation": {"simulation_name": "ctg", "total_steps": 30, "random_seed": 7},
            "network": {"source": "synthetic", "num_factories": 3, "connection_probability": 0.5},
            "agents": {
                "num_export_sector_agents": 3,
                "num_disruption_agents": 2,
                "advanced_disruption_model": true,
                "disruption_defaults": {"probability": 0.1, "magnitude_model": {"distribution": "beta", "alpha": 2.0, "beta": 5.0}},
                "disruption_overrides": [{"agent": 1, "probability": 0.3}],
                "market_demand": "poisson"
            },
            "disruptions": [{
                "disruption_type": "NaturalDisaster",
                "magnitude": 0.8,
                "duration": 4,
                "target": {"kind": "selector", "region": "Chittagong"},
                "start_step": 5
            }]
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        let NetworkSource::Synthetic(params) = &config.network else { panic!("expected synthetic") };
        assert_eq!(params.num_factories, 3);
        assert_eq!(params.num_ports, SyntheticParams::default().num_ports);
        assert_eq!(config.agents.market_demand, DemandModel::Poisson);
        assert_eq!(config.agents.disruption_settings(0).probability, 0.1);
        assert_eq!(config.agents.disruption_settings(1).probability, 0.3);
        assert!(matches!(config.agents.disruption_policy(1).unwrap(), DisruptionPolicy::Stochastic { .. }));
    }

    #[test]
    fn overrides_change_the_duration_range_of_one_agent() {
        let mut agents = AgentConfig::default().with_counts(0, 0, 0, 2).with_advanced_disruptions(true);
        agents.disruption_overrides.push(DisruptionOverride {
            agent: 1,
            min_duration: Some(8),
            max_duration: Some(12),
            ..DisruptionOverride::default()
        });

        let durations = |index| match agents.disruption_policy(index).unwrap() {
            DisruptionPolicy::Stochastic { min_duration, max_duration, .. } => (min_duration, max_duration),
            other => panic!("expected stochastic policy, got {:?}", other),
        };
        assert_eq!(durations(0), (2, 6));
        assert_eq!(durations(1), (8, 12));

        // An override can also break the range
        agents.disruption_overrides[0].max_duration = Some(4);
        assert!(matches!(agents.disruption_policy(1), Err(SimError::Configuration(_))));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let config = SimConfig::default().with_steps(0);
        assert!(matches!(config.validate(), Err(SimError::Configuration(_))));

        let mut config = SimConfig::default();
        config.agents.num_disruption_agents = 1;
        config.agents.disruption_defaults.magnitude = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SimConfig::load(&path), Err(SimError::Configuration(_))));
    }

    #[test]
    fn inline_network_builds() {
        let def = NetworkDefinition::new("inline")
            .factory("F", 100, 100)
            .node("P", NodeType::Port, 100)
            .link("F-P", "F", "P", 100, 1.0, 1);
        let network = SimConfig::default().with_network(def).build_network().unwrap();
        assert_eq!(network.nodes().len(), 2);
    }
}
