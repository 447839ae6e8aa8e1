// Serialized shape of a network, as produced by the generator or read from disk

use super::{NodeType, TransportMode, Units};
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub capacity: Units,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_rate: Option<Units>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_rate: Option<Units>,
    #[serde(default)]
    pub initial_inventory: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
    pub capacity: Units,
    pub cost_per_unit: f64,
    #[serde(default)]
    pub lead_time: u32,
    #[serde(default)]
    pub mode: TransportMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

fn default_name() -> String {
    "supply_chain".to_string()
}

impl NetworkDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::config(format!("cannot read network definition {}: {}", path.display(), e))
        })?;
        let def: Self = serde_json::from_str(&content)?;
        info!("Loaded network definition '{}' ({} nodes, {} edges) from {}",
              def.name, def.nodes.len(), def.edges.len(), path.display());
        Ok(def)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    // Builder helpers, mostly for tests and small hand-written scenarios

    pub fn factory(mut self, id: &str, capacity: Units, production_rate: Units) -> Self {
        self.nodes.push(NodeDefinition {
            production_rate: Some(production_rate),
            ..NodeDefinition::plain(id, NodeType::Factory, capacity)
        });
        self
    }

    pub fn market(mut self, id: &str, capacity: Units, demand_rate: Units) -> Self {
        self.nodes.push(NodeDefinition {
            demand_rate: Some(demand_rate),
            ..NodeDefinition::plain(id, NodeType::Market, capacity)
        });
        self
    }

    pub fn node(mut self, id: &str, node_type: NodeType, capacity: Units) -> Self {
        self.nodes.push(NodeDefinition::plain(id, node_type, capacity));
        self
    }

    pub fn link(mut self, id: &str, source: &str, target: &str, capacity: Units, cost_per_unit: f64, lead_time: u32) -> Self {
        self.edges.push(EdgeDefinition {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            capacity,
            cost_per_unit,
            lead_time,
            mode: TransportMode::default(),
        });
        self
    }
}

impl NodeDefinition {
    pub fn plain(id: &str, node_type: NodeType, capacity: Units) -> Self {
        Self {
            id: id.to_string(),
            node_type,
            capacity,
            region: None,
            production_rate: None,
            demand_rate: None,
            initial_inventory: 0,
        }
    }
}
