use super::degradation::Degradation;
use super::{NodeId, Units};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge #{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum TransportMode {
    #[default]
    Road,
    Rail,
    Sea,
    Air,
    Inland,
}

/// A directed transport link between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub key: String,
    pub source: NodeId,
    pub target: NodeId,
    pub mode: TransportMode,
    pub capacity: Units,
    pub cost_per_unit: f64,
    pub lead_time: u32,
    pub(crate) flow: Units,
    pub(crate) degradation: Degradation,
}

impl Edge {
    pub fn effective_capacity(&self) -> Units {
        self.degradation.apply(self.capacity)
    }

    pub fn residual(&self) -> Units {
        self.effective_capacity().saturating_sub(self.flow)
    }

    pub fn flow(&self) -> Units {
        self.flow
    }

    pub fn multiplier(&self) -> f64 {
        self.degradation.multiplier()
    }
}
