use super::degradation::Degradation;
use super::Units;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Factory,
    Port,
    Warehouse,
    TransportHub,
    Market,
}

impl NodeType {
    // Nodes that hold goods between steps
    pub fn holds_stock(self) -> bool {
        matches!(self, Self::Port | Self::Warehouse | Self::TransportHub)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Factory => "Factory",
            Self::Port => "Port",
            Self::Warehouse => "Warehouse",
            Self::TransportHub => "TransportHub",
            Self::Market => "Market",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Factory { production_rate: Units },
    Port,
    Warehouse,
    TransportHub,
    Market { demand_rate: Units },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Factory { .. } => NodeType::Factory,
            Self::Port => NodeType::Port,
            Self::Warehouse => NodeType::Warehouse,
            Self::TransportHub => NodeType::TransportHub,
            Self::Market { .. } => NodeType::Market,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub key: String,
    pub kind: NodeKind,
    pub region: Option<String>,
    pub capacity: Units,
    pub(crate) utilization: Units,
    pub(crate) stock: Units,
    pub(crate) degradation: Degradation,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn effective_capacity(&self) -> Units {
        self.degradation.apply(self.capacity)
    }

    pub fn residual(&self) -> Units {
        self.effective_capacity().saturating_sub(self.utilization)
    }

    pub fn utilization(&self) -> Units {
        self.utilization
    }

    pub fn stock(&self) -> Units {
        self.stock
    }

    pub fn multiplier(&self) -> f64 {
        self.degradation.multiplier()
    }

    pub fn production_rate(&self) -> Units {
        match self.kind {
            NodeKind::Factory { production_rate } => production_rate,
            _ => 0,
        }
    }

    pub fn demand_rate(&self) -> Units {
        match self.kind {
            NodeKind::Market { demand_rate } => demand_rate,
            _ => 0,
        }
    }
}
