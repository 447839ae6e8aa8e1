pub mod agents;
pub mod disruption;
pub mod error;
pub mod metrics;
pub mod network;
pub mod simulation;

pub use error::{Result, SimError};
pub use metrics::{MetricsCollector, MetricsRecord};
pub use network::Network;
pub use simulation::{Engine, SimConfig};

pub mod prelude {
    pub use crate::agents::{Agent, AgentId, AgentRegistry, AgentRole, SimAgent};
    pub use crate::disruption::{DisruptionEvent, DisruptionType, TargetScope};
    pub use crate::error::{Result, SimError};
    pub use crate::metrics::{MetricsCollector, MetricsRecord};
    pub use crate::network::{Network, NetworkDefinition, NodeId, NodeType, Units};
    pub use crate::simulation::{AgentConfig, Engine, EnginePhase, SimConfig};
}
