use crate::error::{Result, SimError};
use crate::network::{NodeType, TransportMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct DisruptionId(u64);

impl DisruptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DisruptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DisruptionType {
    PortCongestion,
    NaturalDisaster,
    PolicyChange,
    PoliticalInstability,
    EnergyCrisis,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKey {
    Node(String),
    Edge(String),
}

/// What a disruption hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetScope {
    /// Explicit node/edge keys.
    Elements { ids: Vec<ElementKey> },
    /// Every node matching a type and/or region. Both `None` matches all nodes.
    Selector {
        #[serde(default)]
        node_type: Option<NodeType>,
        #[serde(default)]
        region: Option<String>,
    },
    /// Every edge using a transport mode.
    Mode { mode: TransportMode },
}

impl TargetScope {
    pub fn node(key: impl Into<String>) -> Self {
        Self::Elements { ids: vec![ElementKey::Node(key.into())] }
    }

    pub fn edge(key: impl Into<String>) -> Self {
        Self::Elements { ids: vec![ElementKey::Edge(key.into())] }
    }

    pub fn node_type(node_type: NodeType) -> Self {
        Self::Selector { node_type: Some(node_type), region: None }
    }

    pub fn region(region: impl Into<String>) -> Self {
        Self::Selector { node_type: None, region: Some(region.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisruptionEvent {
    // Assigned by the schedule, anything read from config is overwritten
    #[serde(default)]
    pub id: DisruptionId,
    pub disruption_type: DisruptionType,
    pub magnitude: f64,
    pub duration: u64,
    pub target: TargetScope,
    pub start_step: u64,
}

impl DisruptionEvent {
    pub fn new(
        disruption_type: DisruptionType,
        magnitude: f64,
        duration: u64,
        target: TargetScope,
        start_step: u64,
    ) -> Self {
        Self {
            id: DisruptionId::default(),
            disruption_type,
            magnitude,
            duration,
            target,
            start_step,
        }
    }

    pub fn expires_at(&self) -> u64 {
        self.start_step.saturating_add(self.duration)
    }

    pub fn is_active_at(&self, step: u64) -> bool {
        step >= self.start_step && step < self.expires_at()
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.magnitude) {
            return Err(SimError::config(format!(
                "disruption magnitude must be within [0, 1], got {}",
                self.magnitude
            )));
        }
        if self.duration == 0 {
            return Err(SimError::config("disruption duration must be at least one step"));
        }
        if let TargetScope::Elements { ids } = &self.target {
            if ids.is_empty() {
                return Err(SimError::target("disruption target list is empty"));
            }
        }
        Ok(())
    }
}

/// Pending disruptions, ordered by start step and then by id.
#[derive(Debug, Default)]
pub struct DisruptionSchedule {
    pending: BTreeMap<(u64, DisruptionId), DisruptionEvent>,
    next_id: u64,
}

impl DisruptionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event and hands back the id it was given.
    ///
    /// Events that would start before `current_step` are refused, a disruption
    /// never lands retroactively.
    pub fn enqueue(&mut self, mut event: DisruptionEvent, current_step: u64) -> Result<DisruptionId> {
        event.validate()?;
        if event.start_step < current_step {
            return Err(SimError::InvalidRequest(format!(
                "disruption starting at step {} scheduled at step {}",
                event.start_step, current_step
            )));
        }

        self.next_id += 1;
        let id = DisruptionId::new(self.next_id);
        event.id = id;
        debug!("Scheduled {} {:?} at step {} for {} steps", id, event.disruption_type, event.start_step, event.duration);
        self.pending.insert((event.start_step, id), event);
        Ok(id)
    }

    /// Removes and returns everything due at or before `step`.
    pub fn take_due(&mut self, step: u64) -> Vec<DisruptionEvent> {
        let later = self.pending.split_off(&(step + 1, DisruptionId::default()));
        let due = std::mem::replace(&mut self.pending, later);
        due.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
