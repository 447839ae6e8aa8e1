pub mod analyzer;
pub mod logger;

use crate::disruption::{DisruptionId, DisruptionType};
use crate::network::Units;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisruptionImpact {
    pub id: DisruptionId,
    pub disruption_type: DisruptionType,
    pub targets: usize,
    pub capacity_removed: Units,
    pub steps_remaining: u64,
}

/// Summary of one completed step. Never changed after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub step: u64,
    pub export_volume: Units,
    pub market_deliveries: Units,
    pub unmet_demand: Units,
    pub backlog: Units,
    pub in_transit: Units,
    pub transport_cost: f64,
    /// Units moved by every agent this step, exports and market draws alike.
    pub routed_units: Units,
    /// Sum of units times path lead time over `routed_units`.
    pub lead_time_units: u64,
    pub avg_lead_time: f64,
    pub anomalies: u32,
    pub disruptions_emitted: u32,
    pub disruptions: Vec<DisruptionImpact>,
}

impl MetricsRecord {
    pub fn capacity_removed(&self) -> Units {
        self.disruptions.iter().map(|d| d.capacity_removed).sum()
    }

    pub fn is_disrupted(&self) -> bool {
        !self.disruptions.is_empty()
    }
}

/// Running totals over every recorded step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub steps: u64,
    pub export_volume: Units,
    pub market_deliveries: Units,
    pub unmet_demand: Units,
    pub transport_cost: f64,
    pub anomalies: u64,
}

/// Append-only log of records, shareable across threads.
///
/// Clones share the same log, so a handle taken before `run` can be polled
/// from elsewhere while the engine is still going.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    records: Vec<MetricsRecord>,
    totals: RunTotals,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
        }
    }

    pub fn record(&self, record: MetricsRecord) {
        let mut inner = self.inner.write();
        inner.totals.steps += 1;
        inner.totals.export_volume += record.export_volume;
        inner.totals.market_deliveries += record.market_deliveries;
        inner.totals.unmet_demand += record.unmet_demand;
        inner.totals.transport_cost += record.transport_cost;
        inner.totals.anomalies += u64::from(record.anomalies);
        inner.records.push(record);
    }

    pub fn get_records(&self) -> Vec<MetricsRecord> {
        self.inner.read().records.clone()
    }

    pub fn latest(&self) -> Option<MetricsRecord> {
        self.inner.read().records.last().cloned()
    }

    pub fn totals(&self) -> RunTotals {
        self.inner.read().totals.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn sample_record(step: u64, export_volume: Units, unmet_demand: Units) -> MetricsRecord {
    MetricsRecord {
        step,
        export_volume,
        market_deliveries: 0,
        unmet_demand,
        backlog: 0,
        in_transit: 0,
        transport_cost: export_volume as f64,
        routed_units: export_volume,
        lead_time_units: export_volume,
        avg_lead_time: 1.0,
        anomalies: 0,
        disruptions_emitted: 0,
        disruptions: Vec::new(),
    }
}
