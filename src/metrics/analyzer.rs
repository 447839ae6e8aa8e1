use super::MetricsRecord;
use crate::network::Units;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// A step counts as recovered once volume is back to this share of the calm average
const RECOVERY_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub simulation_name: String,
    pub random_seed: u64,
    pub total_steps: u64,
    pub total_export_volume: Units,
    pub total_market_deliveries: Units,
    pub total_unmet_demand: Units,
    pub service_level: f64,
    pub avg_lead_time: f64,
    pub total_transport_cost: f64,
    pub cost_per_unit: f64,
    pub peak_backlog: Units,
    pub disrupted_steps: u64,
    pub avg_volume_undisrupted: f64,
    pub avg_volume_disrupted: f64,
    pub recovery_steps: Option<u64>,
    pub anomalies: u64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u64), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

pub fn analyze(records: &[MetricsRecord], simulation_name: &str, random_seed: u64) -> AnalysisReport {
    let total_export_volume: Units = records.iter().map(|r| r.export_volume).sum();
    let total_unmet_demand: Units = records.iter().map(|r| r.unmet_demand).sum();
    let total_transport_cost: f64 = records.iter().map(|r| r.transport_cost).sum();

    let service_level = match total_export_volume + total_unmet_demand {
        0 => 1.0,
        wanted => total_export_volume as f64 / wanted as f64,
    };

    // Cost and lead time cover every routed unit, market draws included
    let total_routed: Units = records.iter().map(|r| r.routed_units).sum();
    let total_lead_time_units: u64 = records.iter().map(|r| r.lead_time_units).sum();
    let per_routed_unit = |total: f64| if total_routed > 0 { total / total_routed as f64 } else { 0.0 };

    let avg_volume_undisrupted = mean(records.iter().filter(|r| !r.is_disrupted()).map(|r| r.export_volume as f64));
    let avg_volume_disrupted = mean(records.iter().filter(|r| r.is_disrupted()).map(|r| r.export_volume as f64));

    AnalysisReport {
        simulation_name: simulation_name.to_string(),
        random_seed,
        total_steps: records.len() as u64,
        total_export_volume,
        total_market_deliveries: records.iter().map(|r| r.market_deliveries).sum(),
        total_unmet_demand,
        service_level,
        avg_lead_time: per_routed_unit(total_lead_time_units as f64),
        total_transport_cost,
        cost_per_unit: per_routed_unit(total_transport_cost),
        peak_backlog: records.iter().map(|r| r.backlog).max().unwrap_or(0),
        disrupted_steps: records.iter().filter(|r| r.is_disrupted()).count() as u64,
        avg_volume_undisrupted,
        avg_volume_disrupted,
        recovery_steps: recovery_steps(records, avg_volume_undisrupted),
        anomalies: records.iter().map(|r| u64::from(r.anomalies)).sum(),
    }
}

/// Steps from the end of the last disrupted stretch until export volume is
/// back near the undisrupted average. `None` when nothing was disrupted or
/// the run ended before volume recovered.
fn recovery_steps(records: &[MetricsRecord], baseline: f64) -> Option<u64> {
    let last_disrupted = records.iter().rposition(|r| r.is_disrupted())?;
    records[last_disrupted + 1..]
        .iter()
        .position(|r| r.export_volume as f64 >= baseline * RECOVERY_THRESHOLD)
        .map(|p| p as u64 + 1)
}

pub fn save_report(report: &AnalysisReport, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

pub fn load_report(path: impl AsRef<Path>) -> Result<AnalysisReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
