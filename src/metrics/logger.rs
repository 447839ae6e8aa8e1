use super::MetricsRecord;
use crate::network::Units;
use anyhow::Result;
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// One CSV line. Disruption impacts are folded into counts since csv rows are flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub step: u64,
    pub export_volume: Units,
    pub market_deliveries: Units,
    pub unmet_demand: Units,
    pub backlog: Units,
    pub in_transit: Units,
    pub transport_cost: f64,
    pub routed_units: Units,
    pub avg_lead_time: f64,
    pub anomalies: u32,
    pub active_disruptions: usize,
    pub capacity_removed: Units,
}

impl From<&MetricsRecord> for MetricsRow {
    fn from(r: &MetricsRecord) -> Self {
        Self {
            step: r.step,
            export_volume: r.export_volume,
            market_deliveries: r.market_deliveries,
            unmet_demand: r.unmet_demand,
            backlog: r.backlog,
            in_transit: r.in_transit,
            transport_cost: r.transport_cost,
            routed_units: r.routed_units,
            avg_lead_time: r.avg_lead_time,
            anomalies: r.anomalies,
            active_disruptions: r.disruptions.len(),
            capacity_removed: r.capacity_removed(),
        }
    }
}

pub struct MetricsLogger {
    writer: Writer<File>,
}

impl MetricsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log(&mut self, record: &MetricsRecord) -> Result<()> {
        self.writer.serialize(MetricsRow::from(record))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_batch(&mut self, records: &[MetricsRecord]) -> Result<()> {
        for record in records {
            self.writer.serialize(MetricsRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<MetricsRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<MetricsRow>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sample_record;

    #[test]
    fn writes_one_row_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");

        let mut logger = MetricsLogger::new(&path).unwrap();
        logger.log_batch(&[sample_record(0, 100, 0), sample_record(1, 50, 50)]).unwrap();
        logger.log(&sample_record(2, 100, 0)).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].unmet_demand, 50);
        assert_eq!(rows[2].step, 2);
    }
}
