use super::Units;
use crate::disruption::DisruptionId;

// Guards against 100 * 0.7 landing on 69.999...
const CAPACITY_EPSILON: f64 = 1e-9;

/// `nominal * factor` rounded down, never above `nominal`.
///
/// Capacities past 2^53 can round up on the way through f64.
pub fn scale(nominal: Units, factor: f64) -> Units {
    let scaled = (nominal as f64 * factor + CAPACITY_EPSILON).floor().max(0.0) as Units;
    scaled.min(nominal)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Effect {
    event: DisruptionId,
    factor: f64,
    expires_at: u64,
}

/// Disruption factors currently acting on one node or edge.
///
/// The multiplier is always recomputed from the remaining factors, so an
/// element with nothing active reads back exactly 1.0.
#[derive(Debug, Clone, Default)]
pub struct Degradation {
    effects: Vec<Effect>,
}

impl Degradation {
    pub fn push(&mut self, event: DisruptionId, magnitude: f64, expires_at: u64) {
        let factor = (1.0 - magnitude).clamp(0.0, 1.0);
        self.effects.push(Effect { event, factor, expires_at });
        self.effects.sort_by_key(|e| e.event);
    }

    pub fn multiplier(&self) -> f64 {
        self.effects.iter().fold(1.0, |acc, e| acc * e.factor)
    }

    pub fn apply(&self, nominal: Units) -> Units {
        if self.effects.is_empty() {
            return nominal;
        }
        scale(nominal, self.multiplier())
    }

    /// Drops every effect whose window has ended at `step`.
    pub fn expire(&mut self, step: u64) -> usize {
        let before = self.effects.len();
        self.effects.retain(|e| e.expires_at > step);
        before - self.effects.len()
    }

    pub fn is_degraded(&self) -> bool {
        !self.effects.is_empty()
    }

    pub fn factor_of(&self, event: DisruptionId) -> Option<f64> {
        self.effects.iter().find(|e| e.event == event).map(|e| e.factor)
    }
}
