use super::{Agent, AgentId, AgentRole, StepContext};
use crate::disruption::{DisruptionEvent, DisruptionType, TargetScope};
use crate::error::{Result, SimError};
use crate::network::ElementRef;
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Distribution stochastic disruptions draw their magnitude from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum MagnitudeModel {
    Fixed { value: f64 },
    Uniform { min: f64, max: f64 },
    Beta { alpha: f64, beta: f64 },
}

impl Default for MagnitudeModel {
    fn default() -> Self {
        Self::Uniform { min: 0.2, max: 0.6 }
    }
}

impl MagnitudeModel {
    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            Self::Fixed { value } => (0.0..=1.0).contains(&value),
            Self::Uniform { min, max } => (0.0..=1.0).contains(&min) && (0.0..=1.0).contains(&max) && min <= max,
            Self::Beta { alpha, beta } => alpha > 0.0 && beta > 0.0 && alpha.is_finite() && beta.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::config(format!("invalid magnitude distribution {:?}", self)))
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let draw = match *self {
            Self::Fixed { value } => value,
            Self::Uniform { min, max } => rng.gen_range(min..=max),
            Self::Beta { alpha, beta } => match Beta::new(alpha, beta) {
                Ok(dist) => dist.sample(rng),
                Err(_) => alpha / (alpha + beta),
            },
        };
        draw.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisruptionPolicy {
    /// Emits `template` at its start step, then every `repeat_every` steps.
    Scheduled {
        template: DisruptionEvent,
        repeat_every: Option<u64>,
    },
    /// Each step, emits with `probability` a disruption of random size and length.
    Stochastic {
        disruption_type: DisruptionType,
        target: TargetScope,
        probability: f64,
        magnitude: MagnitudeModel,
        min_duration: u64,
        max_duration: u64,
    },
}

/// Injects disruptions into the schedule while the run is going.
#[derive(Debug, Clone)]
pub struct DisruptionAgent {
    id: AgentId,
    policy: DisruptionPolicy,
    emitted: u64,
}

impl DisruptionAgent {
    pub fn new(id: AgentId, policy: DisruptionPolicy) -> Self {
        Self { id, policy, emitted: 0 }
    }

    pub fn policy(&self) -> &DisruptionPolicy {
        &self.policy
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Target that must exist before the run starts.
    ///
    /// Scheduled templates and explicit element keys qualify. Stochastic
    /// selectors may match nothing on a given network.
    pub fn fixed_target(&self) -> Option<&TargetScope> {
        match &self.policy {
            DisruptionPolicy::Scheduled { template, .. } => Some(&template.target),
            DisruptionPolicy::Stochastic { target: target @ TargetScope::Elements { .. }, .. } => Some(target),
            DisruptionPolicy::Stochastic { .. } => None,
        }
    }

    fn next_event<R: Rng>(&self, step: u64, rng: &mut R) -> Option<DisruptionEvent> {
        match &self.policy {
            DisruptionPolicy::Scheduled { template, repeat_every } => {
                let start = template.start_step;
                let due = step == start
                    || matches!(repeat_every, Some(every) if *every > 0 && step > start && (step - start) % every == 0);
                due.then(|| DisruptionEvent { start_step: step, ..template.clone() })
            }
            DisruptionPolicy::Stochastic {
                disruption_type,
                target,
                probability,
                magnitude,
                min_duration,
                max_duration,
            } => {
                if !rng.gen_bool(probability.clamp(0.0, 1.0)) {
                    return None;
                }
                let magnitude = magnitude.sample(rng);
                let duration = rng.gen_range(*min_duration..=*max_duration);
                Some(DisruptionEvent::new(*disruption_type, magnitude, duration, target.clone(), step))
            }
        }
    }
}

impl Agent for DisruptionAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn role(&self) -> AgentRole {
        AgentRole::Disruption
    }

    // Targets are resolved through the network when the event lands
    fn elements(&self) -> Vec<ElementRef> {
        Vec::new()
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) {
        let Some(event) = self.next_event(ctx.step, &mut ctx.rng) else {
            return;
        };

        match ctx.schedule.enqueue(event, ctx.step) {
            Ok(id) => {
                self.emitted += 1;
                ctx.report.disruptions_emitted += 1;
                info!("{} emitted disruption {} at step {}", self.id, id, ctx.step);
            }
            Err(e) => ctx.report.anomaly(self.id, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::rng::agent_stream;

    fn scheduled(start: u64, repeat_every: Option<u64>) -> DisruptionAgent {
        let template = DisruptionEvent::new(DisruptionType::PolicyChange, 0.4, 2, TargetScope::node("P"), start);
        DisruptionAgent::new(AgentId::new(0), DisruptionPolicy::Scheduled { template, repeat_every })
    }

    fn firing_steps(agent: &DisruptionAgent, steps: u64) -> Vec<u64> {
        (0..steps)
            .filter(|&s| agent.next_event(s, &mut agent_stream(3, agent.id(), s)).is_some())
            .collect()
    }

    #[test]
    fn scheduled_fires_once_without_repeat() {
        assert_eq!(firing_steps(&scheduled(3, None), 20), vec![3]);
    }

    #[test]
    fn scheduled_repeats() {
        assert_eq!(firing_steps(&scheduled(2, Some(5)), 20), vec![2, 7, 12, 17]);
    }

    #[test]
    fn stochastic_draws_stay_in_range() {
        let agent = DisruptionAgent::new(AgentId::new(1), DisruptionPolicy::Stochastic {
            disruption_type: DisruptionType::NaturalDisaster,
            target: TargetScope::region("Dhaka"),
            probability: 1.0,
            magnitude: MagnitudeModel::Beta { alpha: 2.0, beta: 5.0 },
            min_duration: 2,
            max_duration: 4,
        });
        for step in 0..50 {
            let event = agent.next_event(step, &mut agent_stream(9, agent.id(), step)).unwrap();
            assert!((0.0..=1.0).contains(&event.magnitude));
            assert!((2..=4).contains(&event.duration));
            assert_eq!(event.start_step, step);
        }
    }

    #[test]
    fn zero_probability_never_fires() {
        let agent = DisruptionAgent::new(AgentId::new(1), DisruptionPolicy::Stochastic {
            disruption_type: DisruptionType::EnergyCrisis,
            target: TargetScope::region("Dhaka"),
            probability: 0.0,
            magnitude: MagnitudeModel::default(),
            min_duration: 1,
            max_duration: 1,
        });
        assert!(firing_steps(&agent, 100).is_empty());
    }

    #[test]
    fn magnitude_model_validation() {
        assert!(MagnitudeModel::Uniform { min: 0.7, max: 0.2 }.validate().is_err());
        assert!(MagnitudeModel::Beta { alpha: 0.0, beta: 1.0 }.validate().is_err());
        assert!(MagnitudeModel::Fixed { value: 0.5 }.validate().is_ok());
    }
}
