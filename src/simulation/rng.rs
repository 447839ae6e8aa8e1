use crate::agents::AgentId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// splitmix64 finalizer
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// The random stream an agent uses during one step.
///
/// Depends only on (run seed, agent, step), so no agent's draws can shift
/// another's, whatever order they run in.
pub fn agent_stream(seed: u64, agent: AgentId, step: u64) -> ChaCha8Rng {
    let key = mix(mix(mix(seed) ^ u64::from(agent.get())) ^ step);
    ChaCha8Rng::seed_from_u64(key)
}

/// Stream for work outside the step loop, e.g. network generation.
pub fn run_stream(seed: u64, label: &str) -> ChaCha8Rng {
    let key = label.bytes().fold(mix(seed), |acc, b| mix(acc ^ u64::from(b)));
    ChaCha8Rng::seed_from_u64(key)
}
