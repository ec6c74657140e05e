//! Segment length planning for per-channel decimation
//!
//! Every channel must see a whole number of decimated samples per segment,
//! so the segment length is rounded up to a multiple of the least common
//! multiple of all decimation factors.

use crate::error::ConfigError;
use crate::protocol::segment_bytes;

/// Result of planning a session's segment length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationPlan {
    /// Least common multiple of all decimation factors
    pub quantum: usize,
    /// Requested samples per channel per segment
    pub nominal_length: usize,
    /// Effective samples per channel per segment, a multiple of `quantum`
    pub segment_length: usize,
}

impl DecimationPlan {
    /// Decimated samples a channel contributes to one full segment
    pub fn samples_for(&self, decimation: u32) -> usize {
        self.segment_length / decimation as usize
    }

    /// Raw segment size for `channels` interleaved channels
    pub fn segment_bytes(&self, channels: usize) -> usize {
        segment_bytes(self.segment_length, channels)
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: usize, b: usize) -> Option<usize> {
    (a / gcd(a, b)).checked_mul(b)
}

/// Compute the decimation quantum and effective segment length
pub fn plan(decimations: &[u32], nominal_length: usize) -> Result<DecimationPlan, ConfigError> {
    if decimations.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    if nominal_length == 0 {
        return Err(ConfigError::InvalidSegmentLength);
    }

    let mut quantum = 1usize;
    for (channel, &factor) in decimations.iter().enumerate() {
        if factor == 0 {
            return Err(ConfigError::InvalidDecimation { channel, factor });
        }
        quantum = lcm(quantum, factor as usize)
            .ok_or_else(|| ConfigError::QuantumOverflow(decimations.to_vec()))?;
    }

    let segment_length = nominal_length
        .div_ceil(quantum)
        .checked_mul(quantum)
        .ok_or_else(|| ConfigError::QuantumOverflow(decimations.to_vec()))?;

    Ok(DecimationPlan {
        quantum,
        nominal_length,
        segment_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_rounds_up_to_quantum() {
        let plan = plan(&[1, 3, 4], 8000).unwrap();
        assert_eq!(plan.quantum, 12);
        assert_eq!(plan.segment_length, 8004);
        assert_eq!(plan.samples_for(3), 2668);
        assert_eq!(plan.samples_for(4), 2001);
    }

    #[test]
    fn test_plan_keeps_exact_multiple() {
        let plan = plan(&[1, 2, 4, 8], 8000).unwrap();
        assert_eq!(plan.quantum, 8);
        assert_eq!(plan.segment_length, 8000);
    }

    #[test]
    fn test_plan_segment_bytes() {
        let plan = plan(&[1; 32], 8000).unwrap();
        assert_eq!(plan.segment_bytes(32), 8000 * 32 * 2);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        assert_eq!(plan(&[], 100), Err(ConfigError::NoChannels));
        assert_eq!(
            plan(&[1, 0, 2], 100),
            Err(ConfigError::InvalidDecimation { channel: 1, factor: 0 })
        );
        assert_eq!(plan(&[1], 0), Err(ConfigError::InvalidSegmentLength));
    }

    #[test]
    fn test_plan_detects_overflow() {
        let primes = [4_294_967_291u32, 4_294_967_279, 4_294_967_231, 4_294_967_197];
        assert!(matches!(
            plan(&primes, 1),
            Err(ConfigError::QuantumOverflow(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_segment_length_is_smallest_quantum_multiple(
            decimations in prop::collection::vec(1u32..=16, 1..12),
            nominal in 1usize..100_000,
        ) {
            let plan = plan(&decimations, nominal).unwrap();
            for &d in &decimations {
                prop_assert_eq!(plan.quantum % d as usize, 0);
                prop_assert_eq!(plan.segment_length % d as usize, 0);
            }
            prop_assert_eq!(plan.segment_length % plan.quantum, 0);
            prop_assert!(plan.segment_length >= nominal);
            prop_assert!(plan.segment_length - nominal < plan.quantum);
        }
    }
}
