use rand::{rngs::StdRng, Rng};

/// Samples an action index from a given policy distribution using a random number generator.
///
/// This function performs a weighted random selection, where actions with higher
/// policy probabilities are more likely to be chosen.
///
/// # Parameters
/// - `policy`: A slice representing the probability distribution over actions.
///             The sum of probabilities should ideally be 1.0.
/// - `rng`: A mutable reference to a `StdRng` instance. This allows for
///          reproducible sampling if the RNG is seeded.
///
/// # Returns
/// The index of the sampled action. Floating point leftovers fall on the last
/// action with a non-zero probability, so an impossible action is never returned.
pub fn sample(policy: &[f64], rng: &mut StdRng) -> usize {
    let mut random: f64 = rng.random();

    policy
        .iter()
        .position(|&x| {
            random -= x;
            x > 0.0 && random <= 0.
        })
        .or_else(|| policy.iter().rposition(|&x| x > 0.0))
        .unwrap_or(policy.len().saturating_sub(1))
}

/// Turns visit counts into the distribution `visits^(1/temperature)`, normalized.
///
/// Counts are first divided by their maximum so that small temperatures do not
/// overflow. A temperature of `0` puts all the mass on the first most visited
/// action.
///
/// # Returns
/// An all-zero array when no action was visited.
pub fn temperature_distribution<const N: usize>(visits: &[usize; N], temperature: f64) -> [f64; N] {
    let max = visits.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return [0.0; N];
    }

    if temperature == 0.0 {
        let best = visits.iter().position(|&v| v == max).unwrap_or(0);
        return std::array::from_fn(|i| if i == best { 1.0 } else { 0.0 });
    }

    let exponent = 1.0 / temperature;
    let weights: [f64; N] =
        visits.map(|v| if v == 0 { 0.0 } else { (v as f64 / max as f64).powf(exponent) });
    let total: f64 = weights.iter().sum();

    weights.map(|w| w / total)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::test_utils::compare_array;

    #[test]
    fn test_sample_never_picks_zero_probability() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let action = sample(&[0.0, 0.3, 0.0, 0.7], &mut rng);
            assert!(action == 1 || action == 3);
        }
    }

    #[test]
    fn test_sample_is_reproducible() {
        let policy = [0.1, 0.2, 0.3, 0.4];
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);

        let first: Vec<usize> = (0..20).map(|_| sample(&policy, &mut a)).collect();
        let second: Vec<usize> = (0..20).map(|_| sample(&policy, &mut b)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_temperature_one_is_proportional() {
        let distribution = temperature_distribution(&[1, 3, 0, 4], 1.0);
        assert!(compare_array(&distribution, &[0.125, 0.375, 0.0, 0.5]));
    }

    #[test]
    fn test_temperature_zero_is_argmax_first() {
        let distribution = temperature_distribution(&[5, 7, 7, 1], 0.0);
        assert_eq!(distribution, [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_small_temperature_does_not_overflow() {
        let distribution = temperature_distribution(&[500, 1000, 0], 0.01);
        assert!(distribution.iter().all(|p| p.is_finite()));
        assert!((distribution[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_two_flattens() {
        let distribution = temperature_distribution(&[1, 4], 2.0);
        assert!(compare_array(&distribution, &[1.0 / 3.0, 2.0 / 3.0]));
    }

    #[test]
    fn test_no_visit() {
        assert_eq!(temperature_distribution(&[0, 0, 0], 1.0), [0.0; 3]);
    }
}
