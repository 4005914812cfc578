//! Weighted random selection of tasks.
//!
//! Each time a user is ready to do something, one task is picked at random with a
//! probability proportional to its weight. With weights of 10, 2 and 5, the first
//! task is picked 10 out of every 17 times on average, the second 2 out of 17 and
//! the third 5 out of 17.

use rand::Rng;

use crate::LoadTestError;

/// A discrete weighted distribution over the indexes `0..weights.len()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedSampler {
    /// Running totals of all weights, the last entry being the sum of all weights.
    cumulative_weights: Vec<usize>,
}
impl WeightedSampler {
    /// Build a sampler from a list of weights.
    ///
    /// Every weight must be at least 1, and at least one weight is required.
    ///
    /// # Example
    /// ```rust
    /// use shelfware_loadtest::sampler::WeightedSampler;
    ///
    /// let sampler = WeightedSampler::new(&[10, 2, 5]).unwrap();
    /// assert_eq!(sampler.total_weight(), 17);
    /// assert!(WeightedSampler::new(&[10, 0]).is_err());
    /// assert!(WeightedSampler::new(&[]).is_err());
    /// ```
    pub fn new(weights: &[usize]) -> Result<Self, LoadTestError> {
        if weights.is_empty() {
            return Err(LoadTestError::NoTasks {
                detail: "Can not sample from an empty set of weights.".to_string(),
            });
        }

        let mut cumulative_weights = Vec::with_capacity(weights.len());
        let mut total: usize = 0;
        for weight in weights {
            if *weight < 1 {
                return Err(LoadTestError::InvalidWeight {
                    weight: *weight,
                    detail: "Weight must be set to at least 1.".to_string(),
                });
            }
            total = total
                .checked_add(*weight)
                .ok_or_else(|| LoadTestError::InvalidWeight {
                    weight: *weight,
                    detail: "Sum of all weights overflows.".to_string(),
                })?;
            cumulative_weights.push(total);
        }
        trace!("cumulative weights: {:?}", cumulative_weights);

        Ok(WeightedSampler { cumulative_weights })
    }

    /// The sum of all weights.
    pub fn total_weight(&self) -> usize {
        // Never empty, `new` rejects an empty set of weights.
        self.cumulative_weights.last().copied().unwrap_or(0)
    }

    /// The number of entries the sampler picks from.
    pub fn len(&self) -> usize {
        self.cumulative_weights.len()
    }

    /// Always `false`, a sampler can't be built without weights.
    pub fn is_empty(&self) -> bool {
        self.cumulative_weights.is_empty()
    }

    /// Pick an index, each with a probability of its weight divided by the total weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let point = rng.random_range(0..self.total_weight());
        // First running total that is strictly larger than the random point.
        self.cumulative_weights
            .partition_point(|&cumulative| cumulative <= point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn invalid_weights() {
        match WeightedSampler::new(&[]) {
            Err(LoadTestError::NoTasks { .. }) => (),
            other => panic!("expected NoTasks, got {:?}", other),
        }
        match WeightedSampler::new(&[3, 0, 1]) {
            Err(LoadTestError::InvalidWeight { weight, .. }) => assert_eq!(weight, 0),
            other => panic!("expected InvalidWeight, got {:?}", other),
        }
        assert!(WeightedSampler::new(&[usize::MAX, 1]).is_err());
    }

    #[test]
    fn sampler_size() {
        let sampler = WeightedSampler::new(&[10, 2, 5]).unwrap();
        assert_eq!(sampler.len(), 3);
        assert!(!sampler.is_empty());
        assert_eq!(sampler.total_weight(), 17);
    }

    #[test]
    fn single_weight_always_selected() {
        let sampler = WeightedSampler::new(&[7]).unwrap();
        assert_eq!(sampler.len(), 1);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sampler.sample(&mut rng), 0);
        }
    }

    #[test]
    fn every_index_reachable() {
        let sampler = WeightedSampler::new(&[1, 1, 1, 1]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 4];
        for _ in 0..1_000 {
            seen[sampler.sample(&mut rng)] = true;
        }
        assert_eq!(seen, [true; 4]);
    }

    #[test]
    fn frequencies_converge_to_weights() {
        let weights = [10, 2, 5];
        let sampler = WeightedSampler::new(&weights).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let cycles = 170_000;
        let mut counts = [0usize; 3];
        for _ in 0..cycles {
            counts[sampler.sample(&mut rng)] += 1;
        }

        for (index, weight) in weights.iter().enumerate() {
            let expected = *weight as f64 / 17.0;
            let observed = counts[index] as f64 / cycles as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "index {}: observed {:.4}, expected {:.4}",
                index,
                observed,
                expected
            );
        }
    }

    #[test]
    fn two_task_profile() {
        let sampler = WeightedSampler::new(&[10, 2]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let cycles = 120_000;
        let root = (0..cycles).filter(|_| sampler.sample(&mut rng) == 0).count();
        let observed = root as f64 / cycles as f64;
        assert!((observed - 10.0 / 12.0).abs() < 0.01, "observed {:.4}", observed);
    }
}
