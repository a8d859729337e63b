//! Channel weights and their refinement.
use crate::core::error::Error;
use crate::core::to_float;
use log::warn;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// The channel weights of one iteration together with the variance contributions observed with
/// them and the channels whose weight was clipped to the minimal weight.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChannelWeightInfo<T> {
    weights: Vec<T>,
    variances: Vec<T>,
    minimal: Vec<bool>,
}

impl<T: Float> ChannelWeightInfo<T> {
    /// Constructor. The `weights` must be non-negative, finite and sum to one.
    pub fn new(weights: Vec<T>) -> Result<Self, Error> {
        check_weights(&weights)?;

        let channels = weights.len();

        Ok(Self {
            weights,
            variances: vec![T::zero(); channels],
            minimal: vec![false; channels],
        })
    }

    /// Constructor for equal weights of all `channels`.
    pub fn uniform(channels: usize) -> Result<Self, Error> {
        if channels == 0 {
            return Err(Error::InvalidConfig("there are no channels".to_string()));
        }

        Self::new(vec![T::one() / to_float(channels); channels])
    }

    pub(crate) fn with_variances(mut self, variances: Vec<T>) -> Self {
        debug_assert_eq!(variances.len(), self.weights.len());
        self.variances = variances;
        self
    }

    /// Returns the weight of every channel.
    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// Returns the variance contribution $W_i$ of every channel; zero before an iteration was
    /// run with these weights.
    pub fn variances(&self) -> &[T] {
        &self.variances
    }

    /// Returns the indices of the channels whose weight is the minimal weight.
    pub fn minimal_weight_channels(&self) -> Vec<usize> {
        self.minimal
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns the number of channels whose weight is the minimal weight.
    pub fn minimal_weight_count(&self) -> usize {
        self.minimal.iter().filter(|&&m| m).count()
    }

    /// Returns the largest difference between the variance contributions of two channels with
    /// non-zero weight. For optimal weights all contributions are equal and this is zero.
    pub fn max_difference(&self) -> T {
        let mut active = self
            .weights
            .iter()
            .zip(&self.variances)
            .filter(|(w, _)| **w > T::zero())
            .map(|(_, &v)| v);

        match active.next() {
            Some(first) => {
                let (min, max) = active.fold((first, first), |(min, max), v| {
                    (min.min(v), max.max(v))
                });
                max - min
            }
            None => T::zero(),
        }
    }

    /// Returns the weights for the next iteration, see [`refine_weights`].
    pub fn refine(&self, min_weight: T, beta: T) -> Self {
        let (weights, minimal) = refine_weights(&self.weights, &self.variances, min_weight, beta);

        Self {
            variances: vec![T::zero(); weights.len()],
            weights,
            minimal,
        }
    }
}

/// Computes new channel weights $\alpha_i' \propto \alpha_i W_i^\beta$ from the current
/// `weights` $\alpha_i$ and the variance contributions $W_i$. With $\beta = 1/2$ this minimizes
/// the variance of the multi-channel estimator.
///
/// Channels whose new weight would fall below `min_weight` get exactly `min_weight` and are
/// reported in the second return value; the remaining weight is distributed among the other
/// channels, so that the new weights sum to one. Non-finite contributions count as zero; if all
/// contributions vanish the weights are kept.
pub fn refine_weights<T: Float>(
    weights: &[T],
    variances: &[T],
    min_weight: T,
    beta: T,
) -> (Vec<T>, Vec<bool>) {
    let channels = weights.len();

    let mut raw: Vec<_> = weights
        .iter()
        .zip(variances)
        .map(|(&alpha, &w)| {
            let r = alpha * w.powf(beta);

            if r.is_finite() && r > T::zero() {
                r
            } else {
                T::zero()
            }
        })
        .collect();

    if raw.iter().all(|&r| r == T::zero()) {
        warn!("all channels have a vanishing variance contribution, keeping their weights");
        raw = weights.to_vec();
    }

    let mut minimal = vec![false; channels];

    // clip channels to the minimal weight until all remaining ones are above it
    let (mass, free_raw, free) = loop {
        let pinned = minimal.iter().filter(|&&m| m).count();
        let mass = T::one() - min_weight * to_float(pinned);
        let free_raw = (0..channels)
            .filter(|&i| !minimal[i])
            .fold(T::zero(), |acc, i| acc + raw[i]);
        let free = channels - pinned;

        let share = |i: usize| {
            if free_raw > T::zero() {
                raw[i] / free_raw * mass
            } else {
                mass / to_float(free)
            }
        };

        let mut changed = false;

        for i in 0..channels {
            if !minimal[i] && share(i) < min_weight {
                minimal[i] = true;
                changed = true;
            }
        }

        if !changed {
            break (mass, free_raw, free);
        }
    };

    if minimal.iter().any(|&m| m) {
        warn!(
            "{} of {} channels are clipped to the minimal weight",
            minimal.iter().filter(|&&m| m).count(),
            channels
        );
    }

    let refined = (0..channels)
        .map(|i| {
            if minimal[i] {
                min_weight
            } else if free_raw > T::zero() {
                raw[i] / free_raw * mass
            } else {
                mass / to_float(free)
            }
        })
        .collect();

    (refined, minimal)
}

pub(crate) fn check_weights<T: Float>(weights: &[T]) -> Result<(), Error> {
    if weights.is_empty() {
        return Err(Error::InvalidWeights("there are no weights".to_string()));
    }

    if let Some(i) = weights
        .iter()
        .position(|&w| !w.is_finite() || w < T::zero())
    {
        return Err(Error::InvalidWeights(format!(
            "the weight of channel {} is negative or not finite",
            i
        )));
    }

    let sum = weights.iter().fold(T::zero(), |acc, &w| acc + w);

    if (sum - T::one()).abs() > T::epsilon().sqrt() {
        return Err(Error::InvalidWeights(
            "the weights do not sum to one".to_string(),
        ));
    }

    Ok(())
}
