//! Multi-channel integrator
//!
//! The integration domain is covered by several channels, each mapping the unit hypercube onto
//! the domain with its own density $g_i$. Points are sampled from the weighted sum
//! $g = \sum_i \alpha_i g_i$: every channel generates a share of the calls proportional to its
//! weight $\alpha_i$, and a point generated by channel $i$ contributes
//! $\alpha_i f / g$ to the estimate of channel $i$. The integral is the sum of the channel
//! estimates. After every iteration the weights are refined to reduce the variance.
mod map;
mod weights;

pub use map::{
    allocate_calls, make_channel, required_calls, Channel, ChannelMap, ChannelMapSet, FnChannel,
};
pub use weights::{refine_weights, ChannelWeightInfo};

use super::log_iteration;
use crate::callbacks::Callback;
use crate::core::error::Error;
use crate::core::estimators::{BasicEstimators, Estimators, McEstimators};
use crate::core::{check_iterations, discard, split_calls, to_float, Checkpoint};
use crate::distributed::{ProcessGroup, Reduction, SingleProcess};
use crate::distributions::{DistributionParameters, Projector};

use num_traits::{Float, FromPrimitive};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A point generated by one of the channels.
#[derive(Clone, Copy, Debug)]
pub struct MultiChannelPoint<'a, T> {
    random: &'a [T],
    coordinates: &'a [T],
    channel: usize,
    densities: &'a [T],
    weight: T,
}

impl<'a, T: Copy> MultiChannelPoint<'a, T> {
    /// The random numbers the point was generated from.
    pub fn random_numbers(&self) -> &'a [T] {
        self.random
    }

    /// The coordinates of the point in the integration domain.
    pub fn coordinates(&self) -> &'a [T] {
        self.coordinates
    }

    /// The index of the channel that generated the point.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The density of every channel at this point. Channels with zero weight are not evaluated
    /// and have density zero.
    pub fn densities(&self) -> &'a [T] {
        self.densities
    }

    /// The inverse of the combined density $g$ at this point.
    pub fn weight(&self) -> T {
        self.weight
    }
}

/// Integrand trait for the multi-channel integrator.
pub trait MultiChannelIntegrand<T: Copy>: Send + Sync {
    /// The channels the points are generated with.
    type Map: ChannelMap<T>;

    /// Evaluates the integrand at the coordinates of `point`. The integrator divides the value by
    /// the combined density; values filled into `projector` are weighted in the same way.
    fn call(&self, point: &MultiChannelPoint<T>, projector: &mut Projector<T>) -> T;

    /// The number of coordinates the integrand expects.
    fn dim(&self) -> usize;

    /// Returns the channels.
    fn map(&self) -> &Self::Map;

    /// Definitions of the distributions that should be filled during the integration.
    fn distributions(&self) -> Vec<DistributionParameters<T>> {
        vec![]
    }
}

/// Parameters of the call allocation and the weight refinement.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MultiChannelConfig {
    /// Number of calls every channel receives regardless of its weight. Defaults to zero.
    pub min_calls_per_channel: usize,
    /// Weight below which a channel is clipped during refinement. Must not exceed one divided
    /// by the number of channels. Defaults to zero.
    pub min_weight: f64,
    /// Exponent $\beta$ of the weight refinement $\alpha_i' \propto \alpha_i W_i^\beta$.
    /// Defaults to 0.5.
    pub beta: f64,
}

impl Default for MultiChannelConfig {
    fn default() -> Self {
        Self {
            min_calls_per_channel: 0,
            min_weight: 0.0,
            beta: 0.5,
        }
    }
}

impl MultiChannelConfig {
    /// Validates the configuration for `channels` channels and returns `min_weight` and `beta`.
    fn parameters<T: FromPrimitive>(&self, channels: usize) -> Result<(T, T), Error> {
        if !self.min_weight.is_finite()
            || self.min_weight < 0.0
            || self.min_weight * channels as f64 > 1.0
        {
            return Err(Error::InvalidConfig(format!(
                "min_weight = {} is not in [0, 1/{}]",
                self.min_weight, channels
            )));
        }

        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "beta must be finite and non-negative, but is {}",
                self.beta
            )));
        }

        let convert = |x: f64| {
            T::from_f64(x)
                .ok_or_else(|| Error::InvalidConfig(format!("{} is not representable", x)))
        };

        Ok((convert(self.min_weight)?, convert(self.beta)?))
    }
}

/// Estimators of one multi-channel iteration: the estimators of every channel and the weights
/// they were obtained with.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MultiChannelEstimators<T> {
    channels: Vec<McEstimators<T>>,
    info: ChannelWeightInfo<T>,
}

impl<T: Float + FromPrimitive> MultiChannelEstimators<T> {
    /// Returns the estimators of every channel. Their means sum to the estimate of the
    /// iteration.
    pub fn channel_estimators(&self) -> &[McEstimators<T>] {
        &self.channels
    }

    /// Returns the weights of this iteration and the variance contributions observed with them.
    pub fn weight_info(&self) -> &ChannelWeightInfo<T> {
        &self.info
    }

    /// Returns the channel weights refined with the data of this iteration.
    pub fn next_weights(&self, config: &MultiChannelConfig) -> Result<Vec<T>, Error> {
        let (min_weight, beta) = config.parameters(self.channels.len())?;
        Ok(self.info.refine(min_weight, beta).weights().to_vec())
    }
}

impl<T: Float> BasicEstimators<T> for MultiChannelEstimators<T> {
    fn mean(&self) -> T {
        self.channels
            .iter()
            .fold(T::zero(), |acc, e| acc + e.mean())
    }

    fn var(&self) -> T {
        self.channels.iter().fold(T::zero(), |acc, e| acc + e.var())
    }
}

impl<T: Float> Estimators<T> for MultiChannelEstimators<T> {
    fn calls(&self) -> usize {
        self.channels.iter().map(Estimators::calls).sum()
    }

    fn non_finite_calls(&self) -> usize {
        self.channels.iter().map(Estimators::non_finite_calls).sum()
    }

    fn non_zero_calls(&self) -> usize {
        self.channels.iter().map(Estimators::non_zero_calls).sum()
    }
}

/// Checkpoint of the multi-channel integrator.
pub type MultiChannelCheckpoint<T, R> = Checkpoint<T, R, MultiChannelEstimators<T>>;

/// Performs a single iteration of integrating `integrand` with `calls` points, split among the
/// channels according to the weights in `info`. Each member of `group` evaluates its share of
/// the points; the returned checkpoint, which is the same on all members, contains the merged
/// result and the variance contributions of all channels.
pub fn iteration<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    calls: usize,
    info: &ChannelWeightInfo<T>,
    min_calls_per_channel: usize,
) -> Result<MultiChannelCheckpoint<T, R>, Error>
where
    T: Float + Send + Sync,
    R: Clone + Rng,
    I: MultiChannelIntegrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    let map = integrand.map();
    let (dim, channels) = (map.dim(), map.channels());
    let weights = info.weights();

    if weights.len() != channels {
        return Err(Error::DimensionMismatch {
            expected: channels,
            found: weights.len(),
        });
    }

    let counts = allocate_calls(weights, calls, min_calls_per_channel)?;
    let ends: Vec<usize> = counts
        .iter()
        .scan(0, |end, &c| {
            *end += c;
            Some(*end)
        })
        .collect();

    let (before, local_calls) = split_calls(group.rank(), group.size(), calls);

    let mut rng_local = rng.clone();
    discard::<T, _>(&mut rng_local, before * dim);

    let mut random = vec![T::zero(); dim];
    let mut coordinates = vec![T::zero(); map.map_dim()];
    let mut densities = vec![T::zero(); channels];
    let mut projector = Projector::new(&integrand.distributions());
    let mut estimators = vec![McEstimators::default(); channels];
    let mut variances = vec![T::zero(); channels];
    let total: T = to_float(calls);

    // calls are ordered by channel
    let mut channel = 0;

    for call in before..before + local_calls {
        while call >= ends[channel] {
            channel += 1;
        }

        random.iter_mut().for_each(|r| *r = rng_local.gen());

        let jacobian = map.map(channel, &random, &mut coordinates);

        for (j, density) in densities.iter_mut().enumerate() {
            *density = if j == channel {
                T::one() / jacobian
            } else if weights[j] == T::zero() {
                T::zero()
            } else {
                map.density(j, &coordinates)
            };
        }

        let g = weights
            .iter()
            .zip(&densities)
            .fold(T::zero(), |acc, (&alpha, &density)| acc + alpha * density);
        let alpha = weights[channel];

        projector.set_weight(if alpha == T::zero() {
            T::zero()
        } else {
            alpha * total / (to_float::<T>(counts[channel]) * g)
        });

        let point = MultiChannelPoint {
            random: &random,
            coordinates: &coordinates,
            channel,
            densities: &densities,
            weight: T::one() / g,
        };

        let value = integrand.call(&point, &mut projector);

        if value == T::zero() {
            estimators[channel].update(value);
            continue;
        }

        let ratio = value / g;

        estimators[channel].update(if alpha == T::zero() {
            T::zero()
        } else {
            alpha * ratio
        });

        let square = ratio * ratio;

        if square.is_finite() {
            variances[channel] = variances[channel] + square;
        }
    }

    let mut reduction = Reduction::new();
    estimators.iter().for_each(|e| e.push_into(&mut reduction));
    reduction.push_values(&variances);
    projector.push_into(&mut reduction);

    group.all_reduce(&mut reduction)?;

    let estimators: Vec<_> = (0..channels)
        .map(|_| McEstimators::pop_from(&mut reduction))
        .collect();
    let variances = reduction
        .next_values(channels)
        .into_iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            if count == 0 {
                T::zero()
            } else {
                sum / to_float(count)
            }
        })
        .collect();
    projector.pop_from(&mut reduction);

    discard::<T, _>(&mut rng_local, (calls - before - local_calls) * dim);

    Ok(Checkpoint::new(
        rng.clone(),
        rng_local,
        MultiChannelEstimators {
            channels: estimators,
            info: info.clone().with_variances(variances),
        },
        projector.into_results(calls),
    ))
}

/// Integrates `integrand` cooperatively on all members of `group` with the multi-channel
/// algorithm.
///
/// The first iteration uses the channel `weights`, or equal weights if `weights` is `None`;
/// every following iteration uses the weights refined with the data of the previous one. The
/// number of calls per iteration is given by `iterations` and `callback` is invoked after every
/// iteration.
pub fn distributed_integrate<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    callback: &impl Callback<T, R, MultiChannelEstimators<T>>,
    iterations: &[usize],
    config: &MultiChannelConfig,
    weights: Option<Vec<T>>,
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: MultiChannelIntegrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    check_iterations(iterations)?;

    let map = integrand.map();
    let channels = map.channels();

    if channels == 0 {
        return Err(Error::InvalidConfig("there are no channels".to_string()));
    }

    if map.dim() == 0 {
        return Err(Error::InvalidConfig(
            "the channels use zero random numbers".to_string(),
        ));
    }

    if integrand.dim() != map.map_dim() {
        return Err(Error::DimensionMismatch {
            expected: integrand.dim(),
            found: map.map_dim(),
        });
    }

    let (min_weight, beta) = config.parameters::<T>(channels)?;

    let mut info = match weights {
        Some(weights) if weights.len() != channels => {
            return Err(Error::DimensionMismatch {
                expected: channels,
                found: weights.len(),
            })
        }
        Some(weights) => ChannelWeightInfo::new(weights)?,
        None => ChannelWeightInfo::uniform(channels)?,
    };

    // with a minimal weight every channel has a positive weight after the first refinement
    let required = if min_weight > T::zero() {
        config.min_calls_per_channel.max(1) * channels
    } else {
        required_calls(info.weights(), config.min_calls_per_channel)
    };

    if let Some(&calls) = iterations.iter().find(|&&calls| calls < required) {
        return Err(Error::TooFewCalls { calls, required });
    }

    let mut checkpoints: Vec<MultiChannelCheckpoint<T, R>> =
        Vec::with_capacity(iterations.len());
    let mut rng = rng.clone();

    for &calls in iterations {
        if let Some(last) = checkpoints.last() {
            info = last.estimators().weight_info().refine(min_weight, beta);
        }

        let checkpoint = iteration(
            group,
            integrand,
            &rng,
            calls,
            &info,
            config.min_calls_per_channel,
        )?;
        rng = checkpoint.rng_after().clone();

        log_iteration(checkpoints.len(), checkpoint.estimators());
        checkpoints.push(checkpoint);
        callback.print(&checkpoints);
    }

    Ok(checkpoints)
}

/// Integrates `integrand` in the calling process. See [`distributed_integrate`].
pub fn integrate<T, R, I>(
    integrand: &I,
    rng: &R,
    callback: &impl Callback<T, R, MultiChannelEstimators<T>>,
    iterations: &[usize],
    config: &MultiChannelConfig,
    weights: Option<Vec<T>>,
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: MultiChannelIntegrand<T>,
    Standard: Distribution<T>,
{
    distributed_integrate(
        &SingleProcess,
        integrand,
        rng,
        callback,
        iterations,
        config,
        weights,
    )
}

/// Continues an integration after `checkpoint` on all members of `group`: the generator and the
/// refined channel weights are taken from the checkpoint.
pub fn distributed_resume<T, R, I, G>(
    group: &G,
    integrand: &I,
    checkpoint: &MultiChannelCheckpoint<T, R>,
    callback: &impl Callback<T, R, MultiChannelEstimators<T>>,
    iterations: &[usize],
    config: &MultiChannelConfig,
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: MultiChannelIntegrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    let weights = checkpoint.estimators().next_weights(config)?;

    distributed_integrate(
        group,
        integrand,
        checkpoint.rng_after(),
        callback,
        iterations,
        config,
        Some(weights),
    )
}

/// Continues an integration after `checkpoint` in the calling process. See
/// [`distributed_resume`].
pub fn resume<T, R, I>(
    integrand: &I,
    checkpoint: &MultiChannelCheckpoint<T, R>,
    callback: &impl Callback<T, R, MultiChannelEstimators<T>>,
    iterations: &[usize],
    config: &MultiChannelConfig,
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: MultiChannelIntegrand<T>,
    Standard: Distribution<T>,
{
    distributed_resume(
        &SingleProcess,
        integrand,
        checkpoint,
        callback,
        iterations,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::SinkCallback;
    use crate::integrands::make_multi_channel_integrand;
    use assert_approx_eq::assert_approx_eq;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
    }

    /// Channel 0 covers [0, 1/2), channel 1 covers [1/2, 1).
    fn halves() -> ChannelMapSet<f64> {
        ChannelMapSet::new(1, 1)
            .with_channel(make_channel(
                |r: &[f64], x: &mut [f64]| {
                    x[0] = 0.5 * r[0];
                    0.5
                },
                |x: &[f64]| if x[0] < 0.5 { 2.0 } else { 0.0 },
            ))
            .with_channel(make_channel(
                |r: &[f64], x: &mut [f64]| {
                    x[0] = 0.5 + 0.5 * r[0];
                    0.5
                },
                |x: &[f64]| if x[0] >= 0.5 { 2.0 } else { 0.0 },
            ))
    }

    #[test]
    fn config_is_validated() {
        let integrand = make_multi_channel_integrand(1, halves(), |_: &[f64]| 1.0);

        for config in &[
            MultiChannelConfig {
                min_weight: 0.6,
                ..MultiChannelConfig::default()
            },
            MultiChannelConfig {
                beta: -0.5,
                ..MultiChannelConfig::default()
            },
        ] {
            let result = integrate(&integrand, &rng(), &SinkCallback {}, &[100], config, None);
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn dimensions_and_weights_are_checked() {
        let integrand = make_multi_channel_integrand(2, halves(), |_: &[f64]| 1.0);
        let config = MultiChannelConfig::default();

        assert_eq!(
            integrate(&integrand, &rng(), &SinkCallback {}, &[100], &config, None).unwrap_err(),
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );

        let integrand = make_multi_channel_integrand(1, halves(), |_: &[f64]| 1.0);

        assert_eq!(
            integrate(
                &integrand,
                &rng(),
                &SinkCallback {},
                &[100],
                &config,
                Some(vec![1.0])
            )
            .unwrap_err(),
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
        assert!(matches!(
            integrate(
                &integrand,
                &rng(),
                &SinkCallback {},
                &[100],
                &config,
                Some(vec![0.7, 0.7])
            ),
            Err(Error::InvalidWeights(_))
        ));
        assert_eq!(
            integrate(
                &integrand,
                &rng(),
                &SinkCallback {},
                &[100, 3],
                &MultiChannelConfig {
                    min_calls_per_channel: 2,
                    ..config
                },
                None
            )
            .unwrap_err(),
            Error::TooFewCalls {
                calls: 3,
                required: 4
            }
        );
    }

    #[test]
    fn channel_estimators_add_up() {
        let integrand = make_multi_channel_integrand(1, halves(), |x: &[f64]| x[0]);
        let chkpts = integrate(
            &integrand,
            &rng(),
            &SinkCallback {},
            &[1000],
            &MultiChannelConfig::default(),
            Some(vec![0.25, 0.75]),
        )
        .unwrap();

        let estimators = chkpts[0].estimators();
        let channels = estimators.channel_estimators();

        assert_eq!(channels[0].calls(), 250);
        assert_eq!(channels[1].calls(), 750);
        assert_eq!(estimators.calls(), 1000);
        assert_approx_eq!(estimators.mean(), channels[0].mean() + channels[1].mean());
        assert!((estimators.mean() - 0.5).abs() < 5.0 * estimators.std());
    }

    #[test]
    fn zero_weight_channels_do_not_contribute() {
        let integrand = make_multi_channel_integrand(1, halves(), |_: &[f64]| 1.0);
        let chkpts = integrate(
            &integrand,
            &rng(),
            &SinkCallback {},
            &[100, 100],
            &MultiChannelConfig {
                min_calls_per_channel: 10,
                ..MultiChannelConfig::default()
            },
            Some(vec![1.0, 0.0]),
        )
        .unwrap();

        let estimators = chkpts[0].estimators();

        assert_eq!(estimators.channel_estimators()[1].calls(), 10);
        assert_eq!(estimators.channel_estimators()[1].mean(), 0.0);
        assert_eq!(estimators.non_finite_calls(), 0);
        // only the first half is covered
        assert_approx_eq!(estimators.mean(), 0.5);
        assert_eq!(chkpts[1].estimators().weight_info().weights(), &[1.0, 0.0]);
    }
}
