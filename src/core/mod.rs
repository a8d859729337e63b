//! The core module
pub mod error;
pub mod estimators;

use crate::core::error::Error;
use crate::distributions::{DistributionParameters, DistributionResult, Projector};
use num_traits::Float;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A point drawn from the unit hypercube together with its weight, i.e. the inverse of the
/// density it was sampled with.
#[derive(Clone, Copy, Debug)]
pub struct McPoint<'a, T> {
    point: &'a [T],
    weight: T,
}

impl<'a, T: Copy> McPoint<'a, T> {
    /// Constructor.
    pub fn new(point: &'a [T], weight: T) -> Self {
        Self { point, weight }
    }

    /// The coordinates of the point in the unit hypercube.
    pub fn point(&self) -> &'a [T] {
        self.point
    }

    /// The weight the integrand value is multiplied with.
    pub fn weight(&self) -> T {
        self.weight
    }
}

/// Integrand trait
pub trait Integrand<T: Copy>: Send + Sync {
    /// Call the integrand with a phase space point. Values filled into the `projector` end up
    /// in the distributions defined by [`Integrand::distributions`].
    fn call(&self, point: &McPoint<T>, projector: &mut Projector<T>) -> T;

    /// The dimension of the integrand.
    fn dim(&self) -> usize;

    /// Definitions of the distributions that should be filled during the integration.
    fn distributions(&self) -> Vec<DistributionParameters<T>> {
        vec![]
    }
}

/// A checkpoint saves the state of the generator after an iteration.
/// Checkpoints can be used to restart or resume iterations.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound(
    deserialize = "T: Float + Deserialize<'de>, R: Deserialize<'de>, E: Deserialize<'de>"
))]
pub struct Checkpoint<T, R, E> {
    rng_before: R,
    rng_after: R,
    estimators: E,
    distributions: Vec<DistributionResult<T>>,
}

impl<T, R, E> Checkpoint<T, R, E> {
    /// Constructor
    pub(crate) fn new(
        rng_before: R,
        rng_after: R,
        estimators: E,
        distributions: Vec<DistributionResult<T>>,
    ) -> Self {
        Self {
            rng_before,
            rng_after,
            estimators,
            distributions,
        }
    }

    /// Returns the random number generator before generation of this checkpoint.
    pub fn rng_before(&self) -> &R {
        &self.rng_before
    }

    /// Returns the random number generator after generation of this checkpoint
    pub fn rng_after(&self) -> &R {
        &self.rng_after
    }

    /// Returns the estimators of this checkpoint.
    pub fn estimators(&self) -> &E {
        &self.estimators
    }

    /// Access the distributions
    pub fn distributions(&self) -> &[DistributionResult<T>] {
        &self.distributions
    }
}

/// Converts a count into the numeric type of the integration.
pub(crate) fn to_float<T: Float>(n: usize) -> T {
    T::from(n).unwrap_or_else(T::infinity)
}

/// Splits `total_calls` among `size` processes. Returns how many calls the processes with a
/// lower rank than `rank` perform in total, and how many calls `rank` itself performs. The first
/// `total_calls % size` ranks perform one call more than the others.
pub(crate) fn split_calls(rank: usize, size: usize, total_calls: usize) -> (usize, usize) {
    debug_assert!(rank < size);

    let quotient = total_calls / size;
    let remainder = total_calls % size;
    let before = quotient * rank + rank.min(remainder);
    let calls = quotient + if rank < remainder { 1 } else { 0 };

    (before, calls)
}

/// Advances `rng` as if `numbers` random numbers of type `T` had been drawn.
pub(crate) fn discard<T, R>(rng: &mut R, numbers: usize)
where
    R: Rng,
    Standard: Distribution<T>,
{
    for _ in 0..numbers {
        let _: T = rng.gen();
    }
}

/// Checks that there is at least one iteration and that no iteration is empty.
pub(crate) fn check_iterations(iterations: &[usize]) -> Result<(), Error> {
    if iterations.is_empty() {
        return Err(Error::EmptySchedule);
    }

    if let Some(iteration) = iterations.iter().position(|&calls| calls == 0) {
        return Err(Error::ZeroCalls { iteration });
    }

    Ok(())
}
