//! This module contains everything related to distributions, i.e. differential histograms that
//! are filled along with the integration without additional integrand evaluations.
use crate::core::error::Error;
use crate::core::estimators::{BasicEstimators, MeanVar};
use crate::core::to_float;
use crate::distributed::Reduction;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Defines a one-dimensional distribution: the range from `x_min` (inclusive) to `x_max`
/// (exclusive) is subdivided into `bins` bins of equal width.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(
    try_from = "SavedDistributionParameters<T>",
    bound(deserialize = "T: Float + Deserialize<'de>")
)]
pub struct DistributionParameters<T> {
    bins: usize,
    x_min: T,
    x_max: T,
    name: String,
}

#[derive(Deserialize)]
struct SavedDistributionParameters<T> {
    bins: usize,
    x_min: T,
    x_max: T,
    name: String,
}

impl<T: Float> TryFrom<SavedDistributionParameters<T>> for DistributionParameters<T> {
    type Error = Error;

    fn try_from(saved: SavedDistributionParameters<T>) -> Result<Self, Error> {
        Self::new(saved.bins, saved.x_min, saved.x_max, &saved.name)
    }
}

impl<T: Float> DistributionParameters<T> {
    /// Constructor. Fails if `bins` is zero or the range is empty or non-finite.
    pub fn new(bins: usize, x_min: T, x_max: T, name: &str) -> Result<Self, Error> {
        if bins == 0 {
            return Err(Error::InvalidConfig(format!(
                "distribution '{}' has no bins",
                name
            )));
        }

        if !x_min.is_finite() || !x_max.is_finite() || x_min >= x_max {
            return Err(Error::InvalidConfig(format!(
                "distribution '{}' has an empty or non-finite range",
                name
            )));
        }

        Ok(Self {
            bins,
            x_min,
            x_max,
            name: name.to_string(),
        })
    }

    /// Returns the number of bins.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Returns the lower boundary of the range.
    pub fn x_min(&self) -> T {
        self.x_min
    }

    /// Returns the upper boundary of the range.
    pub fn x_max(&self) -> T {
        self.x_max
    }

    /// Returns the name of the distribution.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the width of every bin.
    pub fn bin_width(&self) -> T {
        (self.x_max - self.x_min) / to_float(self.bins)
    }

    /// Returns the centers of all bins.
    pub fn mid_points(&self) -> Vec<T> {
        let half = T::from(0.5).unwrap_or_else(T::zero);

        (0..self.bins)
            .map(|bin| self.x_min + (to_float::<T>(bin) + half) * self.bin_width())
            .collect()
    }

    /// Compute the index of the bin into which `x` belongs.
    fn bin_of(&self, x: T) -> Option<usize> {
        if !(x >= self.x_min && x < self.x_max) {
            return None;
        }

        ((x - self.x_min) / self.bin_width())
            .to_usize()
            // rounding can push values just below `x_max` into the next bin
            .map(|bin| bin.min(self.bins - 1))
    }

    pub(crate) fn accumulator(&self) -> DistributionAccumulator<T> {
        DistributionAccumulator {
            sums: vec![(T::zero(), T::zero()); self.bins],
            parameters: self.clone(),
        }
    }
}

/// Intermediate representation of a distribution.
///
/// For each bin, the sum and the sum of the squares of the values filled into it are stored.
/// Accumulators of different processes are combined before they are converted into a
/// [`DistributionResult`].
#[derive(Clone, Debug)]
pub struct DistributionAccumulator<T> {
    sums: Vec<(T, T)>,
    parameters: DistributionParameters<T>,
}

impl<T: Float> DistributionAccumulator<T> {
    /// Add `value` to the bin containing `x`. Zero and non-finite values as well as points
    /// outside of the range are ignored.
    pub fn fill(&mut self, x: T, value: T) {
        if !value.is_finite() || value == T::zero() {
            return;
        }

        if let Some(bin) = self.parameters.bin_of(x) {
            self.sums[bin].0 = self.sums[bin].0 + value;
            self.sums[bin].1 = self.sums[bin].1 + value * value;
        }
    }

    /// Convert an accumulator to a `DistributionResult`.
    pub fn to_result(self, calls: usize) -> DistributionResult<T> {
        DistributionResult::new(calls, self)
    }

    pub(crate) fn push_into(&self, reduction: &mut Reduction<T>) {
        for &(sum, sumsq) in &self.sums {
            reduction.push_value(sum);
            reduction.push_value(sumsq);
        }
    }

    pub(crate) fn pop_from(&mut self, reduction: &mut Reduction<T>) {
        for bin in &mut self.sums {
            bin.0 = reduction.next_value();
            bin.1 = reduction.next_value();
        }
    }
}

/// The differential distribution estimated by one iteration: for each bin the mean and variance
/// of the integral over the bin, divided by the bin width.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Float + Deserialize<'de>"))]
pub struct DistributionResult<T> {
    parameters: DistributionParameters<T>,
    calls: usize,
    results: Vec<MeanVar<T>>,
}

impl<T: Float> DistributionResult<T> {
    fn new(calls: usize, accumulator: DistributionAccumulator<T>) -> Self {
        let n: T = to_float(calls);
        let width = accumulator.parameters.bin_width();

        let results = accumulator
            .sums
            .into_iter()
            .map(|(sum, sumsq)| {
                if calls == 0 {
                    MeanVar::new(T::zero(), T::zero())
                } else if calls == 1 {
                    MeanVar::new(sum / width, T::zero())
                } else {
                    MeanVar::new(
                        sum / n / width,
                        ((sumsq - sum * sum / n) / n / (n - T::one())).max(T::zero())
                            / (width * width),
                    )
                }
            })
            .collect();

        Self {
            parameters: accumulator.parameters,
            calls,
            results,
        }
    }

    /// Returns the parameters this distribution was defined with.
    pub fn parameters(&self) -> &DistributionParameters<T> {
        &self.parameters
    }

    /// Returns the number of calls the distribution was estimated with.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Returns the centers of all bins.
    pub fn mid_points(&self) -> Vec<T> {
        self.parameters.mid_points()
    }

    /// Returns the estimators for all bins.
    pub fn results(&self) -> &[MeanVar<T>] {
        &self.results
    }
}

impl<T: Float> BasicEstimators<T> for DistributionResult<T> {
    /// The integral over the whole range of the distribution.
    fn mean(&self) -> T {
        let width = self.parameters.bin_width();
        self.results
            .iter()
            .fold(T::zero(), |mean, x| mean + x.mean() * width)
    }

    fn var(&self) -> T {
        let width = self.parameters.bin_width();
        self.results
            .iter()
            .fold(T::zero(), |var, x| var + x.var() * width * width)
    }
}

/// Handed to the integrand with every call to fill its distributions. The values passed to
/// [`Projector::add`] are multiplied with the weight of the current point.
#[derive(Debug)]
pub struct Projector<T> {
    accumulators: Vec<DistributionAccumulator<T>>,
    weight: T,
}

impl<T: Float> Projector<T> {
    pub(crate) fn new(parameters: &[DistributionParameters<T>]) -> Self {
        Self {
            accumulators: parameters
                .iter()
                .map(DistributionParameters::accumulator)
                .collect(),
            weight: T::one(),
        }
    }

    /// Adds `value` times the weight of the current point to the bin containing `x` of the
    /// distribution with index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not refer to a distribution of the integrand.
    pub fn add(&mut self, index: usize, x: T, value: T) {
        let weight = self.weight;
        self.accumulators[index].fill(x, value * weight);
    }

    /// Returns the number of distributions that can be filled.
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    /// Returns `true` if the integrand did not define any distributions.
    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    pub(crate) fn set_weight(&mut self, weight: T) {
        self.weight = weight;
    }

    pub(crate) fn push_into(&self, reduction: &mut Reduction<T>) {
        self.accumulators.iter().for_each(|a| a.push_into(reduction));
    }

    pub(crate) fn pop_from(&mut self, reduction: &mut Reduction<T>) {
        self.accumulators
            .iter_mut()
            .for_each(|a| a.pop_from(reduction));
    }

    pub(crate) fn into_results(self, calls: usize) -> Vec<DistributionResult<T>> {
        self.accumulators
            .into_iter()
            .map(|a| a.to_result(calls))
            .collect()
    }
}
