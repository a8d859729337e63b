//! This module contains everything related to estimators.
use crate::core::{to_float, Checkpoint};
use crate::distributed::Reduction;
use log::warn;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Basic estimators, like the mean, variance, and the standard deviation.
pub trait BasicEstimators<T: Float> {
    /// Returns the mean value.
    fn mean(&self) -> T;

    /// Returns the variance, $V$.
    fn var(&self) -> T;

    /// Returns the standard deviation, $\sigma = \sqrt{V}$.
    fn std(&self) -> T {
        self.var().sqrt()
    }
}

/// More estimators.
pub trait Estimators<T: Float>: BasicEstimators<T> {
    /// Returns the number of times $N$, the integrand has been called.
    fn calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nf}$, the integrand has been called
    /// and its return value was non-finite.
    fn non_finite_calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nz}$, the integrand has been called
    /// and its return value was non-zero.
    fn non_zero_calls(&self) -> usize;

    /// Returns the fraction of calls that returned a non-zero value, $N_\mathrm{nz} / N$.
    fn efficiency(&self) -> T {
        if self.calls() == 0 {
            T::zero()
        } else {
            to_float::<T>(self.non_zero_calls()) / to_float(self.calls())
        }
    }
}

/// A struct implementing the `BasicEstimator<T>` trait.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MeanVar<T> {
    mean: T,
    var: T,
}

impl<T> MeanVar<T> {
    /// Constructor.
    pub const fn new(mean: T, var: T) -> Self {
        Self { mean, var }
    }
}

impl<T: Float> BasicEstimators<T> for MeanVar<T> {
    fn mean(&self) -> T {
        self.mean
    }

    fn var(&self) -> T {
        self.var
    }
}

/// The sums collected during one iteration (or one stratum of an iteration) from which the
/// mean, $E = \frac{1}{N} \sum_i w_i$, and the variance of the mean,
/// $V = \frac{1}{N-1} \left( \frac{1}{N} \sum_i w_i^2 - E^2 \right)$, follow.
///
/// Non-finite values are counted but contribute zero to the sums.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct McEstimators<T> {
    sum: T,
    sumsq: T,
    calls: usize,
    non_finite_calls: usize,
    non_zero_calls: usize,
}

impl<T: Float> Default for McEstimators<T> {
    fn default() -> Self {
        Self {
            sum: T::zero(),
            sumsq: T::zero(),
            calls: 0,
            non_finite_calls: 0,
            non_zero_calls: 0,
        }
    }
}

impl<T: Float> Add for McEstimators<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            sumsq: self.sumsq + other.sumsq,
            calls: self.calls + other.calls,
            non_finite_calls: self.non_finite_calls + other.non_finite_calls,
            non_zero_calls: self.non_zero_calls + other.non_zero_calls,
        }
    }
}

impl<T: Float> McEstimators<T> {
    /// Records one weighted integrand value.
    pub fn update(&mut self, value: T) {
        self.calls += 1;

        if value != T::zero() {
            self.non_zero_calls += 1;

            if value.is_finite() {
                self.sum = self.sum + value;
                self.sumsq = self.sumsq + value * value;
            } else {
                self.non_finite_calls += 1;
            }
        }
    }

    /// Returns the sum of all finite values.
    pub fn sum(&self) -> T {
        self.sum
    }

    /// Returns the sum of the squares of all finite values.
    pub fn sumsq(&self) -> T {
        self.sumsq
    }

    pub(crate) fn push_into(&self, reduction: &mut Reduction<T>) {
        reduction.push_value(self.sum);
        reduction.push_value(self.sumsq);
        reduction.push_count(self.calls);
        reduction.push_count(self.non_finite_calls);
        reduction.push_count(self.non_zero_calls);
    }

    pub(crate) fn pop_from(reduction: &mut Reduction<T>) -> Self {
        Self {
            sum: reduction.next_value(),
            sumsq: reduction.next_value(),
            calls: reduction.next_count(),
            non_finite_calls: reduction.next_count(),
            non_zero_calls: reduction.next_count(),
        }
    }
}

impl<T: Float> BasicEstimators<T> for McEstimators<T> {
    fn mean(&self) -> T {
        if self.calls == 0 {
            T::zero()
        } else {
            self.sum / to_float(self.calls)
        }
    }

    fn var(&self) -> T {
        if self.calls <= 1 {
            return T::zero();
        }

        let calls: T = to_float(self.calls);
        // rounding may produce tiny negative numbers for constant integrands
        ((self.sumsq - self.sum * self.sum / calls) / calls / (calls - T::one())).max(T::zero())
    }
}

impl<T: Float> Estimators<T> for McEstimators<T> {
    fn calls(&self) -> usize {
        self.calls
    }

    fn non_finite_calls(&self) -> usize {
        self.non_finite_calls
    }

    fn non_zero_calls(&self) -> usize {
        self.non_zero_calls
    }
}

/// Inverse-variance weighted combination of several iterations,
/// $E = \sum_k E_k / V_k \big/ \sum_k 1 / V_k$ with $V = 1 \big/ \sum_k 1 / V_k$, together with
/// the $\chi^2$ per degree of freedom measuring how well the iterations agree.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CombinedResult<T> {
    mean: T,
    var: T,
    chi_square_dof: T,
    calls: usize,
    non_finite_calls: usize,
    iterations: usize,
}

impl<T: Float> CombinedResult<T> {
    /// Combines the estimators of all iterations. Iterations whose calls all returned the same
    /// non-zero value are exact and dominate the combination. Iterations with a vanishing
    /// variance that are not exact, i.e. with at most one call or without a single non-zero
    /// value, carry no uncertainty estimate and are ignored as long as other iterations are
    /// available. Iterations with non-finite estimates are always ignored.
    pub fn cumulative<'a, E, I>(estimators: I) -> Self
    where
        T: 'a,
        E: Estimators<T> + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        let mut calls = 0;
        let mut non_finite_calls = 0;
        let mut iterations = 0;
        let mut exact = Vec::new();
        let mut weighted = Vec::new();
        let mut uninformative = Vec::new();

        for e in estimators {
            iterations += 1;
            calls += e.calls();
            non_finite_calls += e.non_finite_calls();

            let (mean, var) = (e.mean(), e.var());

            if !(mean.is_finite() && var.is_finite() && var >= T::zero()) {
                warn!("iteration {} has a non-finite estimate and is ignored", iterations - 1);
            } else if var > T::zero() {
                weighted.push((mean, var));
            } else if e.calls() > 1 && e.non_zero_calls() == e.calls() {
                exact.push(mean);
            } else {
                uninformative.push((iterations - 1, mean));
            }
        }

        let average = |means: &[T]| {
            means.iter().fold(T::zero(), |acc, &m| acc + m) / to_float(means.len())
        };

        let (mean, var, used) = if !exact.is_empty() || !weighted.is_empty() {
            for (index, _) in &uninformative {
                warn!(
                    "iteration {} has a vanishing variance without being exact and is ignored",
                    index
                );
            }

            if !exact.is_empty() {
                (average(&exact[..]), T::zero(), exact.len() + weighted.len())
            } else {
                let (weighted_means, weights) = weighted
                    .iter()
                    .fold((T::zero(), T::zero()), |(wm, w), (m, v)| {
                        (wm + *m / *v, w + T::one() / *v)
                    });

                (weighted_means / weights, T::one() / weights, weighted.len())
            }
        } else if !uninformative.is_empty() {
            // e.g. an integrand that vanishes everywhere
            let means: Vec<_> = uninformative.iter().map(|&(_, m)| m).collect();
            (average(&means[..]), T::zero(), means.len())
        } else {
            (T::zero(), T::zero(), 0)
        };

        let chi_square = weighted
            .iter()
            .fold(T::zero(), |acc, (m, v)| acc + (*m - mean).powi(2) / *v);

        let chi_square_dof = if used > 1 {
            chi_square / to_float(used - 1)
        } else {
            T::zero()
        };

        Self {
            mean,
            var,
            chi_square_dof,
            calls,
            non_finite_calls,
            iterations,
        }
    }

    /// Combines the estimators of all `chkpts`.
    pub fn from_checkpoints<R, E: Estimators<T>>(chkpts: &[Checkpoint<T, R, E>]) -> Self {
        Self::cumulative(chkpts.iter().map(Checkpoint::estimators))
    }

    /// Returns $\chi^2 / (n - 1)$ for $n$ combined iterations, or zero for a single one.
    pub fn chi_square_dof(&self) -> T {
        self.chi_square_dof
    }

    /// Returns the total number of calls of all combined iterations.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Returns the total number of non-finite calls of all combined iterations.
    pub fn non_finite_calls(&self) -> usize {
        self.non_finite_calls
    }

    /// Returns the number of combined iterations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns `false` if the iterations disagree more than their uncertainties allow, i.e. if
    /// the $\chi^2$ per degree of freedom exceeds `limit`.
    pub fn is_consistent(&self, limit: T) -> bool {
        self.chi_square_dof <= limit
    }
}

impl<T: Float> BasicEstimators<T> for CombinedResult<T> {
    fn mean(&self) -> T {
        self.mean
    }

    fn var(&self) -> T {
        self.var
    }
}

/// Adds the raw sums of all iterations as if they were a single large iteration. Unlike
/// [`CombinedResult::cumulative`] this does not weight the iterations by their variance and is
/// only meaningful when the sampling density did not change between them.
pub fn accumulate<T: Float, R>(chkpts: &[Checkpoint<T, R, McEstimators<T>>]) -> McEstimators<T> {
    chkpts
        .iter()
        .map(|c| c.estimators().clone())
        .fold(McEstimators::default(), |acc, e| acc + e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn estimators_from(values: &[f64]) -> McEstimators<f64> {
        let mut e = McEstimators::default();
        values.iter().for_each(|v| e.update(*v));
        e
    }

    #[test]
    fn mean_var() {
        let mv = MeanVar::<f64>::new(6.4, 1.7);

        assert_eq!(mv.mean(), 6.4);
        assert_eq!(mv.var(), 1.7);
        assert_eq!(mv.std(), 1.7.sqrt());
    }

    #[test]
    fn mc_estimators_mean_and_variance() {
        let e = estimators_from(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(e.calls(), 4);
        assert_approx_eq!(e.mean(), 2.5);
        // sample variance 5/3, divided by N
        assert_approx_eq!(e.var(), 5.0 / 12.0);
    }

    #[test]
    fn mc_estimators_filter_non_finite_values() {
        let e = estimators_from(&[1.0, f64::NAN, 0.0, f64::INFINITY, 3.0]);

        assert_eq!(e.calls(), 5);
        assert_eq!(e.non_finite_calls(), 2);
        assert_eq!(e.non_zero_calls(), 4);
        assert_approx_eq!(e.sum(), 4.0);
        assert_approx_eq!(e.efficiency(), 0.8);
    }

    #[test]
    fn mc_estimators_with_at_most_one_call_have_zero_variance() {
        assert_eq!(McEstimators::<f64>::default().mean(), 0.0);
        assert_eq!(McEstimators::<f64>::default().var(), 0.0);
        assert_eq!(estimators_from(&[7.0]).var(), 0.0);
        assert_eq!(estimators_from(&[7.0]).mean(), 7.0);
    }

    #[test]
    fn cumulative_weights_by_inverse_variance() {
        let e1 = estimators_from(&[1.0, 3.0]);
        let e2 = estimators_from(&[2.0, 2.5, 3.0, 2.5]);
        let result = CombinedResult::cumulative(vec![&e1, &e2]);

        let (w1, w2) = (1.0 / e1.var(), 1.0 / e2.var());
        assert_approx_eq!(result.mean(), (e1.mean() * w1 + e2.mean() * w2) / (w1 + w2));
        assert_approx_eq!(result.var(), 1.0 / (w1 + w2));
        assert_eq!(result.calls(), 6);
        assert_eq!(result.iterations(), 2);

        let chi_square = (e1.mean() - result.mean()).powi(2) * w1
            + (e2.mean() - result.mean()).powi(2) * w2;
        assert_approx_eq!(result.chi_square_dof(), chi_square);
    }

    #[test]
    fn cumulative_of_exact_iterations() {
        let e1 = estimators_from(&[1.0; 10]);
        let e2 = estimators_from(&[1.0; 20]);
        let result = CombinedResult::cumulative(vec![&e1, &e2]);

        assert_eq!(result.mean(), 1.0);
        assert_eq!(result.var(), 0.0);
        assert_eq!(result.chi_square_dof(), 0.0);
        assert!(result.is_consistent(1.0));
    }

    #[test]
    fn cumulative_flags_disagreeing_iterations() {
        let e1 = estimators_from(&[1.0, 1.1, 0.9, 1.0]);
        let e2 = estimators_from(&[5.0, 5.1, 4.9, 5.0]);
        let result = CombinedResult::cumulative(vec![&e1, &e2]);

        assert!(!result.is_consistent(10.0));
    }

    #[test]
    fn cumulative_ignores_iterations_without_hits() {
        let missed = estimators_from(&[0.0; 10]);
        let e1 = estimators_from(&[0.0, 2.0, 0.0, 1.0]);
        let e2 = estimators_from(&[1.0, 0.0, 1.5, 0.5]);
        let result = CombinedResult::cumulative(vec![&missed, &e1, &e2]);
        let reference = CombinedResult::cumulative(vec![&e1, &e2]);

        assert!(result.var() > 0.0);
        assert_eq!(result.mean(), reference.mean());
        assert_eq!(result.var(), reference.var());
        assert_eq!(result.chi_square_dof(), reference.chi_square_dof());
        assert_eq!(result.calls(), 18);
        assert_eq!(result.iterations(), 3);
    }

    #[test]
    fn cumulative_ignores_single_call_iterations() {
        let e1 = estimators_from(&[1.0, 3.0, 2.0, 2.5]);
        let single = estimators_from(&[7.0]);
        let result = CombinedResult::cumulative(vec![&e1, &single]);

        assert_eq!(result.mean(), e1.mean());
        assert_eq!(result.var(), e1.var());
        assert_eq!(result.chi_square_dof(), 0.0);
        assert_eq!(result.calls(), 5);
    }

    #[test]
    fn cumulative_of_a_vanishing_integrand() {
        let e1 = estimators_from(&[0.0; 10]);
        let e2 = estimators_from(&[0.0; 5]);
        let result = CombinedResult::cumulative(vec![&e1, &e2]);

        assert_eq!(result.mean(), 0.0);
        assert_eq!(result.var(), 0.0);
        assert!(result.is_consistent(1.0));
    }
}
