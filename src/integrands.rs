//! Adapters that turn plain functions into integrands.
//!
//! ```
//! use mcintir::integrands::make_integrand;
//! use mcintir::core::Integrand;
//!
//! let integrand = make_integrand(2, |x: &[f64]| x[0] * x[1]);
//! assert_eq!(integrand.dim(), 2);
//! ```
use crate::core::{Integrand, McPoint};
use crate::distributions::{DistributionParameters, Projector};
use crate::integrators::multi_channel::{ChannelMap, MultiChannelIntegrand, MultiChannelPoint};

/// An integrand defined by a closure receiving the full point and the projector.
pub struct FnIntegrand<T, F> {
    dim: usize,
    distributions: Vec<DistributionParameters<T>>,
    f: F,
}

impl<T, F> FnIntegrand<T, F>
where
    F: Fn(&McPoint<T>, &mut Projector<T>) -> T,
{
    /// Constructor for an integrand with `dim` dimensions and no distributions.
    pub fn new(dim: usize, f: F) -> Self {
        Self {
            dim,
            distributions: Vec::new(),
            f,
        }
    }

    /// Defines the distributions the closure fills through its projector.
    pub fn with_distributions(mut self, distributions: Vec<DistributionParameters<T>>) -> Self {
        self.distributions = distributions;
        self
    }
}

impl<T, F> Integrand<T> for FnIntegrand<T, F>
where
    T: Clone + Copy + Send + Sync,
    F: Fn(&McPoint<T>, &mut Projector<T>) -> T + Send + Sync,
{
    fn call(&self, point: &McPoint<T>, projector: &mut Projector<T>) -> T {
        (self.f)(point, projector)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn distributions(&self) -> Vec<DistributionParameters<T>> {
        self.distributions.clone()
    }
}

/// Wraps a function of `dim` variables into an integrand.
pub fn make_integrand<T, F>(
    dim: usize,
    f: F,
) -> FnIntegrand<T, impl Fn(&McPoint<T>, &mut Projector<T>) -> T + Send + Sync>
where
    T: Copy,
    F: Fn(&[T]) -> T + Send + Sync,
{
    FnIntegrand::new(dim, move |point, _| f(point.point()))
}

/// Wraps a function of `dim` variables and a set of fixed `parameters` into an integrand. The
/// parameters are bound once and passed to every call of `f`.
pub fn make_integrand_with_parameters<T, P, F>(
    dim: usize,
    parameters: P,
    f: F,
) -> FnIntegrand<T, impl Fn(&McPoint<T>, &mut Projector<T>) -> T + Send + Sync>
where
    T: Copy,
    P: Send + Sync,
    F: Fn(&[T], &P) -> T + Send + Sync,
{
    FnIntegrand::new(dim, move |point, _| f(point.point(), &parameters))
}

/// A multi-channel integrand defined by a channel map and a closure.
pub struct FnMultiChannelIntegrand<T, M, F> {
    dim: usize,
    map: M,
    distributions: Vec<DistributionParameters<T>>,
    f: F,
}

impl<T, M, F> FnMultiChannelIntegrand<T, M, F>
where
    M: ChannelMap<T>,
    F: Fn(&MultiChannelPoint<T>, &mut Projector<T>) -> T,
{
    /// Constructor. `dim` is the number of coordinates `f` expects, which must agree with the
    /// number of coordinates the channels of `map` produce.
    pub fn new(dim: usize, map: M, f: F) -> Self {
        Self {
            dim,
            map,
            distributions: Vec::new(),
            f,
        }
    }

    /// Defines the distributions the closure fills through its projector.
    pub fn with_distributions(mut self, distributions: Vec<DistributionParameters<T>>) -> Self {
        self.distributions = distributions;
        self
    }
}

impl<T, M, F> MultiChannelIntegrand<T> for FnMultiChannelIntegrand<T, M, F>
where
    T: Clone + Copy + Send + Sync,
    M: ChannelMap<T>,
    F: Fn(&MultiChannelPoint<T>, &mut Projector<T>) -> T + Send + Sync,
{
    type Map = M;

    fn call(&self, point: &MultiChannelPoint<T>, projector: &mut Projector<T>) -> T {
        (self.f)(point, projector)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn map(&self) -> &M {
        &self.map
    }

    fn distributions(&self) -> Vec<DistributionParameters<T>> {
        self.distributions.clone()
    }
}

/// Wraps a function of the `dim` coordinates produced by the channels of `map` into a
/// multi-channel integrand.
pub fn make_multi_channel_integrand<T, M, F>(
    dim: usize,
    map: M,
    f: F,
) -> FnMultiChannelIntegrand<
    T,
    M,
    impl Fn(&MultiChannelPoint<T>, &mut Projector<T>) -> T + Send + Sync,
>
where
    T: Copy,
    M: ChannelMap<T>,
    F: Fn(&[T]) -> T + Send + Sync,
{
    FnMultiChannelIntegrand::new(dim, map, move |point, _| f(point.coordinates()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::estimators::BasicEstimators;

    #[test]
    fn parameters_are_bound_once() {
        let integrand = make_integrand_with_parameters(1, (2.0_f64, 3.0_f64), |x: &[f64], p| {
            p.0 * x[0] + p.1
        });
        let mut projector = Projector::new(&[]);

        assert_eq!(integrand.dim(), 1);
        assert_eq!(integrand.call(&McPoint::new(&[0.5], 1.0), &mut projector), 4.0);
        assert!(integrand.distributions().is_empty());
    }

    #[test]
    fn closures_fill_distributions() {
        let parameters = DistributionParameters::new(2, 0.0, 1.0, "x").unwrap();
        let integrand = FnIntegrand::new(1, |point: &McPoint<f64>, projector: &mut Projector<f64>| {
            projector.add(0, point.point()[0], 1.0);
            1.0
        })
        .with_distributions(vec![parameters.clone()]);

        let mut projector = Projector::new(&integrand.distributions());
        integrand.call(&McPoint::new(&[0.25], 1.0), &mut projector);

        assert_eq!(integrand.distributions(), vec![parameters]);
        assert_eq!(projector.into_results(1)[0].results()[0].mean(), 2.0);
    }
}
