//! VEGAS integrator
//!
//! The VEGAS algorithm samples the unit hypercube with a [`VegasPdf`], a product of piecewise
//! constant densities. After every iteration the bins of the density are resized according to
//! the squared integrand values observed in them, so that following iterations sample regions
//! with large contributions more often.
mod pdf;

pub use pdf::{Smoothing, VegasAdjustment, VegasPdf};

use super::log_iteration;
use crate::callbacks::Callback;
use crate::core::error::Error;
use crate::core::estimators::{BasicEstimators, Estimators, McEstimators};
use crate::core::{check_iterations, discard, split_calls, Checkpoint, Integrand, McPoint};
use crate::distributed::{ProcessGroup, Reduction, SingleProcess};
use crate::distributions::Projector;

use num_traits::{Float, FromPrimitive};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Parameters of the grid adaptation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VegasConfig {
    /// Number of bins per dimension of a newly created grid. Defaults to 128.
    pub bins: usize,
    /// Exponent controlling how strongly the grid follows the adjustment data. With zero every
    /// bin that received data is weighted the same, so only bins without data shrink. Defaults
    /// to 1.5.
    pub alpha: f64,
    /// Blend of neighbouring bins applied before the compression. Defaults to
    /// [`Smoothing::Average3`].
    pub smoothing: Smoothing,
}

impl Default for VegasConfig {
    fn default() -> Self {
        Self {
            bins: 128,
            alpha: 1.5,
            smoothing: Smoothing::default(),
        }
    }
}

impl VegasConfig {
    fn validate<T: FromPrimitive>(&self) -> Result<(), Error> {
        if self.bins == 0 {
            return Err(Error::InvalidConfig("bins must be positive".to_string()));
        }

        self.alpha::<T>().map(|_| ())
    }

    fn alpha<T: FromPrimitive>(&self) -> Result<T, Error> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "alpha must be finite and non-negative, but is {}",
                self.alpha
            )));
        }

        T::from_f64(self.alpha).ok_or_else(|| {
            Error::InvalidConfig(format!("alpha = {} is not representable", self.alpha))
        })
    }
}

/// Estimators of one VEGAS iteration: the result, the grid it was obtained with and the data the
/// next grid is computed from.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Float + Deserialize<'de>"))]
pub struct VegasEstimators<T> {
    estimators: McEstimators<T>,
    pdf: VegasPdf<T>,
    adjustment: VegasAdjustment<T>,
}

impl<T: Float + FromPrimitive> VegasEstimators<T> {
    /// Returns the sums the estimators are computed from.
    pub fn mc_estimators(&self) -> &McEstimators<T> {
        &self.estimators
    }

    /// Returns the grid used in this iteration.
    pub fn pdf(&self) -> &VegasPdf<T> {
        &self.pdf
    }

    /// Returns the adjustment data collected in this iteration.
    pub fn adjustment(&self) -> &VegasAdjustment<T> {
        &self.adjustment
    }

    /// Returns the grid refined with the data of this iteration.
    pub fn next_pdf(&self, config: &VegasConfig) -> Result<VegasPdf<T>, Error> {
        Ok(self
            .pdf
            .refine(&self.adjustment, config.alpha()?, config.smoothing))
    }
}

impl<T: Float> BasicEstimators<T> for VegasEstimators<T> {
    fn mean(&self) -> T {
        self.estimators.mean()
    }

    fn var(&self) -> T {
        self.estimators.var()
    }
}

impl<T: Float> Estimators<T> for VegasEstimators<T> {
    fn calls(&self) -> usize {
        self.estimators.calls()
    }

    fn non_finite_calls(&self) -> usize {
        self.estimators.non_finite_calls()
    }

    fn non_zero_calls(&self) -> usize {
        self.estimators.non_zero_calls()
    }
}

/// Checkpoint of the VEGAS integrator.
pub type VegasCheckpoint<T, R> = Checkpoint<T, R, VegasEstimators<T>>;

/// Performs a single iteration of integrating `integrand` with `calls` points sampled from
/// `pdf`. Each member of `group` evaluates its share of the points; the returned checkpoint,
/// which is the same on all members, contains the merged result and adjustment data.
pub fn iteration<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    calls: usize,
    pdf: &VegasPdf<T>,
) -> Result<VegasCheckpoint<T, R>, Error>
where
    T: Float + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    let dim = integrand.dim();

    if pdf.dimensions() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: pdf.dimensions(),
        });
    }

    let (before, local_calls) = split_calls(group.rank(), group.size(), calls);

    let mut rng_local = rng.clone();
    discard::<T, _>(&mut rng_local, before * dim);

    let mut random = vec![T::zero(); dim];
    let mut x = vec![T::zero(); dim];
    let mut bins = vec![0; dim];
    let mut projector = Projector::new(&integrand.distributions());
    let mut estimators = McEstimators::default();
    let mut adjustment = VegasAdjustment::new(dim, pdf.bins());

    for _ in 0..local_calls {
        random.iter_mut().for_each(|r| *r = rng_local.gen());

        let weight = pdf.icdf(&random, &mut x, &mut bins);
        projector.set_weight(weight);

        let value = integrand.call(&McPoint::new(&x, weight), &mut projector);
        let value = if value == T::zero() {
            value
        } else {
            value * weight
        };

        estimators.update(value);
        adjustment.fill(&bins, value);
    }

    let mut reduction = Reduction::new();
    estimators.push_into(&mut reduction);
    adjustment.push_into(&mut reduction);
    projector.push_into(&mut reduction);

    group.all_reduce(&mut reduction)?;

    let estimators = McEstimators::pop_from(&mut reduction);
    adjustment.pop_from(&mut reduction);
    projector.pop_from(&mut reduction);

    discard::<T, _>(&mut rng_local, (calls - before - local_calls) * dim);

    Ok(Checkpoint::new(
        rng.clone(),
        rng_local,
        VegasEstimators {
            estimators,
            pdf: pdf.clone(),
            adjustment,
        },
        projector.into_results(calls),
    ))
}

/// Integrates `integrand` cooperatively on all members of `group` with the VEGAS algorithm.
///
/// The first iteration samples from `pdf`, or from a uniform grid with `config.bins` bins if
/// `pdf` is `None`; every following iteration samples from the grid refined with the data of
/// all previous iterations. The number of calls per iteration is given by `iterations` and
/// `callback` is invoked after every iteration.
pub fn distributed_integrate<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    callback: &impl Callback<T, R, VegasEstimators<T>>,
    iterations: &[usize],
    config: &VegasConfig,
    pdf: Option<VegasPdf<T>>,
) -> Result<Vec<VegasCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    check_iterations(iterations)?;
    config.validate::<T>()?;

    let mut pdf = match pdf {
        Some(pdf) => pdf,
        None => VegasPdf::new(integrand.dim(), config.bins)?,
    };

    let mut checkpoints: Vec<VegasCheckpoint<T, R>> = Vec::with_capacity(iterations.len());
    let mut rng = rng.clone();

    for &calls in iterations {
        if let Some(last) = checkpoints.last() {
            pdf = last.estimators().next_pdf(config)?;
        }

        let checkpoint = iteration(group, integrand, &rng, calls, &pdf)?;
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
    callback: &impl Callback<T, R, VegasEstimators<T>>,
    iterations: &[usize],
    config: &VegasConfig,
    pdf: Option<VegasPdf<T>>,
) -> Result<Vec<VegasCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    Standard: Distribution<T>,
{
    distributed_integrate(
        &SingleProcess,
        integrand,
        rng,
        callback,
        iterations,
        config,
        pdf,
    )
}

/// Continues an integration after `checkpoint` on all members of `group`: the generator and the
/// refined grid are taken from the checkpoint.
pub fn distributed_resume<T, R, I, G>(
    group: &G,
    integrand: &I,
    checkpoint: &VegasCheckpoint<T, R>,
    callback: &impl Callback<T, R, VegasEstimators<T>>,
    iterations: &[usize],
    config: &VegasConfig,
) -> Result<Vec<VegasCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    let pdf = checkpoint.estimators().next_pdf(config)?;

    distributed_integrate(
        group,
        integrand,
        checkpoint.rng_after(),
        callback,
        iterations,
        config,
        Some(pdf),
    )
}

/// Continues an integration after `checkpoint` in the calling process. See
/// [`distributed_resume`].
pub fn resume<T, R, I>(
    integrand: &I,
    checkpoint: &VegasCheckpoint<T, R>,
    callback: &impl Callback<T, R, VegasEstimators<T>>,
    iterations: &[usize],
    config: &VegasConfig,
) -> Result<Vec<VegasCheckpoint<T, R>>, Error>
where
    T: Debug + Float + FromPrimitive + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
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
    use crate::integrands::make_integrand;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
    }

    #[test]
    fn config_defaults() {
        let config = VegasConfig::default();

        assert_eq!(config.bins, 128);
        assert_eq!(config.alpha, 1.5);
        assert_eq!(config.smoothing, Smoothing::Average3);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let integrand = make_integrand(1, |_: &[f64]| 1.0);

        for config in &[
            VegasConfig {
                alpha: -1.0,
                ..VegasConfig::default()
            },
            VegasConfig {
                alpha: f64::NAN,
                ..VegasConfig::default()
            },
            VegasConfig {
                bins: 0,
                ..VegasConfig::default()
            },
        ] {
            let result = integrate(&integrand, &rng(), &SinkCallback {}, &[100], config, None);
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn grid_dimensions_must_match() {
        let integrand = make_integrand(2, |_: &[f64]| 1.0);
        let pdf = VegasPdf::new(3, 16).unwrap();
        let result = integrate(
            &integrand,
            &rng(),
            &SinkCallback {},
            &[100],
            &VegasConfig::default(),
            Some(pdf),
        );

        assert_eq!(
            result.unwrap_err(),
            Error::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn grid_follows_a_peak() {
        // most of the integral is near zero
        let integrand = make_integrand(1, |x: &[f64]| (-20.0 * x[0]).exp());
        let chkpts = integrate(
            &integrand,
            &rng(),
            &SinkCallback {},
            &[10_000; 3],
            &VegasConfig {
                bins: 32,
                ..VegasConfig::default()
            },
            None,
        )
        .unwrap();

        let pdf = chkpts[2].estimators().pdf();

        // the bins near zero have become narrower than uniform ones
        assert!(pdf.edges(0)[16] < 0.5);
        assert!(chkpts[2].estimators().var() < chkpts[0].estimators().var());
        assert_eq!(chkpts[0].estimators().pdf(), &VegasPdf::new(1, 32).unwrap());
    }

    #[test]
    fn zero_alpha_disables_the_adaptation() {
        let integrand = make_integrand(1, |x: &[f64]| x[0] * x[0]);
        let chkpts = integrate(
            &integrand,
            &rng(),
            &SinkCallback {},
            &[1000, 1000],
            &VegasConfig {
                alpha: 0.0,
                bins: 16,
                ..VegasConfig::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(
            chkpts[0].estimators().pdf(),
            chkpts[1].estimators().pdf()
        );
    }
}
