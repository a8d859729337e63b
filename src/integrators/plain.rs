//! Plain integrator
use super::log_iteration;
use crate::callbacks::Callback;
use crate::core::error::Error;
use crate::core::estimators::McEstimators;
use crate::core::{check_iterations, discard, split_calls, Checkpoint, Integrand, McPoint};
use crate::distributed::{ProcessGroup, Reduction, SingleProcess};
use crate::distributions::Projector;

use num_traits::Float;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use std::fmt::Debug;

/// Checkpoint of the plain integrator.
pub type PlainCheckpoint<T, R> = Checkpoint<T, R, McEstimators<T>>;

/// Performs a single iteration of integrating `integrand` with `calls` points, starting with the
/// generator `rng`. Each member of `group` evaluates its share of the points; the returned
/// checkpoint, which is the same on all members, contains the merged result.
pub fn iteration<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    calls: usize,
) -> Result<PlainCheckpoint<T, R>, Error>
where
    T: Float + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    let dim = integrand.dim();
    let (before, local_calls) = split_calls(group.rank(), group.size(), calls);

    // skip the random numbers used by the lower ranks
    let mut rng_local = rng.clone();
    discard::<T, _>(&mut rng_local, before * dim);

    // create the buffers once instead of in every call
    let mut x = vec![T::zero(); dim];
    let mut projector = Projector::new(&integrand.distributions());
    let mut estimators = McEstimators::default();

    for _ in 0..local_calls {
        x.iter_mut().for_each(|v| *v = rng_local.gen());

        let value = integrand.call(&McPoint::new(&x, T::one()), &mut projector);
        estimators.update(value);
    }

    let mut reduction = Reduction::new();
    estimators.push_into(&mut reduction);
    projector.push_into(&mut reduction);

    group.all_reduce(&mut reduction)?;

    let estimators = McEstimators::pop_from(&mut reduction);
    projector.pop_from(&mut reduction);

    // skip the random numbers used by the higher ranks
    discard::<T, _>(&mut rng_local, (calls - before - local_calls) * dim);

    Ok(Checkpoint::new(
        rng.clone(),
        rng_local,
        estimators,
        projector.into_results(calls),
    ))
}

/// Integrates `integrand` cooperatively on all members of `group`.
///
/// The random number generator in its initial state is provided in `rng` together with a
/// `callback` function that prints estimates after each iteration. The number of calls of the
/// integrand per iteration is stored in the slice `iterations`.
pub fn distributed_integrate<T, R, I, G>(
    group: &G,
    integrand: &I,
    rng: &R,
    callback: &impl Callback<T, R, McEstimators<T>>,
    iterations: &[usize],
) -> Result<Vec<PlainCheckpoint<T, R>>, Error>
where
    T: Debug + Float + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    G: ProcessGroup<T>,
    Standard: Distribution<T>,
{
    check_iterations(iterations)?;

    if integrand.dim() == 0 {
        return Err(Error::InvalidConfig(
            "the integrand has zero dimensions".to_string(),
        ));
    }

    let mut checkpoints = Vec::with_capacity(iterations.len());
    let mut rng = rng.clone();

    // Integration iterations are treated sequentially
    for &calls in iterations {
        let checkpoint = iteration(group, integrand, &rng, calls)?;
        // synchronize the random number generation
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
    callback: &impl Callback<T, R, McEstimators<T>>,
    iterations: &[usize],
) -> Result<Vec<PlainCheckpoint<T, R>>, Error>
where
    T: Debug + Float + Send + Sync,
    R: Clone + Rng,
    I: Integrand<T>,
    Standard: Distribution<T>,
{
    distributed_integrate(&SingleProcess, integrand, rng, callback, iterations)
}
