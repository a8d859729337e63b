//! Integrators
//!
//! Every integrator offers `integrate`, which runs a schedule of iterations in the calling
//! process, and `distributed_integrate`, which runs the same schedule cooperatively on all members
//! of a [`ProcessGroup`](crate::distributed::ProcessGroup). With the same generator, both produce
//! the same checkpoints.
pub mod multi_channel;
pub mod plain;
pub mod vegas;

use crate::core::estimators::Estimators;
use log::{debug, warn};
use num_traits::Float;
use std::fmt::Debug;

fn log_iteration<T, E>(iteration: usize, estimators: &E)
where
    T: Debug + Float,
    E: Estimators<T>,
{
    if estimators.non_finite_calls() > 0 {
        warn!(
            "iteration {}: {} of {} integrand values were not finite and have been ignored",
            iteration,
            estimators.non_finite_calls(),
            estimators.calls()
        );
    }

    debug!(
        "iteration {} finished: N={} E={:?} \u{b1} {:?}",
        iteration,
        estimators.calls(),
        estimators.mean(),
        estimators.std()
    );
}
