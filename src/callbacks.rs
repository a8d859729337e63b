//! Implementation of different callback functions.
use crate::core::estimators::{BasicEstimators, CombinedResult, Estimators, McEstimators};
use crate::core::Checkpoint;
use crate::integrators::multi_channel::MultiChannelEstimators;
use crate::integrators::vegas::VegasEstimators;
use num_traits::{Float, FromPrimitive};
use std::fmt::Display;

/// Trait for implementing callbacks for iterative MC algorithms. Every closure taking a slice of
/// checkpoints is a callback.
pub trait Callback<T, R, E>
where
    T: Copy,
{
    /// This method is called after each successfully finished iteration with the checkpoints of
    /// all iterations so far and may print information about them. In a distributed run it is
    /// called on every member of the group with the same checkpoints.
    fn print(&self, chkpts: &[Checkpoint<T, R, E>]);
}

impl<T, R, E, F> Callback<T, R, E> for F
where
    T: Copy,
    F: Fn(&[Checkpoint<T, R, E>]),
{
    fn print(&self, chkpts: &[Checkpoint<T, R, E>]) {
        self(chkpts);
    }
}

/// A callback function that does nothing
pub struct SinkCallback {}

impl<T, R, E> Callback<T, R, E> for SinkCallback
where
    T: Copy,
{
    fn print(&self, _: &[Checkpoint<T, R, E>]) {}
}

/// A callback function that prints the result of each individual iteration together with the
/// cumulative result of all iterations so far.
pub struct SimpleCallback {}

impl<T, R, E> Callback<T, R, E> for SimpleCallback
where
    T: Display + Float,
    E: Estimators<T>,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, E>]) {
        print_summary(chkpts);
    }
}

/// A callback that prints the same as [`SimpleCallback`] and in addition the state of the
/// integrator: the grid for VEGAS and the channel weights for the multi-channel integrator.
pub struct VerboseCallback {}

impl<T, R> Callback<T, R, McEstimators<T>> for VerboseCallback
where
    T: Display + Float,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, McEstimators<T>>]) {
        if let Some(chkpt) = print_summary(chkpts) {
            let estimators = chkpt.estimators();
            println!(
                "  sum={} sumsq={} non-zero={} non-finite={}",
                estimators.sum(),
                estimators.sumsq(),
                estimators.non_zero_calls(),
                estimators.non_finite_calls()
            );
        }
    }
}

impl<T, R> Callback<T, R, VegasEstimators<T>> for VerboseCallback
where
    T: Display + Float + FromPrimitive,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, VegasEstimators<T>>]) {
        if let Some(chkpt) = print_summary(chkpts) {
            let pdf = chkpt.estimators().pdf();

            for d in 0..pdf.dimensions() {
                let edges: Vec<_> = pdf.edges(d).iter().map(ToString::to_string).collect();
                println!("  grid {}: {}", d, edges.join(" "));
            }
        }
    }
}

impl<T, R> Callback<T, R, MultiChannelEstimators<T>> for VerboseCallback
where
    T: Display + Float + FromPrimitive,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, MultiChannelEstimators<T>>]) {
        if let Some(chkpt) = print_summary(chkpts) {
            let estimators = chkpt.estimators();
            let info = estimators.weight_info();
            let minimal = info.minimal_weight_channels();

            for (i, channel) in estimators.channel_estimators().iter().enumerate() {
                println!(
                    "  channel {}: weight={}{} W={} N={} E={} \u{b1} {}",
                    i,
                    info.weights()[i],
                    if minimal.contains(&i) { " (min)" } else { "" },
                    info.variances()[i],
                    channel.calls(),
                    channel.mean(),
                    channel.std()
                );
            }

            println!("  max. difference of W: {}", info.max_difference());
        }
    }
}

/// Prints the last iteration and the cumulative result; returns the last checkpoint.
fn print_summary<T, R, E>(chkpts: &[Checkpoint<T, R, E>]) -> Option<&Checkpoint<T, R, E>>
where
    T: Display + Float,
    E: Estimators<T>,
{
    let chkpt = chkpts.last()?;
    let estimators = chkpt.estimators();
    let cumulative = CombinedResult::from_checkpoints(chkpts);

    println!(
        "[iteration {}: N={} E={} \u{b1} {}] [cumulative: N={} E={} \u{b1} {} chi^2/dof={}]",
        chkpts.len() - 1,
        estimators.calls(),
        estimators.mean(),
        estimators.std(),
        cumulative.calls(),
        cumulative.mean(),
        cumulative.std(),
        cumulative.chi_square_dof()
    );

    if estimators.non_finite_calls() > 0 {
        println!(
            "  {} non-finite values were ignored",
            estimators.non_finite_calls()
        );
    }

    Some(chkpt)
}
