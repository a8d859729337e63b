#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! The crate `mcintir` provides [Monte Carlo integration] routines, which allow to efficiently
//! approximate definite multi-dimensional [integrals]. Besides uniform sampling it offers two
//! variance reduction techniques for sharply peaked integrands: the adaptive importance sampling
//! of [VEGAS] and the multi-channel method, which decomposes the integration domain into
//! weighted channels with their own mappings. The pronunciation of `mcintir` is the same as of
//! the name `MacIntyre` in English.
//!
//! # Features
//!
//! This library was designed with the following features as essential in mind:
//!
//! - **Generic numeric type**. The numeric type used in this library is not fixed, but instead a
//! generic parameter, so that the integration routines can be used with either `f32`, `f64`, or a
//! custom numeric type that implements the `Float` trait from the `num-traits` crate.
//! - **Generic random number generator**. Every random number generator that implements the `Rng`
//! trait from the `rand` crate can be used with every integrator in this crate.
//! - **Reproducibility**. As far as the numeric type allows this, all results produced with
//! `mcintir` are completely reproducible, in the sense that the results only depend on the used
//! random number generator and the chosen seed. In particular, the results do not depend on the
//! number of processes the integration was distributed on, up to the order of floating-point
//! summations.
//! - **Distributed integration**. Every integrator can run cooperatively on the members of a
//! [`ProcessGroup`](distributed::ProcessGroup): threads connected by channels, or MPI processes
//! with the `mpi` feature. Each member evaluates a share of the calls and all members end every
//! iteration with the same merged result, grid and channel weights.
//! - **Non-finite number filtering**. All integrators filter out non-finite numbers such as `inf`
//! or `nan`, which integrands sometimes produce in extreme regions of their integration domain due
//! to finite numerical precision. When this happens the result of the corresponding call is set to
//! zero to not destroy the integration and a counter is increased that keeps track of how often
//! this happened.
//! - **Zero tracking**. If your integrand returns zero, another counter will be increased to keep
//! track of the efficiency of the integration.
//! - **Checkpoints**. Every iteration produces a serializable checkpoint with the state of the
//! generator before and after it, the estimators, and the grid or channel weights that were used.
//! An integration can be resumed from any checkpoint without a difference in the final results.
//! - **Distributions**. Often one is not only interested in the integral itself, but also in
//! integrals over a smaller integration (sub-)domains: histograms! They can be estimated along with
//! the full integral itself, without any additional integrand evaluations.
//!
//! # How do I get started?
//!
//! Wrap your function with one of the constructors in [`integrands`] and pass it to the
//! `integrate` function of an integrator:
//!
//! ```
//! use mcintir::callbacks::SinkCallback;
//! use mcintir::estimators::BasicEstimators;
//! use mcintir::integrands::make_integrand;
//! use mcintir::integrators::vegas::{self, VegasConfig};
//! use rand_pcg::Pcg64;
//!
//! let integrand = make_integrand(2, |x: &[f64]| 4.0 * x[0] * x[1]);
//! let rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
//! let chkpts = vegas::integrate(
//!     &integrand,
//!     &rng,
//!     &SinkCallback {},
//!     &[10_000; 5],
//!     &VegasConfig::default(),
//!     None,
//! )?;
//!
//! let result = chkpts.last().unwrap().estimators();
//! assert!((result.mean() - 1.0).abs() < 5.0 * result.std());
//! # Ok::<(), mcintir::Error>(())
//! ```
//!
//! # What is ...?
//!
//! This section is a dictionary of terms that are used in this documentation. Given
//!
//! $$ I = \prod_{i=1}^d \int_0^1 \mathrm{d} x_i f(x_1, x_2, \ldots, x_d) $$
//!
//! we approximate $I$ using PLAIN Monte Carlo integration with
//!
//! $$ I \approx \frac{1}{N} \sum_{j=1}^N f \left( x_1^{(j)}, x_2^{(j)}, \ldots, x_d^{(j)} \right)
//! $$
//!
//! where for each $j$ the values of the arguments are uniformly distributed in $[0,1)$. We use the
//! following terms:
//!
//! - the number of *calls* or the *sample size* is $N$, which is the number of times the integrand
//! is evaluated. We assume that this is the expensive operation;
//! - the *integrand* is the function, $f(x_1, x_2, \ldots, x_d)$, that is being integrated,
//! - the number of *dimensions*, $d$, is number of dimensions of the integration domain,
//! - the *integral* is the (approximated) numeric value of the integral $I$,
//! - *efficiency* is the percentage of times the integrand evaluated to a value different from
//! zero. If your integrand returns zero very often, for example in 99% of the time, than the
//! efficiency is only 1%. This number should not be too small, otherwise it is possible than the
//! statistical uncertainties are underestimated,
//! - a *grid* or *pdf* is the piecewise constant probability density VEGAS samples with,
//! - a *channel* is a mapping of the unit hypercube onto the integration domain together with its
//! density; its *weight* is the fraction of the calls it generates.
//!
//! [Monte Carlo integration]: https://en.wikipedia.org/wiki/Monte_Carlo_integration
//! [integrals]: https://en.wikipedia.org/wiki/Integral
//! [VEGAS]: https://en.wikipedia.org/wiki/VEGAS_algorithm

pub mod callbacks;
pub mod core;
pub mod distributed;
pub mod distributions;
pub mod integrands;
pub mod integrators;

pub use crate::core::error::Error;
pub use crate::core::*;
