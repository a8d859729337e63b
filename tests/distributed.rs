use mcintir::callbacks::SinkCallback;
use mcintir::distributed::{ProcessGroup, SingleProcess, ThreadGroup};
use mcintir::estimators::{BasicEstimators, Estimators};
use mcintir::integrands::{make_integrand, make_multi_channel_integrand};
use mcintir::integrators::multi_channel::{self, make_channel, ChannelMapSet, MultiChannelConfig};
use mcintir::integrators::{plain, vegas};
use mcintir::Error;

use assert_approx_eq::assert_approx_eq;
use crossbeam as cb;
use rand_pcg::Pcg64;
use serde::Serialize;

fn rng() -> Pcg64 {
    Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
}

fn json<S: Serialize>(value: &S) -> String {
    serde_json::to_string(value).unwrap()
}

/// Runs `run` on every member of a group of `size` threads and returns the results in rank order.
fn run_group<R, F>(size: usize, run: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ThreadGroup<f64>) -> R + Sync,
{
    let run = &run;

    cb::thread::scope(|s| {
        let handles: Vec<_> = ThreadGroup::new(size)
            .into_iter()
            .map(|member| s.spawn(move |_| run(&member)))
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
    .unwrap()
}

#[test]
fn vegas_does_not_depend_on_the_group_size() {
    let integrand = make_integrand(2, |x: &[f64]| (-10.0 * (x[0] + x[1])).exp());
    let config = vegas::VegasConfig {
        bins: 32,
        ..vegas::VegasConfig::default()
    };
    let iterations = [999, 1000, 1001];

    let single =
        vegas::integrate(&integrand, &rng(), &SinkCallback {}, &iterations, &config, None)
            .unwrap();

    let results = run_group(3, |group| {
        vegas::distributed_integrate(
            group,
            &integrand,
            &rng(),
            &SinkCallback {},
            &iterations,
            &config,
            None,
        )
        .unwrap()
    });

    // all members end up in exactly the same state
    for chkpts in &results[1..] {
        for (lhs, rhs) in chkpts.iter().zip(&results[0]) {
            assert_eq!(lhs.estimators().mc_estimators(), rhs.estimators().mc_estimators());
            assert_eq!(lhs.estimators().pdf(), rhs.estimators().pdf());
            assert_eq!(lhs.estimators().adjustment(), rhs.estimators().adjustment());
        }
    }

    // and agree with a single process up to the order of the summation
    for (lhs, rhs) in results[0].iter().zip(&single) {
        let (lhs_e, rhs_e) = (lhs.estimators(), rhs.estimators());

        assert_eq!(lhs_e.calls(), rhs_e.calls());
        assert_eq!(lhs_e.non_zero_calls(), rhs_e.non_zero_calls());
        assert_approx_eq!(lhs_e.mean(), rhs_e.mean(), 1e-12);
        assert_approx_eq!(lhs_e.var(), rhs_e.var(), 1e-12);

        for d in 0..2 {
            for (a, b) in lhs_e.pdf().edges(d).iter().zip(rhs_e.pdf().edges(d)) {
                assert_approx_eq!(a, b, 1e-9);
            }
        }

        assert_eq!(json(lhs.rng_before()), json(rhs.rng_before()));
        assert_eq!(json(lhs.rng_after()), json(rhs.rng_after()));
    }
}

#[test]
fn multi_channel_does_not_depend_on_the_group_size() {
    let map = ChannelMapSet::new(1, 1)
        .with_channel(make_channel(
            |r: &[f64], x: &mut [f64]| {
                x[0] = r[0];
                1.0
            },
            |_: &[f64]| 1.0,
        ))
        .with_channel(make_channel(
            |r: &[f64], x: &mut [f64]| {
                x[0] = r[0] * r[0];
                2.0 * r[0]
            },
            |x: &[f64]| 0.5 / x[0].sqrt(),
        ));
    let integrand = make_multi_channel_integrand(1, map, |x: &[f64]| 1.0 + x[0].sqrt().recip());
    let config = MultiChannelConfig {
        min_calls_per_channel: 10,
        ..MultiChannelConfig::default()
    };
    let iterations = [500, 501, 502];

    let single = multi_channel::integrate(
        &integrand,
        &rng(),
        &SinkCallback {},
        &iterations,
        &config,
        Some(vec![0.8, 0.2]),
    )
    .unwrap();

    let results = run_group(4, |group| {
        multi_channel::distributed_integrate(
            group,
            &integrand,
            &rng(),
            &SinkCallback {},
            &iterations,
            &config,
            Some(vec![0.8, 0.2]),
        )
        .unwrap()
    });

    for chkpts in &results[1..] {
        for (lhs, rhs) in chkpts.iter().zip(&results[0]) {
            assert_eq!(
                lhs.estimators().channel_estimators(),
                rhs.estimators().channel_estimators()
            );
            assert_eq!(lhs.estimators().weight_info(), rhs.estimators().weight_info());
        }
    }

    for (lhs, rhs) in results[0].iter().zip(&single) {
        let (lhs_e, rhs_e) = (lhs.estimators(), rhs.estimators());

        assert_eq!(lhs_e.calls(), rhs_e.calls());
        assert_approx_eq!(lhs_e.mean(), rhs_e.mean(), 1e-12);
        assert_approx_eq!(lhs_e.var(), rhs_e.var(), 1e-12);

        for (a, b) in lhs_e
            .weight_info()
            .weights()
            .iter()
            .zip(rhs_e.weight_info().weights())
        {
            assert_approx_eq!(a, b, 1e-9);
        }

        assert_eq!(json(lhs.rng_after()), json(rhs.rng_after()));
    }
}

#[test]
fn more_members_than_calls() {
    let integrand = make_integrand(1, |x: &[f64]| x[0]);

    let single = plain::integrate(&integrand, &rng(), &SinkCallback {}, &[3, 2]).unwrap();
    let results = run_group(5, |group| {
        plain::distributed_integrate(group, &integrand, &rng(), &SinkCallback {}, &[3, 2]).unwrap()
    });

    for chkpts in &results {
        assert_eq!(chkpts[0].estimators().calls(), 3);
        assert_eq!(chkpts[1].estimators().calls(), 2);
        assert_approx_eq!(chkpts[1].estimators().mean(), single[1].estimators().mean(), 1e-15);
        assert_eq!(json(chkpts[1].rng_after()), json(single[1].rng_after()));
    }
}

#[test]
fn single_process_is_the_plain_entry_point() {
    let integrand = make_integrand(3, |x: &[f64]| x[0] + x[1] * x[2]);
    let config = vegas::VegasConfig::default();

    let lhs = vegas::integrate(&integrand, &rng(), &SinkCallback {}, &[500; 3], &config, None)
        .unwrap();
    let rhs = vegas::distributed_integrate(
        &SingleProcess,
        &integrand,
        &rng(),
        &SinkCallback {},
        &[500; 3],
        &config,
        None,
    )
    .unwrap();

    assert_eq!(ProcessGroup::<f64>::size(&SingleProcess), 1);

    for (lhs, rhs) in lhs.iter().zip(&rhs) {
        assert_eq!(lhs.estimators().mc_estimators(), rhs.estimators().mc_estimators());
        assert_eq!(lhs.estimators().pdf(), rhs.estimators().pdf());
    }
}

#[test]
fn a_missing_member_is_an_error() {
    let integrand = make_integrand(1, |x: &[f64]| x[0]);
    let mut members = ThreadGroup::<f64>::new(3);
    drop(members.pop());

    let results: Vec<_> = cb::thread::scope(|s| {
        let integrand = &integrand;
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| {
                s.spawn(move |_| {
                    plain::distributed_integrate(
                        &member,
                        integrand,
                        &rng(),
                        &SinkCallback {},
                        &[100],
                    )
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
    .unwrap();

    for result in results {
        assert!(matches!(result, Err(Error::Coordination(_))));
    }
}
