// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Property-Based Tests (proptest) for gle-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for gle-core using proptest.
//!
//! Covers: correlation symmetry, kernel causality, zero-kernel reduction,
//! Darboux extraction/integration round trip, sampler covariances.

use gle_core::correlation::{lag_correlation_direct, lag_correlation_spectral, two_time_correlation};
use gle_core::force::{FluctuatingForceExtractor, ForceStatistics};
use gle_core::integrator::Integrator;
use gle_core::kernel::KernelSolver;
use gle_core::noise::{DenseNoise, SpectralNoise};
use gle_types::config::{Discretization, Mode};
use gle_types::state::{Correlation, Drift, MemoryKernel};
use ndarray::{Array2, Array3, Array4, Axis};
use proptest::prelude::*;

fn ensemble_strategy(
    max_n: usize,
    max_t: usize,
    max_d: usize,
) -> impl Strategy<Value = Array3<f64>> {
    (1usize..=max_n, 3usize..=max_t, 1usize..=max_d).prop_flat_map(|(n, t, d)| {
        prop::collection::vec(-1.0f64..1.0, n * t * d)
            .prop_map(move |v| Array3::from_shape_vec((n, t, d), v).expect("length matches"))
    })
}

// ── Correlation ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_two_time_correlation_symmetric(values in ensemble_strategy(6, 7, 3)) {
        let c = two_time_correlation(&values).unwrap();
        let (t, d, _, _) = c.dim();
        for a in 0..t {
            for i in 0..d {
                for b in 0..t {
                    for j in 0..d {
                        prop_assert!((c[[a, i, b, j]] - c[[b, j, a, i]]).abs() < 1e-13);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_lag_correlation_methods_agree(values in ensemble_strategy(4, 9, 2)) {
        let direct = lag_correlation_direct(&values).unwrap();
        let spectral = lag_correlation_spectral(&values).unwrap();
        for (a, b) in direct.iter().zip(spectral.iter()) {
            prop_assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn prop_lag_correlation_reflects(values in ensemble_strategy(4, 8, 3)) {
        let c = lag_correlation_direct(&values).unwrap();
        let (lags, d, _) = c.dim();
        for k in 0..lags {
            for i in 0..d {
                for j in 0..d {
                    prop_assert!((c[[k, i, j]] - c[[lags - 1 - k, j, i]]).abs() < 1e-13);
                }
            }
        }
    }
}

// ── Kernel ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_kernel_is_causal(
        steps in 4usize..10,
        rate in 0.2f64..2.0,
        dt in 0.05f64..0.5,
    ) {
        let corr = Correlation::NonStationary(Array4::from_shape_fn(
            (steps, 1, steps, 1),
            |(t, _, s, _)| (-rate * (t as f64 - s as f64).abs() * dt).exp(),
        ));
        let kernel = KernelSolver::new(dt).unwrap().solve(&corr).unwrap();
        if let MemoryKernel::NonStationary(k) = kernel {
            for t in 0..steps {
                for s in t + 1..steps {
                    prop_assert_eq!(k[[t, s, 0, 0]], 0.0);
                }
            }
        } else {
            prop_assert!(false, "mode changed");
        }
    }
}

// ── Forces and integration ───────────────────────────────────────────

fn drift_for(steps: usize, d: usize, scale: f64) -> Drift {
    Drift::NonStationary(Array3::from_shape_fn((steps, d, d), |(t, i, j)| {
        scale * ((t * 3 + i * 5 + j * 7) % 5) as f64 - scale
    }))
}

fn decaying_kernel(steps: usize, d: usize, strength: f64, dt: f64) -> MemoryKernel {
    MemoryKernel::Stationary(Array3::from_shape_fn((steps, d, d), |(l, i, j)| {
        let off = if i == j { 1.0 } else { 0.2 };
        -strength * off * (-(l as f64) * dt).exp()
    }))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_zero_kernel_leaves_drift_residual(
        values in ensemble_strategy(3, 8, 2),
        scale in 0.0f64..1.0,
    ) {
        let (_, t, d) = values.dim();
        let dt = 0.1;
        let drift = drift_for(t, d, scale);
        let forces = FluctuatingForceExtractor::new(dt, Discretization::Darboux)
            .unwrap()
            .extract(&values, &drift, &MemoryKernel::zeros(Mode::Stationary, t, d))
            .unwrap();
        for n in 0..values.len_of(Axis(0)) {
            for step in 0..t - 1 {
                let a = values.slice(ndarray::s![n, step, ..]);
                let rate = (&values.slice(ndarray::s![n, step + 1, ..]) - &a) / dt;
                let expected = &rate - &drift.at(step).dot(&a);
                for i in 0..d {
                    prop_assert!((forces[[n, step, i]] - expected[i]).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn prop_darboux_round_trip(
        values in ensemble_strategy(3, 9, 2),
        strength in 0.0f64..1.5,
        scale in 0.0f64..0.5,
    ) {
        let (_, t, d) = values.dim();
        let dt = 0.1;
        let drift = drift_for(t, d, scale);
        let kernel = decaying_kernel(t, d, strength, dt);
        let forces = FluctuatingForceExtractor::new(dt, Discretization::Darboux)
            .unwrap()
            .extract(&values, &drift, &kernel)
            .unwrap();
        let integrator = Integrator::new(drift, &kernel, dt, Discretization::Darboux).unwrap();
        let initial = values.index_axis(Axis(1), 0).to_owned();
        let rebuilt = integrator.integrate_batch(&initial, &forces).unwrap();
        for (a, b) in rebuilt.iter().zip(values.iter()) {
            prop_assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }
}

// ── Noise ────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_dense_sampler_realises_gram_covariance(
        entries in prop::collection::vec(-1.0f64..1.0, 36),
    ) {
        let b = Array2::from_shape_vec((6, 6), entries).unwrap();
        let sigma = b.dot(&b.t());
        let stats = ForceStatistics {
            mean: Array2::zeros((3, 2)),
            covariance: Array4::from_shape_fn((3, 2, 3, 2), |(a, i, c, j)| sigma[[a * 2 + i, c * 2 + j]]),
        };
        let noise = DenseNoise::from_statistics(&stats).unwrap();
        let implied = noise.implied_covariance();
        for (x, y) in implied.iter().zip(sigma.iter()) {
            prop_assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_spectral_sampler_realises_exponential_lags(
        steps in 3usize..20,
        length in 0.2f64..1.0,
    ) {
        let center = (steps - 1) as f64;
        let lag = Array3::from_shape_fn((2 * steps - 1, 1, 1), |(k, _, _)| {
            (-(k as f64 - center).abs() / length).exp()
        });
        let noise = SpectralNoise::from_lag_covariance(Array2::zeros((steps, 1)), &lag).unwrap();
        let implied = noise.implied_lag_covariance();
        for (x, y) in implied.iter().zip(lag.iter()) {
            prop_assert!((x - y).abs() < 1e-9);
        }
    }
}
