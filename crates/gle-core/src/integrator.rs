// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Integrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward integration of dA/dt = Ω(t) A(t) + ∫₀ᵗ K(t,s) A(s) ds + F(t).
//!
//! Symmetric: RK4 over steps of 2·dt with the odd sample rebuilt by the cubic
//! Hermite midpoint, Heun for a trailing single interval.
//! Darboux: explicit Euler with the left-sum memory term.
//!
//! Every path advances a whole batch: the state is a [T·d, N] history matrix
//! with one column per realization.

use gle_types::config::Discretization;
use gle_types::error::{GleError, GleResult, Stage};
use gle_types::state::{ensure_finite, Drift, MemoryKernel};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use tracing::{debug, info};

use crate::force::{check_model, history_columns};
use crate::memory::MemoryOperator;
use crate::noise::NoiseModel;

fn axpy(a: &Array2<f64>, h: f64, k: &Array2<f64>) -> Array2<f64> {
    let mut out = a.clone();
    out.scaled_add(h, k);
    out
}

#[derive(Debug, Clone)]
pub struct Integrator {
    drift: Drift,
    memory: MemoryOperator,
    dt: f64,
}

impl Integrator {
    pub fn new(drift: Drift, kernel: &MemoryKernel, dt: f64, rule: Discretization) -> GleResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(GleError::ConfigError(format!(
                "integrator requires finite dt > 0, got {dt}"
            )));
        }
        check_model(kernel.num_steps(), kernel.num_obs(), &drift, kernel, Stage::Integrator)?;
        Ok(Self {
            drift,
            memory: MemoryOperator::new(kernel, rule, dt),
            dt,
        })
    }

    pub fn num_steps(&self) -> usize {
        self.memory.num_steps()
    }

    pub fn num_obs(&self) -> usize {
        self.memory.num_obs()
    }

    pub fn rule(&self) -> Discretization {
        self.memory.rule()
    }

    /// One trajectory from `initial` [d] driven by `force` [T, d].
    pub fn integrate(&self, initial: ArrayView1<f64>, force: ArrayView2<f64>) -> GleResult<Array2<f64>> {
        let initial = initial.to_owned().insert_axis(Axis(0));
        let forces = force.to_owned().insert_axis(Axis(0));
        let out = self.integrate_batch(&initial, &forces)?;
        Ok(out.index_axis_move(Axis(0), 0))
    }

    /// Trajectories [N, T, d] from initial values [N, d] and forces [N, T, d].
    pub fn integrate_batch(&self, initial: &Array2<f64>, forces: &Array3<f64>) -> GleResult<Array3<f64>> {
        let (n, steps, d) = forces.dim();
        if steps != self.num_steps() || d != self.num_obs() || initial.dim() != (n, d) {
            return Err(GleError::shape(
                Stage::Integrator,
                format!(
                    "forces {:?} and initial values {:?} do not fit a model of {} steps and {} observables",
                    forces.dim(),
                    initial.dim(),
                    self.num_steps(),
                    self.num_obs()
                ),
            ));
        }
        ensure_finite(initial, Stage::Integrator, "initial values")?;
        ensure_finite(forces, Stage::Integrator, "forces")?;

        let force_cols = history_columns(forces);
        let mut hist = Array2::<f64>::zeros((steps * d, n));
        if steps > 0 {
            hist.slice_mut(s![0..d, ..]).assign(&initial.t());
        }
        match self.rule() {
            Discretization::Symmetric => self.run_rk4(&mut hist, &force_cols),
            Discretization::Darboux => self.run_euler(&mut hist, &force_cols),
        }
        ensure_finite(&hist, Stage::Integrator, "trajectories")?;
        debug!(realizations = n, steps, rule = ?self.rule(), "batch integrated");
        Ok(Array3::from_shape_fn((n, steps, d), |(k, t, i)| hist[[t * d + i, k]]))
    }

    fn sample(&self, hist: &Array2<f64>, step: usize) -> Array2<f64> {
        let d = self.num_obs();
        hist.slice(s![step * d..(step + 1) * d, ..]).to_owned()
    }

    fn store(&self, hist: &mut Array2<f64>, step: usize, value: &Array2<f64>) {
        let d = self.num_obs();
        hist.slice_mut(s![step * d..(step + 1) * d, ..]).assign(value);
    }

    /// Right-hand side at `step` for every column, shape [d, N].
    fn rhs(&self, hist: &Array2<f64>, forces: &Array2<f64>, step: usize) -> Array2<f64> {
        let d = self.num_obs();
        let rows = step * d..(step + 1) * d;
        let mut out = self.drift.at(step).dot(&hist.slice(s![rows.clone(), ..]));
        out += &self.memory.apply(step, hist.view());
        out += &forces.slice(s![rows, ..]);
        out
    }

    fn run_euler(&self, hist: &mut Array2<f64>, forces: &Array2<f64>) {
        for t in 0..self.num_steps().saturating_sub(1) {
            let k = self.rhs(hist, forces, t);
            let next = axpy(&self.sample(hist, t), self.dt, &k);
            self.store(hist, t + 1, &next);
        }
    }

    fn run_rk4(&self, hist: &mut Array2<f64>, forces: &Array2<f64>) {
        let steps = self.num_steps();
        let dt = self.dt;
        let mut n = 0;
        while n + 2 < steps {
            let a0 = self.sample(hist, n);
            let k1 = self.rhs(hist, forces, n);
            self.store(hist, n + 1, &axpy(&a0, dt, &k1));
            let k2 = self.rhs(hist, forces, n + 1);
            self.store(hist, n + 1, &axpy(&a0, dt, &k2));
            let k3 = self.rhs(hist, forces, n + 1);
            self.store(hist, n + 2, &axpy(&a0, 2.0 * dt, &k3));
            let k4 = self.rhs(hist, forces, n + 2);
            let slope = &k1 + &(&k2 * 2.0) + &(&k3 * 2.0) + &k4;
            self.store(hist, n + 2, &axpy(&a0, dt / 3.0, &slope));

            // Hermite midpoint from both ends and their slopes.
            let k5 = self.rhs(hist, forces, n + 2);
            let a2 = self.sample(hist, n + 2);
            let mid = axpy(&((&a0 + &a2) * 0.5), 0.25 * dt, &(&k1 - &k5));
            self.store(hist, n + 1, &mid);
            n += 2;
        }
        if n + 1 < steps {
            let a0 = self.sample(hist, n);
            let k1 = self.rhs(hist, forces, n);
            self.store(hist, n + 1, &axpy(&a0, dt, &k1));
            let k2 = self.rhs(hist, forces, n + 1);
            self.store(hist, n + 1, &axpy(&a0, 0.5 * dt, &(&k1 + &k2)));
        }
    }
}

/// Source of initial values for simulated trajectories.
#[derive(Debug, Clone)]
pub enum InitialValues {
    /// Observed initial values [N_obs, d], reused cyclically.
    Observed(Array2<f64>),
    /// Drawn with the forces: the noise model covers T+1 slots and slot 0 is A(0).
    Gaussian,
}

/// Draws forces and integrates synthetic trajectories in batches.
#[derive(Debug, Clone)]
pub struct Simulator {
    integrator: Integrator,
    noise: NoiseModel,
    initial: InitialValues,
    offset: Array1<f64>,
    batch_size: usize,
}

impl Simulator {
    /// `offset` [d] is added to every simulated sample (the mean initial value
    /// removed during preprocessing, or zeros).
    pub fn new(
        integrator: Integrator,
        noise: NoiseModel,
        initial: InitialValues,
        offset: Array1<f64>,
    ) -> GleResult<Self> {
        let (steps, d) = (integrator.num_steps(), integrator.num_obs());
        let slots = match &initial {
            InitialValues::Observed(values) => {
                if values.nrows() == 0 || values.ncols() != d {
                    return Err(GleError::shape(
                        Stage::Integrator,
                        format!("observed initial values {:?} for {d} observables", values.dim()),
                    ));
                }
                steps
            }
            InitialValues::Gaussian => steps + 1,
        };
        if noise.num_steps() != slots || noise.num_obs() != d {
            return Err(GleError::shape(
                Stage::Integrator,
                format!(
                    "noise model covers {} steps of {} observables, expected {slots} of {d}",
                    noise.num_steps(),
                    noise.num_obs()
                ),
            ));
        }
        if offset.len() != d {
            return Err(GleError::shape(
                Stage::Integrator,
                format!("offset has {} entries, expected {d}", offset.len()),
            ));
        }
        Ok(Self {
            integrator,
            noise,
            initial,
            offset,
            batch_size: 256,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// `num_sim` trajectories, shape [num_sim, T, d].
    pub fn simulate<R: Rng + ?Sized>(&self, num_sim: usize, rng: &mut R) -> GleResult<Array3<f64>> {
        let (steps, d) = (self.integrator.num_steps(), self.integrator.num_obs());
        info!(
            num_sim,
            steps,
            batch_size = self.batch_size,
            rule = ?self.integrator.rule(),
            "simulating trajectories"
        );
        let mut out = Array3::<f64>::zeros((num_sim, steps, d));
        let mut start = 0;
        while start < num_sim {
            let len = self.batch_size.min(num_sim - start);
            let mut initial = Array2::<f64>::zeros((len, d));
            let mut forces = Array3::<f64>::zeros((len, steps, d));
            for k in 0..len {
                let draw = self.noise.draw(rng);
                match &self.initial {
                    InitialValues::Observed(values) => {
                        initial.row_mut(k).assign(&values.row((start + k) % values.nrows()));
                        forces.index_axis_mut(Axis(0), k).assign(&draw);
                    }
                    InitialValues::Gaussian => {
                        initial.row_mut(k).assign(&draw.row(0));
                        forces
                            .index_axis_mut(Axis(0), k)
                            .assign(&draw.slice(s![1.., ..]));
                    }
                }
            }
            let batch = self.integrator.integrate_batch(&initial, &forces)? + &self.offset;
            out.slice_mut(s![start..start + len, .., ..]).assign(&batch);
            debug!(start, len, "simulation batch done");
            start += len;
        }
        Ok(out)
    }
}
