//! Memory-kernel reconstruction and resynthesis for generalized Langevin
//! equations.
//!
//! Analysis: correlation, kernel, drift, fluctuating force
//! Resynthesis: noise model, integrator, simulator

pub mod cache;
pub mod correlation;
pub mod drift;
pub mod force;
pub mod integrator;
pub mod kernel;
pub mod memory;
pub mod noise;
pub mod pipeline;
pub mod preprocess;
