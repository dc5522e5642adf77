//! Numerical primitives for SCPN GLE Core.

pub mod diff;
pub mod fft;
pub mod linalg;
pub mod quadrature;
pub mod triangular;
