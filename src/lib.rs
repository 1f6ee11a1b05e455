//! Monte Carlo simulation of light propagation in multi-layered tissue
//! with an optional embedded ellipsoidal inhomogeneity. Photon packets are
//! launched from a collimated or focused beam, traced through the
//! absorbing and scattering stack across index-mismatched planar
//! interfaces, and tallied as spatially, angularly and temporally resolved
//! reflectance, transmittance, absorption and fluence. Each terminated
//! packet additionally feeds a per-voxel face accumulator (the photon
//! "banana") used by adjoint perturbation Monte Carlo post-processing.

#[macro_use]
extern crate impl_ops;

#[macro_use]
extern crate serde;

#[macro_use]
extern crate pest_derive;

pub mod core;
pub mod shapes;
