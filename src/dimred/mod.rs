//! # Dimensionality Reduction
//!
//! This module provides algorithms that describe high-dimensional flux data with a few
//! interpretable components.
//!
//! ## Currently Available
//! - **PEMA** ([`pema`]): Principal Elementary Mode Analysis. Instead of abstract principal
//!   components, the components are elementary flux modes of the metabolic network, chosen so that
//!   a small number of them reconstructs the observed fluxes.
//!
//! ## Algorithm Selection Guide
//! - Use **PEMA** when the elementary modes of the network are known and the reduced description
//!   should stay biologically interpretable
//! - Raise `relaxations` when greedy forward selection gets stuck on a mode that only looks good
//!   on its own

pub mod pema;
