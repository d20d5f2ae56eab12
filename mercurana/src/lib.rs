//! Adaptive symplectic multi-step integrator for gravitational N-body
//! dynamics.
//!
//! The integrator advances a [`simulation::Simulation`] by one global
//! timestep using a named operator-splitting composition of drift and kick
//! operators. Particle pairs that approach each other closer than a critical
//! radius are promoted into nested "shells" which re-apply the same
//! composition with proportionally shorter sub-steps, so that close
//! encounters at arbitrary hierarchical depth are resolved without shrinking
//! the global timestep.

pub mod collision;
pub mod error;
pub mod integrator;
pub mod particle;
pub mod scheme;
pub mod simulation;
pub mod switching;

mod convert;
mod dcrit;
mod gravity;
mod predictor;
mod shell;
