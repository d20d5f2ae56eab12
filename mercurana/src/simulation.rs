//! Simulation container and host-facing stepping operations.

use super::collision::CollisionResolver;
use super::error::{Error, Result};
use super::gravity;
use super::integrator::Mercurana;
use super::particle::Particle;
use super::switching;
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// Gravity backend identifiers.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum GravityMode {
    /// No gravity is evaluated.
    #[default]
    None,
    /// Plain direct summation over all pairs.
    Basic,
    /// Shell-partitioned forces driven by the adaptive integrator. This
    /// backend is installed while a kick is in flight so that downstream
    /// evaluations can query the current shell; outside a kick the
    /// identifier is forced back to [`GravityMode::None`].
    Mercurana,
}

/// Collision search modes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum CollisionMode {
    /// No collision search.
    #[default]
    None,
    /// Direct pair-wise search inside the predictor.
    Direct,
    /// Tree-accelerated search. Not supported by the adaptive integrator;
    /// substituted by [`CollisionMode::Direct`] with a warning.
    Tree,
}

/// Gravitational N-body simulation state.
///
/// Owns the particle array and the adaptive shell integrator. A global step
/// is performed by [`Self::prepare_step`] followed by [`Self::advance`], or
/// by the [`Self::step`] convenience wrapper.
pub struct Simulation {
    /// The particle array.
    pub particles: Vec<Particle>,
    /// Current simulation time.
    pub t: f64,
    /// Global timestep.
    pub dt: f64,
    /// Length of the last completed global timestep.
    pub dt_last_done: f64,
    /// Gravitational constant.
    pub g: f64,
    /// Active gravity backend identifier.
    pub gravity: GravityMode,
    /// Collision search mode.
    pub collision: CollisionMode,
    /// Installed collision resolver; collisions detected while no resolver
    /// is installed are dropped at the end of the predictor pass.
    pub collision_resolver: Option<CollisionResolver>,
    /// Cooperative cancellation flag. May be set from a signal handler; the
    /// integrator checks it at the top of every drift and returns early
    /// without mutating state.
    pub halt: AtomicBool,
    /// Adaptive shell integrator configuration and state.
    pub mercurana: Mercurana,
    pub(crate) accel: Vec<[f64; 3]>,
    pub(crate) jerk: Vec<[f64; 3]>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// Creates an empty simulation with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            particles: Vec::new(),
            t: 0.0,
            dt: 0.01,
            dt_last_done: 0.0,
            g: 1.0,
            gravity: GravityMode::None,
            collision: CollisionMode::None,
            collision_resolver: None,
            halt: AtomicBool::new(false),
            mercurana: Mercurana::default(),
            accel: Vec::new(),
            jerk: Vec::new(),
        }
    }

    /// Appends a particle to the simulation.
    pub fn add_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    /// Validates the configuration and prepares buffers for the next global
    /// timestep.
    ///
    /// Grows the integrator state when the particle count increased,
    /// installs the default switching function where the host did not
    /// provide one, and recomputes the critical radii when requested. On a
    /// configuration error nothing is mutated and subsequent calls to
    /// [`Self::advance`] are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the shell, sub-step, and accuracy
    /// settings are inconsistent.
    pub fn prepare_step(&mut self) -> Result<()> {
        let ri = &self.mercurana;
        let config_error = if ri.nmaxshells < 1 {
            Some("at least one shell is required".to_string())
        } else if ri.n0 > 0 && ri.nmaxshells < 2 {
            Some(format!(
                "sub-stepping with n0 = {} requires at least two shells",
                ri.n0
            ))
        } else if ri.n1 > 0 && ri.nmaxshells < 3 {
            Some(format!(
                "sub-stepping with n1 = {} requires at least three shells",
                ri.n1
            ))
        } else if ri.nmaxshells > 1 && ri.kappa <= 0.0 {
            Some(format!("kappa = {} must be positive", ri.kappa))
        } else {
            None
        };

        if let Some(message) = config_error {
            self.mercurana.config_valid = false;
            return Err(Error::Config(message));
        }
        self.mercurana.config_valid = true;

        if self.gravity != GravityMode::None {
            warn!("overriding the configured gravity backend; shell forces are evaluated by the integrator");
            self.gravity = GravityMode::None;
        }
        if self.collision == CollisionMode::Tree {
            warn!("tree-based collision search is not supported; falling back to the direct search");
            self.collision = CollisionMode::Direct;
        }
        if self.mercurana.switching.is_none() {
            self.mercurana.switching = Some(switching::partition);
        }
        if self.mercurana.switching_derivative.is_none() {
            self.mercurana.switching_derivative = Some(switching::partition_derivative);
        }

        let n = self.particles.len();
        if self.mercurana.needs_allocation(n) {
            self.mercurana.allocate(n);
            self.mercurana.recalculate_dcrit = true;
        }
        self.accel.resize(self.mercurana.allocated(), [0.0; 3]);
        self.jerk.resize(self.mercurana.allocated(), [0.0; 3]);

        if self.mercurana.recalculate_dcrit {
            if !self.mercurana.is_synchronized() {
                warn!("recomputing critical radii while unsynchronized; synchronizing first");
                self.synchronize();
            }
            let dt = self.dt;
            let g = self.g;
            self.mercurana.recompute_dcrit(dt, g, &self.particles);
            self.mercurana.recalculate_dcrit = false;
        }

        Ok(())
    }

    /// Performs one global timestep.
    ///
    /// A no-op until [`Self::prepare_step`] has succeeded at least once for
    /// the current configuration and particle count.
    pub fn advance(&mut self) {
        if !self.mercurana.config_valid
            || self.particles.is_empty()
            || self.mercurana.allocated() < self.particles.len()
        {
            return;
        }

        let dt = self.dt;
        let phi0 = self.mercurana.phi0;
        self.mercurana.begin_step(&self.particles);

        if self.mercurana.is_synchronized() {
            self.scheme_preprocessor(dt, 0, phi0);
        }
        self.scheme_step(dt, 1.0, 1.0, 0, phi0);
        self.mercurana.mark_unsynchronized();
        self.dt_last_done = dt;

        if self.mercurana.safe_mode {
            self.synchronize();
        }
    }

    /// Prepares and performs one global timestep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration failed validation.
    pub fn step(&mut self) -> Result<()> {
        self.prepare_step()?;
        self.advance();
        Ok(())
    }

    /// Applies the outermost post-processor if it is still pending.
    ///
    /// Idempotent; a second call in a row observes the synchronized flag and
    /// does nothing.
    pub fn synchronize(&mut self) {
        if self.mercurana.is_synchronized() {
            return;
        }

        let dt = if self.dt_last_done == 0.0 {
            self.dt
        } else {
            self.dt_last_done
        };
        let phi0 = self.mercurana.phi0;
        self.scheme_postprocessor(dt, 0, phi0);
        self.mercurana.mark_synchronized();
    }

    /// Evaluates plain direct-summation accelerations for all particles.
    ///
    /// This is the [`GravityMode::Basic`] backend, available to hosts
    /// independently of the adaptive integrator.
    pub fn compute_basic_accelerations(&mut self) -> &[[f64; 3]] {
        self.accel.resize(self.particles.len().max(self.accel.len()), [0.0; 3]);
        gravity::basic_accelerations(&self.particles, self.g, &mut self.accel);
        &self.accel
    }

    /// Total energy of the system, kinetic plus pair-wise potential.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        let kinetic: f64 = self.particles.iter().map(Particle::kinetic_energy).sum();
        let potential: f64 = self
            .particles
            .iter()
            .tuple_combinations()
            .map(|(p1, p2)| {
                let d2 = p1.squared_distance(p2);
                if d2 > 0.0 {
                    -self.g * p1.mass * p2.mass / d2.sqrt()
                } else {
                    0.0
                }
            })
            .sum();

        kinetic + potential
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn invalid_configuration_is_reported_and_latched() {
        let mut sim = Simulation::new();
        sim.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 0.0));
        sim.mercurana.nmaxshells = 1;

        assert!(sim.prepare_step().is_err());

        // part2 must be a no-op after a configuration error
        let before = sim.particles[0];
        sim.advance();
        assert_eq!(sim.particles[0], before);
        assert_eq!(sim.t, 0.0);
    }

    #[test]
    fn kappa_must_be_positive_with_multiple_shells() {
        let mut sim = Simulation::new();
        sim.mercurana.kappa = 0.0;

        assert!(matches!(sim.prepare_step(), Err(Error::Config(_))));
    }

    #[test]
    fn prepare_step_installs_the_default_switching_function() {
        let mut sim = Simulation::new();
        sim.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 0.0));

        sim.prepare_step().unwrap();

        assert!(sim.mercurana.switching.is_some());
        assert!(sim.mercurana.switching_derivative.is_some());
    }

    #[test]
    fn gravity_backend_override_is_reverted() {
        let mut sim = Simulation::new();
        sim.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 0.0));
        sim.gravity = GravityMode::Basic;

        sim.prepare_step().unwrap();

        assert_eq!(sim.gravity, GravityMode::None);
    }

    #[test]
    fn unsupported_collision_search_falls_back_to_direct() {
        let mut sim = Simulation::new();
        sim.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 0.0));
        sim.collision = CollisionMode::Tree;

        sim.prepare_step().unwrap();

        assert_eq!(sim.collision, CollisionMode::Direct);
    }

    #[test]
    fn two_body_energy_is_kinetic_plus_potential() {
        let mut sim = Simulation::new();
        sim.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 0.0));
        sim.add_particle(Particle::new([2.0, 0.0, 0.0], [0.0, 1.0, 0.0], 0.5, 0.0));

        let expected = 0.5 * 0.5 - 1.0 * 0.5 / 2.0;
        assert_approx_eq!(f64, sim.total_energy(), expected);
    }
}
