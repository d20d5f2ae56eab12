//! Two-body scenarios exercising the full integrator through the public
//! interface.

use float_cmp::assert_approx_eq;
use mercurana::collision::merge_resolver;
use mercurana::particle::Particle;
use mercurana::scheme::Scheme;
use mercurana::simulation::{CollisionMode, Simulation};

/// Star of unit mass and a small companion on a circular orbit of radius
/// `r`, set up in the centre-of-mass frame.
fn circular_binary(r: f64, m2: f64) -> Simulation {
    let m1 = 1.0;
    let mu = m1 + m2;
    let v = (mu / r).sqrt();

    let mut sim = Simulation::new();
    sim.mercurana.nmaxshells = 5;
    sim.mercurana.n_dominant = 1;
    sim.add_particle(Particle::new(
        [-m2 * r / mu, 0.0, 0.0],
        [0.0, -m2 * v / mu, 0.0],
        m1,
        0.0,
    ));
    sim.add_particle(Particle::new(
        [m1 * r / mu, 0.0, 0.0],
        [0.0, m1 * v / mu, 0.0],
        m2,
        0.0,
    ));
    sim
}

fn eccentric_binary() -> Simulation {
    let m1 = 1.0;
    let m2 = 1e-3;
    let mu = m1 + m2;
    let r_apo: f64 = 1.9;
    let v_apo = (mu * (2.0 / r_apo - 1.0)).sqrt();

    let mut sim = Simulation::new();
    sim.dt = 0.01;
    sim.mercurana.nmaxshells = 5;
    sim.mercurana.n_dominant = 1;
    sim.add_particle(Particle::new(
        [-m2 * r_apo / mu, 0.0, 0.0],
        [0.0, -m2 * v_apo / mu, 0.0],
        m1,
        0.0,
    ));
    sim.add_particle(Particle::new(
        [m1 * r_apo / mu, 0.0, 0.0],
        [0.0, m1 * v_apo / mu, 0.0],
        m2,
        0.0,
    ));
    sim
}

#[test]
fn widely_separated_orbit_conserves_energy_in_the_outermost_shell() {
    let mut sim = circular_binary(1000.0, 1e-3);
    sim.dt = 0.1;

    let initial = sim.total_energy();
    for _ in 0..10_000 {
        sim.step().unwrap();
        assert_eq!(sim.mercurana.nmaxshells_used(), 1);
    }

    let drift = ((sim.total_energy() - initial) / initial).abs();
    assert!(drift < 1e-10, "energy drift {drift:e}");
    assert_approx_eq!(f64, sim.t, 1000.0, epsilon = 1e-8);
}

#[test]
fn higher_order_composition_beats_leapfrog() {
    let mut errors = Vec::new();

    for scheme in [Scheme::Lf, Scheme::Lf4] {
        let mut sim = circular_binary(10.0, 1e-3);
        sim.dt = 0.1;
        sim.mercurana.phi0 = scheme;

        let initial = sim.total_energy();
        for _ in 0..1000 {
            sim.step().unwrap();
        }
        errors.push(((sim.total_energy() - initial) / initial).abs());
    }

    assert!(errors[0] < 1e-10);
    assert!(errors[1] < errors[0]);
}

#[test]
fn every_scheme_holds_a_circular_orbit() {
    for scheme in Scheme::all() {
        let mut sim = circular_binary(10.0, 1e-3);
        sim.dt = 0.1;
        sim.mercurana.phi0 = scheme;
        sim.mercurana.phi1 = scheme;

        let initial = sim.total_energy();
        for _ in 0..200 {
            sim.step().unwrap();
        }
        let error = ((sim.total_energy() - initial) / initial).abs();

        assert!(error < 1e-6, "{scheme:?}: energy error {error:e}");
    }
}

#[test]
fn deep_encounter_is_resolved_by_nested_shells() {
    let mut sim = eccentric_binary();
    sim.collision = CollisionMode::Direct;
    sim.collision_resolver = Some(merge_resolver);

    let initial = sim.total_energy();
    let mut deepest = 1;
    // one full orbit, through the perihelion passage
    for _ in 0..650 {
        sim.step().unwrap();
        deepest = deepest.max(sim.mercurana.nmaxshells_used());
    }

    // the passage recursed several shells deep, no collision was recorded
    // (both radii are zero), and the energy error stays transient
    assert!(deepest >= 3, "deepest shell used: {deepest}");
    assert_eq!(sim.particles.len(), 2);
    let error = ((sim.total_energy() - initial) / initial).abs();
    assert!(error < 1e-4, "energy error {error:e}");
}

#[test]
fn overlapping_bodies_are_merged_by_the_resolver() {
    let mut sim = Simulation::new();
    sim.dt = 0.1;
    sim.mercurana.nmaxshells = 5;
    sim.collision = CollisionMode::Direct;
    sim.collision_resolver = Some(merge_resolver);
    sim.add_particle(Particle::new(
        [-2.0, 0.0, 0.0],
        [0.1, 0.0, 0.0],
        1e-3,
        0.5,
    ));
    sim.add_particle(Particle::new(
        [2.0, 0.0, 0.0],
        [-0.1, 0.0, 0.0],
        1e-3,
        0.5,
    ));

    for _ in 0..200 {
        sim.step().unwrap();
        if sim.particles.len() == 1 {
            break;
        }
    }

    assert_eq!(sim.particles.len(), 1);
    assert_approx_eq!(f64, sim.particles[0].mass, 2e-3);
    // head-on merger of equal masses comes to rest
    assert_approx_eq!(f64, sim.particles[0].vel[0], 0.0, epsilon = 1e-12);

    // the rerun predictor left the shell maps consistent with one particle
    sim.step().unwrap();
    assert_eq!(sim.mercurana.encounters_at(0), 1);
    assert_eq!(sim.mercurana.subdominants_at(0), 1);
    assert_eq!(sim.mercurana.dominants_at(0), 0);
}

#[test]
fn reset_restores_every_default() {
    let mut sim = eccentric_binary();
    sim.mercurana.n0 = 4;
    sim.mercurana.n1 = 3;
    sim.mercurana.kappa = 1e-5;
    sim.mercurana.alpha = 0.25;
    sim.mercurana.gm0r0 = 1e-8;
    sim.mercurana.phi0 = Scheme::Lf8;
    sim.mercurana.phi1 = Scheme::Lf4;
    sim.mercurana.safe_mode = false;
    sim.step().unwrap();

    sim.mercurana.reset();

    assert_eq!(sim.mercurana.nmaxshells, 10);
    assert_eq!(sim.mercurana.n0, 2);
    assert_eq!(sim.mercurana.n1, 0);
    assert_approx_eq!(f64, sim.mercurana.kappa, 1e-3);
    assert_approx_eq!(f64, sim.mercurana.alpha, 0.5);
    assert_approx_eq!(f64, sim.mercurana.gm0r0, 0.0);
    assert_eq!(sim.mercurana.phi0, Scheme::Lf);
    assert_eq!(sim.mercurana.phi1, Scheme::Lf);
    assert!(sim.mercurana.safe_mode);
    assert_eq!(sim.mercurana.n_dominant, 0);
    assert_eq!(sim.mercurana.nmaxshells_used(), 1);
    assert!(sim.mercurana.is_synchronized());
    assert_eq!(sim.mercurana.allocated(), 0);
    assert!(sim.mercurana.switching.is_none());
    assert!(sim.mercurana.switching_derivative.is_none());
}

#[test]
fn synchronize_is_idempotent() {
    let mut sim = circular_binary(10.0, 1e-3);
    sim.dt = 0.1;
    sim.mercurana.phi0 = Scheme::Pmlf4;
    sim.mercurana.safe_mode = false;

    for _ in 0..3 {
        sim.step().unwrap();
    }
    assert!(!sim.mercurana.is_synchronized());

    sim.synchronize();
    let after_first = sim.particles.clone();
    let t_first = sim.t;

    sim.synchronize();

    assert!(sim.mercurana.is_synchronized());
    assert_eq!(sim.particles, after_first);
    assert_eq!(sim.t, t_first);
}

#[test]
fn forward_and_backward_steps_cancel() {
    let mut sim = circular_binary(1000.0, 1e-3);
    sim.dt = 0.1;

    let before = sim.particles.clone();
    sim.step().unwrap();
    sim.dt = -0.1;
    sim.step().unwrap();

    for (now, then) in sim.particles.iter().zip(&before) {
        for k in 0..3 {
            assert_approx_eq!(f64, now.pos[k], then.pos[k], ulps = 20);
            assert_approx_eq!(f64, now.vel[k], then.vel[k], ulps = 20);
        }
    }
}
