//! Collision recording and resolution.
//!
//! The predictor records pairs whose predicted closest approach falls below
//! the sum of their physical radii. After each predictor pass the collected
//! batch is handed to the installed resolver; removals requested by the
//! resolver are applied by the integrator, which then restarts the predictor
//! at the same shell.

use super::particle::Particle;

/// Indices of two particles that physically overlap during a drift.
pub type CollisionPair = (usize, usize);

/// A collision resolver.
///
/// Receives the particle array and one batch of detected pairs. It may
/// mutate the particles in place and returns the indices of particles to
/// remove; the integrator performs the removal and the associated index
/// remapping.
pub type CollisionResolver = fn(&mut Vec<Particle>, &[CollisionPair]) -> Vec<usize>;

/// Resolver that merges each colliding pair into its first member.
///
/// Mass, momentum, and volume are conserved; the second member of each pair
/// is scheduled for removal. Pairs touching an already-merged particle are
/// skipped for this batch and will be detected again on the next pass if
/// they still overlap.
#[must_use]
pub fn merge_resolver(particles: &mut Vec<Particle>, pairs: &[CollisionPair]) -> Vec<usize> {
    let mut removed: Vec<usize> = Vec::new();

    for &(i, j) in pairs {
        if removed.contains(&i) || removed.contains(&j) {
            continue;
        }

        let absorbed = particles[j];
        let target = &mut particles[i];
        let mass = target.mass + absorbed.mass;

        if mass > 0.0 {
            for k in 0..3 {
                target.pos[k] =
                    target.pos[k].mul_add(target.mass, absorbed.pos[k] * absorbed.mass) / mass;
                target.vel[k] =
                    target.vel[k].mul_add(target.mass, absorbed.vel[k] * absorbed.mass) / mass;
            }
        }
        target.radius = (target.radius.powi(3) + absorbed.radius.powi(3)).cbrt();
        target.mass = mass;

        removed.push(j);
    }

    removed.sort_unstable();
    removed.dedup();
    removed
}
