//! Closest-approach estimates for the pair predictor.
//!
//! All estimates assume linear motion over the drift interval; the predictor
//! never evaluates accelerations.

use super::particle::Particle;

/// Minimum squared separation of two particles moving linearly over the
/// signed drift interval `[0, dt]`.
///
/// The minimum is attained either at one of the interval endpoints or at the
/// analytic time of closest approach, whichever lies inside the interval.
pub(crate) fn rmin2(p1: &Particle, p2: &Particle, dt: f64) -> f64 {
    let mut dx = [0.0; 3];
    let mut dv = [0.0; 3];
    for k in 0..3 {
        dx[k] = p2.pos[k] - p1.pos[k];
        dv[k] = p2.vel[k] - p1.vel[k];
    }

    let dist2 = |tau: f64| -> f64 {
        let mut sum = 0.0;
        for k in 0..3 {
            let component = tau.mul_add(dv[k], dx[k]);
            sum = component.mul_add(component, sum);
        }
        sum
    };

    let mut min = dist2(0.0).min(dist2(dt));

    let speed2: f64 = dv.iter().map(|v| v * v).sum();
    if speed2 > 0.0 {
        let closest = -(dx[0] * dv[0] + dx[1] * dv[1] + dx[2] * dv[2]) / speed2;
        let (lo, hi) = if dt < 0.0 { (dt, 0.0) } else { (0.0, dt) };
        if closest > lo && closest < hi {
            min = min.min(dist2(closest));
        }
    }

    min
}

/// Like [`rmin2`], but first advances `p2` linearly by `delta` so that both
/// particles are compared at a common epoch. `delta` is the drift time `p2`
/// still owes relative to `p1`.
pub(crate) fn rmin2_drifted(p1: &Particle, p2: &Particle, dt: f64, delta: f64) -> f64 {
    let mut advanced = *p2;
    for k in 0..3 {
        advanced.pos[k] = delta.mul_add(advanced.vel[k], advanced.pos[k]);
    }

    rmin2(p1, &advanced, dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn particle(pos: [f64; 3], vel: [f64; 3]) -> Particle {
        Particle::new(pos, vel, 1.0, 0.0)
    }

    #[test]
    fn resting_particles_keep_their_separation() {
        let p1 = particle([0.0; 3], [0.0; 3]);
        let p2 = particle([3.0, 4.0, 0.0], [0.0; 3]);

        assert_approx_eq!(f64, rmin2(&p1, &p2, 1.0), 25.0);
    }

    #[test]
    fn interior_closest_approach_is_found() {
        // head-on passage offset by one unit: closest approach at t = 1
        let p1 = particle([0.0; 3], [0.0; 3]);
        let p2 = particle([-2.0, 1.0, 0.0], [2.0, 0.0, 0.0]);

        assert_approx_eq!(f64, rmin2(&p1, &p2, 2.0), 1.0);
        // a short interval stops before the approach completes
        assert_approx_eq!(f64, rmin2(&p1, &p2, 0.5), 2.0);
    }

    #[test]
    fn negative_intervals_look_backwards_in_time() {
        let p1 = particle([0.0; 3], [0.0; 3]);
        let p2 = particle([2.0, 1.0, 0.0], [2.0, 0.0, 0.0]);

        // forwards the pair separates, backwards it passes at distance one
        assert_approx_eq!(f64, rmin2(&p1, &p2, 2.0), 5.0);
        assert_approx_eq!(f64, rmin2(&p1, &p2, -2.0), 1.0);
    }

    #[test]
    fn pending_drift_is_applied_before_the_estimate() {
        let p1 = particle([0.0; 3], [0.0; 3]);
        // after catching up by one time unit the particle sits at x = 0
        let p2 = particle([-1.0, 1.0, 0.0], [1.0, 0.0, 0.0]);

        assert_approx_eq!(f64, rmin2_drifted(&p1, &p2, 0.0, 1.0), 1.0);
        assert_approx_eq!(f64, rmin2_drifted(&p1, &p2, 0.0, 0.0), 2.0);
    }

    #[test]
    fn estimate_is_symmetric_under_particle_exchange() {
        let p1 = particle([0.3, -0.2, 0.7], [0.1, 0.0, -0.4]);
        let p2 = particle([-1.1, 0.9, 0.2], [-0.3, 0.2, 0.6]);

        assert_approx_eq!(f64, rmin2(&p1, &p2, 1.7), rmin2(&p2, &p1, 1.7), ulps = 8);
    }
}
