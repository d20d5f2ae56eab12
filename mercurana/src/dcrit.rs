//! Critical-radius helpers.

use super::convert;
use super::scheme::Scheme;

/// Deterministic cube root.
///
/// Newton iteration on `x^3 = a` with a fixed-point exit, so that repeated
/// evaluations produce bit-identical results independent of the platform's
/// `pow` implementation.
pub(crate) fn cbrt_newton(a: f64) -> f64 {
    if a <= 0.0 {
        return 0.0;
    }

    let mut x = if a > 1.0 { a } else { 1.0 };

    for _ in 0..200 {
        let next = (2.0 * x + a / (x * x)) / 3.0;
        if next == x {
            break;
        }
        x = next;
    }

    x
}

/// Gravitational critical radius of a particle for the outermost timestep.
///
/// The relativistic variant applies whenever `gm0r0` is positive and takes
/// over where it exceeds the Newtonian estimate.
pub(crate) fn gravity_radius(g: f64, dt0: f64, mass: f64, kappa: f64, gm0r0: f64) -> f64 {
    let newtonian = cbrt_newton(g * dt0 * dt0 * mass / kappa);

    if gm0r0 > 0.0 {
        let relativistic = (g * g * dt0 * dt0 * mass * mass / (gm0r0 * kappa)).sqrt().sqrt();
        newtonian.max(relativistic)
    } else {
        newtonian
    }
}

/// Ratio of the shell sub-step length to the outermost timestep, per shell.
///
/// Entering shell `s` from shell `s - 1` divides the step by the recursion
/// count of shell `s - 1` and scales it by the longest drift sub-step of the
/// composition running at shell `s`. The ratios are clamped so that deeper
/// shells never exceed outer ones.
pub(crate) fn substep_ratios(nmaxshells: usize, n0: usize, n1: usize, phi1: Scheme) -> Vec<f64> {
    let mut ratios = Vec::with_capacity(nmaxshells);
    let mut ratio = 1.0;
    ratios.push(ratio);

    for s in 1..nmaxshells {
        let n_rec = if s - 1 > 0 && n1 > 0 { n1 } else { n0 };
        let scaled = ratio * phi1.longest_drift() / convert::f64_from_usize(n_rec.max(1));
        ratio = scaled.min(ratio);
        ratios.push(ratio);
    }

    ratios
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn newton_cube_root_agrees_with_the_standard_library() {
        for &a in &[1e-12, 1e-3, 0.5, 1.0, 8.0, 27.0, 1e6, 3.7e11] {
            assert_approx_eq!(f64, cbrt_newton(a), a.cbrt(), ulps = 4);
        }
    }

    #[test]
    fn newton_cube_root_clamps_nonpositive_input() {
        assert_eq!(cbrt_newton(0.0), 0.0);
        assert_eq!(cbrt_newton(-8.0), 0.0);
    }

    #[test]
    fn newton_cube_root_is_deterministic() {
        let first = cbrt_newton(12.345);
        let second = cbrt_newton(12.345);

        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn relativistic_radius_takes_over_for_large_masses() {
        let newtonian_only = gravity_radius(1.0, 0.1, 1.0, 1e-3, 0.0);
        let with_term = gravity_radius(1.0, 0.1, 1.0, 1e-3, 1e-8);

        assert!(with_term >= newtonian_only);
    }

    #[test]
    fn substep_ratios_are_monotone_non_increasing() {
        for scheme in Scheme::all() {
            let ratios = substep_ratios(8, 2, 3, scheme);

            assert_eq!(ratios.len(), 8);
            assert_eq!(ratios[0], 1.0);
            for pair in ratios.windows(2) {
                assert!(pair[1] <= pair[0]);
            }
        }
    }

    #[test]
    fn substep_ratios_follow_the_recursion_counts() {
        let ratios = substep_ratios(3, 2, 4, Scheme::Lf);

        // shell 1 is entered with n0 sub-steps, shell 2 with n1
        assert_approx_eq!(f64, ratios[1], 0.5 / 2.0);
        assert_approx_eq!(f64, ratios[2], 0.5 / 2.0 * 0.5 / 4.0);
    }
}
