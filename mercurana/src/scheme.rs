//! Named symplectic composition schemes.
//!
//! A composition interleaves drift and kick stages with fixed coefficients.
//! The integrator instantiates one composition per shell and passes its own
//! shell-local drift/kick operators as the primitives, so the same tables
//! drive both the outermost step and every nested sub-step.

use serde::{Deserialize, Serialize};

/// Coefficient tables of one composition scheme.
///
/// A step executes `D(drifts[0] h)`, `K(kicks[0] h, jerks[0] h^3)`,
/// `D(drifts[1] h)`, ... and finishes with the trailing drift, so `drifts`
/// always holds one more entry than `kicks`. `pre` lists the processor
/// stages as `(drift, kick)` coefficient pairs; the post-processor is the
/// exact inverse and is derived from the same table.
pub struct Composition {
    /// Drift-stage coefficients, in units of the step length.
    pub drifts: &'static [f64],
    /// Kick-stage coefficients, in units of the step length.
    pub kicks: &'static [f64],
    /// Modified-kick (force-gradient) coefficients, in units of the cubed
    /// step length. All zero for unmodified schemes.
    pub jerks: &'static [f64],
    /// Processor stages applied before the first step and inverted after the
    /// last one. Empty for unprocessed schemes.
    pub pre: &'static [(f64, f64)],
    /// Design order of the scheme family.
    pub order: u32,
    /// Magnitude of the longest drift sub-step, used to propagate the
    /// critical-radius sub-step length into deeper shells.
    pub longest_drift: f64,
}

const LF: Composition = Composition {
    drifts: &[0.5, 0.5],
    kicks: &[1.0],
    jerks: &[0.0],
    pre: &[],
    order: 2,
    longest_drift: 0.5,
};

// Triple-jump composition; the two base coefficients are 1 / (2 - 2^(1/3))
// and its negative companion.
const LF4: Composition = Composition {
    drifts: &[
        0.6756035959798289,
        -0.17560359597982877,
        -0.17560359597982877,
        0.6756035959798289,
    ],
    kicks: &[
        1.3512071919596578,
        -1.7024143839193153,
        1.3512071919596578,
    ],
    jerks: &[0.0; 3],
    pre: &[],
    order: 4,
    longest_drift: 0.6756035959798289,
};

const LF6: Composition = Composition {
    drifts: &[
        0.39225680523878,
        0.5100434119184585,
        -0.47105338540975655,
        0.0687531682525181,
        0.0687531682525181,
        -0.47105338540975655,
        0.5100434119184585,
        0.39225680523878,
    ],
    kicks: &[
        0.78451361047756,
        0.235573213359357,
        -1.17767998417887,
        1.3151863206839063,
        -1.17767998417887,
        0.235573213359357,
        0.78451361047756,
    ],
    jerks: &[0.0; 7],
    pre: &[],
    order: 6,
    longest_drift: 0.5100434119184585,
};

const LF8: Composition = Composition {
    drifts: &[
        0.521213104349955,
        1.4313162592035251,
        0.9889731189153784,
        1.2988836271454836,
        1.2164287159851346,
        -1.2270808589511606,
        -2.031407782603105,
        -1.6983261840452113,
        -1.6983261840452113,
        -2.031407782603105,
        -1.2270808589511606,
        1.2164287159851346,
        1.2988836271454836,
        0.9889731189153784,
        1.4313162592035251,
        0.521213104349955,
    ],
    kicks: &[
        1.04242620869991,
        1.82020630970714,
        0.157739928123617,
        2.44002732616735,
        -0.0071698941970812,
        -2.44699182370524,
        -1.61582374150097,
        -1.7808286265894524,
        -1.61582374150097,
        -2.44699182370524,
        -0.0071698941970812,
        2.44002732616735,
        0.157739928123617,
        1.82020630970714,
        1.04242620869991,
    ],
    jerks: &[0.0; 15],
    pre: &[],
    order: 8,
    longest_drift: 2.031407782603105,
};

// Two-stage composition with fourth-order behaviour for near-integrable
// splittings; the outer drift coefficient is 1/2 - sqrt(3)/6.
const LF4_2: Composition = Composition {
    drifts: &[
        0.21132486540518713,
        0.5773502691896257,
        0.21132486540518713,
    ],
    kicks: &[0.5, 0.5],
    jerks: &[0.0; 2],
    pre: &[],
    order: 4,
    longest_drift: 0.5773502691896257,
};

const LF8_6_4: Composition = Composition {
    drifts: &[
        0.07113342649822312,
        0.2411534279566401,
        0.5214117617728148,
        -0.6673972324553561,
        0.5214117617728148,
        0.2411534279566401,
        0.07113342649822312,
    ],
    kicks: &[
        0.18308368747219722,
        0.31078285989857485,
        0.006133452629227931,
        0.006133452629227931,
        0.31078285989857485,
        0.18308368747219722,
    ],
    jerks: &[0.0; 6],
    pre: &[],
    order: 4,
    longest_drift: 0.6673972324553561,
};

// Modified leapfrog kernel: the single kick carries a force-gradient term
// with coefficient 1/12, which cancels the potential-potential-kinetic
// bracket of the Strang splitting. The two processor stages commute to the
// remaining kinetic bracket.
const PMLF4: Composition = Composition {
    drifts: &[0.5, 0.5],
    kicks: &[1.0],
    jerks: &[0.08333333333333333],
    pre: &[
        (0.5, -0.08333333333333333),
        (-0.5, 0.08333333333333333),
    ],
    order: 4,
    longest_drift: 0.5,
};

// Force-gradient kernel with kicks 1/6, 2/3, 1/6 and the gradient term on
// the central kick only. The kernel needs no processor at the orders the
// crate exercises.
const PMLF6: Composition = Composition {
    drifts: &[0.0, 0.5, 0.5, 0.0],
    kicks: &[
        0.16666666666666666,
        0.6666666666666666,
        0.16666666666666666,
    ],
    jerks: &[0.0, 0.027777777777777776, 0.0],
    pre: &[],
    order: 6,
    longest_drift: 0.5,
};

// Leapfrog kernel dressed by the same commutator processor as `PMLF4`; the
// processor removes the kinetic-kinetic-potential bracket, which dominates
// for near-integrable splittings.
const PLF7_6_4: Composition = Composition {
    drifts: &[0.5, 0.5],
    kicks: &[1.0],
    jerks: &[0.0],
    pre: &[
        (0.5, -0.08333333333333333),
        (-0.5, 0.08333333333333333),
    ],
    order: 4,
    longest_drift: 0.5,
};

/// Named composition schemes available to the shell composer.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Scheme {
    /// Second-order leapfrog.
    #[default]
    Lf,
    /// Fourth-order triple-jump composition.
    Lf4,
    /// Sixth-order composition.
    Lf6,
    /// Eighth-order composition.
    Lf8,
    /// Processed modified leapfrog of order four.
    Pmlf4,
    /// Modified leapfrog of the order-six force-gradient family.
    Pmlf6,
    /// Two-stage (4, 2) composition.
    Lf42,
    /// (8, 6, 4) composition for near-integrable splittings.
    Lf864,
    /// Processed leapfrog of the (7, 6, 4) family.
    Plf764,
}

impl Scheme {
    /// Returns the coefficient tables of this scheme.
    #[must_use]
    pub const fn composition(self) -> &'static Composition {
        match self {
            Self::Lf => &LF,
            Self::Lf4 => &LF4,
            Self::Lf6 => &LF6,
            Self::Lf8 => &LF8,
            Self::Pmlf4 => &PMLF4,
            Self::Pmlf6 => &PMLF6,
            Self::Lf42 => &LF4_2,
            Self::Lf864 => &LF8_6_4,
            Self::Plf764 => &PLF7_6_4,
        }
    }

    /// Returns the design order of this scheme.
    #[must_use]
    pub const fn order(self) -> u32 {
        self.composition().order
    }

    /// Returns the magnitude of the longest drift sub-step of this scheme,
    /// in units of the step length.
    #[must_use]
    pub const fn longest_drift(self) -> f64 {
        self.composition().longest_drift
    }

    /// Returns all named schemes.
    #[must_use]
    pub const fn all() -> [Self; 9] {
        [
            Self::Lf,
            Self::Lf4,
            Self::Lf6,
            Self::Lf8,
            Self::Pmlf4,
            Self::Pmlf6,
            Self::Lf42,
            Self::Lf864,
            Self::Plf764,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn stage_counts_are_consistent() {
        for scheme in Scheme::all() {
            let comp = scheme.composition();

            assert_eq!(comp.drifts.len(), comp.kicks.len() + 1, "{scheme:?}");
            assert_eq!(comp.jerks.len(), comp.kicks.len(), "{scheme:?}");
        }
    }

    #[test]
    fn coefficients_telescope_to_unity() {
        for scheme in Scheme::all() {
            let comp = scheme.composition();
            let drift_sum: f64 = comp.drifts.iter().sum();
            let kick_sum: f64 = comp.kicks.iter().sum();

            assert_approx_eq!(f64, drift_sum, 1.0, ulps = 8);
            assert_approx_eq!(f64, kick_sum, 1.0, ulps = 8);
        }
    }

    #[test]
    fn longest_drift_matches_the_tables() {
        for scheme in Scheme::all() {
            let comp = scheme.composition();
            let longest = comp
                .drifts
                .iter()
                .fold(0.0f64, |acc, drift| acc.max(drift.abs()));

            assert_approx_eq!(f64, longest, comp.longest_drift);
        }
    }

    #[test]
    fn compositions_are_time_symmetric() {
        for scheme in Scheme::all() {
            let comp = scheme.composition();

            for (head, tail) in comp.drifts.iter().zip(comp.drifts.iter().rev()) {
                assert_approx_eq!(f64, *head, *tail);
            }
            for (head, tail) in comp.kicks.iter().zip(comp.kicks.iter().rev()) {
                assert_approx_eq!(f64, *head, *tail);
            }
        }
    }
}
