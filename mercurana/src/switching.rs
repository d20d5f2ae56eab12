//! Switching function used to split pair-wise forces between shells.

/// Signature of a switching function `L(d; r_i, r_o)` and of its derivative
/// with respect to `d`.
///
/// A switching function interpolates smoothly from `0` at separations below
/// `r_i` to `1` at separations above `r_o`. Hosts may install an alternative
/// implementation on the integrator; the default is [`partition`].
pub type SwitchingFn = fn(f64, f64, f64) -> f64;

fn bump(x: f64) -> f64 {
    if x > 0.0 { (-1.0 / x).exp() } else { 0.0 }
}

fn bump_derivative(x: f64) -> f64 {
    if x > 0.0 {
        (-1.0 / x).exp() / (x * x)
    } else {
        0.0
    }
}

/// Infinitely differentiable partition of unity on `[r_i, r_o]`.
///
/// Built from `f(x) = exp(-1/x)` as `f(y) / (f(y) + f(1 - y))` with
/// `y = (d - r_i) / (r_o - r_i)`. All derivatives vanish at both interval
/// boundaries.
#[must_use]
pub fn partition(d: f64, r_i: f64, r_o: f64) -> f64 {
    let y = (d - r_i) / (r_o - r_i);

    if y <= 0.0 {
        0.0
    } else if y >= 1.0 {
        1.0
    } else {
        let f = bump(y);
        f / (f + bump(1.0 - y))
    }
}

/// Derivative of [`partition`] with respect to the separation `d`.
#[must_use]
pub fn partition_derivative(d: f64, r_i: f64, r_o: f64) -> f64 {
    let width = r_o - r_i;
    let y = (d - r_i) / width;

    if y <= 0.0 || y >= 1.0 {
        0.0
    } else {
        let f = bump(y);
        let g = bump(1.0 - y);
        // quotient rule; the cross terms with f'(1 - y) carry a sign flip
        // from the inner derivative that cancels against the numerator
        bump_derivative(y).mul_add(g, f * bump_derivative(1.0 - y)) / ((f + g) * (f + g) * width)
    }
}
