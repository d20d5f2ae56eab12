//! Gravity backends.
//!
//! The shell backend assigns each pair force to shells through the switching
//! function: at shell `s` a pair contributes the band between the shell's
//! own transition and the next deeper one, so the per-pair weights telescope
//! to exactly one across all shells the pair is resident in.

use super::integrator::Mercurana;
use super::particle::Particle;

#[derive(Clone, Copy)]
enum Sweep {
    DominantDominant,
    DominantSubdominant,
    EncounterEncounter,
}

fn transition(state: &Mercurana, s: usize, i: usize, j: usize, d: f64) -> f64 {
    let inner = state.dcrit[[s, i]] + state.dcrit[[s, j]];
    let outer = state.dcrit[[s - 1, i]] + state.dcrit[[s - 1, j]];
    (state.switching_l())(d, inner, outer)
}

fn transition_derivative(state: &Mercurana, s: usize, i: usize, j: usize, d: f64) -> f64 {
    let inner = state.dcrit[[s, i]] + state.dcrit[[s, j]];
    let outer = state.dcrit[[s - 1, i]] + state.dcrit[[s - 1, j]];
    (state.switching_dl())(d, inner, outer)
}

/// Share of the pair force owned by `shell`. `continues` signals that both
/// members are also resident one shell deeper, in which case the inner part
/// of the band is left to the deeper shell.
fn pair_weight(state: &Mercurana, shell: usize, i: usize, j: usize, d: f64, continues: bool) -> f64 {
    let below = if shell == 0 {
        0.0
    } else {
        transition(state, shell, i, j, d)
    };
    let above = if continues {
        transition(state, shell + 1, i, j, d)
    } else {
        1.0
    };

    above - below
}

fn pair_weight_derivative(
    state: &Mercurana,
    shell: usize,
    i: usize,
    j: usize,
    d: f64,
    continues: bool,
) -> f64 {
    let below = if shell == 0 {
        0.0
    } else {
        transition_derivative(state, shell, i, j, d)
    };
    let above = if continues {
        transition_derivative(state, shell + 1, i, j, d)
    } else {
        0.0
    };

    above - below
}

fn for_each_pair(state: &Mercurana, shell: usize, mut body: impl FnMut(usize, usize, bool)) {
    for sweep in [
        Sweep::DominantDominant,
        Sweep::DominantSubdominant,
        Sweep::EncounterEncounter,
    ] {
        let (first, second) = match sweep {
            Sweep::DominantDominant => (&state.dominant, &state.dominant),
            Sweep::DominantSubdominant => (&state.dominant, &state.subdominant),
            Sweep::EncounterEncounter => (&state.encounter, &state.encounter),
        };
        let symmetric = matches!(
            sweep,
            Sweep::DominantDominant | Sweep::EncounterEncounter
        );

        for ii in 0..first.len(shell) {
            let i = first.at(shell, ii);
            let start = if symmetric { ii + 1 } else { 0 };
            for jj in start..second.len(shell) {
                let j = second.at(shell, jj);
                if i == j {
                    continue;
                }
                let continues = first.depth(i) > shell && second.depth(j) > shell;
                body(i, j, continues);
            }
        }
    }
}

/// Accumulates the shell-local accelerations of every particle resident at
/// `shell` into `accel`. Non-resident entries are left untouched.
pub(crate) fn shell_accelerations(
    particles: &[Particle],
    state: &Mercurana,
    g: f64,
    shell: usize,
    accel: &mut [[f64; 3]],
) {
    for partition in [&state.dominant, &state.subdominant, &state.encounter] {
        for k in 0..partition.len(shell) {
            accel[partition.at(shell, k)] = [0.0; 3];
        }
    }

    for_each_pair(state, shell, |i, j, continues| {
        let pi = &particles[i];
        let pj = &particles[j];
        let d2 = pi.squared_distance(pj);
        if d2 == 0.0 {
            return;
        }
        let d = d2.sqrt();
        let weight = pair_weight(state, shell, i, j, d, continues);
        if weight == 0.0 {
            return;
        }

        let prefactor = g * weight / (d2 * d);
        for k in 0..3 {
            let dx = pj.pos[k] - pi.pos[k];
            accel[i][k] = (prefactor * pj.mass).mul_add(dx, accel[i][k]);
            accel[j][k] = (prefactor * pi.mass).mul_add(-dx, accel[j][k]);
        }
    });
}

/// Accumulates the force-gradient term used by the modified kicks.
///
/// The term is the directional derivative of the shell-local acceleration
/// field along itself; the switching weight enters both directly and through
/// its radial derivative.
pub(crate) fn shell_jerks(
    particles: &[Particle],
    state: &Mercurana,
    g: f64,
    shell: usize,
    accel: &[[f64; 3]],
    jerk: &mut [[f64; 3]],
) {
    for partition in [&state.dominant, &state.subdominant, &state.encounter] {
        for k in 0..partition.len(shell) {
            jerk[partition.at(shell, k)] = [0.0; 3];
        }
    }

    for_each_pair(state, shell, |i, j, continues| {
        let pi = &particles[i];
        let pj = &particles[j];
        let d2 = pi.squared_distance(pj);
        if d2 == 0.0 {
            return;
        }
        let d = d2.sqrt();
        let weight = pair_weight(state, shell, i, j, d, continues);
        let weight_derivative = pair_weight_derivative(state, shell, i, j, d, continues);
        if weight == 0.0 && weight_derivative == 0.0 {
            return;
        }

        let phi = weight / (d2 * d);
        let dphi = weight_derivative / (d2 * d) - 3.0 * weight / (d2 * d2);

        let mut dx = [0.0; 3];
        let mut da = [0.0; 3];
        for k in 0..3 {
            dx[k] = pj.pos[k] - pi.pos[k];
            da[k] = accel[j][k] - accel[i][k];
        }
        let radial = (dx[0] * da[0] + dx[1] * da[1] + dx[2] * da[2]) / d;

        for k in 0..3 {
            let term = phi.mul_add(da[k], dphi * radial * dx[k]);
            jerk[i][k] = (g * pj.mass).mul_add(term, jerk[i][k]);
            jerk[j][k] = (g * pi.mass).mul_add(-term, jerk[j][k]);
        }
    });
}

/// Plain direct-summation accelerations over all particle pairs.
pub(crate) fn basic_accelerations(particles: &[Particle], g: f64, accel: &mut [[f64; 3]]) {
    for entry in accel.iter_mut() {
        *entry = [0.0; 3];
    }

    for i in 0..particles.len() {
        for j in i + 1..particles.len() {
            let d2 = particles[i].squared_distance(&particles[j]);
            if d2 == 0.0 {
                continue;
            }
            let prefactor = g / (d2 * d2.sqrt());
            for k in 0..3 {
                let dx = particles[j].pos[k] - particles[i].pos[k];
                accel[i][k] = (prefactor * particles[j].mass).mul_add(dx, accel[i][k]);
                accel[j][k] = (prefactor * particles[i].mass).mul_add(-dx, accel[j][k]);
            }
        }
    }
}
