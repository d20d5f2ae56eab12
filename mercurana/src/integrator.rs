//! Adaptive shell integrator.
//!
//! One global timestep applies a named composition at shell 0. Its drift
//! operator first runs the pair predictor, which promotes pairs approaching
//! within their critical radii into the next shell; it then advances the
//! positions of the particles resident at this shell and recurses into the
//! deeper shell with proportionally shorter sub-steps. Particles left in
//! outer shells are not re-drifted at every inner sub-step: their pending
//! drift is tracked per particle and applied lazily when a deeper shell
//! pulls them in, guarded by a maximum-allowed-drift budget.

use super::collision::CollisionPair;
use super::convert;
use super::dcrit;
use super::gravity;
use super::particle::Particle;
use super::predictor;
use super::scheme::Scheme;
use super::shell::ShellPartition;
use super::simulation::{CollisionMode, GravityMode, Simulation};
use super::switching::{self, SwitchingFn};
use ndarray::Array2;
use std::mem;
use std::sync::atomic::Ordering;

/// Configuration and per-step state of the adaptive shell integrator.
///
/// Configuration fields may be set freely between steps; the private state
/// is (re)built by [`Simulation::prepare_step`] and at the top of every
/// global step.
pub struct Mercurana {
    /// Maximum shell recursion depth.
    pub nmaxshells: usize,
    /// Sub-step count of the outermost recursion.
    pub n0: usize,
    /// Sub-step count of deeper recursions; `0` reuses `n0`.
    pub n1: usize,
    /// Dimensionless error target controlling the critical radii.
    pub kappa: f64,
    /// Critical-radius scaling exponent; `0.5` uses a dedicated fast path.
    pub alpha: f64,
    /// Relativistic correction term; disabled when zero.
    pub gm0r0: f64,
    /// Composition scheme of the outermost shell.
    pub phi0: Scheme,
    /// Composition scheme of all inner shells.
    pub phi1: Scheme,
    /// Applies the outermost post-processor after every global step.
    pub safe_mode: bool,
    /// Number of dominant particles; always the first particle indices.
    pub n_dominant: usize,
    /// Requests a critical-radius recomputation at the next preparation.
    pub recalculate_dcrit: bool,
    /// Installed switching function; the default is installed when `None`.
    pub switching: Option<SwitchingFn>,
    /// Installed switching-function derivative; the default is installed
    /// when `None`.
    pub switching_derivative: Option<SwitchingFn>,

    pub(crate) config_valid: bool,
    pub(crate) dcrit: Array2<f64>,
    pub(crate) dominant: ShellPartition,
    pub(crate) subdominant: ShellPartition,
    pub(crate) encounter: ShellPartition,
    pub(crate) p0: Vec<Particle>,
    pub(crate) t_drifted: Vec<f64>,
    pub(crate) maxdrift_encounter: Vec<f64>,
    pub(crate) maxdrift_dominant: Vec<f64>,
    pub(crate) collisions: Vec<CollisionPair>,
    is_synchronized: bool,
    nmaxshells_used: usize,
    allocated_n: usize,
    current_shell: usize,
}

impl Default for Mercurana {
    fn default() -> Self {
        Self {
            nmaxshells: 10,
            n0: 2,
            n1: 0,
            kappa: 1e-3,
            alpha: 0.5,
            gm0r0: 0.0,
            phi0: Scheme::Lf,
            phi1: Scheme::Lf,
            safe_mode: true,
            n_dominant: 0,
            recalculate_dcrit: false,
            switching: None,
            switching_derivative: None,
            config_valid: false,
            dcrit: Array2::zeros((0, 0)),
            dominant: ShellPartition::default(),
            subdominant: ShellPartition::default(),
            encounter: ShellPartition::default(),
            p0: Vec::new(),
            t_drifted: Vec::new(),
            maxdrift_encounter: Vec::new(),
            maxdrift_dominant: Vec::new(),
            collisions: Vec::new(),
            is_synchronized: true,
            nmaxshells_used: 1,
            allocated_n: 0,
            current_shell: 0,
        }
    }
}

impl Mercurana {
    /// Frees all buffers and restores every setting to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns whether the outermost post-processor has been applied.
    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        self.is_synchronized
    }

    /// Deepest shell count reached so far in the current global step.
    #[must_use]
    pub const fn nmaxshells_used(&self) -> usize {
        self.nmaxshells_used
    }

    /// Shell whose kick is currently in flight. Only meaningful while the
    /// gravity backend identifier reads [`GravityMode::Mercurana`].
    #[must_use]
    pub const fn current_shell(&self) -> usize {
        self.current_shell
    }

    /// Number of particles the per-shell buffers are sized for.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated_n
    }

    /// Critical encounter radius of particle `i` at shell `s`.
    #[must_use]
    pub fn dcrit(&self, s: usize, i: usize) -> f64 {
        self.dcrit[[s, i]]
    }

    /// Deepest shell particle `i` has reached in the encounter class.
    #[must_use]
    pub fn encounter_depth(&self, i: usize) -> usize {
        self.encounter.depth(i)
    }

    /// Deepest shell particle `i` has reached in the dominant class.
    #[must_use]
    pub fn dominant_depth(&self, i: usize) -> usize {
        self.dominant.depth(i)
    }

    /// Deepest shell particle `i` has reached in the subdominant class.
    #[must_use]
    pub fn subdominant_depth(&self, i: usize) -> usize {
        self.subdominant.depth(i)
    }

    /// Number of encounter particles resident at shell `s`.
    #[must_use]
    pub fn encounters_at(&self, s: usize) -> usize {
        self.encounter.len(s)
    }

    /// Number of dominant particles resident at shell `s`.
    #[must_use]
    pub fn dominants_at(&self, s: usize) -> usize {
        self.dominant.len(s)
    }

    /// Number of subdominant particles resident at shell `s`.
    #[must_use]
    pub fn subdominants_at(&self, s: usize) -> usize {
        self.subdominant.len(s)
    }

    pub(crate) fn mark_synchronized(&mut self) {
        self.is_synchronized = true;
    }

    pub(crate) fn mark_unsynchronized(&mut self) {
        self.is_synchronized = false;
    }

    pub(crate) fn switching_l(&self) -> SwitchingFn {
        self.switching.unwrap_or(switching::partition)
    }

    pub(crate) fn switching_dl(&self) -> SwitchingFn {
        self.switching_derivative
            .unwrap_or(switching::partition_derivative)
    }

    pub(crate) fn needs_allocation(&self, n: usize) -> bool {
        n > self.allocated_n || self.dcrit.nrows() != self.nmaxshells
    }

    /// Grows all per-particle and per-shell buffers to `n` particles and the
    /// configured shell count. Contents are zero-initialised; the predictor
    /// seeds them at shell 0.
    pub(crate) fn allocate(&mut self, n: usize) {
        let shells = self.nmaxshells;
        self.dcrit = Array2::zeros((shells, n));
        self.dominant.resize(shells, n);
        self.subdominant.resize(shells, n);
        self.encounter.resize(shells, n);
        self.p0 = vec![Particle::default(); n];
        self.t_drifted = vec![0.0; n];
        self.maxdrift_encounter = vec![f64::INFINITY; n];
        self.maxdrift_dominant = vec![f64::INFINITY; n];
        self.allocated_n = n;
    }

    /// Recomputes the critical-radius table for all shells and particles.
    pub(crate) fn recompute_dcrit(&mut self, dt0: f64, g: f64, particles: &[Particle]) {
        let ratios = dcrit::substep_ratios(self.nmaxshells, self.n0, self.n1, self.phi1);

        for (i, particle) in particles.iter().enumerate() {
            let dgrav = dcrit::gravity_radius(g, dt0, particle.mass, self.kappa, self.gm0r0);

            for (s, &ratio) in ratios.iter().enumerate() {
                let scale = if self.alpha == 0.5 {
                    ratio.sqrt()
                } else {
                    ratio.powf(self.alpha)
                };
                self.dcrit[[s, i]] = scale * dgrav;
            }
        }
    }

    /// Snapshots the particle states, resets the drift accounting, and
    /// seeds the shell maps at the top of a global step.
    pub(crate) fn begin_step(&mut self, particles: &[Particle]) {
        self.nmaxshells_used = 1;
        self.p0[..particles.len()].copy_from_slice(particles);
        for drifted in &mut self.t_drifted {
            *drifted = 0.0;
        }
        self.seed_shells(particles.len());
    }

    /// Initialises the three class partitions: dominants are the leading
    /// indices, everyone else starts out as both subdominant and encounter
    /// particle. Drift budgets are unbounded and the collision buffer is
    /// empty.
    pub(crate) fn seed_shells(&mut self, n: usize) {
        let n_dominant = self.n_dominant.min(n);

        self.dominant.seed(0..n_dominant);
        self.subdominant.seed(n_dominant..n);
        self.encounter.seed(n_dominant..n);

        for budget in &mut self.maxdrift_encounter {
            *budget = f64::INFINITY;
        }
        for budget in &mut self.maxdrift_dominant {
            *budget = f64::INFINITY;
        }
        self.collisions.clear();
    }
}

fn drift_norm(particle: &Particle, reference: &Particle) -> f64 {
    particle.squared_distance(reference).sqrt()
}

/// Which sweep a pair came from; decides the class promotions go into and
/// the drift budgets that get tightened.
#[derive(Clone, Copy, Eq, PartialEq)]
enum PairKind {
    DominantDominant,
    DominantSubdominant,
    EncounterEncounter,
}

impl Simulation {
    /// Executes one step of `scheme` at `shell`, with the kick coefficients
    /// scaled by `y` and the force-gradient coefficients by `v`.
    pub(crate) fn scheme_step(&mut self, dt: f64, y: f64, v: f64, shell: usize, scheme: Scheme) {
        let comp = scheme.composition();

        for (stage, (&kick, &jerk)) in comp.kicks.iter().zip(comp.jerks).enumerate() {
            self.drift(comp.drifts[stage] * dt, shell);
            self.kick(kick * dt * y, jerk * dt * dt * dt * v, shell);
        }
        self.drift(comp.drifts[comp.kicks.len()] * dt, shell);
    }

    /// Applies the processor stages of `scheme` at `shell`.
    pub(crate) fn scheme_preprocessor(&mut self, dt: f64, shell: usize, scheme: Scheme) {
        for &(z, y) in scheme.composition().pre {
            self.drift(z * dt, shell);
            self.kick(y * dt, 0.0, shell);
        }
    }

    /// Applies the exact inverse of the processor stages of `scheme`.
    pub(crate) fn scheme_postprocessor(&mut self, dt: f64, shell: usize, scheme: Scheme) {
        for &(z, y) in scheme.composition().pre.iter().rev() {
            self.kick(-y * dt, 0.0, shell);
            self.drift(-z * dt, shell);
        }
    }

    /// Drift operator: advances the positions of the particles resident at
    /// `shell` by `a` and recurses into the next shell if the predictor
    /// promoted anyone into it.
    fn drift(&mut self, a: f64, shell: usize) {
        if a == 0.0 || self.halt.load(Ordering::Relaxed) {
            return;
        }

        self.predict(a, shell);

        for k in 0..self.mercurana.dominant.len(shell) {
            let i = self.mercurana.dominant.at(shell, k);
            if self.mercurana.dominant.depth(i) == shell {
                self.drift_particle(i, a);
            }
        }
        for k in 0..self.mercurana.subdominant.len(shell) {
            let i = self.mercurana.subdominant.at(shell, k);
            if self.mercurana.subdominant.depth(i) == shell
                && self.mercurana.encounter.depth(i) <= shell
            {
                self.drift_particle(i, a);
            }
        }
        // where the classes overlap at the same depth the subdominant loop
        // already moved the particle
        for k in 0..self.mercurana.encounter.len(shell) {
            let i = self.mercurana.encounter.at(shell, k);
            if self.mercurana.encounter.depth(i) == shell
                && self.mercurana.subdominant.depth(i) < shell
            {
                self.drift_particle(i, a);
            }
        }

        let next = shell + 1;
        let promoted = next < self.mercurana.nmaxshells
            && self.mercurana.encounter.len(next) + self.mercurana.dominant.len(next) > 0;

        if promoted {
            self.mercurana.nmaxshells_used = self.mercurana.nmaxshells_used.max(shell + 2);

            let n_rec = if shell > 0 && self.mercurana.n1 > 0 {
                self.mercurana.n1
            } else {
                self.mercurana.n0
            }
            .max(1);
            let sub_dt = a / convert::f64_from_usize(n_rec);
            let phi = self.mercurana.phi1;

            self.scheme_preprocessor(sub_dt, next, phi);
            for _ in 0..n_rec {
                self.scheme_step(sub_dt, 1.0, 1.0, next, phi);
            }
            self.scheme_postprocessor(sub_dt, next, phi);
        } else {
            self.t += a;
        }
    }

    fn drift_particle(&mut self, i: usize, a: f64) {
        let particle = &mut self.particles[i];
        for k in 0..3 {
            particle.pos[k] = a.mul_add(particle.vel[k], particle.pos[k]);
        }
        self.mercurana.t_drifted[i] += a;
    }

    /// Kick operator: evaluates the shell-local accelerations and updates
    /// the velocities of the particles resident at `shell`. A non-zero `v`
    /// additionally applies the force-gradient term scaled by it.
    fn kick(&mut self, y: f64, v: f64, shell: usize) {
        if y == 0.0 && v == 0.0 {
            return;
        }

        self.gravity = GravityMode::Mercurana;
        self.mercurana.current_shell = shell;

        gravity::shell_accelerations(
            &self.particles,
            &self.mercurana,
            self.g,
            shell,
            &mut self.accel,
        );
        if v != 0.0 {
            gravity::shell_jerks(
                &self.particles,
                &self.mercurana,
                self.g,
                shell,
                &self.accel,
                &mut self.jerk,
            );
        }

        for k in 0..self.mercurana.dominant.len(shell) {
            let i = self.mercurana.dominant.at(shell, k);
            self.kick_particle(i, y, v);
        }
        for k in 0..self.mercurana.encounter.len(shell) {
            let i = self.mercurana.encounter.at(shell, k);
            self.kick_particle(i, y, v);
        }
        if shell > 0 {
            // subdominants already promoted into the encounter class at this
            // shell received their share through the encounter loop
            for k in 0..self.mercurana.subdominant.len(shell) {
                let i = self.mercurana.subdominant.at(shell, k);
                if self.mercurana.encounter.depth(i) < shell {
                    self.kick_particle(i, y, v);
                }
            }
        }

        self.gravity = GravityMode::None;
    }

    fn kick_particle(&mut self, i: usize, y: f64, v: f64) {
        let particle = &mut self.particles[i];
        for k in 0..3 {
            particle.vel[k] = y.mul_add(self.accel[i][k], particle.vel[k]);
            if v != 0.0 {
                particle.vel[k] = v.mul_add(self.jerk[i][k], particle.vel[k]);
            }
        }
    }

    /// Runs the predictor for `shell`, hands detected collisions to the
    /// installed resolver, and re-runs the pass whenever the resolver
    /// changed the particle count.
    fn predict(&mut self, a: f64, shell: usize) {
        loop {
            self.predict_pass(a, shell);

            let pairs = mem::take(&mut self.mercurana.collisions);
            if pairs.is_empty() {
                return;
            }
            let Some(resolver) = self.collision_resolver else {
                return;
            };

            let removed = resolver(&mut self.particles, &pairs);
            if removed.is_empty() {
                return;
            }
            self.remove_particles(&removed);
        }
    }

    fn predict_pass(&mut self, a: f64, shell: usize) {
        if shell == 0 {
            self.mercurana.seed_shells(self.particles.len());
        } else {
            self.recheck_stale_residents(a, shell, true);
            self.recheck_stale_residents(a, shell, false);
        }

        self.sweep_pairs(a, shell);
    }

    /// Re-examines residents whose accumulated drift exceeded their budget.
    ///
    /// In the encounter context the stale resident is compared against every
    /// shell-0 encounter particle not yet at this depth; a hit pulls the
    /// partner in, applies its pending drift so it catches up, and clears
    /// its remaining budget. The dominant context runs the symmetric check
    /// of dominant residents against shell-0 subdominants.
    fn recheck_stale_residents(&mut self, a: f64, shell: usize, encounter_context: bool) {
        let stale: Vec<usize> = {
            let residents = if encounter_context {
                &self.mercurana.encounter
            } else {
                &self.mercurana.dominant
            };
            let budgets = if encounter_context {
                &self.mercurana.maxdrift_encounter
            } else {
                &self.mercurana.maxdrift_dominant
            };

            (0..residents.len(shell))
                .map(|k| residents.at(shell, k))
                .filter(|&i| drift_norm(&self.particles[i], &self.mercurana.p0[i]) > budgets[i])
                .collect()
        };

        for i in stale {
            let scan_len = if encounter_context {
                self.mercurana.encounter.len(0)
            } else {
                self.mercurana.subdominant.len(0)
            };

            for slot in 0..scan_len {
                let j = if encounter_context {
                    self.mercurana.encounter.at(0, slot)
                } else {
                    self.mercurana.subdominant.at(0, slot)
                };
                let depth_j = if encounter_context {
                    self.mercurana.encounter.depth(j)
                } else {
                    self.mercurana.subdominant.depth(j)
                };
                if j == i || depth_j >= shell {
                    continue;
                }

                let delta = self.mercurana.t_drifted[i] - self.mercurana.t_drifted[j];
                let estimate = predictor::rmin2_drifted(
                    &self.particles[i],
                    &self.particles[j],
                    a,
                    delta,
                );
                let threshold = self.mercurana.dcrit[[shell, i]] + self.mercurana.dcrit[[shell, j]];

                if estimate < threshold * threshold {
                    let partner = &mut self.particles[j];
                    for k in 0..3 {
                        partner.pos[k] = delta.mul_add(partner.vel[k], partner.pos[k]);
                    }
                    self.mercurana.t_drifted[j] += delta;

                    if encounter_context {
                        self.mercurana.encounter.promote_through(j, shell);
                        self.mercurana.maxdrift_encounter[j] = 0.0;
                    } else {
                        self.mercurana.subdominant.promote_through(j, shell);
                        self.mercurana.maxdrift_dominant[j] = 0.0;
                    }
                } else {
                    let margin = (estimate.sqrt() - threshold) / 2.0;
                    let budgets = if encounter_context {
                        &mut self.mercurana.maxdrift_encounter
                    } else {
                        &mut self.mercurana.maxdrift_dominant
                    };
                    budgets[i] = budgets[i].min(margin);
                }
            }
        }
    }

    /// The three all-pairs sweeps at `shell`: dominant against dominant,
    /// dominant against subdominant, and encounter against encounter.
    /// Subdominant pairs outside the encounter class are assumed never to
    /// require promotion.
    fn sweep_pairs(&mut self, a: f64, shell: usize) {
        for ii in 0..self.mercurana.dominant.len(shell) {
            let i = self.mercurana.dominant.at(shell, ii);
            for jj in ii + 1..self.mercurana.dominant.len(shell) {
                let j = self.mercurana.dominant.at(shell, jj);
                self.check_pair(i, j, a, shell, PairKind::DominantDominant);
            }
        }

        for ii in 0..self.mercurana.dominant.len(shell) {
            let i = self.mercurana.dominant.at(shell, ii);
            for jj in 0..self.mercurana.subdominant.len(shell) {
                let j = self.mercurana.subdominant.at(shell, jj);
                self.check_pair(i, j, a, shell, PairKind::DominantSubdominant);
            }
        }

        for ii in 0..self.mercurana.encounter.len(shell) {
            let i = self.mercurana.encounter.at(shell, ii);
            for jj in ii + 1..self.mercurana.encounter.len(shell) {
                let j = self.mercurana.encounter.at(shell, jj);
                self.check_pair(i, j, a, shell, PairKind::EncounterEncounter);
            }
        }
    }

    /// Examines one pair: records a physical overlap, promotes each member
    /// whose class depth ends at this shell when the approach falls below
    /// the critical radii, and tightens the drift budgets otherwise.
    fn check_pair(&mut self, i: usize, j: usize, a: f64, shell: usize, kind: PairKind) {
        let delta = self.mercurana.t_drifted[i] - self.mercurana.t_drifted[j];
        let estimate =
            predictor::rmin2_drifted(&self.particles[i], &self.particles[j], a, delta);

        let radius_sum = self.particles[i].radius + self.particles[j].radius;
        if self.collision == CollisionMode::Direct
            && radius_sum > 0.0
            && estimate < radius_sum * radius_sum
        {
            self.mercurana.collisions.push((i, j));
        }

        let threshold = self.mercurana.dcrit[[shell, i]] + self.mercurana.dcrit[[shell, j]];
        if estimate < threshold * threshold {
            if shell + 1 < self.mercurana.nmaxshells {
                let (class_i, class_j) = match kind {
                    PairKind::DominantDominant => {
                        (&mut self.mercurana.dominant, None)
                    }
                    PairKind::DominantSubdominant => (
                        &mut self.mercurana.dominant,
                        Some(&mut self.mercurana.subdominant),
                    ),
                    PairKind::EncounterEncounter => {
                        (&mut self.mercurana.encounter, None)
                    }
                };

                if class_i.depth(i) == shell {
                    class_i.promote(i, shell + 1);
                }
                let class_j = class_j.unwrap_or(class_i);
                if class_j.depth(j) == shell {
                    class_j.promote(j, shell + 1);
                }
            }
            // promotion past the deepest shell truncates silently; the pair
            // keeps integrating at the resolution of this shell
        } else {
            let margin = (estimate.sqrt() - threshold) / 2.0;
            let budgets = if kind == PairKind::EncounterEncounter {
                &mut self.mercurana.maxdrift_encounter
            } else {
                &mut self.mercurana.maxdrift_dominant
            };
            budgets[i] = budgets[i].min(margin);
            budgets[j] = budgets[j].min(margin);
        }
    }

    /// Applies resolver-requested removals: compacts the particle array and
    /// every per-particle buffer and rewrites the shell maps.
    fn remove_particles(&mut self, removed: &[usize]) {
        let n = self.particles.len();
        let mut keep = vec![true; n];
        for &i in removed {
            if i < n {
                keep[i] = false;
            }
        }

        let mut old_to_new: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        for (i, &kept) in keep.iter().enumerate() {
            if kept {
                old_to_new[i] = Some(next);
                next += 1;
            }
        }

        let mut slot = 0;
        for i in 0..n {
            if keep[i] {
                self.particles[slot] = self.particles[i];
                self.mercurana.p0[slot] = self.mercurana.p0[i];
                self.mercurana.t_drifted[slot] = self.mercurana.t_drifted[i];
                self.mercurana.maxdrift_encounter[slot] = self.mercurana.maxdrift_encounter[i];
                self.mercurana.maxdrift_dominant[slot] = self.mercurana.maxdrift_dominant[i];
                for s in 0..self.mercurana.dcrit.nrows() {
                    self.mercurana.dcrit[[s, slot]] = self.mercurana.dcrit[[s, i]];
                }
                slot += 1;
            }
        }
        self.particles.truncate(slot);

        self.mercurana.n_dominant -= removed
            .iter()
            .filter(|&&i| i < self.mercurana.n_dominant)
            .count();
        self.mercurana.dominant.remap(&old_to_new);
        self.mercurana.subdominant.remap(&old_to_new);
        self.mercurana.encounter.remap(&old_to_new);
    }
}
