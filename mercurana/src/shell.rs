//! Shell membership bookkeeping for one particle class.

use ndarray::Array2;

/// Per-class shell membership.
///
/// Row `s` of `map` lists every particle promoted at least as deep as shell
/// `s`, in promotion order; `len[s]` counts the valid entries of that row.
/// `depth[i]` is the deepest shell particle `i` has reached so far, so a
/// particle appears exactly once in every row up to and including its depth.
#[derive(Clone, Debug, Default)]
pub(crate) struct ShellPartition {
    map: Array2<usize>,
    len: Vec<usize>,
    depth: Vec<usize>,
}

impl ShellPartition {
    /// Grows the backing buffers to `shells` rows of `n` columns. Existing
    /// contents are discarded; the partition must be seeded before use.
    pub fn resize(&mut self, shells: usize, n: usize) {
        self.map = Array2::zeros((shells, n));
        self.len = vec![0; shells];
        self.depth = vec![0; n];
    }

    /// Seeds shell 0 with `indices` and zeroes every depth. Deeper rows
    /// become empty.
    pub fn seed(&mut self, indices: impl Iterator<Item = usize>) {
        self.len.iter_mut().for_each(|len| *len = 0);
        self.depth.iter_mut().for_each(|depth| *depth = 0);

        for i in indices {
            let slot = self.len[0];
            self.map[[0, slot]] = i;
            self.len[0] += 1;
        }
    }

    /// Number of particles resident at shell `s`.
    pub fn len(&self, s: usize) -> usize {
        self.len[s]
    }

    /// Particle index stored at slot `k` of shell `s`.
    pub fn at(&self, s: usize, k: usize) -> usize {
        self.map[[s, k]]
    }

    /// Deepest shell particle `i` has been promoted into.
    pub fn depth(&self, i: usize) -> usize {
        self.depth[i]
    }

    /// Promotes particle `i` one level into shell `to`. The caller must
    /// guarantee that `i` currently resides at `to - 1`.
    pub fn promote(&mut self, i: usize, to: usize) {
        debug_assert_eq!(self.depth[i] + 1, to);
        let slot = self.len[to];
        self.map[[to, slot]] = i;
        self.len[to] += 1;
        self.depth[i] = to;
    }

    /// Promotes particle `i` through every shell from its current depth up
    /// to and including `to`.
    pub fn promote_through(&mut self, i: usize, to: usize) {
        for s in self.depth[i] + 1..=to {
            let slot = self.len[s];
            self.map[[s, slot]] = i;
            self.len[s] += 1;
        }
        self.depth[i] = self.depth[i].max(to);
    }

    /// Rewrites all stored particle indices after removals. `old_to_new[i]`
    /// is the new index of old particle `i`, or `None` if it was removed.
    pub fn remap(&mut self, old_to_new: &[Option<usize>]) {
        for s in 0..self.len.len() {
            let mut kept = 0;
            for k in 0..self.len[s] {
                if let Some(new) = old_to_new[self.map[[s, k]]] {
                    self.map[[s, kept]] = new;
                    kept += 1;
                }
            }
            self.len[s] = kept;
        }

        let mut kept = 0;
        for i in 0..old_to_new.len() {
            if old_to_new[i].is_some() {
                self.depth[kept] = self.depth[i];
                kept += 1;
            }
        }
    }

    /// Checks that every row holds each particle at most once and, for
    /// shells past the outermost one, exactly the particles whose depth
    /// reaches it. Row 0 lists the class members, which the depth array
    /// alone cannot identify. Used by tests.
    #[cfg(test)]
    pub fn is_consistent(&self, shells: usize, n: usize) -> bool {
        (0..shells).all(|s| {
            let row: Vec<_> = (0..self.len[s]).map(|k| self.map[[s, k]]).collect();
            let mut unique = row.clone();
            unique.sort_unstable();
            unique.dedup();

            let unique_ok = unique.len() == row.len()
                && row.iter().all(|&i| i < n && self.depth[i] >= s);
            let count_ok =
                s == 0 || row.len() == (0..n).filter(|&i| self.depth[i] >= s).count();

            unique_ok && count_ok
        })
    }
}
