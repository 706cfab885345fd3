//! The per-(Δt, topology-era) system conductance matrix (§3 "SystemMatrix
//! era"). Stamped once per era, factorized once, reused for every timestep
//! within that era; time dependence lives entirely on the right-hand side.

use nalgebra::{DMatrix, DVector, LU};
use thiserror::Error;

use crate::numeric::MnaScalar;

/// Identifies one (Δt, topology generation) era. The solver caches one
/// factorized left-hand side per era and re-factorizes only when the
/// generation bumps (a switch transitions) or Δt changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEra {
    pub generation: u64,
    pub delta_t: f64,
}

impl MatrixEra {
    pub fn new(generation: u64, delta_t: f64) -> Self {
        Self { generation, delta_t }
    }
}

/// Fatal at factorization time: the left-hand side is singular or
/// near-singular for the given era (§7 "Matrix error").
#[derive(Debug, Error)]
#[error("singular system matrix at era generation {generation} (dt={delta_t})")]
pub struct MatrixError {
    pub generation: u64,
    pub delta_t: f64,
}

/// The shared conductance matrix + factorization owned exclusively by the
/// solver (§5). Components hold only row/column indices into it, never a
/// reference to the matrix itself.
pub struct SystemMatrix<T: MnaScalar> {
    size: usize,
    dense: DMatrix<T>,
    factorization: Option<LU<T, nalgebra::Dyn, nalgebra::Dyn>>,
    era: MatrixEra,
}

impl<T: MnaScalar> SystemMatrix<T> {
    /// A fresh, unstamped matrix of the given size for the given era.
    pub fn new(size: usize, era: MatrixEra) -> Self {
        Self {
            size,
            dense: DMatrix::from_element(size, size, T::zero()),
            factorization: None,
            era,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn era(&self) -> MatrixEra {
        self.era
    }

    /// Zero the matrix so it can be re-stamped from scratch. Re-assembling a
    /// cleared matrix with the same component stamps must be idempotent
    /// (§8 invariant 2).
    pub fn clear(&mut self) {
        self.dense.fill(T::zero());
        self.factorization = None;
    }

    /// Add a conductance between `pos` and `neg` (either may be `None` for
    /// ground). Additive with respect to other components' stamps (§4.1 item 5).
    pub fn stamp_conductance(&mut self, pos: Option<usize>, neg: Option<usize>, g: T) {
        if let Some(p) = pos {
            self.dense[(p, p)] += g;
        }
        if let Some(n) = neg {
            self.dense[(n, n)] += g;
        }
        if let (Some(p), Some(n)) = (pos, neg) {
            self.dense[(p, n)] -= g;
            self.dense[(n, p)] -= g;
        }
    }

    /// Stamp an arbitrary (row, col) conductance entry directly, used by
    /// components whose virtual-node topology does not reduce to a simple
    /// two-terminal conductance (transformers, synchronous machines).
    pub fn stamp_entry(&mut self, row: usize, col: usize, value: T) {
        self.dense[(row, col)] += value;
    }

    /// Insert an ideal-voltage-source row/column pair at branch current
    /// index `branch` (offset into the augmented rows beyond the node block).
    pub fn stamp_voltage_source(
        &mut self,
        pos: Option<usize>,
        neg: Option<usize>,
        branch: usize,
    ) {
        if let Some(p) = pos {
            self.dense[(p, branch)] += T::one();
            self.dense[(branch, p)] += T::one();
        }
        if let Some(n) = neg {
            self.dense[(n, branch)] -= T::one();
            self.dense[(branch, n)] -= T::one();
        }
    }

    /// Factorize the current matrix contents. Call once per era, after every
    /// component's `stamp` has run.
    pub fn factorize(&mut self) {
        self.factorization = Some(LU::new(self.dense.clone()));
    }

    /// Solve `LHS . x = rhs` using the cached factorization.
    ///
    /// # Panics
    /// Panics if called before [`SystemMatrix::factorize`] — this is a
    /// solver-internal contract violation, not a runtime data error.
    pub fn solve(&self, rhs: &DVector<T>) -> Result<DVector<T>, MatrixError> {
        let lu = self
            .factorization
            .as_ref()
            .expect("SystemMatrix::solve called before factorize");
        lu.solve(rhs).ok_or(MatrixError {
            generation: self.era.generation,
            delta_t: self.era.delta_t,
        })
    }

    /// Read-only access to the assembled dense matrix, for diagnostics and tests.
    pub fn as_dense(&self) -> &DMatrix<T> {
        &self.dense
    }
}

/// Accumulates right-hand-side contributions for one timestep. Unlike
/// [`SystemMatrix`], rebuilt every step from each component's pre-step
/// output; summation order follows topology insertion order for
/// bit-identical reproducibility (§5).
pub struct RhsAccumulator<T: MnaScalar> {
    values: DVector<T>,
}

impl<T: MnaScalar> RhsAccumulator<T> {
    pub fn new(size: usize) -> Self {
        Self {
            values: DVector::from_element(size, T::zero()),
        }
    }

    /// Fold in one component's pre-step contributions, in the order produced.
    pub fn accumulate(&mut self, contributions: &[(usize, T)]) {
        for &(index, value) in contributions {
            self.values[index] += value;
        }
    }

    pub fn inject_current(&mut self, pos: Option<usize>, neg: Option<usize>, value: T) {
        if let Some(p) = pos {
            self.values[p] += value;
        }
        if let Some(n) = neg {
            self.values[n] -= value;
        }
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.values[index] = value;
    }

    pub fn as_vector(&self) -> &DVector<T> {
        &self.values
    }

    pub fn into_vector(self) -> DVector<T> {
        self.values
    }

    /// `None` unless every entry is finite (§7 "Runtime numeric error").
    pub fn first_non_finite_index(&self) -> Option<usize> {
        self.values
            .iter()
            .position(|v| !v.is_finite_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_idempotent_on_reassembly() {
        let era = MatrixEra::new(0, 1e-3);
        let mut m1 = SystemMatrix::<f64>::new(2, era);
        m1.stamp_conductance(Some(0), Some(1), 2.0);
        m1.stamp_conductance(Some(0), None, 1.0);

        let mut m2 = SystemMatrix::<f64>::new(2, era);
        m2.stamp_conductance(Some(0), Some(1), 2.0);
        m2.stamp_conductance(Some(0), None, 1.0);

        assert_eq!(m1.as_dense(), m2.as_dense());
    }

    #[test]
    fn clear_then_restamp_matches_fresh() {
        let era = MatrixEra::new(0, 1e-3);
        let mut m = SystemMatrix::<f64>::new(2, era);
        m.stamp_conductance(Some(0), Some(1), 2.0);
        m.clear();
        m.stamp_conductance(Some(0), Some(1), 2.0);

        let mut fresh = SystemMatrix::<f64>::new(2, era);
        fresh.stamp_conductance(Some(0), Some(1), 2.0);

        assert_eq!(m.as_dense(), fresh.as_dense());
    }

    #[test]
    fn current_source_resistor_dc_solve() {
        // i = 10A into node 0 through a 1 ohm resistor to ground => v = 10V.
        let era = MatrixEra::new(0, 1e-3);
        let mut m = SystemMatrix::<f64>::new(1, era);
        m.stamp_conductance(Some(0), None, 1.0);
        m.factorize();

        let mut rhs = RhsAccumulator::<f64>::new(1);
        rhs.inject_current(Some(0), None, 10.0);

        let x = m.solve(rhs.as_vector()).unwrap();
        assert!((x[0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn singular_matrix_reports_era() {
        let era = MatrixEra::new(3, 1e-3);
        let mut m = SystemMatrix::<f64>::new(2, era);
        // Leave the matrix entirely unstamped: singular by construction.
        m.factorize();
        let rhs = RhsAccumulator::<f64>::new(2);
        let err = m.solve(rhs.as_vector()).unwrap_err();
        assert_eq!(err.generation, 3);
    }
}
