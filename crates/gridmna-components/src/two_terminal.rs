//! Shared plumbing for two-terminal lumped elements (resistor, inductor,
//! capacitor, sources): phase-width-aware conductance stamping so the same
//! component body serves both the three-phase ABC (EMT) and single complex
//! scalar (SP/DP) node representations.

use gridmna_core::{InitContext, MnaScalar, SystemMatrix};

/// Add conductance `g` between `base_pos` and `base_neg` on every phase
/// offset `0..width` (§3 invariant: an ABC node's index spans three
/// consecutive rows; a Single node's index spans one).
pub fn stamp_multiphase_conductance<T: MnaScalar>(
    matrix: &mut SystemMatrix<T>,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    width: usize,
    g: T,
) {
    for k in 0..width {
        matrix.stamp_conductance(base_pos.map(|b| b + k), base_neg.map(|b| b + k), g);
    }
}

/// Read the per-phase terminal voltage difference `v[pos] - v[neg]` from the
/// already-seeded terminal nodes at initialization time (§4.1 item 2).
pub fn terminal_voltage_diff<T: MnaScalar>(
    ctx: &InitContext<T>,
    pos_terminal: usize,
    neg_terminal: usize,
    width: usize,
) -> Vec<T> {
    let pos_v = ctx.terminal_nodes[pos_terminal].voltage();
    let neg_v = ctx.terminal_nodes[neg_terminal].voltage();
    (0..width).map(|k| pos_v[k] - neg_v[k]).collect()
}
