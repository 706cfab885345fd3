//! Ideal current and voltage sources. Generic over the scalar type: the
//! forcing function closure already produces the domain-appropriate value
//! (real instantaneous sample for EMT, complex phasor/envelope for SP/DP),
//! so one struct per source kind serves every domain.

use gridmna_core::{
    Attribute, AttributeTable, Component, ComponentMeta, Domain, InitContext, MnaScalar,
    ParameterError, SystemMatrix,
};
use nalgebra::DVector;
use num_complex::Complex64;

use crate::waveform::Waveform;

/// Ideal current source: injects `forcing(t, phase)` into the positive
/// terminal (and withdraws it from the negative terminal), with no LHS
/// stamp at all.
pub struct CurrentSource<T: MnaScalar> {
    meta: ComponentMeta,
    width: usize,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    /// Elapsed simulation time, self-tracked: `pre_step` only receives Δt
    /// (§4.1 item 3), so a source accumulates its own clock from the fixed
    /// per-run timestep (Non-goal: no adaptive time-stepping).
    elapsed: f64,
    forcing: Box<dyn Fn(f64, usize) -> T>,
    attrs: AttributeTable,
}

impl<T: MnaScalar> CurrentSource<T> {
    pub fn new(
        id: impl Into<String>,
        domain: Domain,
        forcing: impl Fn(f64, usize) -> T + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 0,
                frequencies: Vec::new(),
                domain,
            },
            width: domain.phase_type().width(),
            base_pos: None,
            base_neg: None,
            elapsed: 0.0,
            forcing: Box::new(forcing),
            attrs: AttributeTable::new(),
        }
    }

    pub fn constant(id: impl Into<String>, domain: Domain, value: T) -> Self {
        Self::new(id, domain, move |_t, _phase| value)
    }
}

impl CurrentSource<f64> {
    /// Balanced three-phase EMT current source driven by one waveform,
    /// offset by ∓120° on phases b and c.
    pub fn emt_waveform(id: impl Into<String>, waveform: Waveform) -> Self {
        let offsets = [0.0, -120.0, 120.0];
        Self::new(id, Domain::Emt, move |t, phase| {
            waveform.evaluate_phase(t, offsets[phase])
        })
    }
}

impl<T: MnaScalar> Component<T> for CurrentSource<T> {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<T>) -> Result<(), ParameterError> {
        self.base_pos = ctx.terminal_indices[0];
        self.base_neg = ctx.terminal_indices[1];
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, T)> {
        let t = self.elapsed;
        let mut contributions = Vec::with_capacity(2 * self.width);
        for phase in 0..self.width {
            let value = (self.forcing)(t, phase);
            if let Some(pos) = self.base_pos {
                contributions.push((pos + phase, value));
            }
            if let Some(neg) = self.base_neg {
                contributions.push((neg + phase, -value));
            }
        }
        self.elapsed += delta_t;
        contributions
    }

    fn post_step(&mut self, _solution: &DVector<T>, _delta_t: f64) {}

    fn stamp(&self, _matrix: &mut SystemMatrix<T>) {}

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}

/// Ideal voltage source: augmented MNA with one branch-current unknown per
/// phase, modeled as a declared virtual node (§9 "use an arena-plus-index
/// pattern rather than raw pointers").
pub struct VoltageSource<T: MnaScalar> {
    meta: ComponentMeta,
    width: usize,
    base_pos: Option<usize>,
    base_neg: Option<usize>,
    branch_base: usize,
    /// Elapsed simulation time, self-tracked the same way as `CurrentSource`.
    elapsed: f64,
    forcing: Box<dyn Fn(f64, usize) -> T>,
    current: T,
    attrs: AttributeTable,
}

impl<T: MnaScalar> VoltageSource<T> {
    pub fn new(
        id: impl Into<String>,
        domain: Domain,
        forcing: impl Fn(f64, usize) -> T + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 2,
                num_virtual_nodes: 1,
                frequencies: Vec::new(),
                domain,
            },
            width: domain.phase_type().width(),
            base_pos: None,
            base_neg: None,
            branch_base: 0,
            elapsed: 0.0,
            forcing: Box::new(forcing),
            current: T::zero(),
            attrs: AttributeTable::new(),
        }
    }

    pub fn constant(id: impl Into<String>, domain: Domain, value: T) -> Self {
        Self::new(id, domain, move |_t, _phase| value)
    }
}

impl VoltageSource<Complex64> {
    pub fn phasor(id: impl Into<String>, domain: Domain, magnitude: f64, angle_rad: f64) -> Self {
        let value = Complex64::from_polar(magnitude, angle_rad);
        Self::constant(id, domain, value)
    }

    /// DP voltage source whose envelope tracks a waveform ramping away from
    /// the topology's carrier frequency (§8 variable-frequency scenario).
    pub fn dp_tracking(
        id: impl Into<String>,
        waveform: Waveform,
        carrier_frequency: f64,
    ) -> Self {
        Self::new(id, Domain::Dp, move |t, _phase| {
            waveform.dp_envelope(t, carrier_frequency)
        })
    }
}

impl VoltageSource<f64> {
    pub fn emt_waveform(id: impl Into<String>, waveform: Waveform) -> Self {
        let offsets = [0.0, -120.0, 120.0];
        Self::new(id, Domain::Emt, move |t, phase| {
            waveform.evaluate_phase(t, offsets[phase])
        })
    }
}

impl<T: MnaScalar> Component<T> for VoltageSource<T> {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<T>) -> Result<(), ParameterError> {
        self.base_pos = ctx.terminal_indices[0];
        self.base_neg = ctx.terminal_indices[1];
        self.branch_base = ctx.virtual_indices[0];
        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, T)> {
        let t = self.elapsed;
        let contributions = (0..self.width)
            .map(|phase| (self.branch_base + phase, (self.forcing)(t, phase)))
            .collect();
        self.elapsed += delta_t;
        contributions
    }

    fn post_step(&mut self, solution: &DVector<T>, _delta_t: f64) {
        self.current = solution[self.branch_base];
    }

    fn stamp(&self, matrix: &mut SystemMatrix<T>) {
        for phase in 0..self.width {
            matrix.stamp_voltage_source(
                self.base_pos.map(|b| b + phase),
                self.base_neg.map(|b| b + phase),
                self.branch_base + phase,
            );
        }
    }

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}
