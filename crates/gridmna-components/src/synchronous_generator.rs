//! Synchronous generator, EMT three-phase (§4.4), grounded on
//! `SynchronGeneratorEMT`: a 7-state flux-linkage model (q, d, 0, kq1, kq2,
//! fd, kd) advanced by forward-Euler on the swing equation and the flux
//! state equation, interfaced to the network as a Norton current injection.
//!
//! Only the per-unit parameterization is implemented; the source's
//! "stator-referred" path has no working torque or flux update and is
//! rejected at construction (§9 open question).

use std::cell::Cell;
use std::rc::Rc;

use gridmna_core::{
    inverse_park, park, Attribute, AttributeTable, AttributeValue, Component, ComponentMeta,
    Domain, InitContext, ParameterError, SystemMatrix,
};
use nalgebra::{DVector, SMatrix, SVector, Vector3};

/// Per-unit electrical machine constants (Krause notation), all in the
/// generator's own per-unit base.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorParameters {
    pub stator_resistance: f64,
    pub leakage_inductance: f64,
    pub d_axis_mutual_inductance: f64,
    pub q_axis_mutual_inductance: f64,
    pub field_resistance: f64,
    pub field_leakage_inductance: f64,
    pub d_damper_resistance: f64,
    pub d_damper_leakage_inductance: f64,
    pub q_damper1_resistance: f64,
    pub q_damper1_leakage_inductance: f64,
    pub q_damper2_resistance: f64,
    pub q_damper2_leakage_inductance: f64,
    pub inertia: f64,
}

/// Nameplate ratings used to derive the per-unit base system.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorRatings {
    pub nominal_power: f64,
    pub nominal_voltage: f64,
    pub nominal_frequency: f64,
    pub pole_number: f64,
}

/// Dispatch set-point the generator is initialized at, matching a converged
/// power-flow result for its terminal bus (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct GeneratorOperatingPoint {
    pub active_power: f64,
    pub reactive_power: f64,
    pub terminal_voltage: f64,
    pub terminal_voltage_angle: f64,
}

pub struct SynchronousGenerator {
    meta: ComponentMeta,
    params: GeneratorParameters,
    ratings: GeneratorRatings,
    operating_point: GeneratorOperatingPoint,
    flux_deadband: Option<f64>,

    base_v: f64,
    base_i: f64,
    base_omega_elec: f64,
    base_omega_mech: f64,

    inductance_mat: SMatrix<f64, 7, 7>,
    resistance_mat: SMatrix<f64, 7, 7>,
    reactance_mat: SMatrix<f64, 7, 7>,
    omega_flux_mat: SMatrix<f64, 7, 7>,
    reverse_currents: SMatrix<f64, 7, 7>,

    voltages: SVector<f64, 7>,
    currents: SVector<f64, 7>,
    fluxes: SVector<f64, 7>,
    omega_mech: f64,
    theta_mech: f64,
    abc_voltages: Vector3<f64>,
    abc_currents: Vector3<f64>,

    base_pos: Option<usize>,
    mech_power_pu: Rc<Cell<f64>>,
    rotor_speed: Rc<Cell<f64>>,
    rotor_angle: Rc<Cell<f64>>,
    electrical_torque: Rc<Cell<f64>>,
    attrs: AttributeTable,
}

impl SynchronousGenerator {
    pub fn new(
        id: impl Into<String>,
        ratings: GeneratorRatings,
        params: GeneratorParameters,
        operating_point: GeneratorOperatingPoint,
        flux_deadband: Option<f64>,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        if ratings.nominal_power <= 0.0 || ratings.nominal_voltage <= 0.0 {
            return Err(ParameterError::Negative {
                component: id,
                parameter: "nominal_power/nominal_voltage".to_string(),
                value: ratings.nominal_power.min(ratings.nominal_voltage),
            });
        }

        let base_v_rms = ratings.nominal_voltage / 3.0_f64.sqrt();
        let base_v = base_v_rms * 2.0_f64.sqrt();
        let base_i_rms = ratings.nominal_power / (3.0 * base_v_rms);
        let base_i = base_i_rms * 2.0_f64.sqrt();
        let base_omega_elec = 2.0 * std::f64::consts::PI * ratings.nominal_frequency;
        let base_omega_mech = base_omega_elec / (ratings.pole_number / 2.0);

        let p = &params;
        let ll = p.leakage_inductance;
        let lmd = p.d_axis_mutual_inductance;
        let lmq = p.q_axis_mutual_inductance;
        #[rustfmt::skip]
        let inductance_mat = SMatrix::<f64, 7, 7>::from_row_slice(&[
            ll + lmq, 0.0,      0.0, lmq,                   lmq,                   0.0,                  0.0,
            0.0,      ll + lmd, 0.0, 0.0,                   0.0,                   lmd,                  lmd,
            0.0,      0.0,      ll,  0.0,                   0.0,                   0.0,                  0.0,
            lmq,      0.0,      0.0, p.q_damper1_leakage_inductance + lmq, lmq,    0.0,                  0.0,
            lmq,      0.0,      0.0, lmq, p.q_damper2_leakage_inductance + lmq,    0.0,                  0.0,
            0.0,      lmd,      0.0, 0.0,                   0.0, p.field_leakage_inductance + lmd,       lmd,
            0.0,      lmd,      0.0, 0.0,                   0.0,                   lmd, p.d_damper_leakage_inductance + lmd,
        ]);

        #[rustfmt::skip]
        let resistance_mat = SMatrix::<f64, 7, 7>::from_diagonal(&SVector::<f64, 7>::from_row_slice(&[
            p.stator_resistance,
            p.stator_resistance,
            p.stator_resistance,
            p.q_damper1_resistance,
            p.q_damper2_resistance,
            p.field_resistance,
            p.d_damper_resistance,
        ]));

        #[rustfmt::skip]
        let omega_flux_mat = SMatrix::<f64, 7, 7>::from_row_slice(&[
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ]);

        let reverse_currents = SMatrix::<f64, 7, 7>::from_diagonal(&SVector::<f64, 7>::from_row_slice(
            &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0],
        ));

        let reactance_mat = inductance_mat.try_inverse().ok_or(ParameterError::NonFinite {
            component: id.clone(),
            parameter: "inductance matrix (singular, cannot invert)".to_string(),
        })?;

        let mech_power_pu = Rc::new(Cell::new(operating_point.active_power / ratings.nominal_power));
        let rotor_speed = Rc::new(Cell::new(1.0));
        let rotor_angle = Rc::new(Cell::new(0.0));
        let electrical_torque = Rc::new(Cell::new(0.0));

        let mut attrs = AttributeTable::new();
        let read_speed = rotor_speed.clone();
        attrs.register(Attribute::read_only("rotor_speed_pu", move || {
            AttributeValue::Real(read_speed.get())
        }));
        let read_angle = rotor_angle.clone();
        attrs.register(Attribute::read_only("rotor_angle_rad", move || {
            AttributeValue::Real(read_angle.get())
        }));
        let read_torque = electrical_torque.clone();
        attrs.register(Attribute::read_only("electrical_torque_pu", move || {
            AttributeValue::Real(read_torque.get())
        }));
        let read_power = mech_power_pu.clone();
        let write_power = mech_power_pu.clone();
        attrs.register(Attribute::read_write(
            "mechanical_power_pu",
            move || AttributeValue::Real(read_power.get()),
            move |v| {
                if let AttributeValue::Real(x) = v {
                    write_power.set(x);
                }
            },
        ));

        Ok(Self {
            meta: ComponentMeta {
                id: id.clone(),
                name: id,
                num_terminals: 1,
                num_virtual_nodes: 0,
                frequencies: vec![ratings.nominal_frequency],
                domain: Domain::Emt,
            },
            params,
            ratings,
            operating_point,
            flux_deadband,
            base_v,
            base_i,
            base_omega_elec,
            base_omega_mech,
            inductance_mat,
            resistance_mat,
            reactance_mat,
            omega_flux_mat,
            reverse_currents,
            voltages: SVector::zeros(),
            currents: SVector::zeros(),
            fluxes: SVector::zeros(),
            omega_mech: 1.0,
            theta_mech: 0.0,
            abc_voltages: Vector3::zeros(),
            abc_currents: Vector3::zeros(),
            base_pos: None,
            mech_power_pu,
            rotor_speed,
            rotor_angle,
            electrical_torque,
            attrs,
        })
    }

    /// Steady-state initial flux/current/voltage state from the dispatch
    /// operating point, per `initStatesInPerUnit`.
    fn init_states(&mut self) {
        let rs = self.params.stator_resistance;
        let ll = self.params.leakage_inductance;
        let lmd = self.params.d_axis_mutual_inductance;
        let lmq = self.params.q_axis_mutual_inductance;
        let rfd = self.params.field_resistance;
        let llfd = self.params.field_leakage_inductance;

        let init_p = self.operating_point.active_power / self.ratings.nominal_power;
        let init_q = self.operating_point.reactive_power / self.ratings.nominal_power;
        let init_s = (init_p.powi(2) + init_q.powi(2)).sqrt();
        let init_vt = self.operating_point.terminal_voltage / self.base_v;
        let init_it = init_s / init_vt;
        let init_pf = (init_p / init_s).acos();

        let init_delta = (((lmq + ll) * init_it * init_pf.cos() - rs * init_it * init_pf.sin())
            / (init_vt + rs * init_it * init_pf.cos() + (lmq + ll) * init_it * init_pf.sin()))
        .atan();

        let init_vd = init_vt * init_delta.sin();
        let init_vq = init_vt * init_delta.cos();
        let init_id = init_it * (init_delta + init_pf).sin();
        let init_iq = init_it * (init_delta + init_pf).cos();

        let init_ifd = (init_vq + rs * init_iq + (lmd + ll) * init_id) / lmd;
        let init_vfd = rfd * init_ifd;

        let init_psid = init_vq + rs * init_iq;
        let init_psiq = -init_vd - rs * init_id;
        let init_psifd = (lmd + llfd) * init_ifd - lmd * init_id;
        let init_psid1 = lmd * (init_ifd - init_id);
        let init_psiq1 = -lmq * init_iq;
        let init_psiq2 = -lmq * init_iq;

        self.omega_mech = 1.0;
        self.voltages = SVector::<f64, 7>::from_row_slice(&[
            init_vq, init_vd, 0.0, 0.0, 0.0, init_vfd, 0.0,
        ]);
        self.currents = SVector::<f64, 7>::from_row_slice(&[
            init_iq, init_id, 0.0, 0.0, 0.0, init_ifd, 0.0,
        ]);
        self.fluxes = SVector::<f64, 7>::from_row_slice(&[
            init_psiq, init_psid, 0.0, init_psiq1, init_psiq2, init_psifd, init_psid1,
        ]);
        self.theta_mech = self.operating_point.terminal_voltage_angle + init_delta;

        self.rotor_speed.set(self.omega_mech);
        self.rotor_angle.set(self.theta_mech);
    }
}

impl Component<f64> for SynchronousGenerator {
    fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn initialize(&mut self, ctx: &InitContext<f64>) -> Result<(), ParameterError> {
        self.base_pos = ctx.terminal_indices[0];
        self.init_states();

        let dq0_voltages = Vector3::new(self.voltages[0], self.voltages[1], self.voltages[2]) * self.base_v;
        self.abc_voltages = inverse_park(dq0_voltages, self.theta_mech);

        let dq0_currents = Vector3::new(self.currents[0], self.currents[1], self.currents[2]) * self.base_i;
        self.abc_currents = inverse_park(dq0_currents, self.theta_mech);

        Ok(())
    }

    fn pre_step(&mut self, delta_t: f64) -> Vec<(usize, f64)> {
        let abc_voltages_pu = self.abc_voltages / self.base_v;
        let dq0_voltages = park(abc_voltages_pu, self.theta_mech);
        self.voltages[0] = dq0_voltages.x;
        self.voltages[1] = dq0_voltages.y;
        self.voltages[2] = dq0_voltages.z;

        let mech_power_pu = self.mech_power_pu.get();
        let mech_torque = mech_power_pu / self.omega_mech;
        let elec_torque = self.fluxes[1] * self.currents[0] - self.fluxes[0] * self.currents[1];
        self.electrical_torque.set(elec_torque);

        self.omega_mech += delta_t * (mech_torque - elec_torque) / (2.0 * self.params.inertia);

        self.currents = self.reverse_currents * (self.reactance_mat * self.fluxes);
        let mut d_fluxes = self.voltages
            - self.resistance_mat * self.currents
            - self.omega_mech * (self.omega_flux_mat * self.fluxes);
        if let Some(deadband) = self.flux_deadband {
            for v in d_fluxes.iter_mut() {
                if v.abs() < deadband {
                    *v = 0.0;
                }
            }
        }
        self.fluxes += delta_t * self.base_omega_elec * d_fluxes;
        self.currents = self.reverse_currents * (self.reactance_mat * self.fluxes);

        self.theta_mech += delta_t * self.omega_mech * self.base_omega_mech;
        self.rotor_speed.set(self.omega_mech);
        self.rotor_angle.set(self.theta_mech);

        let dq0_currents = Vector3::new(self.currents[0], self.currents[1], self.currents[2]);
        self.abc_currents = inverse_park(dq0_currents, self.theta_mech) * self.base_i;

        match self.base_pos {
            Some(base) => (0..3).map(|k| (base + k, self.abc_currents[k])).collect(),
            None => Vec::new(),
        }
    }

    fn post_step(&mut self, solution: &DVector<f64>, _delta_t: f64) {
        if let Some(base) = self.base_pos {
            self.abc_voltages = Vector3::new(solution[base], solution[base + 1], solution[base + 2]);
        } else {
            self.abc_voltages = Vector3::zeros();
        }
    }

    fn stamp(&self, _matrix: &mut SystemMatrix<f64>) {}

    fn attributes(&self) -> &AttributeTable {
        &self.attrs
    }
}
