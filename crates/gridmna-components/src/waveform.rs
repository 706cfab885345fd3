//! Time-domain source waveforms for EMT sources, grounded on the PULSE/SIN/
//! PWL shapes `spicier-parser` parses into `spicier_devices::Waveform`.
//! Adds a frequency-ramping sinusoid for the variable-frequency RX-line
//! scenario (§8).

use num_complex::Complex64;

/// A scalar forcing function evaluated at simulation time `t`.
#[derive(Debug, Clone)]
pub enum Waveform {
    /// Constant value.
    Dc(f64),
    /// SIN(vo va freq td theta phase): damped sinusoid with optional delay.
    Sin {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        delay: f64,
        damping: f64,
        phase_deg: f64,
    },
    /// PULSE(v1 v2 td tr tf pw per): trapezoidal pulse train.
    Pulse {
        v1: f64,
        v2: f64,
        delay: f64,
        rise: f64,
        fall: f64,
        width: f64,
        period: f64,
    },
    /// PWL(t1 v1 t2 v2 ...): piecewise-linear breakpoints, held flat before
    /// the first point and after the last.
    Pwl(Vec<(f64, f64)>),
    /// Sinusoid whose instantaneous frequency ramps linearly from
    /// `start_frequency` to `start_frequency + shift` over `ramp_time`,
    /// holding at the final frequency afterward (§8 "frequency ramping from
    /// 50 Hz by −5 Hz over rampTime").
    FrequencyRamp {
        amplitude: f64,
        start_frequency: f64,
        shift: f64,
        ramp_time: f64,
        phase_deg: f64,
    },
}

impl Waveform {
    pub fn dc(value: f64) -> Self {
        Waveform::Dc(value)
    }

    pub fn sin_full(vo: f64, va: f64, freq: f64, td: f64, theta: f64, phase: f64) -> Self {
        Waveform::Sin {
            offset: vo,
            amplitude: va,
            frequency: freq,
            delay: td,
            damping: theta,
            phase_deg: phase,
        }
    }

    pub fn pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> Self {
        Waveform::Pulse {
            v1,
            v2,
            delay: td,
            rise: tr,
            fall: tf,
            width: pw,
            period: per,
        }
    }

    pub fn pwl(points: Vec<(f64, f64)>) -> Self {
        Waveform::Pwl(points)
    }

    pub fn frequency_ramp(amplitude: f64, start_frequency: f64, shift: f64, ramp_time: f64) -> Self {
        Waveform::FrequencyRamp {
            amplitude,
            start_frequency,
            shift,
            ramp_time,
            phase_deg: 0.0,
        }
    }

    /// Instantaneous value at time `t` (seconds).
    pub fn evaluate(&self, t: f64) -> f64 {
        match self {
            Waveform::Dc(v) => *v,
            Waveform::Sin {
                offset,
                amplitude,
                frequency,
                delay,
                damping,
                phase_deg,
            } => {
                if t < *delay {
                    *offset
                } else {
                    let tau = t - delay;
                    let envelope = (-damping * tau).exp();
                    offset
                        + amplitude
                            * envelope
                            * (2.0 * std::f64::consts::PI * frequency * tau
                                + phase_deg.to_radians())
                            .sin()
                }
            }
            Waveform::Pulse {
                v1,
                v2,
                delay,
                rise,
                fall,
                width,
                period,
            } => evaluate_pulse(t, *v1, *v2, *delay, *rise, *fall, *width, *period),
            Waveform::Pwl(points) => evaluate_pwl(points, t),
            Waveform::FrequencyRamp {
                amplitude,
                start_frequency,
                shift,
                ramp_time,
                phase_deg,
            } => {
                // Instantaneous phase is the time-integral of instantaneous
                // frequency, not frequency(t)*t, so the ramp is phase-continuous.
                let phase = instantaneous_ramp_phase(t, *start_frequency, *shift, *ramp_time);
                amplitude * (phase + phase_deg.to_radians()).sin()
            }
        }
    }

    /// Instantaneous value at time `t`, with an extra phase offset (degrees)
    /// added to the sinusoid argument — used to generate the b/c phases of a
    /// balanced three-phase EMT source (∓120°) from one waveform definition.
    /// Non-periodic waveforms (Dc, Pulse, Pwl) ignore the offset.
    pub fn evaluate_phase(&self, t: f64, phase_offset_deg: f64) -> f64 {
        match self {
            Waveform::Sin {
                offset,
                amplitude,
                frequency,
                delay,
                damping,
                phase_deg,
            } => {
                if t < *delay {
                    *offset
                } else {
                    let tau = t - delay;
                    let envelope = (-damping * tau).exp();
                    offset
                        + amplitude
                            * envelope
                            * (2.0 * std::f64::consts::PI * frequency * tau
                                + (phase_deg + phase_offset_deg).to_radians())
                            .sin()
                }
            }
            Waveform::FrequencyRamp {
                amplitude,
                start_frequency,
                shift,
                ramp_time,
                phase_deg,
            } => {
                let phase = instantaneous_ramp_phase(t, *start_frequency, *shift, *ramp_time);
                amplitude * (phase + (phase_deg + phase_offset_deg).to_radians()).sin()
            }
            other => other.evaluate(t),
        }
    }

    /// Complex dynamic-phasor envelope of this waveform relative to a fixed
    /// `carrier_frequency` (§4.2 DP: "slowly varying envelope at carrier ω").
    /// For a sinusoid whose instantaneous frequency equals the carrier, the
    /// envelope is constant; a frequency offset shows up as slow envelope
    /// rotation. Non-periodic waveforms have no well-defined envelope and
    /// fall back to their instantaneous real value.
    pub fn dp_envelope(&self, t: f64, carrier_frequency: f64) -> Complex64 {
        let carrier_phase = 2.0 * std::f64::consts::PI * carrier_frequency * t;
        match self {
            Waveform::Sin {
                amplitude,
                frequency,
                delay,
                damping,
                phase_deg,
                ..
            } => {
                if t < *delay {
                    return Complex64::new(0.0, 0.0);
                }
                let tau = t - delay;
                let envelope = (-damping * tau).exp();
                let actual_phase = 2.0 * std::f64::consts::PI * frequency * tau + phase_deg.to_radians();
                Complex64::from_polar(amplitude * envelope, actual_phase - carrier_phase)
            }
            Waveform::FrequencyRamp {
                amplitude,
                start_frequency,
                shift,
                ramp_time,
                phase_deg,
            } => {
                let actual_phase =
                    instantaneous_ramp_phase(t, *start_frequency, *shift, *ramp_time) + phase_deg.to_radians();
                Complex64::from_polar(*amplitude, actual_phase - carrier_phase)
            }
            other => Complex64::new(other.evaluate(t), 0.0),
        }
    }
}

fn evaluate_pulse(t: f64, v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> f64 {
    if t < td {
        return v1;
    }
    let cycle_t = if per > 0.0 { (t - td) % per } else { t - td };
    if cycle_t < tr {
        if tr > 0.0 {
            v1 + (v2 - v1) * (cycle_t / tr)
        } else {
            v2
        }
    } else if cycle_t < tr + pw {
        v2
    } else if cycle_t < tr + pw + tf {
        if tf > 0.0 {
            v2 + (v1 - v2) * ((cycle_t - tr - pw) / tf)
        } else {
            v1
        }
    } else {
        v1
    }
}

fn evaluate_pwl(points: &[(f64, f64)], t: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    if t <= points[0].0 {
        return points[0].1;
    }
    for window in points.windows(2) {
        let (t0, v0) = window[0];
        let (t1, v1) = window[1];
        if t >= t0 && t <= t1 {
            if t1 > t0 {
                return v0 + (v1 - v0) * (t - t0) / (t1 - t0);
            }
            return v1;
        }
    }
    points.last().unwrap().1
}

/// Integral of instantaneous angular frequency over the ramp window.
fn instantaneous_ramp_phase(t: f64, f0: f64, shift: f64, ramp_time: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    if ramp_time <= 0.0 {
        return two_pi * (f0 + shift) * t;
    }
    if t <= ramp_time {
        let rate = shift / ramp_time;
        two_pi * (f0 * t + 0.5 * rate * t * t)
    } else {
        let phase_at_ramp_end = two_pi * (f0 * ramp_time + 0.5 * shift * ramp_time);
        phase_at_ramp_end + two_pi * (f0 + shift) * (t - ramp_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_is_constant() {
        let w = Waveform::dc(5.0);
        assert_eq!(w.evaluate(0.0), 5.0);
        assert_eq!(w.evaluate(100.0), 5.0);
    }

    #[test]
    fn sin_matches_analytic_value_at_quarter_period() {
        let w = Waveform::sin_full(0.0, 10.0, 50.0, 0.0, 0.0, 0.0);
        let quarter_period = 1.0 / (4.0 * 50.0);
        assert!((w.evaluate(quarter_period) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn pwl_interpolates_between_breakpoints() {
        let w = Waveform::pwl(vec![(0.0, 0.0), (1.0, 10.0)]);
        assert!((w.evaluate(0.5) - 5.0).abs() < 1e-9);
        assert_eq!(w.evaluate(2.0), 10.0);
    }

    #[test]
    fn frequency_ramp_holds_final_frequency_after_ramp_time() {
        let w = Waveform::frequency_ramp(1.0, 50.0, -5.0, 1.0);
        let before = w.evaluate(0.999);
        let after_one_cycle_at_final = w.evaluate(0.999 + 1.0 / 45.0);
        assert!((before - after_one_cycle_at_final).abs() < 1e-6);
    }
}
