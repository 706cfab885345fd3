//! Numeric kernel: the scalar abstraction MNA systems are built over, plus
//! the Park/inverse-Park transform used by three-phase dq0 components.

use nalgebra::{ComplexField, Vector3};
use num_complex::Complex64;

use crate::attribute::AttributeValue;

/// Scalar type an [`crate::mna::SystemMatrix`] can be built from.
///
/// EMT simulations use `f64` (three real quantities per ABC node); SP and DP
/// simulations use `Complex64` (one complex phasor per node). Both implement
/// [`ComplexField`] so the same dense-LU machinery in `mna` serves either
/// domain without duplicating the factorize/solve path.
pub trait MnaScalar: ComplexField<RealField = f64> + Copy + 'static {
    /// `true` unless the value contains NaN or +/-Inf in any component.
    fn is_finite_value(&self) -> bool;

    /// Wrap this value as the [`AttributeValue`] variant matching its type,
    /// for components that expose terminal voltage/current generically
    /// across domains.
    fn to_attribute_value(self) -> AttributeValue;
}

impl MnaScalar for f64 {
    fn is_finite_value(&self) -> bool {
        f64::is_finite(*self)
    }

    fn to_attribute_value(self) -> AttributeValue {
        AttributeValue::Real(self)
    }
}

impl MnaScalar for Complex64 {
    fn is_finite_value(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn to_attribute_value(self) -> AttributeValue {
        AttributeValue::Complex(self)
    }
}

/// Park transform: abc (stationary three-phase) -> dq0 (rotor reference frame).
///
/// `theta` is the rotor electrical angle in radians. Uses the amplitude-invariant
/// 2/3 scaling convention (the cos/sin/zero rows are not individually
/// normalized to unit power; a power-invariant transform would scale by
/// sqrt(2/3) instead).
pub fn park(abc: Vector3<f64>, theta: f64) -> Vector3<f64> {
    let (sin_t, cos_t) = theta.sin_cos();
    let sin_t2 = (theta - 2.0 * std::f64::consts::FRAC_PI_3).sin();
    let cos_t2 = (theta - 2.0 * std::f64::consts::FRAC_PI_3).cos();
    let sin_t3 = (theta + 2.0 * std::f64::consts::FRAC_PI_3).sin();
    let cos_t3 = (theta + 2.0 * std::f64::consts::FRAC_PI_3).cos();

    let d = (2.0 / 3.0) * (cos_t * abc.x + cos_t2 * abc.y + cos_t3 * abc.z);
    let q = (2.0 / 3.0) * (sin_t * abc.x + sin_t2 * abc.y + sin_t3 * abc.z);
    let zero = (1.0 / 3.0) * (abc.x + abc.y + abc.z);

    Vector3::new(q, d, zero)
}

/// Inverse Park transform: dq0 -> abc. Exact inverse of [`park`] for the same `theta`.
pub fn inverse_park(dq0: Vector3<f64>, theta: f64) -> Vector3<f64> {
    let (q, d, zero) = (dq0.x, dq0.y, dq0.z);
    let (sin_t, cos_t) = theta.sin_cos();
    let sin_t2 = (theta - 2.0 * std::f64::consts::FRAC_PI_3).sin();
    let cos_t2 = (theta - 2.0 * std::f64::consts::FRAC_PI_3).cos();
    let sin_t3 = (theta + 2.0 * std::f64::consts::FRAC_PI_3).sin();
    let cos_t3 = (theta + 2.0 * std::f64::consts::FRAC_PI_3).cos();

    let a = cos_t * d + sin_t * q + zero;
    let b = cos_t2 * d + sin_t2 * q + zero;
    let c = cos_t3 * d + sin_t3 * q + zero;

    Vector3::new(a, b, c)
}

/// Embed a single-phase complex phasor voltage as a balanced three-phase ABC
/// triple, used when transferring a power-flow result into an EMT node
/// (§4.8 initialization from power flow).
pub fn symmetric_abc_embedding(v: Complex64, omega: f64, t: f64) -> Vector3<f64> {
    let (mag, angle) = (v.norm(), v.arg());
    let two_pi_3 = 2.0 * std::f64::consts::FRAC_PI_3;
    Vector3::new(
        mag * (omega * t + angle).cos(),
        mag * (omega * t + angle - two_pi_3).cos(),
        mag * (omega * t + angle + two_pi_3).cos(),
    )
}

/// Recover the complex phasor underlying a balanced three-phase ABC triple
/// sampled at `t=0`. Exact inverse of [`symmetric_abc_embedding`] at `t=0`
/// via the space-vector sum `(2/3)(a + b*e^{j2pi/3} + c*e^{-j2pi/3})`; used to
/// recover the phasor voltage a power-flow-seeded EMT node carries, so a
/// companion model can derive the steady-state current consistent with it
/// (§4.1 item 2, §4.8).
pub fn recover_phasor_from_abc(abc: Vector3<f64>) -> Complex64 {
    let two_pi_3 = 2.0 * std::f64::consts::FRAC_PI_3;
    let rotate = Complex64::from_polar(1.0, two_pi_3);
    (Complex64::new(abc.x, 0.0) + Complex64::new(abc.y, 0.0) * rotate
        + Complex64::new(abc.z, 0.0) * rotate.conj())
        * (2.0 / 3.0)
}
