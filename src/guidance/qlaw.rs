//! Q-Law: a Lyapunov-function guidance law driving five osculating elements toward targets
//! while protecting a minimum periapsis radius, per §4.6.

use hifitime::Epoch;
use nalgebra::{Matrix3, Vector3, Vector5};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::coe::COE;
use crate::errors::{NyxError, NyxResult};
use crate::frames::{theta_rh_to_inertial, Frame};

use super::GuidanceLaw;

/// Per-element weight/target/convergence-threshold triple. A `None` weight means the element
/// is not targeted at all (excluded from the convergence check and from `Q`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementWeights {
    pub sma: Option<f64>,
    pub ecc: Option<f64>,
    pub inc: Option<f64>,
    pub raan: Option<f64>,
    pub aop: Option<f64>,
}

/// Tunables controlling the shape of the Lyapunov function and its effectivity gate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct QLawParameters {
    pub weights: ElementWeights,

    /// Convergence thresholds, one per targeted element (unused entries are ignored).
    #[builder(default = ElementWeights { sma: Some(10.0), ecc: Some(1e-4), inc: Some(1e-4), raan: Some(1e-4), aop: Some(1e-4) })]
    pub convergence_thresholds: ElementWeights,

    /// Semi-major-axis penalty shape exponents (`S_a = (1 + (Δa/(m·a_T))^n)^(1/r)`).
    #[builder(default = 3.0)]
    pub m: f64,
    #[builder(default = 4.0)]
    pub n: f64,
    #[builder(default = 2.0)]
    pub r: f64,

    /// Mix between in-plane and out-of-plane argument-of-periapsis terms (unused by the
    /// direct-difference `aop` term used here; kept for interface parity with the source model).
    #[builder(default = 0.01)]
    pub b: f64,

    /// Periapsis-barrier sharpness and weight, and the protected minimum periapsis radius.
    #[builder(default = 100.0)]
    pub k: f64,
    #[builder(default = 1.0)]
    pub w_p: f64,
    pub r_p_min_m: f64,

    /// Effectivity thresholds in `[0, 1]`; `None` disables the corresponding gate.
    #[builder(default)]
    pub eta_absolute_threshold: Option<f64>,
    #[builder(default)]
    pub eta_relative_threshold: Option<f64>,

    /// Number of true-anomaly samples used by the effectivity grid.
    #[builder(default = 12)]
    pub effectivity_grid_size: usize,
}

/// How `QLaw` computes `dQ/dOE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gradient {
    /// Central finite differences, step `1e-3`, over all five elements.
    Numerical,
    /// Closed-form partials of the squared-difference terms and the periapsis barrier; the
    /// element-rate normalisers `S_oe` and `oe_dot_xx` are evaluated at, but not differentiated
    /// with respect to, the current osculating elements (their sensitivity is second-order next
    /// to the direct difference term near convergence). See `DESIGN.md`.
    Analytical,
}

/// The two effectivity ratios from §4.6, returned as a named struct so a consumer cannot swap
/// them by destructuring a tuple in the wrong order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Effectivity {
    pub eta_absolute: f64,
    pub eta_relative: f64,
}

const SATURATION_FLOOR: f64 = 1e-4;

/// Targeted classical elements, a gravitational parameter, tunables, and a gradient mode.
#[derive(Clone)]
pub struct QLaw {
    target: COE,
    mu_m3_s2: f64,
    parameters: QLawParameters,
    gradient: Gradient,
}

/// The five targeted elements in a fixed order, used throughout this module for indexing.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Elements {
    sma_m: f64,
    ecc: f64,
    inc_rad: f64,
    raan_rad: f64,
    aop_rad: f64,
}

impl QLaw {
    pub fn new(target: COE, mu_m3_s2: f64, parameters: QLawParameters, gradient: Gradient) -> Self {
        Self {
            target,
            mu_m3_s2,
            parameters,
            gradient,
        }
    }

    fn saturate(coe: &COE) -> Elements {
        Elements {
            sma_m: coe.sma_m,
            ecc: coe.ecc.max(SATURATION_FLOOR),
            inc_rad: coe.inc_rad.max(SATURATION_FLOOR),
            raan_rad: coe.raan_rad,
            aop_rad: coe.aop_rad,
        }
    }

    fn target_elements(&self) -> Elements {
        Self::saturate(&self.target)
    }

    /// Signed difference for `a`, `e`, `i`; the `acos(cos(.))` unsigned angular difference for
    /// `Ω`, `ω` is handled by the caller since those two are angle-valued.
    fn angular_diff(current: f64, target: f64) -> f64 {
        (current - target).cos().clamp(-1.0, 1.0).acos()
    }

    /// `d(oe, oe_T)` for every element, in `(a, e, i, Ω, ω)` order.
    fn differences(current: &Elements, target: &Elements) -> Vector5<f64> {
        Vector5::new(
            current.sma_m - target.sma_m,
            current.ecc - target.ecc,
            current.inc_rad - target.inc_rad,
            Self::angular_diff(current.raan_rad, target.raan_rad),
            Self::angular_diff(current.aop_rad, target.aop_rad),
        )
    }

    /// `S_oe`: 1 for every element except `a`.
    fn scale_factors(&self, current: &Elements, target: &Elements) -> Vector5<f64> {
        let delta_a = current.sma_m - target.sma_m;
        let base = (delta_a / (self.parameters.m * target.sma_m)).abs().powf(self.parameters.n);
        let s_a = (1.0 + base).powf(1.0 / self.parameters.r);
        Vector5::new(s_a, 1.0, 1.0, 1.0, 1.0)
    }

    /// Periapsis barrier `P = exp(k·(1 − r_p/r_p,min))`, and its partials with respect to `a`
    /// and `e` (zero for the other three elements).
    fn periapsis_penalty(&self, current: &Elements) -> (f64, f64, f64) {
        let r_p = current.sma_m * (1.0 - current.ecc);
        let k = self.parameters.k;
        let r_p_min = self.parameters.r_p_min_m;
        let p = (k * (1.0 - r_p / r_p_min)).exp();
        let dp_da = -p * k * (1.0 - current.ecc) / r_p_min;
        let dp_de = p * k * current.sma_m / r_p_min;
        (p, dp_da, dp_de)
    }

    /// Weight vector, with untargeted elements zeroed out so they drop out of `Q` entirely.
    fn weight_vector(&self) -> Vector5<f64> {
        let w = &self.parameters.weights;
        Vector5::new(
            w.sma.unwrap_or(0.0),
            w.ecc.unwrap_or(0.0),
            w.inc.unwrap_or(0.0),
            w.raan.unwrap_or(0.0),
            w.aop.unwrap_or(0.0),
        )
    }

    /// Whether every targeted element is already within its convergence threshold.
    pub fn has_converged(&self, coe: &COE) -> bool {
        let current = Self::saturate(coe);
        let target = self.target_elements();
        let diff = Self::differences(&current, &target);
        let w = &self.parameters.weights;
        let t = &self.parameters.convergence_thresholds;

        let check = |weight: Option<f64>, threshold: Option<f64>, d: f64| -> bool {
            match (weight, threshold) {
                (Some(weight), Some(threshold)) => (weight * d).abs() <= threshold,
                _ => true,
            }
        };

        check(w.sma, t.sma, diff[0])
            && check(w.ecc, t.ecc, diff[1])
            && check(w.inc, t.inc, diff[2])
            && check(w.raan, t.raan, diff[3])
            && check(w.aop, t.aop, diff[4])
    }

    /// `Q` at the given osculating elements.
    fn q(&self, current: &Elements, oe_dot_xx: &Vector5<f64>) -> f64 {
        let target = self.target_elements();
        let diff = Self::differences(current, &target);
        let scale = self.scale_factors(current, &target);
        let weight = self.weight_vector();
        let (p, _, _) = self.periapsis_penalty(current);

        let mut sum = 0.0;
        for i in 0..5 {
            sum += weight[i] * scale[i] * (diff[i] / oe_dot_xx[i]).powi(2);
        }
        (1.0 + self.parameters.w_p * p) * sum
    }

    /// The 5x3 Gauss variational Jacobian (`dOE/dF`) at true anomaly `nu`, columns ordered
    /// `(θ, r, h)` per §4.6, and each row's Euclidean norm — this crate's `oe_dot_xx`: the
    /// instantaneous maximum rate of change of that element achievable by a unit-magnitude
    /// thrust at the spacecraft's *current* position, rather than the literature's anomaly-
    /// maximised closed form (see `DESIGN.md` for the rationale).
    fn jacobian(&self, current: &Elements, nu_rad: f64) -> (nalgebra::Matrix5x3<f64>, Vector5<f64>) {
        let a = current.sma_m;
        let e = current.ecc;
        let i = current.inc_rad;
        let aop = current.aop_rad;

        let p = a * (1.0 - e * e);
        let r = p / (1.0 + e * nu_rad.cos());
        let h = (self.mu_m3_s2 * p).sqrt();
        let theta = aop + nu_rad;
        let (sin_nu, cos_nu) = nu_rad.sin_cos();
        let (sin_theta, cos_theta) = theta.sin_cos();
        let sin_i = i.sin();

        let mut jac = nalgebra::Matrix5x3::zeros();

        // da/dF: [theta, r, h]
        jac[(0, 0)] = (2.0 * a * a / h) * (p / r);
        jac[(0, 1)] = (2.0 * a * a / h) * e * sin_nu;
        jac[(0, 2)] = 0.0;

        // de/dF
        jac[(1, 0)] = (1.0 / h) * ((p + r) * cos_nu + r * e);
        jac[(1, 1)] = (1.0 / h) * p * sin_nu;
        jac[(1, 2)] = 0.0;

        // di/dF
        jac[(2, 0)] = 0.0;
        jac[(2, 1)] = 0.0;
        jac[(2, 2)] = r * cos_theta / h;

        // draan/dF
        jac[(3, 0)] = 0.0;
        jac[(3, 1)] = 0.0;
        jac[(3, 2)] = r * sin_theta / (h * sin_i);

        // daop/dF
        jac[(4, 0)] = (1.0 / (h * e)) * (p + r) * sin_nu;
        jac[(4, 1)] = (1.0 / (h * e)) * (-p * cos_nu);
        jac[(4, 2)] = -(r * sin_theta * i.cos()) / (h * sin_i);

        let mut xx = Vector5::zeros();
        for row in 0..5 {
            xx[row] = jac.row(row).norm().max(1e-15);
        }

        (jac, xx)
    }

    /// `dQ/dOE`, per the selected [`Gradient`] mode.
    fn dq_doe(&self, current: &Elements, oe_dot_xx: &Vector5<f64>) -> NyxResult<Vector5<f64>> {
        let gradient = match self.gradient {
            Gradient::Numerical => self.dq_doe_numerical(current, oe_dot_xx),
            Gradient::Analytical => self.dq_doe_analytical(current, oe_dot_xx),
        };

        if gradient.iter().any(|component| component.is_nan()) {
            return Err(NyxError::NaNEncountered {
                context: "Q-Law dQ/dOE".to_string(),
            });
        }

        Ok(gradient)
    }

    fn dq_doe_numerical(&self, current: &Elements, oe_dot_xx: &Vector5<f64>) -> Vector5<f64> {
        const STEP: f64 = 1e-3;
        let base = [current.sma_m, current.ecc, current.inc_rad, current.raan_rad, current.aop_rad];

        let mut gradient = Vector5::zeros();
        for index in 0..5 {
            let mut plus = base;
            let mut minus = base;
            plus[index] += STEP;
            minus[index] -= STEP;

            let q_plus = self.q(&Self::elements_from_array(plus), oe_dot_xx);
            let q_minus = self.q(&Self::elements_from_array(minus), oe_dot_xx);
            gradient[index] = (q_plus - q_minus) / (2.0 * STEP);
        }
        gradient
    }

    fn elements_from_array(values: [f64; 5]) -> Elements {
        Elements {
            sma_m: values[0],
            ecc: values[1].max(SATURATION_FLOOR),
            inc_rad: values[2].max(SATURATION_FLOOR),
            raan_rad: values[3],
            aop_rad: values[4],
        }
    }

    fn dq_doe_analytical(&self, current: &Elements, oe_dot_xx: &Vector5<f64>) -> Vector5<f64> {
        let target = self.target_elements();
        let diff = Self::differences(current, &target);
        let scale = self.scale_factors(current, &target);
        let weight = self.weight_vector();
        let (p, dp_da, dp_de) = self.periapsis_penalty(current);

        let mut sum = 0.0;
        for i in 0..5 {
            sum += weight[i] * scale[i] * (diff[i] / oe_dot_xx[i]).powi(2);
        }

        let mut gradient = Vector5::zeros();
        let envelope = 1.0 + self.parameters.w_p * p;
        for j in 0..5 {
            let direct = 2.0 * weight[j] * scale[j] * diff[j] / (oe_dot_xx[j] * oe_dot_xx[j]);
            gradient[j] = envelope * direct;
        }
        gradient[0] += self.parameters.w_p * dp_da * sum;
        gradient[1] += self.parameters.w_p * dp_de * sum;

        gradient
    }

    /// Computes the raw `(θ, r, h)` thrust direction and the `Q̇` it achieves at the given
    /// osculating elements and true anomaly, without effectivity gating or output rotation.
    fn raw_direction_and_rate(&self, current: &Elements, nu_rad: f64) -> NyxResult<(Vector3<f64>, f64)> {
        let (jacobian, oe_dot_xx) = self.jacobian(current, nu_rad);
        let gradient = self.dq_doe(current, &oe_dot_xx)?;

        let projected = jacobian.transpose() * gradient;
        let norm = projected.norm();
        if norm < 1e-15 {
            return Ok((Vector3::zeros(), 0.0));
        }

        let direction = -projected / norm;
        let q_dot = gradient.dot(&(jacobian * direction));
        Ok((direction, q_dot))
    }

    fn effectivity(&self, current: &Elements, nu_rad: f64, q_dot_n: f64) -> Effectivity {
        let grid = self.parameters.effectivity_grid_size.max(2);
        let mut min_rate = f64::INFINITY;
        let mut max_rate = f64::NEG_INFINITY;

        for k in 0..grid {
            let sample_nu = std::f64::consts::TAU * (k as f64) / (grid as f64);
            if let Ok((_, rate)) = self.raw_direction_and_rate(current, sample_nu) {
                min_rate = min_rate.min(rate);
                max_rate = max_rate.max(rate);
            }
        }
        let _ = nu_rad;

        let eta_absolute = if min_rate.abs() > 1e-15 { q_dot_n / min_rate } else { 1.0 };
        let eta_relative = if (min_rate - max_rate).abs() > 1e-15 {
            (q_dot_n - max_rate) / (min_rate - max_rate)
        } else {
            1.0
        };

        Effectivity { eta_absolute, eta_relative }
    }
}

impl GuidanceLaw for QLaw {
    fn thrust_direction_at(
        &self,
        instant: Epoch,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        _thrust_accel_m_s2: f64,
        output_frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>> {
        let frame_id = crate::frames::FrameId::new(output_frame.name(), output_frame.is_quasi_inertial());
        let coe = COE::from_cartesian(position_m, velocity_m_s, &frame_id, self.mu_m3_s2)?;

        if self.has_converged(&coe) {
            return Ok(Vector3::zeros());
        }

        let current = Self::saturate(&coe);
        let nu_rad = coe.true_anomaly_rad()?;

        let (direction_trh, q_dot) = self.raw_direction_and_rate(&current, nu_rad)?;
        if direction_trh.norm() == 0.0 {
            return Ok(Vector3::zeros());
        }

        let effectivity = self.effectivity(&current, nu_rad, q_dot);
        if let Some(threshold) = self.parameters.eta_absolute_threshold {
            if effectivity.eta_absolute < threshold {
                return Ok(Vector3::zeros());
            }
        }
        if let Some(threshold) = self.parameters.eta_relative_threshold {
            if effectivity.eta_relative < threshold {
                return Ok(Vector3::zeros());
            }
        }

        let rotation: Matrix3<f64> = theta_rh_to_inertial(position_m, velocity_m_s);
        let _ = instant;
        Ok(rotation * direction_trh)
    }
}

impl std::fmt::Debug for QLaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QLaw")
            .field("target", &self.target)
            .field("gradient", &self.gradient)
            .finish()
    }
}
