use nalgebra::{Matrix3, Vector3};

use crate::errors::{NyxError, NyxResult};
use crate::frames::{require_quasi_inertial, Frame};

/// The branch tolerance shared by the Cartesian decomposition's circular/equatorial checks.
const REGIME_TOLERANCE: f64 = 1e-11;

/// Which anomaly convention a bare angle (or a [`COE`]'s stored anomaly field) represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnomalyKind {
    True,
    Mean,
    Eccentric,
}

/// Classical orbital elements: semi-major axis, eccentricity, inclination, RAAN, argument of
/// periapsis, and a single anomaly value tagged with the convention it is stored in.
///
/// All angles are in radians, `sma_m` in meters. Construction does not itself validate physical
/// consistency (e.g. that `0 <= ecc < 1` matches a positive `sma_m`); that is enforced by the
/// operations that consume a `COE`, per the invariants they each depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct COE {
    pub sma_m: f64,
    pub ecc: f64,
    pub inc_rad: f64,
    pub raan_rad: f64,
    pub aop_rad: f64,
    pub anomaly_rad: f64,
    pub anomaly_kind: AnomalyKind,
}

impl COE {
    pub fn new(
        sma_m: f64,
        ecc: f64,
        inc_rad: f64,
        raan_rad: f64,
        aop_rad: f64,
        anomaly_rad: f64,
        anomaly_kind: AnomalyKind,
    ) -> Self {
        Self {
            sma_m,
            ecc,
            inc_rad,
            raan_rad,
            aop_rad,
            anomaly_rad,
            anomaly_kind,
        }
    }

    /// Constructs a `COE` whose anomaly is given as a true anomaly, the common case.
    pub fn with_true_anomaly(
        sma_m: f64,
        ecc: f64,
        inc_rad: f64,
        raan_rad: f64,
        aop_rad: f64,
        true_anomaly_rad: f64,
    ) -> Self {
        Self::new(
            sma_m,
            ecc,
            inc_rad,
            raan_rad,
            aop_rad,
            true_anomaly_rad,
            AnomalyKind::True,
        )
    }

    pub fn true_anomaly_rad(&self) -> NyxResult<f64> {
        convert_anomaly(self.anomaly_rad, self.ecc, self.anomaly_kind, AnomalyKind::True, 1e-12)
    }

    pub fn mean_anomaly_rad(&self) -> NyxResult<f64> {
        convert_anomaly(self.anomaly_rad, self.ecc, self.anomaly_kind, AnomalyKind::Mean, 1e-12)
    }

    pub fn eccentric_anomaly_rad(&self) -> NyxResult<f64> {
        convert_anomaly(
            self.anomaly_rad,
            self.ecc,
            self.anomaly_kind,
            AnomalyKind::Eccentric,
            1e-12,
        )
    }

    pub fn argument_of_latitude_rad(&self) -> NyxResult<f64> {
        Ok(self.aop_rad + self.true_anomaly_rad()?)
    }

    pub fn semi_latus_rectum_m(&self) -> f64 {
        semi_latus_rectum(self.sma_m, self.ecc)
    }

    pub fn periapsis_radius_m(&self) -> f64 {
        self.sma_m * (1.0 - self.ecc)
    }

    pub fn apoapsis_radius_m(&self) -> f64 {
        self.sma_m * (1.0 + self.ecc)
    }

    pub fn radial_distance_m(&self) -> NyxResult<f64> {
        let nu = self.true_anomaly_rad()?;
        Ok(radial_distance(self.sma_m, self.ecc, nu))
    }

    pub fn angular_momentum(&self, mu_m3_s2: f64) -> f64 {
        angular_momentum_from_slr(self.semi_latus_rectum_m(), mu_m3_s2)
    }

    pub fn mean_motion_rad_s(&self, mu_m3_s2: f64) -> f64 {
        (mu_m3_s2 / self.sma_m.powi(3)).sqrt()
    }

    pub fn orbital_period_s(&self, mu_m3_s2: f64) -> f64 {
        std::f64::consts::TAU / self.mean_motion_rad_s(mu_m3_s2)
    }

    /// Secular nodal precession rate under the J2 zonal term alone, per §4.1.
    pub fn nodal_precession_rate_rad_s(&self, mu_m3_s2: f64, equatorial_radius_m: f64, j2: f64) -> f64 {
        let n = self.mean_motion_rad_s(mu_m3_s2);
        let p_term = self.sma_m * (1.0 - self.ecc * self.ecc);
        -1.5 * equatorial_radius_m.powi(2) * j2 * n * self.inc_rad.cos() / p_term.powi(2)
    }

    /// Converts these elements to a Cartesian (position, velocity) pair in `frame`, per §4.1.
    pub fn to_cartesian(&self, mu_m3_s2: f64, frame: &dyn Frame) -> NyxResult<(Vector3<f64>, Vector3<f64>)> {
        require_quasi_inertial(frame)?;
        self.to_cartesian_raw(mu_m3_s2)
    }

    /// The same conversion as [`COE::to_cartesian`], without the quasi-inertial frame check.
    ///
    /// The PQW-to-reference-frame rotation is pure algebra and does not itself require an
    /// inertial frame; [`crate::kepler::Kepler`] uses this to lift a body-fixed COE into GCRF by
    /// rotating the resulting (position, velocity) pair through the frame oracle's rigid
    /// transform (including the rotating-frame velocity-coupling term) before re-deriving COE,
    /// per §4.2's frame-handling rule.
    pub fn to_cartesian_raw(&self, mu_m3_s2: f64) -> NyxResult<(Vector3<f64>, Vector3<f64>)> {
        if mu_m3_s2 == 0.0 {
            return Err(NyxError::Undefined("gravitational parameter".to_string()));
        }

        if (1.0 - self.ecc).abs() <= f64::EPSILON {
            return Err(NyxError::ConicSingular {
                reason: "parabolic orbits are not supported".to_string(),
            });
        }

        let nu = self.true_anomaly_rad()?;
        let p = self.semi_latus_rectum_m();
        let denom = 1.0 + self.ecc * nu.cos();

        let r_pqw = Vector3::new(p * nu.cos() / denom, p * nu.sin() / denom, 0.0);
        let v_pqw = Vector3::new(
            -(mu_m3_s2 / p).sqrt() * nu.sin(),
            (mu_m3_s2 / p).sqrt() * (self.ecc + nu.cos()),
            0.0,
        );

        let rotation = rz(-self.raan_rad) * rx(-self.inc_rad) * rz(-self.aop_rad);

        Ok((rotation * r_pqw, rotation * v_pqw))
    }

    /// Recovers classical orbital elements from a Cartesian state, per §4.1.
    pub fn from_cartesian(
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        frame: &dyn Frame,
        mu_m3_s2: f64,
    ) -> NyxResult<Self> {
        require_quasi_inertial(frame)?;

        if mu_m3_s2 == 0.0 {
            return Err(NyxError::Undefined("gravitational parameter".to_string()));
        }

        let position = position_m.norm();
        let velocity = velocity_m_s.norm();

        if position == 0.0 {
            return Err(NyxError::WrongInput("position vector is zero".to_string()));
        }

        let angular_momentum_vec = position_m.cross(velocity_m_s);
        let angular_momentum = angular_momentum_vec.norm();

        if angular_momentum == 0.0 {
            return Err(NyxError::WrongInput("angular momentum is zero".to_string()));
        }

        let node_vec = Vector3::z().cross(&angular_momentum_vec);
        let node = node_vec.norm();

        let eccentricity_vec = (1.0 / mu_m3_s2)
            * (((velocity * velocity - mu_m3_s2 / position) * *position_m)
                - (position_m.dot(velocity_m_s) * *velocity_m_s));
        let e = eccentricity_vec.norm();

        if (1.0 - e).abs() <= f64::EPSILON {
            return Err(NyxError::ConicSingular {
                reason: "parabolic orbits are not supported".to_string(),
            });
        }

        let specific_energy = 0.5 * velocity * velocity - mu_m3_s2 / position;
        if specific_energy == 0.0 {
            return Err(NyxError::WrongInput("specific orbital energy is zero".to_string()));
        }

        let sma_m = -mu_m3_s2 / (2.0 * specific_energy);

        if (sma_m * (1.0 - e)).abs() < f64::EPSILON {
            return Err(NyxError::ConicSingular {
                reason: "conic section is singular".to_string(),
            });
        }

        let inc_rad = (angular_momentum_vec.z / angular_momentum).acos();

        let (raan_rad, aop_rad, nu_rad) = if e >= REGIME_TOLERANCE
            && inc_rad >= REGIME_TOLERANCE
            && inc_rad <= std::f64::consts::PI - REGIME_TOLERANCE
        {
            // Non-circular, inclined.
            if node == 0.0 {
                return Err(NyxError::Undefined("node vector".to_string()));
            }

            let mut raan = (node_vec.x / node).acos();
            if node_vec.y < 0.0 {
                raan = std::f64::consts::TAU - raan;
            }

            let mut aop = (node_vec.dot(&eccentricity_vec) / (node * e)).clamp(-1.0, 1.0).acos();
            if eccentricity_vec.z < 0.0 {
                aop = std::f64::consts::TAU - aop;
            }

            let mut nu = (eccentricity_vec.dot(position_m) / (e * position)).clamp(-1.0, 1.0).acos();
            if position_m.dot(velocity_m_s) < 0.0 {
                nu = std::f64::consts::TAU - nu;
            }

            (raan, aop, nu)
        } else if e >= REGIME_TOLERANCE {
            // Non-circular, equatorial.
            let mut aop = (eccentricity_vec.x / e).acos();
            if eccentricity_vec.y < 0.0 {
                aop = std::f64::consts::TAU - aop;
            }
            if inc_rad > std::f64::consts::PI - REGIME_TOLERANCE {
                aop = -aop;
            }
            if aop < 0.0 {
                aop += std::f64::consts::TAU;
            }

            let mut nu = (eccentricity_vec.dot(position_m) / (e * position)).clamp(-1.0, 1.0).acos();
            if position_m.dot(velocity_m_s) < 0.0 {
                nu = std::f64::consts::TAU - nu;
            }

            (0.0, aop, nu)
        } else if inc_rad >= REGIME_TOLERANCE && inc_rad <= std::f64::consts::PI - REGIME_TOLERANCE {
            // Circular, inclined.
            if node == 0.0 {
                return Err(NyxError::Undefined("node vector".to_string()));
            }

            let mut raan = (node_vec.x / node).acos();
            if node_vec.y < 0.0 {
                raan = std::f64::consts::TAU - raan;
            }

            let mut nu = (node_vec.dot(position_m) / (node * position)).clamp(-1.0, 1.0).acos();
            if position_m.z < 0.0 {
                nu = std::f64::consts::TAU - nu;
            }

            (raan, 0.0, nu)
        } else {
            // Circular, equatorial.
            let mut nu = (position_m.x / position).acos();
            if position_m.y < 0.0 {
                nu = std::f64::consts::TAU - nu;
            }
            if inc_rad > std::f64::consts::PI - REGIME_TOLERANCE {
                nu = -nu;
            }
            if nu < 0.0 {
                nu += std::f64::consts::TAU;
            }

            (0.0, 0.0, nu)
        };

        Ok(Self::with_true_anomaly(sma_m, e, inc_rad, raan_rad, aop_rad, nu_rad))
    }

    /// Builds a frozen orbit's elements, per §4.1. Exactly one of `ecc`/`inc_rad` may be
    /// omitted; the critical argument-of-periapsis branch derives the missing one from the
    /// other via `e = e_coef * sin(i)`.
    pub fn frozen_orbit(
        sma_m: f64,
        equatorial_radius_m: f64,
        j2: f64,
        j3: f64,
        ecc: Option<f64>,
        inc_rad: Option<f64>,
        raan_rad: f64,
        aop_rad: f64,
        true_anomaly_rad: f64,
    ) -> NyxResult<Self> {
        let e_coef = -j3 * equatorial_radius_m / (2.0 * j2 * sma_m);

        const CRITICAL_AOP_A: f64 = std::f64::consts::FRAC_PI_2;
        const CRITICAL_AOP_B: f64 = 3.0 * std::f64::consts::FRAC_PI_2;
        const CRITICAL_INC_A: f64 = 1.1071487177940904; // 63.4349 deg
        const CRITICAL_INC_B: f64 = 2.0344439357957027; // 116.5651 deg
        const ANGLE_TOL: f64 = 1e-8;

        let aop_is_critical =
            (aop_rad - CRITICAL_AOP_A).abs() < ANGLE_TOL || (aop_rad - CRITICAL_AOP_B).abs() < ANGLE_TOL;

        if aop_is_critical {
            let (e, i) = match (ecc, inc_rad) {
                (None, Some(i)) => (e_coef * i.sin(), i),
                (Some(e), None) => {
                    if e.abs() > e_coef.abs() {
                        return Err(NyxError::WrongInput(
                            "eccentricity exceeds the frozen-orbit bound e_coef".to_string(),
                        ));
                    }
                    (e, (e / e_coef).asin())
                }
                _ => {
                    return Err(NyxError::WrongInput(
                        "exactly one of eccentricity or inclination must be provided".to_string(),
                    ))
                }
            };
            return Ok(Self::with_true_anomaly(sma_m, e, i, raan_rad, aop_rad, true_anomaly_rad));
        }

        let inc_is_critical = inc_rad
            .map(|i| (i - CRITICAL_INC_A).abs() < ANGLE_TOL || (i - CRITICAL_INC_B).abs() < ANGLE_TOL)
            .unwrap_or(false);

        if !inc_is_critical {
            return Err(NyxError::WrongInput(
                "frozen orbit requires a critical argument of periapsis or a critical inclination".to_string(),
            ));
        }

        let (e, i) = match (ecc, inc_rad) {
            (Some(e), Some(i)) => (e, i),
            _ => {
                return Err(NyxError::WrongInput(
                    "frozen orbit at a critical inclination requires both eccentricity and inclination".to_string(),
                ))
            }
        };

        Ok(Self::with_true_anomaly(sma_m, e, i, raan_rad, aop_rad, true_anomaly_rad))
    }
}

fn rz(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

fn rx(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

pub fn semi_latus_rectum(sma_m: f64, ecc: f64) -> f64 {
    sma_m * (1.0 - ecc * ecc)
}

pub fn radial_distance(sma_m: f64, ecc: f64, true_anomaly_rad: f64) -> f64 {
    semi_latus_rectum(sma_m, ecc) / (1.0 + ecc * true_anomaly_rad.cos())
}

pub fn angular_momentum_from_slr(semi_latus_rectum_m: f64, mu_m3_s2: f64) -> f64 {
    (mu_m3_s2 * semi_latus_rectum_m).sqrt()
}

fn normalize_rad(angle_rad: f64) -> f64 {
    let wrapped = angle_rad % std::f64::consts::TAU;
    if wrapped < 0.0 {
        wrapped + std::f64::consts::TAU
    } else {
        wrapped
    }
}

/// True anomaly -> eccentric anomaly, with dedicated circular/elliptical/hyperbolic/parabolic
/// branches, per §4.1.
pub fn eccentric_from_true(true_anomaly_rad: f64, ecc: f64) -> NyxResult<f64> {
    const TOLERANCE: f64 = 1e-30;

    let (eccentric_rad, mean_rad) = if ecc.abs() < TOLERANCE {
        (true_anomaly_rad, true_anomaly_rad)
    } else if ecc < 1.0 - TOLERANCE {
        let sin_e = ((1.0 - ecc * ecc).sqrt() * true_anomaly_rad.sin()) / (1.0 + ecc * true_anomaly_rad.cos());
        let cos_e = (ecc + true_anomaly_rad.cos()) / (1.0 + ecc * true_anomaly_rad.cos());
        let eccentric = sin_e.atan2(cos_e);
        let mean = eccentric - ecc * eccentric.sin();
        (eccentric, mean)
    } else if ecc > 1.0 + TOLERANCE {
        if true_anomaly_rad.abs() + 0.00001 < std::f64::consts::PI - (1.0 / ecc).acos() {
            let sin_e = ((ecc * ecc - 1.0).sqrt() * true_anomaly_rad.sin()) / (1.0 + ecc * true_anomaly_rad.cos());
            let eccentric = sin_e.asinh();
            let mean = ecc * eccentric.sinh() - eccentric;
            (eccentric, mean)
        } else {
            return Err(NyxError::WrongInput(
                "true anomaly is outside the reachable range for this hyperbolic eccentricity".to_string(),
            ));
        }
    } else if true_anomaly_rad.abs() < 168.0_f64.to_radians() {
        let eccentric = (true_anomaly_rad * 0.5).tan();
        let mean = eccentric + eccentric.powi(3) / 3.0;
        (eccentric, mean)
    } else {
        return Err(NyxError::WrongInput(
            "true anomaly is outside the reachable range for a near-parabolic orbit".to_string(),
        ));
    };

    let _ = mean_rad; // retained for symmetry with the source derivation; M is not returned here.

    if ecc < 1.0 {
        Ok(normalize_rad(eccentric_rad))
    } else {
        Ok(eccentric_rad)
    }
}

pub fn true_from_eccentric(eccentric_anomaly_rad: f64, ecc: f64) -> f64 {
    let true_anomaly_rad = 2.0
        * ((1.0 + ecc).sqrt() * (eccentric_anomaly_rad / 2.0).sin())
            .atan2((1.0 - ecc).sqrt() * (eccentric_anomaly_rad / 2.0).cos());
    normalize_rad(true_anomaly_rad)
}

pub fn mean_from_eccentric(eccentric_anomaly_rad: f64, ecc: f64) -> f64 {
    normalize_rad(eccentric_anomaly_rad - ecc * eccentric_anomaly_rad.sin())
}

/// Mean anomaly -> eccentric anomaly via Danby's cubic-order iteration, per §4.1.
pub fn eccentric_from_mean(mean_anomaly_rad: f64, ecc: f64, tolerance: f64) -> NyxResult<f64> {
    let kepler_start = |e: f64, m: f64| -> f64 {
        let t34 = e * e;
        let t35 = e * t34;
        let t33 = m.cos();
        m + (-0.5 * t35 + e + (t34 + 1.5 * t33 * t35) * t33) * m.sin()
    };

    let eps3 = |e: f64, m: f64, x: f64| -> f64 {
        let t1 = x.cos();
        let t2 = -1.0 + e * t1;
        let t3 = x.sin();
        let t4 = e * t3;
        let t5 = -x + t4 + m;
        let t6 = t5 / (0.5 * t5 * t4 / t2 + t2);
        t5 / (((0.5 * t3) - ((1.0 / 6.0) * t1 * t6)) * e * t6 + t2)
    };

    let m_norm = mean_anomaly_rad % std::f64::consts::TAU;

    let mut e0 = kepler_start(ecc, m_norm);
    let mut d_e = tolerance + 1.0;
    let mut count = 0usize;
    let mut e_val = e0;

    while d_e > tolerance {
        e_val = e0 - eps3(ecc, m_norm, e0);
        d_e = (e_val - e0).abs();
        e0 = e_val;

        count += 1;
        if count > 1000 {
            return Err(NyxError::DidNotConverge {
                iterations: count,
                tolerance,
            });
        }
    }

    Ok(normalize_rad(e_val))
}

pub fn true_from_mean(mean_anomaly_rad: f64, ecc: f64, tolerance: f64) -> NyxResult<f64> {
    Ok(true_from_eccentric(eccentric_from_mean(mean_anomaly_rad, ecc, tolerance)?, ecc))
}

/// Converts a bare anomaly value between conventions, per `COE::convert_anomaly`.
pub fn convert_anomaly(angle_rad: f64, ecc: f64, from: AnomalyKind, to: AnomalyKind, tolerance: f64) -> NyxResult<f64> {
    if from == to {
        return Ok(normalize_rad(angle_rad));
    }

    let true_anomaly_rad = match from {
        AnomalyKind::True => angle_rad,
        AnomalyKind::Eccentric => true_from_eccentric(angle_rad, ecc),
        AnomalyKind::Mean => true_from_mean(angle_rad, ecc, tolerance)?,
    };

    match to {
        AnomalyKind::True => Ok(normalize_rad(true_anomaly_rad)),
        AnomalyKind::Eccentric => eccentric_from_true(true_anomaly_rad, ecc),
        AnomalyKind::Mean => Ok(mean_from_eccentric(eccentric_from_true(true_anomaly_rad, ecc)?, ecc)),
    }
}
