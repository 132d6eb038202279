use nalgebra::{Matrix3, Vector3};

use crate::errors::{NyxError, NyxResult};

/// Contract for the reference-frame oracle the core consumes but does not implement.
///
/// A concrete implementation (GCRF/ITRF/body-fixed transforms, precession-nutation,
/// polar motion, etc.) lives outside this crate. The core only needs to know a frame's
/// identity and whether it is quasi-inertial; everything else is resolved through
/// [`Frame::transform_to`], which a collaborator supplies.
pub trait Frame: std::fmt::Debug {
    /// A short, stable identifier suitable for error messages and lookups.
    fn name(&self) -> &str;

    /// Whether Newton's laws hold undistorted in this frame (GCRF, J2000, ...).
    /// Rotating, body-fixed frames (ITRF, body-fixed Kepler inputs) return `false`.
    fn is_quasi_inertial(&self) -> bool;
}

/// A minimal, self-contained [`Frame`] implementation: just a name and a quasi-inertial flag.
///
/// Suitable for tests and for any caller who does not need the full rigid-transform oracle
/// (e.g. because all of their dynamics already live in one frame).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameId {
    name: String,
    quasi_inertial: bool,
}

impl FrameId {
    pub fn gcrf() -> Self {
        Self {
            name: "GCRF".to_string(),
            quasi_inertial: true,
        }
    }

    pub fn itrf() -> Self {
        Self {
            name: "ITRF".to_string(),
            quasi_inertial: false,
        }
    }

    pub fn new(name: impl Into<String>, quasi_inertial: bool) -> Self {
        Self {
            name: name.into(),
            quasi_inertial,
        }
    }
}

impl Frame for FrameId {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_quasi_inertial(&self) -> bool {
        self.quasi_inertial
    }
}

pub fn require_quasi_inertial(frame: &dyn Frame) -> NyxResult<()> {
    if frame.is_quasi_inertial() {
        Ok(())
    } else {
        Err(NyxError::FrameNotQuasiInertial {
            frame: frame.name().to_string(),
        })
    }
}

/// A rigid-plus-velocity transform between two frames at an instant, as returned by the
/// frame oracle: translation and velocity of the target frame's origin expressed in the
/// source frame, plus the rotation and angular velocity carrying source axes onto target axes.
#[derive(Clone, Copy, Debug)]
pub struct FrameTransform {
    pub translation_m: Vector3<f64>,
    pub velocity_m_s: Vector3<f64>,
    pub rotation: Matrix3<f64>,
    pub angular_velocity_rad_s: Vector3<f64>,
}

impl FrameTransform {
    /// Applies the transform to a position, including the translation.
    pub fn apply_to_position(&self, position_m: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * position_m + self.translation_m
    }

    /// Applies the transform to a velocity, including both the translation's rate of change
    /// and the rotating-frame velocity-coupling term `omega x r`.
    pub fn apply_to_velocity(
        &self,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
    ) -> Vector3<f64> {
        let coupling = self.angular_velocity_rad_s.cross(position_m);
        self.rotation * (velocity_m_s + coupling) + self.velocity_m_s
    }
}

/// Named local orbital frame conventions usable for constant-LOF maneuver compliance.
///
/// Each variant builds a right-handed rotation matrix (columns are the frame's unit axes,
/// expressed in the same frame as the input position/velocity) from the instantaneous
/// osculating position and velocity. `Ned` is a geocentric approximation (north/east/down
/// relative to the local radial direction) rather than a true oblate-Earth geodetic frame,
/// since geodetic latitude is only available from the frame oracle this crate does not own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalOrbitalFrame {
    Ned,
    Lvlh,
    Vvlh,
    Qsw,
    Tnw,
    Vnc,
}

impl LocalOrbitalFrame {
    pub fn rotation_to_inertial(
        &self,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
    ) -> Matrix3<f64> {
        let r_hat = position_m.normalize();
        let v_hat = velocity_m_s.normalize();
        let h = position_m.cross(velocity_m_s);
        let h_hat = h.normalize();

        match self {
            LocalOrbitalFrame::Qsw => {
                let w_hat = h_hat;
                let s_hat = w_hat.cross(&r_hat);
                Matrix3::from_columns(&[r_hat, s_hat, w_hat])
            }
            LocalOrbitalFrame::Tnw => {
                let t_hat = v_hat;
                let w_hat = h_hat;
                let n_hat = w_hat.cross(&t_hat);
                Matrix3::from_columns(&[t_hat, n_hat, w_hat])
            }
            LocalOrbitalFrame::Vnc => {
                let v = v_hat;
                let n = h_hat;
                let c = v.cross(&n);
                Matrix3::from_columns(&[v, n, c])
            }
            LocalOrbitalFrame::Lvlh => {
                let z_hat = -r_hat;
                let y_hat = -h_hat;
                let x_hat = y_hat.cross(&z_hat);
                Matrix3::from_columns(&[x_hat, y_hat, z_hat])
            }
            LocalOrbitalFrame::Vvlh => {
                let z_hat = -r_hat;
                let x_hat = v_hat.cross(&r_hat).cross(&z_hat);
                let y_hat = z_hat.cross(&x_hat);
                Matrix3::from_columns(&[x_hat, y_hat, z_hat])
            }
            LocalOrbitalFrame::Ned => {
                let d_hat = -r_hat;
                let n_hat = (-h_hat.cross(&r_hat)).normalize();
                let e_hat = h_hat.cross(&n_hat);
                Matrix3::from_columns(&[n_hat, e_hat, d_hat])
            }
        }
    }
}

/// The (theta, radial, normal) triad used by Q-Law to express its thrust direction, per
/// the convention `R = r_hat`, `H = (r x v)_hat`, `theta = H x R`.
pub fn theta_rh_to_inertial(position_m: &Vector3<f64>, velocity_m_s: &Vector3<f64>) -> Matrix3<f64> {
    let r_hat = position_m.normalize();
    let h_hat = position_m.cross(velocity_m_s).normalize();
    let theta_hat = h_hat.cross(&r_hat);
    Matrix3::from_columns(&[theta_hat, r_hat, h_hat])
}
