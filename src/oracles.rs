//! Collaborator contracts the core consumes but does not implement (§6.1).
//!
//! Gravity-field evaluation, atmospheric density, and solar/lunar ephemerides are explicitly
//! out of scope: this module only pins down the traits a concrete implementation must satisfy
//! so that [`crate::dynamics::Dynamics`] can call into them.

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::errors::NyxResult;
use crate::frames::Frame;

/// A celestial body's physical constants, as needed by the Kepler propagator and by
/// central/third-body gravity dynamics.
pub trait CelestialBody: std::fmt::Debug {
    fn gravitational_parameter_m3_s2(&self) -> f64;
    fn equatorial_radius_m(&self) -> f64;
    fn flattening(&self) -> f64;
    fn j2(&self) -> f64;
    fn j3(&self) -> f64;
    fn j4(&self) -> f64;
    /// The name of this body's body-fixed frame, resolvable through the frame oracle.
    fn body_fixed_frame_name(&self) -> &str;
}

/// `acceleration_at(instant, position_in_frame) -> m/s^2`, per §6.1.
pub trait GravityContribution: std::fmt::Debug {
    fn acceleration_at(
        &self,
        instant: Epoch,
        position_m: &Vector3<f64>,
        frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>>;

    /// The radius below which this contributor considers the spacecraft to have re-entered
    /// the central body, used by the propagator's re-entry guard.
    fn minimum_safe_radius_m(&self) -> f64;
}

/// `density_at(instant, position) -> kg/m^3` plus the relative wind velocity, per §6.1.
pub trait AtmosphereContribution: std::fmt::Debug {
    fn density_at(&self, instant: Epoch, position_m: &Vector3<f64>, frame: &dyn Frame) -> NyxResult<f64>;
    fn relative_wind_m_s(
        &self,
        instant: Epoch,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>>;
}

/// `position_at(instant, frame) -> m`, per §6.1. Needed by sun/moon third-body gravity and by
/// any Q-Law extension that elects a sun-relative form (not exercised by this crate).
pub trait EphemerisContribution: std::fmt::Debug {
    fn position_at(&self, instant: Epoch, frame: &dyn Frame) -> NyxResult<Vector3<f64>>;
}
