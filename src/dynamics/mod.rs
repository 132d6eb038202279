//! Dynamics composition (§4.3).
//!
//! The source models each force contributor as a subclass of a virtual `Dynamics` base.
//! Generalized here as a single tagged variant per the redesign notes: every contributor
//! declares the coordinate subsets it reads and writes, and the propagator's right-hand side
//! sums same-subset contributions together (additivity, tested in `tests/properties.rs`).

use std::sync::Arc;

use hifitime::Epoch;
use nalgebra::{DVector, Vector3};

use crate::errors::{NyxError, NyxResult};
use crate::frames::Frame;
use crate::guidance::GuidanceLaw;
use crate::oracles::{AtmosphereContribution, EphemerisContribution, GravityContribution};
use crate::satellite::SatelliteSystem;
use crate::state::CoordinateSubset;

/// A single precomputed table entry for [`Dynamics::Tabulated`].
#[derive(Clone, Debug)]
pub struct TabulatedEntry {
    pub instant: Epoch,
    pub contribution: DVector<f64>,
}

/// A named computation supplying read/write coordinate subsets and an instantaneous
/// contribution, per §3.1 and §4.3.
#[derive(Clone)]
pub enum Dynamics {
    /// Reads velocity, writes it straight into position's derivative slot (`r' = v`).
    PositionDerivative,
    /// Plain two-body gravity, optionally summed with a gravity-field oracle contribution
    /// (spherical-harmonic evaluation itself is out of scope; only its acceleration output
    /// is consumed here).
    CentralBodyGravity {
        mu_m3_s2: f64,
        harmonics: Option<Arc<dyn GravityContribution>>,
    },
    /// Third-body point-mass perturbation: direct term at the spacecraft minus the indirect
    /// term at the central body, using an ephemeris oracle for the perturbing body's position.
    ThirdBodyGravity {
        gravitational_parameter_m3_s2: f64,
        ephemeris: Arc<dyn EphemerisContribution>,
    },
    AtmosphericDrag {
        satellite: SatelliteSystem,
        atmosphere: Arc<dyn AtmosphereContribution>,
    },
    /// Scales a [`GuidanceLaw`]'s unit thrust direction by the satellite's thrust-to-mass
    /// ratio and writes the corresponding mass flow rate.
    Thruster {
        satellite: SatelliteSystem,
        guidance: Arc<dyn GuidanceLaw>,
    },
    /// A precomputed `(instant, contribution)` table, linearly interpolated between entries
    /// that bracket the query instant; binary-searched on invocation.
    Tabulated {
        read_subsets: Vec<CoordinateSubset>,
        write_subsets: Vec<CoordinateSubset>,
        table: Vec<TabulatedEntry>,
    },
}

impl Dynamics {
    pub fn read_subsets(&self) -> Vec<CoordinateSubset> {
        match self {
            Dynamics::PositionDerivative => vec![CoordinateSubset::cartesian_velocity()],
            Dynamics::CentralBodyGravity { .. } => vec![CoordinateSubset::cartesian_position()],
            Dynamics::ThirdBodyGravity { .. } => vec![CoordinateSubset::cartesian_position()],
            Dynamics::AtmosphericDrag { .. } => vec![
                CoordinateSubset::cartesian_position(),
                CoordinateSubset::cartesian_velocity(),
                CoordinateSubset::mass(),
            ],
            Dynamics::Thruster { .. } => vec![
                CoordinateSubset::cartesian_position(),
                CoordinateSubset::cartesian_velocity(),
                CoordinateSubset::mass(),
            ],
            Dynamics::Tabulated { read_subsets, .. } => read_subsets.clone(),
        }
    }

    pub fn write_subsets(&self) -> Vec<CoordinateSubset> {
        match self {
            Dynamics::PositionDerivative => vec![CoordinateSubset::cartesian_position()],
            Dynamics::CentralBodyGravity { .. } => vec![CoordinateSubset::cartesian_velocity()],
            Dynamics::ThirdBodyGravity { .. } => vec![CoordinateSubset::cartesian_velocity()],
            Dynamics::AtmosphericDrag { .. } => vec![CoordinateSubset::cartesian_velocity()],
            Dynamics::Thruster { .. } => vec![CoordinateSubset::cartesian_velocity(), CoordinateSubset::mass()],
            Dynamics::Tabulated { write_subsets, .. } => write_subsets.clone(),
        }
    }

    /// Whether this dynamics entity is a thruster (used by `Segment` to enforce invariant 5).
    pub fn is_thruster(&self) -> bool {
        matches!(self, Dynamics::Thruster { .. })
    }

    pub fn contribution(
        &self,
        instant: Epoch,
        read_slice: &DVector<f64>,
        frame: &dyn Frame,
    ) -> NyxResult<DVector<f64>> {
        match self {
            Dynamics::PositionDerivative => Ok(read_slice.clone()),

            Dynamics::CentralBodyGravity { mu_m3_s2, harmonics } => {
                let position = Vector3::new(read_slice[0], read_slice[1], read_slice[2]);
                let r = position.norm();
                if let Some(oracle) = harmonics {
                    let safe_radius_m = oracle.minimum_safe_radius_m();
                    if r < safe_radius_m {
                        return Err(NyxError::BelowSurface {
                            epoch: instant,
                            radius_m: r,
                        });
                    }
                }
                let mut accel = -mu_m3_s2 / r.powi(3) * position;
                if let Some(oracle) = harmonics {
                    accel += oracle.acceleration_at(instant, &position, frame)?;
                }
                Ok(DVector::from_row_slice(accel.as_slice()))
            }

            Dynamics::ThirdBodyGravity {
                gravitational_parameter_m3_s2,
                ephemeris,
            } => {
                let position = Vector3::new(read_slice[0], read_slice[1], read_slice[2]);
                let third_body_position = ephemeris.position_at(instant, frame)?;
                let relative = third_body_position - position;
                let direct = relative / relative.norm().powi(3);
                let indirect = third_body_position / third_body_position.norm().powi(3);
                let accel = gravitational_parameter_m3_s2 * (direct - indirect);
                Ok(DVector::from_row_slice(accel.as_slice()))
            }

            Dynamics::AtmosphericDrag { satellite, atmosphere } => {
                let position = Vector3::new(read_slice[0], read_slice[1], read_slice[2]);
                let velocity = Vector3::new(read_slice[3], read_slice[4], read_slice[5]);
                let mass_kg = read_slice[6];

                let density = atmosphere.density_at(instant, &position, frame)?;
                let relative_wind = atmosphere.relative_wind_m_s(instant, &position, &velocity, frame)?;
                let speed = relative_wind.norm();

                let accel = if speed > 0.0 {
                    -0.5 * satellite.drag_coefficient * satellite.drag_area_m2 / mass_kg
                        * density
                        * speed
                        * relative_wind
                } else {
                    Vector3::zeros()
                };

                Ok(DVector::from_row_slice(accel.as_slice()))
            }

            Dynamics::Thruster { satellite, guidance } => {
                let position = Vector3::new(read_slice[0], read_slice[1], read_slice[2]);
                let velocity = Vector3::new(read_slice[3], read_slice[4], read_slice[5]);
                let mass_kg = read_slice[6];

                let propulsion = satellite.propulsion.ok_or_else(|| {
                    crate::errors::NyxError::Undefined("propulsion system on thruster dynamics".to_string())
                })?;

                let thrust_accel_mag = propulsion.thrust_n / mass_kg;
                let direction = guidance.thrust_direction_at(instant, &position, &velocity, thrust_accel_mag, frame)?;

                let accel = thrust_accel_mag * direction;
                let mass_rate = propulsion.mass_flow_rate_kg_s() * direction.norm();

                Ok(DVector::from_row_slice(&[accel.x, accel.y, accel.z, mass_rate]))
            }

            Dynamics::Tabulated { table, write_subsets, .. } => {
                let size: usize = write_subsets.iter().map(CoordinateSubset::size).sum();
                if table.is_empty() {
                    return Ok(DVector::zeros(size));
                }

                let idx = table.partition_point(|entry| entry.instant <= instant);

                if idx == 0 {
                    return Ok(table[0].contribution.clone());
                }
                if idx >= table.len() {
                    return Ok(table[table.len() - 1].contribution.clone());
                }

                let lo = &table[idx - 1];
                let hi = &table[idx];
                let span = (hi.instant - lo.instant).to_seconds();
                let frac = if span > 0.0 {
                    (instant - lo.instant).to_seconds() / span
                } else {
                    0.0
                };

                Ok(&lo.contribution + frac * (&hi.contribution - &lo.contribution))
            }
        }
    }
}

impl std::fmt::Debug for Dynamics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dynamics::PositionDerivative => write!(f, "PositionDerivative"),
            Dynamics::CentralBodyGravity { mu_m3_s2, .. } => {
                write!(f, "CentralBodyGravity(mu={mu_m3_s2})")
            }
            Dynamics::ThirdBodyGravity {
                gravitational_parameter_m3_s2,
                ..
            } => write!(f, "ThirdBodyGravity(mu={gravitational_parameter_m3_s2})"),
            Dynamics::AtmosphericDrag { .. } => write!(f, "AtmosphericDrag"),
            Dynamics::Thruster { .. } => write!(f, "Thruster"),
            Dynamics::Tabulated { table, .. } => write!(f, "Tabulated({} entries)", table.len()),
        }
    }
}
