//! Guidance laws (§3.1, §4.5, §4.6): a `GuidanceLaw` maps an instantaneous mechanical state to a
//! unit thrust direction. `qlaw` holds the Lyapunov guidance law; this module holds the two
//! composition primitives the segment maneuver loop builds on top of it.

pub mod qlaw;

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::errors::NyxResult;
use crate::frames::{Frame, LocalOrbitalFrame};
use crate::time::Interval;

pub use qlaw::QLaw;

/// `thrust_direction_at(instant, position, velocity, thrust_accel_magnitude, output_frame) ->
/// Vector3`, per §3.1. Implementations return a direction of unit norm, or the zero vector when
/// they command coast; `thrust_accel_magnitude` lets an implementation (Q-Law) evaluate its
/// Lyapunov gradient at the actual commanded acceleration rather than an arbitrary reference.
pub trait GuidanceLaw: std::fmt::Debug + Send + Sync {
    fn thrust_direction_at(
        &self,
        instant: Epoch,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        thrust_accel_m_s2: f64,
        output_frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>>;
}

/// A guidance law that always commands coast. Used to fill the gaps between accepted maneuver
/// intervals in a segment's effective composite guidance.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoThrust;

impl GuidanceLaw for NoThrust {
    fn thrust_direction_at(
        &self,
        _instant: Epoch,
        _position_m: &Vector3<f64>,
        _velocity_m_s: &Vector3<f64>,
        _thrust_accel_m_s2: f64,
        _output_frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>> {
        Ok(Vector3::zeros())
    }
}

/// A fixed direction expressed in a named local orbital frame, re-resolved to the output frame
/// at every call from the instantaneous osculating position/velocity. Used by `Segment` to
/// replace a state-dependent guidance law with a constant-LOF compliant one after acceptance.
#[derive(Clone, Copy, Debug)]
pub struct ConstantThrust {
    pub frame: LocalOrbitalFrame,
    pub direction_in_frame: Vector3<f64>,
}

impl ConstantThrust {
    pub fn new(frame: LocalOrbitalFrame, direction_in_frame: Vector3<f64>) -> Self {
        Self {
            frame,
            direction_in_frame: direction_in_frame.normalize(),
        }
    }
}

impl GuidanceLaw for ConstantThrust {
    fn thrust_direction_at(
        &self,
        _instant: Epoch,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        _thrust_accel_m_s2: f64,
        _output_frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>> {
        let rotation = self.frame.rotation_to_inertial(position_m, velocity_m_s);
        Ok(rotation * self.direction_in_frame)
    }
}

/// The heterogeneous composite guidance a `Segment::Solution` wraps its effective thruster in
/// (§4.5.2): each accepted maneuver interval maps to the guidance law that produced it; outside
/// every interval the composite commands coast.
#[derive(Clone, Debug)]
pub struct CompositeGuidance {
    spans: Vec<(Interval, std::sync::Arc<dyn GuidanceLaw>)>,
}

impl CompositeGuidance {
    pub fn new() -> Self {
        Self { spans: Vec::new() }
    }

    /// Appends a span. Spans must be inserted in non-decreasing start order to keep the
    /// composite's own `are_disjoint_and_sorted` invariant checkable by the caller.
    pub fn push(&mut self, interval: Interval, guidance: std::sync::Arc<dyn GuidanceLaw>) {
        self.spans.push((interval, guidance));
    }

    pub fn spans(&self) -> &[(Interval, std::sync::Arc<dyn GuidanceLaw>)] {
        &self.spans
    }
}

impl Default for CompositeGuidance {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidanceLaw for CompositeGuidance {
    fn thrust_direction_at(
        &self,
        instant: Epoch,
        position_m: &Vector3<f64>,
        velocity_m_s: &Vector3<f64>,
        thrust_accel_m_s2: f64,
        output_frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>> {
        for (interval, guidance) in &self.spans {
            if interval.contains(instant) {
                return guidance.thrust_direction_at(
                    instant,
                    position_m,
                    velocity_m_s,
                    thrust_accel_m_s2,
                    output_frame,
                );
            }
        }
        Ok(Vector3::zeros())
    }
}
