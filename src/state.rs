use hifitime::Epoch;
use nalgebra::DVector;
use std::sync::Arc;

use crate::errors::{NyxError, NyxResult};
use crate::frames::Frame;

/// A named, fixed-size slice of a [`State`]'s coordinate vector.
///
/// The broker order in which subsets are registered on a `State` determines the offsets used
/// by every [`crate::dynamics::Dynamics`] variant's `read_subsets`/`write_subsets`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CoordinateSubset {
    name: String,
    size: usize,
}

impl CoordinateSubset {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    pub fn cartesian_position() -> Self {
        Self::new("CartesianPosition", 3)
    }

    pub fn cartesian_velocity() -> Self {
        Self::new("CartesianVelocity", 3)
    }

    pub fn cartesian_acceleration() -> Self {
        Self::new("CartesianAcceleration", 3)
    }

    pub fn mass() -> Self {
        Self::new("Mass", 1)
    }

    pub fn mass_flow_rate() -> Self {
        Self::new("MassFlowRate", 1)
    }

    pub fn surface_area() -> Self {
        Self::new("SurfaceArea", 1)
    }

    pub fn drag_coefficient() -> Self {
        Self::new("DragCoefficient", 1)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A dense coordinate vector tagged with an ordered set of named subsets (the "broker"), an
/// instant, and a frame. The coordinate vector's length is always the sum of the subsets' sizes.
#[derive(Clone, Debug)]
pub struct State {
    instant: Epoch,
    frame: Arc<dyn Frame>,
    subsets: Vec<CoordinateSubset>,
    coordinates: DVector<f64>,
}

impl State {
    pub fn new(
        instant: Epoch,
        frame: Arc<dyn Frame>,
        subsets: Vec<CoordinateSubset>,
        coordinates: DVector<f64>,
    ) -> NyxResult<Self> {
        let expected_len: usize = subsets.iter().map(CoordinateSubset::size).sum();
        if expected_len != coordinates.len() {
            return Err(NyxError::WrongInput(format!(
                "coordinate vector length {} does not match the sum of subset sizes {}",
                coordinates.len(),
                expected_len
            )));
        }
        Ok(Self {
            instant,
            frame,
            subsets,
            coordinates,
        })
    }

    pub fn instant(&self) -> Epoch {
        self.instant
    }

    pub fn frame(&self) -> &dyn Frame {
        self.frame.as_ref()
    }

    /// A clone of the owning `Arc<dyn Frame>`, needed by callers (e.g. `Segment`) that must
    /// hand a frame handle on to something living past this `State`'s borrow.
    pub fn frame_arc(&self) -> Arc<dyn Frame> {
        self.frame.clone()
    }

    pub fn subsets(&self) -> &[CoordinateSubset] {
        &self.subsets
    }

    pub fn coordinates(&self) -> &DVector<f64> {
        &self.coordinates
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// The half-open `[start, start+size)` range for a named subset, if present in the broker.
    fn offset_of(&self, name: &str) -> Option<(usize, usize)> {
        let mut offset = 0;
        for subset in &self.subsets {
            if subset.name() == name {
                return Some((offset, subset.size()));
            }
            offset += subset.size();
        }
        None
    }

    /// Extracts the slice backing a named subset. Used by a dynamics' read step to project its
    /// `read_subsets` out of the broker's flat coordinate vector.
    pub fn subset_slice(&self, name: &str) -> NyxResult<DVector<f64>> {
        let (offset, size) = self
            .offset_of(name)
            .ok_or_else(|| NyxError::Undefined(format!("coordinate subset {name}")))?;
        Ok(DVector::from_column_slice(
            &self.coordinates.as_slice()[offset..offset + size],
        ))
    }

    pub fn with_coordinates(&self, instant: Epoch, coordinates: DVector<f64>) -> NyxResult<Self> {
        Self::new(instant, self.frame.clone(), self.subsets.clone(), coordinates)
    }

    /// Scatters `contribution` into `derivative` at the offsets of `write_subset_name`,
    /// accumulating (two dynamics writing the same subset add), per §4.3.
    pub fn scatter_add(
        &self,
        derivative: &mut DVector<f64>,
        write_subset_name: &str,
        contribution: &DVector<f64>,
    ) -> NyxResult<()> {
        let (offset, size) = self
            .offset_of(write_subset_name)
            .ok_or_else(|| NyxError::Undefined(format!("coordinate subset {write_subset_name}")))?;
        if contribution.len() != size {
            return Err(NyxError::WrongInput(format!(
                "contribution to {write_subset_name} has length {} but the subset has size {}",
                contribution.len(),
                size
            )));
        }
        for i in 0..size {
            derivative[offset + i] += contribution[i];
        }
        Ok(())
    }
}
