//! Segment-based maneuver planning (§3.2, §4.5).
//!
//! A `Segment` couples an event condition (when to stop) with either plain free dynamics
//! (`Coast`) or a thruster plus maneuver constraints (`Maneuver`). `solve` runs the coast
//! straight through the numerical propagator; the maneuver loop is translated directly from
//! the reference implementation's `Segment::solve` (thrust-on/off toggling via a 0.5-threshold
//! bimodal condition, short-maneuver skipping, min/max duration constraint handling, and
//! constant-LOF compliance rebuilding).

use std::sync::Arc;

use hifitime::{Epoch, TimeUnits};
use log::debug;
use nalgebra::{Matrix3, Vector3};
use typed_builder::TypedBuilder;

use crate::dynamics::Dynamics;
use crate::errors::{NyxError, NyxResult};
use crate::events::{thrust_toggle_conditions, EventCondition};
use crate::frames::{Frame, LocalOrbitalFrame};
use crate::guidance::{CompositeGuidance, ConstantThrust, GuidanceLaw};
use crate::propagators::{Propagator, PropagatorConfig};
use crate::satellite::SatelliteSystem;
use crate::state::State;
use crate::time::Interval;

/// Whether a segment coasts on free dynamics or burns a thruster subject to maneuver
/// constraints, per invariant 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Coast,
    Maneuver,
}

/// How a candidate maneuver interval longer than `max_duration_s` is handled, per §4.5.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxDurationStrategy {
    /// Reject the whole segment solve with `NyxError::MaxDurationViolated`.
    Fail,
    /// Discard the candidate entirely and coast past it under free dynamics.
    Skip,
    /// Burn only `[start, start + max_duration]`; if that does not satisfy the mission event,
    /// coast the remainder of the original interval under free dynamics.
    TruncateEnd,
    /// Burn only `[end - max_duration, end]`.
    TruncateStart,
    /// Burn the `max_duration`-wide window centered on the candidate; coast the remainder under
    /// free dynamics if the mission event still hasn't fired.
    Center,
    /// Burn `[start, start + max_duration]` and let the next loop cycle pick up where it left
    /// off (no fallback coast — the remainder is simply re-solved as a fresh candidate).
    Chunk,
}

/// Duration and spacing rules a maneuver segment's candidate intervals must satisfy, per
/// invariant 6.
#[derive(Clone, Copy, Debug, PartialEq, TypedBuilder)]
pub struct ManeuverConstraints {
    #[builder(default, setter(strip_option))]
    pub min_duration_s: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub max_duration_s: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub min_separation_s: Option<f64>,
    #[builder(default = MaxDurationStrategy::Fail)]
    pub max_duration_strategy: MaxDurationStrategy,
}

impl Default for ManeuverConstraints {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ManeuverConstraints {
    /// Checks invariant 6: durations are positive, and a maximum duration requires a positive
    /// minimum separation (so `Segment` always has somewhere to coast a truncated leftover to).
    pub fn validated(self) -> NyxResult<Self> {
        if matches!(self.min_duration_s, Some(min) if min <= 0.0) {
            return Err(NyxError::WrongInput(
                "minimum maneuver duration must be positive".to_string(),
            ));
        }
        if matches!(self.min_separation_s, Some(sep) if sep <= 0.0) {
            return Err(NyxError::WrongInput(
                "minimum maneuver separation must be positive".to_string(),
            ));
        }
        if let Some(max) = self.max_duration_s {
            if max <= 0.0 {
                return Err(NyxError::WrongInput(
                    "maximum maneuver duration must be positive".to_string(),
                ));
            }
            if !matches!(self.min_separation_s, Some(sep) if sep > 0.0) {
                return Err(NyxError::WrongInput(
                    "a maximum maneuver duration requires a positive minimum separation".to_string(),
                ));
            }
            if matches!(self.min_duration_s, Some(min) if max < min) {
                return Err(NyxError::WrongInput(
                    "maximum maneuver duration must be >= minimum maneuver duration".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

/// The outcome of solving a segment: the effective dynamics actually flown (for a maneuver, the
/// free dynamics plus a `Thruster` wrapping a `CompositeGuidance` of whatever guidance law
/// produced each accepted interval), every sub-step state, and whether the segment's event
/// condition is what ended it.
#[derive(Clone, Debug)]
pub struct Solution {
    pub name: String,
    pub dynamics: Vec<Dynamics>,
    pub states: Vec<State>,
    pub condition_satisfied: bool,
    pub kind: SegmentKind,
    pub maneuver_intervals: Vec<Interval>,
}

#[derive(Clone)]
pub struct Segment {
    name: String,
    kind: SegmentKind,
    event_condition: EventCondition,
    free_dynamics: Vec<Dynamics>,
    thruster: Option<Dynamics>,
    solver_config: PropagatorConfig,
    maneuver_constraints: ManeuverConstraints,
    constant_lof: Option<(LocalOrbitalFrame, f64)>,
}

impl Segment {
    pub fn coast(
        name: impl Into<String>,
        event_condition: EventCondition,
        free_dynamics: Vec<Dynamics>,
        solver_config: PropagatorConfig,
    ) -> NyxResult<Self> {
        if free_dynamics.iter().any(Dynamics::is_thruster) {
            return Err(NyxError::WrongInput(
                "a coast segment's free dynamics must not include a thruster".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            kind: SegmentKind::Coast,
            event_condition,
            free_dynamics,
            thruster: None,
            solver_config,
            maneuver_constraints: ManeuverConstraints::default(),
            constant_lof: None,
        })
    }

    pub fn maneuver(
        name: impl Into<String>,
        event_condition: EventCondition,
        thruster: Dynamics,
        free_dynamics: Vec<Dynamics>,
        solver_config: PropagatorConfig,
        maneuver_constraints: ManeuverConstraints,
    ) -> NyxResult<Self> {
        if !thruster.is_thruster() {
            return Err(NyxError::WrongInput(
                "a maneuver segment's thruster dynamics must be a Dynamics::Thruster".to_string(),
            ));
        }
        if free_dynamics.iter().any(Dynamics::is_thruster) {
            return Err(NyxError::WrongInput(
                "a maneuver segment's free dynamics must not include a thruster".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            kind: SegmentKind::Maneuver,
            event_condition,
            free_dynamics,
            thruster: Some(thruster),
            solver_config,
            maneuver_constraints: maneuver_constraints.validated()?,
            constant_lof: None,
        })
    }

    /// Enables constant-LOF compliance (§4.5.2): once a candidate interval is accepted, its
    /// state-dependent guidance is replaced by a `ConstantThrust` in `frame`, pointed along the
    /// average of the original guidance's thrust direction over the interval (expressed in
    /// `frame` at the interval midpoint). `max_angular_offset_rad` is recorded for callers that
    /// want to audit compliance but is not itself enforced — this crate always accepts the
    /// rebuilt constant-direction maneuver rather than rejecting an excursion.
    pub fn with_constant_lof_compliance(mut self, frame: LocalOrbitalFrame, max_angular_offset_rad: f64) -> Self {
        self.constant_lof = Some((frame, max_angular_offset_rad));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Runs this segment forward from `initial_state` for at most `max_duration_s`, stopping
    /// early if the segment's event condition fires. `previous_maneuver_interval` carries the
    /// last accepted maneuver window from whatever segment ran before this one, so a minimum
    /// separation constraint can be honored across segment boundaries.
    pub fn solve(
        &self,
        initial_state: &State,
        max_duration_s: f64,
        previous_maneuver_interval: Option<Interval>,
    ) -> NyxResult<Solution> {
        if max_duration_s <= 0.0 {
            return Err(NyxError::WrongInput("max_duration_s must be positive".to_string()));
        }
        match self.kind {
            SegmentKind::Coast => self.solve_coast(initial_state, max_duration_s),
            SegmentKind::Maneuver => self.solve_maneuver(initial_state, max_duration_s, previous_maneuver_interval),
        }
    }

    fn solve_coast(&self, initial_state: &State, max_duration_s: f64) -> NyxResult<Solution> {
        let upper = initial_state.instant() + max_duration_s.seconds();
        let (states, condition_satisfied) =
            self.propagate_to_condition(initial_state, upper, &self.event_condition, &self.free_dynamics)?;
        Ok(Solution {
            name: self.name.clone(),
            dynamics: self.free_dynamics.clone(),
            states,
            condition_satisfied,
            kind: SegmentKind::Coast,
            maneuver_intervals: Vec::new(),
        })
    }

    fn solve_maneuver(
        &self,
        initial_state: &State,
        max_duration_s: f64,
        mut previous_maneuver_interval: Option<Interval>,
    ) -> NyxResult<Solution> {
        let thruster = self
            .thruster
            .clone()
            .expect("validated at construction: maneuver segment always carries a thruster");
        let (satellite, original_guidance) = match &thruster {
            Dynamics::Thruster { satellite, guidance } => (satellite.clone(), guidance.clone()),
            _ => unreachable!("validated at construction: thruster field is always a Thruster variant"),
        };

        let frame_arc = initial_state.frame_arc();
        let frame = frame_arc.as_ref();
        let (thrust_on, thrust_off) = thrust_toggle_conditions(original_guidance.clone(), frame_arc.clone());

        let maximum_instant = initial_state.instant() + max_duration_s.seconds();

        let mut segment_states = vec![initial_state.clone()];
        let mut accepted_intervals: Vec<Interval> = Vec::new();
        let mut composite = CompositeGuidance::new();
        let mut condition_satisfied = self.event_condition.fires(initial_state, initial_state);

        const SHORT_MANEUVER_THRESHOLD_S: f64 = 5.0;
        let mut skip_multiplier: u32 = 1;

        while segment_states.last().expect("never empty").instant() < maximum_instant && !condition_satisfied {
            // 1. Honor the minimum separation from the previous accepted maneuver, if any.
            if let (Some(previous_interval), Some(min_separation_s)) =
                (previous_maneuver_interval, self.maneuver_constraints.min_separation_s)
            {
                let separation_target = previous_interval.end() + min_separation_s.seconds();
                if segment_states.last().expect("never empty").instant() < separation_target {
                    let combined = self.event_condition.clone().or(thrust_on.clone());
                    let (states, _) = self.propagate_to_condition(
                        segment_states.last().expect("never empty"),
                        min_epoch(separation_target, maximum_instant),
                        &combined,
                        &self.free_dynamics,
                    )?;
                    condition_satisfied = reevaluate(&self.event_condition, &states);
                    append_tail(&mut segment_states, &states);
                    if condition_satisfied {
                        break;
                    }
                }
            }

            // 2. Coast under free dynamics until the mission event fires or thrust should start.
            let combined_on = self.event_condition.clone().or(thrust_on.clone());
            let (coast_states, _) = self.propagate_to_condition(
                segment_states.last().expect("never empty"),
                maximum_instant,
                &combined_on,
                &self.free_dynamics,
            )?;
            condition_satisfied = reevaluate(&self.event_condition, &coast_states);
            append_tail(&mut segment_states, &coast_states);
            if condition_satisfied {
                break;
            }

            // 3. Burn under free dynamics plus the thruster until the mission event fires or
            // thrust should stop (capped early for the Chunk max-duration strategy).
            let mut maneuver_upper = maximum_instant;
            if let (Some(max_duration_s), MaxDurationStrategy::Chunk) =
                (self.maneuver_constraints.max_duration_s, self.maneuver_constraints.max_duration_strategy)
            {
                let capped = segment_states.last().expect("never empty").instant() + max_duration_s.seconds();
                maneuver_upper = min_epoch(capped, maneuver_upper);
            }
            let combined_off = self.event_condition.clone().or(thrust_off.clone());
            let maneuver_dynamics = dynamics_with(&self.free_dynamics, thruster.clone());
            let (maneuver_states, _) = self.propagate_to_condition(
                segment_states.last().expect("never empty"),
                maneuver_upper,
                &combined_off,
                &maneuver_dynamics,
            )?;

            if maneuver_states.len() <= 1 {
                condition_satisfied = reevaluate(&self.event_condition, &maneuver_states);
                append_tail(&mut segment_states, &maneuver_states);
                continue;
            }

            let candidate_interval = match extract_maneuver_interval(&maneuver_states, &original_guidance, frame)? {
                Some(interval) => interval,
                None => {
                    condition_satisfied = reevaluate(&self.event_condition, &maneuver_states);
                    append_tail(&mut segment_states, &maneuver_states);
                    continue;
                }
            };

            // 4. Skip maneuvers too short to be worth flying, growing the skip window each time
            // one is rejected so a persistently chattering thruster doesn't stall the loop.
            if candidate_interval.duration().to_seconds() < SHORT_MANEUVER_THRESHOLD_S {
                debug!(
                    "skipping {}-second candidate maneuver shorter than the {}-second threshold",
                    candidate_interval.duration().to_seconds(),
                    SHORT_MANEUVER_THRESHOLD_S
                );
                let coast_to = candidate_interval.end() + (SHORT_MANEUVER_THRESHOLD_S * f64::from(skip_multiplier)).seconds();
                let (states, satisfied) = self.propagate_to_condition(
                    segment_states.last().expect("never empty"),
                    min_epoch(coast_to, maximum_instant),
                    &self.event_condition,
                    &self.free_dynamics,
                )?;
                condition_satisfied = satisfied;
                append_tail(&mut segment_states, &states);
                skip_multiplier += 1;
                continue;
            }

            // 5. Apply the minimum and maximum duration constraints, if configured.
            if let Some(min_duration_s) = self.maneuver_constraints.min_duration_s {
                if candidate_interval.duration().to_seconds() < min_duration_s {
                    let mut coast_to = candidate_interval.end();
                    if candidate_interval.duration().to_seconds() == 0.0 {
                        coast_to = coast_to + 1.0_f64.seconds();
                    }
                    let (states, satisfied) = self.propagate_to_condition(
                        segment_states.last().expect("never empty"),
                        min_epoch(coast_to, maximum_instant),
                        &self.event_condition,
                        &self.free_dynamics,
                    )?;
                    condition_satisfied = satisfied;
                    append_tail(&mut segment_states, &states);
                    skip_multiplier = 1;
                    continue;
                }
            }

            if let Some(max_duration_s) = self.maneuver_constraints.max_duration_s {
                if candidate_interval.duration().to_seconds() > max_duration_s {
                    debug!(
                        "candidate maneuver of {} seconds exceeds the {}-second maximum, applying {:?}",
                        candidate_interval.duration().to_seconds(),
                        max_duration_s,
                        self.maneuver_constraints.max_duration_strategy
                    );
                    condition_satisfied = self.handle_max_duration_violation(
                        &candidate_interval,
                        max_duration_s,
                        maximum_instant,
                        &satellite,
                        &original_guidance,
                        frame,
                        &mut segment_states,
                        &mut accepted_intervals,
                        &mut composite,
                        &mut previous_maneuver_interval,
                    )?;
                    skip_multiplier = 1;
                    continue;
                }
            }

            // The candidate passed every constraint: accept it.
            condition_satisfied = self.accept_interval(
                candidate_interval,
                original_guidance.clone(),
                &satellite,
                &mut segment_states,
                &mut accepted_intervals,
                &mut composite,
                &mut previous_maneuver_interval,
                frame,
            )?;
            skip_multiplier = 1;
        }

        let mut effective_dynamics = self.free_dynamics.clone();
        effective_dynamics.push(Dynamics::Thruster {
            satellite,
            guidance: Arc::new(composite),
        });

        Ok(Solution {
            name: self.name.clone(),
            dynamics: effective_dynamics,
            states: segment_states,
            condition_satisfied,
            kind: SegmentKind::Maneuver,
            maneuver_intervals: accepted_intervals,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_max_duration_violation(
        &self,
        candidate: &Interval,
        max_duration_s: f64,
        maximum_instant: Epoch,
        satellite: &SatelliteSystem,
        original_guidance: &Arc<dyn GuidanceLaw>,
        frame: &dyn Frame,
        segment_states: &mut Vec<State>,
        accepted_intervals: &mut Vec<Interval>,
        composite: &mut CompositeGuidance,
        previous_maneuver_interval: &mut Option<Interval>,
    ) -> NyxResult<bool> {
        match self.maneuver_constraints.max_duration_strategy {
            MaxDurationStrategy::Fail => Err(NyxError::MaxDurationViolated {
                duration_s: candidate.duration().to_seconds(),
                limit_s: max_duration_s,
            }),
            MaxDurationStrategy::Skip => {
                let (states, satisfied) = self.propagate_to_condition(
                    segment_states.last().expect("never empty"),
                    min_epoch(candidate.end(), maximum_instant),
                    &self.event_condition,
                    &self.free_dynamics,
                )?;
                append_tail(segment_states, &states);
                Ok(satisfied)
            }
            MaxDurationStrategy::TruncateEnd => {
                let valid = candidate.truncated_to(max_duration_s.seconds());
                let satisfied = self.accept_interval(
                    valid,
                    original_guidance.clone(),
                    satellite,
                    segment_states,
                    accepted_intervals,
                    composite,
                    previous_maneuver_interval,
                    frame,
                )?;
                if satisfied {
                    return Ok(true);
                }
                let (states, satisfied) = self.propagate_to_condition(
                    segment_states.last().expect("never empty"),
                    min_epoch(candidate.end(), maximum_instant),
                    &self.event_condition,
                    &self.free_dynamics,
                )?;
                append_tail(segment_states, &states);
                Ok(satisfied)
            }
            MaxDurationStrategy::TruncateStart => {
                let valid = candidate.truncated_from_end(max_duration_s.seconds());
                self.accept_interval(
                    valid,
                    original_guidance.clone(),
                    satellite,
                    segment_states,
                    accepted_intervals,
                    composite,
                    previous_maneuver_interval,
                    frame,
                )
            }
            MaxDurationStrategy::Center => {
                let valid = candidate.centered(max_duration_s.seconds());
                let satisfied = self.accept_interval(
                    valid,
                    original_guidance.clone(),
                    satellite,
                    segment_states,
                    accepted_intervals,
                    composite,
                    previous_maneuver_interval,
                    frame,
                )?;
                if satisfied {
                    return Ok(true);
                }
                let (states, satisfied) = self.propagate_to_condition(
                    segment_states.last().expect("never empty"),
                    min_epoch(candidate.end(), maximum_instant),
                    &self.event_condition,
                    &self.free_dynamics,
                )?;
                append_tail(segment_states, &states);
                Ok(satisfied)
            }
            MaxDurationStrategy::Chunk => {
                let valid = candidate.truncated_to(max_duration_s.seconds());
                self.accept_interval(
                    valid,
                    original_guidance.clone(),
                    satellite,
                    segment_states,
                    accepted_intervals,
                    composite,
                    previous_maneuver_interval,
                    frame,
                )
            }
        }
    }

    /// Re-solves `interval` under `guidance` from the state preceding it (coasting to
    /// `interval.start()` under free dynamics first), rebuilds it under a constant-LOF thrust
    /// direction if compliance is enabled, and appends the result to the segment's running
    /// state, interval, and composite-guidance accumulators.
    #[allow(clippy::too_many_arguments)]
    fn accept_interval(
        &self,
        interval: Interval,
        guidance_for_window: Arc<dyn GuidanceLaw>,
        satellite: &SatelliteSystem,
        segment_states: &mut Vec<State>,
        accepted_intervals: &mut Vec<Interval>,
        composite: &mut CompositeGuidance,
        previous_maneuver_interval: &mut Option<Interval>,
        frame: &dyn Frame,
    ) -> NyxResult<bool> {
        let anchor = segment_states.last().expect("never empty").clone();
        let mut local_states = self.solve_interval_with_guidance(&anchor, guidance_for_window.clone(), satellite, interval)?;
        let mut final_guidance = guidance_for_window;

        if let Some((lof, _max_angular_offset_rad)) = self.constant_lof {
            let average = self.average_thrust_direction_in_lof(&local_states, interval, &final_guidance, lof, frame)?;
            let constant = Arc::new(ConstantThrust::new(lof, average)) as Arc<dyn GuidanceLaw>;
            local_states = self.solve_interval_with_guidance(&anchor, constant.clone(), satellite, interval)?;
            final_guidance = constant;
        }

        let satisfied = reevaluate(&self.event_condition, &local_states);
        append_tail(segment_states, &local_states);
        accepted_intervals.push(interval);
        composite.push(interval, final_guidance);
        *previous_maneuver_interval = Some(interval);
        Ok(satisfied)
    }

    fn solve_interval_with_guidance(
        &self,
        anchor: &State,
        guidance: Arc<dyn GuidanceLaw>,
        satellite: &SatelliteSystem,
        interval: Interval,
    ) -> NyxResult<Vec<State>> {
        let coast_states = self.propagate_to_instant(anchor, interval.start(), &self.free_dynamics)?;
        let maneuver_anchor = coast_states.last().cloned().unwrap_or_else(|| anchor.clone());
        let maneuver_dynamics = dynamics_with(
            &self.free_dynamics,
            Dynamics::Thruster {
                satellite: satellite.clone(),
                guidance,
            },
        );
        let maneuver_states = self.propagate_to_instant(&maneuver_anchor, interval.end(), &maneuver_dynamics)?;

        let mut states = coast_states;
        append_tail(&mut states, &maneuver_states);
        Ok(states)
    }

    /// Averages `guidance`'s inertial thrust direction over the samples falling inside
    /// `interval`, then projects that single average vector into `lof` using only the rotation
    /// at the sample nearest the interval's midpoint.
    fn average_thrust_direction_in_lof(
        &self,
        states: &[State],
        interval: Interval,
        guidance: &Arc<dyn GuidanceLaw>,
        lof: LocalOrbitalFrame,
        frame: &dyn Frame,
    ) -> NyxResult<Vector3<f64>> {
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        let mut midpoint_rotation: Option<Matrix3<f64>> = None;
        let mut best_dt_s = f64::INFINITY;

        for state in states {
            if !interval.contains(state.instant()) {
                continue;
            }
            let coordinates = state.coordinates();
            let position = Vector3::new(coordinates[0], coordinates[1], coordinates[2]);
            let velocity = Vector3::new(coordinates[3], coordinates[4], coordinates[5]);
            let direction = guidance.thrust_direction_at(state.instant(), &position, &velocity, 1.0, frame)?;
            if direction.norm() > 0.0 {
                sum += direction;
                count += 1;
            }

            let dt_s = (state.instant() - interval.center()).to_seconds().abs();
            if dt_s < best_dt_s {
                best_dt_s = dt_s;
                midpoint_rotation = Some(lof.rotation_to_inertial(&position, &velocity));
            }
        }

        let average_inertial = if count > 0 {
            (sum / count as f64).normalize()
        } else {
            Vector3::new(1.0, 0.0, 0.0)
        };
        let rotation = midpoint_rotation.unwrap_or_else(Matrix3::identity);
        Ok(rotation.transpose() * average_inertial)
    }

    fn propagate_to_condition(
        &self,
        from: &State,
        upper: Epoch,
        condition: &EventCondition,
        dynamics: &[Dynamics],
    ) -> NyxResult<(Vec<State>, bool)> {
        let mut propagator = Propagator::new(self.solver_config, dynamics.to_vec());
        let (_, satisfied) = propagator.calculate_state_to_condition(from, upper, condition)?;
        Ok((propagator.observed_states().to_vec(), satisfied))
    }

    fn propagate_to_instant(&self, from: &State, to: Epoch, dynamics: &[Dynamics]) -> NyxResult<Vec<State>> {
        if from.instant() >= to {
            return Ok(vec![from.clone()]);
        }
        let mut propagator = Propagator::new(self.solver_config, dynamics.to_vec());
        propagator.calculate_state_at(from, to)?;
        Ok(propagator.observed_states().to_vec())
    }
}

/// Appends every state after the first in `new_states` to `accumulated`, since `new_states[0]`
/// always duplicates `accumulated`'s current last entry.
fn append_tail(accumulated: &mut Vec<State>, new_states: &[State]) {
    if new_states.len() > 1 {
        accumulated.extend_from_slice(&new_states[1..]);
    }
}

/// Re-checks the segment's own mission event against the last two states of a *local*
/// sub-integration (whose first state is always the call's own starting point), independent of
/// whatever combined condition actually terminated that sub-integration.
fn reevaluate(condition: &EventCondition, local_states: &[State]) -> bool {
    match local_states.len() {
        0 => false,
        1 => condition.fires(&local_states[0], &local_states[0]),
        n => condition.fires(&local_states[n - 2], &local_states[n - 1]),
    }
}

fn dynamics_with(free: &[Dynamics], extra: Dynamics) -> Vec<Dynamics> {
    let mut all = free.to_vec();
    all.push(extra);
    all
}

fn min_epoch(a: Epoch, b: Epoch) -> Epoch {
    if a < b {
        a
    } else {
        b
    }
}

/// Scans a maneuver sub-integration's states for the span during which `guidance` commands
/// thrust (unit-direction norm above the 0.5 bimodal threshold), returning the first and last
/// such instants as a candidate interval.
fn extract_maneuver_interval(
    states: &[State],
    guidance: &Arc<dyn GuidanceLaw>,
    frame: &dyn Frame,
) -> NyxResult<Option<Interval>> {
    let mut first_on = None;
    let mut last_on = None;

    for state in states {
        let coordinates = state.coordinates();
        let position = Vector3::new(coordinates[0], coordinates[1], coordinates[2]);
        let velocity = Vector3::new(coordinates[3], coordinates[4], coordinates[5]);
        let norm = guidance.thrust_direction_at(state.instant(), &position, &velocity, 1.0, frame)?.norm();
        if norm > 0.5 {
            if first_on.is_none() {
                first_on = Some(state.instant());
            }
            last_on = Some(state.instant());
        }
    }

    Ok(match (first_on, last_on) {
        (Some(start), Some(end)) => Some(Interval::new(start, end)),
        _ => None,
    })
}
