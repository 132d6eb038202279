//! Event conditions (§3.1, §4.4): predicates over two adjacent propagator states used to
//! terminate `calculate_state_to_condition` and, inside `Segment`, to toggle between coast and
//! maneuver sub-phases.

use crate::state::State;

/// How a [`RealCondition`] turns a scalar evaluator into a pass/fail predicate over a
/// `(previous, current)` pair of samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Criterion {
    StrictlyPositive,
    StrictlyNegative,
    AnyCrossing,
    PositiveCrossing,
    NegativeCrossing,
}

impl Criterion {
    fn fires(&self, previous: f64, current: f64) -> bool {
        match self {
            Criterion::StrictlyPositive => current > 0.0,
            Criterion::StrictlyNegative => current < 0.0,
            Criterion::AnyCrossing => previous.signum() != current.signum(),
            Criterion::PositiveCrossing => previous <= 0.0 && current > 0.0,
            Criterion::NegativeCrossing => previous >= 0.0 && current < 0.0,
        }
    }
}

/// A named scalar function of a state, shared by reference so event conditions can be cloned
/// cheaply and composed into `LogicalCondition` trees.
pub type Evaluator = std::sync::Arc<dyn Fn(&State) -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct RealCondition {
    pub name: String,
    pub evaluator: Evaluator,
    pub criterion: Criterion,
}

impl std::fmt::Debug for RealCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealCondition")
            .field("name", &self.name)
            .field("criterion", &self.criterion)
            .finish()
    }
}

impl RealCondition {
    pub fn new(name: impl Into<String>, criterion: Criterion, evaluator: Evaluator) -> Self {
        Self {
            name: name.into(),
            evaluator,
            criterion,
        }
    }

    /// Evaluates this condition's scalar at a single state; exposed so the maneuver-solving loop
    /// can build the 0.5-threshold bimodal thrust-on/off conditions directly.
    pub fn value_at(&self, state: &State) -> f64 {
        (self.evaluator)(state)
    }

    fn fires(&self, previous: &State, current: &State) -> bool {
        self.criterion.fires(self.value_at(previous), self.value_at(current))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalKind {
    And,
    Or,
}

#[derive(Clone, Debug)]
pub enum EventCondition {
    Real(RealCondition),
    Logical {
        kind: LogicalKind,
        children: Vec<EventCondition>,
    },
}

impl EventCondition {
    pub fn or(self, other: EventCondition) -> EventCondition {
        EventCondition::Logical {
            kind: LogicalKind::Or,
            children: vec![self, other],
        }
    }

    pub fn and(self, other: EventCondition) -> EventCondition {
        EventCondition::Logical {
            kind: LogicalKind::And,
            children: vec![self, other],
        }
    }

    pub fn fires(&self, previous: &State, current: &State) -> bool {
        match self {
            EventCondition::Real(condition) => condition.fires(previous, current),
            EventCondition::Logical { kind, children } => match kind {
                LogicalKind::And => children.iter().all(|child| child.fires(previous, current)),
                LogicalKind::Or => children.iter().any(|child| child.fires(previous, current)),
            },
        }
    }
}

impl From<RealCondition> for EventCondition {
    fn from(condition: RealCondition) -> Self {
        EventCondition::Real(condition)
    }
}

/// Builds the thrust-on/thrust-off pair of auxiliary conditions for a thruster's guidance law,
/// per §4.5.2: the guidance's unit-thrust acceleration norm crossing the 0.5 bimodal threshold.
pub fn thrust_toggle_conditions(
    guidance: std::sync::Arc<dyn crate::guidance::GuidanceLaw>,
    frame: std::sync::Arc<dyn crate::frames::Frame>,
) -> (EventCondition, EventCondition) {
    let norm_at = move |state: &State| -> f64 {
        let position = nalgebra::Vector3::new(
            state.coordinates()[0],
            state.coordinates()[1],
            state.coordinates()[2],
        );
        let velocity = nalgebra::Vector3::new(
            state.coordinates()[3],
            state.coordinates()[4],
            state.coordinates()[5],
        );
        guidance
            .thrust_direction_at(state.instant(), &position, &velocity, 1.0, frame.as_ref())
            .map(|direction| direction.norm())
            .unwrap_or(0.0)
    };

    let norm_on = norm_at.clone();
    let on = RealCondition::new(
        "thrust-on",
        Criterion::PositiveCrossing,
        std::sync::Arc::new(move |state| norm_on(state) - 0.5),
    );
    let off = RealCondition::new(
        "thrust-off",
        Criterion::NegativeCrossing,
        std::sync::Arc::new(move |state| norm_at(state) - 0.5),
    );

    (EventCondition::Real(on), EventCondition::Real(off))
}
