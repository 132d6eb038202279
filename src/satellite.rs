use typed_builder::TypedBuilder;

/// An optional on-board propulsion system: constant thrust magnitude and specific impulse.
#[derive(Clone, Copy, Debug, PartialEq, TypedBuilder)]
pub struct PropulsionSystem {
    pub thrust_n: f64,
    pub specific_impulse_s: f64,
}

impl PropulsionSystem {
    /// Standard gravity used to convert specific impulse into an exhaust velocity, matching
    /// the convention used throughout the rest of the propagation stack.
    pub const STANDARD_GRAVITY_M_S2: f64 = 9.80665;

    /// Mass flow rate (kg/s, negative) for this system running at full thrust.
    pub fn mass_flow_rate_kg_s(&self) -> f64 {
        -self.thrust_n / (self.specific_impulse_s * Self::STANDARD_GRAVITY_M_S2)
    }
}

/// A spacecraft's mass, geometry, and propulsion properties, shared by reference across the
/// dynamics objects that need them (drag, thruster).
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct SatelliteSystem {
    pub dry_mass_kg: f64,
    #[builder(default)]
    pub inertia_kg_m2: [f64; 3],
    #[builder(default = 0.0)]
    pub drag_area_m2: f64,
    #[builder(default = 2.2)]
    pub drag_coefficient: f64,
    #[builder(default)]
    pub propulsion: Option<PropulsionSystem>,
}

impl SatelliteSystem {
    pub fn ballistic_coefficient(&self, mass_kg: f64) -> f64 {
        self.drag_coefficient * self.drag_area_m2 / mass_kg
    }
}
