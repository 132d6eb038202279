//! Error variant diagnostics, configuration defaults and validation, and serde round trips
//! for the tunable config structs.

use hifitime::Epoch;
use rstest::rstest;

use nyx_guidance_core::errors::NyxError;
use nyx_guidance_core::guidance::qlaw::{ElementWeights, QLawParameters};
use nyx_guidance_core::propagators::{PropagatorConfig, StepperKind};
use nyx_guidance_core::segment::ManeuverConstraints;

#[rstest]
#[case(NyxError::Undefined("gravitational parameter".to_string()), "gravitational parameter")]
#[case(NyxError::WrongInput("max_duration_s must be positive".to_string()), "max_duration_s must be positive")]
#[case(NyxError::ConicSingular { reason: "parabolic orbit".to_string() }, "parabolic orbit")]
#[case(NyxError::NaNEncountered { context: "thrust direction".to_string() }, "thrust direction")]
#[case(NyxError::DidNotConverge { iterations: 50, tolerance: 1e-8 }, "50")]
#[case(NyxError::MaxDurationViolated { duration_s: 500.0, limit_s: 300.0 }, "500")]
#[case(NyxError::FrameNotQuasiInertial { frame: "ITRF".to_string() }, "ITRF")]
fn error_display_mentions_the_offending_value(#[case] error: NyxError, #[case] needle: &str) {
    let message = error.to_string();
    assert!(
        message.contains(needle),
        "expected {message:?} to contain {needle:?}"
    );
}

#[test]
fn below_surface_error_mentions_epoch_and_radius() {
    let epoch = Epoch::from_gregorian_utc_at_midnight(2023, 1, 1);
    let error = NyxError::BelowSurface {
        epoch,
        radius_m: 6_300_000.0,
    };
    let message = error.to_string();
    assert!(message.contains("6300000"));
}

#[test]
fn propagator_config_defaults_match_the_documented_gmat_style_values() {
    let config = PropagatorConfig::default();
    assert_eq!(config.stepper, StepperKind::RungeKuttaFehlberg78);
    assert_eq!(config.init_step_s, 60.0);
    assert_eq!(config.min_step_s, 1e-3);
    assert_eq!(config.max_step_s, 2700.0);
    assert_eq!(config.tolerance, 1e-12);
    assert_eq!(config.max_attempts, 50);
}

#[test]
fn maneuver_constraints_default_has_no_constraints_and_validates() {
    let constraints = ManeuverConstraints::default();
    assert!(constraints.min_duration_s.is_none());
    assert!(constraints.max_duration_s.is_none());
    assert!(constraints.min_separation_s.is_none());
    assert!(constraints.validated().is_ok());
}

#[rstest]
#[case(ManeuverConstraints::builder().min_duration_s(-1.0).build())]
#[case(ManeuverConstraints::builder().min_separation_s(0.0).build())]
#[case(ManeuverConstraints::builder().max_duration_s(100.0).build())]
#[case(ManeuverConstraints::builder().max_duration_s(50.0).min_duration_s(100.0).min_separation_s(10.0).build())]
fn maneuver_constraints_rejects_inconsistent_configurations(#[case] constraints: ManeuverConstraints) {
    let error = constraints.validated().unwrap_err();
    assert!(matches!(error, NyxError::WrongInput(_)));
}

#[test]
fn qlaw_parameters_round_trip_through_json() {
    let weights = ElementWeights {
        sma: Some(1.0),
        ecc: Some(2.0),
        inc: None,
        raan: Some(0.5),
        aop: None,
    };
    let parameters = QLawParameters::builder()
        .weights(weights)
        .m(3.5)
        .n(4.5)
        .r(1.5)
        .k(150.0)
        .w_p(2.0)
        .r_p_min_m(6_500_000.0)
        .eta_absolute_threshold(Some(0.3))
        .effectivity_grid_size(20)
        .build();

    let json = serde_json::to_string(&parameters).unwrap();
    let round_tripped: QLawParameters = serde_json::from_str(&json).unwrap();

    assert_eq!(round_tripped, parameters);
}

#[test]
fn element_weights_round_trip_through_json_preserving_none_fields() {
    let weights = ElementWeights {
        sma: Some(10.0),
        ecc: None,
        inc: None,
        raan: None,
        aop: None,
    };
    let json = serde_json::to_string(&weights).unwrap();
    let round_tripped: ElementWeights = serde_json::from_str(&json).unwrap();
    assert_eq!(round_tripped, weights);
}
