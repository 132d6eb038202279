//! Properties that must hold across a spread of inputs rather than at one fixed reference
//! case — parametrized with `rstest` since a handful of concrete cases stand in for a
//! broader law.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use rstest::rstest;

use nyx_guidance_core::coe::{eccentric_from_mean, true_from_mean, COE};
use nyx_guidance_core::frames::FrameId;
use nyx_guidance_core::kepler::PerturbationType;

const EARTH_MU_M3_S2: f64 = 3.986_004_418e14;

/// `to_cartesian` followed by `from_cartesian` reproduces the input elements.
#[rstest]
#[case(7_000_000.0, 0.01, 5.0_f64.to_radians(), 0.0, 0.0, 0.0)]
#[case(8_000_000.0, 0.2, 45.0_f64.to_radians(), 30.0_f64.to_radians(), 60.0_f64.to_radians(), 90.0_f64.to_radians())]
#[case(42_164_000.0, 0.7, 100.0_f64.to_radians(), 200.0_f64.to_radians(), 10.0_f64.to_radians(), 300.0_f64.to_radians())]
#[case(9_000_000.0, 0.5, 178.0_f64.to_radians(), 350.0_f64.to_radians(), 5.0_f64.to_radians(), 15.0_f64.to_radians())]
fn coe_round_trips_through_cartesian(
    #[case] sma_m: f64,
    #[case] ecc: f64,
    #[case] inc_rad: f64,
    #[case] raan_rad: f64,
    #[case] aop_rad: f64,
    #[case] true_anomaly_rad: f64,
) {
    let coe = COE::with_true_anomaly(sma_m, ecc, inc_rad, raan_rad, aop_rad, true_anomaly_rad);
    let frame = FrameId::gcrf();
    let (position, velocity) = coe.to_cartesian(EARTH_MU_M3_S2, &frame).unwrap();
    let recovered = COE::from_cartesian(&position, &velocity, &frame, EARTH_MU_M3_S2).unwrap();

    assert_relative_eq!(recovered.sma_m, sma_m, max_relative = 1e-9);
    assert_relative_eq!(recovered.ecc, ecc, epsilon = 1e-10);
    assert_relative_eq!(recovered.inc_rad, inc_rad, epsilon = 1e-10);
    assert_relative_eq!(recovered.raan_rad, raan_rad, epsilon = 1e-10);
    assert_relative_eq!(recovered.aop_rad, aop_rad, epsilon = 1e-10);
    let recovered_true_anomaly = recovered.true_anomaly_rad().unwrap();
    assert_relative_eq!(recovered_true_anomaly, true_anomaly_rad, epsilon = 1e-10);
}

/// true -> eccentric -> mean -> eccentric -> true reproduces the original anomaly.
#[rstest]
#[case(0.0, 0.0)]
#[case(0.3, 0.1)]
#[case(1.0, 0.5)]
#[case(3.0, 0.8)]
#[case(6.0, 0.95)]
fn anomaly_conversions_are_mutually_inverse(#[case] true_anomaly_rad: f64, #[case] ecc: f64) {
    use nyx_guidance_core::coe::{eccentric_from_true, mean_from_eccentric, true_from_eccentric};

    let eccentric = eccentric_from_true(true_anomaly_rad, ecc).unwrap();
    let mean = mean_from_eccentric(eccentric, ecc);
    let eccentric_back = eccentric_from_mean(mean, ecc, 1e-13).unwrap();
    let true_back = true_from_eccentric(eccentric_back, ecc);

    // Normalize both sides into [0, 2*pi) before comparing, since the round trip is only
    // guaranteed up to a multiple of a full revolution.
    let wrap = |angle: f64| angle.rem_euclid(std::f64::consts::TAU);
    assert_relative_eq!(wrap(true_back), wrap(true_anomaly_rad), epsilon = 1e-12);

    let via_mean = true_from_mean(mean, ecc, 1e-13).unwrap();
    assert_relative_eq!(wrap(via_mean), wrap(true_anomaly_rad), epsilon = 1e-10);
}

/// under J2, a/e/i hold constant over an integer number of nodal periods while RAAN
/// advances by the closed-form nodal regression rate.
#[test]
fn j2_secular_propagation_holds_a_e_i_constant_and_advances_raan() {
    use hifitime::{Epoch, TimeUnits};
    use nyx_guidance_core::coe::AnomalyKind;
    use nyx_guidance_core::kepler::Kepler;

    let sma_m = 7_000_000.0;
    let ecc = 0.01;
    let inc_rad = 98.0_f64.to_radians();
    let initial_coe = COE::new(sma_m, ecc, inc_rad, 0.0, 0.0, 0.0, AnomalyKind::Mean);
    let epoch = Epoch::from_gregorian_utc_at_midnight(2023, 1, 1);
    let frame = FrameId::gcrf();

    let equatorial_radius_m = 6_378_137.0;
    let j2 = 1.082_63e-3;

    let kepler = Kepler::new(
        initial_coe,
        epoch,
        EARTH_MU_M3_S2,
        PerturbationType::J2,
        1,
        equatorial_radius_m,
        j2,
        0.0,
        &frame,
    )
    .unwrap();

    let period_s = 2.0 * std::f64::consts::PI * (sma_m.powi(3) / EARTH_MU_M3_S2).sqrt();
    let ten_periods_later = epoch + (10.0 * period_s).seconds();

    let final_coe = kepler.coe_at(ten_periods_later).unwrap();
    assert_relative_eq!(final_coe.sma_m, sma_m, epsilon = 1e-6);
    assert_relative_eq!(final_coe.ecc, ecc, epsilon = 1e-12);
    assert_relative_eq!(final_coe.inc_rad, inc_rad, epsilon = 1e-12);

    // RAAN must have advanced (non-zero nodal regression rate for this inclination/altitude).
    assert!((final_coe.raan_rad - initial_coe.raan_rad).abs() > 1e-6);
}

/// dynamics additivity: two contributors writing the same subset sum their
/// contributions, matching whatever a single combined contributor would produce.
#[test]
fn dynamics_contributions_to_the_same_subset_are_additive() {
    use hifitime::Epoch;
    use nalgebra::DVector;
    use nyx_guidance_core::dynamics::Dynamics;
    use nyx_guidance_core::frames::FrameId;

    let frame = FrameId::gcrf();
    let position = Vector3::new(7_000_000.0, 0.0, 0.0);
    let read_slice = DVector::from_row_slice(position.as_slice());
    let instant = Epoch::from_gregorian_utc_at_midnight(2023, 1, 1);

    let two_body = Dynamics::CentralBodyGravity {
        mu_m3_s2: EARTH_MU_M3_S2,
        harmonics: None,
    };
    let smaller_body = Dynamics::CentralBodyGravity {
        mu_m3_s2: 4.9e12, // roughly lunar mu, used only as a second additive contributor here
        harmonics: None,
    };

    let a = two_body.contribution(instant, &read_slice, &frame).unwrap();
    let b = smaller_body.contribution(instant, &read_slice, &frame).unwrap();

    let combined = Dynamics::CentralBodyGravity {
        mu_m3_s2: EARTH_MU_M3_S2 + 4.9e12,
        harmonics: None,
    };
    let combined_contribution = combined.contribution(instant, &read_slice, &frame).unwrap();

    assert_relative_eq!((&a + &b), combined_contribution, max_relative = 1e-12);
}
