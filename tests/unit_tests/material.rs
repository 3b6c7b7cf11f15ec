use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Vector3};
use skald::material::{
    AxialLaw, ConstitutiveLaw, DamageParameters, MaterialError, PlaneStressElastic,
    ScalarDamageLaw, YoungPoisson,
};

fn steel_like() -> YoungPoisson<f64> {
    YoungPoisson {
        young_modulus: 1000.0,
        poisson_ratio: 0.3,
    }
}

#[test]
fn plane_stress_response_matches_the_elasticity_matrix() {
    let mut law = PlaneStressElastic::new(steel_like());
    let strain = DVector::from_vec(vec![0.002, -0.001, 0.0005]);
    let response = law.calculate_material_response(&strain).unwrap();

    let factor = 1000.0 / (1.0 - 0.09);
    let expected_tangent = DMatrix::from_row_slice(
        3,
        3,
        &[
            factor,
            factor * 0.3,
            0.0,
            factor * 0.3,
            factor,
            0.0,
            0.0,
            0.0,
            factor * 0.35,
        ],
    );
    assert_matrix_eq!(response.tangent, expected_tangent, comp = abs, tol = 1e-12);
    assert_scalar_eq!(
        response.stress[0],
        factor * (0.002 + 0.3 * (-0.001)),
        comp = abs,
        tol = 1e-12
    );
    assert_scalar_eq!(
        response.stress[1],
        factor * (0.3 * 0.002 - 0.001),
        comp = abs,
        tol = 1e-12
    );
    assert_scalar_eq!(response.stress[2], factor * 0.35 * 0.0005, comp = abs, tol = 1e-12);
}

#[test]
fn plane_stress_prestress_superimposes_on_the_stress() {
    let prestress = Vector3::new(5.0, -2.0, 1.0);
    let mut law = PlaneStressElastic::new(steel_like()).with_prestress(prestress);
    let response = law
        .calculate_material_response(&DVector::zeros(3))
        .unwrap();
    assert_matrix_eq!(
        DVector::from_column_slice(&[5.0, -2.0, 1.0]),
        response.stress,
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn plane_stress_rejects_wrong_strain_size() {
    let mut law = PlaneStressElastic::new(steel_like());
    let error = law
        .calculate_material_response(&DVector::zeros(2))
        .unwrap_err();
    assert!(matches!(
        error,
        MaterialError::IncompatibleStrainSize {
            expected: 3,
            actual: 2
        }
    ));
}

#[test]
fn parameter_checks_reject_inadmissible_values() {
    let incompressible = PlaneStressElastic::new(YoungPoisson {
        young_modulus: 1000.0,
        poisson_ratio: 0.5,
    });
    assert!(matches!(
        incompressible.check().unwrap_err(),
        MaterialError::InvalidParameter(_)
    ));

    let negative_modulus = PlaneStressElastic::new(YoungPoisson {
        young_modulus: -1.0,
        poisson_ratio: 0.3,
    });
    assert!(negative_modulus.check().is_err());

    assert!(AxialLaw::new(-1.0).check().is_err());
    assert!(AxialLaw::new(200.0).check().is_ok());

    let base = || Box::new(AxialLaw::new(100.0)) as Box<dyn ConstitutiveLaw<f64>>;
    let saturated = ScalarDamageLaw::new(
        base(),
        DamageParameters {
            threshold: 0.05,
            saturation_damage: 1.0,
            evolution_rate: 2.0,
        },
    );
    assert!(saturated.check().is_err());
    let negative_threshold = ScalarDamageLaw::new(
        base(),
        DamageParameters {
            threshold: -0.1,
            saturation_damage: 0.4,
            evolution_rate: 2.0,
        },
    );
    assert!(negative_threshold.check().is_err());
    let stalled = ScalarDamageLaw::new(
        base(),
        DamageParameters {
            threshold: 0.05,
            saturation_damage: 0.4,
            evolution_rate: 0.0,
        },
    );
    assert!(stalled.check().is_err());
}

#[test]
fn axial_law_commits_its_stress_history() {
    let mut law = AxialLaw::new(200.0).with_prestress(3.0);
    assert_eq!(law.history_value(), None);

    let response = law
        .calculate_material_response(&DVector::from_element(1, 0.01))
        .unwrap();
    assert_scalar_eq!(response.stress[0], 5.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(response.tangent[(0, 0)], 200.0, comp = abs, tol = 1e-14);
    // Evaluation alone must not commit anything
    assert_eq!(law.history_value(), None);

    law.finalize_step(&DVector::from_element(1, 0.02)).unwrap();
    let committed = law.history_value().unwrap();
    assert_scalar_eq!(committed, 7.0, comp = abs, tol = 1e-14);
}

#[test]
fn damage_is_frozen_between_committed_steps() {
    let mut law = ScalarDamageLaw::new(
        Box::new(AxialLaw::new(100.0)),
        DamageParameters {
            threshold: 0.05,
            saturation_damage: 0.4,
            evolution_rate: 2.0,
        },
    );

    // Large trial strain before any commit: still fully elastic
    let trial = DVector::from_element(1, 0.2);
    let response = law.calculate_material_response(&trial).unwrap();
    assert_scalar_eq!(response.stress[0], 20.0, comp = abs, tol = 1e-12);
    let again = law.calculate_material_response(&trial).unwrap();
    assert_scalar_eq!(again.stress[0], 20.0, comp = abs, tol = 1e-12);
    assert_eq!(law.history_value(), Some(0.0));

    law.finalize_step(&trial).unwrap();
    assert_eq!(law.history_value(), Some(0.2));

    // Unloading keeps the committed damage as a secant stiffness reduction
    let damage = 0.4 * (1.0 - (-2.0_f64 * (0.2 - 0.05)).exp());
    let unloaded = law
        .calculate_material_response(&DVector::from_element(1, 0.1))
        .unwrap();
    assert_scalar_eq!(unloaded.stress[0], (1.0 - damage) * 10.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(
        unloaded.tangent[(0, 0)],
        (1.0 - damage) * 100.0,
        comp = abs,
        tol = 1e-12
    );

    // The history variable never decreases
    law.finalize_step(&DVector::from_element(1, 0.1)).unwrap();
    assert_eq!(law.history_value(), Some(0.2));
}

#[test]
fn damage_below_the_threshold_stays_elastic() {
    let mut law = ScalarDamageLaw::new(
        Box::new(AxialLaw::new(100.0)),
        DamageParameters {
            threshold: 0.05,
            saturation_damage: 0.4,
            evolution_rate: 2.0,
        },
    );
    let strain = DVector::from_element(1, 0.04);
    law.finalize_step(&strain).unwrap();
    assert_eq!(law.history_value(), Some(0.04));

    let response = law.calculate_material_response(&strain).unwrap();
    assert_scalar_eq!(response.stress[0], 4.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(response.tangent[(0, 0)], 100.0, comp = abs, tol = 1e-12);
}
