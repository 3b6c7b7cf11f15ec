//! Constitutive laws mapping strain measures to stresses and material
//! tangents.
//!
//! Elements hand a law the work-conjugate strain vector for their
//! formulation (a single axial Green-Lagrange component for curve elements,
//! the cartesian membrane strain for surface elements) and receive the
//! stress vector and the algorithmic tangent $\partial S / \partial E$ in
//! return. Laws may carry internal state; state is only advanced through
//! [`ConstitutiveLaw::finalize_step`], never during equilibrium iteration.

use nalgebra::{DMatrix, DVector, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use skald_traits::Real;
use std::error::Error;
use std::fmt;

/// Stress and material tangent returned by a constitutive evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialResponse<T: Real> {
    pub stress: DVector<T>,
    pub tangent: DMatrix<T>,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum MaterialError {
    /// An element was constructed without a constitutive law.
    MissingLaw,
    /// A law parameter is outside its admissible range.
    InvalidParameter(&'static str),
    /// The strain vector handed to the law has the wrong dimension.
    IncompatibleStrainSize { expected: usize, actual: usize },
}

impl fmt::Display for MaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLaw => {
                write!(f, "no constitutive law assigned")
            }
            Self::InvalidParameter(what) => {
                write!(f, "invalid constitutive parameter: {}", what)
            }
            Self::IncompatibleStrainSize { expected, actual } => {
                write!(
                    f,
                    "incompatible strain size: law expects {}, element provided {}",
                    expected, actual
                )
            }
        }
    }
}

impl Error for MaterialError {}

/// A constitutive law relating a strain vector to a stress vector.
///
/// Implementations must be deterministic between calls to `finalize_step`:
/// repeated evaluation at the same strain yields the same response, so that
/// the assembled tangent is consistent within a Newton iteration.
pub trait ConstitutiveLaw<T: Real>: fmt::Debug + Send {
    /// Dimension of the strain and stress vectors this law operates on.
    fn strain_size(&self) -> usize;

    /// Evaluates stress and algorithmic tangent at the given strain.
    fn calculate_material_response(
        &mut self,
        strain: &DVector<T>,
    ) -> Result<MaterialResponse<T>, MaterialError>;

    /// Commits internal state at the converged strain of a load step.
    fn finalize_step(&mut self, strain: &DVector<T>) -> Result<(), MaterialError>;

    /// Scalar history variable exposed for inspection, if the law carries
    /// one.
    fn history_value(&self) -> Option<T> {
        None
    }

    /// Validates the law parameters.
    fn check(&self) -> Result<(), MaterialError>;

    fn clone_box(&self) -> Box<dyn ConstitutiveLaw<T>>;
}

impl<T: Real> Clone for Box<dyn ConstitutiveLaw<T>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Isotropic elastic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young_modulus: T,
    pub poisson_ratio: T,
}

/// Linear elastic plane-stress law,
/// $$ D = \frac{E}{1 - \nu^2}
///    \begin{pmatrix} 1 & \nu & 0 \\ \nu & 1 & 0 \\
///    0 & 0 & (1 - \nu)/2 \end{pmatrix}, $$
/// evaluated on cartesian strain vectors in Voigt order
/// $(E_{11}, E_{22}, 2 E_{12})$.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneStressElastic<T: Real> {
    parameters: YoungPoisson<T>,
    prestress: Vector3<T>,
}

impl<T: Real> PlaneStressElastic<T> {
    pub fn new(parameters: YoungPoisson<T>) -> Self {
        Self {
            parameters,
            prestress: Vector3::zeros(),
        }
    }

    /// Adds a constant membrane prestress in Voigt order that is
    /// superimposed on every evaluated stress.
    pub fn with_prestress(mut self, prestress: Vector3<T>) -> Self {
        self.prestress = prestress;
        self
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn elasticity_matrix(&self) -> DMatrix<T> {
        let YoungPoisson {
            young_modulus: e,
            poisson_ratio: nu,
        } = self.parameters;
        let factor = e / (1.0 - nu * nu);
        let mut d = DMatrix::zeros(3, 3);
        d[(0, 0)] = factor;
        d[(1, 1)] = factor;
        d[(0, 1)] = factor * nu;
        d[(1, 0)] = factor * nu;
        d[(2, 2)] = factor * 0.5 * (1.0 - nu);
        d
    }
}

impl<T: Real> ConstitutiveLaw<T> for PlaneStressElastic<T> {
    fn strain_size(&self) -> usize {
        3
    }

    fn calculate_material_response(
        &mut self,
        strain: &DVector<T>,
    ) -> Result<MaterialResponse<T>, MaterialError> {
        if strain.len() != 3 {
            return Err(MaterialError::IncompatibleStrainSize {
                expected: 3,
                actual: strain.len(),
            });
        }
        let tangent = self.elasticity_matrix();
        let mut stress = &tangent * strain;
        for i in 0..3 {
            stress[i] += self.prestress[i];
        }
        Ok(MaterialResponse { stress, tangent })
    }

    fn finalize_step(&mut self, _strain: &DVector<T>) -> Result<(), MaterialError> {
        Ok(())
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn check(&self) -> Result<(), MaterialError> {
        if self.parameters.young_modulus <= 0.0 {
            return Err(MaterialError::InvalidParameter("young_modulus must be positive"));
        }
        let nu = self.parameters.poisson_ratio;
        if nu <= -1.0 || nu >= 0.5 {
            return Err(MaterialError::InvalidParameter(
                "poisson_ratio must lie in (-1, 0.5)",
            ));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConstitutiveLaw<T>> {
        Box::new(self.clone())
    }
}

/// Uniaxial elastic law $\sigma = E \, \varepsilon + \sigma_0$ for curve
/// elements, with an optional axial prestress $\sigma_0$.
///
/// The committed axial stress of the last finalized step is exposed through
/// [`ConstitutiveLaw::history_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct AxialLaw<T: Real> {
    young_modulus: T,
    prestress: T,
    committed_stress: Option<T>,
}

impl<T: Real> AxialLaw<T> {
    pub fn new(young_modulus: T) -> Self {
        Self {
            young_modulus,
            prestress: T::zero(),
            committed_stress: None,
        }
    }

    pub fn with_prestress(mut self, prestress: T) -> Self {
        self.prestress = prestress;
        self
    }

    pub fn young_modulus(&self) -> T {
        self.young_modulus
    }
}

impl<T: Real> ConstitutiveLaw<T> for AxialLaw<T> {
    fn strain_size(&self) -> usize {
        1
    }

    fn calculate_material_response(
        &mut self,
        strain: &DVector<T>,
    ) -> Result<MaterialResponse<T>, MaterialError> {
        if strain.len() != 1 {
            return Err(MaterialError::IncompatibleStrainSize {
                expected: 1,
                actual: strain.len(),
            });
        }
        let stress = self.young_modulus * strain[0] + self.prestress;
        Ok(MaterialResponse {
            stress: DVector::from_element(1, stress),
            tangent: DMatrix::from_element(1, 1, self.young_modulus),
        })
    }

    fn finalize_step(&mut self, strain: &DVector<T>) -> Result<(), MaterialError> {
        if strain.len() != 1 {
            return Err(MaterialError::IncompatibleStrainSize {
                expected: 1,
                actual: strain.len(),
            });
        }
        self.committed_stress = Some(self.young_modulus * strain[0] + self.prestress);
        Ok(())
    }

    fn history_value(&self) -> Option<T> {
        self.committed_stress
    }

    fn check(&self) -> Result<(), MaterialError> {
        if self.young_modulus <= T::zero() {
            return Err(MaterialError::InvalidParameter("young_modulus must be positive"));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConstitutiveLaw<T>> {
        Box::new(self.clone())
    }
}

/// Parameters of the exponential damage evolution
/// $$ d(\kappa) = d_\infty \left( 1 - e^{-\beta (\kappa - \kappa_0)} \right),
///    \qquad \kappa \ge \kappa_0. $$
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageParameters<T> {
    /// Equivalent strain below which no damage accumulates.
    pub threshold: T,
    /// Asymptotic damage, must be less than one.
    pub saturation_damage: T,
    /// Rate of the exponential approach to saturation.
    pub evolution_rate: T,
}

/// Isotropic scalar damage wrapper $(1 - d) \, \sigma_{\mathrm{el}}$ around
/// an elastic base law.
///
/// The history variable $\kappa$ is the largest equivalent strain (the
/// Euclidean norm of the strain vector) seen at any *committed* step. During
/// equilibrium iteration the damage is frozen at its committed value, which
/// keeps the response secant and the assembled tangent symmetric.
#[derive(Debug, Clone)]
pub struct ScalarDamageLaw<T: Real> {
    elastic_law: Box<dyn ConstitutiveLaw<T>>,
    parameters: DamageParameters<T>,
    kappa: T,
}

impl<T: Real> ScalarDamageLaw<T> {
    pub fn new(elastic_law: Box<dyn ConstitutiveLaw<T>>, parameters: DamageParameters<T>) -> Self {
        Self {
            elastic_law,
            parameters,
            kappa: T::zero(),
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn damage(&self) -> T {
        let DamageParameters {
            threshold,
            saturation_damage,
            evolution_rate,
        } = self.parameters;
        if self.kappa <= threshold {
            0.0
        } else {
            saturation_damage * (1.0 - (-evolution_rate * (self.kappa - threshold)).exp())
        }
    }
}

impl<T: Real> ConstitutiveLaw<T> for ScalarDamageLaw<T> {
    fn strain_size(&self) -> usize {
        self.elastic_law.strain_size()
    }

    fn calculate_material_response(
        &mut self,
        strain: &DVector<T>,
    ) -> Result<MaterialResponse<T>, MaterialError> {
        let mut response = self.elastic_law.calculate_material_response(strain)?;
        let integrity = T::one() - self.damage();
        response.stress *= integrity;
        response.tangent *= integrity;
        Ok(response)
    }

    fn finalize_step(&mut self, strain: &DVector<T>) -> Result<(), MaterialError> {
        self.kappa = self.kappa.max(strain.norm());
        self.elastic_law.finalize_step(strain)
    }

    fn history_value(&self) -> Option<T> {
        Some(self.kappa)
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn check(&self) -> Result<(), MaterialError> {
        self.elastic_law.check()?;
        let DamageParameters {
            threshold,
            saturation_damage,
            evolution_rate,
        } = self.parameters;
        if threshold < 0.0 {
            return Err(MaterialError::InvalidParameter("threshold must be non-negative"));
        }
        if saturation_damage < 0.0 || saturation_damage >= 1.0 {
            return Err(MaterialError::InvalidParameter(
                "saturation_damage must lie in [0, 1)",
            ));
        }
        if evolution_rate <= 0.0 {
            return Err(MaterialError::InvalidParameter("evolution_rate must be positive"));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConstitutiveLaw<T>> {
        Box::new(self.clone())
    }
}
