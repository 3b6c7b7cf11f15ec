use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use skald::element::beam::BeamProperties;
use skald::element::ShapeFunctionData;

mod material;

pub fn bar_nodes(length: f64) -> Matrix3xX<f64> {
    Matrix3xX::from_columns(&[Vector3::zeros(), Vector3::new(length, 0.0, 0.0)])
}

/// Two-node linear segment on $\xi \in [-1, 1]$ with a single midpoint
/// quadrature point of weight 2.
pub fn bar_shape_data() -> Vec<ShapeFunctionData<f64>> {
    vec![ShapeFunctionData {
        values: DVector::from_vec(vec![0.5, 0.5]),
        first_derivatives: DMatrix::from_row_slice(2, 1, &[-0.5, 0.5]),
        second_derivatives: DMatrix::from_row_slice(2, 1, &[0.0, 0.0]),
        weight: 2.0,
    }]
}

/// Nodes of a parabolic arc $y = x^2$ interpolated by quadratic
/// Lagrange polynomials on $\xi \in [-1, 1]$.
pub fn parabola_nodes() -> Matrix3xX<f64> {
    Matrix3xX::from_columns(&[
        Vector3::new(-1.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 1.0, 0.0),
    ])
}

/// Quadratic Lagrange shape data with two Gauss points on $[-1, 1]$.
pub fn quadratic_curve_shape_data() -> Vec<ShapeFunctionData<f64>> {
    let gauss = 1.0 / 3.0_f64.sqrt();
    [-gauss, gauss]
        .iter()
        .map(|&xi| ShapeFunctionData {
            values: DVector::from_vec(vec![
                0.5 * xi * (xi - 1.0),
                1.0 - xi * xi,
                0.5 * xi * (xi + 1.0),
            ]),
            first_derivatives: DMatrix::from_row_slice(3, 1, &[xi - 0.5, -2.0 * xi, xi + 0.5]),
            second_derivatives: DMatrix::from_row_slice(3, 1, &[1.0, -2.0, 1.0]),
            weight: 1.0,
        })
        .collect()
}

pub fn unit_square_nodes() -> Matrix3xX<f64> {
    Matrix3xX::from_columns(&[
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(1.0, 1.0, 0.0),
    ])
}

/// Bilinear quadrilateral on $(\xi, \eta) \in [0, 1]^2$ with a single
/// centroid quadrature point of weight 1.
pub fn bilinear_patch_shape_data() -> Vec<ShapeFunctionData<f64>> {
    vec![ShapeFunctionData {
        values: DVector::from_vec(vec![0.25, 0.25, 0.25, 0.25]),
        first_derivatives: DMatrix::from_row_slice(
            4,
            2,
            &[-0.5, -0.5, 0.5, -0.5, -0.5, 0.5, 0.5, 0.5],
        ),
        second_derivatives: DMatrix::from_row_slice(
            4,
            3,
            &[
                0.0, 0.0, 1.0, //
                0.0, 0.0, -1.0, //
                0.0, 0.0, -1.0, //
                0.0, 0.0, 1.0,
            ],
        ),
        weight: 1.0,
    }]
}

/// Nodes of a parabolic strip $z = \xi^2$: quadratic in $\xi \in [-1, 1]$,
/// linear in $\eta \in [0, 1]$. Node `2 i + j` sits at $(\xi_i, \eta_j)$.
pub fn strip_nodes() -> Matrix3xX<f64> {
    Matrix3xX::from_columns(&[
        Vector3::new(-1.0, 0.0, 1.0),
        Vector3::new(-1.0, 1.0, 1.0),
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(1.0, 1.0, 1.0),
    ])
}

/// Quadratic-by-linear tensor product shape data for [`strip_nodes`],
/// evaluated at the two Gauss points $(\pm 1/\sqrt{3}, 1/2)$.
pub fn quadratic_strip_shape_data() -> Vec<ShapeFunctionData<f64>> {
    let gauss = 1.0 / 3.0_f64.sqrt();
    [-gauss, gauss]
        .iter()
        .map(|&xi| {
            let l = [0.5 * xi * (xi - 1.0), 1.0 - xi * xi, 0.5 * xi * (xi + 1.0)];
            let dl = [xi - 0.5, -2.0 * xi, xi + 0.5];
            let ddl = [1.0, -2.0, 1.0];
            let m = [0.5, 0.5];
            let dm = [-1.0, 1.0];

            let mut values = DVector::zeros(6);
            let mut first = DMatrix::zeros(6, 2);
            let mut second = DMatrix::zeros(6, 3);
            for i in 0..3 {
                for j in 0..2 {
                    let node = 2 * i + j;
                    values[node] = l[i] * m[j];
                    first[(node, 0)] = dl[i] * m[j];
                    first[(node, 1)] = l[i] * dm[j];
                    second[(node, 0)] = ddl[i] * m[j];
                    second[(node, 2)] = dl[i] * dm[j];
                }
            }
            ShapeFunctionData {
                values,
                first_derivatives: first,
                second_derivatives: second,
                weight: 1.0,
            }
        })
        .collect()
}

pub fn default_beam_properties() -> BeamProperties<f64> {
    BeamProperties {
        area: 1.0,
        moment_of_inertia_n: 1.0,
        moment_of_inertia_v: 1.0,
        torsion_constant: 1.0,
        shear_modulus: 1.0,
        density: 1.0,
        pretwist: 0.0,
        pretwist_derivative: 0.0,
        prestress_bending_n: 0.0,
        prestress_bending_v: 0.0,
        prestress_torsion: 0.0,
    }
}
