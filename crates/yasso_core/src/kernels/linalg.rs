//! Linear pool system `x' = A x + b` on nalgebra's 5×5 static types.

use nalgebra::{Matrix5, Vector5};

use crate::litter::Masses;

pub type Matrix = Matrix5<f64>;
pub type Vector = Vector5<f64>;

pub fn vector(masses: &Masses) -> Vector {
    Vector::from_column_slice(masses)
}

pub fn masses(vector: &Vector) -> Masses {
    std::array::from_fn(|pool| vector[pool])
}

/// Solve `a x = b`. `None` when `a` is singular or the solution is not finite.
pub fn solve(a: &Matrix, b: &Vector) -> Option<Vector> {
    let x = a.lu().solve(b)?;
    x.iter().all(|value| value.is_finite()).then_some(x)
}

/// State after `duration` years: `A⁻¹ (e^{A t} (A x0 + b) − b)`.
pub fn propagate(a: &Matrix, initial: &Vector, input: &Vector, duration: f64) -> Option<Vector> {
    let flux = a * initial + input;
    let evolved = (a * duration).exp() * flux - input;
    solve(a, &evolved)
}

/// The state where `A x + b` vanishes.
pub fn equilibrium(a: &Matrix, input: &Vector) -> Option<Vector> {
    solve(&(-a), input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-10 * a.abs().max(b.abs()).max(1.0)
    }

    fn diagonal(values: [f64; 5]) -> Matrix {
        Matrix::from_diagonal(&Vector::from(values))
    }

    #[test]
    fn pure_decay_is_exponential() {
        let a = diagonal([-3.0, -0.5, -0.1, -1.2, -0.02]);
        let start = Vector::repeat(10.0);
        let end = propagate(&a, &start, &Vector::zeros(), 2.0).unwrap();
        for (pool, rate) in [-3.0f64, -0.5, -0.1, -1.2, -0.02].iter().enumerate() {
            assert!(close(end[pool], 10.0 * (rate * 2.0).exp()), "pool {pool}");
        }
    }

    #[test]
    fn equilibrium_balances_input() {
        let mut a = diagonal([-1.0, -0.5, -0.25, -2.0, -0.01]);
        a[(4, 0)] = 0.1;
        let input = vector(&[1.0, 2.0, 3.0, 4.0, 0.0]);
        let x = equilibrium(&a, &input).unwrap();
        let residual = a * x + input;
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
        assert!(close(x[0], 1.0));
        assert!(close(x[4], 10.0));
    }

    #[test]
    fn equilibrium_is_stationary_under_propagation() {
        let mut a = diagonal([-0.8, -4.0, -0.3, -0.1, -0.005]);
        a[(0, 1)] = 1.5;
        a[(4, 3)] = 0.02;
        let input = vector(&[5.0, 1.0, 1.0, 2.0, 0.0]);
        let x = equilibrium(&a, &input).unwrap();
        let next = propagate(&a, &x, &input, 1.0).unwrap();
        for pool in 0..5 {
            assert!((next[pool] - x[pool]).abs() < 1e-8 * x[pool].abs().max(1.0));
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let a = diagonal([1.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(solve(&a, &Vector::repeat(1.0)).is_none());
    }

    #[test]
    fn masses_convert_both_ways() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(masses(&vector(&values)), values);
    }
}
