use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::ops::{Add, Mul};

/// Dense row-major matrix used for fully-connected weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![vec![0.0; cols]; rows],
        }
    }

    /// A single-row matrix holding `values`.
    pub fn row(values: Vec<f64>) -> Matrix {
        Matrix {
            rows: 1,
            cols: values.len(),
            data: vec![values],
        }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        // Both draws in (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn gaussian<R: Rng + ?Sized>(rows: usize, cols: usize, std_dev: f64, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);
        for row in res.data.iter_mut() {
            for value in row.iter_mut() {
                *value = Matrix::sample_standard_normal(rng) * std_dev;
            }
        }
        res
    }

    /// He initialization: N(0, sqrt(2 / fan_in)).
    ///
    /// Shape: (rows, cols) where `rows` is the fan-in, matching the
    /// `input × weights` convention of `Dense`.
    pub fn he<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        Matrix::gaussian(rows, cols, (2.0 / rows.max(1) as f64).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: N(0, sqrt(1 / fan_in)).
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        Matrix::gaussian(rows, cols, (1.0 / rows.max(1) as f64).sqrt(), rng)
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i][j] = self.data[j][i];
            }
        }

        res
    }

    /// `true` when every row has exactly `cols` entries.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.rows && self.data.iter().all(|row| row.len() == self.cols)
    }

    /// First row as a plain vector; empty for a matrix with no rows.
    pub fn into_row(self) -> Vec<f64> {
        self.data.into_iter().next().unwrap_or_default()
    }
}

impl Add for Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = self;
        for (row, rhs_row) in res.data.iter_mut().zip(rhs.data.iter()) {
            for (x, y) in row.iter_mut().zip(rhs_row.iter()) {
                *x += y;
            }
        }

        res
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for i in 0..res.rows {
            for j in 0..res.cols {
                let mut sum = 0.0;

                for k in 0..self.cols {
                    sum += self.data[i][k] * rhs.data[k][j];
                }

                res.data[i][j] = sum;
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn row_times_matrix() {
        let x = Matrix::row(vec![1.0, 2.0]);
        let w = Matrix {
            rows: 2,
            cols: 3,
            data: vec![vec![1.0, 0.0, -1.0], vec![0.5, 2.0, 1.0]],
        };
        assert_eq!((&x * &w).into_row(), vec![2.0, 4.0, 1.0]);
    }

    #[test]
    fn transpose_swaps_shape() {
        let m = Matrix { rows: 1, cols: 2, data: vec![vec![3.0, 4.0]] };
        let t = m.transpose();
        assert_eq!((t.rows, t.cols), (2, 1));
        assert_eq!(t.data, vec![vec![3.0], vec![4.0]]);
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = Matrix::he(4, 3, &mut StdRng::seed_from_u64(7));
        let b = Matrix::he(4, 3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.is_well_formed());
    }
}
