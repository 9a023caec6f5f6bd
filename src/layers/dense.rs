use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction, error::LayerError, layers::Shape};

/// Fully-connected layer: a = σ(x·W + b).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub name: String,
    pub size: usize,
    /// Shape `(input_size, size)`.
    pub weights: Matrix,
    /// Shape `(1, size)`.
    pub biases: Matrix,
    pub activation: ActivationFunction,
}

impl Dense {
    /// Randomly initialized layer: He before ReLU-family activations,
    /// Xavier otherwise. Biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = match activation {
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } | ActivationFunction::Swish => {
                Matrix::he(input_size, size, rng)
            }
            _ => Matrix::xavier(input_size, size, rng),
        };
        Dense {
            name: name.to_owned(),
            size,
            weights,
            biases: Matrix::zeros(1, size),
            activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    pub fn output_shape(&self, input_size: usize) -> Result<Shape, LayerError> {
        if input_size != self.weights.rows {
            return Err(LayerError::new(
                &self.name,
                format!("expects {} inputs, got {}", self.weights.rows, input_size),
            ));
        }
        if self.weights.cols != self.size
            || !self.weights.is_well_formed()
            || self.biases.rows != 1
            || self.biases.cols != self.size
            || !self.biases.is_well_formed()
        {
            return Err(LayerError::new(
                &self.name,
                format!("weights must be {}x{} and biases 1x{}", input_size, self.size, self.size),
            ));
        }
        if self.size == 0 {
            return Err(LayerError::new(&self.name, "has no units"));
        }
        Ok(Shape::Flat(self.size))
    }

    /// z = x·W + b
    pub fn pre_activation(&self, input: &[f64]) -> Vec<f64> {
        let z = &Matrix::row(input.to_vec()) * &self.weights + self.biases.clone();
        z.into_row()
    }

    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.activation.activate(&self.pre_activation(input))
    }

    /// ∂L/∂x = (∂L/∂a ⊙ σ'(z)) · Wᵀ, with the softmax Jacobian applied in full.
    pub fn backward(&self, input: &[f64], grad_output: &[f64]) -> Vec<f64> {
        let z = self.pre_activation(input);
        let a = self.activation.activate(&z);
        let delta = Matrix::row(self.activation.backward(&z, &a, grad_output));
        (&delta * &self.weights.transpose()).into_row()
    }
}
