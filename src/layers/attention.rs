use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::LayerError;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor3;

/// Channel attention block.
///
/// The global average and global max of each channel are concatenated into
/// a `2C` descriptor, passed through a sigmoid dense layer to give one scale
/// per channel, and the input is multiplied channel-wise by that scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAttention {
    pub name: String,
    pub channels: usize,
    /// Shape `(2C, C)`: rows `0..C` see the average pool, `C..2C` the max pool.
    pub weights: Matrix,
    pub biases: Vec<f64>,
}

/// Values recomputed from the input by both passes.
struct Gate {
    argmax: Vec<usize>,
    scale: Vec<f64>,
}

impl ChannelAttention {
    pub fn xavier<R: Rng + ?Sized>(name: &str, channels: usize, rng: &mut R) -> ChannelAttention {
        ChannelAttention {
            name: name.to_owned(),
            channels,
            weights: Matrix::xavier(2 * channels, channels, rng),
            biases: vec![0.0; channels],
        }
    }

    pub fn check(&self, channels: usize) -> Result<(), LayerError> {
        if channels != self.channels {
            return Err(LayerError::new(
                &self.name,
                format!("expects {} channels, got {}", self.channels, channels),
            ));
        }
        let c = self.channels;
        if self.weights.rows != 2 * c || self.weights.cols != c || !self.weights.is_well_formed() || self.biases.len() != c {
            return Err(LayerError::new(
                &self.name,
                format!("weights must be {}x{} with {} biases", 2 * c, c, c),
            ));
        }
        Ok(())
    }

    fn gate(&self, input: &Tensor3) -> Gate {
        let maxima = input.channel_argmax();
        let mut descriptor = input.channel_means();
        descriptor.extend(maxima.iter().map(|&(_, v)| v));

        let z = &Matrix::row(descriptor) * &self.weights;
        let z: Vec<f64> = z.into_row().iter().zip(&self.biases).map(|(v, b)| v + b).collect();
        Gate {
            argmax: maxima.into_iter().map(|(i, _)| i).collect(),
            scale: ActivationFunction::Sigmoid.activate(&z),
        }
    }

    pub fn forward(&self, input: &Tensor3) -> Tensor3 {
        let gate = self.gate(input);
        let mut out = input.clone();
        for pixel in out.data_mut().chunks_exact_mut(self.channels) {
            for (v, s) in pixel.iter_mut().zip(&gate.scale) {
                *v *= s;
            }
        }
        out
    }

    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Tensor3 {
        let c = self.channels;
        let gate = self.gate(input);

        // Direct path through the multiplication, and ∂L/∂scale.
        let mut grad_input = grad_output.clone();
        let mut grad_scale = vec![0.0; c];
        for ((g, x), out_g) in grad_input
            .data_mut()
            .chunks_exact_mut(c)
            .zip(input.data().chunks_exact(c))
            .zip(grad_output.data().chunks_exact(c))
        {
            for ch in 0..c {
                g[ch] = out_g[ch] * gate.scale[ch];
                grad_scale[ch] += out_g[ch] * x[ch];
            }
        }

        // Through the sigmoid dense layer back to the pooled descriptor.
        let grad_z: Vec<f64> = grad_scale
            .iter()
            .zip(&gate.scale)
            .map(|(g, s)| g * s * (1.0 - s))
            .collect();
        let grad_descriptor = (&Matrix::row(grad_z) * &self.weights.transpose()).into_row();

        // Average pool spreads evenly; max pool goes to the winning position.
        let area = (input.height() * input.width()) as f64;
        for pixel in grad_input.data_mut().chunks_exact_mut(c) {
            for ch in 0..c {
                pixel[ch] += grad_descriptor[ch] / area;
            }
        }
        let data = grad_input.data_mut();
        for ch in 0..c {
            data[gate.argmax[ch]] += grad_descriptor[c + ch];
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_weights_halve_the_input() {
        let att = ChannelAttention {
            name: "att".into(),
            channels: 2,
            weights: Matrix::zeros(4, 2),
            biases: vec![0.0, 0.0],
        };
        let input = Tensor3::from_vec(1, 2, 2, vec![2.0, 4.0, 6.0, 8.0]).unwrap();
        assert_eq!(att.forward(&input).data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let att = ChannelAttention {
            name: "att".into(),
            channels: 2,
            weights: Matrix {
                rows: 4,
                cols: 2,
                data: vec![vec![0.5, -0.3], vec![0.2, 0.8], vec![-0.4, 0.1], vec![0.3, -0.6]],
            },
            biases: vec![0.1, -0.2],
        };
        let input = Tensor3::from_vec(2, 2, 2, vec![0.3, -0.7, 1.1, 0.4, -0.2, 0.9, 0.6, -1.3]).unwrap();
        // L = Σ out · u for a fixed u
        let u: Vec<f64> = (0..8).map(|i| 0.1 * i as f64 - 0.35).collect();
        let loss = |x: &Tensor3| att.forward(x).data().iter().zip(&u).map(|(a, b)| a * b).sum::<f64>();
        let grad_out = Tensor3::from_vec(2, 2, 2, u.clone()).unwrap();
        let analytic = att.backward(&input, &grad_out);

        let eps = 1e-6;
        for i in 0..8 {
            let mut up = input.clone();
            let mut down = input.clone();
            up.data_mut()[i] += eps;
            down.data_mut()[i] -= eps;
            let fd = (loss(&up) - loss(&down)) / (2.0 * eps);
            assert_abs_diff_eq!(analytic.data()[i], fd, epsilon = 1e-7);
        }
    }
}
