use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::layers::Shape;
use crate::math::tensor::Tensor3;

/// Max pooling with a square window, no padding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub name: String,
    pub size: usize,
    /// Defaults to `size` (non-overlapping windows).
    #[serde(default)]
    pub stride: Option<usize>,
}

impl MaxPool2d {
    pub fn new(name: &str, size: usize) -> MaxPool2d {
        MaxPool2d { name: name.to_owned(), size, stride: None }
    }

    fn stride(&self) -> usize {
        self.stride.unwrap_or(self.size)
    }

    fn out_len(&self, input: usize) -> usize {
        (input - self.size) / self.stride() + 1
    }

    pub fn output_shape(&self, height: usize, width: usize, channels: usize) -> Result<Shape, LayerError> {
        if self.size == 0 || self.stride() == 0 {
            return Err(LayerError::new(&self.name, "window and stride must be non-zero"));
        }
        if height < self.size || width < self.size {
            return Err(LayerError::new(
                &self.name,
                format!("window {} does not fit a {}x{} input", self.size, height, width),
            ));
        }
        Ok(Shape::Spatial {
            height: self.out_len(height),
            width: self.out_len(width),
            channels,
        })
    }

    /// Input position of the (first) maximum of one window and channel.
    fn argmax(&self, input: &Tensor3, oy: usize, ox: usize, c: usize) -> (usize, usize) {
        let stride = self.stride();
        let mut best = (oy * stride, ox * stride);
        let mut best_value = f64::NEG_INFINITY;
        for dy in 0..self.size {
            for dx in 0..self.size {
                let (y, x) = (oy * stride + dy, ox * stride + dx);
                let v = input.get(y, x, c);
                if v > best_value {
                    best_value = v;
                    best = (y, x);
                }
            }
        }
        best
    }

    pub fn forward(&self, input: &Tensor3) -> Tensor3 {
        let (h, w, channels) = input.shape();
        let (out_h, out_w) = (self.out_len(h), self.out_len(w));
        let mut out = Tensor3::zeros(out_h, out_w, channels);
        for oy in 0..out_h {
            for ox in 0..out_w {
                for c in 0..channels {
                    let (y, x) = self.argmax(input, oy, ox, c);
                    out.set(oy, ox, c, input.get(y, x, c));
                }
            }
        }
        out
    }

    /// Routes each output gradient to the input position that won the max.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Tensor3 {
        let (h, w, channels) = input.shape();
        let mut grad_input = Tensor3::zeros(h, w, channels);
        let (out_h, out_w, _) = grad_output.shape();
        for oy in 0..out_h {
            for ox in 0..out_w {
                for c in 0..channels {
                    let (y, x) = self.argmax(input, oy, ox, c);
                    grad_input.add_at(y, x, c, grad_output.get(oy, ox, c));
                }
            }
        }
        grad_input
    }
}

/// Mean over the spatial dimensions: HxWxC → C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAvgPool {
    pub name: String,
}

impl GlobalAvgPool {
    pub fn forward(&self, input: &Tensor3) -> Vec<f64> {
        input.channel_means()
    }

    pub fn backward(&self, input: &Tensor3, grad_output: &[f64]) -> Tensor3 {
        let (h, w, channels) = input.shape();
        let area = (h * w) as f64;
        let mut grad_input = Tensor3::zeros(h, w, channels);
        for pixel in grad_input.data_mut().chunks_exact_mut(channels) {
            for (g, &upstream) in pixel.iter_mut().zip(grad_output) {
                *g = upstream / area;
            }
        }
        grad_input
    }
}

/// HxWxC → H·W·C in HWC order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flatten {
    pub name: String,
}

impl Flatten {
    pub fn forward(&self, input: &Tensor3) -> Vec<f64> {
        input.data().to_vec()
    }

    pub fn backward(&self, input: &Tensor3, grad_output: &[f64]) -> Result<Tensor3, LayerError> {
        let (h, w, c) = input.shape();
        Tensor3::from_vec(h, w, c, grad_output.to_vec())
            .ok_or_else(|| LayerError::new(&self.name, "gradient length does not match the input"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Tensor3 {
        // 4x4 single channel, values 0..16 except one bump
        let mut data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        data[0] = 20.0;
        Tensor3::from_vec(4, 4, 1, data).unwrap()
    }

    #[test]
    fn max_pool_picks_window_maxima() {
        let pool = MaxPool2d::new("pool", 2);
        let out = pool.forward(&grid());
        assert_eq!(out.shape(), (2, 2, 1));
        assert_eq!(out.data(), &[20.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn max_pool_backward_routes_to_winner() {
        let pool = MaxPool2d::new("pool", 2);
        let grad = Tensor3::from_vec(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let back = pool.backward(&grid(), &grad);
        assert_eq!(back.get(0, 0, 0), 1.0);
        assert_eq!(back.get(1, 3, 0), 2.0);
        assert_eq!(back.get(3, 1, 0), 3.0);
        assert_eq!(back.get(3, 3, 0), 4.0);
        assert_eq!(back.data().iter().sum::<f64>(), 10.0);
    }

    #[test]
    fn global_avg_pool_spreads_gradient_evenly() {
        let gap = GlobalAvgPool { name: "gap".into() };
        let input = Tensor3::zeros(2, 2, 2);
        let back = gap.backward(&input, &[4.0, 8.0]);
        assert_eq!(back.data(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn pool_window_must_fit() {
        let pool = MaxPool2d::new("pool", 3);
        assert!(pool.output_shape(2, 5, 1).is_err());
    }
}
