use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::LayerError;
use crate::layers::Shape;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// No padding; the kernel must fit inside the input.
    #[default]
    Valid,
    /// Zero padding so that `out = ceil(in / stride)`; extra padding goes
    /// to the bottom/right.
    Same,
}

fn default_stride() -> usize {
    1
}

/// 2-D convolution over an HWC feature map with a square kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub name: String,
    pub in_channels: usize,
    pub filters: usize,
    pub kernel: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub padding: Padding,
    /// Laid out as `[filter][ky][kx][in_channel]`.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    pub activation: ActivationFunction,
}

impl Conv2d {
    /// He-initialized convolution with zero biases.
    #[allow(clippy::too_many_arguments)]
    pub fn he<R: Rng + ?Sized>(
        name: &str,
        in_channels: usize,
        filters: usize,
        kernel: usize,
        stride: usize,
        padding: Padding,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = kernel * kernel * in_channels;
        let weights = Matrix::he(fan_in, filters, rng).transpose();
        Conv2d {
            name: name.to_owned(),
            in_channels,
            filters,
            kernel,
            stride,
            padding,
            weights: weights.data.into_iter().flatten().collect(),
            biases: vec![0.0; filters],
            activation,
        }
    }

    /// Output length and leading padding along one axis.
    fn geometry(&self, input: usize) -> Option<(usize, usize)> {
        match self.padding {
            Padding::Valid => {
                if input < self.kernel {
                    return None;
                }
                Some(((input - self.kernel) / self.stride + 1, 0))
            }
            Padding::Same => {
                if input == 0 {
                    return None;
                }
                let out = (input + self.stride - 1) / self.stride;
                let total = ((out - 1) * self.stride + self.kernel).saturating_sub(input);
                Some((out, total / 2))
            }
        }
    }

    pub fn output_shape(&self, height: usize, width: usize, channels: usize) -> Result<Shape, LayerError> {
        let fail = |reason: String| Err(LayerError::new(&self.name, reason));
        if self.kernel == 0 || self.stride == 0 || self.filters == 0 {
            return fail("kernel, stride and filters must be non-zero".into());
        }
        if !self.activation.is_elementwise() {
            return fail(format!("{:?} is not an element-wise activation", self.activation));
        }
        if channels != self.in_channels {
            return fail(format!("expects {} input channels, got {}", self.in_channels, channels));
        }
        let expected = self.filters * self.kernel * self.kernel * self.in_channels;
        if self.weights.len() != expected || self.biases.len() != self.filters {
            return fail(format!(
                "has {} weights and {} biases, expected {} and {}",
                self.weights.len(),
                self.biases.len(),
                expected,
                self.filters
            ));
        }
        match (self.geometry(height), self.geometry(width)) {
            (Some((h, _)), Some((w, _))) if h > 0 && w > 0 => Ok(Shape::Spatial {
                height: h,
                width: w,
                channels: self.filters,
            }),
            _ => fail(format!("kernel {} does not fit a {}x{} input", self.kernel, height, width)),
        }
    }

    /// Visits every (output position, filter, kernel tap, input position)
    /// combination that lies inside the input.
    fn for_each_tap<F>(&self, input_h: usize, input_w: usize, mut visit: F)
    where
        F: FnMut(usize, usize, usize, usize, usize),
    {
        let (out_h, pad_top) = self.geometry(input_h).unwrap_or((0, 0));
        let (out_w, pad_left) = self.geometry(input_w).unwrap_or((0, 0));
        for oy in 0..out_h {
            for ox in 0..out_w {
                for ky in 0..self.kernel {
                    let iy = (oy * self.stride + ky) as isize - pad_top as isize;
                    if iy < 0 || iy >= input_h as isize {
                        continue;
                    }
                    for kx in 0..self.kernel {
                        let ix = (ox * self.stride + kx) as isize - pad_left as isize;
                        if ix < 0 || ix >= input_w as isize {
                            continue;
                        }
                        visit(oy, ox, ky * self.kernel + kx, iy as usize, ix as usize);
                    }
                }
            }
        }
    }

    fn weight_base(&self, filter: usize, tap: usize) -> usize {
        (filter * self.kernel * self.kernel + tap) * self.in_channels
    }

    /// z = W ⊛ x + b
    pub fn pre_activation(&self, input: &Tensor3) -> Tensor3 {
        let (h, w, _) = input.shape();
        let (out_h, _) = self.geometry(h).unwrap_or((0, 0));
        let (out_w, _) = self.geometry(w).unwrap_or((0, 0));
        let mut z = Tensor3::zeros(out_h, out_w, self.filters);
        for oy in 0..out_h {
            for ox in 0..out_w {
                for f in 0..self.filters {
                    z.set(oy, ox, f, self.biases[f]);
                }
            }
        }
        let cin = self.in_channels;
        self.for_each_tap(h, w, |oy, ox, tap, iy, ix| {
            let pixel = &input.data()[input.index(iy, ix, 0)..][..cin];
            for f in 0..self.filters {
                let kernel = &self.weights[self.weight_base(f, tap)..][..cin];
                let sum: f64 = kernel.iter().zip(pixel).map(|(k, x)| k * x).sum();
                z.add_at(oy, ox, f, sum);
            }
        });
        z
    }

    pub fn forward(&self, input: &Tensor3) -> Tensor3 {
        let z = self.pre_activation(input);
        z.map(|v| self.activation.function(v))
    }

    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Tensor3 {
        let z = self.pre_activation(input);
        let mut delta = grad_output.clone();
        for (d, &zv) in delta.data_mut().iter_mut().zip(z.data()) {
            *d *= self.activation.derivative(zv);
        }

        let (h, w, cin) = input.shape();
        let mut grad_input = Tensor3::zeros(h, w, cin);
        self.for_each_tap(h, w, |oy, ox, tap, iy, ix| {
            for f in 0..self.filters {
                let d = delta.get(oy, ox, f);
                if d == 0.0 {
                    continue;
                }
                let base = self.weight_base(f, tap);
                for c in 0..cin {
                    grad_input.add_at(iy, ix, c, self.weights[base + c] * d);
                }
            }
        });
        grad_input
    }
}
