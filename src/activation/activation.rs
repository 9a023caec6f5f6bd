use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    /// Vector-valued; only valid on `Dense` layers. Applied by `activate()`,
    /// differentiated by `backward()`.
    Softmax,
    Tanh,
    LeakyReLU { alpha: f64 },
    /// x · sigmoid(x), the EfficientNet activation.
    Swish,
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl ActivationFunction {
    pub fn is_elementwise(&self) -> bool {
        !matches!(self, ActivationFunction::Softmax)
    }

    /// Element-wise activation. `Softmax` has no scalar form and passes `x`
    /// through; use `activate()` for whole vectors.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity | ActivationFunction::Softmax => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Swish => x * sigmoid(x),
        }
    }

    /// Element-wise derivative at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = sigmoid(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity | ActivationFunction::Softmax => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Swish => {
                let sig = sigmoid(x);
                sig + x * sig * (1.0 - sig)
            }
        }
    }

    /// Applies the activation to a full pre-activation vector.
    pub fn activate(&self, z: &[f64]) -> Vec<f64> {
        match self {
            ActivationFunction::Softmax => {
                let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = z.iter().map(|&v| (v - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                exps.into_iter().map(|e| e / sum).collect()
            }
            _ => z.iter().map(|&v| self.function(v)).collect(),
        }
    }

    /// Vector-Jacobian product: maps ∂L/∂a to ∂L/∂z given the pre-activation
    /// `z` and the activation `a = activate(z)`.
    ///
    /// For softmax: ∂L/∂z_j = a_j · (g_j − Σ_k g_k · a_k).
    pub fn backward(&self, z: &[f64], a: &[f64], grad: &[f64]) -> Vec<f64> {
        match self {
            ActivationFunction::Softmax => {
                let dot: f64 = grad.iter().zip(a).map(|(g, p)| g * p).sum();
                a.iter().zip(grad).map(|(p, g)| p * (g - dot)).collect()
            }
            _ => z.iter().zip(grad).map(|(&x, g)| self.derivative(x) * g).collect(),
        }
    }
}
