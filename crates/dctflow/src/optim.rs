// SGD — momentum, time-based decay, Nesterov lookahead
//
// The update applied per parameter buffer, with g the gradient and v the
// per-buffer velocity:
//
//   lr_t = lr / (1 + decay * iterations)
//   v    = momentum * v - lr_t * g
//   p   += momentum * v - lr_t * g        (Nesterov)
//   p   += v                              (plain momentum)
//
// Velocity buffers are allocated lazily on the first step so the optimizer
// can be constructed before the model shapes are known.

use dctflow_data::{Error, Result};

/// Stochastic gradient descent with momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    decay: f64,
    nesterov: bool,
    iterations: u64,
    velocity: Vec<Vec<f32>>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64, decay: f64, nesterov: bool) -> Self {
        Self {
            lr,
            momentum,
            decay,
            nesterov,
            iterations: 0,
            velocity: Vec::new(),
        }
    }

    /// The reference recipe for ImageNet-scale classification: lr 0.1,
    /// momentum 0.9, decay 1e-4, Nesterov on.
    pub fn for_classification() -> Self {
        Self::new(0.1, 0.9, 1e-4, true)
    }

    /// Base learning rate (before time-based decay).
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Replace the base learning rate. Used by LR schedules and callbacks.
    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Multiply the base learning rate, e.g. when scaling to more workers.
    pub fn scale_lr(&mut self, factor: f64) {
        self.lr *= factor;
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn nesterov(&self) -> bool {
        self.nesterov
    }

    /// Steps taken so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Learning rate effective for the next step, after time-based decay.
    pub fn effective_lr(&self) -> f64 {
        self.lr / (1.0 + self.decay * self.iterations as f64)
    }

    /// Apply one update. `params` and `grads` are parallel lists of flat
    /// buffers; each pair must have matching lengths on every call.
    pub fn step(&mut self, params: &mut [Vec<f32>], grads: &[Vec<f32>]) -> Result<()> {
        if params.len() != grads.len() {
            return Err(Error::msg(format!(
                "optimizer got {} parameter buffers but {} gradient buffers",
                params.len(),
                grads.len()
            )));
        }
        if self.velocity.is_empty() {
            self.velocity = params.iter().map(|p| vec![0.0f32; p.len()]).collect();
        }

        let lr_t = self.effective_lr() as f32;
        let momentum = self.momentum as f32;

        for ((param, grad), velocity) in params.iter_mut().zip(grads).zip(&mut self.velocity) {
            if param.len() != grad.len() || param.len() != velocity.len() {
                return Err(Error::msg(format!(
                    "parameter/gradient length mismatch: {} vs {}",
                    param.len(),
                    grad.len()
                )));
            }
            for i in 0..param.len() {
                let v = momentum * velocity[i] - lr_t * grad[i];
                velocity[i] = v;
                if self.nesterov {
                    param[i] += momentum * v - lr_t * grad[i];
                } else {
                    param[i] += v;
                }
            }
        }

        self.iterations += 1;
        Ok(())
    }
}

// Loss

/// The loss the run optimizes. Only classification is configured here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    CategoricalCrossentropy,
}

impl Loss {
    pub fn evaluate(&self, probs: &[f64], targets: &[usize], num_classes: usize) -> f64 {
        match self {
            Loss::CategoricalCrossentropy => categorical_crossentropy(probs, targets, num_classes),
        }
    }
}

/// Mean categorical cross-entropy over a batch.
///
/// `probs` holds `[B, num_classes]` row-major probabilities (already
/// softmaxed); `targets` the true class index per row. Probabilities are
/// clamped away from zero before the log.
pub fn categorical_crossentropy(probs: &[f64], targets: &[usize], num_classes: usize) -> f64 {
    const EPSILON: f64 = 1e-7;
    let n = targets.len();
    if n == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for (i, &target) in targets.iter().enumerate() {
        let p = probs[i * num_classes + target].clamp(EPSILON, 1.0 - EPSILON);
        total -= p.ln();
    }
    total / n as f64
}
