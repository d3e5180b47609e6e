use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_8};

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::{Controller, FORCE_LIMIT};

const NUM_INPUTS: usize = 2;
const NUM_MEMBERSHIP: usize = 3;
const FLATTENED: usize = NUM_INPUTS * NUM_MEMBERSHIP;
const VELOCITY_LIMIT: f64 = 10.0;
const INIT_SCALE: f64 = 0.1;

/// Hyperparameters of the neuro-fuzzy controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeuroConfig {
    pub learning_rate: f64,
    pub num_rules: usize,
    /// RNG seed for the small-random weight initialization.
    pub seed: u64,
}

impl Default for NeuroConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            num_rules: 9,
            seed: 42,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// The fixed-topology differentiable network: Gaussian fuzzification per
/// (input, membership) pair, a dense rule layer squashed by a sigmoid, and a
/// weighted sum over per-rule consequents.
pub struct NeuroFuzzyModel {
    /// `NUM_INPUTS x NUM_MEMBERSHIP`
    centers: DMatrix<f64>,
    widths: DMatrix<f64>,
    /// `num_rules x FLATTENED`
    rule_weights: DMatrix<f64>,
    /// `num_rules x 1`
    consequents: DMatrix<f64>,
}

/// Intermediate values of one forward pass, retained for the backward pass.
struct Activation {
    inputs: [f64; NUM_INPUTS],
    /// Row-major flattened membership degrees, `FLATTENED x 1`.
    flattened: DMatrix<f64>,
    /// Sigmoid rule activations, `num_rules x 1`.
    scores: DMatrix<f64>,
    output: f64,
}

impl NeuroFuzzyModel {
    fn new(num_rules: usize, rng: &mut StdRng) -> Result<Self> {
        if num_rules == 0 {
            return Err(Error::config("num_rules must be at least 1"));
        }

        let init = Normal::new(0.0, 1.0)
            .map_err(|err| Error::config(format!("weight initialization: {err}")))?;

        Ok(Self {
            // Domain-informed defaults: memberships spanning the clamped
            // input ranges, tighter around the equilibrium.
            centers: DMatrix::from_row_slice(
                NUM_INPUTS,
                NUM_MEMBERSHIP,
                &[-FRAC_PI_2, 0.0, FRAC_PI_2, -5.0, 0.0, 5.0],
            ),
            widths: DMatrix::from_row_slice(
                NUM_INPUTS,
                NUM_MEMBERSHIP,
                &[FRAC_PI_4, FRAC_PI_8, FRAC_PI_4, 2.5, 1.0, 2.5],
            ),
            rule_weights: DMatrix::from_fn(num_rules, FLATTENED, |_, _| INIT_SCALE * init.sample(rng)),
            consequents: DMatrix::from_fn(num_rules, 1, |_, _| INIT_SCALE * init.sample(rng)),
        })
    }

    /// Forward pass without gradient bookkeeping.
    pub fn predict(&self, angle: f64, velocity: f64) -> f64 {
        self.forward(angle, velocity).output
    }

    fn forward(&self, angle: f64, velocity: f64) -> Activation {
        let inputs = [angle, velocity];
        let flattened = DMatrix::from_fn(FLATTENED, 1, |k, _| {
            let (i, j) = (k / NUM_MEMBERSHIP, k % NUM_MEMBERSHIP);
            let u = (inputs[i] - self.centers[(i, j)]) / self.widths[(i, j)];

            (-0.5 * u * u).exp()
        });
        let scores = (&self.rule_weights * &flattened).map(sigmoid);
        let output = scores.dot(&self.consequents);

        Activation {
            inputs,
            flattened,
            scores,
            output,
        }
    }
}

/// Adaptive moment estimation over the four parameter tensors.
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: u64,
    first: Vec<DMatrix<f64>>,
    second: Vec<DMatrix<f64>>,
}

impl Adam {
    fn new(learning_rate: f64, shapes: &[(usize, usize)]) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first: shapes.iter().map(|&(r, c)| DMatrix::zeros(r, c)).collect(),
            second: shapes.iter().map(|&(r, c)| DMatrix::zeros(r, c)).collect(),
        }
    }

    fn apply(&mut self, params: [&mut DMatrix<f64>; 4], grads: [&DMatrix<f64>; 4]) {
        self.step += 1;

        let correction1 = 1.0 - self.beta1.powi(self.step as i32);
        let correction2 = 1.0 - self.beta2.powi(self.step as i32);

        for (index, (param, grad)) in params.into_iter().zip(grads).enumerate() {
            let first = &mut self.first[index];
            let second = &mut self.second[index];

            for (((p, &g), m), v) in param
                .iter_mut()
                .zip(grad.iter())
                .zip(first.iter_mut())
                .zip(second.iter_mut())
            {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;

                let m_hat = *m / correction1;
                let v_hat = *v / correction2;

                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

/// Neuro-fuzzy controller trained online by gradient descent on a
/// squared-error force target.
pub struct NeuroFuzzyController {
    config: NeuroConfig,
    model: NeuroFuzzyModel,
    optimizer: Adam,
}

impl NeuroFuzzyController {
    pub fn new(config: NeuroConfig) -> Result<Self> {
        if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
            return Err(Error::config(format!(
                "learning_rate must be positive; got {}",
                config.learning_rate
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let model = NeuroFuzzyModel::new(config.num_rules, &mut rng)?;
        let optimizer = Adam::new(
            config.learning_rate,
            &[
                (NUM_INPUTS, NUM_MEMBERSHIP),
                (NUM_INPUTS, NUM_MEMBERSHIP),
                (config.num_rules, FLATTENED),
                (config.num_rules, 1),
            ],
        );

        Ok(Self {
            config,
            model,
            optimizer,
        })
    }

    pub fn config(&self) -> &NeuroConfig {
        &self.config
    }

    pub fn model(&self) -> &NeuroFuzzyModel {
        &self.model
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
        self.optimizer.learning_rate = learning_rate;
    }

    /// One gradient-descent step toward `target_force`; returns the
    /// squared-error loss, or infinity when the pass goes non-finite (the
    /// parameters are left untouched in that case).
    pub fn train_step(&mut self, angle: f64, velocity: f64, target_force: f64) -> f64 {
        let activation = self.model.forward(angle, velocity);
        let loss = (activation.output - target_force).powi(2);

        if !loss.is_finite() {
            log::warn!("neuro-fuzzy training step produced a non-finite loss");

            return f64::INFINITY;
        }

        let dy = 2.0 * (activation.output - target_force);

        // d loss / d consequents: the sigmoid activations scaled by dy.
        let grad_consequents = &activation.scores * dy;

        // Backprop through the sigmoid into the rule layer.
        let dz = DMatrix::from_fn(self.config.num_rules, 1, |r, _| {
            let s = activation.scores[(r, 0)];

            dy * self.model.consequents[(r, 0)] * s * (1.0 - s)
        });
        let grad_rule_weights = &dz * activation.flattened.transpose();
        let d_flattened = self.model.rule_weights.transpose() * &dz;

        // Backprop through the Gaussian fuzzification.
        let mut grad_centers = DMatrix::zeros(NUM_INPUTS, NUM_MEMBERSHIP);
        let mut grad_widths = DMatrix::zeros(NUM_INPUTS, NUM_MEMBERSHIP);

        for i in 0..NUM_INPUTS {
            for j in 0..NUM_MEMBERSHIP {
                let k = i * NUM_MEMBERSHIP + j;
                let width = self.model.widths[(i, j)];
                let u = (activation.inputs[i] - self.model.centers[(i, j)]) / width;
                let membership = activation.flattened[(k, 0)];

                grad_centers[(i, j)] = d_flattened[(k, 0)] * membership * u / width;
                grad_widths[(i, j)] = d_flattened[(k, 0)] * membership * u * u / width;
            }
        }

        let finite = [&grad_centers, &grad_widths, &grad_rule_weights, &grad_consequents]
            .into_iter()
            .all(|grad| grad.iter().all(|g| g.is_finite()));

        if !finite {
            log::warn!("neuro-fuzzy training step produced non-finite gradients");

            return f64::INFINITY;
        }

        self.optimizer.apply(
            [
                &mut self.model.centers,
                &mut self.model.widths,
                &mut self.model.rule_weights,
                &mut self.model.consequents,
            ],
            [&grad_centers, &grad_widths, &grad_rule_weights, &grad_consequents],
        );

        loss
    }
}

impl Controller for NeuroFuzzyController {
    fn compute_control(&mut self, angle: f64, angular_velocity: f64) -> f64 {
        let angle = angle.clamp(-FRAC_PI_2, FRAC_PI_2);
        let velocity = angular_velocity.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);
        let force = self.model.forward(angle, velocity).output;

        if force.is_finite() {
            force.clamp(-FORCE_LIMIT, FORCE_LIMIT)
        } else {
            log::warn!("neuro-fuzzy controller returned fail-safe zero force");

            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_output_is_small_and_bounded() {
        let mut controller = NeuroFuzzyController::new(NeuroConfig::default()).unwrap();

        for (angle, velocity) in [(0.0, 0.0), (0.5, -2.0), (-3.0, 30.0)] {
            let force = controller.compute_control(angle, velocity);

            assert!(force.is_finite());
            assert!(force.abs() <= FORCE_LIMIT);
            // Small-random weights keep the untrained output near zero.
            assert!(force.abs() < 2.0);
        }
    }

    #[test]
    fn test_training_converges_on_fixed_sample() {
        let mut controller = NeuroFuzzyController::new(NeuroConfig::default()).unwrap();
        let (angle, velocity, target) = (0.2, 1.0, -1.4);
        let initial = controller.train_step(angle, velocity, target);
        let mut at_100 = f64::INFINITY;
        let mut last = initial;

        for step in 1..500 {
            last = controller.train_step(angle, velocity, target);

            if step == 100 {
                at_100 = last;
            }
        }

        assert!(initial > 1e-3);
        assert!(at_100 < 0.5 * initial);
        assert!(last < 1e-6);
    }

    #[test]
    fn test_trained_prediction_matches_target() {
        let mut controller = NeuroFuzzyController::new(NeuroConfig::default()).unwrap();

        for _ in 0..600 {
            controller.train_step(0.2, 1.0, -1.4);
        }

        let force = controller.compute_control(0.2, 1.0);

        assert!((force - -1.4).abs() < 1e-2);
    }

    #[test]
    fn test_non_finite_target_is_rejected() {
        let mut controller = NeuroFuzzyController::new(NeuroConfig::default()).unwrap();
        let before = controller.model.consequents.clone();

        assert_eq!(controller.train_step(0.1, 0.0, f64::NAN), f64::INFINITY);
        assert_eq!(controller.model.consequents, before);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(NeuroFuzzyController::new(NeuroConfig {
            num_rules: 0,
            ..NeuroConfig::default()
        })
        .is_err());
        assert!(NeuroFuzzyController::new(NeuroConfig {
            learning_rate: 0.0,
            ..NeuroConfig::default()
        })
        .is_err());
    }
}
