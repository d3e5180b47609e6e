//! Inverted-pendulum balancing on a cart.
//!
//! The crate pairs a clamped cart-pole integrator with three interchangeable
//! force controllers: a hand-tuned Mamdani fuzzy system, a genetically
//! evolved fuzzy system, and a neuro-fuzzy network trained online by
//! gradient descent. An external host owns the fixed-rate loop: each tick it
//! reads the plant state, asks the active controller for a force and feeds
//! it back into [`CartPole::update`].

mod dynamics;
mod engine;
mod error;
mod fis;
mod genetic;
mod linspace;
mod math;
mod membership;
mod neuro;
mod rules;
mod variable;

use std::f64::consts::FRAC_PI_2;

use rand::Rng;

pub use dynamics::{CartPole, ModelKind, PhysicalParameters, PhysicalState, STATE_LIMIT};
pub use engine::MamdaniEngine;
pub use error::{Error, Result};
pub use fis::{FisConfig, FisController, FisLabel};
pub use genetic::{GeneticConfig, GeneticFuzzyController, Genome, Polarity, SetLabel};
pub use membership::MembershipFunction;
pub use neuro::{NeuroConfig, NeuroFuzzyController, NeuroFuzzyModel};
pub use rules::{Rule, Rules};
pub use variable::FuzzyVariable;

/// Actuator limit: every controller output and every force fed to the plant
/// is clamped to `[-FORCE_LIMIT, FORCE_LIMIT]`.
pub const FORCE_LIMIT: f64 = 20.0;

/// The control contract every variant implements.
///
/// `compute_control` is total: it always returns a finite force in
/// `[-FORCE_LIMIT, FORCE_LIMIT]` and never propagates an internal fault to
/// the caller. Faults are logged and mapped to the fail-safe zero force.
pub trait Controller {
    fn compute_control(&mut self, angle: f64, angular_velocity: f64) -> f64;
}

/// The closed set of controller variants, for hosts that switch the active
/// strategy at runtime without branching on concrete types.
pub enum AnyController {
    Fis(FisController),
    Genetic(GeneticFuzzyController),
    NeuroFuzzy(NeuroFuzzyController),
}

impl AnyController {
    pub fn as_fis_mut(&mut self) -> Option<&mut FisController> {
        match self {
            AnyController::Fis(fis) => Some(fis),
            _ => None,
        }
    }

    pub fn as_genetic_mut(&mut self) -> Option<&mut GeneticFuzzyController> {
        match self {
            AnyController::Genetic(genetic) => Some(genetic),
            _ => None,
        }
    }

    pub fn as_neuro_fuzzy_mut(&mut self) -> Option<&mut NeuroFuzzyController> {
        match self {
            AnyController::NeuroFuzzy(neuro) => Some(neuro),
            _ => None,
        }
    }
}

impl Controller for AnyController {
    fn compute_control(&mut self, angle: f64, angular_velocity: f64) -> f64 {
        match self {
            AnyController::Fis(fis) => fis.compute_control(angle, angular_velocity),
            AnyController::Genetic(genetic) => genetic.compute_control(angle, angular_velocity),
            AnyController::NeuroFuzzy(neuro) => neuro.compute_control(angle, angular_velocity),
        }
    }
}

/// One supervised sample for evolution and online training.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TestCase {
    pub angle: f64,
    pub angular_velocity: f64,
    pub target_force: f64,
}

impl TestCase {
    /// A batch of uniformly drawn states labeled with the reference PD force
    /// `-2 theta - theta_dot`.
    pub fn reference_batch<R: Rng>(rng: &mut R, count: usize) -> Vec<TestCase> {
        (0..count)
            .map(|_| {
                let angle = rng.gen_range(-FRAC_PI_2..FRAC_PI_2);
                let angular_velocity = rng.gen_range(-5.0..5.0);

                TestCase {
                    angle,
                    angular_velocity,
                    target_force: -2.0 * angle - angular_velocity,
                }
            })
            .collect()
    }
}

#[cfg(test)]
fn controllers() -> Vec<AnyController> {
    vec![
        AnyController::Fis(FisController::new(FisConfig::default()).unwrap()),
        AnyController::Genetic(
            GeneticFuzzyController::new(GeneticConfig {
                population_size: 6,
                elite_size: 2,
                ..GeneticConfig::default()
            })
            .unwrap(),
        ),
        AnyController::NeuroFuzzy(NeuroFuzzyController::new(NeuroConfig::default()).unwrap()),
    ]
}

#[test]
fn test_closed_loop_stays_bounded() {
    for kind in [ModelKind::Simplified, ModelKind::Coupled] {
        for mut controller in controllers() {
            let mut plant = CartPole::with_kind(PhysicalParameters::default(), kind);

            for _ in 0..500 {
                let state = plant.state();
                let force = controller.compute_control(state.angle, state.angular_velocity);

                assert!(force.is_finite());
                assert!(force.abs() <= FORCE_LIMIT);

                let next = plant.update(force).unwrap();

                assert!(next.cart_velocity.abs() <= STATE_LIMIT);
                assert!(next.cart_position.abs() <= STATE_LIMIT);
                assert!(next.angular_velocity.abs() <= STATE_LIMIT);
            }
        }
    }
}

#[test]
fn test_host_parameter_routing() {
    let mut controller = AnyController::Fis(FisController::new(FisConfig::default()).unwrap());

    assert!(controller.as_genetic_mut().is_none());
    controller
        .as_fis_mut()
        .unwrap()
        .update_parameters(Some(0.8), None, None, None)
        .unwrap();

    assert_eq!(controller.as_fis_mut().unwrap().config().gain, 0.8);
}

#[test]
fn test_evolution_then_control_through_dispatch() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(3);
    let cases = TestCase::reference_batch(&mut rng, 10);
    let mut controller = AnyController::Genetic(
        GeneticFuzzyController::new(GeneticConfig {
            population_size: 6,
            elite_size: 2,
            ..GeneticConfig::default()
        })
        .unwrap(),
    );

    controller.as_genetic_mut().unwrap().evolve(&cases).unwrap();

    let fitness = controller.as_genetic_mut().unwrap().best_fitness();

    assert!(fitness > 0.0 && fitness <= 1.0);

    let force = controller.compute_control(0.1, 0.0);

    assert!(force.is_finite());
    assert!(force.abs() <= FORCE_LIMIT);
}

#[test]
fn test_online_training_then_control() {
    let mut controller = AnyController::NeuroFuzzy(NeuroFuzzyController::new(NeuroConfig::default()).unwrap());
    let mut plant = CartPole::new(PhysicalParameters::default());

    for _ in 0..100 {
        let state = plant.state();
        let target = -2.0 * state.angle - state.angular_velocity;
        let loss = controller
            .as_neuro_fuzzy_mut()
            .unwrap()
            .train_step(state.angle, state.angular_velocity, target);

        assert!(loss >= 0.0);

        let force = controller.compute_control(state.angle, state.angular_velocity);

        plant.update(force).unwrap();
    }
}

#[test]
fn test_reference_batch_labels_are_pd_targets() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(5);
    let cases = TestCase::reference_batch(&mut rng, 50);

    assert_eq!(cases.len(), 50);

    for case in cases {
        assert!(case.angle.abs() <= FRAC_PI_2);
        assert!(case.angular_velocity.abs() <= 5.0);
        assert_eq!(case.target_force, -2.0 * case.angle - case.angular_velocity);
    }
}
