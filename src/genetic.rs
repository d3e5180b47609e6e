use std::cmp::Ordering;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use slotmap::{new_key_type, SlotMap};

use crate::engine::MamdaniEngine;
use crate::error::{Error, Result};
use crate::membership::MembershipFunction;
use crate::rules::Rules;
use crate::variable::FuzzyVariable;
use crate::{Controller, TestCase, FORCE_LIMIT};

const ANGLE_STEP: f64 = 0.01;
const VELOCITY_STEP: f64 = 0.1;
const FORCE_STEP: f64 = 0.1;
const VELOCITY_LIMIT: f64 = 10.0;

const NUM_SETS: usize = 5;
const NUM_RULES: usize = NUM_SETS * NUM_SETS;

const CENTER_SIGMA: f64 = 0.1;
const WIDTH_SIGMA: f64 = 0.05;
const WEIGHT_SIGMA: f64 = 0.2;

new_key_type! {
    /// Arena slot of one genome in the population.
    struct GenomeKey;
}

/// Anonymous indexed antecedent sets of an evolved fuzzy system.
#[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
pub enum SetLabel {
    Set0,
    Set1,
    Set2,
    Set3,
    Set4,
}

const SETS: [SetLabel; NUM_SETS] = [
    SetLabel::Set0,
    SetLabel::Set1,
    SetLabel::Set2,
    SetLabel::Set3,
    SetLabel::Set4,
];

/// Generic output classes of an evolved fuzzy system. Rules assert either
/// `Negative` or `Positive`, selected by the sign of their weight.
#[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
pub enum Polarity {
    Negative,
    Zero,
    Positive,
}

/// One candidate fuzzy system: Gaussian set shapes per input plus one signed
/// weight per (angle set, velocity set) rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Genome {
    pub angle_centers: [f64; NUM_SETS],
    pub angle_widths: [f64; NUM_SETS],
    pub velocity_centers: [f64; NUM_SETS],
    pub velocity_widths: [f64; NUM_SETS],
    pub rule_weights: [f64; NUM_RULES],
}

impl Genome {
    /// The hard-coded fallback: evenly spaced sets, neutral rule weights.
    pub fn fallback() -> Self {
        Genome {
            angle_centers: [-FRAC_PI_2, -FRAC_PI_4, 0.0, FRAC_PI_4, FRAC_PI_2],
            angle_widths: [FRAC_PI_4; NUM_SETS],
            velocity_centers: [-5.0, -2.5, 0.0, 2.5, 5.0],
            velocity_widths: [2.5; NUM_SETS],
            rule_weights: [0.0; NUM_RULES],
        }
    }

    fn random(rng: &mut StdRng) -> Self {
        let mut genome = Genome::fallback();

        for center in &mut genome.angle_centers {
            *center = rng.gen_range(-FRAC_PI_2..FRAC_PI_2);
        }
        for width in &mut genome.angle_widths {
            *width = rng.gen_range(0.1..FRAC_PI_4);
        }
        for center in &mut genome.velocity_centers {
            *center = rng.gen_range(-5.0..5.0);
        }
        for width in &mut genome.velocity_widths {
            *width = rng.gen_range(0.5..2.5);
        }
        for weight in &mut genome.rule_weights {
            *weight = rng.gen_range(-1.0..1.0);
        }

        genome
    }
}

/// Materializes a genome into a runnable inference structure. Fails on
/// degenerate set shapes (e.g. a width mutated to zero or below).
fn materialize(genome: &Genome) -> Result<MamdaniEngine<SetLabel, SetLabel, Polarity>> {
    let angle = FuzzyVariable::new(
        -TAU..TAU,
        ANGLE_STEP,
        SETS.into_iter().zip(
            genome
                .angle_centers
                .into_iter()
                .zip(genome.angle_widths)
                .map(|(center, width)| MembershipFunction::gaussian(center, width)),
        ),
    )?;
    let velocity = FuzzyVariable::new(
        -5.0..5.0,
        VELOCITY_STEP,
        SETS.into_iter().zip(
            genome
                .velocity_centers
                .into_iter()
                .zip(genome.velocity_widths)
                .map(|(center, width)| MembershipFunction::gaussian(center, width)),
        ),
    )?;
    let force = FuzzyVariable::new(
        -FORCE_LIMIT..FORCE_LIMIT,
        FORCE_STEP,
        [
            (Polarity::Negative, MembershipFunction::triangular(-20.0, -10.0, 0.0)),
            (Polarity::Zero, MembershipFunction::triangular(-10.0, 0.0, 10.0)),
            (Polarity::Positive, MembershipFunction::triangular(0.0, 10.0, 20.0)),
        ],
    )?;

    let mut rules = Rules::with_capacity(NUM_RULES);
    let mut weights = genome.rule_weights.iter();

    for &angle_set in &SETS {
        for &velocity_set in &SETS {
            let consequent = match weights.next() {
                Some(&weight) if weight > 0.0 => Polarity::Positive,
                _ => Polarity::Negative,
            };

            rules.add(angle_set, velocity_set, consequent);
        }
    }

    MamdaniEngine::new(angle, velocity, force, rules)
}

fn crossover(rng: &mut StdRng, a: &Genome, b: &Genome) -> Genome {
    // Arrays are copied wholesale, so the child never aliases a parent.
    Genome {
        angle_centers: if rng.gen_bool(0.5) { a.angle_centers } else { b.angle_centers },
        angle_widths: if rng.gen_bool(0.5) { a.angle_widths } else { b.angle_widths },
        velocity_centers: if rng.gen_bool(0.5) {
            a.velocity_centers
        } else {
            b.velocity_centers
        },
        velocity_widths: if rng.gen_bool(0.5) {
            a.velocity_widths
        } else {
            b.velocity_widths
        },
        rule_weights: if rng.gen_bool(0.5) { a.rule_weights } else { b.rule_weights },
    }
}

struct MutationNoise {
    center: Normal<f64>,
    width: Normal<f64>,
    weight: Normal<f64>,
}

impl MutationNoise {
    fn new() -> Result<Self> {
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|err| Error::config(format!("mutation noise: {err}")))
        };

        Ok(Self {
            center: normal(CENTER_SIGMA)?,
            width: normal(WIDTH_SIGMA)?,
            weight: normal(WEIGHT_SIGMA)?,
        })
    }
}

fn mutate(rng: &mut StdRng, rate: f64, noise: &MutationNoise, genome: &mut Genome) {
    if rng.gen_bool(rate) {
        for value in &mut genome.angle_centers {
            *value += noise.center.sample(rng);
        }
    }
    if rng.gen_bool(rate) {
        for value in &mut genome.angle_widths {
            *value += noise.width.sample(rng);
        }
    }
    if rng.gen_bool(rate) {
        for value in &mut genome.velocity_centers {
            *value += noise.center.sample(rng);
        }
    }
    if rng.gen_bool(rate) {
        for value in &mut genome.velocity_widths {
            *value += noise.width.sample(rng);
        }
    }
    if rng.gen_bool(rate) {
        for value in &mut genome.rule_weights {
            *value += noise.weight.sample(rng);
        }
    }
}

/// Hyperparameters of the evolutionary search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub mutation_rate: f64,
    pub elite_size: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            mutation_rate: 0.1,
            elite_size: 5,
            seed: 42,
        }
    }
}

impl GeneticConfig {
    fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(Error::config("population_size must be at least 1"));
        }
        if self.elite_size > self.population_size {
            return Err(Error::config(format!(
                "elite_size {} exceeds population_size {}",
                self.elite_size, self.population_size
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(Error::config(format!(
                "mutation_rate must lie in [0, 1]; got {}",
                self.mutation_rate
            )));
        }

        Ok(())
    }
}

/// Fuzzy controller whose set shapes and rule polarities are evolved by a
/// seeded genetic search over a slot-arena population.
pub struct GeneticFuzzyController {
    config: GeneticConfig,
    rng: StdRng,
    noise: MutationNoise,
    population: SlotMap<GenomeKey, Genome>,
    roster: Vec<GenomeKey>,
    best: Genome,
    best_fitness: f64,
    engine: MamdaniEngine<SetLabel, SetLabel, Polarity>,
}

impl GeneticFuzzyController {
    pub fn new(config: GeneticConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut population = SlotMap::with_key();
        let mut roster = Vec::with_capacity(config.population_size);

        for _ in 0..config.population_size {
            let genome = Genome::random(&mut rng);

            roster.push(population.insert(genome));
        }

        let best = population[roster[0]].clone();
        let (best, engine) = match materialize(&best) {
            Ok(engine) => (best, engine),
            Err(err) => {
                log::warn!("initial genome failed to materialize, using fallback: {err}");

                let fallback = Genome::fallback();
                let engine = materialize(&fallback).map_err(|source| Error::FatalFallback {
                    source: Box::new(source),
                })?;

                (fallback, engine)
            },
        };

        Ok(Self {
            config,
            rng,
            noise: MutationNoise::new()?,
            population,
            roster,
            best,
            best_fitness: f64::NEG_INFINITY,
            engine,
        })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// Best fitness seen across all generations so far; monotonically
    /// non-decreasing across `evolve` calls.
    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn best_individual(&self) -> &Genome {
        &self.best
    }

    /// Fitness of one genome against a batch of test cases: the inverse of
    /// the accumulated angle deviation plus control effort. Lies in (0, 1];
    /// a genome that cannot be materialized scores 0.
    fn fitness(genome: &Genome, cases: &[TestCase]) -> f64 {
        let engine = match materialize(genome) {
            Ok(engine) => engine,
            Err(err) => {
                log::debug!("genome dropped from selection: {err}");

                return 0.0;
            },
        };

        let total_error: f64 = cases
            .iter()
            .map(|case| {
                let velocity = case.angular_velocity.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);
                let force = engine
                    .infer(case.angle, velocity)
                    .map_or(0.0, |f| f.clamp(-FORCE_LIMIT, FORCE_LIMIT));

                case.angle.abs() + 0.1 * force.abs()
            })
            .sum();

        1.0 / (1.0 + total_error)
    }

    /// Runs one generation: parallel fitness evaluation, elitist selection,
    /// uniform parent pairing, per-field crossover and mutation.
    ///
    /// The only fatal outcome is the fallback genome failing to materialize
    /// while rebuilding the live inference system.
    pub fn evolve(&mut self, cases: &[TestCase]) -> Result<()> {
        let scored: Vec<(GenomeKey, f64)> = self
            .roster
            .par_iter()
            .map(|&key| (key, Self::fitness(&self.population[key], cases)))
            .collect();

        let mut order: Vec<usize> = (0..scored.len()).collect();

        order.sort_by(|&a, &b| {
            scored[b]
                .1
                .partial_cmp(&scored[a].1)
                .unwrap_or(Ordering::Equal)
        });

        let (top_key, top_fitness) = scored[order[0]];

        if top_fitness > self.best_fitness {
            self.best_fitness = top_fitness;
            self.best = self.population[top_key].clone();
            self.rebuild_engine()?;
        }

        let mut next: Vec<Genome> = order
            .iter()
            .take(self.config.elite_size)
            .map(|&i| self.population[scored[i].0].clone())
            .collect();

        while next.len() < self.config.population_size {
            let parent_a = self.roster[self.rng.gen_range(0..self.roster.len())];
            let parent_b = self.roster[self.rng.gen_range(0..self.roster.len())];
            let mut child = crossover(
                &mut self.rng,
                &self.population[parent_a],
                &self.population[parent_b],
            );

            mutate(&mut self.rng, self.config.mutation_rate, &self.noise, &mut child);
            next.push(child);
        }

        self.population.clear();
        self.roster.clear();

        for genome in next {
            self.roster.push(self.population.insert(genome));
        }

        Ok(())
    }

    /// Updates hyperparameters. A changed population size re-seeds a fresh
    /// population; the live inference system is always rematerialized from
    /// the current best individual.
    pub fn update_parameters(
        &mut self,
        population_size: Option<usize>,
        mutation_rate: Option<f64>,
        elite_size: Option<usize>,
    ) -> Result<()> {
        let next = GeneticConfig {
            population_size: population_size.unwrap_or(self.config.population_size),
            mutation_rate: mutation_rate.unwrap_or(self.config.mutation_rate),
            elite_size: elite_size.unwrap_or(self.config.elite_size),
            seed: self.config.seed,
        };

        next.validate()?;

        let repopulate = next.population_size != self.config.population_size;

        self.config = next;

        if repopulate {
            self.population.clear();
            self.roster.clear();

            for _ in 0..self.config.population_size {
                let genome = Genome::random(&mut self.rng);

                self.roster.push(self.population.insert(genome));
            }
        }

        self.rebuild_engine()
    }

    /// Rebuilds the live engine from the best individual, falling back to the
    /// hard-coded default genome. A fallback that itself fails to materialize
    /// is fatal.
    fn rebuild_engine(&mut self) -> Result<()> {
        match materialize(&self.best) {
            Ok(engine) => {
                self.engine = engine;

                Ok(())
            },
            Err(err) => {
                log::warn!("best genome failed to materialize, reverting to fallback: {err}");
                self.best = Genome::fallback();
                self.engine = materialize(&self.best).map_err(|source| Error::FatalFallback {
                    source: Box::new(source),
                })?;

                Ok(())
            },
        }
    }
}

impl Controller for GeneticFuzzyController {
    fn compute_control(&mut self, angle: f64, angular_velocity: f64) -> f64 {
        // Only the velocity is clamped here; the angle is bounded by the
        // materialization universe inside the engine.
        let velocity = angular_velocity.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT);

        match self.engine.infer(angle, velocity) {
            Ok(force) => force.clamp(-FORCE_LIMIT, FORCE_LIMIT),
            Err(err) => {
                log::warn!("genetic-fuzzy controller returned fail-safe zero force: {err}");

                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> GeneticConfig {
        GeneticConfig {
            population_size: 8,
            mutation_rate: 0.1,
            elite_size: 2,
            seed: 7,
        }
    }

    fn cases() -> Vec<TestCase> {
        let mut rng = StdRng::seed_from_u64(99);

        TestCase::reference_batch(&mut rng, 12)
    }

    #[test]
    fn test_crossover_children_are_independent() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Genome::random(&mut rng);
        let b = Genome::random(&mut rng);
        let a_before = a.clone();
        let b_before = b.clone();
        let mut child = crossover(&mut rng, &a, &b);

        for value in &mut child.angle_centers {
            *value = 123.0;
        }
        for value in &mut child.rule_weights {
            *value = -123.0;
        }

        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_crossover_fields_come_from_a_parent() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = Genome::random(&mut rng);
        let b = Genome::random(&mut rng);

        for _ in 0..10 {
            let child = crossover(&mut rng, &a, &b);

            assert!(child.angle_centers == a.angle_centers || child.angle_centers == b.angle_centers);
            assert!(child.rule_weights == a.rule_weights || child.rule_weights == b.rule_weights);
        }
    }

    #[test]
    fn test_best_fitness_is_monotone() {
        let mut controller = GeneticFuzzyController::new(small_config()).unwrap();
        let cases = cases();
        let mut previous = f64::NEG_INFINITY;

        for _ in 0..4 {
            controller.evolve(&cases).unwrap();

            let best = controller.best_fitness();

            assert!(best >= previous);
            assert!(best > 0.0 && best <= 1.0);
            previous = best;
        }
    }

    #[test]
    fn test_evolution_is_reproducible() {
        let run = || {
            let mut controller = GeneticFuzzyController::new(small_config()).unwrap();
            let cases = cases();

            for _ in 0..3 {
                controller.evolve(&cases).unwrap();
            }

            (controller.best_fitness(), controller.best_individual().clone())
        };

        let (fitness_a, best_a) = run();
        let (fitness_b, best_b) = run();

        assert_eq!(fitness_a, fitness_b);
        assert_eq!(best_a, best_b);
    }

    #[test]
    fn test_fallback_genome_materializes() {
        assert!(materialize(&Genome::fallback()).is_ok());
    }

    #[test]
    fn test_degenerate_width_scores_zero() {
        let mut genome = Genome::fallback();

        genome.angle_widths[2] = -0.5;

        assert!(materialize(&genome).is_err());
        assert_eq!(GeneticFuzzyController::fitness(&genome, &cases()), 0.0);
    }

    #[test]
    fn test_compute_control_stays_bounded() {
        let mut controller = GeneticFuzzyController::new(small_config()).unwrap();

        for (angle, velocity) in [(0.0, 0.0), (1.0, -3.0), (-7.0, 25.0), (10.0, -50.0)] {
            let force = controller.compute_control(angle, velocity);

            assert!(force.is_finite());
            assert!(force.abs() <= FORCE_LIMIT);
        }
    }

    #[test]
    fn test_update_parameters_repopulates_on_size_change() {
        let mut controller = GeneticFuzzyController::new(small_config()).unwrap();

        controller.update_parameters(Some(4), Some(0.2), Some(1)).unwrap();

        assert_eq!(controller.config().population_size, 4);
        assert_eq!(controller.roster.len(), 4);
        assert_eq!(controller.population.len(), 4);

        assert!(controller.update_parameters(None, Some(2.0), None).is_err());
        assert!(controller.update_parameters(Some(2), None, Some(5)).is_err());
    }
}
