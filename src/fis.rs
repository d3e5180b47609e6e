use std::f64::consts::FRAC_PI_2;

use crate::engine::MamdaniEngine;
use crate::error::{Error, Result};
use crate::membership::MembershipFunction;
use crate::rules::Rules;
use crate::variable::FuzzyVariable;
use crate::{Controller, FORCE_LIMIT};

const ANGLE_STEP: f64 = 0.01;
const VELOCITY_STEP: f64 = 0.1;
const FORCE_STEP: f64 = 0.1;

/// Linguistic labels shared by all three FIS variables.
#[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
pub enum FisLabel {
    NegativeLarge,
    NegativeSmall,
    Zero,
    PositiveSmall,
    PositiveLarge,
}

use FisLabel::{NegativeLarge, NegativeSmall, PositiveLarge, PositiveSmall, Zero};

const LABELS: [FisLabel; 5] = [NegativeLarge, NegativeSmall, Zero, PositiveSmall, PositiveLarge];

/// The hand-tuned rule table: rows are angle labels, columns are angular
/// velocity labels, both in `LABELS` order. The response is monotone in the
/// lean angle and odd-symmetric around the upright equilibrium over the
/// central operating region.
const RULE_TABLE: [[FisLabel; 5]; 5] = [
    [PositiveLarge, PositiveLarge, PositiveSmall, Zero, NegativeSmall],
    [PositiveSmall, PositiveSmall, PositiveSmall, Zero, NegativeSmall],
    [PositiveSmall, PositiveSmall, Zero, NegativeSmall, NegativeSmall],
    [PositiveSmall, Zero, NegativeSmall, NegativeSmall, NegativeSmall],
    [PositiveSmall, Zero, NegativeSmall, NegativeSmall, NegativeLarge],
];

/// Immutable FIS configuration. Changing any field goes through
/// [`FisController::update_parameters`], which rebuilds the whole inference
/// structure from scratch rather than patching live membership objects.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FisConfig {
    /// Output scaling applied after defuzzification.
    pub gain: f64,
    /// Half-range of the angle universe (radians).
    pub angle_range: f64,
    /// Half-range of the angular velocity universe (rad/s).
    pub velocity_range: f64,
    /// Half-range of the force universe (N).
    pub force_range: f64,
}

impl Default for FisConfig {
    fn default() -> Self {
        Self {
            gain: 0.5,
            angle_range: FRAC_PI_2,
            velocity_range: 5.0,
            force_range: 10.0,
        }
    }
}

impl FisConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gain", self.gain),
            ("angle_range", self.angle_range),
            ("velocity_range", self.velocity_range),
            ("force_range", self.force_range),
        ] {
            if !value.is_finite() {
                return Err(Error::config(format!("{name} must be finite; got {value}")));
            }
        }
        if self.angle_range <= 0.0 || self.velocity_range <= 0.0 || self.force_range <= 0.0 {
            return Err(Error::config("universe half-ranges must be positive"));
        }

        Ok(())
    }
}

/// Five triangular sets over `[-half, half)`, breakpoints at the given inner
/// fraction, half, and the full half-range. With the default config this
/// reproduces the classic hand-tuned breakpoints (e.g. angle sets peaking at
/// -pi/4, -pi/8, 0, pi/8, pi/4).
fn five_triangles(half: f64, inner: f64) -> [MembershipFunction; 5] {
    let (f1, f2, f3) = (half, 0.5 * half, inner * half);

    [
        MembershipFunction::triangular(-f1, -f2, -f3),
        MembershipFunction::triangular(-f2, -f3, 0.0),
        MembershipFunction::triangular(-f3, 0.0, f3),
        MembershipFunction::triangular(0.0, f3, f2),
        MembershipFunction::triangular(f3, f2, f1),
    ]
}

/// Pure build: config in, runtime inference structure out.
fn build(config: &FisConfig) -> Result<MamdaniEngine<FisLabel, FisLabel, FisLabel>> {
    config.validate()?;

    let angle = FuzzyVariable::new(
        -config.angle_range..config.angle_range,
        ANGLE_STEP,
        LABELS.into_iter().zip(five_triangles(config.angle_range, 0.25)),
    )?;
    let velocity = FuzzyVariable::new(
        -config.velocity_range..config.velocity_range,
        VELOCITY_STEP,
        LABELS.into_iter().zip(five_triangles(config.velocity_range, 0.2)),
    )?;
    let force = FuzzyVariable::new(
        -config.force_range..config.force_range,
        FORCE_STEP,
        LABELS.into_iter().zip(five_triangles(config.force_range, 0.25)),
    )?;

    let mut rules = Rules::with_capacity(LABELS.len() * LABELS.len());

    for (i, &angle_label) in LABELS.iter().enumerate() {
        for (j, &velocity_label) in LABELS.iter().enumerate() {
            rules.add(angle_label, velocity_label, RULE_TABLE[i][j]);
        }
    }

    MamdaniEngine::new(angle, velocity, force, rules)
}

/// Hand-tuned Mamdani controller over triangular membership functions.
pub struct FisController {
    config: FisConfig,
    engine: MamdaniEngine<FisLabel, FisLabel, FisLabel>,
}

impl FisController {
    pub fn new(config: FisConfig) -> Result<Self> {
        let engine = build(&config)?;

        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &FisConfig {
        &self.config
    }

    /// Replaces the configuration and rebuilds membership functions and the
    /// rule base from scratch. On error the previous inference structure is
    /// left untouched.
    pub fn update_parameters(
        &mut self,
        gain: Option<f64>,
        angle_range: Option<f64>,
        velocity_range: Option<f64>,
        force_range: Option<f64>,
    ) -> Result<()> {
        let next = FisConfig {
            gain: gain.unwrap_or(self.config.gain),
            angle_range: angle_range.unwrap_or(self.config.angle_range),
            velocity_range: velocity_range.unwrap_or(self.config.velocity_range),
            force_range: force_range.unwrap_or(self.config.force_range),
        };

        self.engine = build(&next)?;
        self.config = next;

        Ok(())
    }
}

impl Controller for FisController {
    fn compute_control(&mut self, angle: f64, angular_velocity: f64) -> f64 {
        match self.engine.infer(angle, angular_velocity) {
            Ok(force) => (force * self.config.gain).clamp(-FORCE_LIMIT, FORCE_LIMIT),
            Err(err) => {
                log::warn!("fis controller returned fail-safe zero force: {err}");

                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn controller() -> FisController {
        FisController::new(FisConfig::default()).unwrap()
    }

    #[test]
    fn test_odd_symmetry() {
        let mut fis = controller();

        // Central operating region; the two boundary force sets are truncated
        // by the half-open universe and do not mirror exactly.
        for (angle, velocity) in [
            (0.1, 0.0),
            (0.3, 1.0),
            (0.05, 0.2),
            (0.7, -2.0),
            (0.5, -1.0),
            (0.0, 1.5),
        ] {
            let pos = fis.compute_control(angle, velocity);
            let neg = fis.compute_control(-angle, -velocity);

            assert!(
                (pos + neg).abs() < 1e-9,
                "asymmetric response at ({angle}, {velocity}): {pos} vs {neg}"
            );
        }
    }

    #[test]
    fn test_upright_rest_is_neutral() {
        let mut fis = controller();

        assert!(fis.compute_control(0.0, 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_grows_with_angle() {
        let mut fis = controller();

        let at_rest = fis.compute_control(0.0, 0.0).abs();
        let leaning = fis.compute_control(FRAC_PI_2, 0.0).abs();

        assert!(at_rest < 0.01 * leaning);
        assert_relative_eq!(fis.compute_control(FRAC_PI_2, 0.0), -1.25, epsilon = 1e-6);
    }

    #[test]
    fn test_known_operating_point() {
        let mut fis = controller();

        // Regression value for the default configuration.
        assert_relative_eq!(fis.compute_control(0.1, 0.0), -0.367154, epsilon = 1e-4);
    }

    #[test]
    fn test_inputs_clamped_into_universe() {
        let mut fis = controller();

        let inside = fis.compute_control(FRAC_PI_2, 4.0);
        let outside = fis.compute_control(10.0, 50.0);

        assert_relative_eq!(inside, fis.compute_control(10.0, 4.0), epsilon = 1e-12);
        assert!(outside.is_finite());
        assert!(outside.abs() <= FORCE_LIMIT);
    }

    #[test]
    fn test_gain_scales_output() {
        let mut fis = controller();

        let base = fis.compute_control(0.1, 0.0);

        fis.update_parameters(Some(1.0), None, None, None).unwrap();

        let doubled = fis.compute_control(0.1, 0.0);

        assert_relative_eq!(doubled, 2.0 * base, epsilon = 1e-9);
    }

    #[test]
    fn test_update_parameters_rejects_bad_config() {
        let mut fis = controller();

        assert!(fis.update_parameters(None, Some(-1.0), None, None).is_err());
        // The previous engine stays live after a rejected update.
        assert!(fis.compute_control(0.1, 0.0).abs() > 0.0);
    }
}
