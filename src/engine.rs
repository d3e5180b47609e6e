use fixed_map::Key as FixedKey;

use crate::error::{Error, Result};
use crate::math::centroid;
use crate::rules::Rules;
use crate::variable::FuzzyVariable;

/// Mamdani inference over the two pendulum inputs and the force output.
///
/// Crisp inputs are clamped into their universes and fuzzified against each
/// rule's antecedents; the firing strength (min of the two degrees) clips the
/// consequent's sampled curve, curves are aggregated pointwise by max, and
/// the aggregate is defuzzified by its centroid.
pub struct MamdaniEngine<A: FixedKey, V: FixedKey, F: FixedKey> {
    angle: FuzzyVariable<A>,
    velocity: FuzzyVariable<V>,
    force: FuzzyVariable<F>,
    rules: Rules<A, V, F>,
}

impl<A, V, F> MamdaniEngine<A, V, F>
where
    A: FixedKey + Copy,
    V: FixedKey + Copy,
    F: FixedKey + Copy,
{
    /// Builds an engine, validating that the rule base is non-empty and that
    /// every rule refers to labels the variables actually carry.
    pub fn new(
        angle: FuzzyVariable<A>,
        velocity: FuzzyVariable<V>,
        force: FuzzyVariable<F>,
        rules: Rules<A, V, F>,
    ) -> Result<Self> {
        if rules.is_empty() {
            return Err(Error::config("empty rule base"));
        }

        for rule in rules.iter() {
            if !angle.contains(rule.angle) || !velocity.contains(rule.velocity) || !force.contains(rule.force)
            {
                return Err(Error::config("rule refers to a label with no membership function"));
            }
        }

        Ok(Self {
            angle,
            velocity,
            force,
            rules,
        })
    }

    /// Runs one inference pass and returns the defuzzified force.
    pub fn infer(&self, angle: f64, velocity: f64) -> Result<f64> {
        if !angle.is_finite() || !velocity.is_finite() {
            return Err(Error::Numeric {
                context: "inference input",
            });
        }

        let angle = self.angle.clamp(angle);
        let velocity = self.velocity.clamp(velocity);
        let mut aggregate = vec![0.0f64; self.force.universe().len()];

        for rule in self.rules.iter() {
            let strength = self
                .angle
                .degree(rule.angle, angle)
                .min(self.velocity.degree(rule.velocity, velocity));

            if strength <= 0.0 {
                continue;
            }

            // Labels were checked at build time.
            let Some(curve) = self.force.term(rule.force) else {
                continue;
            };

            for (agg, &m) in aggregate.iter_mut().zip(curve) {
                *agg = agg.max(strength.min(m));
            }
        }

        centroid(self.force.universe(), &aggregate).ok_or(Error::NoActivation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MembershipFunction;

    #[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
    enum In {
        Neg,
        Pos,
    }

    #[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
    enum Out {
        Push,
        Pull,
    }

    fn input_var() -> FuzzyVariable<In> {
        FuzzyVariable::new(
            -1.0..1.0,
            0.01,
            [
                (In::Neg, MembershipFunction::triangular(-1.0, -0.5, 0.0)),
                (In::Pos, MembershipFunction::triangular(0.0, 0.5, 1.0)),
            ],
        )
        .unwrap()
    }

    fn output_var() -> FuzzyVariable<Out> {
        FuzzyVariable::new(
            -10.0..10.0,
            0.1,
            [
                (Out::Pull, MembershipFunction::triangular(-10.0, -5.0, 0.0)),
                (Out::Push, MembershipFunction::triangular(0.0, 5.0, 10.0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_single_rule_centers_on_consequent() {
        let mut rules = Rules::new();

        rules.add(In::Pos, In::Pos, Out::Push);

        let engine = MamdaniEngine::new(input_var(), input_var(), output_var(), rules).unwrap();
        let force = engine.infer(0.5, 0.5).unwrap();

        // Full firing strength clips nothing: centroid of the Push triangle.
        assert!((force - 5.0).abs() < 0.1);
    }

    #[test]
    fn test_empty_rule_base_rejected() {
        let rules = Rules::new();

        assert!(matches!(
            MamdaniEngine::new(input_var(), input_var(), output_var(), rules),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_no_activation_reported() {
        let mut rules = Rules::new();

        rules.add(In::Neg, In::Neg, Out::Pull);

        let engine = MamdaniEngine::new(input_var(), input_var(), output_var(), rules).unwrap();

        // Both antecedent degrees are zero at the positive end.
        assert!(matches!(engine.infer(0.9, 0.9), Err(Error::NoActivation)));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut rules = Rules::new();

        rules.add(In::Pos, In::Pos, Out::Push);

        let engine = MamdaniEngine::new(input_var(), input_var(), output_var(), rules).unwrap();

        assert!(engine.infer(f64::NAN, 0.0).is_err());
        assert!(engine.infer(0.0, f64::INFINITY).is_err());
    }
}
