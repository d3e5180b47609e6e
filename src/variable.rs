use std::ops::Range;

use fixed_map::Key as FixedKey;
use fixed_map::Map as FixedMap;

use crate::error::{Error, Result};
use crate::linspace::Linspace;
use crate::membership::MembershipFunction;

/// A fuzzy input or output axis: a discretized universe plus one membership
/// function per linguistic label.
///
/// The universe is half-open (the configured upper bound is excluded), so
/// crisp values are clamped to `[min, last sample]` before evaluation.
pub struct FuzzyVariable<K: FixedKey> {
    universe: Vec<f64>,
    min_u: f64,
    max_u: f64,
    functions: FixedMap<K, MembershipFunction>,
    terms: FixedMap<K, Vec<f64>>,
}

impl<K: FixedKey + Copy> FuzzyVariable<K> {
    pub fn new(
        range: Range<f64>,
        step: f64,
        functions: impl IntoIterator<Item = (K, MembershipFunction)>,
    ) -> Result<Self> {
        if !range.start.is_finite() || !range.end.is_finite() || range.end <= range.start {
            return Err(Error::config(format!(
                "universe range must be finite and non-empty; got {}..{}",
                range.start, range.end
            )));
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::config(format!("universe step must be positive; got {step}")));
        }

        let universe: Vec<f64> = Linspace::arange(range.start, range.end, step).collect();
        let min_u = universe[0];
        let max_u = *universe.last().unwrap_or(&min_u);
        let mut this = Self {
            universe,
            min_u,
            max_u,
            functions: FixedMap::new(),
            terms: FixedMap::new(),
        };

        for (label, function) in functions {
            function.validate()?;
            this.terms.insert(label, function.sample(&this.universe));
            this.functions.insert(label, function);
        }

        if this.terms.is_empty() {
            return Err(Error::config("a fuzzy variable needs at least one labeled term"));
        }

        Ok(this)
    }

    /// Degree of membership of `x` in the set named by `label`; zero for an
    /// unknown label.
    pub fn degree(&self, label: K, x: f64) -> f64 {
        self.functions.get(label).map_or(0.0, |f| f.degree(x))
    }

    /// The membership curve sampled over the universe.
    pub(crate) fn term(&self, label: K) -> Option<&[f64]> {
        self.terms.get(label).map(Vec::as_slice)
    }

    pub fn contains(&self, label: K) -> bool {
        self.functions.contains_key(label)
    }

    /// Clamps a crisp value into the discretized universe.
    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min_u, self.max_u)
    }

    pub fn universe(&self) -> &[f64] {
        &self.universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, Eq, Hash, fixed_map::Key, Ord, PartialEq, PartialOrd)]
    enum Level {
        Low,
        High,
    }

    fn make_var() -> FuzzyVariable<Level> {
        FuzzyVariable::new(
            -1.0..1.0,
            0.1,
            [
                (Level::Low, MembershipFunction::triangular(-1.0, -0.5, 0.0)),
                (Level::High, MembershipFunction::triangular(0.0, 0.5, 1.0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_degree_lookup() {
        let var = make_var();

        assert_eq!(var.degree(Level::Low, -0.5), 1.0);
        assert_eq!(var.degree(Level::High, -0.5), 0.0);
        assert_eq!(var.degree(Level::High, 0.25), 0.5);
    }

    #[test]
    fn test_clamp_to_half_open_universe() {
        let var = make_var();

        assert_eq!(var.clamp(-3.0), -1.0);
        assert!(var.clamp(3.0) < 1.0);
        assert_eq!(var.clamp(0.3), 0.3);
    }

    #[test]
    fn test_terms_sampled_over_universe() {
        let var = make_var();

        let low = var.term(Level::Low).unwrap();

        assert_eq!(low.len(), var.universe().len());
        assert!((low[5] - 1.0).abs() < 1e-9); // universe sample at -0.5
    }

    #[test]
    fn test_rejects_bad_config() {
        let tri = MembershipFunction::triangular(-1.0, 0.0, 1.0);

        assert!(FuzzyVariable::<Level>::new(1.0..-1.0, 0.1, [(Level::Low, tri)]).is_err());
        assert!(FuzzyVariable::<Level>::new(-1.0..1.0, 0.0, [(Level::Low, tri)]).is_err());
        assert!(FuzzyVariable::<Level>::new(-1.0..1.0, 0.1, std::iter::empty()).is_err());
        assert!(
            FuzzyVariable::new(-1.0..1.0, 0.1, [(Level::Low, MembershipFunction::gaussian(0.0, 0.0))]).is_err()
        );
    }
}
