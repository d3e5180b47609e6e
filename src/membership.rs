use crate::error::{Error, Result};
use crate::math::interp;

/// A membership function over one axis, mapping a crisp value to a degree of
/// truth in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MembershipFunction {
    /// Zero at `a` and `c`, one at `b`, linear in between.
    Triangular { a: f64, b: f64, c: f64 },
    /// `exp(-(x - center)^2 / (2 width^2))`
    Gaussian { center: f64, width: f64 },
}

impl MembershipFunction {
    pub fn triangular(a: f64, b: f64, c: f64) -> Self {
        MembershipFunction::Triangular { a, b, c }
    }

    pub fn gaussian(center: f64, width: f64) -> Self {
        MembershipFunction::Gaussian { center, width }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            MembershipFunction::Triangular { a, b, c } => {
                if !(a.is_finite() && b.is_finite() && c.is_finite()) || a >= b || b >= c {
                    return Err(Error::config(format!(
                        "triangular breakpoints must satisfy a < b < c; got ({a}, {b}, {c})"
                    )));
                }
            },
            MembershipFunction::Gaussian { center, width } => {
                if !center.is_finite() || !width.is_finite() || width <= 0.0 {
                    return Err(Error::config(format!(
                        "gaussian width must be finite and positive; got center {center}, width {width}"
                    )));
                }
            },
        }

        Ok(())
    }

    /// Degree of membership of `x`.
    pub fn degree(&self, x: f64) -> f64 {
        match *self {
            MembershipFunction::Triangular { a, b, c } => {
                if x == b {
                    1.0
                } else if x <= a || x >= c {
                    0.0
                } else if x < b {
                    (x - a) / (b - a)
                } else {
                    (c - x) / (c - b)
                }
            },
            MembershipFunction::Gaussian { center, width } => {
                let u = (x - center) / width;

                (-0.5 * u * u).exp()
            },
        }
    }

    /// Samples the function onto a discretized universe.
    pub(crate) fn sample(&self, universe: &[f64]) -> Vec<f64> {
        match *self {
            // A triangle is exactly its piecewise-linear interpolation through
            // the three breakpoints.
            MembershipFunction::Triangular { a, b, c } => {
                interp(universe, [(a, 0.0), (b, 1.0), (c, 0.0)])
            },
            MembershipFunction::Gaussian { .. } => universe.iter().map(|&x| self.degree(x)).collect(),
        }
    }
}

#[test]
fn test_triangular_degrees() {
    let tri = MembershipFunction::triangular(-1.0, 0.0, 2.0);

    assert_eq!(tri.degree(-1.0), 0.0);
    assert_eq!(tri.degree(0.0), 1.0);
    assert_eq!(tri.degree(2.0), 0.0);
    assert_eq!(tri.degree(-0.5), 0.5);
    assert_eq!(tri.degree(1.0), 0.5);
    assert_eq!(tri.degree(-3.0), 0.0);
    assert_eq!(tri.degree(5.0), 0.0);
}

#[test]
fn test_gaussian_degrees() {
    let g = MembershipFunction::gaussian(1.0, 0.5);

    assert_eq!(g.degree(1.0), 1.0);
    assert!((g.degree(1.5) - (-0.5f64).exp()).abs() < 1e-12);
    assert!(g.degree(10.0) < 1e-9);
}

#[test]
fn test_sample_matches_degree() {
    let universe = [-2.0, -1.0, -0.5, 0.0, 1.0, 2.0, 3.0];
    let tri = MembershipFunction::triangular(-1.0, 0.0, 2.0);
    let sampled = tri.sample(&universe);

    for (&x, &s) in universe.iter().zip(&sampled) {
        assert!((s - tri.degree(x)).abs() < 1e-12);
    }
}

#[test]
fn test_validation_rejects_degenerate_shapes() {
    assert!(MembershipFunction::triangular(1.0, 0.0, 2.0).validate().is_err());
    assert!(MembershipFunction::triangular(0.0, 0.0, 0.0).validate().is_err());
    assert!(MembershipFunction::gaussian(0.0, 0.0).validate().is_err());
    assert!(MembershipFunction::gaussian(0.0, -1.0).validate().is_err());
    assert!(MembershipFunction::gaussian(f64::NAN, 1.0).validate().is_err());

    assert!(MembershipFunction::triangular(-1.0, 0.0, 1.0).validate().is_ok());
    assert!(MembershipFunction::gaussian(0.0, 0.3).validate().is_ok());
}
