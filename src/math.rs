use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use num::Float;

/// Similar to numpy.interp
pub(crate) fn interp<F>(x_input: &[F], coords: impl IntoIterator<Item = (F, F)> + Clone) -> Vec<F>
where
    F: Add + Float + Mul + Sub,
{
    x_input
        .iter()
        .copied()
        .map(|x| {
            let mut iter = coords.clone().into_iter().enumerate().peekable();

            while let Some((i, (x1, y1))) = iter.next() {
                // Base cases
                if i == 0 && x < x1 {
                    return y1;
                }
                if iter.peek().is_none() && x > x1 {
                    return y1;
                }

                let Some(&(_, (x2, y2))) = iter.peek() else {
                    continue;
                };

                // Actual interpolation
                if x1 <= x && x <= x2 {
                    let y = y1 + (x - x1) * (y2 - y1) / (x2 - x1);

                    return y;
                }
            }

            unreachable!()
        })
        .collect()
}

/// Center-of-gravity defuzzification over a sampled membership curve.
///
/// Decomposes each universe segment into a rectangle plus a triangle and
/// takes the area-weighted mean of the segment centroids. Returns `None`
/// when the curve carries no area, i.e. no rule fired above the
/// discretization resolution.
pub(crate) fn centroid<F: Float + Sum>(universe: &[F], membership: &[F]) -> Option<F> {
    debug_assert_eq!(universe.len(), membership.len());

    if universe.len() < 2 {
        return None;
    }

    let n_areas = universe.len() - 1;
    let mut areas = Vec::with_capacity(n_areas);
    let mut centroids = Vec::with_capacity(n_areas);
    let two = F::one() + F::one();
    let three = two + F::one();

    for i in 0..n_areas {
        let base = universe[i + 1] - universe[i];
        let area_rect = F::min(membership[i], membership[i + 1]) * base;
        let center_rect = universe[i] + base / two;
        let (area_tria, center_tri) = if membership[i + 1] == membership[i] {
            (F::zero(), F::zero())
        } else if membership[i + 1] > membership[i] {
            (
                base * F::abs(membership[i + 1] - membership[i]) / two,
                universe[i] + two / three * base,
            )
        } else {
            (
                base * F::abs(membership[i + 1] - membership[i]) / two,
                universe[i] + F::one() / three * base,
            )
        };
        let area = area_rect + area_tria;
        let center = if area == F::zero() {
            F::zero()
        } else {
            (area_rect * center_rect + area_tria * center_tri) / area
        };

        areas.push(area);
        centroids.push(center);
    }

    let den = areas.iter().copied().sum::<F>();

    if den == F::zero() {
        return None;
    }

    let num = areas
        .into_iter()
        .zip(centroids)
        .map(|(area, cent)| area * cent)
        .sum::<F>();

    Some(num / den)
}

#[test]
fn test_interp() {
    let x = [0., 1., 1.5, 2.72, 3.24];
    let xs = [1., 2., 3.];
    let ys = [3., 2., 0.];

    assert_eq!(
        interp(&x, xs.into_iter().zip(ys.into_iter())),
        vec![3., 3., 2.5, 0.5599999999999996, 0.]
    );

    let x = [2.5, -1., 7.5];
    let xs = [0., 1., 2., 3., 4.5];
    let ys = [0., 2., 5., 3., 2.];

    assert_eq!(interp(&x, xs.into_iter().zip(ys.into_iter())), vec![4., 0., 2.]);
}

#[test]
fn test_centroid_symmetric_triangle() {
    let universe = [-2.0, -1.0, 0.0, 1.0, 2.0];
    let membership = [0.0, 0.5, 1.0, 0.5, 0.0];

    let c = centroid(&universe, &membership).unwrap();

    assert!(c.abs() < 1e-12);
}

#[test]
fn test_centroid_empty_activation() {
    let universe = [0.0, 1.0, 2.0];
    let membership = [0.0, 0.0, 0.0];

    assert_eq!(centroid(&universe, &membership), None);
}

#[test]
fn test_centroid_offset_plateau() {
    let universe = [0.0, 1.0, 2.0, 3.0];
    let membership = [0.0, 1.0, 1.0, 0.0];

    let c = centroid(&universe, &membership).unwrap();

    assert!((c - 1.5).abs() < 1e-12);
}
