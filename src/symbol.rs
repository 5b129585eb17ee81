//! Flannery appearance compensation for proportional circles.
//!
//! Perceived circle area grows slower than true area, so radii are scaled with
//! an exponent of 0.5715 instead of the 0.5 a strictly area-proportional
//! symbol would use.

use thiserror::Error;

pub const FLANNERY_SCALE: f64 = 1.0083;
pub const FLANNERY_EXPONENT: f64 = 0.5715;
/// Radius (in pixels) of the symbol drawn for a family's minimum value.
pub const DEFAULT_BASE_RADIUS: f64 = 5.0;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SymbolError {
    #[error("family minimum must be positive, got {0}")]
    InvalidMinimum(f64),
    #[error("attribute value must be non-negative, got {0}")]
    InvalidValue(f64),
}

/// Radius of the circle encoding `value`, relative to the smallest value of its family.
///
/// `radius(min, min, r)` is `1.0083 * r`.
pub fn radius(value: f64, family_minimum: f64, base_radius: f64) -> Result<f64, SymbolError> {
    if !(family_minimum.is_finite() && family_minimum > 0.0) {
        return Err(SymbolError::InvalidMinimum(family_minimum));
    }
    if !(value.is_finite() && value >= 0.0) {
        return Err(SymbolError::InvalidValue(value));
    }
    Ok(FLANNERY_SCALE * (value / family_minimum).powf(FLANNERY_EXPONENT) * base_radius)
}

/// [`radius`] with the default 5px base radius.
pub fn default_radius(value: f64, family_minimum: f64) -> Result<f64, SymbolError> {
    radius(value, family_minimum, DEFAULT_BASE_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn three_times_the_minimum() {
        let r = radius(150.0, 50.0, 5.0).unwrap();
        let expected = 1.0083 * 3f64.powf(0.5715) * 5.0;
        assert!((r - expected).abs() < 1e-12);
        assert!((r - 9.4457).abs() < 1e-3);
    }

    #[test]
    fn zero_value_is_zero_radius() {
        assert_eq!(default_radius(0.0, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn rejects_non_positive_minimum() {
        for min in [0.0, -0.0, -1.0, -250.5, f64::NAN] {
            assert!(matches!(radius(10.0, min, 5.0), Err(SymbolError::InvalidMinimum(_))));
        }
    }

    #[test]
    fn rejects_negative_value() {
        assert_eq!(radius(-1.0, 10.0, 5.0), Err(SymbolError::InvalidValue(-1.0)));
        assert!(matches!(radius(f64::NAN, 10.0, 5.0), Err(SymbolError::InvalidValue(_))));
        assert!(matches!(radius(f64::INFINITY, 10.0, 5.0), Err(SymbolError::InvalidValue(_))));
    }

    proptest! {
        #[test]
        fn minimum_maps_to_scaled_base(min in 1e-6f64..1e9, base in 0.5f64..50.0) {
            let r = radius(min, min, base).unwrap();
            prop_assert!((r - FLANNERY_SCALE * base).abs() < 1e-9 * base.max(1.0));
        }

        #[test]
        fn monotonic_in_value(min in 1e-3f64..1e6, a in 0f64..1e9, b in 0f64..1e9) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let r_lo = default_radius(lo, min).unwrap();
            let r_hi = default_radius(hi, min).unwrap();
            prop_assert!(r_lo <= r_hi);
            prop_assert!(r_lo >= 0.0);
        }

        #[test]
        fn non_positive_minimum_always_fails(min in -1e9f64..=0.0, value in 0f64..1e9) {
            prop_assert_eq!(radius(value, min, 5.0), Err(SymbolError::InvalidMinimum(min)));
        }
    }
}
