use std::fmt;

use serde::{Serialize, Serializer};

/// A quotient that may have no meaningful value.
///
/// Profit factor and the performance multiplier are undefined whenever their
/// denominator is zero. Instead of leaking `inf` or `NaN` into reports, the
/// value is tagged: [`Ratio::Undefined`] renders as `N/A` and serializes as
/// `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Ratio {
    Value(f64),
    #[default]
    Undefined,
}

impl Ratio {
    /// Divides `numerator` by `denominator`, yielding `Undefined` on a zero or
    /// non-finite result.
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            return Self::Undefined;
        }
        let value = numerator / denominator;
        if value.is_finite() {
            Self::Value(value)
        } else {
            Self::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl From<Option<f64>> for Ratio {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Self::Value(v),
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => match f.precision() {
                Some(p) => write!(f, "{v:.p$}"),
                None => write!(f, "{v:.2}"),
            },
            Self::Undefined => f.write_str("N/A"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::Undefined => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_of() {
        assert_eq!(Ratio::of(300.0, 50.0), Ratio::Value(6.0));
        assert_eq!(Ratio::of(0.0, 30.0), Ratio::Value(0.0));
        assert_eq!(Ratio::of(300.0, 0.0), Ratio::Undefined);
        assert_eq!(Ratio::of(0.0, 0.0), Ratio::Undefined);
    }

    #[test]
    fn test_ratio_from_nullable_value() {
        assert_eq!(Ratio::from(Some(1.5)), Ratio::Value(1.5));
        assert_eq!(Ratio::from(None), Ratio::Undefined);
        assert_eq!(Ratio::from(Some(f64::INFINITY)), Ratio::Undefined);
        assert_eq!(Ratio::from(Some(f64::NAN)), Ratio::Undefined);
    }

    #[test]
    fn test_ratio_rendering() {
        assert_eq!(Ratio::Value(6.0).to_string(), "6.00");
        assert_eq!(format!("{:.1}", Ratio::Value(2.345)), "2.3");
        assert_eq!(Ratio::Undefined.to_string(), "N/A");
    }

    #[test]
    fn test_ratio_serialization() {
        let defined = serde_json::to_value(Ratio::Value(6.0)).expect("Failed to serialize");
        assert_eq!(defined, serde_json::json!(6.0));

        let undefined = serde_json::to_value(Ratio::Undefined).expect("Failed to serialize");
        assert!(undefined.is_null());
    }
}
