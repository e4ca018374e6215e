use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Spatial relational operator for bounding-box queries. The row geometry is
/// the subject and the query rectangle the object: `Within` selects rows whose
/// geometry lies within the rectangle.
///
/// An unrecognized mode is an input-validation failure, never a silent
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    Within,
    Contains,
    Intersects,
    Touches,
    Overlaps,
    Crosses,
    Disjoint,
    Equals,
}

impl ComparisonMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonMode::Within => "within",
            ComparisonMode::Contains => "contains",
            ComparisonMode::Intersects => "intersects",
            ComparisonMode::Touches => "touches",
            ComparisonMode::Overlaps => "overlaps",
            ComparisonMode::Crosses => "crosses",
            ComparisonMode::Disjoint => "disjoint",
            ComparisonMode::Equals => "equals",
        }
    }
}

impl FromStr for ComparisonMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "within" => Ok(ComparisonMode::Within),
            "contains" => Ok(ComparisonMode::Contains),
            "intersects" => Ok(ComparisonMode::Intersects),
            "touches" => Ok(ComparisonMode::Touches),
            "overlaps" => Ok(ComparisonMode::Overlaps),
            "crosses" => Ok(ComparisonMode::Crosses),
            "disjoint" => Ok(ComparisonMode::Disjoint),
            "equals" => Ok(ComparisonMode::Equals),
            other => Err(Error::invalid_argument(format!(
                "unknown comparison mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an additional filter clause combines with the bounding-box predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombineOp {
    #[default]
    And,
    Or,
}

impl FromStr for CombineOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(CombineOp::And),
            "OR" => Ok(CombineOp::Or),
            other => Err(Error::invalid_argument(format!(
                "unknown combine operator '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_modes() {
        for (s, mode) in [
            ("within", ComparisonMode::Within),
            ("contains", ComparisonMode::Contains),
            ("intersects", ComparisonMode::Intersects),
            ("touches", ComparisonMode::Touches),
            ("overlaps", ComparisonMode::Overlaps),
            ("crosses", ComparisonMode::Crosses),
            ("disjoint", ComparisonMode::Disjoint),
            ("equals", ComparisonMode::Equals),
        ] {
            assert_eq!(s.parse::<ComparisonMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode_is_invalid_argument() {
        let err = "bogus".parse::<ComparisonMode>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_combine_op_case_insensitive() {
        assert_eq!("and".parse::<CombineOp>().unwrap(), CombineOp::And);
        assert_eq!("OR".parse::<CombineOp>().unwrap(), CombineOp::Or);
        assert!("XOR".parse::<CombineOp>().is_err());
    }
}
