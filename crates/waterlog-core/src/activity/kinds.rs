//! Enumerations carried in an activity payload.
//!
//! All of these are stored and transmitted as their SCREAMING_SNAKE_CASE
//! names, both in SQLite and on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Kind of water-consuming activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Shower,
    Tap,
    Toilet,
    Laundry,
    Dishes,
    Garden,
    Custom,
}

impl ActivityType {
    pub const ALL: [ActivityType; 7] = [
        ActivityType::Shower,
        ActivityType::Tap,
        ActivityType::Toilet,
        ActivityType::Laundry,
        ActivityType::Dishes,
        ActivityType::Garden,
        ActivityType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Shower => "SHOWER",
            ActivityType::Tap => "TAP",
            ActivityType::Toilet => "TOILET",
            ActivityType::Laundry => "LAUNDRY",
            ActivityType::Dishes => "DISHES",
            ActivityType::Garden => "GARDEN",
            ActivityType::Custom => "CUSTOM",
        }
    }
}

impl FromStr for ActivityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "activity type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the water came from (bathing activities).
///
/// Values written by other clients that this build does not know are kept
/// verbatim in [`WaterSource::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WaterSource {
    Shower,
    BucketFaucet,
    Other(String),
}

impl WaterSource {
    pub fn as_str(&self) -> &str {
        match self {
            WaterSource::Shower => "SHOWER",
            WaterSource::BucketFaucet => "BUCKET_FAUCET",
            WaterSource::Other(raw) => raw,
        }
    }

    /// Lenient decode for stored and remote values.
    pub fn from_wire(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| WaterSource::Other(raw.to_string()))
    }
}

impl FromStr for WaterSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHOWER" => Ok(WaterSource::Shower),
            "BUCKET_FAUCET" => Ok(WaterSource::BucketFaucet),
            _ => Err(ValidationError::UnknownVariant {
                kind: "water source",
                value: s.to_string(),
            }),
        }
    }
}

impl From<String> for WaterSource {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(known) => known,
            Err(_) => WaterSource::Other(raw),
        }
    }
}

impl From<WaterSource> for String {
    fn from(source: WaterSource) -> Self {
        match source {
            WaterSource::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for WaterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tap pressure level. Unknown levels are kept in [`FlowPressure::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowPressure {
    Low,
    Normal,
    High,
    Other(String),
}

impl FlowPressure {
    pub fn as_str(&self) -> &str {
        match self {
            FlowPressure::Low => "LOW",
            FlowPressure::Normal => "NORMAL",
            FlowPressure::High => "HIGH",
            FlowPressure::Other(raw) => raw,
        }
    }

    /// Lenient decode for stored and remote values.
    pub fn from_wire(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| FlowPressure::Other(raw.to_string()))
    }
}

impl FromStr for FlowPressure {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(FlowPressure::Low),
            "NORMAL" => Ok(FlowPressure::Normal),
            "HIGH" => Ok(FlowPressure::High),
            _ => Err(ValidationError::UnknownVariant {
                kind: "flow pressure",
                value: s.to_string(),
            }),
        }
    }
}

impl From<String> for FlowPressure {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(known) => known,
            Err(_) => FlowPressure::Other(raw),
        }
    }
}

impl From<FlowPressure> for String {
    fn from(pressure: FlowPressure) -> Self {
        match pressure {
            FlowPressure::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FlowPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_type_parses_case_insensitively() {
        assert_eq!("shower".parse::<ActivityType>().unwrap(), ActivityType::Shower);
        assert_eq!("GARDEN".parse::<ActivityType>().unwrap(), ActivityType::Garden);
    }

    #[test]
    fn unknown_activity_type_is_rejected() {
        let err = "bathtub".parse::<ActivityType>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownVariant {
                kind: "activity type",
                value: "bathtub".into()
            }
        );
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&WaterSource::BucketFaucet).unwrap();
        assert_eq!(json, "\"BUCKET_FAUCET\"");
        let parsed: FlowPressure = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, FlowPressure::High);
    }

    #[test]
    fn unknown_wire_values_are_kept() {
        assert_eq!(WaterSource::from_wire("RIVER"), WaterSource::Other("RIVER".into()));
        assert_eq!(WaterSource::from_wire("shower"), WaterSource::Shower);
        assert_eq!(FlowPressure::from_wire("EXTREME").as_str(), "EXTREME");

        let parsed: FlowPressure = serde_json::from_str("\"EXTREME\"").unwrap();
        assert_eq!(parsed, FlowPressure::Other("EXTREME".into()));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"EXTREME\"");
    }

    #[test]
    fn strict_parse_still_rejects_unknown_values() {
        assert!("RIVER".parse::<WaterSource>().is_err());
        assert!("EXTREME".parse::<FlowPressure>().is_err());
    }
}
