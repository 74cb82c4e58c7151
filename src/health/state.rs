use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete classification of the in-game vitality bar.
///
/// Ordered by severity: `Full` is safest, `Dead` most severe. The ordering
/// exists for monitoring comparisons only; classification itself is
/// rule-based, not numeric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum HealthState {
    Full = 0,
    Half = 1,
    Critical = 2,
    Dead = 3,
}

impl HealthState {
    /// Wire representation, matching the overlay protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Full => "FULL",
            HealthState::Half => "HALF",
            HealthState::Critical => "CRITICAL",
            HealthState::Dead => "DEAD",
        }
    }

    pub(crate) fn from_u8(value: u8) -> HealthState {
        match value {
            0 => HealthState::Full,
            1 => HealthState::Half,
            2 => HealthState::Critical,
            _ => HealthState::Dead,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        HealthState::Full
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(HealthState::Full < HealthState::Half);
        assert!(HealthState::Half < HealthState::Critical);
        assert!(HealthState::Critical < HealthState::Dead);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_string(&HealthState::Critical).unwrap(),
            "\"CRITICAL\""
        );
        let parsed: HealthState = serde_json::from_str("\"HALF\"").unwrap();
        assert_eq!(parsed, HealthState::Half);
    }

    #[test]
    fn test_u8_round_trip() {
        for state in [
            HealthState::Full,
            HealthState::Half,
            HealthState::Critical,
            HealthState::Dead,
        ] {
            assert_eq!(HealthState::from_u8(state as u8), state);
        }
    }
}
