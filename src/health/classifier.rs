use crate::config::ClassifierConfig;
use crate::health::HealthState;

/// An 8-bit RGB color sampled from a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(channels: [u8; 3]) -> Self {
        Self::new(channels[0], channels[1], channels[2])
    }
}

/// The three probe colors of a single frame: outer (A), middle (B) and
/// inner (C) segment of the vitality bar. Constructed fresh per
/// classification call.
#[derive(Debug, Clone, Copy)]
pub struct PixelSample {
    pub outer: Rgb,
    pub middle: Rgb,
    pub inner: Rgb,
}

/// Rule-based mapper from three probe colors to a health state.
///
/// Each probe is compared against two reference colors, the drawn bar
/// segment and the drained background, within a per-channel absolute
/// tolerance. Side-effect free and safe to call concurrently.
#[derive(Debug, Clone)]
pub struct PixelClassifier {
    bar_present: Rgb,
    bar_absent: Rgb,
    tolerance: u8,
}

impl PixelClassifier {
    pub fn new(bar_present: Rgb, bar_absent: Rgb, tolerance: u8) -> Self {
        Self {
            bar_present,
            bar_absent,
            tolerance,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            config.bar_present.into(),
            config.bar_absent.into(),
            config.tolerance,
        )
    }

    /// Classify a sample triple, falling back to `previous` when no rule
    /// matches.
    ///
    /// The rules are ordered by priority, first match wins:
    /// 1. inner segment drawn            -> Full
    /// 2. inner drained, middle drawn    -> Half
    /// 3. middle drained, outer drawn    -> Critical
    /// 4. outer drained                  -> Dead
    /// 5. otherwise the frame is noise or mid-transition; hold the last
    ///    known state rather than guessing.
    pub fn classify(&self, sample: &PixelSample, previous: HealthState) -> HealthState {
        if self.matches(sample.inner, self.bar_present) {
            HealthState::Full
        } else if self.matches(sample.inner, self.bar_absent)
            && self.matches(sample.middle, self.bar_present)
        {
            HealthState::Half
        } else if self.matches(sample.middle, self.bar_absent)
            && self.matches(sample.outer, self.bar_present)
        {
            HealthState::Critical
        } else if self.matches(sample.outer, self.bar_absent) {
            HealthState::Dead
        } else {
            previous
        }
    }

    /// All three channels must independently fall within the tolerance.
    fn matches(&self, color: Rgb, reference: Rgb) -> bool {
        color.r.abs_diff(reference.r) <= self.tolerance
            && color.g.abs_diff(reference.g) <= self.tolerance
            && color.b.abs_diff(reference.b) <= self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESENT: Rgb = Rgb::new(0, 0, 111);
    const ABSENT: Rgb = Rgb::new(12, 12, 12);
    const NOISE: Rgb = Rgb::new(128, 128, 128);

    fn classifier() -> PixelClassifier {
        PixelClassifier::new(PRESENT, ABSENT, 15)
    }

    fn sample(outer: Rgb, middle: Rgb, inner: Rgb) -> PixelSample {
        PixelSample {
            outer,
            middle,
            inner,
        }
    }

    const ALL_STATES: [HealthState; 4] = [
        HealthState::Full,
        HealthState::Half,
        HealthState::Critical,
        HealthState::Dead,
    ];

    #[test]
    fn test_full_when_inner_segment_drawn() {
        for previous in ALL_STATES {
            assert_eq!(
                classifier().classify(&sample(PRESENT, PRESENT, PRESENT), previous),
                HealthState::Full
            );
        }
    }

    #[test]
    fn test_half_when_inner_drained_middle_drawn() {
        for previous in ALL_STATES {
            assert_eq!(
                classifier().classify(&sample(PRESENT, PRESENT, ABSENT), previous),
                HealthState::Half
            );
        }
    }

    #[test]
    fn test_critical_when_only_outer_drawn() {
        for previous in ALL_STATES {
            assert_eq!(
                classifier().classify(&sample(PRESENT, ABSENT, ABSENT), previous),
                HealthState::Critical
            );
        }
    }

    #[test]
    fn test_dead_when_outer_drained() {
        for previous in ALL_STATES {
            assert_eq!(
                classifier().classify(&sample(ABSENT, ABSENT, ABSENT), previous),
                HealthState::Dead
            );
        }
    }

    #[test]
    fn test_unmatched_sample_holds_previous_state() {
        // A transition frame that matches neither reference color anywhere
        for previous in ALL_STATES {
            assert_eq!(
                classifier().classify(&sample(NOISE, NOISE, NOISE), previous),
                previous
            );
        }

        // Middle segment drawn but inner unreadable: rules 1-4 all miss
        assert_eq!(
            classifier().classify(&sample(NOISE, PRESENT, NOISE), HealthState::Half),
            HealthState::Half
        );
    }

    #[test]
    fn test_rule_order_encodes_priority() {
        // Inner segment drawn wins even when outer probes look drained
        assert_eq!(
            classifier().classify(&sample(ABSENT, ABSENT, PRESENT), HealthState::Dead),
            HealthState::Full
        );
    }

    #[test]
    fn test_tolerance_boundary() {
        let c = classifier();

        // Exactly at tolerance on every channel still matches
        let at_edge = Rgb::new(15, 15, 126);
        assert_eq!(
            c.classify(&sample(ABSENT, ABSENT, at_edge), HealthState::Dead),
            HealthState::Full
        );

        // One channel past tolerance breaks the match
        let past_edge = Rgb::new(15, 16, 111);
        assert_eq!(
            c.classify(&sample(NOISE, NOISE, past_edge), HealthState::Half),
            HealthState::Half
        );
    }
}
