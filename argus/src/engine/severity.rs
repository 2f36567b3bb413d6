// argus/src/engine/severity.rs
//
// Score → severity. Thresholds are checked strictly in descending order and
// each is inclusive at its lower bound. Anything below the last threshold,
// NaN included, is Low.

use crate::events::Severity;

const THRESHOLDS: &[(f64, Severity)] = &[
    (0.80, Severity::Critical),
    (0.65, Severity::High),
    (0.50, Severity::Medium),
];

pub fn classify(score: f64) -> Severity {
    THRESHOLDS
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive_at_the_lower_end() {
        assert_eq!(classify(0.8),  Severity::Critical);
        assert_eq!(classify(0.65), Severity::High);
        assert_eq!(classify(0.5),  Severity::Medium);
    }

    #[test]
    fn just_below_each_boundary_drops_a_tier() {
        assert_eq!(classify(0.799_999), Severity::High);
        assert_eq!(classify(0.649_999), Severity::Medium);
        assert_eq!(classify(0.499_999), Severity::Low);
    }

    #[test]
    fn total_over_out_of_range_inputs() {
        assert_eq!(classify(1.0),               Severity::Critical);
        assert_eq!(classify(7.5),               Severity::Critical);
        assert_eq!(classify(f64::INFINITY),     Severity::Critical);
        assert_eq!(classify(0.0),               Severity::Low);
        assert_eq!(classify(-3.0),              Severity::Low);
        assert_eq!(classify(f64::NEG_INFINITY), Severity::Low);
        assert_eq!(classify(f64::NAN),          Severity::Low);
    }

    #[test]
    fn sweep_matches_range_definition() {
        for i in 0..=1000 {
            let s = i as f64 / 1000.0;
            let expected = if s >= 0.8 {
                Severity::Critical
            } else if s >= 0.65 {
                Severity::High
            } else if s >= 0.5 {
                Severity::Medium
            } else {
                Severity::Low
            };
            assert_eq!(classify(s), expected, "score {}", s);
        }
    }
}
