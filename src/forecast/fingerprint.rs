//! Content hashing of forecast inputs.

use sha2::{Digest, Sha256};

use crate::domain::{RiskThresholds, TimeSeries};

/// Everything that changes the outcome of a forecast. The node filter is not part of
/// it: single-node requests reuse the whole-network result.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub model_digest: &'a str,
    pub target_series: &'a str,
    pub series: &'a TimeSeries,
    pub duration_hours: u32,
    pub step_minutes: u32,
    pub thresholds: &'a RiskThresholds,
}

pub fn compute_fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut hasher = Sha256::new();

    update_str(&mut hasher, input.model_digest);
    update_str(&mut hasher, input.target_series);
    hasher.update(input.duration_hours.to_le_bytes());
    hasher.update(input.step_minutes.to_le_bytes());
    hasher.update(input.thresholds.warning_margin.to_bits().to_le_bytes());
    hasher.update(input.thresholds.watch_margin.to_bits().to_le_bytes());

    hasher.update((input.series.len() as u64).to_le_bytes());
    for s in input.series.samples() {
        hasher.update(s.minute.to_bits().to_le_bytes());
        hasher.update(s.value.to_bits().to_le_bytes());
    }

    format!("{:x}", hasher.finalize())
}

fn update_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> TimeSeries {
        TimeSeries::from_pairs([(0.0, 1.0), (60.0, 2.5)]).unwrap()
    }

    fn thresholds() -> RiskThresholds {
        RiskThresholds {
            warning_margin: 0.3,
            watch_margin: 1.0,
        }
    }

    fn input<'a>(series: &'a TimeSeries, thresholds: &'a RiskThresholds) -> FingerprintInput<'a> {
        FingerprintInput {
            model_digest: "abc",
            target_series: "Inflow_A",
            series,
            duration_hours: 24,
            step_minutes: 15,
            thresholds,
        }
    }

    #[test]
    fn test_hash_stability() {
        let (s, t) = (series(), thresholds());
        let a = compute_fingerprint(&input(&s, &t));
        let b = compute_fingerprint(&input(&s, &t));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_differs_for_different_inputs() {
        let (s, t) = (series(), thresholds());
        let base = compute_fingerprint(&input(&s, &t));

        let other = TimeSeries::from_pairs([(0.0, 1.0), (60.0, 2.6)]).unwrap();
        assert_ne!(base, compute_fingerprint(&input(&other, &t)));

        let wider = RiskThresholds {
            warning_margin: 0.3,
            watch_margin: 1.5,
        };
        assert_ne!(base, compute_fingerprint(&input(&s, &wider)));

        let mut longer = input(&s, &t);
        longer.duration_hours = 48;
        assert_ne!(base, compute_fingerprint(&longer));

        let mut renamed = input(&s, &t);
        renamed.target_series = "Inflow_B";
        assert_ne!(base, compute_fingerprint(&renamed));

        let mut reloaded = input(&s, &t);
        reloaded.model_digest = "abd";
        assert_ne!(base, compute_fingerprint(&reloaded));
    }
}
