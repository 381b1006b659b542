/// Linear rescale of `value` from [lo, hi] to [0, 1], clamped.
/// A degenerate range maps everything to 0.
pub fn minmax(value: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    if span == 0.0 {
        return 0.0;
    }
    ((value - lo) / span).clamp(0.0, 1.0)
}

/// Logistic curve `1 / (1 + e^(-gain (x - center)))`.
pub fn sigmoid(x: f64, gain: f64, center: f64) -> f64 {
    let exponent = (-gain * (x - center)).clamp(-500.0, 500.0);
    1.0 / (1.0 + exponent.exp())
}

/// Maps a raw metric to a probability of fake, 0.5 exactly at `threshold`.
///
/// The distance to the threshold is scaled relative to the threshold itself,
/// so the curve is equally steep for metrics of different magnitudes.
pub fn calibrate(raw: f64, threshold: f64, higher_is_fake: bool) -> f64 {
    let scale = if threshold != 0.0 { threshold } else { 1.0 };
    let delta = if higher_is_fake {
        raw - threshold
    } else {
        threshold - raw
    };
    sigmoid(delta / scale, 5.0, 0.0)
}

/// Rule turning one raw signal value into a normalized risk in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Value already is a probability of fake.
    Probability,
    /// Risk 0 when value > threshold, otherwise 1.
    OkAbove(f64),
    /// Risk 0 when value < threshold, otherwise 1.
    OkBelow(f64),
    /// Higher raw values are better: `1 - minmax(value, lo, hi)`.
    InvertedMinMax { lo: f64, hi: f64 },
    /// Higher raw values are riskier, soft threshold at the given point.
    Sigmoid { threshold: f64 },
}

impl Normalization {
    pub fn risk(&self, value: f64) -> f64 {
        let risk = match *self {
            Normalization::Probability => value,
            Normalization::OkAbove(t) => {
                if value > t {
                    0.0
                } else {
                    1.0
                }
            }
            Normalization::OkBelow(t) => {
                if value < t {
                    0.0
                } else {
                    1.0
                }
            }
            Normalization::InvertedMinMax { lo, hi } => 1.0 - minmax(value, lo, hi),
            Normalization::Sigmoid { threshold } => calibrate(value, threshold, true),
        };
        risk.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minmax_clamps_and_handles_zero_span() {
        assert_eq!(minmax(100.0, 0.0, 200.0), 0.5);
        assert_eq!(minmax(500.0, 0.0, 200.0), 1.0);
        assert_eq!(minmax(-5.0, 0.0, 200.0), 0.0);
        assert_eq!(minmax(3.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_sigmoid_center_and_saturation() {
        assert!((sigmoid(0.4, 10.0, 0.4) - 0.5).abs() < 1e-12);
        assert!(sigmoid(1e6, 1.0, 0.0) > 0.999);
        assert!(sigmoid(-1e6, 1.0, 0.0) < 0.001);
    }

    #[test]
    fn test_calibrate_direction() {
        assert!((calibrate(0.4, 0.4, true) - 0.5).abs() < 1e-12);
        assert!(calibrate(0.8, 0.4, true) > 0.9);
        assert!(calibrate(0.8, 0.4, false) < 0.1);
    }

    #[test]
    fn test_boolean_rules() {
        assert_eq!(Normalization::OkAbove(0.5).risk(0.9), 0.0);
        assert_eq!(Normalization::OkAbove(0.5).risk(0.5), 1.0);
        assert_eq!(Normalization::OkBelow(0.4).risk(0.1), 0.0);
        assert_eq!(Normalization::OkBelow(0.4).risk(0.7), 1.0);
    }

    #[test]
    fn test_inverted_minmax_blur() {
        let rule = Normalization::InvertedMinMax { lo: 0.0, hi: 200.0 };
        assert!((rule.risk(150.0) - 0.25).abs() < 1e-12);
        assert_eq!(rule.risk(400.0), 0.0);
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(Normalization::Probability.risk(1.3), 1.0);
        assert_eq!(Normalization::Probability.risk(-0.2), 0.0);
    }
}
