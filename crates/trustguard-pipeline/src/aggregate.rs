use serde::{Deserialize, Serialize};

/// How per-frame deepfake probabilities collapse into one video score.
///
/// `Mean` is the default. `P90` is less sensitive to a few clean frames
/// diluting a partially manipulated clip and is the better production
/// choice; `Max` flags a clip on its single worst frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameAggregation {
    #[default]
    Mean,
    Max,
    P90,
}

impl FrameAggregation {
    /// Aggregates `scores`, ignoring non-finite entries. None if nothing is left.
    pub fn aggregate(&self, scores: &[f64]) -> Option<f64> {
        let mut values: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let result = match self {
            FrameAggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            FrameAggregation::Max => values.iter().copied().fold(f64::MIN, f64::max),
            FrameAggregation::P90 => {
                values.sort_by(f64::total_cmp);
                percentile_sorted(&values, 0.9)
            }
        };
        Some(result)
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCORES: [f64; 5] = [0.1, 0.2, 0.15, 0.8, 0.12];

    #[test]
    fn test_mean() {
        let m = FrameAggregation::Mean.aggregate(&SCORES).unwrap();
        assert!((m - 0.274).abs() < 1e-9);
    }

    #[test]
    fn test_max() {
        assert_eq!(FrameAggregation::Max.aggregate(&SCORES), Some(0.8));
    }

    #[test]
    fn test_p90_interpolates() {
        let p = FrameAggregation::P90.aggregate(&SCORES).unwrap();
        assert!((p - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_single_value_p90() {
        assert_eq!(FrameAggregation::P90.aggregate(&[0.3]), Some(0.3));
    }

    #[test]
    fn test_empty_and_nan() {
        assert_eq!(FrameAggregation::Mean.aggregate(&[]), None);
        assert_eq!(FrameAggregation::Mean.aggregate(&[f64::NAN]), None);
        assert_eq!(FrameAggregation::Max.aggregate(&[f64::NAN, 0.4]), Some(0.4));
    }

    #[test]
    fn test_serde_lowercase() {
        let a: FrameAggregation = serde_json::from_str("\"p90\"").unwrap();
        assert_eq!(a, FrameAggregation::P90);
        assert_eq!(FrameAggregation::default(), FrameAggregation::Mean);
    }
}
