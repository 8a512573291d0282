use thiserror::Error;

use crate::models::{Priority, PriorityComponents, PriorityLevel};

#[derive(Debug, Error)]
pub enum PriorityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

const SEVERITY_WEIGHT: f64 = 0.6;
const SENTIMENT_WEIGHT: f64 = 0.4;

/// Combine the authoritative severity and the sentiment score into a
/// priority level. Pure and deterministic.
///
/// `sentiment_risk = (1 - sentiment) / 2` normalizes the [-1,1] sentiment
/// domain into [0,1] risk, paired with the 0.75/0.55/0.35 level thresholds.
pub fn calculate_priority(
    final_severity: i64,
    severity_confidence: f64,
    sentiment_score: f64,
    sentiment_confidence: f64,
) -> Result<Priority, PriorityError> {
    if !(1..=5).contains(&final_severity) {
        return Err(PriorityError::InvalidArgument(format!(
            "final_severity must be 1-5, got {final_severity}"
        )));
    }
    if !sentiment_score.is_finite() || !(-1.0..=1.0).contains(&sentiment_score) {
        return Err(PriorityError::InvalidArgument(format!(
            "sentiment_score must be in [-1,1], got {sentiment_score}"
        )));
    }
    for (name, value) in [
        ("severity_confidence", severity_confidence),
        ("sentiment_confidence", sentiment_confidence),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(PriorityError::InvalidArgument(format!(
                "{name} must be in [0,1], got {value}"
            )));
        }
    }

    let severity_norm = final_severity as f64 / 5.0;
    let sentiment_risk = (1.0 - sentiment_score) / 2.0;
    let priority_score =
        (SEVERITY_WEIGHT * severity_norm + SENTIMENT_WEIGHT * sentiment_risk).clamp(0.0, 1.0);

    let priority_level = if priority_score >= 0.75 {
        PriorityLevel::P0
    } else if priority_score >= 0.55 {
        PriorityLevel::P1
    } else if priority_score >= 0.35 {
        PriorityLevel::P2
    } else {
        PriorityLevel::P3
    };

    Ok(Priority {
        priority_score: round2(priority_score),
        priority_level,
        components: PriorityComponents {
            severity_weighted: round2(SEVERITY_WEIGHT * severity_norm),
            sentiment_weighted: round2(SENTIMENT_WEIGHT * sentiment_risk),
        },
        confidence: round2(severity_confidence.min(sentiment_confidence)),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(severity: i64, sentiment: f64) -> Priority {
        calculate_priority(severity, 0.9, sentiment, 0.9).unwrap()
    }

    #[test]
    fn test_extremes() {
        let worst = score(5, -1.0);
        assert_eq!(worst.priority_score, 1.0);
        assert_eq!(worst.priority_level, PriorityLevel::P0);

        let best = score(1, 1.0);
        assert_eq!(best.priority_score, 0.12);
        assert_eq!(best.priority_level, PriorityLevel::P3);
    }

    #[test]
    fn test_monotonic_in_severity() {
        let mut last = f64::MIN;
        for severity in 1..=5 {
            let priority = score(severity, 0.0);
            assert!(priority.priority_score >= last);
            last = priority.priority_score;
        }
    }

    #[test]
    fn test_monotonic_as_sentiment_worsens() {
        let mut last = f64::MIN;
        for sentiment in [1.0, 0.5, 0.0, -0.5, -1.0] {
            let priority = score(3, sentiment);
            assert!(priority.priority_score >= last);
            last = priority.priority_score;
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        // severity 5, sentiment 0.3: 0.6 + 0.4*0.35 = 0.74 -> P1
        assert_eq!(score(5, 0.3).priority_level, PriorityLevel::P1);
        // severity 5, sentiment 0.1: 0.6 + 0.4*0.45 = 0.78 -> P0
        assert_eq!(score(5, 0.1).priority_level, PriorityLevel::P0);
        // severity 2, sentiment 0.5: 0.24 + 0.4*0.25 = 0.34 -> P3
        assert_eq!(score(2, 0.5).priority_level, PriorityLevel::P3);
        // severity 2, sentiment 0.4: 0.24 + 0.4*0.3 = 0.36 -> P2
        assert_eq!(score(2, 0.4).priority_level, PriorityLevel::P2);
    }

    #[test]
    fn test_components_and_confidence() {
        let priority = calculate_priority(4, 0.9, -0.5, 0.7).unwrap();
        assert_eq!(priority.components.severity_weighted, 0.48);
        assert_eq!(priority.components.sentiment_weighted, 0.3);
        assert_eq!(priority.confidence, 0.7);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(calculate_priority(0, 0.9, 0.0, 0.9).is_err());
        assert!(calculate_priority(6, 0.9, 0.0, 0.9).is_err());
        assert!(calculate_priority(3, 0.9, 1.5, 0.9).is_err());
        assert!(calculate_priority(3, 0.9, f64::NAN, 0.9).is_err());
        assert!(calculate_priority(3, -0.1, 0.0, 0.9).is_err());
        assert!(calculate_priority(3, 0.9, 0.0, 2.0).is_err());
    }
}
