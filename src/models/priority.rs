use serde::{Deserialize, Serialize};

/// Urgency level derived from severity and sentiment, P0 most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityLevel {
    P0,
    P1,
    P2,
    P3,
}

impl PriorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::P0 => "P0",
            PriorityLevel::P1 => "P1",
            PriorityLevel::P2 => "P2",
            PriorityLevel::P3 => "P3",
        }
    }
}

/// Derived priority for one analyzed call. Never independently authored;
/// always produced by the priority scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    pub priority_score: f64,
    pub priority_level: PriorityLevel,
    #[serde(default)]
    pub components: PriorityComponents,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriorityComponents {
    #[serde(default)]
    pub severity_weighted: f64,
    #[serde(default)]
    pub sentiment_weighted: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_level_serializes_bare() {
        assert_eq!(
            serde_json::to_string(&PriorityLevel::P0).unwrap(),
            "\"P0\""
        );
        let level: PriorityLevel = serde_json::from_str("\"P2\"").unwrap();
        assert_eq!(level, PriorityLevel::P2);
    }
}
