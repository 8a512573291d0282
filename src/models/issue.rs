use serde::{Deserialize, Serialize};

/// The fixed set of service categories a classified issue may carry.
/// Classification output is validated against this list downstream.
pub const SERVICE_CATEGORIES: [&str; 7] = [
    "Response Time",
    "Product Quality",
    "Customer Support",
    "Technical Issues",
    "Billing / Pricing",
    "Delivery / Logistics",
    "Other",
];

/// Check a category string against the fixed category set.
pub fn is_valid_category(category: &str) -> bool {
    SERVICE_CATEGORIES.contains(&category)
}

/// A single extracted customer issue with its supporting evidence.
///
/// `issue_id` is unique within one pipeline run; the classification and
/// severity-validation collections must stay set-equal on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub issue_id: String,
    #[serde(default)]
    pub issue_text: String,
    /// Direct quote or paraphrase from the transcript
    #[serde(default)]
    pub evidence_span: String,
    #[serde(default)]
    pub confidence: f64,
}

/// An issue mapped to a service category with a proposed severity.
///
/// `proposed_severity` is a float in [0,1] and is never final; the
/// severity-validation stage owns the authoritative 1-5 value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedIssue {
    #[serde(default)]
    pub issue_id: String,
    #[serde(default)]
    pub issue_text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub proposed_severity: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// The authoritative severity verdict for one issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedSeverity {
    #[serde(default)]
    pub issue_id: String,
    /// Integer 1-5; no other stage may override this
    #[serde(default)]
    pub final_severity: i64,
    #[serde(default)]
    pub severity_label: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub justification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_source: Option<String>,
}

/// Convert a proposed severity in [0,1] to the authoritative 1-5 scale.
///
/// Linear bucketing into five 0.2-wide bins, upper bin closed at 1.0.
pub fn severity_bucket(proposed: f64) -> i64 {
    let p = if proposed.is_finite() {
        proposed.clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((p * 5.0).floor() as i64 + 1).min(5)
}

/// Human-readable label for a 1-5 severity.
pub fn severity_label(severity: i64) -> &'static str {
    match severity {
        i64::MIN..=1 => "Low",
        2 => "Moderate",
        3 => "Elevated",
        4 => "High",
        _ => "Critical",
    }
}
