use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::{
    CaseReport, CaseSentiment, ClassifiedIssue, Issue, Priority, PriorityLevel,
    ValidatedSeverity, ValidationSummary, is_valid_category,
};

const SENTIMENT_LABELS: [&str; 3] = ["Positive", "Neutral", "Negative"];

/// Result of validating an assembled case report.
#[derive(Debug, Clone)]
pub struct ReportValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Present only when zero errors were found
    pub sanitized: Option<CaseReport>,
}

impl ReportValidation {
    pub fn valid(sanitized: CaseReport) -> Self {
        Self {
            is_valid: true,
            errors: vec![],
            sanitized: Some(sanitized),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            sanitized: None,
        }
    }

    /// Condensed form embedded into the report itself.
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            valid: self.is_valid,
            errors: self.errors.clone(),
        }
    }
}

/// Validate a raw report document: presence of the required top-level
/// sections first, then the full structural and consistency checks.
pub fn validate_value(value: &Value) -> ReportValidation {
    const REQUIRED_SECTIONS: [&str; 6] = [
        "system_status",
        "issues",
        "classified_issues",
        "validated_severity",
        "sentiment",
        "priority",
    ];

    let mut errors = Vec::new();
    for section in REQUIRED_SECTIONS {
        if value.get(section).is_none() {
            errors.push(format!("Missing required field: {section}"));
        }
    }
    if !errors.is_empty() {
        return ReportValidation::invalid(errors);
    }

    match serde_json::from_value::<CaseReport>(value.clone()) {
        Ok(report) => validate_report(&report),
        Err(e) => ReportValidation::invalid(vec![format!("Malformed report: {e}")]),
    }
}

/// Validate an assembled case report: per-section range and enum checks,
/// cross-section issue-id consistency, and the soft severity/priority
/// heuristic. Never mutates the input; the sanitized copy is returned only
/// when no errors were found.
pub fn validate_report(report: &CaseReport) -> ReportValidation {
    let mut errors = Vec::new();

    validate_issues(&report.issues, &mut errors);
    validate_classified(&report.classified_issues, &mut errors);
    validate_severity(&report.validated_severity, &mut errors);
    validate_sentiment(&report.sentiment, &mut errors);
    validate_priority(&report.priority, &mut errors);
    validate_consistency(report, &mut errors);

    if errors.is_empty() {
        // Field types are already coerced by the typed model, so
        // sanitization is a straight copy
        ReportValidation::valid(report.clone())
    } else {
        ReportValidation::invalid(errors)
    }
}

fn in_unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn validate_issues(issues: &[Issue], errors: &mut Vec<String>) {
    for (idx, issue) in issues.iter().enumerate() {
        if issue.issue_id.is_empty() {
            errors.push(format!("Issue {idx} missing field: issue_id"));
        }
        if issue.issue_text.is_empty() {
            errors.push(format!("Issue {idx} missing field: issue_text"));
        }
        if !in_unit_range(issue.confidence) {
            errors.push(format!(
                "Issue {idx} confidence out of range: {}",
                issue.confidence
            ));
        }
    }
}

fn validate_classified(classified: &[ClassifiedIssue], errors: &mut Vec<String>) {
    for (idx, item) in classified.iter().enumerate() {
        if item.issue_id.is_empty() {
            errors.push(format!("Classified issue {idx} missing field: issue_id"));
        }
        if !is_valid_category(&item.category) {
            errors.push(format!(
                "Classified issue {idx} invalid category: {}",
                item.category
            ));
        }
        if !in_unit_range(item.proposed_severity) {
            errors.push(format!(
                "Classified issue {idx} proposed_severity out of range: {}",
                item.proposed_severity
            ));
        }
        if !in_unit_range(item.confidence) {
            errors.push(format!(
                "Classified issue {idx} confidence out of range: {}",
                item.confidence
            ));
        }
    }
}

fn validate_severity(validated: &[ValidatedSeverity], errors: &mut Vec<String>) {
    for (idx, item) in validated.iter().enumerate() {
        if item.issue_id.is_empty() {
            errors.push(format!("Validated severity {idx} missing field: issue_id"));
        }
        if !(1..=5).contains(&item.final_severity) {
            errors.push(format!(
                "Validated severity {idx} final_severity out of range: {}",
                item.final_severity
            ));
        }
        if !in_unit_range(item.confidence) {
            errors.push(format!(
                "Validated severity {idx} confidence out of range: {}",
                item.confidence
            ));
        }
    }
}

fn validate_sentiment(sentiment: &CaseSentiment, errors: &mut Vec<String>) {
    if !sentiment.sentiment_score.is_finite()
        || !(-1.0..=1.0).contains(&sentiment.sentiment_score)
    {
        errors.push(format!(
            "sentiment_score out of range: {}",
            sentiment.sentiment_score
        ));
    }
    if !SENTIMENT_LABELS.contains(&sentiment.sentiment_label.as_str()) {
        errors.push(format!(
            "Invalid sentiment_label: {}",
            sentiment.sentiment_label
        ));
    }
    if !in_unit_range(sentiment.confidence) {
        errors.push(format!(
            "sentiment confidence out of range: {}",
            sentiment.confidence
        ));
    }
}

fn validate_priority(priority: &Priority, errors: &mut Vec<String>) {
    if !in_unit_range(priority.priority_score) {
        errors.push(format!(
            "priority_score out of range: {}",
            priority.priority_score
        ));
    }
    if !in_unit_range(priority.confidence) {
        errors.push(format!(
            "priority confidence out of range: {}",
            priority.confidence
        ));
    }
}

fn id_set<'a, I>(ids: I) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter().collect()
}

fn validate_consistency(report: &CaseReport, errors: &mut Vec<String>) {
    let issue_ids = id_set(report.issues.iter().map(|i| i.issue_id.as_str()));
    let classified_ids = id_set(report.classified_issues.iter().map(|i| i.issue_id.as_str()));
    let validated_ids = id_set(report.validated_severity.iter().map(|i| i.issue_id.as_str()));

    report_set_difference(
        &issue_ids,
        &classified_ids,
        "Missing classified issues for",
        "Extra classified issues found",
        errors,
    );
    report_set_difference(
        &classified_ids,
        &validated_ids,
        "Missing validated severity for",
        "Extra validated severity found",
        errors,
    );

    // Soft heuristic: mean severity and priority level should agree
    let count = report.validated_severity.len().max(1);
    let avg_severity = report
        .validated_severity
        .iter()
        .map(|v| v.final_severity)
        .sum::<i64>() as f64
        / count as f64;
    let level = report.priority.priority_level;
    if avg_severity >= 4.5 && !matches!(level, PriorityLevel::P0 | PriorityLevel::P1) {
        errors.push(format!(
            "Inconsistent: avg_severity={avg_severity:.1} but priority={}",
            level.as_str()
        ));
    } else if avg_severity <= 2.0 && !matches!(level, PriorityLevel::P2 | PriorityLevel::P3) {
        errors.push(format!(
            "Inconsistent: avg_severity={avg_severity:.1} but priority={}",
            level.as_str()
        ));
    }
}

fn report_set_difference(
    expected: &BTreeSet<&str>,
    actual: &BTreeSet<&str>,
    missing_label: &str,
    extra_label: &str,
    errors: &mut Vec<String>,
) {
    if expected == actual {
        return;
    }
    let missing: Vec<&str> = expected.difference(actual).copied().collect();
    let extra: Vec<&str> = actual.difference(expected).copied().collect();
    if !missing.is_empty() {
        errors.push(format!("{missing_label}: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        errors.push(format!("{extra_label}: {}", extra.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::{
        InsightResult, KnowledgeResult, PipelineState, PriorityComponents, SystemStatus,
    };

    fn issue(id: &str) -> Issue {
        Issue {
            issue_id: id.to_string(),
            issue_text: "Product broke after one day".to_string(),
            evidence_span: "it stopped working".to_string(),
            confidence: 0.95,
        }
    }

    fn classified(id: &str) -> ClassifiedIssue {
        ClassifiedIssue {
            issue_id: id.to_string(),
            issue_text: "Product broke after one day".to_string(),
            category: "Product Quality".to_string(),
            proposed_severity: 0.6,
            confidence: 0.85,
        }
    }

    fn validated(id: &str, severity: i64) -> ValidatedSeverity {
        ValidatedSeverity {
            issue_id: id.to_string(),
            final_severity: severity,
            severity_label: "Elevated".to_string(),
            validated: true,
            confidence: 0.9,
            justification: "rubric".to_string(),
            grounding_source: None,
        }
    }

    fn sample_report() -> CaseReport {
        CaseReport {
            call_id: "call-1".to_string(),
            system_status: SystemStatus {
                state: PipelineState::Success,
                failed_agents: vec![],
                timestamp: Utc::now(),
            },
            issues: vec![issue("issue_1"), issue("issue_2")],
            classified_issues: vec![classified("issue_1"), classified("issue_2")],
            validated_severity: vec![validated("issue_1", 3), validated("issue_2", 3)],
            grounding: KnowledgeResult::default(),
            sentiment: CaseSentiment {
                sentiment_score: -0.65,
                sentiment_label: "Negative".to_string(),
                confidence: 0.85,
            },
            priority: Priority {
                priority_score: 0.69,
                priority_level: PriorityLevel::P1,
                components: PriorityComponents::default(),
                confidence: 0.85,
            },
            insights: InsightResult::default(),
            validation: None,
        }
    }

    #[test]
    fn test_valid_report_produces_sanitized_copy() {
        let report = sample_report();
        let result = validate_report(&report);
        assert!(result.is_valid, "unexpected errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
        let sanitized = result.sanitized.unwrap();
        assert_eq!(sanitized.issues.len(), 2);
    }

    #[test]
    fn test_missing_classified_issue_reported() {
        let mut report = sample_report();
        report.classified_issues.pop();
        report.validated_severity.pop();
        let result = validate_report(&report);
        assert!(!result.is_valid);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.starts_with("Missing classified issues for: issue_2"))
        );
        assert!(result.sanitized.is_none());
    }

    #[test]
    fn test_extra_classified_issue_is_distinct_error() {
        let mut report = sample_report();
        report.classified_issues.push(classified("issue_9"));
        let result = validate_report(&report);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.starts_with("Extra classified issues found: issue_9"))
        );
        // The downstream comparison also sees issue_9 as missing validation
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.starts_with("Missing validated severity for: issue_9"))
        );
    }

    #[test]
    fn test_invalid_category_and_ranges() {
        let mut report = sample_report();
        report.classified_issues[0].category = "Weather".to_string();
        report.classified_issues[1].proposed_severity = 1.4;
        report.validated_severity[0].final_severity = 7;
        report.issues[0].confidence = -0.2;
        let result = validate_report(&report);
        assert!(result.errors.iter().any(|e| e.contains("invalid category: Weather")));
        assert!(result.errors.iter().any(|e| e.contains("proposed_severity out of range")));
        assert!(result.errors.iter().any(|e| e.contains("final_severity out of range: 7")));
        assert!(result.errors.iter().any(|e| e.contains("confidence out of range: -0.2")));
    }

    #[test]
    fn test_sentiment_checks() {
        let mut report = sample_report();
        report.sentiment.sentiment_score = -1.5;
        report.sentiment.sentiment_label = "Angry".to_string();
        let result = validate_report(&report);
        assert!(result.errors.iter().any(|e| e.contains("sentiment_score out of range")));
        assert!(result.errors.iter().any(|e| e.contains("Invalid sentiment_label: Angry")));
    }

    #[test]
    fn test_high_severity_requires_urgent_priority() {
        let mut report = sample_report();
        report.validated_severity = vec![validated("issue_1", 5), validated("issue_2", 5)];
        report.priority.priority_level = PriorityLevel::P3;
        let result = validate_report(&report);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.contains("avg_severity=5.0 but priority=P3"))
        );
    }

    #[test]
    fn test_low_severity_rejects_urgent_priority() {
        let mut report = sample_report();
        report.validated_severity = vec![validated("issue_1", 1), validated("issue_2", 2)];
        report.priority.priority_level = PriorityLevel::P0;
        let result = validate_report(&report);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.contains("avg_severity=1.5 but priority=P0"))
        );
    }

    #[test]
    fn test_validate_value_reports_missing_sections() {
        let value = serde_json::json!({"issues": []});
        let result = validate_value(&value);
        assert!(!result.is_valid);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e == "Missing required field: priority")
        );
        assert!(
            result
                .errors
                .iter()
                .any(|e| e == "Missing required field: sentiment")
        );
    }

    #[test]
    fn test_validate_value_roundtrip() {
        let report = sample_report();
        let value = serde_json::to_value(&report).unwrap();
        let result = validate_value(&value);
        assert!(result.is_valid, "unexpected errors: {:?}", result.errors);
    }
}
